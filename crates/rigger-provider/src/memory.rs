use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use rigger_domain::{DbParameter, HealthCheck};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ProviderError;
use crate::model::*;
use crate::provider::{AssetStore, Provider};

/// A mutating call received by [`MemoryProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateSecurityGroup(String),
    AuthorizeIngress { group: String, rule: IngressRule },
    RunInstance { instance_id: String, security_groups: Vec<String> },
    TerminateInstances(Vec<String>),
    CreateLoadBalancer(String),
    ConfigureHealthCheck(String),
    RegisterInstances { balancer: String, instance_ids: Vec<String> },
    DeleteLoadBalancer(String),
    CreateDbInstance(String),
    DeleteDbInstance { identifier: String, final_snapshot: String },
    RebootDbInstance(String),
    CreateDbParameterGroup(String),
    ModifyDbParameterGroup { group: String, count: usize },
    CreateDbSecurityGroup(String),
    AuthorizeDbSecurityGroup { group: String, ec2_group: String },
    AssociateAddress { public_ip: String, instance_id: String },
    DisassociateAddress(String),
    AttachVolume { volume_id: String, instance_id: String },
    DetachVolume(String),
    CreateBucket(String),
    PutObject { bucket: String, key: String },
}

#[derive(Debug, Default)]
struct Inner {
    next_id:      u64,
    groups:       BTreeMap<String, SecurityGroup>,
    instances:    Vec<Instance>,
    balancers:    BTreeMap<String, LoadBalancer>,
    health:       BTreeMap<String, HealthCheck>,
    databases:    BTreeMap<String, DbInstance>,
    param_groups: BTreeMap<String, (DbParameterGroup, Vec<DbParameter>)>,
    db_groups:    BTreeMap<String, DbSecurityGroup>,
    addresses:    BTreeMap<String, Address>,
    volumes:      BTreeMap<String, Volume>,
    buckets:      BTreeSet<String>,
    objects:      BTreeMap<(String, String), Vec<u8>>,
    failures:     HashMap<&'static str, String>,
    mutations:    Vec<Mutation>,
}

impl Inner {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:08x}", prefix, self.next_id)
    }

    fn check(&self, op: &'static str) -> Result<(), ProviderError> {
        match self.failures.get(op) {
            Some(code) => Err(ProviderError::Api {
                service: "memory",
                code:    code.clone(),
                message: format!("injected failure for {}", op),
            }),
            None => Ok(()),
        }
    }

    fn instance_running(&self, instance_id: &str) -> bool {
        self.instances
            .iter()
            .any(|i| i.instance_id == instance_id && i.state == InstanceState::Running)
    }
}

/// An in-process provider that simulates the asynchronous behaviour of the
/// real APIs: every describe advances pending resources one step.
///
/// - instances: `pending` → `running`, `shutting-down` → `terminated`
/// - databases: `creating`/`rebooting`/`modifying` → `available`, `deleting` → gone
/// - volumes: `attaching` → `attached`, `detaching` → detached
///
/// Mutating calls are recorded and can be inspected with [`MemoryProvider::mutations`].
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    account_id: String,
    inner:      Arc<RwLock<Inner>>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new("000000000000")
    }
}

impl MemoryProvider {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: strip_account_separators(&account_id.into()),
            inner:      Arc::new(RwLock::new(Inner::default())),
        }
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    pub async fn mutations(&self) -> Vec<Mutation> {
        self.inner.read().await.mutations.clone()
    }

    pub async fn mutation_count(&self) -> usize {
        self.inner.read().await.mutations.len()
    }

    pub async fn clear_mutations(&self) {
        self.inner.write().await.mutations.clear();
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.inner
            .read()
            .await
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn instance(&self, instance_id: &str) -> Option<Instance> {
        self.inner
            .read()
            .await
            .instances
            .iter()
            .find(|i| i.instance_id == instance_id)
            .cloned()
    }

    pub async fn parameters(&self, group: &str) -> Vec<DbParameter> {
        self.inner
            .read()
            .await
            .param_groups
            .get(group)
            .map(|(_, params)| params.clone())
            .unwrap_or_default()
    }

    // ── Seeding ───────────────────────────────────────────────────────────────

    /// Make every call to `op` (e.g. `"run_instance"`) fail with `code`.
    pub async fn fail_on(&self, op: &'static str, code: &str) {
        self.inner.write().await.failures.insert(op, code.to_string());
    }

    /// Add an instance in the given security groups. Returns its id.
    pub async fn seed_instance(&self, groups: &[&str], state: InstanceState) -> String {
        let mut inner = self.inner.write().await;
        let id = inner.next("i");
        let running = state == InstanceState::Running;
        inner.instances.push(Instance {
            instance_id:     id.clone(),
            state,
            dns_name:        running.then(|| format!("{}.compute.memory", id)),
            private_ip:      None,
            public_ip:       None,
            zone:            None,
            security_groups: groups.iter().map(|g| g.to_string()).collect(),
        });
        id
    }

    pub async fn seed_address(&self, public_ip: &str, instance_id: Option<&str>) {
        self.inner.write().await.addresses.insert(
            public_ip.to_string(),
            Address {
                public_ip:   public_ip.to_string(),
                instance_id: instance_id.map(str::to_string),
            },
        );
    }

    pub async fn seed_volume(&self, volume_id: &str, attached_to: Option<(&str, &str)>) {
        let attachment = attached_to.map(|(instance_id, device)| VolumeAttachment {
            instance_id: instance_id.to_string(),
            device:      device.to_string(),
            state:       "attached".into(),
        });
        self.inner.write().await.volumes.insert(
            volume_id.to_string(),
            Volume {
                volume_id: volume_id.to_string(),
                status:    if attachment.is_some() { "in-use" } else { "available" }.into(),
                attachment,
            },
        );
    }

    pub async fn seed_database(&self, identifier: &str, status: DbStatus) {
        let available = status == DbStatus::Available;
        self.inner.write().await.databases.insert(
            identifier.to_string(),
            DbInstance {
                identifier: identifier.to_string(),
                status,
                endpoint:   available.then(|| format!("{}.rds.memory", identifier)),
                port:       available.then_some(3306),
            },
        );
    }

    fn record(&self, inner: &mut Inner, mutation: Mutation) {
        debug!(?mutation, account = %self.account_id, "MemoryProvider: mutation");
        inner.mutations.push(mutation);
    }
}

/// EC2 expands a single group grant into one permission per protocol.
fn expand_group_grant(peer_group: &str, peer_owner: &str) -> Vec<IpPermission> {
    [("icmp", -1, -1), ("tcp", 1, 65535), ("udp", 1, 65535)]
        .into_iter()
        .map(|(protocol, from, to)| IpPermission {
            protocol:  protocol.into(),
            from_port: Some(from),
            to_port:   Some(to),
            cidrs:     vec![],
            groups:    vec![GroupPair {
                group_name: peer_group.to_string(),
                owner_id:   strip_account_separators(peer_owner),
            }],
        })
        .collect()
}

fn not_found(kind: &'static str, id: &str) -> ProviderError {
    ProviderError::NotFound { kind, id: id.to_string() }
}

fn duplicate(code: &str, message: String) -> ProviderError {
    ProviderError::Api { service: "memory", code: code.into(), message }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    // ── Security groups ───────────────────────────────────────────────────────

    async fn describe_security_group(&self, name: &str) -> Result<SecurityGroup, ProviderError> {
        let inner = self.inner.read().await;
        inner.check("describe_security_group")?;
        inner
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("security group", name))
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("create_security_group")?;
        if inner.groups.contains_key(name) {
            return Err(duplicate(
                "InvalidGroup.Duplicate",
                format!("The security group '{}' already exists", name),
            ));
        }
        inner.groups.insert(
            name.to_string(),
            SecurityGroup {
                name:        name.to_string(),
                owner_id:    self.account_id.clone(),
                description: description.to_string(),
                permissions: vec![],
            },
        );
        self.record(&mut inner, Mutation::CreateSecurityGroup(name.to_string()));
        Ok(())
    }

    async fn authorize_ingress(&self, group: &str, rule: &IngressRule) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("authorize_ingress")?;
        let sg = inner
            .groups
            .get_mut(group)
            .ok_or_else(|| not_found("security group", group))?;
        match rule {
            IngressRule::Cidr { protocol, from_port, to_port, cidr } => {
                if sg.has_cidr_rule(protocol, *from_port, *to_port, cidr) {
                    return Err(duplicate(
                        "InvalidPermission.Duplicate",
                        format!("rule {:?} already exists on {}", rule, group),
                    ));
                }
                sg.permissions.push(IpPermission {
                    protocol:  protocol.clone(),
                    from_port: Some(*from_port),
                    to_port:   Some(*to_port),
                    cidrs:     vec![cidr.clone()],
                    groups:    vec![],
                });
            }
            IngressRule::Group { peer_group, peer_owner } => {
                if sg.has_group_rule(peer_group, peer_owner) {
                    return Err(duplicate(
                        "InvalidPermission.Duplicate",
                        format!("grant to {} already exists on {}", peer_group, group),
                    ));
                }
                sg.permissions.extend(expand_group_grant(peer_group, peer_owner));
            }
        }
        self.record(
            &mut inner,
            Mutation::AuthorizeIngress { group: group.to_string(), rule: rule.clone() },
        );
        Ok(())
    }

    // ── Instances ─────────────────────────────────────────────────────────────

    async fn describe_instances(&self) -> Result<Vec<Instance>, ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("describe_instances")?;
        let snapshot = inner.instances.clone();
        for i in inner.instances.iter_mut() {
            match i.state {
                InstanceState::Pending => {
                    i.state = InstanceState::Running;
                    i.dns_name = Some(format!("{}.compute.memory", i.instance_id));
                }
                InstanceState::ShuttingDown => i.state = InstanceState::Terminated,
                _ => {}
            }
        }
        Ok(snapshot)
    }

    async fn run_instance(&self, req: &RunInstanceRequest) -> Result<Instance, ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("run_instance")?;
        let id = inner.next("i");
        let instance = Instance {
            instance_id:     id.clone(),
            state:           InstanceState::Pending,
            dns_name:        None,
            private_ip:      None,
            public_ip:       None,
            zone:            Some(req.zone.clone()),
            security_groups: req.security_groups.clone(),
        };
        inner.instances.push(instance.clone());
        self.record(
            &mut inner,
            Mutation::RunInstance { instance_id: id, security_groups: req.security_groups.clone() },
        );
        Ok(instance)
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("terminate_instances")?;
        for i in inner.instances.iter_mut() {
            if instance_ids.contains(&i.instance_id) && i.state != InstanceState::Terminated {
                i.state = InstanceState::ShuttingDown;
            }
        }
        self.record(&mut inner, Mutation::TerminateInstances(instance_ids.to_vec()));
        Ok(())
    }

    // ── Load balancers ────────────────────────────────────────────────────────

    async fn describe_load_balancers(&self) -> Result<Vec<LoadBalancer>, ProviderError> {
        let inner = self.inner.read().await;
        inner.check("describe_load_balancers")?;
        Ok(inner.balancers.values().cloned().collect())
    }

    async fn create_load_balancer(
        &self,
        req: &CreateLoadBalancerRequest,
    ) -> Result<String, ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("create_load_balancer")?;
        let dns_name = format!("{}.elb.memory", req.name);
        inner.balancers.insert(
            req.name.clone(),
            LoadBalancer {
                name:         req.name.clone(),
                dns_name:     dns_name.clone(),
                zones:        req.zones.clone(),
                instance_ids: vec![],
            },
        );
        self.record(&mut inner, Mutation::CreateLoadBalancer(req.name.clone()));
        Ok(dns_name)
    }

    async fn configure_health_check(
        &self,
        name: &str,
        check: &HealthCheck,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("configure_health_check")?;
        if !inner.balancers.contains_key(name) {
            return Err(not_found("load balancer", name));
        }
        inner.health.insert(name.to_string(), check.clone());
        self.record(&mut inner, Mutation::ConfigureHealthCheck(name.to_string()));
        Ok(())
    }

    async fn register_instances(
        &self,
        name: &str,
        instance_ids: &[String],
    ) -> Result<Vec<String>, ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("register_instances")?;
        let known: Vec<String> = instance_ids
            .iter()
            .filter(|id| inner.instances.iter().any(|i| &i.instance_id == *id))
            .cloned()
            .collect();
        let lb = inner
            .balancers
            .get_mut(name)
            .ok_or_else(|| not_found("load balancer", name))?;
        for id in known {
            if !lb.instance_ids.contains(&id) {
                lb.instance_ids.push(id);
            }
        }
        let registered = lb.instance_ids.clone();
        self.record(
            &mut inner,
            Mutation::RegisterInstances {
                balancer:     name.to_string(),
                instance_ids: instance_ids.to_vec(),
            },
        );
        Ok(registered)
    }

    async fn delete_load_balancer(&self, name: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("delete_load_balancer")?;
        inner.balancers.remove(name);
        inner.health.remove(name);
        self.record(&mut inner, Mutation::DeleteLoadBalancer(name.to_string()));
        Ok(())
    }

    async fn describe_instance_health(
        &self,
        name: &str,
    ) -> Result<Vec<InstanceHealth>, ProviderError> {
        let inner = self.inner.read().await;
        inner.check("describe_instance_health")?;
        let lb = inner
            .balancers
            .get(name)
            .ok_or_else(|| not_found("load balancer", name))?;
        Ok(lb
            .instance_ids
            .iter()
            .map(|id| {
                let running = inner.instance_running(id);
                InstanceHealth {
                    instance_id: id.clone(),
                    state:       if running { "InService" } else { "OutOfService" }.into(),
                    description: None,
                }
            })
            .collect())
    }

    // ── Databases ─────────────────────────────────────────────────────────────

    async fn describe_db_instances(&self) -> Result<Vec<DbInstance>, ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("describe_db_instances")?;
        let snapshot: Vec<DbInstance> = inner.databases.values().cloned().collect();
        inner.databases.retain(|_, db| db.status != DbStatus::Deleting);
        for db in inner.databases.values_mut() {
            if matches!(
                db.status,
                DbStatus::Creating | DbStatus::Rebooting | DbStatus::Modifying
            ) {
                db.status = DbStatus::Available;
                db.endpoint = Some(format!("{}.rds.memory", db.identifier));
                db.port.get_or_insert(3306);
            }
        }
        Ok(snapshot)
    }

    async fn create_db_instance(
        &self,
        req: &CreateDbInstanceRequest,
    ) -> Result<DbInstance, ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("create_db_instance")?;
        if let Some(existing) = inner.databases.get(&req.identifier) {
            if existing.status != DbStatus::Deleting {
                return Err(duplicate(
                    "DBInstanceAlreadyExists",
                    format!("DB instance {} already exists", req.identifier),
                ));
            }
        }
        let db = DbInstance {
            identifier: req.identifier.clone(),
            status:     DbStatus::Creating,
            endpoint:   None,
            port:       req.port,
        };
        inner.databases.insert(req.identifier.clone(), db.clone());
        self.record(&mut inner, Mutation::CreateDbInstance(req.identifier.clone()));
        Ok(db)
    }

    async fn delete_db_instance(
        &self,
        identifier: &str,
        final_snapshot: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("delete_db_instance")?;
        let db = inner
            .databases
            .get_mut(identifier)
            .ok_or_else(|| not_found("db instance", identifier))?;
        db.status = DbStatus::Deleting;
        self.record(
            &mut inner,
            Mutation::DeleteDbInstance {
                identifier:     identifier.to_string(),
                final_snapshot: final_snapshot.to_string(),
            },
        );
        Ok(())
    }

    async fn reboot_db_instance(&self, identifier: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("reboot_db_instance")?;
        let db = inner
            .databases
            .get_mut(identifier)
            .ok_or_else(|| not_found("db instance", identifier))?;
        db.status = DbStatus::Rebooting;
        self.record(&mut inner, Mutation::RebootDbInstance(identifier.to_string()));
        Ok(())
    }

    async fn describe_db_parameter_group(
        &self,
        name: &str,
    ) -> Result<DbParameterGroup, ProviderError> {
        let inner = self.inner.read().await;
        inner.check("describe_db_parameter_group")?;
        inner
            .param_groups
            .get(name)
            .map(|(g, _)| g.clone())
            .ok_or_else(|| not_found("db parameter group", name))
    }

    async fn create_db_parameter_group(
        &self,
        name: &str,
        family: &str,
        description: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("create_db_parameter_group")?;
        inner.param_groups.insert(
            name.to_string(),
            (
                DbParameterGroup {
                    name:        name.to_string(),
                    family:      family.to_string(),
                    description: description.to_string(),
                },
                vec![],
            ),
        );
        self.record(&mut inner, Mutation::CreateDbParameterGroup(name.to_string()));
        Ok(())
    }

    async fn describe_db_parameters(&self, name: &str) -> Result<Vec<DbParameter>, ProviderError> {
        let inner = self.inner.read().await;
        inner.check("describe_db_parameters")?;
        inner
            .param_groups
            .get(name)
            .map(|(_, params)| params.clone())
            .ok_or_else(|| not_found("db parameter group", name))
    }

    async fn modify_db_parameter_group(
        &self,
        name: &str,
        parameters: &[DbParameter],
    ) -> Result<(), ProviderError> {
        if parameters.len() > MAX_PARAMETERS_PER_MODIFY {
            return Err(duplicate(
                "InvalidParameterValue",
                format!("at most {} parameters per call", MAX_PARAMETERS_PER_MODIFY),
            ));
        }
        let mut inner = self.inner.write().await;
        inner.check("modify_db_parameter_group")?;
        let (_, stored) = inner
            .param_groups
            .get_mut(name)
            .ok_or_else(|| not_found("db parameter group", name))?;
        for p in parameters {
            stored.retain(|s| s.name != p.name);
            stored.push(p.clone());
        }
        self.record(
            &mut inner,
            Mutation::ModifyDbParameterGroup { group: name.to_string(), count: parameters.len() },
        );
        Ok(())
    }

    async fn describe_db_security_group(
        &self,
        name: &str,
    ) -> Result<DbSecurityGroup, ProviderError> {
        let inner = self.inner.read().await;
        inner.check("describe_db_security_group")?;
        inner
            .db_groups
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("db security group", name))
    }

    async fn create_db_security_group(
        &self,
        name: &str,
        _description: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("create_db_security_group")?;
        inner.db_groups.insert(
            name.to_string(),
            DbSecurityGroup { name: name.to_string(), ec2_groups: vec![] },
        );
        self.record(&mut inner, Mutation::CreateDbSecurityGroup(name.to_string()));
        Ok(())
    }

    async fn authorize_db_security_group(
        &self,
        name: &str,
        ec2_group: &str,
        ec2_owner: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("authorize_db_security_group")?;
        let group = inner
            .db_groups
            .get_mut(name)
            .ok_or_else(|| not_found("db security group", name))?;
        group.ec2_groups.push(GroupPair {
            group_name: ec2_group.to_string(),
            owner_id:   strip_account_separators(ec2_owner),
        });
        self.record(
            &mut inner,
            Mutation::AuthorizeDbSecurityGroup {
                group:     name.to_string(),
                ec2_group: ec2_group.to_string(),
            },
        );
        Ok(())
    }

    // ── Addresses ─────────────────────────────────────────────────────────────

    async fn describe_address(&self, public_ip: &str) -> Result<Address, ProviderError> {
        let inner = self.inner.read().await;
        inner.check("describe_address")?;
        inner
            .addresses
            .get(public_ip)
            .cloned()
            .ok_or_else(|| not_found("address", public_ip))
    }

    async fn associate_address(
        &self,
        public_ip: &str,
        instance_id: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("associate_address")?;
        let addr = inner
            .addresses
            .get_mut(public_ip)
            .ok_or_else(|| not_found("address", public_ip))?;
        addr.instance_id = Some(instance_id.to_string());
        for i in inner.instances.iter_mut() {
            if i.instance_id == instance_id {
                i.public_ip = Some(public_ip.to_string());
            }
        }
        self.record(
            &mut inner,
            Mutation::AssociateAddress {
                public_ip:   public_ip.to_string(),
                instance_id: instance_id.to_string(),
            },
        );
        Ok(())
    }

    async fn disassociate_address(&self, public_ip: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("disassociate_address")?;
        let addr = inner
            .addresses
            .get_mut(public_ip)
            .ok_or_else(|| not_found("address", public_ip))?;
        addr.instance_id = None;
        self.record(&mut inner, Mutation::DisassociateAddress(public_ip.to_string()));
        Ok(())
    }

    // ── Volumes ───────────────────────────────────────────────────────────────

    async fn describe_volume(&self, volume_id: &str) -> Result<Volume, ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("describe_volume")?;
        let vol = inner
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| not_found("volume", volume_id))?;
        let snapshot = vol.clone();
        match vol.attachment.as_ref().map(|a| a.state.as_str()) {
            Some("attaching") => {
                if let Some(a) = vol.attachment.as_mut() {
                    a.state = "attached".into();
                }
                vol.status = "in-use".into();
            }
            Some("detaching") => {
                vol.attachment = None;
                vol.status = "available".into();
            }
            _ => {}
        }
        Ok(snapshot)
    }

    async fn attach_volume(
        &self,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("attach_volume")?;
        let vol = inner
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| not_found("volume", volume_id))?;
        if vol.attachment.is_some() {
            return Err(duplicate(
                "VolumeInUse",
                format!("{} is already attached to an instance", volume_id),
            ));
        }
        vol.attachment = Some(VolumeAttachment {
            instance_id: instance_id.to_string(),
            device:      device.to_string(),
            state:       "attaching".into(),
        });
        self.record(
            &mut inner,
            Mutation::AttachVolume {
                volume_id:   volume_id.to_string(),
                instance_id: instance_id.to_string(),
            },
        );
        Ok(())
    }

    async fn detach_volume(&self, volume_id: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("detach_volume")?;
        let vol = inner
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| not_found("volume", volume_id))?;
        match vol.attachment.as_mut() {
            Some(a) => a.state = "detaching".into(),
            None => {
                return Err(duplicate(
                    "IncorrectState",
                    format!("{} is not attached", volume_id),
                ))
            }
        }
        self.record(&mut inner, Mutation::DetachVolume(volume_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl AssetStore for MemoryProvider {
    async fn ensure_bucket(&self, bucket: &str) -> Result<bool, ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("ensure_bucket")?;
        if !inner.buckets.insert(bucket.to_string()) {
            return Ok(false);
        }
        self.record(&mut inner, Mutation::CreateBucket(bucket.to_string()));
        Ok(true)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.write().await;
        inner.check("put_object")?;
        if !inner.buckets.contains(bucket) {
            return Err(duplicate("NoSuchBucket", format!("bucket {} does not exist", bucket)));
        }
        inner.objects.insert((bucket.to_string(), key.to_string()), body);
        self.record(
            &mut inner,
            Mutation::PutObject { bucket: bucket.to_string(), key: key.to_string() },
        );
        Ok(())
    }

    fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires_secs: u64,
    ) -> Result<String, ProviderError> {
        Ok(format!("memory://{}/{}?expires={}", bucket, key, expires_secs))
    }
}
