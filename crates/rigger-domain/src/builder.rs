use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::DomainError;
use crate::naming;
use crate::types::*;

pub const DEFAULT_SSH_USER: &str = "root";

/// Declared attributes of a compute node; derived names are filled in by the builder.
#[derive(Debug, Clone, Default)]
pub struct ComputeSpec {
    pub image_id:      String,
    pub instance_type: String,
    pub zone:          String,
    pub ssh_user:      Option<String>,
    pub elastic_ip:    Option<String>,
    pub volume_id:     Option<String>,
    pub device:        Option<String>,
    pub roles:         Vec<String>,
    pub attributes:    Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadBalancerSpec {
    pub listeners:    Vec<Listener>,
    pub health_check: Option<HealthCheck>,
    pub members:      Vec<String>,
    pub zones:        Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseSpec {
    pub engine:             String,
    pub instance_class:     String,
    pub master_username:    String,
    pub master_password:    String,
    pub port:               Option<u32>,
    pub allocated_storage:  Option<u32>,
    pub zone:               String,
    pub maintenance_window: Option<String>,
    pub backup_window:      Option<String>,
    pub backup_retention:   Option<u32>,
    pub parameters:         Vec<DbParameter>,
}

/// Assembles a [`Cloud`], rejecting whitespace in names and duplicate declarations.
///
/// ```
/// use rigger_domain::{Account, CloudBuilder, ComputeSpec};
///
/// let mut b = CloudBuilder::new("prod", Account::default()).unwrap();
/// b.role("web", vec![80, 443]).unwrap();
/// b.compute("web-1", ComputeSpec { roles: vec!["web".into()], ..Default::default() }).unwrap();
/// let cloud = b.build();
/// assert_eq!(cloud.compute_nodes().count(), 1);
/// ```
#[derive(Debug)]
pub struct CloudBuilder {
    name:    String,
    account: Account,
    roles:   BTreeMap<String, Role>,
    nodes:   BTreeMap<String, Node>,
}

fn check_name(kind: &'static str, name: &str) -> Result<(), DomainError> {
    if name.is_empty() {
        return Err(DomainError::EmptyName { kind });
    }
    if name.chars().any(char::is_whitespace) {
        return Err(DomainError::InvalidName { kind, name: name.to_string() });
    }
    Ok(())
}

impl CloudBuilder {
    pub fn new(name: impl Into<String>, account: Account) -> Result<Self, DomainError> {
        let name = name.into();
        check_name("cloud", &name)?;
        Ok(Self {
            name,
            account,
            roles: BTreeMap::new(),
            nodes: BTreeMap::new(),
        })
    }

    pub fn role(&mut self, name: &str, public_ports: Vec<u16>) -> Result<&mut Self, DomainError> {
        check_name("role", name)?;
        if self.roles.contains_key(name) {
            return Err(DomainError::DuplicateRole(name.to_string()));
        }
        self.roles.insert(
            name.to_string(),
            Role { name: name.to_string(), public_ports },
        );
        Ok(self)
    }

    pub fn compute(&mut self, name: &str, spec: ComputeSpec) -> Result<&mut Self, DomainError> {
        let cloud = self.name.clone();
        let role_security_groups = spec
            .roles
            .iter()
            .map(|r| naming::role_security_group(&cloud, r))
            .collect();
        let kind = NodeKind::Compute(ComputeNode {
            image_id:      spec.image_id,
            instance_type: spec.instance_type,
            zone:          spec.zone,
            ssh_user:      spec.ssh_user.unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
            elastic_ip:    spec.elastic_ip,
            volume_id:     spec.volume_id,
            device:        spec.device,
            roles:         spec.roles,
            attributes:    spec.attributes,
            node_security_group:    naming::node_security_group(&cloud, name),
            role_security_groups,
            default_security_group: naming::default_security_group(&cloud),
            descriptor_filename:    naming::descriptor_filename(&cloud, name),
        });
        self.insert_node(name, kind)
    }

    pub fn load_balancer(
        &mut self,
        name: &str,
        spec: LoadBalancerSpec,
    ) -> Result<&mut Self, DomainError> {
        let kind = NodeKind::LoadBalancer(LoadBalancerNode {
            balancer_name: naming::load_balancer_name(&self.name, name),
            listeners:     spec.listeners,
            health_check:  spec.health_check,
            members:       spec.members,
            zones:         spec.zones,
        });
        self.insert_node(name, kind)
    }

    pub fn database(&mut self, name: &str, spec: DatabaseSpec) -> Result<&mut Self, DomainError> {
        let parameter_group_name = if spec.parameters.is_empty() {
            None
        } else {
            Some(naming::db_parameter_group_name(&self.name, name))
        };
        let kind = NodeKind::Database(DatabaseNode {
            identifier:          naming::db_instance_identifier(&self.name, name),
            parameter_group_name,
            security_group_name: naming::db_security_group_name(&self.name, name),
            engine:              spec.engine,
            instance_class:      spec.instance_class,
            master_username:     spec.master_username,
            master_password:     spec.master_password,
            port:                spec.port,
            allocated_storage:   spec.allocated_storage,
            zone:                spec.zone,
            maintenance_window:  spec.maintenance_window,
            backup_window:       spec.backup_window,
            backup_retention:    spec.backup_retention,
            parameters:          spec.parameters,
        });
        self.insert_node(name, kind)
    }

    fn insert_node(&mut self, name: &str, kind: NodeKind) -> Result<&mut Self, DomainError> {
        check_name("node", name)?;
        if self.nodes.contains_key(name) {
            return Err(DomainError::DuplicateNode(name.to_string()));
        }
        self.nodes.insert(
            name.to_string(),
            Node {
                name:       name.to_string(),
                cloud:      self.name.clone(),
                hostname:   None,
                ip_address: None,
                kind,
            },
        );
        Ok(self)
    }

    pub fn build(self) -> Cloud {
        Cloud {
            name:    self.name,
            account: self.account,
            roles:   self.roles,
            nodes:   self.nodes,
        }
    }
}
