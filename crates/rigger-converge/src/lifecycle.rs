//! Start and stop state machines for compute, database and load-balancer nodes.
//!
//! Resources are always looked up by name against a fresh listing: compute
//! instances by their node security group, databases by identifier and load
//! balancers by name. Wait loops poll until every watched item settles and
//! have no timeout.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rigger_domain::{naming, Cloud, DatabaseNode, LoadBalancerNode};
use rigger_provider::{
    CreateDbInstanceRequest, CreateLoadBalancerRequest, DbInstance, DbStatus, Instance,
    InstanceState, Provider, ProviderError, RunInstanceRequest,
};
use tracing::{error, info, warn};

use crate::error::ConvergeError;
use crate::report::{Change, ConvergeReport};

// ── Lookup ────────────────────────────────────────────────────────────────────

/// The first instance in `node_group` that isn't terminated.
pub fn find_instance<'a>(instances: &'a [Instance], node_group: &str) -> Option<&'a Instance> {
    instances
        .iter()
        .find(|i| i.in_group(node_group) && i.state != InstanceState::Terminated)
}

/// `deleted` entries count as absent.
pub fn find_database<'a>(databases: &'a [DbInstance], identifier: &str) -> Option<&'a DbInstance> {
    databases
        .iter()
        .find(|d| d.identifier == identifier && d.status != DbStatus::Deleted)
}

/// What `start` does with a database node given its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbAction {
    Start,
    Watch,
    AlreadyRunning,
    Failed,
}

pub fn classify_database(status: Option<&DbStatus>) -> DbAction {
    match status {
        None | Some(DbStatus::Deleted) | Some(DbStatus::Deleting) => DbAction::Start,
        Some(DbStatus::Creating)
        | Some(DbStatus::Rebooting)
        | Some(DbStatus::Modifying)
        | Some(DbStatus::ResettingMasterCredentials) => DbAction::Watch,
        Some(DbStatus::Available) | Some(DbStatus::BackingUp) => DbAction::AlreadyRunning,
        Some(DbStatus::Failed) | Some(DbStatus::StorageFull) => DbAction::Failed,
        Some(DbStatus::Other(_)) => DbAction::Watch,
    }
}

/// Statuses a delete can be issued from.
fn deletable(status: &DbStatus) -> bool {
    matches!(status, DbStatus::Available | DbStatus::Failed | DbStatus::StorageFull)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── Compute ───────────────────────────────────────────────────────────────────

/// Start every compute node without an instance and wait for all of them to
/// run. Hostnames and IPs of running nodes are written back to `cloud`.
pub async fn ensure_compute_nodes(
    provider: &dyn Provider,
    cloud: &mut Cloud,
    poll: Duration,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let instances = provider.describe_instances().await?;
    let mut ready: Vec<(String, Instance)> = Vec::new();
    let mut watch: BTreeMap<String, String> = BTreeMap::new();
    let mut starts: Vec<(String, RunInstanceRequest)> = Vec::new();

    for (node, compute) in cloud.compute_nodes() {
        match find_instance(&instances, &compute.node_security_group) {
            None => starts.push((
                node.name.clone(),
                RunInstanceRequest {
                    image_id:        compute.image_id.clone(),
                    instance_type:   compute.instance_type.clone(),
                    zone:            compute.zone.clone(),
                    keypair_name:    cloud.account.keypair_name.clone(),
                    security_groups: compute.security_groups(),
                },
            )),
            Some(i) => match i.state {
                InstanceState::Running => {
                    info!(node = %node.name, instance = %i.instance_id, "Node {} already running", node.name);
                    report.already_running(&node.name);
                    ready.push((node.name.clone(), i.clone()));
                }
                InstanceState::Pending => {
                    info!(node = %node.name, "Node {} is starting", node.name);
                    watch.insert(node.name.clone(), i.instance_id.clone());
                }
                InstanceState::ShuttingDown => {
                    info!(node = %node.name, "Node {} is shutting down; start it again once it has terminated", node.name);
                }
                state => {
                    warn!(node = %node.name, state = state.as_str(), "Node {} is {}; not starting it", node.name, state.as_str());
                }
            },
        }
    }

    for (node, req) in starts {
        info!(node = %node, image = %req.image_id, "Starting node {}", node);
        match provider.run_instance(&req).await {
            Ok(instance) => {
                report.record(Change::InstanceStarted {
                    node:        node.clone(),
                    instance_id: instance.instance_id.clone(),
                });
                watch.insert(node, instance.instance_id);
            }
            Err(e) => report.fail(&node, &e),
        }
    }

    ready.extend(wait_for_instances(provider, watch, poll, report).await?);
    for (node, instance) in ready {
        cloud.set_hostname(&node, instance.dns_name.clone());
        cloud.set_ip_address(&node, instance.public_ip.or(instance.private_ip));
    }
    Ok(())
}

async fn wait_for_instances(
    provider: &dyn Provider,
    mut pending: BTreeMap<String, String>,
    poll: Duration,
    report: &mut ConvergeReport,
) -> Result<Vec<(String, Instance)>, ProviderError> {
    let mut ready = Vec::new();
    while !pending.is_empty() {
        let instances = provider.describe_instances().await?;
        pending.retain(|node, id| match instances.iter().find(|i| &i.instance_id == id) {
            Some(i) if i.state == InstanceState::Running => {
                info!(node = %node, instance = %id, "Node {} is running", node);
                ready.push((node.clone(), i.clone()));
                false
            }
            Some(i) if matches!(i.state, InstanceState::Terminated | InstanceState::ShuttingDown) => {
                report.fail(node, &format!("instance {} is {}", id, i.state.as_str()));
                false
            }
            None => {
                report.fail(node, &format!("instance {} is no longer listed", id));
                false
            }
            Some(_) => {
                info!(node = %node, "Waiting for node {} to start...", node);
                true
            }
        });
        if !pending.is_empty() {
            tokio::time::sleep(poll).await;
        }
    }
    Ok(ready)
}

/// Terminate every compute node's instance in one call and wait until they're gone.
pub async fn shutdown_compute_nodes(
    provider: &dyn Provider,
    cloud: &mut Cloud,
    poll: Duration,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let instances = provider.describe_instances().await?;
    let mut terminate: Vec<(String, String)> = Vec::new();
    let mut watch: BTreeMap<String, String> = BTreeMap::new();

    for (node, compute) in cloud.compute_nodes() {
        match find_instance(&instances, &compute.node_security_group) {
            None => info!(node = %node.name, "Node {} not running", node.name),
            Some(i) if i.state == InstanceState::ShuttingDown => {
                watch.insert(node.name.clone(), i.instance_id.clone());
            }
            Some(i) => terminate.push((node.name.clone(), i.instance_id.clone())),
        }
    }

    if !terminate.is_empty() {
        let ids: Vec<String> = terminate.iter().map(|(_, id)| id.clone()).collect();
        info!(instances = ?ids, "Terminating {} nodes", ids.len());
        provider.terminate_instances(&ids).await?;
        report.record(Change::InstancesTerminated {
            nodes: terminate.iter().map(|(n, _)| n.clone()).collect(),
        });
        watch.extend(terminate);
    }

    while !watch.is_empty() {
        let instances = provider.describe_instances().await?;
        watch.retain(|node, id| match instances.iter().find(|i| &i.instance_id == id) {
            Some(i) if i.state != InstanceState::Terminated => {
                info!(node = %node, "Waiting for node {} to terminate...", node);
                true
            }
            _ => {
                info!(node = %node, "Node {} terminated", node);
                false
            }
        });
        if !watch.is_empty() {
            tokio::time::sleep(poll).await;
        }
    }

    let nodes: Vec<String> = cloud.compute_nodes().map(|(n, _)| n.name.clone()).collect();
    for node in nodes {
        cloud.set_hostname(&node, None);
        cloud.set_ip_address(&node, None);
    }
    Ok(())
}

// ── Databases ─────────────────────────────────────────────────────────────────

fn create_db_request(db: &DatabaseNode) -> CreateDbInstanceRequest {
    CreateDbInstanceRequest {
        identifier:         db.identifier.clone(),
        engine:             db.engine.clone(),
        instance_class:     db.instance_class.clone(),
        master_username:    db.master_username.clone(),
        master_password:    db.master_password.clone(),
        allocated_storage:  db.allocated_storage,
        port:               db.port,
        zone:               (!db.zone.is_empty()).then(|| db.zone.clone()),
        parameter_group:    db.parameter_group_name.clone(),
        security_groups:    vec![db.security_group_name.clone()],
        maintenance_window: db.maintenance_window.clone(),
        backup_window:      db.backup_window.clone(),
        backup_retention:   db.backup_retention,
    }
}

/// Create missing databases and wait for every created or in-flight one to
/// become available. Endpoints are written back as hostnames.
pub async fn ensure_database_nodes(
    provider: &dyn Provider,
    cloud: &mut Cloud,
    poll: Duration,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let databases = provider.describe_db_instances().await?;
    let mut ready: Vec<(String, DbInstance)> = Vec::new();
    let mut watch: BTreeMap<String, String> = BTreeMap::new();
    let mut starts: Vec<(String, CreateDbInstanceRequest)> = Vec::new();

    for (node, db) in cloud.database_nodes() {
        let existing = find_database(&databases, &db.identifier);
        match classify_database(existing.map(|d| &d.status)) {
            DbAction::Start => starts.push((node.name.clone(), create_db_request(db))),
            DbAction::Watch => {
                info!(node = %node.name, "Database node {} is busy; waiting for it", node.name);
                watch.insert(node.name.clone(), db.identifier.clone());
            }
            DbAction::AlreadyRunning => {
                info!(node = %node.name, "Database node {} already running", node.name);
                report.already_running(&node.name);
                if let Some(d) = existing {
                    ready.push((node.name.clone(), d.clone()));
                }
            }
            DbAction::Failed => {
                let status = existing.map(|d| d.status.as_str()).unwrap_or_default();
                report.fail(&node.name, &format!("database {} is {}", db.identifier, status));
            }
        }
    }

    for (node, req) in starts {
        info!(node = %node, identifier = %req.identifier, "Starting database node {}", node);
        match provider.create_db_instance(&req).await {
            Ok(_) => {
                report.record(Change::DatabaseStarted {
                    node:       node.clone(),
                    identifier: req.identifier.clone(),
                });
                watch.insert(node, req.identifier);
            }
            Err(e) => report.fail(&node, &e),
        }
    }

    ready.extend(wait_for_databases(provider, watch, poll, report).await?);
    for (node, db) in ready {
        cloud.set_hostname(&node, db.endpoint);
    }
    Ok(())
}

/// Poll until each watched database is available or has failed.
async fn wait_for_databases(
    provider: &dyn Provider,
    mut pending: BTreeMap<String, String>,
    poll: Duration,
    report: &mut ConvergeReport,
) -> Result<Vec<(String, DbInstance)>, ProviderError> {
    let mut ready = Vec::new();
    while !pending.is_empty() {
        let databases = provider.describe_db_instances().await?;
        pending.retain(|node, identifier| match find_database(&databases, identifier) {
            Some(d) if d.status == DbStatus::Available => {
                info!(node = %node, endpoint = ?d.endpoint, "Database node {} is available", node);
                ready.push((node.clone(), d.clone()));
                false
            }
            Some(d) if matches!(d.status, DbStatus::Failed | DbStatus::StorageFull) => {
                report.fail(node, &format!("database {} is {}", identifier, d.status.as_str()));
                false
            }
            Some(d) => {
                let status = d.status.as_str();
                info!(node = %node, status, "Waiting for database node {} ({})...", node, status);
                true
            }
            None => {
                report.fail(node, &format!("database {} is no longer listed", identifier));
                false
            }
        });
        if !pending.is_empty() {
            tokio::time::sleep(poll).await;
        }
    }
    Ok(ready)
}

/// Delete every database with a final snapshot. Busy databases are waited out
/// first; databases already being deleted are only watched.
pub async fn shutdown_database_nodes(
    provider: &dyn Provider,
    cloud: &mut Cloud,
    poll: Duration,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let databases = provider.describe_db_instances().await?;
    let mut busy: BTreeMap<String, String> = BTreeMap::new();
    let mut delete: Vec<(String, String)> = Vec::new();
    let mut gone: BTreeMap<String, String> = BTreeMap::new();

    for (node, db) in cloud.database_nodes() {
        let entry = (node.name.clone(), db.identifier.clone());
        match find_database(&databases, &db.identifier).map(|d| &d.status) {
            None => info!(node = %node.name, "Database node {} not running", node.name),
            Some(DbStatus::Deleting) => {
                gone.insert(entry.0, entry.1);
            }
            Some(status) if deletable(status) => delete.push(entry),
            Some(_) => {
                busy.insert(entry.0, entry.1);
            }
        }
    }

    while !busy.is_empty() {
        let databases = provider.describe_db_instances().await?;
        busy.retain(|node, identifier| match find_database(&databases, identifier) {
            None => false,
            Some(d) if d.status == DbStatus::Deleting => {
                gone.insert(node.clone(), identifier.clone());
                false
            }
            Some(d) if deletable(&d.status) => {
                delete.push((node.clone(), identifier.clone()));
                false
            }
            Some(d) => {
                info!(node = %node, status = d.status.as_str(), "Waiting for database node {} to settle before deleting", node);
                true
            }
        });
        if !busy.is_empty() {
            tokio::time::sleep(poll).await;
        }
    }

    for (node, identifier) in delete {
        let snapshot = naming::final_snapshot_identifier(&identifier, &timestamp());
        info!(node = %node, snapshot = %snapshot, "Deleting database node {}", node);
        match provider.delete_db_instance(&identifier, &snapshot).await {
            Ok(()) => {
                report.record(Change::DatabaseDeleted { node: node.clone(), final_snapshot: snapshot });
                gone.insert(node, identifier);
            }
            Err(e) => report.fail(&node, &e),
        }
    }

    while !gone.is_empty() {
        let databases = provider.describe_db_instances().await?;
        gone.retain(|node, identifier| {
            if find_database(&databases, identifier).is_some() {
                info!(node = %node, "Waiting for database node {} to be deleted...", node);
                true
            } else {
                info!(node = %node, "Database node {} deleted", node);
                false
            }
        });
        if !gone.is_empty() {
            tokio::time::sleep(poll).await;
        }
    }

    let nodes: Vec<String> = cloud.database_nodes().map(|(n, _)| n.name.clone()).collect();
    for node in nodes {
        cloud.set_hostname(&node, None);
    }
    Ok(())
}

/// Reboot one database node and wait until it is available again.
pub async fn reboot_database(
    provider: &dyn Provider,
    cloud: &mut Cloud,
    name: &str,
    poll: Duration,
    report: &mut ConvergeReport,
) -> Result<(), ConvergeError> {
    let node = cloud.node(name).ok_or_else(|| ConvergeError::UnknownNode(name.to_string()))?;
    let identifier = node
        .as_database()
        .map(|db| db.identifier.clone())
        .ok_or_else(|| ConvergeError::NotADatabase(name.to_string()))?;

    info!(node = %name, identifier = %identifier, "Rebooting database node {}", name);
    provider.reboot_db_instance(&identifier).await?;
    report.record(Change::DatabaseRebooted { node: name.to_string() });

    loop {
        let databases = provider.describe_db_instances().await?;
        match find_database(&databases, &identifier) {
            Some(d) if d.status == DbStatus::Available => {
                info!(node = %name, "Database node {} rebooted", name);
                cloud.set_hostname(name, d.endpoint.clone());
                return Ok(());
            }
            Some(d) if matches!(d.status, DbStatus::Failed | DbStatus::StorageFull) => {
                report.fail(name, &format!("database {} is {}", identifier, d.status.as_str()));
                return Ok(());
            }
            Some(d) => {
                info!(node = %name, status = d.status.as_str(), "Waiting for database node {} to reboot...", name);
            }
            None => {
                return Err(ProviderError::NotFound { kind: "db instance", id: identifier.clone() }.into());
            }
        }
        tokio::time::sleep(poll).await;
    }
}

// ── Load balancers ────────────────────────────────────────────────────────────

/// Create missing load balancers and register their members. Existing
/// balancers are left as they are.
pub async fn ensure_load_balancer_nodes(
    provider: &dyn Provider,
    cloud: &mut Cloud,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let balancers = provider.describe_load_balancers().await?;
    let mut hostnames: Vec<(String, String)> = Vec::new();

    for (node, lb) in cloud.load_balancer_nodes() {
        if let Some(existing) = balancers.iter().find(|b| b.name == lb.balancer_name) {
            info!(node = %node.name, "Load balancer {} already running", node.name);
            report.already_running(&node.name);
            hostnames.push((node.name.clone(), existing.dns_name.clone()));
            continue;
        }
        match create_load_balancer(provider, cloud, &node.name, lb, report).await {
            Ok(dns_name) => hostnames.push((node.name.clone(), dns_name)),
            Err(e) => report.fail(&node.name, &e),
        }
    }

    for (node, dns_name) in hostnames {
        cloud.set_hostname(&node, Some(dns_name));
    }
    Ok(())
}

async fn create_load_balancer(
    provider: &dyn Provider,
    cloud: &Cloud,
    node: &str,
    lb: &LoadBalancerNode,
    report: &mut ConvergeReport,
) -> Result<String, ProviderError> {
    info!(node = %node, name = %lb.balancer_name, "Creating load balancer {}", node);
    let dns_name = provider
        .create_load_balancer(&CreateLoadBalancerRequest {
            name:      lb.balancer_name.clone(),
            zones:     lb.zones.clone(),
            listeners: lb.listeners.clone(),
        })
        .await?;
    report.record(Change::LoadBalancerCreated {
        node: node.to_string(),
        name: lb.balancer_name.clone(),
    });

    if let Some(check) = &lb.health_check {
        if let Err(e) = provider.configure_health_check(&lb.balancer_name, check).await {
            report.fail(node, &e);
        }
    }
    if let Err(e) = register_members(provider, cloud, node, lb, report).await {
        report.fail(node, &e);
    }
    Ok(dns_name)
}

/// Register every running member with the balancer. Members that are not
/// running are reported and skipped.
async fn register_members(
    provider: &dyn Provider,
    cloud: &Cloud,
    node: &str,
    lb: &LoadBalancerNode,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let instances = provider.describe_instances().await?;
    let mut requested = Vec::new();
    for member in &lb.members {
        let running = cloud
            .node(member)
            .and_then(|n| n.as_compute())
            .and_then(|c| find_instance(&instances, &c.node_security_group))
            .filter(|i| i.state == InstanceState::Running);
        match running {
            Some(i) => requested.push(i.instance_id.clone()),
            None => report.fail(
                member,
                &format!("node is not running; not registered with load balancer {}", node),
            ),
        }
    }
    if requested.is_empty() {
        return Ok(());
    }

    info!(node = %node, instances = ?requested, "Registering instances with load balancer {}", node);
    let mut registered = provider.register_instances(&lb.balancer_name, &requested).await?;
    report.record(Change::InstancesRegistered {
        node:         node.to_string(),
        instance_ids: requested.clone(),
    });
    requested.sort();
    registered.sort();
    if requested != registered {
        error!(
            node = %node,
            requested = ?requested,
            registered = ?registered,
            "Load balancer {} registered a different set of instances than requested",
            node
        );
        report.errors.push(format!(
            "{}: requested {:?} but {:?} are registered",
            node, requested, registered
        ));
    }
    Ok(())
}

/// Delete every load balancer that exists.
pub async fn shutdown_load_balancer_nodes(
    provider: &dyn Provider,
    cloud: &mut Cloud,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let balancers = provider.describe_load_balancers().await?;
    let mut deleted = Vec::new();
    for (node, lb) in cloud.load_balancer_nodes() {
        if !balancers.iter().any(|b| b.name == lb.balancer_name) {
            info!(node = %node.name, "Load balancer {} not running", node.name);
            continue;
        }
        info!(node = %node.name, "Deleting load balancer {}", node.name);
        match provider.delete_load_balancer(&lb.balancer_name).await {
            Ok(()) => {
                report.record(Change::LoadBalancerDeleted {
                    node: node.name.clone(),
                    name: lb.balancer_name.clone(),
                });
                deleted.push(node.name.clone());
            }
            Err(e) => report.fail(&node.name, &e),
        }
    }
    for node in deleted {
        cloud.set_hostname(&node, None);
    }
    Ok(())
}
