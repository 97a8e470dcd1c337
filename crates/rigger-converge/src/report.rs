use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

/// A mutation issued against the provider or a remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Change {
    SecurityGroupCreated { group: String },
    IngressAuthorized { group: String, rule: String },
    DbParameterGroupCreated { group: String },
    DbParametersApplied { group: String, count: usize },
    DbSecurityGroupCreated { group: String },
    DbSecurityGroupAuthorized { group: String, ec2_group: String },
    InstanceStarted { node: String, instance_id: String },
    InstancesTerminated { nodes: Vec<String> },
    DatabaseStarted { node: String, identifier: String },
    DatabaseDeleted { node: String, final_snapshot: String },
    DatabaseRebooted { node: String },
    LoadBalancerCreated { node: String, name: String },
    LoadBalancerDeleted { node: String, name: String },
    InstancesRegistered { node: String, instance_ids: Vec<String> },
    AddressDisassociated { public_ip: String, instance_id: String },
    AddressAssociated { node: String, public_ip: String },
    VolumeDetached { volume_id: String, instance_id: String },
    VolumeAttached { node: String, volume_id: String },
    BucketCreated { bucket: String },
    ObjectPublished { bucket: String, key: String },
    NodesConfigured { nodes: Vec<String> },
}

impl Change {
    /// True for changes that bring a new resource into existence.
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Change::SecurityGroupCreated { .. }
                | Change::DbParameterGroupCreated { .. }
                | Change::DbSecurityGroupCreated { .. }
                | Change::InstanceStarted { .. }
                | Change::DatabaseStarted { .. }
                | Change::LoadBalancerCreated { .. }
                | Change::BucketCreated { .. }
        )
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::SecurityGroupCreated { group } => write!(f, "created security group {}", group),
            Change::IngressAuthorized { group, rule } => write!(f, "authorized {} on {}", rule, group),
            Change::DbParameterGroupCreated { group } => write!(f, "created db parameter group {}", group),
            Change::DbParametersApplied { group, count } => {
                write!(f, "applied {} parameters to {}", count, group)
            }
            Change::DbSecurityGroupCreated { group } => write!(f, "created db security group {}", group),
            Change::DbSecurityGroupAuthorized { group, ec2_group } => {
                write!(f, "authorized {} on db security group {}", ec2_group, group)
            }
            Change::InstanceStarted { node, instance_id } => {
                write!(f, "started {} as {}", node, instance_id)
            }
            Change::InstancesTerminated { nodes } => write!(f, "terminated {}", nodes.join(", ")),
            Change::DatabaseStarted { node, identifier } => {
                write!(f, "started database {} as {}", node, identifier)
            }
            Change::DatabaseDeleted { node, final_snapshot } => {
                write!(f, "deleted database {} (final snapshot {})", node, final_snapshot)
            }
            Change::DatabaseRebooted { node } => write!(f, "rebooted database {}", node),
            Change::LoadBalancerCreated { node, name } => {
                write!(f, "created load balancer {} as {}", node, name)
            }
            Change::LoadBalancerDeleted { node, name } => {
                write!(f, "deleted load balancer {} ({})", node, name)
            }
            Change::InstancesRegistered { node, instance_ids } => {
                write!(f, "registered {} with {}", instance_ids.join(", "), node)
            }
            Change::AddressDisassociated { public_ip, instance_id } => {
                write!(f, "disassociated {} from {}", public_ip, instance_id)
            }
            Change::AddressAssociated { node, public_ip } => {
                write!(f, "associated {} with {}", public_ip, node)
            }
            Change::VolumeDetached { volume_id, instance_id } => {
                write!(f, "detached {} from {}", volume_id, instance_id)
            }
            Change::VolumeAttached { node, volume_id } => {
                write!(f, "attached {} to {}", volume_id, node)
            }
            Change::BucketCreated { bucket } => write!(f, "created bucket {}", bucket),
            Change::ObjectPublished { bucket, key } => write!(f, "published s3://{}/{}", bucket, key),
            Change::NodesConfigured { nodes } => write!(f, "configured {}", nodes.join(", ")),
        }
    }
}

/// Outcome of one controller operation against one cloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergeReport {
    pub run_id:          Uuid,
    pub cloud:           String,
    pub operation:       String,
    pub started_at:      DateTime<Utc>,
    pub changes:         Vec<Change>,
    /// Nodes found already in their desired state.
    pub already_running: Vec<String>,
    pub errors:          Vec<String>,
}

impl ConvergeReport {
    pub fn new(cloud: &str, operation: &str) -> Self {
        Self {
            run_id:          Uuid::new_v4(),
            cloud:           cloud.to_string(),
            operation:       operation.to_string(),
            started_at:      Utc::now(),
            changes:         Vec::new(),
            already_running: Vec::new(),
            errors:          Vec::new(),
        }
    }

    pub fn record(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn already_running(&mut self, node: &str) {
        self.already_running.push(node.to_string());
    }

    /// Log a failure for `subject` and keep going.
    pub fn fail(&mut self, subject: &str, err: &dyn fmt::Display) {
        error!(subject = %subject, error = %err, "{} failed", subject);
        self.errors.push(format!("{}: {}", subject, err));
    }

    pub fn creates(&self) -> usize {
        self.changes.iter().filter(|c| c.is_create()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
