//! Provider-side views of resources, as returned by describe calls.

use serde::{Deserialize, Serialize};

use rigger_domain::Listener;

// ── Security groups ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub name:        String,
    pub owner_id:    String,
    pub description: String,
    pub permissions: Vec<IpPermission>,
}

/// One ingress permission as reported by the provider. A single permission can
/// carry several CIDR ranges and several peer groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpPermission {
    pub protocol:  String,
    pub from_port: Option<i32>,
    pub to_port:   Option<i32>,
    pub cidrs:     Vec<String>,
    pub groups:    Vec<GroupPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPair {
    pub group_name: String,
    pub owner_id:   String,
}

/// A rule to authorize on a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngressRule {
    Cidr {
        protocol:  String,
        from_port: i32,
        to_port:   i32,
        cidr:      String,
    },
    /// Grants the peer group every protocol and port.
    Group { peer_group: String, peer_owner: String },
}

impl SecurityGroup {
    /// Exact match on (protocol, from, to, cidr).
    pub fn has_cidr_rule(&self, protocol: &str, from_port: i32, to_port: i32, cidr: &str) -> bool {
        self.permissions.iter().any(|p| {
            p.protocol == protocol
                && p.from_port == Some(from_port)
                && p.to_port == Some(to_port)
                && p.cidrs.iter().any(|c| c == cidr)
        })
    }

    /// Match on peer group name and owner, ignoring `-` separators in account ids.
    pub fn has_group_rule(&self, peer_group: &str, peer_owner: &str) -> bool {
        let owner = strip_account_separators(peer_owner);
        self.permissions.iter().any(|p| {
            p.groups.iter().any(|g| {
                g.group_name == peer_group && strip_account_separators(&g.owner_id) == owner
            })
        })
    }
}

/// `1234-5678-9012` and `123456789012` name the same account.
pub fn strip_account_separators(account_id: &str) -> String {
    account_id.chars().filter(|c| *c != '-').collect()
}

// ── Instances ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id:     String,
    pub state:           InstanceState,
    pub dns_name:        Option<String>,
    pub private_ip:      Option<String>,
    pub public_ip:       Option<String>,
    pub zone:            Option<String>,
    pub security_groups: Vec<String>,
}

impl Instance {
    pub fn in_group(&self, group: &str) -> bool {
        self.security_groups.iter().any(|g| g == group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInstanceRequest {
    pub image_id:        String,
    pub instance_type:   String,
    pub zone:            String,
    pub keypair_name:    String,
    pub security_groups: Vec<String>,
}

// ── Load balancers ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub name:         String,
    pub dns_name:     String,
    pub zones:        Vec<String>,
    pub instance_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoadBalancerRequest {
    pub name:      String,
    pub zones:     Vec<String>,
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHealth {
    pub instance_id: String,
    /// `InService`, `OutOfService` or `Unknown`.
    pub state:       String,
    pub description: Option<String>,
}

// ── Databases ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DbStatus {
    Creating,
    Available,
    BackingUp,
    Rebooting,
    Modifying,
    ResettingMasterCredentials,
    Failed,
    StorageFull,
    Deleting,
    Deleted,
    Other(String),
}

impl DbStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "backing-up" => Self::BackingUp,
            "rebooting" => Self::Rebooting,
            "modifying" => Self::Modifying,
            "resetting-master-credentials" => Self::ResettingMasterCredentials,
            "failed" => Self::Failed,
            "storage-full" => Self::StorageFull,
            "deleting" => Self::Deleting,
            "deleted" => Self::Deleted,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::BackingUp => "backing-up",
            Self::Rebooting => "rebooting",
            Self::Modifying => "modifying",
            Self::ResettingMasterCredentials => "resetting-master-credentials",
            Self::Failed => "failed",
            Self::StorageFull => "storage-full",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbInstance {
    pub identifier: String,
    pub status:     DbStatus,
    /// Endpoint address, present once the instance is available.
    pub endpoint:   Option<String>,
    pub port:       Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDbInstanceRequest {
    pub identifier:           String,
    pub engine:               String,
    pub instance_class:       String,
    pub master_username:      String,
    pub master_password:      String,
    pub allocated_storage:    Option<u32>,
    pub port:                 Option<u32>,
    pub zone:                 Option<String>,
    pub parameter_group:      Option<String>,
    pub security_groups:      Vec<String>,
    pub maintenance_window:   Option<String>,
    pub backup_window:        Option<String>,
    pub backup_retention:     Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbParameterGroup {
    pub name:        String,
    pub family:      String,
    pub description: String,
}

/// Parameters applied per modify call.
pub const MAX_PARAMETERS_PER_MODIFY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSecurityGroup {
    pub name:       String,
    pub ec2_groups: Vec<GroupPair>,
}

// ── Addresses and volumes ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub public_ip:   String,
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub volume_id:  String,
    /// `available`, `in-use`, `creating`, ...
    pub status:     String,
    pub attachment: Option<VolumeAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub instance_id: String,
    pub device:      String,
    /// `attaching`, `attached`, `detaching`, `detached`.
    pub state:       String,
}
