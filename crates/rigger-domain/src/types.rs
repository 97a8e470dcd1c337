use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::naming;

// ── Account ───────────────────────────────────────────────────────────────────

/// Provider account a cloud is provisioned into.
///
/// Empty strings mean "not declared"; validation reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id:   String,
    /// Absent keys fall back to the provider's ambient credentials.
    pub access_key:   Option<String>,
    pub secret_key:   Option<String>,
    pub region:       String,
    pub keypair_name: String,
    pub keypair_file: PathBuf,
    /// Private bucket that holds the assets bundle and remote descriptors.
    pub asset_bucket: String,
}

// ── Roles ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub public_ports: Vec<u16>,
}

// ── Nodes ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Name of the owning cloud.
    pub cloud: String,
    /// Discovered at runtime.
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Compute(ComputeNode),
    LoadBalancer(LoadBalancerNode),
    Database(DatabaseNode),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Compute(_) => "ec2",
            NodeKind::LoadBalancer(_) => "elb",
            NodeKind::Database(_) => "rds",
        }
    }
}

impl Node {
    pub fn as_compute(&self) -> Option<&ComputeNode> {
        match &self.kind {
            NodeKind::Compute(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_load_balancer(&self) -> Option<&LoadBalancerNode> {
        match &self.kind {
            NodeKind::LoadBalancer(lb) => Some(lb),
            _ => None,
        }
    }

    pub fn as_database(&self) -> Option<&DatabaseNode> {
        match &self.kind {
            NodeKind::Database(db) => Some(db),
            _ => None,
        }
    }

    /// Only compute nodes accept remote commands.
    pub fn is_configurable(&self) -> bool {
        matches!(self.kind, NodeKind::Compute(_))
    }
}

/// An EC2 instance that can be bootstrapped and configured over SSH.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeNode {
    pub image_id:      String,
    pub instance_type: String,
    pub zone:          String,
    pub ssh_user:      String,
    pub elastic_ip:    Option<String>,
    pub volume_id:     Option<String>,
    pub device:        Option<String>,
    pub roles:         Vec<String>,
    /// Extra keys merged into the remote descriptor next to `run_list`.
    pub attributes:    Map<String, Value>,

    pub node_security_group:  String,
    pub role_security_groups: Vec<String>,
    pub default_security_group: String,
    pub descriptor_filename:  String,
}

impl ComputeNode {
    /// Groups an instance is launched into: node group, role groups, then the default group.
    pub fn security_groups(&self) -> Vec<String> {
        let mut groups = Vec::with_capacity(self.role_security_groups.len() + 2);
        groups.push(self.node_security_group.clone());
        for g in &self.role_security_groups {
            if !groups.contains(g) {
                groups.push(g.clone());
            }
        }
        if !groups.contains(&self.default_security_group) {
            groups.push(self.default_security_group.clone());
        }
        groups
    }

    /// The volume to attach, only when both id and device are declared.
    pub fn volume(&self) -> Option<(&str, &str)> {
        match (&self.volume_id, &self.device) {
            (Some(v), Some(d)) => Some((v.as_str(), d.as_str())),
            _ => None,
        }
    }

    pub fn run_list(&self) -> Vec<String> {
        self.roles.iter().map(|r| format!("role[{}]", r)).collect()
    }

    /// The JSON document consumed by the configuration run on this node.
    pub fn descriptor(&self) -> Value {
        let mut doc = Map::new();
        doc.insert(
            "run_list".into(),
            Value::Array(self.run_list().into_iter().map(Value::String).collect()),
        );
        for (k, v) in &self.attributes {
            if k != "run_list" {
                doc.insert(k.clone(), v.clone());
            }
        }
        Value::Object(doc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub load_balancer_port: u16,
    pub instance_port:      u16,
    pub protocol:           String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub target:              String,
    pub timeout:             u32,
    pub interval:            u32,
    pub unhealthy_threshold: u32,
    pub healthy_threshold:   u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerNode {
    pub balancer_name: String,
    pub listeners:     Vec<Listener>,
    pub health_check:  Option<HealthCheck>,
    /// Names of compute nodes registered behind the balancer.
    pub members:       Vec<String>,
    pub zones:         Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbParameter {
    pub name:  String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseNode {
    pub identifier:           String,
    /// Only present when parameters are declared.
    pub parameter_group_name: Option<String>,
    pub security_group_name:  String,
    pub engine:               String,
    pub instance_class:       String,
    pub master_username:      String,
    pub master_password:      String,
    pub port:                 Option<u32>,
    pub allocated_storage:    Option<u32>,
    pub zone:                 String,
    pub maintenance_window:   Option<String>,
    pub backup_window:        Option<String>,
    pub backup_retention:     Option<u32>,
    pub parameters:           Vec<DbParameter>,
}

// ── Cloud ─────────────────────────────────────────────────────────────────────

/// A named deployment: one account, its roles and its nodes.
///
/// Built once through [`crate::CloudBuilder`]. Only hostnames and IP
/// addresses change afterwards, while a convergence pass runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cloud {
    pub(crate) name:    String,
    pub account:        Account,
    pub(crate) roles:   BTreeMap<String, Role>,
    pub(crate) nodes:   BTreeMap<String, Node>,
}

impl Cloud {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn default_security_group(&self) -> String {
        naming::default_security_group(&self.name)
    }

    pub fn compute_nodes(&self) -> impl Iterator<Item = (&Node, &ComputeNode)> {
        self.nodes.values().filter_map(|n| n.as_compute().map(|c| (n, c)))
    }

    pub fn load_balancer_nodes(&self) -> impl Iterator<Item = (&Node, &LoadBalancerNode)> {
        self.nodes.values().filter_map(|n| n.as_load_balancer().map(|lb| (n, lb)))
    }

    pub fn database_nodes(&self) -> impl Iterator<Item = (&Node, &DatabaseNode)> {
        self.nodes.values().filter_map(|n| n.as_database().map(|db| (n, db)))
    }

    pub fn configurable_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.is_configurable())
    }

    pub fn has_compute_nodes(&self) -> bool {
        self.compute_nodes().next().is_some()
    }

    pub fn has_load_balancer_nodes(&self) -> bool {
        self.load_balancer_nodes().next().is_some()
    }

    pub fn has_database_nodes(&self) -> bool {
        self.database_nodes().next().is_some()
    }

    pub fn set_hostname(&mut self, node: &str, hostname: Option<String>) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.hostname = hostname;
        }
    }

    pub fn set_ip_address(&mut self, node: &str, ip: Option<String>) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.ip_address = ip;
        }
    }
}
