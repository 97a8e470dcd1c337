use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Raw YAML representation of a cloud file (`clouds/<name>.yml`).
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawCloud {
    pub name: String,
    #[serde(default)]
    pub account: RawAccount,
    #[serde(default)]
    pub roles: Vec<RawRole>,
    #[serde(default)]
    pub nodes: Vec<RawNode>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawAccount {
    #[serde(default)]
    pub account_id: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub keypair_name: String,
    #[serde(default)]
    pub keypair_file: PathBuf,
    #[serde(default)]
    pub asset_bucket: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawRole {
    pub name: String,
    #[serde(default)]
    pub public_ports: Vec<u16>,
}

/// One entry in `nodes:`, discriminated by `type`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RawNode {
    Ec2(RawCompute),
    Elb(RawLoadBalancer),
    Rds(RawDatabase),
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawCompute {
    pub name: String,
    #[serde(default)]
    pub ami: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub availability_zone: String,
    pub ssh_user: Option<String>,
    pub elastic_ip: Option<String>,
    pub volume_id: Option<String>,
    pub device: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Merged into the node's remote descriptor.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawLoadBalancer {
    pub name: String,
    #[serde(default)]
    pub listeners: Vec<RawListener>,
    pub health_check: Option<RawHealthCheck>,
    #[serde(default)]
    pub ec2_nodes: Vec<String>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawListener {
    pub load_balancer_port: u16,
    pub instance_port: u16,
    pub protocol: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawHealthCheck {
    pub target: String,
    pub timeout: u32,
    pub interval: u32,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawDatabase {
    pub name: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub db_instance_class: String,
    #[serde(default)]
    pub master_username: String,
    #[serde(default)]
    pub master_user_password: String,
    pub port: Option<u32>,
    pub allocated_storage: Option<u32>,
    #[serde(default)]
    pub availability_zone: String,
    pub preferred_maintenance_window: Option<String>,
    pub preferred_backup_window: Option<String>,
    pub backup_retention_period: Option<u32>,
    #[serde(default)]
    pub db_parameters: Vec<RawDbParameter>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawDbParameter {
    pub name: String,
    pub value: RawScalar,
}

/// Parameter values are passed to the provider as strings, but YAML authors
/// write `max_connections: 500` without quotes.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for RawScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawScalar::Bool(b) => write!(f, "{}", b),
            RawScalar::Int(i) => write!(f, "{}", i),
            RawScalar::Float(x) => write!(f, "{}", x),
            RawScalar::Text(s) => f.write_str(s),
        }
    }
}
