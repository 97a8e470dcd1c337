use std::fmt;

use rigger_domain::{Cloud, NodeKind};
use rigger_provider::{Provider, ProviderError};
use serde::Serialize;

use crate::lifecycle::{find_database, find_instance};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub node:    String,
    /// `ec2`, `elb` or `rds`.
    pub kind:    String,
    /// Provider state, or `not running` when nothing backs the node.
    pub state:   String,
    /// DNS name or endpoint.
    pub address: Option<String>,
    /// Registered instances and their health, load balancers only.
    pub members: Vec<(String, String)>,
}

pub const NOT_RUNNING: &str = "not running";

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.node, self.kind, self.state)?;
        if let Some(address) = &self.address {
            write!(f, " {}", address)?;
        }
        for (instance, health) in &self.members {
            write!(f, "\n    {} {}", instance, health)?;
        }
        Ok(())
    }
}

/// One line per node, from fresh provider listings.
pub async fn cloud_status(
    provider: &dyn Provider,
    cloud: &Cloud,
) -> Result<Vec<StatusLine>, ProviderError> {
    let instances = if cloud.has_compute_nodes() {
        provider.describe_instances().await?
    } else {
        Vec::new()
    };
    let databases = if cloud.has_database_nodes() {
        provider.describe_db_instances().await?
    } else {
        Vec::new()
    };
    let balancers = if cloud.has_load_balancer_nodes() {
        provider.describe_load_balancers().await?
    } else {
        Vec::new()
    };

    let mut lines = Vec::new();
    for node in cloud.nodes() {
        let mut line = StatusLine {
            node:    node.name.clone(),
            kind:    node.kind.label().to_string(),
            state:   NOT_RUNNING.to_string(),
            address: None,
            members: Vec::new(),
        };
        match &node.kind {
            NodeKind::Compute(compute) => {
                if let Some(i) = find_instance(&instances, &compute.node_security_group) {
                    line.state = i.state.as_str().to_string();
                    line.address = i.dns_name.clone();
                }
            }
            NodeKind::Database(db) => {
                if let Some(d) = find_database(&databases, &db.identifier) {
                    line.state = d.status.as_str().to_string();
                    line.address = d.endpoint.clone();
                }
            }
            NodeKind::LoadBalancer(lb) => {
                if let Some(b) = balancers.iter().find(|b| b.name == lb.balancer_name) {
                    line.state = "running".to_string();
                    line.address = Some(b.dns_name.clone());
                    line.members = provider
                        .describe_instance_health(&lb.balancer_name)
                        .await?
                        .into_iter()
                        .map(|h| (h.instance_id, h.state))
                        .collect();
                }
            }
        }
        lines.push(line);
    }
    Ok(lines)
}
