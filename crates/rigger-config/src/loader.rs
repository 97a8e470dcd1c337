use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rigger_domain::{
    Account, Cloud, CloudBuilder, ComputeSpec, DatabaseSpec, DbParameter, HealthCheck, Listener,
    LoadBalancerSpec,
};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawCloud, RawCompute, RawDatabase, RawLoadBalancer, RawNode};

/// Load every cloud declared under `dir`.
///
/// Expected directory layout:
/// ```text
/// <dir>/
///   production.yml      <- RawCloud
///   staging.yaml        <- RawCloud
/// ```
///
/// Files are read in name order. Other entries are ignored. Two files that
/// declare the same cloud name are an error.
pub fn load_clouds(dir: &Path) -> Result<Vec<Cloud>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    files.sort();

    let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut clouds = Vec::with_capacity(files.len());
    for path in files {
        let cloud = load_cloud(&path)?;
        if let Some(first) = seen.get(cloud.name()) {
            return Err(ConfigError::DuplicateCloud {
                name: cloud.name().to_string(),
                first: first.display().to_string(),
                second: path.display().to_string(),
            });
        }
        seen.insert(cloud.name().to_string(), path);
        clouds.push(cloud);
    }

    Ok(clouds)
}

/// Load a single cloud file.
pub fn load_cloud(path: &Path) -> Result<Cloud, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!("Loading cloud from {}", path.display());
    parse_cloud(&content, path)
}

/// Parse cloud YAML. `path` is only used for error messages.
pub fn parse_cloud(content: &str, path: &Path) -> Result<Cloud, ConfigError> {
    let raw: RawCloud = serde_yaml::from_str(content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    convert_cloud(raw, path)
}

fn convert_cloud(raw: RawCloud, path: &Path) -> Result<Cloud, ConfigError> {
    let domain = |source| ConfigError::Domain {
        path: path.display().to_string(),
        source,
    };

    let account = Account {
        account_id:   raw.account.account_id,
        access_key:   raw.account.access_key,
        secret_key:   raw.account.secret_key,
        region:       raw.account.region,
        keypair_name: raw.account.keypair_name,
        keypair_file: raw.account.keypair_file,
        asset_bucket: raw.account.asset_bucket,
    };

    let mut builder = CloudBuilder::new(raw.name, account).map_err(domain)?;
    for role in raw.roles {
        builder.role(&role.name, role.public_ports).map_err(domain)?;
    }
    for node in raw.nodes {
        match node {
            RawNode::Ec2(c) => {
                let name = c.name.clone();
                builder.compute(&name, convert_compute(c)).map_err(domain)?;
            }
            RawNode::Elb(lb) => {
                let name = lb.name.clone();
                builder.load_balancer(&name, convert_load_balancer(lb)).map_err(domain)?;
            }
            RawNode::Rds(db) => {
                let name = db.name.clone();
                builder.database(&name, convert_database(db)).map_err(domain)?;
            }
        }
    }

    Ok(builder.build())
}

fn convert_compute(raw: RawCompute) -> ComputeSpec {
    ComputeSpec {
        image_id:      raw.ami,
        instance_type: raw.instance_type,
        zone:          raw.availability_zone,
        ssh_user:      raw.ssh_user,
        elastic_ip:    raw.elastic_ip,
        volume_id:     raw.volume_id,
        device:        raw.device,
        roles:         raw.roles,
        attributes:    raw.attributes,
    }
}

fn convert_load_balancer(raw: RawLoadBalancer) -> LoadBalancerSpec {
    LoadBalancerSpec {
        listeners: raw
            .listeners
            .into_iter()
            .map(|l| Listener {
                load_balancer_port: l.load_balancer_port,
                instance_port:      l.instance_port,
                protocol:           l.protocol,
            })
            .collect(),
        health_check: raw.health_check.map(|h| HealthCheck {
            target:              h.target,
            timeout:             h.timeout,
            interval:            h.interval,
            unhealthy_threshold: h.unhealthy_threshold,
            healthy_threshold:   h.healthy_threshold,
        }),
        members: raw.ec2_nodes,
        zones:   raw.availability_zones,
    }
}

fn convert_database(raw: RawDatabase) -> DatabaseSpec {
    DatabaseSpec {
        engine:             raw.engine,
        instance_class:     raw.db_instance_class,
        master_username:    raw.master_username,
        master_password:    raw.master_user_password,
        port:               raw.port,
        allocated_storage:  raw.allocated_storage,
        zone:               raw.availability_zone,
        maintenance_window: raw.preferred_maintenance_window,
        backup_window:      raw.preferred_backup_window,
        backup_retention:   raw.backup_retention_period,
        parameters: raw
            .db_parameters
            .into_iter()
            .map(|p| DbParameter { name: p.name, value: p.value.to_string() })
            .collect(),
    }
}
