//! Security groups for compute nodes, plus the parameter and security groups
//! each database node needs before it can be created.
//!
//! Every ensure call reads the provider's current view first and mutates only
//! what is missing.

use rigger_domain::{Cloud, DbParameter};
use rigger_provider::{IngressRule, Provider, ProviderError, MAX_PARAMETERS_PER_MODIFY};
use tracing::{debug, info};

use crate::report::{Change, ConvergeReport};

pub const ANYWHERE: &str = "0.0.0.0/0";
pub const SSH_PORT: i32 = 22;

// ── EC2 groups ────────────────────────────────────────────────────────────────

pub async fn ensure_group(
    provider: &dyn Provider,
    name: &str,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    match provider.describe_security_group(name).await {
        Ok(_) => {
            debug!(group = %name, "security group exists");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            info!(group = %name, "Creating security group {}", name);
            provider.create_security_group(name, name).await?;
            report.record(Change::SecurityGroupCreated { group: name.to_string() });
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Authorize `protocol from..to` from `cidr` unless the exact rule is present.
/// Returns true when a rule was added.
pub async fn ensure_ingress_by_cidr(
    provider: &dyn Provider,
    group: &str,
    from_port: i32,
    to_port: i32,
    protocol: &str,
    cidr: &str,
    report: &mut ConvergeReport,
) -> Result<bool, ProviderError> {
    let current = provider.describe_security_group(group).await?;
    if current.has_cidr_rule(protocol, from_port, to_port, cidr) {
        debug!(group = %group, protocol, from_port, to_port, cidr, "ingress already authorized");
        return Ok(false);
    }
    info!(
        group = %group,
        "Authorizing {} {}-{} from {} on {}",
        protocol, from_port, to_port, cidr, group
    );
    let rule = IngressRule::Cidr {
        protocol: protocol.to_string(),
        from_port,
        to_port,
        cidr: cidr.to_string(),
    };
    provider.authorize_ingress(group, &rule).await?;
    report.record(Change::IngressAuthorized {
        group: group.to_string(),
        rule:  format!("{} {}-{} from {}", protocol, from_port, to_port, cidr),
    });
    Ok(true)
}

/// Grant `peer_group` (owned by `peer_owner`) access to `group` unless it
/// already has it. Returns true when a grant was added.
pub async fn ensure_ingress_by_group(
    provider: &dyn Provider,
    group: &str,
    peer_group: &str,
    peer_owner: &str,
    report: &mut ConvergeReport,
) -> Result<bool, ProviderError> {
    let current = provider.describe_security_group(group).await?;
    if current.has_group_rule(peer_group, peer_owner) {
        debug!(group = %group, peer = %peer_group, "group grant already authorized");
        return Ok(false);
    }
    info!(group = %group, peer = %peer_group, "Authorizing group {} on {}", peer_group, group);
    let rule = IngressRule::Group {
        peer_group: peer_group.to_string(),
        peer_owner: peer_owner.to_string(),
    };
    provider.authorize_ingress(group, &rule).await?;
    report.record(Change::IngressAuthorized {
        group: group.to_string(),
        rule:  format!("group {}", peer_group),
    });
    Ok(true)
}

/// The default group, one group per role and one per compute node.
/// A failing group is reported and the rest still run.
pub async fn ensure_security_groups(
    provider: &dyn Provider,
    cloud: &Cloud,
    report: &mut ConvergeReport,
) {
    let default_group = cloud.default_security_group();
    let owner = cloud.account.account_id.as_str();
    if let Err(e) = ensure_default_group(provider, &default_group, owner, report).await {
        report.fail(&default_group, &e);
    }

    for role in cloud.roles() {
        let group = rigger_domain::naming::role_security_group(cloud.name(), &role.name);
        if let Err(e) = ensure_role_group(provider, &group, &role.public_ports, report).await {
            report.fail(&group, &e);
        }
    }

    for (node, compute) in cloud.compute_nodes() {
        if let Err(e) = ensure_group(provider, &compute.node_security_group, report).await {
            report.fail(&node.name, &e);
        }
    }
}

async fn ensure_default_group(
    provider: &dyn Provider,
    group: &str,
    owner: &str,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    ensure_group(provider, group, report).await?;
    ensure_ingress_by_cidr(provider, group, SSH_PORT, SSH_PORT, "tcp", ANYWHERE, report).await?;
    ensure_ingress_by_group(provider, group, group, owner, report).await?;
    Ok(())
}

async fn ensure_role_group(
    provider: &dyn Provider,
    group: &str,
    ports: &[u16],
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    ensure_group(provider, group, report).await?;
    for port in ports {
        let port = i32::from(*port);
        ensure_ingress_by_cidr(provider, group, port, port, "tcp", ANYWHERE, report).await?;
    }
    Ok(())
}

// ── Database groups ───────────────────────────────────────────────────────────

/// RDS parameter group family for an engine name.
pub fn parameter_group_family(engine: &str) -> String {
    engine.to_lowercase()
}

/// Create the parameter group when it doesn't exist, then apply every declared
/// parameter whose value differs, at most [`MAX_PARAMETERS_PER_MODIFY`] per call.
pub async fn ensure_db_parameter_group(
    provider: &dyn Provider,
    name: &str,
    engine: &str,
    parameters: &[DbParameter],
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let current = match provider.describe_db_parameter_group(name).await {
        Ok(_) => provider.describe_db_parameters(name).await?,
        Err(e) if e.is_not_found() => {
            let family = parameter_group_family(engine);
            info!(group = %name, family = %family, "Creating DB parameter group {}", name);
            provider
                .create_db_parameter_group(name, &family, &format!("{} parameters", name))
                .await?;
            report.record(Change::DbParameterGroupCreated { group: name.to_string() });
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let pending: Vec<DbParameter> = parameters
        .iter()
        .filter(|p| !current.iter().any(|c| c.name == p.name && c.value == p.value))
        .cloned()
        .collect();
    if pending.is_empty() {
        debug!(group = %name, "db parameters up to date");
        return Ok(());
    }
    for chunk in pending.chunks(MAX_PARAMETERS_PER_MODIFY) {
        info!(group = %name, count = chunk.len(), "Applying DB parameters to {}", name);
        provider.modify_db_parameter_group(name, chunk).await?;
        report.record(Change::DbParametersApplied { group: name.to_string(), count: chunk.len() });
    }
    Ok(())
}

/// Create the DB security group when missing. When it has no EC2 grants yet and
/// `grant` is set, authorize that EC2 group (with its owner).
pub async fn ensure_db_security_group(
    provider: &dyn Provider,
    name: &str,
    grant: Option<(&str, &str)>,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let current = match provider.describe_db_security_group(name).await {
        Ok(group) => Some(group),
        Err(e) if e.is_not_found() => {
            info!(group = %name, "Creating DB security group {}", name);
            provider.create_db_security_group(name, name).await?;
            report.record(Change::DbSecurityGroupCreated { group: name.to_string() });
            None
        }
        Err(e) => return Err(e),
    };

    let has_grants = current.map(|g| !g.ec2_groups.is_empty()).unwrap_or(false);
    match grant {
        Some((ec2_group, owner)) if !has_grants => {
            info!(group = %name, ec2_group = %ec2_group, "Authorizing {} on DB security group {}", ec2_group, name);
            provider.authorize_db_security_group(name, ec2_group, owner).await?;
            report.record(Change::DbSecurityGroupAuthorized {
                group:     name.to_string(),
                ec2_group: ec2_group.to_string(),
            });
        }
        _ => debug!(group = %name, "db security group grants unchanged"),
    }
    Ok(())
}

/// Parameter groups for every database node that declares parameters.
pub async fn ensure_db_parameter_groups(
    provider: &dyn Provider,
    cloud: &Cloud,
    report: &mut ConvergeReport,
) {
    for (node, db) in cloud.database_nodes() {
        let Some(group) = db.parameter_group_name.as_deref() else { continue };
        if let Err(e) =
            ensure_db_parameter_group(provider, group, &db.engine, &db.parameters, report).await
        {
            report.fail(&node.name, &e);
        }
    }
}

/// DB security groups for every database node. The default EC2 group is only
/// granted access when the cloud has compute nodes.
pub async fn ensure_db_security_groups(
    provider: &dyn Provider,
    cloud: &Cloud,
    report: &mut ConvergeReport,
) {
    let default_group = cloud.default_security_group();
    let grant = cloud
        .has_compute_nodes()
        .then(|| (default_group.as_str(), cloud.account.account_id.as_str()));
    for (node, db) in cloud.database_nodes() {
        if let Err(e) = ensure_db_security_group(provider, &db.security_group_name, grant, report).await {
            report.fail(&node.name, &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigger_provider::{MemoryProvider, Mutation};

    fn report() -> ConvergeReport {
        ConvergeReport::new("prod", "test")
    }

    #[test]
    fn engine_maps_to_parameter_group_family() {
        assert_eq!(parameter_group_family("MySQL5.1"), "mysql5.1");
    }

    #[tokio::test]
    async fn cidr_rule_is_authorized_once() {
        let provider = MemoryProvider::default();
        let mut report = report();
        ensure_group(&provider, "prod.role.web", &mut report).await.unwrap();

        let first = ensure_ingress_by_cidr(&provider, "prod.role.web", 80, 80, "tcp", ANYWHERE, &mut report)
            .await
            .unwrap();
        let second = ensure_ingress_by_cidr(&provider, "prod.role.web", 80, 80, "tcp", ANYWHERE, &mut report)
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        let authorizations = provider
            .mutations()
            .await
            .into_iter()
            .filter(|m| matches!(m, Mutation::AuthorizeIngress { .. }))
            .count();
        assert_eq!(authorizations, 1);
    }

    #[tokio::test]
    async fn group_grant_ignores_account_separators() {
        let provider = MemoryProvider::new("1234-5678-9012");
        let mut report = report();
        ensure_group(&provider, "prod.role.default", &mut report).await.unwrap();

        assert!(ensure_ingress_by_group(&provider, "prod.role.default", "prod.role.default", "1234-5678-9012", &mut report)
            .await
            .unwrap());
        assert!(!ensure_ingress_by_group(&provider, "prod.role.default", "prod.role.default", "123456789012", &mut report)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn existing_group_is_not_recreated() {
        let provider = MemoryProvider::default();
        let mut report = report();
        ensure_group(&provider, "prod.node.web-1", &mut report).await.unwrap();
        provider.clear_mutations().await;

        ensure_group(&provider, "prod.node.web-1", &mut report).await.unwrap();
        assert_eq!(provider.mutation_count().await, 0);
        assert_eq!(report.creates(), 1);
    }

    #[tokio::test]
    async fn describe_failures_other_than_not_found_surface() {
        let provider = MemoryProvider::default();
        provider.fail_on("describe_security_group", "RequestLimitExceeded").await;
        let err = ensure_group(&provider, "prod.node.web-1", &mut report()).await.unwrap_err();
        assert_eq!(err.code(), Some("RequestLimitExceeded"));
        assert_eq!(provider.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn parameters_are_applied_in_slices_of_twenty() {
        let provider = MemoryProvider::default();
        let params: Vec<DbParameter> = (0..45)
            .map(|i| DbParameter { name: format!("param_{}", i), value: i.to_string() })
            .collect();
        let mut report = report();
        ensure_db_parameter_group(&provider, "prod-db-dbparams", "MySQL5.1", &params, &mut report)
            .await
            .unwrap();

        let counts: Vec<usize> = provider
            .mutations()
            .await
            .into_iter()
            .filter_map(|m| match m {
                Mutation::ModifyDbParameterGroup { count, .. } => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![20, 20, 5]);
        assert_eq!(provider.parameters("prod-db-dbparams").await.len(), 45);

        provider.clear_mutations().await;
        ensure_db_parameter_group(&provider, "prod-db-dbparams", "MySQL5.1", &params, &mut report)
            .await
            .unwrap();
        assert_eq!(provider.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn changed_parameter_is_reapplied_alone() {
        let provider = MemoryProvider::default();
        let mut params = vec![
            DbParameter { name: "max_connections".into(), value: "100".into() },
            DbParameter { name: "wait_timeout".into(), value: "30".into() },
        ];
        let mut report = report();
        ensure_db_parameter_group(&provider, "g", "MySQL5.1", &params, &mut report).await.unwrap();
        provider.clear_mutations().await;

        params[0].value = "500".into();
        ensure_db_parameter_group(&provider, "g", "MySQL5.1", &params, &mut report).await.unwrap();
        assert_eq!(
            provider.mutations().await,
            vec![Mutation::ModifyDbParameterGroup { group: "g".into(), count: 1 }]
        );
    }

    #[tokio::test]
    async fn db_security_group_grant_only_when_requested() {
        let provider = MemoryProvider::default();
        let mut report = report();
        ensure_db_security_group(&provider, "prod-db-security-group", None, &mut report)
            .await
            .unwrap();
        assert_eq!(
            provider.mutations().await,
            vec![Mutation::CreateDbSecurityGroup("prod-db-security-group".into())]
        );

        provider.clear_mutations().await;
        let grant = Some(("prod.role.default", "000000000000"));
        ensure_db_security_group(&provider, "prod-db-security-group", grant, &mut report)
            .await
            .unwrap();
        ensure_db_security_group(&provider, "prod-db-security-group", grant, &mut report)
            .await
            .unwrap();
        assert_eq!(
            provider.mutations().await,
            vec![Mutation::AuthorizeDbSecurityGroup {
                group:     "prod-db-security-group".into(),
                ec2_group: "prod.role.default".into(),
            }]
        );
    }
}
