//! Elastic addresses and EBS volumes that follow a compute node to whatever
//! instance currently backs it.

use std::time::Duration;

use rigger_domain::Cloud;
use rigger_provider::{InstanceState, Provider, ProviderError};
use tracing::{debug, info};

use crate::lifecycle::find_instance;
use crate::report::{Change, ConvergeReport};

/// The running instance behind `node`, if any.
async fn running_instance(
    provider: &dyn Provider,
    node_group: &str,
) -> Result<Option<String>, ProviderError> {
    let instances = provider.describe_instances().await?;
    Ok(find_instance(&instances, node_group)
        .filter(|i| i.state == InstanceState::Running)
        .map(|i| i.instance_id.clone()))
}

// ── Elastic addresses ─────────────────────────────────────────────────────────

/// Associate the node's elastic IP with its instance, moving it off any other
/// instance first. Nodes without an elastic IP are left alone.
pub async fn ensure_elastic_address(
    provider: &dyn Provider,
    cloud: &mut Cloud,
    node: &str,
    poll: Duration,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let Some(compute) = cloud.node(node).and_then(|n| n.as_compute()) else { return Ok(()) };
    let Some(public_ip) = compute.elastic_ip.clone() else { return Ok(()) };
    let node_group = compute.node_security_group.clone();

    let Some(instance_id) = running_instance(provider, &node_group).await? else {
        report.fail(node, &format!("node is not running; cannot associate {}", public_ip));
        return Ok(());
    };

    let address = provider.describe_address(&public_ip).await?;
    match address.instance_id.as_deref() {
        Some(current) if current == instance_id => {
            debug!(node = %node, ip = %public_ip, "elastic ip already associated");
            cloud.set_ip_address(node, Some(public_ip));
            return Ok(());
        }
        Some(other) => {
            let other = other.to_string();
            info!(node = %node, ip = %public_ip, from = %other, "Disassociating {} from {}", public_ip, other);
            provider.disassociate_address(&public_ip).await?;
            report.record(Change::AddressDisassociated {
                public_ip:   public_ip.clone(),
                instance_id: other,
            });
            while provider.describe_address(&public_ip).await?.instance_id.is_some() {
                info!(ip = %public_ip, "Waiting for {} to be released...", public_ip);
                tokio::time::sleep(poll).await;
            }
        }
        None => {}
    }

    info!(node = %node, ip = %public_ip, "Associating {} with node {}", public_ip, node);
    provider.associate_address(&public_ip, &instance_id).await?;
    report.record(Change::AddressAssociated { node: node.to_string(), public_ip: public_ip.clone() });
    while provider.describe_address(&public_ip).await?.instance_id.as_deref() != Some(instance_id.as_str()) {
        info!(node = %node, ip = %public_ip, "Waiting for {} to associate...", public_ip);
        tokio::time::sleep(poll).await;
    }
    cloud.set_ip_address(node, Some(public_ip));
    Ok(())
}

// ── Volumes ───────────────────────────────────────────────────────────────────

/// Attach the node's volume to its instance at the declared device, detaching
/// it from any other instance first. Nodes without a volume are left alone.
pub async fn ensure_volume(
    provider: &dyn Provider,
    cloud: &Cloud,
    node: &str,
    poll: Duration,
    report: &mut ConvergeReport,
) -> Result<(), ProviderError> {
    let Some(compute) = cloud.node(node).and_then(|n| n.as_compute()) else { return Ok(()) };
    let Some((volume_id, device)) = compute.volume() else { return Ok(()) };

    let Some(instance_id) = running_instance(provider, &compute.node_security_group).await? else {
        report.fail(node, &format!("node is not running; cannot attach {}", volume_id));
        return Ok(());
    };

    let volume = provider.describe_volume(volume_id).await?;
    match volume.attachment {
        Some(a) if a.instance_id == instance_id && a.state != "detaching" => {
            debug!(node = %node, volume = %volume_id, "volume already attached");
            return Ok(());
        }
        Some(a) => {
            if a.state != "detaching" {
                info!(node = %node, volume = %volume_id, from = %a.instance_id, "Detaching {} from {}", volume_id, a.instance_id);
                provider.detach_volume(volume_id).await?;
                report.record(Change::VolumeDetached {
                    volume_id:   volume_id.to_string(),
                    instance_id: a.instance_id.clone(),
                });
            }
            while provider.describe_volume(volume_id).await?.attachment.is_some() {
                info!(volume = %volume_id, "Waiting for {} to detach...", volume_id);
                tokio::time::sleep(poll).await;
            }
        }
        None => {}
    }

    info!(node = %node, volume = %volume_id, device = %device, "Attaching {} to node {} at {}", volume_id, node, device);
    provider.attach_volume(volume_id, &instance_id, device).await?;
    report.record(Change::VolumeAttached { node: node.to_string(), volume_id: volume_id.to_string() });
    loop {
        let attached = provider
            .describe_volume(volume_id)
            .await?
            .attachment
            .map(|a| a.instance_id == instance_id && a.state == "attached")
            .unwrap_or(false);
        if attached {
            return Ok(());
        }
        info!(node = %node, volume = %volume_id, "Waiting for {} to attach...", volume_id);
        tokio::time::sleep(poll).await;
    }
}

/// Every compute node's elastic IP. Failures are reported per node.
pub async fn ensure_elastic_addresses(
    provider: &dyn Provider,
    cloud: &mut Cloud,
    poll: Duration,
    report: &mut ConvergeReport,
) {
    let nodes: Vec<String> = cloud
        .compute_nodes()
        .filter(|(_, c)| c.elastic_ip.is_some())
        .map(|(n, _)| n.name.clone())
        .collect();
    for node in nodes {
        if let Err(e) = ensure_elastic_address(provider, cloud, &node, poll, report).await {
            report.fail(&node, &e);
        }
    }
}

/// Every compute node's volume. Failures are reported per node.
pub async fn ensure_volumes(
    provider: &dyn Provider,
    cloud: &Cloud,
    poll: Duration,
    report: &mut ConvergeReport,
) {
    for (node, compute) in cloud.compute_nodes() {
        if compute.volume().is_none() {
            continue;
        }
        if let Err(e) = ensure_volume(provider, cloud, &node.name, poll, report).await {
            report.fail(&node.name, &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigger_domain::{Account, CloudBuilder, ComputeSpec};
    use rigger_provider::{MemoryProvider, Mutation};

    const POLL: Duration = Duration::from_millis(1);

    fn cloud() -> Cloud {
        let mut b = CloudBuilder::new("prod", Account::default()).unwrap();
        b.compute(
            "web-1",
            ComputeSpec {
                elastic_ip: Some("203.0.113.10".into()),
                volume_id:  Some("vol-1".into()),
                device:     Some("/dev/sdh".into()),
                ..Default::default()
            },
        )
        .unwrap();
        b.build()
    }

    fn report() -> ConvergeReport {
        ConvergeReport::new("prod", "test")
    }

    #[tokio::test]
    async fn address_moves_from_old_instance() {
        let provider = MemoryProvider::default();
        let old = provider.seed_instance(&["prod.node.old"], InstanceState::Running).await;
        let new = provider.seed_instance(&["prod.node.web-1"], InstanceState::Running).await;
        provider.seed_address("203.0.113.10", Some(&old)).await;
        let mut cloud = cloud();

        ensure_elastic_address(&provider, &mut cloud, "web-1", POLL, &mut report()).await.unwrap();
        assert_eq!(
            provider.mutations().await,
            vec![
                Mutation::DisassociateAddress("203.0.113.10".into()),
                Mutation::AssociateAddress { public_ip: "203.0.113.10".into(), instance_id: new },
            ]
        );
        assert_eq!(cloud.node("web-1").unwrap().ip_address.as_deref(), Some("203.0.113.10"));

        provider.clear_mutations().await;
        ensure_elastic_address(&provider, &mut cloud, "web-1", POLL, &mut report()).await.unwrap();
        assert_eq!(provider.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn volume_moves_from_old_instance() {
        let provider = MemoryProvider::default();
        let old = provider.seed_instance(&["prod.node.old"], InstanceState::Running).await;
        let new = provider.seed_instance(&["prod.node.web-1"], InstanceState::Running).await;
        provider.seed_volume("vol-1", Some((&old, "/dev/sdh"))).await;
        let cloud = cloud();

        ensure_volume(&provider, &cloud, "web-1", POLL, &mut report()).await.unwrap();
        assert_eq!(
            provider.mutations().await,
            vec![
                Mutation::DetachVolume("vol-1".into()),
                Mutation::AttachVolume { volume_id: "vol-1".into(), instance_id: new },
            ]
        );

        provider.clear_mutations().await;
        ensure_volume(&provider, &cloud, "web-1", POLL, &mut report()).await.unwrap();
        assert_eq!(provider.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn unallocated_address_is_a_failure() {
        let provider = MemoryProvider::default();
        provider.seed_instance(&["prod.node.web-1"], InstanceState::Running).await;
        let mut cloud = cloud();

        let err = ensure_elastic_address(&provider, &mut cloud, "web-1", POLL, &mut report())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn stopped_node_is_skipped() {
        let provider = MemoryProvider::default();
        provider.seed_volume("vol-1", None).await;
        let cloud = cloud();
        let mut report = report();

        ensure_volumes(&provider, &cloud, POLL, &mut report).await;
        assert_eq!(provider.mutation_count().await, 0);
        assert_eq!(report.errors.len(), 1);
    }
}
