use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rigger_config::{build_assets_bundle, ConfigRoot, ASSETS_BUNDLE_NAME};
use rigger_domain::Cloud;
use rigger_provider::{AssetStore, InstanceState, Provider};
use rigger_remote::{
    targets_for, Bootstrapper, ConsoleSink, OpenSshTransport, OutputSink, SessionOptions,
    SinkRouter, Transport,
};
use tracing::{info, warn};

use crate::attach;
use crate::error::ConvergeError;
use crate::lifecycle::{self, find_instance};
use crate::report::{Change, ConvergeReport};
use crate::security;
use crate::status::{self, StatusLine};

/// Tunables for one controller.
#[derive(Debug, Clone)]
pub struct ConvergeOptions {
    /// Delay between describe calls while waiting on resources.
    pub poll_interval:   Duration,
    /// Lifetime of the presigned asset and descriptor URLs.
    pub presign_expiry:  Duration,
    pub session:         SessionOptions,
}

impl Default for ConvergeOptions {
    fn default() -> Self {
        Self {
            poll_interval:  Duration::from_secs(5),
            presign_expiry: Duration::from_secs(600),
            session:        SessionOptions::default(),
        }
    }
}

/// Drives one cloud towards its declared topology.
pub struct CloudController {
    provider:     Arc<dyn Provider>,
    assets:       Arc<dyn AssetStore>,
    transport:    Arc<dyn Transport>,
    console:      Arc<dyn OutputSink>,
    bootstrapper: Bootstrapper,
    options:      ConvergeOptions,
}

impl CloudController {
    pub fn new(provider: Arc<dyn Provider>, assets: Arc<dyn AssetStore>) -> Self {
        Self {
            provider,
            assets,
            transport: Arc::new(OpenSshTransport::new(std::env::temp_dir().join("rigger-ssh"))),
            console: Arc::new(ConsoleSink),
            bootstrapper: Bootstrapper::default(),
            options: ConvergeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConvergeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_console(mut self, console: Arc<dyn OutputSink>) -> Self {
        self.console = console;
        self
    }

    fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    // ── start / update / shutdown ─────────────────────────────────────────────

    /// Bring every node up: groups first, then databases, compute nodes and
    /// load balancers, then elastic IPs and volumes.
    pub async fn start(&self, cloud: &mut Cloud) -> ConvergeReport {
        let mut report = ConvergeReport::new(cloud.name(), "start");
        self.converge(cloud, &mut report).await;
        info!(
            cloud = %cloud.name(),
            run_id = %report.run_id,
            "Start complete: {} changes, {} errors",
            report.changes.len(),
            report.errors.len()
        );
        report
    }

    /// Same as [`start`](Self::start). Availability zones of existing load
    /// balancers are not reconciled.
    pub async fn update(&self, cloud: &mut Cloud) -> ConvergeReport {
        let mut report = ConvergeReport::new(cloud.name(), "update");
        self.converge(cloud, &mut report).await;
        if cloud.has_load_balancer_nodes() {
            warn!(
                cloud = %cloud.name(),
                "Load balancer availability zones are not updated; recreate the balancer to change them"
            );
        }
        info!(cloud = %cloud.name(), "Update complete: {} changes", report.changes.len());
        report
    }

    async fn converge(&self, cloud: &mut Cloud, report: &mut ConvergeReport) {
        let provider = self.provider();
        let poll = self.options.poll_interval;

        if cloud.has_database_nodes() {
            security::ensure_db_parameter_groups(provider, cloud, report).await;
        }
        if cloud.has_compute_nodes() {
            security::ensure_security_groups(provider, cloud, report).await;
        }
        if cloud.has_database_nodes() {
            security::ensure_db_security_groups(provider, cloud, report).await;
            if let Err(e) = lifecycle::ensure_database_nodes(provider, cloud, poll, report).await {
                report.fail("databases", &e);
            }
        }
        if cloud.has_compute_nodes() {
            if let Err(e) = lifecycle::ensure_compute_nodes(provider, cloud, poll, report).await {
                report.fail("compute nodes", &e);
            }
        }
        if cloud.has_load_balancer_nodes() {
            if let Err(e) = lifecycle::ensure_load_balancer_nodes(provider, cloud, report).await {
                report.fail("load balancers", &e);
            }
        }
        if cloud.has_compute_nodes() {
            attach::ensure_elastic_addresses(provider, cloud, poll, report).await;
            attach::ensure_volumes(provider, cloud, poll, report).await;
        }
    }

    /// Tear down load balancers, then compute nodes, then databases.
    pub async fn shutdown(&self, cloud: &mut Cloud) -> ConvergeReport {
        let provider = self.provider();
        let poll = self.options.poll_interval;
        let mut report = ConvergeReport::new(cloud.name(), "shutdown");

        if cloud.has_load_balancer_nodes() {
            if let Err(e) = lifecycle::shutdown_load_balancer_nodes(provider, cloud, &mut report).await {
                report.fail("load balancers", &e);
            }
        }
        if cloud.has_compute_nodes() {
            if let Err(e) = lifecycle::shutdown_compute_nodes(provider, cloud, poll, &mut report).await {
                report.fail("compute nodes", &e);
            }
        }
        if cloud.has_database_nodes() {
            if let Err(e) = lifecycle::shutdown_database_nodes(provider, cloud, poll, &mut report).await {
                report.fail("databases", &e);
            }
        }
        info!(cloud = %cloud.name(), "Shutdown complete: {} changes", report.changes.len());
        report
    }

    pub async fn reboot_database(
        &self,
        cloud: &mut Cloud,
        node: &str,
    ) -> Result<ConvergeReport, ConvergeError> {
        let mut report = ConvergeReport::new(cloud.name(), "reboot");
        lifecycle::reboot_database(self.provider(), cloud, node, self.options.poll_interval, &mut report)
            .await?;
        Ok(report)
    }

    pub async fn status(&self, cloud: &Cloud) -> Result<Vec<StatusLine>, ConvergeError> {
        Ok(status::cloud_status(self.provider(), cloud).await?)
    }

    // ── configure ─────────────────────────────────────────────────────────────

    /// Record the current hostname and IP of every compute node. Nodes
    /// without a running instance lose theirs.
    pub async fn resolve_hostnames(&self, cloud: &mut Cloud) -> Result<(), ConvergeError> {
        let instances = self.provider().describe_instances().await?;
        let resolved: Vec<(String, Option<String>, Option<String>)> = cloud
            .compute_nodes()
            .map(|(node, compute)| {
                let running = find_instance(&instances, &compute.node_security_group)
                    .filter(|i| i.state == InstanceState::Running);
                (
                    node.name.clone(),
                    running.and_then(|i| i.dns_name.clone()),
                    running.and_then(|i| i.public_ip.clone().or_else(|| i.private_ip.clone())),
                )
            })
            .collect();
        for (node, hostname, ip) in resolved {
            cloud.set_hostname(&node, hostname);
            cloud.set_ip_address(&node, ip);
        }
        Ok(())
    }

    /// Publish the assets bundle and one descriptor per compute node, then
    /// bootstrap and run chef-solo on every compute node.
    pub async fn configure(
        &self,
        cloud: &mut Cloud,
        root: &ConfigRoot,
    ) -> Result<ConvergeReport, ConvergeError> {
        let mut report = ConvergeReport::new(cloud.name(), "configure");
        if !cloud.has_compute_nodes() {
            info!(cloud = %cloud.name(), "No configurable nodes");
            return Ok(report);
        }

        self.resolve_hostnames(cloud).await?;
        let targets = targets_for(cloud, None)?;

        let bucket = cloud.account.asset_bucket.clone();
        let expiry = self.options.presign_expiry.as_secs();
        if self.assets.ensure_bucket(&bucket).await? {
            report.record(Change::BucketCreated { bucket: bucket.clone() });
        }

        let mut descriptor_urls = BTreeMap::new();
        for (node, compute) in cloud.compute_nodes() {
            let body = serde_json::to_vec_pretty(&compute.descriptor()).map_err(|e| {
                ConvergeError::Descriptor { node: node.name.clone(), source: e }
            })?;
            let key = compute.descriptor_filename.as_str();
            self.assets.put_object(&bucket, key, body, "application/json").await?;
            report.record(Change::ObjectPublished { bucket: bucket.clone(), key: key.to_string() });
            descriptor_urls.insert(node.name.clone(), self.assets.presigned_url(&bucket, key, expiry)?);
        }

        let bundle = build_assets_bundle(&root.cookbooks_dir(), &root.roles_dir())?;
        info!(bucket = %bucket, bytes = bundle.len(), "Publishing {}", ASSETS_BUNDLE_NAME);
        self.assets
            .put_object(&bucket, ASSETS_BUNDLE_NAME, bundle, "application/x-gzip")
            .await?;
        report.record(Change::ObjectPublished {
            bucket: bucket.clone(),
            key:    ASSETS_BUNDLE_NAME.to_string(),
        });
        let assets_url = self.assets.presigned_url(&bucket, ASSETS_BUNDLE_NAME, expiry)?;

        let log_dir = root.create_cloud_log_dir(cloud.name())?;
        let nodes: Vec<String> = targets.iter().map(|t| t.node.clone()).collect();
        let router = SinkRouter::new(self.console.clone())
            .with_node_logs(&log_dir, nodes.iter().map(String::as_str))?;

        let outputs = self
            .bootstrapper
            .converge(
                self.transport.clone(),
                targets,
                Arc::new(router),
                &self.options.session,
                &assets_url,
                &descriptor_urls,
            )
            .await?;
        for out in &outputs {
            if let Some(code) = out.exit_code.filter(|c| *c != 0) {
                report.errors.push(format!("{}: chef-solo exited with {}", out.node, code));
            }
        }
        report.record(Change::NodesConfigured { nodes });
        info!(cloud = %cloud.name(), "Configure complete");
        Ok(report)
    }
}
