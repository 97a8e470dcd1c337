use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::RemoteError;
use crate::os::OsCatalog;
use crate::session::{NodeOutput, Session, SessionOptions};
use crate::sink::SinkRouter;
use crate::transport::{Target, Transport};

pub const VERSION_PROBE: &str = "chef-solo --version";
pub const DEFAULT_VERSION_MARKER: &str = "Chef: 0.8";
pub const SOLO_CONFIG_PATH: &str = "/tmp/chef-solo.rb";
pub const SOLO_DIR: &str = "/tmp/chef-solo";

/// Result of probing every node for chef-solo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCheck {
    pub all_installed: bool,
    /// Nodes that didn't report the expected version, in session order.
    pub missing:       Vec<String>,
}

/// Writes `/tmp/chef-solo.rb` from scratch.
pub fn solo_config_commands() -> Vec<String> {
    vec![
        format!("sudo rm {}", SOLO_CONFIG_PATH),
        format!("sudo mkdir -p {}", SOLO_DIR),
        format!("sudo mkdir -p {}/cookbooks", SOLO_DIR),
        format!("sudo mkdir -p {}/roles", SOLO_DIR),
        format!("sudo sh -c 'echo file_cache_path \\\"{}\\\" >> {}'", SOLO_DIR, SOLO_CONFIG_PATH),
        format!(
            "sudo sh -c 'echo cookbook_path \\\"{}/cookbooks\\\" >> {}'",
            SOLO_DIR, SOLO_CONFIG_PATH
        ),
        format!("sudo sh -c 'echo role_path \\\"{}/roles\\\" >> {}'", SOLO_DIR, SOLO_CONFIG_PATH),
    ]
}

/// Empties the cookbook and role directories before a run.
pub fn cleanup_commands() -> Vec<String> {
    vec![
        format!("sudo rm -rf {}/cookbooks", SOLO_DIR),
        format!("sudo rm -rf {}/roles", SOLO_DIR),
        format!("sudo mkdir -p {}/cookbooks", SOLO_DIR),
        format!("sudo mkdir -p {}/roles", SOLO_DIR),
    ]
}

pub fn run_command(assets_url: &str, descriptor_url: &str) -> String {
    format!(
        "sudo chef-solo -c {} -r '{}' -j '{}'",
        SOLO_CONFIG_PATH, assets_url, descriptor_url
    )
}

/// Installs, configures and runs chef-solo over a [`Session`].
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    catalog:        OsCatalog,
    version_marker: String,
}

impl Default for Bootstrapper {
    fn default() -> Self {
        Self::new(OsCatalog::builtin())
    }
}

impl Bootstrapper {
    pub fn new(catalog: OsCatalog) -> Self {
        Self { catalog, version_marker: DEFAULT_VERSION_MARKER.into() }
    }

    /// A node is installed iff its probe output contains the version marker.
    /// Nodes that produced no output at all count as not installed.
    pub async fn check_installed(&self, session: &Session) -> Result<InstallCheck, RemoteError> {
        info!("Checking for installation of chef-solo...");
        let outputs = session.exec(VERSION_PROBE).await?;
        let installed: Vec<&str> = outputs
            .iter()
            .filter(|o| o.output.contains(&self.version_marker))
            .map(|o| o.node.as_str())
            .collect();
        let missing: Vec<String> = session
            .nodes()
            .into_iter()
            .filter(|n| !installed.contains(&n.as_str()))
            .collect();
        Ok(InstallCheck { all_installed: missing.is_empty(), missing })
    }

    /// Run each node's install script. Step *i* finishes on every node before
    /// step *i + 1* starts anywhere.
    pub async fn install(&self, session: &Session) -> Result<(), RemoteError> {
        let banners = session.exec("cat /etc/issue").await?;
        let mut scripts: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for out in &banners {
            let entry = self.catalog.resolve(&out.output)?;
            info!(node = %out.node, distro = %entry.pattern, steps = entry.commands.len(), "resolved install script");
            scripts.insert(out.node.clone(), entry.commands.clone());
        }
        for node in session.nodes() {
            if !scripts.contains_key(&node) {
                return Err(RemoteError::UnsupportedDistro(format!("no /etc/issue from node {}", node)));
            }
        }

        let _focus = session.router().focus_nodes();
        let steps = scripts.values().map(Vec::len).max().unwrap_or(0);
        for step in 0..steps {
            let commands: BTreeMap<String, String> = scripts
                .iter()
                .filter_map(|(node, cmds)| cmds.get(step).map(|c| (node.clone(), c.clone())))
                .collect();
            for out in session.exec_each(&commands).await? {
                if out.exit_code.unwrap_or(0) != 0 {
                    warn!(node = %out.node, step, code = ?out.exit_code, "install step exited non-zero");
                }
            }
        }
        Ok(())
    }

    pub async fn configure(&self, session: &Session) -> Result<(), RemoteError> {
        for cmd in solo_config_commands() {
            session.exec(&cmd).await?;
        }
        Ok(())
    }

    /// Clean the solo directories, then run chef-solo with each node's own
    /// descriptor.
    pub async fn run(
        &self,
        session: &Session,
        assets_url: &str,
        descriptor_urls: &BTreeMap<String, String>,
    ) -> Result<Vec<NodeOutput>, RemoteError> {
        let mut commands = BTreeMap::new();
        for node in session.nodes() {
            let url = descriptor_urls
                .get(&node)
                .ok_or_else(|| RemoteError::UnknownNode(node.clone()))?;
            commands.insert(node, run_command(assets_url, url));
        }

        let _focus = session.router().focus_nodes();
        for cmd in cleanup_commands() {
            session.exec(&cmd).await?;
        }
        let outputs = session.exec_each(&commands).await?;
        for out in &outputs {
            match out.exit_code {
                Some(0) | None => info!(node = %out.node, "chef-solo finished"),
                Some(code) => warn!(node = %out.node, code, "chef-solo exited non-zero"),
            }
        }
        Ok(outputs)
    }

    /// The whole configuration pass: probe, install where missing, run everywhere.
    pub async fn converge(
        &self,
        transport: Arc<dyn Transport>,
        targets: Vec<Target>,
        router: Arc<SinkRouter>,
        options: &SessionOptions,
        assets_url: &str,
        descriptor_urls: &BTreeMap<String, String>,
    ) -> Result<Vec<NodeOutput>, RemoteError> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let session = Session::open(transport, targets, router, options).await?;
        let result = self.converge_session(&session, assets_url, descriptor_urls).await;
        session.close().await;
        result
    }

    async fn converge_session(
        &self,
        session: &Session,
        assets_url: &str,
        descriptor_urls: &BTreeMap<String, String>,
    ) -> Result<Vec<NodeOutput>, RemoteError> {
        let check = self.check_installed(session).await?;
        if check.all_installed {
            info!(nodes = ?session.nodes(), "chef-solo already installed");
        } else {
            info!(
                nodes = ?check.missing,
                "Installing chef-solo on nodes {:?}. This may take a few minutes...",
                check.missing
            );
            let group = session.subset(&check.missing);
            self.install(&group).await?;
            self.configure(&group).await?;
        }
        info!(nodes = ?session.nodes(), "Running chef-solo...");
        self.run(session, assets_url, descriptor_urls).await
    }
}
