use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rigger_config::{load_clouds, write_assets_bundle, ConfigRoot};
use rigger_converge::{CloudController, ConvergeReport};
use rigger_domain::Cloud;
use rigger_provider::{AwsProvider, MemoryProvider};
use tracing::{info, warn};

use crate::cli::{OutputFormat, ProviderArg};
use crate::output;

/// Resolved configuration root plus the backend chosen on the command line.
pub struct Workspace {
    root:     ConfigRoot,
    provider: ProviderArg,
}

impl Workspace {
    pub fn new(root: Option<PathBuf>, provider: ProviderArg) -> Result<Self> {
        Ok(Self {
            root: ConfigRoot::resolve(root)?,
            provider,
        })
    }

    fn clouds(&self) -> Result<Vec<Cloud>> {
        let dir = self.root.clouds_dir();
        load_clouds(&dir).with_context(|| format!("Failed to load clouds from {}", dir.display()))
    }

    fn cloud(&self, name: &str) -> Result<Cloud> {
        let clouds = self.clouds()?;
        let names: Vec<String> = clouds.iter().map(|c| c.name().to_string()).collect();
        match clouds.into_iter().find(|c| c.name() == name) {
            Some(cloud) => Ok(cloud),
            None => bail!("unknown cloud '{}'; defined clouds: {}", name, names.join(", ")),
        }
    }

    /// Load `name` and refuse to go further if it does not validate.
    fn valid_cloud(&self, name: &str) -> Result<Cloud> {
        let cloud = self.cloud(name)?;
        let report = rigger_validate::validate(&cloud);
        if !report.is_valid() {
            eprintln!("{}", output::render_validation(name, &report));
            bail!("cloud '{}' is invalid", name);
        }
        Ok(cloud)
    }

    fn controller(&self, cloud: &Cloud) -> Result<CloudController> {
        let controller = match self.provider {
            ProviderArg::Aws => {
                let aws = Arc::new(
                    AwsProvider::new(&cloud.account).context("Failed to initialise AWS provider")?,
                );
                CloudController::new(aws.clone(), aws)
            }
            ProviderArg::Local => {
                warn!(cloud = %cloud.name(), "Using the in-memory provider; nothing is created");
                let memory = Arc::new(MemoryProvider::new(cloud.account.account_id.clone()));
                CloudController::new(memory.clone(), memory)
            }
        };
        Ok(controller)
    }

    /// Append the report as one JSON line to the cloud's log file.
    fn record_run(&self, report: &ConvergeReport) -> Result<()> {
        self.root.create_cloud_log_dir(&report.cloud)?;
        let path = self.root.cloud_log_file(&report.cloud);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        writeln!(file, "{}", serde_json::to_string(report)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Print and log a finished report. Any recorded error fails the command.
    fn finish(&self, report: ConvergeReport) -> Result<()> {
        println!("{}", output::render_report(&report));
        self.record_run(&report)?;
        if !report.is_clean() {
            eprintln!("\n{}", output::render_errors(&report.errors));
            bail!("{} {} finished with errors", report.operation, report.cloud);
        }
        Ok(())
    }
}

// ── Validate ──────────────────────────────────────────────────────────────────

pub fn validate(ws: &Workspace, cloud: Option<&str>) -> Result<()> {
    let clouds = match cloud {
        Some(name) => vec![ws.cloud(name)?],
        None => ws.clouds()?,
    };
    if clouds.is_empty() {
        println!("No clouds defined under {}", ws.root.clouds_dir().display());
        return Ok(());
    }

    let mut invalid = 0;
    for cloud in &clouds {
        let report = rigger_validate::validate(cloud);
        if !report.is_valid() {
            invalid += 1;
        }
        println!("{}", output::render_validation(cloud.name(), &report));
    }
    if invalid > 0 {
        bail!("{} of {} cloud(s) are invalid", invalid, clouds.len());
    }
    Ok(())
}

// ── Init ──────────────────────────────────────────────────────────────────────

pub fn init(ws: &Workspace) -> Result<()> {
    let created = ws.root.create_dirs()?;
    if created.is_empty() {
        println!("Already initialised at {}", ws.root.root().display());
    }
    for dir in created {
        println!("created {}", dir.display());
    }
    Ok(())
}

// ── Package ───────────────────────────────────────────────────────────────────

pub fn package(ws: &Workspace, out: &Path) -> Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let path = write_assets_bundle(&ws.root, out).context("Failed to package assets")?;
    println!("{}", path.display());
    Ok(())
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(ws: &Workspace, name: &str, format: OutputFormat) -> Result<()> {
    let cloud = ws.cloud(name)?;
    let lines = ws
        .controller(&cloud)?
        .status(&cloud)
        .await
        .with_context(|| format!("Failed to read status of {}", name))?;
    match format {
        OutputFormat::Text => println!("{}", output::render_status(&lines)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&lines)?),
    }
    Ok(())
}

// ── Start / Update / Shutdown ─────────────────────────────────────────────────

pub async fn start(ws: &Workspace, name: &str) -> Result<()> {
    let mut cloud = ws.valid_cloud(name)?;
    info!(cloud = %name, "Starting cloud");
    let report = ws.controller(&cloud)?.start(&mut cloud).await;
    ws.finish(report)
}

pub async fn update(ws: &Workspace, name: &str) -> Result<()> {
    let mut cloud = ws.valid_cloud(name)?;
    info!(cloud = %name, "Updating cloud");
    let report = ws.controller(&cloud)?.update(&mut cloud).await;
    ws.finish(report)
}

pub async fn shutdown(ws: &Workspace, name: &str) -> Result<()> {
    let mut cloud = ws.cloud(name)?;
    info!(cloud = %name, "Shutting down cloud");
    let report = ws.controller(&cloud)?.shutdown(&mut cloud).await;
    ws.finish(report)
}

// ── Configure ─────────────────────────────────────────────────────────────────

pub async fn configure(ws: &Workspace, name: &str) -> Result<()> {
    let mut cloud = ws.valid_cloud(name)?;
    info!(cloud = %name, "Configuring cloud");
    let report = ws
        .controller(&cloud)?
        .configure(&mut cloud, &ws.root)
        .await
        .with_context(|| format!("Failed to configure {}", name))?;
    ws.finish(report)
}

// ── Reboot ────────────────────────────────────────────────────────────────────

pub async fn reboot(ws: &Workspace, name: &str, node: &str) -> Result<()> {
    let mut cloud = ws.valid_cloud(name)?;
    info!(cloud = %name, node = %node, "Rebooting database");
    let report = ws
        .controller(&cloud)?
        .reboot_database(&mut cloud, node)
        .await
        .with_context(|| format!("Failed to reboot {} in {}", node, name))?;
    ws.finish(report)
}
