use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::ConfigError;

/// Environment variable naming a standalone configuration root.
pub const ROOT_ENV_VAR: &str = "RIGGER_DIR";

/// The directory tree rigger reads configuration from and writes logs to.
///
/// ```text
/// <root>/config/rigger/{clouds,cookbooks,roles}
/// <root>/log/rigger/clouds/<cloud>/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRoot {
    root: PathBuf,
}

impl ConfigRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// An explicit root wins over `RIGGER_DIR`.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::resolve_from(explicit, std::env::var_os(ROOT_ENV_VAR))
    }

    fn resolve_from(explicit: Option<PathBuf>, env: Option<OsString>) -> Result<Self, ConfigError> {
        explicit
            .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
            .map(Self::new)
            .ok_or(ConfigError::RootNotConfigured)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config").join("rigger")
    }

    pub fn clouds_dir(&self) -> PathBuf {
        self.config_dir().join("clouds")
    }

    pub fn cookbooks_dir(&self) -> PathBuf {
        self.config_dir().join("cookbooks")
    }

    pub fn roles_dir(&self) -> PathBuf {
        self.config_dir().join("roles")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log").join("rigger").join("clouds")
    }

    pub fn cloud_log_dir(&self, cloud: &str) -> PathBuf {
        self.log_dir().join(cloud)
    }

    pub fn cloud_log_file(&self, cloud: &str) -> PathBuf {
        self.cloud_log_dir(cloud).join(format!("{}.log", cloud))
    }

    pub fn node_log_file(&self, cloud: &str, node: &str) -> PathBuf {
        self.cloud_log_dir(cloud).join(format!("{}.log", node))
    }

    /// Create the config and log trees. Existing directories are left alone.
    /// Returns the directories that were newly created.
    pub fn create_dirs(&self) -> Result<Vec<PathBuf>, ConfigError> {
        if !self.root.is_dir() {
            return Err(ConfigError::Conversion {
                path: self.root.display().to_string(),
                message: "configuration root doesn't exist or is not a directory".into(),
            });
        }
        let mut created = Vec::new();
        for dir in [
            self.config_dir(),
            self.clouds_dir(),
            self.cookbooks_dir(),
            self.roles_dir(),
            self.log_dir(),
        ] {
            if dir.is_dir() {
                continue;
            }
            std::fs::create_dir_all(&dir).map_err(|e| ConfigError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
            info!("Created {}", dir.display());
            created.push(dir);
        }
        Ok(created)
    }

    /// Create `<root>/log/rigger/clouds/<cloud>` if needed.
    pub fn create_cloud_log_dir(&self, cloud: &str) -> Result<PathBuf, ConfigError> {
        let dir = self.cloud_log_dir(cloud);
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        Ok(dir)
    }
}
