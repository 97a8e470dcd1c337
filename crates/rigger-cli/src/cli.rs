use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "rigger",
    about = "Converge EC2, ELB and RDS clouds from YAML and configure them with chef-solo",
    version
)]
pub struct Cli {
    /// Configuration root. Takes precedence over RIGGER_DIR.
    #[arg(long, env = "RIGGER_DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Backend to converge against.
    #[arg(long, env = "RIGGER_PROVIDER", default_value = "aws", global = true)]
    pub provider: ProviderArg,

    /// Emit logs as JSON lines.
    #[arg(long, env = "RIGGER_LOG_JSON", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check every cloud definition, or just one.
    Validate {
        cloud: Option<String>,
    },

    /// Create the configuration and log directories.
    Init,

    /// Write the cookbooks and roles bundle to a directory.
    Package {
        /// Output directory.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Show the provider state of every node in a cloud.
    Status {
        cloud: String,

        /// Output format.
        #[arg(long, default_value = "text")]
        output: OutputFormat,
    },

    /// Bring every node of a cloud up.
    Start {
        cloud: String,
    },

    /// Publish assets and run chef-solo on every compute node.
    Configure {
        cloud: String,
    },

    /// Converge a running cloud towards its current definition.
    Update {
        cloud: String,
    },

    /// Tear down every node of a cloud.
    Shutdown {
        cloud: String,
    },

    /// Reboot one database node and wait for it to come back.
    Reboot {
        cloud: String,
        node:  String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProviderArg {
    Aws,
    /// In-memory provider; nothing leaves the process.
    Local,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
