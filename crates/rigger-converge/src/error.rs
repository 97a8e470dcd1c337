use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvergeError {
    #[error("config error: {0}")]
    Config(#[from] rigger_config::ConfigError),

    #[error("provider error: {0}")]
    Provider(#[from] rigger_provider::ProviderError),

    #[error("remote error: {0}")]
    Remote(#[from] rigger_remote::RemoteError),

    #[error("could not encode descriptor for node {node}: {source}")]
    Descriptor {
        node: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no node named '{0}' in this cloud")]
    UnknownNode(String),

    #[error("node '{0}' is not a database node")]
    NotADatabase(String),
}
