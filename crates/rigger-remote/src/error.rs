use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Fatal for the whole session: one target never became reachable.
    #[error("could not connect to node {node} after {attempts} attempts: {last_error}")]
    ConnectRetriesExhausted {
        node: String,
        attempts: u32,
        last_error: String,
    },

    #[error("could not obtain pty on node {node}")]
    PtyDenied { node: String },

    #[error("Unsupported Linux distro: {0}")]
    UnsupportedDistro(String),

    #[error("node {0} has no hostname; start the cloud first")]
    MissingHostname(String),

    #[error("node {0} is not part of this session")]
    UnknownNode(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("exec failed: {0}")]
    Exec(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
