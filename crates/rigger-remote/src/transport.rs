use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RemoteError;

/// A host to open a session against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Node name in the topology.
    pub node:     String,
    pub host:     String,
    pub user:     String,
    pub key_file: PathBuf,
}

/// One event read from an exec channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The remote side refused the pseudo-terminal request.
    PtyDenied,
    Stdout(String),
    /// Extended data.
    Stderr(String),
    Exit(i32),
}

/// The output of one command on one host. `host` is what the transport
/// reports, not necessarily what the caller asked for.
#[derive(Debug)]
pub struct Channel {
    pub host: String,
    events:   mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Channel {
    pub fn new(host: impl Into<String>, events: mpsc::UnboundedReceiver<ChannelEvent>) -> Self {
        Self { host: host.into(), events }
    }

    /// A channel whose events are already known.
    pub fn from_events(host: impl Into<String>, events: Vec<ChannelEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for e in events {
            let _ = tx.send(e);
        }
        Self::new(host, rx)
    }

    /// `None` once the command has finished and every event has been read.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }
}

/// An open connection to one host.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Start `command` under a pseudo-terminal and return its output channel.
    async fn exec(&self, command: &str) -> Result<Channel, RemoteError>;

    async fn close(&self);
}

/// Opens connections. A failed attempt is reported as an error; retrying is
/// the session's job.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, target: &Target) -> Result<Arc<dyn Connection>, RemoteError>;
}
