use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rigger_domain::Cloud;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::RemoteError;
use crate::sink::{SinkRouter, Stream};
use crate::transport::{Channel, ChannelEvent, Connection, Target, Transport};

// ── Options ───────────────────────────────────────────────────────────────────

/// Connection retry for a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, including the first.
    pub max_attempts: u32,
    pub backoff:      Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 6, backoff: Duration::from_secs(10) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub retry: RetryPolicy,
    /// Connection attempts allowed in flight at once.
    pub max_concurrent_connects: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { retry: RetryPolicy::default(), max_concurrent_connects: 10 }
    }
}

/// Everything one node printed for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutput {
    pub node:      String,
    pub output:    String,
    pub exit_code: Option<i32>,
}

/// Targets for the configurable nodes of `cloud`, optionally limited to
/// `only`. Every selected node must already have a hostname.
pub fn targets_for(cloud: &Cloud, only: Option<&[String]>) -> Result<Vec<Target>, RemoteError> {
    let mut targets = Vec::new();
    for node in cloud.configurable_nodes() {
        let Some(compute) = node.as_compute() else { continue };
        if let Some(only) = only {
            if !only.iter().any(|n| n == &node.name) {
                continue;
            }
        }
        let host = node
            .hostname
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RemoteError::MissingHostname(node.name.clone()))?;
        targets.push(Target {
            node:     node.name.clone(),
            host,
            user:     compute.ssh_user.clone(),
            key_file: cloud.account.keypair_file.clone(),
        });
    }
    Ok(targets)
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Open connections to a set of nodes. Commands go to every node at once.
pub struct Session {
    targets:     Vec<Target>,
    connections: Vec<Arc<dyn Connection>>,
    router:      Arc<SinkRouter>,
}

impl Session {
    /// Connect to every target. Fails as a whole when any one target runs out
    /// of attempts, after closing the connections that did open.
    pub async fn open(
        transport: Arc<dyn Transport>,
        targets: Vec<Target>,
        router: Arc<SinkRouter>,
        options: &SessionOptions,
    ) -> Result<Self, RemoteError> {
        let semaphore = Arc::new(Semaphore::new(options.max_concurrent_connects.max(1)));
        let mut set = JoinSet::new();

        for (index, target) in targets.iter().cloned().enumerate() {
            let transport = transport.clone();
            let semaphore = semaphore.clone();
            let retry = options.retry.clone();
            set.spawn(async move {
                let conn = connect_with_retry(transport.as_ref(), &target, &semaphore, &retry).await?;
                Ok::<_, RemoteError>((index, conn))
            });
        }

        let mut slots: Vec<Option<Arc<dyn Connection>>> = vec![None; targets.len()];
        let mut failure = None;
        while let Some(joined) = set.join_next().await {
            let result = joined
                .map_err(|e| RemoteError::Connect(format!("connect task failed: {}", e)))
                .and_then(|r| r);
            match result {
                Ok((index, conn)) => slots[index] = Some(conn),
                Err(e) if failure.is_none() => {
                    set.abort_all();
                    failure = Some(e);
                }
                Err(_) => {}
            }
        }

        if let Some(e) = failure {
            let opened: Vec<_> = slots.into_iter().flatten().collect();
            debug!(opened = opened.len(), "closing connections after failed open");
            for conn in opened {
                conn.close().await;
            }
            return Err(e);
        }

        info!(nodes = targets.len(), "session open");
        Ok(Self {
            targets,
            connections: slots.into_iter().flatten().collect(),
            router,
        })
    }

    pub fn nodes(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.node.clone()).collect()
    }

    pub fn router(&self) -> &SinkRouter {
        &self.router
    }

    /// A session over some of this session's nodes, sharing their connections.
    pub fn subset(&self, nodes: &[String]) -> Session {
        let (targets, connections) = self
            .targets
            .iter()
            .zip(&self.connections)
            .filter(|(t, _)| nodes.contains(&t.node))
            .map(|(t, c)| (t.clone(), c.clone()))
            .unzip();
        Session { targets, connections, router: self.router.clone() }
    }

    /// Run the same command on every node.
    pub async fn exec(&self, command: &str) -> Result<Vec<NodeOutput>, RemoteError> {
        let commands = self
            .targets
            .iter()
            .map(|t| (t.node.clone(), command.to_string()))
            .collect();
        self.exec_each(&commands).await
    }

    /// Run a per-node command. Nodes without an entry are left alone.
    ///
    /// Every command is issued before any output is awaited.
    pub async fn exec_each(
        &self,
        commands: &BTreeMap<String, String>,
    ) -> Result<Vec<NodeOutput>, RemoteError> {
        let mut channels = Vec::new();
        for (target, conn) in self.targets.iter().zip(&self.connections) {
            if let Some(command) = commands.get(&target.node) {
                debug!(node = %target.node, command = %command, "exec");
                channels.push(conn.exec(command).await?);
            }
        }

        let hosts: Arc<Vec<(String, String)>> = Arc::new(
            self.targets
                .iter()
                .map(|t| (t.node.clone(), t.host.clone()))
                .collect(),
        );
        let mut set = JoinSet::new();
        for channel in channels {
            set.spawn(drain(channel, hosts.clone(), self.router.clone()));
        }

        let mut outputs = Vec::new();
        while let Some(joined) = set.join_next().await {
            let drained = joined.map_err(|e| RemoteError::Exec(format!("output task failed: {}", e)))??;
            if let Some(out) = drained {
                outputs.push(out);
            }
        }
        let order = self.nodes();
        outputs.sort_by_key(|o| order.iter().position(|n| n == &o.node));
        Ok(outputs)
    }

    pub async fn close(self) {
        for conn in &self.connections {
            conn.close().await;
        }
        debug!(nodes = self.targets.len(), "session closed");
    }
}

async fn connect_with_retry(
    transport: &dyn Transport,
    target: &Target,
    semaphore: &Semaphore,
    retry: &RetryPolicy,
) -> Result<Arc<dyn Connection>, RemoteError> {
    let mut attempts = 0;
    loop {
        let result = {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|e| RemoteError::Connect(e.to_string()))?;
            transport.connect(target).await
        };
        attempts += 1;
        match result {
            Ok(conn) => return Ok(conn),
            Err(e) if attempts >= retry.max_attempts => {
                error!(node = %target.node, attempts, error = %e, "giving up on node");
                return Err(RemoteError::ConnectRetriesExhausted {
                    node: target.node.clone(),
                    attempts,
                    last_error: e.to_string(),
                });
            }
            Err(e) => {
                info!(
                    node = %target.node,
                    error = %e,
                    "Could not connect to node {}. Trying again in {} seconds...",
                    target.node,
                    retry.backoff.as_secs()
                );
                tokio::time::sleep(retry.backoff).await;
            }
        }
    }
}

/// Read a channel to the end, routing each line to its node's sink.
async fn drain(
    mut channel: Channel,
    hosts: Arc<Vec<(String, String)>>,
    router: Arc<SinkRouter>,
) -> Result<Option<NodeOutput>, RemoteError> {
    let Some(node) = hosts
        .iter()
        .find(|(_, host)| *host == channel.host)
        .map(|(node, _)| node.clone())
    else {
        error!("Could not find node matching hostname {}. This should not happen.", channel.host);
        while channel.next().await.is_some() {}
        return Ok(None);
    };

    let mut out = NodeOutput { node: node.clone(), output: String::new(), exit_code: None };
    while let Some(event) = channel.next().await {
        match event {
            ChannelEvent::PtyDenied => return Err(RemoteError::PtyDenied { node }),
            ChannelEvent::Stdout(line) => {
                router.write(&node, Stream::Stdout, &line);
                out.output.push_str(&line);
                out.output.push('\n');
            }
            ChannelEvent::Stderr(line) => {
                router.write(&node, Stream::Stderr, &line);
                out.output.push_str(&line);
                out.output.push('\n');
            }
            ChannelEvent::Exit(code) => out.exit_code = Some(code),
        }
    }
    Ok(Some(out))
}
