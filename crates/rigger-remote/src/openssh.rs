use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::transport::{Channel, ChannelEvent, Connection, Target, Transport};

/// Printed by the ssh client when the server refuses a tty.
const PTY_FAILURE: &str = "PTY allocation request failed";

/// Drives the system `ssh` client. Each host gets one multiplexed control
/// master; every command afterwards reuses it.
#[derive(Debug, Clone)]
pub struct OpenSshTransport {
    program:         String,
    control_dir:     PathBuf,
    connect_timeout: u32,
    control_persist: u32,
}

impl OpenSshTransport {
    pub fn new(control_dir: impl Into<PathBuf>) -> Self {
        Self {
            program:         "ssh".into(),
            control_dir:     control_dir.into(),
            connect_timeout: 10,
            control_persist: 600,
        }
    }

    /// Use a different client binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Options shared by every invocation against `target`.
    pub fn base_args(&self, target: &Target) -> Vec<String> {
        let control_path = self.control_dir.join("%r@%h:%p");
        let mut args: Vec<String> = vec![
            "-o".into(), "ControlMaster=auto".into(),
            "-o".into(), format!("ControlPath={}", control_path.display()),
            "-o".into(), format!("ControlPersist={}", self.control_persist),
            "-o".into(), "StrictHostKeyChecking=no".into(),
            "-o".into(), "BatchMode=yes".into(),
            "-o".into(), format!("ConnectTimeout={}", self.connect_timeout),
        ];
        if !target.key_file.as_os_str().is_empty() {
            args.push("-i".into());
            args.push(target.key_file.display().to_string());
        }
        args.push(format!("{}@{}", target.user, target.host));
        args
    }

    /// Arguments for running `command` with a forced tty.
    pub fn exec_args(&self, target: &Target, command: &str) -> Vec<String> {
        let mut args = vec!["-tt".to_string()];
        args.extend(self.base_args(target));
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl Transport for OpenSshTransport {
    async fn connect(&self, target: &Target) -> Result<Arc<dyn Connection>, RemoteError> {
        std::fs::create_dir_all(&self.control_dir).map_err(|e| RemoteError::Io {
            path: self.control_dir.display().to_string(),
            source: e,
        })?;

        let mut args = self.base_args(target);
        args.push("true".into());
        debug!(node = %target.node, host = %target.host, "opening ssh control master");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RemoteError::Connect(format!("spawn {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RemoteError::Connect(format!(
                "{}@{}: {}",
                target.user,
                target.host,
                stderr.trim()
            )));
        }
        info!(node = %target.node, host = %target.host, "connected");
        Ok(Arc::new(OpenSshConnection { transport: self.clone(), target: target.clone() }))
    }
}

struct OpenSshConnection {
    transport: OpenSshTransport,
    target:    Target,
}

#[async_trait]
impl Connection for OpenSshConnection {
    async fn exec(&self, command: &str) -> Result<Channel, RemoteError> {
        let args = self.transport.exec_args(&self.target, command);
        let mut child = Command::new(&self.transport.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RemoteError::Exec(format!("spawn {}: {}", self.transport.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RemoteError::Exec("stdout not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RemoteError::Exec("stderr not piped".into()))?;

        let (tx, rx) = mpsc::unbounded_channel::<ChannelEvent>();

        let tx1 = tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx1.send(ChannelEvent::Stdout(line));
            }
        });

        let tx2 = tx.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let event = if line.contains(PTY_FAILURE) {
                    ChannelEvent::PtyDenied
                } else {
                    ChannelEvent::Stderr(line)
                };
                let _ = tx2.send(event);
            }
        });

        let host = self.target.host.clone();
        tokio::spawn(async move {
            stdout_task.await.ok();
            stderr_task.await.ok();
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!(host = %host, error = %e, "wait for ssh failed");
                    -1
                }
            };
            let _ = tx.send(ChannelEvent::Exit(code));
        });

        Ok(Channel::new(self.target.host.clone(), rx))
    }

    async fn close(&self) {
        let mut args = vec!["-O".to_string(), "exit".to_string()];
        args.extend(self.transport.base_args(&self.target));
        let result = Command::new(&self.transport.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            debug!(host = %self.target.host, error = %e, "closing control master failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target {
            node:     "web-1".into(),
            host:     "ec2-1-2-3-4.compute-1.amazonaws.com".into(),
            user:     "ubuntu".into(),
            key_file: "/keys/deploy.pem".into(),
        }
    }

    #[test]
    fn base_args_multiplex_and_skip_host_checks() {
        let t = OpenSshTransport::new("/tmp/rigger-ssh");
        let args = t.base_args(&target());
        let joined = args.join(" ");
        assert!(joined.contains("ControlMaster=auto"));
        assert!(joined.contains("ControlPath=/tmp/rigger-ssh/%r@%h:%p"));
        assert!(joined.contains("StrictHostKeyChecking=no"));
        assert!(joined.contains("BatchMode=yes"));
        assert!(joined.contains("ConnectTimeout=10"));
        assert!(joined.contains("-i /keys/deploy.pem"));
        assert_eq!(args.last().unwrap(), "ubuntu@ec2-1-2-3-4.compute-1.amazonaws.com");
    }

    #[test]
    fn exec_args_force_tty_and_end_with_command() {
        let t = OpenSshTransport::new("/tmp/rigger-ssh");
        let args = t.exec_args(&target(), "chef-solo --version");
        assert_eq!(args[0], "-tt");
        assert_eq!(args.last().unwrap(), "chef-solo --version");
    }

    #[test]
    fn empty_key_file_is_omitted() {
        let t = OpenSshTransport::new("/tmp/rigger-ssh");
        let mut tgt = target();
        tgt.key_file = PathBuf::new();
        assert!(!t.base_args(&tgt).contains(&"-i".to_string()));
    }

    #[tokio::test]
    async fn missing_client_is_a_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = OpenSshTransport::new(dir.path()).with_program("/nonexistent/ssh-client");
        let err = t.connect(&target()).await.err().unwrap();
        assert!(matches!(err, RemoteError::Connect(_)));
    }
}
