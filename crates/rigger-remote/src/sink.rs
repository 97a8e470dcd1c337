//! Where remote output goes.
//!
//! Before and after a multi-node phase every node's output is written to the
//! shared console. While [`SinkRouter::focus_nodes`] is held, each node writes
//! to its own sink instead (usually its log file).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

pub trait OutputSink: Send + Sync {
    fn write_line(&self, node: &str, stream: Stream, line: &str);
}

// ── Console ───────────────────────────────────────────────────────────────────

/// Prefixes each line with the node name and prints it.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn write_line(&self, node: &str, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => println!("[{}] {}", node, line),
            Stream::Stderr => eprintln!("[{}] {}", node, line),
        }
    }
}

// ── File ──────────────────────────────────────────────────────────────────────

/// Appends lines to a log file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RemoteError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| RemoteError::Io { path: path.display().to_string(), source: e })?;
        Ok(Self { path, file: Mutex::new(file) })
    }
}

impl OutputSink for FileSink {
    fn write_line(&self, _node: &str, stream: Stream, line: &str) {
        let level = match stream {
            Stream::Stdout => "INFO",
            Stream::Stderr => "ERROR",
        };
        let Ok(mut file) = self.file.lock() else { return };
        if let Err(e) = writeln!(file, "{} {}", level, line) {
            warn!(path = %self.path.display(), error = %e, "could not write node log");
        }
    }
}

// ── Memory ────────────────────────────────────────────────────────────────────

/// Keeps every line. Used to inspect routing.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(String, Stream, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(String, Stream, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Lines written for `node`, in order.
    pub fn lines_for(&self, node: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(n, _, _)| n == node)
            .map(|(_, _, l)| l)
            .collect()
    }
}

impl OutputSink for MemorySink {
    fn write_line(&self, node: &str, stream: Stream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((node.to_string(), stream, line.to_string()));
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

pub struct SinkRouter {
    console: Arc<dyn OutputSink>,
    nodes:   HashMap<String, Arc<dyn OutputSink>>,
    focused: AtomicBool,
}

impl SinkRouter {
    pub fn new(console: Arc<dyn OutputSink>) -> Self {
        Self { console, nodes: HashMap::new(), focused: AtomicBool::new(false) }
    }

    /// Route `node` to `sink` while focused.
    pub fn with_node_sink(mut self, node: impl Into<String>, sink: Arc<dyn OutputSink>) -> Self {
        self.nodes.insert(node.into(), sink);
        self
    }

    /// One `FileSink` per node at `<dir>/<node>.log`.
    pub fn with_node_logs<'a>(
        mut self,
        dir: &Path,
        nodes: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, RemoteError> {
        for node in nodes {
            let sink = FileSink::open(dir.join(format!("{}.log", node)))?;
            self.nodes.insert(node.to_string(), Arc::new(sink));
        }
        Ok(self)
    }

    /// Send node output to the per-node sinks until the guard is dropped.
    pub fn focus_nodes(&self) -> FocusGuard<'_> {
        self.focused.store(true, Ordering::SeqCst);
        FocusGuard { router: self }
    }

    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    pub fn write(&self, node: &str, stream: Stream, line: &str) {
        debug!(target: "rigger::remote", node = %node, "{}", line);
        let sink = if self.is_focused() {
            self.nodes.get(node).unwrap_or(&self.console)
        } else {
            &self.console
        };
        sink.write_line(node, stream, line);
    }
}

/// Restores console routing on drop.
pub struct FocusGuard<'a> {
    router: &'a SinkRouter,
}

impl Drop for FocusGuard<'_> {
    fn drop(&mut self) {
        self.router.focused.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_routes_to_node_sinks_until_dropped() {
        let console = Arc::new(MemorySink::new());
        let web = Arc::new(MemorySink::new());
        let router = SinkRouter::new(console.clone()).with_node_sink("web-1", web.clone());

        router.write("web-1", Stream::Stdout, "before");
        {
            let _guard = router.focus_nodes();
            router.write("web-1", Stream::Stdout, "during");
            router.write("db-1", Stream::Stderr, "no sink of its own");
        }
        router.write("web-1", Stream::Stdout, "after");

        assert_eq!(console.lines_for("web-1"), vec!["before", "after"]);
        assert_eq!(console.lines_for("db-1"), vec!["no sink of its own"]);
        assert_eq!(web.lines_for("web-1"), vec!["during"]);
        assert!(!router.is_focused());
    }

    #[test]
    fn file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let router = SinkRouter::new(Arc::new(MemorySink::new()))
            .with_node_logs(dir.path(), ["web-1"])
            .unwrap();
        let _guard = router.focus_nodes();
        router.write("web-1", Stream::Stdout, "Chef: 0.8.14");
        router.write("web-1", Stream::Stderr, "warning");

        let log = std::fs::read_to_string(dir.path().join("web-1.log")).unwrap();
        assert_eq!(log, "INFO Chef: 0.8.14\nERROR warning\n");
    }
}
