//! Remote execution: multiplexed sessions over many hosts, per-node output
//! routing and the chef-solo bootstrap workflow.

pub mod bootstrap;
pub mod error;
pub mod openssh;
pub mod os;
pub mod session;
pub mod sink;
pub mod transport;

pub use bootstrap::{Bootstrapper, InstallCheck, DEFAULT_VERSION_MARKER};
pub use error::RemoteError;
pub use openssh::OpenSshTransport;
pub use os::{OsCatalog, OsEntry};
pub use session::{targets_for, NodeOutput, RetryPolicy, Session, SessionOptions};
pub use sink::{ConsoleSink, FileSink, MemorySink, OutputSink, SinkRouter, Stream};
pub use transport::{Channel, ChannelEvent, Connection, Target, Transport};
