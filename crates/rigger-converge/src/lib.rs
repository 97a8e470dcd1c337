//! Convergence of a declared cloud against a provider: security groups,
//! node lifecycles, attachments and the remote configuration pass.

pub mod attach;
pub mod controller;
pub mod error;
pub mod lifecycle;
pub mod report;
pub mod security;
pub mod status;

pub use controller::{CloudController, ConvergeOptions};
pub use error::ConvergeError;
pub use report::{Change, ConvergeReport};
pub use status::StatusLine;
