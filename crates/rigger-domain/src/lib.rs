pub mod builder;
pub mod error;
pub mod naming;
pub mod types;

#[cfg(test)]
mod tests;

pub use builder::{CloudBuilder, ComputeSpec, DatabaseSpec, LoadBalancerSpec};
pub use error::DomainError;
pub use types::*;
