pub mod aws;
pub mod error;
pub mod memory;
pub mod model;
pub mod provider;

pub use aws::AwsProvider;
pub use error::ProviderError;
pub use memory::{MemoryProvider, Mutation};
pub use model::*;
pub use provider::{AssetStore, Provider};
