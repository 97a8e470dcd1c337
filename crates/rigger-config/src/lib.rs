mod raw;
mod loader;
pub mod bundle;
pub mod error;
pub mod root;

pub use bundle::{build_assets_bundle, write_assets_bundle, ASSETS_BUNDLE_NAME};
pub use loader::{load_cloud, load_clouds, parse_cloud};
pub use error::ConfigError;
pub use root::{ConfigRoot, ROOT_ENV_VAR};
