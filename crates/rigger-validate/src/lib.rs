mod error;
mod validate;

pub use error::ValidationError;
pub use validate::{validate, ValidationReport};
