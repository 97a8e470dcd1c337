use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{kind} name cannot contain whitespace: '{name}'")]
    InvalidName { kind: &'static str, name: String },

    #[error("{kind} name cannot be empty")]
    EmptyName { kind: &'static str },

    #[error("duplicate role definition: '{0}'")]
    DuplicateRole(String),

    #[error("duplicate node definition: '{0}'")]
    DuplicateNode(String),
}
