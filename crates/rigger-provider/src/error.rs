use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// An error document returned by the provider, with its `<Code>` kept intact.
    #[error("{service} {code}: {message}")]
    Api {
        service: &'static str,
        code: String,
        message: String,
    },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("missing credentials: {0}")]
    Credentials(String),
}

impl ProviderError {
    /// True for every "resource doesn't exist" answer, e.g. `InvalidGroup.NotFound`,
    /// `DBInstanceNotFound`, `LoadBalancerNotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            ProviderError::NotFound { .. } => true,
            ProviderError::Api { code, .. } => code.contains("NotFound"),
            _ => false,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ProviderError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}
