use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml parse error in {path}: {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("conversion error in {path}: {message}")]
    Conversion { path: String, message: String },

    #[error("cloud '{name}' is declared in both {first} and {second}")]
    DuplicateCloud {
        name: String,
        first: String,
        second: String,
    },

    #[error("rigger not configured correctly: either --root or RIGGER_DIR must be defined")]
    RootNotConfigured,

    #[error("domain error in {path}: {source}")]
    Domain {
        path: String,
        #[source]
        source: rigger_domain::DomainError,
    },
}
