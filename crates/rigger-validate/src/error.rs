use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("missing {field}")]
    MissingCloudField { field: &'static str },

    #[error("missing roles")]
    NoRoles,

    #[error("missing nodes")]
    NoNodes,

    #[error("'{role}' role's public port {port} is out of range")]
    InvalidRolePort { role: String, port: u16 },

    #[error("'{node}' node missing {field}")]
    MissingNodeField { node: String, field: &'static str },

    #[error("'{node}' node's name {reason}")]
    InvalidNodeName { node: String, reason: &'static str },

    #[error("'{node}' node missing {missing} (you must specify both volume_id and device)")]
    IncompleteVolume { node: String, missing: &'static str },

    #[error("'{node}' node references undeclared role '{role}'")]
    UnknownRole { node: String, role: String },

    #[error("'{node}' node references '{member}', which is not a compute node")]
    UnknownMember { node: String, member: String },

    #[error("'{node}' node's {field} {reason}")]
    InvalidValue {
        node: String,
        field: &'static str,
        reason: String,
    },
}
