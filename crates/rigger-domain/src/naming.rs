//! Provider-safe identifiers derived from topology names.
//!
//! Every derived name is computed from the cloud name and the node (or role)
//! name. Names that must fit a provider length limit keep the *tail* of the
//! computed string, so two clouds with long, similar names may collide.

/// Classic ELB names: letters, digits and hyphens, at most 32 characters.
pub const LOAD_BALANCER_NAME_LIMIT: usize = 32;
/// RDS instance identifiers: at most 63 characters.
pub const DB_IDENTIFIER_LIMIT: usize = 63;
/// RDS parameter group and DB security group names: at most 255 characters.
pub const DB_GROUP_NAME_LIMIT: usize = 255;

pub const NODE_GROUP_PREFIX: &str = "node.";
pub const ROLE_GROUP_PREFIX: &str = "role.";
/// Role name of the group every compute node is placed in.
pub const DEFAULT_ROLE: &str = "default";

/// Strip everything except alphanumerics and hyphens.
pub fn sanitize(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric() || *c == '-').collect()
}

/// Keep the last `limit` characters of `s`.
pub fn keep_tail(s: &str, limit: usize) -> String {
    let count = s.chars().count();
    if count <= limit {
        return s.to_string();
    }
    s.chars().skip(count - limit).collect()
}

fn joined(cloud: &str, node: &str, suffix: &str) -> String {
    format!("{}-{}{}", sanitize(cloud), sanitize(node), suffix)
}

// ── Security groups ───────────────────────────────────────────────────────────

pub fn node_security_group(cloud: &str, node: &str) -> String {
    format!("{}.{}{}", cloud, NODE_GROUP_PREFIX, node)
}

pub fn role_security_group(cloud: &str, role: &str) -> String {
    format!("{}.{}{}", cloud, ROLE_GROUP_PREFIX, role)
}

pub fn default_security_group(cloud: &str) -> String {
    role_security_group(cloud, DEFAULT_ROLE)
}

// ── Load balancers ────────────────────────────────────────────────────────────

pub fn load_balancer_name(cloud: &str, node: &str) -> String {
    keep_tail(&joined(cloud, node, ""), LOAD_BALANCER_NAME_LIMIT)
}

// ── Databases ─────────────────────────────────────────────────────────────────

pub fn db_instance_identifier(cloud: &str, node: &str) -> String {
    keep_tail(&joined(cloud, node, ""), DB_IDENTIFIER_LIMIT)
}

pub fn db_parameter_group_name(cloud: &str, node: &str) -> String {
    keep_tail(&joined(cloud, node, "-dbparams"), DB_GROUP_NAME_LIMIT)
}

pub fn db_security_group_name(cloud: &str, node: &str) -> String {
    keep_tail(&joined(cloud, node, "-security-group"), DB_GROUP_NAME_LIMIT)
}

/// Snapshot id taken when a database node is deleted: `<identifier>-<rfc3339 timestamp>`
/// with the colons removed.
pub fn final_snapshot_identifier(identifier: &str, timestamp: &str) -> String {
    format!("{}-{}", identifier, timestamp.replace(':', ""))
}

// ── Remote descriptors ────────────────────────────────────────────────────────

pub fn descriptor_filename(cloud: &str, node: &str) -> String {
    format!("{}-{}.json", cloud, node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_group_names_follow_convention() {
        assert_eq!(node_security_group("prod", "web-1"), "prod.node.web-1");
        assert_eq!(role_security_group("prod", "web"), "prod.role.web");
        assert_eq!(default_security_group("prod"), "prod.role.default");
    }

    #[test]
    fn load_balancer_name_is_sanitized() {
        assert_eq!(load_balancer_name("my_cloud", "lb.1"), "mycloud-lb1");
    }

    #[test]
    fn long_load_balancer_name_keeps_tail() {
        let cloud = "a-very-long-cloud-name-for-testing";
        let name = load_balancer_name(cloud, "front-balancer");
        let full = format!("{}-front-balancer", cloud);
        assert_eq!(name.chars().count(), LOAD_BALANCER_NAME_LIMIT);
        assert!(full.ends_with(&name));
        assert!(name.ends_with("-front-balancer"));
    }

    #[test]
    fn short_names_are_not_truncated() {
        assert_eq!(keep_tail("abc", 32), "abc");
        assert_eq!(keep_tail("abcdef", 3), "def");
    }

    #[test]
    fn database_names() {
        assert_eq!(db_instance_identifier("prod", "db"), "prod-db");
        assert_eq!(db_parameter_group_name("prod", "db"), "prod-db-dbparams");
        assert_eq!(db_security_group_name("prod", "db"), "prod-db-security-group");
        let long = "x".repeat(80);
        assert_eq!(db_instance_identifier(&long, "db").len(), DB_IDENTIFIER_LIMIT);
    }

    #[test]
    fn snapshot_identifier_drops_colons() {
        assert_eq!(
            final_snapshot_identifier("prod-db", "2024-01-02T03:04:05+00:00"),
            "prod-db-2024-01-02T030405+0000"
        );
    }

    #[test]
    fn descriptor_file_name() {
        assert_eq!(descriptor_filename("prod", "web-1"), "prod-web-1.json");
    }
}
