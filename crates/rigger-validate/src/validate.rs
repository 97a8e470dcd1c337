use rigger_domain::{Cloud, ComputeNode, DatabaseNode, LoadBalancerNode, Node, NodeKind};
use serde::Serialize;

use crate::error::ValidationError;

/// Engines whose RDS parameter group family is the lowercased engine name.
pub const DB_ENGINES: &[&str] = &["MySQL5.1"];
pub const LISTENER_PROTOCOLS: &[&str] = &["HTTP", "HTTPS", "TCP", "SSL"];

const WEEKDAYS: &[&str] = &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Every problem found in a cloud, in declaration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    fn push(&mut self, e: ValidationError) {
        self.errors.push(e);
    }
}

/// Validate a built cloud.
///
/// Checks:
/// 1. Account settings (account id, region, keypair, asset bucket)
/// 2. At least one role and one node
/// 3. Per-variant node fields and provider naming rules
/// 4. References: compute roles and load-balancer members must exist
pub fn validate(cloud: &Cloud) -> ValidationReport {
    let mut report = ValidationReport::default();
    let account = &cloud.account;

    for (field, empty) in [
        ("account_id", account.account_id.is_empty()),
        ("region", account.region.is_empty()),
        ("keypair_name", account.keypair_name.is_empty()),
        ("keypair_file", account.keypair_file.as_os_str().is_empty()),
        ("asset_bucket", account.asset_bucket.is_empty()),
    ] {
        if empty {
            report.push(ValidationError::MissingCloudField { field });
        }
    }

    if cloud.roles().next().is_none() {
        report.push(ValidationError::NoRoles);
    }
    for role in cloud.roles() {
        for &port in &role.public_ports {
            if port == 0 {
                report.push(ValidationError::InvalidRolePort { role: role.name.clone(), port });
            }
        }
    }

    if cloud.nodes().next().is_none() {
        report.push(ValidationError::NoNodes);
    }
    for node in cloud.nodes() {
        match &node.kind {
            NodeKind::Compute(c) => check_compute(cloud, node, c, &mut report),
            NodeKind::LoadBalancer(lb) => check_load_balancer(cloud, node, lb, &mut report),
            NodeKind::Database(db) => check_database(node, db, &mut report),
        }
    }

    report
}

fn missing(node: &Node, field: &'static str) -> ValidationError {
    ValidationError::MissingNodeField { node: node.name.clone(), field }
}

fn invalid(node: &Node, field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        node: node.name.clone(),
        field,
        reason: reason.into(),
    }
}

// ── Compute ───────────────────────────────────────────────────────────────────

fn check_compute(cloud: &Cloud, node: &Node, c: &ComputeNode, report: &mut ValidationReport) {
    if c.image_id.is_empty() {
        report.push(missing(node, "ami"));
    }
    if c.instance_type.is_empty() {
        report.push(missing(node, "instance_type"));
    }
    if c.zone.is_empty() {
        report.push(missing(node, "availability_zone"));
    }
    if c.ssh_user.is_empty() {
        report.push(missing(node, "ssh_user"));
    }
    match (&c.volume_id, &c.device) {
        (Some(_), None) => report.push(ValidationError::IncompleteVolume {
            node: node.name.clone(),
            missing: "device",
        }),
        (None, Some(_)) => report.push(ValidationError::IncompleteVolume {
            node: node.name.clone(),
            missing: "volume_id",
        }),
        _ => {}
    }
    for role in &c.roles {
        if cloud.role(role).is_none() {
            report.push(ValidationError::UnknownRole {
                node: node.name.clone(),
                role: role.clone(),
            });
        }
    }
}

// ── Load balancers ────────────────────────────────────────────────────────────

/// ELB and RDS share the same naming rules apart from the length limit.
fn check_provider_name(node: &Node, max_len: usize, report: &mut ValidationReport) {
    let name = node.name.as_str();
    let reason = if name.chars().count() > max_len {
        Some(if max_len == 32 {
            "must be less than 32 characters"
        } else {
            "must be less than 64 characters"
        })
    } else if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        Some("must start with a letter")
    } else if name.chars().count() < 2 || !name.chars().all(|c| c.is_alphanumeric() || c == '-') {
        Some("may only contain alphanumerics and hyphens")
    } else if name.ends_with('-') {
        Some("must not end with a hyphen")
    } else if name.contains("--") {
        Some("must not contain two consecutive hyphens")
    } else {
        None
    };
    if let Some(reason) = reason {
        report.push(ValidationError::InvalidNodeName { node: node.name.clone(), reason });
    }
}

fn check_load_balancer(
    cloud: &Cloud,
    node: &Node,
    lb: &LoadBalancerNode,
    report: &mut ValidationReport,
) {
    check_provider_name(node, 32, report);

    if lb.listeners.is_empty() {
        report.push(missing(node, "listeners"));
    }
    for listener in &lb.listeners {
        if listener.load_balancer_port == 0 || listener.instance_port == 0 {
            report.push(invalid(node, "listeners", "ports must be between 1 and 65535"));
        }
        if !LISTENER_PROTOCOLS
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&listener.protocol))
        {
            report.push(invalid(
                node,
                "listeners",
                format!("protocol '{}' is not one of {:?}", listener.protocol, LISTENER_PROTOCOLS),
            ));
        }
    }

    if lb.members.is_empty() {
        report.push(missing(node, "ec2_nodes collection"));
    }
    for member in &lb.members {
        if cloud.node(member).and_then(|n| n.as_compute()).is_none() {
            report.push(ValidationError::UnknownMember {
                node: node.name.clone(),
                member: member.clone(),
            });
        }
    }

    if lb.zones.is_empty() {
        report.push(missing(node, "availability_zones collection"));
    }

    if let Some(hc) = &lb.health_check {
        if hc.target.is_empty() {
            report.push(invalid(node, "health_check", "is missing a target"));
        }
        for (field, value) in [
            ("timeout", hc.timeout),
            ("interval", hc.interval),
            ("unhealthy_threshold", hc.unhealthy_threshold),
            ("healthy_threshold", hc.healthy_threshold),
        ] {
            if value == 0 {
                report.push(invalid(node, "health_check", format!("{} must be positive", field)));
            }
        }
    }
}

// ── Databases ─────────────────────────────────────────────────────────────────

fn check_database(node: &Node, db: &DatabaseNode, report: &mut ValidationReport) {
    check_provider_name(node, 63, report);

    if db.zone.is_empty() {
        report.push(missing(node, "availability_zone"));
    }

    if db.engine.is_empty() {
        report.push(missing(node, "engine"));
    } else if !DB_ENGINES.contains(&db.engine.as_str()) {
        report.push(invalid(node, "engine", format!("'{}' is invalid", db.engine)));
    }

    if db.instance_class.is_empty() {
        report.push(missing(node, "db_instance_class"));
    } else if !db.instance_class.starts_with("db.") {
        report.push(invalid(node, "db_instance_class", format!("'{}' is invalid", db.instance_class)));
    }

    let user = &db.master_username;
    if user.is_empty() {
        report.push(missing(node, "master_username"));
    } else if user.chars().count() > 15 {
        report.push(invalid(node, "master_username", "must be less than 16 characters"));
    } else if !user.starts_with(|c: char| c.is_ascii_alphabetic()) {
        report.push(invalid(node, "master_username", "must start with a letter"));
    } else if !user.chars().all(char::is_alphanumeric) {
        report.push(invalid(node, "master_username", "may only contain alphanumerics"));
    }

    let password = &db.master_password;
    if password.is_empty() {
        report.push(missing(node, "master_user_password"));
    } else if !(4..=16).contains(&password.chars().count()) {
        report.push(invalid(
            node,
            "master_user_password",
            "must be between 4 and 16 characters in length",
        ));
    } else if !password.chars().all(char::is_alphanumeric) {
        report.push(invalid(node, "master_user_password", "may only contain alphanumerics"));
    }

    match db.port {
        None => report.push(missing(node, "port")),
        Some(p) if !(1150..=65535).contains(&p) => {
            report.push(invalid(node, "port", "must be between 1150 and 65535"))
        }
        _ => {}
    }

    match db.allocated_storage {
        None => report.push(missing(node, "allocated_storage")),
        Some(s) if !(5..=1024).contains(&s) => {
            report.push(invalid(node, "allocated_storage", "must be between 5 and 1024"))
        }
        _ => {}
    }

    if let Some(window) = &db.maintenance_window {
        if !is_weekly_window(window) {
            report.push(invalid(
                node,
                "preferred_maintenance_window",
                "must be in UTC format 'ddd:hh24:mi-ddd:hh24:mi'",
            ));
        }
    }

    if let Some(days) = db.backup_retention {
        if days > 8 {
            report.push(invalid(node, "backup_retention_period", "must be between 0 and 8"));
        }
    }

    if let Some(window) = &db.backup_window {
        if !is_daily_window(window) {
            report.push(invalid(
                node,
                "preferred_backup_window",
                "must be in UTC format 'hh24:mi-hh24:mi'",
            ));
        }
    }

    for p in &db.parameters {
        if p.name.is_empty() {
            report.push(invalid(node, "db_parameters", "entries must have a name"));
        }
    }
}

/// `hh24:mi`
fn is_clock(s: &str) -> bool {
    let Some((h, m)) = s.split_once(':') else {
        return false;
    };
    let two_digits = |p: &str| p.len() == 2 && p.chars().all(|c| c.is_ascii_digit());
    two_digits(h)
        && two_digits(m)
        && h.parse::<u8>().map_or(false, |h| h <= 23)
        && m.parse::<u8>().map_or(false, |m| m <= 59)
}

/// `hh24:mi-hh24:mi`
fn is_daily_window(s: &str) -> bool {
    match s.split_once('-') {
        Some((from, to)) => is_clock(from) && is_clock(to),
        None => false,
    }
}

/// `ddd:hh24:mi`
fn is_weekly_point(s: &str) -> bool {
    match s.split_once(':') {
        Some((day, clock)) => WEEKDAYS.contains(&day) && is_clock(clock),
        None => false,
    }
}

/// `ddd:hh24:mi-ddd:hh24:mi`
fn is_weekly_window(s: &str) -> bool {
    match s.split_once('-') {
        Some((from, to)) => is_weekly_point(from) && is_weekly_point(to),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigger_domain::{
        Account, CloudBuilder, ComputeSpec, DatabaseSpec, HealthCheck, Listener, LoadBalancerSpec,
    };
    use rstest::rstest;

    fn account() -> Account {
        Account {
            account_id:   "1234-5678-9012".into(),
            access_key:   None,
            secret_key:   None,
            region:       "us-east-1".into(),
            keypair_name: "deploy".into(),
            keypair_file: "/keys/deploy.pem".into(),
            asset_bucket: "assets".into(),
        }
    }

    fn compute() -> ComputeSpec {
        ComputeSpec {
            image_id:      "ami-1".into(),
            instance_type: "m1.small".into(),
            zone:          "us-east-1a".into(),
            roles:         vec!["web".into()],
            ..Default::default()
        }
    }

    fn database() -> DatabaseSpec {
        DatabaseSpec {
            engine:             "MySQL5.1".into(),
            instance_class:     "db.m1.small".into(),
            master_username:    "admin".into(),
            master_password:    "secret123".into(),
            port:               Some(3306),
            allocated_storage:  Some(10),
            zone:               "us-east-1a".into(),
            maintenance_window: Some("Sun:03:00-Sun:04:00".into()),
            backup_window:      Some("05:00-06:00".into()),
            backup_retention:   Some(3),
            parameters:         vec![],
        }
    }

    fn valid_builder() -> CloudBuilder {
        let mut b = CloudBuilder::new("prod", account()).unwrap();
        b.role("web", vec![80, 443]).unwrap();
        b.compute("web-1", compute()).unwrap();
        b.load_balancer(
            "front",
            LoadBalancerSpec {
                listeners: vec![Listener {
                    load_balancer_port: 80,
                    instance_port:      80,
                    protocol:           "http".into(),
                }],
                health_check: Some(HealthCheck {
                    target:              "HTTP:80/".into(),
                    timeout:             5,
                    interval:            30,
                    unhealthy_threshold: 2,
                    healthy_threshold:   10,
                }),
                members: vec!["web-1".into()],
                zones:   vec!["us-east-1a".into()],
            },
        )
        .unwrap();
        b.database("db", database()).unwrap();
        b
    }

    #[test]
    fn valid_cloud_passes() {
        let report = validate(&valid_builder().build());
        assert!(report.is_valid(), "{:?}", report.messages());
    }

    #[test]
    fn empty_cloud_reports_everything_missing() {
        let cloud = CloudBuilder::new("bare", Account::default()).unwrap().build();
        let report = validate(&cloud);
        assert!(report.errors.contains(&ValidationError::NoRoles));
        assert!(report.errors.contains(&ValidationError::NoNodes));
        assert!(report
            .errors
            .contains(&ValidationError::MissingCloudField { field: "keypair_file" }));
        assert!(report
            .errors
            .contains(&ValidationError::MissingCloudField { field: "asset_bucket" }));
    }

    #[test]
    fn half_declared_volume_is_rejected() {
        let mut b = valid_builder();
        b.compute("web-2", ComputeSpec { device: Some("/dev/sdh".into()), ..compute() })
            .unwrap();
        let report = validate(&b.build());
        assert_eq!(
            report.errors,
            vec![ValidationError::IncompleteVolume { node: "web-2".into(), missing: "volume_id" }]
        );
    }

    #[test]
    fn compute_roles_must_be_declared() {
        let mut b = valid_builder();
        b.compute("web-2", ComputeSpec { roles: vec!["cache".into()], ..compute() })
            .unwrap();
        let report = validate(&b.build());
        assert_eq!(
            report.messages(),
            vec!["'web-2' node references undeclared role 'cache'"]
        );
    }

    #[test]
    fn load_balancer_members_must_be_compute_nodes() {
        let mut b = CloudBuilder::new("prod", account()).unwrap();
        b.role("web", vec![]).unwrap();
        b.database("db", database()).unwrap();
        b.load_balancer(
            "front",
            LoadBalancerSpec {
                listeners: vec![Listener {
                    load_balancer_port: 80,
                    instance_port:      8080,
                    protocol:           "TCP".into(),
                }],
                members: vec!["db".into()],
                zones:   vec!["us-east-1a".into()],
                ..Default::default()
            },
        )
        .unwrap();
        let report = validate(&b.build());
        assert_eq!(
            report.errors,
            vec![ValidationError::UnknownMember { node: "front".into(), member: "db".into() }]
        );
    }

    #[rstest]
    #[case("1front", "must start with a letter")]
    #[case("front-", "must not end with a hyphen")]
    #[case("fr--ont", "must not contain two consecutive hyphens")]
    #[case("front_lb", "may only contain alphanumerics and hyphens")]
    #[case("abcdefghijklmnopqrstuvwxyzabcdefg", "must be less than 32 characters")]
    fn load_balancer_names_follow_provider_rules(#[case] name: &str, #[case] reason: &'static str) {
        let mut b = CloudBuilder::new("prod", account()).unwrap();
        b.role("web", vec![]).unwrap();
        b.compute("web-1", compute()).unwrap();
        b.load_balancer(
            name,
            LoadBalancerSpec {
                listeners: vec![Listener {
                    load_balancer_port: 80,
                    instance_port:      80,
                    protocol:           "HTTP".into(),
                }],
                members: vec!["web-1".into()],
                zones:   vec!["us-east-1a".into()],
                ..Default::default()
            },
        )
        .unwrap();
        let report = validate(&b.build());
        assert_eq!(
            report.errors,
            vec![ValidationError::InvalidNodeName { node: name.into(), reason }]
        );
    }

    #[rstest]
    #[case(DatabaseSpec { port: Some(80), ..database() }, "port")]
    #[case(DatabaseSpec { allocated_storage: Some(2048), ..database() }, "allocated_storage")]
    #[case(DatabaseSpec { master_username: "9admin".into(), ..database() }, "master_username")]
    #[case(DatabaseSpec { master_password: "abc".into(), ..database() }, "master_user_password")]
    #[case(DatabaseSpec { backup_retention: Some(9), ..database() }, "backup_retention_period")]
    #[case(DatabaseSpec { maintenance_window: Some("Sun:25:00-Sun:04:00".into()), ..database() }, "preferred_maintenance_window")]
    #[case(DatabaseSpec { backup_window: Some("5:00-06:00".into()), ..database() }, "preferred_backup_window")]
    #[case(DatabaseSpec { engine: "oracle".into(), ..database() }, "engine")]
    #[case(DatabaseSpec { engine: "mysql".into(), ..database() }, "engine")]
    #[case(DatabaseSpec { engine: "postgres".into(), ..database() }, "engine")]
    fn database_fields_are_range_checked(#[case] spec: DatabaseSpec, #[case] field: &'static str) {
        let mut b = CloudBuilder::new("prod", account()).unwrap();
        b.role("web", vec![]).unwrap();
        b.database("db", spec).unwrap();
        let report = validate(&b.build());
        assert_eq!(report.errors.len(), 1, "{:?}", report.messages());
        assert!(matches!(
            &report.errors[0],
            ValidationError::InvalidValue { field: f, .. } if *f == field
        ));
    }

    #[test]
    fn windows_parse() {
        assert!(is_daily_window("00:00-23:59"));
        assert!(!is_daily_window("24:00-01:00"));
        assert!(is_weekly_window("Mon:00:30-Tue:01:00"));
        assert!(!is_weekly_window("Monday:00:30-Tue:01:00"));
    }
}
