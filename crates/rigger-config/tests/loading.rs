use rigger_config::{load_cloud, load_clouds, parse_cloud, ConfigError};
use rigger_domain::DomainError;
use std::path::Path;

fn fixtures() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[test]
fn load_valid_fixture() {
    let clouds = load_clouds(&fixtures().join("clouds")).expect("should load without error");
    let names: Vec<_> = clouds.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["production", "staging"]);

    let prod = &clouds[0];
    assert_eq!(prod.account.region, "us-east-1");
    assert_eq!(prod.role("web").unwrap().public_ports, vec![80, 443]);
    assert!(prod.role("app").unwrap().public_ports.is_empty());

    let web = prod.node("web-1").unwrap().as_compute().unwrap();
    assert_eq!(web.ssh_user, "root");
    assert_eq!(web.volume(), Some(("vol-0a1b2c3d", "/dev/sdh")));
    assert_eq!(web.descriptor()["nginx"]["worker_processes"], 4);

    let front = prod.node("front").unwrap().as_load_balancer().unwrap();
    assert_eq!(front.balancer_name, "production-front");
    assert_eq!(front.health_check.as_ref().unwrap().target, "TCP:80");

    let db = prod.node("db").unwrap().as_database().unwrap();
    assert_eq!(db.parameter_group_name.as_deref(), Some("production-db-dbparams"));
    assert_eq!(db.parameters[0].value, "500");
    assert_eq!(db.parameters[1].value, "utf8");

    let staging = &clouds[1];
    assert_eq!(staging.node("web-1").unwrap().as_compute().unwrap().ssh_user, "ubuntu");
}

#[test]
fn fixtures_pass_validation() {
    for cloud in load_clouds(&fixtures().join("clouds")).unwrap() {
        let report = rigger_validate::validate(&cloud);
        assert!(report.is_valid(), "{}: {:?}", cloud.name(), report.messages());
    }
}

#[test]
fn unknown_fields_are_rejected() {
    let err = load_cloud(&fixtures().join("broken/unknown_field.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::YamlParse { .. }), "{}", err);
}

#[test]
fn duplicate_node_names_are_rejected() {
    let err = load_cloud(&fixtures().join("broken/duplicate_node.yml")).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Domain { source: DomainError::DuplicateNode(ref n), .. } if n == "web-1"
    ));
}

#[test]
fn unknown_node_type_is_rejected() {
    let yaml = "name: x\nnodes:\n  - type: lambda\n    name: f\n";
    assert!(parse_cloud(yaml, Path::new("inline.yml")).is_err());
}

#[test]
fn duplicate_cloud_names_across_files_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a.yml"), "name: same\n").unwrap();
    std::fs::write(tmp.path().join("b.yml"), "name: same\n").unwrap();
    let err = load_clouds(tmp.path()).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateCloud { ref name, .. } if name == "same"));
}

#[test]
fn missing_dir_returns_error() {
    let dir = Path::new("/nonexistent/path/does/not/exist");
    assert!(load_clouds(dir).is_err());
}
