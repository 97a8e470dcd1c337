use serde_json::json;

use crate::*;

fn web_cloud() -> Cloud {
    let mut b = CloudBuilder::new("prod", Account::default()).unwrap();
    b.role("web", vec![80, 443]).unwrap();
    b.role("app", vec![]).unwrap();
    let mut attributes = serde_json::Map::new();
    attributes.insert("nginx".into(), json!({ "port": 80 }));
    b.compute(
        "web-1",
        ComputeSpec {
            image_id: "ami-123".into(),
            instance_type: "m1.small".into(),
            zone: "us-east-1a".into(),
            roles: vec!["web".into(), "app".into()],
            attributes,
            ..Default::default()
        },
    )
    .unwrap();
    b.load_balancer(
        "lb",
        LoadBalancerSpec { members: vec!["web-1".into()], ..Default::default() },
    )
    .unwrap();
    b.database("db", DatabaseSpec::default()).unwrap();
    b.build()
}

#[test]
fn compute_node_groups_include_default_last() {
    let cloud = web_cloud();
    let (_, web) = cloud.compute_nodes().next().unwrap();
    assert_eq!(
        web.security_groups(),
        vec!["prod.node.web-1", "prod.role.web", "prod.role.app", "prod.role.default"]
    );
}

#[test]
fn descriptor_merges_attributes_after_run_list() {
    let cloud = web_cloud();
    let node = cloud.node("web-1").unwrap();
    let compute = node.as_compute().unwrap();
    assert_eq!(compute.descriptor_filename, "prod-web-1.json");
    assert_eq!(
        compute.descriptor(),
        json!({ "run_list": ["role[web]", "role[app]"], "nginx": { "port": 80 } })
    );
}

#[test]
fn only_compute_nodes_are_configurable() {
    let cloud = web_cloud();
    let names: Vec<_> = cloud.configurable_nodes().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["web-1"]);
}

#[test]
fn database_without_parameters_has_no_parameter_group() {
    let cloud = web_cloud();
    let (_, db) = cloud.database_nodes().next().unwrap();
    assert_eq!(db.identifier, "prod-db");
    assert!(db.parameter_group_name.is_none());
    assert_eq!(db.security_group_name, "prod-db-security-group");
}

#[test]
fn duplicate_node_names_are_rejected_across_kinds() {
    let mut b = CloudBuilder::new("prod", Account::default()).unwrap();
    b.compute("shared", ComputeSpec::default()).unwrap();
    let err = b.database("shared", DatabaseSpec::default()).unwrap_err();
    assert!(matches!(err, DomainError::DuplicateNode(n) if n == "shared"));
}

#[test]
fn duplicate_roles_are_rejected() {
    let mut b = CloudBuilder::new("prod", Account::default()).unwrap();
    b.role("web", vec![80]).unwrap();
    assert!(matches!(b.role("web", vec![]), Err(DomainError::DuplicateRole(_))));
}

#[test]
fn whitespace_in_names_is_rejected() {
    assert!(CloudBuilder::new("my cloud", Account::default()).is_err());
    let mut b = CloudBuilder::new("prod", Account::default()).unwrap();
    assert!(matches!(
        b.compute("web 1", ComputeSpec::default()),
        Err(DomainError::InvalidName { kind: "node", .. })
    ));
}

#[test]
fn volume_requires_both_id_and_device() {
    let mut b = CloudBuilder::new("prod", Account::default()).unwrap();
    b.compute(
        "half",
        ComputeSpec { volume_id: Some("vol-1".into()), ..Default::default() },
    )
    .unwrap();
    let cloud = b.build();
    assert!(cloud.node("half").unwrap().as_compute().unwrap().volume().is_none());
}

#[test]
fn hostnames_are_mutable_after_build() {
    let mut cloud = web_cloud();
    cloud.set_hostname("web-1", Some("ec2-1-2-3-4.compute.amazonaws.com".into()));
    assert_eq!(
        cloud.node("web-1").unwrap().hostname.as_deref(),
        Some("ec2-1-2-3-4.compute.amazonaws.com")
    );
}
