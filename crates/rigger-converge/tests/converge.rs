//! Whole-cloud convergence against the in-memory provider.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rigger_config::ConfigRoot;
use rigger_converge::{Change, CloudController, ConvergeError, ConvergeOptions};
use rigger_domain::{Account, Cloud, CloudBuilder, ComputeSpec, DatabaseSpec, Listener, LoadBalancerSpec};
use rigger_provider::{IngressRule, MemoryProvider, Mutation, Provider};
use rigger_remote::{
    Channel, ChannelEvent, Connection, MemorySink, RemoteError, RetryPolicy, SessionOptions,
    Target, Transport,
};

fn account() -> Account {
    Account {
        account_id:   "1234-5678-9012".into(),
        region:       "us-east-1".into(),
        keypair_name: "deploy".into(),
        keypair_file: "/keys/deploy.pem".into(),
        asset_bucket: "prod-assets".into(),
        ..Default::default()
    }
}

fn web_cloud() -> Cloud {
    let mut b = CloudBuilder::new("prod", account()).unwrap();
    b.role("web", vec![80, 443]).unwrap();
    b.compute(
        "web-1",
        ComputeSpec {
            image_id:      "ami-12345678".into(),
            instance_type: "m1.small".into(),
            zone:          "us-east-1a".into(),
            roles:         vec!["web".into()],
            ..Default::default()
        },
    )
    .unwrap();
    b.build()
}

fn full_cloud() -> Cloud {
    let mut b = CloudBuilder::new("prod", account()).unwrap();
    b.role("web", vec![80]).unwrap();
    b.compute("web-1", ComputeSpec { roles: vec!["web".into()], ..Default::default() })
        .unwrap();
    b.load_balancer(
        "front",
        LoadBalancerSpec {
            listeners: vec![Listener { load_balancer_port: 80, instance_port: 80, protocol: "HTTP".into() }],
            members:   vec!["web-1".into()],
            zones:     vec!["us-east-1a".into()],
            ..Default::default()
        },
    )
    .unwrap();
    b.database("db", DatabaseSpec { engine: "MySQL5.1".into(), ..Default::default() })
        .unwrap();
    b.build()
}

fn controller(provider: &MemoryProvider) -> CloudController {
    CloudController::new(Arc::new(provider.clone()), Arc::new(provider.clone())).with_options(
        ConvergeOptions {
            poll_interval: Duration::from_millis(1),
            session: SessionOptions {
                retry: RetryPolicy { max_attempts: 2, backoff: Duration::from_millis(1) },
                max_concurrent_connects: 10,
            },
            ..Default::default()
        },
    )
}

fn authorizations(mutations: &[Mutation], group: &str) -> Vec<IngressRule> {
    mutations
        .iter()
        .filter_map(|m| match m {
            Mutation::AuthorizeIngress { group: g, rule } if g == group => Some(rule.clone()),
            _ => None,
        })
        .collect()
}

fn tcp(port: i32) -> IngressRule {
    IngressRule::Cidr { protocol: "tcp".into(), from_port: port, to_port: port, cidr: "0.0.0.0/0".into() }
}

// ── start ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_creates_groups_rules_and_one_instance() {
    let provider = MemoryProvider::new("1234-5678-9012");
    let mut cloud = web_cloud();

    let report = controller(&provider).start(&mut cloud).await;
    assert!(report.is_clean(), "{:?}", report.errors);

    let mutations = provider.mutations().await;
    let created: Vec<&str> = mutations
        .iter()
        .filter_map(|m| match m {
            Mutation::CreateSecurityGroup(g) => Some(g.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec!["prod.role.default", "prod.role.web", "prod.node.web-1"]);

    assert_eq!(
        authorizations(&mutations, "prod.role.default"),
        vec![
            tcp(22),
            IngressRule::Group { peer_group: "prod.role.default".into(), peer_owner: "1234-5678-9012".into() },
        ]
    );
    assert_eq!(authorizations(&mutations, "prod.role.web"), vec![tcp(80), tcp(443)]);
    assert!(authorizations(&mutations, "prod.node.web-1").is_empty());

    let runs = mutations.iter().filter(|m| matches!(m, Mutation::RunInstance { .. })).count();
    assert_eq!(runs, 1);
    assert!(cloud.node("web-1").unwrap().hostname.is_some());
}

#[tokio::test]
async fn second_start_reports_already_running() {
    let provider = MemoryProvider::new("1234-5678-9012");
    let mut cloud = web_cloud();
    let controller = controller(&provider);

    controller.start(&mut cloud).await;
    provider.clear_mutations().await;

    let report = controller.start(&mut cloud).await;
    assert_eq!(report.creates(), 0);
    assert_eq!(report.already_running, vec!["web-1"]);
    assert_eq!(provider.mutation_count().await, 0);
}

#[tokio::test]
async fn start_brings_up_every_node_kind_in_order() {
    let provider = MemoryProvider::new("1234-5678-9012");
    let mut cloud = full_cloud();

    let report = controller(&provider).start(&mut cloud).await;
    assert!(report.is_clean(), "{:?}", report.errors);

    let mutations = provider.mutations().await;
    let position = |pred: &dyn Fn(&Mutation) -> bool| mutations.iter().position(pred).unwrap();
    let db_group = position(&|m| matches!(m, Mutation::CreateDbSecurityGroup(_)));
    let db = position(&|m| matches!(m, Mutation::CreateDbInstance(_)));
    let ec2 = position(&|m| matches!(m, Mutation::RunInstance { .. }));
    let elb = position(&|m| matches!(m, Mutation::CreateLoadBalancer(_)));
    let registered = position(&|m| matches!(m, Mutation::RegisterInstances { .. }));
    assert!(db_group < db && db < ec2 && ec2 < elb && elb < registered);

    assert!(mutations.contains(&Mutation::AuthorizeDbSecurityGroup {
        group:     "prod-db-security-group".into(),
        ec2_group: "prod.role.default".into(),
    }));
    assert_eq!(cloud.node("db").unwrap().hostname.as_deref(), Some("prod-db.rds.memory"));
    assert!(cloud.node("front").unwrap().hostname.is_some());
}

#[tokio::test]
async fn database_only_cloud_skips_ec2_and_default_grant() {
    let provider = MemoryProvider::default();
    let mut b = CloudBuilder::new("prod", account()).unwrap();
    b.database("db", DatabaseSpec { engine: "MySQL5.1".into(), ..Default::default() })
        .unwrap();
    let mut cloud = b.build();

    controller(&provider).start(&mut cloud).await;
    let mutations = provider.mutations().await;
    assert!(!mutations.iter().any(|m| matches!(
        m,
        Mutation::CreateSecurityGroup(_) | Mutation::AuthorizeDbSecurityGroup { .. }
    )));
    assert!(mutations.contains(&Mutation::CreateDbInstance("prod-db".into())));
}

#[tokio::test]
async fn provider_failures_are_reported_and_the_pass_continues() {
    let provider = MemoryProvider::default();
    provider.fail_on("create_db_instance", "InsufficientDBInstanceCapacity").await;
    let mut cloud = full_cloud();

    let report = controller(&provider).start(&mut cloud).await;
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("InsufficientDBInstanceCapacity"));
    assert!(report.changes.iter().any(|c| matches!(c, Change::InstanceStarted { .. })));
}

// ── shutdown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_removes_balancers_then_instances_then_databases() {
    let provider = MemoryProvider::default();
    let mut cloud = full_cloud();
    let controller = controller(&provider);
    controller.start(&mut cloud).await;
    provider.clear_mutations().await;

    let report = controller.shutdown(&mut cloud).await;
    assert!(report.is_clean(), "{:?}", report.errors);

    let kinds: Vec<&str> = provider
        .mutations()
        .await
        .iter()
        .map(|m| match m {
            Mutation::DeleteLoadBalancer(_) => "elb",
            Mutation::TerminateInstances(_) => "ec2",
            Mutation::DeleteDbInstance { .. } => "rds",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["elb", "ec2", "rds"]);

    let status = controller.status(&cloud).await.unwrap();
    assert!(status.iter().all(|s| s.state == "not running"), "{:?}", status);
}

// ── configure ─────────────────────────────────────────────────────────────────

/// Every host already has chef-solo; every command succeeds.
#[derive(Clone, Default)]
struct InstalledTransport {
    commands: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl Transport for InstalledTransport {
    async fn connect(&self, target: &Target) -> Result<Arc<dyn Connection>, RemoteError> {
        Ok(Arc::new(InstalledConnection { host: target.host.clone(), transport: self.clone() }))
    }
}

struct InstalledConnection {
    host:      String,
    transport: InstalledTransport,
}

#[async_trait]
impl Connection for InstalledConnection {
    async fn exec(&self, command: &str) -> Result<Channel, RemoteError> {
        self.transport
            .commands
            .lock()
            .unwrap()
            .push((self.host.clone(), command.to_string()));
        let out = if command == "chef-solo --version" { "Chef: 0.8.14" } else { "ok" };
        Ok(Channel::from_events(
            self.host.clone(),
            vec![ChannelEvent::Stdout(out.into()), ChannelEvent::Exit(0)],
        ))
    }

    async fn close(&self) {}
}

#[tokio::test]
async fn configure_publishes_assets_and_runs_chef_with_presigned_urls() {
    let dir = tempfile::tempdir().unwrap();
    let root = ConfigRoot::new(dir.path());
    root.create_dirs().unwrap();
    std::fs::create_dir_all(root.cookbooks_dir().join("nginx/recipes")).unwrap();
    std::fs::write(root.cookbooks_dir().join("nginx/recipes/default.rb"), "package 'nginx'\n").unwrap();

    let provider = MemoryProvider::default();
    let transport = InstalledTransport::default();
    let controller = controller(&provider)
        .with_transport(Arc::new(transport.clone()))
        .with_console(Arc::new(MemorySink::new()));
    let mut cloud = web_cloud();
    controller.start(&mut cloud).await;

    let report = controller.configure(&mut cloud, &root).await.unwrap();
    assert!(report.is_clean(), "{:?}", report.errors);

    let descriptor = provider.object("prod-assets", "prod-web-1.json").await.unwrap();
    let descriptor: serde_json::Value = serde_json::from_slice(&descriptor).unwrap();
    assert_eq!(descriptor["run_list"], serde_json::json!(["role[web]"]));
    assert!(provider.object("prod-assets", "rigger_chef_assets.tar.gz").await.is_some());

    let host = cloud.node("web-1").unwrap().hostname.clone().unwrap();
    let commands: Vec<String> = transport
        .commands
        .lock()
        .unwrap()
        .iter()
        .filter(|(h, _)| *h == host)
        .map(|(_, c)| c.clone())
        .collect();
    assert_eq!(commands.first().map(String::as_str), Some("chef-solo --version"));
    assert_eq!(
        commands.last().map(String::as_str),
        Some(
            "sudo chef-solo -c /tmp/chef-solo.rb \
             -r 'memory://prod-assets/rigger_chef_assets.tar.gz?expires=600' \
             -j 'memory://prod-assets/prod-web-1.json?expires=600'"
        )
    );
    assert!(!commands.iter().any(|c| c.contains("cat /etc/issue")));
    assert!(root.node_log_file("prod", "web-1").exists());
}

#[tokio::test]
async fn configure_without_a_running_node_fails() {
    let dir = tempfile::tempdir().unwrap();
    let root = ConfigRoot::new(dir.path());
    let provider = MemoryProvider::default();
    let mut cloud = web_cloud();

    let err = controller(&provider)
        .with_transport(Arc::new(InstalledTransport::default()))
        .configure(&mut cloud, &root)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvergeError::Remote(RemoteError::MissingHostname(ref n)) if n == "web-1"));
    assert!(provider.describe_instances().await.unwrap().is_empty());
}
