//! Round-trip and lifecycle behavior of the local state stores.

use std::path::PathBuf;

use lightfold::config::{
    Builder, ByosConfig, Config, ConfigStore, DigitalOceanConfig, ProviderConfig, Target,
};
use lightfold::runtimes::Runtime;
use lightfold::server_state::{DeployedApp, ServerState, ServerStore};
use lightfold::state::{StateStore, TargetState};

fn do_target(name: &str) -> Target {
    Target {
        name: name.to_string(),
        project_path: PathBuf::from("/tmp/app"),
        framework: "Next.js".to_string(),
        language: "JavaScript/TypeScript".to_string(),
        provider_config: ProviderConfig::Digitalocean(DigitalOceanConfig {
            region: "nyc1".to_string(),
            size: "s-1vcpu-1gb".to_string(),
            image: "ubuntu-24-04-x64".to_string(),
            username: "deploy".to_string(),
            ..Default::default()
        }),
        builder: Builder::Native,
        server_ip: String::new(),
        port: 0,
        domain: None,
        deploy_options: None,
    }
}

fn app(name: &str, port: u16, framework: &str) -> DeployedApp {
    DeployedApp {
        target_name: name.to_string(),
        app_name: name.to_string(),
        port,
        domain: None,
        framework: framework.to_string(),
        last_deploy: None,
    }
}

#[test]
fn target_state_roundtrip_preserves_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().to_path_buf());

    let state = TargetState {
        created: true,
        configured: true,
        last_commit: Some("deadbeef".to_string()),
        last_release: Some("20250101000000".to_string()),
        last_deploy: Some(chrono::Utc::now()),
        provisioned_id: Some("d-42".to_string()),
        ssl_configured: true,
        last_ssl_renewal: None,
        push_failed: false,
        push_failure_reason: None,
    };
    store.save("web", &state).unwrap();
    assert_eq!(store.load("web").unwrap(), state);
}

#[test]
fn config_tokens_never_appear_in_target_files() {
    // Tokens live in tokens.json only; serializing a target must
    // not leak anything token-shaped.
    let target = do_target("web");
    let json = serde_json::to_string(&target).unwrap();
    assert!(!json.contains("token"));
    assert!(!json.contains("secret"));
}

#[test]
fn config_store_persists_multiple_targets_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().to_path_buf());

    let mut config = Config::default();
    config.targets.insert("web".to_string(), do_target("web"));
    config.targets.insert("api".to_string(), do_target("api"));
    store.save(&config).unwrap();

    let loaded = store.load().unwrap();
    let names: Vec<&String> = loaded.targets.keys().collect();
    assert_eq!(names, vec!["web", "api"]);
}

#[test]
fn same_project_path_different_target_names() {
    let mut config = Config::default();
    let mut staging = do_target("app-staging");
    let mut prod = do_target("app-prod");
    staging.project_path = PathBuf::from("/tmp/shared");
    prod.project_path = PathBuf::from("/tmp/shared");
    config.targets.insert("app-staging".to_string(), staging);
    config.targets.insert("app-prod".to_string(), prod);

    assert_eq!(config.targets.len(), 2);
    assert!(
        config
            .targets
            .values()
            .all(|t| t.project_path == PathBuf::from("/tmp/shared"))
    );
}

#[test]
fn second_app_on_same_vm_gets_next_port() {
    // A Django API joins a Next.js app on one server.
    let dir = tempfile::tempdir().unwrap();
    let store = ServerStore::new(dir.path().to_path_buf());

    let mut server = ServerState::new("164.90.1.1", "digitalocean");
    let web_port = server.allocate_port().unwrap();
    server.register_app(app("web", web_port, "Next.js"));
    server.add_runtime(Runtime::Nodejs);

    let api_port = server.allocate_port().unwrap();
    server.register_app(app("api", api_port, "Django"));
    server.add_runtime(Runtime::Python);
    store.save(&server).unwrap();

    assert_eq!((web_port, api_port), (3000, 3001));

    let loaded = store.load("164.90.1.1").unwrap().unwrap();
    assert_eq!(loaded.deployed_apps.len(), 2);
    assert!(loaded.installed_runtimes.contains(&Runtime::Nodejs));
    assert!(loaded.installed_runtimes.contains(&Runtime::Python));
}

#[test]
fn destroying_one_app_preserves_the_other() {
    let dir = tempfile::tempdir().unwrap();
    let store = ServerStore::new(dir.path().to_path_buf());

    let mut server = ServerState::new("164.90.1.1", "digitalocean");
    server.register_app(app("web", 3000, "Next.js"));
    server.register_app(app("api", 3001, "Django"));
    store.save(&server).unwrap();

    let remaining = store.unregister_app("164.90.1.1", "api").unwrap().unwrap();
    assert_eq!(remaining.deployed_apps.len(), 1);
    assert_eq!(remaining.deployed_apps[0].target_name, "web");

    // The freed port is reissued before anything higher.
    let mut reloaded = store.load("164.90.1.1").unwrap().unwrap();
    assert_eq!(reloaded.allocate_port().unwrap(), 3001);
}

#[test]
fn port_exhaustion_reports_error_without_cursor_mutation() {
    let mut server = ServerState::new("10.9.9.9", "vultr");
    for port in 3000..=9000u16 {
        server.register_app(app(&format!("app-{port}"), port, "Go"));
    }

    let cursor_before = server.next_port;
    let err = server.allocate_port().unwrap_err();
    assert!(err.to_string().contains("no free port"));
    assert_eq!(server.next_port, cursor_before);
}

#[test]
fn port_is_stable_across_re_registration() {
    // Re-deploying an app must not move its port.
    let mut server = ServerState::new("10.0.0.5", "hetzner");
    let port = server.allocate_port().unwrap();
    server.register_app(app("web", port, "Next.js"));

    let mut updated = app("web", port, "Next.js");
    updated.last_deploy = Some(chrono::Utc::now());
    server.register_app(updated);

    assert_eq!(server.deployed_apps.len(), 1);
    assert_eq!(server.deployed_apps[0].port, port);
}

#[test]
fn byos_target_counts_as_provisioned_with_ip() {
    let config = ProviderConfig::Byos(ByosConfig {
        ip: "198.51.100.3".to_string(),
        username: "root".to_string(),
        ssh_key_path: String::new(),
    });
    assert!(config.is_provisioned());
}

#[test]
fn push_failure_state_machine() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().to_path_buf());

    store
        .record_push_failure("web", "health check failed for web after 5 attempts")
        .unwrap();
    let failed = store.load("web").unwrap();
    assert!(failed.push_failed);

    store.record_push("web", Some("abc"), "20250103000000").unwrap();
    let ok = store.load("web").unwrap();
    assert!(!ok.push_failed);
    assert_eq!(ok.push_failure_reason, None);
    assert_eq!(ok.last_release.as_deref(), Some("20250103000000"));
}
