//! Rendered server-side artifacts: proxy sites, cloud-init
//! user-data, systemd units, compose stacks.

use std::collections::BTreeMap;

use lightfold::cloudinit;
use lightfold::compose;
use lightfold::proxy::{ProxyConfig, caddy, nginx};
use lightfold::service;

const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIExample user@host";

#[test]
fn nginx_routes_domain_to_app_port() {
    let config = ProxyConfig::new("web", 3000).with_domain("web.example.com");
    let site = nginx::render_site(&config);
    assert!(site.contains("server_name web.example.com;"));
    assert!(site.contains("proxy_pass http://127.0.0.1:3000;"));
}

#[test]
fn nginx_ssl_site_has_cert_paths_and_redirect() {
    let config = ProxyConfig::new("web", 3000)
        .with_domain("web.example.com")
        .with_ssl(
            "/etc/letsencrypt/live/web.example.com/fullchain.pem",
            "/etc/letsencrypt/live/web.example.com/privkey.pem",
        );
    let site = nginx::render_site(&config);
    assert!(site.contains("listen 443 ssl;"));
    assert!(site.contains("fullchain.pem"));
    assert!(site.contains("privkey.pem"));
    assert!(site.contains("return 301 https://"));
}

#[test]
fn nginx_single_domainless_app_owns_port_80() {
    let site = nginx::render_site(&ProxyConfig::new("web", 3000));
    assert!(site.contains("listen 80 default_server;"));
}

#[test]
fn caddy_site_for_domain() {
    let config = ProxyConfig::new("api", 3001).with_domain("api.example.com");
    let site = caddy::render_site(&config);
    assert!(site.contains("api.example.com {"));
    assert!(site.contains("reverse_proxy 127.0.0.1:3001"));
}

#[test]
fn caddy_domainless_site_binds_port_80() {
    let site = caddy::render_site(&ProxyConfig::new("web", 3000));
    assert!(site.contains(":80 {"));
}

#[test]
fn caddy_main_imports_per_app_sites() {
    assert!(caddy::render_main().contains("import /etc/caddy/sites/*.caddy"));
}

#[test]
fn cloud_init_trusts_the_deploy_key() {
    let data = cloudinit::build_user_data(KEY);
    assert!(data.contains("name: deploy"));
    assert!(data.contains(KEY));
    assert!(data.contains("touch /etc/lightfold/created"));
}

#[test]
fn cloud_init_firewall_is_default_deny() {
    let data = cloudinit::build_user_data(KEY);
    assert!(data.contains("ufw default deny incoming"));
    assert!(data.contains("ufw allow 22/tcp"));
}

#[test]
fn unit_for_dashed_app_name() {
    assert_eq!(service::unit_name("my-cool-app"), "my_cool_app.service");

    let unit = service::render_unit("my-cool-app", 3002, "npm run start");
    assert!(unit.contains("WorkingDirectory=/srv/my-cool-app/current"));
    assert!(unit.contains("Environment=PORT=3002"));
}

#[test]
fn env_file_renders_sorted_pairs() {
    let mut vars = BTreeMap::new();
    vars.insert("B_VAR".to_string(), "2".to_string());
    vars.insert("A_VAR".to_string(), "1".to_string());

    let env = service::render_env_file(&vars, 3000);
    let a = env.find("A_VAR").unwrap();
    let b = env.find("B_VAR").unwrap();
    assert!(a < b);
}

#[test]
fn compose_stack_publishes_loopback_only() {
    let yaml = compose::render("svc", 3004, 8080, &BTreeMap::new()).unwrap();
    assert!(yaml.contains("127.0.0.1:3004:8080"));
    assert!(!yaml.contains("0.0.0.0"));
}

#[test]
fn compose_stack_parses_back_as_yaml() {
    let yaml = compose::render("svc", 3004, 8080, &BTreeMap::new()).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    assert!(doc["services"]["svc"].is_mapping());
}
