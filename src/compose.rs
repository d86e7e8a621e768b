use std::collections::BTreeMap;

use docker_compose_types::{
    Compose, ComposeNetworks, ComposeVolume, Environment, Labels, MapOrEmpty, NetworkSettings,
    Networks, Ports, Service, Services, TopLevelVolumes, Volumes,
};
use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Render the `docker-compose.yml` for a dockerfile-built app.
///
/// The container publishes only on loopback at the allocated port;
/// the reverse proxy is the public face, same as native builds.
pub fn render(
    app_name: &str,
    port: u16,
    container_port: u16,
    env_vars: &BTreeMap<String, String>,
) -> Result<String> {
    let mut services = IndexMap::new();
    services.insert(
        app_name.to_string(),
        Some(app_service(app_name, port, container_port, env_vars)),
    );

    let compose = Compose {
        services: Services(services),
        volumes: top_level_volumes(app_name),
        networks: network(app_name),
        ..Default::default()
    };

    serde_yaml::to_string(&compose)
        .map_err(|e| Error::Deployment(format!("compose render: {e}")))
}

fn app_service(
    app_name: &str,
    port: u16,
    container_port: u16,
    env_vars: &BTreeMap<String, String>,
) -> Service {
    let environment = if env_vars.is_empty() {
        Environment::default()
    } else {
        Environment::List(env_vars.iter().map(|(k, v)| format!("{k}={v}")).collect())
    };

    Service {
        build_: Some(docker_compose_types::BuildStep::Simple(".".to_string())),
        container_name: Some(app_name.to_string()),
        restart: Some("unless-stopped".to_string()),
        ports: Ports::Short(vec![format!("127.0.0.1:{port}:{container_port}")]),
        environment,
        env_file: Some(docker_compose_types::StringOrList::Simple(
            "../shared/.env".to_string(),
        )),
        volumes: vec![Volumes::Simple(format!("{app_name}-data:/data"))],
        networks: Networks::Simple(vec![format!("{app_name}-network")]),
        ..Default::default()
    }
}

fn local_volume() -> ComposeVolume {
    ComposeVolume {
        driver: Some("local".to_string()),
        driver_opts: IndexMap::new(),
        external: None,
        labels: Labels::default(),
        name: None,
    }
}

fn top_level_volumes(app_name: &str) -> TopLevelVolumes {
    let mut vols = IndexMap::new();
    vols.insert(format!("{app_name}-data"), MapOrEmpty::Map(local_volume()));
    TopLevelVolumes(vols)
}

fn network(app_name: &str) -> ComposeNetworks {
    let mut nets = IndexMap::new();
    nets.insert(
        format!("{app_name}-network"),
        MapOrEmpty::Map(NetworkSettings {
            driver: Some("bridge".to_string()),
            ..Default::default()
        }),
    );
    ComposeNetworks(nets)
}
