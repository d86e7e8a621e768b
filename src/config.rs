use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util;

pub const DEFAULT_KEEP_RELEASES: usize = 5;

/// A named deployment unit binding a local project to a remote
/// destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub project_path: PathBuf,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub language: String,
    #[serde(flatten)]
    pub provider_config: ProviderConfig,
    #[serde(default)]
    pub builder: Builder,
    /// Denormalized join key to the server state file.
    #[serde(default)]
    pub server_ip: String,
    /// App port on the server; 0 until the allocator assigns one.
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_options: Option<DeployOptions>,
}

impl Target {
    /// Directory and service identifier on the server.
    #[must_use]
    pub fn app_name(&self) -> String {
        util::sanitize_name(&self.name)
    }

    #[must_use]
    pub fn provider(&self) -> &'static str {
        self.provider_config.provider_name()
    }

    /// The IP used for SSH, preferring the denormalized copy.
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        if self.server_ip.is_empty() {
            self.provider_config.ip()
        } else {
            Some(&self.server_ip)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builder {
    #[default]
    Native,
    Nixpacks,
    Dockerfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub domain: String,
    #[serde(default)]
    pub ssl_enabled: bool,
    #[serde(default)]
    pub ssl_manager: String,
    #[serde(default)]
    pub proxy_type: String,
    #[serde(default)]
    pub root_domain: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployOptions {
    #[serde(default)]
    pub build_commands: Vec<String>,
    #[serde(default)]
    pub run_commands: Vec<String>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub skip_build: bool,
}

/// Per-provider configuration, tagged by provider name in the
/// stored JSON. Getters project out the common capability surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", content = "provider_config", rename_all = "snake_case")]
pub enum ProviderConfig {
    Digitalocean(DigitalOceanConfig),
    Hetzner(HetznerConfig),
    Vultr(VultrConfig),
    Linode(LinodeConfig),
    Aws(AwsConfig),
    Flyio(FlyioConfig),
    Byos(ByosConfig),
    S3(S3Config),
}

macro_rules! vm_common {
    ($cfg:expr) => {{
        let c = $cfg;
        (
            (!c.ip.is_empty()).then_some(c.ip.as_str()),
            c.username.as_str(),
            c.ssh_key_path.as_str(),
            c.server_id.as_deref(),
        )
    }};
}

impl ProviderConfig {
    #[must_use]
    pub const fn provider_name(&self) -> &'static str {
        match self {
            Self::Digitalocean(_) => "digitalocean",
            Self::Hetzner(_) => "hetzner",
            Self::Vultr(_) => "vultr",
            Self::Linode(_) => "linode",
            Self::Aws(_) => "aws",
            Self::Flyio(_) => "flyio",
            Self::Byos(_) => "byos",
            Self::S3(_) => "s3",
        }
    }

    fn common(&self) -> Option<(Option<&str>, &str, &str, Option<&str>)> {
        match self {
            Self::Digitalocean(c) => Some(vm_common!(c)),
            Self::Hetzner(c) => Some(vm_common!(c)),
            Self::Vultr(c) => Some(vm_common!(c)),
            Self::Linode(c) => Some(vm_common!(c)),
            Self::Aws(c) => Some(vm_common!(c)),
            Self::Flyio(c) => Some(vm_common!(c)),
            Self::Byos(c) => Some((
                (!c.ip.is_empty()).then_some(c.ip.as_str()),
                c.username.as_str(),
                c.ssh_key_path.as_str(),
                None,
            )),
            Self::S3(_) => None,
        }
    }

    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.common().and_then(|(ip, _, _, _)| ip)
    }

    #[must_use]
    pub fn username(&self) -> &str {
        self.common().map_or("deploy", |(_, user, _, _)| user)
    }

    #[must_use]
    pub fn ssh_key(&self) -> Option<&str> {
        self.common()
            .map(|(_, _, key, _)| key)
            .filter(|k| !k.is_empty())
    }

    #[must_use]
    pub fn server_id(&self) -> Option<&str> {
        self.common().and_then(|(_, _, _, id)| id)
    }

    /// True once the provider has created infrastructure for this
    /// target (BYOS counts as provisioned when an IP is known).
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        match self {
            Self::Byos(c) => !c.ip.is_empty(),
            Self::S3(c) => !c.bucket.is_empty(),
            _ => self.server_id().is_some(),
        }
    }

    pub fn set_ip(&mut self, new_ip: &str) {
        match self {
            Self::Digitalocean(c) => c.ip = new_ip.to_string(),
            Self::Hetzner(c) => c.ip = new_ip.to_string(),
            Self::Vultr(c) => c.ip = new_ip.to_string(),
            Self::Linode(c) => c.ip = new_ip.to_string(),
            Self::Aws(c) => c.ip = new_ip.to_string(),
            Self::Flyio(c) => c.ip = new_ip.to_string(),
            Self::Byos(c) => c.ip = new_ip.to_string(),
            Self::S3(_) => {}
        }
    }

    pub fn set_server_id(&mut self, id: &str) {
        let id = Some(id.to_string());
        match self {
            Self::Digitalocean(c) => c.server_id = id,
            Self::Hetzner(c) => c.server_id = id,
            Self::Vultr(c) => c.server_id = id,
            Self::Linode(c) => c.server_id = id,
            Self::Aws(c) => c.server_id = id,
            Self::Flyio(c) => c.server_id = id,
            Self::Byos(_) | Self::S3(_) => {}
        }
    }

    pub fn set_ssh_key(&mut self, path: &str) {
        match self {
            Self::Digitalocean(c) => c.ssh_key_path = path.to_string(),
            Self::Hetzner(c) => c.ssh_key_path = path.to_string(),
            Self::Vultr(c) => c.ssh_key_path = path.to_string(),
            Self::Linode(c) => c.ssh_key_path = path.to_string(),
            Self::Aws(c) => c.ssh_key_path = path.to_string(),
            Self::Flyio(c) => c.ssh_key_path = path.to_string(),
            Self::Byos(c) => c.ssh_key_path = path.to_string(),
            Self::S3(_) => {}
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigitalOceanConfig {
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub ssh_key_path: String,
    pub region: String,
    pub size: String,
    #[serde(default = "DigitalOceanConfig::default_image")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl DigitalOceanConfig {
    fn default_image() -> String {
        "ubuntu-24-04-x64".to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HetznerConfig {
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub ssh_key_path: String,
    pub location: String,
    pub server_type: String,
    #[serde(default = "HetznerConfig::default_image")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl HetznerConfig {
    fn default_image() -> String {
        "ubuntu-24.04".to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VultrConfig {
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub ssh_key_path: String,
    pub region: String,
    pub plan: String,
    #[serde(default = "VultrConfig::default_os")]
    pub os_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl VultrConfig {
    fn default_os() -> String {
        // Vultr OS id for Ubuntu 24.04 LTS x64
        "2284".to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinodeConfig {
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub ssh_key_path: String,
    pub region: String,
    pub type_id: String,
    #[serde(default = "LinodeConfig::default_image")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl LinodeConfig {
    fn default_image() -> String {
        "linode/ubuntu24.04".to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub ssh_key_path: String,
    pub region: String,
    pub instance_type: String,
    #[serde(default)]
    pub ami: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlyioConfig {
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub ssh_key_path: String,
    pub region: String,
    #[serde(default = "FlyioConfig::default_size")]
    pub vm_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl FlyioConfig {
    fn default_size() -> String {
        "shared-cpu-1x".to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ByosConfig {
    pub ip: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub ssh_key_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
}

fn default_username() -> String {
    "deploy".to_string()
}

/// Global options plus the target table, persisted as one JSON
/// document at `~/.lightfold/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub targets: IndexMap<String, Target>,
    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,
}

const fn default_keep_releases() -> usize {
    DEFAULT_KEEP_RELEASES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: IndexMap::new(),
            keep_releases: DEFAULT_KEEP_RELEASES,
        }
    }
}

/// On-disk config store rooted at `~/.lightfold` (or a test root).
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(util::home_dir()?))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Load the config, recovering with an empty store when the
    /// file is missing or unreadable as JSON.
    pub fn load(&self) -> Result<Config> {
        let path = self.path();
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        match serde_json::from_str(&raw) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed config, starting empty");
                Ok(Config::default())
            }
        }
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        let raw = serde_json::to_vec_pretty(config)?;
        util::atomic_write_private(&self.path(), &raw)
            .map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_target() -> Target {
        Target {
            name: "web".to_string(),
            project_path: PathBuf::from("/tmp/web"),
            framework: "Next.js".to_string(),
            language: "JavaScript/TypeScript".to_string(),
            provider_config: ProviderConfig::Digitalocean(DigitalOceanConfig {
                region: "nyc1".to_string(),
                size: "s-1vcpu-1gb".to_string(),
                image: DigitalOceanConfig::default_image(),
                username: default_username(),
                ..Default::default()
            }),
            builder: Builder::Native,
            server_ip: String::new(),
            port: 0,
            domain: None,
            deploy_options: None,
        }
    }

    #[test]
    fn provider_config_tag_roundtrip() {
        let target = sample_target();
        let json = serde_json::to_string(&target).unwrap();
        assert!(json.contains(r#""provider":"digitalocean""#));

        let back: Target = serde_json::from_str(&json).unwrap();
        assert_eq!(back.provider(), "digitalocean");
        assert!(!back.provider_config.is_provisioned());
    }

    #[test]
    fn provisioned_after_server_id() {
        let mut target = sample_target();
        target.provider_config.set_server_id("12345");
        assert!(target.provider_config.is_provisioned());
        assert_eq!(target.provider_config.server_id(), Some("12345"));
    }

    #[test]
    fn byos_provisioned_means_ip_known() {
        let cfg = ProviderConfig::Byos(ByosConfig {
            ip: "203.0.113.7".to_string(),
            username: "root".to_string(),
            ssh_key_path: String::new(),
        });
        assert!(cfg.is_provisioned());
        assert_eq!(cfg.username(), "root");
        assert_eq!(cfg.server_id(), None);
    }

    #[test]
    fn ip_prefers_denormalized_copy() {
        let mut target = sample_target();
        assert_eq!(target.ip(), None);
        target.provider_config.set_ip("10.0.0.1");
        assert_eq!(target.ip(), Some("10.0.0.1"));
        target.server_ip = "10.0.0.2".to_string();
        assert_eq!(target.ip(), Some("10.0.0.2"));
    }

    #[test]
    fn store_roundtrip_and_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());

        let mut config = Config::default();
        config.targets.insert("web".to_string(), sample_target());
        config.keep_releases = 3;
        store.save(&config).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.keep_releases, 3);
        assert!(loaded.targets.contains_key("web"));

        std::fs::write(store.path(), "{not json").unwrap();
        let recovered = store.load().unwrap();
        assert!(recovered.targets.is_empty());
    }

    #[test]
    fn config_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        store.save(&Config::default()).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
