use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::runtimes::Runtime;
use crate::util;

pub const PORT_RANGE_START: u16 = 3000;
pub const PORT_RANGE_END: u16 = 9000;

/// One app registered on a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedApp {
    pub target_name: String,
    pub app_name: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub framework: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deploy: Option<DateTime<Utc>>,
}

/// Per-server inventory: which apps live on the host, which
/// runtimes are installed, and the port allocator cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerState {
    pub server_ip: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default)]
    pub proxy_type: String,
    #[serde(default)]
    pub root_domain: String,
    #[serde(default)]
    pub deployed_apps: Vec<DeployedApp>,
    #[serde(default)]
    pub installed_runtimes: Vec<Runtime>,
    #[serde(default = "default_next_port")]
    pub next_port: u16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const fn default_next_port() -> u16 {
    PORT_RANGE_START
}

impl ServerState {
    #[must_use]
    pub fn new(server_ip: &str, provider: &str) -> Self {
        let now = Utc::now();
        Self {
            server_ip: server_ip.to_string(),
            provider: provider.to_string(),
            server_id: None,
            proxy_type: String::new(),
            root_domain: String::new(),
            deployed_apps: Vec::new(),
            installed_runtimes: Vec::new(),
            next_port: PORT_RANGE_START,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn app(&self, target_name: &str) -> Option<&DeployedApp> {
        self.deployed_apps.iter().find(|a| a.target_name == target_name)
    }

    fn port_in_use(&self, port: u16) -> bool {
        self.deployed_apps.iter().any(|a| a.port == port)
    }

    /// Allocate the next free port in [3000, 9000], scanning from
    /// the `next_port` cursor and wrapping once. The cursor only
    /// advances when a port is found, so exhaustion leaves the
    /// state untouched.
    pub fn allocate_port(&mut self) -> Result<u16> {
        let start = self.next_port.clamp(PORT_RANGE_START, PORT_RANGE_END);

        let candidates = (start..=PORT_RANGE_END).chain(PORT_RANGE_START..start);
        for port in candidates {
            if !self.port_in_use(port) {
                self.next_port = if port >= PORT_RANGE_END {
                    PORT_RANGE_START
                } else {
                    port + 1
                };
                return Ok(port);
            }
        }

        Err(Error::PortsExhausted(self.server_ip.clone()))
    }

    /// Return a port to the pool; the cursor backs up so the hole
    /// is refilled before higher ports are handed out.
    pub fn release_port(&mut self, port: u16) {
        if port >= PORT_RANGE_START && port < self.next_port {
            self.next_port = port;
        }
    }

    /// Insert or update an app entry, keyed by target name.
    pub fn register_app(&mut self, app: DeployedApp) {
        self.updated_at = Utc::now();
        if let Some(existing) = self
            .deployed_apps
            .iter_mut()
            .find(|a| a.target_name == app.target_name)
        {
            *existing = app;
        } else {
            self.deployed_apps.push(app);
        }
    }

    /// Remove an app and release its port. Returns the removed
    /// entry, if any.
    pub fn unregister_app(&mut self, target_name: &str) -> Option<DeployedApp> {
        let idx = self
            .deployed_apps
            .iter()
            .position(|a| a.target_name == target_name)?;
        let app = self.deployed_apps.remove(idx);
        self.release_port(app.port);
        self.updated_at = Utc::now();
        Some(app)
    }

    pub fn add_runtime(&mut self, runtime: Runtime) {
        if !self.installed_runtimes.contains(&runtime) {
            self.installed_runtimes.push(runtime);
            self.updated_at = Utc::now();
        }
    }

    pub fn remove_runtime(&mut self, runtime: Runtime) {
        self.installed_runtimes.retain(|r| *r != runtime);
        self.updated_at = Utc::now();
    }
}

/// Store of `servers/<sanitized-ip>.json` files.
#[derive(Debug, Clone)]
pub struct ServerStore {
    root: PathBuf,
}

impl ServerStore {
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(util::home_dir()?))
    }

    #[must_use]
    pub fn path(&self, ip: &str) -> PathBuf {
        self.root
            .join("servers")
            .join(format!("{}.json", util::sanitize_ip(ip)))
    }

    pub fn load(&self, ip: &str) -> Result<Option<ServerState>> {
        let path = self.path(ip);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::State(format!("read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::State(format!("parse {}: {e}", path.display())))
    }

    /// Load the server record, creating a fresh one when the IP is
    /// unknown.
    pub fn load_or_create(&self, ip: &str, provider: &str) -> Result<ServerState> {
        Ok(self
            .load(ip)?
            .unwrap_or_else(|| ServerState::new(ip, provider)))
    }

    pub fn save(&self, state: &ServerState) -> Result<()> {
        let raw = serde_json::to_vec_pretty(state)?;
        util::atomic_write(&self.path(&state.server_ip), &raw)
    }

    pub fn update(
        &self,
        ip: &str,
        provider: &str,
        mutate: impl FnOnce(&mut ServerState),
    ) -> Result<ServerState> {
        let mut state = self.load_or_create(ip, provider)?;
        mutate(&mut state);
        self.save(&state)?;
        Ok(state)
    }

    /// Unregister an app; the server file disappears with its last
    /// app.
    pub fn unregister_app(&self, ip: &str, target_name: &str) -> Result<Option<ServerState>> {
        let Some(mut state) = self.load(ip)? else {
            return Ok(None);
        };
        state.unregister_app(target_name);
        if state.deployed_apps.is_empty() {
            self.delete(ip)?;
            return Ok(None);
        }
        self.save(&state)?;
        Ok(Some(state))
    }

    pub fn delete(&self, ip: &str) -> Result<()> {
        let path = self.path(ip);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| Error::State(format!("remove {}: {e}", path.display())))?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ServerState>> {
        let dir = self.root.join("servers");
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut servers = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                let raw = std::fs::read_to_string(&path)?;
                match serde_json::from_str(&raw) {
                    Ok(state) => servers.push(state),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable server file");
                    }
                }
            }
        }
        servers.sort_by(|a: &ServerState, b: &ServerState| a.server_ip.cmp(&b.server_ip));
        Ok(servers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str, port: u16) -> DeployedApp {
        DeployedApp {
            target_name: name.to_string(),
            app_name: name.to_string(),
            port,
            domain: None,
            framework: String::new(),
            last_deploy: None,
        }
    }

    #[test]
    fn allocates_sequentially_from_3000() {
        let mut state = ServerState::new("10.0.0.1", "hetzner");
        let p1 = state.allocate_port().unwrap();
        state.register_app(app("web", p1));
        let p2 = state.allocate_port().unwrap();
        assert_eq!((p1, p2), (3000, 3001));
    }

    #[test]
    fn skips_ports_in_use_after_wrap() {
        let mut state = ServerState::new("10.0.0.1", "hetzner");
        state.next_port = PORT_RANGE_END;
        state.register_app(app("edge", PORT_RANGE_END));
        state.register_app(app("web", 3000));

        let port = state.allocate_port().unwrap();
        assert_eq!(port, 3001);
    }

    #[test]
    fn exhaustion_leaves_cursor_untouched() {
        let mut state = ServerState::new("10.0.0.1", "hetzner");
        for port in PORT_RANGE_START..=PORT_RANGE_END {
            state.register_app(app(&format!("app{port}"), port));
        }
        let before = state.next_port;
        let err = state.allocate_port().unwrap_err();
        assert!(matches!(err, Error::PortsExhausted(_)));
        assert_eq!(state.next_port, before);
    }

    #[test]
    fn release_backs_up_the_cursor() {
        let mut state = ServerState::new("10.0.0.1", "hetzner");
        for _ in 0..3 {
            let p = state.allocate_port().unwrap();
            state.register_app(app(&format!("a{p}"), p));
        }
        state.unregister_app("a3001");
        assert_eq!(state.next_port, 3001);
        assert_eq!(state.allocate_port().unwrap(), 3001);
    }

    #[test]
    fn ports_stay_unique() {
        let mut state = ServerState::new("10.0.0.1", "vultr");
        for _ in 0..50 {
            let p = state.allocate_port().unwrap();
            state.register_app(app(&format!("a{p}"), p));
        }
        let mut ports: Vec<u16> = state.deployed_apps.iter().map(|a| a.port).collect();
        ports.sort_unstable();
        ports.dedup();
        assert_eq!(ports.len(), 50);
    }

    #[test]
    fn register_is_upsert() {
        let mut state = ServerState::new("10.0.0.1", "aws");
        state.register_app(app("web", 3000));
        let mut updated = app("web", 3000);
        updated.framework = "Next.js".to_string();
        state.register_app(updated);
        assert_eq!(state.deployed_apps.len(), 1);
        assert_eq!(state.deployed_apps[0].framework, "Next.js");
    }

    #[test]
    fn store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ServerStore::new(dir.path().to_path_buf());

        let mut state = ServerState::new("192.168.1.10", "digitalocean");
        state.register_app(app("web", 3000));
        state.add_runtime(Runtime::Nodejs);
        store.save(&state).unwrap();

        let loaded = store.load("192.168.1.10").unwrap().unwrap();
        assert_eq!(loaded.deployed_apps.len(), 1);
        assert_eq!(loaded.installed_runtimes, vec![Runtime::Nodejs]);
        assert!(store.path("192.168.1.10").ends_with("192_168_1_10.json"));
    }

    #[test]
    fn last_app_removal_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ServerStore::new(dir.path().to_path_buf());

        let mut state = ServerState::new("192.168.1.10", "linode");
        state.register_app(app("web", 3000));
        state.register_app(app("api", 3001));
        store.save(&state).unwrap();

        let remaining = store.unregister_app("192.168.1.10", "web").unwrap();
        assert_eq!(remaining.unwrap().deployed_apps.len(), 1);
        assert!(store.path("192.168.1.10").exists());

        let remaining = store.unregister_app("192.168.1.10", "api").unwrap();
        assert!(remaining.is_none());
        assert!(!store.path("192.168.1.10").exists());
    }
}
