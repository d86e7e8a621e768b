use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use crate::cloudinit::{self, CONFIGURED_MARKER, CREATED_MARKER, DEPLOY_USER};
use crate::cmd;
use crate::config::{Builder, Config, ConfigStore, ProviderConfig, Target};
use crate::detect::{Detection, detect_project};
use crate::error::{Error, Result};
use crate::firewall::FirewallManager;
use crate::keys;
use crate::proxy::{ProxyConfig, proxy_for};
use crate::providers::{
    DESTROY_TIMEOUT, PROVISION_TIMEOUT, Provider, ProvisionRequest, provider_for,
};
use crate::release::{
    HEALTH_CHECK_ATTEMPTS, HEALTH_CHECK_DELAY, ReleaseExecutor, ServiceKind,
};
use crate::runtimes::{Runtime, installer_for};
use crate::server_state::{DeployedApp, ServerStore};
use crate::service;
use crate::ssh::{DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY, SshExecutor};
use crate::ssl::{record_issued, ssl_for};
use crate::state::StateStore;
use crate::tokens::TokenStore;
use crate::util;

/// SSH probing right after a VM boots needs a longer leash than
/// the steady-state connect budget.
const BOOT_SSH_ATTEMPTS: u32 = 20;
const BOOT_SSH_DELAY: Duration = Duration::from_secs(10);

/// Outcome of one pipeline phase, for exit-code and `--json`
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Ran,
    Skipped,
}

/// Flags that shape a target on first `create`.
#[derive(Debug, Clone, Default)]
pub struct TargetSpec {
    pub provider: Option<String>,
    pub region: Option<String>,
    pub size: Option<String>,
    pub image: Option<String>,
    pub ip: Option<String>,
    pub username: Option<String>,
    pub bucket: Option<String>,
    pub domain: Option<String>,
    pub proxy: Option<String>,
}

/// The context object the top-level command threads through every
/// phase: stores, options, timeouts.
pub struct Orchestrator {
    pub configs: ConfigStore,
    pub tokens: TokenStore,
    pub states: StateStore,
    pub servers: ServerStore,
    pub root: PathBuf,
    pub interactive: bool,
    pub force: bool,
    pub provision_timeout: Duration,
    pub destroy_timeout: Duration,
}

impl Orchestrator {
    pub fn open(interactive: bool, force: bool) -> Result<Self> {
        let root = util::home_dir()?;
        Ok(Self {
            configs: ConfigStore::new(root.clone()),
            tokens: TokenStore::new(root.clone()),
            states: StateStore::new(root.clone()),
            servers: ServerStore::new(root.clone()),
            root,
            interactive,
            force,
            provision_timeout: PROVISION_TIMEOUT,
            destroy_timeout: DESTROY_TIMEOUT,
        })
    }

    // ---- target resolution -------------------------------------------------

    /// Resolution precedence: `--target` flag, then positional
    /// path, then the working directory. A path that matches no
    /// stored target names a new one after its sanitized base
    /// name.
    pub fn resolve_target(
        &self,
        config: &Config,
        flag: Option<&str>,
        path: Option<&Path>,
    ) -> Result<(String, PathBuf)> {
        if let Some(name) = flag {
            let target = config.targets.get(name).ok_or_else(|| {
                Error::Validation(format!("no target named '{name}'"))
            })?;
            return Ok((name.to_string(), target.project_path.clone()));
        }

        let project = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::current_dir()?,
        };
        let project = project
            .canonicalize()
            .map_err(|_| Error::Validation(format!("project path does not exist: {}", project.display())))?;

        // Several targets may share one project path; first match
        // by name order wins for path-based resolution.
        if let Some((name, target)) = config
            .targets
            .iter()
            .find(|(_, t)| t.project_path == project)
        {
            return Ok((name.clone(), target.project_path.clone()));
        }

        let base = project
            .file_name()
            .map(|n| util::sanitize_name(&n.to_string_lossy()))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Validation("cannot derive a target name from path".into()))?;
        Ok((base, project))
    }

    /// Fetch an existing target or materialize a new one from the
    /// spec flags (prompting for provider details when allowed).
    pub fn ensure_target(
        &self,
        config: &mut Config,
        name: &str,
        project_path: &Path,
        spec: &TargetSpec,
        detection: &Detection,
    ) -> Result<Target> {
        if let Some(existing) = config.targets.get(name) {
            return Ok(existing.clone());
        }

        let provider_name = match &spec.provider {
            Some(p) => p.clone(),
            None if self.interactive => {
                util::prompt_line("Provider (digitalocean/hetzner/vultr/linode/aws/flyio/byos/s3): ")?
            }
            None => {
                return Err(Error::Validation(
                    "missing --provider (or run interactively)".into(),
                ));
            }
        };

        let provider_config = self.build_provider_config(&provider_name, spec)?;
        let domain = spec.domain.as_ref().map(|d| crate::config::DomainConfig {
            domain: d.clone(),
            ssl_enabled: false,
            ssl_manager: String::new(),
            proxy_type: spec.proxy.clone().unwrap_or_default(),
            root_domain: root_domain_of(d),
        });

        let builder = if detection.language == "Container" {
            Builder::Dockerfile
        } else {
            Builder::Native
        };

        let target = Target {
            name: name.to_string(),
            project_path: project_path.to_path_buf(),
            framework: detection.framework.clone(),
            language: detection.language.clone(),
            provider_config,
            builder,
            server_ip: String::new(),
            port: 0,
            domain,
            deploy_options: None,
        };
        config.targets.insert(name.to_string(), target.clone());
        self.configs.save(config)?;
        Ok(target)
    }

    fn build_provider_config(&self, provider: &str, spec: &TargetSpec) -> Result<ProviderConfig> {
        use crate::config::{
            AwsConfig, ByosConfig, DigitalOceanConfig, FlyioConfig, HetznerConfig, LinodeConfig,
            S3Config, VultrConfig,
        };

        let need = |field: &str, value: &Option<String>| -> Result<String> {
            match value {
                Some(v) => Ok(v.clone()),
                None if self.interactive => util::prompt_line(&format!("{field}: ")),
                None => Err(Error::Validation(format!("missing --{field}"))),
            }
        };

        match provider {
            "digitalocean" => Ok(ProviderConfig::Digitalocean(DigitalOceanConfig {
                region: need("region", &spec.region)?,
                size: need("size", &spec.size)?,
                image: spec.image.clone().unwrap_or_else(|| "ubuntu-24-04-x64".to_string()),
                username: DEPLOY_USER.to_string(),
                ..Default::default()
            })),
            "hetzner" => Ok(ProviderConfig::Hetzner(HetznerConfig {
                location: need("region", &spec.region)?,
                server_type: need("size", &spec.size)?,
                image: spec.image.clone().unwrap_or_else(|| "ubuntu-24.04".to_string()),
                username: DEPLOY_USER.to_string(),
                ..Default::default()
            })),
            "vultr" => Ok(ProviderConfig::Vultr(VultrConfig {
                region: need("region", &spec.region)?,
                plan: need("size", &spec.size)?,
                os_id: spec.image.clone().unwrap_or_else(|| "2284".to_string()),
                username: DEPLOY_USER.to_string(),
                ..Default::default()
            })),
            "linode" => Ok(ProviderConfig::Linode(LinodeConfig {
                region: need("region", &spec.region)?,
                type_id: need("size", &spec.size)?,
                image: spec.image.clone().unwrap_or_else(|| "linode/ubuntu24.04".to_string()),
                username: DEPLOY_USER.to_string(),
                ..Default::default()
            })),
            "aws" => Ok(ProviderConfig::Aws(AwsConfig {
                region: need("region", &spec.region)?,
                instance_type: need("size", &spec.size)?,
                ami: spec.image.clone().unwrap_or_default(),
                username: "ubuntu".to_string(),
                ..Default::default()
            })),
            "flyio" => Ok(ProviderConfig::Flyio(FlyioConfig {
                region: need("region", &spec.region)?,
                vm_size: spec.size.clone().unwrap_or_else(|| "shared-cpu-1x".to_string()),
                username: DEPLOY_USER.to_string(),
                ..Default::default()
            })),
            "byos" => {
                let ip = need("ip", &spec.ip)?;
                if !util::looks_like_ipv4(&ip) {
                    return Err(Error::Validation(format!("'{ip}' is not an IPv4 address")));
                }
                Ok(ProviderConfig::Byos(ByosConfig {
                    ip,
                    username: spec.username.clone().unwrap_or_else(|| "root".to_string()),
                    ssh_key_path: String::new(),
                }))
            }
            "s3" => Ok(ProviderConfig::S3(S3Config {
                bucket: need("bucket", &spec.bucket)?,
                region: need("region", &spec.region)?,
            })),
            other => Err(Error::Validation(format!("unknown provider '{other}'"))),
        }
    }

    // ---- shared plumbing ---------------------------------------------------

    fn provider_handle(&self, target: &Target) -> Result<Box<dyn Provider>> {
        let name = target.provider();
        let token = match name {
            "digitalocean" | "hetzner" | "vultr" | "linode" => {
                Some(self.tokens.require(name)?)
            }
            _ => None,
        };
        Ok(provider_for(name, token)?)
    }

    /// The SSH session for a target, recovering a lost IP from the
    /// provider (or the operator) first.
    pub fn ssh_for(&self, config: &mut Config, name: &str) -> Result<SshExecutor> {
        let target = config
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;

        let ip = match target.ip() {
            Some(ip) => ip.to_string(),
            None => self.recover_ip(config, name, &target)?,
        };

        let keypair = keys::ensure_keypair(&self.root)?;
        let key_path = target
            .provider_config
            .ssh_key()
            .map_or(keypair.private_path.clone(), PathBuf::from);

        Ok(SshExecutor::new(&ip, target.provider_config.username()).with_key(&key_path))
    }

    /// §4.4 IP recovery: a stored server id with no stored address
    /// triggers a provider lookup; the result is written back into
    /// the config before any SSH is attempted. fly.io-class APIs
    /// never return one, so the operator is asked instead.
    fn recover_ip(&self, config: &mut Config, name: &str, target: &Target) -> Result<String> {
        if let Some(id) = target.provider_config.server_id() {
            let provider = self.provider_handle(target)?;
            let server = provider.get_server(id)?;
            if !server.public_ipv4.is_empty() {
                self.persist_ip(config, name, &server.public_ipv4)?;
                return Ok(server.public_ipv4);
            }
        }
        if self.interactive {
            let ip = util::prompt_line(&format!("Public IPv4 for target '{name}': "))?;
            if !util::looks_like_ipv4(&ip) {
                return Err(Error::Validation(format!("'{ip}' is not an IPv4 address")));
            }
            self.persist_ip(config, name, &ip)?;
            return Ok(ip);
        }
        Err(Error::Validation(format!(
            "target '{name}' has no server IP; re-run interactively or set one with the provider"
        )))
    }

    fn persist_ip(&self, config: &mut Config, name: &str, ip: &str) -> Result<()> {
        if let Some(t) = config.targets.get_mut(name) {
            t.provider_config.set_ip(ip);
            t.server_ip = ip.to_string();
        }
        self.configs.save(config)
    }

    fn marker_present(ssh: &SshExecutor, marker: &str) -> bool {
        ssh.path_exists(marker).unwrap_or(false)
    }

    // ---- phase 1: detect ---------------------------------------------------

    /// Always runs; cheap and deterministic.
    pub fn detect(&self, project_path: &Path) -> Result<Detection> {
        detect_project(project_path)
    }

    // ---- phase 2: create ---------------------------------------------------

    pub fn create(&self, config: &mut Config, name: &str) -> Result<PhaseOutcome> {
        let target = config
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;
        let state = self.states.load(name)?;

        if matches!(target.provider_config, ProviderConfig::S3(_)) {
            return self.create_s3(name, &target, state.created);
        }

        // Skip when both the local flag and the server marker agree.
        if state.created && !self.force {
            if let Some(ip) = target.ip() {
                let key_path = target.provider_config.ssh_key().map_or(
                    keys::ensure_keypair(&self.root)?.private_path,
                    PathBuf::from,
                );
                let probe =
                    SshExecutor::new(ip, target.provider_config.username()).with_key(&key_path);
                if probe.connect(1, Duration::ZERO).is_ok()
                    && Self::marker_present(&probe, CREATED_MARKER)
                {
                    eprintln!("Create: up to date (server marker present)");
                    return Ok(PhaseOutcome::Skipped);
                }
            }
            if target.provider_config.is_provisioned() {
                // Infrastructure exists but is unreachable right
                // now; re-provisioning would duplicate it.
                return Err(Error::Ssh(format!(
                    "target '{name}' is provisioned but unreachable; check the server or run destroy"
                )));
            }
        }

        match &target.provider_config {
            ProviderConfig::Byos(byos) => self.create_byos(config, name, &byos.clone()),
            _ => self.create_cloud(config, name, &target),
        }
    }

    fn create_s3(&self, name: &str, target: &Target, already: bool) -> Result<PhaseOutcome> {
        if already && !self.force {
            return Ok(PhaseOutcome::Skipped);
        }
        let provider = self.provider_handle(target)?;
        provider.validate_credentials()?;
        self.states.mark_created(name, None)?;
        Ok(PhaseOutcome::Ran)
    }

    fn create_byos(
        &self,
        config: &mut Config,
        name: &str,
        byos: &crate::config::ByosConfig,
    ) -> Result<PhaseOutcome> {
        eprintln!("Validating SSH access to {}...", byos.ip);
        let keypair = keys::ensure_keypair(&self.root)?;
        let key_path = if byos.ssh_key_path.is_empty() {
            keypair.private_path.clone()
        } else {
            PathBuf::from(&byos.ssh_key_path)
        };
        let ssh = SshExecutor::new(&byos.ip, &byos.username).with_key(&key_path);
        ssh.connect(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY)?;

        ssh.execute_sudo(&format!("mkdir -p /etc/lightfold && touch {CREATED_MARKER}"))?
            .expect_success("write created marker")?;

        self.persist_ip(config, name, &byos.ip)?;
        self.states.mark_created(name, None)?;
        eprintln!("Server registered.");
        Ok(PhaseOutcome::Ran)
    }

    fn create_cloud(&self, config: &mut Config, name: &str, target: &Target) -> Result<PhaseOutcome> {
        let provider = self.provider_handle(target)?;
        provider.validate_credentials()?;

        // A server id on file means infrastructure may already
        // exist; re-provisioning (even under --force) would
        // duplicate it. Reattach instead.
        if let Some(id) = target.provider_config.server_id() {
            match provider.get_server(id) {
                Ok(_) => {
                    eprintln!("Server {id} already exists; reattaching");
                    return self.wait_and_probe(config, name, &*provider, id);
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(id, "stored server id is stale; provisioning fresh");
                }
                Err(e) => return Err(Error::Provider(e)),
            }
        }

        let keypair = keys::ensure_keypair(&self.root)?;
        let public_key = keypair.public_key()?;
        let ssh_key = provider.upload_ssh_key("lightfold-deploy", &public_key)?;
        let user_data = cloudinit::build_user_data(&public_key);

        let (region, size, image) = provision_shape(&target.provider_config)?;
        let request = ProvisionRequest {
            name: util::sanitize_name(name),
            region,
            size,
            image,
            ssh_key_id: ssh_key.id,
            user_data,
        };

        eprintln!(
            "Provisioning {} {} in {}...",
            provider.display_name(),
            request.size,
            request.region
        );
        let server = provider.provision(&request)?;

        // Persist the handle immediately: if anything below dies,
        // destroy can still find the resource.
        {
            if let Some(t) = config.targets.get_mut(name) {
                t.provider_config.set_server_id(&server.id);
                t.provider_config
                    .set_ssh_key(&keypair.private_path.to_string_lossy());
            }
            self.configs.save(config)?;
            self.states.mark_created(name, Some(&server.id))?;
        }

        let activation = self.wait_and_probe(config, name, &*provider, &server.id);
        match activation {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Activation or SSH never came up: kill the VM so
                // the account is not left paying for a brick.
                eprintln!("Provisioning failed; destroying server {}...", server.id);
                match provider.destroy(&server.id) {
                    Ok(()) => {}
                    Err(de) if de.is_not_found() => {}
                    Err(de) => {
                        tracing::warn!(error = %de, "cleanup destroy failed");
                    }
                }
                if let Some(t) = config.targets.get_mut(name) {
                    t.server_ip = String::new();
                    t.provider_config.set_ip("");
                }
                self.configs.save(config)?;
                self.states.update(name, |s| {
                    s.created = false;
                    s.provisioned_id = None;
                })?;
                Err(e)
            }
        }
    }

    fn wait_and_probe(
        &self,
        config: &mut Config,
        name: &str,
        provider: &dyn Provider,
        server_id: &str,
    ) -> Result<PhaseOutcome> {
        let server = provider.wait_for_active(server_id, self.provision_timeout)?;

        let ip = if server.public_ipv4.is_empty() {
            if !self.interactive {
                return Err(Error::Validation(format!(
                    "{} did not report a public IPv4; re-run interactively to enter one",
                    provider.display_name()
                )));
            }
            let ip = util::prompt_line("Public IPv4 of the new server: ")?;
            if !util::looks_like_ipv4(&ip) {
                return Err(Error::Validation(format!("'{ip}' is not an IPv4 address")));
            }
            ip
        } else {
            server.public_ipv4
        };
        self.persist_ip(config, name, &ip)?;

        eprintln!("Server active at {ip}; waiting for SSH...");
        let username = config
            .targets
            .get(name)
            .map_or_else(|| DEPLOY_USER.to_string(), |t| t.provider_config.username().to_string());
        let ssh = SshExecutor::new(&ip, &username)
            .with_key(&keys::ensure_keypair(&self.root)?.private_path);
        ssh.connect(BOOT_SSH_ATTEMPTS, BOOT_SSH_DELAY)?;

        eprintln!("Server ready.");
        Ok(PhaseOutcome::Ran)
    }

    // ---- phase 3: configure ------------------------------------------------

    pub fn configure(
        &self,
        config: &mut Config,
        name: &str,
        detection: &Detection,
    ) -> Result<PhaseOutcome> {
        let target = config
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;

        if matches!(target.provider_config, ProviderConfig::S3(_)) {
            // Buckets have nothing to configure.
            return Ok(PhaseOutcome::Skipped);
        }

        let state = self.states.load(name)?;
        let ssh = self.ssh_for(config, name)?;
        ssh.connect(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY)?;

        if state.configured && !self.force && Self::marker_present(&ssh, CONFIGURED_MARKER) {
            eprintln!("Configure: up to date (server marker present)");
            return Ok(PhaseOutcome::Skipped);
        }

        eprintln!("Installing baseline packages...");
        ssh.execute_sudo(
            "DEBIAN_FRONTEND=noninteractive apt-get update -qq && \
             DEBIAN_FRONTEND=noninteractive apt-get install -y curl ca-certificates ufw rsync git tar",
        )?
        .expect_success("baseline packages")?;

        ensure_deploy_user(&ssh)?;

        let firewall = FirewallManager::new(&ssh);
        firewall.open_port(22)?;
        let _ = ssh.execute_sudo("ufw --force enable");

        let runtime = Runtime::for_language(&detection.language).ok_or_else(|| {
            Error::Validation(format!(
                "no runtime mapping for language '{}'",
                detection.language
            ))
        })?;
        let installer = installer_for(runtime);
        if installer.is_installed(&ssh, detection.package_manager())? {
            eprintln!("Runtime {runtime}: already installed");
        } else {
            eprintln!("Installing runtime {runtime}...");
            installer.install(&ssh, detection.package_manager())?;
        }

        let proxy_type = target
            .domain
            .as_ref()
            .map(|d| d.proxy_type.clone())
            .unwrap_or_default();
        let proxy = proxy_for(&proxy_type)?;
        if !proxy.is_available(&ssh)? {
            eprintln!("Installing {}...", proxy.name());
            proxy.install(&ssh)?;
        }
        firewall.open_port(80)?;
        if target.domain.as_ref().is_some_and(|d| d.ssl_enabled) {
            firewall.open_port(443)?;
        }

        let app_name = target.app_name();
        let executor = ReleaseExecutor::new(&ssh, &app_name, service_kind(target.builder));
        executor.ensure_layout()?;

        ssh.execute_sudo(&format!("mkdir -p /etc/lightfold && touch {CONFIGURED_MARKER}"))?
            .expect_success("write configured marker")?;

        let ip = ssh.host().to_string();
        self.servers.update(&ip, target.provider(), |s| {
            s.server_id = target.provider_config.server_id().map(ToString::to_string);
            s.proxy_type = proxy.name().to_string();
            s.add_runtime(runtime);
        })?;
        self.states.mark_configured(name)?;

        eprintln!("Server configured.");
        Ok(PhaseOutcome::Ran)
    }

    // ---- phase 4: push -----------------------------------------------------

    pub fn push(
        &self,
        config: &mut Config,
        name: &str,
        detection: &Detection,
    ) -> Result<PhaseOutcome> {
        let target = config
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;

        if let ProviderConfig::S3(s3) = &target.provider_config {
            return self.push_s3(name, &target, &s3.clone(), detection);
        }

        let state = self.states.load(name)?;
        let head = git_head(&target.project_path);
        if !self.force {
            if let (Some(head), Some(last)) = (head.as_deref(), state.last_commit.as_deref()) {
                if head == last {
                    eprintln!("Push: up to date (commit {} already deployed)", &head[..12.min(head.len())]);
                    return Ok(PhaseOutcome::Skipped);
                }
            }
        }

        let result = self.push_inner(config, name, &target, detection, head.as_deref());
        if let Err(e) = &result {
            if e.is_deployment() {
                if let Err(se) = self.states.record_push_failure(name, &e.to_string()) {
                    tracing::warn!(error = %se, "failed to record push failure");
                }
            }
        }
        result.map(|()| PhaseOutcome::Ran)
    }

    fn push_inner(
        &self,
        config: &mut Config,
        name: &str,
        target: &Target,
        detection: &Detection,
        head: Option<&str>,
    ) -> Result<()> {
        let ssh = self.ssh_for(config, name)?;
        ssh.connect(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY)?;
        let ip = ssh.host().to_string();

        // Port allocation happens once; the port then sticks to
        // the target for its whole life on this server.
        let port = if target.port == 0 {
            let mut server = self.servers.load_or_create(&ip, target.provider())?;
            let port = server.allocate_port()?;
            self.servers.save(&server)?;
            if let Some(t) = config.targets.get_mut(name) {
                t.port = port;
            }
            self.configs.save(config)?;
            port
        } else {
            target.port
        };

        let app_name = target.app_name();
        let options = target.deploy_options.clone().unwrap_or_default();
        let env_vars = options.env_vars.clone();
        let build_plan = if options.build_commands.is_empty() {
            detection.build_plan.clone()
        } else {
            options.build_commands.clone()
        };
        let run_plan = if options.run_commands.is_empty() {
            detection.run_plan.clone()
        } else {
            options.run_commands.clone()
        };

        let kind = service_kind(target.builder);
        let executor = ReleaseExecutor::new(&ssh, &app_name, kind);
        executor.ensure_layout()?;

        eprintln!("Creating release tarball...");
        let tarball = executor.create_release_tarball(&target.project_path)?;
        let timestamp = executor.next_release_timestamp()?;

        eprintln!("Uploading release {timestamp}...");
        executor.upload_release(&tarball, &timestamp)?;
        let _ = std::fs::remove_file(&tarball);

        if options.skip_build {
            eprintln!("Skipping build (per deploy options)");
        } else if kind == ServiceKind::Systemd {
            executor.build_release(&timestamp, &build_plan, &env_vars, port)?;
        }

        executor.write_environment_file(&env_vars, port)?;

        if kind == ServiceKind::Systemd {
            service::install_unit(&ssh, &app_name, port, &run_plan)?;
        } else {
            let compose_yaml = crate::compose::render(&app_name, port, container_port(detection), &env_vars)?;
            ssh.upload_bytes(
                compose_yaml.as_bytes(),
                &format!("{}/releases/{timestamp}/docker-compose.yml", executor.app_root()),
            )?;
        }

        eprintln!("Activating release {timestamp}...");
        executor.deploy_with_health_check(
            &timestamp,
            port,
            HEALTH_CHECK_ATTEMPTS,
            HEALTH_CHECK_DELAY,
        )?;

        let keep = config.keep_releases;
        let removed = executor.cleanup_old_releases(keep)?;
        if !removed.is_empty() {
            eprintln!("Pruned {} old release(s)", removed.len());
        }

        // Register the app and refresh proxy routing across every
        // app on this server (one reload).
        let server = self.servers.update(&ip, target.provider(), |s| {
            s.register_app(DeployedApp {
                target_name: name.to_string(),
                app_name: app_name.clone(),
                port,
                domain: target.domain.as_ref().map(|d| d.domain.clone()),
                framework: target.framework.clone(),
                last_deploy: Some(Utc::now()),
            });
        })?;

        let proxy = proxy_for(&server.proxy_type)?;
        let site_configs: Vec<ProxyConfig> = server
            .deployed_apps
            .iter()
            .map(|app| {
                let mut c = ProxyConfig::new(&app.app_name, app.port);
                if let Some(domain) = &app.domain {
                    c = c.with_domain(domain);
                }
                c
            })
            .collect();
        proxy.configure_multi_app(&ssh, &site_configs)?;

        let domainless = server.deployed_apps.iter().filter(|a| a.domain.is_none()).count();
        if server.deployed_apps.len() > 1 && domainless > 0 {
            let firewall = FirewallManager::new(&ssh);
            for app in server.deployed_apps.iter().filter(|a| a.domain.is_none()) {
                firewall.open_port(app.port)?;
                eprintln!(
                    "Note: {} has no domain; it is reachable at http://{ip}:{} only",
                    app.app_name, app.port
                );
            }
        }

        self.states.record_push(name, head, &timestamp)?;
        eprintln!("Deployed {app_name} ({timestamp}) to {ip}:{port}");
        Ok(())
    }

    fn push_s3(
        &self,
        name: &str,
        target: &Target,
        s3: &crate::config::S3Config,
        detection: &Detection,
    ) -> Result<PhaseOutcome> {
        let options = target.deploy_options.clone().unwrap_or_default();
        let build_plan = if options.build_commands.is_empty() {
            detection.build_plan.clone()
        } else {
            options.build_commands.clone()
        };

        if !options.skip_build {
            for command in &build_plan {
                eprintln!("  build: {command}");
                cmd::run_interactive("sh", &["-c", &format!("cd '{}' && {command}", target.project_path.display())])?;
            }
        }

        let publish_dir = detection
            .meta
            .get("publish_dir")
            .cloned()
            .unwrap_or_else(|| "dist".to_string());
        let source = target.project_path.join(&publish_dir);
        if !source.is_dir() {
            return Err(Error::Deployment(format!(
                "publish directory {} not found after build",
                source.display()
            )));
        }

        eprintln!("Syncing {} to s3://{}...", source.display(), s3.bucket);
        cmd::run_interactive(
            "aws",
            &[
                "s3",
                "sync",
                &source.to_string_lossy(),
                &format!("s3://{}", s3.bucket),
                "--region",
                &s3.region,
                "--delete",
            ],
        )?;

        let timestamp = Utc::now().format(crate::release::RELEASE_TIMESTAMP_FORMAT).to_string();
        self.states.record_push(name, git_head(&target.project_path).as_deref(), &timestamp)?;
        Ok(PhaseOutcome::Ran)
    }

    // ---- deploy: the 4-phase pipeline --------------------------------------

    /// detect, create, configure, push; each phase skippable via
    /// cached state. Any failure aborts the rest.
    pub fn deploy(
        &self,
        config: &mut Config,
        name: &str,
        project_path: &Path,
    ) -> Result<Detection> {
        let detection = self.detect(project_path)?;
        eprintln!(
            "Detected {} ({})",
            detection.framework, detection.language
        );

        self.create(config, name)?;
        self.configure(config, name, &detection)?;
        self.push(config, name, &detection)?;
        Ok(detection)
    }

    // ---- domain / ssl ------------------------------------------------------

    /// Attach a domain to a target, reconfigure the proxy, issue a
    /// certificate, and turn on auto-renewal.
    pub fn add_domain(
        &self,
        config: &mut Config,
        name: &str,
        domain: &str,
        email: &str,
        ssl_manager_name: &str,
    ) -> Result<()> {
        let target = config
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;
        if target.port == 0 {
            return Err(Error::Validation(format!(
                "target '{name}' has never been pushed; deploy it before adding a domain"
            )));
        }

        let ssh = self.ssh_for(config, name)?;
        ssh.connect(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY)?;
        let ip = ssh.host().to_string();

        let server = self.servers.load(&ip)?.ok_or_else(|| {
            Error::State(format!("no server record for {ip}; push first"))
        })?;
        let proxy = proxy_for(&server.proxy_type)?;
        let app_name = target.app_name();

        // Route the domain first so the ACME http-01 challenge can
        // reach the proxy.
        let http_config = ProxyConfig::new(&app_name, target.port).with_domain(domain);
        proxy.configure(&ssh, &http_config)?;

        let ssl = ssl_for(ssl_manager_name)?;
        let paths = ssl.issue_certificate(&ssh, domain, email)?;
        ssl.enable_auto_renewal(&ssh)?;

        if !paths.cert.is_empty() {
            let ssl_config = ProxyConfig::new(&app_name, target.port)
                .with_domain(domain)
                .with_ssl(&paths.cert, &paths.key);
            proxy.configure(&ssh, &ssl_config)?;
            FirewallManager::new(&ssh).open_port(443)?;
        }

        if let Some(t) = config.targets.get_mut(name) {
            t.domain = Some(crate::config::DomainConfig {
                domain: domain.to_string(),
                ssl_enabled: true,
                ssl_manager: ssl.name().to_string(),
                proxy_type: proxy.name().to_string(),
                root_domain: root_domain_of(domain),
            });
        }
        self.configs.save(config)?;
        self.servers.update(&ip, target.provider(), |s| {
            if let Some(app) = s.deployed_apps.iter_mut().find(|a| a.target_name == name) {
                app.domain = Some(domain.to_string());
            }
        })?;
        record_issued(&self.states, name);
        eprintln!("Domain {domain} attached to {name}");
        Ok(())
    }

    pub fn remove_domain(&self, config: &mut Config, name: &str) -> Result<()> {
        let target = config
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;
        let Some(domain) = target.domain.clone() else {
            return Err(Error::Validation(format!("target '{name}' has no domain")));
        };

        let ssh = self.ssh_for(config, name)?;
        ssh.connect(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY)?;
        let ip = ssh.host().to_string();

        if let Some(server) = self.servers.load(&ip)? {
            let proxy = proxy_for(&server.proxy_type)?;
            // Back to port-routing for this app.
            let config_nossl = ProxyConfig::new(&target.app_name(), target.port);
            proxy.configure(&ssh, &config_nossl)?;
        }

        if let Some(t) = config.targets.get_mut(name) {
            t.domain = None;
        }
        self.configs.save(config)?;
        self.servers.update(&ip, target.provider(), |s| {
            if let Some(app) = s.deployed_apps.iter_mut().find(|a| a.target_name == name) {
                app.domain = None;
            }
        })?;
        eprintln!("Domain {} detached from {name}", domain.domain);
        Ok(())
    }

    // ---- rollback ----------------------------------------------------------

    pub fn rollback(&self, config: &mut Config, name: &str) -> Result<String> {
        let target = config
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;
        let ssh = self.ssh_for(config, name)?;
        ssh.connect(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY)?;

        let executor = ReleaseExecutor::new(&ssh, &target.app_name(), service_kind(target.builder));
        let release = executor.rollback_to_previous_release()?;
        self.states.update(name, |s| {
            s.last_release = Some(release.clone());
            s.last_deploy = Some(Utc::now());
        })?;
        eprintln!("Rolled {} back to {release}", target.app_name());
        Ok(release)
    }

    // ---- destroy -----------------------------------------------------------

    /// Tear down a target. The VM goes away only when this target
    /// provisioned it and no other app lives there; otherwise the
    /// app is unregistered, its port closed (when domainless), and
    /// orphaned runtimes are cleaned.
    pub fn destroy(&self, config: &mut Config, name: &str, skip_confirm: bool) -> Result<()> {
        let target = config
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;

        if self.interactive && !skip_confirm {
            let confirmed = util::confirm(&format!(
                "This permanently removes target '{name}' and possibly its server."
            ))?;
            if !confirmed {
                eprintln!("Aborted.");
                return Ok(());
            }
        }

        let ip = target.ip().map(ToString::to_string);
        let other_apps = match &ip {
            Some(ip) => self
                .servers
                .load(ip)?
                .map(|s| {
                    s.deployed_apps
                        .iter()
                        .filter(|a| a.target_name != name)
                        .count()
                })
                .unwrap_or(0),
            None => 0,
        };

        let owns_vm = target.provider_config.is_provisioned()
            && !matches!(target.provider_config, ProviderConfig::Byos(_) | ProviderConfig::S3(_));

        if owns_vm && other_apps == 0 {
            // Token check happens before any state mutation so a
            // missing token aborts cleanly (nothing half-deleted).
            let provider = self.provider_handle(&target)?;
            let id = target
                .provider_config
                .server_id()
                .ok_or_else(|| Error::State(format!("target '{name}' has no server id")))?;
            eprintln!("Destroying server {id}...");
            match provider.destroy(id) {
                Ok(()) => self.wait_until_gone(&*provider, id),
                Err(e) if e.is_not_found() => {
                    eprintln!("Server already gone.");
                }
                Err(e) => return Err(Error::Provider(e)),
            }
            if let Some(ip) = &ip {
                self.servers.delete(ip)?;
            }
        } else if let Some(ip) = &ip {
            // Shared server (or BYOS): surgically remove this app.
            self.teardown_app(config, name, &target, ip)?;
        }

        self.states.delete(name)?;
        config.targets.shift_remove(name);
        self.configs.save(config)?;
        keys::remove_unused_keys(&self.root, config)?;
        eprintln!("Target '{name}' removed.");
        Ok(())
    }

    /// Poll until the provider stops knowing the server, bounded
    /// by the destroy timeout. Best-effort: the API accepted the
    /// delete, so a slow teardown only logs.
    fn wait_until_gone(&self, provider: &dyn Provider, id: &str) {
        let deadline = std::time::Instant::now() + self.destroy_timeout;
        loop {
            match provider.get_server(id) {
                Err(e) if e.is_not_found() => return,
                Ok(_) | Err(_) if std::time::Instant::now() >= deadline => {
                    tracing::warn!(id, "server still visible after destroy timeout");
                    return;
                }
                _ => std::thread::sleep(Duration::from_secs(5)),
            }
        }
    }

    fn teardown_app(
        &self,
        config: &mut Config,
        name: &str,
        target: &Target,
        ip: &str,
    ) -> Result<()> {
        let app_name = target.app_name();
        let ssh = self.ssh_for(config, name)?;
        if ssh.connect(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY).is_err() {
            tracing::warn!(ip, "server unreachable; removing local records only");
            self.servers.unregister_app(ip, name)?;
            return Ok(());
        }

        service::stop_and_disable(&ssh, &app_name)?;
        let executor = ReleaseExecutor::new(&ssh, &app_name, service_kind(target.builder));
        executor.remove_app_tree()?;

        if let Some(server) = self.servers.load(ip)? {
            let proxy = proxy_for(&server.proxy_type)?;
            if let Err(e) = proxy.remove(&ssh, &app_name) {
                tracing::warn!(error = %e, "proxy site removal failed");
            }
        }

        if target.domain.is_none() && target.port != 0 {
            if let Err(e) = FirewallManager::new(&ssh).close_port(target.port) {
                tracing::warn!(error = %e, "firewall port close failed");
            }
        }

        if let Some(remaining) = self.servers.unregister_app(ip, name)? {
            let mut server = remaining;
            let removed = crate::cleaner::clean_unused_runtimes(&ssh, &mut server);
            if !removed.is_empty() {
                self.servers.save(&server)?;
            }
        }
        Ok(())
    }

    // ---- sync / status -----------------------------------------------------

    /// Reconcile local state with what the server actually has:
    /// markers, the live release, and the app registration.
    pub fn sync(&self, config: &mut Config, name: &str) -> Result<()> {
        let target = config
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;
        let ssh = self.ssh_for(config, name)?;
        ssh.connect(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY)?;

        let created = Self::marker_present(&ssh, CREATED_MARKER);
        let configured = Self::marker_present(&ssh, CONFIGURED_MARKER);
        let executor = ReleaseExecutor::new(&ssh, &target.app_name(), service_kind(target.builder));
        let current = executor.current_release()?;

        self.states.update(name, |s| {
            s.created = created || s.created;
            s.configured = configured;
            if current.is_some() {
                s.last_release.clone_from(&current);
            }
        })?;

        eprintln!(
            "Synced '{name}': created={created} configured={configured} release={}",
            current.as_deref().unwrap_or("-")
        );
        Ok(())
    }
}

/// Region/size/image triple for the provision request.
fn provision_shape(config: &ProviderConfig) -> Result<(String, String, String)> {
    match config {
        ProviderConfig::Digitalocean(c) => {
            Ok((c.region.clone(), c.size.clone(), c.image.clone()))
        }
        ProviderConfig::Hetzner(c) => {
            Ok((c.location.clone(), c.server_type.clone(), c.image.clone()))
        }
        ProviderConfig::Vultr(c) => Ok((c.region.clone(), c.plan.clone(), c.os_id.clone())),
        ProviderConfig::Linode(c) => Ok((c.region.clone(), c.type_id.clone(), c.image.clone())),
        ProviderConfig::Aws(c) => Ok((c.region.clone(), c.instance_type.clone(), c.ami.clone())),
        ProviderConfig::Flyio(c) => Ok((
            c.region.clone(),
            c.vm_size.clone(),
            "ubuntu:24.04".to_string(),
        )),
        ProviderConfig::Byos(_) | ProviderConfig::S3(_) => Err(Error::Validation(
            "this provider does not provision servers".into(),
        )),
    }
}

const fn service_kind(builder: Builder) -> ServiceKind {
    match builder {
        Builder::Dockerfile => ServiceKind::Compose,
        Builder::Native | Builder::Nixpacks => ServiceKind::Systemd,
    }
}

/// Container port a dockerfile app listens on inside the
/// container. EXPOSE metadata would be better; the detector's
/// `meta["container_port"]` wins when present.
fn container_port(detection: &Detection) -> u16 {
    detection
        .meta
        .get("container_port")
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
}

/// Current git HEAD of the project, if it is a git checkout.
fn git_head(project_path: &Path) -> Option<String> {
    let path = project_path.to_string_lossy().to_string();
    cmd::run("git", &["-C", &path, "rev-parse", "HEAD"]).ok()
}

/// Create the deploy user when cloud-init never ran (BYOS hosts).
fn ensure_deploy_user(ssh: &SshExecutor) -> Result<()> {
    let exists = ssh.execute(&format!("id -u {DEPLOY_USER} >/dev/null 2>&1"))?;
    if exists.success() {
        return Ok(());
    }
    eprintln!("Creating {DEPLOY_USER} user...");
    ssh.execute_sudo(&format!(
        "useradd -m -s /bin/bash {DEPLOY_USER} && \
         echo '{DEPLOY_USER} ALL=(ALL) NOPASSWD:ALL' > /etc/sudoers.d/{DEPLOY_USER} && \
         chmod 440 /etc/sudoers.d/{DEPLOY_USER} && \
         mkdir -p /home/{DEPLOY_USER}/.ssh && \
         cp ~/.ssh/authorized_keys /home/{DEPLOY_USER}/.ssh/authorized_keys 2>/dev/null || true && \
         chmod 700 /home/{DEPLOY_USER}/.ssh && \
         chmod 600 /home/{DEPLOY_USER}/.ssh/authorized_keys 2>/dev/null || true && \
         chown -R {DEPLOY_USER}:{DEPLOY_USER} /home/{DEPLOY_USER}/.ssh"
    ))?
    .expect_success("create deploy user")?;
    Ok(())
}

/// `app.example.com` -> `example.com`; bare domains map to
/// themselves.
#[must_use]
pub fn root_domain_of(domain: &str) -> String {
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() <= 2 {
        domain.to_string()
    } else {
        format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::{ByosConfig, DigitalOceanConfig};

    fn test_orchestrator() -> (tempfile::TempDir, Orchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let orch = Orchestrator {
            configs: ConfigStore::new(root.clone()),
            tokens: TokenStore::new(root.clone()),
            states: StateStore::new(root.clone()),
            servers: ServerStore::new(root.clone()),
            root,
            interactive: false,
            force: false,
            provision_timeout: PROVISION_TIMEOUT,
            destroy_timeout: DESTROY_TIMEOUT,
        };
        (dir, orch)
    }

    fn byos_target(name: &str, project: &Path) -> Target {
        Target {
            name: name.to_string(),
            project_path: project.to_path_buf(),
            framework: "Next.js".to_string(),
            language: "JavaScript/TypeScript".to_string(),
            provider_config: ProviderConfig::Byos(ByosConfig {
                ip: "203.0.113.9".to_string(),
                username: "root".to_string(),
                ssh_key_path: String::new(),
            }),
            builder: Builder::Native,
            server_ip: String::new(),
            port: 0,
            domain: None,
            deploy_options: None,
        }
    }

    #[test]
    fn resolve_prefers_flag_over_path() {
        let (_dir, orch) = test_orchestrator();
        let project = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.targets.insert(
            "web".to_string(),
            byos_target("web", project.path()),
        );

        let (name, _) = orch
            .resolve_target(&config, Some("web"), Some(Path::new("/nonexistent")))
            .unwrap();
        assert_eq!(name, "web");
    }

    #[test]
    fn resolve_unknown_flag_is_validation_error() {
        let (_dir, orch) = test_orchestrator();
        let err = orch
            .resolve_target(&Config::default(), Some("ghost"), None)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn resolve_unmatched_path_uses_sanitized_basename() {
        let (_dir, orch) = test_orchestrator();
        let project = tempfile::tempdir().unwrap();
        let sub = project.path().join("My Cool App");
        std::fs::create_dir(&sub).unwrap();

        let (name, path) = orch
            .resolve_target(&Config::default(), None, Some(&sub))
            .unwrap();
        assert_eq!(name, "my-cool-app");
        assert_eq!(path, sub.canonicalize().unwrap());
    }

    #[test]
    fn resolve_matches_stored_project_path() {
        let (_dir, orch) = test_orchestrator();
        let project = tempfile::tempdir().unwrap();
        let canonical = project.path().canonicalize().unwrap();
        let mut config = Config::default();
        config
            .targets
            .insert("api".to_string(), byos_target("api", &canonical));

        let (name, _) = orch
            .resolve_target(&config, None, Some(project.path()))
            .unwrap();
        assert_eq!(name, "api");
    }

    #[test]
    fn ensure_target_requires_provider_without_prompting() {
        let (_dir, orch) = test_orchestrator();
        let project = tempfile::tempdir().unwrap();
        let detection = Detection {
            framework: "Next.js".to_string(),
            language: "JavaScript/TypeScript".to_string(),
            confidence: 1.0,
            signals: vec![],
            build_plan: vec![],
            run_plan: vec![],
            meta: BTreeMap::new(),
        };
        let mut config = Config::default();
        let err = orch
            .ensure_target(&mut config, "web", project.path(), &TargetSpec::default(), &detection)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn ensure_target_persists_new_byos_target() {
        let (_dir, orch) = test_orchestrator();
        let project = tempfile::tempdir().unwrap();
        let detection = Detection {
            framework: "Django".to_string(),
            language: "Python".to_string(),
            confidence: 1.0,
            signals: vec![],
            build_plan: vec![],
            run_plan: vec![],
            meta: BTreeMap::new(),
        };
        let spec = TargetSpec {
            provider: Some("byos".to_string()),
            ip: Some("203.0.113.4".to_string()),
            ..Default::default()
        };
        let mut config = Config::default();
        let target = orch
            .ensure_target(&mut config, "api", project.path(), &spec, &detection)
            .unwrap();
        assert_eq!(target.provider(), "byos");
        assert_eq!(target.language, "Python");

        let reloaded = orch.configs.load().unwrap();
        assert!(reloaded.targets.contains_key("api"));
    }

    #[test]
    fn dockerfile_detection_selects_compose_builder() {
        let (_dir, orch) = test_orchestrator();
        let project = tempfile::tempdir().unwrap();
        let detection = Detection {
            framework: "Dockerfile".to_string(),
            language: "Container".to_string(),
            confidence: 1.0,
            signals: vec![],
            build_plan: vec![],
            run_plan: vec![],
            meta: BTreeMap::new(),
        };
        let spec = TargetSpec {
            provider: Some("byos".to_string()),
            ip: Some("203.0.113.4".to_string()),
            ..Default::default()
        };
        let mut config = Config::default();
        let target = orch
            .ensure_target(&mut config, "svc", project.path(), &spec, &detection)
            .unwrap();
        assert_eq!(target.builder, Builder::Dockerfile);
    }

    #[test]
    fn destroy_aborts_without_provider_token() {
        let (_dir, orch) = test_orchestrator();
        let project = tempfile::tempdir().unwrap();
        let mut target = byos_target("web", project.path());
        target.provider_config = ProviderConfig::Digitalocean(DigitalOceanConfig {
            region: "nyc1".to_string(),
            size: "s-1vcpu-1gb".to_string(),
            server_id: Some("d-123".to_string()),
            ..Default::default()
        });
        let mut config = Config::default();
        config.targets.insert("web".to_string(), target);
        orch.configs.save(&config).unwrap();
        orch.states.mark_created("web", Some("d-123")).unwrap();

        let err = orch.destroy(&mut config, "web", true).unwrap_err();
        assert!(err.to_string().contains("set-token digitalocean"));

        // Nothing was mutated: target and state both survive.
        assert!(orch.configs.load().unwrap().targets.contains_key("web"));
        assert!(orch.states.exists("web"));
    }

    #[test]
    fn destroy_unknown_target_errors() {
        let (_dir, orch) = test_orchestrator();
        let mut config = Config::default();
        let err = orch.destroy(&mut config, "ghost", true).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn provision_shape_rejects_byos() {
        let cfg = ProviderConfig::Byos(ByosConfig {
            ip: "1.2.3.4".to_string(),
            username: "root".to_string(),
            ssh_key_path: String::new(),
        });
        assert!(provision_shape(&cfg).is_err());
    }

    #[test]
    fn root_domain_extraction() {
        assert_eq!(root_domain_of("app.example.com"), "example.com");
        assert_eq!(root_domain_of("example.com"), "example.com");
        assert_eq!(root_domain_of("a.b.example.co"), "example.co");
    }
}
