use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};

use crate::cloudinit::DEPLOY_USER;
use crate::cmd;
use crate::error::{Error, Result};
use crate::service;
use crate::ssh::{SshExecutor, shell_escape};

pub const HEALTH_CHECK_ATTEMPTS: u32 = 5;
pub const HEALTH_CHECK_DELAY: Duration = Duration::from_secs(3);
pub const RELEASE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Paths that never ship in a release tarball: VCS metadata,
/// dependency caches, local env files, and previous build output.
const TARBALL_EXCLUDES: &[&str] = &[
    "./.git",
    "./.hg",
    "./.svn",
    "./node_modules",
    "./.env",
    "./.env.*",
    "./.next",
    "./.nuxt",
    "./dist",
    "./build",
    "./target",
    "./__pycache__",
    "./.venv",
    "./venv",
    "./.DS_Store",
];

/// How the activated release is (re)started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// systemd unit named after the app.
    Systemd,
    /// `docker compose` stack inside the release directory.
    Compose,
}

/// Capistrano-style release management for one app on one server:
///
/// ```text
/// /srv/<app>/releases/<YYYYMMDDHHMMSS>/   immutable snapshots
/// /srv/<app>/shared/                      env file, persistent data
/// /srv/<app>/current -> releases/<ts>     atomically swapped
/// ```
pub struct ReleaseExecutor<'a> {
    ssh: &'a SshExecutor,
    app_name: String,
    service_kind: ServiceKind,
}

impl<'a> ReleaseExecutor<'a> {
    #[must_use]
    pub fn new(ssh: &'a SshExecutor, app_name: &str, service_kind: ServiceKind) -> Self {
        Self {
            ssh,
            app_name: app_name.to_string(),
            service_kind,
        }
    }

    #[must_use]
    pub fn app_root(&self) -> String {
        format!("/srv/{}", self.app_name)
    }

    fn releases_dir(&self) -> String {
        format!("{}/releases", self.app_root())
    }

    fn current_link(&self) -> String {
        format!("{}/current", self.app_root())
    }

    fn shared_dir(&self) -> String {
        format!("{}/shared", self.app_root())
    }

    /// Create the release tree, owned by the deploy user.
    pub fn ensure_layout(&self) -> Result<()> {
        let root = self.app_root();
        self.ssh
            .execute_sudo(&format!(
                "mkdir -p {root}/releases {root}/shared/static {root}/shared/media && \
                 chown -R {DEPLOY_USER}:{DEPLOY_USER} {root}"
            ))?
            .expect_success("create release layout")?;
        Ok(())
    }

    /// Tar the project into local /tmp, honoring the exclude list.
    pub fn create_release_tarball(&self, project_path: &Path) -> Result<PathBuf> {
        if !project_path.is_dir() {
            return Err(Error::Validation(format!(
                "project path does not exist: {}",
                project_path.display()
            )));
        }
        let tarball = std::env::temp_dir().join(format!(
            "{}-{}.tar.gz",
            self.app_name,
            Utc::now().format(RELEASE_TIMESTAMP_FORMAT)
        ));

        let tarball_str = tarball.to_string_lossy().to_string();
        let project_str = project_path.to_string_lossy().to_string();
        let mut args = vec!["-czf", tarball_str.as_str(), "-C", project_str.as_str()];
        let excludes: Vec<String> = TARBALL_EXCLUDES
            .iter()
            .map(|e| format!("--exclude={e}"))
            .collect();
        for e in &excludes {
            args.push(e.as_str());
        }
        args.push(".");

        cmd::run("tar", &args)
            .map_err(|e| Error::Deployment(format!("tarball failed: {e}")))?;
        Ok(tarball)
    }

    /// Pick a release name from the wall clock, stepping forward a
    /// second at a time while the directory already exists.
    pub fn next_release_timestamp(&self) -> Result<String> {
        let mut ts = Utc::now().format(RELEASE_TIMESTAMP_FORMAT).to_string();
        while self
            .ssh
            .path_exists(&format!("{}/{ts}", self.releases_dir()))?
        {
            ts = bump_timestamp(&ts)?;
        }
        Ok(ts)
    }

    /// Upload the tarball and unpack it into a new release
    /// directory. Returns the remote release path.
    pub fn upload_release(&self, tarball: &Path, timestamp: &str) -> Result<String> {
        let remote_tmp = format!(
            "/tmp/{}",
            tarball
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| Error::Deployment("tarball has no file name".into()))?
        );
        let release_dir = format!("{}/{timestamp}", self.releases_dir());

        self.ssh.upload_file(tarball, &remote_tmp)?;
        self.ssh
            .execute(&format!(
                "mkdir -p {release_dir} && tar -xzf {remote_tmp} -C {release_dir} && rm -f {remote_tmp}"
            ))?
            .expect_success("extract release")?;
        Ok(release_dir)
    }

    /// Run build commands inside the release directory with the
    /// deploy env vars exported. A failed build leaves the release
    /// directory in place for inspection; `current` is untouched.
    pub fn build_release(
        &self,
        timestamp: &str,
        commands: &[String],
        env_vars: &BTreeMap<String, String>,
        port: u16,
    ) -> Result<()> {
        let release_dir = format!("{}/{timestamp}", self.releases_dir());
        let exports = render_exports(env_vars, port);

        for command in commands {
            eprintln!("  build: {command}");
            let mut out = std::io::stderr();
            let mut err = std::io::stderr();
            let exit = self.ssh.execute_streamed(
                &format!("cd {release_dir} && {exports}{command}"),
                &mut out,
                &mut err,
            )?;
            if exit != 0 {
                return Err(Error::Deployment(format!(
                    "build command '{command}' exited {exit}"
                )));
            }
        }
        Ok(())
    }

    /// Materialize `shared/.env` (0600, deploy-owned).
    pub fn write_environment_file(
        &self,
        env_vars: &BTreeMap<String, String>,
        port: u16,
    ) -> Result<()> {
        let content = service::render_env_file(env_vars, port);
        self.ssh.write_remote_file(
            &content,
            &format!("{}/.env", self.shared_dir()),
            Some("600"),
            Some(&format!("{DEPLOY_USER}:{DEPLOY_USER}")),
        )
    }

    /// Atomic activation: a temporary symlink is renamed onto
    /// `current`. The rename is the commit point; everything before
    /// it is recoverable by deleting the unused release directory.
    pub fn activate(&self, timestamp: &str) -> Result<()> {
        let root = self.app_root();
        self.ssh
            .execute(&format!(
                "cd {root} && ln -sfn releases/{timestamp} current.new && mv -T current.new current"
            ))?
            .expect_success("swap current symlink")?;
        self.restart_service()
    }

    fn restart_service(&self) -> Result<()> {
        match self.service_kind {
            ServiceKind::Systemd => service::restart(self.ssh, &self.app_name),
            ServiceKind::Compose => {
                self.ssh
                    .execute(&format!(
                        "cd {} && docker compose up -d --build",
                        self.current_link()
                    ))?
                    .expect_success("docker compose up")?;
                Ok(())
            }
        }
    }

    /// TCP-connect health check against the app port on loopback,
    /// run from the server itself. A connection that is refused or
    /// immediately reset counts as a failed attempt.
    pub fn health_check(&self, port: u16, attempts: u32, delay: Duration) -> Result<()> {
        for attempt in 1..=attempts {
            let out = self.ssh.execute(&format!(
                "timeout 3 bash -c 'exec 3<>/dev/tcp/127.0.0.1/{port}' 2>/dev/null"
            ))?;
            if out.success() {
                eprintln!("  health check: port {port} answering");
                return Ok(());
            }
            eprintln!("  health check ({attempt}/{attempts}): no answer on {port}, retrying");
            if attempt < attempts {
                thread::sleep(delay);
            }
        }
        Err(Error::HealthCheckTimeout(self.app_name.clone(), attempts))
    }

    /// Activate, health-check, and roll back to the previous
    /// release if the app never starts answering. The original
    /// health-check error is returned either way.
    pub fn deploy_with_health_check(
        &self,
        timestamp: &str,
        port: u16,
        attempts: u32,
        delay: Duration,
    ) -> Result<()> {
        let previous = self.current_release()?;
        self.activate(timestamp)?;

        match self.health_check(port, attempts, delay) {
            Ok(()) => Ok(()),
            Err(health_err) => {
                if let Some(prev) = previous {
                    eprintln!("  health check failed; rolling back to {prev}");
                    self.activate(&prev)?;
                } else {
                    // First deploy: nothing to roll back to. The
                    // failed release stays active for post-mortem.
                    eprintln!("  health check failed on first deploy; leaving release for inspection");
                }
                Err(health_err)
            }
        }
    }

    /// User-facing rollback; fails loudly when there is no
    /// previous release to return to.
    pub fn rollback_to_previous_release(&self) -> Result<String> {
        let releases = self.list_releases()?;
        let current = self.current_release()?;
        let previous = previous_release(&releases, current.as_deref()).ok_or_else(|| {
            Error::Deployment(format!(
                "no previous release to roll back to for {}",
                self.app_name
            ))
        })?;
        self.activate(&previous)?;
        Ok(previous)
    }

    /// Delete all but the newest `keep` releases; the directory
    /// `current` points at survives even when it is older.
    pub fn cleanup_old_releases(&self, keep: usize) -> Result<Vec<String>> {
        let releases = self.list_releases()?;
        let current = self.current_release()?;
        let doomed = releases_to_delete(&releases, current.as_deref(), keep);

        for release in &doomed {
            self.ssh
                .execute(&format!("rm -rf {}/{release}", self.releases_dir()))?
                .expect_success("remove old release")?;
        }
        Ok(doomed)
    }

    /// Release directory names, lexicographically sorted (which is
    /// chronological for this timestamp format).
    pub fn list_releases(&self) -> Result<Vec<String>> {
        let out = self
            .ssh
            .execute(&format!("ls -1 {} 2>/dev/null", self.releases_dir()))?;
        let mut releases: Vec<String> = out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect();
        releases.sort();
        Ok(releases)
    }

    /// The release `current` resolves to, if the symlink exists.
    pub fn current_release(&self) -> Result<Option<String>> {
        let out = self
            .ssh
            .execute(&format!("readlink {} 2>/dev/null", self.current_link()))?;
        if !out.success() || out.stdout.is_empty() {
            return Ok(None);
        }
        Ok(out
            .stdout
            .trim()
            .rsplit('/')
            .next()
            .map(ToString::to_string))
    }

    /// Remove the whole app tree (destroy path).
    pub fn remove_app_tree(&self) -> Result<()> {
        self.ssh
            .execute_sudo(&format!("rm -rf {}", self.app_root()))?
            .expect_success("remove app tree")?;
        Ok(())
    }
}

/// `export`-prefix for build commands: PORT plus the deploy env.
fn render_exports(env_vars: &BTreeMap<String, String>, port: u16) -> String {
    let mut exports = format!("export PORT={port} && ");
    for (key, value) in env_vars {
        exports.push_str(&format!("export {key}='{}' && ", shell_escape(value)));
    }
    exports
}

/// Step a `YYYYMMDDHHMMSS` name forward by one second.
fn bump_timestamp(ts: &str) -> Result<String> {
    let parsed = NaiveDateTime::parse_from_str(ts, RELEASE_TIMESTAMP_FORMAT)
        .map_err(|e| Error::Deployment(format!("bad release timestamp '{ts}': {e}")))?;
    let bumped = parsed + ChronoDuration::seconds(1);
    Ok(bumped.format(RELEASE_TIMESTAMP_FORMAT).to_string())
}

/// The previous release relative to `current` in lexicographic
/// order; falls back to the newest-but-one when current is gone.
#[must_use]
pub fn previous_release(releases: &[String], current: Option<&str>) -> Option<String> {
    if releases.len() < 2 {
        return None;
    }
    let idx = current.and_then(|c| releases.iter().position(|r| r == c));
    match idx {
        Some(0) => None,
        Some(i) => Some(releases[i - 1].clone()),
        None => Some(releases[releases.len() - 2].clone()),
    }
}

/// Which releases cleanup removes: everything older than the
/// newest `keep`, except the one `current` points at.
#[must_use]
pub fn releases_to_delete(releases: &[String], current: Option<&str>, keep: usize) -> Vec<String> {
    if releases.len() <= keep {
        return Vec::new();
    }
    let cutoff = releases.len() - keep;
    releases[..cutoff]
        .iter()
        .filter(|r| Some(r.as_str()) != current)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn bump_steps_one_second() {
        assert_eq!(bump_timestamp("20250101000000").unwrap(), "20250101000001");
        assert_eq!(bump_timestamp("20250101235959").unwrap(), "20250102000000");
        assert!(bump_timestamp("not-a-ts").is_err());
    }

    #[test]
    fn previous_release_walks_back_from_current() {
        let releases = names(&["20250101000000", "20250102000000", "20250103000000"]);
        assert_eq!(
            previous_release(&releases, Some("20250103000000")).as_deref(),
            Some("20250102000000")
        );
        assert_eq!(
            previous_release(&releases, Some("20250102000000")).as_deref(),
            Some("20250101000000")
        );
        assert_eq!(previous_release(&releases, Some("20250101000000")), None);
    }

    #[test]
    fn no_previous_on_first_deploy() {
        assert_eq!(previous_release(&names(&["20250101000000"]), Some("20250101000000")), None);
        assert_eq!(previous_release(&[], None), None);
    }

    #[test]
    fn cleanup_keeps_newest_k() {
        let releases = names(&[
            "20250101000000",
            "20250102000000",
            "20250103000000",
            "20250104000000",
        ]);
        let doomed = releases_to_delete(&releases, Some("20250104000000"), 2);
        assert_eq!(doomed, names(&["20250101000000", "20250102000000"]));
    }

    #[test]
    fn cleanup_spares_an_old_current() {
        let releases = names(&[
            "20250101000000",
            "20250102000000",
            "20250103000000",
            "20250104000000",
        ]);
        // Rolled back to the oldest release: it must survive.
        let doomed = releases_to_delete(&releases, Some("20250101000000"), 2);
        assert_eq!(doomed, names(&["20250102000000"]));
    }

    #[test]
    fn cleanup_noop_under_limit() {
        let releases = names(&["20250101000000", "20250102000000"]);
        assert!(releases_to_delete(&releases, None, 5).is_empty());
    }

    #[test]
    fn exports_include_port_and_vars() {
        let mut env = BTreeMap::new();
        env.insert("API_KEY".to_string(), "se'cret".to_string());
        let exports = render_exports(&env, 3002);
        assert!(exports.starts_with("export PORT=3002 && "));
        assert!(exports.contains("export API_KEY='se'\\''cret' && "));
    }

    #[test]
    fn exclude_list_covers_the_usual_suspects() {
        for needle in ["./.git", "./node_modules", "./.env", "./target"] {
            assert!(TARBALL_EXCLUDES.contains(&needle), "missing {needle}");
        }
    }
}
