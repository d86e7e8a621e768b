use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;
use std::time::Duration;

use crate::cmd;
use crate::error::{Error, Result};

pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(2);

/// Captured result of one remote command. A non-zero exit is data,
/// not an error; only transport failures surface as `Err`.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Promote a non-zero exit into an SSH error with context.
    pub fn expect_success(self, what: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::Ssh(format!(
                "{what} exited {}: {}",
                self.exit_code,
                if self.stderr.is_empty() { &self.stdout } else { &self.stderr }
            )))
        }
    }
}

/// Executor for one remote host, wrapping the OpenSSH client with
/// connection multiplexing so repeated calls reuse one TCP session.
///
/// Host keys are not pinned (`StrictHostKeyChecking=no`): first-boot
/// provisioning talks to hosts that did not exist a minute earlier.
pub struct SshExecutor {
    host: String,
    user: String,
    key_path: Option<PathBuf>,
    control_path: PathBuf,
}

impl SshExecutor {
    #[must_use]
    pub fn new(host: &str, user: &str) -> Self {
        let control_path =
            std::env::temp_dir().join(format!("lightfold-ssh-{user}-{host}.sock"));
        Self {
            host: host.to_string(),
            user: user.to_string(),
            key_path: None,
            control_path,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key_path: &Path) -> Self {
        self.key_path = Some(key_path.to_path_buf());
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Probe the host until it answers, up to `attempts` tries with
    /// a fixed delay. The first success leaves a multiplexed master
    /// connection behind for subsequent calls.
    pub fn connect(&self, attempts: u32, delay: Duration) -> Result<()> {
        for attempt in 1..=attempts {
            tracing::debug!(host = %self.host, attempt, "probing SSH");
            match self.execute("echo ok") {
                Ok(out) if out.success() => return Ok(()),
                Ok(out) => {
                    tracing::debug!(stderr = %out.stderr, "SSH probe refused");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "SSH probe failed");
                }
            }
            if attempt < attempts {
                thread::sleep(delay);
            }
        }
        Err(Error::Ssh(format!(
            "{}@{} not reachable after {attempts} attempts",
            self.user, self.host
        )))
    }

    /// Tear down the multiplexed master connection, if one exists.
    pub fn disconnect(&self) {
        let control = self.control_path.to_string_lossy().to_string();
        let _ = std::process::Command::new("ssh")
            .args(["-O", "exit", "-o", &format!("ControlPath={control}")])
            .arg(self.destination())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }

    /// Run a command remotely, capturing stdout/stderr/exit code.
    pub fn execute(&self, command: &str) -> Result<CommandOutput> {
        let args = self.build_args(command);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = cmd::run_unchecked("ssh", &refs)?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Run a command under sudo. The deploy user is created with
    /// NOPASSWD, so `-n` never blocks on a password prompt.
    pub fn execute_sudo(&self, command: &str) -> Result<CommandOutput> {
        self.execute(&format!("sudo -n sh -c '{}'", shell_escape(command)))
    }

    /// Run a command remotely, streaming output into the sinks as
    /// it is produced. Used for long builds where the operator
    /// wants to watch progress.
    pub fn execute_streamed(
        &self,
        command: &str,
        stdout_sink: &mut (dyn std::io::Write + Send),
        stderr_sink: &mut (dyn std::io::Write + Send),
    ) -> Result<i32> {
        let args = self.build_args(command);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let status = cmd::run_streamed("ssh", &refs, stdout_sink, stderr_sink)?;
        Ok(status.code().unwrap_or(-1))
    }

    /// Run a command with the local terminal attached (`lightfold
    /// ssh`, `lightfold logs -f`).
    pub fn execute_interactive(&self, command: &str) -> Result<()> {
        let mut args = self.base_args();
        args.push("-t".to_string());
        args.push(self.destination());
        args.push(command.to_string());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        cmd::run_interactive("ssh", &refs)
    }

    /// Open an interactive login shell.
    pub fn shell(&self) -> Result<()> {
        let mut args = self.base_args();
        args.push(self.destination());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        cmd::run_interactive("ssh", &refs)
    }

    /// Copy a local file to the remote host via scp.
    pub fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        if !local.exists() {
            return Err(Error::FileNotFound(local.display().to_string()));
        }
        let mut args = self.base_args();
        args.push(local.to_string_lossy().to_string());
        args.push(format!("{}:{remote}", self.destination()));
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        cmd::run("scp", &refs)
            .map_err(|e| Error::Ssh(format!("upload {} failed: {e}", local.display())))?;
        Ok(())
    }

    /// Stream bytes into a remote file via `cat`.
    pub fn upload_bytes(&self, data: &[u8], remote: &str) -> Result<()> {
        let command = format!("cat > '{}'", shell_escape(remote));
        let args = self.build_args(&command);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        cmd::run_with_stdin("ssh", &refs, data)
            .map_err(|e| Error::Ssh(format!("write {remote} failed: {e}")))?;
        Ok(())
    }

    /// Write content to a remote path that may need sudo: staged in
    /// /tmp, then moved into place, with optional mode and owner.
    pub fn write_remote_file(
        &self,
        content: &str,
        remote: &str,
        mode: Option<&str>,
        owner: Option<&str>,
    ) -> Result<()> {
        let staged = format!("/tmp/lightfold-stage-{}", sanitize_component(remote));
        self.upload_bytes(content.as_bytes(), &staged)?;

        let mut script = format!("mv '{staged}' '{remote}'");
        if let Some(mode) = mode {
            script.push_str(&format!(" && chmod {mode} '{remote}'"));
        }
        if let Some(owner) = owner {
            script.push_str(&format!(" && chown {owner} '{remote}'"));
        }
        self.execute_sudo(&script)?
            .expect_success(&format!("install {remote}"))?;
        Ok(())
    }

    /// True if a path exists on the remote host.
    pub fn path_exists(&self, remote: &str) -> Result<bool> {
        Ok(self
            .execute(&format!("test -e '{}'", shell_escape(remote)))?
            .success())
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn build_args(&self, command: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.push(self.destination());
        args.push(command.to_string());
        args
    }

    fn base_args(&self) -> Vec<String> {
        let control = self.control_path.to_string_lossy().to_string();
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={control}"),
            "-o".to_string(),
            "ControlPersist=120".to_string(),
        ];
        if let Some(key) = &self.key_path {
            args.push("-i".to_string());
            args.push(key.to_string_lossy().to_string());
        }
        args
    }
}

/// Escape a string for single-quoted shell embedding.
#[must_use]
pub fn shell_escape(s: &str) -> String {
    s.replace('\'', "'\\''")
}

fn sanitize_component(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_single_quotes() {
        assert_eq!(shell_escape("it's"), "it'\\''s");
        assert_eq!(shell_escape("plain"), "plain");
    }

    #[test]
    fn sudo_wraps_and_escapes() {
        // Rendering only; nothing here talks to a host.
        let cmd = format!("sudo -n sh -c '{}'", shell_escape("echo 'hi'"));
        assert_eq!(cmd, "sudo -n sh -c 'echo '\\''hi'\\'''");
    }

    #[test]
    fn output_success_mapping() {
        let ok = CommandOutput {
            stdout: "ok".into(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert!(ok.success());
        assert!(ok.expect_success("probe").is_ok());

        let bad = CommandOutput {
            stdout: String::new(),
            stderr: "denied".into(),
            exit_code: 1,
        };
        let err = bad.expect_success("probe").unwrap_err();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn staged_filenames_are_path_free() {
        assert_eq!(
            sanitize_component("/etc/nginx/sites-available/web.conf"),
            "-etc-nginx-sites-available-web.conf"
        );
    }
}
