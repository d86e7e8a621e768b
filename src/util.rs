use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Root of the local store: `~/.lightfold`, overridable with
/// `LIGHTFOLD_HOME` (used by tests and CI sandboxes).
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("LIGHTFOLD_HOME") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|h| h.join(".lightfold"))
        .ok_or_else(|| Error::EnvMissing("HOME".into()))
}

/// Write a file atomically: tempfile in the destination directory,
/// then rename. A crash mid-write can never truncate the store.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::State(format!("no parent directory for {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::State(format!("tempfile in {}: {e}", dir.display())))?;
    tmp.write_all(content)
        .map_err(|e| Error::State(format!("write {}: {e}", path.display())))?;
    tmp.persist(path)
        .map_err(|e| Error::State(format!("rename into {}: {e}", path.display())))?;
    Ok(())
}

/// Atomic write followed by chmod 0600. Token and key material
/// only ever lands on disk with owner-only permissions.
pub fn atomic_write_private(path: &Path, content: &[u8]) -> Result<()> {
    atomic_write(path, content)?;
    set_private(path)
}

/// chmod 0600.
pub fn set_private(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

/// Reduce a name to the identifier-safe alphabet used for target
/// names, app directories, and service units: lowercase ASCII
/// alphanumerics and `-`.
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if (c == '-' || c == '_' || c == ' ' || c == '.') && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// File-name key for a server state file: dots in the IP become
/// underscores.
#[must_use]
pub fn sanitize_ip(ip: &str) -> String {
    ip.replace('.', "_").replace(':', "_")
}

/// Minimal IPv4 shape check for user-supplied addresses.
#[must_use]
pub fn looks_like_ipv4(s: &str) -> bool {
    let octets: Vec<&str> = s.split('.').collect();
    octets.len() == 4 && octets.iter().all(|o| !o.is_empty() && o.parse::<u8>().is_ok())
}

/// Prompt on stderr and read one trimmed line from stdin.
pub fn prompt_line(message: &str) -> Result<String> {
    eprint!("{message}");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Ask for an explicit `yes` before destructive operations.
pub fn confirm(message: &str) -> Result<bool> {
    let input = prompt_line(&format!("{message} Type 'yes' to confirm: "))?;
    Ok(input == "yes")
}

/// Substitute `{key}` placeholders in a template.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_separators() {
        assert_eq!(sanitize_name("My App.Name"), "my-app-name");
        assert_eq!(sanitize_name("--web--"), "web");
        assert_eq!(sanitize_name("api_v2"), "api-v2");
    }

    #[test]
    fn sanitize_ip_is_filename_safe() {
        assert_eq!(sanitize_ip("192.168.0.1"), "192_168_0_1");
    }

    #[test]
    fn ipv4_shape() {
        assert!(looks_like_ipv4("10.0.0.1"));
        assert!(!looks_like_ipv4("10.0.0"));
        assert!(!looks_like_ipv4("10.0.0.256"));
        assert!(!looks_like_ipv4("example.com"));
    }

    #[test]
    fn template_substitution() {
        let out = render_template("{a} and {b}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and y");
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/store.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
