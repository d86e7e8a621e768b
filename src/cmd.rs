use std::process::{Command, Output, Stdio};

use crate::error::{Error, Result};

/// Run a command and capture its output. Fails if the command
/// returns a non-zero exit code.
pub fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = spawn(program, args)?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let command = format_command(program, args);
        tracing::debug!(%command, %stderr, "command failed");
        Err(Error::CommandFailed {
            command,
            status: output.status,
        })
    }
}

/// Run a command and capture stdout, stderr, and the exit status
/// without treating a non-zero exit as an error.
pub fn run_unchecked(program: &str, args: &[&str]) -> Result<Output> {
    spawn(program, args)
}

/// Run a command with stdin/stdout/stderr inherited (interactive).
pub fn run_interactive(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| map_spawn_err(program, &e))?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            command: format_command(program, args),
            status,
        })
    }
}

/// Run a command that pipes its stdin from a byte slice.
pub fn run_with_stdin(program: &str, args: &[&str], stdin_data: &[u8]) -> Result<String> {
    use std::io::Write;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| map_spawn_err(program, &e))?;

    if let Some(stdin) = &mut child.stdin {
        stdin.write_all(stdin_data)?;
    }
    drop(child.stdin.take());

    let output = child.wait_with_output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::debug!(program, %stderr, "piped command failed");
        Err(Error::CommandFailed {
            command: format_command(program, args),
            status: output.status,
        })
    }
}

/// Run a command, streaming stdout and stderr into the given sinks
/// as the child produces them. Returns the exit status.
pub fn run_streamed(
    program: &str,
    args: &[&str],
    stdout_sink: &mut (dyn std::io::Write + Send),
    stderr_sink: &mut (dyn std::io::Write + Send),
) -> Result<std::process::ExitStatus> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| map_spawn_err(program, &e))?;

    let mut out = child.stdout.take().ok_or_else(|| Error::Other("child stdout unavailable".into()))?;
    let mut err = child.stderr.take().ok_or_else(|| Error::Other("child stderr unavailable".into()))?;

    std::thread::scope(|scope| -> Result<()> {
        let handle = scope.spawn(move || std::io::copy(&mut err, stderr_sink));
        std::io::copy(&mut out, stdout_sink)?;
        handle
            .join()
            .map_err(|_| Error::Other("stderr reader panicked".into()))??;
        Ok(())
    })?;

    Ok(child.wait()?)
}

/// Check if a command exists on PATH.
#[must_use]
pub fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

fn spawn(program: &str, args: &[&str]) -> Result<Output> {
    Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| map_spawn_err(program, &e))
}

fn map_spawn_err(program: &str, e: &std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::CommandNotFound(program.to_string())
    } else {
        Error::Io(std::io::Error::new(e.kind(), e.to_string()))
    }
}

fn format_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| (*a).to_string()));
    parts.join(" ")
}
