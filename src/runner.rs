//! Shell command execution with deadlines

use anyhow::{Context, Result, bail};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run a script with `sh -c`, killing it if it outlives `timeout`
///
/// stdout and stderr are drained on their own threads so a chatty command
/// cannot block on a full pipe while we wait for it.
pub fn shell(script: &str, timeout: Duration) -> Result<CommandOutput> {
    log::debug!("Executing: {script}");

    let mut child = Command::new("sh")
        .args(["-c", script])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute: {script}"))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            // Timeout - kill the process
            let _ = child.kill();
            let _ = child.wait();
            bail!("'{}' timed out after {} seconds", script, timeout.as_secs());
        }
    };

    let output = CommandOutput {
        success: status.success(),
        code: status.code(),
        stdout: join(stdout),
        stderr: join(stderr),
    };

    for line in output.stderr.lines() {
        log::debug!("[{script}] {line}");
    }
    Ok(output)
}

/// Run a script and fail unless it exits 0, returning trimmed stdout
pub fn shell_checked(script: &str, timeout: Duration) -> Result<String> {
    let output = shell(script, timeout)?;
    if output.success {
        Ok(output.stdout.trim().to_string())
    } else {
        let code = output.code.unwrap_or(-1);
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        bail!("'{}' failed with exit code {}: {}", script, code, detail)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<thread::JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
