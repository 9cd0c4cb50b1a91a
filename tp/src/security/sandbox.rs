//! Process sandbox - resource-bounded subprocess execution
//!
//! Userland limits only: nice level, open fds, CPU time, address space
//! (best-effort, unavailable on some platforms), and process count, applied
//! in the child between fork and exec. Timeouts kill the child.

use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Sandbox errors
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to spawn process: {0}")]
    Spawn(std::io::Error),

    #[error("Process failed: {0}")]
    Wait(std::io::Error),
}

/// Resource limits applied to sandboxed children
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// CPU-time limit in seconds (also the default wall timeout)
    pub max_cpu_secs: u64,
    /// Address-space cap in MiB (best-effort)
    pub max_memory_mb: u64,
    /// Max processes/threads the child may hold
    pub max_processes: u64,
    /// Max open file descriptors
    pub max_open_files: u64,
    /// Niceness increment for the child
    pub nice: i32,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_cpu_secs: 30,
            max_memory_mb: 1024,
            max_processes: 100,
            max_open_files: 1024,
            nice: 5,
        }
    }
}

/// Output of a sandboxed run
#[derive(Debug, Clone)]
pub struct SandboxedOutput {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
}

/// Spawns commands with resource limits and a kill-on-timeout guard
pub struct Sandbox {
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    /// Run a shell command line under the sandbox. `timeout` defaults to the
    /// CPU limit.
    pub async fn run_shell(&self, command: &str, cwd: &std::path::Path, timeout: Option<Duration>) -> Result<SandboxedOutput, SandboxError> {
        let timeout = timeout.unwrap_or(Duration::from_secs(self.limits.max_cpu_secs));
        let limits = self.limits.clone();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Applied in the child between fork and exec
        unsafe {
            cmd.pre_exec(move || {
                apply_limits(&limits);
                Ok(())
            });
        }

        debug!(command, ?timeout, "Sandbox spawning");
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(SandboxError::Spawn)?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let wait = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut stdout).await;
            }
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut stderr).await;
            }
            let status = child.wait().await.map_err(SandboxError::Wait)?;
            Ok::<_, SandboxError>((status, stdout, stderr))
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok((status, stdout, stderr))) => Ok(SandboxedOutput {
                returncode: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&stdout).to_string(),
                stderr: String::from_utf8_lossy(&stderr).to_string(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(command, ?timeout, "Sandboxed process timed out, killing");
                Err(SandboxError::Timeout(timeout))
            }
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(SandboxLimits::default())
    }
}

/// Best-effort rlimit application; individual failures are ignored (some
/// limits are unavailable depending on platform)
fn apply_limits(limits: &SandboxLimits) {
    use nix::sys::resource::{Resource, setrlimit};

    unsafe {
        let _ = nix::libc::nice(limits.nice);
    }

    let _ = setrlimit(Resource::RLIMIT_NOFILE, limits.max_open_files, limits.max_open_files);
    let _ = setrlimit(Resource::RLIMIT_CPU, limits.max_cpu_secs, limits.max_cpu_secs);

    let bytes = limits.max_memory_mb.saturating_mul(1024 * 1024);
    let _ = setrlimit(Resource::RLIMIT_AS, bytes, bytes);

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        let _ = setrlimit(Resource::RLIMIT_NPROC, limits.max_processes, limits.max_processes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_captures_output() {
        let temp = tempdir().unwrap();
        let sandbox = Sandbox::default();

        let out = sandbox.run_shell("echo hello", temp.path(), None).await.unwrap();
        assert_eq!(out.returncode, 0);
        assert!(out.stdout.contains("hello"));
        assert!(out.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let temp = tempdir().unwrap();
        let sandbox = Sandbox::default();

        let out = sandbox.run_shell("exit 3", temp.path(), None).await.unwrap();
        assert_eq!(out.returncode, 3);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let temp = tempdir().unwrap();
        let sandbox = Sandbox::default();

        let result = sandbox
            .run_shell("sleep 10", temp.path(), Some(Duration::from_millis(100)))
            .await;
        assert!(matches!(result, Err(SandboxError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "x").unwrap();

        let sandbox = Sandbox::default();
        let out = sandbox.run_shell("ls", temp.path(), None).await.unwrap();
        assert!(out.stdout.contains("marker.txt"));
    }
}
