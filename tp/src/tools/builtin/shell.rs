//! Shell tool - run a command line in the working directory
//!
//! Commands pass through the policy filter first; blocked commands surface
//! as a security violation. When a sandbox is configured the command runs
//! under its resource limits, otherwise it spawns plainly with a timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::tools::{Tool, ToolInvocationContext, ToolOutcome, arg_str};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Execute a shell command
pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command in the working directory. Returns stdout; non-zero exits fail."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command line to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolInvocationContext) -> ToolOutcome {
        let Some(command) = arg_str(args, "command").filter(|c| !c.trim().is_empty()) else {
            return ToolOutcome::failure("shell tool requires a 'command' argument");
        };

        if let Some(policy) = &ctx.policy {
            let decision = policy.check(command).await;
            if !decision.allowed {
                return ToolOutcome::failure(format!("Security violation in shell: {}", decision.reasons.join("; ")));
            }
        }

        let timeout = ctx.timeout.unwrap_or(DEFAULT_TIMEOUT);
        debug!(command, "Executing shell command");

        if let Some(sandbox) = &ctx.sandbox {
            return match sandbox.run_shell(command, &ctx.working_dir, Some(timeout)).await {
                Ok(out) if out.returncode == 0 => ToolOutcome::success(out.stdout),
                Ok(out) => {
                    let detail = if out.stderr.trim().is_empty() {
                        format!("exit code {}", out.returncode)
                    } else {
                        out.stderr.trim().to_string()
                    };
                    ToolOutcome::failure(detail)
                }
                Err(e) => ToolOutcome::failure(format!("Security violation in shell: {}", e)),
            };
        }

        let spawned = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.working_dir)
            .stdin(Stdio::null())
            .output();

        match tokio::time::timeout(timeout, spawned).await {
            Ok(Ok(output)) if output.status.success() => {
                ToolOutcome::success(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = if stderr.trim().is_empty() {
                    format!("exit code {}", output.status.code().unwrap_or(-1))
                } else {
                    stderr.trim().to_string()
                };
                ToolOutcome::failure(detail)
            }
            Ok(Err(e)) => ToolOutcome::failure(format!("Failed to spawn command: {}", e)),
            Err(_) => ToolOutcome::failure(format!("Command timed out after {:?}", timeout)),
        }
    }
}
