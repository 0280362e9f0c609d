use std::process::Stdio;

use async_trait::async_trait;
use orchestrator_core::dispatcher::{AgentContext, AgentExecutor, ExecutionOutcome};
use orchestrator_core::models::Task;
use tokio::process::Command;
use tracing::{debug, warn};

/// An [`AgentExecutor`] that runs a task's command as a child process rooted
/// at the task's repository path.
///
/// The command is handed to `sh -c`, so `task.command` may be any shell
/// expression the caller trusts (compound commands, pipes, redirects).
/// Cancellation kills the child promptly rather than waiting for it to exit
/// on its own.
pub struct ProcessAgentExecutor {
    shell: String,
}

impl Default for ProcessAgentExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessAgentExecutor {
    pub fn new() -> Self {
        Self { shell: "sh".to_string() }
    }

    /// Overrides the shell used to interpret `task.command` (defaults to `sh`).
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }
}

#[async_trait]
impl AgentExecutor for ProcessAgentExecutor {
    async fn execute(&self, task: &Task, agent_ctx: &AgentContext) -> ExecutionOutcome {
        if agent_ctx.cancellation.is_cancelled() {
            return ExecutionOutcome::Failure("cancelled before execution started".to_string());
        }

        let child = match Command::new(&self.shell)
            .arg("-c")
            .arg(&task.command)
            .current_dir(&task.repository_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ExecutionOutcome::Failure(format!("failed to spawn command: {e}")),
        };

        let cancellation = agent_ctx.cancellation.clone();
        tokio::select! {
            output = child.wait_with_output() => match output {
                Ok(output) if output.status.success() => {
                    debug!(task_id = %task.id, "process exited successfully");
                    ExecutionOutcome::Success(String::from_utf8_lossy(&output.stdout).into_owned())
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    ExecutionOutcome::Failure(format!(
                        "command exited with {status}: {stderr}",
                        status = output.status,
                    ))
                }
                Err(e) => ExecutionOutcome::Failure(format!("failed to wait on child process: {e}")),
            },
            _ = cancellation.sleep_or_cancel(std::time::Duration::from_secs(3600)) => {
                warn!(task_id = %task.id, "execution cancelled, killing child process");
                ExecutionOutcome::Failure("cancelled".to_string())
            }
        }
    }
}
