//! Async process executor for `docker` CLI invocations.
//!
//! Adapted from the crate's original single-daemon executor: the only change is that every
//! invocation may carry a `DOCKER_HOST` override, which is how a node pool points the same
//! code at either the local socket or a locally-bridged SSH tunnel.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::TransportError;

/// Per-invocation execution tuning.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Command timeout; `None` disables it.
    pub timeout: Option<Duration>,
    /// Extra environment variables, layered over the process's own (notably `DOCKER_HOST`).
    pub environment: HashMap<String, String>,
    /// Bytes written to the child's stdin before it runs to completion.
    pub stdin_data: Option<Vec<u8>>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            environment: HashMap::new(),
            stdin_data: None,
        }
    }
}

/// Captured output of a completed `docker` invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// `exit_code == 0`.
    pub success: bool,
}

impl CommandOutput {
    fn new(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: exit_code == 0,
        }
    }
}

/// Runs `docker` subcommands as child processes, with timeout and environment control.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    /// Resolved path to the `docker` binary.
    pub docker_path: std::path::PathBuf,
    default_config: ExecutionConfig,
}

impl ProcessExecutor {
    /// Builds an executor that shells out to `docker_path`.
    #[must_use]
    pub fn new(docker_path: std::path::PathBuf) -> Self {
        Self {
            docker_path,
            default_config: ExecutionConfig::default(),
        }
    }

    /// Runs `docker {args}` under `config` (or the executor's default), returning its
    /// output.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::CommandTimeout`] if the timeout elapses,
    /// [`TransportError::CommandFailed`] on a non-zero exit, or [`TransportError::Io`] if
    /// the process could not be spawned or communicated with.
    pub async fn execute(
        &self,
        args: &[String],
        config: Option<ExecutionConfig>,
    ) -> Result<CommandOutput, TransportError> {
        let config = config.unwrap_or_else(|| self.default_config.clone());
        let command_str = format!("docker {}", args.join(" "));
        debug!(command = %command_str, "executing docker command");

        let mut command = Command::new(&self.docker_path);
        command.args(args);
        command.stdin(if config.stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        for (key, value) in &config.environment {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| TransportError::Io(format!("spawn '{command_str}': {e}")))?;

        if let Some(stdin_data) = config.stdin_data {
            if let Some(mut stdin) = child.stdin.take() {
                tokio::spawn(async move {
                    if let Err(e) = stdin.write_all(&stdin_data).await {
                        warn!(error = %e, "failed writing docker command stdin");
                    }
                    let _ = stdin.shutdown().await;
                });
            }
        }

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let stdout_handle = tokio::spawn(async move { read_all_lines(stdout).await });
        let stderr_handle = tokio::spawn(async move { read_all_lines(stderr).await });

        let wait = async {
            let status = child
                .wait()
                .await
                .map_err(|e| TransportError::Io(format!("wait on '{command_str}': {e}")))?;
            let stdout = stdout_handle
                .await
                .map_err(|e| TransportError::Io(format!("stdout join: {e}")))?;
            let stderr = stderr_handle
                .await
                .map_err(|e| TransportError::Io(format!("stderr join: {e}")))?;
            Ok::<_, TransportError>((status, stdout, stderr))
        };

        let (status, stdout, stderr) = if let Some(duration) = config.timeout {
            match timeout(duration, wait).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(TransportError::CommandTimeout {
                        command: command_str,
                        timeout: duration,
                    })
                }
            }
        } else {
            wait.await?
        };

        let exit_code = status.code().unwrap_or(-1);
        trace!(exit_code, "docker command completed");
        let output = CommandOutput::new(exit_code, stdout, stderr);

        if !output.success {
            return Err(TransportError::CommandFailed {
                command: command_str,
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }

    /// Pings the daemon via `docker info`, surfacing any connectivity failure.
    ///
    /// # Errors
    ///
    /// Propagates whatever [`ProcessExecutor::execute`] returns.
    pub async fn ping(&self, config: Option<ExecutionConfig>) -> Result<(), TransportError> {
        self.execute(&["info".to_string(), "--format".to_string(), "{{.ServerVersion}}".to_string()], config)
            .await?;
        Ok(())
    }
}

async fn read_all_lines(reader: impl tokio::io::AsyncRead + Unpin) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut output = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&line);
    }
    output
}

/// Locates a usable `docker` binary, preferring `PATH` resolution.
///
/// # Errors
///
/// Returns [`TransportError::DockerNotFound`] if no `docker` binary is discoverable.
pub fn find_docker_binary() -> Result<std::path::PathBuf, TransportError> {
    which::which("docker").map_err(|_| TransportError::DockerNotFound("docker not found in PATH".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_timeout_and_no_stdin() {
        let config = ExecutionConfig::default();
        assert!(config.timeout.is_some());
        assert!(config.stdin_data.is_none());
    }

    #[tokio::test]
    async fn find_docker_binary_does_not_panic() {
        let _ = find_docker_binary();
    }
}
