//! One-shot renderer process execution.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::RendererCommand;
use crate::error::{RendererError, RendererResult};

/// Cap on captured stdout+stderr to bound memory for chatty renders.
pub const MAX_CAPTURED_OUTPUT: usize = 2 * 1024 * 1024;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Hard wall-clock ceiling for a single render.
pub const DEFAULT_RUN_CEILING: Duration = Duration::from_secs(3600);

/// Result of running one renderer invocation to completion.
///
/// A non-zero exit is a normal outcome, not a runner error.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Exit status code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Merged stdout and stderr, capped at `MAX_CAPTURED_OUTPUT`
    pub output: String,
    /// Whether the run was killed for exceeding the ceiling
    pub timed_out: bool,
}

impl RunOutcome {
    /// Whether the renderer reported success.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Executes one renderer command to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Block until the process exits or the ceiling elapses.
    ///
    /// Errors only when the process cannot be started at all.
    async fn run(&self, cmd: &RendererCommand) -> RendererResult<RunOutcome>;
}

/// Real process runner backed by `tokio::process`.
pub struct RendererRunner {
    ceiling: Duration,
    max_output: usize,
}

impl Default for RendererRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererRunner {
    /// Create a runner with the default one-hour ceiling.
    pub fn new() -> Self {
        Self {
            ceiling: DEFAULT_RUN_CEILING,
            max_output: MAX_CAPTURED_OUTPUT,
        }
    }

    /// Override the wall-clock ceiling.
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Override the output cap.
    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output = bytes;
        self
    }

    fn resolve_binary(&self, cmd: &RendererCommand) -> RendererResult<std::path::PathBuf> {
        let binary = cmd.binary();
        if binary.components().count() > 1 {
            if binary.exists() {
                Ok(binary.to_path_buf())
            } else {
                Err(RendererError::BinaryNotFound(binary.to_path_buf()))
            }
        } else {
            which::which(binary).map_err(|_| RendererError::BinaryNotFound(binary.to_path_buf()))
        }
    }
}

#[async_trait]
impl CommandRunner for RendererRunner {
    async fn run(&self, cmd: &RendererCommand) -> RendererResult<RunOutcome> {
        let binary = self.resolve_binary(cmd)?;

        debug!("Spawning renderer: {}", binary.display());

        let mut child = Command::new(&binary)
            .args(cmd.args())
            .env_clear()
            .envs(cmd.envs())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RendererError::Spawn)?;

        let stdout = child.stdout.take().expect("stdout not captured");
        let stderr = child.stderr.take().expect("stderr not captured");

        // Drain both pipes fully even past the cap so the child never
        // blocks on a full pipe.
        let cap = self.max_output;
        let stdout_task = tokio::spawn(read_capped(stdout, cap));
        let stderr_task = tokio::spawn(read_capped(stderr, cap));

        let mut timed_out = false;
        let exit_status = match tokio::time::timeout(self.ceiling, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => {
                warn!(
                    "Renderer exceeded {}s ceiling, killing process",
                    self.ceiling.as_secs()
                );
                timed_out = true;
                child.kill().await.ok();
                child.wait().await.ok()
            }
        };

        let (stdout_buf, stdout_truncated) = stdout_task.await.unwrap_or_default();
        let (stderr_buf, stderr_truncated) = stderr_task.await.unwrap_or_default();

        let mut output = String::new();
        output.push_str(&String::from_utf8_lossy(&stdout_buf));
        output.push_str(&String::from_utf8_lossy(&stderr_buf));
        if stdout_truncated || stderr_truncated {
            output.push_str(TRUNCATION_MARKER);
        }
        if timed_out {
            output.push_str(&format!(
                "\n[process killed after exceeding {}s ceiling]",
                self.ceiling.as_secs()
            ));
        }

        Ok(RunOutcome {
            exit_code: exit_status.and_then(|s| s.code()),
            output,
            timed_out,
        })
    }
}

/// Read a pipe to EOF, keeping at most `cap` bytes.
async fn read_capped<R>(mut reader: R, cap: usize) -> (Vec<u8>, bool)
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < cap {
                    let take = n.min(cap - buf.len());
                    buf.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }

    (buf, truncated)
}
