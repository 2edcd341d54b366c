//! Subprocess sandbox
//!
//! Writes the candidate and a fixed harness into a scratch directory and runs
//! the interpreter with a cleared environment and a hard wall-clock limit.
//! The child is killed on timeout, on cancellation and whenever the run
//! future is dropped.
//!
//! Stdin carries a single line: a fresh nonce for this run. The harness reads
//! it before the candidate is loaded and prefixes its report line with it, so
//! a line printed by the candidate itself is never taken for the report.
//! Captured stdout and stderr are each capped at `max_output_bytes`; the
//! excess is drained and discarded.

use crate::cancel::CancelToken;
use crate::error::SandboxError;
use crate::sandbox::{HarnessReport, Sandbox, SandboxOutcome, SandboxProbe};
use async_trait::async_trait;
use forge_artifact::RunId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

const HARNESS: &str = include_str!("harness.py");
const HARNESS_FILE: &str = "forge_harness.py";
const MODULE_FILE: &str = "candidate.py";
const STDERR_TAIL_LINES: usize = 20;

/// Value given to every placeholder credential variable
pub const PLACEHOLDER_VALUE: &str = "forge-sandbox-placeholder";

/// Process sandbox settings (`[sandbox]` table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter command; the harness path and probe arguments are appended
    pub interpreter: Vec<String>,
    /// Wall-clock limit in milliseconds
    pub timeout_ms: u64,
    /// Address-space limit (`ulimit -v`), in MiB
    pub memory_limit_mb: Option<u64>,
    /// CPU-time limit (`ulimit -t`), in seconds
    pub cpu_limit_secs: Option<u64>,
    /// Variables set to a placeholder so credential lookups do not fail
    pub placeholder_env: Vec<String>,
    /// Cap on captured stdout and on captured stderr, each
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: vec!["python3".to_string()],
            timeout_ms: 30_000,
            memory_limit_mb: Some(512),
            cpu_limit_secs: Some(30),
            placeholder_env: ["OAUTH_CLIENT_ID", "OAUTH_CLIENT_SECRET", "OAUTH_REDIRECT_URI"]
                .map(String::from)
                .to_vec(),
            max_output_bytes: 1024 * 1024,
        }
    }
}

impl SandboxConfig {
    /// Wall-clock limit
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn ulimit_prefix(&self) -> Option<String> {
        let mut prefix = String::new();
        if let Some(mb) = self.memory_limit_mb {
            prefix.push_str(&format!("ulimit -v {}; ", mb * 1024));
        }
        if let Some(secs) = self.cpu_limit_secs {
            prefix.push_str(&format!("ulimit -t {secs}; "));
        }
        (!prefix.is_empty()).then_some(prefix)
    }
}

/// [`Sandbox`] backed by a child process
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    /// Create sandbox
    ///
    /// # Errors
    /// `SandboxError::Config` if the interpreter is empty or the timeout is zero.
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        if config.interpreter.is_empty() {
            return Err(SandboxError::Config("interpreter must not be empty".into()));
        }
        if config.timeout_ms == 0 {
            return Err(SandboxError::Config("timeout_ms must be positive".into()));
        }
        if config.max_output_bytes == 0 {
            return Err(SandboxError::Config("max_output_bytes must be positive".into()));
        }
        Ok(Self { config })
    }

    /// Settings in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn command(&self, workdir: &Path, probe: &SandboxProbe) -> Command {
        let (program, args) = match self.config.interpreter.split_first() {
            Some((program, args)) => (program.as_str(), args),
            None => ("python3", &[][..]),
        };

        let mut cmd = match self.config.ulimit_prefix() {
            Some(prefix) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c")
                    .arg(format!("{prefix}exec \"$0\" \"$@\""))
                    .arg(program);
                cmd
            }
            None => Command::new(program),
        };

        cmd.args(args)
            .arg(workdir.join(HARNESS_FILE))
            .arg(workdir.join(MODULE_FILE))
            .arg(&probe.listing_entrypoint)
            .arg(&probe.invocation_entrypoint)
            .arg(&probe.bootstrap_capability);

        cmd.env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        cmd.env("PYTHONDONTWRITEBYTECODE", "1");
        for name in self.config.placeholder_env.iter().chain(&probe.placeholder_env) {
            cmd.env(name, PLACEHOLDER_VALUE);
        }

        cmd.current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn exercise(
        &self,
        source: &str,
        probe: &SandboxProbe,
        cancel: &CancelToken,
    ) -> Result<SandboxOutcome, SandboxError> {
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        let workdir = tempfile::tempdir()?;
        tokio::fs::write(workdir.path().join(MODULE_FILE), source).await?;
        tokio::fs::write(workdir.path().join(HARNESS_FILE), HARNESS).await?;

        let mut cmd = self.command(workdir.path(), probe);
        let child = cmd.spawn().map_err(|e| {
            SandboxError::spawn(self.config.interpreter.join(" "), e)
        })?;
        tracing::debug!("sandbox started: pid {:?}", child.id());

        let nonce = RunId::new().to_string();
        let limit = self.config.timeout();
        let run = tokio::time::timeout(
            limit,
            capture(child, &nonce, self.config.max_output_bytes),
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("sandbox run cancelled, child killed");
                Err(SandboxError::Cancelled)
            }
            result = run => match result {
                Err(_) => {
                    tracing::warn!("sandbox run exceeded {:?}, child killed", limit);
                    Ok(SandboxOutcome::Timeout { after: limit })
                }
                Ok(output) => Ok(interpret(&output?, &nonce, probe)),
            },
        }
    }
}

/// What a finished child left behind
struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    truncated: bool,
}

/// Hand the nonce to the child, then collect capped output until it exits
async fn capture(mut child: Child, nonce: &str, cap: usize) -> std::io::Result<Captured> {
    if let Some(mut stdin) = child.stdin.take() {
        // A child that exits without reading stdin closes the pipe first.
        if let Err(err) = stdin.write_all(format!("{nonce}\n").as_bytes()).await {
            tracing::debug!("sandbox stdin closed early: {}", err);
        }
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let ((stdout, out_cut), (stderr, err_cut), status) = tokio::try_join!(
        read_capped(stdout, cap),
        read_capped(stderr, cap),
        child.wait(),
    )?;

    Ok(Captured {
        status,
        stdout,
        stderr,
        truncated: out_cut || err_cut,
    })
}

/// Keep the first `cap` bytes and drain the rest so the child never blocks
async fn read_capped<R>(reader: Option<R>, cap: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };
    let mut kept = Vec::new();
    (&mut reader)
        .take(u64::try_from(cap).unwrap_or(u64::MAX))
        .read_to_end(&mut kept)
        .await?;
    let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok((kept, discarded > 0))
}

/// Last stdout line carrying `nonce`, parsed as the harness report
fn find_report(stdout: &[u8], nonce: &str) -> Option<HarnessReport> {
    String::from_utf8_lossy(stdout).lines().rev().find_map(|line| {
        let payload = line.strip_prefix(nonce)?.strip_prefix(' ')?;
        serde_json::from_str::<HarnessReport>(payload.trim()).ok()
    })
}

fn interpret(output: &Captured, nonce: &str, probe: &SandboxProbe) -> SandboxOutcome {
    if output.truncated {
        tracing::warn!("sandbox output exceeded the capture limit and was truncated");
    }

    match find_report(&output.stdout, nonce) {
        Some(report) if output.status.success() || !report.ok => report.evaluate(probe),
        _ => {
            let status = output
                .status
                .code()
                .map_or_else(|| "a signal".to_string(), |code| format!("code {code}"));
            let truncated = if output.truncated {
                " (output truncated)"
            } else {
                ""
            };
            SandboxOutcome::RuntimeError {
                message: format!(
                    "sandbox exited with {status} without a report{truncated}: {}",
                    stderr_tail(&output.stderr)
                ),
            }
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
