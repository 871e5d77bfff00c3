//! Bounded subprocess execution for platform automation tools
//!
//! Every OS-tool invocation in the engine goes through [`run_tool`]: a
//! mandatory timeout, a typed failure, and no raw exit code or stderr leaking
//! past this boundary.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Default timeout when the caller does not override it
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// A single external tool invocation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Normalized failure of an external tool
#[derive(Debug, Error)]
pub enum ToolFailure {
    /// Binary not found or not executable
    #[error("tool unavailable: {0}")]
    Unavailable(String),

    /// Tool did not complete within the bounded wait
    #[error("tool timed out after {0:?}")]
    Timeout(Duration),

    /// Tool ran but exited unsuccessfully
    #[error("tool failed (status {status:?}): {stderr}")]
    Failed {
        status: Option<i32>,
        stderr: String,
    },
}

/// Run a tool to completion, returning its stdout as UTF-8 (lossy).
///
/// The child is killed on timeout via `kill_on_drop`.
pub async fn run_tool(cmd: &ToolCommand) -> Result<String, ToolFailure> {
    let mut child = Command::new(&cmd.program);
    child
        .args(&cmd.args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match timeout(cmd.timeout, child.output()).await {
        Ok(result) => result.map_err(|e| categorize_io_error(&cmd.program, &e))?,
        Err(_) => return Err(ToolFailure::Timeout(cmd.timeout)),
    };

    if !output.status.success() {
        return Err(ToolFailure::Failed {
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn categorize_io_error(program: &str, e: &std::io::Error) -> ToolFailure {
    match e.kind() {
        std::io::ErrorKind::NotFound => ToolFailure::Unavailable(program.to_string()),
        std::io::ErrorKind::PermissionDenied => ToolFailure::Failed {
            status: None,
            stderr: format!("{program}: permission denied"),
        },
        _ => ToolFailure::Failed {
            status: None,
            stderr: e.to_string(),
        },
    }
}

/// Seam for components that need their tool invocations swapped out in tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &ToolCommand) -> Result<String, ToolFailure>;
}

/// Production runner backed by [`run_tool`]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, cmd: &ToolCommand) -> Result<String, ToolFailure> {
        run_tool(cmd).await
    }
}
