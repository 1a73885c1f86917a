//! Spawning of the supervised child.
//!
//! The host is deliberately thin: it starts a process from an argument
//! vector and exposes its output streams, a non-blocking exit status query and a
//! kill request. Restart and logging policy live in the supervisor.

use crate::error::SupervisorError;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// A readable child output stream
pub type StreamSource = Box<dyn AsyncRead + Send + Unpin>;

/// Result of a non-blocking exit status query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Running,
    Exited(i32),
}

impl fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildStatus::Running => write!(f, "running"),
            ChildStatus::Exited(code) => write!(f, "exited({})", code),
        }
    }
}

/// Status and termination of one spawned child
pub trait ProcessHandle: Send {
    /// Operating-system process id, if known
    fn id(&self) -> Option<u32>;

    /// Query the exit status without blocking
    fn try_status(&mut self) -> ChildStatus;

    /// Best-effort kill request
    fn terminate(&mut self);
}

/// A freshly spawned child with its two output streams
pub struct SpawnedChild {
    pub handle: Box<dyn ProcessHandle>,
    pub stdout: StreamSource,
    pub stderr: StreamSource,
}

/// Creates child processes
pub trait ProcessHost: Send + Sync {
    /// Start `program` with `args` (no shell interpolation)
    fn spawn(&self, program: &Path, args: &[String]) -> Result<SpawnedChild, SupervisorError>;
}

/// Process host backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessHost;

impl TokioProcessHost {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessHost for TokioProcessHost {
    fn spawn(&self, program: &Path, args: &[String]) -> Result<SpawnedChild, SupervisorError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| SupervisorError::ExecFailed {
            path: program.to_path_buf(),
            source: e,
        })?;
        let pid = child.id();
        info!(program = %program.display(), pid, "Child process spawned");

        let missing_pipe = |name: &str| SupervisorError::ExecFailed {
            path: program.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("child {} was not captured", name),
            ),
        };
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        Ok(SpawnedChild {
            handle: Box::new(LocalChild { child, pid }),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }
}

/// Handle for a process spawned by [`TokioProcessHost`]
struct LocalChild {
    child: Child,
    pid: Option<u32>,
}

impl ProcessHandle for LocalChild {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn try_status(&mut self) -> ChildStatus {
        match self.child.try_wait() {
            Ok(Some(status)) => ChildStatus::Exited(exit_code(status)),
            Ok(None) => ChildStatus::Running,
            Err(e) => {
                warn!(pid = self.pid, error = %e, "Failed to query child status");
                ChildStatus::Running
            }
        }
    }

    fn terminate(&mut self) {
        debug!(pid = self.pid, "Killing child process");
        if let Err(e) = self.child.start_kill() {
            // Already reaped children report InvalidInput
            debug!(pid = self.pid, error = %e, "Kill request not delivered");
        }
    }
}

/// Exit code, with signal deaths reported shell-style as `128 + signal`
fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
