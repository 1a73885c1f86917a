//! Error kinds raised while provisioning and supervising the FRP binary

use crate::drainer::StreamTag;
use crate::mode::Mode;
use serde::Serialize;
use std::path::PathBuf;

/// Error codes for supervisor failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Extracted binary (or its bundled asset) is missing
    BinaryMissing,
    /// Configuration file is missing
    ConfigMissing,
    /// Binary exists but cannot be executed
    BinaryNotExecutable,
    /// The host refused to create the process
    ExecFailed,
    /// Child exited inside the early-exit window
    EarlyExit,
    /// Child exited after it was reported as started
    UnexpectedExit,
    /// Reading a child output stream failed
    StreamReadError,
    /// Filesystem failure while provisioning
    Io,
}

impl ErrorKind {
    /// Get the error code as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BinaryMissing => "BINARY_MISSING",
            ErrorKind::ConfigMissing => "CONFIG_MISSING",
            ErrorKind::BinaryNotExecutable => "BINARY_NOT_EXECUTABLE",
            ErrorKind::ExecFailed => "EXEC_FAILED",
            ErrorKind::EarlyExit => "EARLY_EXIT",
            ErrorKind::UnexpectedExit => "UNEXPECTED_EXIT",
            ErrorKind::StreamReadError => "STREAM_READ_ERROR",
            ErrorKind::Io => "IO",
        }
    }

    /// Whether the supervisor retries on its own after this failure
    pub fn is_retried(&self) -> bool {
        matches!(self, ErrorKind::UnexpectedExit)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("FRP binary does not exist: {}", path.display())]
    BinaryMissing { path: PathBuf },

    #[error("Config file does not exist: {}", path.display())]
    ConfigMissing { path: PathBuf },

    #[error("FRP binary is not executable: {}", path.display())]
    BinaryNotExecutable { path: PathBuf },

    #[error("failed to execute {}: {source}", path.display())]
    ExecFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{mode} exited immediately with code: {code}")]
    EarlyExit { mode: Mode, code: i32 },

    #[error("FRP process exited with code: {code}")]
    UnexpectedExit { code: i32 },

    #[error("error reading {stream} log: {source}")]
    StreamRead {
        stream: StreamTag,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SupervisorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SupervisorError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::BinaryMissing { .. } => ErrorKind::BinaryMissing,
            SupervisorError::ConfigMissing { .. } => ErrorKind::ConfigMissing,
            SupervisorError::BinaryNotExecutable { .. } => ErrorKind::BinaryNotExecutable,
            SupervisorError::ExecFailed { .. } => ErrorKind::ExecFailed,
            SupervisorError::EarlyExit { .. } => ErrorKind::EarlyExit,
            SupervisorError::UnexpectedExit { .. } => ErrorKind::UnexpectedExit,
            SupervisorError::StreamRead { .. } => ErrorKind::StreamReadError,
            SupervisorError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Render the entry pushed to the log buffer for this failure
    pub fn log_line(&self) -> String {
        if self.kind().is_retried() {
            format!("Warning: {}", self)
        } else {
            format!("Error: {}", self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_lines() {
        let err = SupervisorError::EarlyExit {
            mode: Mode::Client,
            code: 1,
        };
        assert_eq!(err.log_line(), "Error: client exited immediately with code: 1");

        let err = SupervisorError::UnexpectedExit { code: 7 };
        assert_eq!(err.log_line(), "Warning: FRP process exited with code: 7");

        let err = SupervisorError::BinaryMissing {
            path: PathBuf::from("/data/client"),
        };
        assert_eq!(err.log_line(), "Error: FRP binary does not exist: /data/client");
    }

    #[test]
    fn test_error_kinds() {
        let err = SupervisorError::ConfigMissing {
            path: PathBuf::from("/data/server.toml"),
        };
        assert_eq!(err.kind(), ErrorKind::ConfigMissing);
        assert_eq!(err.kind().as_str(), "CONFIG_MISSING");
        assert!(!err.kind().is_retried());
        assert!(ErrorKind::UnexpectedExit.is_retried());
    }

    #[test]
    fn test_stream_read_error_message() {
        let err = SupervisorError::StreamRead {
            stream: StreamTag::Err,
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "bad utf-8"),
        };
        assert_eq!(err.log_line(), "Error: error reading ERR log: bad utf-8");
        assert_eq!(err.kind(), ErrorKind::StreamReadError);
    }
}
