//! Error types for the render sandbox

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for sandbox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while assembling, serving or rendering a generator
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (aspect ratio, entry path, file set key)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Library id outside the supported set
    #[error("Unsupported library: {0}")]
    UnsupportedLibrary(String),

    /// A supported library whose payload is missing from the bundle
    #[error("Library {library} is not available at {}", path.display())]
    LibraryUnavailable { library: String, path: PathBuf },

    /// The ephemeral file server never reached a listening state
    #[error("File server failed to bind: {0}")]
    BindError(String),

    /// The sandbox process failed to launch or exited non-zero
    #[error("Sandbox process failed (exit code {}): {stderr}", exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".into()))]
    SandboxExecution {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The sandbox process was killed after exceeding its time budget
    #[error("Sandbox process timed out after {0}ms")]
    Timeout(u64),

    /// The sandbox succeeded but its DOM dump had no body element
    #[error("Malformed sandbox output: {0}")]
    MalformedOutput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn launch_failure(binary: &std::path::Path, err: std::io::Error) -> Self {
        Error::SandboxExecution {
            exit_code: None,
            stderr: format!("failed to launch {}: {}", binary.display(), err),
        }
    }
}
