//! gensandbox
//!
//! Renders untrusted generative-art programs inside a headless browser and
//! captures a deterministic artifact: either the text of the rendered body
//! (eval mode) or a PNG screenshot (screenshot mode).
//!
//! # Pipeline
//!
//! - [`assemble`] builds an in-memory [`VirtualFileSet`] from a
//!   [`GeneratorSpec`] and its [`TokenData`]
//! - [`server::FileServer`] serves that set on an OS-assigned loopback port
//! - [`runner`] launches the browser with a throwaway profile, pointed at
//!   the server only
//! - [`orchestrator`] ties the three together per call and always stops the
//!   server before returning
//!
//! # Example
//!
//! ```no_run
//! use gensandbox::{GeneratorSpec, LibraryBundle, RenderOptions, TokenData};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = GeneratorSpec::new(
//!     "document.body.innerText = JSON.stringify({ hash: tokenData.hash });",
//!     "none",
//!     1.0,
//! );
//! let token = TokenData(serde_json::json!({ "hash": "0xabc" }));
//! let opts = RenderOptions { binary_path: "chromium".into(), ..Default::default() };
//!
//! let features = gensandbox::render_features(&spec, &token, &LibraryBundle::new(), &opts)?;
//! println!("{}", features);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod assemble;
pub mod library;
pub mod orchestrator;
pub mod render;
pub mod runner;
pub mod server;
pub mod window;

// Async-friendly facade over the blocking calls
pub mod async_api;

pub use assemble::{assemble, GeneratorSpec, TokenData, VirtualFileSet, ENTRY_PATH, SCRIPT_PATH};
pub use library::{Library, LibraryBundle};
pub use orchestrator::{eval_untrusted_html, extract_body_text, screenshot_untrusted_html};
pub use render::{render_features, render_image};
pub use window::{compute_window_size, WindowSize, DEFAULT_LONG_EDGE, DEFAULT_WINDOW_SIZE};

/// Browser binary used when none is configured
pub const DEFAULT_BINARY: &str = "chromium";

/// Options for a single sandbox call
///
/// Passed explicitly to every call; nothing here is read from the
/// environment. The browser binary is the only shared input across calls.
///
/// # Examples
///
/// ```
/// let opts = gensandbox::RenderOptions::default();
/// assert_eq!(opts.entry_path, "/index.html");
/// assert!(opts.timeout.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Path of the document the browser loads first
    pub entry_path: String,
    /// Browser executable (a name on `PATH` or a full path)
    pub binary_path: PathBuf,
    /// Window size for screenshot mode
    pub window_size: WindowSize,
    /// Kill the browser if it runs longer than this
    pub timeout: Option<Duration>,
    /// Extra flags for the browser, placed before the target URL
    pub extra_args: Vec<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            entry_path: ENTRY_PATH.to_string(),
            binary_path: PathBuf::from(DEFAULT_BINARY),
            window_size: DEFAULT_WINDOW_SIZE,
            timeout: None,
            extra_args: Vec::new(),
        }
    }
}

impl RenderOptions {
    pub fn with_window_size(mut self, window_size: WindowSize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reject options that can never produce a valid run
    pub fn validate(&self) -> Result<()> {
        if !self.entry_path.starts_with('/') {
            return Err(Error::InvalidArgument(format!(
                "entry path must start with '/': {:?}",
                self.entry_path
            )));
        }
        if self.binary_path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("browser binary path is empty".into()));
        }
        if self.window_size.width == 0 || self.window_size.height == 0 {
            return Err(Error::InvalidArgument(format!(
                "window size must be positive, got {}",
                self.window_size
            )));
        }
        Ok(())
    }
}
