//! Script libraries that may be injected ahead of a generator script.
//!
//! The set of libraries is closed: a generator names one by id and anything
//! outside [`Library::ALL`] is rejected before any content is assembled.
//! Payload bytes are supplied by a [`LibraryBundle`], usually loaded once
//! from a directory of vendored builds and shared across renders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;

use crate::{Error, Result};

/// Id meaning "no library"; the generator runs on plain DOM APIs.
pub const NO_LIBRARY: &str = "none";

/// A supported rendering library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Library {
    P5,
    Three,
    Tone,
}

impl Library {
    pub const ALL: [Library; 3] = [Library::P5, Library::Three, Library::Tone];

    /// Versioned id as it appears in generator metadata
    pub fn id(&self) -> &'static str {
        match self {
            Library::P5 => "p5@1.0.0",
            Library::Three => "three@0.124.0",
            Library::Tone => "tone@14.8.15",
        }
    }

    /// File name inside a bundle directory, also used as the served path
    pub fn file_name(&self) -> &'static str {
        match self {
            Library::P5 => "p5.min.js",
            Library::Three => "three.min.js",
            Library::Tone => "tone.min.js",
        }
    }

    /// Absolute URL path at which the library is served to the sandbox
    pub fn served_path(&self) -> String {
        format!("/{}", self.file_name())
    }

    /// Parse a generator's library id. `none` (or an empty id) means no
    /// library; any other unknown id is an [`Error::UnsupportedLibrary`].
    pub fn parse_optional(id: &str) -> Result<Option<Library>> {
        let id = id.trim();
        if id.is_empty() || id == NO_LIBRARY {
            return Ok(None);
        }
        id.parse().map(Some)
    }
}

impl FromStr for Library {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Library::ALL
            .into_iter()
            .find(|lib| lib.id() == s)
            .ok_or_else(|| Error::UnsupportedLibrary(s.to_string()))
    }
}

impl std::fmt::Display for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Payload bytes for the supported libraries.
///
/// A bundle may be partial; asking for a library it does not hold yields
/// [`Error::LibraryUnavailable`].
#[derive(Debug, Clone, Default)]
pub struct LibraryBundle {
    root: Option<PathBuf>,
    payloads: HashMap<Library, Vec<u8>>,
}

impl LibraryBundle {
    /// An empty bundle, suitable for generators that use no library
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every library whose file is present in `dir`
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut payloads = HashMap::new();
        for lib in Library::ALL {
            let path = dir.join(lib.file_name());
            if path.is_file() {
                let bytes = std::fs::read(&path)?;
                debug!("loaded {} ({} bytes) from {}", lib, bytes.len(), path.display());
                payloads.insert(lib, bytes);
            }
        }
        Ok(Self {
            root: Some(dir.to_path_buf()),
            payloads,
        })
    }

    /// Add or replace a payload
    pub fn with(mut self, lib: Library, bytes: impl Into<Vec<u8>>) -> Self {
        self.payloads.insert(lib, bytes.into());
        self
    }

    pub fn contains(&self, lib: Library) -> bool {
        self.payloads.contains_key(&lib)
    }

    /// Resolve a library to its payload bytes
    pub fn resolve(&self, lib: Library) -> Result<&[u8]> {
        self.payloads
            .get(&lib)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::LibraryUnavailable {
                library: lib.id().to_string(),
                path: self
                    .root
                    .as_ref()
                    .map(|r| r.join(lib.file_name()))
                    .unwrap_or_else(|| PathBuf::from(lib.file_name())),
            })
    }
}
