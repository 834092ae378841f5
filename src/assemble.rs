//! Virtual file assembly for a single generator render.
//!
//! [`assemble`] turns a [`GeneratorSpec`] plus its [`TokenData`] into a
//! [`VirtualFileSet`]: an entry document, the untrusted script as its own
//! resource and, when requested, a library payload. Nothing here touches the
//! filesystem or the network.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::library::{Library, LibraryBundle};
use crate::{Error, Result};

/// Path of the generated entry document
pub const ENTRY_PATH: &str = "/index.html";

/// Path under which the untrusted generator script is served
pub const SCRIPT_PATH: &str = "/main.js";

/// Makes the canvas (or whatever the script appends) fill and center in the
/// viewport for any window size.
const STYLESHEET: &str = "html,body{margin:0;padding:0;width:100%;height:100%;overflow:hidden;background:#000}\
body{display:flex;align-items:center;justify-content:center}\
canvas,svg{display:block;max-width:100%;max-height:100%;object-fit:contain}";

/// In-memory mapping from absolute URL path to file content.
///
/// Keys always start with `/`. Iteration order is sorted by path, which keeps
/// [`VirtualFileSet::digest`] stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualFileSet {
    files: BTreeMap<String, Vec<u8>>,
}

impl VirtualFileSet {
    /// Build a file set from `(path, content)` pairs. Fails on a relative
    /// path or a duplicate key.
    pub fn from_entries<I, P, C>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        let mut files = BTreeMap::new();
        for (path, content) in entries {
            let path = path.into();
            if !path.starts_with('/') {
                return Err(Error::InvalidArgument(format!(
                    "file set path must be absolute: {:?}",
                    path
                )));
            }
            if files.insert(path.clone(), content.into()).is_some() {
                return Err(Error::InvalidArgument(format!(
                    "duplicate file set path: {:?}",
                    path
                )));
            }
        }
        Ok(Self { files })
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total payload size in bytes
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Hex SHA-256 over every `(path, content)` pair in path order
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, content) in &self.files {
            hasher.update((path.len() as u64).to_be_bytes());
            hasher.update(path.as_bytes());
            hasher.update((content.len() as u64).to_be_bytes());
            hasher.update(content);
        }
        hex::encode(hasher.finalize())
    }
}

/// One untrusted generator program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorSpec {
    /// Script source, served verbatim as [`SCRIPT_PATH`]
    pub script: String,
    /// Library id such as `p5@1.0.0`, or `none`
    #[serde(default = "default_library")]
    pub library: String,
    /// Width divided by height
    pub aspect_ratio: f64,
}

fn default_library() -> String {
    crate::library::NO_LIBRARY.to_string()
}

impl GeneratorSpec {
    pub fn new(script: impl Into<String>, library: impl Into<String>, aspect_ratio: f64) -> Self {
        Self {
            script: script.into(),
            library: library.into(),
            aspect_ratio,
        }
    }

    /// Read a generator record. `aspectRatio` may be a JSON number or a
    /// numeric string; anything else is an [`Error::InvalidArgument`].
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::InvalidArgument("generator spec must be a JSON object".into()))?;

        let script = obj
            .get("script")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidArgument("generator spec is missing `script`".into()))?;

        let library = match obj.get("library") {
            None | Some(serde_json::Value::Null) => default_library(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(Error::InvalidArgument(format!(
                    "`library` must be a string, got {}",
                    other
                )))
            }
        };

        let aspect_ratio = match obj.get("aspectRatio") {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            Error::InvalidArgument("`aspectRatio` must be present and numeric".into())
        })?;

        let spec = Self::new(script, library, aspect_ratio);
        spec.validate()?;
        Ok(spec)
    }

    /// Check the aspect ratio and library id without building anything
    pub fn validate(&self) -> Result<Option<Library>> {
        if !self.aspect_ratio.is_finite() || self.aspect_ratio <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "aspect ratio must be a finite positive number, got {}",
                self.aspect_ratio
            )));
        }
        Library::parse_optional(&self.library)
    }
}

/// JSON value exposed to the generator as the global `tokenData`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenData(pub serde_json::Value);

impl TokenData {
    /// Serialize as a JS expression that is safe to place inside an inline
    /// `<script>` element.
    ///
    /// `<`, `>` and `&` only occur inside JSON strings, so rewriting them as
    /// `\uXXXX` escapes keeps the value identical while making `</script>`
    /// and `<!--` impossible. U+2028/U+2029 are escaped for pre-ES2019
    /// parsers.
    pub fn to_script_literal(&self) -> Result<String> {
        let json = serde_json::to_string(&self.0)?;
        let mut out = String::with_capacity(json.len());
        for ch in json.chars() {
            match ch {
                '<' => out.push_str("\\u003c"),
                '>' => out.push_str("\\u003e"),
                '&' => out.push_str("\\u0026"),
                '\u{2028}' => out.push_str("\\u2028"),
                '\u{2029}' => out.push_str("\\u2029"),
                c => out.push(c),
            }
        }
        Ok(out)
    }
}

impl From<serde_json::Value> for TokenData {
    fn from(value: serde_json::Value) -> Self {
        TokenData(value)
    }
}

/// Build the file set for one generator and token.
///
/// Fails with [`Error::UnsupportedLibrary`] for an unknown library id and
/// [`Error::InvalidArgument`] for a bad aspect ratio, in both cases before
/// any resource is acquired.
pub fn assemble(
    spec: &GeneratorSpec,
    token: &TokenData,
    bundle: &LibraryBundle,
) -> Result<VirtualFileSet> {
    let library = spec.validate()?;
    let token_literal = token.to_script_literal()?;

    let mut files: Vec<(String, Vec<u8>)> = Vec::with_capacity(3);

    let library_tag = match library {
        Some(lib) => {
            let payload = bundle.resolve(lib)?;
            let path = lib.served_path();
            let tag = format!("<script src=\"{}\"></script>\n", path);
            files.push((path, payload.to_vec()));
            tag
        }
        None => String::new(),
    };

    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n{library_tag}<script>window.tokenData = {token_literal};</script>\n</head>\n<body>\n<script src=\"{SCRIPT_PATH}\"></script>\n<style>{STYLESHEET}</style>\n</body>\n</html>\n",
    );

    files.push((ENTRY_PATH.to_string(), html.into_bytes()));
    files.push((SCRIPT_PATH.to_string(), spec.script.clone().into_bytes()));

    VirtualFileSet::from_entries(files)
}
