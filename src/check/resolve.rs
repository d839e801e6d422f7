//! Check reference resolution and integrity pinning

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Sha256Pin;

const FILE_PREFIX: &str = "file://";
const HTTPS_PREFIX: &str = "https://";

/// Scheme a check reference resolved through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckScheme {
    File,
}

impl CheckScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckScheme::File => "file",
        }
    }
}

/// A check reference resolved to an executable on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCheck {
    /// Reference as written in the alert
    pub uri: String,
    /// Executable path
    pub path: PathBuf,
    pub scheme: CheckScheme,
}

/// Resolve a check reference to an executable path.
///
/// - `file://name` joins `name` onto `checks_dir`
/// - `file:///abs/path` is used as-is
/// - `https://...` is reserved and not implemented
pub fn resolve(uri: &str, checks_dir: &Path) -> Result<ResolvedCheck, ResolveError> {
    if let Some(raw) = uri.strip_prefix(FILE_PREFIX) {
        resolve_file(uri, raw, checks_dir)
    } else if uri.starts_with(HTTPS_PREFIX) {
        Err(ResolveError::NotImplemented("https".to_string()))
    } else {
        Err(ResolveError::UnsupportedScheme(uri.to_string()))
    }
}

fn resolve_file(uri: &str, raw: &str, checks_dir: &Path) -> Result<ResolvedCheck, ResolveError> {
    let path = if raw.starts_with('/') {
        PathBuf::from(raw)
    } else {
        checks_dir.join(raw)
    };

    let meta = fs::metadata(&path).map_err(|_| ResolveError::NotFound(path.clone()))?;
    if meta.is_dir() {
        return Err(ResolveError::IsDirectory(path));
    }
    if !is_executable(&meta) {
        return Err(ResolveError::NotExecutable(path));
    }

    Ok(ResolvedCheck {
        uri: uri.to_string(),
        path,
        scheme: CheckScheme::File,
    })
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    true
}

/// Hex-encoded SHA-256 of a file
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Verify a resolved check against its pin. Unset and disabled pins pass.
pub fn verify_pin(check: &ResolvedCheck, pin: &Sha256Pin) -> Result<(), ResolveError> {
    let expected = match pin {
        Sha256Pin::Pinned(hash) => hash,
        Sha256Pin::Unset | Sha256Pin::Disabled => return Ok(()),
    };

    let actual = file_sha256(&check.path).map_err(|source| ResolveError::Read {
        path: check.path.clone(),
        source,
    })?;

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ResolveError::HashMismatch {
            path: check.path.clone(),
            expected: expected.clone(),
            actual,
        })
    }
}

/// Check resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{0}:// checks are not yet implemented")]
    NotImplemented(String),

    #[error("unsupported check URI scheme: {0}")]
    UnsupportedScheme(String),

    #[error("check not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("check is a directory: {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("check is not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    #[error("reading check {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("check {} sha256 mismatch: expected {expected}, got {actual}", path.display())]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}
