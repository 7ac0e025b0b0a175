//! Error types for the selection and packaging engine.
//!
//! Each stage has its own error so callers can tell fatal failures
//! (`PackagingError`, `RestoreError`) from the ones that are collected and
//! reported after the fact (`SelectionWarning`, `RestoreIoError`).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for workstate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A rule in the ignore file could not be compiled.
#[derive(Debug, Error)]
#[error("malformed rule on line {line} (`{pattern}`): {reason}")]
pub struct RuleError {
    pub line: usize,
    pub pattern: String,
    pub reason: String,
}

/// Fatal selection failure: the walk could not start at all.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("project root {} is not a readable directory: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a path was skipped during the walk.
#[derive(Debug, Error)]
pub enum WarningCause {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Walk(#[from] walkdir::Error),

    #[error("symlink points outside the project ({})", target.display())]
    SymlinkEscapesRoot { target: PathBuf },

    #[error("symlink to a directory is not followed")]
    SymlinkToDirectory,

    #[error("path is not valid UTF-8")]
    NonUtf8Path,

    #[error("name cannot be restored portably")]
    UnportableName,
}

/// A non-fatal problem met while selecting files.
#[derive(Debug, Error)]
#[error("skipped {}: {cause}", path.display())]
pub struct SelectionWarning {
    pub path: PathBuf,
    #[source]
    pub cause: WarningCause,
}

/// Fatal packaging failure. No archive is produced when this is returned.
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write archive {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("zip error on entry `{entry}`: {source}")]
    Zip {
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Fatal restore failure: the archive itself is unusable.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("failed to open archive {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a readable zip archive: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to prepare target directory {}: {source}", path.display())]
    Target {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Per-entry restore failure, collected while the remaining entries proceed.
#[derive(Debug, Error)]
#[error("failed to restore `{entry}`{}: {cause}", target.as_ref().map(|p| format!(" to {}", p.display())).unwrap_or_default())]
pub struct RestoreIoError {
    /// Entry name as stored in the archive.
    pub entry: String,
    /// Target path, when one could be computed.
    pub target: Option<PathBuf>,
    #[source]
    pub cause: RestoreCause,
}

#[derive(Debug, Error)]
pub enum RestoreCause {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("entry name escapes the target directory")]
    UnsafeName,
}

/// Remote store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object name: {0}")]
    InvalidName(String),

    #[error("{operation} is not supported by this store")]
    Unsupported { operation: &'static str },

    #[error("store I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Configuration loading and saving failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no home directory available for the config file")]
    NoHome,

    #[error("config I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level error for workflows that chain several stages.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read ignore file {}: {source}", path.display())]
    IgnoreFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("scratch directory error: {0}")]
    Scratch(#[source] io::Error),
}
