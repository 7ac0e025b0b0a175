use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::{RestoreIoError, SelectionWarning};

/// One file reached by the selection walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionEntry {
    /// Forward-slash path relative to the project root.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size: u64,
    pub included: bool,
}

/// Result of a selection pass. Recomputed every time, never persisted.
#[derive(Debug, Default)]
pub struct Selection {
    pub root: PathBuf,
    /// Every file reached, in lexicographic order of `rel_path`.
    pub entries: Vec<SelectionEntry>,
    /// Directories cut by a rule; nothing below them was visited.
    pub pruned_dirs: Vec<String>,
    pub warnings: Vec<SelectionWarning>,
}

impl Selection {
    pub fn included(&self) -> impl Iterator<Item = &SelectionEntry> {
        self.entries.iter().filter(|e| e.included)
    }

    pub fn excluded(&self) -> impl Iterator<Item = &SelectionEntry> {
        self.entries.iter().filter(|e| !e.included)
    }

    pub fn included_count(&self) -> usize {
        self.included().count()
    }

    /// Total bytes of the included files.
    pub fn total_size(&self) -> u64 {
        self.included().map(|e| e.size).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub size: u64,
}

/// A finished archive on disk.
#[derive(Debug, Clone)]
pub struct Archive {
    pub path: PathBuf,
    /// Entries in the order they were written.
    pub entries: Vec<ArchiveEntry>,
    pub compressed_size: u64,
    /// Hex SHA-256 of the archive file.
    pub sha256: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Target did not exist.
    WriteDirect,
    /// Target existed; written as `name (n).ext`.
    Renamed(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub entry: String,
    pub target: PathBuf,
    pub is_dir: bool,
    pub resolution: ConflictResolution,
}

/// Where each archive entry would land if restored now.
#[derive(Debug, Default)]
pub struct RestorePlan {
    pub target_root: PathBuf,
    pub entries: Vec<PlannedEntry>,
    /// Entries whose names would escape the target.
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredEntry {
    pub entry: String,
    pub target: PathBuf,
    pub resolution: ConflictResolution,
}

/// Outcome of a restore. Partial restores are reported, not hidden.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: Vec<RestoredEntry>,
    pub directories: usize,
    pub failures: Vec<RestoreIoError>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn renamed(&self) -> impl Iterator<Item = &RestoredEntry> {
        self.restored
            .iter()
            .filter(|r| matches!(r.resolution, ConflictResolution::Renamed(_)))
    }
}

/// An object listed by a remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// One row of an interactive "choose one" list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub label: String,
    pub value: String,
}
