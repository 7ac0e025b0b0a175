use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::archive::{self, ArchiveOptions};
use crate::error::{Error, PackagingError, Result};
use crate::models::{Candidate, RemoteObject, RestoreReport, Selection};
use crate::restore;
use crate::rules::{RuleSet, IGNORE_FILE};
use crate::select::select;
use crate::store::{archive_name, RemoteStore};
use crate::templates::{self, CodeTool};

pub type ProgressTx = mpsc::Sender<(f32, String)>;

pub const DATE_PATTERN: &str = "%Y-%m-%d %H:%M";

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Compile the project's ignore file. No file means no rules.
pub fn load_rules(root: &Path) -> Result<RuleSet> {
    let path = root.join(IGNORE_FILE);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(RuleSet::compile(&text)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("No {IGNORE_FILE} file found. All files will be selected.");
            Ok(RuleSet::empty())
        }
        Err(source) => Err(Error::IgnoreFile { path, source }),
    }
}

// -----------------------------------------------------------------------------
// Local workflows
// -----------------------------------------------------------------------------

/// Create the ignore file from a template. Returns false if one existed.
pub fn init(root: &Path, tool: CodeTool) -> Result<bool> {
    templates::init_ignore_file(root, tool).map_err(|source| Error::IgnoreFile {
        path: root.join(IGNORE_FILE),
        source,
    })
}

/// Dry run: what a save would include right now.
pub fn status(root: &Path) -> Result<Selection> {
    let rules = load_rules(root)?;
    Ok(select(root, &rules)?)
}

/// Restore a local archive file into `target_root`.
pub fn restore_local(archive: &Path, target_root: &Path, tx: ProgressTx) -> Result<RestoreReport> {
    tx.send((0.0, format!("Extracting {}...", archive.display())))
        .ok();

    let report = restore::restore_with_progress(archive, target_root, |done, total, entry| {
        let pct = done as f32 / total.max(1) as f32 * 100.0;
        tx.send((pct, format!("Restoring {done}/{total} ({entry})")))
            .ok();
    })?;

    let renamed = report.renamed().count();
    let msg = if report.is_complete() {
        format!("Restored {} files ({renamed} renamed).", report.restored.len())
    } else {
        format!(
            "Restored {} files ({renamed} renamed), {} failed.",
            report.restored.len(),
            report.failures.len()
        )
    };
    tx.send((100.0, msg)).ok();
    Ok(report)
}

// -----------------------------------------------------------------------------
// Store workflows
// -----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SaveSummary {
    pub object: String,
    pub files: usize,
    pub original_bytes: u64,
    pub archive_bytes: u64,
    pub sha256: String,
    pub warnings: usize,
}

/// Select, package and upload the project at `root` as `<state>.zip`.
pub fn save(
    root: &Path,
    state: &str,
    store: &dyn RemoteStore,
    options: &ArchiveOptions,
    tx: ProgressTx,
) -> Result<SaveSummary> {
    let object = archive_name(state)?;

    tx.send((0.0, "Selecting files...".into())).ok();
    let selection = status(root)?;

    tx.send((
        30.0,
        format!("Compressing {} files...", selection.included_count()),
    ))
    .ok();
    let scratch = tempfile::tempdir().map_err(Error::Scratch)?;
    let archive = archive::build(&selection, &scratch.path().join(&object), options)?;

    tx.send((70.0, format!("Uploading {object}..."))).ok();
    let mut file = File::open(&archive.path).map_err(|source| PackagingError::Read {
        path: archive.path.clone(),
        source,
    })?;
    store.put(&object, &mut file)?;

    let summary = SaveSummary {
        object,
        files: archive.entries.len(),
        original_bytes: selection.total_size(),
        archive_bytes: archive.compressed_size,
        sha256: archive.sha256,
        warnings: selection.warnings.len(),
    };
    info!(object = %summary.object, files = summary.files, "state saved");
    tx.send((100.0, format!("Saved: {}", summary.object))).ok();
    Ok(summary)
}

pub fn list(store: &dyn RemoteStore) -> Result<Vec<RemoteObject>> {
    Ok(store.list()?)
}

/// Fetch `name` from the store and restore it into `target_root`.
pub fn download(
    store: &dyn RemoteStore,
    name: &str,
    target_root: &Path,
    tx: ProgressTx,
) -> Result<RestoreReport> {
    tx.send((0.0, format!("Downloading {name}..."))).ok();

    let scratch = tempfile::tempdir().map_err(Error::Scratch)?;
    let local = scratch.path().join("download.zip");
    let mut file = File::create(&local).map_err(Error::Scratch)?;
    store.get(name, &mut file)?;
    file.sync_all().map_err(Error::Scratch)?;
    drop(file);

    restore_local(&local, target_root, tx)
}

pub fn delete(store: &dyn RemoteStore, name: &str) -> Result<()> {
    Ok(store.delete(name)?)
}

#[derive(Debug, Clone)]
pub struct ShareLink {
    pub object: String,
    pub url: String,
    pub expires_at: DateTime<Local>,
}

pub fn share(store: &dyn RemoteStore, name: &str, hours: u64) -> Result<ShareLink> {
    let url = store.presign(name, Duration::from_secs(hours * 3600))?;
    let expires_at = Local::now() + chrono::Duration::hours(hours as i64);
    Ok(ShareLink {
        object: name.to_string(),
        url,
        expires_at,
    })
}

/// Items for an external "choose one" step, in store order.
pub fn candidates(objects: &[RemoteObject]) -> Vec<Candidate> {
    objects
        .iter()
        .map(|obj| Candidate {
            label: format!(
                "{:<40} | Size: {:<10} | Last Modified: {}",
                obj.name,
                format_bytes(obj.size),
                obj.modified.with_timezone(&Local).format(DATE_PATTERN)
            ),
            value: obj.name.clone(),
        })
        .collect()
}
