//! File selection: walk the project tree and apply a [`RuleSet`].
//!
//! The walk never mutates the tree. Directories excluded by a rule are cut
//! from the walk entirely, so later negations cannot re-include anything
//! below them. Per-path failures become [`SelectionWarning`]s; only an
//! unusable root is fatal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{SelectError, SelectionWarning, WarningCause};
use crate::models::{Selection, SelectionEntry};
use crate::paths;
use crate::rules::RuleSet;

/// Walk `root` and classify every file against `rules`.
///
/// Entries come back sorted by relative path, so two runs over an unchanged
/// tree produce identical output.
pub fn select(root: &Path, rules: &RuleSet) -> Result<Selection, SelectError> {
    let root_err = |source| SelectError::Root {
        path: root.to_path_buf(),
        source,
    };
    let meta = fs::metadata(root).map_err(root_err)?;
    if !meta.is_dir() {
        return Err(root_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a directory",
        )));
    }
    let canonical_root = fs::canonicalize(root).map_err(root_err)?;

    let mut selection = Selection {
        root: root.to_path_buf(),
        ..Selection::default()
    };

    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(e) => e,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                push_warning(&mut selection, path, WarningCause::Walk(err));
                continue;
            }
        };

        let file_type = entry.file_type();
        let rel = match entry
            .path()
            .strip_prefix(root)
            .ok()
            .and_then(paths::to_portable)
        {
            Some(rel) => rel,
            None => {
                if file_type.is_dir() {
                    walker.skip_current_dir();
                }
                push_warning(&mut selection, entry.path().to_path_buf(), WarningCause::NonUtf8Path);
                continue;
            }
        };

        if paths::to_native(root, &rel).is_none() {
            if file_type.is_dir() {
                walker.skip_current_dir();
            }
            push_warning(&mut selection, entry.path().to_path_buf(), WarningCause::UnportableName);
            continue;
        }

        if file_type.is_dir() {
            if rules.is_excluded(&rel, true) {
                debug!(dir = %rel, "pruned directory");
                selection.pruned_dirs.push(rel);
                walker.skip_current_dir();
            }
            continue;
        }

        if !file_type.is_file() && !file_type.is_symlink() {
            debug!(path = %rel, "skipping special file");
            continue;
        }

        if rules.is_excluded(&rel, false) {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            selection.entries.push(SelectionEntry {
                rel_path: rel,
                abs_path: entry.path().to_path_buf(),
                size,
                included: false,
            });
            continue;
        }

        let resolved = if file_type.is_symlink() {
            resolve_symlink(entry.path(), &canonical_root)
        } else {
            entry
                .metadata()
                .map(|m| (entry.path().to_path_buf(), m.len()))
                .map_err(WarningCause::from)
        };

        match resolved {
            Ok((abs_path, size)) => selection.entries.push(SelectionEntry {
                rel_path: rel,
                abs_path,
                size,
                included: true,
            }),
            Err(cause) => push_warning(&mut selection, entry.path().to_path_buf(), cause),
        }
    }

    selection
        .entries
        .sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    selection.pruned_dirs.sort();

    info!(
        root = %root.display(),
        included = selection.included_count(),
        excluded = selection.entries.len() - selection.included_count(),
        pruned = selection.pruned_dirs.len(),
        warnings = selection.warnings.len(),
        "selection complete"
    );
    Ok(selection)
}

/// A symlink is kept only when it resolves to a regular file inside the root.
fn resolve_symlink(link: &Path, canonical_root: &Path) -> Result<(PathBuf, u64), WarningCause> {
    let target = fs::canonicalize(link)?;
    if !target.starts_with(canonical_root) {
        return Err(WarningCause::SymlinkEscapesRoot { target });
    }
    let meta = fs::metadata(&target)?;
    if meta.is_dir() {
        return Err(WarningCause::SymlinkToDirectory);
    }
    Ok((target, meta.len()))
}

fn push_warning(selection: &mut Selection, path: PathBuf, cause: WarningCause) {
    let warning = SelectionWarning { path, cause };
    warn!("{warning}");
    selection.warnings.push(warning);
}
