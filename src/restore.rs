//! Archive restorer.
//!
//! Extracts an archive into a target directory without ever touching files
//! that already exist there: a colliding file is written as `name (n).ext`
//! with the smallest free `n`. Directories merge. Failures on individual
//! entries are collected and the remaining entries still proceed.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::{RestoreCause, RestoreError, RestoreIoError};
use crate::models::{ConflictResolution, PlannedEntry, RestorePlan, RestoreReport, RestoredEntry};
use crate::paths;

/// `name (n).ext` sibling of `path`.
pub fn numbered_name(path: &Path, n: u32) -> PathBuf {
    let mut name = OsString::from(path.file_stem().unwrap_or_default());
    name.push(format!(" ({n})"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// First free name for `path` given an occupancy test.
fn resolve_name(path: &Path, taken: impl Fn(&Path) -> bool) -> (PathBuf, ConflictResolution) {
    if !taken(path) {
        return (path.to_path_buf(), ConflictResolution::WriteDirect);
    }
    let mut n = 1;
    loop {
        let candidate = numbered_name(path, n);
        if !taken(&candidate) {
            return (candidate, ConflictResolution::Renamed(n));
        }
        n += 1;
    }
}

fn occupied(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

fn open_archive(archive: &Path) -> Result<ZipArchive<File>, RestoreError> {
    let file = File::open(archive).map_err(|source| RestoreError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    ZipArchive::new(file).map_err(|source| RestoreError::Archive {
        path: archive.to_path_buf(),
        source,
    })
}

/// Compute where every entry of `archive` would be written under
/// `target_root`, without writing anything.
///
/// Names claimed by earlier entries count as taken, mirroring what a real
/// restore would observe.
pub fn plan_restore(archive: &Path, target_root: &Path) -> Result<RestorePlan, RestoreError> {
    let mut zip = open_archive(archive)?;
    let mut plan = RestorePlan {
        target_root: target_root.to_path_buf(),
        ..RestorePlan::default()
    };
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for i in 0..zip.len() {
        let file = zip.by_index(i).map_err(|source| RestoreError::Archive {
            path: archive.to_path_buf(),
            source,
        })?;
        let name = file.name().to_string();
        let target = match safe_target(&name, file.enclosed_name().is_some(), target_root) {
            Some(t) => t,
            None => {
                plan.rejected.push(name);
                continue;
            }
        };

        if file.is_dir() {
            plan.entries.push(PlannedEntry {
                entry: name,
                target,
                is_dir: true,
                resolution: ConflictResolution::WriteDirect,
            });
            continue;
        }

        let (target, resolution) = resolve_name(&target, |p| occupied(p) || claimed.contains(p));
        claimed.insert(target.clone());
        plan.entries.push(PlannedEntry {
            entry: name,
            target,
            is_dir: false,
            resolution,
        });
    }
    Ok(plan)
}

/// Restore `archive` into `target_root`.
pub fn restore(archive: &Path, target_root: &Path) -> Result<RestoreReport, RestoreError> {
    restore_with_progress(archive, target_root, |_, _, _| {})
}

/// Restore, calling `progress(done, total, entry)` after every entry.
///
/// # Errors
///
/// Only an unreadable archive or an uncreatable target root is fatal.
/// Everything else ends up in [`RestoreReport::failures`].
pub fn restore_with_progress<F>(
    archive: &Path,
    target_root: &Path,
    mut progress: F,
) -> Result<RestoreReport, RestoreError>
where
    F: FnMut(usize, usize, &str),
{
    let mut zip = open_archive(archive)?;
    fs::create_dir_all(target_root).map_err(|source| RestoreError::Target {
        path: target_root.to_path_buf(),
        source,
    })?;

    let total = zip.len();
    let mut report = RestoreReport::default();

    for i in 0..total {
        let name = match restore_entry(&mut zip, i, target_root, &mut report) {
            Ok(name) => name,
            Err(failure) => {
                warn!("{failure}");
                let name = failure.entry.clone();
                report.failures.push(failure);
                name
            }
        };
        progress(i + 1, total, &name);
    }

    info!(
        archive = %archive.display(),
        target = %target_root.display(),
        restored = report.restored.len(),
        renamed = report.renamed().count(),
        failed = report.failures.len(),
        "restore finished"
    );
    Ok(report)
}

fn restore_entry<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    index: usize,
    target_root: &Path,
    report: &mut RestoreReport,
) -> Result<String, RestoreIoError> {
    let mut file = zip.by_index(index).map_err(|e| RestoreIoError {
        entry: format!("#{index}"),
        target: None,
        cause: e.into(),
    })?;
    let name = file.name().to_string();

    let fail = |target: Option<&Path>, cause: RestoreCause| RestoreIoError {
        entry: name.clone(),
        target: target.map(Path::to_path_buf),
        cause,
    };

    let target = safe_target(&name, file.enclosed_name().is_some(), target_root)
        .ok_or_else(|| fail(None, RestoreCause::UnsafeName))?;

    if file.is_dir() {
        fs::create_dir_all(&target).map_err(|e| fail(Some(&target), e.into()))?;
        report.directories += 1;
        return Ok(name);
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| fail(Some(parent), e.into()))?;
    }

    let (mut out, written_to, resolution) =
        create_unique(&target).map_err(|e| fail(Some(&target), e.into()))?;

    if let Err(e) = io::copy(&mut file, &mut out) {
        drop(out);
        // Only the file this restore just created is removed.
        let _ = fs::remove_file(&written_to);
        return Err(fail(Some(&written_to), e.into()));
    }

    #[cfg(unix)]
    if let Some(mode) = file.unix_mode() {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(&written_to, fs::Permissions::from_mode(restored_mode(mode))) {
            warn!(path = %written_to.display(), "could not apply permissions: {e}");
        }
    }

    if let ConflictResolution::Renamed(n) = resolution {
        debug!(entry = %name, target = %written_to.display(), n, "name conflict, wrote renamed copy");
    }
    report.restored.push(RestoredEntry {
        entry: name.clone(),
        target: written_to,
        resolution,
    });
    Ok(name)
}

/// Permission bits applied to a restored file. Setuid, setgid and sticky
/// bits from the archive are dropped.
#[cfg(unix)]
fn restored_mode(mode: u32) -> u32 {
    mode & 0o777
}

/// Exclusively create `target` or the first free `name (n).ext` sibling.
fn create_unique(target: &Path) -> io::Result<(File, PathBuf, ConflictResolution)> {
    let mut n = 0;
    loop {
        let (candidate, resolution) = if n == 0 {
            (target.to_path_buf(), ConflictResolution::WriteDirect)
        } else {
            (numbered_name(target, n), ConflictResolution::Renamed(n))
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((file, candidate, resolution)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Target for an entry, or `None` if its name could escape `target_root`.
fn safe_target(name: &str, enclosed: bool, target_root: &Path) -> Option<PathBuf> {
    if !enclosed {
        return None;
    }
    paths::to_native(target_root, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn make_archive(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("in.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
        path
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name(Path::new("d/a.txt"), 1), Path::new("d/a (1).txt"));
        assert_eq!(numbered_name(Path::new("Makefile"), 2), Path::new("Makefile (2)"));
        assert_eq!(numbered_name(Path::new(".env"), 1), Path::new(".env (1)"));
        assert_eq!(
            numbered_name(Path::new("x.tar.gz"), 3),
            Path::new("x.tar (3).gz")
        );
    }

    #[test]
    fn test_restore_into_empty_dir() {
        let work = tempfile::tempdir().unwrap();
        let archive = make_archive(work.path(), &[("a.txt", "A"), ("dir/b.txt", "B")]);
        let target = work.path().join("out");

        let report = restore(&archive, &target).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.restored.len(), 2);
        assert_eq!(fs::read_to_string(target.join("a.txt")).unwrap(), "A");
        assert_eq!(fs::read_to_string(target.join("dir").join("b.txt")).unwrap(), "B");
        assert_eq!(report.renamed().count(), 0);
    }

    #[test]
    fn test_conflicts_never_overwrite() {
        let work = tempfile::tempdir().unwrap();
        let archive = make_archive(work.path(), &[("a.txt", "new")]);
        let target = work.path().join("out");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("a.txt"), "original").unwrap();

        let first = restore(&archive, &target).unwrap();
        assert_eq!(first.restored[0].resolution, ConflictResolution::Renamed(1));
        assert_eq!(fs::read_to_string(target.join("a.txt")).unwrap(), "original");
        assert_eq!(fs::read_to_string(target.join("a (1).txt")).unwrap(), "new");

        let second = restore(&archive, &target).unwrap();
        assert_eq!(second.restored[0].resolution, ConflictResolution::Renamed(2));
        assert_eq!(fs::read_to_string(target.join("a.txt")).unwrap(), "original");
        assert_eq!(fs::read_to_string(target.join("a (1).txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(target.join("a (2).txt")).unwrap(), "new");
    }

    #[test]
    fn test_smallest_free_number_is_used() {
        let work = tempfile::tempdir().unwrap();
        let archive = make_archive(work.path(), &[("a.txt", "new")]);
        let target = work.path().join("out");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("a.txt"), "0").unwrap();
        fs::write(target.join("a (2).txt"), "2").unwrap();

        let report = restore(&archive, &target).unwrap();
        assert_eq!(report.restored[0].target, target.join("a (1).txt"));
    }

    #[test]
    fn test_directories_merge() {
        let work = tempfile::tempdir().unwrap();
        let archive = make_archive(work.path(), &[("dir/", ""), ("dir/new.txt", "n")]);
        let target = work.path().join("out");
        fs::create_dir_all(target.join("dir")).unwrap();
        fs::write(target.join("dir").join("old.txt"), "o").unwrap();

        let report = restore(&archive, &target).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.directories, 1);
        assert!(!target.join("dir (1)").exists());
        assert!(target.join("dir").join("old.txt").exists());
        assert!(target.join("dir").join("new.txt").exists());
    }

    #[test]
    fn test_failures_are_collected_and_restore_continues() {
        let work = tempfile::tempdir().unwrap();
        // `blocker` is a file, so `blocker/x.txt` cannot be created.
        let archive = make_archive(
            work.path(),
            &[("blocker/x.txt", "x"), ("ok.txt", "fine")],
        );
        let target = work.path().join("out");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("blocker"), "i am a file").unwrap();

        let report = restore(&archive, &target).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entry, "blocker/x.txt");
        assert!(report.failures[0].target.is_some());
        assert_eq!(fs::read_to_string(target.join("ok.txt")).unwrap(), "fine");
        assert_eq!(fs::read_to_string(target.join("blocker")).unwrap(), "i am a file");
    }

    #[test]
    fn test_unsafe_names_are_rejected() {
        let work = tempfile::tempdir().unwrap();
        let archive = make_archive(work.path(), &[("../evil.txt", "x"), ("good.txt", "g")]);
        let target = work.path().join("out");

        let report = restore(&archive, &target).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].cause, RestoreCause::UnsafeName));
        assert!(!work.path().join("evil.txt").exists());
        assert!(target.join("good.txt").exists());
    }

    #[test]
    fn test_plan_accounts_for_earlier_entries() {
        let work = tempfile::tempdir().unwrap();
        let archive = make_archive(
            work.path(),
            &[("a.txt", "1"), ("a (1).txt", "2"), ("d/", "")],
        );
        let target = work.path().join("out");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("a.txt"), "existing").unwrap();

        let plan = plan_restore(&archive, &target).unwrap();
        assert_eq!(plan.entries.len(), 3);
        assert_eq!(plan.entries[0].target, target.join("a (1).txt"));
        assert_eq!(plan.entries[0].resolution, ConflictResolution::Renamed(1));
        assert_eq!(plan.entries[1].target, target.join("a (1) (1).txt"));
        assert!(plan.entries[2].is_dir);
        // Planning writes nothing.
        assert!(!target.join("a (1).txt").exists());

        let report = restore(&archive, &target).unwrap();
        let written: Vec<_> = report.restored.iter().map(|r| r.target.clone()).collect();
        let planned: Vec<_> = plan
            .entries
            .iter()
            .filter(|p| !p.is_dir)
            .map(|p| p.target.clone())
            .collect();
        assert_eq!(written, planned);
    }

    #[test]
    fn test_progress_reports_every_entry() {
        let work = tempfile::tempdir().unwrap();
        let archive = make_archive(work.path(), &[("a", "1"), ("b", "2"), ("c", "3")]);
        let mut seen = Vec::new();
        restore_with_progress(&archive, &work.path().join("out"), |done, total, name| {
            seen.push((done, total, name.to_string()));
        })
        .unwrap();
        assert_eq!(seen.last(), Some(&(3, 3, "c".to_string())));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_not_a_zip_is_fatal() {
        let work = tempfile::tempdir().unwrap();
        let bogus = work.path().join("bogus.zip");
        fs::write(&bogus, "definitely not a zip").unwrap();
        let err = restore(&bogus, &work.path().join("out")).unwrap_err();
        assert!(matches!(err, RestoreError::Archive { .. }));
        assert!(matches!(
            restore(&work.path().join("missing.zip"), work.path()),
            Err(RestoreError::Open { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_special_mode_bits_are_dropped() {
        assert_eq!(restored_mode(0o104755), 0o755);
        assert_eq!(restored_mode(0o2750), 0o750);
        assert_eq!(restored_mode(0o1777), 0o777);
        assert_eq!(restored_mode(0o100644), 0o644);
    }
}
