//! Boundary with the object store that holds saved archives.
//!
//! The engine never talks to the network itself; it hands finished archives
//! to a [`RemoteStore`] and restores whatever bytes it gets back.
//! [`LocalStore`] is a directory-backed implementation.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::RemoteObject;

pub const ARCHIVE_EXTENSION: &str = ".zip";

/// Operations the engine needs from an object store.
pub trait RemoteStore {
    /// Upload `source` under `name`, replacing any object with that name.
    fn put(&self, name: &str, source: &mut dyn Read) -> Result<u64, StoreError>;

    /// Stream the object `name` into `sink`.
    fn get(&self, name: &str, sink: &mut dyn Write) -> Result<u64, StoreError>;

    /// Archive objects, sorted by name.
    fn list(&self) -> Result<Vec<RemoteObject>, StoreError>;

    fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Time-limited URL that lets someone without credentials fetch `name`.
    fn presign(&self, name: &str, expiry: Duration) -> Result<String, StoreError>;
}

/// Object name for a saved state: `<state>.zip`.
pub fn archive_name(state: &str) -> Result<String, StoreError> {
    let state = state.trim();
    let name = if state.ends_with(ARCHIVE_EXTENSION) {
        state.to_string()
    } else {
        format!("{state}{ARCHIVE_EXTENSION}")
    };
    validate_name(&name)?;
    Ok(name)
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let stem = name.strip_suffix(ARCHIVE_EXTENSION).unwrap_or(name);
    if stem.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Store backed by a plain directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }

    fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| {
            if source.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                )
            } else {
                StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        }
    }
}

impl RemoteStore for LocalStore {
    fn put(&self, name: &str, source: &mut dyn Read) -> Result<u64, StoreError> {
        let path = self.object_path(name)?;
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(&self.dir)
            .map_err(io_err)?;
        let written = io::copy(source, &mut tmp).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        info!(object = name, bytes = written, "stored object");
        Ok(written)
    }

    fn get(&self, name: &str, sink: &mut dyn Write) -> Result<u64, StoreError> {
        let path = self.object_path(name)?;
        let mut file = File::open(&path).map_err(Self::io_err(&path))?;
        let read = io::copy(&mut file, sink).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(object = name, bytes = read, "fetched object");
        Ok(read)
    }

    fn list(&self) -> Result<Vec<RemoteObject>, StoreError> {
        let read_dir = fs::read_dir(&self.dir).map_err(Self::io_err(&self.dir))?;
        let mut objects = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(Self::io_err(&self.dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(ARCHIVE_EXTENSION) || name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().map_err(Self::io_err(&entry.path()))?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| DateTime::<Utc>::from(UNIX_EPOCH));
            objects.push(RemoteObject {
                name,
                size: meta.len(),
                modified,
            });
        }
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.object_path(name)?;
        fs::remove_file(&path).map_err(Self::io_err(&path))?;
        info!(object = name, "deleted object");
        Ok(())
    }

    fn presign(&self, _name: &str, _expiry: Duration) -> Result<String, StoreError> {
        Err(StoreError::Unsupported {
            operation: "presign",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_name() {
        assert_eq!(archive_name("feature-x").unwrap(), "feature-x.zip");
        assert_eq!(archive_name("done.zip").unwrap(), "done.zip");
        assert!(archive_name("a/b").is_err());
        assert!(archive_name("..").is_err());
        assert!(archive_name("").is_err());
        assert!(archive_name(".zip").is_err());
    }

    #[test]
    fn test_put_get_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("bucket")).unwrap();

        store.put("b.zip", &mut "bbbb".as_bytes()).unwrap();
        store.put("a.zip", &mut "aa".as_bytes()).unwrap();
        fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

        let listed = store.list().unwrap();
        let names: Vec<_> = listed.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a.zip", "b.zip"]);
        assert_eq!(listed[1].size, 4);

        let mut out = Vec::new();
        assert_eq!(store.get("b.zip", &mut out).unwrap(), 4);
        assert_eq!(out, b"bbbb");

        store.delete("a.zip").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_put_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.put("s.zip", &mut "one".as_bytes()).unwrap();
        store.put("s.zip", &mut "two".as_bytes()).unwrap();
        let mut out = Vec::new();
        store.get("s.zip", &mut out).unwrap();
        assert_eq!(out, b"two");
    }

    #[test]
    fn test_missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get("nope.zip", &mut Vec::<u8>::new()),
            Err(StoreError::NotFound(name)) if name == "nope.zip"
        ));
        assert!(matches!(store.delete("nope.zip"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.get("../escape.zip", &mut Vec::<u8>::new()),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn test_presign_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.presign("a.zip", Duration::from_secs(60)),
            Err(StoreError::Unsupported { .. })
        ));
    }
}
