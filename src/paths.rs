//! Conversion between host paths and the forward-slash form stored in
//! archives. Conversion only happens at the filesystem boundary.

use std::path::{Component, Path, PathBuf};

/// Host relative path to its portable form (`dir/file.txt`).
///
/// Returns `None` for paths with non-UTF-8, root, prefix, `.` or `..`
/// components, and for the empty path.
pub fn to_portable(rel: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Resolve a portable entry name under `root`.
///
/// Rejects anything that could land outside `root`: absolute names, drive
/// letters, backslashes, `.`/`..` and empty components. A single trailing
/// `/` (directory entries) is accepted.
pub fn to_native(root: &Path, portable: &str) -> Option<PathBuf> {
    let trimmed = portable.strip_suffix('/').unwrap_or(portable);
    if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.contains('\\') {
        return None;
    }

    if has_drive_prefix(trimmed) {
        return None;
    }

    let mut out = root.to_path_buf();
    for part in trimmed.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return None;
        }
        out.push(part);
    }
    Some(out)
}

/// `C:` style prefix on the first component.
fn has_drive_prefix(portable: &str) -> bool {
    let bytes = portable.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Last component of a portable path.
pub fn basename(portable: &str) -> &str {
    portable.rsplit('/').next().unwrap_or(portable)
}
