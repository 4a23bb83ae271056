//! Path helpers shared by the configuration loader and the storage layer.

use std::path::{Path, PathBuf};

/// Resolve a configured directory to an absolute path.
///
/// Relative paths stay relative to the current working directory; only the
/// representation changes. A leading `~/` expands to `$HOME` when it is set.
pub fn normalize_dir_path(path: &str) -> String {
    let trimmed = path.trim();
    let expanded = match (trimmed.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(trimmed),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(expanded),
            Err(_) => expanded,
        }
    };

    absolute.to_string_lossy().into_owned()
}

/// Join a child component onto a base directory.
pub fn join_path(base: impl AsRef<Path>, child: &str) -> PathBuf {
    base.as_ref().join(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_becomes_absolute() {
        let normalized = normalize_dir_path("./data");
        assert!(Path::new(&normalized).is_absolute());
        assert!(normalized.ends_with("data"));
    }

    #[test]
    fn test_absolute_path_is_kept() {
        assert_eq!(normalize_dir_path("/var/lib/dirstore"), "/var/lib/dirstore");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/a", "rocksdb"), PathBuf::from("/a/rocksdb"));
    }
}
