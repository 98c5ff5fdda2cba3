// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use miette::IntoDiagnostic;
use std::{fmt::{Display, Formatter},
          ops::Deref,
          path::{Path, PathBuf},
          sync::atomic::{AtomicU64, Ordering},
          time::{SystemTime, UNIX_EPOCH}};

static NEXT_TEMP_DIR_ID: AtomicU64 = AtomicU64::new(0);

/// A uniquely named folder under the OS temp dir. Removed, with its contents, when
/// dropped.
#[derive(Debug)]
pub struct TempDir {
    pub path: PathBuf,
}

/// Create a temporary directory. The directory is automatically deleted when the
/// [`TempDir`] struct is dropped.
///
/// # Errors
///
/// Returns an error if the folder can't be created.
pub fn try_create_temp_dir() -> miette::Result<TempDir> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|it| it.as_nanos())
        .unwrap_or_default();
    let name = format!(
        "affinity_groups_{}_{}_{}",
        std::process::id(),
        nanos,
        NEXT_TEMP_DIR_ID.fetch_add(1, Ordering::SeqCst)
    );
    let path = std::env::temp_dir().join(name);
    std::fs::create_dir(&path).into_diagnostic()?;
    Ok(TempDir { path })
}

impl Deref for TempDir {
    type Target = Path;

    fn deref(&self) -> &Self::Target { &self.path }
}

impl Display for TempDir {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(
                message = "Could not remove temp dir",
                path = %self.path.display(),
                error = %error,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir() {
        let temp_dir = try_create_temp_dir().unwrap();
        assert!(temp_dir.path.exists());
        assert!(temp_dir.join("file.txt").starts_with(&temp_dir.path));
    }

    #[test]
    fn test_temp_dirs_are_unique() {
        let first = try_create_temp_dir().unwrap();
        let second = try_create_temp_dir().unwrap();
        assert_ne!(first.path, second.path);
    }

    #[test]
    fn test_temp_dir_drop() {
        let temp_dir = try_create_temp_dir().unwrap();
        std::fs::write(temp_dir.join("file.txt"), "contents").unwrap();
        let copy_of_path = temp_dir.path.clone();

        drop(temp_dir);

        assert!(!copy_of_path.exists());
    }
}
