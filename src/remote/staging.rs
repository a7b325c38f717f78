use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

/// Local directory holding temporary copies of remote tables.
///
/// Every transfer gets its own subdirectory, so two transfers of files with
/// the same name never share a path. The root is created on first use. Every
/// reserved directory is tracked and removed on [`StagingArea::release`] or
/// when the area is dropped.
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
    staged: Mutex<HashSet<PathBuf>>,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StagingArea {
            root: root.into(),
            staged: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh, tracked directory under the root for one transfer.
    pub fn reserve(&self) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let dir = tempfile::Builder::new()
            .prefix("transfer-")
            .tempdir_in(&self.root)?
            .keep();
        if let Ok(mut staged) = self.staged.lock() {
            staged.insert(dir.clone());
        }
        debug!(path = %dir.display(), "reserved staging directory");
        Ok(dir)
    }

    pub fn is_staged(&self, path: &Path) -> bool {
        self.staged
            .lock()
            .map(|staged| staged.contains(path))
            .unwrap_or(false)
    }

    /// Deletes a reserved directory and everything in it. Missing paths are
    /// not an error.
    pub fn release(&self, path: &Path) {
        if let Ok(mut staged) = self.staged.lock() {
            staged.remove(path);
        }
        remove_quietly(path);
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        let staged = match self.staged.get_mut() {
            Ok(staged) => std::mem::take(staged),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for path in staged {
            remove_quietly(&path);
        }
    }
}

fn remove_quietly(path: &Path) {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => debug!(path = %path.display(), "released staging path"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "cannot remove staging path"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn directory_is_created_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("persistence");
        let area = StagingArea::new(&root);
        assert!(!root.exists());

        let reserved = area.reserve().unwrap();
        assert!(reserved.is_dir());
        assert_eq!(reserved.parent(), Some(root.as_path()));
        assert!(area.is_staged(&reserved));
    }

    #[test]
    fn reservations_never_share_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());

        let first = area.reserve().unwrap();
        let second = area.reserve().unwrap();
        assert!(first != second);

        fs::write(first.join("result.csv"), "first").unwrap();
        fs::write(second.join("result.csv"), "second").unwrap();
        area.release(&first);

        assert!(!first.exists());
        assert_eq!(fs::read_to_string(second.join("result.csv")).unwrap(), "second");
    }

    #[test]
    fn release_removes_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());
        let reserved = area.reserve().unwrap();
        fs::write(reserved.join("a.csv"), "x").unwrap();

        area.release(&reserved);
        assert!(!reserved.exists());
        assert!(!area.is_staged(&reserved));

        // releasing twice is harmless
        area.release(&reserved);
    }

    #[test]
    fn drop_cleans_up_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let reserved = {
            let area = StagingArea::new(dir.path());
            let reserved = area.reserve().unwrap();
            fs::write(reserved.join("left-behind.csv"), "x").unwrap();
            reserved
        };
        assert!(!reserved.exists());
        assert!(dir.path().is_dir());
    }
}
