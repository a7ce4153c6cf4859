//! Scoped temporary directories
//!
//! A [`TempWorkspace`] owns one freshly created directory and removes it when dropped,
//! so every exit path of the owning operation (normal return, `?` propagation, a failed
//! job or a panic unwinding through it) reclaims the directory. Removal failures are
//! logged and swallowed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// An exclusively owned temporary directory
#[derive(Debug)]
pub struct TempWorkspace {
    path: PathBuf,
}

impl TempWorkspace {
    /// Create `<base>/<prefix>-<uuid>`, creating `base` as well if needed
    pub fn create(base: &Path, prefix: &str) -> io::Result<Self> {
        fs::create_dir_all(base)?;
        let path = base.join(format!("{}-{}", prefix, Uuid::new_v4().simple()));
        fs::create_dir(&path)?;
        tracing::debug!(path = %path.display(), "Created workspace");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a file name inside the workspace
    pub fn join<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed workspace"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to clean up temp directory"
            ),
        }
    }
}
