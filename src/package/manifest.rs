//! Media manifest: the files bundled into a package.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::domain::media::file_name_of;

/// Ordered, duplicate-free list of media files.
///
/// Files are keyed by name, since that is how notes reference them; a second
/// path with an already-listed name is ignored.
#[derive(Debug, Clone, Default)]
pub struct MediaManifest {
    files: Vec<PathBuf>,
    names: HashSet<String>,
}

impl MediaManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file if it exists and its name is not listed yet.
    ///
    /// Returns whether the file was added.
    pub fn insert(&mut self, path: &Path) -> bool {
        let Some(name) = file_name_of(path) else {
            warn!(path = %path.display(), "Media path has no usable file name");
            return false;
        };

        if self.names.contains(name) {
            return false;
        }

        if !path.is_file() {
            warn!(path = %path.display(), "Media file missing at assembly time; not bundled");
            return false;
        }

        self.names.insert(name.to_string());
        self.files.push(path.to_path_buf());
        true
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
