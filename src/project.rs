use std::path::{Path, PathBuf};

/// A local project: its base directory and the source directories inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Project {
    root: PathBuf,
    source_dirs: Vec<PathBuf>,
}

impl Project {
    /// A project whose only source directory is its root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Project {
            source_dirs: vec![root.clone()],
            root,
        }
    }

    pub fn with_source_dirs(root: impl Into<PathBuf>, source_dirs: Vec<PathBuf>) -> Self {
        let root = root.into();
        let source_dirs = if source_dirs.is_empty() {
            vec![root.clone()]
        } else {
            source_dirs
        };
        Project { root, source_dirs }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dirs(&self) -> &[PathBuf] {
        &self.source_dirs
    }
}
