//! Path filtering: watch root containment plus gitignore-style patterns.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::Result;

/// Decides which event paths the engine handles.
#[derive(Debug)]
pub struct PathFilter {
    root: PathBuf,
    recursive: bool,
    gitignore: Option<Gitignore>,
}

impl PathFilter {
    /// Accept every path under `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            recursive: true,
            gitignore: None,
        }
    }

    /// Accept paths under `root` that match none of `patterns`.
    ///
    /// # Errors
    ///
    /// Returns an error if patterns are invalid.
    pub fn with_patterns(root: impl AsRef<Path>, patterns: &[String]) -> Result<Self> {
        let mut filter = Self::new(root);
        if patterns.is_empty() {
            return Ok(filter);
        }

        let mut builder = GitignoreBuilder::new(&filter.root);
        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| crate::Error::config(format!("invalid pattern: {e}")))?;
        }

        let gitignore = builder
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build ignore set: {e}")))?;

        filter.gitignore = Some(gitignore);
        Ok(filter)
    }

    /// Only accept direct children of the root.
    #[must_use]
    pub fn flat(mut self) -> Self {
        self.recursive = false;
        self
    }

    /// Root the filter is anchored at.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check whether an event for `path` should be handled.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        // The root itself carries no content
        if relative.as_os_str().is_empty() {
            return false;
        }

        if !self.recursive && relative.components().count() > 1 {
            return false;
        }

        !self.is_ignored(path)
    }

    /// Check whether `path` or one of its parent directories matches a pattern.
    #[must_use]
    pub fn is_ignored(&self, path: &Path) -> bool {
        self.gitignore.as_ref().is_some_and(|gi| {
            path.starts_with(&self.root)
                && gi
                    .matched_path_or_any_parents(path, path.is_dir())
                    .is_ignore()
        })
    }
}
