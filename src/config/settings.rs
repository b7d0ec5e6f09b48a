use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Directory layout for pipeline artefacts, rooted at a single data directory.
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn input(&self) -> PathBuf {
        self.root.join("input")
    }

    pub fn clean(&self) -> PathBuf {
        self.root.join("clean")
    }

    pub fn rejected(&self) -> PathBuf {
        self.root.join("rejected")
    }

    pub fn aggregations(&self) -> PathBuf {
        self.root.join("aggregations")
    }

    pub fn lookups(&self) -> PathBuf {
        self.root.join("lookups")
    }

    /// Create the expected data directories if they do not already exist.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.input(),
            self.clean(),
            self.rejected(),
            self.aggregations(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}
