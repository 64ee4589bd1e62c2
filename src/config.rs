use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{LogError, Result};

/// Output format of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    /// One rendered line per record.
    #[default]
    Text,
    /// A binary log plus a `-meta.txt` side file.
    Binary,
}

/// Settings for reading sources and writing merged output.
#[derive(Debug, Clone, Default)]
pub struct MergeConfig {
    /// Compute text log dates and render times in UTC rather than local time.
    pub use_utc: bool,
    /// Replace existing output files instead of failing.
    pub overwrite: bool,
    pub output: OutputKind,
}

impl MergeConfig {
    pub fn with_utc(mut self, use_utc: bool) -> Self {
        self.use_utc = use_utc;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_output(mut self, output: OutputKind) -> Self {
        self.output = output;
        self
    }

    /// Opens `path` for writing. Without `overwrite` an existing file is an
    /// error rather than being truncated.
    pub fn create_file(&self, path: &Path) -> Result<File> {
        let mut options = OpenOptions::new();
        options.write(true);
        if self.overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        options.open(path).map_err(|e| LogError::at(path, e))
    }
}
