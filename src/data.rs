//! Benchmark data layout on disk.
//!
//! ```text
//! {base}/data/test/{subject}_test.csv              shared questions
//! {base}/data_{model}/test/{subject}_test_prompts.csv   per-model variants
//! ```
//!
//! The MMLU archive itself is fetched and unpacked outside this tool; the
//! checks here only decide whether it is present.

use crate::cache::model_slug;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where the MMLU archive can be downloaded from
pub const MMLU_ARCHIVE_URL: &str = "https://people.eecs.berkeley.edu/~hendrycks/data.tar";

/// Errors about missing or unusable benchmark data
#[derive(Error, Debug)]
pub enum DataError {
    #[error(
        "Benchmark data not found at {0}; download and extract {url} into the base directory",
        url = MMLU_ARCHIVE_URL
    )]
    MissingDataset(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Paths of the shared dataset and the per-model working directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    base_dir: PathBuf,
    test_file: String,
}

impl DataLayout {
    /// Layout rooted at `base_dir` for the question file `test_file`
    #[must_use]
    pub fn new<P: Into<PathBuf>>(base_dir: P, test_file: &str) -> Self {
        Self {
            base_dir: base_dir.into(),
            test_file: test_file.to_string(),
        }
    }

    /// Base directory
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Extracted dataset root
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// The question file
    #[must_use]
    pub fn test_path(&self) -> PathBuf {
        self.data_dir().join("test").join(&self.test_file)
    }

    /// Working directory of one model
    #[must_use]
    pub fn model_dir(&self, model: &str) -> PathBuf {
        self.base_dir.join(format!("data_{}", model_slug(model)))
    }

    /// Variant file of one model
    #[must_use]
    pub fn variants_path(&self, model: &str) -> PathBuf {
        let stem = self
            .test_file
            .strip_suffix("_test.csv")
            .or_else(|| self.test_file.strip_suffix(".csv"))
            .unwrap_or(&self.test_file);
        self.model_dir(model)
            .join("test")
            .join(format!("{stem}_test_prompts.csv"))
    }

    /// Ensure the dataset has been extracted
    ///
    /// # Errors
    ///
    /// Returns `MissingDataset` if the data directory or question file is
    /// absent.
    pub fn check_dataset(&self) -> Result<(), DataError> {
        let test_path = self.test_path();
        if !self.data_dir().is_dir() || !test_path.is_file() {
            return Err(DataError::MissingDataset(test_path.display().to_string()));
        }
        tracing::debug!(path = %test_path.display(), "Benchmark data present");
        Ok(())
    }

    /// Create the model's working directory if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn prepare_model_dir(&self, model: &str) -> Result<PathBuf, DataError> {
        let dir = self.model_dir(model).join("test");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
