//! On-disk memoization of completed run reports.
//!
//! A report is keyed by (model, mode) and stored as
//! `{results_dir}/{model_slug}_{mode}_results.json`. Once written it is never
//! recomputed: rerunning an interrupted experiment loads the finished pairs
//! and only evaluates what is missing.

use crate::report::RunReport;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while reading or writing cached reports
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Corrupt cached report {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Unknown run mode: {0} (expected baseline or optimized)")]
    UnknownMode(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Prompting strategy of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Original question text only
    Baseline,
    /// Best of the generated paraphrases
    Optimized,
}

impl RunMode {
    /// Key fragment used in file names
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Optimized => "optimized",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "optimized" => Ok(Self::Optimized),
            _ => Err(CacheError::UnknownMode(s.to_string())),
        }
    }
}

/// File-name-safe form of a model identifier.
///
/// `qwen2.5:latest` becomes `qwen2.5latest`. Path separators, whitespace and
/// `%` are percent-encoded, so `org/m` and `org_m` stay distinct.
#[must_use]
pub fn model_slug(model: &str) -> String {
    let mut slug = String::with_capacity(model.len());
    for c in model.chars().filter(|c| *c != ':') {
        if c == '/' || c == '\\' || c == '%' || c.is_whitespace() {
            let mut buf = [0; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                write!(slug, "%{byte:02X}").ok();
            }
        } else {
            slug.push(c);
        }
    }
    slug
}

/// Directory-backed report cache
#[derive(Debug, Clone)]
pub struct RunCache {
    dir: PathBuf,
}

impl RunCache {
    /// Create a cache rooted at `dir`; the directory is created on first store
    #[must_use]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache root directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the report for (model, mode)
    #[must_use]
    pub fn report_path(&self, model: &str, mode: RunMode) -> PathBuf {
        self.dir
            .join(format!("{}_{}_results.json", model_slug(model), mode))
    }

    /// Check whether a report for (model, mode) is stored
    #[must_use]
    pub fn contains(&self, model: &str, mode: RunMode) -> bool {
        self.report_path(model, mode).is_file()
    }

    /// Load the stored report, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self, model: &str, mode: RunMode) -> Result<Option<RunReport>, CacheError> {
        let path = self.report_path(model, mode);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let report =
            RunReport::from_json(&content).map_err(|source| CacheError::Corrupt { path, source })?;
        Ok(Some(report))
    }

    /// Persist a report, replacing any earlier one.
    ///
    /// The JSON is written to a temporary file in the cache directory and
    /// renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn store(
        &self,
        model: &str,
        mode: RunMode,
        report: &RunReport,
    ) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.report_path(model, mode);
        let tmp = path.with_extension("json.tmp");

        let json = report.to_json()?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        tracing::info!(model, mode = %mode, path = %path.display(), "Results saved");
        Ok(path)
    }

    /// Return the stored report for (model, mode), computing and storing it
    /// first if absent.
    ///
    /// `compute` is called at most once, and not at all on a hit. If it
    /// fails nothing is stored and its error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error of `compute`, or a cache error converted into `E`.
    pub fn load_or_run<E, F>(&self, model: &str, mode: RunMode, compute: F) -> Result<RunReport, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Result<RunReport, E>,
    {
        if let Some(report) = self.load(model, mode)? {
            tracing::info!(
                model,
                mode = %mode,
                accuracy = report.accuracy,
                "Using cached report"
            );
            return Ok(report);
        }

        let report = compute()?;
        self.store(model, mode, &report)?;
        Ok(report)
    }
}
