//! Run reports and the experiment summary.
//!
//! The JSON written here is the on-disk format of the run cache: a cached
//! report is read back verbatim, so field names must stay stable.

use crate::question::AnswerLabel;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Percentage of correct answers; 0 when nothing was evaluated
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn accuracy_percent(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    correct as f64 / total as f64 * 100.0
}

/// Outcome of one baseline question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineResult {
    /// Question text as asked
    pub question: String,
    /// Normalized model answer
    pub predicted: AnswerLabel,
    /// Ground truth
    pub correct: AnswerLabel,
    pub is_correct: bool,
}

/// Outcome of one optimized question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedResult {
    /// Unmodified question text
    pub original_question: String,
    /// Variant chosen for the final answer
    pub best_prompt: String,
    /// Index of the chosen variant
    pub best_idx: usize,
    /// 1.0 or 0.0 per variant, in variant order
    pub scores: Vec<f64>,
    /// Answer from the final call with the chosen variant
    pub predicted: AnswerLabel,
    /// Ground truth
    pub correct: AnswerLabel,
    pub is_correct: bool,
}

/// Per-question entry of a run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionResult {
    Optimized(OptimizedResult),
    Baseline(BaselineResult),
}

impl QuestionResult {
    /// Whether the final answer matched the ground truth
    #[must_use]
    pub const fn is_correct(&self) -> bool {
        match self {
            Self::Optimized(r) => r.is_correct,
            Self::Baseline(r) => r.is_correct,
        }
    }

    /// Final predicted label
    #[must_use]
    pub const fn predicted(&self) -> AnswerLabel {
        match self {
            Self::Optimized(r) => r.predicted,
            Self::Baseline(r) => r.predicted,
        }
    }
}

impl From<BaselineResult> for QuestionResult {
    fn from(result: BaselineResult) -> Self {
        Self::Baseline(result)
    }
}

impl From<OptimizedResult> for QuestionResult {
    fn from(result: OptimizedResult) -> Self {
        Self::Optimized(result)
    }
}

/// Aggregate result of one model in one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Questions evaluated
    pub total: usize,
    /// Questions answered correctly
    pub correct: usize,
    /// `correct / total * 100`
    pub accuracy: f64,
    /// Per-question results in question order
    pub results: Vec<QuestionResult>,
}

impl RunReport {
    /// Build a report, deriving the aggregates from `results`
    #[must_use]
    pub fn from_results(results: Vec<QuestionResult>) -> Self {
        let total = results.len();
        let correct = results.iter().filter(|r| r.is_correct()).count();
        Self {
            total,
            correct,
            accuracy: accuracy_percent(correct, total),
            results,
        }
    }

    /// Render report as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a report from JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a report.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Baseline versus optimized comparison for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub baseline_accuracy: f64,
    pub optimized_accuracy: f64,
    /// `optimized_accuracy - baseline_accuracy`, in percentage points
    pub improvement: f64,
    pub baseline_correct: usize,
    pub optimized_correct: usize,
    pub total_questions: usize,
}

impl ModelSummary {
    /// Compare the two run reports of one model
    #[must_use]
    pub fn compare(baseline: &RunReport, optimized: &RunReport) -> Self {
        Self {
            baseline_accuracy: baseline.accuracy,
            optimized_accuracy: optimized.accuracy,
            improvement: optimized.accuracy - baseline.accuracy,
            baseline_correct: baseline.correct,
            optimized_correct: optimized.correct,
            total_questions: baseline.total,
        }
    }

    /// Plain-text lines for the final console summary
    #[must_use]
    pub fn lines(&self) -> [String; 3] {
        [
            format!(
                "Baseline:  {:.2}% ({}/{})",
                self.baseline_accuracy, self.baseline_correct, self.total_questions
            ),
            format!(
                "Optimized: {:.2}% ({}/{})",
                self.optimized_accuracy, self.optimized_correct, self.total_questions
            ),
            format!("Improvement: {:+.2}%", self.improvement),
        ]
    }
}

/// All per-model comparisons of one experiment, in the order models ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub generated_at: DateTime<Utc>,
    pub llm_models: IndexMap<String, ModelSummary>,
}

impl ExperimentSummary {
    /// Create an empty summary stamped with the current time
    #[must_use]
    pub fn new() -> Self {
        Self {
            generated_at: Utc::now(),
            llm_models: IndexMap::new(),
        }
    }

    /// Add or replace one model's comparison; a new model goes last
    pub fn record(&mut self, model: &str, summary: ModelSummary) {
        self.llm_models.insert(model.to_string(), summary);
    }

    /// Render summary as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load a summary written by [`ExperimentSummary::save`]
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    /// Write the summary as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for ExperimentSummary {
    fn default() -> Self {
        Self::new()
    }
}
