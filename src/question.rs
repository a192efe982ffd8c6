//! Question loading for MMLU-style multiple-choice benchmarks.
//!
//! Each CSV row holds the question text, four choice texts and the letter
//! of the correct answer. Files have no header row.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during question loading
#[derive(Error, Debug)]
pub enum QuestionError {
    #[error("Question file not found: {0}")]
    NotFound(String),

    #[error("Invalid answer label: {0}")]
    InvalidLabel(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Answer letter of a four-way multiple-choice question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnswerLabel {
    A,
    B,
    C,
    D,
}

impl AnswerLabel {
    /// All labels in choice order
    pub const ALL: [Self; 4] = [Self::A, Self::B, Self::C, Self::D];

    /// Label for a single uppercase letter
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            _ => None,
        }
    }

    /// The letter as a string slice
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl fmt::Display for AnswerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerLabel {
    type Err = QuestionError;

    /// Parse a label, ignoring case and surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            _ => Err(QuestionError::InvalidLabel(s.to_string())),
        }
    }
}

/// A single benchmark question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Position among the accepted rows of the source file
    pub id: usize,
    /// Question text
    pub text: String,
    /// Choice texts for A, B, C and D
    pub choices: [String; 4],
    /// Ground-truth answer
    pub answer: AnswerLabel,
}

impl Question {
    /// Build a question from one CSV record, or `None` if the record is
    /// too short or carries no valid answer letter
    #[must_use]
    pub fn from_record(id: usize, record: &csv::StringRecord) -> Option<Self> {
        if record.len() < 6 {
            return None;
        }
        let answer = record.get(5)?.parse().ok()?;
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();

        Some(Self {
            id,
            text: field(0),
            choices: [field(1), field(2), field(3), field(4)],
            answer,
        })
    }
}

/// All accepted questions of one benchmark file
#[derive(Debug, Clone, Default)]
pub struct QuestionSet {
    /// Accepted questions in file order
    pub questions: Vec<Question>,
    /// Rows dropped for being malformed
    pub skipped_rows: usize,
}

impl QuestionSet {
    /// Load questions from a headerless CSV file
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist or is not valid CSV.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, QuestionError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(QuestionError::NotFound(path.display().to_string()));
        }
        let file = std::fs::File::open(path)?;
        let set = Self::from_reader(file)?;

        tracing::info!(
            path = %path.display(),
            questions = set.len(),
            skipped = set.skipped_rows,
            "Loaded questions"
        );
        Ok(set)
    }

    /// Parse questions from any reader
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid CSV.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, QuestionError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut set = Self::default();
        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            match Question::from_record(set.questions.len(), &record) {
                Some(question) => set.questions.push(question),
                None => {
                    tracing::debug!(row, fields = record.len(), "Skipping malformed row");
                    set.skipped_rows += 1;
                }
            }
        }
        Ok(set)
    }

    /// Number of accepted questions
    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Check if no questions were accepted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Iterate over questions in file order
    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }
}
