//! Paraphrase generation and the per-model variant file.
//!
//! A variant file has one CSV row per accepted question, in question order,
//! each row holding that question's paraphrases.

use crate::invoker::{GenerateOptions, GenerateRequest, OllamaClient};
use crate::question::Question;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading or writing variant files
#[derive(Error, Debug)]
pub enum VariantError {
    #[error("Variant file not found: {0}")]
    NotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Produces paraphrases of a question.
///
/// Implementations never fail outward: on any internal error they return the
/// original question repeated `count` times.
pub trait VariantGenerator {
    /// Return exactly `count` formulations of `question`
    fn generate(&self, question: &str, count: usize) -> Vec<String>;
}

impl<T: VariantGenerator + ?Sized> VariantGenerator for &T {
    fn generate(&self, question: &str, count: usize) -> Vec<String> {
        (**self).generate(question, count)
    }
}

impl<T: VariantGenerator + ?Sized> VariantGenerator for Box<T> {
    fn generate(&self, question: &str, count: usize) -> Vec<String> {
        (**self).generate(question, count)
    }
}

/// Split a `|`-separated model reply into exactly `count` variants.
///
/// Pieces are trimmed and blank pieces dropped; extra pieces are cut off and
/// missing ones are filled with the original question.
#[must_use]
pub fn parse_variants(response: &str, question: &str, count: usize) -> Vec<String> {
    let mut variants: Vec<String> = response
        .split('|')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .take(count)
        .map(String::from)
        .collect();

    variants.resize(count, question.to_string());
    variants
}

fn system_prompt(count: usize) -> String {
    format!(
        "You are an expert in generating alternative formulations of questions. \
         Given a question, generate {count} different ways to ask the same question. \
         Each alternative should maintain the same meaning but use different words or structure. \
         Return only the {count} alternatives, separated by | character, without numbering or additional text."
    )
}

/// Paraphrase generator backed by an Ollama model
#[derive(Debug, Clone)]
pub struct OllamaVariantGenerator {
    client: OllamaClient,
    model: String,
}

impl OllamaVariantGenerator {
    /// Create a generator for `model`
    #[must_use]
    pub fn new(client: OllamaClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

impl VariantGenerator for OllamaVariantGenerator {
    fn generate(&self, question: &str, count: usize) -> Vec<String> {
        let system = system_prompt(count);
        let request = GenerateRequest {
            model: &self.model,
            prompt: question,
            system: Some(&system),
            stream: false,
            options: GenerateOptions::default(),
        };

        match self.client.generate(&request) {
            Ok(response) => parse_variants(&response, question, count),
            Err(e) => {
                tracing::warn!(
                    model = %self.model,
                    error = %e,
                    "Variant generation failed, repeating original question"
                );
                vec![question.to_string(); count]
            }
        }
    }
}

/// Paraphrase rows aligned with a question list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantTable {
    /// One row of variants per question
    pub rows: Vec<Vec<String>>,
}

impl VariantTable {
    /// Load a headerless variant CSV
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist or is not valid CSV.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, VariantError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(VariantError::NotFound(path.display().to_string()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(String::from).collect());
        }
        Ok(Self { rows })
    }

    /// Write the table as CSV, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), VariantError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        tracing::info!(path = %path.display(), rows = self.rows.len(), "Saved prompt variants");
        Ok(())
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Generate `count` variants for every question, in order.
///
/// `on_question` is called with the 1-based index of each question before
/// its variants are requested.
pub fn generate_table<G, F>(
    generator: &G,
    questions: &[Question],
    count: usize,
    mut on_question: F,
) -> VariantTable
where
    G: VariantGenerator + ?Sized,
    F: FnMut(usize, &Question),
{
    let rows = questions
        .iter()
        .enumerate()
        .map(|(i, question)| {
            on_question(i + 1, question);
            generator.generate(&question.text, count)
        })
        .collect();
    VariantTable { rows }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::question::AnswerLabel;
    use std::time::Duration;

    struct Numbered;

    impl VariantGenerator for Numbered {
        fn generate(&self, question: &str, count: usize) -> Vec<String> {
            (0..count).map(|i| format!("{question} #{i}")).collect()
        }
    }

    fn question(id: usize, text: &str) -> Question {
        Question {
            id,
            text: text.to_string(),
            choices: [
                "w".to_string(),
                "x".to_string(),
                "y".to_string(),
                "z".to_string(),
            ],
            answer: AnswerLabel::A,
        }
    }

    #[test]
    fn test_parse_variants_exact() {
        let v = parse_variants(" one | two |three", "orig", 3);
        assert_eq!(v, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_parse_variants_truncates() {
        let v = parse_variants("a|b|c|d", "orig", 2);
        assert_eq!(v, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_variants_pads_with_original() {
        let v = parse_variants("only one", "orig", 3);
        assert_eq!(v, vec!["only one", "orig", "orig"]);
    }

    #[test]
    fn test_parse_variants_drops_blank_pieces() {
        let v = parse_variants("a|| |b|", "orig", 3);
        assert_eq!(v, vec!["a", "b", "orig"]);

        let empty = parse_variants("", "orig", 2);
        assert_eq!(empty, vec!["orig", "orig"]);
    }

    #[test]
    fn test_system_prompt_mentions_count() {
        let prompt = system_prompt(7);
        assert!(prompt.contains("generate 7 different ways"));
        assert!(prompt.contains("separated by | character"));
    }

    #[test]
    fn test_ollama_generator_degrades_to_original() {
        let client = OllamaClient::new("http://127.0.0.1:9", Duration::from_millis(500));
        let generator = OllamaVariantGenerator::new(client, "qwen2.5:latest");
        let v = generator.generate("What is the femur?", 4);
        assert_eq!(v, vec!["What is the femur?"; 4]);
    }

    #[test]
    fn test_generate_table_in_order() {
        let questions = vec![question(0, "Q0"), question(1, "Q1")];
        let mut seen = Vec::new();
        let table = generate_table(&Numbered, &questions, 2, |n, q| {
            seen.push((n, q.text.clone()));
        });

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec!["Q1 #0", "Q1 #1"]);
        assert_eq!(seen, vec![(1, "Q0".to_string()), (2, "Q1".to_string())]);
    }

    #[test]
    fn test_table_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("anatomy_test_prompts.csv");
        let table = VariantTable {
            rows: vec![
                vec!["Is it, perhaps, the femur?".to_string(), "plain".to_string()],
                vec!["quote \"inside\"".to_string()],
            ],
        };

        table.save(&path).unwrap();
        let loaded = VariantTable::load(&path).unwrap();
        assert_eq!(loaded, table);
        assert!(!loaded.is_empty());
    }

    #[test]
    fn test_load_not_found() {
        let result = VariantTable::load("/nonexistent/prompts.csv");
        assert!(matches!(result, Err(VariantError::NotFound(_))));
    }
}
