//! Experiment orchestration across models.
//!
//! For each configured model, in order, the baseline and optimized reports
//! are fetched from the run cache or computed. The first fatal error stops
//! the experiment; reports already stored stay valid for the next attempt,
//! and the summary is only written once every model has finished.

use crate::cache::{CacheError, RunCache, RunMode};
use crate::config::{ConfigError, ExperimentConfig};
use crate::data::{DataError, DataLayout};
use crate::evaluator::{EvalError, Evaluator, LogProgress, ProgressObserver};
use crate::invoker::{ModelInvoker, OllamaClient, OllamaInvoker};
use crate::question::{QuestionError, QuestionSet};
use crate::report::{ExperimentSummary, ModelSummary, RunReport};
use crate::variants::{
    generate_table, OllamaVariantGenerator, VariantError, VariantGenerator, VariantTable,
};
use std::path::PathBuf;
use thiserror::Error;

/// File name of the experiment summary inside the results directory
pub const SUMMARY_FILE: &str = "experiment_summary.json";

/// Errors that stop an experiment
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Question error: {0}")]
    Questions(#[from] QuestionError),

    #[error("Variant error: {0}")]
    Variants(#[from] VariantError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Source of model invokers and variant generators
pub trait ModelBackend {
    type Invoker: ModelInvoker;
    type Generator: VariantGenerator;

    /// Answering model, called once per evaluation
    fn invoker(&self, model: &str) -> Self::Invoker;

    /// Paraphrasing model, called only when a variant file is missing
    fn generator(&self, model: &str) -> Self::Generator;
}

/// Backend talking to an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: OllamaClient,
}

impl OllamaBackend {
    /// Build a backend from the configured URL and timeout
    #[must_use]
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            client: OllamaClient::new(&config.ollama_base_url, config.request_timeout()),
        }
    }
}

impl ModelBackend for OllamaBackend {
    type Invoker = OllamaInvoker;
    type Generator = OllamaVariantGenerator;

    fn invoker(&self, model: &str) -> Self::Invoker {
        OllamaInvoker::new(self.client.clone(), model)
    }

    fn generator(&self, model: &str) -> Self::Generator {
        OllamaVariantGenerator::new(self.client.clone(), model)
    }
}

/// Both run reports of one model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRun {
    pub baseline: RunReport,
    pub optimized: RunReport,
}

impl ModelRun {
    /// Comparison entry for the experiment summary
    #[must_use]
    pub fn summary(&self) -> ModelSummary {
        ModelSummary::compare(&self.baseline, &self.optimized)
    }
}

/// Full baseline-versus-optimized experiment
pub struct Experiment<B> {
    config: ExperimentConfig,
    backend: B,
    layout: DataLayout,
    cache: RunCache,
    observer: Option<Box<dyn ProgressObserver>>,
}

impl<B: ModelBackend> Experiment<B> {
    /// Create an experiment; progress is logged by default
    #[must_use]
    pub fn new(config: ExperimentConfig, backend: B) -> Self {
        let layout = DataLayout::new(config.base_dir.clone(), &config.test_file);
        let cache = RunCache::new(config.results_dir.clone());
        Self {
            config,
            backend,
            layout,
            cache,
            observer: Some(Box::new(LogProgress)),
        }
    }

    /// Replace the progress observer (`None` disables progress output)
    #[must_use]
    pub fn with_observer(mut self, observer: Option<Box<dyn ProgressObserver>>) -> Self {
        self.observer = observer;
        self
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Model backend
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Data layout derived from the configuration
    #[must_use]
    pub const fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Run cache derived from the configuration
    #[must_use]
    pub const fn cache(&self) -> &RunCache {
        &self.cache
    }

    /// Location of the experiment summary
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.config.results_dir.join(SUMMARY_FILE)
    }

    /// Validate configuration and data, then load the questions
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the dataset is
    /// missing, or the question file cannot be read.
    pub fn prepare(&self) -> Result<QuestionSet, ExperimentError> {
        self.config.validate()?;
        self.layout.check_dataset()?;
        Ok(QuestionSet::load(self.layout.test_path())?)
    }

    /// Evaluate every configured model and write the summary
    ///
    /// # Errors
    ///
    /// Returns the first error; the summary is not written in that case.
    pub fn run(&self) -> Result<ExperimentSummary, ExperimentError> {
        let questions = self.prepare()?;
        let mut summary = ExperimentSummary::new();

        for model in &self.config.llm_models {
            tracing::info!(model = %model, "Processing model");
            let run = self.run_model(model, &questions)?;
            let entry = run.summary();
            tracing::info!(
                model = %model,
                baseline = entry.baseline_accuracy,
                optimized = entry.optimized_accuracy,
                improvement = entry.improvement,
                "Model complete"
            );
            summary.record(model, entry);
        }

        let path = self.summary_path();
        summary.save(&path)?;
        tracing::info!(path = %path.display(), "Experiment summary saved");
        Ok(summary)
    }

    /// Baseline and optimized reports for one model
    ///
    /// # Errors
    ///
    /// Returns the first evaluation, variant or cache error.
    pub fn run_model(
        &self,
        model: &str,
        questions: &QuestionSet,
    ) -> Result<ModelRun, ExperimentError> {
        self.layout.prepare_model_dir(model)?;
        let baseline = self.evaluate(model, RunMode::Baseline, questions)?;
        let optimized = self.evaluate(model, RunMode::Optimized, questions)?;
        Ok(ModelRun {
            baseline,
            optimized,
        })
    }

    /// One cached run; the optimized mode ensures the variant file first
    ///
    /// # Errors
    ///
    /// Returns the first evaluation, variant or cache error.
    pub fn evaluate(
        &self,
        model: &str,
        mode: RunMode,
        questions: &QuestionSet,
    ) -> Result<RunReport, ExperimentError> {
        self.cache.load_or_run::<ExperimentError, _>(model, mode, || {
            let invoker = self.backend.invoker(model);
            let mut evaluator = Evaluator::new(invoker);
            if let Some(observer) = self.observer.as_deref() {
                evaluator = evaluator.with_observer(observer);
            }

            match mode {
                RunMode::Baseline => Ok(evaluator.run_baseline(&questions.questions)?),
                RunMode::Optimized => {
                    let variants = self.ensure_variants(model, questions)?;
                    Ok(evaluator.run_optimized(&questions.questions, &variants.rows)?)
                }
            }
        })
    }

    /// Load the model's variant file, generating it if absent
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, or cannot be
    /// written after generation.
    pub fn ensure_variants(
        &self,
        model: &str,
        questions: &QuestionSet,
    ) -> Result<VariantTable, ExperimentError> {
        let path = self.layout.variants_path(model);
        if path.is_file() {
            tracing::info!(path = %path.display(), "Prompt variants already exist");
            return Ok(VariantTable::load(&path)?);
        }

        tracing::info!(
            model,
            count = self.config.num_prompt_variants,
            "Generating prompt variants"
        );
        let generator = self.backend.generator(model);
        let table = generate_table(
            &generator,
            &questions.questions,
            self.config.num_prompt_variants,
            |n, question| {
                let preview: String = question.text.chars().take(50).collect();
                tracing::debug!(question = n, "Processing question: {preview}...");
            },
        );
        table.save(&path)?;
        Ok(table)
    }
}
