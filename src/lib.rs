//! # MMLU Prompt Eval
//!
//! Measures how much a model's multiple-choice accuracy changes when each
//! question is asked through its best paraphrase instead of its original
//! wording.
//!
//! ## Method
//!
//! - **Baseline**: every question is asked once, as written.
//! - **Optimized**: the model first paraphrases each question N times
//!   (default 10). Each paraphrase is asked and scored 1/0; the first
//!   best-scoring paraphrase is then asked again and that answer counts.
//! - Replies are normalized to A-D; unparseable replies count as `A`.
//!
//! ## Architecture
//!
//! ```text
//! data/test/*.csv ──► QuestionSet ──┬──────────────► Evaluator::run_baseline ──┐
//!                                   │                                          │
//!                                   └► VariantTable ► Evaluator::run_optimized ┤
//!                                      (generated once per model)              │
//!                                                                              ▼
//!                                           RunCache (model, mode) ◄── RunReport
//!                                                                              │
//!                                                      ExperimentSummary ◄─────┘
//! ```
//!
//! Model calls are sequential. Any transport failure aborts the experiment;
//! reports already cached are reused on the next run.

pub mod cache;
pub mod config;
pub mod data;
pub mod evaluator;
pub mod experiment;
pub mod invoker;
pub mod question;
pub mod report;
pub mod variants;

pub use cache::{model_slug, CacheError, RunCache, RunMode};
pub use config::{ConfigError, ExperimentConfig};
pub use data::{DataError, DataLayout};
pub use evaluator::{
    format_prompt, normalize_answer, select_best_variant, EvalError, Evaluator, Judgment,
    LogProgress, ProgressObserver,
};
pub use experiment::{Experiment, ExperimentError, ModelBackend, ModelRun, OllamaBackend};
pub use invoker::{InvokerError, ModelInvoker, OllamaClient, OllamaInvoker};
pub use question::{AnswerLabel, Question, QuestionError, QuestionSet};
pub use report::{
    accuracy_percent, BaselineResult, ExperimentSummary, ModelSummary, OptimizedResult,
    QuestionResult, RunReport,
};
pub use variants::{
    parse_variants, OllamaVariantGenerator, VariantError, VariantGenerator, VariantTable,
};
