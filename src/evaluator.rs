//! Evaluation engine for baseline and optimized runs.
//!
//! Every model call goes through [`Evaluator::evaluate_single`], which turns
//! the raw reply into an [`AnswerLabel`]. Unparseable replies fall back to a
//! label; an invoker failure aborts the whole run.

use crate::invoker::{InvokerError, ModelInvoker};
use crate::question::{AnswerLabel, Question};
use crate::report::{BaselineResult, OptimizedResult, QuestionResult, RunReport};
use std::fmt::Write as FmtWrite;
use thiserror::Error;

/// Progress is reported after every this many questions
pub const PROGRESS_INTERVAL: usize = 10;

/// Errors that abort an evaluation run
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Model {model} failed during {operation}: {source}")]
    Invoker {
        model: String,
        operation: &'static str,
        #[source]
        source: InvokerError,
    },

    #[error("Variant rows ({variants}) do not match question count ({questions})")]
    VariantCountMismatch { questions: usize, variants: usize },

    #[error("Question {0} has no prompt variants")]
    NoVariants(usize),
}

/// Build the multiple-choice prompt for one question text
#[must_use]
pub fn format_prompt(question: &str, choices: &[String; 4]) -> String {
    let mut prompt = String::from(
        "Answer the following multiple choice question by selecting \
         only the letter (A, B, C, or D) of the correct answer.\n",
    );
    writeln!(prompt, "\nQuestion: {question}").ok();
    for (label, choice) in AnswerLabel::ALL.iter().zip(choices) {
        writeln!(prompt, "{label}. {choice}").ok();
    }
    prompt.push_str("\nAnswer (only the letter):");
    prompt
}

/// Map a raw model reply to a label.
///
/// The reply is trimmed and uppercased. An exact letter is taken as is,
/// otherwise a leading A-D letter is used, otherwise the answer is `A`.
#[must_use]
pub fn normalize_answer(raw: &str) -> AnswerLabel {
    let reply = raw.trim().to_uppercase();
    if let Ok(label) = reply.parse() {
        return label;
    }
    reply
        .chars()
        .next()
        .and_then(AnswerLabel::from_char)
        .unwrap_or(AnswerLabel::A)
}

/// Index of the first maximum score (0 for an empty slice)
#[must_use]
pub fn select_best_variant(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, score) in scores.iter().enumerate().skip(1) {
        if *score > scores[best] {
            best = i;
        }
    }
    best
}

/// Outcome of one model call against a ground truth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Judgment {
    pub predicted: AnswerLabel,
    pub is_correct: bool,
}

impl Judgment {
    /// 1.0 when correct, 0.0 otherwise
    #[must_use]
    pub const fn score(self) -> f64 {
        if self.is_correct {
            1.0
        } else {
            0.0
        }
    }
}

/// Receives progress notifications during a run
pub trait ProgressObserver {
    /// Called with the number of questions finished so far
    fn on_progress(&self, completed: usize, total: usize);
}

impl<F: Fn(usize, usize)> ProgressObserver for F {
    fn on_progress(&self, completed: usize, total: usize) {
        self(completed, total);
    }
}

/// Observer that logs progress through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, completed: usize, total: usize) {
        tracing::info!(completed, total, "Evaluated {completed} questions...");
    }
}

/// Runs questions through one model
pub struct Evaluator<'a, I> {
    invoker: I,
    observer: Option<&'a dyn ProgressObserver>,
}

impl<'a, I: ModelInvoker> Evaluator<'a, I> {
    /// Create an evaluator without progress reporting
    #[must_use]
    pub const fn new(invoker: I) -> Self {
        Self {
            invoker,
            observer: None,
        }
    }

    /// Attach a progress observer
    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Model identifier of the underlying invoker
    #[must_use]
    pub fn model(&self) -> &str {
        self.invoker.model()
    }

    /// Ask one question text and normalize the reply
    ///
    /// # Errors
    ///
    /// Returns `EvalError::Invoker` if the model cannot be reached.
    pub fn evaluate_single(
        &self,
        question: &str,
        choices: &[String; 4],
    ) -> Result<AnswerLabel, EvalError> {
        let prompt = format_prompt(question, choices);
        let raw = self
            .invoker
            .invoke(&prompt)
            .map_err(|source| EvalError::Invoker {
                model: self.invoker.model().to_string(),
                operation: "evaluate_question",
                source,
            })?;

        let label = normalize_answer(&raw);
        tracing::trace!(raw = %raw.trim(), predicted = %label, "Model answered");
        Ok(label)
    }

    /// Ask `text` with the choices of `question` and compare to its answer
    ///
    /// # Errors
    ///
    /// Returns `EvalError::Invoker` if the model cannot be reached.
    pub fn judge(&self, text: &str, question: &Question) -> Result<Judgment, EvalError> {
        let predicted = self.evaluate_single(text, &question.choices)?;
        Ok(Judgment {
            predicted,
            is_correct: predicted == question.answer,
        })
    }

    /// Score every variant of a question and pick the best one
    ///
    /// # Errors
    ///
    /// Returns `EvalError::Invoker` on the first failed model call.
    pub fn score_variants(
        &self,
        variants: &[String],
        question: &Question,
    ) -> Result<(Vec<f64>, usize), EvalError> {
        let scores = variants
            .iter()
            .map(|variant| self.judge(variant, question).map(Judgment::score))
            .collect::<Result<Vec<_>, _>>()?;
        let best = select_best_variant(&scores);
        Ok((scores, best))
    }

    /// Evaluate every question with its original text
    ///
    /// # Errors
    ///
    /// Returns the first `EvalError`; no report is produced in that case.
    pub fn run_baseline(&self, questions: &[Question]) -> Result<RunReport, EvalError> {
        tracing::info!(
            model = self.model(),
            questions = questions.len(),
            "Running baseline evaluation"
        );

        let mut results = Vec::with_capacity(questions.len());
        for question in questions {
            let judgment = self.judge(&question.text, question)?;
            results.push(QuestionResult::Baseline(BaselineResult {
                question: question.text.clone(),
                predicted: judgment.predicted,
                correct: question.answer,
                is_correct: judgment.is_correct,
            }));
            self.notify(results.len(), questions.len());
        }

        Ok(self.finish(results))
    }

    /// Evaluate every question with its best-scoring variant.
    ///
    /// `variants[i]` holds the paraphrases of `questions[i]`. After scoring,
    /// the chosen variant is asked again and that fresh answer is the one
    /// recorded, so each question costs `variants + 1` model calls.
    ///
    /// # Errors
    ///
    /// Returns `VariantCountMismatch` or `NoVariants` before any model call
    /// if the variant rows don't line up, otherwise the first invoker error.
    pub fn run_optimized(
        &self,
        questions: &[Question],
        variants: &[Vec<String>],
    ) -> Result<RunReport, EvalError> {
        if variants.len() != questions.len() {
            return Err(EvalError::VariantCountMismatch {
                questions: questions.len(),
                variants: variants.len(),
            });
        }
        if let Some(question) = questions
            .iter()
            .zip(variants)
            .find_map(|(q, row)| row.is_empty().then_some(q))
        {
            return Err(EvalError::NoVariants(question.id));
        }

        tracing::info!(
            model = self.model(),
            questions = questions.len(),
            "Running optimized evaluation"
        );

        let mut results = Vec::with_capacity(questions.len());
        for (question, row) in questions.iter().zip(variants) {
            let (scores, best_idx) = self.score_variants(row, question)?;
            let best_prompt = &row[best_idx];
            let judgment = self.judge(best_prompt, question)?;

            tracing::debug!(question = question.id, best_idx, ?scores, "Selected variant");
            results.push(QuestionResult::Optimized(OptimizedResult {
                original_question: question.text.clone(),
                best_prompt: best_prompt.clone(),
                best_idx,
                scores,
                predicted: judgment.predicted,
                correct: question.answer,
                is_correct: judgment.is_correct,
            }));
            self.notify(results.len(), questions.len());
        }

        Ok(self.finish(results))
    }

    fn notify(&self, completed: usize, total: usize) {
        if completed % PROGRESS_INTERVAL == 0 {
            if let Some(observer) = self.observer {
                observer.on_progress(completed, total);
            }
        }
    }

    fn finish(&self, results: Vec<QuestionResult>) -> RunReport {
        let report = RunReport::from_results(results);
        tracing::info!(
            model = self.model(),
            total = report.total,
            correct = report.correct,
            accuracy = report.accuracy,
            "Evaluation complete"
        );
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Replies with a fixed string and counts calls
    struct Fixed {
        reply: &'static str,
        calls: Cell<usize>,
    }

    impl Fixed {
        const fn new(reply: &'static str) -> Self {
            Self {
                reply,
                calls: Cell::new(0),
            }
        }
    }

    impl ModelInvoker for Fixed {
        fn model(&self) -> &str {
            "fixed"
        }

        fn invoke(&self, _prompt: &str) -> Result<String, InvokerError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.reply.to_string())
        }
    }

    /// Answers `B` only when the prompt contains a marker, `A` otherwise
    struct Marker {
        marker: &'static str,
        prompts: RefCell<Vec<String>>,
    }

    impl ModelInvoker for Marker {
        fn model(&self) -> &str {
            "marker"
        }

        fn invoke(&self, prompt: &str) -> Result<String, InvokerError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(if prompt.contains(self.marker) { "B" } else { "A" }.to_string())
        }
    }

    /// Fails on the n-th call (1-based)
    struct FailOn {
        n: usize,
        calls: Cell<usize>,
    }

    impl ModelInvoker for FailOn {
        fn model(&self) -> &str {
            "flaky"
        }

        fn invoke(&self, _prompt: &str) -> Result<String, InvokerError> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() == self.n {
                Err(InvokerError::Transport("connection refused".to_string()))
            } else {
                Ok("A".to_string())
            }
        }
    }

    fn question(id: usize, text: &str, answer: AnswerLabel) -> Question {
        Question {
            id,
            text: text.to_string(),
            choices: [
                "Femur".to_string(),
                "Tibia".to_string(),
                "Ulna".to_string(),
                "Rib".to_string(),
            ],
            answer,
        }
    }

    #[test]
    fn test_format_prompt_layout() {
        let q = question(0, "Longest bone?", AnswerLabel::A);
        let prompt = format_prompt(&q.text, &q.choices);
        assert_eq!(
            prompt,
            "Answer the following multiple choice question by selecting only the letter \
             (A, B, C, or D) of the correct answer.\n\nQuestion: Longest bone?\nA. Femur\n\
             B. Tibia\nC. Ulna\nD. Rib\n\nAnswer (only the letter):"
        );
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("b"), AnswerLabel::B);
        assert_eq!(normalize_answer("  C\n"), AnswerLabel::C);
        assert_eq!(normalize_answer("banana"), AnswerLabel::B);
        assert_eq!(normalize_answer("D. Rib"), AnswerLabel::D);
        assert_eq!(normalize_answer("xyz"), AnswerLabel::A);
        assert_eq!(normalize_answer(""), AnswerLabel::A);
        assert_eq!(normalize_answer("   "), AnswerLabel::A);
        assert_eq!(normalize_answer("The answer is C"), AnswerLabel::A);
    }

    #[test]
    fn test_select_best_variant_first_max() {
        assert_eq!(select_best_variant(&[0.0, 1.0, 1.0, 0.0]), 1);
        assert_eq!(select_best_variant(&[0.0, 0.0, 1.0]), 2);
        assert_eq!(select_best_variant(&[0.0, 0.0, 0.0]), 0);
        assert_eq!(select_best_variant(&[1.0]), 0);
        assert_eq!(select_best_variant(&[]), 0);
    }

    #[test]
    fn test_evaluate_single_uses_fallback() {
        let invoker = Fixed::new("xyz");
        let evaluator = Evaluator::new(&invoker);
        let q = question(0, "Q", AnswerLabel::C);
        assert_eq!(evaluator.evaluate_single(&q.text, &q.choices).unwrap(), AnswerLabel::A);
        assert_eq!(invoker.calls.get(), 1);
    }

    #[test]
    fn test_evaluate_single_propagates_invoker_failure() {
        let invoker = FailOn {
            n: 1,
            calls: Cell::new(0),
        };
        let evaluator = Evaluator::new(&invoker);
        let q = question(0, "Q", AnswerLabel::A);

        let err = evaluator.evaluate_single(&q.text, &q.choices).unwrap_err();
        assert!(matches!(err, EvalError::Invoker { .. }));
        let msg = err.to_string();
        assert!(msg.contains("flaky"));
        assert!(msg.contains("evaluate_question"));
    }

    #[test]
    fn test_run_baseline_half_correct() {
        let invoker = Fixed::new("A");
        let evaluator = Evaluator::new(&invoker);
        let questions = vec![
            question(0, "Q0", AnswerLabel::A),
            question(1, "Q1", AnswerLabel::C),
        ];

        let report = evaluator.run_baseline(&questions).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.correct, 1);
        assert!((report.accuracy - 50.0).abs() < f64::EPSILON);
        assert_eq!(invoker.calls.get(), 2);

        match &report.results[1] {
            QuestionResult::Baseline(r) => {
                assert_eq!(r.question, "Q1");
                assert_eq!(r.predicted, AnswerLabel::A);
                assert_eq!(r.correct, AnswerLabel::C);
                assert!(!r.is_correct);
            }
            QuestionResult::Optimized(_) => panic!("expected baseline result"),
        }
    }

    #[test]
    fn test_run_baseline_empty() {
        let invoker = Fixed::new("A");
        let report = Evaluator::new(&invoker).run_baseline(&[]).unwrap();
        assert_eq!(report.total, 0);
        assert!(report.accuracy.abs() < f64::EPSILON);
    }

    #[test]
    fn test_run_baseline_aborts_on_failure() {
        let invoker = FailOn {
            n: 2,
            calls: Cell::new(0),
        };
        let evaluator = Evaluator::new(&invoker);
        let questions: Vec<_> = (0..5).map(|i| question(i, "Q", AnswerLabel::A)).collect();

        assert!(evaluator.run_baseline(&questions).is_err());
        assert_eq!(invoker.calls.get(), 2);
    }

    #[test]
    fn test_run_optimized_selects_and_reasks() {
        let invoker = Marker {
            marker: "variant two",
            prompts: RefCell::new(Vec::new()),
        };
        let evaluator = Evaluator::new(&invoker);
        let questions = vec![question(0, "Original", AnswerLabel::B)];
        let variants = vec![vec![
            "variant zero".to_string(),
            "variant one".to_string(),
            "variant two".to_string(),
        ]];

        let report = evaluator.run_optimized(&questions, &variants).unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.correct, 1);

        match &report.results[0] {
            QuestionResult::Optimized(r) => {
                assert_eq!(r.scores, vec![0.0, 0.0, 1.0]);
                assert_eq!(r.best_idx, 2);
                assert_eq!(r.best_prompt, "variant two");
                assert_eq!(r.original_question, "Original");
                assert_eq!(r.predicted, AnswerLabel::B);
                assert!(r.is_correct);
            }
            QuestionResult::Baseline(_) => panic!("expected optimized result"),
        }

        // three scoring calls plus one fresh call with the chosen variant
        let prompts = invoker.prompts.borrow();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[3].contains("Question: variant two\n"));
    }

    #[test]
    fn test_run_optimized_tie_keeps_lowest_index() {
        let invoker = Fixed::new("C");
        let evaluator = Evaluator::new(&invoker);
        let questions = vec![question(0, "Q", AnswerLabel::C)];
        let variants = vec![vec!["v0".to_string(), "v1".to_string()]];

        let report = evaluator.run_optimized(&questions, &variants).unwrap();
        match &report.results[0] {
            QuestionResult::Optimized(r) => {
                assert_eq!(r.scores, vec![1.0, 1.0]);
                assert_eq!(r.best_idx, 0);
            }
            QuestionResult::Baseline(_) => panic!("expected optimized result"),
        }
        assert_eq!(invoker.calls.get(), 3);
    }

    #[test]
    fn test_run_optimized_guards() {
        let invoker = Fixed::new("A");
        let evaluator = Evaluator::new(&invoker);
        let questions = vec![question(0, "Q0", AnswerLabel::A), question(1, "Q1", AnswerLabel::A)];

        let err = evaluator
            .run_optimized(&questions, &[vec!["v".to_string()]])
            .unwrap_err();
        assert!(matches!(
            err,
            EvalError::VariantCountMismatch {
                questions: 2,
                variants: 1
            }
        ));

        let err = evaluator
            .run_optimized(&questions, &[vec!["v".to_string()], Vec::new()])
            .unwrap_err();
        assert!(matches!(err, EvalError::NoVariants(1)));
        assert_eq!(invoker.calls.get(), 0);
    }

    #[test]
    fn test_run_optimized_aborts_mid_variants() {
        let invoker = FailOn {
            n: 3,
            calls: Cell::new(0),
        };
        let evaluator = Evaluator::new(&invoker);
        let questions = vec![question(0, "Q", AnswerLabel::A)];
        let variants = vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]];

        let err = evaluator.run_optimized(&questions, &variants).unwrap_err();
        assert!(matches!(err, EvalError::Invoker { .. }));
        assert_eq!(invoker.calls.get(), 3);
    }

    #[test]
    fn test_progress_every_ten_questions() {
        let invoker = Fixed::new("A");
        let seen = RefCell::new(Vec::new());
        let observer = |completed: usize, total: usize| seen.borrow_mut().push((completed, total));
        let evaluator = Evaluator::new(&invoker).with_observer(&observer);
        let questions: Vec<_> = (0..25).map(|i| question(i, "Q", AnswerLabel::A)).collect();

        evaluator.run_baseline(&questions).unwrap();
        assert_eq!(*seen.borrow(), vec![(10, 25), (20, 25)]);
    }

    #[test]
    fn test_judgment_score() {
        let hit = Judgment {
            predicted: AnswerLabel::A,
            is_correct: true,
        };
        let miss = Judgment {
            is_correct: false,
            ..hit
        };
        assert!((hit.score() - 1.0).abs() < f64::EPSILON);
        assert!(miss.score().abs() < f64::EPSILON);
    }
}
