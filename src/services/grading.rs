use std::sync::Arc;
use std::time::Duration;

use sqlx::types::Json;

use crate::core::metrics;
use crate::db::models::{MarkingScheme, QuestionResult, RubricItem};
use crate::db::types::{GradingMethod, QuestionType, ResultStatus};
use crate::services::ai_grading::{GradingOracle, OracleRequest, OracleVerdict};
use crate::services::aggregation::round2;
use crate::services::feedback::{self, Feedback, FeedbackLanguage};

const ANSWER_SNAPSHOT_CHARS: usize = 500;
const STRICT_KEYWORD_RATIO: f64 = 0.7;
const NEUTRAL_KEYWORD_RATIO: f64 = 0.5;
const DEFAULT_ORACLE_CONFIDENCE: f64 = 0.5;

/// Scores one answer fragment against one rubric item. Never fails: oracle
/// problems fall back to keyword scoring.
#[derive(Clone)]
pub(crate) struct Grader {
    oracle: Arc<dyn GradingOracle>,
    oracle_timeout: Duration,
    language: FeedbackLanguage,
}

impl Grader {
    pub(crate) fn new(
        oracle: Arc<dyn GradingOracle>,
        oracle_timeout: Duration,
        language: FeedbackLanguage,
    ) -> Self {
        Self { oracle, oracle_timeout, language }
    }

    pub(crate) fn language(&self) -> FeedbackLanguage {
        self.language
    }

    pub(crate) async fn grade(
        &self,
        item: &RubricItem,
        answer: &str,
        scheme: &MarkingScheme,
    ) -> QuestionResult {
        match item.question_type {
            QuestionType::MultipleChoice => grade_choice(item, answer, self.language),
            QuestionType::ShortText | QuestionType::LongText => {
                self.grade_text(item, answer, scheme).await
            }
        }
    }

    async fn grade_text(
        &self,
        item: &RubricItem,
        answer: &str,
        scheme: &MarkingScheme,
    ) -> QuestionResult {
        let answer = answer.trim();
        if answer.is_empty() {
            return QuestionResult {
                similarity_score: Some(0.0),
                missing_keywords: Json(item.keywords.clone()),
                ..no_answer_result(item, self.language)
            };
        }

        let (matched, missing) = match_keywords(answer, &item.keywords);
        let ratio = keyword_ratio(matched.len(), item.keywords.len());

        let request = OracleRequest {
            question: item.question_text.clone().unwrap_or_default(),
            expected_answer: item.expected_answer.clone(),
            student_answer: answer.to_string(),
            max_marks: item.max_marks,
            keywords: item.keywords.clone(),
            acceptable_variations: item.acceptable_variations.clone(),
            partial_marking: item.partial_marking_allowed,
            keyword_weight_percent: scheme.keyword_weight_percent,
            semantic_threshold: scheme.semantic_threshold,
            language: self.language.code().to_string(),
        };

        let verdict = match tokio::time::timeout(self.oracle_timeout, self.oracle.grade(&request))
            .await
        {
            Ok(Ok(verdict)) => Some(verdict),
            Ok(Err(err)) => {
                tracing::warn!(
                    question_number = item.question_number,
                    error = %err,
                    "Oracle grading failed; using keyword fallback"
                );
                None
            }
            Err(_) => {
                metrics::record_oracle_request("timeout");
                tracing::warn!(
                    question_number = item.question_number,
                    timeout_seconds = self.oracle_timeout.as_secs_f64(),
                    "Oracle grading timed out; using keyword fallback"
                );
                None
            }
        };

        let base = QuestionResult {
            question_number: item.question_number,
            max_marks: item.max_marks,
            obtained_marks: 0.0,
            status: ResultStatus::Incorrect,
            graded_by: GradingMethod::Oracle,
            student_answer: Some(snapshot(answer)),
            matched_keywords: Json(matched.clone()),
            missing_keywords: Json(missing),
            similarity_score: None,
            confidence: None,
            feedback: String::new(),
            feedback_localized: None,
        };

        match verdict {
            Some(verdict) => self.oracle_result(base, verdict),
            None => {
                metrics::record_grading_fallback();
                let obtained = round2(fallback_marks(item.max_marks, ratio, item.partial_marking_allowed))
                    .min(item.max_marks);
                let Feedback { text, localized } =
                    feedback::keyword_fallback(self.language, matched.len(), item.keywords.len());
                QuestionResult {
                    obtained_marks: obtained,
                    status: ResultStatus::from_marks(obtained, item.max_marks),
                    graded_by: GradingMethod::KeywordFallback,
                    similarity_score: Some(round2(ratio)),
                    confidence: Some(round2(ratio * 0.5)),
                    feedback: text,
                    feedback_localized: localized,
                    ..base
                }
            }
        }
    }

    fn oracle_result(&self, base: QuestionResult, verdict: OracleVerdict) -> QuestionResult {
        let obtained = round2(verdict.marks).clamp(0.0, base.max_marks);
        let confidence = verdict
            .confidence
            .filter(|value| value.is_finite())
            .unwrap_or(DEFAULT_ORACLE_CONFIDENCE)
            .clamp(0.0, 1.0);
        let localized = match self.language {
            FeedbackLanguage::English => None,
            FeedbackLanguage::Gujarati => verdict.feedback_localized,
        };

        QuestionResult {
            obtained_marks: obtained,
            status: ResultStatus::from_marks(obtained, base.max_marks),
            graded_by: GradingMethod::Oracle,
            similarity_score: Some(round2(confidence)),
            confidence: Some(round2(confidence)),
            feedback: verdict.feedback,
            feedback_localized: localized,
            ..base
        }
    }
}

/// Binary: first character of each side, uppercased, must agree.
fn grade_choice(item: &RubricItem, answer: &str, language: FeedbackLanguage) -> QuestionResult {
    let Some(chosen) = leading_option(answer) else {
        return no_answer_result(item, language);
    };
    let correct = leading_option(&item.expected_answer).unwrap_or_default();

    let is_correct = chosen == correct;
    let obtained = if is_correct { item.max_marks } else { 0.0 };
    let Feedback { text, localized } = if is_correct {
        feedback::choice_correct(language)
    } else {
        feedback::choice_incorrect(language, correct)
    };

    QuestionResult {
        question_number: item.question_number,
        max_marks: item.max_marks,
        obtained_marks: obtained,
        status: if is_correct { ResultStatus::Correct } else { ResultStatus::Incorrect },
        graded_by: GradingMethod::ExactMatch,
        student_answer: Some(snapshot(answer.trim())),
        matched_keywords: Json(vec![]),
        missing_keywords: Json(vec![]),
        similarity_score: None,
        confidence: Some(1.0),
        feedback: text,
        feedback_localized: localized,
    }
}

fn no_answer_result(item: &RubricItem, language: FeedbackLanguage) -> QuestionResult {
    let Feedback { text, localized } = feedback::no_answer(language);
    QuestionResult {
        question_number: item.question_number,
        max_marks: item.max_marks,
        obtained_marks: 0.0,
        status: ResultStatus::Incorrect,
        graded_by: GradingMethod::NoAnswer,
        student_answer: None,
        matched_keywords: Json(vec![]),
        missing_keywords: Json(vec![]),
        similarity_score: None,
        confidence: None,
        feedback: text,
        feedback_localized: localized,
    }
}

fn leading_option(value: &str) -> Option<char> {
    value.trim().chars().next().and_then(|c| c.to_uppercase().next())
}

fn snapshot(answer: &str) -> String {
    answer.chars().take(ANSWER_SNAPSHOT_CHARS).collect()
}

/// Case-insensitive substring match, preserving rubric order.
pub(crate) fn match_keywords(answer: &str, keywords: &[String]) -> (Vec<String>, Vec<String>) {
    let haystack = answer.to_lowercase();
    keywords.iter().cloned().partition(|keyword| haystack.contains(&keyword.to_lowercase()))
}

pub(crate) fn keyword_ratio(matched: usize, total: usize) -> f64 {
    if total == 0 {
        NEUTRAL_KEYWORD_RATIO
    } else {
        matched as f64 / total as f64
    }
}

pub(crate) fn fallback_marks(max_marks: f64, ratio: f64, partial_marking_allowed: bool) -> f64 {
    if partial_marking_allowed {
        max_marks * ratio
    } else if ratio >= STRICT_KEYWORD_RATIO {
        max_marks
    } else {
        0.0
    }
}
