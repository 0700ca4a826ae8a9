use std::collections::HashSet;

use thiserror::Error;

use crate::db::models::{MarkingScheme, RubricItem};
use crate::db::types::QuestionType;

const MARKS_EPSILON: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub(crate) enum RubricError {
    #[error("answer key must contain at least one question")]
    Empty,
    #[error("question number {0} must be positive")]
    InvalidQuestionNumber(i32),
    #[error("question number {0} appears more than once")]
    DuplicateQuestion(i32),
    #[error("question {question_number} must have max_marks greater than zero")]
    NonPositiveMarks { question_number: i32 },
    #[error("question {question_number} is multiple choice but has no correct option")]
    MissingCorrectOption { question_number: i32 },
    #[error("question marks sum to {items_sum} but total_marks is {total_marks}")]
    TotalMismatch { items_sum: f64, total_marks: f64 },
    #[error("keyword_weight_percent must be within 0..=100, got {0}")]
    KeywordWeightOutOfRange(f64),
    #[error("semantic_threshold must be within 0..=1, got {0}")]
    SemanticThresholdOutOfRange(f64),
}

/// Unvalidated answer key as submitted by its author.
#[derive(Debug, Clone)]
pub(crate) struct AnswerKeyDraft {
    pub(crate) title: String,
    pub(crate) subject: Option<String>,
    pub(crate) total_marks: f64,
    pub(crate) items: Vec<RubricItem>,
    pub(crate) marking_scheme: MarkingScheme,
}

/// Checks every structural invariant and returns the normalized draft:
/// items ordered by question number, keywords trimmed and deduplicated
/// case-insensitively in their original order.
pub(crate) fn validate(mut draft: AnswerKeyDraft) -> Result<AnswerKeyDraft, RubricError> {
    if draft.items.is_empty() {
        return Err(RubricError::Empty);
    }

    let scheme = draft.marking_scheme;
    if !(0.0..=100.0).contains(&scheme.keyword_weight_percent) {
        return Err(RubricError::KeywordWeightOutOfRange(scheme.keyword_weight_percent));
    }
    if !(0.0..=1.0).contains(&scheme.semantic_threshold) {
        return Err(RubricError::SemanticThresholdOutOfRange(scheme.semantic_threshold));
    }

    let mut seen = HashSet::new();
    for item in &mut draft.items {
        if item.question_number <= 0 {
            return Err(RubricError::InvalidQuestionNumber(item.question_number));
        }
        if !seen.insert(item.question_number) {
            return Err(RubricError::DuplicateQuestion(item.question_number));
        }
        if !(item.max_marks.is_finite() && item.max_marks > 0.0) {
            return Err(RubricError::NonPositiveMarks { question_number: item.question_number });
        }

        item.expected_answer = item.expected_answer.trim().to_string();
        if item.question_type == QuestionType::MultipleChoice && item.expected_answer.is_empty() {
            return Err(RubricError::MissingCorrectOption { question_number: item.question_number });
        }

        item.keywords = dedup_keywords(&item.keywords);
        item.acceptable_variations = item
            .acceptable_variations
            .iter()
            .map(|variation| variation.trim().to_string())
            .filter(|variation| !variation.is_empty())
            .collect();
    }

    let items_sum: f64 = draft.items.iter().map(|item| item.max_marks).sum();
    if (items_sum - draft.total_marks).abs() > MARKS_EPSILON {
        return Err(RubricError::TotalMismatch { items_sum, total_marks: draft.total_marks });
    }

    draft.items.sort_by_key(|item| item.question_number);
    draft.title = draft.title.trim().to_string();
    draft.subject = draft.subject.map(|subject| subject.trim().to_string()).filter(|s| !s.is_empty());
    Ok(draft)
}

fn dedup_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|keyword| keyword.trim())
        .filter(|keyword| !keyword.is_empty())
        .filter(|keyword| seen.insert(keyword.to_lowercase()))
        .map(str::to_string)
        .collect()
}
