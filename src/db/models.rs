use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{GradingMethod, QuestionType, ResultStatus, SubmissionStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RubricItem {
    pub(crate) question_number: i32,
    #[serde(rename = "type", alias = "question_type")]
    pub(crate) question_type: QuestionType,
    #[serde(default)]
    pub(crate) question_text: Option<String>,
    /// Model answer for free text, the correct option letter for multiple choice.
    #[serde(default, alias = "correct_option", alias = "correct_answer")]
    pub(crate) expected_answer: String,
    #[serde(default)]
    pub(crate) keywords: Vec<String>,
    pub(crate) max_marks: f64,
    #[serde(default = "default_partial_marking", alias = "partial_marking")]
    pub(crate) partial_marking_allowed: bool,
    #[serde(default)]
    pub(crate) acceptable_variations: Vec<String>,
}

fn default_partial_marking() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct MarkingScheme {
    #[serde(default = "default_keyword_weight")]
    pub(crate) keyword_weight_percent: f64,
    #[serde(default = "default_semantic_threshold")]
    pub(crate) semantic_threshold: f64,
}

impl Default for MarkingScheme {
    fn default() -> Self {
        Self {
            keyword_weight_percent: default_keyword_weight(),
            semantic_threshold: default_semantic_threshold(),
        }
    }
}

fn default_keyword_weight() -> f64 {
    40.0
}

fn default_semantic_threshold() -> f64 {
    0.6
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AnswerKey {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) title: String,
    pub(crate) subject: Option<String>,
    pub(crate) total_marks: f64,
    pub(crate) items: Json<Vec<RubricItem>>,
    pub(crate) marking_scheme: Json<MarkingScheme>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) answer_key_id: String,
    pub(crate) owner_id: String,
    pub(crate) student_name: Option<String>,
    pub(crate) student_id: Option<String>,
    pub(crate) source_file_key: String,
    pub(crate) source_file_name: String,
    pub(crate) source_mime_type: String,
    pub(crate) source_file_size: i64,
    pub(crate) source_file_sha256: Option<String>,
    pub(crate) status: SubmissionStatus,
    pub(crate) extracted_text: Option<String>,
    pub(crate) obtained_marks: f64,
    pub(crate) total_marks: f64,
    pub(crate) percentage: f64,
    pub(crate) letter_grade: Option<String>,
    pub(crate) overall_feedback: Option<String>,
    pub(crate) overall_feedback_localized: Option<String>,
    pub(crate) processing_started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    #[sqlx(skip)]
    #[serde(default)]
    pub(crate) results: Vec<QuestionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionResult {
    pub(crate) question_number: i32,
    pub(crate) max_marks: f64,
    pub(crate) obtained_marks: f64,
    pub(crate) status: ResultStatus,
    pub(crate) graded_by: GradingMethod,
    pub(crate) student_answer: Option<String>,
    pub(crate) matched_keywords: Json<Vec<String>>,
    pub(crate) missing_keywords: Json<Vec<String>>,
    pub(crate) similarity_score: Option<f64>,
    pub(crate) confidence: Option<f64>,
    pub(crate) feedback: String,
    pub(crate) feedback_localized: Option<String>,
}
