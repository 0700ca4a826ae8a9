use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::{QuestionResult, Submission};
use crate::db::types::SubmissionStatus;

#[derive(Debug, Deserialize)]
pub(crate) struct SubmissionListQuery {
    #[serde(default)]
    pub(crate) status: Option<SubmissionStatus>,
}

/// Listing shape; per-question results only appear on the detail view.
#[derive(Debug, Serialize)]
pub(crate) struct SubmissionSummary {
    pub(crate) id: String,
    pub(crate) answer_key_id: String,
    pub(crate) student_name: Option<String>,
    pub(crate) student_id: Option<String>,
    pub(crate) status: SubmissionStatus,
    pub(crate) obtained_marks: f64,
    pub(crate) total_marks: f64,
    pub(crate) percentage: f64,
    pub(crate) letter_grade: Option<String>,
    pub(crate) created_at: String,
    pub(crate) completed_at: Option<String>,
}

impl From<Submission> for SubmissionSummary {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            answer_key_id: submission.answer_key_id,
            student_name: submission.student_name,
            student_id: submission.student_id,
            status: submission.status,
            obtained_marks: submission.obtained_marks,
            total_marks: submission.total_marks,
            percentage: submission.percentage,
            letter_grade: submission.letter_grade,
            created_at: format_primitive(submission.created_at),
            completed_at: submission.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SourceFileResponse {
    pub(crate) name: String,
    pub(crate) mime_type: String,
    pub(crate) size: i64,
    pub(crate) sha256: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) answer_key_id: String,
    pub(crate) student_name: Option<String>,
    pub(crate) student_id: Option<String>,
    pub(crate) status: SubmissionStatus,
    pub(crate) source_file: SourceFileResponse,
    pub(crate) extracted_text: Option<String>,
    pub(crate) obtained_marks: f64,
    pub(crate) total_marks: f64,
    pub(crate) percentage: f64,
    pub(crate) letter_grade: Option<String>,
    pub(crate) overall_feedback: Option<String>,
    pub(crate) overall_feedback_localized: Option<String>,
    pub(crate) failure_reason: Option<String>,
    pub(crate) results: Vec<QuestionResult>,
    pub(crate) created_at: String,
    pub(crate) processing_started_at: Option<String>,
    pub(crate) completed_at: Option<String>,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        let failed = submission.status == SubmissionStatus::Failed;
        let (overall_feedback, failure_reason) = if failed {
            (None, submission.overall_feedback)
        } else {
            (submission.overall_feedback, None)
        };

        Self {
            id: submission.id,
            answer_key_id: submission.answer_key_id,
            student_name: submission.student_name,
            student_id: submission.student_id,
            status: submission.status,
            source_file: SourceFileResponse {
                name: submission.source_file_name,
                mime_type: submission.source_mime_type,
                size: submission.source_file_size,
                sha256: submission.source_file_sha256,
            },
            extracted_text: submission.extracted_text,
            obtained_marks: submission.obtained_marks,
            total_marks: submission.total_marks,
            percentage: submission.percentage,
            letter_grade: if failed { None } else { submission.letter_grade },
            overall_feedback,
            overall_feedback_localized: submission.overall_feedback_localized,
            failure_reason,
            results: if failed { Vec::new() } else { submission.results },
            created_at: format_primitive(submission.created_at),
            processing_started_at: submission.processing_started_at.map(format_primitive),
            completed_at: submission.completed_at.map(format_primitive),
        }
    }
}
