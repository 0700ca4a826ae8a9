use time::PrimitiveDateTime;

use crate::db::types::SubmissionStatus;

pub(crate) const COLUMNS: &str = "\
    id, answer_key_id, owner_id, student_name, student_id, source_file_key, source_file_name, \
    source_mime_type, source_file_size, source_file_sha256, status, extracted_text, \
    obtained_marks, total_marks, percentage, letter_grade, overall_feedback, \
    overall_feedback_localized, processing_started_at, completed_at, created_at, updated_at";

#[derive(Debug, Clone, Default)]
pub(crate) struct SubmissionFilter {
    pub(crate) owner_id: Option<String>,
    pub(crate) answer_key_id: Option<String>,
    pub(crate) status: Option<SubmissionStatus>,
}

pub(crate) struct CompletionUpdate<'a> {
    pub(crate) obtained_marks: f64,
    pub(crate) total_marks: f64,
    pub(crate) percentage: f64,
    pub(crate) letter_grade: &'a str,
    pub(crate) overall_feedback: &'a str,
    pub(crate) overall_feedback_localized: Option<&'a str>,
    pub(crate) completed_at: PrimitiveDateTime,
}
