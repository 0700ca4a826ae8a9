use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{AnswerKey, MarkingScheme, RubricItem};
use crate::services::rubric::AnswerKeyDraft;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerKeyCreate {
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: String,
    #[serde(default)]
    #[validate(length(max = 255, message = "subject must be at most 255 characters"))]
    pub(crate) subject: Option<String>,
    #[serde(alias = "totalMarks")]
    #[validate(range(min = 0.0, message = "total_marks must be non-negative"))]
    pub(crate) total_marks: f64,
    #[serde(alias = "questions")]
    #[validate(length(min = 1, message = "at least one question is required"))]
    pub(crate) items: Vec<RubricItem>,
    #[serde(default, alias = "markingScheme")]
    pub(crate) marking_scheme: Option<MarkingScheme>,
}

impl AnswerKeyCreate {
    pub(crate) fn into_draft(self) -> AnswerKeyDraft {
        AnswerKeyDraft {
            title: self.title,
            subject: self.subject.filter(|subject| !subject.trim().is_empty()),
            total_marks: self.total_marks,
            items: self.items,
            marking_scheme: self.marking_scheme.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerKeyListQuery {
    #[serde(default)]
    pub(crate) search: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerKeyResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject: Option<String>,
    pub(crate) total_marks: f64,
    pub(crate) question_count: usize,
    pub(crate) items: Vec<RubricItem>,
    pub(crate) marking_scheme: MarkingScheme,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<AnswerKey> for AnswerKeyResponse {
    fn from(key: AnswerKey) -> Self {
        Self {
            id: key.id,
            title: key.title,
            subject: key.subject,
            total_marks: key.total_marks,
            question_count: key.items.0.len(),
            items: key.items.0,
            marking_scheme: key.marking_scheme.0,
            created_at: format_primitive(key.created_at),
            updated_at: format_primitive(key.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::QuestionType;
    use serde_json::json;

    #[test]
    fn create_payload_accepts_legacy_field_names() {
        let payload: AnswerKeyCreate = serde_json::from_value(json!({
            "title": "Science",
            "totalMarks": 3,
            "questions": [
                {"question_number": 1, "question_type": "mcq", "correct_option": "B", "max_marks": 1},
                {"question_number": 2, "type": "long_answer", "expected_answer": "Osmosis",
                 "keywords": ["water"], "max_marks": 2, "partial_marking": false}
            ]
        }))
        .expect("payload");

        assert!(payload.validate().is_ok());
        let draft = payload.into_draft();
        assert_eq!(draft.items[0].question_type, QuestionType::MultipleChoice);
        assert_eq!(draft.items[0].expected_answer, "B");
        assert!(!draft.items[1].partial_marking_allowed);
        assert_eq!(draft.marking_scheme, MarkingScheme::default());
        assert_eq!(draft.subject, None);
    }

    #[test]
    fn create_payload_requires_title_and_items() {
        let payload: AnswerKeyCreate =
            serde_json::from_value(json!({"title": "", "total_marks": 0, "items": []}))
                .expect("payload");
        let errors = payload.validate().expect_err("invalid");
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("items"));
    }
}
