use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "submissionstatus", rename_all = "lowercase")]
pub(crate) enum SubmissionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    #[serde(alias = "mcq")]
    MultipleChoice,
    #[serde(alias = "short_answer")]
    ShortText,
    #[serde(alias = "long_answer")]
    LongText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "resultstatus", rename_all = "lowercase")]
pub(crate) enum ResultStatus {
    Correct,
    Partial,
    Incorrect,
}

impl ResultStatus {
    /// Uniform classification of an obtained/max ratio.
    pub(crate) fn from_marks(obtained: f64, max: f64) -> Self {
        if max > 0.0 && obtained >= max * 0.9 {
            Self::Correct
        } else if obtained > 0.0 {
            Self::Partial
        } else {
            Self::Incorrect
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "gradingmethod", rename_all = "snake_case")]
pub(crate) enum GradingMethod {
    ExactMatch,
    Oracle,
    KeywordFallback,
    NoAnswer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_status_thresholds() {
        assert_eq!(ResultStatus::from_marks(4.5, 5.0), ResultStatus::Correct);
        assert_eq!(ResultStatus::from_marks(4.49, 5.0), ResultStatus::Partial);
        assert_eq!(ResultStatus::from_marks(0.01, 5.0), ResultStatus::Partial);
        assert_eq!(ResultStatus::from_marks(0.0, 5.0), ResultStatus::Incorrect);
    }

    #[test]
    fn question_type_accepts_legacy_names() {
        let parsed: QuestionType = serde_json::from_str("\"mcq\"").expect("mcq");
        assert_eq!(parsed, QuestionType::MultipleChoice);
        let parsed: QuestionType = serde_json::from_str("\"short_answer\"").expect("short");
        assert_eq!(parsed, QuestionType::ShortText);
        assert!(SubmissionStatus::Failed.is_terminal());
        assert!(!SubmissionStatus::Processing.is_terminal());
    }
}
