use std::fmt;

use crate::db::models::QuestionResult;
use crate::db::types::ResultStatus;
use crate::services::feedback::{self, FeedbackLanguage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum LetterGrade {
    F,
    D,
    C,
    B,
    BPlus,
    A,
    APlus,
}

impl LetterGrade {
    /// Inclusive lower bounds: 90 A+, 80 A, 70 B+, 60 B, 50 C, 40 D.
    pub(crate) fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Self::APlus
        } else if percentage >= 80.0 {
            Self::A
        } else if percentage >= 70.0 {
            Self::BPlus
        } else if percentage >= 60.0 {
            Self::B
        } else if percentage >= 50.0 {
            Self::C
        } else if percentage >= 40.0 {
            Self::D
        } else {
            Self::F
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradeSummary {
    pub(crate) obtained_marks: f64,
    pub(crate) total_marks: f64,
    pub(crate) percentage: f64,
    pub(crate) letter_grade: LetterGrade,
    pub(crate) correct_count: usize,
    pub(crate) overall_feedback: String,
    pub(crate) overall_feedback_localized: Option<String>,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `total_marks` comes from the answer key, never from the results, so a
/// missing answer cannot shrink the denominator.
pub(crate) fn aggregate(
    results: &[QuestionResult],
    total_marks: f64,
    language: FeedbackLanguage,
) -> GradeSummary {
    let summed: f64 = results.iter().map(|result| result.obtained_marks).sum();
    let obtained_marks = round2(summed).min(total_marks.max(0.0));

    // Bands use the exact ratio; only the stored percentage is rounded.
    let raw_percentage =
        if total_marks > 0.0 { obtained_marks / total_marks * 100.0 } else { 0.0 };
    let letter_grade = LetterGrade::from_percentage(raw_percentage);
    let percentage = round2(raw_percentage);

    let correct_count =
        results.iter().filter(|result| result.status == ResultStatus::Correct).count();
    let overall = feedback::overall(language, correct_count, results.len(), raw_percentage);

    GradeSummary {
        obtained_marks,
        total_marks,
        percentage,
        letter_grade,
        correct_count,
        overall_feedback: overall.text,
        overall_feedback_localized: overall.localized,
    }
}
