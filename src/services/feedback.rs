//! Deterministic feedback templates. English is always produced; the
//! configured language adds a parallel localized string.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeedbackLanguage {
    English,
    Gujarati,
}

impl FeedbackLanguage {
    pub(crate) fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "gu" | "gujarati" => Self::Gujarati,
            _ => Self::English,
        }
    }

    pub(crate) fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Gujarati => "gu",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Feedback {
    pub(crate) text: String,
    pub(crate) localized: Option<String>,
}

impl Feedback {
    fn new(language: FeedbackLanguage, english: String, gujarati: impl FnOnce() -> String) -> Self {
        let localized = match language {
            FeedbackLanguage::English => None,
            FeedbackLanguage::Gujarati => Some(gujarati()),
        };
        Self { text: english, localized }
    }
}

pub(crate) fn no_answer(language: FeedbackLanguage) -> Feedback {
    Feedback::new(language, "No answer provided.".to_string(), || {
        "કોઈ જવાબ આપવામાં આવ્યો નથી.".to_string()
    })
}

pub(crate) fn choice_correct(language: FeedbackLanguage) -> Feedback {
    Feedback::new(language, "Correct answer.".to_string(), || "સાચો જવાબ.".to_string())
}

pub(crate) fn choice_incorrect(language: FeedbackLanguage, correct_option: char) -> Feedback {
    Feedback::new(
        language,
        format!("Incorrect. The correct answer is {correct_option}."),
        || format!("ખોટો જવાબ. સાચો જવાબ {correct_option} છે."),
    )
}

pub(crate) fn keyword_fallback(language: FeedbackLanguage, matched: usize, total: usize) -> Feedback {
    Feedback::new(language, format!("Matched {matched}/{total} keywords."), || {
        format!("{matched}/{total} મુખ્ય શબ્દો મળ્યા.")
    })
}

pub(crate) fn overall(
    language: FeedbackLanguage,
    correct: usize,
    total: usize,
    percentage: f64,
) -> Feedback {
    let english = if percentage >= 80.0 {
        format!(
            "Excellent performance! You answered {correct}/{total} questions correctly. Strong understanding of the concepts."
        )
    } else if percentage >= 60.0 {
        format!(
            "Good work! You scored correctly on {correct}/{total} questions. Review the missed concepts for improvement."
        )
    } else if percentage >= 40.0 {
        format!(
            "Satisfactory performance with {correct}/{total} correct. Focus on understanding core concepts better."
        )
    } else {
        format!(
            "Needs improvement. Only {correct}/{total} correct. Please review the material and practice more."
        )
    };

    Feedback::new(language, english, || {
        if percentage >= 80.0 {
            format!("ઉત્કૃષ્ટ પ્રદર્શન! તમે {correct}/{total} પ્રશ્નોના સાચા જવાબ આપ્યા. ખ્યાલોની મજબૂત સમજ.")
        } else if percentage >= 60.0 {
            format!("સારું કામ! તમે {correct}/{total} પ્રશ્નો સાચા ઉકેલ્યા. સુધારણા માટે ચૂકી ગયેલા ખ્યાલોની સમીક્ષા કરો.")
        } else if percentage >= 40.0 {
            format!("{correct}/{total} સાચા સાથે સંતોષકારક પ્રદર્શન. મૂળભૂત ખ્યાલોને વધુ સારી રીતે સમજવા પર ધ્યાન આપો.")
        } else {
            format!("સુધારણાની જરૂર છે. માત્ર {correct}/{total} સાચા. કૃપા કરીને સામગ્રીની સમીક્ષા કરો અને વધુ પ્રેક્ટિસ કરો.")
        }
    })
}
