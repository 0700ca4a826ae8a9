use std::sync::OnceLock;

use regex::Regex;

pub(crate) const HEADER_LABEL: &str = "Header";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AnswerFragment {
    pub(crate) label: String,
    pub(crate) text: String,
}

impl AnswerFragment {
    /// First whole integer in the label, so "Question 10" is 10 and never 1.
    pub(crate) fn question_number(&self) -> Option<i32> {
        number_re().find(&self.label).and_then(|found| found.as_str().parse().ok())
    }
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?P<label>(?:q(?:uestion)?|ans(?:wer)?)\s*[.#]?\s*\d+\s*[.):\-]?|\d+[.)])(?:\s+|$)(?P<rest>.*)$",
        )
        .expect("label pattern compiles")
    })
}

fn compact_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?P<label>(?:q(?:uestion)?|ans(?:wer)?)\s*[.#]?\s*\d+[.):\-]?)(?P<rest>.*)$")
            .expect("label pattern compiles")
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("number pattern compiles"))
}

/// Drops leading `.`, `)`, `:` or `-` marks that stand alone, since a label
/// followed by them would absorb them on the next pass. "-5" is kept.
fn strip_label_punctuation(text: &str) -> &str {
    let mut text = text;
    loop {
        let mut chars = text.chars();
        match chars.next() {
            Some('.' | ')' | ':' | '-')
                if chars.as_str().is_empty() || chars.as_str().starts_with(char::is_whitespace) =>
            {
                text = chars.as_str().trim_start();
            }
            _ => return text,
        }
    }
}

fn split_label(line: &str) -> Option<(String, String)> {
    let captures = label_re().captures(line).or_else(|| compact_label_re().captures(line))?;
    let label = captures.name("label")?.as_str().trim().to_string();
    let rest = captures.name("rest").map(|rest| rest.as_str().trim()).unwrap_or_default();
    Some((label, strip_label_punctuation(rest).to_string()))
}

/// Splits raw extracted text into labeled answer fragments.
///
/// A line that starts with `Q<n>`, `Question <n>`, `Ans <n>`, `Answer <n>`,
/// `<n>.` or `<n>)` opens a new fragment; following lines are appended with a
/// single space until the next label. Text before the first label becomes a
/// `Header` fragment, dropped when empty.
pub(crate) fn segment(raw_text: &str) -> Vec<AnswerFragment> {
    let mut fragments = Vec::new();
    let mut current = AnswerFragment { label: HEADER_LABEL.to_string(), text: String::new() };

    for line in raw_text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some((label, rest)) = split_label(line) {
            let finished = std::mem::replace(&mut current, AnswerFragment { label, text: rest });
            if finished.label != HEADER_LABEL || !finished.text.is_empty() {
                fragments.push(finished);
            }
        } else if current.text.is_empty() {
            current.text = if current.label == HEADER_LABEL {
                line.to_string()
            } else {
                strip_label_punctuation(line).to_string()
            };
        } else {
            current.text.push(' ');
            current.text.push_str(line);
        }
    }

    if current.label != HEADER_LABEL || !current.text.is_empty() {
        fragments.push(current);
    }

    fragments
}

/// Text of the first fragment labeled with `question_number`, or "" when absent.
pub(crate) fn answer_for<'a>(fragments: &'a [AnswerFragment], question_number: i32) -> &'a str {
    fragments
        .iter()
        .find(|fragment| fragment.question_number() == Some(question_number))
        .map(|fragment| fragment.text.as_str())
        .unwrap_or("")
}
