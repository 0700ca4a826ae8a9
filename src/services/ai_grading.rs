use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::core::metrics;

const GRADING_SYSTEM_PROMPT: &str = "You are an expert, strict teacher grading an exam paper. \
Evaluate the student's answer against the expected answer and the keywords. \
Give constructive feedback explaining where marks were gained or lost. \
Respond with a single JSON object and nothing else.";

/// Backoff doubles per attempt up to 2^6 times the base delay.
const MAX_BACKOFF_EXPONENT: u32 = 6;
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub(crate) struct OracleRequest {
    pub(crate) question: String,
    pub(crate) expected_answer: String,
    pub(crate) student_answer: String,
    pub(crate) max_marks: f64,
    pub(crate) keywords: Vec<String>,
    pub(crate) acceptable_variations: Vec<String>,
    pub(crate) partial_marking: bool,
    pub(crate) keyword_weight_percent: f64,
    pub(crate) semantic_threshold: f64,
    pub(crate) language: String,
}

/// Raw oracle output; the grader clamps and rounds it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OracleVerdict {
    pub(crate) marks: f64,
    pub(crate) feedback: String,
    pub(crate) feedback_localized: Option<String>,
    pub(crate) confidence: Option<f64>,
}

#[async_trait]
pub(crate) trait GradingOracle: Send + Sync {
    async fn grade(&self, request: &OracleRequest) -> Result<OracleVerdict>;
}

/// Used when no provider is configured; every free-text item falls back to keywords.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DisabledOracle;

#[async_trait]
impl GradingOracle for DisabledOracle {
    async fn grade(&self, _request: &OracleRequest) -> Result<OracleVerdict> {
        anyhow::bail!("grading oracle is not configured")
    }
}

pub(crate) fn oracle_from_settings(settings: &Settings) -> Result<Arc<dyn GradingOracle>> {
    if !settings.ai().is_configured() {
        tracing::warn!("OPENAI_API_KEY not set; free-text answers use keyword grading only");
        return Ok(Arc::new(DisabledOracle));
    }

    Ok(Arc::new(OpenAiGradingOracle::from_settings(settings)?))
}

#[derive(Debug, Clone)]
pub(crate) struct OpenAiGradingOracle {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    max_retries: u32,
    backoff: Duration,
    attempt_timeout: Duration,
}

impl OpenAiGradingOracle {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let budget = Duration::from_secs(settings.grading().oracle_timeout_seconds);
        let max_retries = settings.ai().ai_max_retries;
        let backoff = Duration::from_secs(1);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
            temperature: settings.ai().ai_temperature,
            max_retries,
            backoff,
            attempt_timeout: attempt_timeout(budget, max_retries, backoff),
        })
    }

    #[cfg(test)]
    fn for_tests(base_url: &str, max_retries: u32) -> Self {
        Self::for_tests_with_timeout(base_url, max_retries, Duration::from_secs(5))
    }

    #[cfg(test)]
    fn for_tests_with_timeout(base_url: &str, max_retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key: "test-key".to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: "test-model".to_string(),
            max_tokens: 256,
            temperature: 0.0,
            max_retries,
            backoff: Duration::from_millis(5),
            attempt_timeout,
        }
    }

    async fn complete(&self, payload: &Value) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .timeout(self.attempt_timeout)
                .json(payload)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let body: Value = resp.json().await.unwrap_or(Value::Null);
                    if status.is_success() {
                        return Ok(body);
                    }
                    last_error = Some(anyhow::anyhow!("OpenAI API error {status}: {body}"));
                }
                Err(err) => {
                    last_error = Some(anyhow::anyhow!(err).context("Failed to call OpenAI API"));
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(retry_delay(self.backoff, attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("OpenAI API request was not attempted")))
    }
}

fn retry_delay(backoff: Duration, attempt: u32) -> Duration {
    backoff.saturating_mul(1 << attempt.min(MAX_BACKOFF_EXPONENT))
}

/// Splits the grading budget across every attempt after the backoff sleeps,
/// so a timed-out attempt still leaves room for the retries.
fn attempt_timeout(budget: Duration, max_retries: u32, backoff: Duration) -> Duration {
    let sleeping = (0..max_retries)
        .map(|attempt| retry_delay(backoff, attempt))
        .fold(Duration::ZERO, Duration::saturating_add);
    let attempts = max_retries.saturating_add(1);
    (budget.saturating_sub(sleeping) / attempts).max(MIN_ATTEMPT_TIMEOUT)
}

#[async_trait]
impl GradingOracle for OpenAiGradingOracle {
    async fn grade(&self, request: &OracleRequest) -> Result<OracleVerdict> {
        let timer = Instant::now();
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": GRADING_SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(request)}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        });

        let body = match self.complete(&payload).await {
            Ok(body) => body,
            Err(err) => {
                metrics::record_oracle_request("error");
                return Err(err);
            }
        };

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|value| value.as_str())
            .unwrap_or_default();

        match parse_verdict(content) {
            Ok(verdict) => {
                metrics::record_oracle_request("success");
                tracing::debug!(
                    duration_seconds = timer.elapsed().as_secs_f64(),
                    marks = verdict.marks,
                    "Oracle verdict received"
                );
                Ok(verdict)
            }
            Err(err) => {
                metrics::record_oracle_request("unparsable");
                Err(err)
            }
        }
    }
}

fn build_user_prompt(request: &OracleRequest) -> String {
    let mut prompt = format!(
        "Question: {}\nExpected answer: {}\nKeywords to look for: {}\nMax marks: {}\n\
         Partial marking allowed: {}\nKeyword weight: {}%\nSemantic match threshold: {}\n",
        if request.question.is_empty() { "Evaluate this answer" } else { request.question.as_str() },
        request.expected_answer,
        request.keywords.join(", "),
        request.max_marks,
        request.partial_marking,
        request.keyword_weight_percent,
        request.semantic_threshold,
    );

    if !request.acceptable_variations.is_empty() {
        prompt.push_str(&format!(
            "Also acceptable: {}\n",
            request.acceptable_variations.join("; ")
        ));
    }

    prompt.push_str(&format!("\nStudent's answer: \"{}\"\n\n", request.student_answer));
    prompt.push_str(language_instruction(&request.language));
    prompt.push_str(
        "\n\nReturn JSON: {\"marks_obtained\": <number>, \"confidence_score\": <0..1>, \
         \"feedback\": \"...\", \"feedback_localized\": \"...\" | null}",
    );
    prompt
}

fn language_instruction(language: &str) -> &'static str {
    match language {
        "gu" => "Write `feedback` in English and put a Gujarati translation in `feedback_localized`.",
        _ => "Write `feedback` in English and set `feedback_localized` to null.",
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if let Some(rest) = trimmed.split_once("```json").map(|(_, rest)| rest) {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    if let Some(rest) = trimmed.split_once("```").map(|(_, rest)| rest) {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    trimmed
}

fn parse_verdict(content: &str) -> Result<OracleVerdict> {
    let data: Value =
        serde_json::from_str(strip_code_fence(content)).context("Failed to parse oracle JSON")?;

    let marks = match data.get("marks_obtained") {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|marks| marks.is_finite())
    .context("Oracle response has no numeric marks_obtained")?;

    let confidence = data.get("confidence_score").and_then(Value::as_f64);
    let feedback =
        data.get("feedback").and_then(Value::as_str).unwrap_or_default().trim().to_string();
    let feedback_localized = data
        .get("feedback_localized")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    Ok(OracleVerdict { marks, feedback, feedback_localized, confidence })
}
