use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::api;
use crate::core::{config::Settings, security, state::AppState, time::primitive_now_utc};
use crate::db::models::{AnswerKey, QuestionResult, Submission};
use crate::db::types::SubmissionStatus;
use crate::repositories::store::{DeleteOutcome, GradingStore, SubmissionFilter};
use crate::services::aggregation::GradeSummary;
use crate::services::ai_grading::{DisabledOracle, GradingOracle, OracleRequest, OracleVerdict};
use crate::services::feedback::FeedbackLanguage;
use crate::services::grading::Grader;
use crate::services::paper_checking::{CheckerOptions, PaperChecker};
use crate::services::storage::{ObjectStorage, StoredObject};
use crate::services::text_extraction::{DocumentTextExtractor, SourceDocument, TextExtractor};

const TEST_SECRET_KEY: &str = "test-secret";
const MULTIPART_BOUNDARY: &str = "papercheck-test-boundary";

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that touch process environment variables.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn set_test_env() {
    std::env::set_var("PAPERCHECK_ENV", "test");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::set_var("AWS_EC2_METADATA_DISABLED", "true");
    for name in [
        "PAPERCHECK_STRICT_CONFIG",
        "PROJECT_NAME",
        "API_V1_STR",
        "PAPERCHECK_HOST",
        "PAPERCHECK_PORT",
        "DATABASE_URL",
        "OPENAI_API_KEY",
        "DATALAB_API_KEY",
        "S3_ENDPOINT",
        "S3_ACCESS_KEY",
        "S3_SECRET_KEY",
        "S3_BUCKET",
        "S3_REGION",
        "GRADING_CONCURRENCY",
        "EXTRACTION_TIMEOUT_SECONDS",
        "ORACLE_TIMEOUT_SECONDS",
        "GRADING_INLINE_DISPATCH",
        "GRADING_WORKER_CONCURRENCY",
        "GRADING_PENDING_GRACE_SECONDS",
        "GRADING_STALE_AFTER_MINUTES",
        "FEEDBACK_LANGUAGE",
        "ALLOWED_UPLOAD_EXTENSIONS",
        "MAX_UPLOAD_SIZE_MB",
    ] {
        std::env::remove_var(name);
    }
}

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) store: Arc<MemoryGradingStore>,
    pub(crate) storage: Arc<MemoryStorage>,
    _guard: MutexGuard<'static, ()>,
}

/// Router over in-memory persistence and storage with the oracle disabled.
/// Inline dispatch is off so tests drive processing explicitly.
pub(crate) fn setup_test_context() -> TestContext {
    let guard = env_lock();
    set_test_env();
    std::env::set_var("GRADING_INLINE_DISPATCH", "0");
    std::env::set_var("FEEDBACK_LANGUAGE", "en");
    std::env::set_var("MAX_UPLOAD_SIZE_MB", "1");

    let settings = Settings::load().expect("settings");
    let store = Arc::new(MemoryGradingStore::default());
    let storage = Arc::new(MemoryStorage::default());
    let checker = PaperChecker::new(
        store.clone(),
        storage.clone(),
        Arc::new(DocumentTextExtractor::new(None)),
        Grader::new(Arc::new(DisabledOracle), Duration::from_secs(1), FeedbackLanguage::English),
        CheckerOptions::from_settings(&settings),
    );

    let state = AppState::new(settings, store.clone(), storage.clone(), checker);
    let app = api::router::router(state.clone());

    TestContext { state, app, store, storage, _guard: guard }
}

/// Pending submission row with no stored file behind it.
pub(crate) fn pending_submission(owner_id: &str, answer_key_id: &str) -> Submission {
    let now = primitive_now_utc();
    Submission {
        id: Uuid::new_v4().to_string(),
        answer_key_id: answer_key_id.to_string(),
        owner_id: owner_id.to_string(),
        student_name: None,
        student_id: None,
        source_file_key: format!("papers/{owner_id}/missing.txt"),
        source_file_name: "missing.txt".to_string(),
        source_mime_type: "text/plain".to_string(),
        source_file_size: 0,
        source_file_sha256: None,
        status: SubmissionStatus::Pending,
        extracted_text: None,
        obtained_marks: 0.0,
        total_marks: 0.0,
        percentage: 0.0,
        letter_grade: None,
        overall_feedback: None,
        overall_feedback_localized: None,
        processing_started_at: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
        results: Vec::new(),
    }
}

#[derive(Default)]
struct MemoryState {
    answer_keys: Vec<AnswerKey>,
    submissions: Vec<Submission>,
    results: HashMap<String, Vec<QuestionResult>>,
}

/// In-memory `GradingStore` with the same conditional transitions as Postgres.
#[derive(Default)]
pub(crate) struct MemoryGradingStore {
    state: Mutex<MemoryState>,
}

impl MemoryGradingStore {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn answer_key_count(&self) -> usize {
        self.lock().answer_keys.len()
    }

    pub(crate) fn result_count(&self, submission_id: &str) -> usize {
        self.lock().results.get(submission_id).map_or(0, Vec::len)
    }

    /// Drops the key without the reference check.
    pub(crate) fn forget_answer_key(&self, id: &str) {
        self.lock().answer_keys.retain(|key| key.id != id);
    }

    pub(crate) fn status_of(&self, id: &str) -> Option<SubmissionStatus> {
        self.lock().submissions.iter().find(|item| item.id == id).map(|item| item.status)
    }

    fn transition(
        &self,
        id: &str,
        from: SubmissionStatus,
        apply: impl FnOnce(&mut Submission),
    ) -> bool {
        let mut state = self.lock();
        match state.submissions.iter_mut().find(|item| item.id == id && item.status == from) {
            Some(submission) => {
                apply(submission);
                true
            }
            None => false,
        }
    }
}

fn newest_first<T: Clone>(items: &[T], created_at: impl Fn(&T) -> PrimitiveDateTime) -> Vec<T> {
    let mut sorted: Vec<T> = items.iter().rev().cloned().collect();
    sorted.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    sorted
}

#[async_trait]
impl GradingStore for MemoryGradingStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_answer_key(&self, key: &AnswerKey) -> Result<()> {
        self.lock().answer_keys.push(key.clone());
        Ok(())
    }

    async fn find_answer_key(&self, id: &str) -> Result<Option<AnswerKey>> {
        Ok(self.lock().answer_keys.iter().find(|key| key.id == id).cloned())
    }

    async fn list_answer_keys(
        &self,
        owner_id: &str,
        search: Option<&str>,
    ) -> Result<Vec<AnswerKey>> {
        let needle = search.map(str::to_lowercase);
        let state = self.lock();
        let owned: Vec<AnswerKey> = state
            .answer_keys
            .iter()
            .filter(|key| key.owner_id == owner_id)
            .filter(|key| {
                needle.as_deref().map_or(true, |needle| key.title.to_lowercase().contains(needle))
            })
            .cloned()
            .collect();
        Ok(newest_first(&owned, |key| key.created_at))
    }

    async fn delete_answer_key(&self, id: &str) -> Result<DeleteOutcome> {
        let mut state = self.lock();
        if state.submissions.iter().any(|item| item.answer_key_id == id) {
            return Ok(DeleteOutcome::InUse);
        }
        let before = state.answer_keys.len();
        state.answer_keys.retain(|key| key.id != id);
        Ok(if state.answer_keys.len() < before {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        self.lock().submissions.push(submission.clone());
        Ok(())
    }

    async fn find_submission(&self, id: &str) -> Result<Option<Submission>> {
        let state = self.lock();
        let Some(mut submission) = state.submissions.iter().find(|item| item.id == id).cloned()
        else {
            return Ok(None);
        };
        if submission.status == SubmissionStatus::Completed {
            submission.results = state.results.get(id).cloned().unwrap_or_default();
        }
        Ok(Some(submission))
    }

    async fn list_submissions(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>> {
        let state = self.lock();
        let matching: Vec<Submission> = state
            .submissions
            .iter()
            .filter(|item| filter.owner_id.as_ref().map_or(true, |owner| &item.owner_id == owner))
            .filter(|item| {
                filter.answer_key_id.as_ref().map_or(true, |key_id| &item.answer_key_id == key_id)
            })
            .filter(|item| filter.status.map_or(true, |status| item.status == status))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |item| item.created_at))
    }

    async fn delete_submission(&self, id: &str) -> Result<DeleteOutcome> {
        let mut state = self.lock();
        let Some(position) = state.submissions.iter().position(|item| item.id == id) else {
            return Ok(DeleteOutcome::NotFound);
        };
        if state.submissions[position].status == SubmissionStatus::Processing {
            return Ok(DeleteOutcome::InUse);
        }
        state.submissions.remove(position);
        state.results.remove(id);
        Ok(DeleteOutcome::Deleted)
    }

    async fn mark_processing(&self, id: &str, now: PrimitiveDateTime) -> Result<bool> {
        Ok(self.transition(id, SubmissionStatus::Pending, |submission| {
            submission.status = SubmissionStatus::Processing;
            submission.processing_started_at = Some(now);
            submission.updated_at = now;
        }))
    }

    async fn save_extracted_text(
        &self,
        id: &str,
        text: &str,
        now: PrimitiveDateTime,
    ) -> Result<()> {
        self.transition(id, SubmissionStatus::Processing, |submission| {
            submission.extracted_text = Some(text.to_string());
            submission.updated_at = now;
        });
        Ok(())
    }

    async fn complete(
        &self,
        id: &str,
        results: &[QuestionResult],
        summary: &GradeSummary,
        now: PrimitiveDateTime,
    ) -> Result<bool> {
        let completed = self.transition(id, SubmissionStatus::Processing, |submission| {
            submission.status = SubmissionStatus::Completed;
            submission.obtained_marks = summary.obtained_marks;
            submission.total_marks = summary.total_marks;
            submission.percentage = summary.percentage;
            submission.letter_grade = Some(summary.letter_grade.as_str().to_string());
            submission.overall_feedback = Some(summary.overall_feedback.clone());
            submission.overall_feedback_localized = summary.overall_feedback_localized.clone();
            submission.completed_at = Some(now);
            submission.updated_at = now;
        });
        if completed {
            self.lock().results.insert(id.to_string(), results.to_vec());
        }
        Ok(completed)
    }

    async fn fail(&self, id: &str, reason: &str, now: PrimitiveDateTime) -> Result<bool> {
        Ok(self.transition(id, SubmissionStatus::Processing, |submission| {
            submission.status = SubmissionStatus::Failed;
            submission.overall_feedback = Some(reason.to_string());
            submission.overall_feedback_localized = None;
            submission.completed_at = Some(now);
            submission.updated_at = now;
        }))
    }

    async fn next_pending(&self, created_before: PrimitiveDateTime) -> Result<Option<String>> {
        let state = self.lock();
        Ok(state
            .submissions
            .iter()
            .filter(|item| item.status == SubmissionStatus::Pending)
            .filter(|item| item.created_at <= created_before)
            .min_by_key(|item| item.created_at)
            .map(|item| item.id.clone()))
    }

    async fn fail_stale_processing(
        &self,
        started_before: PrimitiveDateTime,
        reason: &str,
        now: PrimitiveDateTime,
    ) -> Result<u64> {
        let mut state = self.lock();
        let mut failed = 0;
        for submission in state.submissions.iter_mut().filter(|item| {
            item.status == SubmissionStatus::Processing
                && item.processing_started_at.is_some_and(|started| started < started_before)
        }) {
            submission.status = SubmissionStatus::Failed;
            submission.overall_feedback = Some(reason.to_string());
            submission.overall_feedback_localized = None;
            submission.completed_at = Some(now);
            submission.updated_at = now;
            failed += 1;
        }
        Ok(failed)
    }
}

#[derive(Default)]
pub(crate) struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).contains_key(key)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn store(&self, key: &str, _content_type: &str, bytes: Vec<u8>) -> Result<StoredObject> {
        let stored = StoredObject::describe(key, &bytes);
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), bytes);
        Ok(stored)
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("object {key} not found"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
        Ok(())
    }
}

/// Oracle that awards the same marks to every answer.
pub(crate) struct FixedOracle {
    marks: f64,
    confidence: Option<f64>,
}

impl FixedOracle {
    pub(crate) fn new(marks: f64) -> Self {
        Self { marks, confidence: None }
    }

    pub(crate) fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

#[async_trait]
impl GradingOracle for FixedOracle {
    async fn grade(&self, _request: &OracleRequest) -> Result<OracleVerdict> {
        Ok(OracleVerdict {
            marks: self.marks,
            feedback: "Graded by fixed oracle.".to_string(),
            feedback_localized: None,
            confidence: self.confidence,
        })
    }
}

pub(crate) struct SlowOracle {
    pub(crate) delay: Duration,
    pub(crate) marks: f64,
}

#[async_trait]
impl GradingOracle for SlowOracle {
    async fn grade(&self, _request: &OracleRequest) -> Result<OracleVerdict> {
        tokio::time::sleep(self.delay).await;
        Ok(OracleVerdict {
            marks: self.marks,
            feedback: "late".to_string(),
            feedback_localized: None,
            confidence: Some(1.0),
        })
    }
}

pub(crate) struct SlowExtractor {
    pub(crate) delay: Duration,
}

#[async_trait]
impl TextExtractor for SlowExtractor {
    async fn extract(&self, _document: SourceDocument<'_>) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok("too late".to_string())
    }
}

pub(crate) struct PanickingExtractor;

#[async_trait]
impl TextExtractor for PanickingExtractor {
    async fn extract(&self, _document: SourceDocument<'_>) -> Result<String> {
        panic!("extractor crashed")
    }
}

pub(crate) fn bearer_token(user_id: &str, settings: &Settings) -> String {
    security::create_access_token(user_id, settings, None).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) struct UploadFile<'a> {
    pub(crate) name: &'a str,
    pub(crate) content_type: &'a str,
    pub(crate) bytes: &'a [u8],
}

pub(crate) fn multipart_request(
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    file: Option<UploadFile<'_>>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(file) = file {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.name, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"))
        .body(Body::from(body))
        .expect("multipart request")
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
