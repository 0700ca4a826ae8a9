use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::{stream, FutureExt, StreamExt};
use sqlx::types::Json;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::metrics;
use crate::core::time::primitive_now_utc;
use crate::db::models::{AnswerKey, QuestionResult, Submission};
use crate::db::types::SubmissionStatus;
use crate::repositories::store::GradingStore;
use crate::services::aggregation::{self, GradeSummary};
use crate::services::ai_grading::oracle_from_settings;
use crate::services::feedback::FeedbackLanguage;
use crate::services::grading::Grader;
use crate::services::rubric::{self, AnswerKeyDraft, RubricError};
use crate::services::segmentation;
use crate::services::storage::{paper_object_key, ObjectStorage};
use crate::services::text_extraction::{extract_best_effort, DocumentTextExtractor, TextExtractor};

#[derive(Debug, Error)]
pub(crate) enum CheckerError {
    #[error("Answer key not found")]
    AnswerKeyNotFound,
    #[error("Submission not found")]
    SubmissionNotFound,
    #[error(transparent)]
    InvalidRubric(#[from] RubricError),
    #[error("Failed to store uploaded paper")]
    Storage(#[source] anyhow::Error),
    #[error("Persistence failure")]
    Persistence(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CheckerOptions {
    /// Rubric items graded concurrently within one submission.
    pub(crate) concurrency: usize,
    pub(crate) extraction_timeout: Duration,
}

impl CheckerOptions {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let grading = settings.grading();
        Self {
            concurrency: grading.concurrency.max(1),
            extraction_timeout: Duration::from_secs(grading.extraction_timeout_seconds),
        }
    }
}

/// Uploaded paper plus the identity it should be filed under.
pub(crate) struct NewPaper {
    pub(crate) answer_key_id: String,
    pub(crate) owner_id: String,
    pub(crate) student_name: Option<String>,
    pub(crate) student_id: Option<String>,
    pub(crate) file_name: String,
    pub(crate) mime_type: String,
    pub(crate) bytes: Vec<u8>,
}

#[derive(Clone)]
pub(crate) struct PaperChecker {
    inner: Arc<CheckerInner>,
}

struct CheckerInner {
    store: Arc<dyn GradingStore>,
    storage: Arc<dyn ObjectStorage>,
    extractor: Arc<dyn TextExtractor>,
    grader: Grader,
    options: CheckerOptions,
}

struct GradedPaper {
    results: Vec<QuestionResult>,
    summary: GradeSummary,
}

impl PaperChecker {
    pub(crate) fn new(
        store: Arc<dyn GradingStore>,
        storage: Arc<dyn ObjectStorage>,
        extractor: Arc<dyn TextExtractor>,
        grader: Grader,
        options: CheckerOptions,
    ) -> Self {
        Self { inner: Arc::new(CheckerInner { store, storage, extractor, grader, options }) }
    }

    pub(crate) fn from_settings(
        settings: &Settings,
        store: Arc<dyn GradingStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Result<Self> {
        let extractor: Arc<dyn TextExtractor> =
            Arc::new(DocumentTextExtractor::from_settings(settings)?);
        let grading = settings.grading();
        let grader = Grader::new(
            oracle_from_settings(settings)?,
            Duration::from_secs(grading.oracle_timeout_seconds),
            FeedbackLanguage::from_code(&grading.feedback_language),
        );

        Ok(Self::new(store, storage, extractor, grader, CheckerOptions::from_settings(settings)))
    }

    pub(crate) async fn create_answer_key(
        &self,
        owner_id: &str,
        draft: AnswerKeyDraft,
    ) -> Result<AnswerKey, CheckerError> {
        let draft = rubric::validate(draft)?;
        let now = primitive_now_utc();
        let key = AnswerKey {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: draft.title,
            subject: draft.subject,
            total_marks: draft.total_marks,
            items: Json(draft.items),
            marking_scheme: Json(draft.marking_scheme),
            created_at: now,
            updated_at: now,
        };

        self.inner.store.insert_answer_key(&key).await.map_err(CheckerError::Persistence)?;
        tracing::info!(
            answer_key_id = %key.id,
            owner_id,
            items = key.items.0.len(),
            total_marks = key.total_marks,
            "Answer key created"
        );
        Ok(key)
    }

    /// Stores the file and records a PENDING submission. Processing is
    /// dispatched separately.
    pub(crate) async fn submit_paper(&self, paper: NewPaper) -> Result<Submission, CheckerError> {
        let key = self
            .inner
            .store
            .find_answer_key(&paper.answer_key_id)
            .await
            .map_err(CheckerError::Persistence)?
            .filter(|key| key.owner_id == paper.owner_id)
            .ok_or(CheckerError::AnswerKeyNotFound)?;

        let object_key = paper_object_key(&paper.owner_id, &paper.file_name);
        let stored = self
            .inner
            .storage
            .store(&object_key, &paper.mime_type, paper.bytes)
            .await
            .map_err(CheckerError::Storage)?;

        let now = primitive_now_utc();
        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            answer_key_id: key.id.clone(),
            owner_id: paper.owner_id,
            student_name: paper.student_name,
            student_id: paper.student_id,
            source_file_key: stored.key.clone(),
            source_file_name: paper.file_name,
            source_mime_type: paper.mime_type,
            source_file_size: stored.size,
            source_file_sha256: Some(stored.sha256),
            status: SubmissionStatus::Pending,
            extracted_text: None,
            obtained_marks: 0.0,
            total_marks: key.total_marks,
            percentage: 0.0,
            letter_grade: None,
            overall_feedback: None,
            overall_feedback_localized: None,
            processing_started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            results: Vec::new(),
        };

        if let Err(err) = self.inner.store.insert_submission(&submission).await {
            if let Err(cleanup) = self.inner.storage.delete(&stored.key).await {
                tracing::warn!(
                    file_key = %stored.key,
                    error = %cleanup,
                    "Failed to remove orphaned upload"
                );
            }
            return Err(CheckerError::Persistence(err));
        }

        tracing::info!(
            submission_id = %submission.id,
            answer_key_id = %submission.answer_key_id,
            file_size = submission.source_file_size,
            "Paper submitted"
        );
        Ok(submission)
    }

    pub(crate) async fn get_result(&self, id: &str) -> Result<Submission, CheckerError> {
        self.inner
            .store
            .find_submission(id)
            .await
            .map_err(CheckerError::Persistence)?
            .ok_or(CheckerError::SubmissionNotFound)
    }

    /// Drives one submission from PENDING to a terminal state. A submission
    /// that is not PENDING is left alone.
    pub(crate) async fn process_submission(&self, id: &str) -> Result<(), CheckerError> {
        let store = &self.inner.store;
        let submission = store
            .find_submission(id)
            .await
            .map_err(CheckerError::Persistence)?
            .ok_or(CheckerError::SubmissionNotFound)?;

        if submission.status != SubmissionStatus::Pending {
            tracing::debug!(
                submission_id = id,
                status = submission.status.as_str(),
                terminal = submission.status.is_terminal(),
                "Skipping processing"
            );
            return Ok(());
        }

        let claimed =
            store.mark_processing(id, primitive_now_utc()).await.map_err(CheckerError::Persistence)?;
        if !claimed {
            tracing::debug!(submission_id = id, "Submission claimed by another dispatcher");
            return Ok(());
        }
        tracing::info!(
            submission_id = id,
            answer_key_id = %submission.answer_key_id,
            "Processing started"
        );

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.grade_paper(&submission)).catch_unwind().await;

        let failure = match outcome {
            Ok(Ok(graded)) => {
                match store
                    .complete(id, &graded.results, &graded.summary, primitive_now_utc())
                    .await
                {
                    Ok(true) => {
                        metrics::record_grading_job(SubmissionStatus::Completed, started.elapsed());
                        tracing::info!(
                            submission_id = id,
                            obtained_marks = graded.summary.obtained_marks,
                            total_marks = graded.summary.total_marks,
                            letter_grade = graded.summary.letter_grade.as_str(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Processing completed"
                        );
                        return Ok(());
                    }
                    Ok(false) => {
                        tracing::warn!(
                            submission_id = id,
                            "Submission left PROCESSING before results were saved"
                        );
                        return Ok(());
                    }
                    Err(err) => err,
                }
            }
            Ok(Err(err)) => err,
            Err(panic) => anyhow::anyhow!(panic_message(panic.as_ref())),
        };

        let reason = format!("Processing failed: {failure:#}");
        tracing::error!(submission_id = id, error = %reason, "Processing failed");
        metrics::record_grading_job(SubmissionStatus::Failed, started.elapsed());
        store.fail(id, &reason, primitive_now_utc()).await.map_err(CheckerError::Persistence)?;
        Ok(())
    }

    pub(crate) fn spawn_processing(&self, id: String) -> JoinHandle<()> {
        let checker = self.clone();
        tokio::spawn(async move {
            if let Err(err) = checker.process_submission(&id).await {
                tracing::error!(submission_id = %id, error = %err, "Background processing failed");
            }
        })
    }

    async fn grade_paper(&self, submission: &Submission) -> Result<GradedPaper> {
        let inner = &self.inner;
        let key = inner
            .store
            .find_answer_key(&submission.answer_key_id)
            .await?
            .context("Answer key no longer exists")?;

        let text = extract_best_effort(
            &inner.storage,
            &inner.extractor,
            &submission.source_file_key,
            &submission.source_file_name,
            &submission.source_mime_type,
            inner.options.extraction_timeout,
        )
        .await;
        inner.store.save_extracted_text(&submission.id, &text, primitive_now_utc()).await?;

        let fragments = segmentation::segment(&text);
        tracing::debug!(
            submission_id = %submission.id,
            chars = text.len(),
            fragments = fragments.len(),
            "Answer text segmented"
        );

        let scheme = key.marking_scheme.0;
        let mut items = key.items.0.clone();
        items.sort_by_key(|item| item.question_number);

        let grader = &inner.grader;
        let pending: Vec<_> = items
            .iter()
            .map(|item| {
                let answer = segmentation::answer_for(&fragments, item.question_number);
                grader.grade(item, answer, &scheme)
            })
            .collect();
        let results: Vec<QuestionResult> =
            stream::iter(pending).buffered(inner.options.concurrency.max(1)).collect().await;

        let summary = aggregation::aggregate(&results, key.total_marks, grader.language());
        Ok(GradedPaper { results, summary })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected panic".to_string()
    }
}
