use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::core::config::Settings;
use crate::core::metrics;
use crate::services::datalab_ocr::DatalabOcrService;
use crate::services::storage::ObjectStorage;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceDocument<'a> {
    pub(crate) file_name: &'a str,
    pub(crate) mime_type: &'a str,
    pub(crate) bytes: &'a [u8],
}

#[async_trait]
pub(crate) trait TextExtractor: Send + Sync {
    async fn extract(&self, document: SourceDocument<'_>) -> Result<String>;
}

/// Plain text decodes locally; scans and PDFs go through OCR.
#[derive(Debug, Clone)]
pub(crate) struct DocumentTextExtractor {
    ocr: Option<DatalabOcrService>,
}

impl DocumentTextExtractor {
    pub(crate) fn new(ocr: Option<DatalabOcrService>) -> Self {
        Self { ocr }
    }

    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        if !settings.datalab().is_configured() {
            tracing::warn!("DATALAB_API_KEY not set; only text documents can be read");
            return Ok(Self::new(None));
        }

        Ok(Self::new(Some(DatalabOcrService::from_settings(settings)?)))
    }
}

#[async_trait]
impl TextExtractor for DocumentTextExtractor {
    async fn extract(&self, document: SourceDocument<'_>) -> Result<String> {
        let mime = document.mime_type.trim().to_ascii_lowercase();

        if mime.starts_with("text/") {
            return Ok(String::from_utf8_lossy(document.bytes).into_owned());
        }

        if !(mime.starts_with("image/") || mime == "application/pdf") {
            anyhow::bail!("Unsupported document type {mime}");
        }

        let Some(ocr) = &self.ocr else {
            anyhow::bail!("OCR is not configured for {mime} documents");
        };

        let result = ocr.run_marker_for_bytes(document.file_name, &mime, document.bytes).await?;
        tracing::debug!(model = ?result.model, "OCR text received");
        Ok(result.markdown.unwrap_or_default())
    }
}

/// Never fails: any fetch, decode or timeout problem yields empty text.
pub(crate) async fn extract_best_effort(
    storage: &Arc<dyn ObjectStorage>,
    extractor: &Arc<dyn TextExtractor>,
    key: &str,
    file_name: &str,
    mime_type: &str,
    timeout: Duration,
) -> String {
    let work = async {
        let bytes = storage.fetch(key).await?;
        extractor.extract(SourceDocument { file_name, mime_type, bytes: &bytes }).await
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(text)) => {
            let outcome = if text.trim().is_empty() { "empty" } else { "success" };
            metrics::record_text_extraction(outcome);
            text
        }
        Ok(Err(err)) => {
            metrics::record_text_extraction("error");
            tracing::warn!(file_key = %key, error = %err, "Text extraction failed; continuing with empty text");
            String::new()
        }
        Err(_) => {
            metrics::record_text_extraction("timeout");
            tracing::warn!(
                file_key = %key,
                timeout_seconds = timeout.as_secs_f64(),
                "Text extraction timed out; continuing with empty text"
            );
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::{LocalObjectStorage, ObjectStorage};
    use crate::test_support::{MemoryStorage, SlowExtractor};

    #[tokio::test]
    async fn text_documents_decode_lossily() {
        let extractor = DocumentTextExtractor::new(None);
        let text = extractor
            .extract(SourceDocument {
                file_name: "a.txt",
                mime_type: "text/plain; charset=utf-8",
                bytes: b"Q1. Paris\n\xffQ2. 42",
            })
            .await
            .expect("text");
        assert!(text.starts_with("Q1. Paris"));
        assert!(text.ends_with("Q2. 42"));
    }

    #[tokio::test]
    async fn images_without_ocr_are_an_extraction_error() {
        let extractor = DocumentTextExtractor::new(None);
        let result = extractor
            .extract(SourceDocument { file_name: "a.png", mime_type: "image/png", bytes: b"png" })
            .await;
        assert!(result.is_err());

        let result = extractor
            .extract(SourceDocument {
                file_name: "a.zip",
                mime_type: "application/zip",
                bytes: b"PK",
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn best_effort_returns_text_from_storage() {
        let storage: Arc<dyn ObjectStorage> = Arc::new(MemoryStorage::default());
        storage.store("papers/a/1_a.txt", "text/plain", b"Q1. Paris".to_vec()).await.expect("store");
        let extractor: Arc<dyn TextExtractor> = Arc::new(DocumentTextExtractor::new(None));

        let text = extract_best_effort(
            &storage,
            &extractor,
            "papers/a/1_a.txt",
            "a.txt",
            "text/plain",
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(text, "Q1. Paris");
    }

    #[tokio::test]
    async fn best_effort_degrades_to_empty_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalObjectStorage::new(dir.path()));
        let extractor: Arc<dyn TextExtractor> = Arc::new(DocumentTextExtractor::new(None));

        let missing = extract_best_effort(
            &storage,
            &extractor,
            "papers/a/missing.txt",
            "missing.txt",
            "text/plain",
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(missing, "");

        storage.store("papers/a/scan.png", "image/png", b"png".to_vec()).await.expect("store");
        let unreadable = extract_best_effort(
            &storage,
            &extractor,
            "papers/a/scan.png",
            "scan.png",
            "image/png",
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(unreadable, "");
    }

    #[tokio::test]
    async fn best_effort_times_out_to_empty_text() {
        let storage: Arc<dyn ObjectStorage> = Arc::new(MemoryStorage::default());
        storage.store("k", "text/plain", b"Q1. Paris".to_vec()).await.expect("store");
        let extractor: Arc<dyn TextExtractor> =
            Arc::new(SlowExtractor { delay: Duration::from_secs(5) });

        let text = extract_best_effort(
            &storage,
            &extractor,
            "k",
            "a.txt",
            "text/plain",
            Duration::from_millis(20),
        )
        .await;
        assert_eq!(text, "");
    }
}
