use std::path::Path;

use crate::api::errors::ApiError;

/// Checks the extension against the allow-list and returns the MIME type the
/// paper is stored under. A missing or generic content type is replaced by the
/// canonical type for the extension.
pub(crate) fn validate_paper_upload(
    filename: &str,
    content_type: Option<&str>,
    allowed_extensions: &[String],
) -> Result<String, ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("File must have an extension".to_string()))?;

    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")));
    }

    let canonical = canonical_mime(&extension)
        .ok_or_else(|| ApiError::BadRequest(format!("File extension '{extension}' is not allowed")))?;

    let mime = content_type
        .map(|value| value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .unwrap_or_default();
    if mime.is_empty() || mime == "application/octet-stream" {
        return Ok(canonical.to_string());
    }

    if mime_allowed_for_extension(&mime, &extension) {
        Ok(mime)
    } else {
        Err(ApiError::BadRequest(format!(
            "MIME type '{mime}' does not match extension '.{extension}'"
        )))
    }
}

fn canonical_mime(extension: &str) -> Option<&'static str> {
    match extension {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "pdf" => Some("application/pdf"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "jpg" | "jpeg" => matches!(mime, "image/jpeg" | "image/jpg"),
        "png" => mime == "image/png",
        "webp" => mime == "image/webp",
        "gif" => mime == "image/gif",
        "pdf" => matches!(mime, "application/pdf" | "application/x-pdf"),
        "txt" => mime == "text/plain",
        _ => false,
    }
}
