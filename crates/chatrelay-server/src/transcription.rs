//! `POST /api/transcribe`: multipart audio upload to text.

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use chatrelay_llm::TranscriptionProvider;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{TRANSCRIPTION_FAILURES_TOTAL, TRANSCRIPTION_REQUESTS_TOTAL};

/// Multipart field carrying the audio.
pub const AUDIO_FIELD: &str = "audio";

/// Filename used when the upload does not name one.
pub const DEFAULT_FILENAME: &str = "audio.webm";

/// Headroom over `max_upload_bytes` for multipart framing.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Response body for every outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    /// Transcribed text; empty on failure.
    pub text: String,
    /// Whether transcription succeeded.
    pub success: bool,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptionResponse {
    fn ok(text: String) -> Self {
        Self {
            text,
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

struct Upload {
    audio: Vec<u8>,
    filename: String,
}

fn bad_request(category: &'static str, error: &str) -> (StatusCode, TranscriptionResponse) {
    counter!(TRANSCRIPTION_FAILURES_TOTAL, "category" => category).increment(1);
    warn!(category, error, "rejecting transcription upload");
    (StatusCode::BAD_REQUEST, TranscriptionResponse::failed(error))
}

fn read_failure(e: &MultipartError) -> (StatusCode, TranscriptionResponse) {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        bad_request("too_large", "Audio file too large")
    } else {
        debug!(error = %e, "multipart read failed");
        bad_request("bad_form", "Failed to parse form data")
    }
}

/// Response for a request whose body is not multipart form data.
pub fn rejected_form(detail: &str) -> (StatusCode, TranscriptionResponse) {
    debug!(detail, "multipart extraction rejected");
    bad_request("bad_form", "Failed to parse form data")
}

async fn find_audio(multipart: &mut Multipart) -> Result<Option<Upload>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();
        let audio = field.bytes().await?.to_vec();
        return Ok(Some(Upload { audio, filename }));
    }
    Ok(None)
}

/// Pull the `audio` field out of `multipart` and transcribe it.
///
/// `400` for a missing, unreadable, empty or oversized upload; `500` when
/// the provider fails.
pub async fn transcribe_upload(
    provider: &dyn TranscriptionProvider,
    max_upload_bytes: usize,
    mut multipart: Multipart,
) -> (StatusCode, TranscriptionResponse) {
    counter!(TRANSCRIPTION_REQUESTS_TOTAL).increment(1);

    let upload = match find_audio(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return bad_request("missing_audio", "No audio file provided"),
        Err(e) => return read_failure(&e),
    };

    if upload.audio.is_empty() {
        return bad_request("missing_audio", "No audio file provided");
    }
    if upload.audio.len() > max_upload_bytes {
        return bad_request("too_large", "Audio file too large");
    }

    let bytes = upload.audio.len();
    match provider.transcribe(upload.audio, &upload.filename).await {
        Ok(text) => {
            info!(bytes, filename = %upload.filename, chars = text.len(), "transcribed audio");
            (StatusCode::OK, TranscriptionResponse::ok(text))
        }
        Err(e) => {
            warn!(error = %e, category = e.category(), "transcription failed");
            counter!(TRANSCRIPTION_FAILURES_TOTAL, "category" => e.category()).increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                TranscriptionResponse::failed(format!("Transcription failed: {e}")),
            )
        }
    }
}
