/// Failures the adapters need to tell apart. Everything else travels as plain `anyhow` context.
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("Gemini API key is not configured")]
    MissingApiKey,
    #[error("Gemini rejected the credentials (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("Gemini quota exhausted: {0}")]
    QuotaExceeded(String),
    #[error("Gemini request failed (HTTP {status}): {message}")]
    Http { status: u16, message: String },
    #[error("Gemini returned no text")]
    EmptyResponse,
    #[error("live session setup was not acknowledged: {0}")]
    SetupFailed(String),
    #[error("live connection is closed")]
    Closed,
    #[error("live connection is busy")]
    Busy,
}

impl GeminiError {
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => GeminiError::Unauthorized { status, message },
            429 => GeminiError::QuotaExceeded(message),
            _ => GeminiError::Http { status, message },
        }
    }
}
