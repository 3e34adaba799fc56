use std::time::Duration;

use axum::http::StatusCode;

pub type QrResult<T> = Result<T, QrError>;

/// Everything that can end a `/generate` request early.
///
/// The `Display` text carries the underlying cause and is meant for logs.
/// Clients only ever see [`QrError::public_message`].
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("image processing error: {0}")]
    ImageProcessing(String),

    #[error("logo error: {0}")]
    LogoFetch(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl QrError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn image_processing(msg: impl Into<String>) -> Self {
        Self::ImageProcessing(msg.into())
    }

    pub fn logo(msg: impl Into<String>) -> Self {
        Self::LogoFetch(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidRequest(msg) => msg.clone(),
            Self::Render(_) => "Failed to generate QR code".to_string(),
            Self::ImageProcessing(_) => "Failed to process image".to_string(),
            Self::LogoFetch(_) => "Failed to embed logo".to_string(),
            Self::Encode(_) => "Failed to encode final image".to_string(),
            Self::Timeout(_) => "Request timed out".to_string(),
        }
    }
}
