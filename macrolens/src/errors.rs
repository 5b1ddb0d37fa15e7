use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request carried no `file` field
    #[error("No file uploaded")]
    MissingUpload,

    /// Invalid request data (unreadable multipart, bad field encoding)
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload exceeds the configured size limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// The outbound inference call failed (network, auth, quota, timeout)
    #[error("inference request failed: {message}")]
    Inference { message: String },

    /// The inference service answered, but not with the expected structured shape
    #[error("malformed inference response: {message}")]
    MalformedResponse { message: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingUpload | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Inference { .. } | Error::MalformedResponse { .. } | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Diagnostic text for the `details` field of the error envelope.
    ///
    /// The underlying message is propagated to the caller, but never a raw
    /// stack trace or panic payload.
    fn details(&self) -> String {
        match self {
            Error::Inference { message } | Error::MalformedResponse { message } => message.clone(),
            Error::Other(err) => format!("{err:#}"),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Inference { .. } | Error::MalformedResponse { .. } | Error::Other(_) => {
                tracing::error!("Request processing failed: {:#}", self);
            }
            Error::MissingUpload | Error::BadRequest { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        // Every failure leaves the handler as a JSON envelope; server-side
        // failures share one message with the diagnostic in `details`
        let body = match &self {
            Error::MissingUpload => json!({ "error": "No file uploaded" }),
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => {
                json!({ "error": message })
            }
            Error::Inference { .. } | Error::MalformedResponse { .. } | Error::Other(_) => {
                json!({ "error": "Error processing image", "details": self.details() })
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
