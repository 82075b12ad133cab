use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crux_http::HttpError;

use crate::trip::{TripField, TripId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Validation,
    NotFound,
    Conflict,
    ReferentialIntegrity,
    Deserialization,
    InvalidState,
    Internal,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::ReferentialIntegrity => "REFERENTIAL_INTEGRITY",
            Self::Deserialization => "DESERIALIZATION_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Timeout | Self::Internal => ErrorSeverity::Transient,

            Self::Deserialization | Self::InvalidState => ErrorSeverity::Fatal,

            Self::Validation
            | Self::NotFound
            | Self::Conflict
            | Self::ReferentialIntegrity
            | Self::Unknown => ErrorSeverity::Permanent,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Internal)
    }

    #[must_use]
    pub const fn http_status_hint(self) -> Option<u16> {
        match self {
            Self::NotFound => Some(404),
            Self::Conflict | Self::ReferentialIntegrity => Some(409),
            Self::Validation => Some(400),
            Self::Internal => Some(500),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Re-tags the error, keeping message and context.
    #[must_use]
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self.severity = kind.default_severity();
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        self.context.get("http_status").and_then(|s| s.parse().ok())
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to reach the trip service. Check your connection and try again.".into()
            }
            ErrorKind::Timeout => "The server took too long to answer. Please try again.".into(),
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::NotFound => "This item no longer exists. Pull to refresh.".into(),
            ErrorKind::Conflict => "A category with this name already exists.".into(),
            ErrorKind::ReferentialIntegrity => {
                "This category is still used by at least one trip and cannot be deleted.".into()
            }
            ErrorKind::Deserialization => {
                "The server sent a response the app could not read.".into()
            }
            ErrorKind::InvalidState => {
                "The app is not configured correctly. Please restart the app.".into()
            }
            ErrorKind::Internal | ErrorKind::Unknown => {
                "Something went wrong on the server. Please try again.".into()
            }
        }
    }

    /// Classifies a non-2xx response. The trip service answers with
    /// `{"error": ".."}`; `message` is accepted as well.
    #[must_use]
    pub fn from_http_status(status: u16, body: Option<&[u8]>) -> Self {
        let kind = match status {
            400 | 422 => ErrorKind::Validation,
            404 => ErrorKind::NotFound,
            408 | 504 => ErrorKind::Timeout,
            409 => ErrorKind::Conflict,
            502 | 503 => ErrorKind::Network,
            500..=599 => ErrorKind::Internal,
            _ => ErrorKind::Unknown,
        };

        let message = body
            .and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok())
            .and_then(ApiErrorResponse::into_message)
            .unwrap_or_else(|| format!("HTTP error: {status}"));

        Self::new(kind, message).with_context("http_status", status.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiErrorResponse {
    fn into_message(self) -> Option<String> {
        self.error
            .or(self.message)
            .filter(|m| !m.trim().is_empty())
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<HttpError> for AppError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Http { code, message, body } => {
                AppError::from_http_status(u16::from(code), body.as_deref()).with_internal(message)
            }
            HttpError::Timeout => AppError::new(ErrorKind::Timeout, "request timed out"),
            HttpError::Io(message) => AppError::new(ErrorKind::Network, message),
            HttpError::Url(message) => AppError::new(ErrorKind::InvalidState, message),
            HttpError::Json(message) => {
                AppError::new(ErrorKind::Internal, "request body could not be encoded")
                    .with_internal(message)
            }
            #[allow(unreachable_patterns)]
            other => AppError::new(ErrorKind::Network, other.to_string()),
        }
    }
}

/// Rejections raised locally before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a title for the trip")]
    EmptyTitle,
    #[error("The end date ({end}) cannot be before the start date ({start})")]
    InvalidDateRange { start: String, end: String },
    #[error("Please enter a category name")]
    EmptyCategoryName,
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

/// A mutation the server refused or never confirmed. The local change has
/// already been reverted when this is raised.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    #[error("could not update {field} on trip {trip_id}: {cause}")]
    Toggle {
        trip_id: TripId,
        field: TripField,
        cause: AppError,
    },
    #[error("could not delete trip {trip_id}: {cause}")]
    Delete { trip_id: TripId, cause: AppError },
}

impl MutationError {
    #[must_use]
    pub fn trip_id(&self) -> TripId {
        match self {
            Self::Toggle { trip_id, .. } | Self::Delete { trip_id, .. } => *trip_id,
        }
    }

    #[must_use]
    pub fn cause(&self) -> &AppError {
        match self {
            Self::Toggle { cause, .. } | Self::Delete { cause, .. } => cause,
        }
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self {
            Self::Toggle { field, cause, .. } => format!(
                "Couldn't update {}. {}",
                field.label(),
                cause.user_facing_message()
            ),
            Self::Delete { cause, .. } => {
                format!("Couldn't delete the trip. {}", cause.user_facing_message())
            }
        }
    }
}

impl From<MutationError> for AppError {
    fn from(e: MutationError) -> Self {
        let trip_id = e.trip_id();
        let cause = e.cause().clone();
        AppError {
            message: e.to_string(),
            ..cause
        }
        .with_context("trip_id", trip_id.to_string())
    }
}
