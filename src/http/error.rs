use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Result alias for HTTP handlers.
pub type AppResult<T> = Result<T, AppError>;

/// An error response: a status code plus an optional JSON detail message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppError {
    #[serde(with = "serde_status_code")]
    status: StatusCode,
    detail: Option<String>,
}

impl Default for AppError {
    fn default() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: None,
        }
    }
}

impl AppError {
    /// Create a new [`AppError`].
    pub fn new(status_code: StatusCode, message: Option<impl ToString>) -> AppError {
        Self {
            status: status_code,
            detail: message.map(|m| m.to_string()),
        }
    }

    /// A 400 with a generic detail message.
    pub fn bad_request(message: impl ToString) -> AppError {
        Self::new(StatusCode::BAD_REQUEST, Some(message))
    }

    /// A 404 with a detail message.
    pub fn not_found(message: impl ToString) -> AppError {
        Self::new(StatusCode::NOT_FOUND, Some(message))
    }

    /// The one generic unauthorized response. Every auth failure maps here
    /// so the status cannot be used for username enumeration.
    pub fn unauthorized() -> AppError {
        Self::new(StatusCode::UNAUTHORIZED, Some("Unauthorized"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let json = Json(self.clone());
        (self.status, json).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        tracing::warn!(err = %value, "internal error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: Some("internal error".to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            // the one conflict the storage layer reports; the KOReader
            // client protocol expects 402 for it
            StoreError::UsernameTaken => Self::new(
                StatusCode::PAYMENT_REQUIRED,
                Some("Username already exists"),
            ),
            // backend failures stay distinct from not-found
            err => {
                tracing::warn!(%err, "storage error");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some("storage unavailable"),
                )
            }
        }
    }
}

/// Serialize/Deserializer for status codes.
///
/// This is needed because status code according to JSON API spec must
/// be the status code as a STRING.
///
/// We could have used http_serde, but it encodes the status code as a NUMBER.
pub mod serde_status_code {
    use axum::http::StatusCode;
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Unexpected};

    /// Serialize [StatusCode]s.
    pub fn serialize<S: Serializer>(status: &StatusCode, ser: S) -> Result<S::Ok, S::Error> {
        String::serialize(&status.as_u16().to_string(), ser)
    }

    /// Deserialize [StatusCode]s.
    pub fn deserialize<'de, D>(de: D) -> Result<StatusCode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let str = String::deserialize(de)?;
        StatusCode::from_bytes(str.as_bytes()).map_err(|_| {
            serde::de::Error::invalid_value(
                Unexpected::Str(str.as_str()),
                &"A valid http status code",
            )
        })
    }
}
