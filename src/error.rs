//! Domain error taxonomy shared by the query, ingestion and API layers.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested table is not on the allow-list. Raised before any SQL text
    /// is assembled.
    #[error("invalid table name: {0}")]
    InvalidTable(String),

    /// History field not on the per-table allow-list.
    #[error("invalid history field: {0}")]
    InvalidHistoryField(String),

    /// Bad or missing request input other than the two cases above.
    #[error("{0}")]
    Validation(String),

    /// Missing or insufficient credentials; rejected before core logic runs.
    #[error("unauthorized")]
    Unauthorized,

    /// Underlying storage failure. The batch or query is aborted; no partial
    /// data is surfaced.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidTable(_) | Error::InvalidHistoryField(_) | Error::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Storage details stay in the logs, not in the response body.
        let message = match self {
            Error::Storage(e) => {
                tracing::error!(error = %e, "storage error");
                "storage error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "message": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_statuses() {
        assert_eq!(
            Error::InvalidTable("users".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::Storage(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
