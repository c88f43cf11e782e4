use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::video_service::IngestError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::NotFound => AppError::NotFound("Couldn't find video".to_string()),
            IngestError::Unauthorized => {
                AppError::Unauthorized("Not authorized to modify this video".to_string())
            }
            IngestError::InvalidMediaType(_) | IngestError::EmptyUpload => {
                AppError::BadRequest(err.to_string())
            }
            IngestError::TooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            IngestError::Store(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::media::OptimizeError;

    fn status_of(err: IngestError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_ingest_error_status_codes() {
        assert_eq!(status_of(IngestError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(IngestError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(IngestError::InvalidMediaType("image/gif".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(IngestError::EmptyUpload), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(IngestError::TooLarge { limit: 10 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status_of(IngestError::Optimize(OptimizeError::MissingOutput(
                "/tmp/x.processing".into()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        use http_body_util::BodyExt;

        let response = AppError::Internal("ffmpeg exploded at /tmp/secret".to_string()).into_response();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal Server Error");
    }
}
