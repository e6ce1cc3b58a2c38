// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use reel_comfy::ComfyError;
use reel_media::MediaError;
use reel_session::SessionError;

/// Upstream payloads are passed through but bounded; a backend can embed
/// whole tracebacks in its error body.
const UPSTREAM_DETAIL_LIMIT: usize = 2000;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Client input problem → 400.
    #[error("{0}")]
    BadRequest(String),

    /// Missing artifact → 404.
    #[error("{0}")]
    NotFound(String),

    /// Backend / provider failure → 500 with the upstream payload appended
    /// so the response alone is enough to diagnose.
    #[error("{0}")]
    Upstream(String),

    /// Inference run exceeded its wall clock → 500.
    #[error("processing exceeded {0} minutes")]
    Timeout(u64),

    /// Encoder subprocess exceeded its wall clock → 504.
    #[error("encoder processing timed out")]
    SubprocessTimeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::Timeout(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::SubprocessTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

fn truncate(text: String) -> String {
    if text.chars().count() <= UPSTREAM_DETAIL_LIMIT {
        return text;
    }
    text.chars().take(UPSTREAM_DETAIL_LIMIT).collect::<String>() + "…"
}

impl From<SessionError> for GatewayError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidName(_) => Self::BadRequest(e.to_string()),
            SessionError::NotFound { .. } => Self::NotFound(e.to_string()),
            SessionError::Io(io) => Self::Internal(io.to_string()),
        }
    }
}

impl From<ComfyError> for GatewayError {
    fn from(e: ComfyError) -> Self {
        match e {
            ComfyError::Timeout(minutes) => Self::Timeout(minutes),
            ComfyError::WorkflowMissing(path) => {
                Self::Internal(format!("workflow template missing: {path}"))
            }
            ComfyError::Io(io) => Self::Internal(io.to_string()),
            ComfyError::Json(json) => Self::Internal(json.to_string()),
            other => Self::Upstream(truncate(other.to_string())),
        }
    }
}

impl From<MediaError> for GatewayError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::BadInput(msg) => Self::BadRequest(msg),
            MediaError::Timeout(_) => Self::SubprocessTimeout,
            MediaError::Io(io) => Self::Internal(io.to_string()),
            other => Self::Upstream(truncate(other.to_string())),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            GatewayError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Upstream("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::Timeout(30).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::SubprocessTimeout.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn backend_rejection_maps_to_upstream_with_payload() {
        let err: GatewayError =
            ComfyError::Backend(r#"{"37": "node 37 missing image"}"#.into()).into();
        match &err {
            GatewayError::Upstream(detail) => assert!(detail.contains("node 37 missing image")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn comfy_timeout_carries_minutes() {
        let err: GatewayError = ComfyError::Timeout(30).into();
        assert_eq!(err.to_string(), "processing exceeded 30 minutes");
    }

    #[test]
    fn media_bad_input_is_client_error() {
        let err: GatewayError = MediaError::BadInput("need at least 2 videos".into()).into();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn media_timeout_is_gateway_timeout() {
        let err: GatewayError = MediaError::Timeout(300).into();
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn session_not_found_maps_to_404() {
        let err: GatewayError = SessionError::NotFound {
            session: "s".into(),
            name: "a.mp4".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn oversized_upstream_detail_is_truncated() {
        let err: GatewayError = ComfyError::Backend("x".repeat(5000)).into();
        match err {
            GatewayError::Upstream(detail) => assert!(detail.chars().count() < 2100),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
