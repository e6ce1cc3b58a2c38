// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session workspace route family, mounted by every gateway:
//!
//! - `POST /session/upload` — multipart staging into a session
//! - `GET /session/{id}/files` — listing
//! - `GET /session/{id}/file/{name}` — artifact fetch
//! - `DELETE /session/{id}` — recursive removal

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use reel_session::SessionStore;

use crate::{content_type_for, GatewayError};

/// Artifacts are whole videos; the stock 2 MB body ceiling is far too low.
const UPLOAD_LIMIT_BYTES: usize = 1024 * 1024 * 1024;

pub fn router(store: SessionStore) -> Router {
    Router::new()
        .route("/session/upload", post(upload))
        .route("/session/:id/files", get(list_files))
        .route("/session/:id/file/:name", get(fetch_file))
        .route("/session/:id", axum::routing::delete(delete_session))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(UPLOAD_LIMIT_BYTES))
        .with_state(store)
}

/// Multipart fields: `session_id` (text) plus one file field.  The stored
/// name is the uploaded filename unless a `filename` text field overrides
/// it.
async fn upload(
    State(store): State<SessionStore>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let mut session_id = None;
    let mut override_name = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("session_id") => {
                session_id = Some(field.text().await.map_err(bad_field)?);
            }
            Some("filename") => {
                override_name = Some(field.text().await.map_err(bad_field)?);
            }
            _ => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload.bin".to_string());
                let bytes = field.bytes().await.map_err(bad_field)?;
                file = Some((name, bytes.to_vec()));
            }
        }
    }

    let session_id =
        session_id.ok_or_else(|| GatewayError::BadRequest("session_id field is required".into()))?;
    let (name, bytes) =
        file.ok_or_else(|| GatewayError::BadRequest("file field is required".into()))?;
    let name = override_name.unwrap_or(name);

    let stored = store.put(&session_id, &name, &bytes)?;
    info!(session = %session_id, name = %stored.name, size = stored.size, "session upload");

    Ok(Json(json!({
        "success": true,
        "session_id": stored.session_id,
        "filename": stored.name,
        "size": stored.size,
    })))
}

async fn list_files(
    State(store): State<SessionStore>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let listing = store.list(&session_id)?;
    Ok(Json(serde_json::to_value(&listing).unwrap_or_default()))
}

async fn fetch_file(
    State(store): State<SessionStore>,
    Path((session_id, name)): Path<(String, String)>,
) -> Result<Response, GatewayError> {
    let bytes = store.get(&session_id, &name)?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&name).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn delete_session(
    State(store): State<SessionStore>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let removed = store.delete(&session_id)?;
    info!(session = %session_id, removed, "session deleted");
    Ok(Json(json!({
        "success": true,
        "session_id": session_id,
        "files_removed": removed,
    })))
}

pub(crate) fn bad_field(e: axum::extract::multipart::MultipartError) -> GatewayError {
    GatewayError::BadRequest(format!("malformed multipart field: {e}"))
}
