// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Local output directory handling shared by every gateway: unique
//! timestamped filenames plus the `GET /outputs`, `GET /output/{name}` and
//! `DELETE /output/{name}` route family.

use std::path::{Path, PathBuf};

use axum::extract::{Path as AxumPath, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use crate::{content_type_for, GatewayError};

/// A gateway's local output directory.
#[derive(Debug, Clone)]
pub struct OutputDir {
    dir: PathBuf,
}

impl OutputDir {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// `{prefix}_{%Y%m%d_%H%M%S}_{short-uuid}.{ext}` — unique within the
    /// directory even for runs landing in the same second.
    pub fn unique_name(&self, prefix: &str, ext: &str) -> String {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let short = &uuid::Uuid::new_v4().simple().to_string()[..8];
        format!("{prefix}_{timestamp}_{short}.{ext}")
    }

    pub fn save(&self, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Path of an existing output, or `NotFound`.
    pub fn existing(&self, name: &str) -> Result<PathBuf, GatewayError> {
        if name.contains('/') || name.contains("..") || name.contains('\\') {
            return Err(GatewayError::BadRequest(format!(
                "invalid output name: {name}"
            )));
        }
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(GatewayError::NotFound(format!("no such output: {name}")));
        }
        Ok(path)
    }
}

/// The shared local-output route family, self-contained with its state.
pub fn router(outputs: OutputDir) -> Router {
    Router::new()
        .route("/outputs", get(list_outputs))
        .route("/output/:name", get(fetch_output).delete(delete_output))
        .with_state(outputs)
}

async fn list_outputs(State(outputs): State<OutputDir>) -> Result<Json<serde_json::Value>, GatewayError> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(outputs.path())
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    for entry in entries.flatten() {
        let meta = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let created = meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        files.push(json!({
            "filename": entry.file_name().to_string_lossy(),
            "size_mb": (meta.len() as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            "created": chrono::DateTime::<chrono::Utc>::from(created).to_rfc3339(),
        }));
    }
    files.sort_by(|a, b| b["created"].as_str().cmp(&a["created"].as_str()));
    let count = files.len();
    Ok(Json(json!({ "files": files, "count": count })))
}

async fn fetch_output(
    State(outputs): State<OutputDir>,
    AxumPath(name): AxumPath<String>,
) -> Result<Response, GatewayError> {
    let path = outputs.existing(&name)?;
    let bytes = std::fs::read(&path).map_err(|e| GatewayError::Internal(e.to_string()))?;
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

async fn delete_output(
    State(outputs): State<OutputDir>,
    AxumPath(name): AxumPath<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let path = outputs.existing(&name)?;
    std::fs::remove_file(&path).map_err(|e| GatewayError::Internal(e.to_string()))?;
    info!(name = %name, "output deleted");
    Ok(Json(json!({ "success": true, "message": format!("{name} deleted") })))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names_differ_within_one_second() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = OutputDir::new(dir.path().join("outputs")).unwrap();
        let a = outputs.unique_name("i2v", "mp4");
        let b = outputs.unique_name("i2v", "mp4");
        assert_ne!(a, b);
        assert!(a.starts_with("i2v_"));
        assert!(a.ends_with(".mp4"));
    }

    #[test]
    fn existing_rejects_path_components() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = OutputDir::new(dir.path().join("outputs")).unwrap();
        assert!(matches!(
            outputs.existing("../escape.mp4"),
            Err(GatewayError::BadRequest(_))
        ));
    }

    #[test]
    fn existing_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = OutputDir::new(dir.path().join("outputs")).unwrap();
        assert!(matches!(
            outputs.existing("ghost.mp4"),
            Err(GatewayError::NotFound(_))
        ));
    }

    #[test]
    fn save_then_existing_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = OutputDir::new(dir.path().join("outputs")).unwrap();
        let name = outputs.unique_name("tts", "mp3");
        outputs.save(&name, b"audio").unwrap();
        let path = outputs.existing(&name).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"audio");
    }
}
