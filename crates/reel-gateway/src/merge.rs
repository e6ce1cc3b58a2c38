// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Merge gateway: pure post-production over the encoder.
//!
//! Three operations: ordered concat (stream-copy with re-encode fallback),
//! speech-under-picture overlay, and ambient mixing into an existing
//! track.  Each has a multipart form variant and a session variant that
//! reads inputs from and writes the result back into the session
//! workspace.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use reel_session::SessionStore;

use crate::outputs::OutputDir;
use crate::session_routes::bad_field;
use crate::{session_routes, GatewayError};

pub struct MergeGateway {
    outputs: OutputDir,
    /// Scratch space for multipart uploads; swept with the outputs.
    temp: OutputDir,
    sessions: SessionStore,
}

impl MergeGateway {
    pub fn new(outputs: OutputDir, temp: OutputDir, sessions: SessionStore) -> Self {
        Self {
            outputs,
            temp,
            sessions,
        }
    }

    /// Session artifacts referenced by name, resolved to paths for the
    /// encoder.
    fn session_paths(
        &self,
        session_id: &str,
        names: &[String],
    ) -> Result<Vec<PathBuf>, GatewayError> {
        names
            .iter()
            .map(|name| Ok(self.sessions.artifact_path(session_id, name)?))
            .collect()
    }

    /// Move an encoder output into the session under `name`.
    fn adopt_into_session(
        &self,
        session_id: &str,
        name: &str,
        produced: &std::path::Path,
    ) -> Result<(), GatewayError> {
        let bytes = std::fs::read(produced).map_err(|e| GatewayError::Internal(e.to_string()))?;
        self.sessions.put(session_id, name, &bytes)?;
        let _ = std::fs::remove_file(produced);
        Ok(())
    }
}

pub fn router(gateway: Arc<MergeGateway>) -> Router {
    let outputs = gateway.outputs.clone();
    let sessions = gateway.sessions.clone();
    Router::new()
        .route("/", get(capabilities))
        .route("/health", get(health))
        .route("/merge", post(merge_form))
        .route("/merge/session", post(merge_session))
        .route("/merge/audio-video", post(merge_audio_video_form))
        .route("/merge/audio-video/session", post(merge_audio_video_session))
        .route("/mix", post(mix_form))
        .route("/mix/session", post(mix_session))
        .layer(DefaultBodyLimit::disable())
        .layer(tower_http::limit::RequestBodyLimitLayer::new(2 * 1024 * 1024 * 1024))
        .with_state(gateway)
        .merge(crate::outputs::router(outputs))
        .merge(session_routes::router(sessions))
}

async fn capabilities() -> Json<serde_json::Value> {
    Json(json!({
        "message": "reel merge gateway",
        "endpoints": {
            "POST /merge": "concat uploaded videos in order (multipart)",
            "POST /merge/session": "concat session videos into the session",
            "POST /merge/audio-video": "video + audio → remuxed video (multipart)",
            "POST /merge/audio-video/session": "session video + audio → remuxed video",
            "POST /mix": "video + ambient → mixed audio track (multipart)",
            "POST /mix/session": "session video + ambient → mixed audio track",
            "GET /output/{name}": "fetch result",
            "GET /health": "liveness",
        }
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Multipart concat: files are adopted in field order.
async fn merge_form(
    State(gateway): State<Arc<MergeGateway>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let mut inputs = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.file_name().is_none() {
            continue;
        }
        let original = field.file_name().unwrap_or("video.mp4").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| GatewayError::BadRequest(format!("malformed multipart field: {e}")))?;

        let ext = original.rsplit('.').next().unwrap_or("mp4");
        let name = gateway.temp.unique_name("merge_in", ext);
        let path = gateway
            .temp
            .save(&name, &bytes)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        inputs.push(path);
    }

    if inputs.len() < 2 {
        // Clean up whatever was staged before rejecting.
        for path in &inputs {
            let _ = std::fs::remove_file(path);
        }
        return Err(GatewayError::BadRequest(format!(
            "need at least 2 videos to merge, got {}",
            inputs.len()
        )));
    }

    let output_name = gateway.outputs.unique_name("merged", "mp4");
    let output = gateway.outputs.path().join(&output_name);
    let outcome = reel_media::concat(&inputs, &output).await;

    for path in &inputs {
        let _ = std::fs::remove_file(path);
    }
    let outcome = outcome?;

    info!(
        inputs = inputs.len(),
        duration = outcome.duration,
        reencoded = outcome.reencoded,
        "videos merged"
    );

    Ok(Json(json!({
        "success": true,
        "merged_file": output_name,
        "duration": outcome.duration,
        "reencoded": outcome.reencoded,
        "message": format!("{} videos merged", inputs.len()),
    })))
}

#[derive(Debug, Deserialize)]
struct SessionMergeRequest {
    session_id: String,
    /// Session artifact names, concatenated in the given order.
    filenames: Vec<String>,
    #[serde(default)]
    output_filename: Option<String>,
}

async fn merge_session(
    State(gateway): State<Arc<MergeGateway>>,
    Json(req): Json<SessionMergeRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    if req.filenames.len() < 2 {
        return Err(GatewayError::BadRequest(format!(
            "need at least 2 videos to merge, got {}",
            req.filenames.len()
        )));
    }

    let inputs = gateway.session_paths(&req.session_id, &req.filenames)?;
    let scratch_name = gateway.outputs.unique_name("merged", "mp4");
    let scratch = gateway.outputs.path().join(&scratch_name);

    let outcome = reel_media::concat(&inputs, &scratch).await?;

    let name = req
        .output_filename
        .unwrap_or_else(|| "final.mp4".to_string());
    gateway.adopt_into_session(&req.session_id, &name, &scratch)?;

    info!(
        session = %req.session_id,
        output = %name,
        duration = outcome.duration,
        "session videos merged"
    );

    Ok(Json(json!({
        "success": true,
        "session_id": req.session_id,
        "filename": name,
        "duration": outcome.duration,
        "reencoded": outcome.reencoded,
    })))
}

/// Multipart inputs staged to temp files for one encoder call.
async fn read_video_audio_fields(
    gateway: &MergeGateway,
    multipart: &mut Multipart,
) -> Result<(PathBuf, PathBuf, Vec<(String, String)>), GatewayError> {
    let mut video = None;
    let mut audio = None;
    let mut texts = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("video") => {
                let original = field.file_name().unwrap_or("video.mp4").to_string();
                let bytes = field.bytes().await.map_err(bad_field)?;
                let ext = original.rsplit('.').next().unwrap_or("mp4");
                let name = gateway.temp.unique_name("mix_v", ext);
                video = Some(
                    gateway
                        .temp
                        .save(&name, &bytes)
                        .map_err(|e| GatewayError::Internal(e.to_string()))?,
                );
            }
            Some("audio") => {
                let original = field.file_name().unwrap_or("audio.wav").to_string();
                let bytes = field.bytes().await.map_err(bad_field)?;
                let ext = original.rsplit('.').next().unwrap_or("wav");
                let name = gateway.temp.unique_name("mix_a", ext);
                audio = Some(
                    gateway
                        .temp
                        .save(&name, &bytes)
                        .map_err(|e| GatewayError::Internal(e.to_string()))?,
                );
            }
            Some(other) => {
                let key = other.to_string();
                texts.push((key, field.text().await.map_err(bad_field)?));
            }
            None => {}
        }
    }

    let video = video.ok_or_else(|| GatewayError::BadRequest("video field is required".into()))?;
    let audio = audio.ok_or_else(|| GatewayError::BadRequest("audio field is required".into()))?;
    Ok((video, audio, texts))
}

/// Multipart overlay: speech track under the uploaded video's picture.
async fn merge_audio_video_form(
    State(gateway): State<Arc<MergeGateway>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let (video, audio, _) = read_video_audio_fields(&gateway, &mut multipart).await?;

    let output_name = gateway.outputs.unique_name("av", "mp4");
    let output = gateway.outputs.path().join(&output_name);
    let result = reel_media::merge_audio_video(&video, &audio, &output).await;

    let _ = std::fs::remove_file(&video);
    let _ = std::fs::remove_file(&audio);
    let outcome = result?;

    Ok(Json(json!({
        "success": true,
        "merged_file": output_name,
        "duration": outcome.duration,
    })))
}

/// Multipart mix: ambient track folded under the uploaded video's audio.
async fn mix_form(
    State(gateway): State<Arc<MergeGateway>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let (video, audio, texts) = read_video_audio_fields(&gateway, &mut multipart).await?;

    let gain = |key: &str, default: f32| -> Result<f32, GatewayError> {
        match texts.iter().find(|(k, _)| k == key) {
            Some((_, value)) => value.trim().parse().map_err(|_| {
                GatewayError::BadRequest(format!("invalid {key} value: {value}"))
            }),
            None => Ok(default),
        }
    };
    let v_gain = gain("v_gain", default_v_gain())?;
    let a_gain = gain("a_gain", default_a_gain())?;

    let output_name = gateway.outputs.unique_name("mix", "mp4");
    let output = gateway.outputs.path().join(&output_name);
    let result = reel_media::mix_audio(&video, &audio, &output, v_gain, a_gain).await;

    let _ = std::fs::remove_file(&video);
    let _ = std::fs::remove_file(&audio);
    let outcome = result?;

    Ok(Json(json!({
        "success": true,
        "merged_file": output_name,
        "duration": outcome.duration,
        "v_gain": v_gain,
        "a_gain": a_gain,
    })))
}

#[derive(Debug, Deserialize)]
struct SessionAudioVideoRequest {
    session_id: String,
    video_filename: String,
    audio_filename: String,
    #[serde(default)]
    output_filename: Option<String>,
}

/// Replace the video's audio with a session track (speech under picture).
async fn merge_audio_video_session(
    State(gateway): State<Arc<MergeGateway>>,
    Json(req): Json<SessionAudioVideoRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let video = gateway
        .sessions
        .artifact_path(&req.session_id, &req.video_filename)?;
    let audio = gateway
        .sessions
        .artifact_path(&req.session_id, &req.audio_filename)?;

    let scratch_name = gateway.outputs.unique_name("av", "mp4");
    let scratch = gateway.outputs.path().join(&scratch_name);

    let outcome = reel_media::merge_audio_video(&video, &audio, &scratch).await?;

    let name = req
        .output_filename
        .unwrap_or_else(|| "merged_av.mp4".to_string());
    gateway.adopt_into_session(&req.session_id, &name, &scratch)?;

    Ok(Json(json!({
        "success": true,
        "session_id": req.session_id,
        "filename": name,
        "duration": outcome.duration,
    })))
}

#[derive(Debug, Deserialize)]
struct SessionMixRequest {
    session_id: String,
    /// Video that already carries a speech track.
    video_filename: String,
    /// Ambient/foley track to fold underneath.
    audio_filename: String,
    #[serde(default = "default_v_gain")]
    v_gain: f32,
    #[serde(default = "default_a_gain")]
    a_gain: f32,
    #[serde(default)]
    output_filename: Option<String>,
}

fn default_v_gain() -> f32 {
    1.0
}
fn default_a_gain() -> f32 {
    0.3
}

/// Fold an ambient track under the existing audio.  Gains default to full
/// speech and attenuated ambience.
async fn mix_session(
    State(gateway): State<Arc<MergeGateway>>,
    Json(req): Json<SessionMixRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let video = gateway
        .sessions
        .artifact_path(&req.session_id, &req.video_filename)?;
    let audio = gateway
        .sessions
        .artifact_path(&req.session_id, &req.audio_filename)?;

    let scratch_name = gateway.outputs.unique_name("mix", "mp4");
    let scratch = gateway.outputs.path().join(&scratch_name);

    let outcome = reel_media::mix_audio(&video, &audio, &scratch, req.v_gain, req.a_gain).await?;

    let name = req
        .output_filename
        .unwrap_or_else(|| "mixed.mp4".to_string());
    gateway.adopt_into_session(&req.session_id, &name, &scratch)?;

    Ok(Json(json!({
        "success": true,
        "session_id": req.session_id,
        "filename": name,
        "duration": outcome.duration,
        "v_gain": req.v_gain,
        "a_gain": req.a_gain,
    })))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> (tempfile::TempDir, MergeGateway) {
        let dir = tempfile::tempdir().unwrap();
        let gw = MergeGateway::new(
            OutputDir::new(dir.path().join("outputs")).unwrap(),
            OutputDir::new(dir.path().join("temp")).unwrap(),
            SessionStore::new(dir.path().join("sessions")),
        );
        (dir, gw)
    }

    #[test]
    fn session_paths_resolve_existing_artifacts() {
        let (_dir, gw) = gateway();
        gw.sessions.put("s1", "scene_001.mp4", b"a").unwrap();
        gw.sessions.put("s1", "scene_002.mp4", b"b").unwrap();

        let paths = gw
            .session_paths("s1", &["scene_001.mp4".into(), "scene_002.mp4".into()])
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.is_file()));
    }

    #[test]
    fn session_paths_missing_artifact_is_404() {
        let (_dir, gw) = gateway();
        gw.sessions.put("s1", "scene_001.mp4", b"a").unwrap();

        let err = gw
            .session_paths("s1", &["scene_001.mp4".into(), "ghost.mp4".into()])
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[test]
    fn adopt_moves_bytes_into_session() {
        let (dir, gw) = gateway();
        let produced = dir.path().join("scratch.mp4");
        std::fs::write(&produced, b"final bytes").unwrap();

        gw.adopt_into_session("s1", "final.mp4", &produced).unwrap();

        assert!(!produced.exists(), "scratch file must be removed");
        assert_eq!(gw.sessions.get("s1", "final.mp4").unwrap(), b"final bytes");
    }

    #[test]
    fn default_gains_keep_ambience_attenuated() {
        assert!((default_v_gain() - 1.0).abs() < f32::EPSILON);
        assert!((default_a_gain() - 0.3).abs() < f32::EPSILON);
    }
}
