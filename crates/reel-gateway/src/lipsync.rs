// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Lip-sync gateway: video + speech → retimed-mouth video over the
//! node-graph backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use reel_comfy::{load_workflow, ComfyClient, GraphPatch, MediaKind};
use reel_session::SessionStore;

use crate::outputs::OutputDir;
use crate::{session_routes, GatewayError};

/// Wall clock for one lip-sync run.
const LIPSYNC_DEADLINE: Duration = Duration::from_secs(1800);

/// Frame rate bound consistently into the graph's video nodes.
const DEFAULT_FPS: i64 = 25;

pub struct LipsyncGateway {
    comfy: ComfyClient,
    workflow_path: PathBuf,
    outputs: OutputDir,
    sessions: SessionStore,
    deadline: Duration,
}

impl LipsyncGateway {
    pub fn new(
        comfy: ComfyClient,
        workflow_path: PathBuf,
        outputs: OutputDir,
        sessions: SessionStore,
    ) -> Self {
        Self {
            comfy,
            workflow_path,
            outputs,
            sessions,
            deadline: LIPSYNC_DEADLINE,
        }
    }

    /// Override the run deadline (config `lipsync.timeout_secs`).
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    async fn run_lipsync(
        &self,
        video_bytes: Vec<u8>,
        audio_bytes: Vec<u8>,
        audio_ext: &str,
        fps: i64,
        seed: Option<u64>,
    ) -> Result<Vec<u8>, GatewayError> {
        let short = &uuid::Uuid::new_v4().simple().to_string()[..8];
        let video_name = format!("face_{short}.mp4");
        let audio_name = format!("speech_{short}.{audio_ext}");

        let staged_video = self
            .comfy
            .upload_file(video_bytes, &video_name, MediaKind::Video)
            .await?;
        let staged_audio = self
            .comfy
            .upload_file(audio_bytes, &audio_name, MediaKind::Audio)
            .await?;

        let template = load_workflow(&self.workflow_path)?;
        let patch = GraphPatch {
            video: Some(staged_video),
            audio: Some(staged_audio),
            fps: Some(fps),
            seed,
            ..Default::default()
        };
        let graph = patch.apply(&template);

        let outputs = self.comfy.execute(&graph, self.deadline).await?;
        let bytes = self.comfy.fetch_output(&outputs[0]).await?;
        Ok(bytes)
    }
}

pub fn router(gateway: Arc<LipsyncGateway>) -> Router {
    let outputs = gateway.outputs.clone();
    let sessions = gateway.sessions.clone();
    Router::new()
        .route("/", get(capabilities))
        .route("/health", get(health))
        .route("/lipsync", post(lipsync_form))
        .route("/lipsync/session", post(lipsync_session))
        .layer(DefaultBodyLimit::disable())
        .layer(tower_http::limit::RequestBodyLimitLayer::new(1024 * 1024 * 1024))
        .with_state(gateway)
        .merge(crate::outputs::router(outputs))
        .merge(session_routes::router(sessions))
}

async fn capabilities() -> Json<serde_json::Value> {
    Json(json!({
        "message": "reel lip-sync gateway",
        "endpoints": {
            "POST /lipsync": "face video + speech audio → synced video (multipart)",
            "POST /lipsync/session": "session video + audio → synced video into the session",
            "GET /output/{name}": "fetch result",
            "GET /health": "liveness",
        }
    }))
}

async fn health(State(gateway): State<Arc<LipsyncGateway>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "backend_url": gateway.comfy.base_url(),
        "backend_connected": gateway.comfy.health().await,
        "workflow_exists": gateway.workflow_path.is_file(),
    }))
}

async fn lipsync_form(
    State(gateway): State<Arc<LipsyncGateway>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let started = std::time::Instant::now();

    let mut video: Option<Vec<u8>> = None;
    let mut audio: Option<(String, Vec<u8>)> = None;
    let mut fps = DEFAULT_FPS;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("face_video") | Some("video") => {
                video = Some(field.bytes().await.map_err(bad_field)?.to_vec());
            }
            Some("audio_file") | Some("audio") => {
                let ext = field
                    .file_name()
                    .and_then(|n| n.rsplit('.').next())
                    .unwrap_or("wav")
                    .to_string();
                audio = Some((ext, field.bytes().await.map_err(bad_field)?.to_vec()));
            }
            Some("fps") => {
                let text = field.text().await.map_err(bad_field)?;
                fps = text.trim().parse().map_err(|_| {
                    GatewayError::BadRequest(format!("invalid fps value: {text}"))
                })?;
            }
            _ => {}
        }
    }

    let video =
        video.ok_or_else(|| GatewayError::BadRequest("face_video field is required".into()))?;
    let (audio_ext, audio) =
        audio.ok_or_else(|| GatewayError::BadRequest("audio_file field is required".into()))?;

    let bytes = gateway
        .run_lipsync(video, audio, &audio_ext, fps, None)
        .await?;

    let name = gateway.outputs.unique_name("lipsync", "mp4");
    gateway
        .outputs
        .save(&name, &bytes)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "video_file": name,
        "message": "lipsync video generated",
        "processing_time": round2(started.elapsed().as_secs_f64()),
    })))
}

#[derive(Debug, Deserialize)]
struct SessionLipsyncRequest {
    session_id: String,
    /// Scene video already in the session (from the video gateway).
    video_filename: String,
    /// Speech track already in the session (from the audio gateway).
    audio_filename: String,
    #[serde(default)]
    output_filename: Option<String>,
    #[serde(default)]
    fps: Option<i64>,
    #[serde(default)]
    seed: Option<u64>,
}

/// The session-protocol variant: both inputs are read from the session by
/// name and the result is written back under `lipsync.mp4` (or the
/// caller's name).
async fn lipsync_session(
    State(gateway): State<Arc<LipsyncGateway>>,
    Json(req): Json<SessionLipsyncRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let started = std::time::Instant::now();

    let video = gateway.sessions.get(&req.session_id, &req.video_filename)?;
    let audio = gateway.sessions.get(&req.session_id, &req.audio_filename)?;
    let audio_ext = req
        .audio_filename
        .rsplit('.')
        .next()
        .unwrap_or("wav")
        .to_string();

    let bytes = gateway
        .run_lipsync(
            video,
            audio,
            &audio_ext,
            req.fps.unwrap_or(DEFAULT_FPS),
            req.seed,
        )
        .await?;

    let name = req
        .output_filename
        .unwrap_or_else(|| "lipsync.mp4".to_string());
    let stored = gateway.sessions.put(&req.session_id, &name, &bytes)?;

    info!(
        session = %stored.session_id,
        output = %stored.name,
        "lipsync written to session"
    );

    Ok(Json(json!({
        "success": true,
        "session_id": stored.session_id,
        "filename": stored.name,
        "message": "lipsync video generated",
        "processing_time": round2(started.elapsed().as_secs_f64()),
    })))
}

fn bad_field(e: axum::extract::multipart::MultipartError) -> GatewayError {
    GatewayError::BadRequest(format!("malformed multipart field: {e}"))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
