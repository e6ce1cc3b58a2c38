// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Audio gateway: speech synthesis through the TTS provider and ambient /
//! foley synthesis through the node-graph backend.
//!
//! Speech lands as `tts_<seq>.mp3` in the session so the lip-sync gateway
//! can pick it up by name; ambient runs take a scene video in and return
//! the same video with an ambient track rendered against it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use reel_comfy::{load_workflow, ComfyClient, GraphPatch, MediaKind};
use reel_session::SessionStore;

use crate::outputs::OutputDir;
use crate::tts::{TtsClient, VoiceSettings};
use crate::{session_routes, GatewayError};

/// Ambient synthesis is a video-length diffusion run.
const AMBIENT_DEADLINE: Duration = Duration::from_secs(1800);

pub struct AudioGateway {
    tts: Option<TtsClient>,
    /// Ambient backend; `None` disables the `/ambient` routes' function.
    comfy: Option<ComfyClient>,
    ambient_workflow: Option<PathBuf>,
    outputs: OutputDir,
    sessions: SessionStore,
}

impl AudioGateway {
    pub fn new(
        tts: Option<TtsClient>,
        comfy: Option<ComfyClient>,
        ambient_workflow: Option<PathBuf>,
        outputs: OutputDir,
        sessions: SessionStore,
    ) -> Self {
        Self {
            tts,
            comfy,
            ambient_workflow,
            outputs,
            sessions,
        }
    }

    fn tts(&self) -> Result<&TtsClient, GatewayError> {
        self.tts.as_ref().ok_or_else(|| {
            GatewayError::BadRequest(
                "speech synthesis is not configured; set TTS_API_KEY and TTS_VOICE_ID".into(),
            )
        })
    }

    fn ambient(&self) -> Result<(&ComfyClient, &PathBuf), GatewayError> {
        match (&self.comfy, &self.ambient_workflow) {
            (Some(comfy), Some(workflow)) => Ok((comfy, workflow)),
            _ => Err(GatewayError::BadRequest(
                "ambient synthesis is not configured; set the ambient backend and workflow".into(),
            )),
        }
    }
}

pub fn router(gateway: Arc<AudioGateway>) -> Router {
    let outputs = gateway.outputs.clone();
    let sessions = gateway.sessions.clone();
    Router::new()
        .route("/", get(capabilities))
        .route("/health", get(health))
        .route("/generate", post(generate))
        .route("/session/generate", post(session_generate))
        .route("/ambient/session", post(ambient_session))
        .with_state(gateway)
        .merge(crate::outputs::router(outputs))
        .merge(session_routes::router(sessions))
}

async fn capabilities() -> Json<serde_json::Value> {
    Json(json!({
        "message": "reel audio gateway",
        "endpoints": {
            "POST /generate": "text → speech (local output)",
            "POST /session/generate": "text → speech into a session",
            "POST /ambient/session": "session video + sound prompt → ambient track mixed in",
            "GET /output/{name}": "fetch result",
            "GET /health": "liveness",
        }
    }))
}

async fn health(State(gateway): State<Arc<AudioGateway>>) -> Json<serde_json::Value> {
    let ambient_connected = match &gateway.comfy {
        Some(comfy) => comfy.health().await,
        None => false,
    };
    Json(json!({
        "status": "ok",
        "tts_configured": gateway.tts.is_some(),
        "ambient_configured": gateway.ambient_workflow.is_some(),
        "ambient_connected": ambient_connected,
    }))
}

#[derive(Debug, Deserialize)]
struct TtsHttpRequest {
    text: String,
    #[serde(default)]
    voice_id: Option<String>,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    stability: Option<f32>,
    #[serde(default)]
    similarity_boost: Option<f32>,
    #[serde(default)]
    style: Option<f32>,
    #[serde(default)]
    use_speaker_boost: Option<bool>,
}

impl TtsHttpRequest {
    fn settings(&self) -> VoiceSettings {
        let defaults = VoiceSettings::default();
        VoiceSettings {
            stability: self.stability.unwrap_or(defaults.stability),
            similarity_boost: self.similarity_boost.unwrap_or(defaults.similarity_boost),
            style: self.style.unwrap_or(defaults.style),
            use_speaker_boost: self.use_speaker_boost.unwrap_or(defaults.use_speaker_boost),
        }
    }
}

async fn generate(
    State(gateway): State<Arc<AudioGateway>>,
    Json(req): Json<TtsHttpRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let tts = gateway.tts()?;
    let bytes = tts
        .synthesize(
            &req.text,
            req.voice_id.as_deref(),
            req.model_id.as_deref(),
            &req.settings(),
        )
        .await?;

    let name = gateway.outputs.unique_name("tts", "mp3");
    gateway
        .outputs
        .save(&name, &bytes)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "filename": name,
        "audio_url": format!("/output/{name}"),
    })))
}

#[derive(Debug, Deserialize)]
struct SessionTtsRequest {
    session_id: String,
    #[serde(flatten)]
    tts: TtsHttpRequest,
    /// Stored name inside the session; `tts_<seq>.mp3` by convention when
    /// rendering one track per shot.
    #[serde(default)]
    output_filename: Option<String>,
}

async fn session_generate(
    State(gateway): State<Arc<AudioGateway>>,
    Json(req): Json<SessionTtsRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let tts = gateway.tts()?;
    let bytes = tts
        .synthesize(
            &req.tts.text,
            req.tts.voice_id.as_deref(),
            req.tts.model_id.as_deref(),
            &req.tts.settings(),
        )
        .await?;

    let name = req
        .output_filename
        .unwrap_or_else(|| "tts_audio.mp3".to_string());
    let stored = gateway.sessions.put(&req.session_id, &name, &bytes)?;

    info!(session = %stored.session_id, name = %stored.name, "speech written to session");

    Ok(Json(json!({
        "success": true,
        "session_id": stored.session_id,
        "filename": stored.name,
        "session_path": format!("/session/{}/file/{}", stored.session_id, stored.name),
        "message": "speech generated",
    })))
}

#[derive(Debug, Deserialize)]
struct AmbientSessionRequest {
    session_id: String,
    /// Scene video already in the session.
    video_filename: String,
    /// English ambient/foley description (the shot's
    /// `background_sounds_prompt`).
    prompt: String,
    #[serde(default)]
    output_filename: Option<String>,
    #[serde(default = "default_fps")]
    fps: i64,
    #[serde(default)]
    seed: Option<u64>,
}

fn default_fps() -> i64 {
    24
}

/// Render an ambient track against a scene video.  The graph returns the
/// video with the generated track muxed in, which goes back into the
/// session for the merge gateway's final mix.
async fn ambient_session(
    State(gateway): State<Arc<AudioGateway>>,
    Json(req): Json<AmbientSessionRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    if req.prompt.trim().is_empty() {
        return Err(GatewayError::BadRequest(
            "prompt must not be empty; skip ambient synthesis for silent shots".into(),
        ));
    }

    let (comfy, workflow_path) = gateway.ambient()?;
    let video = gateway.sessions.get(&req.session_id, &req.video_filename)?;

    let short = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let staged = comfy
        .upload_file(video, &format!("ambient_{short}.mp4"), MediaKind::Video)
        .await?;

    let template = load_workflow(workflow_path)?;
    let patch = GraphPatch {
        video: Some(staged),
        ambient_prompt: Some(req.prompt.clone()),
        fps: Some(req.fps),
        seed: req.seed,
        ..Default::default()
    };
    let graph = patch.apply(&template);

    let outputs = comfy.execute(&graph, AMBIENT_DEADLINE).await?;
    let bytes = comfy.fetch_output(&outputs[0]).await?;

    let name = req
        .output_filename
        .unwrap_or_else(|| format!("ambient_{}", req.video_filename));
    let stored = gateway.sessions.put(&req.session_id, &name, &bytes)?;

    Ok(Json(json!({
        "success": true,
        "session_id": stored.session_id,
        "filename": stored.name,
        "message": "ambient track generated",
    })))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_gateway() -> AudioGateway {
        let dir = tempfile::tempdir().unwrap();
        AudioGateway::new(
            None,
            None,
            None,
            OutputDir::new(dir.path().join("outputs")).unwrap(),
            SessionStore::new(dir.path().join("sessions")),
        )
    }

    #[test]
    fn missing_tts_config_is_a_client_error() {
        let gw = bare_gateway();
        assert!(matches!(gw.tts(), Err(GatewayError::BadRequest(_))));
    }

    #[test]
    fn missing_ambient_config_is_a_client_error() {
        let gw = bare_gateway();
        assert!(matches!(gw.ambient(), Err(GatewayError::BadRequest(_))));
    }

    #[test]
    fn request_settings_override_only_given_fields() {
        let req = TtsHttpRequest {
            text: "안녕하세요".into(),
            voice_id: None,
            model_id: None,
            stability: Some(0.5),
            similarity_boost: None,
            style: None,
            use_speaker_boost: None,
        };
        let s = req.settings();
        assert!((s.stability - 0.5).abs() < f32::EPSILON);
        assert!((s.similarity_boost - 0.8).abs() < f32::EPSILON);
    }
}
