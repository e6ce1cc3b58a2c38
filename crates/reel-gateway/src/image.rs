// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Image gateway: text-to-image and multi-reference edit over the
//! node-graph backend.
//!
//! The gateway carries one piece of capability state: the default persona
//! face.  When the bundled reference portrait exists under `assets/`, it is
//! pushed to the backend at startup and its backend name is cached; edit
//! requests opting into the persona path use that reference without an
//! upload of their own.  A missing asset is a structured 400, not a crash.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};

use reel_comfy::{load_workflow, ComfyClient, GraphPatch, MediaKind};
use reel_scenario::{ImageEditPrompt, T2iPrompt};
use reel_session::SessionStore;

use crate::outputs::OutputDir;
use crate::{session_routes, GatewayError};

/// Wall clock for one image run.
const IMAGE_DEADLINE: Duration = Duration::from_secs(600);

pub struct ImageGateway {
    comfy: ComfyClient,
    workflow_path: PathBuf,
    outputs: OutputDir,
    sessions: SessionStore,
    /// Bundled persona reference portrait (`assets/default_face.png`).
    face_asset: PathBuf,
    /// Backend name of the staged persona face, once staged.
    face: RwLock<Option<String>>,
    deadline: Duration,
}

impl ImageGateway {
    pub fn new(
        comfy: ComfyClient,
        workflow_path: PathBuf,
        outputs: OutputDir,
        sessions: SessionStore,
        face_asset: PathBuf,
    ) -> Self {
        Self {
            comfy,
            workflow_path,
            outputs,
            sessions,
            face_asset,
            face: RwLock::new(None),
            deadline: IMAGE_DEADLINE,
        }
    }

    /// Override the run deadline (config `image.timeout_secs`).
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Detect and stage the persona face at startup.  Failure is logged
    /// and retried lazily on first use — the backend may simply not be up
    /// yet.
    pub async fn rehydrate_face(&self) {
        if !self.face_asset.is_file() {
            info!(asset = %self.face_asset.display(), "no default face asset present");
            return;
        }
        match self.stage_face().await {
            Ok(name) => info!(face = %name, "default face staged on backend"),
            Err(e) => warn!(error = %e, "default face staging deferred"),
        }
    }

    async fn stage_face(&self) -> Result<String, GatewayError> {
        let bytes = std::fs::read(&self.face_asset)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let filename = self
            .face_asset
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default_face.png".to_string());
        let name = self
            .comfy
            .upload_file(bytes, &filename, MediaKind::Image)
            .await?;
        *self.face.write().await = Some(name.clone());
        Ok(name)
    }

    /// The persona capability check: cached backend name, or stage now, or
    /// a 400 telling the client to upload a face first.
    async fn ensure_face(&self) -> Result<String, GatewayError> {
        if let Some(name) = self.face.read().await.clone() {
            return Ok(name);
        }
        if !self.face_asset.is_file() {
            return Err(GatewayError::BadRequest(
                "default face asset is not available; upload a reference image first".into(),
            ));
        }
        self.stage_face().await
    }

    async fn run_graph(&self, patch: &GraphPatch) -> Result<Vec<u8>, GatewayError> {
        let template = load_workflow(&self.workflow_path)?;
        let graph = patch.apply(&template);
        let outputs = self.comfy.execute(&graph, self.deadline).await?;
        let bytes = self.comfy.fetch_output(&outputs[0]).await?;
        Ok(bytes)
    }
}

pub fn router(gateway: Arc<ImageGateway>) -> Router {
    let outputs = gateway.outputs.clone();
    let sessions = gateway.sessions.clone();
    Router::new()
        .route("/", get(capabilities))
        .route("/health", get(health))
        .route("/upload/image", post(upload_image))
        .route("/generate", post(generate))
        .route("/edit/json", post(edit_json))
        .route("/edit/form", post(edit_form))
        .route("/session/generate", post(session_generate))
        .route("/session/edit", post(session_edit))
        .layer(DefaultBodyLimit::disable())
        .layer(tower_http::limit::RequestBodyLimitLayer::new(256 * 1024 * 1024))
        .with_state(gateway)
        .merge(crate::outputs::router(outputs))
        .merge(session_routes::router(sessions))
}

async fn capabilities() -> Json<serde_json::Value> {
    Json(json!({
        "message": "reel image gateway",
        "endpoints": {
            "POST /upload/image": "stage an input image",
            "POST /generate": "text → image (JSON)",
            "POST /edit/json": "staged images + edit prompt → image",
            "POST /edit/form": "inline images + edit prompt → image",
            "POST /session/generate": "text → image into a session",
            "POST /session/edit": "session image + edit prompt → edited image in the session",
            "GET /output/{name}": "fetch result",
            "GET /health": "liveness",
        }
    }))
}

async fn health(State(gateway): State<Arc<ImageGateway>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "backend_url": gateway.comfy.base_url(),
        "backend_connected": gateway.comfy.health().await,
        "workflow_exists": gateway.workflow_path.is_file(),
        "default_face_ready": gateway.face.read().await.is_some(),
    }))
}

async fn upload_image(
    State(gateway): State<Arc<ImageGateway>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let (original_name, bytes) = read_file_field(&mut multipart).await?;

    let ext = original_name.rsplit('.').next().unwrap_or("png");
    let short = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let filename = format!("upload_{short}.{ext}");

    // Stage on the backend as well; a failure here is retried implicitly
    // when the graph runs, so it only warrants a warning.
    if let Err(e) = gateway
        .comfy
        .upload_file(bytes.clone(), &filename, MediaKind::Image)
        .await
    {
        warn!(error = %e, "backend staging failed, will retry on generate");
    }
    gateway
        .outputs
        .save(&filename, &bytes)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    Ok(Json(json!({ "success": true, "filename": filename })))
}

#[derive(Debug, Deserialize)]
struct T2iHttpRequest {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    t2i_prompt: Option<T2iPrompt>,
    #[serde(default = "default_size")]
    width: i64,
    #[serde(default = "default_size")]
    height: i64,
    #[serde(default = "default_steps")]
    steps: i64,
    #[serde(default = "default_cfg")]
    cfg: f64,
    #[serde(default)]
    seed: Option<u64>,
}

fn default_size() -> i64 {
    1024
}
// Turbo-distilled image model: few steps, guidance effectively off.
fn default_steps() -> i64 {
    9
}
fn default_cfg() -> f64 {
    1.0
}

fn flatten_t2i(prompt: &T2iPrompt) -> String {
    [
        &prompt.background,
        &prompt.character_pose_and_gaze,
        &prompt.product,
        &prompt.camera_angle,
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .map(|s| s.as_str())
    .collect::<Vec<_>>()
    .join(", ")
}

fn flatten_edit(prompt: &ImageEditPrompt) -> String {
    [
        &prompt.pose_change,
        &prompt.gaze_change,
        &prompt.expression,
        &prompt.additional_edits,
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .map(|s| s.as_str())
    .collect::<Vec<_>>()
    .join(", ")
}

impl T2iHttpRequest {
    fn prompt_text(&self) -> Result<String, GatewayError> {
        if let Some(p) = &self.prompt {
            if !p.trim().is_empty() {
                return Ok(p.clone());
            }
        }
        if let Some(structured) = &self.t2i_prompt {
            let text = flatten_t2i(structured);
            if !text.is_empty() {
                return Ok(text);
            }
        }
        Err(GatewayError::BadRequest(
            "either prompt or t2i_prompt is required".into(),
        ))
    }
}

async fn generate(
    State(gateway): State<Arc<ImageGateway>>,
    Json(req): Json<T2iHttpRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let started = std::time::Instant::now();
    let prompt = req.prompt_text()?;

    let patch = GraphPatch {
        prompt: Some(prompt),
        width: Some(req.width),
        height: Some(req.height),
        steps: Some(req.steps),
        cfg: Some(req.cfg),
        seed: req.seed,
        ..Default::default()
    };
    let bytes = gateway.run_graph(&patch).await?;

    let name = gateway.outputs.unique_name("t2i", "png");
    gateway
        .outputs
        .save(&name, &bytes)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "output_file": name,
        "message": "image generated",
        "processing_time": round2(started.elapsed().as_secs_f64()),
    })))
}

#[derive(Debug, Deserialize)]
struct EditHttpRequest {
    image1_filename: String,
    #[serde(default)]
    image2_filename: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    image_edit_prompt: Option<ImageEditPrompt>,
    /// Use the staged persona face as the identity reference.
    #[serde(default)]
    use_default_face: bool,
    #[serde(default)]
    seed: Option<u64>,
}

async fn edit_json(
    State(gateway): State<Arc<ImageGateway>>,
    Json(req): Json<EditHttpRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let started = std::time::Instant::now();

    let prompt = match (&req.prompt, &req.image_edit_prompt) {
        (Some(p), _) if !p.trim().is_empty() => p.clone(),
        (_, Some(structured)) => flatten_edit(structured),
        _ => {
            return Err(GatewayError::BadRequest(
                "either prompt or image_edit_prompt is required".into(),
            ))
        }
    };

    let image2 = match (&req.image2_filename, req.use_default_face) {
        (Some(name), _) => Some(name.clone()),
        (None, true) => Some(gateway.ensure_face().await?),
        (None, false) => None,
    };

    let patch = GraphPatch {
        image: Some(req.image1_filename.clone()),
        image2,
        prompt: Some(prompt),
        seed: req.seed,
        ..Default::default()
    };
    let bytes = gateway.run_graph(&patch).await?;

    let name = gateway.outputs.unique_name("edit", "png");
    gateway
        .outputs
        .save(&name, &bytes)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "output_file": name,
        "message": "image edited",
        "processing_time": round2(started.elapsed().as_secs_f64()),
    })))
}

/// Multipart variant of `/edit/json`: the image rides inline.
async fn edit_form(
    State(gateway): State<Arc<ImageGateway>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let started = std::time::Instant::now();

    let mut prompt = None;
    let mut image: Option<Vec<u8>> = None;
    let mut use_default_face = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("prompt") => prompt = Some(field.text().await.map_err(bad_field)?),
            Some("use_default_face") => {
                use_default_face = field.text().await.map_err(bad_field)? == "true";
            }
            Some("image") | Some("image1") => {
                image = Some(field.bytes().await.map_err(bad_field)?.to_vec());
            }
            _ => {}
        }
    }

    let prompt =
        prompt.ok_or_else(|| GatewayError::BadRequest("prompt field is required".into()))?;
    let image = image.ok_or_else(|| GatewayError::BadRequest("image field is required".into()))?;

    let short = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let staged = gateway
        .comfy
        .upload_file(image, &format!("edit_{short}.png"), MediaKind::Image)
        .await?;

    let image2 = if use_default_face {
        Some(gateway.ensure_face().await?)
    } else {
        None
    };

    let patch = GraphPatch {
        image: Some(staged),
        image2,
        prompt: Some(prompt),
        ..Default::default()
    };
    let bytes = gateway.run_graph(&patch).await?;

    let name = gateway.outputs.unique_name("edit", "png");
    gateway
        .outputs
        .save(&name, &bytes)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "output_file": name,
        "message": "image edited",
        "processing_time": round2(started.elapsed().as_secs_f64()),
    })))
}

#[derive(Debug, Deserialize)]
struct SessionT2iRequest {
    session_id: String,
    #[serde(flatten)]
    t2i: T2iHttpRequest,
    #[serde(default)]
    output_filename: Option<String>,
}

/// Same as `/generate`, but the result lands in the session workspace
/// where the video gateway picks it up by name.
async fn session_generate(
    State(gateway): State<Arc<ImageGateway>>,
    Json(req): Json<SessionT2iRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let prompt = req.t2i.prompt_text()?;

    let patch = GraphPatch {
        prompt: Some(prompt),
        width: Some(req.t2i.width),
        height: Some(req.t2i.height),
        steps: Some(req.t2i.steps),
        cfg: Some(req.t2i.cfg),
        seed: req.t2i.seed,
        ..Default::default()
    };
    let bytes = gateway.run_graph(&patch).await?;

    let name = req
        .output_filename
        .unwrap_or_else(|| gateway.outputs.unique_name("t2i", "png"));
    let stored = gateway.sessions.put(&req.session_id, &name, &bytes)?;

    Ok(Json(json!({
        "success": true,
        "session_id": stored.session_id,
        "filename": stored.name,
        "message": "image generated into session",
    })))
}

#[derive(Debug, Deserialize)]
struct SessionEditRequest {
    session_id: String,
    /// Name of a still already in the session (usually the previous shot's
    /// output).
    image_filename: String,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    image_edit_prompt: Option<ImageEditPrompt>,
    #[serde(default)]
    use_default_face: bool,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    output_filename: Option<String>,
}

/// Per-shot edit step of the pipeline: take a still out of the session,
/// apply the shot's edit prompt, and write the edited still back where the
/// video gateway will animate it.
async fn session_edit(
    State(gateway): State<Arc<ImageGateway>>,
    Json(req): Json<SessionEditRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let prompt = match (&req.prompt, &req.image_edit_prompt) {
        (Some(p), _) if !p.trim().is_empty() => p.clone(),
        (_, Some(structured)) => flatten_edit(structured),
        _ => {
            return Err(GatewayError::BadRequest(
                "either prompt or image_edit_prompt is required".into(),
            ))
        }
    };

    let bytes = gateway.sessions.get(&req.session_id, &req.image_filename)?;
    let short = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let staged = gateway
        .comfy
        .upload_file(bytes, &format!("edit_{short}.png"), MediaKind::Image)
        .await?;

    let image2 = if req.use_default_face {
        Some(gateway.ensure_face().await?)
    } else {
        None
    };

    let patch = GraphPatch {
        image: Some(staged),
        image2,
        prompt: Some(prompt),
        seed: req.seed,
        ..Default::default()
    };
    let edited = gateway.run_graph(&patch).await?;

    let name = req
        .output_filename
        .unwrap_or_else(|| format!("edited_{}", req.image_filename));
    let stored = gateway.sessions.put(&req.session_id, &name, &edited)?;

    Ok(Json(json!({
        "success": true,
        "session_id": stored.session_id,
        "filename": stored.name,
        "message": "image edited into session",
    })))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), GatewayError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.file_name().is_some() {
            let name = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| "upload.png".to_string());
            let bytes = field.bytes().await.map_err(bad_field)?;
            return Ok((name, bytes.to_vec()));
        }
    }
    Err(GatewayError::BadRequest("file field is required".into()))
}

fn bad_field(e: axum::extract::multipart::MultipartError) -> GatewayError {
    GatewayError::BadRequest(format!("malformed multipart field: {e}"))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t2i_prompt_flattens_in_field_order() {
        let p = T2iPrompt {
            background: "vanity table with skincare products".into(),
            character_pose_and_gaze: "Gigi reaching for essence bottle".into(),
            product: "essence bottle".into(),
            camera_angle: "overhead angle".into(),
        };
        assert_eq!(
            flatten_t2i(&p),
            "vanity table with skincare products, Gigi reaching for essence bottle, \
             essence bottle, overhead angle"
        );
    }

    #[test]
    fn empty_fields_are_skipped_when_flattening() {
        let p = ImageEditPrompt {
            pose_change: "hand reaching to pick up bottle".into(),
            gaze_change: String::new(),
            expression: "excited".into(),
            additional_edits: String::new(),
        };
        assert_eq!(flatten_edit(&p), "hand reaching to pick up bottle, excited");
    }

    #[test]
    fn t2i_request_requires_some_prompt() {
        let req = T2iHttpRequest {
            prompt: None,
            t2i_prompt: None,
            width: 1024,
            height: 1024,
            steps: 9,
            cfg: 1.0,
            seed: None,
        };
        assert!(matches!(
            req.prompt_text(),
            Err(GatewayError::BadRequest(_))
        ));
    }

    #[test]
    fn plain_prompt_wins_over_structured() {
        let req = T2iHttpRequest {
            prompt: Some("a cat".into()),
            t2i_prompt: Some(T2iPrompt {
                background: "ignored".into(),
                ..Default::default()
            }),
            width: 1024,
            height: 1024,
            steps: 9,
            cfg: 1.0,
            seed: None,
        };
        assert_eq!(req.prompt_text().unwrap(), "a cat");
    }
}
