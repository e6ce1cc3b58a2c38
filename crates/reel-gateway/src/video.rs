// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Video gateway: image-to-video over the node-graph backend, with
//! project-scoped scene folders and the project-level concat.
//!
//! A project is a directory `outputs/proj_<id>/` holding `scene_<NNN>.mp4`
//! per shot.  The concat walks the dense prefix `001..K` in order and stops
//! at the first gap: a final cut never silently skips a missing middle
//! scene.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use reel_comfy::{load_workflow, ComfyClient, GraphPatch, MediaKind};
use reel_session::SessionStore;

use crate::outputs::OutputDir;
use crate::{session_routes, GatewayError};

/// Wall clock for one video run.
const VIDEO_DEADLINE: Duration = Duration::from_secs(1800);

pub struct VideoGateway {
    comfy: ComfyClient,
    workflow_path: PathBuf,
    outputs: OutputDir,
    sessions: SessionStore,
    deadline: Duration,
}

impl VideoGateway {
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
            deadline: VIDEO_DEADLINE,
        }
    }

    /// Override the run deadline (config `video.timeout_secs`).
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    fn project_dir(&self, project_id: &str) -> Result<PathBuf, GatewayError> {
        if project_id.is_empty()
            || project_id.contains('/')
            || project_id.contains("..")
            || project_id.contains('\\')
        {
            return Err(GatewayError::BadRequest(format!(
                "invalid project id: {project_id}"
            )));
        }
        Ok(self.outputs.path().join(format!("proj_{project_id}")))
    }

    async fn run_graph(&self, patch: &GraphPatch) -> Result<Vec<u8>, GatewayError> {
        let template = load_workflow(&self.workflow_path)?;
        let graph = patch.apply(&template);
        let outputs = self.comfy.execute(&graph, self.deadline).await?;
        let bytes = self.comfy.fetch_output(&outputs[0]).await?;
        Ok(bytes)
    }
}

pub fn router(gateway: Arc<VideoGateway>) -> Router {
    let outputs = gateway.outputs.clone();
    let sessions = gateway.sessions.clone();
    Router::new()
        .route("/", get(capabilities))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/generate", post(generate_form))
        .route("/generate/json", post(generate_json))
        .route("/session/generate", post(session_generate))
        .route("/projects", get(list_projects))
        .route("/project/:id/videos", get(project_videos))
        .route("/project/:id", axum::routing::delete(delete_project))
        .route("/merge/project/:id", post(merge_project))
        .layer(DefaultBodyLimit::disable())
        .layer(tower_http::limit::RequestBodyLimitLayer::new(1024 * 1024 * 1024))
        .with_state(gateway)
        .merge(crate::outputs::router(outputs))
        .merge(session_routes::router(sessions))
}

async fn capabilities() -> Json<serde_json::Value> {
    Json(json!({
        "message": "reel video gateway",
        "endpoints": {
            "POST /upload": "stage an input image",
            "POST /generate": "image + prompt → video (form)",
            "POST /generate/json": "staged image + prompt → video (JSON)",
            "POST /session/generate": "session image → video into the session",
            "GET /projects": "list projects",
            "GET /project/{id}/videos": "scenes in a project",
            "POST /merge/project/{id}": "concat scene_001..K into final.mp4",
            "DELETE /project/{id}": "remove a project",
            "GET /health": "liveness",
        }
    }))
}

async fn health(State(gateway): State<Arc<VideoGateway>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "backend_url": gateway.comfy.base_url(),
        "backend_connected": gateway.comfy.health().await,
        "workflow_exists": gateway.workflow_path.is_file(),
    }))
}

async fn upload(
    State(gateway): State<Arc<VideoGateway>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let mut stored = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.file_name().is_none() {
            continue;
        }
        let original = field.file_name().unwrap_or("upload.png").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| GatewayError::BadRequest(format!("malformed multipart field: {e}")))?;

        let ext = original.rsplit('.').next().unwrap_or("png");
        let short = &uuid::Uuid::new_v4().simple().to_string()[..8];
        let filename = format!("upload_{short}.{ext}");

        gateway
            .comfy
            .upload_file(bytes.to_vec(), &filename, MediaKind::Image)
            .await?;
        stored = Some(filename);
        break;
    }

    let filename =
        stored.ok_or_else(|| GatewayError::BadRequest("image field is required".into()))?;
    Ok(Json(json!({ "success": true, "filename": filename })))
}

/// I2V parameters.  121 frames at the graph's frame rate is roughly six
/// seconds; steps stay low because the distilled model needs few.
#[derive(Debug, Deserialize)]
struct I2vHttpRequest {
    prompt: String,
    image_filename: String,
    #[serde(default = "default_dim")]
    width: i64,
    #[serde(default = "default_dim")]
    height: i64,
    #[serde(default = "default_length")]
    length: i64,
    #[serde(default = "default_steps")]
    steps: i64,
    #[serde(default = "default_cfg")]
    cfg: f64,
    #[serde(default)]
    seed: Option<u64>,
    /// When both are set the output also lands in
    /// `outputs/proj_<project_id>/scene_<sequence:03>.mp4`.
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    sequence: Option<u32>,
}

fn default_dim() -> i64 {
    512
}
fn default_length() -> i64 {
    121
}
fn default_steps() -> i64 {
    8
}
fn default_cfg() -> f64 {
    1.0
}

async fn generate_json(
    State(gateway): State<Arc<VideoGateway>>,
    Json(req): Json<I2vHttpRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    run_i2v(&gateway, req).await
}

/// Multipart variant: the input image rides inline and is staged before
/// the run.
async fn generate_form(
    State(gateway): State<Arc<VideoGateway>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let mut prompt = None;
    let mut image: Option<(String, Vec<u8>)> = None;
    let mut width = default_dim();
    let mut height = default_dim();
    let mut length = default_length();
    let mut steps = default_steps();
    let mut cfg = default_cfg();
    let mut project_id = None;
    let mut sequence = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("prompt") => prompt = Some(field.text().await.map_err(bad_field)?),
            Some("width") => width = parse_field(field).await?,
            Some("height") => height = parse_field(field).await?,
            Some("length") => length = parse_field(field).await?,
            Some("steps") => steps = parse_field(field).await?,
            Some("cfg") => cfg = parse_field(field).await?,
            Some("project_id") => project_id = Some(field.text().await.map_err(bad_field)?),
            Some("sequence") => sequence = Some(parse_field(field).await?),
            Some("image") => {
                let original = field.file_name().unwrap_or("input.png").to_string();
                let bytes = field.bytes().await.map_err(bad_field)?;
                image = Some((original, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let prompt =
        prompt.ok_or_else(|| GatewayError::BadRequest("prompt field is required".into()))?;
    let (original, bytes) =
        image.ok_or_else(|| GatewayError::BadRequest("image field is required".into()))?;

    let ext = original.rsplit('.').next().unwrap_or("png");
    let short = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let image_filename = format!("i2v_{short}.{ext}");
    gateway
        .comfy
        .upload_file(bytes, &image_filename, MediaKind::Image)
        .await?;

    run_i2v(
        &gateway,
        I2vHttpRequest {
            prompt,
            image_filename,
            width,
            height,
            length,
            steps,
            cfg,
            seed: None,
            project_id,
            sequence,
        },
    )
    .await
}

async fn run_i2v(
    gateway: &VideoGateway,
    req: I2vHttpRequest,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let started = std::time::Instant::now();

    if req.prompt.trim().is_empty() {
        return Err(GatewayError::BadRequest("prompt must not be empty".into()));
    }

    let patch = GraphPatch {
        image: Some(req.image_filename.clone()),
        prompt: Some(req.prompt.clone()),
        width: Some(req.width),
        height: Some(req.height),
        length: Some(req.length),
        steps: Some(req.steps),
        cfg: Some(req.cfg),
        seed: req.seed,
        ..Default::default()
    };
    let bytes = gateway.run_graph(&patch).await?;

    let output_filename = gateway.outputs.unique_name("i2v", "mp4");
    gateway
        .outputs
        .save(&output_filename, &bytes)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    // Project routing is additive: the flat output always exists, the
    // project copy makes the later concat possible.
    let mut project_file = None;
    if let (Some(project_id), Some(sequence)) = (&req.project_id, req.sequence) {
        let dir = gateway.project_dir(project_id)?;
        std::fs::create_dir_all(&dir).map_err(|e| GatewayError::Internal(e.to_string()))?;
        let scene_name = format!("scene_{sequence:03}.mp4");
        std::fs::write(dir.join(&scene_name), &bytes)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        info!(project = %project_id, scene = %scene_name, "scene stored in project");
        project_file = Some(format!("proj_{project_id}/{scene_name}"));
    }

    Ok(Json(json!({
        "success": true,
        "output_file": output_filename,
        "project_file": project_file,
        "message": "video generated",
        "processing_time": round2(started.elapsed().as_secs_f64()),
    })))
}

#[derive(Debug, Deserialize)]
struct SessionI2vRequest {
    session_id: String,
    /// Name of an image already in the session (e.g. from the image
    /// gateway's `/session/generate`).
    image_filename: String,
    prompt: String,
    #[serde(default = "default_dim")]
    width: i64,
    #[serde(default = "default_dim")]
    height: i64,
    #[serde(default = "default_length")]
    length: i64,
    #[serde(default = "default_steps")]
    steps: i64,
    #[serde(default = "default_cfg")]
    cfg: f64,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    output_filename: Option<String>,
}

/// Animate an image that lives in the session; the video goes back into
/// the same session.
async fn session_generate(
    State(gateway): State<Arc<VideoGateway>>,
    Json(req): Json<SessionI2vRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let bytes = gateway.sessions.get(&req.session_id, &req.image_filename)?;

    let short = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let staged = format!("i2v_{short}.png");
    gateway
        .comfy
        .upload_file(bytes, &staged, MediaKind::Image)
        .await?;

    let patch = GraphPatch {
        image: Some(staged),
        prompt: Some(req.prompt.clone()),
        width: Some(req.width),
        height: Some(req.height),
        length: Some(req.length),
        steps: Some(req.steps),
        cfg: Some(req.cfg),
        seed: req.seed,
        ..Default::default()
    };
    let video = gateway.run_graph(&patch).await?;

    let name = req
        .output_filename
        .unwrap_or_else(|| gateway.outputs.unique_name("scene", "mp4"));
    let stored = gateway.sessions.put(&req.session_id, &name, &video)?;

    Ok(Json(json!({
        "success": true,
        "session_id": stored.session_id,
        "filename": stored.name,
        "message": "video generated into session",
    })))
}

// ─── Project routes ───────────────────────────────────────────────────────────

async fn list_projects(
    State(gateway): State<Arc<VideoGateway>>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let mut projects = Vec::new();
    if let Ok(entries) = std::fs::read_dir(gateway.outputs.path()) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_prefix("proj_") {
                if entry.path().is_dir() {
                    let scenes = scene_files(&entry.path()).len();
                    let has_final = entry.path().join("final.mp4").is_file();
                    projects.push(json!({
                        "project_id": id,
                        "scene_count": scenes,
                        "has_final": has_final,
                    }));
                }
            }
        }
    }
    let count = projects.len();
    Ok(Json(json!({ "projects": projects, "count": count })))
}

async fn project_videos(
    State(gateway): State<Arc<VideoGateway>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let dir = gateway.project_dir(&project_id)?;
    if !dir.is_dir() {
        return Err(GatewayError::NotFound(format!(
            "no such project: {project_id}"
        )));
    }

    let mut videos: Vec<serde_json::Value> = scene_files(&dir)
        .into_iter()
        .map(|(seq, path)| {
            let size = path.metadata().map(|m| m.len()).unwrap_or(0);
            json!({
                "sequence": seq,
                "filename": path.file_name().map(|n| n.to_string_lossy().into_owned()),
                "size_mb": (size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            })
        })
        .collect();
    videos.sort_by_key(|v| v["sequence"].as_u64());

    Ok(Json(json!({
        "project_id": project_id,
        "videos": videos,
        "has_final": dir.join("final.mp4").is_file(),
    })))
}

async fn delete_project(
    State(gateway): State<Arc<VideoGateway>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let dir = gateway.project_dir(&project_id)?;
    if !dir.is_dir() {
        return Err(GatewayError::NotFound(format!(
            "no such project: {project_id}"
        )));
    }
    std::fs::remove_dir_all(&dir).map_err(|e| GatewayError::Internal(e.to_string()))?;
    info!(project = %project_id, "project deleted");
    Ok(Json(json!({ "success": true, "project_id": project_id })))
}

/// Concat the project's dense scene prefix into `final.mp4`.
async fn merge_project(
    State(gateway): State<Arc<VideoGateway>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let dir = gateway.project_dir(&project_id)?;
    if !dir.is_dir() {
        return Err(GatewayError::NotFound(format!(
            "no such project: {project_id}"
        )));
    }

    let inputs = dense_prefix(scene_files(&dir));
    if inputs.len() < 2 {
        return Err(GatewayError::BadRequest(format!(
            "project {project_id} has {} usable scene(s); need at least 2 (scene_001.mp4 upward, no gaps)",
            inputs.len()
        )));
    }

    let output = dir.join("final.mp4");
    let outcome = reel_media::concat(&inputs, &output).await?;

    info!(
        project = %project_id,
        scenes = inputs.len(),
        duration = outcome.duration,
        reencoded = outcome.reencoded,
        "project merged"
    );

    Ok(Json(json!({
        "success": true,
        "project_id": project_id,
        "merged_file": "final.mp4",
        "scene_count": inputs.len(),
        "duration": outcome.duration,
        "reencoded": outcome.reencoded,
    })))
}

/// `(sequence, path)` for every `scene_<NNN>.mp4` in a project directory.
fn scene_files(dir: &std::path::Path) -> Vec<(u32, PathBuf)> {
    let mut scenes = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return scenes;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(seq) = name
            .strip_prefix("scene_")
            .and_then(|rest| rest.strip_suffix(".mp4"))
            .and_then(|digits| digits.parse::<u32>().ok())
        else {
            continue;
        };
        scenes.push((seq, entry.path()));
    }
    scenes.sort_by_key(|(seq, _)| *seq);
    scenes
}

/// Walk the dense prefix starting at 1; a gap ends the merge set.
fn dense_prefix(scenes: Vec<(u32, PathBuf)>) -> Vec<PathBuf> {
    let mut inputs = Vec::new();
    let mut expected = 1;
    for (seq, path) in scenes {
        if seq != expected {
            break;
        }
        inputs.push(path);
        expected += 1;
    }
    inputs
}

async fn parse_field<T: std::str::FromStr>(
    field: axum::extract::multipart::Field<'_>,
) -> Result<T, GatewayError> {
    let text = field.text().await.map_err(bad_field)?;
    text.trim()
        .parse()
        .map_err(|_| GatewayError::BadRequest(format!("invalid numeric field: {text}")))
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

    fn touch(dir: &std::path::Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn scene_files_parse_and_sort_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "scene_003.mp4");
        touch(dir.path(), "scene_001.mp4");
        touch(dir.path(), "scene_002.mp4");
        touch(dir.path(), "final.mp4");
        touch(dir.path(), "notes.txt");

        let scenes = scene_files(dir.path());
        let seqs: Vec<u32> = scenes.iter().map(|(s, _)| *s).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn dense_prefix_stops_at_a_gap() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "scene_001.mp4");
        touch(dir.path(), "scene_002.mp4");
        touch(dir.path(), "scene_004.mp4");

        let inputs = dense_prefix(scene_files(dir.path()));
        assert_eq!(inputs.len(), 2, "scene_004 is beyond the gap");
    }

    #[test]
    fn dense_prefix_requires_scene_one() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "scene_002.mp4");
        touch(dir.path(), "scene_003.mp4");

        assert!(dense_prefix(scene_files(dir.path())).is_empty());
    }

    #[test]
    fn project_ids_with_path_components_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let gw = VideoGateway::new(
            ComfyClient::new("http://localhost:8188"),
            dir.path().join("wf.json"),
            OutputDir::new(dir.path().join("outputs")).unwrap(),
            SessionStore::new(dir.path().join("sessions")),
        );
        assert!(gw.project_dir("abc").is_ok());
        assert!(gw.project_dir("../abc").is_err());
        assert!(gw.project_dir("a/b").is_err());
        assert!(gw.project_dir("").is_err());
    }
}
