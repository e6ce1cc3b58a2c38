// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The backend run protocol: upload → queue → progress → fetch.

use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::graph::{MediaKind, Workflow};
use crate::ComfyError;

/// One produced file, addressable via `GET /view`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRef {
    pub filename: String,
    pub subfolder: String,
    /// Backend folder type, almost always `"output"`.
    pub kind: String,
}

/// Client for one backend instance.
///
/// The `client_id` is generated per constructed client and sent with every
/// queue request; the backend multiplexes progress for all its clients on
/// the WebSocket, and the id is how we find our own frames.  One client is
/// built per gateway process, one WebSocket per run — never shared across
/// runs.
#[derive(Debug, Clone)]
pub struct ComfyClient {
    base_url: String,
    client_id: String,
    http: reqwest::Client,
}

impl ComfyClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Liveness probe for health endpoints; any reachable backend counts.
    pub async fn health(&self) -> bool {
        let url = format!("{}/system_stats", self.base_url);
        match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Stage an input file.  The backend takes every media kind through the
    /// same endpoint with the multipart field named `image`; the response
    /// carries the name the backend stored it under, which MUST be the name
    /// bound into the graph (the backend may rename on collision).
    pub async fn upload_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        kind: MediaKind,
    ) -> Result<String, ComfyError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(kind.mime())?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("overwrite", "true")
            .text("type", "input");

        let url = format!("{}/upload/image", self.base_url);
        let resp = self.http.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ComfyError::Backend(format!(
                "upload failed ({status}): {body}"
            )));
        }

        let body: Value = resp.json().await?;
        let stored = body
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or(filename)
            .to_string();
        debug!(filename, stored = %stored, "uploaded input to backend");
        Ok(stored)
    }

    /// Queue a graph for execution; returns the backend's `prompt_id`.
    pub async fn queue_prompt(&self, workflow: &Workflow) -> Result<String, ComfyError> {
        let payload = json!({
            "prompt": workflow.as_value(),
            "client_id": self.client_id,
        });

        let url = format!("{}/prompt", self.base_url);
        let resp = self.http.post(&url).json(&payload).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(parse_queue_rejection(status, &body));
        }

        let body: Value = resp.json().await?;
        let prompt_id = body
            .get("prompt_id")
            .and_then(|p| p.as_str())
            .ok_or_else(|| ComfyError::Backend("queue response carried no prompt_id".into()))?
            .to_string();
        info!(prompt_id = %prompt_id, "prompt queued");
        Ok(prompt_id)
    }

    pub async fn get_history(&self, prompt_id: &str) -> Result<Value, ComfyError> {
        let url = format!("{}/history/{}", self.base_url, prompt_id);
        let resp = self.http.get(&url).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Download one produced file.
    pub async fn fetch_output(&self, output: &OutputRef) -> Result<Vec<u8>, ComfyError> {
        let url = format!("{}/view", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("filename", output.filename.as_str()),
                ("subfolder", output.subfolder.as_str()),
                ("type", output.kind.as_str()),
            ])
            .timeout(Duration::from_secs(300))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Follow the run over a fresh WebSocket until the backend reports our
    /// prompt finished, then return its history entry.
    ///
    /// Frames for other prompt ids are ignored (the backend fans in every
    /// client's progress), binary frames (previews) are discarded, and
    /// `progress` frames are logged at 10% increments.  A dropped socket
    /// falls back to one history poll before failing: the run may have
    /// finished while the socket died.
    pub async fn wait_for_completion(
        &self,
        prompt_id: &str,
        deadline: Duration,
    ) -> Result<Value, ComfyError> {
        let result = tokio::time::timeout(deadline, self.follow_progress(prompt_id)).await;

        match result {
            Ok(Ok(executed)) => {
                debug!(prompt_id, nodes = executed.len(), "execution completed");
                self.history_entry(prompt_id).await
            }
            Ok(Err(ws_err)) => {
                warn!(prompt_id, error = %ws_err, "websocket failed, polling history once");
                match self.history_entry(prompt_id).await {
                    Ok(entry) => Ok(entry),
                    Err(_) => Err(ws_err),
                }
            }
            Err(_) => Err(ComfyError::Timeout(deadline.as_secs() / 60)),
        }
    }

    /// Queue, wait, and collect the produced outputs.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        deadline: Duration,
    ) -> Result<Vec<OutputRef>, ComfyError> {
        let prompt_id = self.queue_prompt(workflow).await?;
        let entry = self.wait_for_completion(&prompt_id, deadline).await?;

        let outputs = collect_outputs(&entry);
        if outputs.is_empty() {
            let executed = entry
                .get("outputs")
                .and_then(|o| o.as_object())
                .map(|o| o.keys().cloned().collect())
                .unwrap_or_default();
            return Err(ComfyError::NoOutputs { executed });
        }
        Ok(outputs)
    }

    async fn follow_progress(&self, prompt_id: &str) -> Result<Vec<String>, ComfyError> {
        let ws_url = format!("{}/ws?clientId={}", ws_base(&self.base_url), self.client_id);
        debug!(url = %ws_url, "connecting progress websocket");

        let (mut ws, _) = connect_async(&ws_url)
            .await
            .map_err(|e| ComfyError::Ws(e.to_string()))?;

        let mut executed: Vec<String> = Vec::new();
        let mut last_logged_pct: u32 = 0;

        loop {
            let msg = match ws.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(ComfyError::Ws(e.to_string())),
                None => return Err(ComfyError::Ws("socket closed before completion".into())),
            };

            let text = match msg {
                Message::Text(text) => text,
                Message::Binary(bytes) => {
                    debug!(len = bytes.len(), "discarding binary preview frame");
                    continue;
                }
                Message::Close(_) => {
                    return Err(ComfyError::Ws("socket closed before completion".into()))
                }
                _ => continue,
            };

            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            let data = &frame["data"];

            match frame["type"].as_str().unwrap_or_default() {
                "execution_start" => debug!(prompt_id, "execution started"),
                "execution_cached" => {
                    if let Some(nodes) = data["nodes"].as_array() {
                        debug!(prompt_id, cached = nodes.len(), "nodes served from cache");
                    }
                }
                "progress" => {
                    let value = data["value"].as_u64().unwrap_or(0);
                    let max = data["max"].as_u64().unwrap_or(1).max(1);
                    let pct = (value * 100 / max) as u32;
                    if pct >= last_logged_pct + 10 {
                        last_logged_pct = pct - pct % 10;
                        info!(prompt_id, value, max, pct, "progress");
                    }
                }
                "executing" => {
                    if data["prompt_id"].as_str() != Some(prompt_id) {
                        continue; // another run on the shared backend
                    }
                    match data["node"].as_str() {
                        Some(node) => {
                            debug!(prompt_id, node, "executing node");
                            executed.push(node.to_string());
                        }
                        // node == null means our prompt finished.
                        None => return Ok(executed),
                    }
                }
                "execution_error" => {
                    if data["prompt_id"].as_str() == Some(prompt_id) {
                        return Err(ComfyError::Execution(data.to_string()));
                    }
                }
                _ => {}
            }
        }
    }

    async fn history_entry(&self, prompt_id: &str) -> Result<Value, ComfyError> {
        let history = self.get_history(prompt_id).await?;
        match history.get(prompt_id) {
            Some(entry) => Ok(entry.clone()),
            None => {
                // History lags completion by a beat sometimes; one more read.
                tokio::time::sleep(Duration::from_millis(500)).await;
                let history = self.get_history(prompt_id).await?;
                history
                    .get(prompt_id)
                    .cloned()
                    .ok_or_else(|| ComfyError::Backend("history has no entry for prompt".into()))
            }
        }
    }
}

/// Walk a history entry's node outputs collecting every file listed under
/// an `images` or `gifs` key (still images use the former, video-combine
/// nodes the latter).
pub fn collect_outputs(history_entry: &Value) -> Vec<OutputRef> {
    let mut outputs = Vec::new();
    let Some(nodes) = history_entry.get("outputs").and_then(|o| o.as_object()) else {
        return outputs;
    };

    for node_output in nodes.values() {
        for key in ["images", "gifs"] {
            if let Some(files) = node_output.get(key).and_then(|f| f.as_array()) {
                for file in files {
                    let Some(filename) = file.get("filename").and_then(|f| f.as_str()) else {
                        continue;
                    };
                    outputs.push(OutputRef {
                        filename: filename.to_string(),
                        subfolder: file
                            .get("subfolder")
                            .and_then(|s| s.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        kind: file
                            .get("type")
                            .and_then(|t| t.as_str())
                            .unwrap_or("output")
                            .to_string(),
                    });
                }
            }
        }
    }
    outputs
}

/// Map a non-200 queue response to a typed error, preserving the backend's
/// structured payload verbatim.
fn parse_queue_rejection(status: u16, body: &str) -> ComfyError {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        if let Some(node_errors) = v.get("node_errors").filter(|n| !n.is_null()) {
            if node_errors.as_object().map_or(true, |o| !o.is_empty()) {
                return ComfyError::Backend(node_errors.to_string());
            }
        }
        if let Some(error) = v.get("error").filter(|e| !e.is_null()) {
            return ComfyError::Backend(error.to_string());
        }
    }
    ComfyError::Backend(format!("status {status}: {body}"))
}

fn ws_base(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{base_url}")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
