// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComfyError {
    /// The backend refused the queue request.  The payload is the backend's
    /// own error body (`error` / `node_errors`), passed through verbatim so
    /// a client can diagnose a broken graph without reading server logs.
    #[error("backend rejected prompt: {0}")]
    Backend(String),

    /// The backend accepted the prompt but execution failed mid-graph.
    #[error("execution error: {0}")]
    Execution(String),

    #[error("processing exceeded {0} minutes")]
    Timeout(u64),

    /// The graph ran but produced no `images`/`gifs` outputs.
    #[error("graph produced no outputs; executed nodes: {executed:?}")]
    NoOutputs { executed: Vec<String> },

    #[error("workflow template not found: {0}")]
    WorkflowMissing(String),

    #[error("websocket error: {0}")]
    Ws(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
