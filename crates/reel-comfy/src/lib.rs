// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Client for the node-graph inference backend.
//!
//! Every inference gateway drives the same backend protocol: upload the
//! inputs, rewrite a JSON graph template, queue it, follow progress over a
//! WebSocket filtered by our own client id, then fetch the produced files
//! from the history.  The graph itself is a free-form JSON dict — that is
//! the backend's wire format, so `serde_json::Value` is the honest type
//! here and typed records stop at this crate's boundary.

mod client;
mod error;
mod graph;

pub use client::{ComfyClient, OutputRef};
pub use error::ComfyError;
pub use graph::{load_workflow, GraphPatch, MediaKind, Workflow};
