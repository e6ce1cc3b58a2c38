// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The gateway fleet: one axum service per inference kind plus pure
//! post-production and the scenario engine's HTTP surface.
//!
//! Every gateway follows the same shape — a service value built once at
//! startup (client handles, directories, session store), a `Router` over
//! `State<Arc<…>>`, and the shared route families for local outputs and
//! the session workspace.  Long-running inference is one cooperative task
//! per request; the backend's own queue provides the only backpressure.

pub mod audio;
pub mod error;
pub mod image;
pub mod lipsync;
pub mod merge;
pub mod outputs;
pub mod scenario;
pub mod session_routes;
pub mod tts;
pub mod video;

pub use error::GatewayError;
pub use outputs::OutputDir;

/// Content type by file extension; the session tree has no schema, so the
/// suffix is the only source of truth.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("scene_001.mp4"), "video/mp4");
        assert_eq!(content_type_for("tts_0001.MP3"), "audio/mpeg");
        assert_eq!(content_type_for("timetable.json"), "application/json");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
