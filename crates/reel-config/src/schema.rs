// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_sessions_root() -> PathBuf {
    PathBuf::from("sessions")
}

fn default_session_max_age_hours() -> u64 {
    24
}

fn default_file_max_age_hours() -> u64 {
    1
}

fn default_sweep_interval_secs() -> u64 {
    1800
}

fn default_backend_url() -> String {
    "http://localhost:8188".into()
}

fn default_llm_base_url() -> String {
    "http://localhost:8080/v1".into()
}

fn default_llm_model() -> String {
    "exaone-4.0".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Node-graph backend per inference gateway.  Each gateway may point at
    /// a different backend instance (they usually sit on separate GPUs).
    #[serde(default)]
    pub image: BackendConfig,
    #[serde(default)]
    pub video: BackendConfig,
    #[serde(default)]
    pub lipsync: BackendConfig,
    #[serde(default)]
    pub ambient: BackendConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Shared session workspace settings (spans every gateway process).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Root of the shared `sessions/<session_id>/` tree.
    #[serde(default = "default_sessions_root")]
    pub root: PathBuf,
    /// Sessions older than this (directory mtime) are swept.
    #[serde(default = "default_session_max_age_hours")]
    pub max_age_hours: u64,
    /// Seconds between sweeper passes.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root: default_sessions_root(),
            max_age_hours: default_session_max_age_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Local per-gateway output retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Files in a gateway's local output/upload directories older than this
    /// are swept.  The audio gateway overrides this to 2 hours.
    #[serde(default = "default_file_max_age_hours")]
    pub file_max_age_hours: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            file_max_age_hours: default_file_max_age_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// One node-graph backend binding: base URL plus the graph template this
/// gateway rewrites per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    /// Path to the JSON node-graph template (`workflows/<graph>.json`).
    #[serde(default)]
    pub workflow_path: Option<PathBuf>,
    /// Wall-clock ceiling for one run.  Image edits default to 10 minutes,
    /// video and lip-sync to 30.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            workflow_path: None,
            timeout_secs: None,
        }
    }
}

/// LLM endpoint for the scenario engine.  Any OpenAI-compatible chat server
/// works; local deployments typically run without a key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub name: String,
    /// Explicit API key; prefer the LLM_API_KEY env var to avoid secrets in
    /// version-controlled files.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            name: default_llm_model(),
            api_key: None,
        }
    }
}

/// Text-to-speech provider credentials for the audio gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

/// Bind addresses, one per gateway.  The defaults match the ports the
/// services have always used, so existing clients keep working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_scenario")]
    pub scenario: String,
    #[serde(default = "HttpConfig::default_image")]
    pub image: String,
    #[serde(default = "HttpConfig::default_video")]
    pub video: String,
    #[serde(default = "HttpConfig::default_lipsync")]
    pub lipsync: String,
    #[serde(default = "HttpConfig::default_audio")]
    pub audio: String,
    #[serde(default = "HttpConfig::default_merge")]
    pub merge: String,
}

impl HttpConfig {
    fn default_scenario() -> String {
        "0.0.0.0:8000".into()
    }
    fn default_image() -> String {
        "0.0.0.0:4100".into()
    }
    fn default_video() -> String {
        "0.0.0.0:4200".into()
    }
    fn default_lipsync() -> String {
        "0.0.0.0:4300".into()
    }
    fn default_audio() -> String {
        "0.0.0.0:1100".into()
    }
    fn default_merge() -> String {
        "0.0.0.0:2000".into()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            scenario: Self::default_scenario(),
            image: Self::default_image(),
            video: Self::default_video(),
            lipsync: Self::default_lipsync(),
            audio: Self::default_audio(),
            merge: Self::default_merge(),
        }
    }
}
