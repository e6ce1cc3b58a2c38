// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Text-to-speech provider client.
//!
//! Speaks the ElevenLabs-style REST surface:
//! `POST {base}/v1/text-to-speech/{voice_id}` with an `xi-api-key` header,
//! returning the encoded audio bytes directly.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::GatewayError;

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_MODEL_ID: &str = "eleven_turbo_v2_5";

/// Voice rendering knobs, with the defaults the pipeline has always used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.8,
            similarity_boost: 0.8,
            style: 0.4,
            use_speaker_boost: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TtsClient {
    base_url: String,
    api_key: String,
    voice_id: String,
    model_id: String,
    http: reqwest::Client,
}

impl TtsClient {
    pub fn new(api_key: String, voice_id: String, model_id: Option<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            voice_id,
            model_id: model_id.unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            http: reqwest::Client::new(),
        }
    }

    /// Point the client at a different server (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    /// Synthesize `text` and return the MP3 bytes.  Per-request voice and
    /// model overrides fall back to the client's configuration.
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: Option<&str>,
        model_id: Option<&str>,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>, GatewayError> {
        if text.trim().is_empty() {
            return Err(GatewayError::BadRequest("text must not be empty".into()));
        }

        let voice = voice_id.unwrap_or(&self.voice_id);
        let model = model_id.unwrap_or(&self.model_id);
        let url = format!("{}/v1/text-to-speech/{voice}", self.base_url);

        debug!(voice, model, chars = text.chars().count(), "tts request");

        let body = json!({
            "text": text,
            "model_id": model,
            "voice_settings": settings,
        });

        let resp = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("tts request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream(format!(
                "tts provider error {status}: {detail}"
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(format!("tts body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_pipeline_conventions() {
        let s = VoiceSettings::default();
        assert!((s.stability - 0.8).abs() < f32::EPSILON);
        assert!((s.similarity_boost - 0.8).abs() < f32::EPSILON);
        assert!((s.style - 0.4).abs() < f32::EPSILON);
        assert!(s.use_speaker_boost);
    }

    #[tokio::test]
    async fn empty_text_is_a_client_error() {
        let client = TtsClient::new("key".into(), "voice".into(), None);
        let err = client
            .synthesize("  ", None, None, &VoiceSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn base_url_trailing_slash_stripped() {
        let client = TtsClient::new("key".into(), "voice".into(), None)
            .with_base_url("http://localhost:9999/");
        assert_eq!(client.base_url, "http://localhost:9999");
    }
}
