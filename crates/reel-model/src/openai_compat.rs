// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! OpenAI-compatible chat completion provider (non-streaming).

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{ChatModel, CompletionRequest};

/// Provider for any server speaking the `/v1/chat/completions` wire format.
pub struct OpenAiCompatModel {
    /// Model id forwarded to the API.
    model: String,
    /// API key; local servers run without one.
    api_key: Option<String>,
    /// Full chat completions URL.
    chat_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    /// `base_url` ends **before** `/chat/completions`, e.g.
    /// `http://localhost:8080/v1`.
    pub fn new(base_url: &str, model: impl Into<String>, api_key: Option<String>) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            model: model.into(),
            api_key,
            chat_url: format!("{base}/chat/completions"),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        debug!(
            model = %self.model,
            max_tokens = req.max_tokens,
            temperature = req.temperature,
            "sending completion request"
        );

        let mut http_req = self.client.post(&self.chat_url).json(&body);
        if let Some(key) = &self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let resp = http_req
            .send()
            .await
            .with_context(|| format!("chat request to {} failed", self.chat_url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("chat endpoint error {status}: {text}");
        }

        let v: Value = resp.json().await.context("decoding chat response")?;
        let content = v["choices"][0]["message"]["content"]
            .as_str()
            .context("chat response carried no message content")?;

        Ok(strip_think_block(content).trim().to_string())
    }
}

/// Reasoning-tuned models prefix the answer with a `<think>…</think>` block.
/// Only the text after the closing tag is the response.
pub(crate) fn strip_think_block(text: &str) -> &str {
    if text.contains("<think>") {
        if let Some((_, rest)) = text.split_once("</think>") {
            return rest;
        }
    }
    text
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
