// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{ChatModel, CompletionRequest};

/// Deterministic mock that echoes the user message back.
#[derive(Default)]
pub struct MockModel;

#[async_trait]
impl ChatModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<String> {
        Ok(format!("MOCK: {}", req.user))
    }
}

/// A pre-scripted mock.  Each `complete` call pops the next reply from the
/// front of the queue, so tests can walk the engine through exact LLM
/// output sequences — including malformed JSON — without network access.
/// When the queue runs dry the fallback reply is returned instead.
pub struct ScriptedModel {
    replies: Arc<Mutex<Vec<String>>>,
    fallback: String,
    /// The last `CompletionRequest` seen, for prompt-content assertions.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            fallback: "[no more scripts]".to_string(),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: a model that always returns the same reply.
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(Vec::new())),
            fallback: reply.into(),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace the reply used once the scripted queue is exhausted.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<String> {
        *self.last_request.lock().unwrap() = Some(req);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Ok(self.fallback.clone());
        }
        Ok(replies.remove(0))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
