// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! LLM access for the scenario engine.
//!
//! The engine only needs blocking chat completions (generate a scenario,
//! convert one scene to prompts, score one dialogue), so the provider
//! surface is a single `complete` call.  The concrete provider speaks the
//! OpenAI-compatible `/chat/completions` wire format, which every local
//! serving stack (vLLM, llama.cpp, Ollama) and most hosted ones expose.
//!
//! Providers are constructed once at startup and injected into service
//! state as `Arc<dyn ChatModel>` — there is deliberately no lazy global.

mod mock;
mod openai_compat;
mod provider;

pub use mock::{MockModel, ScriptedModel};
pub use openai_compat::OpenAiCompatModel;
pub use provider::{ChatModel, CompletionRequest};
