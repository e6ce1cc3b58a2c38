// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Configuration for the reel gateway fleet.
//!
//! Configuration is layered: YAML files are discovered from lowest to
//! highest priority and deep-merged, then a fixed set of environment
//! variables overrides the merged result.  Every gateway process loads the
//! same `Config` and picks out its own section, so a single config file can
//! describe the whole deployment.

mod loader;
mod schema;

pub use loader::load;
pub use schema::{
    BackendConfig, Config, HttpConfig, ModelConfig, RetentionConfig, SessionConfig, TtsConfig,
};
