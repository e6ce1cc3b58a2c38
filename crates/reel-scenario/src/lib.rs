// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Scenario → timetable engine.
//!
//! Turns a brand brief into a timed shot list for the downstream gateways.
//! Four stages compose:
//!
//! 1. scenario synthesis — LLM call gated by a grammar validator;
//! 2. shot segmentation — deterministic, rule-based partition of the
//!    Korean scenario text into at least four timed shots;
//! 3. per-shot prompt synthesis — one LLM call per shot with a rolling
//!    two-shot context window, parsed tolerantly;
//! 4. dialogue validation — an LLM scorer with a bounded retry loop that
//!    keeps the best-scoring attempt.
//!
//! The expensive LLM calls are confined to stages 1, 3 and 4; segmentation
//! stays rule-based so a retry never re-tiles the timeline.  Results are
//! streamed shot-by-shot over a bounded channel (see [`TimetableEngine`]).

mod engine;
mod prompts;
mod segment;
mod synth;
mod types;
mod validate;

pub use engine::{TimetableEngine, TimetableRequest};
pub use prompts::{brands, default_scenario_request};
pub use segment::{segment_scenario, TimedScene, DEFAULT_SHOT_SECS};
pub use synth::{
    extract_json_object, generate_scenario, regenerate_dialogue, synthesize_prompts, SceneContext,
};
pub use types::{
    ImageEditPrompt, Shot, ShotPrompts, T2iPrompt, Timetable, TimetableEvent,
};
pub use validate::{
    generate_validated_scenario, validate_dialogue, validate_scenario, RetryPolicy,
    ValidatedScenario, Verdict,
};
