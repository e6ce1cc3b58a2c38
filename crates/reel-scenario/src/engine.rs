// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The streaming timetable engine.
//!
//! A producer task segments the scenario, synthesizes each shot in index
//! order and pushes [`TimetableEvent`]s into a bounded channel.  The
//! consumer (the SSE endpoint, or `generate` for the non-streaming API)
//! drains the channel and terminates when the producer drops its sender.
//! Backpressure falls out of the bounded capacity: a slow client suspends
//! the producer at the `send` instead of buffering the whole timetable.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use reel_model::ChatModel;

use crate::segment::{segment_scenario, DEFAULT_SHOT_SECS};
use crate::synth::{synthesize_prompts, SceneContext};
use crate::types::{Shot, ShotPrompts, Timetable, TimetableEvent};
use crate::validate::{validate_dialogue, RetryPolicy, Verdict};

/// Capacity of the event channel between producer and consumer.
const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct TimetableRequest {
    pub scenario: String,
    pub video_duration: u32,
    pub brand: String,
}

/// Service value owning the model handle; constructed once at startup and
/// shared by the HTTP handlers.
#[derive(Clone)]
pub struct TimetableEngine {
    model: Arc<dyn ChatModel>,
    retry: RetryPolicy,
}

impl TimetableEngine {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    /// Start a producer task and hand back the consuming end.
    ///
    /// The receiver yields one `Metadata`, one `Scene` per shot in index
    /// order and a final `Complete`; a fatal failure yields `Error`
    /// instead and ends the sequence.  Dropping the receiver cancels the
    /// producer at its next send.
    pub fn stream(&self, request: TimetableRequest) -> mpsc::Receiver<TimetableEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let model = Arc::clone(&self.model);
        let retry = self.retry;

        tokio::spawn(async move {
            produce(model, retry, request, tx).await;
        });

        rx
    }

    /// Non-streaming variant: run the same producer and collect the shots.
    pub async fn generate(&self, request: TimetableRequest) -> anyhow::Result<Timetable> {
        let total_duration = request.video_duration;
        let mut rx = self.stream(request);

        let mut shots = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                TimetableEvent::Scene(shot) => shots.push(shot),
                TimetableEvent::Error { message } => anyhow::bail!(message),
                TimetableEvent::Metadata { .. } | TimetableEvent::Complete { .. } => {}
            }
        }

        Ok(Timetable {
            total_duration,
            scene_count: shots.len(),
            shots,
        })
    }
}

async fn produce(
    model: Arc<dyn ChatModel>,
    retry: RetryPolicy,
    request: TimetableRequest,
    tx: mpsc::Sender<TimetableEvent>,
) {
    if request.video_duration == 0 {
        let _ = tx
            .send(TimetableEvent::Error {
                message: "video_duration must be at least 1 second".into(),
            })
            .await;
        return;
    }

    let scenes = segment_scenario(&request.scenario, request.video_duration, DEFAULT_SHOT_SECS);
    if scenes.is_empty() {
        let _ = tx
            .send(TimetableEvent::Error {
                message: "scenario text is empty".into(),
            })
            .await;
        return;
    }

    info!(
        scene_count = scenes.len(),
        duration = request.video_duration,
        brand = %request.brand,
        "timetable stream started"
    );

    if tx
        .send(TimetableEvent::Metadata {
            total_duration: request.video_duration,
            scene_count: scenes.len(),
            status: "started".into(),
        })
        .await
        .is_err()
    {
        return; // consumer gone before the first event
    }

    let total = scenes.len();
    let mut history: Vec<SceneContext> = Vec::new();

    for (index, scene) in scenes.into_iter().enumerate() {
        debug!(index, total, scene = %scene.description, "synthesizing shot");

        let prompts = build_shot_prompts(
            model.as_ref(),
            retry,
            &scene.description,
            &request.brand,
            &history,
        )
        .await;

        let shot = Shot {
            index,
            time_start: scene.time_start,
            time_end: scene.time_end,
            scene_description: scene.description.clone(),
            dialogue: prompts.dialogue.clone(),
            t2i_prompt: prompts.t2i_prompt,
            image_edit_prompt: prompts.image_edit_prompt,
            background_sounds_prompt: prompts.background_sounds_prompt,
        };

        history.push(SceneContext {
            scene: scene.description,
            dialogue: shot.dialogue.clone(),
        });

        if tx.send(TimetableEvent::Scene(shot)).await.is_err() {
            debug!(index, "consumer dropped, stopping producer");
            return;
        }
    }

    let _ = tx
        .send(TimetableEvent::Complete {
            status: "completed".into(),
            total_scenes: total,
        })
        .await;
}

/// Synthesize prompts for one shot with the dialogue-validation retry loop.
///
/// A passing attempt wins immediately; otherwise the highest-scoring
/// attempt survives.  Every failure mode degrades instead of erroring —
/// a shot is never allowed to kill the stream.
async fn build_shot_prompts(
    model: &dyn ChatModel,
    retry: RetryPolicy,
    scene: &str,
    brand: &str,
    history: &[SceneContext],
) -> ShotPrompts {
    let previous_dialogues: Vec<String> = history.iter().map(|c| c.dialogue.clone()).collect();

    let mut best: Option<(f64, ShotPrompts)> = None;

    for attempt in 1..=retry.max_attempts {
        let prompts = synthesize_prompts(model, scene, brand, history).await;

        let verdict = if prompts.dialogue.trim().is_empty() {
            Verdict::empty_dialogue_pass()
        } else {
            validate_dialogue(
                model,
                &prompts.dialogue,
                scene,
                &previous_dialogues,
                retry.threshold,
            )
            .await
        };

        debug!(
            attempt,
            score = verdict.score,
            pass = verdict.pass,
            dialogue = %prompts.dialogue,
            "dialogue validated"
        );

        if verdict.pass {
            return prompts;
        }

        if best.as_ref().map_or(true, |(s, _)| verdict.score > *s) {
            best = Some((verdict.score, prompts));
        }
    }

    match best {
        Some((score, prompts)) => {
            warn!(score, "dialogue retries exhausted, emitting best attempt");
            prompts
        }
        None => ShotPrompts::default_prompts(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
