// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Structured English prompt for the text-to-image gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct T2iPrompt {
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub character_pose_and_gaze: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub camera_angle: String,
}

/// Structured English prompt for the multi-reference image-edit gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageEditPrompt {
    #[serde(default)]
    pub pose_change: String,
    #[serde(default)]
    pub gaze_change: String,
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub additional_edits: String,
}

/// What the prompt-synthesis LLM produces for one shot.  Every field is
/// serde-defaulted so a partially well-formed reply still parses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShotPrompts {
    #[serde(default)]
    pub dialogue: String,
    #[serde(default)]
    pub t2i_prompt: T2iPrompt,
    #[serde(default)]
    pub image_edit_prompt: ImageEditPrompt,
    #[serde(default)]
    pub background_sounds_prompt: String,
}

impl ShotPrompts {
    /// Neutral fallback used whenever the LLM reply cannot be parsed.  The
    /// shot still renders, just without scene-specific detail.
    pub fn default_prompts() -> Self {
        Self {
            dialogue: String::new(),
            t2i_prompt: T2iPrompt {
                background: "a modern minimalist indoor space with natural lighting".into(),
                character_pose_and_gaze:
                    "young Korean woman Gigi standing naturally, looking at camera".into(),
                product: "beauty product in hand".into(),
                camera_angle: "medium shot, eye-level perspective".into(),
            },
            image_edit_prompt: ImageEditPrompt {
                pose_change: "maintain natural standing pose".into(),
                gaze_change: "look at the product".into(),
                expression: "gentle smile, natural expression".into(),
                additional_edits: "enhance natural lighting".into(),
            },
            background_sounds_prompt: String::new(),
        }
    }
}

/// One timed segment of the timetable with its prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub index: usize,
    pub time_start: f64,
    pub time_end: f64,
    pub scene_description: String,
    pub dialogue: String,
    pub t2i_prompt: T2iPrompt,
    pub image_edit_prompt: ImageEditPrompt,
    pub background_sounds_prompt: String,
}

/// Ordered tiling of `[0, total_duration]` into shots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timetable {
    pub total_duration: u32,
    pub scene_count: usize,
    pub shots: Vec<Shot>,
}

/// Event stream emitted by the engine: exactly one `Metadata`, then one
/// `Scene` per shot in index order, then one `Complete`; a fatal failure
/// replaces the rest of the sequence with a single `Error`.
///
/// Serializes as `{"type": "...", "data": {...}}` — the wire shape the SSE
/// endpoint forwards verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TimetableEvent {
    Metadata {
        total_duration: u32,
        scene_count: usize,
        status: String,
    },
    Scene(Shot),
    Complete {
        status: String,
        total_scenes: usize,
    },
    Error {
        message: String,
    },
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_and_data() {
        let ev = TimetableEvent::Metadata {
            total_duration: 25,
            scene_count: 5,
            status: "started".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "metadata");
        assert_eq!(v["data"]["scene_count"], 5);
        assert_eq!(v["data"]["status"], "started");
    }

    #[test]
    fn scene_event_carries_flat_shot_fields() {
        let shot = Shot {
            index: 2,
            time_start: 10.0,
            time_end: 15.0,
            scene_description: "지지가 에센스 병을 집음".into(),
            dialogue: "이거 완전 제 스타일이에요.".into(),
            t2i_prompt: T2iPrompt::default(),
            image_edit_prompt: ImageEditPrompt::default(),
            background_sounds_prompt: String::new(),
        };
        let v = serde_json::to_value(TimetableEvent::Scene(shot)).unwrap();
        assert_eq!(v["type"], "scene");
        assert_eq!(v["data"]["index"], 2);
        assert_eq!(v["data"]["time_end"], 15.0);
    }

    #[test]
    fn shot_prompts_parse_with_missing_fields() {
        let partial = r#"{"dialogue": "향이 좋네요", "t2i_prompt": {"background": "bathroom"}}"#;
        let prompts: ShotPrompts = serde_json::from_str(partial).unwrap();
        assert_eq!(prompts.dialogue, "향이 좋네요");
        assert_eq!(prompts.t2i_prompt.background, "bathroom");
        assert!(prompts.t2i_prompt.product.is_empty());
        assert!(prompts.background_sounds_prompt.is_empty());
    }

    #[test]
    fn default_prompts_have_empty_dialogue() {
        let d = ShotPrompts::default_prompts();
        assert!(d.dialogue.is_empty());
        assert!(!d.t2i_prompt.background.is_empty());
    }
}
