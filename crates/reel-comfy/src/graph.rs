// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Graph templates and parameterized rewriting.
//!
//! A workflow is a dict of nodes, each `{class_type, _meta.title, inputs}`.
//! Templates ship with placeholder inputs; per request we deep-copy the
//! template and rebind the inputs that matter.  Nodes are identified by
//! `class_type` and, where one class appears several times (the scalar
//! `easy int` nodes), by the human title.

use std::path::Path;

use rand::Rng;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::ComfyError;

/// Media kind of an uploaded input.  The backend stages everything through
/// the same endpoint and multipart field; the kind only selects the MIME
/// type and is echoed in filenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Image => "image/png",
            Self::Audio => "audio/mpeg",
            Self::Video => "video/mp4",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Image => "png",
            Self::Audio => "mp3",
            Self::Video => "mp4",
        }
    }
}

/// A node graph in the backend's wire format.
#[derive(Debug, Clone)]
pub struct Workflow(pub Map<String, Value>);

/// Load a graph template from `workflows/<graph>.json`.
pub fn load_workflow(path: &Path) -> Result<Workflow, ComfyError> {
    if !path.is_file() {
        return Err(ComfyError::WorkflowMissing(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;
    match value {
        Value::Object(map) => Ok(Workflow(map)),
        _ => Err(ComfyError::WorkflowMissing(format!(
            "{} is not a JSON object",
            path.display()
        ))),
    }
}

impl Workflow {
    pub fn node_count(&self) -> usize {
        self.0.len()
    }

    /// The JSON value sent as the `prompt` field of a queue request.
    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Parameterized rewrite of a graph template.  Unset fields leave the
/// template's values alone; `apply` never mutates its input.
#[derive(Debug, Clone, Default)]
pub struct GraphPatch {
    /// Staged filename bound into every `LoadImage` node (except reference
    /// slots, see `image2`).
    pub image: Option<String>,
    /// Staged filename for the secondary reference slot: `LoadImage` nodes
    /// whose title contains `"Reference"`.  Multi-reference edit graphs use
    /// this for the identity image.
    pub image2: Option<String>,
    /// Staged filename bound into every `LoadAudio` node.
    pub audio: Option<String>,
    /// Staged filename bound into every `VHS_LoadVideo` node.
    pub video: Option<String>,
    /// Text bound into the positive prompt node — `CLIPTextEncode` titled
    /// "Positive", or the Qwen edit encoder's non-empty `prompt` slot.
    pub prompt: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    /// Frame count for video graphs.
    pub length: Option<i64>,
    pub steps: Option<i64>,
    pub cfg: Option<f64>,
    /// Sampler seed.  `None` randomizes, which is what clients want unless
    /// they are reproducing a prior run.
    pub seed: Option<u64>,
    /// Frame rate, bound consistently into every node that carries one
    /// (`force_rate`, `frame_rate`, `fps`).
    pub fps: Option<i64>,
    /// Prompt for ambient-audio graphs (`MMAudioSampler`).
    pub ambient_prompt: Option<String>,
}

impl GraphPatch {
    /// Rewrite a deep copy of `workflow` with this patch, randomizing the
    /// sampler seed when none was supplied.
    pub fn apply(&self, workflow: &Workflow) -> Workflow {
        let mut out = workflow.0.clone();
        let seed = self.seed.unwrap_or_else(random_seed);

        for (node_id, node) in out.iter_mut() {
            let class_type = node
                .get("class_type")
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string();
            let title = node
                .get("_meta")
                .and_then(|m| m.get("title"))
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string();

            let Some(inputs) = node.get_mut("inputs").and_then(|i| i.as_object_mut()) else {
                continue;
            };

            match class_type.as_str() {
                "LoadImage" => {
                    let bound = if title.contains("Reference") {
                        self.image2.as_ref()
                    } else {
                        self.image.as_ref()
                    };
                    if let Some(image) = bound {
                        inputs.insert("image".into(), json!(image));
                        debug!(node = %node_id, image = %image, "bound input image");
                    }
                }
                "LoadAudio" => {
                    if let Some(audio) = &self.audio {
                        inputs.insert("audio".into(), json!(audio));
                        debug!(node = %node_id, audio = %audio, "bound input audio");
                    }
                }
                "VHS_LoadVideo" => {
                    if let Some(video) = &self.video {
                        inputs.insert("video".into(), json!(video));
                        debug!(node = %node_id, video = %video, "bound input video");
                    }
                    if let Some(fps) = self.fps {
                        inputs.insert("force_rate".into(), json!(fps));
                    }
                }
                "CLIPTextEncode" => {
                    if title.contains("Positive") {
                        if let Some(prompt) = &self.prompt {
                            inputs.insert("text".into(), json!(prompt));
                            debug!(node = %node_id, "bound positive prompt");
                        }
                    }
                }
                "easy int" => {
                    let value = if title.contains("Width") {
                        self.width
                    } else if title.contains("Height") {
                        self.height
                    } else if title.contains("Length") {
                        self.length
                    } else if title.contains("Steps") {
                        self.steps
                    } else {
                        None
                    };
                    if let Some(v) = value {
                        inputs.insert("value".into(), json!(v));
                        debug!(node = %node_id, title = %title, value = v, "bound scalar");
                    }
                }
                "easy float" => {
                    if title.contains("CFG") {
                        if let Some(cfg) = self.cfg {
                            inputs.insert("value".into(), json!(cfg));
                        }
                    }
                }
                "MMAudioSampler" => {
                    if let Some(prompt) = &self.ambient_prompt {
                        inputs.insert("prompt".into(), json!(prompt));
                    }
                    if inputs.contains_key("seed") {
                        inputs.insert("seed".into(), json!(seed));
                    }
                }
                "LatentSyncNode" => {
                    if inputs.contains_key("seed") {
                        inputs.insert("seed".into(), json!(seed));
                    }
                }
                "VideoLengthAdjuster" | "VHS_VideoCombine" => {
                    if let Some(fps) = self.fps {
                        if inputs.contains_key("fps") {
                            inputs.insert("fps".into(), json!(fps));
                        }
                        if inputs.contains_key("frame_rate") {
                            inputs.insert("frame_rate".into(), json!(fps));
                        }
                    }
                }
                _ => {
                    // Qwen-style edit graphs carry the prompt on a dedicated
                    // encode node instead of CLIPTextEncode.  The positive
                    // slot ships with a non-empty prompt input; the negative
                    // slot's is empty and must stay that way.
                    if class_type.contains("TextEncodeQwenImageEditPlus") {
                        if let Some(prompt) = &self.prompt {
                            let positive = inputs
                                .get("prompt")
                                .and_then(|p| p.as_str())
                                .is_some_and(|p| !p.is_empty());
                            if positive {
                                inputs.insert("prompt".into(), json!(prompt));
                                debug!(node = %node_id, "bound edit prompt");
                            }
                        }
                    }
                    // Samplers keep their class-specific names for the seed
                    // input; randomize whichever is present.
                    if class_type.starts_with("KSampler") {
                        if inputs.contains_key("seed") {
                            inputs.insert("seed".into(), json!(seed));
                        }
                        if inputs.contains_key("noise_seed") {
                            inputs.insert("noise_seed".into(), json!(seed));
                        }
                    }
                }
            }
        }

        Workflow(out)
    }
}

fn random_seed() -> u64 {
    // The backend treats seeds as positive 63-bit ints.
    rand::thread_rng().gen_range(0..i64::MAX as u64)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn i2v_template() -> Workflow {
        let v = json!({
            "6": {
                "class_type": "CLIPTextEncode",
                "_meta": { "title": "Positive Prompt" },
                "inputs": { "text": "placeholder" }
            },
            "7": {
                "class_type": "CLIPTextEncode",
                "_meta": { "title": "Negative Prompt" },
                "inputs": { "text": "blurry, low quality" }
            },
            "57": {
                "class_type": "KSamplerAdvanced",
                "_meta": { "title": "KSampler (high)" },
                "inputs": { "noise_seed": 42 }
            },
            "101": {
                "class_type": "easy int",
                "_meta": { "title": "Width" },
                "inputs": { "value": 0 }
            },
            "102": {
                "class_type": "easy int",
                "_meta": { "title": "Height" },
                "inputs": { "value": 0 }
            },
            "103": {
                "class_type": "easy int",
                "_meta": { "title": "Length" },
                "inputs": { "value": 0 }
            },
            "104": {
                "class_type": "easy float",
                "_meta": { "title": "CFG" },
                "inputs": { "value": 0.0 }
            },
            "172": {
                "class_type": "LoadImage",
                "_meta": { "title": "Input Image" },
                "inputs": { "image": "placeholder.png" }
            }
        });
        match v {
            Value::Object(map) => Workflow(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn patch_rebinds_image_prompt_and_scalars() {
        let template = i2v_template();
        let patch = GraphPatch {
            image: Some("i2v_ab12cd34.png".into()),
            prompt: Some("The character walks forward slowly".into()),
            width: Some(512),
            height: Some(512),
            length: Some(121),
            cfg: Some(1.0),
            seed: Some(7),
            ..Default::default()
        };
        let out = patch.apply(&template);

        assert_eq!(out.0["172"]["inputs"]["image"], "i2v_ab12cd34.png");
        assert_eq!(
            out.0["6"]["inputs"]["text"],
            "The character walks forward slowly"
        );
        assert_eq!(out.0["101"]["inputs"]["value"], 512);
        assert_eq!(out.0["102"]["inputs"]["value"], 512);
        assert_eq!(out.0["103"]["inputs"]["value"], 121);
        assert_eq!(out.0["104"]["inputs"]["value"], 1.0);
        assert_eq!(out.0["57"]["inputs"]["noise_seed"], 7);
    }

    #[test]
    fn negative_prompt_is_left_alone() {
        let template = i2v_template();
        let patch = GraphPatch {
            prompt: Some("positive only".into()),
            ..Default::default()
        };
        let out = patch.apply(&template);
        assert_eq!(out.0["7"]["inputs"]["text"], "blurry, low quality");
    }

    #[test]
    fn unset_fields_leave_template_values() {
        let template = i2v_template();
        let out = GraphPatch {
            seed: Some(1),
            ..Default::default()
        }
        .apply(&template);
        assert_eq!(out.0["172"]["inputs"]["image"], "placeholder.png");
        assert_eq!(out.0["101"]["inputs"]["value"], 0);
    }

    #[test]
    fn apply_does_not_mutate_the_template() {
        let template = i2v_template();
        let _ = GraphPatch {
            image: Some("new.png".into()),
            seed: Some(1),
            ..Default::default()
        }
        .apply(&template);
        assert_eq!(template.0["172"]["inputs"]["image"], "placeholder.png");
    }

    #[test]
    fn missing_seed_is_randomized() {
        let template = i2v_template();
        let out = GraphPatch::default().apply(&template);
        let seed = out.0["57"]["inputs"]["noise_seed"].as_u64().unwrap();
        assert_ne!(seed, 42, "template seed must be replaced");
    }

    #[test]
    fn lipsync_nodes_get_fps_and_seed() {
        let v = json!({
            "1": {
                "class_type": "VHS_LoadVideo",
                "inputs": { "video": "x.mp4", "force_rate": 0 }
            },
            "2": {
                "class_type": "LoadAudio",
                "inputs": { "audio": "x.wav" }
            },
            "3": {
                "class_type": "LatentSyncNode",
                "inputs": { "seed": 0 }
            },
            "4": {
                "class_type": "VideoLengthAdjuster",
                "inputs": { "fps": 0 }
            },
            "5": {
                "class_type": "VHS_VideoCombine",
                "inputs": { "frame_rate": 0 }
            }
        });
        let template = match v {
            Value::Object(map) => Workflow(map),
            _ => unreachable!(),
        };
        let patch = GraphPatch {
            video: Some("face_12ab.mp4".into()),
            audio: Some("speech_12ab.mp3".into()),
            fps: Some(25),
            seed: Some(99),
            ..Default::default()
        };
        let out = patch.apply(&template);

        assert_eq!(out.0["1"]["inputs"]["video"], "face_12ab.mp4");
        assert_eq!(out.0["1"]["inputs"]["force_rate"], 25);
        assert_eq!(out.0["2"]["inputs"]["audio"], "speech_12ab.mp3");
        assert_eq!(out.0["3"]["inputs"]["seed"], 99);
        assert_eq!(out.0["4"]["inputs"]["fps"], 25);
        assert_eq!(out.0["5"]["inputs"]["frame_rate"], 25);
    }

    #[test]
    fn ambient_sampler_gets_prompt() {
        let v = json!({
            "91": { "class_type": "VHS_LoadVideo", "inputs": { "video": "x", "force_rate": 0 } },
            "95": { "class_type": "MMAudioSampler", "inputs": { "prompt": "", "seed": 0 } }
        });
        let template = match v {
            Value::Object(map) => Workflow(map),
            _ => unreachable!(),
        };
        let out = GraphPatch {
            video: Some("scene.mp4".into()),
            ambient_prompt: Some("water running, splashing sounds".into()),
            fps: Some(24),
            seed: Some(5),
            ..Default::default()
        }
        .apply(&template);

        assert_eq!(
            out.0["95"]["inputs"]["prompt"],
            "water running, splashing sounds"
        );
        assert_eq!(out.0["95"]["inputs"]["seed"], 5);
        assert_eq!(out.0["91"]["inputs"]["force_rate"], 24);
    }

    #[test]
    fn qwen_edit_encoder_rewrites_only_the_positive_slot() {
        let v = json!({
            "76": {
                "class_type": "TextEncodeQwenImageEditPlus",
                "inputs": { "prompt": "placeholder edit" }
            },
            "77": {
                "class_type": "TextEncodeQwenImageEditPlus",
                "inputs": { "prompt": "" }
            },
            "88": {
                "class_type": "LoadImage",
                "inputs": { "image": "a.png" }
            }
        });
        let template = match v {
            Value::Object(map) => Workflow(map),
            _ => unreachable!(),
        };
        let out = GraphPatch {
            image: Some("scene.png".into()),
            prompt: Some("raise her left hand".into()),
            seed: Some(1),
            ..Default::default()
        }
        .apply(&template);

        assert_eq!(out.0["76"]["inputs"]["prompt"], "raise her left hand");
        assert_eq!(out.0["77"]["inputs"]["prompt"], "", "negative slot untouched");
    }

    #[test]
    fn reference_slot_takes_image2() {
        let v = json!({
            "1": {
                "class_type": "LoadImage",
                "_meta": { "title": "Input Image" },
                "inputs": { "image": "a.png" }
            },
            "2": {
                "class_type": "LoadImage",
                "_meta": { "title": "Reference Face" },
                "inputs": { "image": "b.png" }
            }
        });
        let template = match v {
            Value::Object(map) => Workflow(map),
            _ => unreachable!(),
        };
        let out = GraphPatch {
            image: Some("scene.png".into()),
            image2: Some("face.png".into()),
            seed: Some(1),
            ..Default::default()
        }
        .apply(&template);

        assert_eq!(out.0["1"]["inputs"]["image"], "scene.png");
        assert_eq!(out.0["2"]["inputs"]["image"], "face.png");
    }

    #[test]
    fn load_workflow_round_trips_a_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, r#"{"1": {"class_type": "LoadImage", "inputs": {}}}"#).unwrap();

        let wf = load_workflow(&path).unwrap();
        assert_eq!(wf.node_count(), 1);
    }

    #[test]
    fn load_workflow_missing_file_is_typed() {
        let err = load_workflow(Path::new("/nonexistent/graph.json")).unwrap_err();
        assert!(matches!(err, ComfyError::WorkflowMissing(_)));
    }
}
