// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Scenario and per-shot prompt synthesis.
//!
//! Each function wraps one LLM call site.  Per-shot synthesis never fails:
//! an unreachable model or an unparseable reply degrades to
//! [`ShotPrompts::default_prompts`] so the stream keeps moving.

use regex::Regex;
use tracing::{debug, warn};

use reel_model::{ChatModel, CompletionRequest};

use crate::prompts;
use crate::types::ShotPrompts;

/// One prior shot carried in the rolling context window.
#[derive(Debug, Clone)]
pub struct SceneContext {
    pub scene: String,
    pub dialogue: String,
}

/// Generate the Korean scenario text for a brand brief.  An empty
/// `user_query` selects the brand's curated default request.
pub async fn generate_scenario(
    model: &dyn ChatModel,
    brand: &str,
    user_query: &str,
) -> anyhow::Result<String> {
    let request = if user_query.trim().is_empty() {
        debug!(brand, "using brand default scenario request");
        prompts::default_scenario_request(brand).to_string()
    } else {
        user_query.to_string()
    };

    let instruction = prompts::SCENARIO_INSTRUCTION.replace("{user_request}", &request);
    let user = format!("{instruction}\n\n브랜드: {brand}");

    let reply = model
        .complete(
            CompletionRequest::new(user)
                .with_max_tokens(256)
                .with_temperature(0.2),
        )
        .await?;
    Ok(reply.trim().to_string())
}

/// Convert one Korean scene description into prompts + dialogue.
///
/// The previous **two** shots ride along as `Scene → Dialogue` pairs; the
/// template uses them both to keep dialogue scene-relevant and to suppress
/// lexical repetition.
pub async fn synthesize_prompts(
    model: &dyn ChatModel,
    scene: &str,
    brand: &str,
    context: &[SceneContext],
) -> ShotPrompts {
    let mut user = String::from(prompts::PROMPT_INSTRUCTION);

    let recent = context.iter().rev().take(2).rev();
    for ctx in recent {
        if ctx.dialogue.is_empty() {
            user.push_str(&format!("\nScene: \"{}\" → (no dialogue)", ctx.scene));
        } else {
            user.push_str(&format!(
                "\nScene: \"{}\" → Dialogue: \"{}\"",
                ctx.scene, ctx.dialogue
            ));
        }
    }

    user.push_str(&format!("\nCurrent Scene: {scene}"));
    if !brand.is_empty() {
        user.push_str(&format!("\nBrand: {brand}"));
    }

    let reply = match model
        .complete(
            CompletionRequest::new(user)
                .with_max_tokens(512)
                .with_temperature(0.5),
        )
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "prompt synthesis call failed, using defaults");
            return ShotPrompts::default_prompts();
        }
    };

    match extract_json_object(&reply).and_then(|json| serde_json::from_str(&json).ok()) {
        Some(prompts) => prompts,
        None => {
            warn!("prompt synthesis reply was not parseable JSON, using defaults");
            ShotPrompts::default_prompts()
        }
    }
}

/// Regenerate the dialogue for one scene without touching its prompts.
pub async fn regenerate_dialogue(
    model: &dyn ChatModel,
    scene: &str,
    previous_dialogues: &[String],
) -> anyhow::Result<String> {
    let mut user = String::from(prompts::DIALOGUE_INSTRUCTION);

    let recent: Vec<&String> = previous_dialogues
        .iter()
        .filter(|d| !d.trim().is_empty())
        .collect();
    for (i, dialogue) in recent.iter().rev().take(3).rev().enumerate() {
        user.push_str(&format!("\nPrevious dialogue {}: \"{}\"", i + 1, dialogue));
    }
    user.push_str(&format!("\nCurrent Scene: {scene}"));

    let reply = model
        .complete(
            CompletionRequest::new(user)
                .with_max_tokens(128)
                .with_temperature(0.7),
        )
        .await?;

    Ok(clean_dialogue_reply(&reply))
}

/// The dialogue endpoint asks for raw text but models still sometimes wrap
/// it in quotes or a JSON object; unwrap both.
fn clean_dialogue_reply(reply: &str) -> String {
    let trimmed = reply
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();

    if trimmed.starts_with('{') {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(d) = v.get("dialogue").and_then(|d| d.as_str()) {
                return d.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Pull the first JSON object out of an LLM reply.  Prefers a fenced
/// ```json block; falls back to the outermost brace span.
pub fn extract_json_object(text: &str) -> Option<String> {
    let fenced = Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").ok()?;
    if let Some(captures) = fenced.captures(text) {
        return Some(captures[1].to_string());
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(text[start..=end].to_string())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reel_model::ScriptedModel;

    fn prompts_json(dialogue: &str) -> String {
        format!(
            r#"{{"dialogue": "{dialogue}", "t2i_prompt": {{"background": "bedroom", "character_pose_and_gaze": "standing", "product": "essence bottle", "camera_angle": "front"}}, "image_edit_prompt": {{"pose_change": "sit", "gaze_change": "down", "expression": "smile", "additional_edits": ""}}, "background_sounds_prompt": "birds chirping"}}"#
        )
    }

    #[test]
    fn extract_prefers_fenced_block() {
        let text = "Here you go:\n```json\n{\"dialogue\": \"안녕하세요\"}\n```\nenjoy";
        let json = extract_json_object(text).unwrap();
        assert_eq!(json, "{\"dialogue\": \"안녕하세요\"}");
    }

    #[test]
    fn extract_falls_back_to_brace_span() {
        let text = "sure — {\"dialogue\": \"네\"} — done";
        let json = extract_json_object(text).unwrap();
        assert_eq!(json, "{\"dialogue\": \"네\"}");
    }

    #[test]
    fn extract_none_without_braces() {
        assert!(extract_json_object("no json here").is_none());
    }

    #[tokio::test]
    async fn synthesis_parses_model_json() {
        let model = ScriptedModel::always(prompts_json("향이 좋아요"));
        let prompts = synthesize_prompts(&model, "지지가 에센스 병을 집음", "이니스프리", &[]).await;
        assert_eq!(prompts.dialogue, "향이 좋아요");
        assert_eq!(prompts.t2i_prompt.background, "bedroom");
        assert_eq!(prompts.background_sounds_prompt, "birds chirping");
    }

    #[tokio::test]
    async fn synthesis_defaults_on_non_json_reply() {
        let model = ScriptedModel::always("I cannot answer in JSON today.");
        let prompts = synthesize_prompts(&model, "장면", "", &[]).await;
        assert_eq!(prompts, ShotPrompts::default_prompts());
    }

    #[tokio::test]
    async fn context_window_carries_last_two_shots_only() {
        let model = ScriptedModel::always(prompts_json(""));
        let context = vec![
            SceneContext { scene: "장면1".into(), dialogue: "발화1".into() },
            SceneContext { scene: "장면2".into(), dialogue: "발화2".into() },
            SceneContext { scene: "장면3".into(), dialogue: String::new() },
        ];
        synthesize_prompts(&model, "장면4", "브랜드", &context).await;

        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert!(!req.user.contains("장면1"), "oldest shot must be dropped");
        assert!(req.user.contains("Scene: \"장면2\" → Dialogue: \"발화2\""));
        assert!(req.user.contains("Scene: \"장면3\" → (no dialogue)"));
        assert!(req.user.contains("Current Scene: 장면4"));
        assert!(req.user.contains("Brand: 브랜드"));
    }

    #[tokio::test]
    async fn scenario_uses_brand_default_when_query_empty() {
        let model = ScriptedModel::always("지지가 아침 햇살을 맞이한다.");
        generate_scenario(&model, "이니스프리", "").await.unwrap();
        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert!(req.user.contains("그린티 밀크 보습 에센스"));
        assert!(req.user.contains("브랜드: 이니스프리"));
    }

    #[tokio::test]
    async fn scenario_uses_user_query_when_present() {
        let model = ScriptedModel::always("시나리오.");
        generate_scenario(&model, "이니스프리", "바닷가 배경으로 만들어줘")
            .await
            .unwrap();
        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert!(req.user.contains("바닷가 배경으로 만들어줘"));
        assert!(!req.user.contains("그린티 밀크 보습 에센스"));
    }

    #[tokio::test]
    async fn dialogue_reply_unwraps_quotes_and_json() {
        let model = ScriptedModel::new(vec![
            "\"아침 햇살 좋네요\"".into(),
            r#"{"dialogue": "물이 차가워요"}"#.into(),
        ]);
        let first = regenerate_dialogue(&model, "장면", &[]).await.unwrap();
        assert_eq!(first, "아침 햇살 좋네요");
        let second = regenerate_dialogue(&model, "장면", &[]).await.unwrap();
        assert_eq!(second, "물이 차가워요");
    }

    #[tokio::test]
    async fn dialogue_context_skips_empty_and_keeps_last_three() {
        let model = ScriptedModel::always("네");
        let previous = vec![
            "하나".to_string(),
            String::new(),
            "둘".to_string(),
            "셋".to_string(),
            "넷".to_string(),
        ];
        regenerate_dialogue(&model, "장면", &previous).await.unwrap();
        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert!(!req.user.contains("하나"));
        assert!(req.user.contains("둘"));
        assert!(req.user.contains("셋"));
        assert!(req.user.contains("넷"));
    }
}
