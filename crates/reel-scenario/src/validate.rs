// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! LLM-backed quality validators and the bounded retry loop.
//!
//! Both validators are low-temperature (0.3) LLM calls returning a JSON
//! verdict.  A verdict that cannot be parsed **passes by default** — the
//! alternative is a retry loop that can never terminate when the scoring
//! model misbehaves, which would deadlock the whole stream.  The default
//! is an explicit constructor so the choice is visible at the call sites.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use reel_model::{ChatModel, CompletionRequest};

use crate::prompts;
use crate::synth::{self, extract_json_object};

/// Fixed verdict shape returned by both validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub score: f64,
    pub pass: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
}

impl Verdict {
    /// Default-pass verdict for unparseable validator output.
    pub fn default_pass(reason: impl Into<String>) -> Self {
        Self {
            score: 7.0,
            pass: true,
            issues: Vec::new(),
            reason: reason.into(),
            corrected_text: None,
        }
    }

    /// Empty dialogue skips validation entirely: a purely visual shot is a
    /// legitimate outcome, not a defect to retry.
    pub fn empty_dialogue_pass() -> Self {
        Self {
            score: 10.0,
            pass: true,
            issues: Vec::new(),
            reason: "no dialogue needed for this visual scene".into(),
            corrected_text: None,
        }
    }

    /// Parse a validator reply, recomputing `pass` against `threshold`.
    pub fn parse(reply: &str, threshold: f64) -> Self {
        let parsed = extract_json_object(reply)
            .and_then(|json| serde_json::from_str::<serde_json::Value>(&json).ok());

        let Some(v) = parsed else {
            return Self::default_pass("validator reply was not parseable JSON");
        };

        let score = v.get("score").and_then(|s| s.as_f64()).unwrap_or(7.0);
        let issues = v
            .get("issues")
            .and_then(|i| i.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|x| x.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let reason = v
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();
        let corrected_text = v
            .get("corrected_text")
            .and_then(|c| c.as_str())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Self {
            score,
            pass: score >= threshold,
            issues,
            reason,
            corrected_text,
        }
    }
}

/// Bounded retry: stop on the first verdict at or above `threshold`, or
/// after `max_attempts`, keeping the best-scoring attempt either way.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub threshold: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            threshold: 7.0,
        }
    }
}

/// Score a scenario for Korean spacing, grammar and completeness.
pub async fn validate_scenario(model: &dyn ChatModel, scenario: &str, threshold: f64) -> Verdict {
    let user = format!(
        "{}\n\nScenario Text: \"{}\"\n\nEvaluate and respond in JSON format:",
        prompts::SCENARIO_VALIDATOR_INSTRUCTION,
        scenario
    );

    let reply = match model
        .complete(
            CompletionRequest::new(user)
                .with_max_tokens(512)
                .with_temperature(0.3),
        )
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "scenario validator unreachable, defaulting to pass");
            return Verdict::default_pass("scenario validator unreachable");
        }
    };

    Verdict::parse(&reply, threshold)
}

/// Score one dialogue line against the current scene and the last three
/// dialogues (near-duplicate and word-variety checks live in the template).
pub async fn validate_dialogue(
    model: &dyn ChatModel,
    dialogue: &str,
    scene: &str,
    previous_dialogues: &[String],
    threshold: f64,
) -> Verdict {
    if dialogue.trim().is_empty() {
        return Verdict::empty_dialogue_pass();
    }

    let mut user = format!(
        "{}\n\nScene: \"{}\"\nGenerated Dialogue: \"{}\"",
        prompts::DIALOGUE_VALIDATOR_INSTRUCTION,
        scene,
        dialogue
    );

    let recent: Vec<&String> = previous_dialogues
        .iter()
        .filter(|d| !d.trim().is_empty())
        .collect();
    if !recent.is_empty() {
        user.push_str("\n\nPrevious Dialogues:");
        for d in recent.iter().rev().take(3).rev() {
            user.push_str(&format!("\n- \"{d}\""));
        }
    }
    user.push_str("\n\nEvaluate and respond in JSON format:");

    let reply = match model
        .complete(
            CompletionRequest::new(user)
                .with_max_tokens(256)
                .with_temperature(0.3),
        )
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "dialogue validator unreachable, defaulting to pass");
            return Verdict::default_pass("dialogue validator unreachable");
        }
    };

    Verdict::parse(&reply, threshold)
}

/// A scenario that made it through the validation loop.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedScenario {
    pub text: String,
    pub attempts: u32,
    pub score: f64,
}

/// Generate a scenario and run it through the grammar validator, retrying
/// up to the policy's attempt budget.  When the validator supplies a
/// corrected text, the correction wins over the raw generation.  On
/// exhaustion the best-scoring attempt is returned — the stream must go on.
pub async fn generate_validated_scenario(
    model: &dyn ChatModel,
    brand: &str,
    user_query: &str,
    policy: RetryPolicy,
) -> anyhow::Result<ValidatedScenario> {
    let mut best: Option<(f64, String)> = None;
    let mut attempts = 0;

    while attempts < policy.max_attempts {
        attempts += 1;
        let scenario = synth::generate_scenario(model, brand, user_query).await?;
        let verdict = validate_scenario(model, &scenario, policy.threshold).await;

        debug!(
            attempt = attempts,
            score = verdict.score,
            pass = verdict.pass,
            "scenario validated"
        );

        let chosen = verdict
            .corrected_text
            .clone()
            .unwrap_or_else(|| scenario.clone());

        if verdict.pass {
            info!(attempts, score = verdict.score, "scenario accepted");
            return Ok(ValidatedScenario {
                text: chosen,
                attempts,
                score: verdict.score,
            });
        }

        if best.as_ref().map_or(true, |(s, _)| verdict.score > *s) {
            best = Some((verdict.score, chosen));
        }
    }

    let (score, text) = best.unwrap_or((0.0, String::new()));
    info!(attempts, score, "scenario retries exhausted, using best attempt");
    Ok(ValidatedScenario {
        text,
        attempts,
        score,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reel_model::ScriptedModel;

    #[test]
    fn parse_recomputes_pass_from_threshold() {
        let reply = r#"{"score": 6, "pass": true, "reason": "mediocre"}"#;
        let verdict = Verdict::parse(reply, 7.0);
        assert_eq!(verdict.score, 6.0);
        assert!(!verdict.pass, "6 < 7 fails regardless of the model's claim");
    }

    #[test]
    fn parse_failure_defaults_to_pass() {
        let verdict = Verdict::parse("the dialogue is fine I guess", 7.0);
        assert!(verdict.pass);
        assert_eq!(verdict.score, 7.0);
    }

    #[test]
    fn parse_keeps_corrected_text_when_present() {
        let reply = r#"{"score": 4, "pass": false, "issues": ["spacing"], "corrected_text": "지지가 침대에 앉아 제품을 바름."}"#;
        let verdict = Verdict::parse(reply, 7.0);
        assert_eq!(
            verdict.corrected_text.as_deref(),
            Some("지지가 침대에 앉아 제품을 바름.")
        );
    }

    #[test]
    fn blank_corrected_text_is_dropped() {
        let reply = r#"{"score": 9, "pass": true, "corrected_text": "  "}"#;
        let verdict = Verdict::parse(reply, 7.0);
        assert!(verdict.corrected_text.is_none());
    }

    #[tokio::test]
    async fn empty_dialogue_short_circuits_with_perfect_score() {
        let model = ScriptedModel::always("should never be called");
        let verdict = validate_dialogue(&model, "", "장면", &[], 7.0).await;
        assert!(verdict.pass);
        assert_eq!(verdict.score, 10.0);
        assert!(model.last_request.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn dialogue_validator_includes_recent_dialogues() {
        let model = ScriptedModel::always(r#"{"score": 9, "pass": true}"#);
        let previous = vec!["향이 좋네요".to_string(), "색감이 좋네요".to_string()];
        let verdict =
            validate_dialogue(&model, "기분이 좋네요", "장면", &previous, 7.0).await;
        assert!(verdict.pass);
        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert!(req.user.contains("향이 좋네요"));
        assert!(req.user.contains("색감이 좋네요"));
        assert!((req.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn scenario_loop_returns_on_first_pass() {
        let model = ScriptedModel::new(vec![
            "지지가 아침 햇살을 맞이한다.".into(),
            r#"{"score": 9, "pass": true, "reason": "clean"}"#.into(),
        ]);
        let result = generate_validated_scenario(&model, "이니스프리", "", RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.text, "지지가 아침 햇살을 맞이한다.");
    }

    #[tokio::test]
    async fn scenario_loop_prefers_corrected_text() {
        let model = ScriptedModel::new(vec![
            "지지가침대에앉아제품을바름.".into(),
            r#"{"score": 8, "pass": true, "corrected_text": "지지가 침대에 앉아 제품을 바름."}"#
                .into(),
        ]);
        let result = generate_validated_scenario(&model, "이니스프리", "", RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(result.text, "지지가 침대에 앉아 제품을 바름.");
    }

    #[tokio::test]
    async fn scenario_loop_exhaustion_returns_best_attempt() {
        // Three generate+validate rounds, all failing; the middle one
        // scores highest and must win.
        let model = ScriptedModel::new(vec![
            "첫번째 시나리오 문장입니다.".into(),
            r#"{"score": 3, "pass": false}"#.into(),
            "두번째 시나리오 문장입니다.".into(),
            r#"{"score": 5, "pass": false}"#.into(),
            "세번째 시나리오 문장입니다.".into(),
            r#"{"score": 4, "pass": false}"#.into(),
        ]);
        let result = generate_validated_scenario(&model, "헤라", "", RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(result.attempts, 3);
        assert_eq!(result.score, 5.0);
        assert_eq!(result.text, "두번째 시나리오 문장입니다.");
    }
}
