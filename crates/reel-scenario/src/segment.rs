// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Deterministic shot segmentation.
//!
//! Splits a Korean scenario into timed shots without touching the LLM, so
//! retries in the prompt-synthesis stage never re-tile the timeline.  The
//! partition prefers explicit scene-transition markers, falls back to
//! sentence boundaries, then progressively finer splits (commas, connective
//! morphemes, equal character chunks) until at least four shots exist.

use regex::Regex;
use serde::Serialize;

/// Target shot length when the caller does not specify one.
pub const DEFAULT_SHOT_SECS: u32 = 5;

/// Minimum shot count.  Shorter videos still get four shots; the invariant
/// is best-effort under pathological input (an almost-empty scenario can
/// yield fewer).
const MIN_SHOTS: usize = 4;

/// Phrases that mark an explicit scene transition in the scenario text.
const TRANSITION_MARKERS: &[&str] = &[
    "화면 전환이 되고",
    "화면 전환되고",
    "화면이 전환되고",
    "그 다음",
    "이후",
    "다음으로",
    "그리고",
    "->",
    "→",
    "장면 전환",
];

/// Connective morphemes used for the finest split level, longest form
/// first: "그 다음" must be consumed as one unit, never re-split on its
/// "다음" suffix.
const CONNECTIVES: &[&str] = &["그 다음", "그리고", "하고", "하며", "또한", "이후", "다음"];

const SPLIT_TOKEN: &str = "\u{1}SPLIT\u{1}";

/// One timed segment of the scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedScene {
    pub time_start: f64,
    pub time_end: f64,
    pub description: String,
}

/// Partition `scenario` into timed shots covering `[0, duration_secs]`.
///
/// The shot count targets `max(4, duration / target_shot_secs)`; times are
/// assigned uniformly, rounded to two decimals, with the final end pinned
/// to the exact duration.
pub fn segment_scenario(
    scenario: &str,
    duration_secs: u32,
    target_shot_secs: u32,
) -> Vec<TimedScene> {
    let target = (duration_secs / target_shot_secs.max(1)) as usize;
    let target = target.max(MIN_SHOTS);

    let mut scenes = initial_split(scenario);

    // Too many fragments: merge consecutive ones into groups.
    if scenes.len() as f64 > target as f64 * 1.5 {
        scenes = merge_into_groups(scenes, target);
    }

    // Far too few: split finer, by comma first, then around connective
    // morphemes.
    if (scenes.len() as f64) < target as f64 / 2.0 {
        scenes = refine_finer(scenes, target);
    }

    if scenes.is_empty() {
        let trimmed = scenario.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        scenes = vec![trimmed.to_string()];
    }

    // Last resort: equal character chunks of the whole text.
    if scenes.len() < MIN_SHOTS {
        scenes = chunk_equally(scenario.trim(), MIN_SHOTS);
    }

    assign_times(scenes, duration_secs)
}

/// Split on transition markers when any are present, otherwise on `.`.
/// Fragments of 15 characters or fewer are noise (a trailing particle or a
/// stray clause) and are dropped.
fn initial_split(scenario: &str) -> Vec<String> {
    let mut text = scenario.to_string();
    let mut marker_found = false;
    for marker in TRANSITION_MARKERS {
        if text.contains(marker) {
            text = text.replace(marker, SPLIT_TOKEN);
            marker_found = true;
        }
    }

    let raw: Vec<&str> = if marker_found {
        text.split(SPLIT_TOKEN).collect()
    } else {
        scenario.split('.').collect()
    };

    raw.iter()
        .map(|s| s.trim())
        .filter(|s| s.chars().count() > 15)
        .map(|s| s.to_string())
        .collect()
}

/// Merge consecutive fragments into `target` groups of equal fragment count.
fn merge_into_groups(scenes: Vec<String>, target: usize) -> Vec<String> {
    let per_group = (scenes.len() / target).max(1);
    scenes
        .chunks(per_group)
        .map(|group| group.join(" "))
        .take(target)
        .collect()
}

/// Fewer than half the target: split finer — by comma first, then around
/// connective morphemes, dropping tokens of 10 characters or fewer at each
/// stage.
fn refine_finer(scenes: Vec<String>, target: usize) -> Vec<String> {
    let by_comma: Vec<String> = scenes
        .iter()
        .flat_map(|scene| scene.split(','))
        .map(|s| s.trim())
        .filter(|s| s.chars().count() > 10)
        .map(|s| s.to_string())
        .collect();
    let mut scenes = if by_comma.is_empty() { scenes } else { by_comma };

    if (scenes.len() as f64) < target as f64 / 2.0 {
        let finer: Vec<String> = scenes
            .iter()
            .flat_map(|scene| split_on_connectives(scene))
            .filter(|s| s.chars().count() > 10)
            .collect();
        if !finer.is_empty() {
            scenes = finer;
        }
    }

    scenes
}

/// Split a scene around connective morphemes, dropping the connectives
/// themselves.  One alternation pass over the whole scene: at each match
/// position the first (longest) alternative wins, so a compound form like
/// "그 다음" is removed whole instead of leaving a dangling "그 ".  A
/// connective inside a longer word still splits; such fragments are short
/// and filtered by the caller.
fn split_on_connectives(scene: &str) -> Vec<String> {
    let Ok(alternation) = Regex::new(&CONNECTIVES.join("|")) else {
        return vec![scene.to_string()];
    };
    alternation
        .split(scene)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Chunk text into `n` equal character-count substrings.  When the text is
/// too short to fill every chunk, the last chunk is repeated so the caller
/// still gets `n` entries.
fn chunk_equally(text: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let chunk_size = (chars.len() / n).max(1);

    let mut chunks = Vec::with_capacity(n);
    for i in 0..n {
        let start = i * chunk_size;
        if start >= chars.len() {
            break;
        }
        let end = if i == n - 1 {
            chars.len()
        } else {
            (start + chunk_size).min(chars.len())
        };
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
    }

    while chunks.len() < n {
        match chunks.last() {
            Some(last) => chunks.push(last.clone()),
            None => break,
        }
    }
    chunks
}

/// Uniform time assignment over `[0, duration]`, two-decimal rounding, and
/// the final end pinned exactly to the duration.
fn assign_times(scenes: Vec<String>, duration_secs: u32) -> Vec<TimedScene> {
    let count = scenes.len();
    let duration = f64::from(duration_secs);
    let per_scene = duration / count as f64;

    scenes
        .into_iter()
        .enumerate()
        .map(|(i, description)| {
            let time_start = round2(i as f64 * per_scene);
            let time_end = if i == count - 1 {
                duration
            } else {
                round2((i + 1) as f64 * per_scene)
            };
            TimedScene {
                time_start,
                time_end,
                description,
            }
        })
        .collect()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const INNISFREE: &str = "관엽식물이 있는 화이트 + 그린 + 우드 컬러의 실내 집 배경, 지지가 \
                             침대에 앉아 침대 앞에 있는 협탁에 손을 뻗어 이니스프리의 '그린티 \
                             밀크 보습 에센스'를 손에 쥠, 화면 전환이 되고 세안 밴드를 낀 지지가 \
                             민낯 상태로 해당 제품을 바름.";

    /// N full sentences, each long enough to survive the length filter.
    fn sentence_scenario(n: usize) -> String {
        (1..=n)
            .map(|i| format!("지지가 장면 {i}에서 제품을 사용하며 자연스러운 모습을 보여준다"))
            .collect::<Vec<_>>()
            .join(". ")
            + "."
    }

    #[test]
    fn twenty_five_seconds_yields_five_even_shots() {
        let scenes = segment_scenario(&sentence_scenario(5), 25, 5);
        assert_eq!(scenes.len(), 5);
        for (i, scene) in scenes.iter().enumerate() {
            assert!(
                (scene.time_end - scene.time_start - 5.0).abs() < 0.01,
                "shot {i} should be 5.0s, got {:?}",
                scene
            );
        }
        assert_eq!(scenes[0].time_start, 0.0);
        assert_eq!(scenes[4].time_end, 25.0);
    }

    #[test]
    fn three_seconds_still_yields_four_shots() {
        let scenes = segment_scenario(&sentence_scenario(4), 3, 5);
        assert_eq!(scenes.len(), 4, "max(4, 3/5) = 4");
        for scene in &scenes {
            assert!((scene.time_end - scene.time_start - 0.75).abs() < 0.01);
        }
        assert_eq!(scenes[3].time_end, 3.0);
    }

    #[test]
    fn times_tile_without_gap_or_overlap() {
        let scenes = segment_scenario(&sentence_scenario(6), 23, 5);
        assert_eq!(scenes[0].time_start, 0.0);
        for pair in scenes.windows(2) {
            assert_eq!(pair[0].time_end, pair[1].time_start);
        }
        assert_eq!(scenes.last().unwrap().time_end, 23.0);
    }

    #[test]
    fn transition_markers_take_priority_over_sentence_split() {
        let split = initial_split(INNISFREE);
        assert_eq!(split.len(), 2, "one marker → two fragments");
        for fragment in &split {
            assert!(!fragment.contains("화면 전환이 되고"));
        }
    }

    #[test]
    fn marker_split_scenario_still_reaches_four_shots() {
        let scenes = segment_scenario(INNISFREE, 25, 5);
        assert!(scenes.len() >= MIN_SHOTS);
        assert_eq!(scenes.last().unwrap().time_end, 25.0);
    }

    #[test]
    fn compound_connective_splits_as_one_unit() {
        let pieces = split_on_connectives("지지가 제품을 살펴봄 그 다음 거울 앞에서 제품을 바름");
        assert_eq!(
            pieces,
            vec!["지지가 제품을 살펴봄", "거울 앞에서 제품을 바름"],
            "그 다음 must be consumed whole, not leave a stray 그"
        );
    }

    #[test]
    fn bare_connective_still_splits() {
        let pieces = split_on_connectives("창문을 열어 환기함 다음 침대를 정리함");
        assert_eq!(pieces, vec!["창문을 열어 환기함", "침대를 정리함"]);
    }

    #[test]
    fn short_fragments_are_dropped() {
        let text = "짧음. 지지가 욕실 거울 앞에서 세안을 하며 하루를 시작함. 끝.";
        let split = initial_split(text);
        assert_eq!(split.len(), 1);
        assert!(split[0].contains("세안"));
    }

    #[test]
    fn pathological_input_is_best_effort() {
        // Far below 40 chars: four chunks cannot all be distinct, but the
        // function still returns at least one timed scene.
        let scenes = segment_scenario("지지가 제품을 바르는 모습을 근접 촬영", 10, 5);
        assert!(!scenes.is_empty());
        assert_eq!(scenes.last().unwrap().time_end, 10.0);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(segment_scenario("", 10, 5).is_empty());
        assert!(segment_scenario("   ", 10, 5).is_empty());
    }

    #[test]
    fn many_fragments_merge_toward_target() {
        let long: String = (1..=20)
            .map(|i| format!("지지가 스무 개 장면 가운데 {i}번째 장면을 연기한다"))
            .collect::<Vec<_>>()
            .join(". ");
        let scenes = segment_scenario(&long, 25, 5);
        assert_eq!(scenes.len(), 5, "20 fragments > 1.5×5 must merge to 5");
    }

    #[test]
    fn last_shot_end_is_exact_even_with_rounding() {
        // 7 scenes over 20s → 2.857… per scene; rounding must not leak into
        // the final boundary.
        let long: String = (1..=7)
            .map(|i| format!("지지가 일곱 개 장면 가운데 {i}번째 장면을 연기한다"))
            .collect::<Vec<_>>()
            .join(". ");
        let scenes = segment_scenario(&long, 20, 3);
        assert_eq!(scenes.last().unwrap().time_end, 20.0);
    }
}
