// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest
/// priority.  Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/reel/config.yaml"));
    paths.push(PathBuf::from("/etc/reel/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/reel/config.yaml"));
        paths.push(home.join(".config/reel/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".reel/config.yaml"));
    paths.push(PathBuf::from(".reel/config.yml"));
    paths.push(PathBuf::from("reel.yaml"));
    paths.push(PathBuf::from("reel.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then applying
/// environment-variable overrides.  The `extra` argument may provide an
/// explicit path (e.g. a `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Environment variables override anything the YAML layers set.  This is the
/// set the deployment scripts have always exported.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var("BACKEND_URL") {
        config.image.base_url = url.clone();
        config.video.base_url = url.clone();
        config.lipsync.base_url = url.clone();
        config.ambient.base_url = url;
    }
    if let Ok(path) = std::env::var("WORKFLOW_PATH") {
        let path = PathBuf::from(path);
        config.image.workflow_path.get_or_insert_with(|| path.clone());
        config.video.workflow_path.get_or_insert_with(|| path.clone());
        config.lipsync.workflow_path.get_or_insert_with(|| path.clone());
        config.ambient.workflow_path.get_or_insert(path);
    }
    if let Ok(key) = std::env::var("TTS_API_KEY") {
        config.tts.api_key = Some(key);
    }
    if let Ok(voice) = std::env::var("TTS_VOICE_ID") {
        config.tts.voice_id = Some(voice);
    }
    if let Ok(model) = std::env::var("TTS_MODEL_ID") {
        config.tts.model_id = Some(model);
    }
    if let Ok(hours) = std::env::var("FILE_MAX_AGE_HOURS") {
        if let Ok(hours) = hours.parse() {
            config.retention.file_max_age_hours = hours;
        }
    }
    if let Ok(hours) = std::env::var("SESSION_MAX_AGE_HOURS") {
        if let Ok(hours) = hours.parse() {
            config.session.max_age_hours = hours;
        }
    }
    if let Ok(url) = std::env::var("LLM_BASE_URL") {
        config.model.base_url = url;
    }
    if let Ok(key) = std::env::var("LLM_API_KEY") {
        config.model.api_key = Some(key);
    }
    if let Ok(name) = std::env::var("LLM_MODEL") {
        config.model.name = name;
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x: 1");
        let src = val("x: 2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val("a: 1\nb: 2");
        let src = val("b: 99");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"].as_i64(), Some(1));
        assert_eq!(dst["b"].as_i64(), Some(99));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("video:\n  base_url: http://a:8188");
        let src = val("video:\n  timeout_secs: 1800");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["video"]["base_url"].as_str(), Some("http://a:8188"));
        assert_eq!(dst["video"]["timeout_secs"].as_i64(), Some(1800));
    }

    #[test]
    fn defaults_when_no_files_found() {
        let config = Config::default();
        assert_eq!(config.session.max_age_hours, 24);
        assert_eq!(config.retention.file_max_age_hours, 1);
        assert_eq!(config.http.scenario, "0.0.0.0:8000");
    }

    #[test]
    fn explicit_file_parsed_into_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reel.yaml");
        std::fs::write(
            &path,
            "video:\n  base_url: http://gpu2:8188\nsession:\n  max_age_hours: 48\n",
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.video.base_url, "http://gpu2:8188");
        assert_eq!(config.session.max_age_hours, 48);
        // Untouched sections keep their defaults.
        assert_eq!(config.lipsync.base_url, "http://localhost:8188");
    }
}
