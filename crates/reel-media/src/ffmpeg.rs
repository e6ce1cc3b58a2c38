// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::MediaError;

/// Wall-clock ceiling for one encoder invocation.
const ENCODER_TIMEOUT: Duration = Duration::from_secs(300);

/// Stderr tail kept for error propagation.  Encoder output is verbose; the
/// diagnosis is at the end.
const STDERR_KEEP: usize = 500;

/// How a merge completed.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub output: PathBuf,
    /// Probed duration of the produced file in seconds.
    pub duration: f64,
    /// True when stream-copy failed and the inputs were re-encoded.
    pub reencoded: bool,
}

/// Concatenate videos in order.
///
/// Stream-copy is attempted first; shots generated under slightly different
/// conditions often disagree on codec parameters, so any nonzero exit is
/// retried with a full re-encode (H.264 CRF 23, AAC 128k).
pub async fn concat(inputs: &[PathBuf], output: &Path) -> Result<MergeOutcome, MediaError> {
    if inputs.len() < 2 {
        return Err(MediaError::BadInput(format!(
            "need at least 2 videos to merge, got {}",
            inputs.len()
        )));
    }
    for input in inputs {
        if !input.is_file() {
            return Err(MediaError::BadInput(format!(
                "input not found: {}",
                input.display()
            )));
        }
    }

    let list_path = output.with_extension("concat.txt");
    std::fs::write(&list_path, concat_list(inputs))?;

    let copy_args = [
        "-y",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
        path_str(&list_path),
        "-c",
        "copy",
        path_str(output),
    ]
    .map(String::from);

    let copy_result = run_ffmpeg(&copy_args).await;
    let reencoded = match copy_result {
        Ok(()) => false,
        Err(MediaError::Encoder { stderr }) => {
            warn!(stderr = %stderr, "stream-copy concat failed, re-encoding");
            let encode_args = [
                "-y",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                path_str(&list_path),
                "-c:v",
                "libx264",
                "-crf",
                "23",
                "-preset",
                "medium",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                path_str(output),
            ]
            .map(String::from);
            run_ffmpeg(&encode_args).await?;
            true
        }
        Err(other) => return Err(other),
    };

    let _ = std::fs::remove_file(&list_path);

    let duration = probe_duration(output).await?;
    info!(
        inputs = inputs.len(),
        duration, reencoded, output = %output.display(), "concat finished"
    );
    Ok(MergeOutcome {
        output: output.to_path_buf(),
        duration,
        reencoded,
    })
}

/// Put `audio`'s track under `video`'s picture.  The video bitstream is
/// copied; audio is encoded to AAC and the output stops at the shorter
/// input.
pub async fn merge_audio_video(
    video: &Path,
    audio: &Path,
    output: &Path,
) -> Result<MergeOutcome, MediaError> {
    for input in [video, audio] {
        if !input.is_file() {
            return Err(MediaError::BadInput(format!(
                "input not found: {}",
                input.display()
            )));
        }
    }

    let args = [
        "-y",
        "-i",
        path_str(video),
        "-i",
        path_str(audio),
        "-map",
        "0:v:0",
        "-map",
        "1:a:0",
        "-c:v",
        "copy",
        "-c:a",
        "aac",
        "-shortest",
        path_str(output),
    ]
    .map(String::from);
    run_ffmpeg(&args).await?;

    let duration = probe_duration(output).await?;
    Ok(MergeOutcome {
        output: output.to_path_buf(),
        duration,
        reencoded: false,
    })
}

/// Mix an extra (ambient) track into a video that already has audio.
/// `v_gain` scales the video's own track, `a_gain` the extra one; the mix
/// stops with the first input and the video bitstream is copied untouched.
pub async fn mix_audio(
    video: &Path,
    extra_audio: &Path,
    output: &Path,
    v_gain: f32,
    a_gain: f32,
) -> Result<MergeOutcome, MediaError> {
    for input in [video, extra_audio] {
        if !input.is_file() {
            return Err(MediaError::BadInput(format!(
                "input not found: {}",
                input.display()
            )));
        }
    }

    let args = mix_args(video, extra_audio, output, v_gain, a_gain);
    run_ffmpeg(&args).await?;

    let duration = probe_duration(output).await?;
    Ok(MergeOutcome {
        output: output.to_path_buf(),
        duration,
        reencoded: false,
    })
}

/// Duration of a media file in seconds, via ffprobe.
pub async fn probe_duration(path: &Path) -> Result<f64, MediaError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::Probe(path.display().to_string()));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|_| MediaError::Probe(path.display().to_string()))
}

/// The concat demuxer's list format.  Single quotes in paths are escaped
/// with the `'\''` idiom the demuxer expects.
fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| {
            let escaped = p.display().to_string().replace('\'', r"'\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

fn mix_args(video: &Path, extra: &Path, output: &Path, v_gain: f32, a_gain: f32) -> Vec<String> {
    let filter = format!(
        "[0:a]volume={v_gain}[a0];[1:a]volume={a_gain}[a1];\
         [a0][a1]amix=inputs=2:duration=first:dropout_transition=2[out]"
    );
    vec![
        "-y".to_string(),
        "-i".to_string(),
        path_str(video).to_string(),
        "-i".to_string(),
        path_str(extra).to_string(),
        "-filter_complex".to_string(),
        filter,
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "[out]".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        path_str(output).to_string(),
    ]
}

async fn run_ffmpeg(args: &[String]) -> Result<(), MediaError> {
    debug!(args = ?args, "running ffmpeg");

    let mut child = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let waited = tokio::time::timeout(ENCODER_TIMEOUT, child.wait_with_output()).await;
    let output = match waited {
        Ok(result) => result?,
        Err(_) => return Err(MediaError::Timeout(ENCODER_TIMEOUT.as_secs())),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .chars()
            .skip(stderr.chars().count().saturating_sub(STDERR_KEEP))
            .collect();
        return Err(MediaError::Encoder { stderr: tail });
    }
    Ok(())
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_default()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_list_quotes_and_escapes_paths() {
        let inputs = vec![
            PathBuf::from("/tmp/scene_001.mp4"),
            PathBuf::from("/tmp/it's here.mp4"),
        ];
        let list = concat_list(&inputs);
        assert_eq!(
            list,
            "file '/tmp/scene_001.mp4'\nfile '/tmp/it'\\''s here.mp4'\n"
        );
    }

    #[test]
    fn mix_filter_graph_carries_gains() {
        let args = mix_args(
            Path::new("v.mp4"),
            Path::new("ambient.wav"),
            Path::new("out.mp4"),
            1.0,
            0.3,
        );
        let filter = args
            .iter()
            .find(|a| a.contains("amix"))
            .expect("filter_complex argument");
        assert!(filter.contains("volume=1[a0]") || filter.contains("volume=1.0[a0]"));
        assert!(filter.contains("volume=0.3[a1]"));
        assert!(filter.contains("amix=inputs=2:duration=first:dropout_transition=2"));
        // Video stream must be copied, not re-encoded.
        let cv = args.iter().position(|a| a == "-c:v").unwrap();
        assert_eq!(args[cv + 1], "copy");
    }

    #[tokio::test]
    async fn concat_rejects_single_input() {
        let err = concat(&[PathBuf::from("only.mp4")], Path::new("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::BadInput(_)));
    }

    #[tokio::test]
    async fn concat_rejects_missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        std::fs::write(&a, b"not a real video").unwrap();
        let err = concat(
            &[a, dir.path().join("missing.mp4")],
            &dir.path().join("out.mp4"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::BadInput(_)));
    }

    #[tokio::test]
    async fn merge_audio_video_rejects_missing_inputs() {
        let err = merge_audio_video(
            Path::new("/nonexistent/v.mp4"),
            Path::new("/nonexistent/a.wav"),
            Path::new("/tmp/out.mp4"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::BadInput(_)));
    }

    // Exercises the real encoder; run with `cargo test -- --ignored` on a
    // machine with ffmpeg installed.
    #[tokio::test]
    #[ignore]
    async fn concat_two_generated_clips_sums_duration() {
        let dir = tempfile::tempdir().unwrap();
        let make = |name: &str, secs: &str| {
            let path = dir.path().join(name);
            let status = std::process::Command::new("ffmpeg")
                .args([
                    "-y", "-f", "lavfi", "-i", "testsrc=size=64x64:rate=10", "-t", secs,
                ])
                .arg(&path)
                .status()
                .unwrap();
            assert!(status.success());
            path
        };
        let a = make("a.mp4", "2");
        let b = make("b.mp4", "3");

        let out = dir.path().join("merged.mp4");
        let outcome = concat(&[a, b], &out).await.unwrap();
        assert!((outcome.duration - 5.0).abs() < 0.1);
    }
}
