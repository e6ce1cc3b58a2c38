// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end tests over real HTTP: each test binds a gateway router on an
//! ephemeral port and drives it with a plain HTTP client, verifying the
//! exact status codes and payload shapes that pipeline clients depend on.

use std::sync::Arc;

use serde_json::{json, Value};

use reel_gateway::merge::MergeGateway;
use reel_gateway::scenario::ScenarioGateway;
use reel_gateway::OutputDir;
use reel_model::ScriptedModel;
use reel_scenario::TimetableEngine;
use reel_session::SessionStore;

async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn merge_router(dir: &std::path::Path) -> axum::Router {
    let gateway = MergeGateway::new(
        OutputDir::new(dir.join("outputs")).unwrap(),
        OutputDir::new(dir.join("temp")).unwrap(),
        SessionStore::new(dir.join("sessions")),
    );
    reel_gateway::merge::router(Arc::new(gateway))
}

#[tokio::test]
async fn merge_with_one_video_is_rejected_with_400() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(merge_router(dir.path())).await;

    let form = reqwest::multipart::Form::new().part(
        "videos",
        reqwest::multipart::Part::bytes(b"only one".to_vec()).file_name("a.mp4"),
    );
    let resp = reqwest::Client::new()
        .post(format!("{base}/merge"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("at least 2 videos"));
}

#[tokio::test]
async fn merge_session_with_one_name_is_rejected_with_400() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(merge_router(dir.path())).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/merge/session"))
        .json(&json!({ "session_id": "s1", "filenames": ["only.mp4"] }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn session_routes_round_trip_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(merge_router(dir.path())).await;
    let client = reqwest::Client::new();

    // Unknown session lists as exists=false, not an error.
    let listing: Value = client
        .get(format!("{base}/session/demo/files"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["exists"], false);

    // Upload an artifact into the session.
    let form = reqwest::multipart::Form::new()
        .text("session_id", "demo")
        .part(
            "file",
            reqwest::multipart::Part::bytes(b"video bytes".to_vec()).file_name("scene_001.mp4"),
        );
    let resp = client
        .post(format!("{base}/session/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Fetch it back byte-for-byte with the right content type.
    let resp = client
        .get(format!("{base}/session/demo/file/scene_001.mp4"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "video/mp4"
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"video bytes");

    // Missing artifacts are 404.
    let resp = client
        .get(format!("{base}/session/demo/file/ghost.mp4"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Delete reports the removed count; the listing empties.
    let deleted: Value = client
        .delete(format!("{base}/session/demo"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["files_removed"], 1);

    let listing: Value = client
        .get(format!("{base}/session/demo/files"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["exists"], false);
}

#[tokio::test]
async fn missing_output_is_404_and_bad_name_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(merge_router(dir.path())).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/output/ghost.mp4"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .get(format!("{base}/output/..%2Fescape.mp4"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

fn prompts_json(dialogue: &str) -> String {
    format!(
        r#"{{"dialogue": "{dialogue}", "t2i_prompt": {{"background": "room", "character_pose_and_gaze": "standing", "product": "bottle", "camera_angle": "front"}}, "image_edit_prompt": {{"pose_change": "none", "gaze_change": "none", "expression": "smile", "additional_edits": ""}}, "background_sounds_prompt": ""}}"#
    )
}

#[tokio::test]
async fn timetable_stream_speaks_server_sent_events() {
    // Empty dialogues short-circuit validation, so the scripted fallback
    // covers every shot.
    let model = Arc::new(ScriptedModel::always(prompts_json("")));
    let gateway = Arc::new(ScenarioGateway::new(TimetableEngine::new(model)));
    let base = spawn_server(reel_gateway::scenario::router(gateway)).await;

    let scenario = (1..=5)
        .map(|i| format!("지지가 장면 {i}에서 제품을 사용하며 자연스러운 모습을 보여준다"))
        .collect::<Vec<_>>()
        .join(". ")
        + ".";

    let resp = reqwest::Client::new()
        .post(format!("{base}/generate-timetable-stream"))
        .json(&json!({
            "scenario": scenario,
            "video_duration": 25,
            "brand": "이니스프리",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));
    assert_eq!(resp.headers()["cache-control"].to_str().unwrap(), "no-cache");
    assert_eq!(resp.headers()["x-accel-buffering"].to_str().unwrap(), "no");

    let body = resp.text().await.unwrap();
    let events: Vec<Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert_eq!(events.len(), 7, "metadata + 5 scenes + complete");
    assert_eq!(events[0]["type"], "metadata");
    assert_eq!(events[0]["data"]["scene_count"], 5);
    assert_eq!(events[0]["data"]["status"], "started");
    for (i, event) in events[1..6].iter().enumerate() {
        assert_eq!(event["type"], "scene");
        assert_eq!(event["data"]["index"], i);
    }
    assert_eq!(events[6]["type"], "complete");
    assert_eq!(events[6]["data"]["total_scenes"], 5);
}

#[tokio::test]
async fn timetable_stream_reports_bad_input_as_error_event() {
    let model = Arc::new(ScriptedModel::always(prompts_json("")));
    let gateway = Arc::new(ScenarioGateway::new(TimetableEngine::new(model)));
    let base = spawn_server(reel_gateway::scenario::router(gateway)).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/generate-timetable-stream"))
        .json(&json!({ "scenario": "지지", "video_duration": 0 }))
        .send()
        .await
        .unwrap();

    let body = resp.text().await.unwrap();
    let events: Vec<Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
}

#[tokio::test]
async fn brands_endpoint_lists_curated_brands() {
    let model = Arc::new(ScriptedModel::always("시나리오"));
    let gateway = Arc::new(ScenarioGateway::new(TimetableEngine::new(model)));
    let base = spawn_server(reel_gateway::scenario::router(gateway)).await;

    let body: Value = reqwest::Client::new()
        .get(format!("{base}/brands"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let brands = body["brands"].as_array().unwrap();
    assert!(brands.iter().any(|b| b == "이니스프리"));
}
