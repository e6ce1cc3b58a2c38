// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use reel_config::{BackendConfig, Config};
use reel_gateway::audio::AudioGateway;
use reel_gateway::image::ImageGateway;
use reel_gateway::lipsync::LipsyncGateway;
use reel_gateway::merge::MergeGateway;
use reel_gateway::scenario::ScenarioGateway;
use reel_gateway::tts::TtsClient;
use reel_gateway::video::VideoGateway;
use reel_gateway::OutputDir;
use reel_model::OpenAiCompatModel;
use reel_scenario::TimetableEngine;
use reel_session::{sweep_directories, sweep_files, RetentionPolicy, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = reel_config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Commands::Scenario => serve(scenario_router(&config), &config.http.scenario).await,
        Commands::Image => {
            let router = image_router(&config).await?;
            serve_with_sweepers(&config, router, &config.http.image, "image").await
        }
        Commands::Video => {
            let router = video_router(&config)?;
            serve_with_sweepers(&config, router, &config.http.video, "video").await
        }
        Commands::Lipsync => {
            let router = lipsync_router(&config)?;
            serve_with_sweepers(&config, router, &config.http.lipsync, "lipsync").await
        }
        Commands::Audio => {
            let router = audio_router(&config)?;
            serve_with_sweepers(&config, router, &config.http.audio, "audio").await
        }
        Commands::Merge => {
            let router = merge_router(&config)?;
            serve_with_sweepers(&config, router, &config.http.merge, "merge").await
        }
        Commands::All => serve_all(&config).await,
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("reel={default_level},warn")));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

// ── Service construction ──────────────────────────────────────────────────────
//
// Everything a handler touches is built here, once, and injected through the
// router state.  No lazy globals.

fn sessions(config: &Config) -> SessionStore {
    SessionStore::new(config.session.root.clone())
}

fn outputs_for(gateway: &str) -> anyhow::Result<OutputDir> {
    OutputDir::new(PathBuf::from("outputs").join(gateway))
        .with_context(|| format!("creating outputs/{gateway}"))
}

fn workflow_path(backend: &BackendConfig, default_name: &str) -> PathBuf {
    backend
        .workflow_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("workflows").join(default_name))
}

fn scenario_router(config: &Config) -> axum::Router {
    let model = Arc::new(OpenAiCompatModel::new(
        &config.model.base_url,
        config.model.name.clone(),
        config.model.api_key.clone(),
    ));
    let engine = TimetableEngine::new(model);
    let gateway = Arc::new(ScenarioGateway::new(engine));
    reel_gateway::scenario::router(gateway)
}

async fn image_router(config: &Config) -> anyhow::Result<axum::Router> {
    let comfy = reel_comfy::ComfyClient::new(&config.image.base_url);
    let gateway = ImageGateway::new(
        comfy,
        workflow_path(&config.image, "image_edit.json"),
        outputs_for("image")?,
        sessions(config),
        PathBuf::from("assets/default_face.png"),
    );
    let gateway = match config.image.timeout_secs {
        Some(secs) => gateway.with_deadline(Duration::from_secs(secs)),
        None => gateway,
    };
    let gateway = Arc::new(gateway);
    gateway.rehydrate_face().await;
    Ok(reel_gateway::image::router(gateway))
}

fn video_router(config: &Config) -> anyhow::Result<axum::Router> {
    let comfy = reel_comfy::ComfyClient::new(&config.video.base_url);
    let gateway = VideoGateway::new(
        comfy,
        workflow_path(&config.video, "i2v.json"),
        outputs_for("video")?,
        sessions(config),
    );
    let gateway = match config.video.timeout_secs {
        Some(secs) => gateway.with_deadline(Duration::from_secs(secs)),
        None => gateway,
    };
    Ok(reel_gateway::video::router(Arc::new(gateway)))
}

fn lipsync_router(config: &Config) -> anyhow::Result<axum::Router> {
    let comfy = reel_comfy::ComfyClient::new(&config.lipsync.base_url);
    let gateway = LipsyncGateway::new(
        comfy,
        workflow_path(&config.lipsync, "lipsync.json"),
        outputs_for("lipsync")?,
        sessions(config),
    );
    let gateway = match config.lipsync.timeout_secs {
        Some(secs) => gateway.with_deadline(Duration::from_secs(secs)),
        None => gateway,
    };
    Ok(reel_gateway::lipsync::router(Arc::new(gateway)))
}

fn audio_router(config: &Config) -> anyhow::Result<axum::Router> {
    let tts = match (&config.tts.api_key, &config.tts.voice_id) {
        (Some(key), Some(voice)) => Some(TtsClient::new(
            key.clone(),
            voice.clone(),
            config.tts.model_id.clone(),
        )),
        _ => None,
    };
    let ambient_workflow = config
        .ambient
        .workflow_path
        .clone()
        .or_else(|| Some(PathBuf::from("workflows/ambient.json")));
    let comfy = Some(reel_comfy::ComfyClient::new(&config.ambient.base_url));

    let gateway = AudioGateway::new(
        tts,
        comfy,
        ambient_workflow,
        outputs_for("audio")?,
        sessions(config),
    );
    Ok(reel_gateway::audio::router(Arc::new(gateway)))
}

fn merge_router(config: &Config) -> anyhow::Result<axum::Router> {
    let gateway = MergeGateway::new(
        outputs_for("merge")?,
        OutputDir::new("temp").context("creating temp")?,
        sessions(config),
    );
    Ok(reel_gateway::merge::router(Arc::new(gateway)))
}

// ── Serving and retention ─────────────────────────────────────────────────────

async fn serve(router: axum::Router, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr, "gateway listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Serve one gateway with its retention sweepers: local outputs on the
/// file TTL, the shared session tree on the session TTL.
async fn serve_with_sweepers(
    config: &Config,
    router: axum::Router,
    addr: &str,
    gateway: &str,
) -> anyhow::Result<()> {
    spawn_sweepers(config, gateway);
    serve(router, addr).await
}

fn spawn_sweepers(config: &Config, gateway: &str) {
    spawn_file_sweeper(config, gateway);
    spawn_session_sweeper(config);
}

fn spawn_file_sweeper(config: &Config, gateway: &str) {
    // The audio gateway keeps rendered speech around longer; its files are
    // re-read by lip-sync and merge well after the first request.
    let file_hours = if gateway == "audio" {
        config.retention.file_max_age_hours.max(2)
    } else {
        config.retention.file_max_age_hours
    };
    let file_policy =
        RetentionPolicy::from_hours(file_hours, config.retention.sweep_interval_secs);
    tokio::spawn(sweep_files(
        PathBuf::from("outputs").join(gateway),
        file_policy,
    ));
}

fn spawn_session_sweeper(config: &Config) {
    let session_policy = RetentionPolicy::from_hours(
        config.session.max_age_hours,
        config.session.sweep_interval_secs,
    );
    tokio::spawn(sweep_directories(
        config.session.root.clone(),
        session_policy,
    ));
}

/// Single-host deployment: every gateway in one process, each on its own
/// port, sharing one session store and one set of sweepers.
async fn serve_all(config: &Config) -> anyhow::Result<()> {
    spawn_session_sweeper(config);
    for gateway in ["image", "video", "lipsync", "audio", "merge"] {
        spawn_file_sweeper(config, gateway);
    }

    let image = image_router(config).await?;

    tokio::try_join!(
        serve(scenario_router(config), &config.http.scenario),
        serve(image, &config.http.image),
        serve(video_router(config)?, &config.http.video),
        serve(lipsync_router(config)?, &config.http.lipsync),
        serve(audio_router(config)?, &config.http.audio),
        serve(merge_router(config)?, &config.http.merge),
    )?;
    Ok(())
}
