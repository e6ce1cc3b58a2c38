// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "reel",
    about = "Distributed multimodal ad-video generation pipeline",
    version
)]
pub struct Cli {
    /// Explicit config file (merged over the discovered layers).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr at debug level (RUST_LOG still wins when set).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the scenario gateway (scenario → timetable, SSE).
    Scenario,
    /// Run the image gateway (text-to-image + edit).
    Image,
    /// Run the video gateway (image-to-video, projects).
    Video,
    /// Run the lip-sync gateway.
    Lipsync,
    /// Run the audio gateway (TTS + ambient).
    Audio,
    /// Run the merge gateway (concat / overlay / mix).
    Merge,
    /// Run every gateway in one process (single-host deployments).
    All,
    /// Print the effective merged configuration and exit.
    ShowConfig,
}
