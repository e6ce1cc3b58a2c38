// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    /// Fewer inputs than the operation can work with.
    #[error("{0}")]
    BadInput(String),

    /// The encoder exited nonzero.  `stderr` is the tail of its output —
    /// enough to diagnose codec problems without server logs.
    #[error("encoder failed: {stderr}")]
    Encoder { stderr: String },

    /// The subprocess outlived its wall-clock budget and was killed.
    #[error("encoder timed out after {0} seconds")]
    Timeout(u64),

    #[error("could not probe duration of {0}")]
    Probe(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
