// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session workspace — the shared-filesystem handoff between gateways.
//!
//! A session is a client-chosen string token whose only materialization is
//! a directory `sessions/<session_id>/` on a volume every gateway mounts.
//! Gateways exchange artifacts by writing and reading files under that
//! directory by name; there is no broker and no database.  Creation is
//! lazy (first write materializes the directory) and cleanup is a periodic
//! sweeper that removes sessions whose mtime exceeds the retention TTL.

mod store;
mod sweeper;

pub use store::{FileInfo, SessionError, SessionListing, SessionStore, StoredFile};
pub use sweeper::{sweep_directories, sweep_files, RetentionPolicy};
