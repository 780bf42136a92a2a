// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Store error taxonomy.
//!
//! Four failure families, deliberately distinguishable:
//! not-found (the resource is absent from the replica), external-call
//! failures (surfaced unchanged from the registry client), invariant
//! violations (fatal data errors, never defaulted over), and
//! wait failures (timeout/cancellation, distinct from a rejected write).
//! Decode failures never appear here -- they are recovered locally by
//! skipping the record.

use std::time::Duration;

use thiserror::Error;

use crate::client::ClientError;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Subject has no versions in the replica.
    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    /// Subject exists but the requested version does not.
    #[error("version {version} not found for subject {subject}")]
    VersionNotFound { subject: String, version: u32 },

    /// The registry write/read API call failed. `ClientError::NotFound`
    /// stays observable through this wrapper.
    #[error("registry client: {0}")]
    Client(#[from] ClientError),

    /// Neither a subject-level nor a global config/mode entry exists. The
    /// store cannot operate without a known baseline, so this is never
    /// silently defaulted.
    #[error("no effective {what} for subject {subject:?}: no subject entry and no global baseline")]
    MissingBaseline {
        what: &'static str,
        subject: Option<String>,
    },

    /// A write was accepted by the registry but its record was not observed
    /// locally within the operation timeout.
    #[error("write not observed in the local replica within {0:?}")]
    WaitTimeout(Duration),

    /// The wait was abandoned because the store is shutting down.
    #[error("wait cancelled by store shutdown")]
    Cancelled,

    /// Operation requires a running store.
    #[error("store is not running")]
    NotRunning,

    /// `start()` called on a store that is already starting or running.
    #[error("store is already started")]
    AlreadyStarted,

    /// Startup could not establish the global baseline or replay the log.
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    /// The log-tailing primitive failed to start or deliver.
    #[error("log tailer: {0}")]
    Tailer(String),
}

impl StoreError {
    /// True for the not-found family, including a client-side not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::SubjectNotFound(_)
                | StoreError::VersionNotFound { .. }
                | StoreError::Client(ClientError::NotFound(_))
        )
    }
}
