// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Externally visible entities derived from replica state.

use std::fmt;

use serde::Serialize;

use crate::record::SchemaValue;

// ---------------------------------------------------------------------------
// SchemaKey
// ---------------------------------------------------------------------------

/// Identity of one schema version, independent of its payload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SchemaKey {
    pub subject: String,
    pub version: u32,
}

impl SchemaKey {
    pub fn new(subject: impl Into<String>, version: u32) -> Self {
        Self {
            subject: subject.into(),
            version,
        }
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.version)
    }
}

// ---------------------------------------------------------------------------
// SchemaEntity
// ---------------------------------------------------------------------------

/// One schema version as exposed to callers and listeners.
///
/// `latest` is derived at read time from the subject's version map -- it is
/// never stored, so it can never go stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaEntity {
    /// Subject this version belongs to.
    pub subject: String,
    /// Version number assigned by the registry.
    pub version: u32,
    /// Globally unique schema id.
    pub id: u32,
    /// Raw schema text.
    pub schema: String,
    /// Soft-delete flag; deleted versions remain queryable.
    pub deleted: bool,
    /// True iff this version is the maximum version currently known for the
    /// subject.
    pub latest: bool,
    /// Registration time, Unix milliseconds.
    pub created_at: Option<i64>,
    /// Soft-delete time, Unix milliseconds.
    pub deleted_at: Option<i64>,
}

impl SchemaEntity {
    /// Build an entity from a stored value plus the derived latest flag.
    pub(crate) fn from_value(value: &SchemaValue, latest: bool) -> Self {
        Self {
            subject: value.subject.clone(),
            version: value.version,
            id: value.id,
            schema: value.schema.clone(),
            deleted: value.deleted,
            latest,
            created_at: value.created_at,
            deleted_at: value.deleted_at,
        }
    }

    /// Identity of this entity.
    pub fn key(&self) -> SchemaKey {
        SchemaKey::new(self.subject.clone(), self.version)
    }
}

// ---------------------------------------------------------------------------
// StoreStats
// ---------------------------------------------------------------------------

/// Replica counters for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Subjects with at least one version in the replica.
    pub subjects: usize,
    /// Total schema versions held, soft-deleted included.
    pub schemas: usize,
    /// Schema versions not soft-deleted.
    pub live_schemas: usize,
    /// Subjects with an outstanding delete watermark.
    pub delete_markers: usize,
}
