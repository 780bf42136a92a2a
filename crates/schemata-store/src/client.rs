// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry write/read API seam.
//!
//! All mutations go through the vendor registry; the store never writes the
//! log itself. The trait is the minimal surface the store needs, and every
//! call distinguishes "resource not found" from other failures so the
//! not-found taxonomy survives the wrapper.
//!
//! [`MockRegistryClient`] is the exported test double: it simulates the
//! vendor registry against a [`LocalLogFeed`], assigning ids/versions and
//! writing the same change-log records the real registry would, so the full
//! write -> log -> replica -> signal path is exercised without a broker.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use thiserror::Error;

use crate::record::{
    CompatibilityLevel, ConfigValue, DeleteSubjectValue, RecordKey, RecordValue, RegistryMode,
    SchemaValue,
};
use crate::tailer::LocalLogFeed;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the external registry API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The registry reports the resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The registry rejected the request (validation, mode, compatibility).
    #[error("rejected: {0}")]
    Rejected(String),
    /// The call itself failed (network, vendor outage).
    #[error("transport: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------------
// RegistryClient
// ---------------------------------------------------------------------------

/// The vendor registry's write/read API, as consumed by the store.
pub trait RegistryClient: Send + Sync {
    /// Register a schema under a subject; returns the assigned schema id.
    /// Registering an identical schema again returns the existing id.
    fn register_schema(&self, subject: &str, schema: &str) -> Result<u32, ClientError>;

    /// Version number under which `schema` is registered for `subject`.
    fn lookup_version(&self, subject: &str, schema: &str) -> Result<u32, ClientError>;

    /// Soft-delete every live version of a subject; returns the deleted
    /// version numbers.
    fn delete_subject(&self, subject: &str) -> Result<Vec<u32>, ClientError>;

    /// Soft-delete one version of a subject.
    fn delete_schema_version(&self, subject: &str, version: u32) -> Result<(), ClientError>;

    /// Set the compatibility level for a subject, or globally when `subject`
    /// is `None`.
    fn update_compatibility(
        &self,
        subject: Option<&str>,
        level: CompatibilityLevel,
    ) -> Result<(), ClientError>;

    /// Current global compatibility level.
    fn global_compatibility(&self) -> Result<CompatibilityLevel, ClientError>;

    /// Current global mode.
    fn global_mode(&self) -> Result<RegistryMode, ClientError>;

    /// Whether `schema` would be accepted as the next version of `subject`
    /// under its effective compatibility level.
    fn check_compatibility(&self, subject: &str, schema: &str) -> Result<bool, ClientError>;
}

// ---------------------------------------------------------------------------
// MockRegistryClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MockSchema {
    id: u32,
    schema: String,
    deleted: bool,
}

struct MockState {
    subjects: BTreeMap<String, BTreeMap<u32, MockSchema>>,
    global_compatibility: CompatibilityLevel,
    global_mode: RegistryMode,
    next_id: u32,
    compatible: bool,
    fail_next: u32,
}

/// In-process registry simulation writing to a [`LocalLogFeed`].
pub struct MockRegistryClient {
    feed: LocalLogFeed,
    state: Mutex<MockState>,
}

impl MockRegistryClient {
    pub fn new(feed: LocalLogFeed) -> Arc<Self> {
        Arc::new(Self {
            feed,
            state: Mutex::new(MockState {
                subjects: BTreeMap::new(),
                global_compatibility: CompatibilityLevel::Backward,
                global_mode: RegistryMode::ReadWrite,
                next_id: 1,
                compatible: true,
                fail_next: 0,
            }),
        })
    }

    /// Answer `check_compatibility` will give from now on.
    pub fn set_compatible(&self, compatible: bool) {
        self.state.lock().compatible = compatible;
    }

    /// Fail the next `n` calls with a transport error, then recover.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().fail_next = n;
    }

    fn check_outage(state: &mut MockState) -> Result<(), ClientError> {
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ClientError::Transport("injected outage".to_string()));
        }
        Ok(())
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

impl RegistryClient for MockRegistryClient {
    fn register_schema(&self, subject: &str, schema: &str) -> Result<u32, ClientError> {
        let mut state = self.state.lock();
        Self::check_outage(&mut state)?;

        let state = &mut *state;
        let versions = state.subjects.entry(subject.to_string()).or_default();
        if let Some(existing) = versions
            .values()
            .find(|s| !s.deleted && s.schema == schema)
        {
            return Ok(existing.id);
        }

        let version = versions.keys().next_back().map_or(1, |v| v + 1);
        let id = state.next_id;
        state.next_id += 1;
        versions.insert(
            version,
            MockSchema {
                id,
                schema: schema.to_string(),
                deleted: false,
            },
        );

        // Published while the state lock is held so records hit the log in
        // write order, the way a partitioned key does.
        self.feed.publish(
            &RecordKey::Schema {
                subject: subject.to_string(),
                version,
            },
            Some(&RecordValue::Schema(SchemaValue {
                subject: subject.to_string(),
                version,
                id,
                schema: schema.to_string(),
                deleted: false,
                created_at: Some(Self::now_millis()),
                deleted_at: None,
            })),
        );
        Ok(id)
    }

    fn lookup_version(&self, subject: &str, schema: &str) -> Result<u32, ClientError> {
        let mut state = self.state.lock();
        Self::check_outage(&mut state)?;
        state
            .subjects
            .get(subject)
            .and_then(|versions| {
                versions
                    .iter()
                    .find(|(_, s)| !s.deleted && s.schema == schema)
                    .map(|(version, _)| *version)
            })
            .ok_or_else(|| ClientError::NotFound(format!("schema under subject {subject:?}")))
    }

    fn delete_subject(&self, subject: &str) -> Result<Vec<u32>, ClientError> {
        let mut state = self.state.lock();
        Self::check_outage(&mut state)?;

        let versions = state
            .subjects
            .get_mut(subject)
            .ok_or_else(|| ClientError::NotFound(format!("subject {subject:?}")))?;
        let deleted: Vec<u32> = versions
            .iter()
            .filter(|(_, s)| !s.deleted)
            .map(|(v, _)| *v)
            .collect();
        if deleted.is_empty() {
            return Err(ClientError::NotFound(format!("subject {subject:?}")));
        }
        for version in &deleted {
            if let Some(entry) = versions.get_mut(version) {
                entry.deleted = true;
            }
        }
        let watermark = *deleted.iter().max().unwrap_or(&0);

        self.feed.publish(
            &RecordKey::DeleteSubject {
                subject: subject.to_string(),
            },
            Some(&RecordValue::DeleteSubject(DeleteSubjectValue {
                subject: subject.to_string(),
                version: watermark,
            })),
        );
        Ok(deleted)
    }

    fn delete_schema_version(&self, subject: &str, version: u32) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        Self::check_outage(&mut state)?;

        let entry = state
            .subjects
            .get_mut(subject)
            .and_then(|versions| versions.get_mut(&version))
            .filter(|s| !s.deleted)
            .ok_or_else(|| ClientError::NotFound(format!("{subject}/{version}")))?;
        entry.deleted = true;
        let record = SchemaValue {
            subject: subject.to_string(),
            version,
            id: entry.id,
            schema: entry.schema.clone(),
            deleted: true,
            created_at: None,
            deleted_at: Some(Self::now_millis()),
        };

        self.feed.publish(
            &RecordKey::Schema {
                subject: subject.to_string(),
                version,
            },
            Some(&RecordValue::Schema(record)),
        );
        Ok(())
    }

    fn update_compatibility(
        &self,
        subject: Option<&str>,
        level: CompatibilityLevel,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        Self::check_outage(&mut state)?;
        if subject.is_none() {
            state.global_compatibility = level;
        }

        self.feed.publish(
            &RecordKey::Config {
                subject: subject.map(str::to_string),
            },
            Some(&RecordValue::Config(ConfigValue {
                compatibility_level: level,
            })),
        );
        Ok(())
    }

    fn global_compatibility(&self) -> Result<CompatibilityLevel, ClientError> {
        let mut state = self.state.lock();
        Self::check_outage(&mut state)?;
        Ok(state.global_compatibility)
    }

    fn global_mode(&self) -> Result<RegistryMode, ClientError> {
        let mut state = self.state.lock();
        Self::check_outage(&mut state)?;
        Ok(state.global_mode)
    }

    fn check_compatibility(&self, _subject: &str, _schema: &str) -> Result<bool, ClientError> {
        let mut state = self.state.lock();
        Self::check_outage(&mut state)?;
        Ok(state.compatible)
    }
}
