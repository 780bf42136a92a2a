// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Catalog store façade and lifecycle.
//!
//! # Architecture
//!
//! ```text
//! CatalogStore
//! +-- RegistryClient        (external write/read API)
//! +-- LogTailer             (bootstrap replay + background delivery)
//! +-- RwLock<ReplicaState>  (single writer: the delivery thread)
//! +-- WaitRegistry          (write -> wait -> signal coordination)
//! +-- ListenerSet           (batched updated/deleted fan-out)
//! ```
//!
//! Every mutating operation follows one pattern: push the write through the
//! registry API, then block on a wait handle until the corresponding record
//! is observed coming back through the log -- unless the replica already
//! shows the effect. A successful call therefore always returns state the
//! local replica has caught up to; it never returns a result that might not
//! yet be visible to a follow-up read.
//!
//! Readers never wait. They take the shared read lock per query, and since
//! the delivery thread applies each batch atomically under the write lock,
//! a reader always sees a prefix of log history, never a partial batch.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::client::RegistryClient;
use crate::config::Config;
use crate::decode::DecodedRecord;
use crate::entity::{SchemaEntity, StoreStats};
use crate::error::StoreError;
use crate::listener::{CatalogListener, ListenerSet};
use crate::record::{CompatibilityLevel, RegistryMode};
use crate::replica::{ApplyOutcome, ReplicaState};
use crate::tailer::{BatchConsumer, LogTailer};
use crate::waiters::{WaitError, WaitHandle, WaitKey, WaitKind, WaitRegistry};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreState {
    Stopped,
    Starting,
    Running,
}

// ---------------------------------------------------------------------------
// StoreInner
// ---------------------------------------------------------------------------

struct StoreInner {
    config: Config,
    client: Arc<dyn RegistryClient>,
    replica: RwLock<ReplicaState>,
    waiters: WaitRegistry,
    listeners: ListenerSet,
    state: Mutex<StoreState>,
}

impl BatchConsumer for StoreInner {
    /// The single mutation path. Applies the whole batch under the write
    /// lock, then signals matching waiters and fans out notifications.
    fn on_batch(&self, batch: &[DecodedRecord]) {
        if batch.is_empty() {
            return;
        }
        let mut outcome = ApplyOutcome::default();
        let (updated, deleted) = {
            let mut replica = self.replica.write();
            for record in batch {
                outcome.merge(replica.apply(&record.key, record.value.as_ref()));
            }
            // Entities are derived while the write lock is still held so the
            // notification reflects exactly this batch's state.
            let mut updated = Vec::new();
            let mut deleted = Vec::new();
            for key in &outcome.affected {
                match replica.classify(key) {
                    Ok(entity) => updated.push(entity),
                    Err(key) => deleted.push(key),
                }
            }
            (updated, deleted)
        };

        // Signals fire after the lock is released: a woken writer's next
        // read sees the fully applied batch without contending for it.
        for (key, kind) in &outcome.signals {
            self.waiters.signal(key, *kind);
        }
        self.listeners.notify(&updated, &deleted);
    }
}

// ---------------------------------------------------------------------------
// CatalogStore
// ---------------------------------------------------------------------------

/// Log-derived consistent store of schema-registry state.
pub struct CatalogStore {
    inner: Arc<StoreInner>,
    tailer: Mutex<Box<dyn LogTailer>>,
}

impl CatalogStore {
    pub fn new(config: Config, client: Arc<dyn RegistryClient>, tailer: Box<dyn LogTailer>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                client,
                replica: RwLock::new(ReplicaState::new()),
                waiters: WaitRegistry::new(),
                listeners: ListenerSet::new(),
                state: Mutex::new(StoreState::Stopped),
            }),
            tailer: Mutex::new(tailer),
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Bring the store up: establish the global baseline, then replay the
    /// full log before returning. After `start()` returns, the replica
    /// reflects all history up to that point.
    pub fn start(&self) -> Result<(), StoreError> {
        {
            let mut state = self.inner.state.lock();
            if *state != StoreState::Stopped {
                return Err(StoreError::AlreadyStarted);
            }
            *state = StoreState::Starting;
        }

        let result = self.start_inner();
        let mut state = self.inner.state.lock();
        match result {
            Ok(()) if *state == StoreState::Starting => {
                *state = StoreState::Running;
                log::debug!("[store] running");
                Ok(())
            }
            Ok(()) => {
                // stop() raced the bootstrap; leave the store stopped.
                drop(state);
                self.tailer.lock().close();
                Err(StoreError::Cancelled)
            }
            Err(e) => {
                *state = StoreState::Stopped;
                Err(e)
            }
        }
    }

    fn start_inner(&self) -> Result<(), StoreError> {
        let retry = self.inner.config.startup_retry;
        let client = &self.inner.client;

        // The store cannot operate without a known global baseline, so a
        // permanently failing read here is fatal.
        let level = retry
            .run("global compatibility read", || client.global_compatibility())
            .map_err(|e| StoreError::Bootstrap(format!("global compatibility: {e}")))?;
        let mode = retry
            .run("global mode read", || client.global_mode())
            .map_err(|e| StoreError::Bootstrap(format!("global mode: {e}")))?;
        self.inner.replica.write().seed_global(level, mode);
        log::debug!("[store] global baseline: {} / {}", level, mode);

        let consumer: Arc<dyn BatchConsumer> = Arc::clone(&self.inner) as Arc<dyn BatchConsumer>;
        self.tailer.lock().start(consumer)
    }

    /// Tear the store down. Idempotent; safe to call when not running.
    /// Outstanding waiters are released with [`StoreError::Cancelled`].
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == StoreState::Stopped {
                return;
            }
            *state = StoreState::Stopped;
        }
        self.tailer.lock().close();
        self.inner.waiters.cancel_all();
        log::debug!("[store] stopped");
    }

    fn ensure_running(&self) -> Result<(), StoreError> {
        if *self.inner.state.lock() == StoreState::Running {
            Ok(())
        } else {
            Err(StoreError::NotRunning)
        }
    }

    /// Register a listener for batched change notifications.
    pub fn register_listener(&self, listener: Arc<dyn CatalogListener>) {
        self.inner.listeners.register(listener);
    }

    // -- mutating operations ------------------------------------------------

    /// Register a schema under a subject and return its entity once the
    /// write is visible in the local replica.
    pub fn register_schema(&self, subject: &str, schema: &str) -> Result<SchemaEntity, StoreError> {
        self.ensure_running()?;
        let id = self.inner.client.register_schema(subject, schema)?;
        let version = self.inner.client.lookup_version(subject, schema)?;
        log::debug!(
            "[store] registered {}/{} (id {}), awaiting local visibility",
            subject,
            version,
            id
        );

        if let Some(entity) = self.visible_schema(subject, version) {
            return Ok(entity);
        }
        let handle = self
            .inner
            .waiters
            .register(WaitKey::schema(subject, version), WaitKind::Register);
        // The record may have been applied between the first check and the
        // wait registration; re-check so the signal cannot be missed.
        if let Some(entity) = self.visible_schema(subject, version) {
            return Ok(entity);
        }
        self.await_handle(handle)?;
        self.get_schema(subject, Some(version))
    }

    /// Soft-delete every live version of a subject; returns the deleted
    /// version numbers once the delete is visible in the local replica.
    pub fn delete_subject(&self, subject: &str) -> Result<Vec<u32>, StoreError> {
        self.ensure_running()?;
        let handle = self
            .inner
            .waiters
            .register(WaitKey::subject(subject), WaitKind::Delete);
        let deleted = self.inner.client.delete_subject(subject)?;
        if deleted.is_empty() || self.all_locally_deleted(subject, &deleted) {
            return Ok(deleted);
        }
        self.await_handle(handle)?;
        Ok(deleted)
    }

    /// Soft-delete one version of a subject; returns the version once the
    /// delete is visible in the local replica.
    pub fn delete_schema_version(&self, subject: &str, version: u32) -> Result<u32, StoreError> {
        self.ensure_running()?;
        let handle = self
            .inner
            .waiters
            .register(WaitKey::schema(subject, version), WaitKind::Delete);
        self.inner.client.delete_schema_version(subject, version)?;
        if self.locally_deleted(subject, version) {
            return Ok(version);
        }
        self.await_handle(handle)?;
        Ok(version)
    }

    /// Set the compatibility level for a subject (or globally with
    /// `subject = None`); returns the level now in force for that scope.
    pub fn update_compatibility(
        &self,
        subject: Option<&str>,
        level: CompatibilityLevel,
    ) -> Result<CompatibilityLevel, StoreError> {
        self.ensure_running()?;
        let handle = self
            .inner
            .waiters
            .register(WaitKey::scope(subject), WaitKind::Update);
        self.inner.client.update_compatibility(subject, level)?;
        // An unchanged value is a replay no-op and will never signal.
        if self.inner.replica.read().stored_compatibility(subject) == Some(level) {
            return self.scope_compatibility(subject);
        }
        self.await_handle(handle)?;
        self.scope_compatibility(subject)
    }

    /// Whether `schema` would be accepted as the next version of `subject`.
    /// Never waits: the check runs against current state.
    pub fn test_schema_compatible(&self, subject: &str, schema: &str) -> Result<bool, StoreError> {
        self.ensure_running()?;
        if !self.inner.replica.read().subject_exists(subject) {
            return Err(StoreError::SubjectNotFound(subject.to_string()));
        }
        Ok(self.inner.client.check_compatibility(subject, schema)?)
    }

    // -- read accessors (never wait) ----------------------------------------

    /// All subjects with at least one version, sorted.
    pub fn subjects(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_running()?;
        Ok(self.inner.replica.read().subjects())
    }

    /// All schema entities, optionally restricted to one subject.
    pub fn schemas(&self, subject: Option<&str>) -> Result<Vec<SchemaEntity>, StoreError> {
        self.ensure_running()?;
        Ok(self.inner.replica.read().schemas(subject))
    }

    /// One schema version; the latest one when `version` is `None`.
    pub fn get_schema(
        &self,
        subject: &str,
        version: Option<u32>,
    ) -> Result<SchemaEntity, StoreError> {
        self.ensure_running()?;
        self.inner.replica.read().get(subject, version)
    }

    /// Version numbers known for a subject, ascending.
    pub fn versions(&self, subject: &str) -> Result<Vec<u32>, StoreError> {
        self.ensure_running()?;
        self.inner.replica.read().versions(subject)
    }

    /// Compatibility level in force for a subject (own entry or global).
    pub fn effective_compatibility(
        &self,
        subject: &str,
    ) -> Result<CompatibilityLevel, StoreError> {
        self.ensure_running()?;
        self.inner.replica.read().effective_compatibility(subject)
    }

    /// Mode in force for a subject (own entry or global).
    pub fn effective_mode(&self, subject: &str) -> Result<RegistryMode, StoreError> {
        self.ensure_running()?;
        self.inner.replica.read().effective_mode(subject)
    }

    pub fn subject_exists(&self, subject: &str) -> Result<bool, StoreError> {
        self.ensure_running()?;
        Ok(self.inner.replica.read().subject_exists(subject))
    }

    pub fn schema_exists(&self, subject: &str, version: u32) -> Result<bool, StoreError> {
        self.ensure_running()?;
        Ok(self.inner.replica.read().schema_exists(subject, version))
    }

    /// Replica counters. Available in every lifecycle state.
    pub fn stats(&self) -> StoreStats {
        self.inner.replica.read().stats()
    }

    // -- helpers ------------------------------------------------------------

    fn await_handle(&self, handle: WaitHandle) -> Result<(), StoreError> {
        let timeout = self.inner.config.operation_timeout();
        handle.wait(Some(timeout)).map_err(|e| match e {
            WaitError::Timeout => StoreError::WaitTimeout(timeout),
            WaitError::Cancelled => StoreError::Cancelled,
        })
    }

    fn visible_schema(&self, subject: &str, version: u32) -> Option<SchemaEntity> {
        self.inner.replica.read().get(subject, Some(version)).ok()
    }

    fn locally_deleted(&self, subject: &str, version: u32) -> bool {
        match self.inner.replica.read().get(subject, Some(version)) {
            Ok(entity) => entity.deleted,
            // Wholly absent counts as reflected: there is nothing left to
            // flip, and no record will come.
            Err(_) => true,
        }
    }

    fn all_locally_deleted(&self, subject: &str, versions: &[u32]) -> bool {
        let replica = self.inner.replica.read();
        versions.iter().all(|v| match replica.get(subject, Some(*v)) {
            Ok(entity) => entity.deleted,
            Err(_) => true,
        })
    }

    fn scope_compatibility(
        &self,
        subject: Option<&str>,
    ) -> Result<CompatibilityLevel, StoreError> {
        let replica = self.inner.replica.read();
        match subject {
            Some(s) => replica.effective_compatibility(s),
            None => replica
                .stored_compatibility(None)
                .ok_or(StoreError::MissingBaseline {
                    what: "compatibility",
                    subject: None,
                }),
        }
    }
}

impl Drop for CatalogStore {
    fn drop(&mut self) {
        self.stop();
    }
}
