// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Listener traits for catalog change notifications.
//!
//! After each applied batch the store dispatches the affected schema
//! versions to every registered listener as two batched callbacks: entities
//! still live go to `on_schemas_updated`, soft-deleted or removed versions
//! go to `on_schemas_deleted` as bare keys (a downstream index drops the
//! document either way).
//!
//! # Thread Safety
//!
//! Listeners are called from the log-delivery thread. They must be
//! `Send + Sync` and should not block. A panicking listener is isolated and
//! logged; it never breaks delivery to the other listeners or the update
//! path itself.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::{SchemaEntity, SchemaKey};

/// Callback interface for catalog changes.
pub trait CatalogListener: Send + Sync {
    /// Live versions whose derived entity changed in the last batch.
    fn on_schemas_updated(&self, entities: &[SchemaEntity]);

    /// Versions that are now soft-deleted or gone entirely.
    fn on_schemas_deleted(&self, keys: &[SchemaKey]);
}

/// The store's set of registered listeners.
pub(crate) struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn CatalogListener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, listener: Arc<dyn CatalogListener>) {
        self.listeners.write().push(listener);
    }

    /// Fan out one batch. Each callback is isolated per listener.
    pub fn notify(&self, updated: &[SchemaEntity], deleted: &[SchemaKey]) {
        if updated.is_empty() && deleted.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for (index, listener) in listeners.iter().enumerate() {
            if !updated.is_empty() {
                let result = catch_unwind(AssertUnwindSafe(|| listener.on_schemas_updated(updated)));
                if result.is_err() {
                    log::error!("[listener] listener #{} panicked in on_schemas_updated", index);
                }
            }
            if !deleted.is_empty() {
                let result = catch_unwind(AssertUnwindSafe(|| listener.on_schemas_deleted(deleted)));
                if result.is_err() {
                    log::error!("[listener] listener #{} panicked in on_schemas_deleted", index);
                }
            }
        }
    }
}
