// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write coordination: per-resource wait handles.
//!
//! A writer that has pushed a mutation through the registry's write API
//! registers interest in the resource it expects to see come back through
//! the log, then blocks on the handle. The single apply thread signals the
//! exact `(key, kind)` when the corresponding transition is observed, and
//! one signal releases every waiter sharing the cell.
//!
//! ```text
//! writer thread                 apply thread (log delivery)
//! register(key, kind) ---.
//! <external write>       |
//! handle.wait(timeout) --+--->  apply(record) observes transition
//!        ^                      signal(key, kind)
//!        '----------------------------'
//! ```
//!
//! Cancellation is a first-class outcome: `cancel_all()` (store shutdown)
//! wakes every waiter with a failure distinct from a timeout, and both are
//! distinct from "write rejected".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Keys and kinds
// ---------------------------------------------------------------------------

/// Logical resource a waiter can block on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WaitKey {
    /// The global config/mode scope.
    Global,
    /// Subject-level resource (subject delete, subject config/mode).
    Subject(String),
    /// One schema version.
    SchemaVersion(String, u32),
}

impl WaitKey {
    pub fn subject(subject: impl Into<String>) -> Self {
        WaitKey::Subject(subject.into())
    }

    pub fn schema(subject: impl Into<String>, version: u32) -> Self {
        WaitKey::SchemaVersion(subject.into(), version)
    }

    /// Key for a config/mode scope (`None` = global).
    pub fn scope(subject: Option<&str>) -> Self {
        match subject {
            Some(s) => WaitKey::Subject(s.to_string()),
            None => WaitKey::Global,
        }
    }
}

/// The transition a waiter is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitKind {
    /// Schema key went absent -> present.
    Register,
    /// Schema went not-deleted -> deleted (or a subject-level delete flipped
    /// at least one version).
    Delete,
    /// A config/mode value actually changed.
    Update,
}

/// Failure modes of [`WaitHandle::wait`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    /// No matching signal arrived within the timeout.
    #[error("wait timed out")]
    Timeout,
    /// The registry was torn down while waiting.
    #[error("wait cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Wait cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellState {
    Pending,
    Signalled,
    Cancelled,
}

struct WaitCell {
    state: Mutex<CellState>,
    cond: Condvar,
}

impl WaitCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Pending),
            cond: Condvar::new(),
        }
    }

    fn finish(&self, state: CellState) {
        let mut guard = self.state.lock();
        if *guard == CellState::Pending {
            *guard = state;
            self.cond.notify_all();
        }
    }
}

struct CellEntry {
    cell: Arc<WaitCell>,
    handles: usize,
}

struct WaitInner {
    cells: Mutex<HashMap<(WaitKey, WaitKind), CellEntry>>,
}

impl WaitInner {
    /// Drop accounting for one handle; retires the cell when the last
    /// unsignalled handle goes away.
    fn release(&self, key: &WaitKey, kind: WaitKind, cell: &Arc<WaitCell>) {
        let mut cells = self.cells.lock();
        if let Some(entry) = cells.get_mut(&(key.clone(), kind)) {
            // The map entry may already belong to a newer generation if this
            // cell was signalled and a fresh wait registered afterwards.
            if Arc::ptr_eq(&entry.cell, cell) {
                entry.handles -= 1;
                if entry.handles == 0 {
                    cells.remove(&(key.clone(), kind));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WaitRegistry
// ---------------------------------------------------------------------------

/// Registry of outstanding waits, keyed by `(WaitKey, WaitKind)`.
///
/// Concurrent registrations for the same key/kind share one cell, so one
/// signal releases all of them. A cell whose last handle is dropped without
/// a signal is retired.
pub struct WaitRegistry {
    inner: Arc<WaitInner>,
}

impl WaitRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(WaitInner {
                cells: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register interest in `(key, kind)` and return a blocking handle.
    pub fn register(&self, key: WaitKey, kind: WaitKind) -> WaitHandle {
        let mut cells = self.inner.cells.lock();
        let entry = cells
            .entry((key.clone(), kind))
            .or_insert_with(|| CellEntry {
                cell: Arc::new(WaitCell::new()),
                handles: 0,
            });
        entry.handles += 1;
        WaitHandle {
            inner: Arc::clone(&self.inner),
            key,
            kind,
            cell: Arc::clone(&entry.cell),
        }
    }

    /// Release every waiter currently registered for `(key, kind)`.
    ///
    /// Called only from the apply path, once per transition actually
    /// observed. A signal with no registered waiter is a no-op.
    pub fn signal(&self, key: &WaitKey, kind: WaitKind) {
        let entry = {
            let mut cells = self.inner.cells.lock();
            cells.remove(&(key.clone(), kind))
        };
        if let Some(entry) = entry {
            log::debug!("[waiters] signal {:?}/{:?}", key, kind);
            entry.cell.finish(CellState::Signalled);
        }
    }

    /// Wake every outstanding waiter with [`WaitError::Cancelled`].
    pub fn cancel_all(&self) {
        let drained: Vec<CellEntry> = {
            let mut cells = self.inner.cells.lock();
            cells.drain().map(|(_, entry)| entry).collect()
        };
        if !drained.is_empty() {
            log::debug!("[waiters] cancelling {} outstanding wait(s)", drained.len());
        }
        for entry in drained {
            entry.cell.finish(CellState::Cancelled);
        }
    }

    /// Number of distinct `(key, kind)` cells with live waiters.
    pub fn pending(&self) -> usize {
        self.inner.cells.lock().len()
    }
}

impl Default for WaitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// WaitHandle
// ---------------------------------------------------------------------------

/// One registered waiter. Blocks on [`wait`](Self::wait); dropping the
/// handle releases the registration.
pub struct WaitHandle {
    inner: Arc<WaitInner>,
    key: WaitKey,
    kind: WaitKind,
    cell: Arc<WaitCell>,
}

impl WaitHandle {
    /// Block the calling thread until the matching signal arrives.
    ///
    /// `timeout = None` waits indefinitely. Timeout and cancellation are
    /// surfaced as distinct errors and never swallowed.
    pub fn wait(self, timeout: Option<Duration>) -> Result<(), WaitError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.cell.state.lock();
        loop {
            match *state {
                CellState::Signalled => return Ok(()),
                CellState::Cancelled => return Err(WaitError::Cancelled),
                CellState::Pending => {}
            }
            match deadline {
                None => self.cell.cond.wait(&mut state),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(WaitError::Timeout);
                    }
                    let result = self.cell.cond.wait_until(&mut state, deadline);
                    if result.timed_out() && *state == CellState::Pending {
                        return Err(WaitError::Timeout);
                    }
                }
            }
        }
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        self.inner.release(&self.key, self.kind, &self.cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn signal_releases_waiter() {
        let registry = Arc::new(WaitRegistry::new());
        let handle = registry.register(WaitKey::schema("orders", 1), WaitKind::Register);

        let signaller = Arc::clone(&registry);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.signal(&WaitKey::schema("orders", 1), WaitKind::Register);
        });

        assert_eq!(handle.wait(Some(Duration::from_secs(2))), Ok(()));
        t.join().unwrap();
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn one_signal_releases_all_waiters() {
        let registry = Arc::new(WaitRegistry::new());
        let mut joins = Vec::new();
        for _ in 0..4 {
            let handle = registry.register(WaitKey::subject("orders"), WaitKind::Delete);
            joins.push(thread::spawn(move || {
                handle.wait(Some(Duration::from_secs(2)))
            }));
        }

        thread::sleep(Duration::from_millis(20));
        registry.signal(&WaitKey::subject("orders"), WaitKind::Delete);

        for join in joins {
            assert_eq!(join.join().unwrap(), Ok(()));
        }
    }

    #[test]
    fn timeout_is_distinct_from_cancellation() {
        let registry = Arc::new(WaitRegistry::new());

        let handle = registry.register(WaitKey::Global, WaitKind::Update);
        assert_eq!(
            handle.wait(Some(Duration::from_millis(30))),
            Err(WaitError::Timeout)
        );

        let handle = registry.register(WaitKey::Global, WaitKind::Update);
        let canceller = Arc::clone(&registry);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel_all();
        });
        assert_eq!(
            handle.wait(Some(Duration::from_secs(2))),
            Err(WaitError::Cancelled)
        );
        t.join().unwrap();
    }

    #[test]
    fn signal_only_matches_exact_key_and_kind() {
        let registry = Arc::new(WaitRegistry::new());
        let handle = registry.register(WaitKey::schema("orders", 1), WaitKind::Register);

        // Same key, different kind; different key, same kind.
        registry.signal(&WaitKey::schema("orders", 1), WaitKind::Delete);
        registry.signal(&WaitKey::schema("orders", 2), WaitKind::Register);

        assert_eq!(
            handle.wait(Some(Duration::from_millis(30))),
            Err(WaitError::Timeout)
        );
    }

    #[test]
    fn dropping_last_handle_retires_cell() {
        let registry = WaitRegistry::new();
        let a = registry.register(WaitKey::subject("s"), WaitKind::Delete);
        let b = registry.register(WaitKey::subject("s"), WaitKind::Delete);
        assert_eq!(registry.pending(), 1);
        drop(a);
        assert_eq!(registry.pending(), 1);
        drop(b);
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn signal_before_wait_is_not_lost() {
        let registry = WaitRegistry::new();
        let handle = registry.register(WaitKey::schema("s", 1), WaitKind::Register);
        registry.signal(&WaitKey::schema("s", 1), WaitKind::Register);
        // The cell is already resolved; wait returns immediately.
        assert_eq!(handle.wait(Some(Duration::from_millis(1))), Ok(()));
    }

    #[test]
    fn stale_drop_does_not_retire_new_generation() {
        let registry = WaitRegistry::new();
        let old = registry.register(WaitKey::subject("s"), WaitKind::Update);
        registry.signal(&WaitKey::subject("s"), WaitKind::Update);
        let fresh = registry.register(WaitKey::subject("s"), WaitKind::Update);
        drop(old); // belonged to the signalled generation
        assert_eq!(registry.pending(), 1);
        drop(fresh);
        assert_eq!(registry.pending(), 0);
    }
}
