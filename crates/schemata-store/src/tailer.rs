// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log-tailing seam.
//!
//! The store does not own a Kafka consumer; it owns the *interface* one must
//! provide: a blocking bootstrap replay of the whole compacted topic,
//! followed by background delivery of decoded record batches to a single
//! consumer, and an idempotent close. Broker addresses, topic name and
//! timeouts come from [`Config`](crate::config::Config).
//!
//! [`LocalLogFeed`] is the in-process implementation shipped with the crate:
//! it backs the integration tests and embedded single-process deployments.
//! Records published before `start` form the bootstrap replay; records
//! published afterwards are delivered from a dedicated thread. Raw bytes go
//! through the real decoder, so the feed exercises the same defensive path a
//! broker-backed tailer would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;

use crate::decode::{decode_lossy, DecodedRecord};
use crate::error::StoreError;
use crate::record::{RecordKey, RecordValue};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One raw record as read off the log topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub key: Vec<u8>,
    /// Absent value = tombstone.
    pub value: Option<Vec<u8>>,
}

/// Receiver of decoded record batches. Implemented by the store; a batch is
/// applied atomically with respect to readers.
pub trait BatchConsumer: Send + Sync {
    fn on_batch(&self, batch: &[DecodedRecord]);
}

/// A log-tailing primitive.
pub trait LogTailer: Send {
    /// Replay the full topic into `consumer` before returning, then keep
    /// delivering new records in the background.
    fn start(&mut self, consumer: Arc<dyn BatchConsumer>) -> Result<(), StoreError>;

    /// Stop background delivery. Idempotent; safe to call when not running.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// LocalLogFeed
// ---------------------------------------------------------------------------

struct FeedState {
    /// Records published before the tailer started; replayed as bootstrap.
    pending: Vec<RawRecord>,
    /// Live delivery channel once the tailer is running.
    tx: Option<Sender<RawRecord>>,
}

struct FeedInner {
    state: Mutex<FeedState>,
}

/// Publisher half of the in-process log. Cheap to clone; all clones feed the
/// same log.
#[derive(Clone)]
pub struct LocalLogFeed {
    inner: Arc<FeedInner>,
}

impl LocalLogFeed {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FeedInner {
                state: Mutex::new(FeedState {
                    pending: Vec::new(),
                    tx: None,
                }),
            }),
        }
    }

    /// Tailer half for this feed. Hand it to the store.
    pub fn tailer(&self) -> LocalLogTailer {
        LocalLogTailer {
            inner: Arc::clone(&self.inner),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Append a typed record, serialized through the real wire format.
    pub fn publish(&self, key: &RecordKey, value: Option<&RecordValue>) {
        let raw_key = match serde_json::to_vec(key) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("[feed] failed to serialize record key: {}", e);
                return;
            }
        };
        let raw_value = match value.map(RecordValue::to_wire).transpose() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("[feed] failed to serialize record value: {}", e);
                return;
            }
        };
        self.publish_raw(RawRecord {
            key: raw_key,
            value: raw_value,
        });
    }

    /// Append raw bytes, exactly as a broker would hand them over.
    pub fn publish_raw(&self, record: RawRecord) {
        let mut state = self.inner.state.lock();
        let state = &mut *state;
        if let Some(tx) = &state.tx {
            // Receiver gone means the tailer closed mid-publish; the record
            // stays in the pending buffer for a restart.
            match tx.send(record) {
                Ok(()) => return,
                Err(e) => {
                    state.pending.push(e.into_inner());
                    state.tx = None;
                    return;
                }
            }
        }
        state.pending.push(record);
    }
}

impl Default for LocalLogFeed {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LocalLogTailer
// ---------------------------------------------------------------------------

/// Consumer half of the in-process log. See [`LocalLogFeed`].
pub struct LocalLogTailer {
    inner: Arc<FeedInner>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LogTailer for LocalLogTailer {
    fn start(&mut self, consumer: Arc<dyn BatchConsumer>) -> Result<(), StoreError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(StoreError::Tailer("tailer already started".to_string()));
        }

        let (tx, rx) = unbounded::<RawRecord>();
        let bootstrap: Vec<RawRecord> = {
            let mut state = self.inner.state.lock();
            state.tx = Some(tx);
            std::mem::take(&mut state.pending)
        };

        // Blocking bootstrap: the full backlog is decoded and applied as one
        // batch before control returns to the caller.
        let batch: Vec<DecodedRecord> = bootstrap.iter().filter_map(decode_lossy).collect();
        log::debug!(
            "[tailer] bootstrap replay: {} raw record(s), {} decoded",
            bootstrap.len(),
            batch.len()
        );
        if !batch.is_empty() {
            consumer.on_batch(&batch);
        }

        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);
        let handle = std::thread::Builder::new()
            .name("schemata-tailer".to_string())
            .spawn(move || {
                while let Ok(raw) = rx.recv() {
                    if let Some(record) = decode_lossy(&raw) {
                        consumer.on_batch(std::slice::from_ref(&record));
                    }
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| StoreError::Tailer(format!("failed to spawn delivery thread: {e}")))?;
        self.handle = Some(handle);
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the sender disconnects the channel; the delivery thread
        // drains what is already queued and exits.
        self.inner.state.lock().tx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[tailer] delivery thread panicked");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for LocalLogTailer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};

    struct Collector {
        batches: StdMutex<Vec<Vec<DecodedRecord>>>,
    }

    impl Collector {
        fn new() -> Self {
            Self {
                batches: StdMutex::new(Vec::new()),
            }
        }

        fn total(&self) -> usize {
            self.batches.lock().unwrap().iter().map(Vec::len).sum()
        }
    }

    impl BatchConsumer for Collector {
        fn on_batch(&self, batch: &[DecodedRecord]) {
            self.batches.lock().unwrap().push(batch.to_vec());
        }
    }

    fn noop_record() -> RawRecord {
        RawRecord {
            key: br#"{"keytype":"NOOP"}"#.to_vec(),
            value: None,
        }
    }

    fn wait_for(collector: &Collector, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while collector.total() < count {
            assert!(Instant::now() < deadline, "timed out waiting for delivery");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn prestart_records_arrive_as_one_bootstrap_batch() {
        let feed = LocalLogFeed::new();
        feed.publish_raw(noop_record());
        feed.publish_raw(noop_record());

        let collector = Arc::new(Collector::new());
        let mut tailer = feed.tailer();
        tailer.start(collector.clone()).unwrap();

        // Delivered synchronously, before start() returned.
        let batches = collector.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        drop(batches);
        tailer.close();
    }

    #[test]
    fn poststart_records_are_delivered_in_background() {
        let feed = LocalLogFeed::new();
        let collector = Arc::new(Collector::new());
        let mut tailer = feed.tailer();
        tailer.start(collector.clone()).unwrap();

        feed.publish_raw(noop_record());
        feed.publish_raw(noop_record());
        wait_for(&collector, 2);
        tailer.close();
    }

    #[test]
    fn undecodable_records_are_skipped_not_fatal() {
        let feed = LocalLogFeed::new();
        feed.publish_raw(RawRecord {
            key: b"not json".to_vec(),
            value: None,
        });
        feed.publish_raw(noop_record());

        let collector = Arc::new(Collector::new());
        let mut tailer = feed.tailer();
        tailer.start(collector.clone()).unwrap();

        assert_eq!(collector.total(), 1);
        tailer.close();
    }

    #[test]
    fn close_is_idempotent_and_records_buffer_for_restart() {
        let feed = LocalLogFeed::new();
        let collector = Arc::new(Collector::new());
        let mut tailer = feed.tailer();
        tailer.start(collector.clone()).unwrap();
        tailer.close();
        tailer.close();

        feed.publish_raw(noop_record());
        let mut tailer = feed.tailer();
        tailer.start(collector.clone()).unwrap();
        assert_eq!(collector.total(), 1);
        tailer.close();
    }

    #[test]
    fn double_start_is_rejected() {
        let feed = LocalLogFeed::new();
        let collector = Arc::new(Collector::new());
        let mut tailer = feed.tailer();
        tailer.start(collector.clone()).unwrap();
        assert!(matches!(
            tailer.start(collector),
            Err(StoreError::Tailer(_))
        ));
        tailer.close();
    }
}
