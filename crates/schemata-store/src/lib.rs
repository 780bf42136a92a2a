// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schemata catalog store
//!
//! A log-derived consistent store for schema-registry state. The registry's
//! compacted change-log topic is the source of truth; this crate maintains a
//! queryable in-memory replica of it and gives writers read-after-write
//! consistency: a mutating call returns only once its own write has been
//! observed coming back through the log.
//!
//! # Architecture
//!
//! ```text
//! writer ----> RegistryClient (vendor write API)
//!   |                               |
//!   |  WaitRegistry                 v
//!   +--[ register/wait ]      change-log topic
//!            ^                      |
//!            |                 LogTailer (bootstrap replay + tail)
//!            |                      v
//!        [ signal ] <---- apply -- ReplicaState --> readers
//!                                   |
//!                                   +--> CatalogListener fan-out
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use schemata_store::{CatalogStore, Config, LocalLogFeed, MockRegistryClient, RegistryClient};
//!
//! # fn main() -> Result<(), schemata_store::StoreError> {
//! let feed = LocalLogFeed::new();
//! let client = MockRegistryClient::new(feed.clone());
//! let store = CatalogStore::new(
//!     Config::default(),
//!     client as Arc<dyn RegistryClient>,
//!     Box::new(feed.tailer()),
//! );
//! store.start()?;
//!
//! let entity = store.register_schema("orders", r#"{"type":"record"}"#)?;
//! assert!(entity.latest); // the write is already locally visible
//! store.stop();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod decode;
pub mod entity;
pub mod error;
pub mod listener;
pub mod record;
mod replica;
pub mod retry;
pub mod store;
pub mod tailer;
pub mod waiters;

pub use client::{ClientError, MockRegistryClient, RegistryClient};
pub use config::{Config, ConfigBuilder};
pub use decode::{decode_lossy, decode_record, DecodeError, DecodedRecord};
pub use entity::{SchemaEntity, SchemaKey, StoreStats};
pub use error::StoreError;
pub use listener::CatalogListener;
pub use record::{
    ClearSubjectValue, CompatibilityLevel, ConfigValue, DeleteSubjectValue, ModeValue, RecordKey,
    RecordValue, RegistryMode, SchemaValue,
};
pub use retry::RetryPolicy;
pub use store::CatalogStore;
pub use tailer::{BatchConsumer, LocalLogFeed, LocalLogTailer, LogTailer, RawRecord};
pub use waiters::{WaitError, WaitHandle, WaitKey, WaitKind, WaitRegistry};
