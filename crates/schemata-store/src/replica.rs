// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory replica of registry state.
//!
//! The replica is a materialized view over the change-log topic: per-subject
//! ordered version maps, scoped config/mode maps with a global fallback, and
//! per-subject delete watermarks. It is mutated exclusively by the single
//! log-delivery thread through [`ReplicaState::apply`]; everything else only
//! reads it (the store holds it behind a `RwLock`).
//!
//! Derived state is never stored. Latest-ness is the maximum version key of
//! the subject's map, computed at read time; effective compatibility/mode is
//! the subject's own entry or the global one. Soft-deleted versions stay in
//! the map and remain queryable; only a tombstone removes an entry outright.
//!
//! `apply` returns the affected `(subject, version)` set and the wait
//! signals to fire. A record that changes nothing (idempotent replay of
//! already-applied history) affects nothing and signals nothing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::entity::{SchemaEntity, SchemaKey, StoreStats};
use crate::error::StoreError;
use crate::record::{CompatibilityLevel, RecordKey, RecordValue, RegistryMode, SchemaValue};
use crate::waiters::{WaitKey, WaitKind};

// ---------------------------------------------------------------------------
// ScopedMap
// ---------------------------------------------------------------------------

/// One value per subject plus an optional global entry; the global entry is
/// the fallback for subjects with no override of their own.
#[derive(Debug)]
struct ScopedMap<T> {
    global: Option<T>,
    subjects: HashMap<String, T>,
}

impl<T> Default for ScopedMap<T> {
    fn default() -> Self {
        Self {
            global: None,
            subjects: HashMap::new(),
        }
    }
}

impl<T: Copy + PartialEq> ScopedMap<T> {
    fn get(&self, subject: Option<&str>) -> Option<T> {
        match subject {
            Some(s) => self.subjects.get(s).copied(),
            None => self.global,
        }
    }

    /// Replace-or-remove. Returns the previous entry.
    fn set(&mut self, subject: Option<&str>, value: Option<T>) -> Option<T> {
        match (subject, value) {
            (Some(s), Some(v)) => self.subjects.insert(s.to_string(), v),
            (Some(s), None) => self.subjects.remove(s),
            (None, v) => std::mem::replace(&mut self.global, v),
        }
    }

    fn has_override(&self, subject: &str) -> bool {
        self.subjects.contains_key(subject)
    }

    /// Own entry if present, else the global fallback.
    fn effective(&self, subject: &str) -> Option<T> {
        self.subjects.get(subject).copied().or(self.global)
    }
}

// ---------------------------------------------------------------------------
// ApplyOutcome
// ---------------------------------------------------------------------------

/// What one applied record changed: the externally visible versions whose
/// derived entity may have changed, and the wait signals to fire.
#[derive(Debug, Default)]
pub(crate) struct ApplyOutcome {
    pub affected: BTreeSet<SchemaKey>,
    pub signals: Vec<(WaitKey, WaitKind)>,
}

impl ApplyOutcome {
    pub fn merge(&mut self, other: ApplyOutcome) {
        self.affected.extend(other.affected);
        self.signals.extend(other.signals);
    }
}

// ---------------------------------------------------------------------------
// ReplicaState
// ---------------------------------------------------------------------------

/// The materialized view. See the module docs for the mutation discipline.
pub(crate) struct ReplicaState {
    /// subject -> version -> stored schema. Ordered so the maximum version
    /// key (latest) is a range query away.
    schemas: HashMap<String, BTreeMap<u32, SchemaValue>>,
    configs: ScopedMap<CompatibilityLevel>,
    modes: ScopedMap<RegistryMode>,
    /// subject -> most recent delete watermark (last-write-wins by log
    /// order). Every version <= watermark must be soft-deleted.
    delete_markers: HashMap<String, u32>,
}

impl ReplicaState {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
            configs: ScopedMap::default(),
            modes: ScopedMap::default(),
            delete_markers: HashMap::new(),
        }
    }

    /// Seed the global baseline fetched from the registry at startup. Log
    /// replay may supersede these; the log is the source of truth.
    pub fn seed_global(&mut self, level: CompatibilityLevel, mode: RegistryMode) {
        self.configs.set(None, Some(level));
        self.modes.set(None, Some(mode));
    }

    // -- read API (callers hold the shared read lock) -----------------------

    /// All subjects with at least one version, sorted for determinism.
    pub fn subjects(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    /// All schema entities, optionally restricted to one subject. Ordered by
    /// subject then version.
    pub fn schemas(&self, subject: Option<&str>) -> Vec<SchemaEntity> {
        let mut out = Vec::new();
        let mut names: Vec<&String> = self
            .schemas
            .keys()
            .filter(|name| subject.map_or(true, |s| s == name.as_str()))
            .collect();
        names.sort();
        for name in names {
            let map = &self.schemas[name];
            let latest = Self::latest_version(map);
            for (version, value) in map {
                out.push(SchemaEntity::from_value(value, Some(*version) == latest));
            }
        }
        out
    }

    /// One schema version; the latest one when `version` is `None`.
    pub fn get(&self, subject: &str, version: Option<u32>) -> Result<SchemaEntity, StoreError> {
        let map = self
            .schemas
            .get(subject)
            .ok_or_else(|| StoreError::SubjectNotFound(subject.to_string()))?;
        let latest = Self::latest_version(map);
        let version = match version {
            Some(v) => v,
            None => latest.ok_or_else(|| StoreError::SubjectNotFound(subject.to_string()))?,
        };
        let value = map.get(&version).ok_or(StoreError::VersionNotFound {
            subject: subject.to_string(),
            version,
        })?;
        Ok(SchemaEntity::from_value(value, Some(version) == latest))
    }

    /// Version numbers known for a subject, ascending.
    pub fn versions(&self, subject: &str) -> Result<Vec<u32>, StoreError> {
        self.schemas
            .get(subject)
            .map(|map| map.keys().copied().collect())
            .ok_or_else(|| StoreError::SubjectNotFound(subject.to_string()))
    }

    pub fn subject_exists(&self, subject: &str) -> bool {
        self.schemas.contains_key(subject)
    }

    pub fn schema_exists(&self, subject: &str, version: u32) -> bool {
        self.schemas
            .get(subject)
            .is_some_and(|map| map.contains_key(&version))
    }

    /// Compatibility level in force for a subject: its own entry, else the
    /// global one. Missing both is an invariant violation, not a default.
    pub fn effective_compatibility(
        &self,
        subject: &str,
    ) -> Result<CompatibilityLevel, StoreError> {
        self.configs
            .effective(subject)
            .ok_or_else(|| StoreError::MissingBaseline {
                what: "compatibility",
                subject: Some(subject.to_string()),
            })
    }

    /// Mode in force for a subject, with the same fallback rule.
    pub fn effective_mode(&self, subject: &str) -> Result<RegistryMode, StoreError> {
        self.modes
            .effective(subject)
            .ok_or_else(|| StoreError::MissingBaseline {
                what: "mode",
                subject: Some(subject.to_string()),
            })
    }

    /// Stored config entry for an exact scope, no fallback. Used by the
    /// update fast-path: an unchanged value will never come back as a
    /// signalling record.
    pub fn stored_compatibility(&self, subject: Option<&str>) -> Option<CompatibilityLevel> {
        self.configs.get(subject)
    }

    pub fn stats(&self) -> StoreStats {
        let schemas: usize = self.schemas.values().map(BTreeMap::len).sum();
        let live_schemas = self
            .schemas
            .values()
            .flat_map(BTreeMap::values)
            .filter(|v| !v.deleted)
            .count();
        StoreStats {
            subjects: self.schemas.len(),
            schemas,
            live_schemas,
            delete_markers: self.delete_markers.len(),
        }
    }

    /// Classify one affected version for notification fan-out: a live
    /// version yields its current entity, a soft-deleted or wholly absent
    /// one yields its key.
    pub fn classify(&self, key: &SchemaKey) -> Result<SchemaEntity, SchemaKey> {
        match self.schemas.get(&key.subject) {
            Some(map) => match map.get(&key.version) {
                Some(value) if !value.deleted => {
                    let latest = Self::latest_version(map);
                    Ok(SchemaEntity::from_value(value, Some(key.version) == latest))
                }
                _ => Err(key.clone()),
            },
            None => Err(key.clone()),
        }
    }

    fn latest_version(map: &BTreeMap<u32, SchemaValue>) -> Option<u32> {
        map.last_key_value().map(|(version, _)| *version)
    }

    // -- write API (single log-delivery thread only) ------------------------

    /// Apply one decoded record. Key/value variant mismatches cannot come out
    /// of the decoder, but are still dropped defensively here.
    pub fn apply(&mut self, key: &RecordKey, value: Option<&RecordValue>) -> ApplyOutcome {
        match (key, value) {
            (RecordKey::Config { subject }, None) => self.apply_config(subject.as_deref(), None),
            (RecordKey::Config { subject }, Some(RecordValue::Config(v))) => {
                self.apply_config(subject.as_deref(), Some(v.compatibility_level))
            }
            (RecordKey::Mode { subject }, None) => self.apply_mode(subject.as_deref(), None),
            (RecordKey::Mode { subject }, Some(RecordValue::Mode(v))) => {
                self.apply_mode(subject.as_deref(), Some(v.mode))
            }
            (RecordKey::Schema { subject, version }, None) => {
                self.apply_schema(subject, *version, None)
            }
            (RecordKey::Schema { subject, version }, Some(RecordValue::Schema(v))) => {
                self.apply_schema(subject, *version, Some(v))
            }
            (RecordKey::DeleteSubject { subject }, None) => {
                self.delete_markers.remove(subject);
                ApplyOutcome::default()
            }
            (RecordKey::DeleteSubject { subject }, Some(RecordValue::DeleteSubject(v))) => {
                self.apply_delete_subject(subject, v.version)
            }
            (RecordKey::Noop, _) => ApplyOutcome::default(),
            (RecordKey::ClearSubject { subject }, _) => {
                // Decoded for wire completeness, but the upstream registry
                // defines no replay semantics for clear markers; applying a
                // guessed wipe would put the replica ahead of the log.
                log::warn!(
                    "[replica] ignoring CLEAR_SUBJECT record for {:?}: no replay semantics",
                    subject
                );
                ApplyOutcome::default()
            }
            (key, Some(value)) => {
                log::warn!(
                    "[replica] dropping record with mismatched key/value: {} vs {:?}",
                    key.type_name(),
                    value
                );
                ApplyOutcome::default()
            }
        }
    }

    fn apply_config(
        &mut self,
        subject: Option<&str>,
        level: Option<CompatibilityLevel>,
    ) -> ApplyOutcome {
        let mut out = ApplyOutcome::default();
        if self.configs.get(subject) == level {
            return out; // idempotent replay: no side effects
        }
        self.configs.set(subject, level);
        out.affected = self.scope_versions(subject, |state, name| state.configs.has_override(name));
        out.signals.push((WaitKey::scope(subject), WaitKind::Update));
        out
    }

    fn apply_mode(&mut self, subject: Option<&str>, mode: Option<RegistryMode>) -> ApplyOutcome {
        let mut out = ApplyOutcome::default();
        if self.modes.get(subject) == mode {
            return out;
        }
        self.modes.set(subject, mode);
        out.affected = self.scope_versions(subject, |state, name| state.modes.has_override(name));
        out.signals.push((WaitKey::scope(subject), WaitKind::Update));
        out
    }

    /// Affected versions of a config/mode change: the subject's own versions
    /// for a subject-level key; for the global key, every version of every
    /// subject that has no override of its own (those are the subjects whose
    /// effective value just changed).
    fn scope_versions(
        &self,
        subject: Option<&str>,
        has_override: impl Fn(&Self, &str) -> bool,
    ) -> BTreeSet<SchemaKey> {
        let mut affected = BTreeSet::new();
        match subject {
            Some(name) => {
                if let Some(map) = self.schemas.get(name) {
                    for version in map.keys() {
                        affected.insert(SchemaKey::new(name, *version));
                    }
                }
            }
            None => {
                for (name, map) in &self.schemas {
                    if has_override(self, name) {
                        continue;
                    }
                    for version in map.keys() {
                        affected.insert(SchemaKey::new(name.clone(), *version));
                    }
                }
            }
        }
        affected
    }

    fn apply_schema(
        &mut self,
        subject: &str,
        version: u32,
        value: Option<&SchemaValue>,
    ) -> ApplyOutcome {
        let mut out = ApplyOutcome::default();
        match value {
            Some(value) => {
                let mut incoming = value.clone();
                // A (re)inserted version may sit below an already-applied
                // delete watermark; enforce the watermark immediately.
                if let Some(&watermark) = self.delete_markers.get(subject) {
                    if version <= watermark {
                        incoming.deleted = true;
                    }
                }

                let map = self.schemas.entry(subject.to_string()).or_default();
                let prev_latest = Self::latest_version(map);
                let old = map.insert(version, incoming.clone());

                if old.as_ref() == Some(&incoming) {
                    return out; // idempotent replay
                }

                out.affected.insert(SchemaKey::new(subject, version));
                // If this write moved the maximum, the previously latest
                // version's derived flag flipped too.
                if let Some(prev) = prev_latest {
                    if version > prev {
                        out.affected.insert(SchemaKey::new(subject, prev));
                    }
                }

                if old.is_none() {
                    out.signals
                        .push((WaitKey::schema(subject, version), WaitKind::Register));
                }
                let was_live = old.is_some_and(|o| !o.deleted);
                if was_live && incoming.deleted {
                    out.signals
                        .push((WaitKey::schema(subject, version), WaitKind::Delete));
                }
            }
            None => {
                let Some(map) = self.schemas.get_mut(subject) else {
                    return out;
                };
                let prev_latest = Self::latest_version(map);
                let Some(old) = map.remove(&version) else {
                    return out;
                };

                out.affected.insert(SchemaKey::new(subject, version));
                if prev_latest == Some(version) {
                    if let Some(new_latest) = Self::latest_version(map) {
                        out.affected.insert(SchemaKey::new(subject, new_latest));
                    }
                }
                if map.is_empty() {
                    self.schemas.remove(subject);
                }
                if !old.deleted {
                    out.signals
                        .push((WaitKey::schema(subject, version), WaitKind::Delete));
                }
            }
        }
        out
    }

    fn apply_delete_subject(&mut self, subject: &str, watermark: u32) -> ApplyOutcome {
        let mut out = ApplyOutcome::default();
        self.delete_markers.insert(subject.to_string(), watermark);

        if let Some(map) = self.schemas.get_mut(subject) {
            for (version, value) in map.range_mut(..=watermark) {
                if !value.deleted {
                    value.deleted = true;
                    out.affected.insert(SchemaKey::new(subject, *version));
                }
            }
        }

        // The waiter for a subject delete is released once the watermark
        // actually flipped something; a replayed marker flips nothing.
        if !out.affected.is_empty() {
            out.signals
                .push((WaitKey::subject(subject), WaitKind::Delete));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_value(subject: &str, version: u32, id: u32) -> SchemaValue {
        SchemaValue {
            subject: subject.to_string(),
            version,
            id,
            schema: format!("{{\"v\":{version}}}"),
            deleted: false,
            created_at: Some(i64::from(id)),
            deleted_at: None,
        }
    }

    fn insert(state: &mut ReplicaState, subject: &str, version: u32, id: u32) -> ApplyOutcome {
        state.apply(
            &RecordKey::Schema {
                subject: subject.to_string(),
                version,
            },
            Some(&RecordValue::Schema(schema_value(subject, version, id))),
        )
    }

    fn delete_subject(state: &mut ReplicaState, subject: &str, watermark: u32) -> ApplyOutcome {
        state.apply(
            &RecordKey::DeleteSubject {
                subject: subject.to_string(),
            },
            Some(&RecordValue::DeleteSubject(
                crate::record::DeleteSubjectValue {
                    subject: subject.to_string(),
                    version: watermark,
                },
            )),
        )
    }

    #[test]
    fn register_signals_and_affects() {
        let mut state = ReplicaState::new();
        let out = insert(&mut state, "orders", 1, 10);

        assert!(out.affected.contains(&SchemaKey::new("orders", 1)));
        assert_eq!(
            out.signals,
            vec![(WaitKey::schema("orders", 1), WaitKind::Register)]
        );
        assert!(state.schema_exists("orders", 1));
    }

    #[test]
    fn latest_flips_to_new_max() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);
        let out = insert(&mut state, "orders", 2, 11);

        // Both the new version and the previously latest one are affected.
        assert!(out.affected.contains(&SchemaKey::new("orders", 1)));
        assert!(out.affected.contains(&SchemaKey::new("orders", 2)));

        assert!(state.get("orders", Some(2)).unwrap().latest);
        assert!(!state.get("orders", Some(1)).unwrap().latest);
        assert_eq!(state.get("orders", None).unwrap().version, 2);
    }

    #[test]
    fn exactly_one_latest_version() {
        let mut state = ReplicaState::new();
        for v in 1..=5 {
            insert(&mut state, "orders", v, 10 + v);
        }
        let latest: Vec<u32> = state
            .schemas(Some("orders"))
            .into_iter()
            .filter(|e| e.latest)
            .map(|e| e.version)
            .collect();
        assert_eq!(latest, vec![5]);
    }

    #[test]
    fn idempotent_replay_is_a_noop() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);
        let replay = insert(&mut state, "orders", 1, 10);

        assert!(replay.affected.is_empty());
        assert!(replay.signals.is_empty());
    }

    #[test]
    fn delete_subject_flips_versions_below_watermark() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);
        insert(&mut state, "orders", 2, 11);
        insert(&mut state, "orders", 3, 12);

        let out = delete_subject(&mut state, "orders", 2);

        assert!(state.get("orders", Some(1)).unwrap().deleted);
        assert!(state.get("orders", Some(2)).unwrap().deleted);
        assert!(!state.get("orders", Some(3)).unwrap().deleted);
        assert_eq!(out.affected.len(), 2);
        assert_eq!(
            out.signals,
            vec![(WaitKey::subject("orders"), WaitKind::Delete)]
        );
    }

    #[test]
    fn delete_marker_replay_does_not_resignal() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);
        delete_subject(&mut state, "orders", 1);
        let replay = delete_subject(&mut state, "orders", 1);

        assert!(replay.affected.is_empty());
        assert!(replay.signals.is_empty());
    }

    #[test]
    fn soft_delete_is_monotonic() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);
        insert(&mut state, "orders", 2, 11);
        delete_subject(&mut state, "orders", 2);

        // An equal-or-earlier watermark cannot resurrect anything.
        delete_subject(&mut state, "orders", 1);
        assert!(state.get("orders", Some(1)).unwrap().deleted);
        assert!(state.get("orders", Some(2)).unwrap().deleted);
    }

    #[test]
    fn reinserted_version_below_watermark_is_deleted_on_arrival() {
        let mut state = ReplicaState::new();
        delete_subject(&mut state, "orders", 3);
        let out = insert(&mut state, "orders", 2, 10);

        assert!(state.get("orders", Some(2)).unwrap().deleted);
        // Present transition still fires even though the version arrived
        // already under the watermark.
        assert!(out
            .signals
            .contains(&(WaitKey::schema("orders", 2), WaitKind::Register)));
    }

    #[test]
    fn soft_delete_record_signals_delete() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);

        let mut deleted = schema_value("orders", 1, 10);
        deleted.deleted = true;
        deleted.deleted_at = Some(99);
        let out = state.apply(
            &RecordKey::Schema {
                subject: "orders".to_string(),
                version: 1,
            },
            Some(&RecordValue::Schema(deleted)),
        );

        assert_eq!(
            out.signals,
            vec![(WaitKey::schema("orders", 1), WaitKind::Delete)]
        );
        assert!(state.get("orders", Some(1)).unwrap().deleted);
    }

    #[test]
    fn tombstone_removes_version_and_signals_delete_of_live_entry() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);
        insert(&mut state, "orders", 2, 11);

        let out = state.apply(
            &RecordKey::Schema {
                subject: "orders".to_string(),
                version: 2,
            },
            None,
        );

        assert!(!state.schema_exists("orders", 2));
        // v1 is latest again, so its derived entity changed.
        assert!(out.affected.contains(&SchemaKey::new("orders", 1)));
        assert!(out
            .signals
            .contains(&(WaitKey::schema("orders", 2), WaitKind::Delete)));
        assert!(state.get("orders", None).unwrap().latest);
    }

    #[test]
    fn tombstoning_last_version_removes_subject() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);
        state.apply(
            &RecordKey::Schema {
                subject: "orders".to_string(),
                version: 1,
            },
            None,
        );
        assert!(!state.subject_exists("orders"));
        assert!(matches!(
            state.get("orders", None),
            Err(StoreError::SubjectNotFound(_))
        ));
    }

    #[test]
    fn effective_config_falls_back_to_global() {
        let mut state = ReplicaState::new();
        state.seed_global(CompatibilityLevel::Backward, RegistryMode::ReadWrite);
        insert(&mut state, "orders", 1, 10);

        assert_eq!(
            state.effective_compatibility("orders").unwrap(),
            CompatibilityLevel::Backward
        );

        // A subject-level entry shadows the global one...
        state.apply(
            &RecordKey::Config {
                subject: Some("orders".to_string()),
            },
            Some(&RecordValue::Config(crate::record::ConfigValue {
                compatibility_level: CompatibilityLevel::Full,
            })),
        );
        assert_eq!(
            state.effective_compatibility("orders").unwrap(),
            CompatibilityLevel::Full
        );

        // ...regardless of later global changes.
        state.apply(
            &RecordKey::Config { subject: None },
            Some(&RecordValue::Config(crate::record::ConfigValue {
                compatibility_level: CompatibilityLevel::Forward,
            })),
        );
        assert_eq!(
            state.effective_compatibility("orders").unwrap(),
            CompatibilityLevel::Full
        );
        assert_eq!(
            state.effective_compatibility("other").unwrap(),
            CompatibilityLevel::Forward
        );
    }

    #[test]
    fn mode_override_and_tombstone() {
        let mut state = ReplicaState::new();
        state.seed_global(CompatibilityLevel::Backward, RegistryMode::ReadWrite);

        let out = state.apply(
            &RecordKey::Mode {
                subject: Some("orders".to_string()),
            },
            Some(&RecordValue::Mode(crate::record::ModeValue {
                mode: RegistryMode::ReadOnly,
            })),
        );
        assert_eq!(
            out.signals,
            vec![(WaitKey::subject("orders"), WaitKind::Update)]
        );
        assert_eq!(
            state.effective_mode("orders").unwrap(),
            RegistryMode::ReadOnly
        );
        assert_eq!(
            state.effective_mode("payments").unwrap(),
            RegistryMode::ReadWrite
        );

        state.apply(
            &RecordKey::Mode {
                subject: Some("orders".to_string()),
            },
            None,
        );
        assert_eq!(
            state.effective_mode("orders").unwrap(),
            RegistryMode::ReadWrite
        );
    }

    #[test]
    fn missing_baseline_is_an_error_not_a_default() {
        let state = ReplicaState::new();
        assert!(matches!(
            state.effective_compatibility("orders"),
            Err(StoreError::MissingBaseline { .. })
        ));
        assert!(matches!(
            state.effective_mode("orders"),
            Err(StoreError::MissingBaseline { .. })
        ));
    }

    #[test]
    fn global_config_change_affects_only_non_overridden_subjects() {
        let mut state = ReplicaState::new();
        state.seed_global(CompatibilityLevel::Backward, RegistryMode::ReadWrite);
        insert(&mut state, "orders", 1, 10);
        insert(&mut state, "payments", 1, 11);
        state.apply(
            &RecordKey::Config {
                subject: Some("orders".to_string()),
            },
            Some(&RecordValue::Config(crate::record::ConfigValue {
                compatibility_level: CompatibilityLevel::Full,
            })),
        );

        let out = state.apply(
            &RecordKey::Config { subject: None },
            Some(&RecordValue::Config(crate::record::ConfigValue {
                compatibility_level: CompatibilityLevel::Forward,
            })),
        );

        assert!(out.affected.contains(&SchemaKey::new("payments", 1)));
        assert!(!out.affected.contains(&SchemaKey::new("orders", 1)));
        assert_eq!(out.signals, vec![(WaitKey::Global, WaitKind::Update)]);
    }

    #[test]
    fn unchanged_config_value_does_not_signal() {
        let mut state = ReplicaState::new();
        state.seed_global(CompatibilityLevel::Backward, RegistryMode::ReadWrite);

        let out = state.apply(
            &RecordKey::Config { subject: None },
            Some(&RecordValue::Config(crate::record::ConfigValue {
                compatibility_level: CompatibilityLevel::Backward,
            })),
        );
        assert!(out.affected.is_empty());
        assert!(out.signals.is_empty());
    }

    #[test]
    fn config_tombstone_restores_fallback() {
        let mut state = ReplicaState::new();
        state.seed_global(CompatibilityLevel::Backward, RegistryMode::ReadWrite);
        insert(&mut state, "orders", 1, 10);
        state.apply(
            &RecordKey::Config {
                subject: Some("orders".to_string()),
            },
            Some(&RecordValue::Config(crate::record::ConfigValue {
                compatibility_level: CompatibilityLevel::Full,
            })),
        );

        let out = state.apply(
            &RecordKey::Config {
                subject: Some("orders".to_string()),
            },
            None,
        );
        assert!(out.affected.contains(&SchemaKey::new("orders", 1)));
        assert_eq!(
            state.effective_compatibility("orders").unwrap(),
            CompatibilityLevel::Backward
        );
    }

    #[test]
    fn latest_lookup_is_structural_even_when_deleted() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);
        insert(&mut state, "orders", 2, 11);
        delete_subject(&mut state, "orders", 2);

        // Deleted schemas remain queryable; latest derives from the map key.
        let latest = state.get("orders", None).unwrap();
        assert_eq!(latest.version, 2);
        assert!(latest.deleted);
        assert!(latest.latest);
    }

    #[test]
    fn classify_routes_live_vs_deleted() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);
        insert(&mut state, "orders", 2, 11);
        delete_subject(&mut state, "orders", 1);

        assert!(state.classify(&SchemaKey::new("orders", 2)).is_ok());
        assert_eq!(
            state.classify(&SchemaKey::new("orders", 1)),
            Err(SchemaKey::new("orders", 1))
        );
        assert_eq!(
            state.classify(&SchemaKey::new("orders", 9)),
            Err(SchemaKey::new("orders", 9))
        );
    }

    #[test]
    fn noop_records_change_nothing() {
        let mut state = ReplicaState::new();
        let out = state.apply(&RecordKey::Noop, None);
        assert!(out.affected.is_empty());
        assert!(out.signals.is_empty());
    }

    #[test]
    fn clear_subject_is_decoded_but_not_applied() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);

        let out = state.apply(
            &RecordKey::ClearSubject {
                subject: "orders".to_string(),
            },
            Some(&RecordValue::ClearSubject(
                crate::record::ClearSubjectValue {
                    subject: "orders".to_string(),
                },
            )),
        );

        assert!(out.affected.is_empty());
        assert!(out.signals.is_empty());
        assert!(state.schema_exists("orders", 1));
    }

    #[test]
    fn stats_count_live_and_deleted() {
        let mut state = ReplicaState::new();
        insert(&mut state, "orders", 1, 10);
        insert(&mut state, "orders", 2, 11);
        insert(&mut state, "payments", 1, 12);
        delete_subject(&mut state, "orders", 1);

        let stats = state.stats();
        assert_eq!(stats.subjects, 2);
        assert_eq!(stats.schemas, 3);
        assert_eq!(stats.live_schemas, 2);
        assert_eq!(stats.delete_markers, 1);
    }
}
