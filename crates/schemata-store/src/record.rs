// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Change-log record model.
//!
//! The registry writes every mutation to a compacted log topic as a
//! `(key, value)` pair of JSON objects. The key carries a `keytype`
//! discriminator and is the log's partitioning/identity unit; the value is a
//! type-specific payload, or absent entirely (a tombstone deleting the key).
//!
//! The record kinds form a closed set, so keys and values are modeled as
//! exhaustive enums rather than an open hierarchy: a new record kind is a
//! compile error everywhere it matters, not a silently ignored branch.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CompatibilityLevel
// ---------------------------------------------------------------------------

/// Compatibility level governing schema evolution for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityLevel {
    /// No compatibility checking.
    None,
    /// New schema can read data written by the previous schema.
    Backward,
    /// Backward against all prior versions.
    BackwardTransitive,
    /// Previous schema can read data written by the new schema.
    Forward,
    /// Forward against all prior versions.
    ForwardTransitive,
    /// Both backward and forward against the previous version.
    Full,
    /// Both backward and forward against all prior versions.
    FullTransitive,
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompatibilityLevel::None => "NONE",
            CompatibilityLevel::Backward => "BACKWARD",
            CompatibilityLevel::BackwardTransitive => "BACKWARD_TRANSITIVE",
            CompatibilityLevel::Forward => "FORWARD",
            CompatibilityLevel::ForwardTransitive => "FORWARD_TRANSITIVE",
            CompatibilityLevel::Full => "FULL",
            CompatibilityLevel::FullTransitive => "FULL_TRANSITIVE",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// RegistryMode
// ---------------------------------------------------------------------------

/// Operating mode of the registry, globally or per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryMode {
    /// Normal operation: reads and writes allowed.
    #[serde(rename = "READWRITE")]
    ReadWrite,
    /// Writes rejected.
    #[serde(rename = "READONLY")]
    ReadOnly,
    /// Schemas may be registered with caller-assigned ids/versions.
    #[serde(rename = "IMPORT")]
    Import,
}

impl fmt::Display for RegistryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistryMode::ReadWrite => "READWRITE",
            RegistryMode::ReadOnly => "READONLY",
            RegistryMode::Import => "IMPORT",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// RecordKey
// ---------------------------------------------------------------------------

/// Key of a change-log record, discriminated by the wire field `keytype`.
///
/// `subject: None` on `Config`/`Mode` keys is the sentinel for "applies
/// globally".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "keytype")]
pub enum RecordKey {
    /// Compatibility setting for one subject, or global when `subject` is absent.
    #[serde(rename = "CONFIG")]
    Config {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
    },
    /// One version of one subject's schema.
    #[serde(rename = "SCHEMA")]
    Schema { subject: String, version: u32 },
    /// Subject-level delete watermark.
    #[serde(rename = "DELETE_SUBJECT")]
    DeleteSubject { subject: String },
    /// Mode setting for one subject, or global when `subject` is absent.
    #[serde(rename = "MODE")]
    Mode {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
    },
    /// Padding record with no effect on state.
    #[serde(rename = "NOOP")]
    Noop,
    /// Full-wipe marker for a subject. Decoded but never applied (the
    /// upstream registry defines no replay semantics for it yet).
    #[serde(rename = "CLEAR_SUBJECT")]
    ClearSubject { subject: String },
}

impl RecordKey {
    /// Wire name of this key's record type.
    pub fn type_name(&self) -> &'static str {
        match self {
            RecordKey::Config { .. } => "CONFIG",
            RecordKey::Schema { .. } => "SCHEMA",
            RecordKey::DeleteSubject { .. } => "DELETE_SUBJECT",
            RecordKey::Mode { .. } => "MODE",
            RecordKey::Noop => "NOOP",
            RecordKey::ClearSubject { .. } => "CLEAR_SUBJECT",
        }
    }
}

// ---------------------------------------------------------------------------
// Record values
// ---------------------------------------------------------------------------

/// Value payload for a `CONFIG` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    /// Compatibility level in force for the key's scope.
    #[serde(rename = "compatibilityLevel")]
    pub compatibility_level: CompatibilityLevel,
}

/// Value payload for a `MODE` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeValue {
    /// Mode in force for the key's scope.
    pub mode: RegistryMode,
}

/// Value payload for a `SCHEMA` key: one registered schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaValue {
    /// Subject this version belongs to.
    pub subject: String,
    /// Version number assigned by the registry. Monotonically increasing,
    /// never reused.
    pub version: u32,
    /// Globally unique schema id assigned by the registry.
    pub id: u32,
    /// Raw schema text.
    pub schema: String,
    /// Soft-delete flag. A deleted version stays in the log and remains
    /// queryable.
    #[serde(default)]
    pub deleted: bool,
    /// Registration time, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Soft-delete time, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

/// Value payload for a `DELETE_SUBJECT` key: all versions of `subject` up to
/// and including `version` are deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSubjectValue {
    pub subject: String,
    pub version: u32,
}

/// Value payload for a `CLEAR_SUBJECT` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearSubjectValue {
    pub subject: String,
}

/// Typed value of a change-log record. A record with no value at all (a
/// tombstone) is represented as `Option::<RecordValue>::None` by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValue {
    Config(ConfigValue),
    Mode(ModeValue),
    Schema(SchemaValue),
    DeleteSubject(DeleteSubjectValue),
    ClearSubject(ClearSubjectValue),
}

impl RecordValue {
    /// Serialize this value's payload to its wire form.
    ///
    /// The wire carries the inner payload object only; the record type is
    /// discriminated by the key, never by the value.
    pub fn to_wire(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            RecordValue::Config(v) => serde_json::to_vec(v),
            RecordValue::Mode(v) => serde_json::to_vec(v),
            RecordValue::Schema(v) => serde_json::to_vec(v),
            RecordValue::DeleteSubject(v) => serde_json::to_vec(v),
            RecordValue::ClearSubject(v) => serde_json::to_vec(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_key_round_trip() {
        let key = RecordKey::Schema {
            subject: "orders".to_string(),
            version: 3,
        };
        let json = serde_json::to_string(&key).unwrap();
        assert!(json.contains("\"keytype\":\"SCHEMA\""));
        let back: RecordKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn global_config_key_omits_subject() {
        let key = RecordKey::Config { subject: None };
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "{\"keytype\":\"CONFIG\"}");
        let back: RecordKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn schema_value_wire_names_are_camel_case() {
        let value = SchemaValue {
            subject: "orders".to_string(),
            version: 1,
            id: 7,
            schema: "{\"type\":\"record\"}".to_string(),
            deleted: false,
            created_at: Some(1_700_000_000_000),
            deleted_at: None,
        };
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains("\"createdAt\""));
        assert!(!json.contains("\"deletedAt\""));
    }

    #[test]
    fn schema_value_deleted_defaults_false() {
        let value: SchemaValue =
            serde_json::from_str(r#"{"subject":"s","version":1,"id":1,"schema":"x"}"#).unwrap();
        assert!(!value.deleted);
        assert_eq!(value.created_at, None);
    }

    #[test]
    fn compatibility_level_wire_names() {
        let json = serde_json::to_string(&CompatibilityLevel::BackwardTransitive).unwrap();
        assert_eq!(json, "\"BACKWARD_TRANSITIVE\"");
        let back: CompatibilityLevel = serde_json::from_str("\"FULL\"").unwrap();
        assert_eq!(back, CompatibilityLevel::Full);
    }

    #[test]
    fn mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&RegistryMode::ReadWrite).unwrap(),
            "\"READWRITE\""
        );
        let back: RegistryMode = serde_json::from_str("\"IMPORT\"").unwrap();
        assert_eq!(back, RegistryMode::Import);
    }
}
