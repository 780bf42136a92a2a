// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Defensive decoding of raw change-log records.
//!
//! The wire format belongs to the external registry, so decoding never trusts
//! it: the record type is extracted from the key payload alone, then key and
//! value are deserialized per type. Anything unrecognized or malformed is a
//! [`DecodeError`], and the delivery path drops such records after logging --
//! the replica is always the materialization of the validly-decodable prefix
//! of history, never poisoned by a bad record.

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::record::{
    ClearSubjectValue, ConfigValue, DeleteSubjectValue, ModeValue, RecordKey, RecordValue,
    SchemaValue,
};
use crate::tailer::RawRecord;

/// Wire names of the record types this store understands.
const KNOWN_TYPES: [&str; 6] = [
    "CONFIG",
    "SCHEMA",
    "DELETE_SUBJECT",
    "MODE",
    "NOOP",
    "CLEAR_SUBJECT",
];

/// A raw record decoded into its typed form. `value == None` is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub key: RecordKey,
    pub value: Option<RecordValue>,
}

/// Why a raw record could not be decoded. Never fatal: the record is logged
/// and skipped.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Key payload is empty.
    #[error("empty record key")]
    EmptyKey,
    /// Key payload is not a JSON object.
    #[error("record key is not valid JSON: {0}")]
    MalformedKey(String),
    /// Key object has no `keytype` string field.
    #[error("record key has no keytype field")]
    MissingKeyType,
    /// `keytype` names a record type this store does not know.
    #[error("unrecognized record type {0:?}")]
    UnknownRecordType(String),
    /// Value payload could not be parsed for the key's type.
    #[error("malformed {keytype} value: {reason}")]
    MalformedValue {
        keytype: &'static str,
        reason: String,
    },
}

/// Decode one raw record into its typed `(key, value)` form.
///
/// The type discriminator is read from the key alone before any typed
/// deserialization happens, so "unknown type" and "malformed payload for a
/// known type" are distinguishable failures.
pub fn decode_record(raw_key: &[u8], raw_value: Option<&[u8]>) -> Result<DecodedRecord, DecodeError> {
    if raw_key.is_empty() {
        return Err(DecodeError::EmptyKey);
    }

    let key_json: JsonValue =
        serde_json::from_slice(raw_key).map_err(|e| DecodeError::MalformedKey(e.to_string()))?;

    let keytype = key_json
        .get("keytype")
        .and_then(JsonValue::as_str)
        .ok_or(DecodeError::MissingKeyType)?;

    if !KNOWN_TYPES.contains(&keytype) {
        return Err(DecodeError::UnknownRecordType(keytype.to_string()));
    }

    let key: RecordKey = serde_json::from_value(key_json)
        .map_err(|e| DecodeError::MalformedKey(e.to_string()))?;

    let value = match raw_value {
        None => None,
        Some(bytes) => decode_value(&key, bytes)?,
    };

    Ok(DecodedRecord { key, value })
}

/// Decode a value payload for an already-decoded key.
fn decode_value(key: &RecordKey, bytes: &[u8]) -> Result<Option<RecordValue>, DecodeError> {
    fn parse<T: serde::de::DeserializeOwned>(
        keytype: &'static str,
        bytes: &[u8],
    ) -> Result<T, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError::MalformedValue {
            keytype,
            reason: e.to_string(),
        })
    }

    let value = match key {
        RecordKey::Config { .. } => {
            RecordValue::Config(parse::<ConfigValue>("CONFIG", bytes)?)
        }
        RecordKey::Mode { .. } => RecordValue::Mode(parse::<ModeValue>("MODE", bytes)?),
        RecordKey::Schema { .. } => RecordValue::Schema(parse::<SchemaValue>("SCHEMA", bytes)?),
        RecordKey::DeleteSubject { .. } => {
            RecordValue::DeleteSubject(parse::<DeleteSubjectValue>("DELETE_SUBJECT", bytes)?)
        }
        RecordKey::ClearSubject { .. } => {
            RecordValue::ClearSubject(parse::<ClearSubjectValue>("CLEAR_SUBJECT", bytes)?)
        }
        // Noop payloads carry no information; tolerate whatever is there.
        RecordKey::Noop => return Ok(None),
    };

    Ok(Some(value))
}

/// Decode a raw record, logging and discarding it on failure.
///
/// Shared by every tailer implementation so the skip contract is uniform.
pub fn decode_lossy(raw: &RawRecord) -> Option<DecodedRecord> {
    match decode_record(&raw.key, raw.value.as_deref()) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("[decode] dropping undecodable record: {}", e);
            None
        }
    }
}
