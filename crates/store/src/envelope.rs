//! Versioned storage envelope.
//!
//! Every value is persisted as `{"version": N, "payload": ...}` so that the
//! schema of a key can evolve without silently corrupting older data. Values
//! written before the envelope existed (bare arrays/objects) are read as
//! version 0 and migrated forward.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current envelope version. Bump together with a new entry in [`migrate`].
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub payload: Value,
}

impl Envelope {
    pub fn current(payload: Value) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }
}

/// Parse raw stored text into an envelope.
///
/// Returns `None` when the text is not valid JSON at all; the caller decides
/// on the fallback. A valid JSON value that is not an envelope is treated as
/// a legacy (version 0) payload.
pub fn parse(raw: &str) -> Option<Envelope> {
    let value: Value = serde_json::from_str(raw).ok()?;

    if let Some(obj) = value.as_object() {
        if let (Some(version), Some(payload)) = (
            obj.get("version").and_then(Value::as_u64),
            obj.get("payload"),
        ) {
            return Some(Envelope {
                version: version as u32,
                payload: payload.clone(),
            });
        }
    }

    // Legacy pre-envelope value.
    Some(Envelope {
        version: 0,
        payload: value,
    })
}

/// Migrate an envelope forward to [`CURRENT_VERSION`].
///
/// Each step maps version N to N+1; unknown future versions are passed
/// through unchanged so a downgrade does not destroy data.
pub fn migrate(key: &str, mut envelope: Envelope) -> Envelope {
    while envelope.version < CURRENT_VERSION {
        envelope = match envelope.version {
            // v0 -> v1: wrap the bare legacy value. The payload shape itself
            // was already what v1 expects.
            0 => Envelope {
                version: 1,
                payload: envelope.payload,
            },
            other => {
                tracing::warn!(key, version = other, "no migration step; leaving value as-is");
                return envelope;
            }
        };
    }
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enveloped_value_parses_with_its_version() {
        let env = parse(r#"{"version":1,"payload":[1,2,3]}"#).unwrap();
        assert_eq!(env.version, 1);
        assert_eq!(env.payload, json!([1, 2, 3]));
    }

    #[test]
    fn legacy_bare_array_parses_as_version_zero() {
        let env = parse(r#"[{"id":1}]"#).unwrap();
        assert_eq!(env.version, 0);
        assert_eq!(env.payload, json!([{"id": 1}]));
    }

    #[test]
    fn object_without_envelope_fields_is_legacy() {
        let env = parse(r#"{"nome":"Rossi"}"#).unwrap();
        assert_eq!(env.version, 0);
    }

    #[test]
    fn invalid_json_yields_none() {
        assert!(parse("{not json").is_none());
    }

    #[test]
    fn migrate_brings_legacy_to_current() {
        let env = parse(r#"["a"]"#).unwrap();
        let migrated = migrate("ordini", env);
        assert_eq!(migrated.version, CURRENT_VERSION);
        assert_eq!(migrated.payload, json!(["a"]));
    }

    #[test]
    fn migrate_leaves_future_versions_alone() {
        let env = Envelope {
            version: 99,
            payload: json!({}),
        };
        let migrated = migrate("ordini", env.clone());
        assert_eq!(migrated, env);
    }
}
