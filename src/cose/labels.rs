//! Typed COSE Header Labels
//!
//! The reference implementation this service is modelled on decodes CBOR
//! header maps into duck-typed maps and tolerates integer keys arriving
//! as `int64`, `uint64` or native integers interchangeably. This crate
//! instead decodes protected/unprotected headers into a map keyed by an
//! explicit label type and compares only by normalised integer form —
//! see Design Note "Duck-typed CBOR maps".

use std::collections::BTreeMap;

use ciborium::Value;

/// A COSE header label: either the common integer form (RFC 9052 §3.1)
/// or a text-string form used by some extension headers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CoseLabel {
    Int(i64),
    Text(String),
}

impl From<i64> for CoseLabel {
    fn from(v: i64) -> Self {
        CoseLabel::Int(v)
    }
}

impl From<&str> for CoseLabel {
    fn from(v: &str) -> Self {
        CoseLabel::Text(v.to_string())
    }
}

/// Well-known protected header labels used by this service.
pub mod label {
    /// `alg` (RFC 9052 §3.1)
    pub const ALG: i64 = 1;
    /// `cty` (RFC 9052 §3.1)
    pub const CTY: i64 = 3;
    /// `kid` (RFC 9052 §3.1)
    pub const KID: i64 = 4;
    /// CWT Claims (RFC 8392 / draft-ietf-scitt CWT claims header)
    pub const CWT_CLAIMS: i64 = 15;
    /// Hash envelope: `payload_hash_alg`
    pub const PAYLOAD_HASH_ALG: i64 = 258;
    /// Hash envelope: `payload_preimage_content_type`
    pub const PAYLOAD_PREIMAGE_CONTENT_TYPE: i64 = 259;
    /// Hash envelope: `payload_location`
    pub const PAYLOAD_LOCATION: i64 = 260;
    /// Verifiable data structure identifier
    pub const VDS: i64 = 395;
    /// Verifiable data proofs map (unprotected)
    pub const VDP: i64 = 396;

    /// CWT claim: issuer
    pub const CWT_ISS: i64 = 1;
    /// CWT claim: subject
    pub const CWT_SUB: i64 = 2;
}

/// A decoded COSE header map, keyed by normalised [`CoseLabel`].
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: BTreeMap<CoseLabel, Value>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<CoseLabel>, value: Value) {
        self.entries.insert(label.into(), value);
    }

    pub fn get(&self, label: impl Into<CoseLabel>) -> Option<&Value> {
        self.entries.get(&label.into())
    }

    pub fn get_int(&self, label: impl Into<CoseLabel>) -> Option<i64> {
        match self.get(label)? {
            Value::Integer(i) => i64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn get_text(&self, label: impl Into<CoseLabel>) -> Option<&str> {
        match self.get(label)? {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_bytes(&self, label: impl Into<CoseLabel>) -> Option<&[u8]> {
        match self.get(label)? {
            Value::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn get_map(&self, label: impl Into<CoseLabel>) -> Option<&Value> {
        match self.get(label)? {
            v @ Value::Map(_) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CoseLabel, &Value)> {
        self.entries.iter()
    }

    /// Decode a CBOR map `Value` into a [`HeaderMap`], normalising
    /// integer keys (which `ciborium` always represents as
    /// [`ciborium::value::Integer`]) into [`CoseLabel::Int`] and text
    /// keys into [`CoseLabel::Text`]. Keys of any other kind are dropped
    /// — COSE headers never use them.
    pub fn from_cbor_map(value: &Value) -> Option<Self> {
        let Value::Map(pairs) = value else {
            return None;
        };
        let mut entries = BTreeMap::new();
        for (k, v) in pairs {
            let label = match k {
                Value::Integer(i) => CoseLabel::Int(i64::try_from(*i).ok()?),
                Value::Text(s) => CoseLabel::Text(s.clone()),
                _ => continue,
            };
            entries.insert(label, v.clone());
        }
        Some(Self { entries })
    }

    /// Encode this header map back into a CBOR `Value::Map`.
    pub fn to_cbor_map(&self) -> Value {
        let pairs: Vec<(Value, Value)> = self
            .entries
            .iter()
            .map(|(k, v)| {
                let key = match k {
                    CoseLabel::Int(i) => Value::Integer((*i).into()),
                    CoseLabel::Text(s) => Value::Text(s.clone()),
                };
                (key, v.clone())
            })
            .collect();
        Value::Map(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_roundtrip() {
        let mut h = HeaderMap::new();
        h.insert(label::ALG, Value::Integer((-7i64).into()));
        h.insert(label::CTY, Value::Text("application/json".into()));

        let cbor = h.to_cbor_map();
        let decoded = HeaderMap::from_cbor_map(&cbor).unwrap();

        assert_eq!(decoded.get_int(label::ALG), Some(-7));
        assert_eq!(decoded.get_text(label::CTY), Some("application/json"));
    }

    #[test]
    fn test_missing_label() {
        let h = HeaderMap::new();
        assert_eq!(h.get_int(label::ALG), None);
    }
}
