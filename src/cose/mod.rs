//! COSE Codec
//!
//! Encodes and decodes `COSE_Sign1` structures (RFC 9052 §4.2), computes
//! the `Sig_structure` that is actually signed/verified, and defines the
//! hash-envelope and COSE_Key conventions layered on top. Receipt
//! construction ([`crate::receipt`]) reuses this module directly — the
//! two are inseparable per §1.

pub mod envelope;
pub mod key;
pub mod labels;

use ciborium::Value;
use thiserror::Error;

pub use labels::{label, CoseLabel, HeaderMap};

/// COSE algorithm identifiers used by this service (RFC 9053 §2).
pub mod alg {
    pub const ES256: i64 = -7;
    pub const EDDSA: i64 = -8;
    pub const ES384: i64 = -35;
    pub const ES512: i64 = -36;
}

/// COSE_Sign1 CBOR tag (RFC 9052 §2).
pub const COSE_SIGN1_TAG: u64 = 18;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("CBOR decode error: {0}")]
    Decode(String),

    #[error("CBOR encode error: {0}")]
    Encode(String),

    #[error("malformed COSE_Sign1: {0}")]
    Malformed(String),

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("signer error: {0}")]
    Signer(String),
}

/// Abstract signer capability. The codec never constructs a signature
/// itself; it delegates to this trait so that service keys, HSMs, or
/// threshold signers can all be plugged in the same way.
pub trait Signer {
    /// Sign `bytes` (the CBOR-encoded `Sig_structure`) and return the raw
    /// signature bytes in COSE wire form.
    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// The COSE `alg` value this signer produces signatures for.
    fn alg(&self) -> i64;
}

/// Abstract verifier capability, the inverse of [`Signer`].
pub trait Verifier {
    /// Verify `sig` over `bytes` (the CBOR-encoded `Sig_structure`).
    fn verify(&self, bytes: &[u8], sig: &[u8]) -> bool;

    /// The COSE `alg` value this verifier checks.
    fn alg(&self) -> i64;
}

/// A decoded or to-be-encoded `COSE_Sign1` structure.
#[derive(Debug, Clone)]
pub struct Sign1 {
    /// Raw encoded protected header bytes (a CBOR map).
    pub protected_bytes: Vec<u8>,
    /// Decoded protected header map, kept in sync with `protected_bytes`.
    pub protected: HeaderMap,
    /// Unprotected header map.
    pub unprotected: HeaderMap,
    /// Payload bytes, or `None` for a detached payload.
    pub payload: Option<Vec<u8>>,
    /// Signature bytes.
    pub signature: Vec<u8>,
}

impl Sign1 {
    /// Build a `Sign1` from a protected header map and a payload, then
    /// sign it with `signer`. The resulting structure always carries an
    /// attached payload unless `detached` is set, in which case the
    /// payload field encodes as CBOR null and the caller must transport
    /// the payload bytes separately.
    pub fn new_signed(
        protected: HeaderMap,
        unprotected: HeaderMap,
        payload: Vec<u8>,
        detached: bool,
        signer: &dyn Signer,
    ) -> Result<Self, CodecError> {
        let protected_bytes = encode_cbor_value(&protected.to_cbor_map())?;
        let to_be_signed = sig_structure_bytes(&protected_bytes, &payload)?;
        let signature = signer.sign(&to_be_signed)?;

        Ok(Self {
            protected_bytes,
            protected,
            unprotected,
            payload: if detached { None } else { Some(payload) },
            signature,
        })
    }

    /// Verify this structure's signature against `verifier`. When the
    /// payload is detached, the caller supplies it via `external_payload`.
    pub fn verify(
        &self,
        verifier: &dyn Verifier,
        external_payload: Option<&[u8]>,
    ) -> Result<bool, CodecError> {
        let payload = self
            .payload
            .as_deref()
            .or(external_payload)
            .ok_or(CodecError::MissingHeader("payload"))?;

        let to_be_signed = sig_structure_bytes(&self.protected_bytes, payload)?;
        Ok(verifier.verify(&to_be_signed, &self.signature))
    }

    /// Encode as CBOR bytes. `tagged` wraps the array in CBOR tag 18 per
    /// RFC 9052 §2; both forms are accepted by [`Sign1::decode`].
    pub fn encode(&self, tagged: bool) -> Result<Vec<u8>, CodecError> {
        let payload_value = match &self.payload {
            Some(p) => Value::Bytes(p.clone()),
            None => Value::Null,
        };

        let array = Value::Array(vec![
            Value::Bytes(self.protected_bytes.clone()),
            self.unprotected.to_cbor_map(),
            payload_value,
            Value::Bytes(self.signature.clone()),
        ]);

        let value = if tagged {
            Value::Tag(COSE_SIGN1_TAG, Box::new(array))
        } else {
            array
        };

        encode_cbor_value(&value)
    }

    /// Decode a `COSE_Sign1` from CBOR bytes, tagged or untagged.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: Value =
            ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;

        let array = match value {
            Value::Tag(tag, inner) => {
                if tag != COSE_SIGN1_TAG {
                    return Err(CodecError::Malformed(format!(
                        "unexpected CBOR tag {tag}, expected {COSE_SIGN1_TAG}"
                    )));
                }
                *inner
            }
            other => other,
        };

        let Value::Array(elements) = array else {
            return Err(CodecError::Malformed(
                "COSE_Sign1 is not a CBOR array".into(),
            ));
        };

        let [protected_v, unprotected_v, payload_v, signature_v] = elements.as_slice() else {
            return Err(CodecError::Malformed(format!(
                "COSE_Sign1 array has {} elements, expected 4",
                elements.len()
            )));
        };

        let Value::Bytes(protected_bytes) = protected_v else {
            return Err(CodecError::Malformed("protected header is not bstr".into()));
        };

        let protected_value: Value = ciborium::de::from_reader(protected_bytes.as_slice())
            .map_err(|e| CodecError::Decode(format!("protected header: {e}")))?;
        let protected = HeaderMap::from_cbor_map(&protected_value)
            .ok_or_else(|| CodecError::Malformed("protected header is not a map".into()))?;

        let unprotected = HeaderMap::from_cbor_map(unprotected_v)
            .ok_or_else(|| CodecError::Malformed("unprotected header is not a map".into()))?;

        let payload = match payload_v {
            Value::Bytes(b) => Some(b.clone()),
            Value::Null => None,
            _ => return Err(CodecError::Malformed("payload is not bstr/nil".into())),
        };

        let Value::Bytes(signature) = signature_v else {
            return Err(CodecError::Malformed("signature is not bstr".into()));
        };

        Ok(Self {
            protected_bytes: protected_bytes.clone(),
            protected,
            unprotected,
            payload,
            signature: signature.clone(),
        })
    }
}

/// Build the `Sig_structure` (RFC 9052 §4.4) for a `COSE_Sign1` with no
/// external AAD, and CBOR-encode it. This is exactly what gets hashed
/// and signed/verified.
pub fn sig_structure_bytes(protected_bytes: &[u8], payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let structure = Value::Array(vec![
        Value::Text("Signature1".to_string()),
        Value::Bytes(protected_bytes.to_vec()),
        Value::Bytes(Vec::new()),
        Value::Bytes(payload.to_vec()),
    ]);
    encode_cbor_value(&structure)
}

/// Encode an arbitrary `ciborium::Value` to bytes.
pub fn encode_cbor_value(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cose::key::EcdsaP256Signer;

    #[test]
    fn test_sign1_roundtrip_attached() {
        let signer = EcdsaP256Signer::generate();

        let mut protected = HeaderMap::new();
        protected.insert(label::ALG, Value::Integer((alg::ES256).into()));

        let sign1 =
            Sign1::new_signed(protected, HeaderMap::new(), b"hello".to_vec(), false, &signer)
                .unwrap();

        let encoded = sign1.encode(true).unwrap();
        let decoded = Sign1::decode(&encoded).unwrap();

        assert_eq!(decoded.payload.as_deref(), Some(b"hello".as_slice()));
        assert!(decoded.verify(&signer, None).unwrap());
    }

    #[test]
    fn test_sign1_roundtrip_untagged() {
        let signer = EcdsaP256Signer::generate();
        let mut protected = HeaderMap::new();
        protected.insert(label::ALG, Value::Integer((alg::ES256).into()));

        let sign1 =
            Sign1::new_signed(protected, HeaderMap::new(), b"x".to_vec(), false, &signer).unwrap();
        let encoded = sign1.encode(false).unwrap();
        let decoded = Sign1::decode(&encoded).unwrap();
        assert!(decoded.verify(&signer, None).unwrap());
    }

    #[test]
    fn test_sign1_detached_payload() {
        let signer = EcdsaP256Signer::generate();
        let mut protected = HeaderMap::new();
        protected.insert(label::ALG, Value::Integer((alg::ES256).into()));

        let sign1 = Sign1::new_signed(
            protected,
            HeaderMap::new(),
            b"secret-payload".to_vec(),
            true,
            &signer,
        )
        .unwrap();

        let encoded = sign1.encode(true).unwrap();
        let decoded = Sign1::decode(&encoded).unwrap();
        assert_eq!(decoded.payload, None);
        assert!(decoded
            .verify(&signer, Some(b"secret-payload"))
            .unwrap());
    }

    #[test]
    fn test_sign1_tampered_signature_fails() {
        let signer = EcdsaP256Signer::generate();
        let mut protected = HeaderMap::new();
        protected.insert(label::ALG, Value::Integer((alg::ES256).into()));

        let mut sign1 =
            Sign1::new_signed(protected, HeaderMap::new(), b"hello".to_vec(), false, &signer)
                .unwrap();
        sign1.signature[0] ^= 0xFF;

        assert!(!sign1.verify(&signer, None).unwrap());
    }

    #[test]
    fn test_decode_malformed_array_length() {
        let value = Value::Array(vec![Value::Bytes(vec![]), Value::Map(vec![])]);
        let bytes = encode_cbor_value(&value).unwrap();
        assert!(Sign1::decode(&bytes).is_err());
    }
}
