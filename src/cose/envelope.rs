//! Hash Envelope
//!
//! A hash envelope is the COSE payload convention at the heart of SCITT:
//! the payload is a hash of the real artifact, not the artifact itself,
//! letting the log register arbitrarily large artifacts at constant
//! service cost. Implements one logical model
//! ([`HashEnvelopeParams`]/[`HashAlg`]) with two serialisers: to
//! protected-header labels (sign time) and back (verify time), per
//! Design Note "Hash-envelope dual representation".

use ciborium::Value;
use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;

use super::labels::label;
use super::{alg, CodecError, HeaderMap, Signer, Sign1, Verifier};

/// Supported hash algorithms for the envelope's `payload_hash_alg`
/// (COSE label 258), using the COSE algorithm identifiers for the hash
/// functions themselves (RFC 9053 §2, negative values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    pub const SHA256_ID: i64 = -16;
    pub const SHA384_ID: i64 = -43;
    pub const SHA512_ID: i64 = -44;

    pub fn cose_id(self) -> i64 {
        match self {
            HashAlg::Sha256 => Self::SHA256_ID,
            HashAlg::Sha384 => Self::SHA384_ID,
            HashAlg::Sha512 => Self::SHA512_ID,
        }
    }

    pub fn from_cose_id(id: i64) -> Option<Self> {
        match id {
            Self::SHA256_ID => Some(HashAlg::Sha256),
            Self::SHA384_ID => Some(HashAlg::Sha384),
            Self::SHA512_ID => Some(HashAlg::Sha512),
            _ => None,
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }

    pub fn digest(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            HashAlg::Sha256 => Sha256::digest(bytes).to_vec(),
            HashAlg::Sha384 => Sha384::digest(bytes).to_vec(),
            HashAlg::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

/// Envelope creation options.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeOptions {
    pub content_type: Option<String>,
    pub location: Option<String>,
    pub hash_alg: Option<HashAlg>,
}

/// The logical hash-envelope object, used both at sign time (built from
/// the artifact) and at verify time (read back from COSE headers).
#[derive(Debug, Clone)]
pub struct HashEnvelopeParams {
    pub hash_alg: HashAlg,
    pub digest: Vec<u8>,
    pub content_type: Option<String>,
    pub location: Option<String>,
}

/// Envelope errors.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("missing payload_hash_alg header")]
    MissingHashAlg,

    #[error("unsupported hash algorithm {0}")]
    UnsupportedHashAlg(i64),

    #[error("payload absent and not supplied externally")]
    MissingPayload,

    #[error("payload length {actual} does not match advertised hash algorithm (expected {expected})")]
    PayloadLengthMismatch { expected: usize, actual: usize },
}

/// Compute the hash envelope parameters for `artifact_bytes`.
pub fn create_envelope(artifact_bytes: &[u8], opts: &EnvelopeOptions) -> HashEnvelopeParams {
    let hash_alg = opts.hash_alg.unwrap_or(HashAlg::Sha256);
    HashEnvelopeParams {
        digest: hash_alg.digest(artifact_bytes),
        hash_alg,
        content_type: opts.content_type.clone(),
        location: opts.location.clone(),
    }
}

/// CWT claims carried in the protected header (label 15): issuer and
/// subject, per the statement's signed-identity convention.
#[derive(Debug, Clone, Default)]
pub struct CwtClaims {
    pub iss: Option<String>,
    pub sub: Option<String>,
}

impl CwtClaims {
    fn to_cbor(&self) -> Value {
        let mut pairs = Vec::new();
        if let Some(iss) = &self.iss {
            pairs.push((
                Value::Integer(label::CWT_ISS.into()),
                Value::Text(iss.clone()),
            ));
        }
        if let Some(sub) = &self.sub {
            pairs.push((
                Value::Integer(label::CWT_SUB.into()),
                Value::Text(sub.clone()),
            ));
        }
        Value::Map(pairs)
    }

    fn from_cbor(value: &Value) -> Self {
        let Value::Map(pairs) = value else {
            return Self::default();
        };
        let mut claims = Self::default();
        for (k, v) in pairs {
            let Value::Integer(label) = k else { continue };
            let Ok(label) = i64::try_from(*label) else { continue };
            if label == label::CWT_ISS {
                if let Value::Text(s) = v {
                    claims.iss = Some(s.clone());
                }
            } else if label == label::CWT_SUB {
                if let Value::Text(s) = v {
                    claims.sub = Some(s.clone());
                }
            }
        }
        claims
    }
}

/// Build and sign a `COSE_Sign1` hash-envelope signed statement over
/// `artifact_bytes`.
#[allow(clippy::too_many_arguments)]
pub fn sign_envelope(
    artifact_bytes: &[u8],
    opts: &EnvelopeOptions,
    signer: &dyn Signer,
    cwt_claims: Option<&CwtClaims>,
    detached: bool,
) -> Result<Sign1, EnvelopeError> {
    let envelope = create_envelope(artifact_bytes, opts);

    let mut protected = HeaderMap::new();
    protected.insert(label::ALG, Value::Integer(signer.alg().into()));
    protected.insert(
        label::PAYLOAD_HASH_ALG,
        Value::Integer(envelope.hash_alg.cose_id().into()),
    );

    if let Some(cty) = &envelope.content_type {
        protected.insert(label::CTY, Value::Text(cty.clone()));
    }
    if let Some(cty) = &opts.content_type {
        protected.insert(
            label::PAYLOAD_PREIMAGE_CONTENT_TYPE,
            Value::Text(cty.clone()),
        );
    }
    if let Some(location) = &envelope.location {
        protected.insert(label::PAYLOAD_LOCATION, Value::Text(location.clone()));
    }
    if let Some(claims) = cwt_claims {
        protected.insert(label::CWT_CLAIMS, claims.to_cbor());
    }

    let sign1 = Sign1::new_signed(
        protected,
        HeaderMap::new(),
        envelope.digest,
        detached,
        signer,
    )?;

    Ok(sign1)
}

/// Result of verifying a hash-envelope signed statement: the two checks
/// are reported independently per §4.B.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeVerification {
    pub signature_valid: bool,
    pub hash_valid: bool,
}

/// Verify a signed hash envelope against the original `artifact` bytes.
pub fn verify_envelope(
    sign1: &Sign1,
    artifact: &[u8],
    verifier: &dyn Verifier,
) -> Result<EnvelopeVerification, EnvelopeError> {
    let envelope = extract_envelope_params(sign1)?;

    let signature_valid = sign1.verify(verifier, None).unwrap_or(false);
    let hash_valid = envelope.hash_alg.digest(artifact) == envelope.digest;

    Ok(EnvelopeVerification {
        signature_valid,
        hash_valid,
    })
}

/// Read the hash-envelope parameters back out of a decoded `Sign1`'s
/// protected headers and payload.
pub fn extract_envelope_params(sign1: &Sign1) -> Result<HashEnvelopeParams, EnvelopeError> {
    let hash_alg_id = sign1
        .protected
        .get_int(label::PAYLOAD_HASH_ALG)
        .ok_or(EnvelopeError::MissingHashAlg)?;
    let hash_alg =
        HashAlg::from_cose_id(hash_alg_id).ok_or(EnvelopeError::UnsupportedHashAlg(hash_alg_id))?;

    let digest = sign1
        .payload
        .clone()
        .ok_or(EnvelopeError::MissingPayload)?;

    if digest.len() != hash_alg.digest_len() {
        return Err(EnvelopeError::PayloadLengthMismatch {
            expected: hash_alg.digest_len(),
            actual: digest.len(),
        });
    }

    let content_type = sign1.protected.get_text(label::CTY).map(str::to_string);
    let location = sign1
        .protected
        .get_text(label::PAYLOAD_LOCATION)
        .map(str::to_string);

    Ok(HashEnvelopeParams {
        hash_alg,
        digest,
        content_type,
        location,
    })
}

/// Read the CWT claims (`iss`/`sub`) back out of a decoded `Sign1`, if present.
pub fn extract_cwt_claims(sign1: &Sign1) -> Option<CwtClaims> {
    sign1
        .protected
        .get_map(label::CWT_CLAIMS)
        .map(CwtClaims::from_cbor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cose::key::EcdsaP256Signer;

    #[test]
    fn test_sign_and_verify_envelope() {
        let signer = EcdsaP256Signer::generate();
        let verifier = signer.verifier();

        let opts = EnvelopeOptions {
            content_type: Some("application/octet-stream".into()),
            ..Default::default()
        };

        let claims = CwtClaims {
            iss: Some("issuer.example".into()),
            sub: Some("artifact-1".into()),
        };

        let sign1 = sign_envelope(b"hello", &opts, &signer, Some(&claims), false).unwrap();

        let verification = verify_envelope(&sign1, b"hello", &verifier).unwrap();
        assert!(verification.signature_valid);
        assert!(verification.hash_valid);

        let extracted = extract_cwt_claims(&sign1).unwrap();
        assert_eq!(extracted.iss.as_deref(), Some("issuer.example"));
        assert_eq!(extracted.sub.as_deref(), Some("artifact-1"));
    }

    #[test]
    fn test_verify_wrong_artifact_fails_hash_check() {
        let signer = EcdsaP256Signer::generate();
        let verifier = signer.verifier();
        let opts = EnvelopeOptions::default();

        let sign1 = sign_envelope(b"hello", &opts, &signer, None, false).unwrap();
        let verification = verify_envelope(&sign1, b"goodbye", &verifier).unwrap();

        assert!(verification.signature_valid);
        assert!(!verification.hash_valid);
    }

    #[test]
    fn test_extract_fails_without_hash_alg() {
        let signer = EcdsaP256Signer::generate();
        let mut protected = HeaderMap::new();
        protected.insert(label::ALG, Value::Integer(signer.alg().into()));
        let sign1 =
            Sign1::new_signed(protected, HeaderMap::new(), b"not-a-hash".to_vec(), false, &signer)
                .unwrap();

        assert!(matches!(
            extract_envelope_params(&sign1),
            Err(EnvelopeError::MissingHashAlg)
        ));
    }

    #[test]
    fn test_detached_envelope() {
        let signer = EcdsaP256Signer::generate();
        let verifier = signer.verifier();
        let opts = EnvelopeOptions::default();

        let sign1 = sign_envelope(b"hello", &opts, &signer, None, true).unwrap();
        assert_eq!(sign1.payload, None);

        // extract_envelope_params reads the payload directly, so it
        // cannot recover a detached digest without the caller supplying
        // it out of band; verification however can still check the
        // signature against the external payload.
        assert!(sign1.verify(&verifier, Some(&HashAlg::Sha256.digest(b"hello"))).unwrap());
    }
}
