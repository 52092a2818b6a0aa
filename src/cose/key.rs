//! COSE_Key Import/Export and the RFC 9679 Key Thumbprint
//!
//! Implements the EC2/P-256 COSE_Key convention (§4.B), a COSE_Key Set,
//! a JWK interchange form, PEM import for private keys, and the RFC 9679
//! thumbprint used as the service `kid`. Also provides the concrete
//! ES256 [`super::Signer`]/[`super::Verifier`] implementations backed by
//! `p256`.

use ciborium::Value;
use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use ecdsa::signature::SignatureEncoding;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use thiserror::Error;

use super::{alg, CodecError, Signer, Verifier};

/// COSE key type: EC2 (RFC 9053 §7.1).
pub const KTY_EC2: i64 = 2;
/// COSE elliptic curve: P-256 (RFC 9053 §7.1).
pub const CRV_P256: i64 = 1;

const LABEL_KTY: i64 = 1;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_D: i64 = -4;
const LABEL_KID: i64 = 2;

/// Key errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("malformed COSE_Key: {0}")]
    Malformed(String),

    #[error("unsupported key type/curve")]
    Unsupported,

    #[error("invalid coordinate length, expected 32 bytes")]
    InvalidCoordinate,

    #[error("PEM decode error: {0}")]
    Pem(String),

    #[error("base64 decode error: {0}")]
    Base64(String),
}

/// An EC2 P-256 COSE_Key: the public coordinates plus an optional
/// private scalar `d`.
#[derive(Clone)]
pub struct CoseEc2Key {
    pub x: [u8; 32],
    pub y: [u8; 32],
    pub d: Option<[u8; 32]>,
}

impl CoseEc2Key {
    /// Build from a `p256::ecdsa::VerifyingKey`.
    pub fn from_verifying_key(vk: &VerifyingKey) -> Self {
        let point = vk.to_encoded_point(false);
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(point.x().expect("uncompressed point has x"));
        y.copy_from_slice(point.y().expect("uncompressed point has y"));
        Self { x, y, d: None }
    }

    /// Build from a `p256::ecdsa::SigningKey`, carrying the private scalar.
    pub fn from_signing_key(sk: &SigningKey) -> Self {
        let vk = VerifyingKey::from(sk);
        let mut key = Self::from_verifying_key(&vk);
        let mut d = [0u8; 32];
        d.copy_from_slice(&sk.to_bytes());
        key.d = Some(d);
        key
    }

    /// Recover the `p256::ecdsa::SigningKey`, if `d` is present.
    pub fn to_signing_key(&self) -> Result<SigningKey, KeyError> {
        let d = self.d.ok_or(KeyError::Malformed("no private key material".into()))?;
        SigningKey::from_bytes((&d).into()).map_err(|e| KeyError::Malformed(e.to_string()))
    }

    /// Recover the `p256::ecdsa::VerifyingKey`.
    pub fn to_verifying_key(&self) -> Result<VerifyingKey, KeyError> {
        let encoded = p256::EncodedPoint::from_affine_coordinates(
            (&self.x).into(),
            (&self.y).into(),
            false,
        );
        VerifyingKey::from_encoded_point(&encoded).map_err(|_| KeyError::InvalidCoordinate)
    }

    /// Encode as a CBOR `COSE_Key` map (public fields only, plus `d` when present).
    pub fn to_cbor(&self) -> Value {
        let mut pairs = vec![
            (Value::Integer(LABEL_KTY.into()), Value::Integer(KTY_EC2.into())),
            (Value::Integer(LABEL_CRV.into()), Value::Integer(CRV_P256.into())),
            (Value::Integer(LABEL_X.into()), Value::Bytes(self.x.to_vec())),
            (Value::Integer(LABEL_Y.into()), Value::Bytes(self.y.to_vec())),
        ];
        if let Some(d) = &self.d {
            pairs.push((Value::Integer(LABEL_D.into()), Value::Bytes(d.to_vec())));
        }
        Value::Map(pairs)
    }

    /// Decode from a CBOR `COSE_Key` map.
    pub fn from_cbor(value: &Value) -> Result<Self, KeyError> {
        let Value::Map(pairs) = value else {
            return Err(KeyError::Malformed("COSE_Key is not a map".into()));
        };

        let mut kty = None;
        let mut crv = None;
        let mut x = None;
        let mut y = None;
        let mut d = None;

        for (k, v) in pairs {
            let Value::Integer(label) = k else { continue };
            let label: i64 = (*label).try_into().map_err(|_| KeyError::Malformed("label overflow".into()))?;
            match label {
                l if l == LABEL_KTY => {
                    if let Value::Integer(i) = v {
                        kty = i64::try_from(*i).ok();
                    }
                }
                l if l == LABEL_CRV => {
                    if let Value::Integer(i) = v {
                        crv = i64::try_from(*i).ok();
                    }
                }
                l if l == LABEL_X => {
                    if let Value::Bytes(b) = v {
                        x = Some(b.clone());
                    }
                }
                l if l == LABEL_Y => {
                    if let Value::Bytes(b) = v {
                        y = Some(b.clone());
                    }
                }
                l if l == LABEL_D => {
                    if let Value::Bytes(b) = v {
                        d = Some(b.clone());
                    }
                }
                _ => {}
            }
        }

        if kty != Some(KTY_EC2) || crv != Some(CRV_P256) {
            return Err(KeyError::Unsupported);
        }

        let x = fixed32(x.ok_or_else(|| KeyError::Malformed("missing x".into()))?)?;
        let y = fixed32(y.ok_or_else(|| KeyError::Malformed("missing y".into()))?)?;
        let d = d.map(fixed32).transpose()?;

        Ok(Self { x, y, d })
    }

    /// RFC 9679 COSE_Key thumbprint: SHA-256 over the canonical CBOR
    /// encoding of the required EC2 fields (`kty`, `crv`, `x`, `y`)
    /// only, lowercase-hex encoded. This is the service `kid`; it is
    /// never read back from a stored key file (Open Question, resolved
    /// in DESIGN.md).
    pub fn thumbprint_hex(&self) -> String {
        use sha2::{Digest, Sha256};

        // Canonical CBOR key ordering (RFC 8949 §4.2.1) for these four
        // single-byte-initial-byte integer keys is simply ascending by
        // value: kty(1) < crv(-1 encodes 0x20) < x(-2 encodes 0x21) <
        // y(-3 encodes 0x22), since -1..-3 map to major type 1 with
        // values 0,1,2 respectively, all sorting after major type 0's
        // value 1. We therefore build the map in that fixed order.
        let canonical = Value::Map(vec![
            (Value::Integer(LABEL_KTY.into()), Value::Integer(KTY_EC2.into())),
            (Value::Integer(LABEL_CRV.into()), Value::Integer(CRV_P256.into())),
            (Value::Integer(LABEL_X.into()), Value::Bytes(self.x.to_vec())),
            (Value::Integer(LABEL_Y.into()), Value::Bytes(self.y.to_vec())),
        ]);

        let bytes = super::encode_cbor_value(&canonical).expect("canonical encode never fails");
        let digest = Sha256::digest(&bytes);
        hex::encode(digest)
    }
}

fn fixed32(v: Vec<u8>) -> Result<[u8; 32], KeyError> {
    if v.len() != 32 {
        return Err(KeyError::InvalidCoordinate);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&v);
    Ok(out)
}

/// A COSE_Key Set: a CBOR array of COSE_Key maps.
pub struct CoseKeySet(pub Vec<CoseEc2Key>);

impl CoseKeySet {
    pub fn to_cbor(&self) -> Value {
        Value::Array(self.0.iter().map(CoseEc2Key::to_cbor).collect())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        super::encode_cbor_value(&self.to_cbor())
    }

    pub fn from_cbor(value: &Value) -> Result<Self, KeyError> {
        let Value::Array(items) = value else {
            return Err(KeyError::Malformed("COSE_Key Set is not an array".into()));
        };
        let keys = items
            .iter()
            .map(CoseEc2Key::from_cbor)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(keys))
    }
}

/// A JWK (RFC 7517) interchange representation of a P-256 EC2 key.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl CoseEc2Key {
    /// Export as a JWK.
    pub fn to_jwk(&self) -> Jwk {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        Jwk {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x: URL_SAFE_NO_PAD.encode(self.x),
            y: URL_SAFE_NO_PAD.encode(self.y),
            d: self.d.map(|d| URL_SAFE_NO_PAD.encode(d)),
        }
    }

    /// Import from a JWK.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyError> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        if jwk.kty != "EC" || jwk.crv != "P-256" {
            return Err(KeyError::Unsupported);
        }

        let x = fixed32(
            URL_SAFE_NO_PAD
                .decode(&jwk.x)
                .map_err(|e| KeyError::Base64(e.to_string()))?,
        )?;
        let y = fixed32(
            URL_SAFE_NO_PAD
                .decode(&jwk.y)
                .map_err(|e| KeyError::Base64(e.to_string()))?,
        )?;
        let d = jwk
            .d
            .as_ref()
            .map(|d| {
                URL_SAFE_NO_PAD
                    .decode(d)
                    .map_err(|e| KeyError::Base64(e.to_string()))
                    .and_then(fixed32)
            })
            .transpose()?;

        Ok(Self { x, y, d })
    }

    /// Import a private key from PKCS#8 PEM.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, KeyError> {
        use p256::pkcs8::DecodePrivateKey;
        let sk = SigningKey::from_pkcs8_pem(pem).map_err(|e| KeyError::Pem(e.to_string()))?;
        Ok(Self::from_signing_key(&sk))
    }

    /// Import a public key from SPKI PEM.
    pub fn from_spki_pem(pem: &str) -> Result<Self, KeyError> {
        use p256::pkcs8::DecodePublicKey;
        let vk = VerifyingKey::from_public_key_pem(pem).map_err(|e| KeyError::Pem(e.to_string()))?;
        Ok(Self::from_verifying_key(&vk))
    }
}

/// Suppress the unused-`LABEL_KID`/`from_cbor` warning path: kept for
/// forward compatibility with kid-bearing key files, even though the
/// normative `kid` is always the RFC 9679 thumbprint (never read back
/// from storage).
#[allow(dead_code)]
const _: i64 = LABEL_KID;

/// ES256 signer backed by a `p256::ecdsa::SigningKey`.
pub struct EcdsaP256Signer {
    signing_key: SigningKey,
}

impl EcdsaP256Signer {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Construct from a hex-encoded 32-byte private scalar.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str).map_err(|e| KeyError::Malformed(e.to_string()))?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|e| KeyError::Malformed(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Construct from an already-parsed [`CoseEc2Key`] carrying `d`.
    pub fn from_cose_key(key: &CoseEc2Key) -> Result<Self, KeyError> {
        Ok(Self {
            signing_key: key.to_signing_key()?,
        })
    }

    /// The public COSE_Key for this signer, including the RFC 9679 `kid`.
    pub fn public_cose_key(&self) -> CoseEc2Key {
        CoseEc2Key::from_signing_key(&self.signing_key)
    }

    /// RFC 9679 thumbprint of the public key (the service `kid`).
    pub fn kid_hex(&self) -> String {
        let mut pub_key = self.public_cose_key();
        pub_key.d = None;
        pub_key.thumbprint_hex()
    }

    /// A [`Verifier`] matching this signer's public key.
    pub fn verifier(&self) -> EcdsaP256Verifier {
        EcdsaP256Verifier {
            verifying_key: VerifyingKey::from(&self.signing_key),
        }
    }
}

impl Signer for EcdsaP256Signer {
    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        use sha2::Sha256;
        let digest = {
            use sha2::Digest;
            Sha256::digest(bytes)
        };
        let signature: Signature = self
            .signing_key
            .sign_prehash(digest.as_slice())
            .map_err(|e| CodecError::Signer(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }

    fn alg(&self) -> i64 {
        alg::ES256
    }
}

/// ES256 verifier backed by a `p256::ecdsa::VerifyingKey`.
pub struct EcdsaP256Verifier {
    verifying_key: VerifyingKey,
}

impl EcdsaP256Verifier {
    pub fn from_cose_key(key: &CoseEc2Key) -> Result<Self, KeyError> {
        Ok(Self {
            verifying_key: key.to_verifying_key()?,
        })
    }
}

impl Verifier for EcdsaP256Verifier {
    fn verify(&self, bytes: &[u8], sig: &[u8]) -> bool {
        use sha2::Sha256;
        let digest = {
            use sha2::Digest;
            Sha256::digest(bytes)
        };
        let Ok(signature) = Signature::from_slice(sig) else {
            return false;
        };
        self.verifying_key
            .verify_prehash(digest.as_slice(), &signature)
            .is_ok()
    }

    fn alg(&self) -> i64 {
        alg::ES256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cose_key_cbor_roundtrip() {
        let signer = EcdsaP256Signer::generate();
        let key = signer.public_cose_key();
        let cbor = key.to_cbor();
        let decoded = CoseEc2Key::from_cbor(&cbor).unwrap();
        assert_eq!(decoded.x, key.x);
        assert_eq!(decoded.y, key.y);
    }

    #[test]
    fn test_jwk_roundtrip() {
        let signer = EcdsaP256Signer::generate();
        let key = signer.public_cose_key();
        let jwk = key.to_jwk();
        let decoded = CoseEc2Key::from_jwk(&jwk).unwrap();
        assert_eq!(decoded.x, key.x);
        assert_eq!(decoded.y, key.y);
    }

    #[test]
    fn test_thumbprint_is_64_hex_chars() {
        let signer = EcdsaP256Signer::generate();
        let kid = signer.kid_hex();
        assert_eq!(kid.len(), 64);
        assert!(kid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_thumbprint_deterministic() {
        let signer = EcdsaP256Signer::generate();
        assert_eq!(signer.kid_hex(), signer.kid_hex());
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let signer = EcdsaP256Signer::generate();
        let verifier = signer.verifier();
        let sig = signer.sign(b"message").unwrap();
        assert!(verifier.verify(b"message", &sig));
        assert!(!verifier.verify(b"other", &sig));
    }

    #[test]
    fn test_key_set_roundtrip() {
        let a = EcdsaP256Signer::generate().public_cose_key();
        let b = EcdsaP256Signer::generate().public_cose_key();
        let set = CoseKeySet(vec![a, b]);
        let bytes = set.to_bytes().unwrap();
        let value: Value = ciborium::de::from_reader(bytes.as_slice()).unwrap();
        let decoded = CoseKeySet::from_cbor(&value).unwrap();
        assert_eq!(decoded.0.len(), 2);
    }
}
