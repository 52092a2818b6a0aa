//! Signed-Note Signers
//!
//! The checkpoint engine signs over raw body bytes, not a COSE
//! `Sig_structure`, so it uses its own small signer abstraction rather
//! than [`crate::cose::Signer`]. Ed25519 is the default per §4.F; ECDSA
//! P-256 is supported for verifiers that expect it.

use ed25519_dalek::{
    Signature as Ed25519Signature, Signer as Ed25519SignerTrait, SigningKey as Ed25519SigningKey,
    Verifier as Ed25519VerifierTrait, VerifyingKey as Ed25519VerifyingKey,
};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::signature::SignatureEncoding;
use p256::ecdsa::{Signature as EcdsaSignature, SigningKey as EcdsaSigningKey, VerifyingKey as EcdsaVerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

/// Signed-note algorithm identifier byte, embedded in the key hint
/// alongside the key name and public key bytes (Design Note
/// "Signed-note key hint").
pub mod note_alg {
    pub const ED25519: u8 = 1;
    pub const ECDSA_P256: u8 = 2;
}

/// A capability that can produce signed-note signature lines.
pub trait NoteSigner {
    fn key_name(&self) -> &str;
    fn algorithm_id(&self) -> u8;
    fn public_key_bytes(&self) -> Vec<u8>;
    fn sign(&self, body: &[u8]) -> Vec<u8>;
}

/// The inverse of [`NoteSigner`], used to check a signature line against
/// a known public key.
pub trait NoteVerifier {
    fn key_name(&self) -> &str;
    fn algorithm_id(&self) -> u8;
    fn public_key_bytes(&self) -> Vec<u8>;
    fn verify(&self, body: &[u8], sig: &[u8]) -> bool;
}

/// The 4-byte key hint prefixing a signature blob: `SHA-256(key_name ‖
/// 0x0A ‖ algorithm_id ‖ public_key_bytes)[0:4]`. Without this prefix
/// the note is unverifiable by the standard verifier.
pub fn key_hint(key_name: &str, algorithm_id: u8, public_key_bytes: &[u8]) -> [u8; 4] {
    let mut hasher = Sha256::new();
    hasher.update(key_name.as_bytes());
    hasher.update([0x0A]);
    hasher.update([algorithm_id]);
    hasher.update(public_key_bytes);
    let digest = hasher.finalize();
    let mut hint = [0u8; 4];
    hint.copy_from_slice(&digest[..4]);
    hint
}

/// Ed25519 signed-note signer (the engine's default).
pub struct Ed25519NoteSigner {
    key_name: String,
    signing_key: Ed25519SigningKey,
}

impl Ed25519NoteSigner {
    pub fn generate(key_name: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            signing_key: Ed25519SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(key_name: impl Into<String>, seed: &[u8; 32]) -> Self {
        Self {
            key_name: key_name.into(),
            signing_key: Ed25519SigningKey::from_bytes(seed),
        }
    }

    pub fn verifier(&self) -> Ed25519NoteVerifier {
        Ed25519NoteVerifier {
            key_name: self.key_name.clone(),
            verifying_key: self.signing_key.verifying_key(),
        }
    }
}

impl NoteSigner for Ed25519NoteSigner {
    fn key_name(&self) -> &str {
        &self.key_name
    }

    fn algorithm_id(&self) -> u8 {
        note_alg::ED25519
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_bytes().to_vec()
    }

    fn sign(&self, body: &[u8]) -> Vec<u8> {
        let sig: Ed25519Signature = self.signing_key.sign(body);
        sig.to_bytes().to_vec()
    }
}

/// Verifier matching [`Ed25519NoteSigner`].
pub struct Ed25519NoteVerifier {
    key_name: String,
    verifying_key: Ed25519VerifyingKey,
}

impl NoteVerifier for Ed25519NoteVerifier {
    fn key_name(&self) -> &str {
        &self.key_name
    }

    fn algorithm_id(&self) -> u8 {
        note_alg::ED25519
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.verifying_key.to_bytes().to_vec()
    }

    fn verify(&self, body: &[u8], sig: &[u8]) -> bool {
        let Ok(sig_bytes) = <[u8; 64]>::try_from(sig) else {
            return false;
        };
        let signature = Ed25519Signature::from_bytes(&sig_bytes);
        self.verifying_key.verify(body, &signature).is_ok()
    }
}

/// ECDSA P-256 signed-note signer, for verifiers that expect ECDSA over
/// Ed25519.
pub struct EcdsaP256NoteSigner {
    key_name: String,
    signing_key: EcdsaSigningKey,
}

impl EcdsaP256NoteSigner {
    pub fn generate(key_name: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            signing_key: EcdsaSigningKey::random(&mut OsRng),
        }
    }

    pub fn verifier(&self) -> EcdsaP256NoteVerifier {
        EcdsaP256NoteVerifier {
            key_name: self.key_name.clone(),
            verifying_key: EcdsaVerifyingKey::from(&self.signing_key),
        }
    }

    fn public_point_bytes(vk: &EcdsaVerifyingKey) -> Vec<u8> {
        use p256::elliptic_curve::sec1::ToEncodedPoint;
        vk.to_encoded_point(false).as_bytes().to_vec()
    }
}

impl NoteSigner for EcdsaP256NoteSigner {
    fn key_name(&self) -> &str {
        &self.key_name
    }

    fn algorithm_id(&self) -> u8 {
        note_alg::ECDSA_P256
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        Self::public_point_bytes(&EcdsaVerifyingKey::from(&self.signing_key))
    }

    fn sign(&self, body: &[u8]) -> Vec<u8> {
        let digest = Sha256::digest(body);
        let signature: EcdsaSignature = self
            .signing_key
            .sign_prehash(digest.as_slice())
            .expect("prehash signing over a fixed-size digest cannot fail");
        signature.to_bytes().to_vec()
    }
}

/// Verifier matching [`EcdsaP256NoteSigner`].
pub struct EcdsaP256NoteVerifier {
    key_name: String,
    verifying_key: EcdsaVerifyingKey,
}

impl NoteVerifier for EcdsaP256NoteVerifier {
    fn key_name(&self) -> &str {
        &self.key_name
    }

    fn algorithm_id(&self) -> u8 {
        note_alg::ECDSA_P256
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        EcdsaP256NoteSigner::public_point_bytes(&self.verifying_key)
    }

    fn verify(&self, body: &[u8], sig: &[u8]) -> bool {
        let digest = Sha256::digest(body);
        let Ok(signature) = EcdsaSignature::from_slice(sig) else {
            return false;
        };
        self.verifying_key
            .verify_prehash(digest.as_slice(), &signature)
            .is_ok()
    }
}
