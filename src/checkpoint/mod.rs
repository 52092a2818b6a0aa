//! Checkpoint Engine
//!
//! Signed Tree Head issuance in the *signed-note* format (§4.F): a body
//! of `origin` / `tree_size` / `base64(root_hash)` lines, a blank
//! separator, then one or more `— <key_name> <base64_blob>` signature
//! lines. The engine reads `current_tree_size`, asks the tile log for
//! the root at that size, and produces a freshly signed note; it does
//! not decide *when* a checkpoint is issued (that is left to the
//! caller — "on demand" per §4.F).

pub mod signer;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;

pub use signer::{key_hint, NoteSigner, NoteVerifier};

/// Checkpoint errors.
#[derive(Debug, Error, PartialEq)]
pub enum CheckpointError {
    #[error("malformed signed note: {0}")]
    Malformed(String),

    #[error("no signature line found for key {0}")]
    SignatureNotFound(String),

    #[error("signature verification failed")]
    VerificationFailed,
}

pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

/// The unsigned checkpoint body: origin, tree size, and root hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub origin: String,
    pub tree_size: u64,
    pub root_hash: [u8; 32],
    /// Extra `key=value` lines permitted by §3's checkpoint format,
    /// e.g. a timestamp. Empty for the minimal three-line body.
    pub extra_lines: Vec<String>,
}

impl Checkpoint {
    pub fn new(origin: impl Into<String>, tree_size: u64, root_hash: [u8; 32]) -> Self {
        Self {
            origin: origin.into(),
            tree_size,
            root_hash,
            extra_lines: Vec::new(),
        }
    }

    /// The exact bytes that get signed: the body lines, each
    /// newline-terminated, with no trailing separator blank line.
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut body = format!(
            "{}\n{}\n{}\n",
            self.origin,
            self.tree_size,
            BASE64.encode(self.root_hash)
        );
        for line in &self.extra_lines {
            body.push_str(line);
            body.push('\n');
        }
        body.into_bytes()
    }
}

/// Sign `checkpoint` with one or more [`NoteSigner`]s, producing the
/// full signed-note text.
pub fn sign_checkpoint(checkpoint: &Checkpoint, signers: &[&dyn NoteSigner]) -> String {
    let body = checkpoint.body_bytes();
    let mut note = String::from_utf8(body.clone()).expect("checkpoint body is valid UTF-8");
    note.push('\n');

    for signer in signers {
        let sig = signer.sign(&body);
        let hint = key_hint(
            signer.key_name(),
            signer.algorithm_id(),
            &signer.public_key_bytes(),
        );
        let mut blob = hint.to_vec();
        blob.extend_from_slice(&sig);
        note.push_str(&format!("\u{2014} {} {}\n", signer.key_name(), BASE64.encode(blob)));
    }

    note
}

/// A parsed signed note: the checkpoint body plus its raw signature
/// lines (key name, blob bytes), not yet matched against any verifier.
#[derive(Debug, Clone)]
pub struct ParsedNote {
    pub checkpoint: Checkpoint,
    pub signatures: Vec<(String, Vec<u8>)>,
}

/// Parse a signed-note text into its checkpoint body and signature lines.
pub fn parse_note(note: &str) -> CheckpointResult<ParsedNote> {
    let mut lines = note.lines();

    let origin = lines
        .next()
        .ok_or_else(|| CheckpointError::Malformed("missing origin line".into()))?
        .to_string();
    let tree_size_line = lines
        .next()
        .ok_or_else(|| CheckpointError::Malformed("missing tree_size line".into()))?;
    let tree_size: u64 = tree_size_line
        .parse()
        .map_err(|_| CheckpointError::Malformed(format!("invalid tree_size: {tree_size_line}")))?;
    let root_hash_line = lines
        .next()
        .ok_or_else(|| CheckpointError::Malformed("missing root_hash line".into()))?;
    let root_hash_bytes = BASE64
        .decode(root_hash_line)
        .map_err(|e| CheckpointError::Malformed(format!("invalid root_hash base64: {e}")))?;
    let root_hash: [u8; 32] = root_hash_bytes
        .try_into()
        .map_err(|_| CheckpointError::Malformed("root_hash is not 32 bytes".into()))?;

    let mut extra_lines = Vec::new();
    let mut signatures = Vec::new();
    let mut in_signatures = false;

    for line in lines {
        if line.is_empty() {
            in_signatures = true;
            continue;
        }
        if !in_signatures {
            extra_lines.push(line.to_string());
            continue;
        }
        let rest = line
            .strip_prefix("\u{2014} ")
            .ok_or_else(|| CheckpointError::Malformed(format!("malformed signature line: {line}")))?;
        let (key_name, b64_blob) = rest
            .split_once(' ')
            .ok_or_else(|| CheckpointError::Malformed(format!("malformed signature line: {line}")))?;
        let blob = BASE64
            .decode(b64_blob)
            .map_err(|e| CheckpointError::Malformed(format!("invalid signature base64: {e}")))?;
        signatures.push((key_name.to_string(), blob));
    }

    Ok(ParsedNote {
        checkpoint: Checkpoint {
            origin,
            tree_size,
            root_hash,
            extra_lines,
        },
        signatures,
    })
}

/// Verify a parsed note's signature against `verifier`, matching by key
/// hint rather than by key name alone (the hint binds name + algorithm
/// + public key together).
pub fn verify_note(note: &ParsedNote, verifier: &dyn NoteVerifier) -> CheckpointResult<bool> {
    let expected_hint = key_hint(
        verifier.key_name(),
        verifier.algorithm_id(),
        &verifier.public_key_bytes(),
    );
    let body = note.checkpoint.body_bytes();

    for (_name, blob) in &note.signatures {
        if blob.len() < 4 {
            continue;
        }
        let (hint, sig) = blob.split_at(4);
        if hint == expected_hint {
            return Ok(verifier.verify(&body, sig));
        }
    }

    Err(CheckpointError::SignatureNotFound(
        verifier.key_name().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use signer::Ed25519NoteSigner;

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let signer = Ed25519NoteSigner::generate("scitt-log");
        let verifier = signer.verifier();

        let checkpoint = Checkpoint::new("https://log.example", 5, [0x11; 32]);
        let note = sign_checkpoint(&checkpoint, &[&signer]);

        let parsed = parse_note(&note).unwrap();
        assert_eq!(parsed.checkpoint, checkpoint);
        assert!(verify_note(&parsed, &verifier).unwrap());
    }

    #[test]
    fn test_empty_tree_checkpoint() {
        use sha2::{Digest, Sha256};
        let empty_root: [u8; 32] = Sha256::digest([]).into();
        let checkpoint = Checkpoint::new("https://log.example", 0, empty_root);
        assert_eq!(
            BASE64.encode(checkpoint.root_hash),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_tampered_body_fails_verification() {
        let signer = Ed25519NoteSigner::generate("scitt-log");
        let verifier = signer.verifier();

        let checkpoint = Checkpoint::new("https://log.example", 5, [0x11; 32]);
        let note = sign_checkpoint(&checkpoint, &[&signer]);
        let mut parsed = parse_note(&note).unwrap();
        parsed.checkpoint.tree_size = 6;

        assert!(!verify_note(&parsed, &verifier).unwrap());
    }

    #[test]
    fn test_verify_wrong_key_not_found() {
        let signer = Ed25519NoteSigner::generate("scitt-log");
        let other = Ed25519NoteSigner::generate("other-log").verifier();

        let checkpoint = Checkpoint::new("https://log.example", 1, [0x22; 32]);
        let note = sign_checkpoint(&checkpoint, &[&signer]);
        let parsed = parse_note(&note).unwrap();

        assert_eq!(
            verify_note(&parsed, &other),
            Err(CheckpointError::SignatureNotFound("other-log".to_string()))
        );
    }

    #[test]
    fn test_multiple_signers() {
        let ed = Ed25519NoteSigner::generate("primary");
        let ecdsa = signer::EcdsaP256NoteSigner::generate("secondary");

        let checkpoint = Checkpoint::new("https://log.example", 2, [0x33; 32]);
        let note = sign_checkpoint(&checkpoint, &[&ed, &ecdsa]);
        let parsed = parse_note(&note).unwrap();

        assert!(verify_note(&parsed, &ed.verifier()).unwrap());
        assert!(verify_note(&parsed, &ecdsa.verifier()).unwrap());
    }
}
