//! End-to-end scenarios against a freshly assembled `TransparencyService`.
//!
//! Each test corresponds to one of the numbered scenarios in this
//! crate's specification: empty-log checkpoint, single registration,
//! inclusion proof at a non-trivial tree size, consistency between two
//! tree sizes, duplicate rejection, and the 256-entry tile boundary.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use scitt_log::blob::memory::MemoryBlobStore;
use scitt_log::blob::BlobStore;
use scitt_log::checkpoint::signer::Ed25519NoteSigner;
use scitt_log::cose::envelope::{sign_envelope, EnvelopeOptions};
use scitt_log::cose::key::EcdsaP256Signer;
use scitt_log::metadata::sqlite::SqliteMetadataStore;
use scitt_log::metadata::MetadataStore;
use scitt_log::proof;
use scitt_log::receipt;
use scitt_log::tile::hashing;
use scitt_log::tile::TileLog;
use scitt_log::TransparencyService;

const ORIGIN: &str = "https://transparency.example/log";

fn new_service() -> (TransparencyService, Arc<dyn BlobStore>) {
    let blob: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let metadata: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::in_memory().unwrap());
    let service_signer = Arc::new(EcdsaP256Signer::generate());
    let checkpoint_signer = Ed25519NoteSigner::generate("scitt-log");
    let service = TransparencyService::new(
        ORIGIN,
        blob.clone(),
        metadata,
        service_signer,
        checkpoint_signer,
    );
    (service, blob)
}

fn sign_statement(issuer: &EcdsaP256Signer, artifact: &[u8]) -> Vec<u8> {
    let sign1 = sign_envelope(artifact, &EnvelopeOptions::default(), issuer, None, false).unwrap();
    sign1.encode(true).unwrap()
}

/// Scenario 1: empty log checkpoint has tree_size 0 and root
/// `SHA-256("")`, whose base64 encoding is a fixed, well-known string.
#[tokio::test]
async fn scenario_1_empty_log_checkpoint() {
    let (service, _blob) = new_service();

    let note = service.checkpoint().await.unwrap();
    let parsed = scitt_log::checkpoint::parse_note(&note).unwrap();

    assert_eq!(parsed.checkpoint.origin, ORIGIN);
    assert_eq!(parsed.checkpoint.tree_size, 0);
    assert_eq!(parsed.checkpoint.root_hash, hashing::empty_root());
    assert_eq!(
        BASE64.encode(parsed.checkpoint.root_hash),
        "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
    );

    // Body text begins with the three canonical lines before any
    // signature lines.
    assert!(note.starts_with(&format!("{ORIGIN}\n0\n47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=\n")));
}

/// Scenario 2: a single statement round-trips through registration —
/// entry_id 0, a receipt whose inclusion proof is empty (tree of size
/// one has no siblings), and a checkpoint that advances to tree_size 1.
#[tokio::test]
async fn scenario_2_single_statement_round_trip() {
    let (service, _blob) = new_service();
    let issuer = EcdsaP256Signer::generate();

    let statement = sign_statement(&issuer, b"s_0 artifact bytes");
    let outcome = service.register(&statement).await.unwrap();
    assert_eq!(outcome.entry_id, 0);

    let decoded = receipt::decode_receipt(&outcome.receipt_bytes).unwrap();
    assert_eq!(decoded.proof.tree_size, 1);
    assert_eq!(decoded.proof.leaf_index, 0);
    assert!(decoded.proof.path.is_empty());

    let leaf = hashing::leaf_hash(&sha256(&statement));
    assert_eq!(decoded.root_hash, leaf);

    let note = service.checkpoint().await.unwrap();
    let parsed = scitt_log::checkpoint::parse_note(&note).unwrap();
    assert_eq!(parsed.checkpoint.tree_size, 1);
    assert_eq!(parsed.checkpoint.root_hash, leaf);
}

/// Scenario 3: five statements registered in order; the inclusion proof
/// for `s_2` (entry_id 2) at tree size 5 has the expected three-element
/// shape: `[leaf(s_3), node(leaf(s_0), leaf(s_1)), leaf(s_4)]`.
#[tokio::test]
async fn scenario_3_inclusion_proof_shape_at_five_entries() {
    let (service, _blob) = new_service();
    let issuer = EcdsaP256Signer::generate();

    let mut leaves = Vec::new();
    for i in 0..5u64 {
        let statement = sign_statement(&issuer, format!("s_{i}").as_bytes());
        leaves.push(hashing::leaf_hash(&sha256(&statement)));
        service.register(&statement).await.unwrap();
    }

    let (tree_size, path) = service.inclusion_proof(2).await.unwrap();
    assert_eq!(tree_size, 5);

    let expected = vec![
        leaves[3],
        hashing::node_hash(&leaves[0], &leaves[1]),
        leaves[4],
    ];
    assert_eq!(path, expected);

    let root = hashing::mth_from_leaf_hashes(&leaves);
    assert!(proof::verify_inclusion(2, 5, &leaves[2], &path, &root));
}

/// Scenario 4: consistency between tree sizes 3 and 7 verifies against
/// the roots at those two sizes.
#[tokio::test]
async fn scenario_4_consistency_between_three_and_seven() {
    let (service, _blob) = new_service();
    let issuer = EcdsaP256Signer::generate();

    let mut leaves = Vec::new();
    for i in 0..7u64 {
        let statement = sign_statement(&issuer, format!("s_{i}").as_bytes());
        leaves.push(hashing::leaf_hash(&sha256(&statement)));
        service.register(&statement).await.unwrap();
    }

    let old_root = hashing::mth_from_leaf_hashes(&leaves[..3]);
    let (new_size, consistency) = service.consistency_proof(3).await.unwrap();
    assert_eq!(new_size, 7);

    let new_root = hashing::mth_from_leaf_hashes(&leaves);
    assert!(proof::verify_consistency(3, 7, &old_root, &new_root, &consistency));
}

/// Scenario 5: re-submitting the same statement bytes is rejected with
/// `DuplicateStatement` naming the original `entry_id`, and the tree
/// does not grow.
#[tokio::test]
async fn scenario_5_duplicate_rejection() {
    let (service, _blob) = new_service();
    let issuer = EcdsaP256Signer::generate();

    let mut last_entry_id = None;
    for i in 0..3u64 {
        let statement = sign_statement(&issuer, format!("s_{i}").as_bytes());
        let outcome = service.register(&statement).await.unwrap();
        last_entry_id = Some((outcome.entry_id, statement));
    }
    let (s2_entry_id, s2_bytes) = last_entry_id.unwrap();
    assert_eq!(s2_entry_id, 2);

    let note_before = service.checkpoint().await.unwrap();
    let tree_size_before = scitt_log::checkpoint::parse_note(&note_before)
        .unwrap()
        .checkpoint
        .tree_size;

    let err = service.register(&s2_bytes).await.unwrap_err();
    match err {
        scitt_log::ScittError::DuplicateStatement { entry_id } => {
            assert_eq!(entry_id, s2_entry_id);
        }
        other => panic!("expected DuplicateStatement, got {other:?}"),
    }

    let note_after = service.checkpoint().await.unwrap();
    let tree_size_after = scitt_log::checkpoint::parse_note(&note_after)
        .unwrap()
        .checkpoint
        .tree_size;
    assert_eq!(tree_size_before, tree_size_after);
}

/// Scenario 6: registering 257 statements completes the first entry
/// tile (256 leaves, exactly 8,192 bytes) and starts a second, partial,
/// one-entry tile (exactly 32 bytes). See DESIGN.md's "entry tiles vs.
/// level-0 hash tiles" note for why this crate addresses these as
/// `tile/entries/000` / `tile/entries/001` rather than the
/// specification's own (internally inconsistent) literal path example.
#[tokio::test]
async fn scenario_6_tile_boundary_at_257_entries() {
    let (service, blob) = new_service();
    let issuer = EcdsaP256Signer::generate();

    let mut last_statement_hash = None;
    for i in 0..257u64 {
        let statement = sign_statement(&issuer, format!("s_{i}").as_bytes());
        last_statement_hash = Some(sha256(&statement));
        service.register(&statement).await.unwrap();
    }

    let full_tile = blob.get("tile/entries/000").await.unwrap().unwrap();
    assert_eq!(full_tile.len(), 8_192);

    let partial_full_bytes = service.tile_bytes(None, 1, None).await.unwrap().unwrap();
    assert_eq!(partial_full_bytes.len(), 32);

    let partial_view = service.tile_bytes(None, 1, Some(1)).await.unwrap().unwrap();
    assert_eq!(partial_view.len(), 32);
    assert_eq!(partial_view, partial_full_bytes);

    let expected_257th_leaf = hashing::leaf_hash(&last_statement_hash.unwrap());
    assert_eq!(&partial_view[..32], expected_257th_leaf.as_slice());

    let (path_256, offset_256) = TileLog::entry_tile_key_for(256);
    assert_eq!(path_256, "tile/entries/001");
    assert_eq!(offset_256, 0, "entry 256 is offset 0 of the second entry tile");
}

fn sha256(bytes: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    Sha256::digest(bytes).to_vec()
}
