//! Registrar
//!
//! The end-to-end registration transaction (§4.G): decode the signed
//! statement, hash it, append a leaf to the tile log, persist statement
//! metadata, advance the tree size, then construct and sign a receipt.
//! The registrar is the crate's single writer: it exclusively owns
//! `current_tree_size`, the rightmost tile at every level, and the
//! `statements` table (Design Note "Single writer but many readers").
//! All other components hold read-only references to the same stores.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::blob::BlobStore;
use crate::common::error::{Result as ScittResult, ScittError};
use crate::cose::envelope::extract_cwt_claims;
use crate::cose::{label, Sign1};
use crate::metadata::{MetadataError, MetadataStore, NewStatement, TreeStateRow};
use crate::proof;
use crate::receipt;
use crate::tile::{hashing, TileLog};

/// Result of a successful `register` call.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub entry_id: u64,
    pub statement_hash_hex: String,
    pub receipt_bytes: Vec<u8>,
}

/// A service signer usable both for the ES256 receipt signature and for
/// deriving the service `kid` that appears in receipts.
pub trait ReceiptSigner: crate::cose::Signer {
    fn kid_hex(&self) -> String;
}

impl ReceiptSigner for crate::cose::key::EcdsaP256Signer {
    fn kid_hex(&self) -> String {
        crate::cose::key::EcdsaP256Signer::kid_hex(self)
    }
}

/// The registration transaction, holding the single-writer lock that
/// serialises `register` calls so exactly one advances
/// `current_tree_size` at a time. Readers (proof/checkpoint/receipt
/// lookups) never take this lock.
pub struct Registrar<S: ReceiptSigner> {
    metadata: Arc<dyn MetadataStore>,
    tiles: TileLog,
    write_lock: Mutex<()>,
    signer: Arc<S>,
}

impl<S: ReceiptSigner> Registrar<S> {
    pub fn new(blob: Arc<dyn BlobStore>, metadata: Arc<dyn MetadataStore>, signer: Arc<S>) -> Self {
        Self {
            metadata,
            tiles: TileLog::new(blob),
            write_lock: Mutex::new(()),
            signer,
        }
    }

    /// Register a signed statement, returning its assigned entry_id,
    /// statement hash and a freshly-signed receipt.
    ///
    /// Either this call fails and the log is unchanged, or it succeeds
    /// and the statement is immutably present (§7's propagation policy):
    /// every step other than the tile write is part of the metadata
    /// store's atomic commit, and the tile write alone, if left
    /// unfollowed by a commit, is inert because `current_tree_size`
    /// never advances to expose it.
    pub async fn register(&self, statement_bytes: &[u8]) -> ScittResult<RegistrationOutcome> {
        let sign1 = Sign1::decode(statement_bytes)
            .map_err(|e| ScittError::invalid_input(format!("malformed signed statement: {e}")))?;

        let payload_hash_alg = sign1
            .protected
            .get_int(label::PAYLOAD_HASH_ALG)
            .ok_or_else(|| ScittError::invalid_input("missing payload_hash_alg"))?;
        let payload_hash = sign1
            .payload
            .clone()
            .ok_or_else(|| ScittError::invalid_input("missing or detached payload"))?;

        let statement_hash = Sha256::digest(statement_bytes);
        let statement_hash_hex = hex::encode(statement_hash);

        let cwt_claims = extract_cwt_claims(&sign1);
        let cty = sign1.protected.get_text(label::CTY).map(str::to_string);
        let preimage_content_type = sign1
            .protected
            .get_text(label::PAYLOAD_PREIMAGE_CONTENT_TYPE)
            .map(str::to_string);
        let payload_location = sign1
            .protected
            .get_text(label::PAYLOAD_LOCATION)
            .map(str::to_string);

        let _guard = self.write_lock.lock().await;

        let entry_id = self.metadata.current_tree_size().await?;
        let leaf_hash = hashing::leaf_hash(&statement_hash);
        self.tiles.append_leaf(entry_id, leaf_hash).await?;

        let (entry_tile_key, entry_tile_offset) = TileLog::entry_tile_key_for(entry_id);

        let new_statement = NewStatement {
            statement_hash: statement_hash_hex.clone(),
            iss: cwt_claims.as_ref().and_then(|c| c.iss.clone()),
            sub: cwt_claims.as_ref().and_then(|c| c.sub.clone()),
            cty,
            typ: None,
            payload_hash_alg,
            payload_hash: hex::encode(&payload_hash),
            preimage_content_type,
            payload_location,
            tree_size_at_registration: entry_id,
            entry_tile_key,
            entry_tile_offset,
        };

        match self.metadata.insert_statement(new_statement).await {
            Ok(_row) => {}
            Err(MetadataError::Duplicate { entry_id, .. }) => {
                return Err(ScittError::DuplicateStatement { entry_id });
            }
            Err(e) => return Err(e.into()),
        }

        let new_tree_size = entry_id + 1;
        let root = self.tiles.root_at(new_tree_size).await?;

        self.metadata
            .insert_tree_state(TreeStateRow {
                tree_size: new_tree_size,
                root_hash: hex::encode(root),
                checkpoint_storage_key: None,
                checkpoint_signed_note: None,
                updated_at: now_unix(),
            })
            .await?;

        drop(_guard);

        let leaves = self.tiles.leaf_hashes_upto(new_tree_size).await?;
        let path = proof::inclusion_path(entry_id, &leaves)?;

        let receipt_bytes = receipt::build_receipt(
            entry_id,
            new_tree_size,
            &path,
            &root,
            &self.signer.kid_hex(),
            self.signer.as_ref(),
        )
        .map_err(|e| ScittError::signer_failure(e.to_string()))?;

        Ok(RegistrationOutcome {
            entry_id,
            statement_hash_hex,
            receipt_bytes,
        })
    }

    /// Re-issue a receipt for an already-registered `entry_id` against
    /// the current tree size. Per §4.H, this is permitted and produces
    /// a different receipt (different root, different path) each time
    /// the tree grows; callers compare inclusion, not byte-equality.
    pub async fn get_receipt(&self, entry_id: u64) -> ScittResult<Vec<u8>> {
        let tree_size = self.metadata.current_tree_size().await?;
        if entry_id >= tree_size {
            return Err(ScittError::not_found(format!(
                "entry_id {entry_id} not yet in tree of size {tree_size}"
            )));
        }

        let leaves = self.tiles.leaf_hashes_upto(tree_size).await?;
        let root = hashing::mth_from_leaf_hashes(&leaves);
        let path = proof::inclusion_path(entry_id, &leaves)?;

        receipt::build_receipt(
            entry_id,
            tree_size,
            &path,
            &root,
            &self.signer.kid_hex(),
            self.signer.as_ref(),
        )
        .map_err(|e| ScittError::signer_failure(e.to_string()))
    }
}

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
