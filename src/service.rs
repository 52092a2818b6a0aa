//! Service Facade
//!
//! Wires the blob store, metadata store, tile log, registrar,
//! checkpoint engine and receipt engine into the single object a
//! collaborator (HTTP layer, CLI) needs to drive the transparency
//! service. Everything below `TransparencyService` is read-only except
//! through [`Registrar::register`] (§9 "Single writer but many
//! readers").

use std::sync::Arc;

use ciborium::Value;

use crate::blob::BlobStore;
use crate::checkpoint::signer::{Ed25519NoteSigner, NoteSigner};
use crate::checkpoint::{self, Checkpoint};
use crate::common::error::{Result as ScittResult, ScittError};
use crate::cose::key::{CoseKeySet, EcdsaP256Signer};
use crate::cose::encode_cbor_value;
use crate::metadata::MetadataStore;
use crate::proof;
use crate::registrar::{Registrar, RegistrationOutcome};
use crate::tile::{hashing, TileLog};

/// The assembled transparency service: owns the registrar (the single
/// writer) and exposes read paths directly over the same stores.
pub struct TransparencyService {
    origin: String,
    metadata: Arc<dyn MetadataStore>,
    tiles: TileLog,
    registrar: Registrar<EcdsaP256Signer>,
    service_signer: Arc<EcdsaP256Signer>,
    checkpoint_signer: Ed25519NoteSigner,
}

impl TransparencyService {
    pub fn new(
        origin: impl Into<String>,
        blob: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        service_signer: Arc<EcdsaP256Signer>,
        checkpoint_signer: Ed25519NoteSigner,
    ) -> Self {
        let registrar = Registrar::new(blob.clone(), metadata.clone(), service_signer.clone());
        Self {
            origin: origin.into(),
            metadata,
            tiles: TileLog::new(blob),
            registrar,
            service_signer,
            checkpoint_signer,
        }
    }

    /// Register a signed statement. The one write path in the service.
    pub async fn register(&self, statement_bytes: &[u8]) -> ScittResult<RegistrationOutcome> {
        self.registrar.register(statement_bytes).await
    }

    /// Re-issue a receipt for an already-admitted entry at the current
    /// tree size.
    pub async fn get_receipt(&self, entry_id: u64) -> ScittResult<Vec<u8>> {
        self.registrar.get_receipt(entry_id).await
    }

    /// Construct and sign a checkpoint reflecting `current_tree_size` at
    /// the moment of the call.
    pub async fn checkpoint(&self) -> ScittResult<String> {
        let tree_size = self.metadata.current_tree_size().await?;
        let root = self.tiles.root_at(tree_size).await?;
        let checkpoint = Checkpoint::new(self.origin.clone(), tree_size, root);
        let signers: [&dyn NoteSigner; 1] = [&self.checkpoint_signer];
        Ok(checkpoint::sign_checkpoint(&checkpoint, &signers))
    }

    /// Produce an inclusion proof for `entry_id` against the current
    /// tree size.
    pub async fn inclusion_proof(&self, entry_id: u64) -> ScittResult<(u64, Vec<[u8; 32]>)> {
        let tree_size = self.metadata.current_tree_size().await?;
        let leaves = self.tiles.leaf_hashes_upto(tree_size).await?;
        let path = proof::inclusion_path(entry_id, &leaves)?;
        Ok((tree_size, path))
    }

    /// Produce a consistency proof between `old_size` and the current
    /// tree size.
    pub async fn consistency_proof(&self, old_size: u64) -> ScittResult<(u64, Vec<[u8; 32]>)> {
        let new_size = self.metadata.current_tree_size().await?;
        let leaves = self.tiles.leaf_hashes_upto(new_size).await?;
        let proof = proof::consistency_proof(old_size, new_size, &leaves)?;
        Ok((new_size, proof))
    }

    /// Audit path: recompute the current root directly from statement
    /// hashes in the metadata store, bypassing the tile store entirely.
    /// Must always agree with the tile-incremental root (§4.D, §9 Open
    /// Question: the tile-incremental path is authoritative, this is a
    /// check, not an alternate API).
    pub async fn recompute_root_from_metadata(&self) -> ScittResult<[u8; 32]> {
        let tree_size = self.metadata.current_tree_size().await?;
        let hashes = self.metadata.list_statement_hashes(tree_size).await?;
        let statement_hashes: Vec<Vec<u8>> = hashes
            .iter()
            .map(|h| hex::decode(h).unwrap_or_default())
            .collect();
        Ok(hashing::mth_from_statement_hashes(&statement_hashes))
    }

    /// Raw tile bytes for external tile-serving, verbatim from the blob
    /// store (§6).
    pub async fn tile_bytes(
        &self,
        level: Option<u32>,
        tile_index: u64,
        partial_width: Option<u8>,
    ) -> ScittResult<Option<Vec<u8>>> {
        Ok(self.tiles.get_tile_bytes(level, tile_index, partial_width).await?)
    }

    /// `.well-known/scitt-keys`: the service's active public keys as a
    /// CBOR COSE_Key Set (§6).
    pub fn well_known_keys(&self) -> ScittResult<Vec<u8>> {
        let mut public_key = self.service_signer.public_cose_key();
        public_key.d = None;
        let set = CoseKeySet(vec![public_key]);
        set.to_bytes().map_err(|e| ScittError::invalid_input(e.to_string()))
    }

    /// Service configuration CBOR map (§6): supported algorithms, hash
    /// algorithms, registration policy, and the log's origin.
    pub fn service_configuration(&self) -> ScittResult<Vec<u8>> {
        let map = Value::Map(vec![
            (
                Value::Text("supported_algorithms".into()),
                Value::Array(vec![Value::Text("ES256".into())]),
            ),
            (
                Value::Text("supported_hash_algorithms".into()),
                Value::Array(vec![Value::Text("SHA-256".into())]),
            ),
            (
                Value::Text("registration_policy".into()),
                Value::Map(vec![(Value::Text("type".into()), Value::Text("open".into()))]),
            ),
            (Value::Text("issuer".into()), Value::Text(self.origin.clone())),
        ]);
        encode_cbor_value(&map).map_err(|e| ScittError::invalid_input(e.to_string()))
    }
}
