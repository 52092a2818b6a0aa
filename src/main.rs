//! SCITT Log Engine — Demo Binary
//!
//! The CLI surface, HTTP/SCRAPI route layer and `.well-known` key
//! hosting are out of scope for this crate (§1); this binary is a
//! minimal smoke demo that exercises the registration → checkpoint →
//! receipt flow end to end against in-memory stores.
//!
//! Run modes:
//!   cargo run                 - Run the demo flow
//!   cargo run -- demo         - Same, explicit

use std::env;
use std::sync::Arc;

use scitt_log::blob::memory::MemoryBlobStore;
use scitt_log::blob::BlobStore;
use scitt_log::checkpoint::signer::Ed25519NoteSigner;
use scitt_log::common::logging;
use scitt_log::common::ServiceConfig;
use scitt_log::cose::envelope::{sign_envelope, EnvelopeOptions};
use scitt_log::cose::key::EcdsaP256Signer;
use scitt_log::metadata::sqlite::SqliteMetadataStore;
use scitt_log::metadata::MetadataStore;
use scitt_log::TransparencyService;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("demo") => run_demo().await,
        Some("help") | Some("--help") | Some("-h") => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("scitt-logd - SCITT transparency service log engine demo");
    println!();
    println!("Usage:");
    println!("  scitt-logd demo    Run the registration -> checkpoint -> receipt flow");
    println!();
    println!("Environment Variables:");
    println!("  SCITT_ORIGIN           Checkpoint origin URL");
    println!("  SCITT_DB_PATH          SQLite metadata database path (\":memory:\" allowed)");
    println!("  SCITT_SERVICE_KEY      Hex-encoded P-256 private scalar for ES256 signing");
    println!("  SCITT_LOG_LEVEL        Logging level");
    println!();
    println!("Note: the HTTP/SCRAPI surface, CLI surface and key hosting are not");
    println!("part of this crate; see SPEC_FULL.md for the core this implements.");
}

async fn run_demo() {
    let config = ServiceConfig::from_env().expect("configuration should always load");
    let _ = logging::init_from_config(&config);
    config.print_summary();

    let blob: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let metadata: Arc<dyn MetadataStore> = Arc::new(
        SqliteMetadataStore::new(&config.db_path).expect("metadata store should initialise"),
    );

    let service_signer = Arc::new(match &config.service_key_hex {
        Some(hex_key) => {
            EcdsaP256Signer::from_hex(hex_key).expect("SCITT_SERVICE_KEY must be a valid scalar")
        }
        None => EcdsaP256Signer::generate(),
    });
    let checkpoint_signer = Ed25519NoteSigner::generate(config.checkpoint_key_name.clone());

    let service = TransparencyService::new(
        config.origin.clone(),
        blob,
        metadata,
        service_signer.clone(),
        checkpoint_signer,
    );

    println!();
    println!("Service kid: {}", service_signer.kid_hex());

    let empty_checkpoint = service.checkpoint().await.expect("empty checkpoint");
    println!();
    println!("=== Empty log checkpoint ===");
    print!("{empty_checkpoint}");

    let issuer = EcdsaP256Signer::generate();
    for artifact in ["artifact-0", "artifact-1", "artifact-2"] {
        let sign1 = sign_envelope(artifact.as_bytes(), &EnvelopeOptions::default(), &issuer, None, false)
            .expect("envelope signing should succeed");
        let statement_bytes = sign1.encode(true).expect("encoding should succeed");

        let outcome = service
            .register(&statement_bytes)
            .await
            .expect("registration should succeed");

        println!();
        println!(
            "Registered {artifact} -> entry_id={} statement_hash={}",
            outcome.entry_id, outcome.statement_hash_hex
        );
        println!(
            "Receipt bytes: {}... ({} bytes)",
            hex::encode(&outcome.receipt_bytes[..8.min(outcome.receipt_bytes.len())]),
            outcome.receipt_bytes.len()
        );
    }

    let final_checkpoint = service.checkpoint().await.expect("checkpoint after registrations");
    println!();
    println!("=== Checkpoint after registrations ===");
    print!("{final_checkpoint}");
}
