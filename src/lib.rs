//! # APK Signature Scheme v2 verifier
//! This library locates the APK Signing Block of a ZIP-based package,
//! verifies its v2 signers and returns their certificate chains.
//!
//! ```no_run
//! let apk = apkverify::Apk::open("app.apk")?;
//! for signer in apk.verify()? {
//!     println!("{} ({} certificate(s))", signer.algorithm, signer.certificates.len());
//! }
//! # Ok::<(), apkverify::VerifyError>(())
//! ```
//!
//! CLI usage:
//! ```shell
//! cargo install apkverify
//! apkverify verify <filename>
//! ```
//!

#![deny(
    missing_docs,
    clippy::all,
    clippy::missing_docs_in_private_items,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    // clippy::arithmetic_side_effects,
    // clippy::pedantic,
    clippy::nursery
)]
#![warn(clippy::multiple_crate_versions)]

pub mod apk;
pub mod common;
pub mod error;
pub mod signing_block;
pub mod utils;
pub mod verifier;
pub mod zip;

// re-export
pub use apk::Apk;
pub use common::{collect_certificates, Certificate};
pub use error::{Result, VerifyError};
pub use signing_block::algorithms::{ContentDigestAlgorithm, SignatureAlgorithm, STRENGTH_RANKING};
pub use signing_block::digest::{compute_content_digests, DigestSections, CHUNK_SIZE};
pub use signing_block::scheme_v2::{SignedData, SignerRecord, SIGNATURE_SCHEME_V2_BLOCK_ID};
pub use signing_block::{ApkSigningBlockLocation, MAGIC, MAGIC_LEN};
pub use utils::ByteWindow;
pub use verifier::{verify_bytes, verify_bytes_with, ApkVerifier, VerifiedSigner, VerifierConfig};
pub use zip::ZipSections;
