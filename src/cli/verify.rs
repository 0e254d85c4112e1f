//! Verify command - Verify the v2 signature and content digests

use apkverify::{Apk, VerifierConfig};
use clap::Args;
use std::path::PathBuf;

use super::certs::describe_certificate;

/// Arguments for the verify command
#[derive(Args)]
pub struct VerifyArgs {
    /// APK file to verify
    #[arg(value_name = "APK")]
    pub apk: PathBuf,

    /// Reject blocks with more signers than this
    #[arg(long = "max-signers", default_value_t = apkverify::verifier::DEFAULT_MAX_SIGNERS)]
    pub max_signers: usize,

    /// Required SHA-256 of the first signer's certificate (hex)
    #[arg(long = "expect-cert-sha256", value_name = "HEX", value_parser = parse_sha256)]
    pub expect_cert_sha256: Option<[u8; 32]>,
}

/// Parse a hex SHA-256 fingerprint, colons allowed
pub fn parse_sha256(s: &str) -> Result<[u8; 32], String> {
    let cleaned: String = s.chars().filter(|c| *c != ':').collect();
    let bytes = hex::decode(cleaned).map_err(|e| format!("invalid hex: {}", e))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}

/// Execute the verify command
pub fn execute(args: VerifyArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying APK Signature Scheme v2...");
    println!("File: {}", args.apk.display());
    println!();

    let apk = Apk::open(&args.apk)?;
    let config = VerifierConfig {
        max_signers: args.max_signers,
        expected_leaf_sha256: args.expect_cert_sha256,
    };

    match apk.verify_with(&config) {
        Ok(signers) => {
            println!("✓ Verified");
            println!("Signers: {}", signers.len());
            for (idx, signer) in signers.iter().enumerate() {
                println!();
                println!("Signer #{}", idx + 1);
                println!("  Algorithm: {}", signer.algorithm);
                println!("  Certificates: {}", signer.certificates.len());
                if let Some(leaf) = signer.leaf() {
                    println!("  Leaf: {}", describe_certificate(leaf));
                }
            }
            Ok(())
        }
        Err(e) => {
            println!("✗ Verification failed");
            Err(e.into())
        }
    }
}
