//! Digest command - Calculate the v2 content digest

use apkverify::{Apk, ContentDigestAlgorithm};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the digest command
#[derive(Args)]
pub struct DigestArgs {
    /// APK file
    #[arg(value_name = "APK")]
    pub apk: PathBuf,

    /// Use CHUNKED_SHA256 (default)
    #[arg(long = "sha256", group = "algorithm")]
    pub sha256: bool,

    /// Use CHUNKED_SHA512
    #[arg(long = "sha512", group = "algorithm")]
    pub sha512: bool,

    /// Output format: hex (default) or base64
    #[arg(long = "format", value_name = "FORMAT", default_value = "hex")]
    pub format: OutputFormat,
}

/// Output format for digest
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Hexadecimal output
    #[default]
    Hex,
    /// Base64 output
    Base64,
}

/// Execute the digest command
pub fn execute(args: DigestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let apk = Apk::open(&args.apk)?;

    let algorithm = if args.sha512 {
        ContentDigestAlgorithm::ChunkedSha512
    } else {
        ContentDigestAlgorithm::ChunkedSha256
    };

    eprintln!("File: {}", apk.path().display());
    match apk.signing_block_location() {
        Ok(location) => eprintln!(
            "Signing block: {} bytes at {}",
            location.size_including_footers, location.offset
        ),
        Err(_) => eprintln!("Signing block: none"),
    }
    eprintln!("Algorithm: {}", algorithm);

    let digest = apk.content_digest(algorithm)?;

    let output = match args.format {
        OutputFormat::Hex => hex::encode(&digest),
        OutputFormat::Base64 => base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            &digest,
        ),
    };

    // stdout only carries the digest, for piping
    println!("{}", output);

    Ok(())
}
