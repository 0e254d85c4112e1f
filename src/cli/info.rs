//! Info command - Display ZIP sections and signing block layout

use apkverify::signing_block::block_id_name;
use apkverify::{Apk, VerifyError};
use clap::Args;
use std::path::PathBuf;

/// Arguments for displaying APK layout information
#[derive(Args)]
pub struct InfoArgs {
    /// APK file path
    #[arg(value_name = "APK")]
    pub apk: PathBuf,
}

/// Execute the info command
pub fn execute(args: InfoArgs) -> Result<(), Box<dyn std::error::Error>> {
    let apk = Apk::open(&args.apk)?;

    println!("File: {}", apk.path().display());
    println!("File size: {} bytes", apk.len());
    println!();

    let sections = apk.sections()?;
    println!("ZIP sections:");
    println!(
        "  Central Directory: {} ({} bytes)",
        sections.cd_offset, sections.cd_size
    );
    println!(
        "  End of Central Directory: {} ({} bytes)",
        sections.eocd_offset, sections.eocd_size
    );
    println!();

    let location = match apk.signing_block_location() {
        Ok(location) => location,
        Err(VerifyError::SigningBlockMissing(reason)) => {
            println!("ℹ No APK Signing Block: {}", reason);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    println!("✓ APK Signing Block found");
    println!(
        "  Location: {} - {}",
        location.offset,
        location.offset + location.size_including_footers
    );
    println!("  Size: {} bytes", location.size_including_footers);
    println!();

    println!("Signing block contents:");
    for (id, size) in apk.signing_block_pairs()? {
        println!("  • {:#010x} {} ({} bytes)", id, block_id_name(id), size);
    }

    Ok(())
}
