//! Certs command - Verify and print the signer certificates

use apkverify::{Apk, Certificate};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the certs command
#[derive(Args)]
pub struct CertsArgs {
    /// APK file
    #[arg(value_name = "APK")]
    pub apk: PathBuf,

    /// Print every certificate as PEM
    #[arg(long)]
    pub pem: bool,
}

/// One-line summary of a certificate
pub fn describe_certificate(cert: &Certificate) -> String {
    format!(
        "subject={} | issuer={} | serial={}",
        cert.subject(),
        cert.issuer(),
        cert.serial_hex()
    )
}

/// Execute the certs command
pub fn execute(args: CertsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let apk = Apk::open(&args.apk)?;
    let signers = apk.verify()?;

    for (signer_idx, signer) in signers.iter().enumerate() {
        println!("Signer #{} ({})", signer_idx + 1, signer.algorithm);
        for (idx, cert) in signer.certificates.iter().enumerate() {
            println!("  Certificate[{}]: {} bytes", idx, cert.der().len());
            println!("    Subject: {}", cert.subject());
            println!("    Issuer: {}", cert.issuer());
            println!("    Serial: {}", cert.serial_hex());
            println!("    SHA-256: {}", hex::encode(cert.sha256_fingerprint()));
            println!("    SHA-1: {}", hex::encode(cert.sha1_fingerprint()));
            println!("    MD5: {}", hex::encode(cert.md5_fingerprint()));
            if args.pem {
                let block = pem::Pem::new("CERTIFICATE", cert.der().to_vec());
                print!("{}", pem::encode(&block));
            }
        }
    }

    Ok(())
}
