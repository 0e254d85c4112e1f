//! Command-line interface for apkverify

use clap::{ArgAction, Parser, Subcommand};

pub mod certs;
pub mod digest;
pub mod info;
pub mod verify;

/// APK Signature Scheme v2 verification tool
#[derive(Parser)]
#[command(name = "apkverify")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Verify the v2 signature of an APK
    Verify(verify::VerifyArgs),

    /// Display ZIP sections and signing block layout
    Info(info::InfoArgs),

    /// Calculate the v2 content digest
    Digest(digest::DigestArgs),

    /// Verify and print the signer certificates
    Certs(certs::CertsArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Install the logger according to `--verbose`
    pub fn init_logger(&self) {
        let level = match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
            .format_timestamp(None)
            .init();
    }

    /// Execute command
    pub fn execute(self) -> Result<(), Box<dyn std::error::Error>> {
        match self.command {
            Commands::Verify(args) => verify::execute(args),
            Commands::Info(args) => info::execute(args),
            Commands::Digest(args) => digest::execute(args),
            Commands::Certs(args) => certs::execute(args),
        }
    }
}
