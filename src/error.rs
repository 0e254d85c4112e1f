//! Error taxonomy of the verification pipeline.
//!
//! Every stage fails closed: the first error aborts verification and no
//! partial result is returned. None of these errors is transient, so a
//! caller should treat any of them as a permanent rejection of the package.

use thiserror::Error;

use crate::signing_block::algorithms::ContentDigestAlgorithm;

/// Convenience alias used throughout the crate
pub type Result<T, E = VerifyError> = std::result::Result<T, E>;

/// Reasons a package fails v2 verification
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The byte source could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No consistent End of Central Directory, a broken Central Directory
    /// position, or a ZIP64 archive
    #[error("ZIP format error: {0}")]
    ZipFormat(String),

    /// No APK Signing Block before the Central Directory, or no v2 block inside it
    #[error("APK Signature Scheme v2 block missing: {0}")]
    SigningBlockMissing(String),

    /// A length-prefixed field is malformed, or the signers are inconsistent
    #[error("malformed v2 signer: {0}")]
    SignerParse(String),

    /// The v2 block declares no signer
    #[error("no signers found in the v2 block")]
    NoSignersFound,

    /// A signer offers no signature algorithm this crate can verify
    #[error("no supported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature over the signed data does not verify
    #[error("signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    /// The recomputed content digest differs from the signed one
    #[error("{algorithm} content digest mismatch")]
    DigestMismatch {
        /// Content digest algorithm whose value differs
        algorithm: ContentDigestAlgorithm,
    },

    /// The leaf certificate does not carry the signer's public key
    #[error("public key mismatch: {0}")]
    PublicKeyMismatch(String),

    /// A certificate is not valid DER X.509
    #[error("certificate decode error: {0}")]
    CertificateDecode(String),
}

impl VerifyError {
    /// Stable numeric code for this failure, suitable for an install error report.
    ///
    /// Codes never change meaning between releases; `0` is never returned.
    pub const fn install_error_code(&self) -> u32 {
        match self {
            Self::Io(_) => 1,
            Self::ZipFormat(_) => 2,
            Self::SigningBlockMissing(_) => 3,
            Self::SignerParse(_) => 4,
            Self::NoSignersFound => 5,
            Self::UnsupportedAlgorithm(_) => 6,
            Self::SignatureVerificationFailed(_) => 7,
            Self::DigestMismatch { .. } => 8,
            Self::PublicKeyMismatch(_) => 9,
            Self::CertificateDecode(_) => 10,
        }
    }
}
