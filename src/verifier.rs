//! APK Signature Scheme v2 verification
//!
//! Runs the whole pipeline over the bytes of one package:
//! ZIP tail, APK Signing Block, v2 signers, signatures, certificates and
//! finally the content digests. The first failure aborts the run.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::common::{collect_certificates, Certificate};
use crate::error::{Result, VerifyError};
use crate::signing_block::algorithms::{ContentDigestAlgorithm, SignatureAlgorithm};
use crate::signing_block::digest::{verify_content_digests, DigestSections};
use crate::signing_block::scheme_v2::{parse_signers, SignedData, SignerRecord};
use crate::signing_block::{find_signing_block, find_v2_block};
use crate::zip::zip_sections;

/// Default limit on the number of signers in a v2 block
pub const DEFAULT_MAX_SIGNERS: usize = 10;

/// Settings of a verification run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Reject blocks declaring more signers than this
    pub max_signers: usize,

    /// SHA-256 the first signer's leaf certificate must have
    pub expected_leaf_sha256: Option<[u8; 32]>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_signers: DEFAULT_MAX_SIGNERS,
            expected_leaf_sha256: None,
        }
    }
}

/// A signer whose signature, certificates and digests all checked out
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct VerifiedSigner {
    /// Algorithm of the signature that was verified
    pub algorithm: SignatureAlgorithm,

    /// Certificate chain, leaf first
    pub certificates: Vec<Certificate>,
}

impl VerifiedSigner {
    /// Leaf certificate, the one carrying the signer's key
    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificates.first()
    }
}

/// v2 verifier
#[derive(Debug, Clone, Default)]
pub struct ApkVerifier {
    /// Settings
    config: VerifierConfig,
}

impl ApkVerifier {
    /// Create a verifier with the given settings
    pub const fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Settings of this verifier
    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify the v2 signature of the package held in `data`.
    ///
    /// Returns one entry per signer, in block order.
    ///
    /// # Errors
    /// Returns the [`VerifyError`] of the first stage that fails.
    pub fn verify(&self, data: &[u8]) -> Result<Vec<VerifiedSigner>> {
        let zip = zip_sections(data)?;
        let (location, block) = find_signing_block(data, &zip)?;
        let v2_block = find_v2_block(block)?;
        let signers = parse_signers(v2_block, self.config.max_signers)?;
        debug!("{} signer(s) in the v2 block", signers.len());

        let mut verified = Vec::with_capacity(signers.len());
        let mut content_digests: BTreeMap<ContentDigestAlgorithm, Vec<u8>> = BTreeMap::new();
        let mut digest_ids: Option<BTreeSet<u32>> = None;

        for (idx, signer) in signers.iter().enumerate() {
            let (verified_signer, signed_data) =
                verify_signer(signer).inspect_err(|e| warn!("signer #{} rejected: {}", idx + 1, e))?;

            let ids: BTreeSet<u32> = signed_data.digest_algorithm_ids().into_iter().collect();
            if let Some(first) = &digest_ids {
                if *first != ids {
                    return Err(VerifyError::SignerParse(format!(
                        "signer #{} lists different digest algorithms than signer #1",
                        idx + 1
                    )));
                }
            } else {
                digest_ids = Some(ids);
            }

            let algorithm = verified_signer.algorithm;
            let content_algorithm = algorithm.content_digest_algorithm().ok_or_else(|| {
                VerifyError::UnsupportedAlgorithm(format!("no content digest for {}", algorithm))
            })?;
            let digest = signed_data.digest_for(algorithm.id()).ok_or_else(|| {
                VerifyError::SignerParse(format!("signer #{}: no digest for {}", idx + 1, algorithm))
            })?;
            match content_digests.get(&content_algorithm) {
                Some(previous) if previous.as_slice() != digest => {
                    return Err(VerifyError::SignerParse(format!(
                        "signer #{}: {} digest differs from a previous signer",
                        idx + 1,
                        content_algorithm
                    )));
                }
                Some(_) => {}
                None => {
                    content_digests.insert(content_algorithm, digest.to_vec());
                }
            }

            verified.push(verified_signer);
        }

        if let Some(expected) = self.config.expected_leaf_sha256 {
            let actual = verified
                .first()
                .and_then(VerifiedSigner::leaf)
                .map(Certificate::sha256_fingerprint);
            if actual != Some(expected) {
                return Err(VerifyError::PublicKeyMismatch(format!(
                    "leaf certificate SHA-256 is not {}",
                    hex::encode(expected)
                )));
            }
        }

        let sections = DigestSections::new(data, &zip, location.offset)?;
        verify_content_digests(&sections, &content_digests)?;
        debug!("v2 signature verified for {} signer(s)", verified.len());
        Ok(verified)
    }
}

/// Check the signature of one signer, then trust and decode its signed data.
fn verify_signer<'a>(signer: &SignerRecord<'a>) -> Result<(VerifiedSigner, SignedData<'a>)> {
    let signature_ids = signer.signature_algorithm_ids();
    let algorithm = SignatureAlgorithm::select_strongest(signature_ids.iter().copied())
        .ok_or_else(|| {
            let offered: Vec<String> = signature_ids
                .iter()
                .map(|id| SignatureAlgorithm::from(*id).to_string())
                .collect();
            VerifyError::UnsupportedAlgorithm(format!("offered: {}", offered.join(", ")))
        })?;
    debug!("selected {}", algorithm);

    let signature = signer
        .signatures
        .iter()
        .find(|s| s.algorithm_id == algorithm)
        .ok_or_else(|| VerifyError::SignerParse(format!("no {} signature", algorithm)))?;
    algorithm.verify(
        signer.public_key,
        signer.signed_data.as_bytes(),
        &signature.signature,
    )?;

    let signed_data = SignedData::parse(signer.signed_data)?;
    if signed_data.digest_algorithm_ids() != signature_ids {
        return Err(VerifyError::SignerParse(
            "signature algorithms don't match between digests and signatures records".to_string(),
        ));
    }
    let certificates = collect_certificates(&signed_data.certificates, signer.public_key)?;

    Ok((
        VerifiedSigner {
            algorithm,
            certificates,
        },
        signed_data,
    ))
}

/// Verify `data` with the default settings
///
/// # Errors
/// Returns the [`VerifyError`] of the first stage that fails.
pub fn verify_bytes(data: &[u8]) -> Result<Vec<VerifiedSigner>> {
    ApkVerifier::default().verify(data)
}

/// Verify `data` with custom settings
///
/// # Errors
/// Returns the [`VerifyError`] of the first stage that fails.
pub fn verify_bytes_with(data: &[u8], config: &VerifierConfig) -> Result<Vec<VerifiedSigner>> {
    ApkVerifier::new(config.clone()).verify(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = VerifierConfig::default();
        assert_eq!(config.max_signers, DEFAULT_MAX_SIGNERS);
        assert!(config.expected_leaf_sha256.is_none());
        assert_eq!(ApkVerifier::default().config(), &config);
    }

    #[test]
    fn not_a_zip() {
        let err = verify_bytes(b"definitely not an archive").unwrap_err();
        assert!(matches!(err, VerifyError::ZipFormat(_)));
    }

    #[test]
    fn unsigned_zip() {
        // empty archive: only an EOCD, CD at offset 0
        let mut data = vec![0x50, 0x4b, 0x05, 0x06];
        data.extend_from_slice(&[0u8; 18]);
        let err = verify_bytes(&data).unwrap_err();
        assert!(matches!(err, VerifyError::SigningBlockMissing(_)));
    }
}
