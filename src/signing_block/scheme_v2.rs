//! From
//! <https://source.android.com/docs/security/features/apksigning/v2>
//!
//! ```text
//! v2 block:     length-prefixed sequence of length-prefixed signer
//! signer:       length-prefixed signed data
//!               length-prefixed sequence of length-prefixed signature
//!               length-prefixed public key (SubjectPublicKeyInfo, DER)
//! signed data:  length-prefixed sequence of length-prefixed digest
//!               length-prefixed sequence of length-prefixed certificate (DER)
//!               length-prefixed sequence of length-prefixed additional attribute
//! ```

use log::trace;

use crate::common::{Digest, Signature};
use crate::error::{Result, VerifyError};
use crate::utils::ByteWindow;

/// Signature Scheme V2
pub const SIGNATURE_SCHEME_V2_BLOCK_ID: u32 = 0x7109_871a;

/// One signer of the v2 block, before any of it is trusted
#[derive(Debug, Clone)]
pub struct SignerRecord<'a> {
    /// Signed data, exactly the bytes covered by the signatures
    pub signed_data: ByteWindow<'a>,

    /// Signatures over the signed data, in block order
    pub signatures: Vec<Signature>,

    /// DER SubjectPublicKeyInfo of the signer
    pub public_key: &'a [u8],
}

impl<'a> SignerRecord<'a> {
    /// Parse one signer (without its length prefix).
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] if a field is malformed or the
    /// signer has no signature.
    pub fn parse(mut data: ByteWindow<'a>) -> Result<Self> {
        let signed_data = data.length_prefixed_slice()?;
        let mut signatures_data = data.length_prefixed_slice()?;
        let public_key = data.length_prefixed_bytes()?;

        let mut signatures = Vec::new();
        while signatures_data.has_remaining() {
            signatures.push(Signature::parse(&mut signatures_data)?);
        }
        if signatures.is_empty() {
            return Err(VerifyError::SignerParse("no signatures".to_string()));
        }
        Ok(Self {
            signed_data,
            signatures,
            public_key,
        })
    }

    /// Algorithm IDs of the signatures, in block order
    pub fn signature_algorithm_ids(&self) -> Vec<u32> {
        self.signatures.iter().map(|s| s.algorithm_id).collect()
    }
}

/// Parse every signer of the v2 block.
///
/// # Errors
/// Returns [`VerifyError::NoSignersFound`] if the block lists no signer and
/// [`VerifyError::SignerParse`] if a signer is malformed or there are more
/// than `max_signers`.
pub fn parse_signers(mut v2_block: ByteWindow<'_>, max_signers: usize) -> Result<Vec<SignerRecord<'_>>> {
    let mut signers_data = v2_block.length_prefixed_slice()?;
    let mut signers = Vec::new();
    while signers_data.has_remaining() {
        if signers.len() == max_signers {
            return Err(VerifyError::SignerParse(format!(
                "more than {} signers",
                max_signers
            )));
        }
        let signer = signers_data.length_prefixed_slice()?;
        let record = SignerRecord::parse(signer).map_err(|e| match e {
            VerifyError::SignerParse(msg) => {
                VerifyError::SignerParse(format!("signer #{}: {}", signers.len() + 1, msg))
            }
            other => other,
        })?;
        trace!(
            "signer #{}: {} signature(s), {} bytes of signed data",
            signers.len() + 1,
            record.signatures.len(),
            record.signed_data.len()
        );
        signers.push(record);
    }
    if signers.is_empty() {
        return Err(VerifyError::NoSignersFound);
    }
    Ok(signers)
}

/// Content of the signed data. Only parse it once its signature checked out.
#[derive(Debug, Clone)]
pub struct SignedData<'a> {
    /// Content digests, in block order
    pub digests: Vec<Digest>,

    /// DER certificates, leaf first
    pub certificates: Vec<&'a [u8]>,

    /// Additional attributes, kept opaque
    pub additional_attributes: ByteWindow<'a>,
}

impl<'a> SignedData<'a> {
    /// Parse the signed data (without its length prefix).
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] if a field is malformed or no
    /// digest is listed.
    pub fn parse(mut data: ByteWindow<'a>) -> Result<Self> {
        let mut digests_data = data.length_prefixed_slice()?;
        let mut certificates_data = data.length_prefixed_slice()?;
        let additional_attributes = data.length_prefixed_slice()?;

        let mut digests = Vec::new();
        while digests_data.has_remaining() {
            digests.push(Digest::parse(&mut digests_data)?);
        }
        if digests.is_empty() {
            return Err(VerifyError::SignerParse("no digests".to_string()));
        }

        let mut certificates = Vec::new();
        while certificates_data.has_remaining() {
            certificates.push(certificates_data.length_prefixed_bytes()?);
        }

        Ok(Self {
            digests,
            certificates,
            additional_attributes,
        })
    }

    /// Algorithm IDs of the digests, in block order
    pub fn digest_algorithm_ids(&self) -> Vec<u32> {
        self.digests.iter().map(|d| d.algorithm_id).collect()
    }

    /// Digest declared for the signature algorithm `algorithm_id`
    pub fn digest_for(&self, algorithm_id: u32) -> Option<&[u8]> {
        self.digests
            .iter()
            .find(|d| d.algorithm_id == algorithm_id)
            .map(|d| d.digest.as_slice())
    }
}
