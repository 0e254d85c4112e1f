//! # Common types for scheme
//!
//! Records shared by the signer and signed-data parsers, and the
//! certificate collector that turns the signed DER blobs into a chain.

use std::mem;

use log::trace;
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use x509_cert::der::{Decode, Encode};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::error::{Result, VerifyError};
use crate::signing_block::algorithms::SignatureAlgorithm;
use crate::utils::ByteWindow;

/// Smallest digest or signature record: algorithm ID and length prefix
const MIN_RECORD_SIZE: usize = 2 * mem::size_of::<u32>();

/// Read one `{ u32 algorithm id, length-prefixed bytes }` record
fn parse_record<'a>(data: &mut ByteWindow<'a>, what: &str) -> Result<(u32, &'a [u8])> {
    let mut record = data.length_prefixed_slice()?;
    if record.len() < MIN_RECORD_SIZE {
        return Err(VerifyError::SignerParse(format!(
            "{} record too short: {} bytes",
            what,
            record.len()
        )));
    }
    let algorithm_id = record.read_u32()?;
    let value = record.length_prefixed_bytes()?;
    Ok((algorithm_id, value))
}

/// The `Digest` struct represents the digest of the signed data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Digest {
    /// The signature algorithm ID of the digest.
    pub algorithm_id: u32,

    /// The digest of the signed data.
    pub digest: Vec<u8>,
}

impl Digest {
    /// Parses one length-prefixed digest record.
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] if the record is malformed.
    pub fn parse(data: &mut ByteWindow<'_>) -> Result<Self> {
        let (algorithm_id, digest) = parse_record(data, "digest")?;
        trace!(
            "digest {}: {} bytes",
            SignatureAlgorithm::from(algorithm_id),
            digest.len()
        );
        Ok(Self {
            algorithm_id,
            digest: digest.to_vec(),
        })
    }
}

/// The `Signature` struct represents one signature of a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Signature {
    /// The signature algorithm ID.
    pub algorithm_id: u32,

    /// The signature over the signed data.
    pub signature: Vec<u8>,
}

impl Signature {
    /// Parses one length-prefixed signature record.
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] if the record is malformed.
    pub fn parse(data: &mut ByteWindow<'_>) -> Result<Self> {
        let (algorithm_id, signature) = parse_record(data, "signature")?;
        trace!(
            "signature {}: {} bytes",
            SignatureAlgorithm::from(algorithm_id),
            signature.len()
        );
        Ok(Self {
            algorithm_id,
            signature: signature.to_vec(),
        })
    }
}

/// Decoded X.509 certificate of a signer.
///
/// Keeps the exact DER bytes from the package next to the fields callers
/// look at, so re-encoding never changes what was signed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Certificate {
    /// DER encoding as found in the signed data
    der: Vec<u8>,
    /// DER SubjectPublicKeyInfo
    public_key: Vec<u8>,
    /// Subject distinguished name
    subject: String,
    /// Issuer distinguished name
    issuer: String,
    /// Serial number, big-endian
    serial: Vec<u8>,
}

impl Certificate {
    /// Decode a DER certificate.
    /// # Errors
    /// Returns [`VerifyError::CertificateDecode`] if `der` is not a valid certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = x509_cert::Certificate::from_der(der)
            .map_err(|e| VerifyError::CertificateDecode(e.to_string()))?;
        let tbs = &cert.tbs_certificate;
        let public_key = tbs
            .subject_public_key_info
            .to_der()
            .map_err(|e| VerifyError::CertificateDecode(e.to_string()))?;
        Ok(Self {
            der: der.to_vec(),
            public_key,
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            serial: tbs.serial_number.as_bytes().to_vec(),
        })
    }

    /// Raw DER bytes
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// DER SubjectPublicKeyInfo of the certified key
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Subject distinguished name (RFC 4514)
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name (RFC 4514)
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serial number as lowercase hex
    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial)
    }

    /// SHA-256 of the DER bytes
    pub fn sha256_fingerprint(&self) -> [u8; 32] {
        Sha256::digest(&self.der).into()
    }

    /// SHA-1 of the DER bytes
    pub fn sha1_fingerprint(&self) -> [u8; 20] {
        Sha1::digest(&self.der).into()
    }

    /// MD5 of the DER bytes
    pub fn md5_fingerprint(&self) -> [u8; 16] {
        md5::compute(&self.der).0
    }
}

/// Decode the certificates of a signer and check the leaf against its public key.
///
/// Returns the chain in the order it was signed, leaf first.
///
/// # Errors
/// Returns [`VerifyError::CertificateDecode`] if a certificate is malformed
/// and [`VerifyError::PublicKeyMismatch`] if there is no certificate or the
/// first one does not certify `public_key`.
pub fn collect_certificates(certificates: &[&[u8]], public_key: &[u8]) -> Result<Vec<Certificate>> {
    let chain = certificates
        .iter()
        .enumerate()
        .map(|(i, der)| {
            Certificate::from_der(der).map_err(|e| match e {
                VerifyError::CertificateDecode(msg) => {
                    VerifyError::CertificateDecode(format!("certificate #{}: {}", i + 1, msg))
                }
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let leaf = chain
        .first()
        .ok_or_else(|| VerifyError::PublicKeyMismatch("no certificates listed".to_string()))?;
    if leaf.public_key() != public_key {
        return Err(VerifyError::PublicKeyMismatch(format!(
            "leaf certificate '{}' does not certify the signer's public key",
            leaf.subject()
        )));
    }
    trace!("collected {} certificate(s), leaf {}", chain.len(), leaf.subject());
    Ok(chain)
}
