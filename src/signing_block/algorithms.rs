//! Signature algorithms of the APK Signature Scheme v2
//!
//! <https://source.android.com/docs/security/features/apksigning/v2#signature-algorithm-ids>

use log::trace;
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256, Sha512};
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::Decode;
use x509_cert::spki::SubjectPublicKeyInfoRef;

#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

use crate::error::{Result, VerifyError};

/// Id of RSASSA-PSS with SHA2-256 digest, SHA2-256 MGF1, 32 bytes of salt, trailer: 0xbc
pub const SIGNATURE_RSA_PSS_WITH_SHA256: u32 = 0x0101;
/// Id of RSASSA-PSS with SHA2-512 digest, SHA2-512 MGF1, 64 bytes of salt, trailer: 0xbc
pub const SIGNATURE_RSA_PSS_WITH_SHA512: u32 = 0x0102;
/// Id of RSASSA-PKCS1-v1_5 with SHA2-256 digest
pub const SIGNATURE_RSA_PKCS1_V1_5_WITH_SHA256: u32 = 0x0103;
/// Id of RSASSA-PKCS1-v1_5 with SHA2-512 digest
pub const SIGNATURE_RSA_PKCS1_V1_5_WITH_SHA512: u32 = 0x0104;
/// Id of ECDSA with SHA2-256 digest
pub const SIGNATURE_ECDSA_WITH_SHA256: u32 = 0x0201;
/// Id of ECDSA with SHA2-512 digest
pub const SIGNATURE_ECDSA_WITH_SHA512: u32 = 0x0202;
/// Id of DSA with SHA2-256 digest
pub const SIGNATURE_DSA_WITH_SHA256: u32 = 0x0301;

/// Named curve secp521r1 (NIST P-521)
const SECP521R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");
/// Named curve secp256k1
const SECP256K1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.10");

/// Two-level chunked content digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ContentDigestAlgorithm {
    /// SHA2-256 over 1 MiB chunks
    ChunkedSha256 = 1,
    /// SHA2-512 over 1 MiB chunks
    ChunkedSha512 = 2,
}

impl ContentDigestAlgorithm {
    /// Length of a digest produced by this algorithm
    pub const fn output_size(self) -> usize {
        match self {
            Self::ChunkedSha256 => 32,
            Self::ChunkedSha512 => 64,
        }
    }

    /// Start a fresh hash for this algorithm
    pub(crate) fn hasher(self) -> Hasher {
        match self {
            Self::ChunkedSha256 => Hasher::Sha256(Sha256::new()),
            Self::ChunkedSha512 => Hasher::Sha512(Sha512::new()),
        }
    }
}

impl std::fmt::Display for ContentDigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChunkedSha256 => write!(f, "CHUNKED_SHA256"),
            Self::ChunkedSha512 => write!(f, "CHUNKED_SHA512"),
        }
    }
}

/// Running hash of one content digest algorithm
#[derive(Clone)]
pub(crate) enum Hasher {
    /// SHA2-256
    Sha256(Sha256),
    /// SHA2-512
    Sha512(Sha512),
}

impl Hasher {
    /// Feed bytes into the hash
    pub(crate) fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    /// Consume the hash and return the digest
    pub(crate) fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Key type a signature algorithm expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// RSA public key
    Rsa,
    /// Elliptic curve public key
    Ec,
    /// DSA public key
    Dsa,
}

/// Signature scheme and its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// RSASSA-PKCS1-v1_5
    RsaPkcs1v15,
    /// RSASSA-PSS, MGF1 with the same digest
    RsaPss {
        /// Salt length in bytes
        salt_len: usize,
    },
    /// ECDSA with a DER encoded signature
    Ecdsa,
    /// DSA with a DER encoded signature
    Dsa,
}

/// Signature algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum SignatureAlgorithm {
    /// RSASSA-PSS with SHA2-256 digest
    RSA_PSS_SHA256,
    /// RSASSA-PSS with SHA2-512 digest
    RSA_PSS_SHA512,
    /// RSASSA-PKCS1-v1_5 with SHA2-256 digest
    RSA_PKCS1_SHA256,
    /// RSASSA-PKCS1-v1_5 with SHA2-512 digest
    RSA_PKCS1_SHA512,
    /// ECDSA with SHA2-256 digest
    ECDSA_SHA256,
    /// ECDSA with SHA2-512 digest
    ECDSA_SHA512,
    /// DSA with SHA2-256 digest
    DSA_SHA256,
    /// Unknown algorithm
    Unknown(u32),
}

/// Strongest first. Selection walks this table and takes the first entry a signer offers.
pub const STRENGTH_RANKING: [SignatureAlgorithm; 7] = [
    SignatureAlgorithm::RSA_PSS_SHA512,
    SignatureAlgorithm::RSA_PSS_SHA256,
    SignatureAlgorithm::ECDSA_SHA512,
    SignatureAlgorithm::ECDSA_SHA256,
    SignatureAlgorithm::RSA_PKCS1_SHA512,
    SignatureAlgorithm::RSA_PKCS1_SHA256,
    SignatureAlgorithm::DSA_SHA256,
];

#[cfg(feature = "serde")]
impl Serialize for SignatureAlgorithm {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u32::from(*self).serialize(serializer)
    }
}

impl PartialEq<SignatureAlgorithm> for u32 {
    fn eq(&self, sig: &SignatureAlgorithm) -> bool {
        *self == u32::from(*sig)
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match *self {
            Self::RSA_PSS_SHA256 => "RSASSA-PSS with SHA2-256 digest",
            Self::RSA_PSS_SHA512 => "RSASSA-PSS with SHA2-512 digest",
            Self::RSA_PKCS1_SHA256 => "RSASSA-PKCS1-v1_5 with SHA2-256 digest",
            Self::RSA_PKCS1_SHA512 => "RSASSA-PKCS1-v1_5 with SHA2-512 digest",
            Self::ECDSA_SHA256 => "ECDSA with SHA2-256 digest",
            Self::ECDSA_SHA512 => "ECDSA with SHA2-512 digest",
            Self::DSA_SHA256 => "DSA with SHA2-256 digest",
            Self::Unknown(_) => "Unknown algorithm",
        };
        write!(f, "{:#06x} - {}", u32::from(*self), str)
    }
}

impl From<u32> for SignatureAlgorithm {
    fn from(sig: u32) -> Self {
        match sig {
            SIGNATURE_RSA_PSS_WITH_SHA256 => Self::RSA_PSS_SHA256,
            SIGNATURE_RSA_PSS_WITH_SHA512 => Self::RSA_PSS_SHA512,
            SIGNATURE_RSA_PKCS1_V1_5_WITH_SHA256 => Self::RSA_PKCS1_SHA256,
            SIGNATURE_RSA_PKCS1_V1_5_WITH_SHA512 => Self::RSA_PKCS1_SHA512,
            SIGNATURE_ECDSA_WITH_SHA256 => Self::ECDSA_SHA256,
            SIGNATURE_ECDSA_WITH_SHA512 => Self::ECDSA_SHA512,
            SIGNATURE_DSA_WITH_SHA256 => Self::DSA_SHA256,
            _ => Self::Unknown(sig),
        }
    }
}

impl From<SignatureAlgorithm> for u32 {
    fn from(sig: SignatureAlgorithm) -> Self {
        match sig {
            SignatureAlgorithm::RSA_PSS_SHA256 => SIGNATURE_RSA_PSS_WITH_SHA256,
            SignatureAlgorithm::RSA_PSS_SHA512 => SIGNATURE_RSA_PSS_WITH_SHA512,
            SignatureAlgorithm::RSA_PKCS1_SHA256 => SIGNATURE_RSA_PKCS1_V1_5_WITH_SHA256,
            SignatureAlgorithm::RSA_PKCS1_SHA512 => SIGNATURE_RSA_PKCS1_V1_5_WITH_SHA512,
            SignatureAlgorithm::ECDSA_SHA256 => SIGNATURE_ECDSA_WITH_SHA256,
            SignatureAlgorithm::ECDSA_SHA512 => SIGNATURE_ECDSA_WITH_SHA512,
            SignatureAlgorithm::DSA_SHA256 => SIGNATURE_DSA_WITH_SHA256,
            SignatureAlgorithm::Unknown(u) => u,
        }
    }
}

/// SHA2-256 of `data`
fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// SHA2-512 of `data`
fn sha512(data: &[u8]) -> Vec<u8> {
    Sha512::digest(data).to_vec()
}

impl SignatureAlgorithm {
    /// On-wire ID
    pub fn id(self) -> u32 {
        u32::from(self)
    }

    /// Content digest algorithm bound to this signature algorithm
    pub const fn content_digest_algorithm(self) -> Option<ContentDigestAlgorithm> {
        match self {
            Self::RSA_PSS_SHA256
            | Self::RSA_PKCS1_SHA256
            | Self::ECDSA_SHA256
            | Self::DSA_SHA256 => Some(ContentDigestAlgorithm::ChunkedSha256),
            Self::RSA_PSS_SHA512 | Self::RSA_PKCS1_SHA512 | Self::ECDSA_SHA512 => {
                Some(ContentDigestAlgorithm::ChunkedSha512)
            }
            Self::Unknown(_) => None,
        }
    }

    /// Key type expected in the signer's public key
    pub const fn key_algorithm(self) -> Option<KeyAlgorithm> {
        match self {
            Self::RSA_PSS_SHA256
            | Self::RSA_PSS_SHA512
            | Self::RSA_PKCS1_SHA256
            | Self::RSA_PKCS1_SHA512 => Some(KeyAlgorithm::Rsa),
            Self::ECDSA_SHA256 | Self::ECDSA_SHA512 => Some(KeyAlgorithm::Ec),
            Self::DSA_SHA256 => Some(KeyAlgorithm::Dsa),
            Self::Unknown(_) => None,
        }
    }

    /// Signature scheme and parameters
    pub const fn scheme(self) -> Option<SignatureScheme> {
        match self {
            Self::RSA_PSS_SHA256 => Some(SignatureScheme::RsaPss { salt_len: 32 }),
            Self::RSA_PSS_SHA512 => Some(SignatureScheme::RsaPss { salt_len: 64 }),
            Self::RSA_PKCS1_SHA256 | Self::RSA_PKCS1_SHA512 => Some(SignatureScheme::RsaPkcs1v15),
            Self::ECDSA_SHA256 | Self::ECDSA_SHA512 => Some(SignatureScheme::Ecdsa),
            Self::DSA_SHA256 => Some(SignatureScheme::Dsa),
            Self::Unknown(_) => None,
        }
    }

    /// Whether this crate can verify signatures made with this algorithm
    pub const fn is_supported(self) -> bool {
        self.key_algorithm().is_some()
    }

    /// Position in [`STRENGTH_RANKING`], `None` for unknown IDs
    pub fn rank(self) -> Option<usize> {
        STRENGTH_RANKING.iter().position(|a| *a == self)
    }

    /// Pick the strongest supported algorithm among on-wire `ids`
    pub fn select_strongest<I>(ids: I) -> Option<Self>
    where
        I: IntoIterator<Item = u32>,
    {
        let offered: Vec<u32> = ids.into_iter().collect();
        STRENGTH_RANKING
            .iter()
            .copied()
            .filter(|a| a.is_supported())
            .find(|a| offered.iter().any(|id| id == a))
    }

    /// Hash data with the digest of this algorithm
    fn hash(self, data: &[u8]) -> Vec<u8> {
        match self.content_digest_algorithm() {
            Some(ContentDigestAlgorithm::ChunkedSha512) => sha512(data),
            _ => sha256(data),
        }
    }

    /// Verify signature
    /// # Arguments
    /// * `pubkey` - DER SubjectPublicKeyInfo from the signer
    /// * `signed_data` - exact signed-data bytes, without their length prefix
    /// * `signature` - Signature from the signer
    /// # Errors
    /// Returns [`VerifyError::UnsupportedAlgorithm`] for algorithms this crate
    /// cannot check and [`VerifyError::SignatureVerificationFailed`] if the key
    /// is unusable or the signature does not match.
    pub fn verify(self, pubkey: &[u8], signed_data: &[u8], signature: &[u8]) -> Result<()> {
        trace!("verifying {} signature over {} bytes", self, signed_data.len());
        match self {
            Self::RSA_PKCS1_SHA256 => verify_rsa_pkcs1::<Sha256>(pubkey, signed_data, signature),
            Self::RSA_PKCS1_SHA512 => verify_rsa_pkcs1::<Sha512>(pubkey, signed_data, signature),
            Self::RSA_PSS_SHA256 => verify_rsa_pss::<Sha256>(pubkey, signed_data, signature, 32),
            Self::RSA_PSS_SHA512 => verify_rsa_pss::<Sha512>(pubkey, signed_data, signature, 64),
            Self::ECDSA_SHA256 | Self::ECDSA_SHA512 => {
                verify_ecdsa(pubkey, &self.hash(signed_data), signature)
            }
            Self::DSA_SHA256 => verify_dsa(pubkey, signed_data, signature),
            Self::Unknown(_) => Err(VerifyError::UnsupportedAlgorithm(format!(
                "cannot verify {}",
                self
            ))),
        }
    }
}

/// Decode an RSA SubjectPublicKeyInfo
fn rsa_public_key(pubkey: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(pubkey).map_err(|e| {
        VerifyError::SignatureVerificationFailed(format!("invalid RSA public key: {}", e))
    })
}

/// RSASSA-PKCS1-v1_5
fn verify_rsa_pkcs1<D>(pubkey: &[u8], signed_data: &[u8], signature: &[u8]) -> Result<()>
where
    D: Digest + sha2::digest::const_oid::AssociatedOid,
{
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    let key = VerifyingKey::<D>::new(rsa_public_key(pubkey)?);
    let sig = Signature::try_from(signature).map_err(|e| {
        VerifyError::SignatureVerificationFailed(format!("malformed RSA signature: {}", e))
    })?;
    key.verify(signed_data, &sig)
        .map_err(|_| VerifyError::SignatureVerificationFailed("RSA PKCS#1 v1.5".to_string()))
}

/// RSASSA-PSS with MGF1 over the same digest
fn verify_rsa_pss<D>(
    pubkey: &[u8],
    signed_data: &[u8],
    signature: &[u8],
    salt_len: usize,
) -> Result<()>
where
    D: Digest + sha2::digest::FixedOutputReset,
{
    use rsa::pss::{Signature, VerifyingKey};
    let key = VerifyingKey::<D>::new_with_salt_len(rsa_public_key(pubkey)?, salt_len);
    let sig = Signature::try_from(signature).map_err(|e| {
        VerifyError::SignatureVerificationFailed(format!("malformed RSA signature: {}", e))
    })?;
    key.verify(signed_data, &sig)
        .map_err(|_| VerifyError::SignatureVerificationFailed("RSA PSS".to_string()))
}

/// ECDSA over an already computed message digest, P-256 or P-384 keys
fn verify_ecdsa(pubkey: &[u8], prehash: &[u8], signature: &[u8]) -> Result<()> {
    if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(pubkey) {
        use p256::ecdsa::signature::hazmat::PrehashVerifier;
        let sig = p256::ecdsa::Signature::from_der(signature).map_err(|_| {
            VerifyError::SignatureVerificationFailed("invalid ECDSA signature format".to_string())
        })?;
        return key.verify_prehash(prehash, &sig).map_err(|_| {
            VerifyError::SignatureVerificationFailed("ECDSA P-256".to_string())
        });
    }
    if let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_der(pubkey) {
        use p384::ecdsa::signature::hazmat::PrehashVerifier;
        let sig = p384::ecdsa::Signature::from_der(signature).map_err(|_| {
            VerifyError::SignatureVerificationFailed("invalid ECDSA signature format".to_string())
        })?;
        return key.verify_prehash(prehash, &sig).map_err(|_| {
            VerifyError::SignatureVerificationFailed("ECDSA P-384".to_string())
        });
    }
    Err(unsupported_ec_key(pubkey))
}

/// Error for an EC key neither P-256 nor P-384 accepted.
///
/// A well-formed key on another named curve is reported with that curve.
fn unsupported_ec_key(pubkey: &[u8]) -> VerifyError {
    let curve = SubjectPublicKeyInfoRef::from_der(pubkey)
        .ok()
        .and_then(|spki| spki.algorithm.parameters_oid().ok());
    match curve {
        Some(oid) => {
            let name = if oid == SECP521R1 {
                "P-521"
            } else if oid == SECP256K1 {
                "secp256k1"
            } else {
                "unknown curve"
            };
            VerifyError::UnsupportedAlgorithm(format!(
                "ECDSA on {} ({}) is not supported",
                name, oid
            ))
        }
        None => VerifyError::SignatureVerificationFailed("invalid EC public key".to_string()),
    }
}

/// DSA with SHA2-256, DER encoded signature
fn verify_dsa(pubkey: &[u8], signed_data: &[u8], signature: &[u8]) -> Result<()> {
    use rsa::signature::DigestVerifier;
    let key = dsa::VerifyingKey::from_public_key_der(pubkey).map_err(|e| {
        VerifyError::SignatureVerificationFailed(format!("invalid DSA public key: {}", e))
    })?;
    let sig = dsa::Signature::try_from(signature).map_err(|_| {
        VerifyError::SignatureVerificationFailed("invalid DSA signature format".to_string())
    })?;
    key.verify_digest(Sha256::new_with_prefix(signed_data), &sig)
        .map_err(|_| VerifyError::SignatureVerificationFailed("DSA".to_string()))
}
