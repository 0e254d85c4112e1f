//! Builds signed test packages in memory.
//!
//! The content digest is computed here independently of the library so a
//! mistake in the digester cannot hide behind the same mistake in the fixture.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use apkverify::{ContentDigestAlgorithm, SignatureAlgorithm, SIGNATURE_SCHEME_V2_BLOCK_ID};
use p256::ecdsa::signature::hazmat::PrehashSigner;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::signature::{DigestSigner, RandomizedSigner, SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256, Sha512};
use x509_cert::der::asn1::{BitString, ObjectIdentifier};
use x509_cert::der::{Decode, Encode};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::Validity;
use x509_cert::{Certificate, TbsCertificate, Version};

pub const MAGIC: &[u8; 16] = b"APK Sig Block 42";
pub const ZIP64_LOCATOR_SIG: u32 = 0x0706_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;
const CHUNK_SIZE: usize = 1024 * 1024;

/// 2048-bit RSA key shared by every test of a binary
pub fn rsa_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
        .clone()
}

/// DSA-2048/256 private key (PKCS#8) generated by the JDK
const DSA_PKCS8: &str = "\
    308202640201003082023906072a8648ce3804013082022c0282010100c5bdceaa1ba8d568f07ba736dde4d85980c169\
    bb355fff5caa14b4a56c1f68cffea6468c4c44189c04ff14c26b4393c2e433a7184515b0e4280797a8988ae9438c5b80\
    b8c96d175ba9e8278ae2d64766b6e984a111ad29728030d8a5c57049ef81159f5ec3b33f8c148ef51d91e099a275e904\
    b14b8f8c4cc0aef60d8bdf6ee4ad562c986f44f13beadd4807a99e0117801ae4274e252821e3467067fbb89f095e9b75\
    d9592fac4c888faecb205c96730ca9154dcc4dc07abcf43b49b895292f5e8e011e7cf20e5f36bffa7de68af88a4f41a8\
    362f14912ffe9174418a5d3c40e3defc8827d6c776eb7153ad79329ccd26d58c1d532a481dcfdc08dbd9a6462d022100\
    fe1925a0f0ddd450bfccff13af532ff2400707051c214f5abec26c6b50d7b097028201004a7b2fa3f17ce29a378f8bf0\
    099d20b5d8ebdf1826fccafc9f1afc183ea19d0c1547bedefc44d1505026e25227869e9196fa8218bdda6dea6e379424\
    59cd14defcbcdbbcdbb407b9d363766a887e758a87d55966cf4c07ff2ea71935ec777b286a0f2311d3573083078caa3e\
    ec382da8607ad731b3f0dd1660bf5c57248e21ebd4d52a0dc95ba8b874e1acb61071ef013692c90e6b232d4931c5aa08\
    dae13ef3b26dd432748fb0eb9ed9fc2137569c80433d7fb637741f021105223365012160c99832dc164680d2bf917e4c\
    476465b1f3649daf3b20a0825929a10dbd16b32256cc4edd997a28878e78c0873caff1f8e1f5563c983700e28360567b\
    ab1596c204220220014975d4be5b500aa903ef63e2ae5e3f578b6fb2fdf9d5f3c06c30a53d93b501";

pub fn dsa_key() -> dsa::SigningKey {
    dsa::SigningKey::from_pkcs8_der(&hex::decode(DSA_PKCS8).unwrap()).unwrap()
}

/// Private key of a test signer
#[derive(Clone)]
pub enum TestKey {
    Rsa(RsaPrivateKey),
    P256(p256::ecdsa::SigningKey),
    Dsa,
}

impl TestKey {
    pub fn rsa() -> Self {
        Self::Rsa(rsa_key())
    }

    pub fn p256() -> Self {
        Self::P256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()))
    }

    /// DER SubjectPublicKeyInfo
    pub fn public_key_der(&self) -> Vec<u8> {
        match self {
            Self::Rsa(key) => key.to_public_key().to_public_key_der().unwrap().into_vec(),
            Self::P256(key) => key.verifying_key().to_public_key_der().unwrap().into_vec(),
            Self::Dsa => dsa_key().verifying_key().to_public_key_der().unwrap().into_vec(),
        }
    }

    /// Sign `data`; algorithms the key cannot produce get filler bytes
    pub fn sign(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> Vec<u8> {
        use rsa::{pkcs1v15, pss};
        use SignatureAlgorithm::*;
        match (self, algorithm) {
            (Self::Rsa(key), RSA_PKCS1_SHA256) => {
                pkcs1v15::SigningKey::<Sha256>::new(key.clone()).sign(data).to_vec()
            }
            (Self::Rsa(key), RSA_PKCS1_SHA512) => {
                pkcs1v15::SigningKey::<Sha512>::new(key.clone()).sign(data).to_vec()
            }
            (Self::Rsa(key), RSA_PSS_SHA256) => {
                pss::SigningKey::<Sha256>::new_with_salt_len(key.clone(), 32)
                    .sign_with_rng(&mut rand::thread_rng(), data)
                    .to_vec()
            }
            (Self::Rsa(key), RSA_PSS_SHA512) => {
                pss::SigningKey::<Sha512>::new_with_salt_len(key.clone(), 64)
                    .sign_with_rng(&mut rand::thread_rng(), data)
                    .to_vec()
            }
            (Self::P256(key), ECDSA_SHA256) => {
                let sig: p256::ecdsa::Signature = key.sign_prehash(&Sha256::digest(data)).unwrap();
                sig.to_der().as_bytes().to_vec()
            }
            (Self::P256(key), ECDSA_SHA512) => {
                let sig: p256::ecdsa::Signature = key.sign_prehash(&Sha512::digest(data)).unwrap();
                sig.to_der().as_bytes().to_vec()
            }
            (Self::Dsa, DSA_SHA256) => {
                let sig: dsa::Signature = dsa_key().sign_digest(Sha256::new_with_prefix(data));
                sig.to_vec()
            }
            _ => vec![0x30; 64],
        }
    }
}

/// Self-issued certificate for `public_key_der`. The certificate signature is
/// never checked by the verifier, so it is filler.
pub fn certificate(public_key_der: &[u8], cn: &str) -> Vec<u8> {
    let algorithm = AlgorithmIdentifierOwned {
        // sha256WithRSAEncryption
        oid: ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11"),
        parameters: None,
    };
    let name = Name::from_str(&format!("CN={}", cn)).unwrap();
    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[0x01, 0x23]).unwrap(),
        signature: algorithm.clone(),
        issuer: name.clone(),
        validity: Validity::from_now(Duration::from_secs(3600)).unwrap(),
        subject: name,
        subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(public_key_der).unwrap(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    Certificate {
        tbs_certificate,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&[0u8; 32]).unwrap(),
    }
    .to_der()
    .unwrap()
}

/// How one signer of the fixture signs
#[derive(Clone)]
pub struct SignerSpec {
    pub key: TestKey,
    pub algorithms: Vec<SignatureAlgorithm>,
    /// Certify this key instead of the signer's
    pub certified_key: Option<Vec<u8>>,
    /// Declare these bytes for every digest
    pub digest_override: Option<Vec<u8>>,
}

impl SignerSpec {
    pub fn new(key: TestKey, algorithms: &[SignatureAlgorithm]) -> Self {
        Self {
            key,
            algorithms: algorithms.to_vec(),
            certified_key: None,
            digest_override: None,
        }
    }
}

pub fn prefixed(data: &[u8]) -> Vec<u8> {
    [(data.len() as u32).to_le_bytes().to_vec(), data.to_vec()].concat()
}

fn record(id: u32, value: &[u8]) -> Vec<u8> {
    prefixed(&[id.to_le_bytes().to_vec(), prefixed(value)].concat())
}

fn pair(id: u32, value: &[u8]) -> Vec<u8> {
    [
        ((value.len() + 4) as u64).to_le_bytes().to_vec(),
        id.to_le_bytes().to_vec(),
        value.to_vec(),
    ]
    .concat()
}

fn chunked_digest<D: Digest>(sections: &[&[u8]]) -> Vec<u8> {
    let mut chunk_digests = Vec::new();
    let mut count = 0u32;
    for section in sections {
        for chunk in section.chunks(CHUNK_SIZE) {
            let mut hasher = D::new();
            hasher.update([0xa5]);
            hasher.update((chunk.len() as u32).to_le_bytes());
            hasher.update(chunk);
            chunk_digests.extend_from_slice(&hasher.finalize());
            count += 1;
        }
    }
    let mut hasher = D::new();
    hasher.update([0x5a]);
    hasher.update(count.to_le_bytes());
    hasher.update(&chunk_digests);
    hasher.finalize().to_vec()
}

/// Output of [`ApkBuilder::sign`]
pub struct SignedApk {
    pub data: Vec<u8>,
    pub block_offset: usize,
    pub cd_offset: usize,
    pub eocd_offset: usize,
    /// Every signature, in block order
    pub signatures: Vec<Vec<u8>>,
}

/// Position of `needle` in `data`
pub fn find(data: &[u8], needle: &[u8]) -> usize {
    data.windows(needle.len())
        .position(|w| w == needle)
        .unwrap()
}

/// ZIP-like container: entries, Central Directory, EOCD
#[derive(Clone)]
pub struct ApkBuilder {
    pub entries: Vec<u8>,
    pub central_directory: Vec<u8>,
    pub comment: Vec<u8>,
    pub extra_pairs: Vec<(u32, Vec<u8>)>,
    pub v2_block_id: u32,
}

impl ApkBuilder {
    pub fn new(entries_len: usize) -> Self {
        let entries = (0..entries_len).map(|i| (i * 31 % 251) as u8).collect();
        let mut central_directory = 0x0201_4b50_u32.to_le_bytes().to_vec();
        central_directory.extend((0..42).map(|i| i as u8));
        Self {
            entries,
            central_directory,
            comment: Vec::new(),
            extra_pairs: Vec::new(),
            v2_block_id: SIGNATURE_SCHEME_V2_BLOCK_ID,
        }
    }

    pub fn eocd(&self, cd_offset: usize) -> Vec<u8> {
        let mut eocd = EOCD_SIG.to_le_bytes().to_vec();
        eocd.extend_from_slice(&0u16.to_le_bytes());
        eocd.extend_from_slice(&0u16.to_le_bytes());
        eocd.extend_from_slice(&1u16.to_le_bytes());
        eocd.extend_from_slice(&1u16.to_le_bytes());
        eocd.extend_from_slice(&(self.central_directory.len() as u32).to_le_bytes());
        eocd.extend_from_slice(&(cd_offset as u32).to_le_bytes());
        eocd.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        eocd.extend_from_slice(&self.comment);
        eocd
    }

    /// Package without signing block
    pub fn unsigned(&self) -> Vec<u8> {
        [
            self.entries.clone(),
            self.central_directory.clone(),
            self.eocd(self.entries.len()),
        ]
        .concat()
    }

    /// v2 content digest of the package
    pub fn content_digest(&self, algorithm: ContentDigestAlgorithm) -> Vec<u8> {
        let eocd = self.eocd(self.entries.len());
        let sections = [
            self.entries.as_slice(),
            self.central_directory.as_slice(),
            eocd.as_slice(),
        ];
        match algorithm {
            ContentDigestAlgorithm::ChunkedSha256 => chunked_digest::<Sha256>(&sections),
            ContentDigestAlgorithm::ChunkedSha512 => chunked_digest::<Sha512>(&sections),
        }
    }

    pub fn sign(&self, signers: &[SignerSpec]) -> SignedApk {
        let mut signatures = Vec::new();
        let mut signer_blobs = Vec::new();
        for spec in signers {
            let public_key = spec.key.public_key_der();
            let digests: Vec<u8> = spec
                .algorithms
                .iter()
                .flat_map(|alg| {
                    let digest = spec.digest_override.clone().unwrap_or_else(|| {
                        let content = alg
                            .content_digest_algorithm()
                            .unwrap_or(ContentDigestAlgorithm::ChunkedSha256);
                        self.content_digest(content)
                    });
                    record(alg.id(), &digest)
                })
                .collect();
            let certified = spec.certified_key.clone().unwrap_or_else(|| public_key.clone());
            let certs = prefixed(&certificate(&certified, "test"));
            let signed_data = [prefixed(&digests), prefixed(&certs), prefixed(&[])].concat();

            let mut sig_records = Vec::new();
            for alg in &spec.algorithms {
                let signature = spec.key.sign(*alg, &signed_data);
                sig_records.extend(record(alg.id(), &signature));
                signatures.push(signature);
            }
            let signer = [
                prefixed(&signed_data),
                prefixed(&sig_records),
                prefixed(&public_key),
            ]
            .concat();
            signer_blobs.extend(prefixed(&signer));
        }

        let mut pairs: Vec<u8> = self
            .extra_pairs
            .iter()
            .flat_map(|(id, value)| pair(*id, value))
            .collect();
        pairs.extend(pair(self.v2_block_id, &prefixed(&signer_blobs)));
        let size = (pairs.len() + 24) as u64;
        let block = [
            size.to_le_bytes().to_vec(),
            pairs,
            size.to_le_bytes().to_vec(),
            MAGIC.to_vec(),
        ]
        .concat();

        let block_offset = self.entries.len();
        let cd_offset = block_offset + block.len();
        let eocd_offset = cd_offset + self.central_directory.len();
        let data = [
            self.entries.clone(),
            block,
            self.central_directory.clone(),
            self.eocd(cd_offset),
        ]
        .concat();
        SignedApk {
            data,
            block_offset,
            cd_offset,
            eocd_offset,
            signatures,
        }
    }
}
