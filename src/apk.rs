//! Package on disk
//!
//! The file is memory-mapped once; every operation works on immutable
//! windows over the mapping, so one [`Apk`] can serve several readers.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::debug;
use memmap2::Mmap;

use crate::error::Result;
use crate::signing_block::algorithms::ContentDigestAlgorithm;
use crate::signing_block::digest::{compute_content_digests, DigestSections};
use crate::signing_block::{find_signing_block, pairs, ApkSigningBlockLocation};
use crate::verifier::{ApkVerifier, VerifiedSigner, VerifierConfig};
use crate::zip::{zip_sections, ZipSections};

/// Memory-mapped APK file
#[derive(Debug)]
pub struct Apk {
    /// Path the file was opened from
    path: PathBuf,
    /// Mapping of the whole file
    mmap: Mmap,
}

impl Apk {
    /// Open and map `path`.
    ///
    /// The mapping reflects the file as it is on disk. The file must not be
    /// modified or truncated while the handle is in use: a change made
    /// between the signature check and the digest computation of
    /// [`Apk::verify`] is not detected, and truncation can fault the process.
    /// # Errors
    /// Returns [`crate::VerifyError::Io`] if the file cannot be opened or mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // SAFETY: read-only mapping owned by `Apk`; the file must stay unmodified (see above)
        let mmap = unsafe { Mmap::map(&file)? };
        debug!("mapped {} ({} bytes)", path.display(), mmap.len());
        Ok(Self { path, mmap })
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content of the file
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Size of the file
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Whether the file is empty
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// ZIP sections of the file
    /// # Errors
    /// Returns [`crate::VerifyError::ZipFormat`] on a malformed ZIP tail.
    pub fn sections(&self) -> Result<ZipSections> {
        zip_sections(self.as_bytes())
    }

    /// Location of the APK Signing Block
    /// # Errors
    /// Returns [`crate::VerifyError::SigningBlockMissing`] if the file is not signed.
    pub fn signing_block_location(&self) -> Result<ApkSigningBlockLocation> {
        let sections = self.sections()?;
        find_signing_block(self.as_bytes(), &sections).map(|(location, _)| location)
    }

    /// IDs and sizes of the ID/value pairs of the APK Signing Block
    /// # Errors
    /// Returns an error if the block is missing or malformed.
    pub fn signing_block_pairs(&self) -> Result<Vec<(u32, usize)>> {
        let sections = self.sections()?;
        let (_, block) = find_signing_block(self.as_bytes(), &sections)?;
        Ok(pairs(block)?
            .into_iter()
            .map(|p| (p.id, p.value.len()))
            .collect())
    }

    /// v2 content digest of the file.
    ///
    /// Without an APK Signing Block the digest is the one a signer would
    /// compute before inserting the block.
    /// # Errors
    /// Returns an error if the ZIP tail or an existing signing block is malformed.
    pub fn content_digest(&self, algorithm: ContentDigestAlgorithm) -> Result<Vec<u8>> {
        let data = self.as_bytes();
        let sections = self.sections()?;
        let block_offset = match find_signing_block(data, &sections) {
            Ok((location, _)) => location.offset,
            Err(crate::VerifyError::SigningBlockMissing(_)) => sections.cd_offset,
            Err(e) => return Err(e),
        };
        let digest_sections = DigestSections::new(data, &sections, block_offset)?;
        let mut digests = compute_content_digests(&digest_sections.windows(), &[algorithm])?;
        Ok(digests.remove(&algorithm).unwrap_or_default())
    }

    /// Verify the v2 signature with the default settings
    /// # Errors
    /// Returns the [`crate::VerifyError`] of the first stage that fails.
    pub fn verify(&self) -> Result<Vec<VerifiedSigner>> {
        ApkVerifier::default().verify(self.as_bytes())
    }

    /// Verify the v2 signature with custom settings
    /// # Errors
    /// Returns the [`crate::VerifyError`] of the first stage that fails.
    pub fn verify_with(&self, config: &VerifierConfig) -> Result<Vec<VerifiedSigner>> {
        ApkVerifier::new(config.clone()).verify(self.as_bytes())
    }
}
