//! Content digests of the APK Signature Scheme v2
//!
//! <https://source.android.com/docs/security/features/apksigning/v2#integrity-protected-contents>
//!
//! The package is seen as three sections: everything before the APK Signing
//! Block, the Central Directory, and the EOCD whose Central Directory offset
//! is rewritten to point at the start of the signing block. Each section is
//! split into 1 MiB chunks, every chunk is hashed on its own, and the
//! top-level digest is the hash of all chunk digests in order.

use std::collections::BTreeMap;
use std::mem;

use log::debug;

use crate::error::{Result, VerifyError};
use crate::signing_block::algorithms::ContentDigestAlgorithm;
use crate::utils::ByteWindow;
use crate::zip::ZipSections;

/// Size of a chunk (1 MiB)
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// First byte hashed for every chunk
pub const CHUNK_PREFIX: u8 = 0xa5;

/// First byte hashed for the top-level digest
pub const TOP_LEVEL_PREFIX: u8 = 0x5a;

/// The three byte ranges covered by the content digest
#[derive(Debug, Clone)]
pub struct DigestSections<'a> {
    /// `[0, signing block offset)`
    pub entries: ByteWindow<'a>,
    /// `[cd offset, eocd offset)`
    pub central_directory: ByteWindow<'a>,
    /// EOCD record with its Central Directory offset patched in memory
    pub eocd: Vec<u8>,
}

impl<'a> DigestSections<'a> {
    /// Build the sections of `data` for a signing block starting at `signing_block_offset`.
    ///
    /// For an unsigned archive pass the Central Directory offset itself.
    ///
    /// # Errors
    /// Returns [`VerifyError::ZipFormat`] if the offsets do not fit the file
    /// or the signing block offset does not fit the EOCD field.
    pub fn new(data: &'a [u8], zip: &ZipSections, signing_block_offset: u64) -> Result<Self> {
        let file = ByteWindow::new(data);
        let to_usize = |v: u64| {
            usize::try_from(v)
                .map_err(|_| VerifyError::ZipFormat(format!("offset {} exceeds address space", v)))
        };
        let out_of_range = |_| {
            VerifyError::ZipFormat(format!(
                "digest sections out of range (signing block {}, cd {}, eocd {})",
                signing_block_offset, zip.cd_offset, zip.eocd_offset
            ))
        };
        let entries = file
            .slice(0, to_usize(signing_block_offset)?)
            .map_err(out_of_range)?;
        let central_directory = file
            .slice(to_usize(zip.cd_offset)?, to_usize(zip.eocd_offset)?)
            .map_err(out_of_range)?;
        let patched_cd_offset = u32::try_from(signing_block_offset).map_err(|_| {
            VerifyError::ZipFormat(format!(
                "signing block offset {} does not fit the EOCD",
                signing_block_offset
            ))
        })?;
        Ok(Self {
            entries,
            central_directory,
            eocd: zip.eocd.with_cd_offset(patched_cd_offset).to_u8(),
        })
    }

    /// Sections in digest order
    pub fn windows(&self) -> [ByteWindow<'_>; 3] {
        [
            self.entries,
            self.central_directory,
            ByteWindow::new(&self.eocd),
        ]
    }

    /// Number of chunks the sections split into
    pub fn chunk_count(&self) -> usize {
        self.windows().iter().map(|w| chunk_count(w.len())).sum()
    }
}

/// Number of chunks a section of `len` bytes splits into
pub const fn chunk_count(len: usize) -> usize {
    len.div_ceil(CHUNK_SIZE)
}

/// Compute the content digest of `sections` for every algorithm in `algorithms`.
///
/// Every chunk is read once and fed to all the requested algorithms.
///
/// # Errors
/// Returns [`VerifyError::ZipFormat`] if the sections hold more chunks than
/// the format can count.
pub fn compute_content_digests(
    sections: &[ByteWindow<'_>],
    algorithms: &[ContentDigestAlgorithm],
) -> Result<BTreeMap<ContentDigestAlgorithm, Vec<u8>>> {
    let total_chunks: usize = sections.iter().map(|s| chunk_count(s.len())).sum();
    let total_chunks_u32 = u32::try_from(total_chunks)
        .map_err(|_| VerifyError::ZipFormat(format!("too many chunks: {}", total_chunks)))?;

    // one buffer per algorithm: prefix, chunk count, then every chunk digest
    let mut chunk_digests: Vec<(ContentDigestAlgorithm, Vec<u8>)> = algorithms
        .iter()
        .map(|&algo| {
            let mut buf =
                Vec::with_capacity(1 + mem::size_of::<u32>() + total_chunks * algo.output_size());
            buf.push(TOP_LEVEL_PREFIX);
            buf.extend_from_slice(&total_chunks_u32.to_le_bytes());
            (algo, buf)
        })
        .collect();

    for section in sections {
        for chunk in section.chunks(CHUNK_SIZE) {
            let len_le = (chunk.len() as u32).to_le_bytes();
            for (algo, buf) in &mut chunk_digests {
                let mut hasher = algo.hasher();
                hasher.update(&[CHUNK_PREFIX]);
                hasher.update(&len_le);
                hasher.update(chunk);
                buf.extend_from_slice(&hasher.finalize());
            }
        }
    }

    debug!(
        "digested {} chunks for {} algorithm(s)",
        total_chunks,
        algorithms.len()
    );
    Ok(chunk_digests
        .into_iter()
        .map(|(algo, buf)| {
            let mut hasher = algo.hasher();
            hasher.update(&buf);
            (algo, hasher.finalize())
        })
        .collect())
}

/// Recompute the content digests and compare them with the signed values.
///
/// # Errors
/// Returns [`VerifyError::DigestMismatch`] naming the first algorithm whose
/// digest differs.
pub fn verify_content_digests(
    sections: &DigestSections<'_>,
    expected: &BTreeMap<ContentDigestAlgorithm, Vec<u8>>,
) -> Result<()> {
    let algorithms: Vec<ContentDigestAlgorithm> = expected.keys().copied().collect();
    let actual = compute_content_digests(&sections.windows(), &algorithms)?;
    for (algorithm, expected_digest) in expected {
        if actual.get(algorithm) != Some(expected_digest) {
            return Err(VerifyError::DigestMismatch {
                algorithm: *algorithm,
            });
        }
        debug!("{} content digest matches", algorithm);
    }
    Ok(())
}
