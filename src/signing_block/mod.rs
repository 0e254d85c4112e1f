//! Module for the APK Signing Block
//! <https://source.android.com/docs/security/features/apksigning>
//!
//! | size of block (u64) | ID/value pairs | size of block (u64) | magic "APK Sig Block 42" |
//!
//! The block sits right before the Central Directory. Both size fields count
//! everything after the leading size field, footer included.

use std::mem;

use log::{debug, trace};

#[cfg(feature = "serde")]
use serde::Serialize;

pub mod algorithms;
pub mod digest;
pub mod scheme_v2;

use crate::error::{Result, VerifyError};
use crate::utils::ByteWindow;
use crate::zip::ZipSections;
pub use scheme_v2::SIGNATURE_SCHEME_V2_BLOCK_ID;

/// Magic number of the APK Signing Block
pub const MAGIC: &[u8; 16] = b"APK Sig Block 42";

/// Length of the magic number
pub const MAGIC_LEN: usize = MAGIC.len();

/// Low half of the magic, read as a little-endian u64
pub const APK_SIG_BLOCK_MAGIC_LO: u64 = 0x2067_6953_204b_5041;

/// High half of the magic, read as a little-endian u64
pub const APK_SIG_BLOCK_MAGIC_HI: u64 = 0x3234_206b_636f_6c42;

/// <https://android.googlesource.com/platform/tools/apksig/+/master/src/main/java/com/android/apksig/internal/apk/ApkSigningBlockUtils.java>
pub const VERITY_PADDING_BLOCK_ID: u32 = 0x4272_6577;

/// <https://source.android.com/docs/security/features/apksigning/v3>
pub const SIGNATURE_SCHEME_V3_BLOCK_ID: u32 = 0xf053_68c0;

/// <https://android.googlesource.com/platform/frameworks/base/+/master/core/java/android/util/apk/SourceStampVerifier.java>
pub const SOURCE_STAMP_BLOCK_ID: u32 = 0x6dff_800d;

/// Size of a u64
const SIZE_UINT64: usize = mem::size_of::<u64>();

/// Size of the footer: size field and magic
const FOOTER_SIZE: usize = SIZE_UINT64 + MAGIC_LEN;

/// Smallest possible block: header size field and footer
pub const MIN_BLOCK_SIZE: usize = SIZE_UINT64 + FOOTER_SIZE;

/// Largest accepted value of the size fields
const MAX_BLOCK_SIZE_FIELD: u64 = 0x7fff_fff7;

/// Human readable name of a well-known pair ID
pub const fn block_id_name(id: u32) -> &'static str {
    match id {
        SIGNATURE_SCHEME_V2_BLOCK_ID => "APK Signature Scheme v2",
        SIGNATURE_SCHEME_V3_BLOCK_ID => "APK Signature Scheme v3",
        VERITY_PADDING_BLOCK_ID => "Verity padding",
        SOURCE_STAMP_BLOCK_ID => "Source stamp",
        _ => "Unknown",
    }
}

/// Where the APK Signing Block lives in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ApkSigningBlockLocation {
    /// Offset of the leading size field
    pub offset: u64,
    /// Size of the whole block, both size fields and magic included
    pub size_including_footers: u64,
}

/// Locate the APK Signing Block right before the Central Directory.
///
/// Returns the location and a window over the ID/value pairs.
///
/// # Errors
/// Returns [`VerifyError::SigningBlockMissing`] if there is no well-formed
/// block ending at the Central Directory.
pub fn find_signing_block<'a>(
    data: &'a [u8],
    zip: &ZipSections,
) -> Result<(ApkSigningBlockLocation, ByteWindow<'a>)> {
    let cd_offset = usize::try_from(zip.cd_offset)
        .map_err(|_| VerifyError::SigningBlockMissing("CD offset out of range".to_string()))?;
    if cd_offset < MIN_BLOCK_SIZE {
        return Err(VerifyError::SigningBlockMissing(format!(
            "CD offset {} leaves no room for a signing block",
            cd_offset
        )));
    }
    let file = ByteWindow::new(data);
    let missing = |_| {
        VerifyError::SigningBlockMissing(format!(
            "signing block before offset {} out of range",
            cd_offset
        ))
    };

    let mut footer = file.slice(cd_offset - FOOTER_SIZE, cd_offset).map_err(missing)?;
    let footer_size = footer.read_u64().map_err(missing)?;
    let magic_lo = footer.read_u64().map_err(missing)?;
    let magic_hi = footer.read_u64().map_err(missing)?;
    if magic_lo != APK_SIG_BLOCK_MAGIC_LO || magic_hi != APK_SIG_BLOCK_MAGIC_HI {
        return Err(VerifyError::SigningBlockMissing(
            "no APK Signing Block magic before the Central Directory".to_string(),
        ));
    }

    if footer_size < FOOTER_SIZE as u64 || footer_size > MAX_BLOCK_SIZE_FIELD {
        return Err(VerifyError::SigningBlockMissing(format!(
            "signing block size out of range: {}",
            footer_size
        )));
    }
    // bounded by MAX_BLOCK_SIZE_FIELD
    let total_size = footer_size as usize + SIZE_UINT64;
    let block_offset = cd_offset.checked_sub(total_size).ok_or_else(|| {
        VerifyError::SigningBlockMissing(format!(
            "signing block of {} bytes does not fit before offset {}",
            total_size, cd_offset
        ))
    })?;

    let mut block = file.slice(block_offset, cd_offset).map_err(missing)?;
    let header_size = block.read_u64().map_err(missing)?;
    if header_size != footer_size {
        return Err(VerifyError::SigningBlockMissing(format!(
            "signing block size mismatch: header {} vs footer {}",
            header_size, footer_size
        )));
    }

    let location = ApkSigningBlockLocation {
        offset: block_offset as u64,
        size_including_footers: total_size as u64,
    };
    debug!(
        "APK Signing Block at {} ({} bytes)",
        location.offset, location.size_including_footers
    );
    let pairs = block
        .slice(SIZE_UINT64, total_size - FOOTER_SIZE)
        .map_err(missing)?;
    Ok((location, pairs))
}

/// One ID/value pair of the signing block
#[derive(Debug, Clone, Copy)]
pub struct Pair<'a> {
    /// ID of the pair
    pub id: u32,
    /// Value, without the ID
    pub value: ByteWindow<'a>,
}

/// Walk the ID/value pairs of the signing block.
///
/// # Errors
/// Returns [`VerifyError::SignerParse`] if a pair length is shorter than its
/// ID, negative as a signed 32-bit value, or exceeds the remaining bytes.
pub fn pairs(mut block: ByteWindow<'_>) -> Result<Vec<Pair<'_>>> {
    let mut pairs = Vec::new();
    while block.has_remaining() {
        let pair_size = block.read_u64()?;
        if pair_size < mem::size_of::<u32>() as u64 || pair_size > i32::MAX as u64 {
            return Err(VerifyError::SignerParse(format!(
                "pair #{} size out of range: {}",
                pairs.len() + 1,
                pair_size
            )));
        }
        // bounded by i32::MAX
        let pair_size = pair_size as usize;
        if pair_size > block.remaining() {
            return Err(VerifyError::SignerParse(format!(
                "pair #{} size {} exceeds remaining {} bytes",
                pairs.len() + 1,
                pair_size,
                block.remaining()
            )));
        }
        let mut pair = ByteWindow::new(block.get_to(pair_size)?);
        let id = pair.read_u32()?;
        trace!("pair {:#010x} ({}): {} bytes", id, block_id_name(id), pair_size);
        let value = pair.slice(pair.get_pos(), pair.len())?;
        pairs.push(Pair { id, value });
    }
    Ok(pairs)
}

/// Find the APK Signature Scheme v2 block among the pairs.
///
/// # Errors
/// Returns [`VerifyError::SignerParse`] on a malformed pair and
/// [`VerifyError::SigningBlockMissing`] if there is no v2 pair.
pub fn find_v2_block(block: ByteWindow<'_>) -> Result<ByteWindow<'_>> {
    pairs(block)?
        .into_iter()
        .find(|p| p.id == SIGNATURE_SCHEME_V2_BLOCK_ID)
        .map(|p| p.value)
        .ok_or_else(|| {
            VerifyError::SigningBlockMissing(
                "no APK Signature Scheme v2 block in the APK Signing Block".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::zip_sections;

    fn pair(id: u32, value: &[u8]) -> Vec<u8> {
        [
            ((value.len() + 4) as u64).to_le_bytes().to_vec(),
            id.to_le_bytes().to_vec(),
            value.to_vec(),
        ]
        .concat()
    }

    fn block(pairs: &[u8]) -> Vec<u8> {
        let size = (pairs.len() + FOOTER_SIZE) as u64;
        [
            size.to_le_bytes().to_vec(),
            pairs.to_vec(),
            size.to_le_bytes().to_vec(),
            MAGIC.to_vec(),
        ]
        .concat()
    }

    /// entries, signing block, empty central directory, eocd
    fn apk(entries: &[u8], signing_block: &[u8]) -> Vec<u8> {
        let cd_offset = (entries.len() + signing_block.len()) as u32;
        let mut data = [entries, signing_block].concat();
        data.extend_from_slice(&0x0605_4b50_u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 8]);
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&cd_offset.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data
    }

    #[test]
    fn magic_halves_spell_the_magic() {
        let mut magic = APK_SIG_BLOCK_MAGIC_LO.to_le_bytes().to_vec();
        magic.extend_from_slice(&APK_SIG_BLOCK_MAGIC_HI.to_le_bytes());
        assert_eq!(magic, MAGIC);
        assert_eq!(APK_SIG_BLOCK_MAGIC_LO, 2_334_950_737_559_900_225);
        assert_eq!(APK_SIG_BLOCK_MAGIC_HI, 3_617_552_046_287_187_010);
    }

    #[test]
    fn locates_block_and_v2_pair() {
        let pairs = [pair(0x1234, b"other"), pair(SIGNATURE_SCHEME_V2_BLOCK_ID, b"v2")].concat();
        let signing_block = block(&pairs);
        let data = apk(&[0u8; 100], &signing_block);
        let zip = zip_sections(&data).unwrap();
        let (location, window) = find_signing_block(&data, &zip).unwrap();
        assert_eq!(location.offset, 100);
        assert_eq!(location.size_including_footers, signing_block.len() as u64);
        assert_eq!(window.as_bytes(), pairs.as_slice());
        assert_eq!(find_v2_block(window).unwrap().as_bytes(), b"v2");
    }

    #[test]
    fn missing_magic() {
        let data = apk(&[0u8; 100], &[]);
        let zip = zip_sections(&data).unwrap();
        assert!(matches!(
            find_signing_block(&data, &zip),
            Err(VerifyError::SigningBlockMissing(_))
        ));
    }

    #[test]
    fn cd_offset_too_small() {
        let data = apk(&[0u8; 31], &[]);
        let zip = zip_sections(&data).unwrap();
        assert!(matches!(
            find_signing_block(&data, &zip),
            Err(VerifyError::SigningBlockMissing(_))
        ));
    }

    #[test]
    fn header_footer_mismatch() {
        let mut signing_block = block(&pair(SIGNATURE_SCHEME_V2_BLOCK_ID, b"v2"));
        signing_block[0] ^= 1;
        let data = apk(&[0u8; 64], &signing_block);
        let zip = zip_sections(&data).unwrap();
        let err = find_signing_block(&data, &zip).unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn block_larger_than_file() {
        let mut signing_block = block(&[]);
        let huge = 0x1000_u64.to_le_bytes();
        signing_block[..8].copy_from_slice(&huge);
        signing_block[8..16].copy_from_slice(&huge);
        let data = apk(&[0u8; 8], &signing_block);
        let zip = zip_sections(&data).unwrap();
        assert!(matches!(
            find_signing_block(&data, &zip),
            Err(VerifyError::SigningBlockMissing(_))
        ));
    }

    #[test]
    fn no_v2_pair() {
        let pairs = pair(VERITY_PADDING_BLOCK_ID, &[0u8; 12]);
        assert!(matches!(
            find_v2_block(ByteWindow::new(&pairs)),
            Err(VerifyError::SigningBlockMissing(_))
        ));
    }

    #[test]
    fn malformed_pairs() {
        let mut short = pair(0x1, b"abc");
        short[..8].copy_from_slice(&2u64.to_le_bytes());
        assert!(matches!(
            pairs(ByteWindow::new(&short)),
            Err(VerifyError::SignerParse(_))
        ));

        let mut long = pair(0x1, b"abc");
        long[..8].copy_from_slice(&100u64.to_le_bytes());
        assert!(matches!(
            pairs(ByteWindow::new(&long)),
            Err(VerifyError::SignerParse(_))
        ));

        let mut negative = pair(0x1, b"abc");
        negative[..8].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            pairs(ByteWindow::new(&negative)),
            Err(VerifyError::SignerParse(_))
        ));
    }

    #[test]
    fn pair_names() {
        assert_eq!(block_id_name(SIGNATURE_SCHEME_V2_BLOCK_ID), "APK Signature Scheme v2");
        assert_eq!(block_id_name(7), "Unknown");
    }
}
