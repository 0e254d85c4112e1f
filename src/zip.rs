//! Zip file utilities - an APK is a zip file
//!
//! Only the tail of the archive is read: the End of Central Directory record
//! and the Central Directory position it declares. The local file entries are
//! never interpreted.

use std::mem;

use log::{debug, trace};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::error::{Result, VerifyError};
use crate::utils::{create_fixed_buffer_2, create_fixed_buffer_4};

/// End of Central Directory signature
const EOCD_SIG: u32 = 0x0605_4b50;
/// End of Central Directory signature as u8
const EOCD_SIG_U8: [u8; 4] = EOCD_SIG.to_le_bytes();
/// ZIP64 End of Central Directory locator signature
const ZIP64_EOCD_LOCATOR_SIG_U8: [u8; 4] = 0x0706_4b50_u32.to_le_bytes();
/// Size of the ZIP64 End of Central Directory locator
const ZIP64_EOCD_LOCATOR_SIZE: usize = 20;

/// Maximum comment length in ZIP (65535 bytes)
const MAX_COMMENT_LEN: usize = u16::MAX as usize;

/// Minimum EOCD record size (22 bytes without comment)
pub const MIN_EOCD_SIZE: usize = 22;

/// Offset of the Central Directory offset field inside the EOCD record
pub const EOCD_CD_OFFSET_FIELD: usize = 16;

/// Offset of the comment length field inside the EOCD record
const EOCD_COMMENT_LEN_FIELD: usize = 20;

/// End of Central Directory Record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectoryRecord {
    /// File offset
    pub file_offset: usize,
    /// Disk number
    pub disk_number: u16,
    /// Disk where the CD starts
    pub disk_with_cd: u16,
    /// Number of CD
    pub num_entries: u16,
    /// Total number CD
    pub total_entries: u16,
    /// Size of the CD
    pub cd_size: u32,
    /// Offset of the CD
    pub cd_offset: u32,
    /// Comment
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectoryRecord {
    /// Size of the record including its comment
    pub fn size(&self) -> usize {
        MIN_EOCD_SIZE + self.comment.len()
    }

    /// Copy of the record with another Central Directory offset
    #[must_use]
    pub fn with_cd_offset(&self, cd_offset: u32) -> Self {
        Self {
            cd_offset,
            ..self.clone()
        }
    }

    /// Convert the EOCD to a u8 vector
    pub fn to_u8(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.size());
        data.extend_from_slice(&EOCD_SIG_U8);
        data.extend_from_slice(&self.disk_number.to_le_bytes());
        data.extend_from_slice(&self.disk_with_cd.to_le_bytes());
        data.extend_from_slice(&self.num_entries.to_le_bytes());
        data.extend_from_slice(&self.total_entries.to_le_bytes());
        data.extend_from_slice(&self.cd_size.to_le_bytes());
        data.extend_from_slice(&self.cd_offset.to_le_bytes());
        data.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        data.extend_from_slice(&self.comment);
        data
    }

    /// Parse the record starting at `file_offset`
    fn parse(data: &[u8], file_offset: usize) -> Option<Self> {
        let record = data.get(file_offset..)?;
        let u16_at = |at: usize| {
            record
                .get(at..at + mem::size_of::<u16>())
                .map(|b| u16::from_le_bytes(create_fixed_buffer_2(b)))
        };
        let u32_at = |at: usize| {
            record
                .get(at..at + mem::size_of::<u32>())
                .map(|b| u32::from_le_bytes(create_fixed_buffer_4(b)))
        };
        let comment_len = u16_at(EOCD_COMMENT_LEN_FIELD)? as usize;
        Some(Self {
            file_offset,
            disk_number: u16_at(4)?,
            disk_with_cd: u16_at(6)?,
            num_entries: u16_at(8)?,
            total_entries: u16_at(10)?,
            cd_size: u32_at(12)?,
            cd_offset: u32_at(EOCD_CD_OFFSET_FIELD)?,
            comment: record
                .get(MIN_EOCD_SIZE..MIN_EOCD_SIZE + comment_len)?
                .to_vec(),
        })
    }
}

/// Find the EOCD of the APK file
///
/// Candidates are tried from the end of the file backwards. A candidate is
/// accepted only if its comment length accounts for every byte up to the end
/// of the file, so an EOCD signature planted inside a comment is skipped.
///
/// # Errors
/// Returns [`VerifyError::ZipFormat`] if the file is shorter than an EOCD
/// record or no consistent record exists.
pub fn find_eocd(data: &[u8]) -> Result<EndOfCentralDirectoryRecord> {
    let file_len = data.len();
    if file_len < MIN_EOCD_SIZE {
        return Err(VerifyError::ZipFormat(format!(
            "file of {} bytes is too small for a ZIP archive",
            file_len
        )));
    }

    let max_comment_len = MAX_COMMENT_LEN.min(file_len - MIN_EOCD_SIZE);
    for expected_comment_len in 0..=max_comment_len {
        let offset = file_len - MIN_EOCD_SIZE - expected_comment_len;
        if data.get(offset..offset + EOCD_SIG_U8.len()) != Some(EOCD_SIG_U8.as_slice()) {
            continue;
        }
        let comment_len = data
            .get(offset + EOCD_COMMENT_LEN_FIELD..offset + MIN_EOCD_SIZE)
            .map(|b| u16::from_le_bytes(create_fixed_buffer_2(b)) as usize);
        if comment_len != Some(expected_comment_len) {
            trace!(
                "EOCD signature at {} ignored: comment length does not reach end of file",
                offset
            );
            continue;
        }
        if let Some(eocd) = EndOfCentralDirectoryRecord::parse(data, offset) {
            return Ok(eocd);
        }
    }

    Err(VerifyError::ZipFormat("EOCD not found".to_string()))
}

/// Whether a ZIP64 End of Central Directory locator precedes the EOCD
fn is_zip64(data: &[u8], eocd_offset: usize) -> bool {
    eocd_offset
        .checked_sub(ZIP64_EOCD_LOCATOR_SIZE)
        .and_then(|start| data.get(start..start + ZIP64_EOCD_LOCATOR_SIG_U8.len()))
        == Some(ZIP64_EOCD_LOCATOR_SIG_U8.as_slice())
}

/// File sections of the APK (a zip file)
///
/// <https://source.android.com/docs/security/features/apksigning/v2>
///
/// |  Content of ZIP entries  | APK Signing Block |   Central Directory   | End of Central Directory |
/// |--------------------------|-------------------|-----------------------|--------------------------|
/// |                          |                   | `cd_offset` ->        | `eocd.file_offset` -> EOF |
///
/// The Central Directory always ends exactly where the EOCD starts.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ZipSections {
    /// Start of the Central Directory
    pub cd_offset: u64,
    /// Size of the Central Directory
    pub cd_size: u64,
    /// Start of the EOCD record
    pub eocd_offset: u64,
    /// Size of the EOCD record including its comment
    pub eocd_size: u64,
    /// Raw EOCD record
    #[cfg_attr(feature = "serde", serde(skip))]
    pub eocd: EndOfCentralDirectoryRecord,
}

/// Discover the layout of a zip file.
///
/// # Errors
/// Returns [`VerifyError::ZipFormat`] if there is no consistent EOCD, the
/// archive is ZIP64, or the Central Directory is not immediately followed by
/// the EOCD.
pub fn zip_sections(data: &[u8]) -> Result<ZipSections> {
    let eocd = find_eocd(data)?;
    let eocd_offset = eocd.file_offset as u64;

    if is_zip64(data, eocd.file_offset) {
        return Err(VerifyError::ZipFormat("ZIP64 archives are not supported".to_string()));
    }

    let cd_offset = u64::from(eocd.cd_offset);
    let cd_size = u64::from(eocd.cd_size);
    if cd_offset > eocd_offset {
        return Err(VerifyError::ZipFormat(format!(
            "Central Directory offset {} is past the EOCD at {}",
            cd_offset, eocd_offset
        )));
    }
    if cd_offset + cd_size != eocd_offset {
        return Err(VerifyError::ZipFormat(format!(
            "Central Directory {}+{} is not immediately followed by the EOCD at {}",
            cd_offset, cd_size, eocd_offset
        )));
    }

    debug!(
        "zip sections: cd {}+{}, eocd at {} ({} bytes)",
        cd_offset,
        cd_size,
        eocd_offset,
        eocd.size()
    );
    Ok(ZipSections {
        cd_offset,
        cd_size,
        eocd_offset,
        eocd_size: eocd.size() as u64,
        eocd,
    })
}
