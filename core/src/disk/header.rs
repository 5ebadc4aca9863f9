//! GPT header codec and validator
//!
//! Headers are read and written through offset-based views over the caller's
//! sector buffer. Nothing is ever cast to a native struct.

use super::layout::{
    self, header as off, read_array, read_u32_le, read_u64_le, write_u32_le, write_u64_le,
    CHROMEOS_SIGNATURE, ENTRIES_SECTORS, ENTRY_SIZE_MULTIPLE, GPT_REVISION, GPT_SIGNATURE,
    MAX_ENTRY_SIZE, MAX_HEADER_SIZE, MIN_ENTRY_SIZE, MIN_FIRST_USABLE_LBA, MIN_HEADER_SIZE,
    PRIMARY_ENTRIES_LBA, PRIMARY_HEADER_LBA, TOTAL_ENTRIES_SIZE,
};
use crate::error::{GptError, Result};
use crc32fast::Hasher;
use uguid::Guid;

/// Which of the two redundant copies a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GptCopy {
    /// Header at LBA 1, entries right after it
    Primary,
    /// Header at the last LBA, entries right before it
    Secondary,
}

impl GptCopy {
    pub fn header_lba(self, drive_sectors: u64) -> u64 {
        match self {
            Self::Primary => PRIMARY_HEADER_LBA,
            Self::Secondary => drive_sectors.saturating_sub(1),
        }
    }

    pub fn alternate_lba(self, drive_sectors: u64) -> u64 {
        self.other().header_lba(drive_sectors)
    }

    pub fn entries_lba(self, drive_sectors: u64) -> u64 {
        match self {
            Self::Primary => PRIMARY_ENTRIES_LBA,
            Self::Secondary => drive_sectors.saturating_sub(1 + ENTRIES_SECTORS),
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

/// Header signature variants accepted by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// Standard "EFI PART"
    Efi,
    /// "CHROMEOS", hides the table from UEFI firmware
    ChromeOs,
}

impl Signature {
    pub fn bytes(self) -> &'static [u8; 8] {
        match self {
            Self::Efi => GPT_SIGNATURE,
            Self::ChromeOs => CHROMEOS_SIGNATURE,
        }
    }

    pub fn from_bytes(bytes: &[u8; 8]) -> Option<Self> {
        if bytes == GPT_SIGNATURE {
            Some(Self::Efi)
        } else if bytes == CHROMEOS_SIGNATURE {
            Some(Self::ChromeOs)
        } else {
            None
        }
    }
}

/// Read-only view of a header sector
#[derive(Clone, Copy)]
pub struct HeaderView<'a> {
    buffer: &'a [u8],
}

impl<'a> HeaderView<'a> {
    /// Wraps a header buffer; it must hold at least the 92 defined bytes
    pub fn new(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE as usize {
            return Err(GptError::InvalidHeaderSize);
        }
        Ok(Self { buffer })
    }

    pub fn signature(&self) -> [u8; 8] {
        read_array(self.buffer, off::SIGNATURE)
    }

    pub fn revision(&self) -> u32 {
        read_u32_le(self.buffer, off::REVISION)
    }

    pub fn header_size(&self) -> u32 {
        read_u32_le(self.buffer, off::HEADER_SIZE)
    }

    pub fn header_crc32(&self) -> u32 {
        read_u32_le(self.buffer, off::HEADER_CRC32)
    }

    pub fn reserved(&self) -> u32 {
        read_u32_le(self.buffer, off::RESERVED)
    }

    pub fn my_lba(&self) -> u64 {
        read_u64_le(self.buffer, off::MY_LBA)
    }

    pub fn alternate_lba(&self) -> u64 {
        read_u64_le(self.buffer, off::ALTERNATE_LBA)
    }

    pub fn first_usable_lba(&self) -> u64 {
        read_u64_le(self.buffer, off::FIRST_USABLE_LBA)
    }

    pub fn last_usable_lba(&self) -> u64 {
        read_u64_le(self.buffer, off::LAST_USABLE_LBA)
    }

    pub fn disk_guid(&self) -> Guid {
        Guid::from_bytes(read_array(self.buffer, off::DISK_GUID))
    }

    pub fn entries_lba(&self) -> u64 {
        read_u64_le(self.buffer, off::ENTRIES_LBA)
    }

    pub fn num_entries(&self) -> u32 {
        read_u32_le(self.buffer, off::NUM_ENTRIES)
    }

    pub fn entry_size(&self) -> u32 {
        read_u32_le(self.buffer, off::ENTRY_SIZE)
    }

    pub fn entries_crc32(&self) -> u32 {
        read_u32_le(self.buffer, off::ENTRIES_CRC32)
    }

    /// Size in bytes of the entries array this header describes
    pub fn entries_bytes(&self) -> u64 {
        self.num_entries() as u64 * self.entry_size() as u64
    }

    /// CRC32 over `header_size` bytes with the CRC field treated as zero.
    /// The size is clamped to the buffer so a hostile header cannot push the
    /// computation out of bounds.
    pub fn calculate_crc32(&self) -> u32 {
        let size = (self.header_size() as usize)
            .clamp(MIN_HEADER_SIZE as usize, self.buffer.len());
        header_crc32(&self.buffer[..size])
    }

    /// Validates this header as the given copy of a drive of `drive_sectors`
    pub fn check(&self, copy: GptCopy, drive_sectors: u64) -> Result<()> {
        if Signature::from_bytes(&self.signature()).is_none() {
            return Err(GptError::InvalidSignature);
        }
        if self.revision() != GPT_REVISION {
            return Err(GptError::InvalidRevision);
        }

        let size = self.header_size();
        if !(MIN_HEADER_SIZE..=MAX_HEADER_SIZE).contains(&size)
            || size as usize > self.buffer.len()
        {
            return Err(GptError::InvalidHeaderSize);
        }
        if self.calculate_crc32() != self.header_crc32() {
            return Err(GptError::CrcCorrupted);
        }
        if self.reserved() != 0 {
            return Err(GptError::ReservedNotZero);
        }

        let entry_size = self.entry_size();
        if !(MIN_ENTRY_SIZE..=MAX_ENTRY_SIZE).contains(&entry_size)
            || entry_size % ENTRY_SIZE_MULTIPLE != 0
            || self.entries_bytes() != TOTAL_ENTRIES_SIZE as u64
        {
            return Err(GptError::InvalidEntryGeometry);
        }

        // Entries must sit right next to their header
        if self.my_lba() != copy.header_lba(drive_sectors)
            || self.entries_lba() != copy.entries_lba(drive_sectors)
        {
            return Err(GptError::InvalidLocation);
        }

        let first = self.first_usable_lba();
        let last = self.last_usable_lba();
        if first < MIN_FIRST_USABLE_LBA
            || last >= drive_sectors.saturating_sub(1 + ENTRIES_SECTORS)
            || first > last
        {
            return Err(GptError::InvalidUsableRange);
        }

        Ok(())
    }

    /// True if every field not tied to the copy's position matches
    pub fn same_fields(&self, other: &HeaderView<'_>) -> bool {
        self.signature() == other.signature()
            && self.revision() == other.revision()
            && self.header_size() == other.header_size()
            && self.reserved() == other.reserved()
            && self.first_usable_lba() == other.first_usable_lba()
            && self.last_usable_lba() == other.last_usable_lba()
            && self.disk_guid() == other.disk_guid()
            && self.num_entries() == other.num_entries()
            && self.entry_size() == other.entry_size()
            && self.entries_crc32() == other.entries_crc32()
    }
}

/// Mutable view of a header sector
pub struct HeaderViewMut<'a> {
    buffer: &'a mut [u8],
}

impl<'a> HeaderViewMut<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE as usize {
            return Err(GptError::InvalidHeaderSize);
        }
        Ok(Self { buffer })
    }

    pub fn as_view(&self) -> HeaderView<'_> {
        HeaderView {
            buffer: &*self.buffer,
        }
    }

    pub fn set_signature(&mut self, signature: Signature) {
        self.buffer[off::SIGNATURE..off::SIGNATURE + 8].copy_from_slice(signature.bytes());
    }

    pub fn set_revision(&mut self, revision: u32) {
        write_u32_le(self.buffer, off::REVISION, revision);
    }

    pub fn set_header_size(&mut self, size: u32) {
        write_u32_le(self.buffer, off::HEADER_SIZE, size);
    }

    pub fn set_my_lba(&mut self, lba: u64) {
        write_u64_le(self.buffer, off::MY_LBA, lba);
    }

    pub fn set_alternate_lba(&mut self, lba: u64) {
        write_u64_le(self.buffer, off::ALTERNATE_LBA, lba);
    }

    pub fn set_first_usable_lba(&mut self, lba: u64) {
        write_u64_le(self.buffer, off::FIRST_USABLE_LBA, lba);
    }

    pub fn set_last_usable_lba(&mut self, lba: u64) {
        write_u64_le(self.buffer, off::LAST_USABLE_LBA, lba);
    }

    pub fn set_disk_guid(&mut self, guid: Guid) {
        self.buffer[off::DISK_GUID..off::DISK_GUID + 16].copy_from_slice(&guid.to_bytes());
    }

    pub fn set_entries_lba(&mut self, lba: u64) {
        write_u64_le(self.buffer, off::ENTRIES_LBA, lba);
    }

    pub fn set_num_entries(&mut self, count: u32) {
        write_u32_le(self.buffer, off::NUM_ENTRIES, count);
    }

    pub fn set_entry_size(&mut self, size: u32) {
        write_u32_le(self.buffer, off::ENTRY_SIZE, size);
    }

    pub fn set_entries_crc32(&mut self, crc: u32) {
        write_u32_le(self.buffer, off::ENTRIES_CRC32, crc);
    }

    /// Points the header at `copy`'s on-disk position
    pub fn relocate(&mut self, copy: GptCopy, drive_sectors: u64) {
        self.set_my_lba(copy.header_lba(drive_sectors));
        self.set_alternate_lba(copy.alternate_lba(drive_sectors));
        self.set_entries_lba(copy.entries_lba(drive_sectors));
    }

    /// Recomputes and stores the header CRC32
    pub fn update_crc32(&mut self) {
        let crc = self.as_view().calculate_crc32();
        write_u32_le(self.buffer, off::HEADER_CRC32, crc);
    }
}

/// CRC32 of a header image whose CRC field is skipped
fn header_crc32(bytes: &[u8]) -> u32 {
    let crc_end = off::HEADER_CRC32 + 4;
    let mut hasher = Hasher::new();
    hasher.update(&bytes[..off::HEADER_CRC32]);
    hasher.update(&[0u8; 4]);
    hasher.update(&bytes[crc_end..]);
    hasher.finalize()
}

/// CRC32 of an entries array
pub fn entries_crc32(entries: &[u8]) -> u32 {
    crc32fast::hash(entries)
}

/// Number of header bytes that are meaningful for copying between copies
pub(crate) fn copy_len(src: &[u8], dst: &[u8]) -> usize {
    src.len().min(dst.len()).min(layout::HEADER_BYTES)
}
