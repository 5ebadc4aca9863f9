//! On-disk GPT geometry and field offsets
//!
//! All multi-byte fields are little-endian. Offsets are relative to the start
//! of the header sector or the start of an entry record.

/// Only 512-byte sectors are supported
pub const SECTOR_SIZE: u32 = 512;

/// Bytes reserved for one header (one sector)
pub const HEADER_BYTES: usize = 512;

/// Size of a whole entries array: 128 entries x 128 bytes
pub const TOTAL_ENTRIES_SIZE: usize = 16384;

/// Sectors occupied by the entries array (TOTAL_ENTRIES_SIZE / SECTOR_SIZE)
pub const ENTRIES_SECTORS: u64 = 32;

/// Sectors in front of the primary header (protective MBR)
pub const PMBR_SECTORS: u64 = 1;

/// PMBR + two headers + two entries arrays
pub const MIN_DRIVE_SECTORS: u64 = PMBR_SECTORS + 2 * (1 + ENTRIES_SECTORS);

/// LBA of the primary header
pub const PRIMARY_HEADER_LBA: u64 = 1;

/// LBA of the primary entries array
pub const PRIMARY_ENTRIES_LBA: u64 = PRIMARY_HEADER_LBA + 1;

/// Lowest first-usable LBA a valid header may declare
pub const MIN_FIRST_USABLE_LBA: u64 = PRIMARY_ENTRIES_LBA + ENTRIES_SECTORS;

pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
/// Signature written by `legacy` to hide the table from UEFI firmware
pub const CHROMEOS_SIGNATURE: &[u8; 8] = b"CHROMEOS";
pub const GPT_REVISION: u32 = 0x0001_0000;

pub const MIN_HEADER_SIZE: u32 = 92;
pub const MAX_HEADER_SIZE: u32 = HEADER_BYTES as u32;

pub const DEFAULT_ENTRY_SIZE: u32 = 128;
pub const MIN_ENTRY_SIZE: u32 = 128;
pub const MAX_ENTRY_SIZE: u32 = 512;
pub const ENTRY_SIZE_MULTIPLE: u32 = 8;
pub const DEFAULT_NUM_ENTRIES: u32 = (TOTAL_ENTRIES_SIZE as u32) / DEFAULT_ENTRY_SIZE;

/// UTF-16 code units in an entry label
pub const LABEL_UNITS: usize = 36;

pub mod header {
    pub const SIGNATURE: usize = 0x00;
    pub const REVISION: usize = 0x08;
    pub const HEADER_SIZE: usize = 0x0c;
    pub const HEADER_CRC32: usize = 0x10;
    pub const RESERVED: usize = 0x14;
    pub const MY_LBA: usize = 0x18;
    pub const ALTERNATE_LBA: usize = 0x20;
    pub const FIRST_USABLE_LBA: usize = 0x28;
    pub const LAST_USABLE_LBA: usize = 0x30;
    pub const DISK_GUID: usize = 0x38;
    pub const ENTRIES_LBA: usize = 0x48;
    pub const NUM_ENTRIES: usize = 0x50;
    pub const ENTRY_SIZE: usize = 0x54;
    pub const ENTRIES_CRC32: usize = 0x58;
}

pub mod entry {
    pub const TYPE_GUID: usize = 0x00;
    pub const UNIQUE_GUID: usize = 0x10;
    pub const STARTING_LBA: usize = 0x20;
    pub const ENDING_LBA: usize = 0x28;
    pub const ATTRIBUTES: usize = 0x30;
    pub const NAME: usize = 0x38;
    /// Bytes of an entry this crate interprets
    pub const LAYOUT_SIZE: usize = 0x80;
}

/// Reads a little-endian u32 at `offset`
pub(crate) fn read_u32_le(buffer: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buffer[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

/// Reads a little-endian u64 at `offset`
pub(crate) fn read_u64_le(buffer: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buffer[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn read_array<const N: usize>(buffer: &[u8], offset: usize) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&buffer[offset..offset + N]);
    bytes
}

pub(crate) fn write_u32_le(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u64_le(buffer: &mut [u8], offset: usize, value: u64) {
    buffer[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
