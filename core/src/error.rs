//! Error types for GPT engine operations

use core::fmt;

/// Result type for GPT engine operations
pub type Result<T> = core::result::Result<T, GptError>;

/// Errors that can occur while validating, repairing or updating a GPT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GptError {
    /// No bootable kernel partition remains
    NoValidKernel,

    /// Both partition table headers are invalid
    InvalidHeaders,

    /// Both partition entry arrays are invalid
    InvalidEntries,

    /// Sector size is not supported
    InvalidSectorSize,

    /// Drive is too small to hold two GPT copies
    InvalidSectorNumber,

    /// Unknown boot outcome value
    InvalidUpdateType,

    /// No kernel has been selected in this session
    NoCurrentKernel,

    /// Header signature is neither "EFI PART" nor "CHROMEOS"
    InvalidSignature,

    /// Header revision is not 1.0
    InvalidRevision,

    /// Declared header size is out of bounds or larger than the buffer
    InvalidHeaderSize,

    /// Reserved header field is not zero
    ReservedNotZero,

    /// Entry size or entry count is unsupported
    InvalidEntryGeometry,

    /// Header or entries LBA does not match the copy's physical position
    InvalidLocation,

    /// First/last usable LBA range is inconsistent with the drive
    InvalidUsableRange,

    /// Stored CRC32 does not match the computed one
    CrcCorrupted,

    /// Entries buffer length does not match count x size
    EntriesBufferSize,

    /// Partition lies outside the usable region
    OutOfRegion,

    /// Partition starts inside another partition
    StartLbaOverlap,

    /// Partition ends inside another partition
    EndLbaOverlap,

    /// Two partitions share a unique GUID
    DupGuid,

    /// Partition number is zero or beyond the entry count
    InvalidPartitionNumber,

    /// Every entry slot is occupied
    NoFreeSlot,

    /// New partitions need begin, size and type
    MissingPartitionFields,

    /// Partition type may not be the unused GUID
    UnusedPartitionType,

    /// Partition size must be at least one sector
    InvalidPartitionSize,

    /// Label does not fit in 36 UTF-16 code units
    LabelTooLong,

    /// Attribute value does not fit its bit field
    AttributeOutOfRange,

    /// No partition carries the requested unique GUID
    PartitionNotFound,

    /// Partition is not a ChromeOS kernel
    NotKernelPartition,
}

impl GptError {
    /// Returns true for errors after which no trustworthy table exists
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidHeaders
                | Self::InvalidEntries
                | Self::InvalidSectorSize
                | Self::InvalidSectorNumber
        )
    }
}

impl fmt::Display for GptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoValidKernel => write!(f, "No valid kernel partition"),
            Self::InvalidHeaders => write!(f, "Both GPT headers are invalid"),
            Self::InvalidEntries => write!(f, "Both GPT entry arrays are invalid"),
            Self::InvalidSectorSize => write!(f, "Unsupported sector size"),
            Self::InvalidSectorNumber => write!(f, "Drive is too small"),
            Self::InvalidUpdateType => write!(f, "Invalid kernel update type"),
            Self::NoCurrentKernel => write!(f, "No kernel partition selected"),
            Self::InvalidSignature => write!(f, "Invalid GPT header signature"),
            Self::InvalidRevision => write!(f, "Unsupported GPT header revision"),
            Self::InvalidHeaderSize => write!(f, "Invalid GPT header size"),
            Self::ReservedNotZero => write!(f, "Reserved GPT header field is not zero"),
            Self::InvalidEntryGeometry => write!(f, "Unsupported entry size or count"),
            Self::InvalidLocation => write!(f, "GPT header or entries at the wrong LBA"),
            Self::InvalidUsableRange => write!(f, "Invalid first/last usable LBA"),
            Self::CrcCorrupted => write!(f, "CRC32 mismatch"),
            Self::EntriesBufferSize => write!(f, "Entries buffer size mismatch"),
            Self::OutOfRegion => write!(f, "Partition outside the usable region"),
            Self::StartLbaOverlap => write!(f, "Partition start overlaps another partition"),
            Self::EndLbaOverlap => write!(f, "Partition end overlaps another partition"),
            Self::DupGuid => write!(f, "Duplicate partition unique GUID"),
            Self::InvalidPartitionNumber => write!(f, "Invalid partition number"),
            Self::NoFreeSlot => write!(f, "No unused partition slot available"),
            Self::MissingPartitionFields => {
                write!(f, "New partitions require begin, size and type")
            }
            Self::UnusedPartitionType => write!(f, "Partition type cannot be \"unused\""),
            Self::InvalidPartitionSize => write!(f, "Partition size must be non-zero"),
            Self::LabelTooLong => write!(f, "Label does not fit in 36 UTF-16 code units"),
            Self::AttributeOutOfRange => write!(f, "Attribute value out of range"),
            Self::PartitionNotFound => write!(f, "No partition with that unique GUID"),
            Self::NotKernelPartition => write!(f, "Partition is not a ChromeOS kernel"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GptError {}
