// Partition types and per-slot details

use super::attributes::KernelAttributes;
use super::entry::{inclusive_len, EntryView};
use alloc::string::String;
use gpt_disk_types::{guid, GptPartitionType as GptType};
use uguid::Guid;

/// Type GUID the kernel selector looks for
pub const CHROMEOS_KERNEL: GptType = GptType(guid!("fe3a2a5d-4f32-41a7-b725-accc3285a309"));
pub const CHROMEOS_ROOTFS: GptType = GptType(guid!("3cb8e202-3b7e-47dd-8a3c-7ff2a13cfcec"));
pub const CHROMEOS_FIRMWARE: GptType = GptType(guid!("cab6e88e-abf3-4102-a07a-d4bb9be3c1d3"));
pub const CHROMEOS_RESERVED: GptType = GptType(guid!("2e0a753d-9e48-43b0-8337-b15192cb1b5e"));
pub const LINUX_FILESYSTEM: GptType = GptType(guid!("0fc63daf-8483-4772-8e79-3d69d8477de4"));

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PartitionType {
    Unused,
    ChromeOsKernel,
    ChromeOsRootfs,
    ChromeOsFirmware,
    ChromeOsReserved,
    LinuxFilesystem,
    BasicData,
    EfiSystem,
    Unknown,
}

const NAMED_TYPES: [PartitionType; 8] = [
    PartitionType::Unused,
    PartitionType::ChromeOsKernel,
    PartitionType::ChromeOsRootfs,
    PartitionType::ChromeOsFirmware,
    PartitionType::ChromeOsReserved,
    PartitionType::LinuxFilesystem,
    PartitionType::BasicData,
    PartitionType::EfiSystem,
];

impl PartitionType {
    /// Convert from gpt_disk_types GUID to PartitionType
    pub fn from_gpt_guid(guid: &GptType) -> Self {
        NAMED_TYPES
            .iter()
            .copied()
            .find(|t| &t.to_gpt_guid() == guid)
            .unwrap_or(PartitionType::Unknown)
    }

    /// Convert to gpt_disk_types GUID
    pub fn to_gpt_guid(&self) -> GptType {
        match self {
            PartitionType::ChromeOsKernel => CHROMEOS_KERNEL,
            PartitionType::ChromeOsRootfs => CHROMEOS_ROOTFS,
            PartitionType::ChromeOsFirmware => CHROMEOS_FIRMWARE,
            PartitionType::ChromeOsReserved => CHROMEOS_RESERVED,
            PartitionType::LinuxFilesystem => LINUX_FILESYSTEM,
            PartitionType::BasicData => GptType::BASIC_DATA,
            PartitionType::EfiSystem => GptType::EFI_SYSTEM,
            PartitionType::Unused | PartitionType::Unknown => GptType::UNUSED,
        }
    }

    /// Short name accepted by the editor's `-t` option
    pub fn type_name(&self) -> &'static str {
        match self {
            PartitionType::Unused => "unused",
            PartitionType::ChromeOsKernel => "kernel",
            PartitionType::ChromeOsRootfs => "rootfs",
            PartitionType::ChromeOsFirmware => "firmware",
            PartitionType::ChromeOsReserved => "reserved",
            PartitionType::LinuxFilesystem => "data",
            PartitionType::BasicData => "basicdata",
            PartitionType::EfiSystem => "efi",
            PartitionType::Unknown => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        NAMED_TYPES
            .iter()
            .copied()
            .find(|t| t.type_name().eq_ignore_ascii_case(name))
    }

    /// Every type that has a name, for usage text
    pub fn named() -> &'static [PartitionType] {
        &NAMED_TYPES
    }
}

/// Decoded contents of one occupied slot
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionInfo {
    /// 1-based partition number
    pub number: u32,
    pub type_guid: Guid,
    pub unique_guid: Guid,
    pub start_lba: u64,
    pub end_lba: u64,
    pub attributes: KernelAttributes,
    pub label: String,
}

impl PartitionInfo {
    pub(crate) fn from_entry(index: u32, entry: &EntryView<'_>) -> Self {
        Self {
            number: index + 1,
            type_guid: entry.type_guid(),
            unique_guid: entry.unique_guid(),
            start_lba: entry.starting_lba(),
            end_lba: entry.ending_lba(),
            attributes: entry.attributes(),
            label: entry.label(),
        }
    }

    pub fn size_lba(&self) -> u64 {
        inclusive_len(self.start_lba, self.end_lba)
    }

    pub fn partition_type(&self) -> PartitionType {
        PartitionType::from_gpt_guid(&GptType(self.type_guid))
    }

    pub fn type_name(&self) -> &'static str {
        self.partition_type().type_name()
    }
}
