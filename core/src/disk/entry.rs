//! Partition entry codec and entries-array validator

use super::attributes::KernelAttributes;
use super::header::{entries_crc32, HeaderView};
use super::layout::{entry as off, read_array, read_u64_le, write_u64_le, LABEL_UNITS};
use crate::error::{GptError, Result};
use alloc::string::String;
use gpt_disk_types::GptPartitionType;
use uguid::Guid;

/// Read-only view of one entry record
#[derive(Clone, Copy)]
pub struct EntryView<'a> {
    buffer: &'a [u8],
}

impl<'a> EntryView<'a> {
    pub fn new(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < off::LAYOUT_SIZE {
            return Err(GptError::InvalidEntryGeometry);
        }
        Ok(Self { buffer })
    }

    pub fn type_guid(&self) -> Guid {
        Guid::from_bytes(read_array(self.buffer, off::TYPE_GUID))
    }

    pub fn partition_type(&self) -> GptPartitionType {
        GptPartitionType(self.type_guid())
    }

    pub fn unique_guid(&self) -> Guid {
        Guid::from_bytes(read_array(self.buffer, off::UNIQUE_GUID))
    }

    pub fn starting_lba(&self) -> u64 {
        read_u64_le(self.buffer, off::STARTING_LBA)
    }

    pub fn ending_lba(&self) -> u64 {
        read_u64_le(self.buffer, off::ENDING_LBA)
    }

    pub fn attributes(&self) -> KernelAttributes {
        KernelAttributes::from_raw(read_u64_le(self.buffer, off::ATTRIBUTES))
    }

    /// An all-zero type GUID marks an empty slot
    pub fn is_unused(&self) -> bool {
        self.type_guid().is_zero()
    }

    pub fn matches_type(&self, partition_type: &GptPartitionType) -> bool {
        &self.partition_type() == partition_type
    }

    /// Number of sectors covered, inclusive of both ends. Unused slots may
    /// hold any ending LBA, so an end of `u64::MAX` counts as empty.
    pub fn sectors(&self) -> u64 {
        inclusive_len(self.starting_lba(), self.ending_lba())
    }

    /// Label decoded from UTF-16LE, stopping at the first NUL
    pub fn label(&self) -> String {
        let units = self.label_units();
        let len = units.iter().position(|&u| u == 0).unwrap_or(LABEL_UNITS);
        String::from_utf16_lossy(&units[..len])
    }

    fn label_units(&self) -> [u16; LABEL_UNITS] {
        let mut units = [0u16; LABEL_UNITS];
        for (i, unit) in units.iter_mut().enumerate() {
            let at = off::NAME + i * 2;
            *unit = u16::from_le_bytes([self.buffer[at], self.buffer[at + 1]]);
        }
        units
    }
}

/// Mutable view of one entry record
pub struct EntryViewMut<'a> {
    buffer: &'a mut [u8],
}

impl<'a> EntryViewMut<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Result<Self> {
        if buffer.len() < off::LAYOUT_SIZE {
            return Err(GptError::InvalidEntryGeometry);
        }
        Ok(Self { buffer })
    }

    pub fn as_view(&self) -> EntryView<'_> {
        EntryView {
            buffer: &*self.buffer,
        }
    }

    pub fn set_type_guid(&mut self, guid: Guid) {
        self.buffer[off::TYPE_GUID..off::TYPE_GUID + 16].copy_from_slice(&guid.to_bytes());
    }

    pub fn set_unique_guid(&mut self, guid: Guid) {
        self.buffer[off::UNIQUE_GUID..off::UNIQUE_GUID + 16].copy_from_slice(&guid.to_bytes());
    }

    pub fn set_starting_lba(&mut self, lba: u64) {
        write_u64_le(self.buffer, off::STARTING_LBA, lba);
    }

    pub fn set_ending_lba(&mut self, lba: u64) {
        write_u64_le(self.buffer, off::ENDING_LBA, lba);
    }

    pub fn set_attributes(&mut self, attrs: KernelAttributes) {
        write_u64_le(self.buffer, off::ATTRIBUTES, attrs.raw());
    }

    /// Encodes `label` as UTF-16LE, NUL padded
    pub fn set_label(&mut self, label: &str) -> Result<()> {
        let mut units = [0u16; LABEL_UNITS];
        let mut len = 0;
        for unit in label.encode_utf16() {
            if len == LABEL_UNITS {
                return Err(GptError::LabelTooLong);
            }
            units[len] = unit;
            len += 1;
        }

        for (i, unit) in units.iter().enumerate() {
            let at = off::NAME + i * 2;
            self.buffer[at..at + 2].copy_from_slice(&unit.to_le_bytes());
        }
        Ok(())
    }
}

/// View of a whole entries array laid out per a header
#[derive(Clone, Copy)]
pub struct EntriesView<'a> {
    buffer: &'a [u8],
    entry_size: usize,
    num_entries: u32,
}

impl<'a> EntriesView<'a> {
    /// The buffer must be exactly `num_entries * entry_size` bytes
    pub fn new(buffer: &'a [u8], num_entries: u32, entry_size: u32) -> Result<Self> {
        if (entry_size as usize) < off::LAYOUT_SIZE {
            return Err(GptError::InvalidEntryGeometry);
        }
        if buffer.len() as u64 != num_entries as u64 * entry_size as u64 {
            return Err(GptError::EntriesBufferSize);
        }
        Ok(Self {
            buffer,
            entry_size: entry_size as usize,
            num_entries,
        })
    }

    /// Lays the buffer out using the geometry declared by `header`
    pub fn for_header(buffer: &'a [u8], header: &HeaderView<'_>) -> Result<Self> {
        Self::new(buffer, header.num_entries(), header.entry_size())
    }

    pub fn num_entries(&self) -> u32 {
        self.num_entries
    }

    pub fn entry(&self, index: u32) -> Option<EntryView<'a>> {
        if index >= self.num_entries {
            return None;
        }
        let start = index as usize * self.entry_size;
        Some(EntryView {
            buffer: &self.buffer[start..start + self.entry_size],
        })
    }

    /// Iterates all slots, used or not, with their zero-based index
    pub fn iter(&self) -> impl Iterator<Item = (u32, EntryView<'a>)> + 'a {
        let buffer: &'a [u8] = self.buffer;
        buffer
            .chunks_exact(self.entry_size)
            .enumerate()
            .map(|(i, chunk)| (i as u32, EntryView { buffer: chunk }))
    }

    /// Iterates occupied slots only
    pub fn used(&self) -> impl Iterator<Item = (u32, EntryView<'a>)> + 'a {
        self.iter().filter(|(_, entry)| !entry.is_unused())
    }

    pub fn crc32(&self) -> u32 {
        entries_crc32(self.buffer)
    }

    /// Full validation against the governing header: CRC, then ranges
    pub fn check(&self, header: &HeaderView<'_>) -> Result<()> {
        if self.crc32() != header.entries_crc32() {
            return Err(GptError::CrcCorrupted);
        }
        self.check_ranges(header.first_usable_lba(), header.last_usable_lba())
    }

    /// Every occupied entry must lie inside the usable region, must not
    /// overlap another occupied entry and must have a unique GUID of its own.
    pub fn check_ranges(&self, first_usable: u64, last_usable: u64) -> Result<()> {
        for (i, entry) in self.used() {
            let start = entry.starting_lba();
            let end = entry.ending_lba();
            if start < first_usable || end > last_usable || end < start {
                return Err(GptError::OutOfRegion);
            }

            for (_, other) in self.used().filter(|(j, _)| *j > i) {
                let other_start = other.starting_lba();
                let other_end = other.ending_lba();

                if other_start >= start && other_start <= end {
                    return Err(GptError::StartLbaOverlap);
                }
                if other_end >= start && other_end <= end {
                    return Err(GptError::EndLbaOverlap);
                }
                // `other` swallows this entry whole
                if other_start < start && other_end > end {
                    return Err(GptError::StartLbaOverlap);
                }
                if other.unique_guid() == entry.unique_guid() {
                    return Err(GptError::DupGuid);
                }
            }
        }
        Ok(())
    }
}

/// Mutable access to the entry at `index` of an entries buffer
pub fn entry_mut(buffer: &mut [u8], entry_size: u32, index: u32) -> Option<EntryViewMut<'_>> {
    let entry_size = entry_size as usize;
    let start = (index as usize).checked_mul(entry_size)?;
    let end = start.checked_add(entry_size)?;
    let slot = buffer.get_mut(start..end)?;
    EntryViewMut::new(slot).ok()
}

/// Sectors in `start..=end`, zero when the range is empty or unrepresentable
pub(crate) fn inclusive_len(start: u64, end: u64) -> u64 {
    end.checked_add(1).map_or(0, |e| e.saturating_sub(start))
}
