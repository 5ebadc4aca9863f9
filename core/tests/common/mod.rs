//! Common test utilities and in-memory GPT disks

pub mod builder;
pub use builder::GptBuilder;

use bootgpt_core::disk::layout::{HEADER_BYTES, SECTOR_SIZE, TOTAL_ENTRIES_SIZE};
use bootgpt_core::{GptBuffers, GptData, Result};

/// The four GPT buffers of a drive, held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDisk {
    pub primary_header: Vec<u8>,
    pub secondary_header: Vec<u8>,
    pub primary_entries: Vec<u8>,
    pub secondary_entries: Vec<u8>,
    pub drive_sectors: u64,
}

impl TestDisk {
    /// Zeroed buffers; not a valid table until something writes one
    pub fn blank(drive_sectors: u64) -> Self {
        Self {
            primary_header: vec![0u8; HEADER_BYTES],
            secondary_header: vec![0u8; HEADER_BYTES],
            primary_entries: vec![0u8; TOTAL_ENTRIES_SIZE],
            secondary_entries: vec![0u8; TOTAL_ENTRIES_SIZE],
            drive_sectors,
        }
    }

    pub fn buffers(&mut self) -> GptBuffers<'_> {
        GptBuffers {
            primary_header: &mut self.primary_header,
            secondary_header: &mut self.secondary_header,
            primary_entries: &mut self.primary_entries,
            secondary_entries: &mut self.secondary_entries,
        }
    }

    /// Opens a session over the disk
    pub fn session(&mut self) -> Result<GptData<'_>> {
        let drive_sectors = self.drive_sectors;
        GptData::init(self.buffers(), SECTOR_SIZE, drive_sectors)
    }

    /// Buffer by number: 0/1 primary/secondary header, 2/3 primary/secondary entries
    pub fn buffer_mut(&mut self, which: usize) -> &mut Vec<u8> {
        match which {
            0 => &mut self.primary_header,
            1 => &mut self.secondary_header,
            2 => &mut self.primary_entries,
            _ => &mut self.secondary_entries,
        }
    }
}
