//! Loading the four GPT buffers from a drive and persisting dirty ones

use anyhow::{bail, Context, Result};
use bootgpt_core::disk::layout::{HEADER_BYTES, MIN_DRIVE_SECTORS, SECTOR_SIZE, TOTAL_ENTRIES_SIZE};
use bootgpt_core::{DirtyMask, GptBuffer, GptBuffers, GptData, GptError};
use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};
use log::debug;

/// In-memory copy of a drive's GPT sectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptImage {
    primary_header: Vec<u8>,
    secondary_header: Vec<u8>,
    primary_entries: Vec<u8>,
    secondary_entries: Vec<u8>,
    drive_sectors: u64,
}

impl GptImage {
    /// Zeroed buffers for a drive of `drive_sectors`
    pub fn blank(drive_sectors: u64) -> Self {
        Self {
            primary_header: vec![0u8; HEADER_BYTES],
            secondary_header: vec![0u8; HEADER_BYTES],
            primary_entries: vec![0u8; TOTAL_ENTRIES_SIZE],
            secondary_entries: vec![0u8; TOTAL_ENTRIES_SIZE],
            drive_sectors,
        }
    }

    /// Zeroed buffers sized for `device`
    pub fn for_device<B>(device: &mut B) -> Result<Self>
    where
        B: BlockIo,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        if device.block_size() != BlockSize::BS_512 {
            return Err(GptError::InvalidSectorSize.into());
        }
        let drive_sectors = device.num_blocks().context("cannot query drive size")?;
        if drive_sectors < MIN_DRIVE_SECTORS {
            bail!(
                "{}: {} sectors, at least {} required",
                GptError::InvalidSectorNumber,
                drive_sectors,
                MIN_DRIVE_SECTORS
            );
        }
        Ok(Self::blank(drive_sectors))
    }

    /// Reads both headers and both entries arrays
    pub fn read<B>(device: &mut B) -> Result<Self>
    where
        B: BlockIo,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let mut image = Self::for_device(device)?;
        for buffer in DirtyMask::all().write_order() {
            let lba = image.lba_of(buffer);
            device
                .read_blocks(Lba(lba), image.buffer_mut(buffer))
                .with_context(|| format!("cannot read {buffer:?} at LBA {lba}"))?;
        }
        Ok(image)
    }

    /// Writes every buffer named in `dirty`, entries before headers
    pub fn write_back<B>(&self, device: &mut B, dirty: DirtyMask) -> Result<()>
    where
        B: BlockIo,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        if dirty.is_empty() {
            return Ok(());
        }
        for buffer in dirty.write_order() {
            let lba = self.lba_of(buffer);
            debug!("writing {:?} at LBA {}", buffer, lba);
            device
                .write_blocks(Lba(lba), self.buffer(buffer))
                .with_context(|| format!("cannot write {buffer:?} at LBA {lba}"))?;
        }
        device.flush().context("cannot flush drive")?;
        Ok(())
    }

    pub fn drive_sectors(&self) -> u64 {
        self.drive_sectors
    }

    pub fn buffers(&mut self) -> GptBuffers<'_> {
        GptBuffers {
            primary_header: &mut self.primary_header,
            secondary_header: &mut self.secondary_header,
            primary_entries: &mut self.primary_entries,
            secondary_entries: &mut self.secondary_entries,
        }
    }

    fn lba_of(&self, buffer: GptBuffer) -> u64 {
        let copy = buffer.copy();
        if buffer.is_header() {
            copy.header_lba(self.drive_sectors)
        } else {
            copy.entries_lba(self.drive_sectors)
        }
    }

    fn buffer(&self, buffer: GptBuffer) -> &[u8] {
        match buffer {
            GptBuffer::PrimaryHeader => &self.primary_header,
            GptBuffer::SecondaryHeader => &self.secondary_header,
            GptBuffer::PrimaryEntries => &self.primary_entries,
            GptBuffer::SecondaryEntries => &self.secondary_entries,
        }
    }

    fn buffer_mut(&mut self, buffer: GptBuffer) -> &mut [u8] {
        match buffer {
            GptBuffer::PrimaryHeader => &mut self.primary_header,
            GptBuffer::SecondaryHeader => &mut self.secondary_header,
            GptBuffer::PrimaryEntries => &mut self.primary_entries,
            GptBuffer::SecondaryEntries => &mut self.secondary_entries,
        }
    }
}

/// Opens a session on `device`, runs `f`, then persists what changed.
///
/// Repairs made while opening are written back together with the changes
/// made by `f`. Nothing is written when `f` fails.
pub fn with_session<B, T, F>(device: &mut B, f: F) -> Result<T>
where
    B: BlockIo,
    B::Error: std::error::Error + Send + Sync + 'static,
    F: FnOnce(&mut GptData<'_>) -> Result<T>,
{
    let mut image = GptImage::read(device)?;
    let drive_sectors = image.drive_sectors;
    let (value, dirty) = {
        let mut gpt = GptData::init(image.buffers(), SECTOR_SIZE, drive_sectors)
            .context("cannot load GPT")?;
        let value = f(&mut gpt)?;
        (value, gpt.modified())
    };
    image.write_back(device, dirty)?;
    Ok(value)
}
