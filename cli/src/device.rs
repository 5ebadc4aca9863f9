//! Disk image / block device access

use bootgpt_core::disk::layout::SECTOR_SIZE;
use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Sector device backed by a file or a raw block device node
#[derive(Debug)]
pub struct FileBlockDevice {
    file: File,
    sectors: u64,
}

impl FileBlockDevice {
    /// Opens an existing drive read-write
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file)
    }

    pub fn from_file(mut file: File) -> io::Result<Self> {
        // Block device nodes report a zero length in their metadata
        let bytes = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file,
            sectors: bytes / SECTOR_SIZE as u64,
        })
    }

    fn seek_to(&mut self, lba: Lba) -> io::Result<()> {
        let offset = lba
            .0
            .checked_mul(SECTOR_SIZE as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "LBA out of range"))?;
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl BlockIo for FileBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok(self.sectors)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        self.seek_to(start_lba)?;
        self.file.read_exact(dst)
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        self.seek_to(start_lba)?;
        self.file.write_all(src)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.file.flush()?;
        self.file.sync_data()
    }
}
