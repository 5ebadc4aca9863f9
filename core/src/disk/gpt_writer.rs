// GPT creation

use super::gpt::{DirtyMask, GptBuffers};
use super::header::{entries_crc32, GptCopy, HeaderViewMut, Signature};
use super::layout::{
    DEFAULT_ENTRY_SIZE, DEFAULT_NUM_ENTRIES, GPT_REVISION, MIN_DRIVE_SECTORS,
    MIN_FIRST_USABLE_LBA, MIN_HEADER_SIZE, TOTAL_ENTRIES_SIZE,
};
use crate::error::{GptError, Result};
use log::info;
use uguid::Guid;

/// Writes an empty table into all four buffers.
///
/// The usable region spans LBA 34 through `drive_sectors - 34`; the table
/// holds 128 entries of 128 bytes. Returns the mask of buffers to persist,
/// which is always all four.
pub fn create_gpt(buffers: GptBuffers<'_>, drive_sectors: u64, disk_guid: Guid) -> Result<DirtyMask> {
    if drive_sectors < MIN_DRIVE_SECTORS {
        return Err(GptError::InvalidSectorNumber);
    }
    let last_usable = drive_sectors - MIN_FIRST_USABLE_LBA;
    if last_usable < MIN_FIRST_USABLE_LBA {
        return Err(GptError::InvalidUsableRange);
    }
    let GptBuffers {
        primary_header,
        secondary_header,
        primary_entries,
        secondary_entries,
    } = buffers;
    if primary_entries.len() != TOTAL_ENTRIES_SIZE || secondary_entries.len() != TOTAL_ENTRIES_SIZE
    {
        return Err(GptError::EntriesBufferSize);
    }

    primary_entries.fill(0);
    secondary_entries.fill(0);
    let crc = entries_crc32(primary_entries);

    for (copy, buffer) in [
        (GptCopy::Primary, primary_header),
        (GptCopy::Secondary, secondary_header),
    ] {
        buffer.fill(0);
        let mut header = HeaderViewMut::new(buffer)?;
        header.set_signature(Signature::Efi);
        header.set_revision(GPT_REVISION);
        header.set_header_size(MIN_HEADER_SIZE);
        header.relocate(copy, drive_sectors);
        header.set_first_usable_lba(MIN_FIRST_USABLE_LBA);
        header.set_last_usable_lba(last_usable);
        header.set_disk_guid(disk_guid);
        header.set_num_entries(DEFAULT_NUM_ENTRIES);
        header.set_entry_size(DEFAULT_ENTRY_SIZE);
        header.set_entries_crc32(crc);
        header.update_crc32();
    }

    info!(
        "created GPT on {} sectors, disk GUID {}",
        drive_sectors, disk_guid
    );
    Ok(DirtyMask::all())
}
