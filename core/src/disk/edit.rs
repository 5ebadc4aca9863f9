// Partition entry editing and lookup

use super::attributes::KernelAttributes;
use super::entry::{entry_mut, EntryViewMut};
use super::gpt::{DirtyMask, GptData};
use super::header::GptCopy;
use super::layout::MAX_ENTRY_SIZE;
use super::partition::PartitionInfo;
use crate::error::{GptError, Result};
use log::info;
use uguid::Guid;

/// Requested changes to one entry; `None` leaves a field as it is
///
/// A new partition needs at least `begin`, `size` and `type_guid`. A missing
/// `unique_guid` on a new partition is generated by the caller's closure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionEdit<'a> {
    /// 1-based slot; the first unused slot when absent
    pub number: Option<u32>,
    pub begin: Option<u64>,
    /// Length in sectors
    pub size: Option<u64>,
    pub type_guid: Option<Guid>,
    pub unique_guid: Option<Guid>,
    pub label: Option<&'a str>,
    pub successful: Option<bool>,
    pub tries: Option<u8>,
    pub priority: Option<u8>,
    /// Replaces the whole attribute word; the three fields above are
    /// ignored when set
    pub raw_attributes: Option<u64>,
}

impl GptData<'_> {
    /// Creates or modifies the entry in `edit.number` and returns its 1-based
    /// number.
    ///
    /// The edited table is validated before anything is kept. On error the
    /// entry is restored and no buffer is marked modified.
    pub fn add_partition<F>(&mut self, edit: &PartitionEdit<'_>, new_guid: F) -> Result<u32>
    where
        F: FnOnce() -> Guid,
    {
        let (num_entries, entry_size, first_usable, last_usable) = {
            let header = self.header(GptCopy::Primary)?;
            (
                header.num_entries(),
                header.entry_size(),
                header.first_usable_lba(),
                header.last_usable_lba(),
            )
        };

        let index = match edit.number {
            Some(number) if number == 0 || number > num_entries => {
                return Err(GptError::InvalidPartitionNumber)
            }
            Some(number) => number - 1,
            None => self
                .entries(GptCopy::Primary)?
                .iter()
                .find(|(_, entry)| entry.is_unused())
                .map(|(index, _)| index)
                .ok_or(GptError::NoFreeSlot)?,
        };

        let start = index as usize * entry_size as usize;
        let len = entry_size as usize;
        let mut backup = [0u8; MAX_ENTRY_SIZE as usize];
        backup[..len].copy_from_slice(&self.entries_buf(GptCopy::Primary)[start..start + len]);

        let result = self.apply_edit(index, entry_size, edit, new_guid).and_then(|()| {
            self.entries(GptCopy::Primary)?
                .check_ranges(first_usable, last_usable)
        });
        if let Err(err) = result {
            self.entries_buf_mut(GptCopy::Primary)[start..start + len]
                .copy_from_slice(&backup[..len]);
            return Err(err);
        }

        self.sync_secondary_entries();
        self.update_crc()?;
        self.mark_modified(DirtyMask::all());
        info!("partition {} updated", index + 1);
        Ok(index + 1)
    }

    /// Details of the slot with 1-based `number`, used or not
    pub fn partition_details(&self, number: u32) -> Result<PartitionInfo> {
        let entries = self.entries(GptCopy::Primary)?;
        let index = number.checked_sub(1).ok_or(GptError::InvalidPartitionNumber)?;
        let entry = entries
            .entry(index)
            .ok_or(GptError::InvalidPartitionNumber)?;
        Ok(PartitionInfo::from_entry(index, &entry))
    }

    /// Finds the occupied slot with the given unique GUID
    pub fn find_by_unique(&self, unique_guid: Guid) -> Result<PartitionInfo> {
        self.entries(GptCopy::Primary)?
            .used()
            .find(|(_, entry)| entry.unique_guid() == unique_guid)
            .map(|(index, entry)| PartitionInfo::from_entry(index, &entry))
            .ok_or(GptError::PartitionNotFound)
    }

    fn apply_edit<F>(
        &mut self,
        index: u32,
        entry_size: u32,
        edit: &PartitionEdit<'_>,
        new_guid: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Guid,
    {
        let buffer = self.entries_buf_mut(GptCopy::Primary);
        let mut entry =
            entry_mut(buffer, entry_size, index).ok_or(GptError::InvalidPartitionNumber)?;

        if entry.as_view().is_unused() {
            create_fields(&mut entry, edit, new_guid)?;
        }

        if let Some(type_guid) = edit.type_guid {
            entry.set_type_guid(type_guid);
        }
        if let Some(unique_guid) = edit.unique_guid {
            entry.set_unique_guid(unique_guid);
        }
        if let Some(begin) = edit.begin {
            // Moving the start keeps the length unless a size is given too
            let length = entry.as_view().sectors();
            entry.set_starting_lba(begin);
            if edit.size.is_none() && length > 0 {
                entry.set_ending_lba(end_lba(begin, length)?);
            }
        }
        if let Some(size) = edit.size {
            let begin = entry.as_view().starting_lba();
            entry.set_ending_lba(end_lba(begin, size)?);
        }
        if let Some(label) = edit.label {
            entry.set_label(label)?;
        }

        let mut attrs = match edit.raw_attributes {
            Some(raw) => KernelAttributes::from_raw(raw),
            None => entry.as_view().attributes(),
        };
        if edit.raw_attributes.is_none() {
            if let Some(successful) = edit.successful {
                attrs.set_successful(successful);
            }
            if let Some(tries) = edit.tries {
                attrs.set_tries(tries)?;
            }
            if let Some(priority) = edit.priority {
                attrs.set_priority(priority)?;
            }
        }
        entry.set_attributes(attrs);
        Ok(())
    }
}

/// Fields a fresh slot must receive before it counts as a partition
fn create_fields<F>(entry: &mut EntryViewMut<'_>, edit: &PartitionEdit<'_>, new_guid: F) -> Result<()>
where
    F: FnOnce() -> Guid,
{
    let type_guid = match (edit.begin, edit.size, edit.type_guid) {
        (Some(_), Some(_), Some(type_guid)) => type_guid,
        _ => return Err(GptError::MissingPartitionFields),
    };
    if type_guid == Guid::ZERO {
        return Err(GptError::UnusedPartitionType);
    }
    if edit.unique_guid.is_none() {
        entry.set_unique_guid(new_guid());
    }
    Ok(())
}

fn end_lba(begin: u64, size: u64) -> Result<u64> {
    if size == 0 {
        return Err(GptError::InvalidPartitionSize);
    }
    begin.checked_add(size - 1).ok_or(GptError::OutOfRegion)
}
