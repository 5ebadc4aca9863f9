//! Kernel priority renumbering
//!
//! Active kernels (priority above zero) are ranked by priority, highest
//! first. Kernels sharing a priority form one rank. Optionally one kernel,
//! and with `friends` every kernel that shared its old priority, is moved to
//! the top rank. Ranks are then numbered downward from the top priority;
//! ranks that would fall below 1 are folded into priority 1, so no active
//! kernel is ever switched off.

use super::attributes::MAX_PRIORITY;
use super::entry::entry_mut;
use super::gpt::{DirtyMask, GptData};
use super::header::GptCopy;
use super::partition::CHROMEOS_KERNEL;
use crate::error::{GptError, Result};
use alloc::vec::Vec;
use log::{debug, info};

impl GptData<'_> {
    /// Renumbers kernel priorities, keeping their relative order.
    ///
    /// * `number` - 1-based kernel to move to the top rank
    /// * `max_priority` - priority of the top rank, 1-15. Defaults to the
    ///   number of ranks, so the lowest active kernel ends up at 1
    /// * `friends` - also lift kernels that shared `number`'s old priority
    ///
    /// Only the priority field changes. Both entries arrays and both headers
    /// are rewritten and the returned mask names all four buffers.
    pub fn prioritize(
        &mut self,
        number: Option<u32>,
        max_priority: Option<u8>,
        friends: bool,
    ) -> Result<DirtyMask> {
        if let Some(max) = max_priority {
            if max == 0 || max > MAX_PRIORITY {
                return Err(GptError::AttributeOutOfRange);
            }
        }

        let (entry_size, num_entries) = {
            let header = self.header(GptCopy::Primary)?;
            (header.entry_size(), header.num_entries())
        };
        let kernels: Vec<(u32, u8)> = self
            .entries(GptCopy::Primary)?
            .used()
            .filter(|(_, entry)| entry.matches_type(&CHROMEOS_KERNEL))
            .map(|(index, entry)| (index, entry.attributes().priority()))
            .collect();

        let mut top: Vec<u32> = Vec::new();
        if let Some(number) = number {
            if number == 0 || number > num_entries {
                return Err(GptError::InvalidPartitionNumber);
            }
            let target = number - 1;
            let (_, old_priority) = kernels
                .iter()
                .copied()
                .find(|&(index, _)| index == target)
                .ok_or(GptError::NotKernelPartition)?;
            top.push(target);
            if friends && old_priority > 0 {
                top.extend(
                    kernels
                        .iter()
                        .filter(|&&(index, priority)| index != target && priority == old_priority)
                        .map(|&(index, _)| index),
                );
            }
        }

        let mut rest: Vec<(u32, u8)> = kernels
            .iter()
            .copied()
            .filter(|&(index, priority)| priority > 0 && !top.contains(&index))
            .collect();
        rest.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut ranks: Vec<Vec<u32>> = Vec::new();
        if !top.is_empty() {
            ranks.push(top);
        }
        let mut last_priority = None;
        for (index, priority) in rest {
            match ranks.last_mut() {
                Some(rank) if last_priority == Some(priority) => rank.push(index),
                _ => ranks.push(alloc::vec![index]),
            }
            last_priority = Some(priority);
        }

        if ranks.is_empty() {
            debug!("no active kernel to prioritize");
            return Ok(self.modified());
        }

        let max = max_priority.unwrap_or_else(|| ranks.len().min(MAX_PRIORITY as usize) as u8);
        for (rank, indices) in ranks.iter().enumerate() {
            let priority = (max as usize).saturating_sub(rank).max(1) as u8;
            for &index in indices {
                let mut entry = entry_mut(self.entries_buf_mut(GptCopy::Primary), entry_size, index)
                    .ok_or(GptError::InvalidPartitionNumber)?;
                let mut attrs = entry.as_view().attributes();
                attrs.set_priority(priority)?;
                entry.set_attributes(attrs);
            }
        }

        info!(
            "renumbered {} kernel rank(s), top priority {}",
            ranks.len(),
            max
        );
        self.sync_secondary_entries();
        self.update_crc()?;
        self.mark_modified(DirtyMask::all());
        Ok(self.modified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::edit::PartitionEdit;
    use crate::disk::gpt::GptBuffers;
    use crate::disk::gpt_writer::create_gpt;
    use crate::disk::layout::{HEADER_BYTES, SECTOR_SIZE, TOTAL_ENTRIES_SIZE};
    use crate::disk::partition::CHROMEOS_ROOTFS;
    use alloc::vec;
    use uguid::Guid;

    const DRIVE_SECTORS: u64 = 2048;

    struct Disk {
        headers: [Vec<u8>; 2],
        entries: [Vec<u8>; 2],
    }

    impl Disk {
        /// A kernel at priority 3 in slot 1 and a rootfs in slot 2
        fn new() -> Self {
            let mut disk = Self {
                headers: [vec![0u8; HEADER_BYTES], vec![0u8; HEADER_BYTES]],
                entries: [vec![0u8; TOTAL_ENTRIES_SIZE], vec![0u8; TOTAL_ENTRIES_SIZE]],
            };
            create_gpt(disk.buffers(), DRIVE_SECTORS, Guid::from_bytes([4; 16])).unwrap();
            let mut gpt = disk.session();
            for (i, type_guid) in [CHROMEOS_KERNEL.0, CHROMEOS_ROOTFS.0].into_iter().enumerate() {
                let edit = PartitionEdit {
                    begin: Some(64 + i as u64 * 64),
                    size: Some(64),
                    type_guid: Some(type_guid),
                    priority: Some(3),
                    ..PartitionEdit::default()
                };
                gpt.add_partition(&edit, || Guid::from_bytes([i as u8 + 1; 16]))
                    .unwrap();
            }
            drop(gpt);
            disk
        }

        fn buffers(&mut self) -> GptBuffers<'_> {
            let [h1, h2] = &mut self.headers;
            let [e1, e2] = &mut self.entries;
            GptBuffers {
                primary_header: h1,
                secondary_header: h2,
                primary_entries: e1,
                secondary_entries: e2,
            }
        }

        fn session(&mut self) -> GptData<'_> {
            GptData::init(self.buffers(), SECTOR_SIZE, DRIVE_SECTORS).unwrap()
        }
    }

    #[test]
    fn test_rejected_arguments_change_nothing() {
        let mut disk = Disk::new();
        let mut gpt = disk.session();
        assert_eq!(
            gpt.prioritize(None, Some(0), false),
            Err(GptError::AttributeOutOfRange)
        );
        assert_eq!(
            gpt.prioritize(None, Some(16), false),
            Err(GptError::AttributeOutOfRange)
        );
        assert_eq!(
            gpt.prioritize(Some(0), None, false),
            Err(GptError::InvalidPartitionNumber)
        );
        assert_eq!(
            gpt.prioritize(Some(2), None, false),
            Err(GptError::NotKernelPartition)
        );
        assert_eq!(
            gpt.prioritize(Some(7), None, false),
            Err(GptError::NotKernelPartition)
        );
        assert_eq!(gpt.modified(), DirtyMask::empty());
    }

    #[test]
    fn test_non_kernel_priority_untouched() {
        let mut disk = Disk::new();
        let mut gpt = disk.session();
        assert_eq!(gpt.prioritize(None, Some(9), false), Ok(DirtyMask::all()));
        assert_eq!(gpt.partition_details(1).unwrap().attributes.priority(), 9);
        assert_eq!(gpt.partition_details(2).unwrap().attributes.priority(), 3);
        drop(gpt);

        assert_eq!(disk.entries[0], disk.entries[1]);
        assert_eq!(disk.session().modified(), DirtyMask::empty());
    }
}
