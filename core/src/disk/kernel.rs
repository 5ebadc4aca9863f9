//! Kernel boot-priority selection and outcome recording
//!
//! The firmware asks for the next kernel to try with
//! [`GptData::next_kernel_entry`], which walks kernel partitions in strictly
//! descending priority across calls. After an attempt it reports the result
//! through [`GptData::update_kernel_entry`], which edits the attribute word of
//! the current kernel in both copies of the table.

use super::attributes::{KernelAttributes, MAX_PRIORITY};
use super::entry::entry_mut;
use super::gpt::{DirtyMask, GptData};
use super::header::GptCopy;
use super::partition::CHROMEOS_KERNEL;
use crate::error::{GptError, Result};
use log::{debug, info, warn};

/// Selection progress for one boot session
///
/// Owned by the caller so a table can be re-scanned from the top simply by
/// starting with a fresh cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelCursor {
    current_kernel: Option<u32>,
    current_priority: u8,
}

impl KernelCursor {
    pub const fn new() -> Self {
        Self {
            current_kernel: None,
            // Above every real priority so the first scan sees all of them
            current_priority: MAX_PRIORITY + 1,
        }
    }

    /// Zero-based slot of the kernel being tried
    pub fn current_kernel(&self) -> Option<u32> {
        self.current_kernel
    }

    pub fn current_priority(&self) -> u8 {
        self.current_priority
    }
}

impl Default for KernelCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Location of the chosen kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelPartition {
    /// Zero-based slot in the entries array
    pub index: u32,
    pub start_lba: u64,
    /// Length in sectors
    pub size: u64,
    pub priority: u8,
}

/// Outcome of a boot attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum UpdateType {
    /// The kernel is about to be tried; spend one try
    Try = 1,
    /// The kernel failed verification; never select it again
    Bad = 2,
}

impl TryFrom<u32> for UpdateType {
    type Error = GptError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::Try),
            2 => Ok(Self::Bad),
            _ => Err(GptError::InvalidUpdateType),
        }
    }
}

impl GptData<'_> {
    /// Picks the bootable kernel with the highest priority strictly below
    /// the cursor's, breaking ties by lowest slot.
    ///
    /// On success the cursor moves to the chosen kernel. When nothing is left
    /// the cursor is cleared and `NoValidKernel` is returned.
    pub fn next_kernel_entry(&self, cursor: &mut KernelCursor) -> Result<KernelPartition> {
        let entries = self.entries(GptCopy::Primary)?;

        let mut best: Option<KernelPartition> = None;
        for (index, entry) in entries.used() {
            if !entry.matches_type(&CHROMEOS_KERNEL) {
                continue;
            }
            let attrs = entry.attributes();
            let priority = attrs.priority();
            if !attrs.is_bootable() || priority >= cursor.current_priority {
                continue;
            }
            if best.map_or(true, |b| priority > b.priority) {
                best = Some(KernelPartition {
                    index,
                    start_lba: entry.starting_lba(),
                    size: entry.sectors(),
                    priority,
                });
            }
        }

        match best {
            Some(kernel) => {
                info!(
                    "selected kernel slot {} at priority {}",
                    kernel.index, kernel.priority
                );
                cursor.current_kernel = Some(kernel.index);
                cursor.current_priority = kernel.priority;
                Ok(kernel)
            }
            None => {
                debug!("no kernel left below priority {}", cursor.current_priority);
                cursor.current_kernel = None;
                cursor.current_priority = 0;
                Err(GptError::NoValidKernel)
            }
        }
    }

    /// Records the outcome of trying the cursor's kernel.
    ///
    /// Both entries arrays and both headers are rewritten, so the returned
    /// mask always names all four buffers.
    pub fn update_kernel_entry(
        &mut self,
        cursor: &KernelCursor,
        update: UpdateType,
    ) -> Result<DirtyMask> {
        let index = cursor.current_kernel.ok_or(GptError::NoCurrentKernel)?;

        let (entry_size, mut attrs) = {
            let entries = self.entries(GptCopy::Primary)?;
            let entry = entries.entry(index).ok_or(GptError::NoCurrentKernel)?;
            if !entry.matches_type(&CHROMEOS_KERNEL) {
                return Err(GptError::NoCurrentKernel);
            }
            (self.header(GptCopy::Primary)?.entry_size(), entry.attributes())
        };

        apply_update(&mut attrs, update);
        match update {
            UpdateType::Try => debug!(
                "kernel slot {} tried, {} tries left",
                index,
                attrs.tries()
            ),
            UpdateType::Bad => warn!("kernel slot {} marked bad", index),
        }

        for copy in [GptCopy::Primary, GptCopy::Secondary] {
            let mut entry = entry_mut(self.entries_buf_mut(copy), entry_size, index)
                .ok_or(GptError::NoCurrentKernel)?;
            entry.set_attributes(attrs);
        }
        self.update_crc()?;
        self.mark_modified(DirtyMask::all());
        Ok(self.modified())
    }
}

fn apply_update(attrs: &mut KernelAttributes, update: UpdateType) {
    match update {
        UpdateType::Try => {
            // A kernel that booted once keeps its tries
            if !attrs.successful() {
                attrs.decrement_tries();
            }
        }
        UpdateType::Bad => attrs.mark_bad(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::edit::PartitionEdit;
    use crate::disk::gpt::GptBuffers;
    use crate::disk::gpt_writer::create_gpt;
    use crate::disk::layout::{HEADER_BYTES, SECTOR_SIZE, TOTAL_ENTRIES_SIZE};
    use alloc::vec;
    use alloc::vec::Vec;
    use uguid::Guid;

    const DRIVE_SECTORS: u64 = 8192;

    struct Disk {
        headers: [Vec<u8>; 2],
        entries: [Vec<u8>; 2],
    }

    impl Disk {
        /// Fresh table holding one kernel per `(priority, tries, successful)`,
        /// in slot order
        fn with_kernels(kernels: &[(u8, u8, bool)]) -> Self {
            let mut disk = Self {
                headers: [vec![0u8; HEADER_BYTES], vec![0u8; HEADER_BYTES]],
                entries: [vec![0u8; TOTAL_ENTRIES_SIZE], vec![0u8; TOTAL_ENTRIES_SIZE]],
            };
            create_gpt(disk.buffers(), DRIVE_SECTORS, Guid::from_bytes([9; 16])).unwrap();

            let mut gpt = GptData::init(disk.buffers(), SECTOR_SIZE, DRIVE_SECTORS).unwrap();
            for (i, &(priority, tries, successful)) in kernels.iter().enumerate() {
                let edit = PartitionEdit {
                    begin: Some(100 + i as u64 * 100),
                    size: Some(100),
                    type_guid: Some(CHROMEOS_KERNEL.0),
                    priority: Some(priority),
                    tries: Some(tries),
                    successful: Some(successful),
                    ..PartitionEdit::default()
                };
                let unique = Guid::from_bytes([i as u8 + 1; 16]);
                gpt.add_partition(&edit, || unique).unwrap();
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
    fn test_update_type_from_u32() {
        assert_eq!(UpdateType::try_from(1), Ok(UpdateType::Try));
        assert_eq!(UpdateType::try_from(2), Ok(UpdateType::Bad));
        assert_eq!(UpdateType::try_from(0), Err(GptError::InvalidUpdateType));
        assert_eq!(UpdateType::try_from(3), Err(GptError::InvalidUpdateType));
    }

    #[test]
    fn test_descending_priority_then_exhaustion() {
        let mut disk = Disk::with_kernels(&[(1, 0, true), (5, 2, false), (3, 1, false)]);
        let gpt = disk.session();
        let mut cursor = KernelCursor::new();

        let first = gpt.next_kernel_entry(&mut cursor).unwrap();
        assert_eq!((first.index, first.start_lba, first.size), (1, 200, 100));
        assert_eq!(cursor.current_priority(), 5);

        assert_eq!(gpt.next_kernel_entry(&mut cursor).unwrap().index, 2);
        assert_eq!(gpt.next_kernel_entry(&mut cursor).unwrap().index, 0);
        assert_eq!(
            gpt.next_kernel_entry(&mut cursor),
            Err(GptError::NoValidKernel)
        );
        assert_eq!(cursor.current_kernel(), None);
        assert_eq!(cursor.current_priority(), 0);
    }

    #[test]
    fn test_equal_priority_lowest_slot_wins() {
        let mut disk = Disk::with_kernels(&[(4, 1, false), (4, 1, false)]);
        let gpt = disk.session();
        let mut cursor = KernelCursor::new();
        assert_eq!(gpt.next_kernel_entry(&mut cursor).unwrap().index, 0);
        assert_eq!(
            gpt.next_kernel_entry(&mut cursor),
            Err(GptError::NoValidKernel)
        );
    }

    #[test]
    fn test_unbootable_kernels_skipped() {
        let mut disk = Disk::with_kernels(&[(0, 5, true), (7, 0, false), (2, 0, true)]);
        let gpt = disk.session();
        let mut cursor = KernelCursor::new();
        assert_eq!(gpt.next_kernel_entry(&mut cursor).unwrap().index, 2);
    }

    #[test]
    fn test_try_spends_one_try() {
        let mut disk = Disk::with_kernels(&[(5, 2, false)]);
        let mut gpt = disk.session();
        let mut cursor = KernelCursor::new();
        gpt.next_kernel_entry(&mut cursor).unwrap();

        let dirty = gpt.update_kernel_entry(&cursor, UpdateType::Try).unwrap();
        assert_eq!(dirty, DirtyMask::all());
        let attrs = gpt.partition_details(1).unwrap().attributes;
        assert_eq!((attrs.priority(), attrs.tries(), attrs.successful()), (5, 1, false));

        gpt.update_kernel_entry(&cursor, UpdateType::Try).unwrap();
        gpt.update_kernel_entry(&cursor, UpdateType::Try).unwrap();
        let attrs = gpt.partition_details(1).unwrap().attributes;
        assert_eq!(attrs.tries(), 0);
        assert_eq!(attrs.priority(), 5);
    }

    #[test]
    fn test_try_leaves_successful_kernel_alone() {
        let mut disk = Disk::with_kernels(&[(3, 4, true)]);
        let mut gpt = disk.session();
        let mut cursor = KernelCursor::new();
        gpt.next_kernel_entry(&mut cursor).unwrap();
        gpt.update_kernel_entry(&cursor, UpdateType::Try).unwrap();
        let attrs = gpt.partition_details(1).unwrap().attributes;
        assert_eq!((attrs.priority(), attrs.tries(), attrs.successful()), (3, 4, true));
    }

    #[test]
    fn test_bad_clears_boot_fields_in_both_copies() {
        let mut disk = Disk::with_kernels(&[(1, 0, true), (5, 2, false)]);
        {
            let mut gpt = disk.session();
            let mut cursor = KernelCursor::new();
            assert_eq!(gpt.next_kernel_entry(&mut cursor).unwrap().index, 1);
            gpt.update_kernel_entry(&cursor, UpdateType::Bad).unwrap();
            let attrs = gpt.partition_details(2).unwrap().attributes;
            assert_eq!((attrs.priority(), attrs.tries(), attrs.successful()), (0, 0, false));
        }
        assert_eq!(disk.entries[0], disk.entries[1]);

        // A later session reopens cleanly and never offers the bad kernel
        let gpt = disk.session();
        assert_eq!(gpt.modified(), DirtyMask::empty());
        let mut cursor = KernelCursor::new();
        assert_eq!(gpt.next_kernel_entry(&mut cursor).unwrap().index, 0);
    }

    #[test]
    fn test_update_without_current_kernel() {
        let mut disk = Disk::with_kernels(&[(5, 2, false)]);
        let mut gpt = disk.session();
        let cursor = KernelCursor::new();
        assert_eq!(
            gpt.update_kernel_entry(&cursor, UpdateType::Try),
            Err(GptError::NoCurrentKernel)
        );
        assert_eq!(gpt.modified(), DirtyMask::empty());
    }
}
