// GPT session: validation of both copies and single-sided repair

use super::entry::EntriesView;
use super::header::{copy_len, entries_crc32, GptCopy, HeaderView, HeaderViewMut, Signature};
use super::layout::{MIN_DRIVE_SECTORS, MIN_HEADER_SIZE, SECTOR_SIZE};
use super::partition::PartitionInfo;
use crate::error::{GptError, Result};
use bitflags::bitflags;
use log::{debug, warn};

bitflags! {
    /// Buffers changed in memory that the caller must write back
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyMask: u8 {
        const HEADER1 = 0x01;
        const HEADER2 = 0x02;
        const ENTRIES1 = 0x04;
        const ENTRIES2 = 0x08;
    }
}

bitflags! {
    /// Which copies passed validation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Validity: u8 {
        const PRIMARY = 0x01;
        const SECONDARY = 0x02;
    }
}

impl Validity {
    pub fn of(copy: GptCopy) -> Self {
        match copy {
            GptCopy::Primary => Self::PRIMARY,
            GptCopy::Secondary => Self::SECONDARY,
        }
    }
}

/// One of the four session buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GptBuffer {
    PrimaryHeader,
    SecondaryHeader,
    PrimaryEntries,
    SecondaryEntries,
}

impl GptBuffer {
    pub fn copy(self) -> GptCopy {
        match self {
            Self::PrimaryHeader | Self::PrimaryEntries => GptCopy::Primary,
            Self::SecondaryHeader | Self::SecondaryEntries => GptCopy::Secondary,
        }
    }

    pub fn is_header(self) -> bool {
        matches!(self, Self::PrimaryHeader | Self::SecondaryHeader)
    }

    pub fn dirty_flag(self) -> DirtyMask {
        match self {
            Self::PrimaryHeader => DirtyMask::HEADER1,
            Self::SecondaryHeader => DirtyMask::HEADER2,
            Self::PrimaryEntries => DirtyMask::ENTRIES1,
            Self::SecondaryEntries => DirtyMask::ENTRIES2,
        }
    }
}

impl DirtyMask {
    pub fn header(copy: GptCopy) -> Self {
        match copy {
            GptCopy::Primary => Self::HEADER1,
            GptCopy::Secondary => Self::HEADER2,
        }
    }

    pub fn entries(copy: GptCopy) -> Self {
        match copy {
            GptCopy::Primary => Self::ENTRIES1,
            GptCopy::Secondary => Self::ENTRIES2,
        }
    }

    /// Dirty buffers in the order they must hit the disk. Within a copy the
    /// entries go first so a crash never leaves a header whose entries CRC
    /// describes entries that were not written.
    pub fn write_order(self) -> impl Iterator<Item = GptBuffer> {
        [
            GptBuffer::PrimaryEntries,
            GptBuffer::PrimaryHeader,
            GptBuffer::SecondaryEntries,
            GptBuffer::SecondaryHeader,
        ]
        .into_iter()
        .filter(move |buffer| self.contains(buffer.dirty_flag()))
    }
}

/// The four raw buffers of a session, as read from disk
pub struct GptBuffers<'a> {
    /// Sector at LBA 1
    pub primary_header: &'a mut [u8],
    /// Last sector of the drive
    pub secondary_header: &'a mut [u8],
    /// 16 KiB following the primary header
    pub primary_entries: &'a mut [u8],
    /// 16 KiB preceding the secondary header
    pub secondary_entries: &'a mut [u8],
}

/// A validated, repaired partition table session
///
/// The session borrows the caller's buffers and edits them in place. After
/// `init` both copies are valid and consistent; `modified()` says which
/// buffers must be persisted.
pub struct GptData<'a> {
    buffers: GptBuffers<'a>,
    drive_sectors: u64,
    valid_headers: Validity,
    valid_entries: Validity,
    modified: DirtyMask,
}

impl<'a> GptData<'a> {
    /// Validates both copies and repairs whichever one is damaged.
    ///
    /// # Errors
    /// * `InvalidSectorSize` - sector size other than 512
    /// * `InvalidSectorNumber` - drive cannot hold two GPT copies
    /// * `InvalidHeaders` - neither header is valid
    /// * `InvalidEntries` - neither entries array is valid
    /// * `InvalidHeaderSize` / `EntriesBufferSize` - the damaged copy's buffer
    ///   cannot hold what the valid copy would restore into it
    ///
    /// Buffers are left untouched on error.
    pub fn init(buffers: GptBuffers<'a>, sector_bytes: u32, drive_sectors: u64) -> Result<Self> {
        check_parameters(sector_bytes, drive_sectors)?;

        let mut gpt = Self {
            buffers,
            drive_sectors,
            valid_headers: Validity::empty(),
            valid_entries: Validity::empty(),
            modified: DirtyMask::empty(),
        };
        gpt.sanity_check()?;
        gpt.repair()?;
        Ok(gpt)
    }

    /// Buffers that changed since the session started
    pub fn modified(&self) -> DirtyMask {
        self.modified
    }

    pub fn drive_sectors(&self) -> u64 {
        self.drive_sectors
    }

    pub fn header(&self, copy: GptCopy) -> Result<HeaderView<'_>> {
        HeaderView::new(self.header_buf(copy))
    }

    pub fn entries(&self, copy: GptCopy) -> Result<EntriesView<'_>> {
        let header = self.header(copy)?;
        EntriesView::for_header(self.entries_buf(copy), &header)
    }

    /// Occupied slots of the primary table
    pub fn partitions(&self) -> Result<impl Iterator<Item = PartitionInfo> + '_> {
        let entries = self.entries(GptCopy::Primary)?;
        Ok(entries
            .used()
            .map(|(index, entry)| PartitionInfo::from_entry(index, &entry)))
    }

    /// Rewrites the signature of both headers
    pub fn set_signature(&mut self, signature: Signature) -> Result<DirtyMask> {
        for copy in [GptCopy::Primary, GptCopy::Secondary] {
            let mut header = HeaderViewMut::new(self.header_buf_mut(copy))?;
            header.set_signature(signature);
            header.update_crc32();
        }
        self.modified |= DirtyMask::HEADER1 | DirtyMask::HEADER2;
        Ok(self.modified)
    }

    pub(crate) fn header_buf(&self, copy: GptCopy) -> &[u8] {
        match copy {
            GptCopy::Primary => &*self.buffers.primary_header,
            GptCopy::Secondary => &*self.buffers.secondary_header,
        }
    }

    pub(crate) fn header_buf_mut(&mut self, copy: GptCopy) -> &mut [u8] {
        match copy {
            GptCopy::Primary => &mut *self.buffers.primary_header,
            GptCopy::Secondary => &mut *self.buffers.secondary_header,
        }
    }

    pub(crate) fn entries_buf(&self, copy: GptCopy) -> &[u8] {
        match copy {
            GptCopy::Primary => &*self.buffers.primary_entries,
            GptCopy::Secondary => &*self.buffers.secondary_entries,
        }
    }

    pub(crate) fn entries_buf_mut(&mut self, copy: GptCopy) -> &mut [u8] {
        match copy {
            GptCopy::Primary => &mut *self.buffers.primary_entries,
            GptCopy::Secondary => &mut *self.buffers.secondary_entries,
        }
    }

    pub(crate) fn mark_modified(&mut self, dirty: DirtyMask) {
        self.modified |= dirty;
    }

    /// Copies the primary entries over the secondary ones
    pub(crate) fn sync_secondary_entries(&mut self) {
        let GptBuffers {
            primary_entries,
            secondary_entries,
            ..
        } = &mut self.buffers;
        let len = primary_entries.len().min(secondary_entries.len());
        secondary_entries[..len].copy_from_slice(&primary_entries[..len]);
    }

    /// Refreshes entries CRC and header CRC of both copies
    pub(crate) fn update_crc(&mut self) -> Result<()> {
        for copy in [GptCopy::Primary, GptCopy::Secondary] {
            let crc = entries_crc32(self.entries_buf(copy));
            let mut header = HeaderViewMut::new(self.header_buf_mut(copy))?;
            header.set_entries_crc32(crc);
            header.update_crc32();
        }
        Ok(())
    }

    fn check_header(&self, copy: GptCopy) -> Result<()> {
        self.header(copy)?.check(copy, self.drive_sectors)
    }

    /// Checks the entries of `copy` against the header of `governing`
    fn check_entries(&self, copy: GptCopy, governing: GptCopy) -> Result<()> {
        let header = self.header(governing)?;
        EntriesView::for_header(self.entries_buf(copy), &header)?.check(&header)
    }

    fn sanity_check(&mut self) -> Result<()> {
        for copy in [GptCopy::Primary, GptCopy::Secondary] {
            match self.check_header(copy) {
                Ok(()) => self.valid_headers |= Validity::of(copy),
                Err(err) => debug!("{:?} GPT header invalid: {}", copy, err),
            }
        }
        if self.valid_headers.is_empty() {
            return Err(GptError::InvalidHeaders);
        }

        let governing = if self.valid_headers.contains(Validity::PRIMARY) {
            GptCopy::Primary
        } else {
            GptCopy::Secondary
        };
        self.validate_entries_against(governing);

        // The primary header may carry a stale entries CRC while the
        // secondary header still describes the entries on disk.
        if self.valid_headers.is_all() && self.valid_entries.is_empty() {
            self.validate_entries_against(GptCopy::Secondary);
            if !self.valid_entries.is_empty() {
                debug!("primary GPT header does not describe either entries array");
                self.valid_headers.remove(Validity::PRIMARY);
            }
        }
        if self.valid_entries.is_empty() {
            return Err(GptError::InvalidEntries);
        }

        // Both valid but divergent: the primary copy is authoritative
        if self.valid_headers.is_all() {
            let primary = self.header(GptCopy::Primary)?;
            let secondary = self.header(GptCopy::Secondary)?;
            if !primary.same_fields(&secondary) {
                debug!("GPT headers disagree, preferring primary");
                self.valid_headers.remove(Validity::SECONDARY);
            }
        }
        if self.valid_entries.is_all()
            && self.entries_buf(GptCopy::Primary) != self.entries_buf(GptCopy::Secondary)
        {
            debug!("GPT entries arrays disagree, preferring primary");
            self.valid_entries.remove(Validity::SECONDARY);
        }

        Ok(())
    }

    fn validate_entries_against(&mut self, governing: GptCopy) {
        for copy in [GptCopy::Primary, GptCopy::Secondary] {
            match self.check_entries(copy, governing) {
                Ok(()) => self.valid_entries |= Validity::of(copy),
                Err(err) => debug!(
                    "{:?} GPT entries invalid against {:?} header: {}",
                    copy, governing, err
                ),
            }
        }
    }

    /// Rebuilds the invalid side of each dimension from the valid side.
    /// Both targets are checked before either is written.
    fn repair(&mut self) -> Result<()> {
        let damaged_header = damaged_copy(self.valid_headers);
        let damaged_entries = damaged_copy(self.valid_entries);
        if let Some(damaged) = damaged_header {
            self.check_header_room(damaged)?;
        }
        if let Some(damaged) = damaged_entries {
            self.check_entries_room(damaged)?;
        }

        if let Some(damaged) = damaged_header {
            self.restore_header(damaged)?;
        }
        self.valid_headers = Validity::all();
        if let Some(damaged) = damaged_entries {
            self.restore_entries(damaged);
        }
        self.valid_entries = Validity::all();
        Ok(())
    }

    /// The damaged header buffer must hold the whole source header
    fn check_header_room(&self, damaged: GptCopy) -> Result<()> {
        let source = self.header(damaged.other())?;
        let needed = source.header_size().max(MIN_HEADER_SIZE) as usize;
        if self.header_buf(damaged).len() < needed {
            warn!(
                "{:?} GPT header buffer too small to restore ({} < {} bytes)",
                damaged,
                self.header_buf(damaged).len(),
                needed
            );
            return Err(GptError::InvalidHeaderSize);
        }
        Ok(())
    }

    fn check_entries_room(&self, damaged: GptCopy) -> Result<()> {
        if self.entries_buf(damaged).len() != self.entries_buf(damaged.other()).len() {
            warn!("{:?} GPT entries buffer size differs from its copy", damaged);
            return Err(GptError::EntriesBufferSize);
        }
        Ok(())
    }

    fn restore_header(&mut self, damaged: GptCopy) -> Result<()> {
        self.check_header_room(damaged)?;
        warn!("repairing {:?} GPT header", damaged);
        let drive_sectors = self.drive_sectors;
        let GptBuffers {
            primary_header,
            secondary_header,
            ..
        } = &mut self.buffers;
        let (src, dst) = match damaged {
            GptCopy::Primary => (&**secondary_header, &mut **primary_header),
            GptCopy::Secondary => (&**primary_header, &mut **secondary_header),
        };

        let len = copy_len(src, dst);
        dst[..len].copy_from_slice(&src[..len]);
        let mut header = HeaderViewMut::new(dst)?;
        header.relocate(damaged, drive_sectors);
        header.update_crc32();
        self.modified |= DirtyMask::header(damaged);
        Ok(())
    }

    fn restore_entries(&mut self, damaged: GptCopy) {
        warn!("repairing {:?} GPT entries", damaged);
        let GptBuffers {
            primary_entries,
            secondary_entries,
            ..
        } = &mut self.buffers;
        let (src, dst) = match damaged {
            GptCopy::Primary => (&**secondary_entries, &mut **primary_entries),
            GptCopy::Secondary => (&**primary_entries, &mut **secondary_entries),
        };

        dst.copy_from_slice(src);
        self.modified |= DirtyMask::entries(damaged);
    }
}

/// The copy to rebuild when exactly one side is valid
fn damaged_copy(valid: Validity) -> Option<GptCopy> {
    if valid == Validity::PRIMARY {
        Some(GptCopy::Secondary)
    } else if valid == Validity::SECONDARY {
        Some(GptCopy::Primary)
    } else {
        None
    }
}

fn check_parameters(sector_bytes: u32, drive_sectors: u64) -> Result<()> {
    if sector_bytes != SECTOR_SIZE {
        return Err(GptError::InvalidSectorSize);
    }
    if drive_sectors < MIN_DRIVE_SECTORS {
        return Err(GptError::InvalidSectorNumber);
    }
    Ok(())
}
