//! `bootgpt` subcommands
//!
//! Each command drives one engine session against a [`BlockIo`] device and
//! prints its report to `out`.

use crate::calc::SizeArg;
use crate::drive::{with_session, GptImage};
use crate::guid::random_guid;
use anyhow::{anyhow, Context, Result};
use bootgpt_core::{
    create_gpt, DirtyMask, GptBuffer, GptCopy, GptData, GptError, KernelCursor, PartitionEdit,
    PartitionInfo, PartitionType, Signature, UpdateType,
};
use gpt_disk_io::BlockIo;
use log::info;
use std::io::Write;
use uguid::Guid;

/// Options of `bootgpt add`, already parsed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddRequest {
    pub number: Option<u32>,
    pub begin: Option<u64>,
    pub size: Option<SizeArg>,
    pub type_guid: Option<Guid>,
    pub unique_guid: Option<Guid>,
    pub label: Option<String>,
    pub successful: Option<bool>,
    pub tries: Option<u8>,
    pub priority: Option<u8>,
    pub raw_attributes: Option<u64>,
}

/// Writes a fresh, empty table
pub fn create<B, W>(device: &mut B, out: &mut W) -> Result<Guid>
where
    B: BlockIo,
    B::Error: std::error::Error + Send + Sync + 'static,
    W: Write,
{
    let mut image = GptImage::for_device(device)?;
    let disk_guid = random_guid();
    let drive_sectors = image.drive_sectors();
    let dirty = create_gpt(image.buffers(), drive_sectors, disk_guid)
        .context("cannot create GPT")?;
    image.write_back(device, dirty)?;
    writeln!(out, "created GPT {disk_guid} on {drive_sectors} sectors")?;
    Ok(disk_guid)
}

/// Adds or modifies one partition
pub fn add<B, W>(device: &mut B, request: &AddRequest, out: &mut W) -> Result<u32>
where
    B: BlockIo,
    B::Error: std::error::Error + Send + Sync + 'static,
    W: Write,
{
    let number = with_session(device, |gpt| {
        let edit = build_edit(gpt, request)?;
        gpt.add_partition(&edit, random_guid)
            .context("cannot update partition")
    })?;
    writeln!(out, "partition {number} updated")?;
    Ok(number)
}

/// Resolves `$calc(...)` sizes against the drive and the entry being edited
fn build_edit<'a>(gpt: &GptData<'_>, request: &'a AddRequest) -> Result<PartitionEdit<'a>> {
    let size = match request.size {
        Some(size) => {
            let begin = match (request.begin, request.number) {
                (Some(begin), _) => begin,
                (None, Some(number)) => gpt.partition_details(number)?.start_lba,
                (None, None) => 0,
            };
            let sectors = size
                .resolve(begin, gpt.drive_sectors())
                .ok_or_else(|| anyhow!("size expression leaves no room after LBA {begin}"))?;
            Some(sectors)
        }
        None => None,
    };

    Ok(PartitionEdit {
        number: request.number,
        begin: request.begin,
        size,
        type_guid: request.type_guid,
        unique_guid: request.unique_guid,
        label: request.label.as_deref(),
        successful: request.successful,
        tries: request.tries,
        priority: request.priority,
        raw_attributes: request.raw_attributes,
    })
}

/// Prints the table, or one partition when `number` is given
pub fn show<B, W>(device: &mut B, number: Option<u32>, out: &mut W) -> Result<()>
where
    B: BlockIo,
    B::Error: std::error::Error + Send + Sync + 'static,
    W: Write,
{
    with_session(device, |gpt| {
        if let Some(number) = number {
            let partition = gpt.partition_details(number)?;
            print_details(out, &partition)?;
            return Ok(());
        }

        let header = gpt.header(GptCopy::Primary)?;
        writeln!(out, "Disk GUID:     {}", header.disk_guid())?;
        writeln!(out, "Drive sectors: {}", gpt.drive_sectors())?;
        writeln!(
            out,
            "Usable LBAs:   {}-{}",
            header.first_usable_lba(),
            header.last_usable_lba()
        )?;
        writeln!(out)?;
        writeln!(
            out,
            "{:>12} {:>12} {:>5}  {:<10} {}",
            "start", "size", "part", "type", "label"
        )?;
        for partition in gpt.partitions()? {
            writeln!(
                out,
                "{:>12} {:>12} {:>5}  {:<10} {}",
                partition.start_lba,
                partition.size_lba(),
                partition.number,
                partition.type_name(),
                partition.label
            )?;
            let attrs = partition.attributes;
            writeln!(
                out,
                "{:>33}priority={} tries={} successful={} attr=0x{:x}",
                "",
                attrs.priority(),
                attrs.tries(),
                u8::from(attrs.successful()),
                attrs.raw()
            )?;
        }
        Ok(())
    })
}

fn print_details<W: Write>(out: &mut W, partition: &PartitionInfo) -> Result<()> {
    let attrs = partition.attributes;
    writeln!(out, "Partition:  {}", partition.number)?;
    writeln!(out, "Label:      {}", partition.label)?;
    writeln!(out, "Type:       {} ({})", partition.type_guid, partition.type_name())?;
    writeln!(out, "UUID:       {}", partition.unique_guid)?;
    writeln!(out, "Begin:      {}", partition.start_lba)?;
    writeln!(out, "Size:       {}", partition.size_lba())?;
    writeln!(out, "Successful: {}", u8::from(attrs.successful()))?;
    writeln!(out, "Tries:      {}", attrs.tries())?;
    writeln!(out, "Priority:   {}", attrs.priority())?;
    writeln!(out, "Attributes: 0x{:x}", attrs.raw())?;
    Ok(())
}

/// Validates the table and writes back whatever had to be rebuilt
pub fn repair<B, W>(device: &mut B, out: &mut W) -> Result<DirtyMask>
where
    B: BlockIo,
    B::Error: std::error::Error + Send + Sync + 'static,
    W: Write,
{
    let dirty = with_session(device, |gpt| Ok(gpt.modified()))?;
    if dirty.is_empty() {
        writeln!(out, "GPT is valid, nothing to repair")?;
    }
    for buffer in dirty.write_order() {
        writeln!(out, "repaired {}", describe(buffer))?;
    }
    Ok(dirty)
}

fn describe(buffer: GptBuffer) -> &'static str {
    match buffer {
        GptBuffer::PrimaryHeader => "primary header",
        GptBuffer::SecondaryHeader => "secondary header",
        GptBuffer::PrimaryEntries => "primary entries",
        GptBuffer::SecondaryEntries => "secondary entries",
    }
}

/// Switches the header signature to "CHROMEOS", or back to "EFI PART"
pub fn legacy<B, W>(device: &mut B, efi: bool, out: &mut W) -> Result<()>
where
    B: BlockIo,
    B::Error: std::error::Error + Send + Sync + 'static,
    W: Write,
{
    let signature = if efi { Signature::Efi } else { Signature::ChromeOs };
    with_session(device, |gpt| {
        gpt.set_signature(signature)?;
        Ok(())
    })?;
    let text = String::from_utf8_lossy(signature.bytes()).into_owned();
    writeln!(out, "signature set to \"{text}\"")?;
    Ok(())
}

/// Runs one selection and optionally records its outcome
pub fn next<B, W>(device: &mut B, outcome: Option<UpdateType>, out: &mut W) -> Result<u32>
where
    B: BlockIo,
    B::Error: std::error::Error + Send + Sync + 'static,
    W: Write,
{
    let kernel = with_session(device, |gpt| {
        let mut cursor = KernelCursor::new();
        let kernel = gpt.next_kernel_entry(&mut cursor)?;
        if let Some(update) = outcome {
            gpt.update_kernel_entry(&cursor, update)?;
            info!("recorded {:?} for partition {}", update, kernel.index + 1);
        }
        Ok(kernel)
    })?;

    writeln!(
        out,
        "partition {} start {} size {} priority {}",
        kernel.index + 1,
        kernel.start_lba,
        kernel.size,
        kernel.priority
    )?;
    Ok(kernel.index + 1)
}

/// Renumbers kernel priorities, optionally lifting one kernel to the top
pub fn prioritize<B, W>(
    device: &mut B,
    number: Option<u32>,
    max_priority: Option<u8>,
    friends: bool,
    out: &mut W,
) -> Result<()>
where
    B: BlockIo,
    B::Error: std::error::Error + Send + Sync + 'static,
    W: Write,
{
    let kernels = with_session(device, |gpt| {
        gpt.prioritize(number, max_priority, friends)
            .context("cannot prioritize kernels")?;
        let kernels: Vec<PartitionInfo> = gpt
            .partitions()?
            .filter(|p| p.partition_type() == PartitionType::ChromeOsKernel)
            .collect();
        Ok(kernels)
    })?;
    for kernel in kernels {
        writeln!(
            out,
            "partition {} priority {}",
            kernel.number,
            kernel.attributes.priority()
        )?;
    }
    Ok(())
}

/// Prints the partition carrying `unique_guid`
pub fn find<B, W>(device: &mut B, unique_guid: Guid, out: &mut W) -> Result<u32>
where
    B: BlockIo,
    B::Error: std::error::Error + Send + Sync + 'static,
    W: Write,
{
    let partition = with_session(device, |gpt| Ok(gpt.find_by_unique(unique_guid)?))?;
    print_details(out, &partition)?;
    Ok(partition.number)
}

/// Process exit status for a failed command
pub const EXIT_FAILURE: u8 = 1;
/// Exit status when neither GPT copy can be trusted
pub const EXIT_UNRECOVERABLE: u8 = 3;

/// The engine error at the bottom of `err`, if there is one
pub fn engine_error(err: &anyhow::Error) -> Option<GptError> {
    err.chain().find_map(|cause| cause.downcast_ref::<GptError>()).copied()
}

/// Exit status for `err`; fatal engine errors get their own status
pub fn exit_status(err: &anyhow::Error) -> u8 {
    match engine_error(err) {
        Some(engine) if engine.is_fatal() => EXIT_UNRECOVERABLE,
        _ => EXIT_FAILURE,
    }
}

/// Advice printed after a fatal engine error
pub fn recovery_hint(err: &anyhow::Error) -> Option<&'static str> {
    match engine_error(err)? {
        GptError::InvalidHeaders | GptError::InvalidEntries => {
            Some("no usable GPT copy is left; `bootgpt create` writes a new, empty table")
        }
        GptError::InvalidSectorSize | GptError::InvalidSectorNumber => {
            Some("the drive cannot hold a GPT with 512-byte sectors")
        }
        _ => None,
    }
}
