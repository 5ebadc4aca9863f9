use crate::common::TestDisk;
use bootgpt_core::disk::partition::CHROMEOS_ROOTFS;
use bootgpt_core::{create_gpt, PartitionEdit, CHROMEOS_KERNEL};
use uguid::Guid;

/// Builds a valid GPT disk with kernels and filler partitions
pub struct GptBuilder {
    drive_sectors: u64,
    kernels: Vec<(u8, u8, bool)>,
    rootfs: usize,
}

impl GptBuilder {
    pub fn new(drive_sectors: u64) -> Self {
        Self {
            drive_sectors,
            kernels: Vec::new(),
            rootfs: 0,
        }
    }

    /// Adds a kernel partition with the given boot attributes
    pub fn kernel(mut self, priority: u8, tries: u8, successful: bool) -> Self {
        self.kernels.push((priority, tries, successful));
        self
    }

    /// Adds non-kernel partitions the selector must ignore
    #[allow(dead_code)]
    pub fn rootfs(mut self, count: usize) -> Self {
        self.rootfs = count;
        self
    }

    pub fn build(self) -> TestDisk {
        let mut disk = TestDisk::blank(self.drive_sectors);
        create_gpt(disk.buffers(), self.drive_sectors, Guid::from_bytes([0xd1; 16]))
            .expect("create GPT");

        let mut gpt = disk.session().expect("fresh GPT opens");
        let mut next_lba = 64u64;
        let mut next_guid = 1u8;

        for &(priority, tries, successful) in &self.kernels {
            let edit = PartitionEdit {
                begin: Some(next_lba),
                size: Some(16),
                type_guid: Some(CHROMEOS_KERNEL.0),
                label: Some("KERN"),
                priority: Some(priority),
                tries: Some(tries),
                successful: Some(successful),
                ..PartitionEdit::default()
            };
            let unique = Guid::from_bytes([next_guid; 16]);
            gpt.add_partition(&edit, || unique).expect("add kernel");
            next_lba += 16;
            next_guid += 1;
        }

        for _ in 0..self.rootfs {
            let edit = PartitionEdit {
                begin: Some(next_lba),
                size: Some(16),
                type_guid: Some(CHROMEOS_ROOTFS.0),
                label: Some("ROOT"),
                priority: Some(15),
                tries: Some(15),
                successful: Some(true),
                ..PartitionEdit::default()
            };
            let unique = Guid::from_bytes([next_guid; 16]);
            gpt.add_partition(&edit, || unique).expect("add rootfs");
            next_lba += 16;
            next_guid += 1;
        }
        drop(gpt);
        disk
    }
}
