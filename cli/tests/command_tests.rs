//! End-to-end command tests against an in-memory drive

mod common;

use bootgpt_cli::calc::SizeArg;
use bootgpt_cli::commands::{self, AddRequest};
use bootgpt_core::{DirtyMask, GptError, UpdateType, CHROMEOS_KERNEL};
use common::MemoryBlockDevice;
use uguid::Guid;

const DRIVE_SECTORS: u64 = 4096;

fn created_drive() -> MemoryBlockDevice {
    let mut device = MemoryBlockDevice::new(DRIVE_SECTORS);
    commands::create(&mut device, &mut Vec::new()).expect("create succeeds");
    device.writes.clear();
    device
}

fn kernel(begin: u64, priority: u8, tries: u8, successful: bool) -> AddRequest {
    AddRequest {
        begin: Some(begin),
        size: Some(SizeArg::Sectors(64)),
        type_guid: Some(CHROMEOS_KERNEL.0),
        label: Some("KERN".to_string()),
        priority: Some(priority),
        tries: Some(tries),
        successful: Some(successful),
        ..AddRequest::default()
    }
}

fn output(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).expect("utf-8 output")
}

#[test]
fn test_create_writes_both_copies() {
    let mut device = MemoryBlockDevice::new(DRIVE_SECTORS);
    commands::create(&mut device, &mut Vec::new()).unwrap();
    assert_eq!(&device.data[512..520], b"EFI PART");
    let last = (DRIVE_SECTORS - 1) as usize * 512;
    assert_eq!(&device.data[last..last + 8], b"EFI PART");
    // Entries land before their header
    assert_eq!(device.writes, vec![2, 1, DRIVE_SECTORS - 33, DRIVE_SECTORS - 1]);
}

#[test]
fn test_create_rejects_tiny_drive() {
    let mut device = MemoryBlockDevice::new(40);
    assert!(commands::create(&mut device, &mut Vec::new()).is_err());
    assert!(device.writes.is_empty());
}

#[test]
fn test_add_and_show() {
    let mut device = created_drive();
    let number = commands::add(&mut device, &kernel(100, 5, 3, false), &mut Vec::new()).unwrap();
    assert_eq!(number, 1);

    let mut out = Vec::new();
    commands::show(&mut device, None, &mut out).unwrap();
    let text = output(out);
    assert!(text.contains("kernel"));
    assert!(text.contains("KERN"));
    assert!(text.contains("priority=5 tries=3 successful=0"));

    let mut out = Vec::new();
    commands::show(&mut device, Some(1), &mut out).unwrap();
    let text = output(out);
    assert!(text.contains("Begin:      100"));
    assert!(text.contains("Size:       64"));
}

#[test]
fn test_add_size_from_drive_end() {
    let mut device = created_drive();
    let request = AddRequest {
        size: Some(SizeArg::FromEnd(34)),
        ..kernel(2048, 1, 1, false)
    };
    commands::add(&mut device, &request, &mut Vec::new()).unwrap();

    let mut out = Vec::new();
    commands::show(&mut device, Some(1), &mut out).unwrap();
    // 4096 - 2048 - 34
    assert!(output(out).contains("Size:       2014"));
}

#[test]
fn test_rejected_edit_writes_nothing() {
    let mut device = created_drive();
    commands::add(&mut device, &kernel(100, 5, 3, false), &mut Vec::new()).unwrap();
    device.writes.clear();
    let before = device.data.clone();

    let err = commands::add(&mut device, &kernel(120, 1, 1, false), &mut Vec::new())
        .expect_err("overlap is rejected");
    assert_eq!(
        err.root_cause().downcast_ref::<GptError>(),
        Some(&GptError::StartLbaOverlap)
    );
    assert!(device.writes.is_empty());
    assert_eq!(device.data, before);
}

#[test]
fn test_repair_restores_primary_header() {
    let mut device = created_drive();
    device.sector_mut(1)[0] = b'X';

    let dirty = commands::repair(&mut device, &mut Vec::new()).unwrap();
    assert_eq!(dirty, DirtyMask::HEADER1);
    assert_eq!(device.writes, vec![1]);
    assert_eq!(&device.data[512..520], b"EFI PART");

    let mut out = Vec::new();
    assert_eq!(commands::repair(&mut device, &mut out).unwrap(), DirtyMask::empty());
    assert!(output(out).contains("nothing to repair"));
}

#[test]
fn test_repair_fails_without_headers() {
    let mut device = MemoryBlockDevice::new(DRIVE_SECTORS);
    let err = commands::repair(&mut device, &mut Vec::new()).unwrap_err();
    assert_eq!(
        err.root_cause().downcast_ref::<GptError>(),
        Some(&GptError::InvalidHeaders)
    );
}

#[test]
fn test_next_bad_then_fallback() {
    let mut device = created_drive();
    commands::add(&mut device, &kernel(100, 4, 2, false), &mut Vec::new()).unwrap();
    commands::add(&mut device, &kernel(200, 6, 1, false), &mut Vec::new()).unwrap();

    let chosen = commands::next(&mut device, Some(UpdateType::Bad), &mut Vec::new()).unwrap();
    assert_eq!(chosen, 2);
    let chosen = commands::next(&mut device, None, &mut Vec::new()).unwrap();
    assert_eq!(chosen, 1);
}

#[test]
fn test_next_try_counts_down_on_disk() {
    let mut device = created_drive();
    commands::add(&mut device, &kernel(100, 4, 2, false), &mut Vec::new()).unwrap();

    commands::next(&mut device, Some(UpdateType::Try), &mut Vec::new()).unwrap();
    commands::next(&mut device, Some(UpdateType::Try), &mut Vec::new()).unwrap();
    // No tries left and never booted
    let err = commands::next(&mut device, None, &mut Vec::new()).unwrap_err();
    assert_eq!(
        err.root_cause().downcast_ref::<GptError>(),
        Some(&GptError::NoValidKernel)
    );
}

#[test]
fn test_legacy_round_trip() {
    let mut device = created_drive();
    commands::legacy(&mut device, false, &mut Vec::new()).unwrap();
    assert_eq!(&device.data[512..520], b"CHROMEOS");
    commands::show(&mut device, None, &mut Vec::new()).unwrap();

    commands::legacy(&mut device, true, &mut Vec::new()).unwrap();
    assert_eq!(&device.data[512..520], b"EFI PART");
}

#[test]
fn test_unique_guid_kept() {
    let mut device = created_drive();
    let unique = Guid::from_bytes([0x5a; 16]);
    let request = AddRequest {
        unique_guid: Some(unique),
        ..kernel(100, 1, 1, false)
    };
    commands::add(&mut device, &request, &mut Vec::new()).unwrap();

    let mut out = Vec::new();
    commands::show(&mut device, Some(1), &mut out).unwrap();
    assert!(output(out).contains(&unique.to_string()));
}

#[test]
fn test_prioritize_lifts_kernel() {
    let mut device = created_drive();
    commands::add(&mut device, &kernel(100, 2, 1, false), &mut Vec::new()).unwrap();
    commands::add(&mut device, &kernel(200, 7, 1, false), &mut Vec::new()).unwrap();
    device.writes.clear();

    let mut out = Vec::new();
    commands::prioritize(&mut device, Some(1), None, false, &mut out).unwrap();
    let text = output(out);
    assert!(text.contains("partition 1 priority 2"));
    assert!(text.contains("partition 2 priority 1"));
    assert_eq!(device.writes, vec![2, 1, DRIVE_SECTORS - 33, DRIVE_SECTORS - 1]);

    assert_eq!(commands::next(&mut device, None, &mut Vec::new()).unwrap(), 1);
}

#[test]
fn test_prioritize_rejects_non_kernel() {
    let mut device = created_drive();
    let err = commands::prioritize(&mut device, Some(3), None, false, &mut Vec::new()).unwrap_err();
    assert_eq!(
        err.root_cause().downcast_ref::<GptError>(),
        Some(&GptError::NotKernelPartition)
    );
    assert!(device.writes.is_empty());
}

#[test]
fn test_find_by_unique_guid() {
    let mut device = created_drive();
    let unique = Guid::from_bytes([0x33; 16]);
    commands::add(&mut device, &kernel(100, 1, 1, false), &mut Vec::new()).unwrap();
    let request = AddRequest {
        unique_guid: Some(unique),
        ..kernel(200, 1, 1, false)
    };
    commands::add(&mut device, &request, &mut Vec::new()).unwrap();

    let mut out = Vec::new();
    assert_eq!(commands::find(&mut device, unique, &mut out).unwrap(), 2);
    assert!(output(out).contains("Begin:      200"));

    let err = commands::find(&mut device, Guid::from_bytes([0x44; 16]), &mut Vec::new())
        .unwrap_err();
    assert_eq!(
        err.root_cause().downcast_ref::<GptError>(),
        Some(&GptError::PartitionNotFound)
    );
}

#[test]
fn test_exit_status_for_fatal_errors() {
    let mut device = MemoryBlockDevice::new(DRIVE_SECTORS);
    let err = commands::repair(&mut device, &mut Vec::new()).unwrap_err();
    assert_eq!(commands::exit_status(&err), commands::EXIT_UNRECOVERABLE);
    assert!(commands::recovery_hint(&err).unwrap().contains("bootgpt create"));

    let mut device = created_drive();
    let err = commands::next(&mut device, None, &mut Vec::new()).unwrap_err();
    assert_eq!(commands::engine_error(&err), Some(GptError::NoValidKernel));
    assert_eq!(commands::exit_status(&err), commands::EXIT_FAILURE);
    assert_eq!(commands::recovery_hint(&err), None);
}
