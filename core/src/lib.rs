//! BootGPT core library
//!
//! Redundant GPT validation and repair, kernel boot-priority selection and
//! partition editing over caller-supplied sector buffers.
//! Designed to be no_std compatible.

#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod disk;
pub mod error;

pub use disk::{
    create_gpt, DirtyMask, GptBuffer, GptBuffers, GptCopy, GptData, KernelAttributes,
    KernelCursor, KernelPartition, PartitionEdit, PartitionInfo, PartitionType, Signature,
    UpdateType, CHROMEOS_KERNEL,
};
pub use error::{GptError, Result};
