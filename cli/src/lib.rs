//! BootGPT command-line layer
//!
//! Sector I/O, argument helpers and the command implementations behind the
//! `bootgpt` binary. Commands are generic over [`gpt_disk_io::BlockIo`] so
//! they run the same against a disk image or an in-memory device.

pub mod calc;
pub mod commands;
pub mod device;
pub mod drive;
pub mod guid;
pub mod logger;

pub use device::FileBlockDevice;
pub use drive::{with_session, GptImage};
