//! On-disk GPT handling
//!
//! `layout` holds the byte offsets, `header` and `entry` are the codecs and
//! validators, `gpt` reconciles the two copies, `kernel` drives boot
//! selection and `edit`/`gpt_writer`/`prioritize` change the table.

pub mod attributes;
pub mod edit;
pub mod entry;
pub mod gpt;
pub mod gpt_writer;
pub mod header;
pub mod kernel;
pub mod layout;
pub mod partition;
pub mod prioritize;

pub use attributes::KernelAttributes;
pub use edit::PartitionEdit;
pub use gpt::{DirtyMask, GptBuffer, GptBuffers, GptData, Validity};
pub use gpt_writer::create_gpt;
pub use header::{GptCopy, Signature};
pub use kernel::{KernelCursor, KernelPartition, UpdateType};
pub use partition::{PartitionInfo, PartitionType, CHROMEOS_KERNEL};
