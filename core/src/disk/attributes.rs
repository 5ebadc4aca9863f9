//! Kernel partition attribute word
//!
//! Bit layout of the 64-bit attribute field:
//!
//! | Bits  | Field        |
//! |-------|--------------|
//! | 0     | legacy boot  |
//! | 8     | successful   |
//! | 9-12  | tries (0-15) |
//! | 13-16 | priority     |
//!
//! Bits outside these fields are carried through unchanged.

use crate::error::{GptError, Result};

const LEGACY_BOOT_OFFSET: u32 = 0;
const SUCCESSFUL_OFFSET: u32 = 8;
const TRIES_OFFSET: u32 = 9;
const PRIORITY_OFFSET: u32 = 13;

const LEGACY_BOOT_MASK: u64 = 1 << LEGACY_BOOT_OFFSET;
const SUCCESSFUL_MASK: u64 = 1 << SUCCESSFUL_OFFSET;
const TRIES_MASK: u64 = 0xf << TRIES_OFFSET;
const PRIORITY_MASK: u64 = 0xf << PRIORITY_OFFSET;

pub const MAX_TRIES: u8 = 15;
pub const MAX_PRIORITY: u8 = 15;

/// Typed view of a GPT entry attribute word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelAttributes(u64);

impl KernelAttributes {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Builds a word with only the kernel boot fields set
    pub fn new(priority: u8, tries: u8, successful: bool) -> Result<Self> {
        let mut attrs = Self::default();
        attrs.set_priority(priority)?;
        attrs.set_tries(tries)?;
        attrs.set_successful(successful);
        Ok(attrs)
    }

    pub fn legacy_boot(self) -> bool {
        self.0 & LEGACY_BOOT_MASK != 0
    }

    pub fn set_legacy_boot(&mut self, legacy_boot: bool) {
        self.set_flag(LEGACY_BOOT_MASK, legacy_boot);
    }

    pub fn successful(self) -> bool {
        self.0 & SUCCESSFUL_MASK != 0
    }

    pub fn set_successful(&mut self, successful: bool) {
        self.set_flag(SUCCESSFUL_MASK, successful);
    }

    pub fn tries(self) -> u8 {
        ((self.0 & TRIES_MASK) >> TRIES_OFFSET) as u8
    }

    pub fn set_tries(&mut self, tries: u8) -> Result<()> {
        if tries > MAX_TRIES {
            return Err(GptError::AttributeOutOfRange);
        }
        self.0 = (self.0 & !TRIES_MASK) | ((tries as u64) << TRIES_OFFSET);
        Ok(())
    }

    /// Spends one try, stopping at zero
    pub(crate) fn decrement_tries(&mut self) {
        let tries = self.tries().saturating_sub(1);
        self.0 = (self.0 & !TRIES_MASK) | ((tries as u64) << TRIES_OFFSET);
    }

    pub fn priority(self) -> u8 {
        ((self.0 & PRIORITY_MASK) >> PRIORITY_OFFSET) as u8
    }

    pub fn set_priority(&mut self, priority: u8) -> Result<()> {
        if priority > MAX_PRIORITY {
            return Err(GptError::AttributeOutOfRange);
        }
        self.0 = (self.0 & !PRIORITY_MASK) | ((priority as u64) << PRIORITY_OFFSET);
        Ok(())
    }

    /// A kernel may be tried if it has a priority and either booted before
    /// or still has tries left.
    pub fn is_bootable(self) -> bool {
        self.priority() > 0 && (self.successful() || self.tries() > 0)
    }

    /// Clears priority, tries and successful, keeping every other bit
    pub fn mark_bad(&mut self) {
        self.0 &= !(SUCCESSFUL_MASK | TRIES_MASK | PRIORITY_MASK);
    }

    fn set_flag(&mut self, mask: u64, value: bool) {
        if value {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }
}

impl From<u64> for KernelAttributes {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<KernelAttributes> for u64 {
    fn from(attrs: KernelAttributes) -> Self {
        attrs.0
    }
}
