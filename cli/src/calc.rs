//! Numeric arguments of the `add` command
//!
//! Sizes may be given as a plain sector count or relative to the end of the
//! drive: `$calc($lba_end-N)` is the space from the partition's first sector
//! up to N sectors before the end of the drive.

use std::str::FromStr;

const CALC_PREFIX: &str = "$calc($lba_end-";
const CALC_SUFFIX: &str = ")";

/// Value of `add -s`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeArg {
    Sectors(u64),
    /// Sectors to leave free at the end of the drive
    FromEnd(u64),
}

impl SizeArg {
    /// Concrete sector count for a partition starting at `begin`
    pub fn resolve(self, begin: u64, drive_sectors: u64) -> Option<u64> {
        match self {
            Self::Sectors(sectors) => Some(sectors),
            Self::FromEnd(reserve) => drive_sectors.checked_sub(begin)?.checked_sub(reserve),
        }
    }
}

impl FromStr for SizeArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix(CALC_PREFIX) {
            Some(rest) => {
                let reserve = rest
                    .strip_suffix(CALC_SUFFIX)
                    .ok_or_else(|| format!("unterminated size expression \"{s}\""))?;
                parse_u64(reserve).map(Self::FromEnd)
            }
            None => parse_u64(s).map(Self::Sectors),
        }
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer
pub fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| format!("invalid number \"{s}\""))
}

pub fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| format!("number {value} out of range"))
}
