//! Value types shared by every layer: identifiers, owners, lifecycle state.

use core::fmt;
use core::str::FromStr;

/// Opaque 256-bit identifier; the primary key of the registry.
///
/// The all-zero value is reserved as a sentinel and is never accepted as a
/// registry key.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct HashValue([u8; 32]);

impl HashValue {
    /// The reserved all-zero sentinel.
    pub const ZERO: HashValue = HashValue([0; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        HashValue(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }
}

impl From<[u8; 32]> for HashValue {
    fn from(bytes: [u8; 32]) -> Self {
        HashValue(bytes)
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashValue(0x{})", self)
    }
}

/// Failure to parse a [`HashValue`] from its hex form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseHashError {
    #[error("expected 64 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("invalid hex digit {digit:?} at offset {offset}")]
    InvalidDigit { digit: char, offset: usize },
}

impl FromStr for HashValue {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 64 {
            return Err(ParseHashError::InvalidLength(digits.len()));
        }
        let mut out = [0u8; 32];
        let raw = digits.as_bytes();
        for (i, byte) in out.iter_mut().enumerate() {
            let hi = nibble(raw[2 * i], 2 * i)?;
            let lo = nibble(raw[2 * i + 1], 2 * i + 1)?;
            *byte = (hi << 4) | lo;
        }
        Ok(HashValue(out))
    }
}

fn nibble(c: u8, offset: usize) -> Result<u8, ParseHashError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(ParseHashError::InvalidDigit {
            digit: c as char,
            offset,
        }),
    }
}

/// Identity of a caller; the creator of an entry becomes its sole owner.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Owner(pub u64);

impl From<u64> for Owner {
    fn from(id: u64) -> Self {
        Owner(id)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner:{}", self.0)
    }
}

/// Lifecycle of an entry. Transitions only run forward:
/// `Active -> Deprecated -> (removed)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EntryState {
    Active,
    Deprecated,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryState::Active => "active",
            EntryState::Deprecated => "deprecated",
        })
    }
}

/// Snapshot of an entry returned by `read`.
///
/// `position` is only meaningful until the next mutating call: removals
/// compact the dense collection and may relocate one surviving entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EntryInfo {
    pub position: usize,
    pub owner: Owner,
    pub state: EntryState,
}
