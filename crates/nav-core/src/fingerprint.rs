//! Build signature written at the head of graph artifacts.

use std::fmt;

/// Magic prefix of every fingerprint.
pub const FINGERPRINT_MAGIC: [u8; 8] = *b"NAVSTORE";

/// Bumped whenever the layout of an on-disk record changes.
const FORMAT_SALT: u32 = 0x6e61_7601;

/// Identifies the software build that produced an artifact.
///
/// A mismatch is not fatal: readers log it and continue, so that artifacts
/// from a compatible older build can still be served.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Fingerprint {
    pub magic:         [u8; 8],
    pub major:         u16,
    pub minor:         u16,
    pub checksum_salt: u32,
}

impl Fingerprint {
    /// The fingerprint of this build.
    pub fn current() -> Self {
        Self {
            magic:         FINGERPRINT_MAGIC,
            major:         env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor:         env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            checksum_salt: FORMAT_SALT,
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == FINGERPRINT_MAGIC
    }

    /// Same magic, same major version, same record format.
    pub fn is_compatible_with(&self, other: &Fingerprint) -> bool {
        self.has_valid_magic()
            && other.has_valid_magic()
            && self.major == other.major
            && self.checksum_salt == other.checksum_salt
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{}.{} (salt {:#010x})",
            String::from_utf8_lossy(&self.magic),
            self.major,
            self.minor,
            self.checksum_salt
        )
    }
}
