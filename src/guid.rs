//! Display adapter for `efi::Guid` values in registry format.
//!
//! Error messages and logs carry the GUID of the offending file; this wrapper
//! renders the mixed-endian on-disk bytes as the familiar
//! `AABBCCDD-EEFF-0011-2233-445566778899` form.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use core::fmt;
use r_efi::efi;

/// An `efi::Guid` with registry-format `Display` and `Debug`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Guid(pub efi::Guid);

impl From<efi::Guid> for Guid {
    fn from(guid: efi::Guid) -> Self {
        Guid(guid)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.as_bytes();
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
            u16::from_le_bytes([b[6], b[7]]),
            b[8],
            b[9],
            b[10],
            b[11],
            b[12],
            b[13],
            b[14],
            b[15]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
