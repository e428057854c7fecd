//! File-type registry: the closed enumeration of FFS file type codes, their
//! canonical names, and the predicate selecting which types carry a
//! well-formed section stream in their body.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use crate::pi::file::r#type as raw;
use core::fmt;

/// The prefix shared by all canonical file type names.
const NAME_PREFIX: &str = "EFI_FV_FILETYPE_";

/// Canonical names for the PI-defined file types. Ranged types (OEM, debug,
/// FFS) and the pad type are rendered separately.
const NAMES: [(u8, &str); 15] = [
    (raw::RAW, "EFI_FV_FILETYPE_RAW"),
    (raw::FREEFORM, "EFI_FV_FILETYPE_FREEFORM"),
    (raw::SECURITY_CORE, "EFI_FV_FILETYPE_SECURITY_CORE"),
    (raw::PEI_CORE, "EFI_FV_FILETYPE_PEI_CORE"),
    (raw::DXE_CORE, "EFI_FV_FILETYPE_DXE_CORE"),
    (raw::PEIM, "EFI_FV_FILETYPE_PEIM"),
    (raw::DRIVER, "EFI_FV_FILETYPE_DRIVER"),
    (raw::COMBINED_PEIM_DRIVER, "EFI_FV_FILETYPE_COMBINED_PEIM_DRIVER"),
    (raw::APPLICATION, "EFI_FV_FILETYPE_APPLICATION"),
    (raw::MM, "EFI_FV_FILETYPE_MM"),
    (raw::FIRMWARE_VOLUME_IMAGE, "EFI_FV_FILETYPE_FIRMWARE_VOLUME_IMAGE"),
    (raw::COMBINED_MM_DXE, "EFI_FV_FILETYPE_COMBINED_MM_DXE"),
    (raw::MM_CORE, "EFI_FV_FILETYPE_MM_CORE"),
    (raw::MM_STANDALONE, "EFI_FV_FILETYPE_MM_STANDALONE"),
    (raw::MM_CORE_STANDALONE, "EFI_FV_FILETYPE_MM_CORE_STANDALONE"),
];

/// An FFS file type code.
///
/// The PI-defined types are available as associated constants; OEM, debug,
/// and FFS-reserved codes are open ranges, so any `u8` is a valid carrier.
///
/// ```
/// use fwfs::filetype::FileType;
/// assert_eq!(FileType::DRIVER.to_string(), "EFI_FV_FILETYPE_DRIVER");
/// assert_eq!(FileType::new(0xC5).to_string(), "EFI_FV_FILETYPE_OEM (0xc5)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileType(u8);

impl FileType {
    /// All file types
    pub const ALL: FileType = FileType(raw::ALL);
    /// Raw data file
    pub const RAW: FileType = FileType(raw::RAW);
    /// Freeform file
    pub const FREEFORM: FileType = FileType(raw::FREEFORM);
    /// Security (SEC) core file
    pub const SECURITY_CORE: FileType = FileType(raw::SECURITY_CORE);
    /// PEI core file
    pub const PEI_CORE: FileType = FileType(raw::PEI_CORE);
    /// DXE core file
    pub const DXE_CORE: FileType = FileType(raw::DXE_CORE);
    /// Pre-EFI module file
    pub const PEIM: FileType = FileType(raw::PEIM);
    /// DXE driver file
    pub const DRIVER: FileType = FileType(raw::DRIVER);
    /// Combined PEIM and driver file
    pub const COMBINED_PEIM_DRIVER: FileType = FileType(raw::COMBINED_PEIM_DRIVER);
    /// Application file
    pub const APPLICATION: FileType = FileType(raw::APPLICATION);
    /// Management Mode (MM) file
    pub const MM: FileType = FileType(raw::MM);
    /// Firmware volume image file
    pub const FIRMWARE_VOLUME_IMAGE: FileType = FileType(raw::FIRMWARE_VOLUME_IMAGE);
    /// Combined MM and DXE file
    pub const COMBINED_MM_DXE: FileType = FileType(raw::COMBINED_MM_DXE);
    /// MM core file
    pub const MM_CORE: FileType = FileType(raw::MM_CORE);
    /// MM standalone module file
    pub const MM_STANDALONE: FileType = FileType(raw::MM_STANDALONE);
    /// MM standalone core file
    pub const MM_CORE_STANDALONE: FileType = FileType(raw::MM_CORE_STANDALONE);
    /// FFS pad file
    pub const PAD: FileType = FileType(raw::FFS_PAD);

    /// Wrap a raw file type code.
    pub const fn new(code: u8) -> Self {
        FileType(code)
    }

    /// The raw code byte.
    pub const fn code(self) -> u8 {
        self.0
    }

    /// Whether the body of this file type is a well-formed section stream.
    ///
    /// Types outside this set are treated as opaque blobs. `RAW` is opaque
    /// (apart from the NVRAM store special case handled by the parser), and
    /// `PEIM` is deliberately left out: recompressing section-parsed PEI
    /// modules can grow them past the space they came from.
    pub fn is_sectioned(self) -> bool {
        matches!(
            self.0,
            raw::FREEFORM
                | raw::SECURITY_CORE
                | raw::PEI_CORE
                | raw::DXE_CORE
                | raw::DRIVER
                | raw::COMBINED_PEIM_DRIVER
                | raw::APPLICATION
                | raw::MM
                | raw::FIRMWARE_VOLUME_IMAGE
                | raw::COMBINED_MM_DXE
                | raw::MM_CORE
                | raw::MM_STANDALONE
                | raw::MM_CORE_STANDALONE
        )
    }

    /// Look up a type by its canonical name, with or without the
    /// `EFI_FV_FILETYPE_` prefix.
    pub fn from_name(name: &str) -> Option<FileType> {
        let name = name.strip_prefix(NAME_PREFIX).unwrap_or(name);
        NAMES
            .iter()
            .find(|(_, canonical)| &canonical[NAME_PREFIX.len()..] == name)
            .map(|(code, _)| FileType(*code))
    }

    fn canonical_name(self) -> Option<&'static str> {
        NAMES.iter().find(|(code, _)| *code == self.0).map(|(_, name)| *name)
    }
}

impl From<u8> for FileType {
    fn from(code: u8) -> Self {
        FileType(code)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Range tests run before the name table. The FFS range test excludes
        // the pad type, which belongs to the range but has its own name.
        match self.0 {
            code if (raw::OEM_MIN..=raw::OEM_MAX).contains(&code) => {
                write!(f, "EFI_FV_FILETYPE_OEM ({code:#x})")
            }
            code if (raw::DEBUG_MIN..=raw::DEBUG_MAX).contains(&code) => {
                write!(f, "EFI_FV_FILETYPE_DEBUG ({code:#x})")
            }
            code if (raw::FFS_MIN..=raw::FFS_MAX).contains(&code) => {
                write!(f, "EFI_FV_FILETYPE_FFS ({code:#x})")
            }
            raw::FFS_PAD => f.write_str("EFI_FV_FILETYPE_FFS_PAD"),
            _ => f.write_str(self.canonical_name().unwrap_or("UNKNOWN")),
        }
    }
}
