//! Error types for the firmware file and payload codecs.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use crate::guid::Guid;
use thiserror::Error;

/// Error definitions for firmware file parsing and assembly.
#[derive(Debug, Error)]
pub enum Error {
    /// A decoded extended size exceeds the available byte window.
    #[error("file {guid}: size {size:#x} exceeds the {available:#x} bytes available")]
    SizeOverflow {
        /// GUID of the offending file
        guid: Guid,
        /// Declared total size of the file
        size: u64,
        /// Length of the byte window the file was parsed from
        available: usize,
    },
    /// The input window is too short for a standard or extended header.
    #[error("buffer too short for a file header")]
    TruncatedHeader,
    /// A section is malformed, or its decoder failed.
    #[error("file {guid}: invalid section {index}")]
    InvalidSection {
        /// GUID of the file containing the section
        guid: Guid,
        /// Zero-based index of the section within the file body
        index: usize,
        /// Underlying decoder error, absent for structural failures
        #[source]
        source: Option<Box<Error>>,
    },
    /// A pad file was requested below the minimum header length.
    #[error("pad file size {size:#x} is below the 0x18 byte minimum")]
    PadTooSmall {
        /// The rejected size
        size: u64,
    },
    /// The erase polarity byte is reserved.
    #[error("erase polarity {0:#x} is neither 0x00 nor 0xff")]
    ErasePolarityUnsupported(u8),
    /// An underlying stream read or write failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Encoding would produce an undecodable artifact.
    #[error("serialization failed: {0}")]
    Serialization(&'static str),
    /// A record reader is already registered for this file type.
    #[error("a reader is already registered for file type {file_type:#x}")]
    DuplicateReader {
        /// The contested CBFS file type code
        file_type: u32,
    },
}
