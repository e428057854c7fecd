//! The section-decoder seam.
//!
//! The file parser delimits the sections of a parseable file body but does
//! not interpret them; decoding is delegated through [`SectionDecoder`]. An
//! implementation only has to report how many bytes the section at the start
//! of the window occupies.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use crate::Error;

/// The minimum a section decoder must report: the total serialized size of
/// the section, headers included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedSection {
    /// Total size of the section in bytes. Zero is malformed and fails the
    /// surrounding file parse.
    pub extended_size: u64,
}

/// Decodes the section at the start of a byte window.
///
/// `buffer` is the remainder of the file body starting at the section;
/// `index` is the zero-based position of the section within the file, for
/// diagnostics. Errors are propagated by the file parser with the file GUID
/// attached.
pub trait SectionDecoder {
    /// Decode one section from the front of `buffer`.
    fn decode(&self, buffer: &[u8], index: usize) -> Result<DecodedSection, Error>;
}
