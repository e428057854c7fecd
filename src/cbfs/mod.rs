//! coreboot File System (CBFS) record definitions and the reader registry.
//!
//! CBFS records live alongside FFS content in shipped images. This module
//! carries the wire vocabulary (file type codes, payload segment tags,
//! compression codes), the minimal per-record metadata, and a registry that
//! maps record type codes to reader constructors. The payload reader for
//! `SELF` records is registered by default; other record types plug in the
//! same way.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

pub mod payload;

use crate::Error;
use core::fmt;
use std::io::{Read, Seek, Write};

pub use payload::{new_payload_record, PayloadHeader, PayloadRecord};

/// CBFS file type code of `SELF` payload records.
pub const TYPE_SELF: u32 = 0x20;

/// A payload segment tag, a big-endian four-character code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegTag(pub u32);

impl SegTag {
    /// Executable code segment, `'CODE'`.
    pub const CODE: SegTag = SegTag(0x434F_4445);
    /// Initialized data segment, `'DATA'`.
    pub const DATA: SegTag = SegTag(0x4441_5441);
    /// Zero-fill segment, `'BSS '`.
    pub const BSS: SegTag = SegTag(0x4253_5320);
    /// Parameter block segment, `'PARA'`.
    pub const PARAMS: SegTag = SegTag(0x5041_5241);
    /// Terminal entry-point segment, `'ENTR'`. Ends the segment list.
    pub const ENTRY: SegTag = SegTag(0x454E_5452);
}

impl fmt::Display for SegTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SegTag::CODE => f.write_str("CODE"),
            SegTag::DATA => f.write_str("DATA"),
            SegTag::BSS => f.write_str("BSS"),
            SegTag::PARAMS => f.write_str("PARAMS"),
            SegTag::ENTRY => f.write_str("ENTRY"),
            SegTag(other) => write!(f, "{other:#x}"),
        }
    }
}

/// A payload segment compression code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compression(pub u32);

impl Compression {
    /// Uncompressed segment data.
    pub const NONE: Compression = Compression(0);
    /// LZMA compressed segment data.
    pub const LZMA: Compression = Compression(1);
    /// LZ4 compressed segment data.
    pub const LZ4: Compression = Compression(2);
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Compression::NONE => f.write_str("none"),
            Compression::LZMA => f.write_str("LZMA"),
            Compression::LZ4 => f.write_str("LZ4"),
            Compression(other) => write!(f, "{other:#x}"),
        }
    }
}

/// The per-record metadata a reader needs: identity, declared data size,
/// and where the record starts in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// The record name.
    pub name: String,
    /// The CBFS file type code.
    pub file_type: u32,
    /// Declared length of the record data in bytes.
    pub size: u32,
    /// Offset of the record within the image.
    pub record_start: u64,
}

/// A readable and seekable byte stream, the shape record readers consume.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Decodes and re-encodes one kind of CBFS record.
pub trait RecordReader {
    /// Decode the record body from `stream`, positioned at the start of the
    /// record data.
    fn read(&mut self, stream: &mut dyn ReadSeek) -> Result<(), Error>;

    /// Encode the record body to `sink`.
    fn write_to(&self, sink: &mut dyn Write) -> Result<(), Error>;

    /// The record metadata.
    fn file(&self) -> &FileRecord;
}

/// Constructor signature registered per record type.
pub type RecordConstructor = fn(FileRecord) -> Result<Box<dyn RecordReader>, Error>;

/// One registry entry: a record type code and the constructor for it.
#[derive(Clone)]
pub struct ReaderSpec {
    /// The CBFS file type code this reader handles.
    pub file_type: u32,
    /// Human-readable reader name for diagnostics.
    pub name: &'static str,
    /// Builds an empty reader for a record of this type.
    pub new: RecordConstructor,
}

/// Maps record type codes to reader constructors.
///
/// External modules register their own `(type_code, constructor)` pairs;
/// [`ReaderRegistry::with_defaults`] starts with the payload reader bound to
/// [`TYPE_SELF`].
#[derive(Default)]
pub struct ReaderRegistry {
    readers: Vec<ReaderSpec>,
}

impl ReaderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in readers registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(ReaderSpec { file_type: TYPE_SELF, name: "Payload", new: new_payload_record })
            .expect("empty registry cannot hold duplicates");
        registry
    }

    /// Register a reader. Registering a second reader for the same type code
    /// fails.
    pub fn register(&mut self, spec: ReaderSpec) -> Result<(), Error> {
        if self.readers.iter().any(|existing| existing.file_type == spec.file_type) {
            return Err(Error::DuplicateReader { file_type: spec.file_type });
        }
        self.readers.push(spec);
        Ok(())
    }

    /// Look up the reader registered for `file_type`.
    pub fn reader_for(&self, file_type: u32) -> Option<&ReaderSpec> {
        self.readers.iter().find(|spec| spec.file_type == file_type)
    }

    /// Construct and run the reader for `file`, if one is registered.
    ///
    /// Returns `Ok(None)` for record types with no registered reader.
    pub fn read_record(
        &self,
        file: FileRecord,
        stream: &mut dyn ReadSeek,
    ) -> Result<Option<Box<dyn RecordReader>>, Error> {
        let Some(spec) = self.reader_for(file.file_type) else {
            return Ok(None);
        };
        let mut record = (spec.new)(file)?;
        record.read(stream)?;
        Ok(Some(record))
    }
}
