//! Firmware File System (FFS) file parsing and reassembly.
//!
//! This module provides:
//! - `FileHeader`: the canonical in-memory header, always carrying the
//!   64-bit extended size regardless of how the file is encoded on disk.
//! - `File`: a parsed or assembled file over a borrowed or owned backing
//!   buffer, with the checksum and size arithmetic needed to re-emit it
//!   bit-exactly.
//! - `FileParser`: the entry point that turns a byte window of a firmware
//!   volume into a `File`, a free-space signal, or an error.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use crate::{
    base::{align4, checksum8, read3_size, write3_size, MAX_3_BYTE_SIZE},
    err::Error,
    filetype::FileType,
    guid::Guid,
    nvram::{NvarStore, NvramStoreDecoder},
    pi,
    section::SectionDecoder,
};

use core::fmt;
use core::ops::Range;
use r_efi::efi;
use std::borrow::Cow;

/// Alignments encoded by the attribute alignment index. These are not
/// computable from the index; the PI spec defines them as a lookup table.
const FILE_ALIGNMENTS: [u64; 16] = [
    1,
    16,
    128,
    512,
    1024,
    4 * 1024,
    32 * 1024,
    64 * 1024,
    128 * 1024,
    256 * 1024,
    512 * 1024,
    1024 * 1024,
    2 * 1024 * 1024,
    4 * 1024 * 1024,
    8 * 1024 * 1024,
    16 * 1024 * 1024,
];

/// Ambient codec settings, fixed for the duration of any parse or assemble
/// call. Passed explicitly so independent images can be processed under
/// different polarities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecContext {
    erase_polarity: u8,
    read_only: bool,
}

impl CodecContext {
    /// Create a context. `erase_polarity` is the byte erased flash reads
    /// back and must be `0x00` or `0xFF`; anything else is reserved and
    /// rejected. `read_only` selects borrowed backing buffers on parse.
    pub fn new(erase_polarity: u8, read_only: bool) -> Result<Self, Error> {
        match erase_polarity {
            0x00 | 0xFF => Ok(Self { erase_polarity, read_only }),
            other => Err(Error::ErasePolarityUnsupported(other)),
        }
    }

    /// The erase polarity byte.
    pub fn erase_polarity(&self) -> u8 {
        self.erase_polarity
    }

    /// Whether parsed files borrow their backing buffer.
    pub fn read_only(&self) -> bool {
        self.read_only
    }
}

/// The two independent 8-bit checksums of a file header.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityCheck {
    /// Checksum over the header, excluding `state` and `file`.
    pub header: u8,
    /// Checksum over the body, or `0xAA` when body checksumming is off.
    pub file: u8,
}

/// The file attribute bitfield.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes(u8);

impl FileAttributes {
    /// Wrap a raw attribute byte.
    pub const fn new(raw: u8) -> Self {
        FileAttributes(raw)
    }

    /// The raw attribute byte.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Whether the large-file bit is set, selecting the extended header.
    pub fn is_large(self) -> bool {
        self.0 & pi::file::attribute::LARGE_FILE != 0
    }

    /// Set or clear the large-file bit.
    pub fn set_large(&mut self, large: bool) {
        if large {
            self.0 |= pi::file::attribute::LARGE_FILE;
        } else {
            self.0 &= !pi::file::attribute::LARGE_FILE;
        }
    }

    /// Whether the body-checksum bit is set.
    pub fn has_checksum(self) -> bool {
        self.0 & pi::file::attribute::CHECKSUM != 0
    }

    /// Set or clear the body-checksum bit.
    pub fn set_checksum(&mut self, checksum: bool) {
        if checksum {
            self.0 |= pi::file::attribute::CHECKSUM;
        } else {
            self.0 &= !pi::file::attribute::CHECKSUM;
        }
    }

    /// The byte alignment the file requires within its volume.
    pub fn alignment(self) -> u64 {
        let mut index = (self.0 & pi::file::attribute::DATA_ALIGNMENT) >> 3;
        index |= (self.0 & pi::file::attribute::DATA_ALIGNMENT_2) << 2;
        FILE_ALIGNMENTS[index as usize]
    }
}

/// The canonical in-memory file header.
///
/// All files carry the 64-bit `extended_size` in memory, whether or not
/// they are encoded large on disk; the 3-byte `size` field is derived from
/// it on [`File::set_size`]. `state` holds the raw stored byte, XORed with
/// the erase polarity of the containing volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// The file name GUID.
    pub guid: efi::Guid,
    /// Header and body checksums.
    pub checksum: IntegrityCheck,
    /// The file type code.
    pub file_type: FileType,
    /// The attribute bitfield.
    pub attributes: FileAttributes,
    /// The 3-byte encoded size, `[0xFF; 3]` for large files.
    pub size: [u8; 3],
    /// The raw state byte as stored.
    pub state: u8,
    /// Total file length in bytes, the single source of truth.
    pub extended_size: u64,
}

impl FileHeader {
    /// Decode the standard 24-byte header fields. The extended size, if
    /// present, is consumed separately by the parser.
    fn decode(buf: &[u8]) -> Result<FileHeader, Error> {
        if buf.len() < pi::file::HEADER_LEN {
            return Err(Error::TruncatedHeader);
        }
        let guid_bytes: &[u8; 16] = buf[..16].try_into().unwrap();
        Ok(FileHeader {
            guid: efi::Guid::from_bytes(guid_bytes),
            checksum: IntegrityCheck { header: buf[16], file: buf[17] },
            file_type: FileType::new(buf[18]),
            attributes: FileAttributes::new(buf[19]),
            size: [buf[20], buf[21], buf[22]],
            state: buf[23],
            extended_size: 0,
        })
    }

    /// Serialize the header little-endian, appending the 8-byte extended
    /// size when `extended` is set.
    fn encode_into(&self, out: &mut Vec<u8>, extended: bool) {
        out.extend_from_slice(self.guid.as_bytes());
        out.push(self.checksum.header);
        out.push(self.checksum.file);
        out.push(self.file_type.code());
        out.push(self.attributes.raw());
        out.extend_from_slice(&self.size);
        out.push(self.state);
        if extended {
            out.extend_from_slice(&self.extended_size.to_le_bytes());
        }
    }

    /// Store logical state bits, applying the erase polarity.
    pub fn set_state(&mut self, state: u8, erase_polarity: u8) {
        self.state = state ^ erase_polarity;
    }

    /// The logical state bits with the erase polarity removed.
    pub fn logical_state(&self, erase_polarity: u8) -> u8 {
        self.state ^ erase_polarity
    }
}

/// What a file body contains. Sections and an NVRAM store are mutually
/// exclusive; files of non-sectioned types without a store stay opaque.
#[derive(Debug)]
enum FileContent {
    Opaque,
    Sections(Vec<Range<usize>>),
    NvarStore(Box<dyn NvarStore>),
}

/// A firmware file over its serialized backing buffer.
///
/// The buffer is borrowed from the parsed window in read-only mode and
/// owned otherwise; any mutation rebinds it owned. Mutating header fields
/// invalidates both checksums until [`File::checksum_and_assemble`] runs.
pub struct File<'a> {
    header: FileHeader,
    type_name: String,
    buf: Cow<'a, [u8]>,
    data_offset: usize,
    content: FileContent,
}

impl<'a> File<'a> {
    /// The parsed or assembled header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Mutable header access. Changing any field invalidates the checksums;
    /// reassemble before treating the buffer as authoritative.
    pub fn header_mut(&mut self) -> &mut FileHeader {
        &mut self.header
    }

    /// Display name of the file type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The serialized file bytes, header and body.
    pub fn buf(&self) -> &[u8] {
        &self.buf
    }

    /// Replace the backing buffer wholesale.
    pub fn set_buf(&mut self, buf: Vec<u8>) {
        self.buf = Cow::Owned(buf);
    }

    /// The body bytes following the header.
    pub fn body(&self) -> &[u8] {
        &self.buf[self.data_offset..]
    }

    /// Byte offset of the body within the buffer, 24 or 32.
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Total file length in bytes.
    pub fn size(&self) -> u64 {
        self.header.extended_size
    }

    /// Length of the header in its current encoding, 24 or 32.
    pub fn header_len(&self) -> usize {
        if self.header.attributes.is_large() {
            pi::file::HEADER_EXT_LEN
        } else {
            pi::file::HEADER_LEN
        }
    }

    /// Byte ranges of the delimited child sections within [`File::buf`].
    /// Empty for opaque files and NVRAM carriers.
    pub fn sections(&self) -> &[Range<usize>] {
        match &self.content {
            FileContent::Sections(sections) => sections,
            _ => &[],
        }
    }

    /// The decoded NVRAM store, for raw files carrying one.
    pub fn nvar_store(&self) -> Option<&dyn NvarStore> {
        match &self.content {
            FileContent::NvarStore(store) => Some(store.as_ref()),
            _ => None,
        }
    }

    /// Set the file size, deriving the header shape.
    ///
    /// Clears the large flag, then sets it again if `size` does not fit the
    /// 3-byte field. When it does not fit and `resize_if_extended` is set,
    /// the extended size grows by the 8 bytes the extended header occupies.
    /// The 3-byte field is derived with saturation either way.
    pub fn set_size(&mut self, size: u64, resize_if_extended: bool) {
        let header = &mut self.header;
        header.extended_size = size;
        header.attributes.set_large(false);
        if header.extended_size > MAX_3_BYTE_SIZE {
            if resize_if_extended {
                header.extended_size += (pi::file::HEADER_EXT_LEN - pi::file::HEADER_LEN) as u64;
            }
            header.attributes.set_large(true);
        }
        header.size = write3_size(header.extended_size);
    }

    /// Checksum of the serialized header with `state` and the body checksum
    /// excluded from the sum domain.
    ///
    /// Operates on the backing buffer, so the header must have been
    /// materialized (by parsing or assembly) first.
    pub fn checksum_header(&self) -> u8 {
        checksum8(&self.buf[..self.header_len()])
            .wrapping_sub(self.header.checksum.file)
            .wrapping_sub(self.header.state)
    }

    /// Recompute both checksums and rebuild the backing buffer as header
    /// plus `body`.
    ///
    /// The header is first materialized in extended form so the checksum
    /// runs over real bytes, then patched so the effective header sum is
    /// zero, then re-serialized in the shape the large flag dictates.
    pub fn checksum_and_assemble(&mut self, body: &[u8]) -> Result<(), Error> {
        let mut scratch = Vec::with_capacity(pi::file::HEADER_EXT_LEN);
        self.header.encode_into(&mut scratch, true);
        self.buf = Cow::Owned(scratch);
        let sum = self.checksum_header();
        self.header.checksum.header = self.header.checksum.header.wrapping_sub(sum);

        self.header.checksum.file = pi::file::EMPTY_BODY_CHECKSUM;
        if self.header.attributes.has_checksum() {
            self.header.checksum.file = 0u8.wrapping_sub(checksum8(body));
        }

        let mut out = Vec::with_capacity(self.header_len() + body.len());
        self.header.encode_into(&mut out, self.header.attributes.is_large());
        out.extend_from_slice(body);
        self.data_offset = self.header_len();
        self.buf = Cow::Owned(out);
        Ok(())
    }

    /// Create an assembled pad file of `size` total bytes.
    ///
    /// Pads occupy space so the following file meets its alignment
    /// requirement. They always carry the all-ones GUID and zero attributes;
    /// the body is filled with the erase polarity byte.
    pub fn new_pad(size: u64, ctx: &CodecContext) -> Result<File<'static>, Error> {
        if size < pi::file::HEADER_LEN as u64 {
            return Err(Error::PadTooSmall { size });
        }

        let mut file = File {
            header: FileHeader {
                guid: pi::guid::ALL_ONES,
                checksum: IntegrityCheck::default(),
                file_type: FileType::PAD,
                attributes: FileAttributes::default(),
                size: [0u8; 3],
                state: 0,
                extended_size: 0,
            },
            type_name: FileType::PAD.to_string(),
            buf: Cow::Owned(Vec::new()),
            data_offset: pi::file::HEADER_LEN,
            content: FileContent::Opaque,
        };

        // A pad big enough to need the extended header gives up more of its
        // padding to the header rather than growing.
        file.set_size(size, false);

        let body = vec![ctx.erase_polarity(); size as usize - file.header_len()];
        file.header.set_state(pi::file::state::VALID, ctx.erase_polarity());
        file.checksum_and_assemble(&body)?;
        Ok(file)
    }
}

impl fmt::Debug for File<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("guid", &Guid(self.header.guid))
            .field("type", &self.type_name)
            .field("data (bytes)", &self.buf.len())
            .field("data_offset", &self.data_offset)
            .field("content", &self.content)
            .finish()
    }
}

/// Parses firmware files out of byte windows of a firmware volume.
///
/// Carries the codec context and the delegate decoders for section and
/// NVRAM-store bodies.
pub struct FileParser<'d> {
    ctx: CodecContext,
    sections: &'d dyn SectionDecoder,
    nvram: &'d dyn NvramStoreDecoder,
}

impl<'d> FileParser<'d> {
    /// Create a parser over the given context and delegates.
    pub fn new(ctx: CodecContext, sections: &'d dyn SectionDecoder, nvram: &'d dyn NvramStoreDecoder) -> Self {
        Self { ctx, sections, nvram }
    }

    /// Parse the file starting at the front of `buf`.
    ///
    /// Returns `Ok(None)` when the window is the start of volume free space
    /// (an all-ones extended size behind the `{FF,FF,FF}` size sentinel),
    /// which is distinct from any error. Pad files have valid headers and
    /// parse as ordinary files.
    pub fn parse<'a>(&self, buf: &'a [u8]) -> Result<Option<File<'a>>, Error> {
        let mut header = FileHeader::decode(buf)?;
        let mut data_offset = pi::file::HEADER_LEN;

        if header.size == [0xFF, 0xFF, 0xFF] {
            if buf.len() < pi::file::HEADER_EXT_LEN {
                return Err(Error::TruncatedHeader);
            }
            let extended = u64::from_le_bytes(buf[pi::file::HEADER_LEN..pi::file::HEADER_EXT_LEN].try_into().unwrap());
            if extended == u64::MAX {
                // Start of free space, not a file and not a pad.
                return Ok(None);
            }
            header.extended_size = extended;
            data_offset = pi::file::HEADER_EXT_LEN;
        } else {
            header.extended_size = read3_size(header.size);
        }

        if header.extended_size > buf.len() as u64 {
            return Err(Error::SizeOverflow {
                guid: header.guid.into(),
                size: header.extended_size,
                available: buf.len(),
            });
        }
        let size = header.extended_size as usize;
        // A declared size smaller than the header that declared it cannot
        // hold a file.
        if size < data_offset {
            return Err(Error::TruncatedHeader);
        }

        let backing: Cow<'a, [u8]> = if self.ctx.read_only() {
            Cow::Borrowed(&buf[..size])
        } else {
            Cow::Owned(buf[..size].to_vec())
        };

        let mut file = File {
            type_name: header.file_type.to_string(),
            header,
            buf: backing,
            data_offset,
            content: FileContent::Opaque,
        };

        // Raw files carrying the well-known store GUID hold an NVRAM
        // variable store. A store parse failure is demoted to "no store" so
        // the rest of the volume stays readable.
        if file.header.file_type == FileType::RAW && file.header.guid == pi::guid::NVRAM_STORE {
            match self.nvram.decode(&file.buf[file.data_offset..]) {
                Ok(store) => file.content = FileContent::NvarStore(store),
                Err(err) => {
                    log::error!("error parsing NVRAM store in file {}: {err}", Guid(file.header.guid));
                }
            }
        }

        if !file.header.file_type.is_sectioned() {
            return Ok(Some(file));
        }

        let mut sections = Vec::new();
        let mut offset = file.data_offset as u64;
        let mut index = 0usize;
        while offset < file.header.extended_size {
            let decoded = self.sections.decode(&file.buf[offset as usize..], index).map_err(|err| {
                Error::InvalidSection { guid: file.header.guid.into(), index, source: Some(Box::new(err)) }
            })?;
            let end = match offset.checked_add(decoded.extended_size) {
                Some(end) if decoded.extended_size != 0 && end <= file.header.extended_size => end,
                _ => {
                    return Err(Error::InvalidSection { guid: file.header.guid.into(), index, source: None });
                }
            };
            sections.push(offset as usize..end as usize);
            // 4-byte alignment between sections, as UEFITool does; the next
            // section may start exactly at the end of the file, ending the
            // walk.
            offset = align4(end);
            index += 1;
        }
        file.content = FileContent::Sections(sections);
        Ok(Some(file))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::section::DecodedSection;
    use crate::visit::{walk, Node, Visitor};
    use log::{Level, LevelFilter, Metadata, Record};
    use std::any::Any;

    // Sample logger for log crate to dump stuff in tests
    struct SimpleLogger;
    impl log::Log for SimpleLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Debug
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                println!("{}", record.args());
            }
        }

        fn flush(&self) {}
    }
    static LOGGER: SimpleLogger = SimpleLogger;

    fn set_logger() {
        let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Debug));
    }

    fn polarity_ff() -> CodecContext {
        CodecContext::new(0xFF, false).unwrap()
    }

    fn test_guid() -> efi::Guid {
        efi::Guid::from_fields(0x01234567, 0x89ab, 0xcdef, 0x01, 0x23, &[0x45, 0x67, 0x89, 0xab, 0xcd, 0xef])
    }

    /// Decoder for the common 4-byte section header: 3-byte LE size plus a
    /// type byte. Enough to delimit sections without interpreting them.
    struct CommonHeaderDecoder;
    impl SectionDecoder for CommonHeaderDecoder {
        fn decode(&self, buffer: &[u8], _index: usize) -> Result<DecodedSection, Error> {
            if buffer.len() < 4 {
                return Err(Error::TruncatedHeader);
            }
            Ok(DecodedSection { extended_size: read3_size([buffer[0], buffer[1], buffer[2]]) })
        }
    }

    struct FailingNvramDecoder;
    impl NvramStoreDecoder for FailingNvramDecoder {
        fn decode(&self, _buffer: &[u8]) -> Result<Box<dyn NvarStore>, Error> {
            Err(Error::TruncatedHeader)
        }
    }

    #[derive(Debug)]
    struct RecordedStore {
        len: usize,
    }
    impl NvarStore for RecordedStore {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct RecordingNvramDecoder;
    impl NvramStoreDecoder for RecordingNvramDecoder {
        fn decode(&self, buffer: &[u8]) -> Result<Box<dyn NvarStore>, Error> {
            Ok(Box::new(RecordedStore { len: buffer.len() }))
        }
    }

    fn parser<'d>(
        ctx: CodecContext,
        sections: &'d dyn SectionDecoder,
        nvram: &'d dyn NvramStoreDecoder,
    ) -> FileParser<'d> {
        FileParser::new(ctx, sections, nvram)
    }

    /// Assemble a standard-header file around `body` and return its bytes.
    fn build_file(guid: efi::Guid, file_type: FileType, attributes: u8, body: &[u8], polarity: u8) -> Vec<u8> {
        let mut file = File {
            header: FileHeader {
                guid,
                checksum: IntegrityCheck::default(),
                file_type,
                attributes: FileAttributes::new(attributes),
                size: [0u8; 3],
                state: 0,
                extended_size: 0,
            },
            type_name: file_type.to_string(),
            buf: Cow::Owned(Vec::new()),
            data_offset: pi::file::HEADER_LEN,
            content: FileContent::Opaque,
        };
        file.set_size(pi::file::HEADER_LEN as u64 + body.len() as u64, false);
        file.header.set_state(pi::file::state::VALID, polarity);
        file.checksum_and_assemble(body).unwrap();
        file.buf.into_owned()
    }

    #[test]
    fn minimal_pad_file_with_polarity_ff() {
        let file = File::new_pad(24, &polarity_ff()).unwrap();
        let buf = file.buf();
        assert_eq!(buf.len(), 24);
        assert!(buf[..16].iter().all(|&b| b == 0xFF));
        assert_eq!(buf[17], pi::file::EMPTY_BODY_CHECKSUM);
        assert_eq!(buf[18], 0xF0);
        assert_eq!(buf[19], 0x00);
        assert_eq!(&buf[20..23], &[0x18, 0x00, 0x00]);
        assert_eq!(buf[23] ^ 0xFF, pi::file::state::VALID);
        // The effective header sum is zero once state and the body checksum
        // are excluded.
        assert_eq!(file.checksum_header(), 0);
        assert!(file.body().is_empty());
        assert_eq!(file.type_name(), "EFI_FV_FILETYPE_FFS_PAD");
    }

    #[test]
    fn pad_file_below_header_length_is_rejected() {
        let err = File::new_pad(23, &polarity_ff()).unwrap_err();
        assert!(matches!(err, Error::PadTooSmall { size: 23 }));
    }

    #[test]
    fn pad_file_body_carries_the_erase_byte() {
        let ctx = CodecContext::new(0x00, false).unwrap();
        let file = File::new_pad(0x30, &ctx).unwrap();
        assert_eq!(file.buf().len(), 0x30);
        assert!(file.body().iter().all(|&b| b == 0x00));
        assert_eq!(file.header().logical_state(0x00), pi::file::state::VALID);

        let file = File::new_pad(0x30, &polarity_ff()).unwrap();
        assert!(file.body().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn reserved_erase_polarity_is_rejected() {
        assert!(matches!(CodecContext::new(0xA5, false), Err(Error::ErasePolarityUnsupported(0xA5))));
    }

    #[test]
    fn set_size_crossing_the_3_byte_limit_grows_for_the_extended_header() {
        let mut file = File::new_pad(24, &polarity_ff()).unwrap();
        file.set_size(0x100_0000, true);
        assert!(file.header().attributes.is_large());
        assert_eq!(file.header().extended_size, 0x100_0008);
        assert_eq!(file.header().size, [0xFF, 0xFF, 0xFF]);
        assert_eq!(file.header_len(), pi::file::HEADER_EXT_LEN);
    }

    #[test]
    fn set_size_small_clears_the_large_flag() {
        let mut file = File::new_pad(24, &polarity_ff()).unwrap();
        file.set_size(0x100_0000, false);
        assert_eq!(file.header().extended_size, 0x100_0000);
        file.set_size(0x1234, false);
        assert!(!file.header().attributes.is_large());
        assert_eq!(file.header().size, [0x34, 0x12, 0x00]);
        assert_eq!(file.header_len(), pi::file::HEADER_LEN);
    }

    #[test]
    fn assembled_body_checksum_cancels_the_body_sum() {
        let body = [0x11u8, 0x22, 0x33, 0x44];
        let buf = build_file(test_guid(), FileType::RAW, pi::file::attribute::CHECKSUM, &body, 0xFF);
        let file_checksum = buf[17];
        assert_eq!(checksum8(&body).wrapping_add(file_checksum), 0);
        assert_ne!(file_checksum, pi::file::EMPTY_BODY_CHECKSUM);
    }

    #[test]
    fn free_space_is_a_signal_not_an_error() {
        set_logger();
        let window = [0xFFu8; 0x40];
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        assert!(p.parse(&window).unwrap().is_none());
    }

    #[test]
    fn short_windows_are_truncated() {
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        assert!(matches!(p.parse(&[0u8; 0x17]), Err(Error::TruncatedHeader)));

        // Extended size promised but missing.
        let mut window = [0u8; 0x18];
        window[20..23].copy_from_slice(&[0xFF, 0xFF, 0xFF]);
        assert!(matches!(p.parse(&window), Err(Error::TruncatedHeader)));

        // Declared size smaller than the header that declared it.
        let mut window = [0u8; 0x18];
        window[20] = 0x10;
        assert!(matches!(p.parse(&window), Err(Error::TruncatedHeader)));
    }

    #[test]
    fn declared_size_beyond_the_window_overflows() {
        let buf = build_file(test_guid(), FileType::RAW, 0, &[0xAB; 8], 0xFF);
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        let err = p.parse(&buf[..buf.len() - 1]).unwrap_err();
        match err {
            Error::SizeOverflow { guid, size, available } => {
                assert_eq!(guid, Guid(test_guid()));
                assert_eq!(size, 0x20);
                assert_eq!(available, 0x1F);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn raw_files_stay_opaque() {
        let body = [0xDEu8, 0xAD, 0xBE, 0xEF];
        let buf = build_file(test_guid(), FileType::RAW, 0, &body, 0xFF);
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        let file = p.parse(&buf).unwrap().unwrap();
        assert!(file.sections().is_empty());
        assert!(file.nvar_store().is_none());
        assert_eq!(file.body(), &body);
        assert_eq!(file.data_offset(), pi::file::HEADER_LEN);
    }

    #[test]
    fn nvram_store_guid_delegates_to_the_store_decoder() {
        let body = [0x5Au8; 12];
        let buf = build_file(pi::guid::NVRAM_STORE, FileType::RAW, 0, &body, 0xFF);
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &RecordingNvramDecoder);
        let file = p.parse(&buf).unwrap().unwrap();
        let store = file.nvar_store().expect("store should be attached");
        let store = store.as_any().downcast_ref::<RecordedStore>().unwrap();
        assert_eq!(store.len, body.len());
        assert!(file.sections().is_empty());
    }

    #[test]
    fn malformed_nvram_store_is_demoted_not_fatal() {
        set_logger();
        let body = [0x5Au8; 12];
        let buf = build_file(pi::guid::NVRAM_STORE, FileType::RAW, 0, &body, 0xFF);
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        let file = p.parse(&buf).unwrap().unwrap();
        assert!(file.nvar_store().is_none());
        assert_eq!(file.header().file_type, FileType::RAW);
        assert_eq!(file.body(), &body);
    }

    /// Three sections of sizes 8, 10, and 6, with two alignment pad bytes
    /// between the second and third.
    fn driver_body() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0x08, 0x00, 0x00, 0x10]);
        body.extend_from_slice(&[0xA0, 0xA1, 0xA2, 0xA3]);
        body.extend_from_slice(&[0x0A, 0x00, 0x00, 0x19]);
        body.extend_from_slice(&[0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5]);
        body.extend_from_slice(&[0x00, 0x00]);
        body.extend_from_slice(&[0x06, 0x00, 0x00, 0x15]);
        body.extend_from_slice(&[0xC0, 0xC1]);
        body
    }

    #[test]
    fn driver_file_sections_are_delimited_and_round_trip() {
        let body = driver_body();
        let buf = build_file(test_guid(), FileType::DRIVER, 0, &body, 0xFF);
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        let mut file = p.parse(&buf).unwrap().unwrap();

        assert_eq!(file.data_offset(), pi::file::HEADER_LEN);
        assert_eq!(file.sections(), &[0x18..0x20, 0x20..0x2A, 0x2C..0x32]);

        // Reassembling without mutation reproduces the input bytes.
        let original_body = file.body().to_vec();
        file.checksum_and_assemble(&original_body).unwrap();
        assert_eq!(file.buf(), &buf[..]);
    }

    #[test]
    fn read_only_mode_borrows_the_window() {
        let body = [0u8; 4];
        let buf = build_file(test_guid(), FileType::RAW, 0, &body, 0xFF);

        let ctx = CodecContext::new(0xFF, true).unwrap();
        let p = parser(ctx, &CommonHeaderDecoder, &FailingNvramDecoder);
        let file = p.parse(&buf).unwrap().unwrap();
        assert!(matches!(file.buf, Cow::Borrowed(_)));

        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        let file = p.parse(&buf).unwrap().unwrap();
        assert!(matches!(file.buf, Cow::Owned(_)));
    }

    #[test]
    fn zero_sized_section_is_fatal() {
        let mut body = vec![0x00, 0x00, 0x00, 0x10];
        body.extend_from_slice(&[0u8; 4]);
        let buf = build_file(test_guid(), FileType::DRIVER, 0, &body, 0xFF);
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        let err = p.parse(&buf).unwrap_err();
        assert!(matches!(err, Error::InvalidSection { index: 0, source: None, .. }));
    }

    #[test]
    fn section_decode_errors_carry_file_context() {
        // A 2-byte body is too short for even a common section header.
        let buf = build_file(test_guid(), FileType::DRIVER, 0, &[0x00, 0x00], 0xFF);
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        let err = p.parse(&buf).unwrap_err();
        match err {
            Error::InvalidSection { guid, index: 0, source: Some(source) } => {
                assert_eq!(guid, Guid(test_guid()));
                assert!(matches!(*source, Error::TruncatedHeader));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn section_overrunning_the_file_is_fatal() {
        // Declared section size of 0x40 inside an 8-byte body.
        let body = [0x40, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00];
        let buf = build_file(test_guid(), FileType::DRIVER, 0, &body, 0xFF);
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        let err = p.parse(&buf).unwrap_err();
        assert!(matches!(err, Error::InvalidSection { index: 0, source: None, .. }));
    }

    #[derive(Default)]
    struct RecordingVisitor {
        files: usize,
        sections: Vec<usize>,
        stores: usize,
    }

    impl Visitor for RecordingVisitor {
        fn visit(&mut self, node: Node<'_, '_>) -> Result<(), Error> {
            match node {
                Node::File(_) => self.files += 1,
                Node::Section { index, .. } => self.sections.push(index),
                Node::NvarStore(_) => self.stores += 1,
            }
            Ok(())
        }
    }

    #[test]
    fn walk_visits_file_then_children_in_order() {
        let buf = build_file(test_guid(), FileType::DRIVER, 0, &driver_body(), 0xFF);
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        let file = p.parse(&buf).unwrap().unwrap();

        let mut visitor = RecordingVisitor::default();
        walk(&file, &mut visitor).unwrap();
        assert_eq!(visitor.files, 1);
        assert_eq!(visitor.sections, vec![0, 1, 2]);
        assert_eq!(visitor.stores, 0);

        let buf = build_file(pi::guid::NVRAM_STORE, FileType::RAW, 0, &[0x5A; 12], 0xFF);
        let p = parser(polarity_ff(), &CommonHeaderDecoder, &RecordingNvramDecoder);
        let file = p.parse(&buf).unwrap().unwrap();
        let mut visitor = RecordingVisitor::default();
        walk(&file, &mut visitor).unwrap();
        assert_eq!((visitor.files, visitor.stores), (1, 1));
        assert!(visitor.sections.is_empty());
    }

    #[test]
    fn alignment_index_spans_both_attribute_fields() {
        assert_eq!(FileAttributes::new(0).alignment(), 1);
        assert_eq!(FileAttributes::new(0x08).alignment(), 16);
        assert_eq!(FileAttributes::new(0x38).alignment(), 64 * 1024);
        assert_eq!(FileAttributes::new(0x02).alignment(), 128 * 1024);
        assert_eq!(FileAttributes::new(0x3A).alignment(), 16 * 1024 * 1024);
    }

    #[test]
    fn large_files_parse_with_the_extended_header() {
        // Hand-build a large file: extended header, tiny body. The size
        // sentinel forces the 8-byte extended size even though the actual
        // length is small.
        let body = [0xEEu8; 4];
        let mut file = File {
            header: FileHeader {
                guid: test_guid(),
                checksum: IntegrityCheck::default(),
                file_type: FileType::RAW,
                attributes: FileAttributes::new(pi::file::attribute::LARGE_FILE),
                size: [0xFF, 0xFF, 0xFF],
                state: 0,
                extended_size: (pi::file::HEADER_EXT_LEN + body.len()) as u64,
            },
            type_name: FileType::RAW.to_string(),
            buf: Cow::Owned(Vec::new()),
            data_offset: pi::file::HEADER_EXT_LEN,
            content: FileContent::Opaque,
        };
        file.header.set_state(pi::file::state::VALID, 0xFF);
        file.checksum_and_assemble(&body).unwrap();
        let buf = file.buf().to_vec();
        assert_eq!(buf.len(), 0x24);

        let p = parser(polarity_ff(), &CommonHeaderDecoder, &FailingNvramDecoder);
        let parsed = p.parse(&buf).unwrap().unwrap();
        assert_eq!(parsed.data_offset(), pi::file::HEADER_EXT_LEN);
        assert_eq!(parsed.header_len(), pi::file::HEADER_EXT_LEN);
        assert_eq!(parsed.size(), 0x24);
        assert_eq!(parsed.body(), &body);
        assert_eq!(parsed.checksum_header(), 0);
    }
}
