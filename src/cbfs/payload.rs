//! `SELF` payload record decoding and re-encoding.
//!
//! A payload record is a sequence of big-endian segment descriptors
//! terminated by an entry-point segment, followed by the segment data as one
//! opaque body. Decoding is a two-state machine: read descriptors until the
//! entry segment, then capture whatever the declared record size says is
//! left. Known-malformed images exist in the wild, so body sizing is
//! deliberately permissive.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use crate::cbfs::{Compression, FileRecord, ReadSeek, RecordReader, SegTag};
use crate::Error;
use core::fmt;
use std::io::{Read, Write};

/// One payload segment descriptor. All fields are big-endian on the wire,
/// unlike every FFS header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    /// The segment tag.
    pub tag: SegTag,
    /// Compression applied to the segment data.
    pub compression: Compression,
    /// Offset of the segment data within the record.
    pub offset: u32,
    /// Address the segment is loaded to.
    pub load_address: u64,
    /// Size of the (possibly compressed) segment data in the record.
    pub size: u32,
    /// Size of the segment once loaded.
    pub mem_size: u32,
}

impl PayloadHeader {
    /// Serialized descriptor length in bytes.
    pub const ENCODED_LEN: usize = 28;

    /// Decode one descriptor from `reader`.
    pub fn read_from(reader: &mut dyn Read) -> std::io::Result<Self> {
        let mut raw = [0u8; Self::ENCODED_LEN];
        reader.read_exact(&mut raw)?;
        Ok(Self {
            tag: SegTag(u32::from_be_bytes(raw[0..4].try_into().unwrap())),
            compression: Compression(u32::from_be_bytes(raw[4..8].try_into().unwrap())),
            offset: u32::from_be_bytes(raw[8..12].try_into().unwrap()),
            load_address: u64::from_be_bytes(raw[12..20].try_into().unwrap()),
            size: u32::from_be_bytes(raw[20..24].try_into().unwrap()),
            mem_size: u32::from_be_bytes(raw[24..28].try_into().unwrap()),
        })
    }

    /// Encode this descriptor to `sink`.
    pub fn write_to(&self, sink: &mut dyn Write) -> std::io::Result<()> {
        let mut raw = [0u8; Self::ENCODED_LEN];
        raw[0..4].copy_from_slice(&self.tag.0.to_be_bytes());
        raw[4..8].copy_from_slice(&self.compression.0.to_be_bytes());
        raw[8..12].copy_from_slice(&self.offset.to_be_bytes());
        raw[12..20].copy_from_slice(&self.load_address.to_be_bytes());
        raw[20..24].copy_from_slice(&self.size.to_be_bytes());
        raw[24..28].copy_from_slice(&self.mem_size.to_be_bytes());
        sink.write_all(&raw)
    }
}

impl fmt::Display for PayloadHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type {} compression {} offset {:#x} load address {:#x} size {:#x} mem size {:#x}",
            self.tag, self.compression, self.offset, self.load_address, self.size, self.mem_size
        )
    }
}

/// A decoded `SELF` payload record: its segment descriptors and body bytes.
///
/// A successfully decoded record always holds at least one segment, and the
/// last one is the entry segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadRecord {
    file: FileRecord,
    segs: Vec<PayloadHeader>,
    data: Vec<u8>,
}

impl PayloadRecord {
    /// An empty record for `file`, ready to [`read`](RecordReader::read).
    pub fn new(file: FileRecord) -> Self {
        Self { file, segs: Vec::new(), data: Vec::new() }
    }

    /// The decoded segment descriptors, in wire order.
    pub fn segments(&self) -> &[PayloadHeader] {
        &self.segs
    }

    /// The payload body following the descriptors.
    pub fn body(&self) -> &[u8] {
        &self.data
    }
}

/// Registry constructor for `SELF` records.
pub fn new_payload_record(file: FileRecord) -> Result<Box<dyn RecordReader>, Error> {
    Ok(Box::new(PayloadRecord::new(file)))
}

impl RecordReader for PayloadRecord {
    fn read(&mut self, stream: &mut dyn ReadSeek) -> Result<(), Error> {
        loop {
            let header = match PayloadHeader::read_from(stream) {
                Ok(header) => header,
                Err(err) => {
                    log::debug!("payload header read: {err}");
                    return Err(err.into());
                }
            };
            log::debug!("got payload header: {header}");
            let entry = header.tag == SegTag::ENTRY;
            self.segs.push(header);
            if entry {
                break;
            }
        }

        // Everything after the descriptors up to the declared record size is
        // the body.
        let offset = stream.stream_position()?;
        let body_size = self.file.size as i64 - offset as i64;
        log::debug!("payload size {:#x}, body size {body_size}, offset {offset:#x}", self.file.size);
        if body_size < 0 {
            // Seen on known-bad records; treat the body as empty.
            return Ok(());
        }
        if body_size == 0 {
            log::debug!("payload body empty, nothing to read");
            return Ok(());
        }
        self.data = vec![0u8; body_size as usize];
        let read = stream.read(&mut self.data)?;
        // A short read leaves the body at the length actually read.
        self.data.truncate(read);
        log::debug!("payload body read {read} bytes");
        Ok(())
    }

    fn write_to(&self, sink: &mut dyn Write) -> Result<(), Error> {
        match self.segs.last() {
            None => return Err(Error::Serialization("payload record has no segments")),
            Some(last) if last.tag != SegTag::ENTRY => {
                return Err(Error::Serialization("payload segment list does not end with an entry segment"))
            }
            Some(_) => {}
        }
        for seg in &self.segs {
            seg.write_to(sink)?;
        }
        sink.write_all(&self.data)?;
        Ok(())
    }

    fn file(&self) -> &FileRecord {
        &self.file
    }
}
