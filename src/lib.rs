//! Support for the Firmware File System as described in the UEFI Platform
//! Initialization Specification, together with coreboot File System (CBFS)
//! payload records embedded in such images.
//!
//! This crate implements the binary codec and structural model for firmware
//! files: parsing a byte window into a [`file::File`], mutating its header,
//! and reassembling a bit-exact image with correct checksums. Section bodies,
//! compression, and NVRAM variable stores are delegated to collaborators
//! behind the traits in [`section`] and [`nvram`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

pub mod base;
pub mod cbfs;
pub mod err;
pub mod file;
pub mod filetype;
pub mod guid;
pub mod nvram;
pub mod pi;
pub mod section;
pub mod visit;

pub use err::Error;
pub use file::{CodecContext, File, FileParser};
