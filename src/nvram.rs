//! The NVRAM-store seam.
//!
//! A raw file carrying the well-known NVRAM store GUID holds a variable
//! store rather than sections. Store parsing lives outside this crate; the
//! file parser hands the body to an [`NvramStoreDecoder`] and keeps whatever
//! handle it returns. A decoder failure is logged and demoted to "no store"
//! so the surrounding files stay parseable.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use crate::Error;
use core::any::Any;
use core::fmt;

/// Opaque handle to a decoded NVRAM variable store.
pub trait NvarStore: fmt::Debug {
    /// Downcast support so callers can recover their concrete store type.
    fn as_any(&self) -> &dyn Any;
}

/// Decodes an NVRAM variable store from a raw file body.
pub trait NvramStoreDecoder {
    /// Decode the store occupying `buffer`.
    fn decode(&self, buffer: &[u8]) -> Result<Box<dyn NvarStore>, Error>;
}
