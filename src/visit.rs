//! Depth-first traversal over the firmware object tree.
//!
//! The tree is a tagged view ([`Node`]) plus a free-standing recursive
//! walker, in place of a double-dispatch visitor protocol. The object graph
//! is a strict tree; siblings are visited in insertion order.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use crate::{file::File, nvram::NvarStore, Error};

/// A node of the firmware tree as seen during traversal.
pub enum Node<'n, 'a> {
    /// A firmware file.
    File(&'n File<'a>),
    /// One delimited section of a file body. `data` is the section's bytes,
    /// headers included.
    Section {
        /// The containing file.
        file: &'n File<'a>,
        /// Zero-based position within the file.
        index: usize,
        /// The section bytes.
        data: &'n [u8],
    },
    /// The NVRAM store carried by a raw file.
    NvarStore(&'n dyn NvarStore),
}

/// Receives nodes during a walk. Returning an error stops the traversal.
pub trait Visitor {
    /// Called once per node, parents before children.
    fn visit(&mut self, node: Node<'_, '_>) -> Result<(), Error>;
}

/// Walk `file` and its children depth-first.
///
/// The file itself is visited first. A file carries either an NVRAM store
/// or sections, never both, so exactly one kind of child follows.
pub fn walk(file: &File<'_>, visitor: &mut dyn Visitor) -> Result<(), Error> {
    visitor.visit(Node::File(file))?;
    if let Some(store) = file.nvar_store() {
        return visitor.visit(Node::NvarStore(store));
    }
    for (index, range) in file.sections().iter().enumerate() {
        visitor.visit(Node::Section { file, index, data: &file.buf()[range.clone()] })?;
    }
    Ok(())
}
