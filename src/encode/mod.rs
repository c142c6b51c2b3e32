// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary format encoding.
//!
//! The encoder is the decoder's mirror image: sections are emitted in
//! canonical order, each only when it has content, with payloads built in
//! a child encoder so length prefixes are exact. Preserved expressions are
//! written back verbatim.

mod encodable_impls;
mod instr;
mod leb128;

pub use instr::encode_instructions;

use core::fmt;

use crate::Allocator;
use crate::compat::{TryReserveError, Vec};
use crate::types::{Module, SectionId};

/// Represents errors that can arise during module encoding.
pub enum Error {
    /// Failed memory allocation.
    AllocError,
    /// A `try_table` catch clause's tag disagrees with its kind.
    InconsistentCatchClause,
    /// A data segment's optional fields disagree with its flags word.
    InconsistentDataSegment { flags: u32 },
    /// An element segment's optional fields or payload disagree with its
    /// flags word.
    InconsistentElementSegment { flags: u32 },
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocError => write!(f, "allocation failure"),
            Error::InconsistentCatchClause => {
                write!(f, "catch clause tag inconsistent with its kind")
            }
            Error::InconsistentDataSegment { flags } => {
                write!(f, "data segment fields inconsistent with flags {flags:#x}")
            }
            Error::InconsistentElementSegment { flags } => write!(
                f,
                "element segment fields inconsistent with flags {flags:#x}"
            ),
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::AllocError
    }
}

// Types that can be encoded to the binary format.
pub(crate) trait Encodable<A: Allocator + Clone> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error>;
}

pub(crate) struct Encoder<A: Allocator + Clone> {
    alloc: A,
    out: Vec<u8, A>,
}

impl<A: Allocator + Clone> Encoder<A> {
    fn new(alloc: A) -> Self {
        let out = Vec::new_in(alloc.clone());
        Self { alloc, out }
    }

    fn into_bytes(self) -> Vec<u8, A> {
        self.out
    }

    pub(crate) fn write_byte(&mut self, byte: u8) -> Result<(), Error> {
        self.out.try_reserve(1)?;
        self.out.push(byte);
        Ok(())
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.out.try_reserve(bytes.len())?;
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn write_u32_leb(&mut self, value: u32) -> Result<(), Error> {
        Ok(leb128::write_unsigned(&mut self.out, u64::from(value))?)
    }

    pub(crate) fn write_u64_leb(&mut self, value: u64) -> Result<(), Error> {
        Ok(leb128::write_unsigned(&mut self.out, value)?)
    }

    pub(crate) fn write_s32_leb(&mut self, value: i32) -> Result<(), Error> {
        Ok(leb128::write_signed(&mut self.out, i64::from(value))?)
    }

    pub(crate) fn write_s64_leb(&mut self, value: i64) -> Result<(), Error> {
        Ok(leb128::write_signed(&mut self.out, value)?)
    }

    // Heap types and block types share the signed 33-bit encoding; the
    // signed 64-bit writer emits the identical bytes for in-range values.
    pub(crate) fn write_s33_leb(&mut self, value: i64) -> Result<(), Error> {
        Ok(leb128::write_signed(&mut self.out, value)?)
    }

    pub(crate) fn write_name(&mut self, name: &str) -> Result<(), Error> {
        self.write_u32_leb(name.len() as u32)?;
        self.write_bytes(name.as_bytes())
    }

    pub(crate) fn write<T: Encodable<A>>(&mut self, value: &T) -> Result<(), Error> {
        value.encode(self)
    }

    pub(crate) fn write_vec<T: Encodable<A>>(&mut self, items: &[T]) -> Result<(), Error> {
        self.write_u32_leb(items.len() as u32)?;
        for item in items {
            self.write(item)?;
        }
        Ok(())
    }

    // Runs `f` against a child encoder, then frames its output as a
    // section: ID byte, payload length, payload.
    fn section<F>(&mut self, id: SectionId, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Encoder<A>) -> Result<(), Error>,
    {
        let mut child = Encoder::new(self.alloc.clone());
        f(&mut child)?;
        let payload = child.into_bytes();
        self.write_byte(id as u8)?;
        self.write_u32_leb(payload.len() as u32)?;
        self.write_bytes(&payload)
    }

    // Frames `f`'s output with a byte-length prefix (function bodies).
    pub(crate) fn sized<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Encoder<A>) -> Result<(), Error>,
    {
        let mut child = Encoder::new(self.alloc.clone());
        f(&mut child)?;
        let payload = child.into_bytes();
        self.write_u32_leb(payload.len() as u32)?;
        self.write_bytes(&payload)
    }
}

const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Encode a module to the binary format, allocating from `alloc`.
pub fn encode_module_in<A: Allocator + Clone>(
    module: &Module<A>,
    alloc: A,
) -> Result<Vec<u8, A>, Error> {
    let mut encoder = Encoder::new(alloc);
    encoder.write_bytes(&MAGIC)?;
    encoder.write_bytes(&VERSION)?;

    // The type section prefers the rich definitions when any exist; plain
    // modules re-emit the 0x60 shorthand from the flat signatures.
    if !module.type_defs.is_empty() {
        encoder.section(SectionId::Type, |e| e.write_vec(&module.type_defs))?;
    } else if !module.types.is_empty() {
        encoder.section(SectionId::Type, |e| {
            e.write_u32_leb(module.types.len() as u32)?;
            for func in &module.types {
                e.write_byte(encodable_impls::FORM_FUNC)?;
                e.write(func)?;
            }
            Ok(())
        })?;
    }

    if !module.imports.is_empty() {
        encoder.section(SectionId::Import, |e| e.write_vec(&module.imports))?;
    }
    if !module.funcs.is_empty() {
        encoder.section(SectionId::Function, |e| e.write_vec(&module.funcs))?;
    }
    if !module.tables.is_empty() {
        encoder.section(SectionId::Table, |e| e.write_vec(&module.tables))?;
    }
    if !module.memories.is_empty() {
        encoder.section(SectionId::Memory, |e| e.write_vec(&module.memories))?;
    }
    if !module.tags.is_empty() {
        encoder.section(SectionId::Tag, |e| e.write_vec(&module.tags))?;
    }
    if !module.globals.is_empty() {
        encoder.section(SectionId::Global, |e| e.write_vec(&module.globals))?;
    }
    if !module.exports.is_empty() {
        encoder.section(SectionId::Export, |e| e.write_vec(&module.exports))?;
    }
    if let Some(start) = module.start {
        encoder.section(SectionId::Start, |e| e.write_u32_leb(*start))?;
    }
    if !module.elements.is_empty() {
        encoder.section(SectionId::Element, |e| e.write_vec(&module.elements))?;
    }
    if let Some(count) = module.data_count {
        encoder.section(SectionId::DataCount, |e| e.write_u32_leb(count))?;
    }
    if !module.code.is_empty() {
        encoder.section(SectionId::Code, |e| e.write_vec(&module.code))?;
    }
    if !module.data.is_empty() {
        encoder.section(SectionId::Data, |e| e.write_vec(&module.data))?;
    }

    // Custom sections carry no position information; they are re-emitted
    // after all known sections, in encounter order.
    for custom in &module.custom_sections {
        encoder.section(SectionId::Custom, |e| {
            e.write_name(custom.name.as_str())?;
            e.write_bytes(&custom.bytes)
        })?;
    }

    Ok(encoder.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::Global;

    #[test]
    fn empty_module_is_exactly_the_envelope() {
        let module = Module::empty_in(Global);
        let bytes = encode_module_in(&module, Global).unwrap();
        assert_eq!(
            bytes.as_slice(),
            &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn sections_are_length_prefixed() {
        let mut module = Module::empty_in(Global);
        module.start = Some(crate::types::FuncIdx::new(0));
        let bytes = encode_module_in(&module, Global).unwrap();
        // envelope, then section 8 with length 1 and funcidx 0.
        assert_eq!(&bytes.as_slice()[8..], &[0x08, 0x01, 0x00]);
    }
}
