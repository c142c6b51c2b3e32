// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Decodable trait implementations for WebAssembly types.

use core::ops;

use num_enum::TryFromPrimitive;

use crate::Allocator;
use crate::compat::{Box, Vec};
use crate::storage::Stream;
use crate::types::*;

use super::{
    BoundedDecodable, ContextId, ContextStack, Contextual, Decodable, Decoder, Error, Magic,
    S33, shuttle_expression,
};

macro_rules! impl_contextual {
    ($type:ident<A: Allocator>, $id:path) => {
        impl<A: Allocator> Contextual for $type<A> {
            const ID: ContextId = $id;
        }
    };
    (Vec<$type:ty, A>, $id:path) => {
        impl<A: Allocator> Contextual for Vec<$type, A> {
            const ID: ContextId = $id;
        }
    };
    ($type:ty, $id:path) => {
        impl Contextual for $type {
            const ID: ContextId = $id;
        }
    };
}
pub(super) use impl_contextual;

macro_rules! impl_decodable_for_u8_enum {
    ($type:ty) => {
        impl BoundedDecodable for $type {
            fn decode<Storage: Stream>(
                decoder: &mut Decoder<Storage>,
                _: &mut ContextStack,
            ) -> Result<Self, Error<Storage>> {
                let byte = decoder.read_byte_raw()?;
                Self::try_from(byte).map_err(|_| Error::InvalidToken(byte))
            }
        }
    };
    ($type:ty, $make_err:path) => {
        impl BoundedDecodable for $type {
            fn decode<Storage: Stream>(
                decoder: &mut Decoder<Storage>,
                _: &mut ContextStack,
            ) -> Result<Self, Error<Storage>> {
                let byte = decoder.read_byte_raw()?;
                Self::try_from(byte).map_err(|_| $make_err(byte))
            }
        }
    };
}

macro_rules! impl_decodable_for_leb128_u32_enum {
    ($type:ty, $make_err:path) => {
        impl BoundedDecodable for $type {
            fn decode<Storage: Stream>(
                decoder: &mut Decoder<Storage>,
                _: &mut ContextStack,
            ) -> Result<Self, Error<Storage>> {
                let val: u32 = decoder.read_leb128_raw()?;
                Self::try_from(val).map_err(|_| $make_err(val))
            }
        }
    };
}
pub(super) use impl_decodable_for_leb128_u32_enum;

macro_rules! impl_decodable_for_le_u32_enum {
    ($type:ty, $make_err:path) => {
        impl BoundedDecodable for $type {
            fn decode<Storage: Stream>(
                decoder: &mut Decoder<Storage>,
                _: &mut ContextStack,
            ) -> Result<Self, Error<Storage>> {
                let mut buf = [0u8; 4];
                decoder.read_exact_raw(&mut buf)?;
                let val = u32::from_le_bytes(buf);
                Self::try_from(val).map_err(|_| $make_err(val))
            }
        }
    };
}

macro_rules! impl_decodable_for_newtype {
    ($type:ident) => {
        impl BoundedDecodable for $type {
            fn decode<Storage: Stream>(
                decoder: &mut Decoder<Storage>,
                context: &mut ContextStack,
            ) -> Result<Self, Error<Storage>> {
                Ok(Self::new(
                    <<Self as ops::Deref>::Target as BoundedDecodable>::decode(decoder, context)?,
                ))
            }
        }
    };
}

impl<T, A> Decodable<A> for Vec<T, A>
where
    T: Decodable<A> + Contextual,
    A: Allocator + Clone,
{
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let mut len: u32 = decoder.read_bounded(context)?;
        let mut vec = Vec::new_in(alloc.clone());
        vec.try_reserve_exact(len as usize)?;
        while len > 0 {
            vec.push(decoder.read(context, alloc)?);
            len -= 1;
        }
        Ok(vec)
    }
}

impl_contextual!(u8, ContextId::Byte);
impl_contextual!(u32, ContextId::U32);
impl_contextual!(i32, ContextId::I32);
impl_contextual!(i64, ContextId::I64);
impl_contextual!(f32, ContextId::F32);
impl_contextual!(f64, ContextId::F64);
impl_contextual!(BlockType, ContextId::BlockType);
impl_contextual!(DataIdx, ContextId::DataIdx);
impl_contextual!(DataSegment<A: Allocator>, ContextId::Data);
impl_contextual!(ElemIdx, ContextId::ElemIdx);
impl_contextual!(ElemKind, ContextId::ElemKind);
impl_contextual!(ElementSegment<A: Allocator>, ContextId::Elem);
impl_contextual!(Export<A: Allocator>, ContextId::Export);
impl_contextual!(Expression<A: Allocator>, ContextId::Expr);
impl_contextual!(FieldType, ContextId::FieldType);
impl_contextual!(FuncBody<A: Allocator>, ContextId::Body);
impl_contextual!(FuncIdx, ContextId::FuncIdx);
impl_contextual!(FuncType<A: Allocator>, ContextId::FuncType);
impl_contextual!(Global<A: Allocator>, ContextId::Global);
impl_contextual!(GlobalIdx, ContextId::GlobalIdx);
impl_contextual!(GlobalType, ContextId::GlobalType);
impl_contextual!(HeapType, ContextId::HeapType);
impl_contextual!(Import<A: Allocator>, ContextId::Import);
impl_contextual!(LabelIdx, ContextId::LabelIdx);
impl_contextual!(Limits, ContextId::Limits);
impl_contextual!(LocalEntry, ContextId::LocalEntry);
impl_contextual!(LocalIdx, ContextId::LocalIdx);
impl_contextual!(Magic, ContextId::Magic);
impl_contextual!(MemArg, ContextId::MemArg);
impl_contextual!(MemIdx, ContextId::MemIdx);
impl_contextual!(MemType, ContextId::MemType);
impl_contextual!(Mutability, ContextId::Mut);
impl_contextual!(Name<A: Allocator>, ContextId::Name);
impl_contextual!(RefType, ContextId::RefType);
impl_contextual!(SectionId, ContextId::SectionId);
impl_contextual!(StorageType, ContextId::StorageType);
impl_contextual!(SubType<A: Allocator>, ContextId::SubType);
impl_contextual!(Table<A: Allocator>, ContextId::Table);
impl_contextual!(TableIdx, ContextId::TableIdx);
impl_contextual!(TableType, ContextId::TableType);
impl_contextual!(TagIdx, ContextId::TagIdx);
impl_contextual!(TagType, ContextId::Tag);
impl_contextual!(TypeDef<A: Allocator>, ContextId::TypeDef);
impl_contextual!(TypeIdx, ContextId::TypeIdx);
impl_contextual!(ValType, ContextId::ValType);
impl_contextual!(Version, ContextId::Version);
impl_contextual!(Vec<u8, A>, ContextId::VecByte);
impl_contextual!(Vec<DataSegment<A>, A>, ContextId::DataSec);
impl_contextual!(Vec<ElementSegment<A>, A>, ContextId::ElemSec);
impl_contextual!(Vec<Export<A>, A>, ContextId::ExportSec);
impl_contextual!(Vec<Expression<A>, A>, ContextId::VecExpr);
impl_contextual!(Vec<FieldType, A>, ContextId::VecField);
impl_contextual!(Vec<FuncBody<A>, A>, ContextId::CodeSec);
impl_contextual!(Vec<FuncIdx, A>, ContextId::VecFuncIdx);
impl_contextual!(Vec<Global<A>, A>, ContextId::GlobalSec);
impl_contextual!(Vec<Import<A>, A>, ContextId::ImportSec);
impl_contextual!(Vec<LabelIdx, A>, ContextId::VecLabelIdx);
impl_contextual!(Vec<LocalEntry, A>, ContextId::Locals);
impl_contextual!(Vec<MemType, A>, ContextId::MemorySec);
impl_contextual!(Vec<SubType<A>, A>, ContextId::RecType);
impl_contextual!(Vec<Table<A>, A>, ContextId::TableSec);
impl_contextual!(Vec<TagType, A>, ContextId::TagSec);
impl_contextual!(Vec<TypeIdx, A>, ContextId::FuncSec);
impl_contextual!(Vec<ValType, A>, ContextId::VecValType);

impl_decodable_for_u8_enum!(ElemKind);
impl_decodable_for_u8_enum!(Mutability);
impl_decodable_for_u8_enum!(TagAttribute);

impl_decodable_for_le_u32_enum!(Magic, Error::InvalidMagic);
impl_decodable_for_le_u32_enum!(Version, Error::UnknownVersion);

impl_decodable_for_newtype!(DataIdx);
impl_decodable_for_newtype!(ElemIdx);
impl_decodable_for_newtype!(FuncIdx);
impl_decodable_for_newtype!(GlobalIdx);
impl_decodable_for_newtype!(LabelIdx);
impl_decodable_for_newtype!(LocalIdx);
impl_decodable_for_newtype!(MemIdx);
impl_decodable_for_newtype!(MemType);
impl_decodable_for_newtype!(TableIdx);
impl_decodable_for_newtype!(TagIdx);
impl_decodable_for_newtype!(TypeIdx);

impl BoundedDecodable for u8 {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        decoder.read_byte_raw()
    }
}

impl BoundedDecodable for u32 {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        decoder.read_leb128_raw()
    }
}

impl BoundedDecodable for i32 {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        decoder.read_leb128_raw()
    }
}

impl BoundedDecodable for i64 {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        decoder.read_leb128_raw()
    }
}

impl BoundedDecodable for f32 {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let mut buf = [0u8; 4];
        decoder.read_exact_raw(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }
}

impl BoundedDecodable for f64 {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let mut buf = [0u8; 8];
        decoder.read_exact_raw(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }
}

// A section ID byte outside the known range is its own kind of framing
// error rather than a generic bad token.
impl BoundedDecodable for SectionId {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let byte = decoder.read_byte_raw()?;
        Self::try_from(byte).map_err(|_| Error::UnknownSection(byte))
    }
}

impl BoundedDecodable for HeapType {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let value = decoder.read_leb128_raw::<S33>()?.value();
        Self::from_s33(value).ok_or(Error::InvalidHeapType(value))
    }
}

// Finishes decoding a value type whose first byte has already been
// consumed. The typed-reference prefixes 0x63/0x64 read a trailing heap
// type.
pub(super) fn valtype_from_byte<Storage: Stream>(
    byte: u8,
    decoder: &mut Decoder<Storage>,
    context: &mut ContextStack,
) -> Result<ValType, Error<Storage>> {
    match byte {
        0x7f => Ok(ValType::I32),
        0x7e => Ok(ValType::I64),
        0x7d => Ok(ValType::F32),
        0x7c => Ok(ValType::F64),
        0x7b => Ok(ValType::V128),
        0x63 | 0x64 => {
            let heap = decoder.read_bounded(context)?;
            Ok(ValType::Ref(RefType {
                nullable: byte == 0x63,
                heap,
            }))
        }
        _ => match AbsHeapType::try_from(byte) {
            Ok(abs) => Ok(ValType::Ref(RefType::nullable(abs))),
            Err(_) => Err(Error::InvalidValType(byte)),
        },
    }
}

// Finishes decoding a reference type whose first byte has already been
// consumed.
pub(super) fn reftype_from_byte<Storage: Stream>(
    byte: u8,
    decoder: &mut Decoder<Storage>,
    context: &mut ContextStack,
) -> Result<RefType, Error<Storage>> {
    match valtype_from_byte(byte, decoder, context)? {
        ValType::Ref(reftype) => Ok(reftype),
        _ => Err(Error::InvalidValType(byte)),
    }
}

impl BoundedDecodable for ValType {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let byte = decoder.read_byte_raw()?;
        valtype_from_byte(byte, decoder, context)
    }
}

impl BoundedDecodable for RefType {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let byte = decoder.read_byte_raw()?;
        reftype_from_byte(byte, decoder, context)
    }
}

impl BoundedDecodable for StorageType {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let byte = decoder.read_byte_raw()?;
        match byte {
            0x78 => Ok(Self::I8),
            0x77 => Ok(Self::I16),
            _ => Ok(Self::Val(valtype_from_byte(byte, decoder, context)?)),
        }
    }
}

impl BoundedDecodable for FieldType {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            storage: decoder.read_bounded(context)?,
            mutability: decoder.read_bounded(context)?,
        })
    }
}

impl BoundedDecodable for BlockType {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let value = decoder.read_leb128_raw::<S33>()?.value();
        if value >= 0 {
            return Ok(Self::TypeIndex(value as u32));
        }
        // Negative block types are a single built-in byte, re-interpreted
        // through the signed encoding.
        let byte = u8::try_from(value + 0x80).map_err(|_| Error::InvalidHeapType(value))?;
        if byte == 0x40 {
            Ok(Self::Empty)
        } else {
            Ok(Self::Result(valtype_from_byte(byte, decoder, context)?))
        }
    }
}

// Limits flag bits.
const LIMITS_HAS_MAX: u8 = 0x01;
const LIMITS_SHARED: u8 = 0x02;
const LIMITS_MEMORY64: u8 = 0x04;

impl BoundedDecodable for Limits {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let flags = decoder.read_byte_raw()?;
        if flags & !(LIMITS_HAS_MAX | LIMITS_SHARED | LIMITS_MEMORY64) != 0 {
            return Err(Error::InvalidLimitsFlags(flags));
        }
        let memory64 = flags & LIMITS_MEMORY64 != 0;
        let read_size = |decoder: &mut Decoder<Storage>| -> Result<u64, Error<Storage>> {
            if memory64 {
                decoder.read_leb128_raw::<u64>()
            } else {
                decoder.read_leb128_raw::<u32>().map(u64::from)
            }
        };
        let min = read_size(decoder)?;
        let max = if flags & LIMITS_HAS_MAX != 0 {
            Some(read_size(decoder)?)
        } else {
            None
        };
        Ok(Self {
            min,
            max,
            shared: flags & LIMITS_SHARED != 0,
            memory64,
        })
    }
}

impl BoundedDecodable for TableType {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            reftype: decoder.read_bounded(context)?,
            limits: decoder.read_bounded(context)?,
        })
    }
}

impl BoundedDecodable for GlobalType {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            value: decoder.read_bounded(context)?,
            mutability: decoder.read_bounded(context)?,
        })
    }
}

impl BoundedDecodable for TagType {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            attribute: decoder.read_bounded(context)?,
            ty: decoder.read_bounded(context)?,
        })
    }
}

impl Contextual for TagAttribute {
    const ID: ContextId = ContextId::Byte;
}

impl BoundedDecodable for LocalEntry {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            count: decoder.read_bounded(context)?,
            ty: decoder.read_bounded(context)?,
        })
    }
}

impl BoundedDecodable for MemArg {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        // Bit 6 of the align exponent signals a multi-memory access: a
        // memory index follows before the offset.
        let align: u32 = decoder.read_leb128_raw()?;
        let memory = if align & 0x40 != 0 {
            MemIdx::new(decoder.read_leb128_raw()?)
        } else {
            MemIdx::new(0)
        };
        let offset: u64 = decoder.read_leb128_raw()?;
        Ok(Self {
            align: align & !0x40,
            offset,
            memory,
        })
    }
}

impl<A: Allocator + Clone> Decodable<A> for Name<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let len: u32 = decoder.read_bounded(context)?;
        let bytes = decoder.read_bytes(context, len as usize, alloc)?;
        str::from_utf8(&bytes).map_err(|_| Error::InvalidUtf8)?;
        let bytes_ptr = Box::into_raw(bytes);

        // Safety: The ABIs of [u8] and str are identical, and we have
        // already validated that the byte sequence is valid UTF-8.
        let str = unsafe { Box::from_raw_in(bytes_ptr as *mut str, alloc.clone()) };
        Ok(Self::new(str))
    }
}

impl<A: Allocator + Clone> Decodable<A> for Expression<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        shuttle_expression(decoder, context, alloc)
    }
}

impl<A: Allocator + Clone> Decodable<A> for FuncType<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            parameters: decoder.read(context, alloc)?,
            results: decoder.read(context, alloc)?,
        })
    }
}

#[derive(Copy, Clone, TryFromPrimitive)]
#[repr(u8)]
enum ImportKind {
    Function = 0x00,
    Table = 0x01,
    Memory = 0x02,
    Global = 0x03,
    Tag = 0x04,
}

impl Contextual for ImportKind {
    const ID: ContextId = ContextId::Byte;
}

impl_decodable_for_u8_enum!(ImportKind, Error::InvalidImportKind);

impl<A: Allocator + Clone> Decodable<A> for Import<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let module = decoder.read(context, alloc)?;
        let field = decoder.read(context, alloc)?;
        let descriptor = match decoder.read_bounded(context)? {
            ImportKind::Function => ImportDescriptor::Function(decoder.read_bounded(context)?),
            ImportKind::Table => ImportDescriptor::Table(decoder.read_bounded(context)?),
            ImportKind::Memory => ImportDescriptor::Memory(decoder.read_bounded(context)?),
            ImportKind::Global => ImportDescriptor::Global(decoder.read_bounded(context)?),
            ImportKind::Tag => ImportDescriptor::Tag(decoder.read_bounded(context)?),
        };
        Ok(Self {
            module,
            field,
            descriptor,
        })
    }
}

#[derive(Copy, Clone, TryFromPrimitive)]
#[repr(u8)]
enum ExportKind {
    Function = 0x00,
    Table = 0x01,
    Memory = 0x02,
    Global = 0x03,
    Tag = 0x04,
}

impl Contextual for ExportKind {
    const ID: ContextId = ContextId::Byte;
}

impl_decodable_for_u8_enum!(ExportKind, Error::InvalidExportKind);

impl<A: Allocator + Clone> Decodable<A> for Export<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let field = decoder.read(context, alloc)?;
        let descriptor = match decoder.read_bounded(context)? {
            ExportKind::Function => ExportDescriptor::Function(decoder.read_bounded(context)?),
            ExportKind::Table => ExportDescriptor::Table(decoder.read_bounded(context)?),
            ExportKind::Memory => ExportDescriptor::Memory(decoder.read_bounded(context)?),
            ExportKind::Global => ExportDescriptor::Global(decoder.read_bounded(context)?),
            ExportKind::Tag => ExportDescriptor::Tag(decoder.read_bounded(context)?),
        };
        Ok(Self { field, descriptor })
    }
}

impl<A: Allocator + Clone> Decodable<A> for Global<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            ty: decoder.read_bounded(context)?,
            init: decoder.read(context, alloc)?,
        })
    }
}

impl<A: Allocator + Clone> Decodable<A> for Table<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let first = decoder.read_byte_raw()?;
        if first == 0x40 {
            // Extended form: 0x40 0x00, table type, then an init expression
            // providing the initial value of every element.
            let second = decoder.read_byte_raw()?;
            if second != 0x00 {
                return Err(Error::InvalidTableInitPrefix(second));
            }
            let ty: TableType = decoder.read_bounded(context)?;
            let init = decoder.read(context, alloc)?;
            Ok(Self {
                ty,
                init: Some(init),
            })
        } else {
            let reftype = reftype_from_byte(first, decoder, context)?;
            let limits = decoder.read_bounded(context)?;
            Ok(Self {
                ty: TableType { reftype, limits },
                init: None,
            })
        }
    }
}

impl<A: Allocator + Clone> Decodable<A> for ElementSegment<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let flags: u32 = decoder.read_bounded(context)?;
        if flags > 7 {
            return Err(Error::InvalidElementFlags(flags));
        }

        // Bit 0 clear: active. Bit 1 (without bit 0): explicit table index.
        // Bit 2: expression payload with a reftype instead of an elemkind.
        let table = if flags & 0b011 == 0b010 {
            Some(decoder.read_bounded(context)?)
        } else {
            None
        };
        let offset = if flags & 0b001 == 0 {
            Some(decoder.read(context, alloc)?)
        } else {
            None
        };
        let (elemkind, reftype) = if flags & 0b011 == 0 {
            (None, None)
        } else if flags & 0b100 != 0 {
            (None, Some(decoder.read_bounded(context)?))
        } else {
            (Some(decoder.read_bounded(context)?), None)
        };
        let init = if flags & 0b100 != 0 {
            ElementInit::Expressions(decoder.read(context, alloc)?)
        } else {
            ElementInit::Functions(decoder.read(context, alloc)?)
        };
        Ok(Self {
            flags,
            table,
            offset,
            elemkind,
            reftype,
            init,
        })
    }
}

impl<A: Allocator + Clone> Decodable<A> for DataSegment<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let flags: u32 = decoder.read_bounded(context)?;
        if flags > 2 {
            return Err(Error::InvalidDataFlags(flags));
        }
        let memory = if flags == 2 {
            Some(decoder.read_bounded(context)?)
        } else {
            None
        };
        let offset = if flags == 1 {
            None
        } else {
            Some(decoder.read(context, alloc)?)
        };
        Ok(Self {
            flags,
            memory,
            offset,
            init: decoder.read(context, alloc)?,
        })
    }
}

impl<A: Allocator + Clone> Decodable<A> for FuncBody<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let size: u32 = decoder.read_bounded(context)?;
        let saved_limit = decoder.push_limit(size as usize)?;
        let locals = decoder.read(context, alloc)?;
        // The rest of the body is the raw code stream, preserved verbatim.
        let len = decoder.remaining();
        let code = decoder.read_bytes(context, len, alloc)?;
        decoder.pop_limit(saved_limit);
        if code.last() != Some(&0x0b) {
            return Err(Error::MissingEndOpcode);
        }
        Ok(Self {
            locals,
            code: Expression::new(code),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::Global;
    use crate::storage::Buffer;

    fn decode_one<T: Decodable<Global> + Contextual>(bytes: &[u8]) -> Result<T, ()> {
        let mut decoder = Decoder::new(Buffer::new(bytes));
        let mut context = ContextStack::default();
        decoder.read(&mut context, &Global).map_err(|_| ())
    }

    #[test]
    fn valtype_shorthands() {
        assert_eq!(decode_one::<ValType>(&[0x7f]), Ok(ValType::I32));
        assert_eq!(decode_one::<ValType>(&[0x7b]), Ok(ValType::V128));
        assert_eq!(decode_one::<ValType>(&[0x70]), Ok(ValType::FUNCREF));
        assert_eq!(
            decode_one::<ValType>(&[0x6e]),
            Ok(ValType::Ref(RefType::nullable(AbsHeapType::Any)))
        );
        assert!(decode_one::<ValType>(&[0x41]).is_err());
    }

    #[test]
    fn valtype_typed_refs() {
        // (ref null 5)
        assert_eq!(
            decode_one::<ValType>(&[0x63, 0x05]),
            Ok(ValType::Ref(RefType {
                nullable: true,
                heap: HeapType::Index(TypeIdx::new(5)),
            }))
        );
        // (ref struct): non-null abstract, long form.
        assert_eq!(
            decode_one::<ValType>(&[0x64, 0x6b]),
            Ok(ValType::Ref(RefType {
                nullable: false,
                heap: HeapType::Abstract(AbsHeapType::Struct),
            }))
        );
    }

    #[test]
    fn limits_flag_variants() {
        assert_eq!(
            decode_one::<Limits>(&[0x00, 0x01]),
            Ok(Limits::plain(1, None))
        );
        assert_eq!(
            decode_one::<Limits>(&[0x01, 0x01, 0x10]),
            Ok(Limits::plain(1, Some(16)))
        );
        assert_eq!(
            decode_one::<Limits>(&[0x03, 0x00, 0x02]),
            Ok(Limits {
                min: 0,
                max: Some(2),
                shared: true,
                memory64: false,
            })
        );
        assert_eq!(
            decode_one::<Limits>(&[0x05, 0x01, 0x01]),
            Ok(Limits {
                min: 1,
                max: Some(1),
                shared: false,
                memory64: true,
            })
        );
        assert!(decode_one::<Limits>(&[0x08, 0x00]).is_err());
    }

    #[test]
    fn memarg_with_memory_index() {
        let arg = decode_one::<MemArg>(&[0x42, 0x01, 0x08]).unwrap();
        assert_eq!(
            arg,
            MemArg {
                align: 2,
                offset: 8,
                memory: MemIdx::new(1),
            }
        );

        let plain = decode_one::<MemArg>(&[0x02, 0x08]).unwrap();
        assert_eq!(
            plain,
            MemArg {
                align: 2,
                offset: 8,
                memory: MemIdx::new(0),
            }
        );
    }

    #[test]
    fn element_segment_flag_zero() {
        // flags 0: offset expression `i32.const 0; end`, one func index.
        let segment =
            decode_one::<ElementSegment<Global>>(&[0x00, 0x41, 0x00, 0x0b, 0x01, 0x02]).unwrap();
        assert!(segment.is_active());
        assert_eq!(segment.table, None);
        assert_eq!(segment.offset.as_ref().unwrap().bytes(), &[0x41, 0x00, 0x0b]);
        match &segment.init {
            ElementInit::Functions(funcs) => {
                assert_eq!(funcs.len(), 1);
                assert_eq!(*funcs[0], 2);
            }
            ElementInit::Expressions(_) => panic!("expected function indices"),
        }
    }

    #[test]
    fn element_segment_flag_five() {
        // flags 5: passive, reftype funcref, one expression `ref.null func;
        // end`.
        let segment =
            decode_one::<ElementSegment<Global>>(&[0x05, 0x70, 0x01, 0xd0, 0x70, 0x0b]).unwrap();
        assert!(segment.is_passive());
        assert_eq!(segment.reftype, Some(RefType::FUNCREF));
        assert!(matches!(&segment.init, ElementInit::Expressions(exprs) if exprs.len() == 1));
    }

    #[test]
    fn element_segment_bad_flags() {
        assert!(decode_one::<ElementSegment<Global>>(&[0x08]).is_err());
    }

    #[test]
    fn data_segment_forms() {
        let active = decode_one::<DataSegment<Global>>(&[
            0x00, 0x41, 0x10, 0x0b, 0x03, 0xaa, 0xbb, 0xcc,
        ])
        .unwrap();
        assert!(active.is_active());
        assert_eq!(active.init.as_slice(), &[0xaa, 0xbb, 0xcc]);

        let passive = decode_one::<DataSegment<Global>>(&[0x01, 0x02, 0x01, 0x02]).unwrap();
        assert!(!passive.is_active());
        assert_eq!(passive.offset, None);

        let explicit =
            decode_one::<DataSegment<Global>>(&[0x02, 0x01, 0x41, 0x00, 0x0b, 0x00]).unwrap();
        assert_eq!(explicit.memory, Some(MemIdx::new(1)));
        assert!(decode_one::<DataSegment<Global>>(&[0x03]).is_err());
    }

    #[test]
    fn table_standard_and_extended() {
        let plain = decode_one::<Table<Global>>(&[0x70, 0x00, 0x01]).unwrap();
        assert_eq!(plain.ty.reftype, RefType::FUNCREF);
        assert!(plain.init.is_none());

        // 0x40 0x00 prefix, funcref, limits 1..=1, init `ref.null func; end`.
        let extended =
            decode_one::<Table<Global>>(&[0x40, 0x00, 0x70, 0x01, 0x01, 0x01, 0xd0, 0x70, 0x0b])
                .unwrap();
        assert!(extended.init.is_some());

        assert!(decode_one::<Table<Global>>(&[0x40, 0x01, 0x70, 0x00, 0x00]).is_err());
    }

    #[test]
    fn func_body_locals_and_code() {
        // size 7: two local groups (2 x i32, 1 x (ref null 0)), then
        // `end`.
        let body = decode_one::<FuncBody<Global>>(&[
            0x07, 0x02, 0x02, 0x7f, 0x01, 0x63, 0x00, 0x0b,
        ]);
        let body = body.unwrap();
        assert_eq!(body.locals.len(), 2);
        assert_eq!(body.locals[0].count, 2);
        assert_eq!(body.locals[0].ty, ValType::I32);
        assert_eq!(body.code.bytes(), &[0x0b]);
    }

    #[test]
    fn func_body_must_end_with_end() {
        assert!(decode_one::<FuncBody<Global>>(&[0x02, 0x00, 0x01]).is_err());
    }
}
