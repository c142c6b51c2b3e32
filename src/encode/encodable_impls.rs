// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Encodable trait implementations for WebAssembly types.

use crate::Allocator;
use crate::types::*;

use super::{Encodable, Encoder, Error};

// Type-section form bytes.
pub(super) const FORM_FUNC: u8 = 0x60;
pub(super) const FORM_STRUCT: u8 = 0x5f;
pub(super) const FORM_ARRAY: u8 = 0x5e;
pub(super) const FORM_REC: u8 = 0x4e;
pub(super) const FORM_SUB: u8 = 0x50;
pub(super) const FORM_SUB_FINAL: u8 = 0x4f;

macro_rules! impl_encodable_for_idx {
    ($type:ty) => {
        impl<A: Allocator + Clone> Encodable<A> for $type {
            fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
                encoder.write_u32_leb(**self)
            }
        }
    };
}

impl_encodable_for_idx!(DataIdx);
impl_encodable_for_idx!(ElemIdx);
impl_encodable_for_idx!(FuncIdx);
impl_encodable_for_idx!(GlobalIdx);
impl_encodable_for_idx!(LabelIdx);
impl_encodable_for_idx!(LocalIdx);
impl_encodable_for_idx!(MemIdx);
impl_encodable_for_idx!(TableIdx);
impl_encodable_for_idx!(TagIdx);
impl_encodable_for_idx!(TypeIdx);

impl<A: Allocator + Clone> Encodable<A> for HeapType {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_s33_leb(self.to_s33())
    }
}

impl<A: Allocator + Clone> Encodable<A> for RefType {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        // Nullable references to abstract heap types take the one-byte
        // shorthand; everything else uses the 0x63/0x64 long form.
        if self.is_shorthand() {
            let HeapType::Abstract(abs) = self.heap else {
                unreachable!();
            };
            encoder.write_byte(abs as u8)
        } else {
            encoder.write_byte(if self.nullable { 0x63 } else { 0x64 })?;
            encoder.write(&self.heap)
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for ValType {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        match self {
            Self::I32 => encoder.write_byte(0x7f),
            Self::I64 => encoder.write_byte(0x7e),
            Self::F32 => encoder.write_byte(0x7d),
            Self::F64 => encoder.write_byte(0x7c),
            Self::V128 => encoder.write_byte(0x7b),
            Self::Ref(reftype) => encoder.write(reftype),
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for StorageType {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        match self {
            Self::I8 => encoder.write_byte(0x78),
            Self::I16 => encoder.write_byte(0x77),
            Self::Val(valtype) => encoder.write(valtype),
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for FieldType {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write(&self.storage)?;
        encoder.write_byte(self.mutability as u8)
    }
}

impl<A: Allocator + Clone> Encodable<A> for FuncType<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_vec(&self.parameters)?;
        encoder.write_vec(&self.results)
    }
}

fn encode_comp<A: Allocator + Clone>(
    comp: &CompType<A>,
    encoder: &mut Encoder<A>,
) -> Result<(), Error> {
    match comp {
        CompType::Func(func) => {
            encoder.write_byte(FORM_FUNC)?;
            encoder.write(func)
        }
        CompType::Struct(fields) => {
            encoder.write_byte(FORM_STRUCT)?;
            encoder.write_vec(fields)
        }
        CompType::Array(field) => {
            encoder.write_byte(FORM_ARRAY)?;
            encoder.write(field)
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for SubType<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        // A final subtype with no supertypes shortens to its bare
        // composite form.
        if self.is_final && self.supertypes.is_empty() {
            return encode_comp(&self.comp, encoder);
        }
        encoder.write_byte(if self.is_final {
            FORM_SUB_FINAL
        } else {
            FORM_SUB
        })?;
        encoder.write_vec(&self.supertypes)?;
        encode_comp(&self.comp, encoder)
    }
}

impl<A: Allocator + Clone> Encodable<A> for TypeDef<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        match self {
            Self::Func(func) => {
                encoder.write_byte(FORM_FUNC)?;
                encoder.write(func)
            }
            Self::Sub(sub) => encoder.write(sub),
            Self::Rec(subs) => {
                encoder.write_byte(FORM_REC)?;
                encoder.write_vec(subs)
            }
        }
    }
}

// Limits flag bits.
const LIMITS_HAS_MAX: u8 = 0x01;
const LIMITS_SHARED: u8 = 0x02;
const LIMITS_MEMORY64: u8 = 0x04;

impl<A: Allocator + Clone> Encodable<A> for Limits {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        let mut flags = 0u8;
        if self.max.is_some() {
            flags |= LIMITS_HAS_MAX;
        }
        if self.shared {
            flags |= LIMITS_SHARED;
        }
        if self.memory64 {
            flags |= LIMITS_MEMORY64;
        }
        encoder.write_byte(flags)?;
        encoder.write_u64_leb(self.min)?;
        if let Some(max) = self.max {
            encoder.write_u64_leb(max)?;
        }
        Ok(())
    }
}

impl<A: Allocator + Clone> Encodable<A> for MemType {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write(&**self)
    }
}

impl<A: Allocator + Clone> Encodable<A> for TableType {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write(&self.reftype)?;
        encoder.write(&self.limits)
    }
}

impl<A: Allocator + Clone> Encodable<A> for Table<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        // The extended form exists only to carry an element initializer.
        if let Some(init) = &self.init {
            encoder.write_byte(0x40)?;
            encoder.write_byte(0x00)?;
            encoder.write(&self.ty)?;
            encoder.write(init)
        } else {
            encoder.write(&self.ty)
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for GlobalType {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write(&self.value)?;
        encoder.write_byte(self.mutability as u8)
    }
}

impl<A: Allocator + Clone> Encodable<A> for Global<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write(&self.ty)?;
        encoder.write(&self.init)
    }
}

impl<A: Allocator + Clone> Encodable<A> for TagType {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_byte(self.attribute as u8)?;
        encoder.write(&self.ty)
    }
}

impl<A: Allocator + Clone> Encodable<A> for Import<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_name(self.module.as_str())?;
        encoder.write_name(self.field.as_str())?;
        encoder.write_byte(self.descriptor.kind())?;
        match &self.descriptor {
            ImportDescriptor::Function(ty) => encoder.write(ty),
            ImportDescriptor::Table(table) => encoder.write(table),
            ImportDescriptor::Memory(memory) => encoder.write(memory),
            ImportDescriptor::Global(global) => encoder.write(global),
            ImportDescriptor::Tag(tag) => encoder.write(tag),
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for Export<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_name(self.field.as_str())?;
        encoder.write_byte(self.descriptor.kind())?;
        match &self.descriptor {
            ExportDescriptor::Function(idx) => encoder.write(idx),
            ExportDescriptor::Table(idx) => encoder.write(idx),
            ExportDescriptor::Memory(idx) => encoder.write(idx),
            ExportDescriptor::Global(idx) => encoder.write(idx),
            ExportDescriptor::Tag(idx) => encoder.write(idx),
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for Expression<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_bytes(self.bytes())
    }
}

impl<A: Allocator + Clone> Encodable<A> for ElementSegment<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        let flags = self.flags;
        let inconsistent = || Error::InconsistentElementSegment { flags };
        if flags > 7 {
            return Err(inconsistent());
        }
        encoder.write_u32_leb(flags)?;
        if flags & 0b011 == 0b010 {
            let table = self.table.ok_or_else(inconsistent)?;
            encoder.write(&table)?;
        }
        if flags & 0b001 == 0 {
            let offset = self.offset.as_ref().ok_or_else(inconsistent)?;
            encoder.write(offset)?;
        }
        if flags & 0b011 != 0 {
            if flags & 0b100 != 0 {
                let reftype = self.reftype.ok_or_else(inconsistent)?;
                encoder.write(&reftype)?;
            } else {
                let elemkind = self.elemkind.ok_or_else(inconsistent)?;
                encoder.write_byte(elemkind as u8)?;
            }
        }
        match (&self.init, flags & 0b100 != 0) {
            (ElementInit::Functions(funcs), false) => encoder.write_vec(funcs),
            (ElementInit::Expressions(exprs), true) => encoder.write_vec(exprs),
            _ => Err(inconsistent()),
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for DataSegment<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        let flags = self.flags;
        let inconsistent = || Error::InconsistentDataSegment { flags };
        if flags > 2 {
            return Err(inconsistent());
        }
        encoder.write_u32_leb(flags)?;
        if flags == 2 {
            let memory = self.memory.ok_or_else(inconsistent)?;
            encoder.write(&memory)?;
        }
        if flags != 1 {
            let offset = self.offset.as_ref().ok_or_else(inconsistent)?;
            encoder.write(offset)?;
        }
        encoder.write_u32_leb(self.init.len() as u32)?;
        encoder.write_bytes(&self.init)
    }
}

impl<A: Allocator + Clone> Encodable<A> for LocalEntry {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_u32_leb(self.count)?;
        encoder.write(&self.ty)
    }
}

impl<A: Allocator + Clone> Encodable<A> for FuncBody<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.sized(|e| {
            e.write_vec(&self.locals)?;
            e.write_bytes(self.code.bytes())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::{Global, Vec};

    fn encode_one<T: Encodable<Global>>(value: &T) -> Vec<u8, Global> {
        let mut encoder = Encoder::new(Global);
        encoder.write(value).unwrap();
        encoder.into_bytes()
    }

    #[test]
    fn reftype_shorthand_selection() {
        assert_eq!(encode_one(&RefType::FUNCREF).as_slice(), &[0x70]);
        assert_eq!(
            encode_one(&RefType::nullable(AbsHeapType::Any)).as_slice(),
            &[0x6e]
        );
        // Non-null abstract reference needs the long form.
        assert_eq!(
            encode_one(&RefType {
                nullable: false,
                heap: HeapType::Abstract(AbsHeapType::Struct),
            })
            .as_slice(),
            &[0x64, 0x6b]
        );
        // Concrete type index.
        assert_eq!(
            encode_one(&RefType {
                nullable: true,
                heap: HeapType::Index(TypeIdx::new(3)),
            })
            .as_slice(),
            &[0x63, 0x03]
        );
    }

    #[test]
    fn limits_variants() {
        assert_eq!(encode_one(&Limits::plain(1, None)).as_slice(), &[0x00, 0x01]);
        assert_eq!(
            encode_one(&Limits::plain(1, Some(16))).as_slice(),
            &[0x01, 0x01, 0x10]
        );
        assert_eq!(
            encode_one(&Limits {
                min: 0,
                max: Some(2),
                shared: true,
                memory64: false,
            })
            .as_slice(),
            &[0x03, 0x00, 0x02]
        );
    }

    #[test]
    fn final_parentless_subtype_uses_shorthand() {
        let mut fields = Vec::new_in(Global);
        fields.push(FieldType {
            storage: StorageType::Val(ValType::I32),
            mutability: Mutability::Const,
        });
        let shorthand = SubType {
            is_final: true,
            supertypes: Vec::new_in(Global),
            comp: CompType::Struct(fields),
        };
        assert_eq!(
            encode_one(&shorthand).as_slice(),
            &[0x5f, 0x01, 0x7f, 0x00]
        );

        let with_parent = SubType {
            is_final: false,
            supertypes: {
                let mut parents = Vec::new_in(Global);
                parents.push(TypeIdx::new(0));
                parents
            },
            comp: CompType::Array(FieldType {
                storage: StorageType::I16,
                mutability: Mutability::Var,
            }),
        };
        assert_eq!(
            encode_one(&with_parent).as_slice(),
            &[0x50, 0x01, 0x00, 0x5e, 0x77, 0x01]
        );
    }

    #[test]
    fn element_segment_consistency_is_enforced() {
        let segment: ElementSegment<Global> = ElementSegment {
            flags: 2,
            table: None, // missing despite flags=2
            offset: None,
            elemkind: None,
            reftype: None,
            init: ElementInit::Functions(Vec::new_in(Global)),
        };
        assert!(matches!(
            encode_one_fallible(&segment),
            Err(Error::InconsistentElementSegment { flags: 2 })
        ));
    }

    fn encode_one_fallible<T: Encodable<Global>>(
        value: &T,
    ) -> Result<Vec<u8, Global>, Error> {
        let mut encoder = Encoder::new(Global);
        encoder.write(value)?;
        Ok(encoder.into_bytes())
    }
}
