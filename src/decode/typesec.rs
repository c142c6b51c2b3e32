// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Type section decoding.
//!
//! The section is decoded in two passes so that pre-GC modules keep their
//! original shape: a scan pass reads every definition in its rich form and
//! notes whether the whole section uses the `0x60` shorthand; if it does,
//! the decoder rewinds and commits only the flat function signatures.
//! Otherwise the rich definitions are kept and their function members are
//! mirrored into the flat sequence in encounter order.

use crate::Allocator;
use crate::compat::Vec;
use crate::storage::Stream;
use crate::types::{CompType, FieldType, FuncType, Module, SubType, TypeDef, TypeIdx};

use super::{ContextStack, Decodable, Decoder, Error};

// Type-section form bytes.
const FORM_FUNC: u8 = 0x60;
const FORM_STRUCT: u8 = 0x5f;
const FORM_ARRAY: u8 = 0x5e;
const FORM_REC: u8 = 0x4e;
const FORM_SUB: u8 = 0x50;
const FORM_SUB_FINAL: u8 = 0x4f;

pub(super) fn decode_type_section<Storage, A>(
    decoder: &mut Decoder<Storage>,
    context: &mut ContextStack,
    alloc: &A,
    module: &mut Module<A>,
) -> Result<(), Error<Storage>>
where
    Storage: Stream,
    A: Allocator + Clone,
{
    let count: u32 = decoder.read_bounded(context)?;
    let start = decoder.offset();

    // Scan pass: read every definition in its rich form.
    let mut defs = Vec::new_in(alloc.clone());
    defs.try_reserve_exact(count as usize)?;
    let mut simple = true;
    for _ in 0..count {
        let def: TypeDef<A> = decoder.read(context, alloc)?;
        simple &= matches!(def, TypeDef::Func(_));
        defs.push(def);
    }

    if simple {
        // Commit pass: rewind and populate only the flat signatures
        // through the shorthand path.
        decoder.reset(start)?;
        let mut types = Vec::new_in(alloc.clone());
        types.try_reserve_exact(count as usize)?;
        for _ in 0..count {
            let form = decoder.read_byte_raw()?;
            if form != FORM_FUNC {
                return Err(Error::InvalidTypeForm(form));
            }
            types.push(decoder.read(context, alloc)?);
        }
        module.types = types;
    } else {
        module.types = mirror_func_types(&defs, alloc)?;
        module.type_defs = defs;
    }
    Ok(())
}

// Project the function types out of the rich definitions, in encounter
// order. Non-function subtypes are not mirrored.
fn mirror_func_types<Storage: Stream, A: Allocator + Clone>(
    defs: &Vec<TypeDef<A>, A>,
    alloc: &A,
) -> Result<Vec<FuncType<A>, A>, Error<Storage>> {
    let mut types = Vec::new_in(alloc.clone());
    let push = |types: &mut Vec<FuncType<A>, A>, func: &FuncType<A>| {
        types.try_reserve(1)?;
        types.push(func.clone());
        Ok::<(), Error<Storage>>(())
    };
    for def in defs {
        match def {
            TypeDef::Func(func) => push(&mut types, func)?,
            TypeDef::Sub(sub) => {
                if let CompType::Func(func) = &sub.comp {
                    push(&mut types, func)?;
                }
            }
            TypeDef::Rec(subs) => {
                for sub in subs {
                    if let CompType::Func(func) = &sub.comp {
                        push(&mut types, func)?;
                    }
                }
            }
        }
    }
    Ok(types)
}

impl<A: Allocator + Clone> Decodable<A> for TypeDef<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let form = decoder.read_byte_raw()?;
        match form {
            FORM_FUNC => Ok(Self::Func(decoder.read(context, alloc)?)),
            FORM_STRUCT | FORM_ARRAY => Ok(Self::Sub(SubType {
                is_final: true,
                supertypes: Vec::new_in(alloc.clone()),
                comp: decode_comp_body(form, decoder, context, alloc)?,
            })),
            FORM_REC => Ok(Self::Rec(decoder.read(context, alloc)?)),
            FORM_SUB | FORM_SUB_FINAL => Ok(Self::Sub(decode_subtype_body(
                form == FORM_SUB_FINAL,
                decoder,
                context,
                alloc,
            )?)),
            _ => Err(Error::InvalidTypeForm(form)),
        }
    }
}

// A subtype entry inside a rec group: `sub`/`sub final`, or a bare
// composite form standing for a final subtype with no supertypes.
impl<A: Allocator + Clone> Decodable<A> for SubType<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let form = decoder.read_byte_raw()?;
        match form {
            FORM_SUB | FORM_SUB_FINAL => {
                decode_subtype_body(form == FORM_SUB_FINAL, decoder, context, alloc)
            }
            FORM_FUNC | FORM_STRUCT | FORM_ARRAY => Ok(Self {
                is_final: true,
                supertypes: Vec::new_in(alloc.clone()),
                comp: decode_comp_body(form, decoder, context, alloc)?,
            }),
            _ => Err(Error::InvalidTypeForm(form)),
        }
    }
}

fn decode_subtype_body<Storage: Stream, A: Allocator + Clone>(
    is_final: bool,
    decoder: &mut Decoder<Storage>,
    context: &mut ContextStack,
    alloc: &A,
) -> Result<SubType<A>, Error<Storage>> {
    let mut count: u32 = decoder.read_bounded(context)?;
    let mut supertypes = Vec::new_in(alloc.clone());
    supertypes.try_reserve_exact(count as usize)?;
    while count > 0 {
        supertypes.push(decoder.read_bounded::<TypeIdx>(context)?);
        count -= 1;
    }

    let form = decoder.read_byte_raw()?;
    let comp = match form {
        FORM_FUNC | FORM_STRUCT | FORM_ARRAY => decode_comp_body(form, decoder, context, alloc)?,
        _ => return Err(Error::InvalidCompositeType(form)),
    };
    Ok(SubType {
        is_final,
        supertypes,
        comp,
    })
}

// Decodes the composite payload after its form byte has been consumed.
fn decode_comp_body<Storage: Stream, A: Allocator + Clone>(
    form: u8,
    decoder: &mut Decoder<Storage>,
    context: &mut ContextStack,
    alloc: &A,
) -> Result<CompType<A>, Error<Storage>> {
    match form {
        FORM_FUNC => Ok(CompType::Func(decoder.read(context, alloc)?)),
        FORM_STRUCT => Ok(CompType::Struct(decoder.read(context, alloc)?)),
        FORM_ARRAY => Ok(CompType::Array(decoder.read_bounded::<FieldType>(context)?)),
        _ => Err(Error::InvalidCompositeType(form)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::Global;
    use crate::storage::Buffer;
    use crate::types::{AbsHeapType, HeapType, Mutability, RefType, StorageType, ValType};

    fn decode_section(bytes: &[u8]) -> Module<Global> {
        let mut decoder = Decoder::new(Buffer::new(bytes));
        let mut context = ContextStack::default();
        let mut module = Module::empty_in(Global);
        decode_type_section(&mut decoder, &mut context, &Global, &mut module).unwrap();
        module
    }

    #[test]
    fn simple_section_stays_flat() {
        // Two shorthand function types: (i32) -> i32 and () -> ().
        let module = decode_section(&[
            0x02, //
            0x60, 0x01, 0x7f, 0x01, 0x7f, //
            0x60, 0x00, 0x00,
        ]);
        assert!(module.type_defs.is_empty());
        assert_eq!(module.types.len(), 2);
        assert_eq!(module.types[0].parameters.len(), 1);
        assert_eq!(module.types[0].results.len(), 1);
        assert!(module.types[1].parameters.is_empty());
    }

    #[test]
    fn rec_group_populates_rich_defs() {
        // rec { struct { field i32 mut }, func () -> (ref any) }
        let module = decode_section(&[
            0x01, //
            0x4e, 0x02, //
            0x5f, 0x01, 0x7f, 0x01, //
            0x60, 0x00, 0x01, 0x64, 0x6e,
        ]);
        assert_eq!(module.type_defs.len(), 1);
        let TypeDef::Rec(subs) = &module.type_defs[0] else {
            panic!("expected a rec group");
        };
        assert_eq!(subs.len(), 2);
        match &subs[0].comp {
            CompType::Struct(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].storage, StorageType::Val(ValType::I32));
                assert_eq!(fields[0].mutability, Mutability::Var);
            }
            _ => panic!("expected a struct"),
        }
        match &subs[1].comp {
            CompType::Func(func) => {
                assert_eq!(func.results.len(), 1);
                assert_eq!(
                    func.results[0],
                    ValType::Ref(RefType {
                        nullable: false,
                        heap: HeapType::Abstract(AbsHeapType::Any),
                    })
                );
            }
            _ => panic!("expected a function"),
        }

        // The function member is mirrored into the flat sequence; the
        // struct is not.
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.types[0].results.len(), 1);
    }

    #[test]
    fn subtype_with_supertypes() {
        // sub (parent 0) struct {}, preceded by a parent struct to keep the
        // section self-consistent.
        let module = decode_section(&[
            0x02, //
            0x5f, 0x00, //
            0x50, 0x01, 0x00, 0x5f, 0x00,
        ]);
        assert_eq!(module.type_defs.len(), 2);
        let TypeDef::Sub(sub) = &module.type_defs[1] else {
            panic!("expected a subtype");
        };
        assert!(!sub.is_final);
        assert_eq!(sub.supertypes.len(), 1);
        assert_eq!(*sub.supertypes[0], 0);
    }

    #[test]
    fn packed_array_type() {
        // array (mut i8)
        let module = decode_section(&[0x01, 0x5e, 0x78, 0x01]);
        let TypeDef::Sub(sub) = &module.type_defs[0] else {
            panic!("expected a subtype");
        };
        assert!(sub.is_final);
        match sub.comp {
            CompType::Array(field) => {
                assert_eq!(field.storage, StorageType::I8);
                assert_eq!(field.mutability, Mutability::Var);
            }
            _ => panic!("expected an array"),
        }
    }

    #[test]
    fn bad_form_byte() {
        let mut decoder = Decoder::new(Buffer::new([0x01u8, 0x61, 0x00]));
        let mut context = ContextStack::default();
        let mut module = Module::empty_in(Global);
        assert!(matches!(
            decode_type_section(&mut decoder, &mut context, &Global, &mut module),
            Err(Error::InvalidTypeForm(0x61))
        ));
    }
}
