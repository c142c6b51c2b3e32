// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Single-instruction decoding, including the prefixed opcode families.

use crate::Allocator;
use crate::compat::Vec;
use crate::storage::Stream;
use crate::types::*;

use super::decodable_impls::{impl_contextual, impl_decodable_for_leb128_u32_enum};
use super::{
    BoundedDecodable, ContextId, ContextStack, Contextual, Decodable, Decoder, Error,
};

impl_contextual!(Opcode, ContextId::Opcode);
impl_contextual!(MiscOpcode, ContextId::MiscOpcode);
impl_contextual!(SimdOpcode, ContextId::SimdOpcode);
impl_contextual!(AtomicOpcode, ContextId::AtomicOpcode);
impl_contextual!(GcOpcode, ContextId::GcOpcode);
impl_contextual!(MiscOp, ContextId::MiscOpcode);
impl_contextual!(SimdOp, ContextId::SimdOpcode);
impl_contextual!(AtomicOp, ContextId::AtomicOpcode);
impl_contextual!(GcOp, ContextId::GcOpcode);
impl_contextual!(CatchClause, ContextId::CatchClause);
impl_contextual!(Vec<CatchClause, A>, ContextId::VecCatch);
impl_contextual!(BrTableOperands<A: Allocator>, ContextId::BrTableOperands);
impl_contextual!(CallIndirectOperands, ContextId::CallIndirectOperands);
impl_contextual!(SelectTOperands<A: Allocator>, ContextId::SelectTOperands);
impl_contextual!(TryTableOperands<A: Allocator>, ContextId::TryTableOperands);

impl<A: Allocator + Clone> Decodable<A> for BrTableOperands<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            labels: decoder.read(context, alloc)?,
            default: decoder.read_bounded(context)?,
        })
    }
}

impl BoundedDecodable for CallIndirectOperands {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            ty: decoder.read_bounded(context)?,
            table: decoder.read_bounded(context)?,
        })
    }
}

impl<A: Allocator + Clone> Decodable<A> for SelectTOperands<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            types: decoder.read(context, alloc)?,
        })
    }
}

impl<A: Allocator + Clone> Decodable<A> for TryTableOperands<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            ty: decoder.read_bounded(context)?,
            catches: decoder.read(context, alloc)?,
        })
    }
}

impl BoundedDecodable for Opcode {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let byte = decoder.read_byte_raw()?;
        Self::try_from(byte).map_err(|_| Error::InvalidToken(byte))
    }
}

impl_decodable_for_leb128_u32_enum!(MiscOpcode, Error::InvalidMiscOpcode);
impl_decodable_for_leb128_u32_enum!(SimdOpcode, Error::InvalidSimdOpcode);
impl_decodable_for_leb128_u32_enum!(AtomicOpcode, Error::InvalidAtomicOpcode);
impl_decodable_for_leb128_u32_enum!(GcOpcode, Error::InvalidGcOpcode);

impl Contextual for CatchKind {
    const ID: ContextId = ContextId::Byte;
}

impl Contextual for CastFlags {
    const ID: ContextId = ContextId::Byte;
}

impl BoundedDecodable for CatchKind {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let byte = decoder.read_byte_raw()?;
        Self::try_from(byte).map_err(|_| Error::InvalidToken(byte))
    }
}

impl BoundedDecodable for CastFlags {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let byte = decoder.read_byte_raw()?;
        Self::try_from(byte).map_err(|_| Error::InvalidToken(byte))
    }
}

impl BoundedDecodable for CatchClause {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let kind: CatchKind = decoder.read_bounded(context)?;
        let tag = match kind {
            CatchKind::Catch | CatchKind::CatchRef => Some(decoder.read_bounded(context)?),
            CatchKind::CatchAll | CatchKind::CatchAllRef => None,
        };
        Ok(Self {
            kind,
            tag,
            label: decoder.read_bounded(context)?,
        })
    }
}

impl BoundedDecodable for MiscOp {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let opcode: MiscOpcode = decoder.read_bounded(context)?;
        let operands = match opcode {
            MiscOpcode::MemoryInit => MiscOperands::MemoryInit {
                data: decoder.read_bounded(context)?,
                memory: decoder.read_bounded(context)?,
            },
            MiscOpcode::DataDrop => MiscOperands::DataDrop(decoder.read_bounded(context)?),
            MiscOpcode::MemoryCopy => MiscOperands::MemoryCopy {
                dst: decoder.read_bounded(context)?,
                src: decoder.read_bounded(context)?,
            },
            MiscOpcode::MemoryFill => MiscOperands::MemoryFill(decoder.read_bounded(context)?),
            MiscOpcode::TableInit => MiscOperands::TableInit {
                elem: decoder.read_bounded(context)?,
                table: decoder.read_bounded(context)?,
            },
            MiscOpcode::ElemDrop => MiscOperands::ElemDrop(decoder.read_bounded(context)?),
            MiscOpcode::TableCopy => MiscOperands::TableCopy {
                dst: decoder.read_bounded(context)?,
                src: decoder.read_bounded(context)?,
            },
            MiscOpcode::TableGrow | MiscOpcode::TableSize | MiscOpcode::TableFill => {
                MiscOperands::Table(decoder.read_bounded(context)?)
            }
            _ => MiscOperands::None,
        };
        Ok(Self { opcode, operands })
    }
}

impl BoundedDecodable for SimdOp {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let opcode: SimdOpcode = decoder.read_bounded(context)?;
        let operands = match opcode.operand_kind() {
            SimdOperandKind::None => SimdOperands::None,
            SimdOperandKind::MemArg => SimdOperands::MemArg(decoder.read_bounded(context)?),
            SimdOperandKind::MemArgLane => SimdOperands::MemArgLane {
                memarg: decoder.read_bounded(context)?,
                lane: decoder.read_byte_raw()?,
            },
            SimdOperandKind::Lane => SimdOperands::Lane(decoder.read_byte_raw()?),
            SimdOperandKind::Bytes => {
                let mut bytes = [0u8; 16];
                decoder.read_exact(context, &mut bytes)?;
                SimdOperands::Bytes(bytes)
            }
        };
        Ok(Self { opcode, operands })
    }
}

impl BoundedDecodable for AtomicOp {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let opcode: AtomicOpcode = decoder.read_bounded(context)?;
        let operands = if opcode == AtomicOpcode::AtomicFence {
            AtomicOperands::Fence(decoder.read_byte_raw()?)
        } else {
            AtomicOperands::MemArg(decoder.read_bounded(context)?)
        };
        Ok(Self { opcode, operands })
    }
}

impl BoundedDecodable for GcOp {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        use GcOpcode::*;

        let opcode: GcOpcode = decoder.read_bounded(context)?;
        let operands = match opcode {
            StructNew | StructNewDefault | ArrayNew | ArrayNewDefault | ArrayGet | ArrayGetS
            | ArrayGetU | ArraySet | ArrayFill => GcOperands::Type(decoder.read_bounded(context)?),
            StructGet | StructGetS | StructGetU | StructSet => GcOperands::StructField {
                ty: decoder.read_bounded(context)?,
                field: decoder.read_bounded(context)?,
            },
            ArrayNewFixed => GcOperands::ArrayFixed {
                ty: decoder.read_bounded(context)?,
                len: decoder.read_bounded(context)?,
            },
            ArrayNewData | ArrayInitData => GcOperands::ArrayData {
                ty: decoder.read_bounded(context)?,
                data: decoder.read_bounded(context)?,
            },
            ArrayNewElem | ArrayInitElem => GcOperands::ArrayElem {
                ty: decoder.read_bounded(context)?,
                elem: decoder.read_bounded(context)?,
            },
            ArrayCopy => GcOperands::ArrayCopy {
                dst: decoder.read_bounded(context)?,
                src: decoder.read_bounded(context)?,
            },
            RefTest | RefTestNull | RefCast | RefCastNull => {
                GcOperands::HeapType(decoder.read_bounded(context)?)
            }
            BrOnCast | BrOnCastFail => GcOperands::Cast {
                flags: decoder.read_bounded(context)?,
                label: decoder.read_bounded(context)?,
                from: decoder.read_bounded(context)?,
                to: decoder.read_bounded(context)?,
            },
            ArrayLen | AnyConvertExtern | ExternConvertAny | RefI31 | I31GetS | I31GetU => {
                GcOperands::None
            }
        };
        Ok(Self { opcode, operands })
    }
}

impl_contextual!(Instruction<A: Allocator>, ContextId::Instr);

impl<A: Allocator + Clone> Decodable<A> for Instruction<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let opcode: Opcode = decoder.read_bounded(context)?;
        let operands = match OPCODE_OPERANDS[opcode as usize] {
            OperandKind::None => Operands::None,
            OperandKind::BlockType => Operands::Block(decoder.read_bounded(context)?),
            OperandKind::LabelIdx => Operands::Label(decoder.read_bounded(context)?),
            OperandKind::BrTable => Operands::BrTable(decoder.read(context, alloc)?),
            OperandKind::FuncIdx => Operands::Func(decoder.read_bounded(context)?),
            OperandKind::TypeIdx => Operands::Type(decoder.read_bounded(context)?),
            OperandKind::CallIndirect => Operands::CallIndirect(decoder.read_bounded(context)?),
            OperandKind::TryTable => Operands::TryTable(decoder.read(context, alloc)?),
            OperandKind::TagIdx => Operands::Tag(decoder.read_bounded(context)?),
            OperandKind::LocalIdx => Operands::Local(decoder.read_bounded(context)?),
            OperandKind::GlobalIdx => Operands::Global(decoder.read_bounded(context)?),
            OperandKind::TableIdx => Operands::Table(decoder.read_bounded(context)?),
            OperandKind::MemArg => Operands::MemArg(decoder.read_bounded(context)?),
            OperandKind::MemIdx => Operands::Memory(decoder.read_bounded(context)?),
            OperandKind::I32 => Operands::I32(decoder.read_bounded(context)?),
            OperandKind::I64 => Operands::I64(decoder.read_bounded(context)?),
            OperandKind::F32 => Operands::F32(decoder.read_bounded(context)?),
            OperandKind::F64 => Operands::F64(decoder.read_bounded(context)?),
            OperandKind::HeapType => Operands::HeapType(decoder.read_bounded(context)?),
            OperandKind::SelectT => Operands::SelectT(decoder.read(context, alloc)?),
            OperandKind::Misc => Operands::Misc(decoder.read_bounded(context)?),
            OperandKind::Simd => Operands::Simd(decoder.read_bounded(context)?),
            OperandKind::Atomic => Operands::Atomic(decoder.read_bounded(context)?),
            OperandKind::Gc => Operands::Gc(decoder.read_bounded(context)?),
        };
        Ok(Self { opcode, operands })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::Global;
    use crate::storage::Buffer;

    fn decode_one(bytes: &[u8]) -> Result<Instruction<Global>, ()> {
        let mut decoder = Decoder::new(Buffer::new(bytes));
        let mut context = ContextStack::default();
        decoder.read(&mut context, &Global).map_err(|_| ())
    }

    #[test]
    fn plain_and_const_instructions() {
        let nop = decode_one(&[0x01]).unwrap();
        assert_eq!(nop.opcode, Opcode::Nop);
        assert!(matches!(nop.operands, Operands::None));

        let konst = decode_one(&[0x41, 0x7f]).unwrap();
        assert_eq!(konst.opcode, Opcode::I32Const);
        assert!(matches!(konst.operands, Operands::I32(-1)));
    }

    #[test]
    fn multi_memory_memarg() {
        // i32.load with align=2, memory=1, offset=8: the 0x40 bit on the
        // align byte announces the memory index.
        let load = decode_one(&[0x28, 0x42, 0x01, 0x08]).unwrap();
        let Operands::MemArg(memarg) = load.operands else {
            panic!("expected a memarg");
        };
        assert_eq!(memarg.align, 2);
        assert_eq!(*memarg.memory, 1);
        assert_eq!(memarg.offset, 8);
    }

    #[test]
    fn br_table_labels() {
        let br = decode_one(&[0x0e, 0x02, 0x00, 0x01, 0x02]).unwrap();
        let Operands::BrTable(operands) = br.operands else {
            panic!("expected br_table operands");
        };
        assert_eq!(operands.labels.len(), 2);
        assert_eq!(*operands.default, 2);
    }

    #[test]
    fn try_table_catch_clauses() {
        // try_table (empty blocktype) with catch 0 -> label 1 and
        // catch_all_ref -> label 0.
        let instr = decode_one(&[0x1f, 0x40, 0x02, 0x00, 0x00, 0x01, 0x03, 0x00]).unwrap();
        let Operands::TryTable(operands) = instr.operands else {
            panic!("expected try_table operands");
        };
        assert!(matches!(operands.ty, BlockType::Empty));
        assert_eq!(operands.catches.len(), 2);
        assert_eq!(operands.catches[0].kind, CatchKind::Catch);
        assert_eq!(operands.catches[0].tag, Some(TagIdx::new(0)));
        assert_eq!(operands.catches[1].kind, CatchKind::CatchAllRef);
        assert_eq!(operands.catches[1].tag, None);
    }

    #[test]
    fn simd_const_and_lane_ops() {
        let mut bytes = vec![0xfd, 0x0c];
        bytes.extend(core::array::from_fn::<u8, 16, _>(|i| i as u8));
        let konst = decode_one(&bytes).unwrap();
        let Operands::Simd(op) = konst.operands else {
            panic!("expected simd operands");
        };
        assert_eq!(op.opcode, SimdOpcode::V128Const);
        assert!(matches!(op.operands, SimdOperands::Bytes(b) if b[15] == 15));

        let lane = decode_one(&[0xfd, 0x15, 0x03]).unwrap();
        let Operands::Simd(op) = lane.operands else {
            panic!("expected simd operands");
        };
        assert_eq!(op.opcode, SimdOpcode::I8x16ExtractLaneS);
        assert!(matches!(op.operands, SimdOperands::Lane(3)));

        // v128.load8_lane: memarg then lane.
        let load_lane = decode_one(&[0xfd, 0x54, 0x00, 0x04, 0x07]).unwrap();
        let Operands::Simd(op) = load_lane.operands else {
            panic!("expected simd operands");
        };
        assert_eq!(op.opcode, SimdOpcode::V128Load8Lane);
        assert!(matches!(
            op.operands,
            SimdOperands::MemArgLane { memarg, lane: 7 } if memarg.offset == 4
        ));
    }

    #[test]
    fn atomic_ops() {
        let rmw = decode_one(&[0xfe, 0x1e, 0x02, 0x00]).unwrap();
        let Operands::Atomic(op) = rmw.operands else {
            panic!("expected atomic operands");
        };
        assert_eq!(op.opcode, AtomicOpcode::I32AtomicRmwAdd);
        assert!(matches!(op.operands, AtomicOperands::MemArg(_)));

        let fence = decode_one(&[0xfe, 0x03, 0x00]).unwrap();
        let Operands::Atomic(op) = fence.operands else {
            panic!("expected atomic operands");
        };
        assert!(matches!(op.operands, AtomicOperands::Fence(0)));
    }

    #[test]
    fn gc_br_on_cast() {
        // br_on_cast (both null) label 1, from (ref null any) to
        // (ref null struct).
        let instr = decode_one(&[0xfb, 0x18, 0x03, 0x01, 0x6e, 0x6b]).unwrap();
        let Operands::Gc(op) = instr.operands else {
            panic!("expected gc operands");
        };
        assert_eq!(op.opcode, GcOpcode::BrOnCast);
        let GcOperands::Cast {
            flags,
            label,
            from,
            to,
        } = op.operands
        else {
            panic!("expected cast operands");
        };
        assert_eq!(flags, CastFlags::BothNull);
        assert_eq!(*label, 1);
        assert_eq!(from, HeapType::Abstract(AbsHeapType::Any));
        assert_eq!(to, HeapType::Abstract(AbsHeapType::Struct));
    }

    #[test]
    fn misc_table_and_memory_ops() {
        let init = decode_one(&[0xfc, 0x08, 0x02, 0x00]).unwrap();
        let Operands::Misc(op) = init.operands else {
            panic!("expected misc operands");
        };
        assert_eq!(op.opcode, MiscOpcode::MemoryInit);
        assert!(matches!(
            op.operands,
            MiscOperands::MemoryInit { data, memory } if *data == 2 && *memory == 0
        ));

        let grow = decode_one(&[0xfc, 0x0f, 0x01]).unwrap();
        let Operands::Misc(op) = grow.operands else {
            panic!("expected misc operands");
        };
        assert_eq!(op.opcode, MiscOpcode::TableGrow);
        assert!(matches!(op.operands, MiscOperands::Table(t) if *t == 1));
    }

    #[test]
    fn unknown_sub_opcodes_fail() {
        assert!(decode_one(&[0xfb, 0x7f]).is_err());
        assert!(decode_one(&[0xfc, 0x40]).is_err());
        assert!(decode_one(&[0xfd, 0x9a, 0x01]).is_err());
        assert!(decode_one(&[0xfe, 0x04, 0x00, 0x00]).is_err());
    }

    #[test]
    fn unknown_opcode_fails() {
        assert!(decode_one(&[0x27]).is_err());
        assert!(decode_one(&[0xc5]).is_err());
    }
}
