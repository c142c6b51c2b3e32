// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Single-instruction encoding, the exact inverse of the decoder.

use crate::Allocator;
use crate::compat::Vec;
use crate::types::*;

use super::{Encodable, Encoder, Error};

/// Encode a sequence of decoded instructions back to their wire bytes.
pub fn encode_instructions<A: Allocator + Clone>(
    instructions: &[Instruction<A>],
    alloc: A,
) -> Result<Vec<u8, A>, Error> {
    let mut encoder = Encoder::new(alloc);
    for instruction in instructions {
        encoder.write(instruction)?;
    }
    Ok(encoder.into_bytes())
}

impl<A: Allocator + Clone> Encodable<A> for BlockType {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        match self {
            Self::Empty => encoder.write_byte(0x40),
            Self::Result(valtype) => encoder.write(valtype),
            Self::TypeIndex(idx) => encoder.write_s33_leb(i64::from(*idx)),
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for MemArg {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        // The 0x40 align bit and the memory index appear only for
        // non-default memories.
        let has_memory = *self.memory != 0;
        let align = if has_memory {
            self.align | 0x40
        } else {
            self.align
        };
        encoder.write_u32_leb(align)?;
        if has_memory {
            encoder.write(&self.memory)?;
        }
        encoder.write_u64_leb(self.offset)
    }
}

impl<A: Allocator + Clone> Encodable<A> for CatchClause {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_byte(self.kind as u8)?;
        match (self.kind, self.tag) {
            (CatchKind::Catch | CatchKind::CatchRef, Some(tag)) => encoder.write(&tag)?,
            (CatchKind::CatchAll | CatchKind::CatchAllRef, None) => {}
            _ => return Err(Error::InconsistentCatchClause),
        }
        encoder.write(&self.label)
    }
}

impl<A: Allocator + Clone> Encodable<A> for MiscOp {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_u32_leb(self.opcode as u32)?;
        match &self.operands {
            MiscOperands::None => Ok(()),
            MiscOperands::MemoryInit { data, memory } => {
                encoder.write(data)?;
                encoder.write(memory)
            }
            MiscOperands::DataDrop(data) => encoder.write(data),
            MiscOperands::MemoryCopy { dst, src } => {
                encoder.write(dst)?;
                encoder.write(src)
            }
            MiscOperands::MemoryFill(memory) => encoder.write(memory),
            MiscOperands::TableInit { elem, table } => {
                encoder.write(elem)?;
                encoder.write(table)
            }
            MiscOperands::ElemDrop(elem) => encoder.write(elem),
            MiscOperands::TableCopy { dst, src } => {
                encoder.write(dst)?;
                encoder.write(src)
            }
            MiscOperands::Table(table) => encoder.write(table),
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for SimdOp {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_u32_leb(self.opcode as u32)?;
        match &self.operands {
            SimdOperands::None => Ok(()),
            SimdOperands::MemArg(memarg) => encoder.write(memarg),
            SimdOperands::MemArgLane { memarg, lane } => {
                encoder.write(memarg)?;
                encoder.write_byte(*lane)
            }
            SimdOperands::Lane(lane) => encoder.write_byte(*lane),
            SimdOperands::Bytes(bytes) => encoder.write_bytes(bytes),
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for AtomicOp {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_u32_leb(self.opcode as u32)?;
        match &self.operands {
            AtomicOperands::MemArg(memarg) => encoder.write(memarg),
            AtomicOperands::Fence(ordering) => encoder.write_byte(*ordering),
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for GcOp {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_u32_leb(self.opcode as u32)?;
        match &self.operands {
            GcOperands::None => Ok(()),
            GcOperands::Type(ty) => encoder.write(ty),
            GcOperands::StructField { ty, field } => {
                encoder.write(ty)?;
                encoder.write_u32_leb(*field)
            }
            GcOperands::ArrayFixed { ty, len } => {
                encoder.write(ty)?;
                encoder.write_u32_leb(*len)
            }
            GcOperands::ArrayData { ty, data } => {
                encoder.write(ty)?;
                encoder.write(data)
            }
            GcOperands::ArrayElem { ty, elem } => {
                encoder.write(ty)?;
                encoder.write(elem)
            }
            GcOperands::ArrayCopy { dst, src } => {
                encoder.write(dst)?;
                encoder.write(src)
            }
            GcOperands::HeapType(heap) => encoder.write(heap),
            GcOperands::Cast {
                flags,
                label,
                from,
                to,
            } => {
                encoder.write_byte(*flags as u8)?;
                encoder.write(label)?;
                encoder.write(from)?;
                encoder.write(to)
            }
        }
    }
}

impl<A: Allocator + Clone> Encodable<A> for Instruction<A> {
    fn encode(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_byte(self.opcode as u8)?;
        match &self.operands {
            Operands::None => Ok(()),
            Operands::Block(block) => encoder.write(block),
            Operands::Label(label) => encoder.write(label),
            Operands::BrTable(operands) => {
                encoder.write_vec(&operands.labels)?;
                encoder.write(&operands.default)
            }
            Operands::Func(idx) => encoder.write(idx),
            Operands::Type(idx) => encoder.write(idx),
            Operands::CallIndirect(operands) => {
                encoder.write(&operands.ty)?;
                encoder.write(&operands.table)
            }
            Operands::TryTable(operands) => {
                encoder.write(&operands.ty)?;
                encoder.write_vec(&operands.catches)
            }
            Operands::Tag(idx) => encoder.write(idx),
            Operands::Local(idx) => encoder.write(idx),
            Operands::Global(idx) => encoder.write(idx),
            Operands::Table(idx) => encoder.write(idx),
            Operands::MemArg(memarg) => encoder.write(memarg),
            Operands::Memory(idx) => encoder.write(idx),
            Operands::I32(value) => encoder.write_s32_leb(*value),
            Operands::I64(value) => encoder.write_s64_leb(*value),
            Operands::F32(value) => encoder.write_bytes(&value.to_le_bytes()),
            Operands::F64(value) => encoder.write_bytes(&value.to_le_bytes()),
            Operands::HeapType(heap) => encoder.write(heap),
            Operands::SelectT(operands) => encoder.write_vec(&operands.types),
            Operands::Misc(op) => encoder.write(op),
            Operands::Simd(op) => encoder.write(op),
            Operands::Atomic(op) => encoder.write(op),
            Operands::Gc(op) => encoder.write(op),
        }
    }
}
