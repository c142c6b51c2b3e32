// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary format decoding.

mod decodable_impls;
mod expr;
mod instr;
pub(crate) mod leb128;
mod typesec;

pub(crate) use expr::shuttle_expression;
pub(crate) use leb128::{Leb128, S33};

use core::fmt;

use num_enum::TryFromPrimitive;

use crate::Allocator;
use crate::compat::{Box, TryReserveError, Vec};
use crate::storage::{Buffer, Stream};
use crate::types::{Instruction, Module, Name, SectionId, Version};

// The maximum decoding depth of this implementation, bounding the error
// context stack.
const MAX_DEPTH: usize = 12;

// We represent this as an enum with one value to leverage existing "decode
// this u32 enum" machinery to check for a valid magic value.
#[derive(Clone, Copy, Debug, TryFromPrimitive)]
#[repr(u32)]
enum Magic {
    Value = 0x6d_73_61_00, // '\0asm'
}

// Represents decoding context.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
enum ContextId {
    #[default]
    Invalid,
    AtomicOpcode,
    BlockType,
    Body,
    BrTableOperands,
    Byte,
    CallIndirectOperands,
    CatchClause,
    CodeSec,
    CustomSec,
    Data,
    DataCountSec,
    DataIdx,
    DataSec,
    Elem,
    ElemIdx,
    ElemKind,
    ElemSec,
    Export,
    ExportSec,
    Expr,
    F32,
    F64,
    FieldType,
    FuncIdx,
    FuncSec,
    FuncType,
    GcOpcode,
    Global,
    GlobalIdx,
    GlobalSec,
    GlobalType,
    HeapType,
    I32,
    I64,
    Import,
    ImportSec,
    Instr,
    LabelIdx,
    Limits,
    LocalEntry,
    LocalIdx,
    Locals,
    Magic,
    MemArg,
    MemIdx,
    MemType,
    MemorySec,
    MiscOpcode,
    Mut,
    Name,
    Opcode,
    ReadingBytes,
    RecType,
    RefType,
    SectionId,
    SelectTOperands,
    SimdOpcode,
    StartSec,
    StorageType,
    SubType,
    Table,
    TableIdx,
    TableSec,
    TableType,
    Tag,
    TagIdx,
    TagSec,
    TryTableOperands,
    TypeDef,
    TypeIdx,
    TypeSec,
    U32,
    ValType,
    VecByte,
    VecCatch,
    VecExpr,
    VecField,
    VecFuncIdx,
    VecLabelIdx,
    VecValType,
    Version,
}

impl From<ContextId> for &'static str {
    fn from(id: ContextId) -> Self {
        match id {
            ContextId::Invalid => unreachable!("invalid context somehow reached!?"),
            ContextId::AtomicOpcode => "atomic opcode",
            ContextId::BlockType => "blocktype",
            ContextId::Body => "func body",
            ContextId::BrTableOperands => "br_table operands",
            ContextId::Byte => "byte",
            ContextId::CallIndirectOperands => "call_indirect operands",
            ContextId::CatchClause => "catch clause",
            ContextId::CodeSec => "codesec",
            ContextId::CustomSec => "customsec",
            ContextId::Data => "data",
            ContextId::DataCountSec => "datacountsec",
            ContextId::DataIdx => "dataidx",
            ContextId::DataSec => "datasec",
            ContextId::Elem => "elem",
            ContextId::ElemIdx => "elemidx",
            ContextId::ElemKind => "elemkind",
            ContextId::ElemSec => "elemsec",
            ContextId::Export => "export",
            ContextId::ExportSec => "exportsec",
            ContextId::Expr => "expr",
            ContextId::F32 => "f32",
            ContextId::F64 => "f64",
            ContextId::FieldType => "fieldtype",
            ContextId::FuncIdx => "funcidx",
            ContextId::FuncSec => "funcsec",
            ContextId::FuncType => "functype",
            ContextId::GcOpcode => "gc opcode",
            ContextId::Global => "global",
            ContextId::GlobalIdx => "globalidx",
            ContextId::GlobalSec => "globalsec",
            ContextId::GlobalType => "globaltype",
            ContextId::HeapType => "heaptype",
            ContextId::I32 => "i32",
            ContextId::I64 => "i64",
            ContextId::Import => "import",
            ContextId::ImportSec => "importsec",
            ContextId::Instr => "instr",
            ContextId::LabelIdx => "labelidx",
            ContextId::Limits => "limits",
            ContextId::LocalEntry => "local group",
            ContextId::LocalIdx => "localidx",
            ContextId::Locals => "locals",
            ContextId::Magic => "magic",
            ContextId::MemArg => "memarg",
            ContextId::MemIdx => "memidx",
            ContextId::MemType => "memtype",
            ContextId::MemorySec => "memsec",
            ContextId::MiscOpcode => "misc opcode",
            ContextId::Mut => "mut",
            ContextId::Name => "name",
            ContextId::Opcode => "opcode",
            ContextId::ReadingBytes => "reading bytes",
            ContextId::RecType => "rec group",
            ContextId::RefType => "reftype",
            ContextId::SectionId => "section ID",
            ContextId::SelectTOperands => "select_t operands",
            ContextId::SimdOpcode => "simd opcode",
            ContextId::StartSec => "startsec",
            ContextId::StorageType => "storagetype",
            ContextId::SubType => "subtype",
            ContextId::Table => "table",
            ContextId::TableIdx => "tableidx",
            ContextId::TableSec => "tablesec",
            ContextId::TableType => "tabletype",
            ContextId::Tag => "tag",
            ContextId::TagIdx => "tagidx",
            ContextId::TagSec => "tagsec",
            ContextId::TryTableOperands => "try_table operands",
            ContextId::TypeDef => "typedef",
            ContextId::TypeIdx => "typeidx",
            ContextId::TypeSec => "typesec",
            ContextId::U32 => "u32",
            ContextId::ValType => "valtype",
            ContextId::VecByte => "vec(byte)",
            ContextId::VecCatch => "vec(catch)",
            ContextId::VecExpr => "vec(expr)",
            ContextId::VecField => "vec(fieldtype)",
            ContextId::VecFuncIdx => "vec(funcidx)",
            ContextId::VecLabelIdx => "vec(labelidx)",
            ContextId::VecValType => "vec(valtype)",
            ContextId::Version => "version",
        }
    }
}

pub(crate) trait Contextual {
    const ID: ContextId;
}

// A frame of decoding context.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ContextFrame {
    // A description of what is being decoded.
    context: &'static str,

    // Byte offset in the stream where this context was entered.
    offset: usize,
}

/// Stack for tracking decoding context during error reporting.
#[derive(Clone, Debug, Default)]
pub struct ContextStack {
    offsets: [usize; MAX_DEPTH],
    ids: [ContextId; MAX_DEPTH],
    depth: u8,
}

impl ContextStack {
    // Pushes a new context frame, returning true if successful.
    fn push(&mut self, id: ContextId, offset: usize) -> bool {
        let depth = self.depth as usize;
        if depth >= MAX_DEPTH {
            return false;
        }
        self.offsets[depth] = offset;
        self.ids[depth] = id;
        self.depth += 1;
        true
    }

    // Pop the top context frame.
    fn pop(&mut self) {
        debug_assert!(self.depth > 0, "{self:#?}");
        self.depth -= 1;
    }

    // Returns an iterator over frames in "pushed" order (outermost to
    // innermost).
    fn iter(&self) -> impl Iterator<Item = ContextFrame> + '_ {
        self.offsets
            .iter()
            .zip(&self.ids)
            .take(self.depth as usize)
            .map(|(&offset, &id)| ContextFrame {
                context: id.into(),
                offset,
            })
    }
}

/// A decoding error with additional context around what hierarchy of things
/// were being decoded at the time.
pub struct ErrorWithContext<Storage: Stream> {
    /// The underlying decoding error.
    pub error: Error<Storage>,
    pub(crate) context: ContextStack,
}

impl<Storage: Stream> fmt::Debug for ErrorWithContext<Storage> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.error)?;
        for (i, frame) in self.context.iter().enumerate() {
            write!(f, "\n{:#x}: ", frame.offset)?;
            for _ in 0..i {
                write!(f, "  ")?;
            }
            write!(f, "{}", frame.context)?;
        }
        Ok(())
    }
}

/// Represents errors that can arise during module decoding.
pub enum Error<Storage: Stream> {
    /// Failed memory allocation.
    AllocError,
    /// A given section appears more than once in the module.
    DuplicateSection(SectionId),
    /// Decoder context stack exceeded maximum depth to prevent stack
    /// overflow.
    ExcessiveDecodingDepth {
        context: &'static str,
        offset: usize,
    },
    /// Invalid atomic sub-opcode encountered.
    InvalidAtomicOpcode(u32),
    /// Invalid composite-type form byte inside a subtype or rec group.
    InvalidCompositeType(u8),
    /// Invalid data segment flags word.
    InvalidDataFlags(u32),
    /// Invalid element segment flags word.
    InvalidElementFlags(u32),
    /// Invalid export kind byte.
    InvalidExportKind(u8),
    /// Invalid GC sub-opcode encountered.
    InvalidGcOpcode(u32),
    /// A signed 33-bit heap type outside both the sentinel and index
    /// ranges.
    InvalidHeapType(i64),
    /// Invalid import kind byte.
    InvalidImportKind(u8),
    /// Invalid LEB128 encoding encountered.
    InvalidLeb128,
    /// Invalid limits flag bits.
    InvalidLimitsFlags(u8),
    /// Invalid WebAssembly magic number.
    InvalidMagic(u32),
    /// Invalid misc sub-opcode encountered.
    InvalidMiscOpcode(u32),
    /// Section length doesn't match the declared length.
    InvalidSectionLength {
        id: SectionId,
        expected: u32,
        actual: u32,
    },
    /// Invalid SIMD sub-opcode encountered.
    InvalidSimdOpcode(u32),
    /// A table entry's `0x40` prefix was followed by something other than
    /// `0x00`.
    InvalidTableInitPrefix(u8),
    /// Invalid byte token encountered during decoding.
    InvalidToken(u8),
    /// Invalid type-section form byte.
    InvalidTypeForm(u8),
    /// Invalid UTF-8 encoding in a name field.
    InvalidUtf8,
    /// Invalid value type encoding encountered.
    InvalidValType(u8),
    /// A function body did not end with the `end` opcode.
    MissingEndOpcode,
    /// (Non-custom) sections appear out of canonical order.
    OutOfOrderSection { before: SectionId, after: SectionId },
    /// Error from the underlying storage.
    Storage(Storage::Error),
    /// A construct ran past the end of its section or body.
    TruncatedSection,
    /// Unknown section ID byte.
    UnknownSection(u8),
    /// Unsupported WebAssembly version number.
    UnknownVersion(u32),
}

impl<Storage: Stream> fmt::Debug for Error<Storage> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocError => write!(f, "allocation failure"),
            Error::DuplicateSection(id) => write!(f, "duplicate of section ({id:?})"),
            Error::ExcessiveDecodingDepth { context, offset } => {
                write!(f, "unexpected frame at {offset:#x}: {context}")
            }
            Error::InvalidAtomicOpcode(op) => write!(f, "invalid atomic opcode ({op:#x})"),
            Error::InvalidCompositeType(byte) => write!(f, "invalid composite type ({byte:#x})"),
            Error::InvalidDataFlags(flags) => write!(f, "invalid data flags ({flags:#x})"),
            Error::InvalidElementFlags(flags) => write!(f, "invalid element flags ({flags:#x})"),
            Error::InvalidExportKind(kind) => write!(f, "invalid export kind ({kind:#x})"),
            Error::InvalidGcOpcode(op) => write!(f, "invalid gc opcode ({op:#x})"),
            Error::InvalidHeapType(value) => write!(f, "invalid heap type ({value})"),
            Error::InvalidImportKind(kind) => write!(f, "invalid import kind ({kind:#x})"),
            Error::InvalidLeb128 => write!(f, "invalid LEB128-encoding"),
            Error::InvalidLimitsFlags(flags) => write!(f, "invalid limits flags ({flags:#x})"),
            Error::InvalidMagic(magic) => write!(f, "invalid magic ({magic:#x})"),
            Error::InvalidMiscOpcode(op) => write!(f, "invalid misc opcode ({op:#x})"),
            Error::InvalidSectionLength {
                id,
                expected,
                actual,
            } => write!(
                f,
                "invalid section length for {id:?}: expected {expected:#x}; got {actual:#x}"
            ),
            Error::InvalidSimdOpcode(op) => write!(f, "invalid simd opcode ({op:#x})"),
            Error::InvalidTableInitPrefix(byte) => {
                write!(f, "invalid table init prefix continuation ({byte:#x})")
            }
            Error::InvalidToken(token) => write!(f, "invalid byte token ({token:#x})"),
            Error::InvalidTypeForm(byte) => write!(f, "invalid type form ({byte:#x})"),
            Error::InvalidUtf8 => write!(f, "invalid UTF-8"),
            Error::InvalidValType(valtype) => write!(f, "invalid valtype ({valtype:#x})"),
            Error::MissingEndOpcode => write!(f, "func body does not end with `end`"),
            Error::OutOfOrderSection { before, after } => {
                write!(f, "out-of-order sections: {before:?} before {after:?}")
            }
            Error::Storage(err) => write!(f, "{err:?}"),
            Error::TruncatedSection => write!(f, "truncated section or body"),
            Error::UnknownSection(id) => write!(f, "unknown section ID ({id:#x})"),
            Error::UnknownVersion(version) => write!(f, "unknown version ({version:#x})"),
        }
    }
}

impl<Storage: Stream> leb128::Error for Error<Storage> {
    fn malformed_leb128() -> Self {
        Error::InvalidLeb128
    }
}

impl<Storage: Stream> From<TryReserveError> for Error<Storage> {
    fn from(_: TryReserveError) -> Self {
        Error::AllocError
    }
}

pub(crate) struct Decoder<Storage: Stream> {
    stream: Storage,
    // Absolute end offset of the innermost bounded region (section or
    // function body), when inside one.
    limit: Option<usize>,
}

impl<Storage: Stream> Decoder<Storage> {
    fn new(stream: Storage) -> Self {
        Self {
            stream,
            limit: None,
        }
    }

    // Pushes a context frame before a call, popping it if successful.
    pub(crate) fn with_context<F, R>(
        &mut self,
        context: &mut ContextStack,
        id: ContextId,
        f: F,
    ) -> Result<R, Error<Storage>>
    where
        F: FnOnce(&mut Self, &mut ContextStack) -> Result<R, Error<Storage>>,
    {
        let offset = self.stream.offset();
        if !context.push(id, offset) {
            return Err(Error::ExcessiveDecodingDepth {
                context: id.into(),
                offset,
            });
        }
        let val = f(self, context)?;
        context.pop();
        Ok(val)
    }

    pub(crate) fn offset(&mut self) -> usize {
        self.stream.offset()
    }

    // Fails when a read of `len` bytes would run past the innermost bounded
    // region.
    fn check_limit(&mut self, len: usize) -> Result<(), Error<Storage>> {
        if let Some(end) = self.limit
            && self.stream.offset() + len > end
        {
            return Err(Error::TruncatedSection);
        }
        Ok(())
    }

    // Bounds all subsequent reads to the next `len` bytes, returning the
    // previous bound for `pop_limit`.
    fn push_limit(&mut self, len: usize) -> Result<Option<usize>, Error<Storage>> {
        self.check_limit(len)?;
        Ok(self.limit.replace(self.stream.offset() + len))
    }

    fn pop_limit(&mut self, saved: Option<usize>) {
        self.limit = saved;
    }

    // The number of bytes left in the innermost bounded region.
    fn remaining(&mut self) -> usize {
        match self.limit {
            Some(end) => end - self.stream.offset(),
            None => 0,
        }
    }

    pub(crate) fn read_byte_raw(&mut self) -> Result<u8, Error<Storage>> {
        self.check_limit(1)?;
        self.stream.read_byte().map_err(Error::Storage)
    }

    pub(crate) fn read_leb128_raw<T: Leb128>(&mut self) -> Result<T, Error<Storage>> {
        leb128::read(|| self.read_byte_raw())
    }

    fn read_exact_raw(&mut self, buf: &mut [u8]) -> Result<(), Error<Storage>> {
        self.check_limit(buf.len())?;
        self.stream.read_exact(buf).map_err(Error::Storage)
    }

    pub(crate) fn read_exact(
        &mut self,
        context: &mut ContextStack,
        buf: &mut [u8],
    ) -> Result<(), Error<Storage>> {
        self.with_context(context, ContextId::ReadingBytes, |decoder, _| {
            decoder.read_exact_raw(buf)
        })
    }

    pub(crate) fn read_bytes<A: Allocator + Clone>(
        &mut self,
        context: &mut ContextStack,
        count: usize,
        alloc: &A,
    ) -> Result<Box<[u8], A>, Error<Storage>> {
        let mut buf = Vec::new_in(alloc.clone());
        buf.try_reserve_exact(count)?;
        buf.resize(count, 0);
        self.read_exact(context, &mut buf)?;
        Ok(buf.into_boxed_slice())
    }

    fn reset(&mut self, offset: usize) -> Result<(), Error<Storage>> {
        self.stream.reset(offset).map_err(Error::Storage)
    }

    pub(crate) fn read<A, T>(
        &mut self,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<T, Error<Storage>>
    where
        A: Allocator + Clone,
        T: Decodable<A> + Contextual,
    {
        self.with_context(context, T::ID, |decoder, context| {
            T::decode(decoder, context, alloc)
        })
    }

    pub(crate) fn read_bounded<T: BoundedDecodable + Contextual>(
        &mut self,
        context: &mut ContextStack,
    ) -> Result<T, Error<Storage>> {
        self.with_context(context, T::ID, |decoder, context| T::decode(decoder, context))
    }
}

// Types that can be decoded from a storage stream, possibly with
// allocation.
pub(crate) trait Decodable<A>: Sized
where
    A: Allocator + Clone,
{
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>>;
}

// Types that can be decoded from a storage stream without allocation.
pub(crate) trait BoundedDecodable: Sized + Copy {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>>;
}

impl<Bounded: BoundedDecodable, A: Allocator + Clone> Decodable<A> for Bounded {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        _: &A,
    ) -> Result<Self, Error<Storage>> {
        <Self as BoundedDecodable>::decode(decoder, context)
    }
}

/// Decode a module from a storage stream, reporting failures together with
/// the decoding context they occurred in.
pub fn parse_module_in<Storage, A>(
    storage: Storage,
    alloc: A,
) -> Result<Module<A>, ErrorWithContext<Storage>>
where
    Storage: Stream,
    A: Allocator + Clone,
{
    let mut context = ContextStack::default();
    decode_module(storage, &mut context, alloc).map_err(|error| ErrorWithContext {
        error,
        context,
    })
}

/// Decode the instruction sequence of a preserved expression (or of raw
/// code bytes). The trailing `end` opcode is included in the result.
pub fn decode_expression<Bytes, A>(
    bytes: Bytes,
    alloc: A,
) -> Result<Vec<Instruction<A>, A>, ErrorWithContext<Buffer<Bytes>>>
where
    Bytes: AsRef<[u8]>,
    A: Allocator + Clone,
{
    let mut context = ContextStack::default();
    decode_instructions(Buffer::new(bytes), &mut context, alloc)
        .map_err(|error| ErrorWithContext { error, context })
}

fn decode_instructions<Storage, A>(
    storage: Storage,
    context: &mut ContextStack,
    alloc: A,
) -> Result<Vec<Instruction<A>, A>, Error<Storage>>
where
    Storage: Stream,
    A: Allocator + Clone,
{
    let mut decoder = Decoder::new(storage);
    let mut instructions = Vec::new_in(alloc.clone());
    loop {
        // Probe for the end of the stream before committing to another
        // instruction.
        let probe = decoder.offset();
        match decoder.read_byte_raw() {
            Err(Error::Storage(ref err)) if Storage::is_eof(err) => break,
            Err(err) => return Err(err),
            Ok(_) => decoder.reset(probe)?,
        }

        let instruction = decoder.read(context, &alloc)?;
        instructions.try_reserve(1)?;
        instructions.push(instruction);
    }
    Ok(instructions)
}

// Decode a WebAssembly module from a storage stream.
pub(crate) fn decode_module<Storage, A>(
    storage: Storage,
    context: &mut ContextStack,
    alloc: A,
) -> Result<Module<A>, Error<Storage>>
where
    Storage: Stream,
    A: Allocator + Clone,
{
    let mut decoder = Decoder::new(storage);
    decoder.read_bounded::<Magic>(context)?;
    let _version: Version = decoder.read_bounded(context)?;

    let mut module = Module::empty_in(alloc.clone());

    // The canonical position and identity of the last non-custom section.
    let mut last: Option<(u8, SectionId)> = None;
    loop {
        // There is no in-band signal in the WASM format for the end of a
        // module. The best we can generically do is expect an EOF at a
        // section boundary.
        let id = decoder.read_bounded::<SectionId>(context);
        if let Err(Error::Storage(ref err)) = id
            && Storage::is_eof(err)
        {
            break;
        }
        let id = id?;

        // Apart from custom sections, which can appear anywhere in the
        // format, sections must appear at most once and in canonical order.
        if let Some(order) = id.order() {
            if let Some((last_order, last_id)) = last {
                if order == last_order {
                    return Err(Error::DuplicateSection(id));
                }
                if order < last_order {
                    return Err(Error::OutOfOrderSection {
                        before: last_id,
                        after: id,
                    });
                }
            }
            last = Some((order, id));
        }

        let len: u32 = decoder.read_bounded(context)?;
        let saved_limit = decoder.push_limit(len as usize)?;
        match id {
            SectionId::Custom => {
                let custom = decoder.with_context(
                    context,
                    ContextId::CustomSec,
                    |decoder, context| {
                        let name: Name<A> = decoder.read(context, &alloc)?;
                        let payload_len = decoder.remaining();
                        let bytes = decoder.read_bytes(context, payload_len, &alloc)?;
                        Ok(crate::types::CustomSection { name, bytes })
                    },
                )?;
                module.custom_sections.try_reserve(1)?;
                module.custom_sections.push(custom);
            }
            SectionId::Type => decoder.with_context(context, ContextId::TypeSec, |decoder, context| {
                typesec::decode_type_section(decoder, context, &alloc, &mut module)
            })?,
            SectionId::Import => module.imports = decoder.read(context, &alloc)?,
            SectionId::Function => module.funcs = decoder.read(context, &alloc)?,
            SectionId::Table => module.tables = decoder.read(context, &alloc)?,
            SectionId::Memory => module.memories = decoder.read(context, &alloc)?,
            SectionId::Global => module.globals = decoder.read(context, &alloc)?,
            SectionId::Export => module.exports = decoder.read(context, &alloc)?,
            SectionId::Start => {
                module.start = Some(decoder.with_context(
                    context,
                    ContextId::StartSec,
                    |decoder, context| decoder.read_bounded(context),
                )?);
            }
            SectionId::Element => module.elements = decoder.read(context, &alloc)?,
            SectionId::Code => module.code = decoder.read(context, &alloc)?,
            SectionId::Data => module.data = decoder.read(context, &alloc)?,
            SectionId::DataCount => {
                module.data_count = Some(decoder.with_context(
                    context,
                    ContextId::DataCountSec,
                    |decoder, context| decoder.read_bounded(context),
                )?);
            }
            SectionId::Tag => module.tags = decoder.read(context, &alloc)?,
        }

        let leftover = decoder.remaining();
        decoder.pop_limit(saved_limit);
        if leftover != 0 {
            return Err(Error::InvalidSectionLength {
                id,
                expected: len,
                actual: len - leftover as u32,
            });
        }
    }

    Ok(module)
}
