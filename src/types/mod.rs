// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly type definitions.
//!
//! This module contains all the type definitions used for parsing and
//! representing WASM modules: value and reference types (including the
//! GC composite forms), limits, imports/exports, segments, and the
//! [`Module`] container itself.

mod instr;
mod module;

pub use instr::*;
pub use module::Module;

use core::cmp;

use num_enum::TryFromPrimitive;

use crate::Allocator;
use crate::compat::{Box, TryReserveError, Vec};

// Defines a public newtype without public mutable access to the underlying
// type, along with some convenience trait implementations like Deref and
// AsRef.
macro_rules! newtype {
    (
        $(#[$meta:meta])*
        pub struct $type:ident<A: Allocator>($underlying:ty);
    ) => {
        $(#[$meta])*
        pub struct $type<A: Allocator>($underlying);

        newtype!(@impl [A: Allocator], $type<A>, $underlying);
    };
    (
        $(#[$meta:meta])*
        pub struct $type:ident($underlying:ty);
    ) => {
        $(#[$meta])*
        pub struct $type($underlying);

        newtype!(@impl [], $type, $underlying);
    };
    (@impl [$($generic_params:tt)*], $qualified_type:ty, $underlying:ty) => {
        impl<$($generic_params)*> $qualified_type {
            pub fn new(value: $underlying) -> Self {
                Self(value)
            }
        }

        impl<$($generic_params)*> ::core::ops::Deref for $qualified_type {
            type Target = $underlying;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<$($generic_params)*> AsRef<$underlying> for $qualified_type {
            fn as_ref(&self) -> &$underlying {
                &self.0
            }
        }
    };
}
pub(crate) use newtype;

/// WebAssembly module version.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum Version {
    V1 = 1,
}

newtype!(
    /// A name (of a module, field, or custom section).
    #[derive(Debug, Eq, PartialEq)]
    pub struct Name<A: Allocator>(Box<str, A>);
);

impl<A: Allocator> Name<A> {
    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<A: Allocator + Clone> Name<A> {
    /// Copies `text` into a name allocated from `alloc`.
    pub fn from_str_in(text: &str, alloc: A) -> Result<Self, TryReserveError> {
        let mut bytes = Vec::new_in(alloc.clone());
        bytes.try_reserve_exact(text.len())?;
        bytes.extend_from_slice(text.as_bytes());
        let ptr = Box::into_raw(bytes.into_boxed_slice());
        // Safety: The ABIs of [u8] and str are identical, and the bytes
        // were copied out of a valid &str.
        let text = unsafe { Box::from_raw_in(ptr as *mut str, alloc) };
        Ok(Self::new(text))
    }
}

/// An abstract heap type, i.e. one of the built-in reference categories.
///
/// The discriminants are the one-byte shorthand encodings; the signed
/// 33-bit form used inside `0x63`/`0x64` reference prefixes is the byte
/// value minus `0x80`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum AbsHeapType {
    /// Bottom type of exception references.
    NoExn = 0x74,
    /// Bottom type of function references.
    NoFunc = 0x73,
    /// Bottom type of external references.
    NoExtern = 0x72,
    /// Bottom type of internal references.
    None = 0x71,
    /// Common supertype of all function references.
    Func = 0x70,
    /// Opaque host references.
    Extern = 0x6f,
    /// Common supertype of all internal references.
    Any = 0x6e,
    /// References supporting equality comparison.
    Eq = 0x6d,
    /// Unboxed 31-bit scalars.
    I31 = 0x6c,
    /// Common supertype of all struct references.
    Struct = 0x6b,
    /// Common supertype of all array references.
    Array = 0x6a,
    /// Exception references.
    Exn = 0x69,
}

/// A heap type: either an abstract category or an index into the type
/// section.
///
/// On the wire, heap types are signed 33-bit LEB128 values; abstract
/// categories are the negative sentinels and type indices are the
/// non-negative range.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HeapType {
    Abstract(AbsHeapType),
    Index(TypeIdx),
}

impl HeapType {
    /// Reconstructs a heap type from its signed 33-bit wire value.
    pub fn from_s33(value: i64) -> Option<Self> {
        if value >= 0 {
            u32::try_from(value).ok().map(|idx| Self::Index(TypeIdx::new(idx)))
        } else {
            u8::try_from(value + 0x80)
                .ok()
                .and_then(|byte| AbsHeapType::try_from(byte).ok())
                .map(Self::Abstract)
        }
    }

    /// The signed 33-bit wire value of this heap type.
    pub fn to_s33(self) -> i64 {
        match self {
            Self::Abstract(abs) => i64::from(abs as u8) - 0x80,
            Self::Index(idx) => i64::from(*idx),
        }
    }
}

/// The type of a reference value: a heap type plus nullability.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RefType {
    pub nullable: bool,
    pub heap: HeapType,
}

impl RefType {
    pub const FUNCREF: Self = Self::nullable(AbsHeapType::Func);
    pub const EXTERNREF: Self = Self::nullable(AbsHeapType::Extern);
    pub const EXNREF: Self = Self::nullable(AbsHeapType::Exn);

    /// A nullable reference to the given abstract heap type, i.e. the
    /// category a one-byte shorthand encoding denotes.
    pub const fn nullable(abs: AbsHeapType) -> Self {
        Self {
            nullable: true,
            heap: HeapType::Abstract(abs),
        }
    }

    /// Whether this type has a one-byte shorthand encoding.
    pub(crate) fn is_shorthand(&self) -> bool {
        self.nullable && matches!(self.heap, HeapType::Abstract(_))
    }
}

/// Value types classify the individual values that WebAssembly code can
/// compute with and the values that a variable accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValType {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit floating point number.
    F32,
    /// 64-bit floating point number.
    F64,
    /// 128-bit SIMD vector.
    V128,
    /// Reference, abstract or concrete.
    Ref(RefType),
}

impl ValType {
    pub const FUNCREF: Self = Self::Ref(RefType::FUNCREF);
    pub const EXTERNREF: Self = Self::Ref(RefType::EXTERNREF);
}

/// The signature of a function, mapping parameters to results. Signatures
/// also classify the inputs and outputs of blocks and control tags.
#[derive(Clone, Debug)]
pub struct FuncType<A: Allocator> {
    pub parameters: Vec<ValType, A>,
    pub results: Vec<ValType, A>,
}

/// The type of a value as stored in a struct field or array element:
/// either a full value type or one of the packed integer forms.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageType {
    /// Packed 8-bit integer.
    I8,
    /// Packed 16-bit integer.
    I16,
    /// An unpacked value type.
    Val(ValType),
}

/// The mutability of a global variable or aggregate field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum Mutability {
    /// Immutable.
    Const = 0x00,
    /// Mutable.
    Var = 0x01,
}

/// The type of a single struct field or of an array's elements.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldType {
    pub storage: StorageType,
    pub mutability: Mutability,
}

/// A composite type: the payload of a type-section definition.
#[derive(Clone, Debug)]
pub enum CompType<A: Allocator> {
    Func(FuncType<A>),
    Struct(Vec<FieldType, A>),
    Array(FieldType),
}

/// A subtype declaration: a composite type plus its place in the subtyping
/// hierarchy.
#[derive(Clone, Debug)]
pub struct SubType<A: Allocator> {
    /// Whether further subtyping from this type is forbidden.
    pub is_final: bool,
    /// Declared supertypes, as type indices.
    pub supertypes: Vec<TypeIdx, A>,
    pub comp: CompType<A>,
}

/// A single entry of the type section, in its rich (GC-era) form.
///
/// Pre-GC modules use only `Func`; a `Rec` group occupies as many slots of
/// the type index space as it has members.
#[derive(Clone, Debug)]
pub enum TypeDef<A: Allocator> {
    /// A shorthand function type (`0x60` at the top level).
    Func(FuncType<A>),
    /// A lone subtype, possibly final and possibly with supertypes.
    Sub(SubType<A>),
    /// A recursion group of mutually-referential subtypes.
    Rec(Vec<SubType<A>, A>),
}

impl<A: Allocator> TypeDef<A> {
    /// The number of slots this definition occupies in the type index
    /// space.
    pub fn index_slots(&self) -> usize {
        match self {
            Self::Func(_) | Self::Sub(_) => 1,
            Self::Rec(subs) => subs.len(),
        }
    }
}

/// The size range of the resizeable storage associated with memories
/// (pages) and tables (elements).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limits {
    /// Minimum size.
    pub min: u64,
    /// Maximum size, with None indicating that there is no upper limit.
    pub max: Option<u64>,
    /// Whether the storage may be shared between threads.
    pub shared: bool,
    /// Whether sizes are 64-bit (and encoded as 64-bit LEB128s).
    pub memory64: bool,
}

impl Limits {
    /// Plain 32-bit limits with no flag bits set.
    pub const fn plain(min: u64, max: Option<u64>) -> Self {
        Self {
            min,
            max,
            shared: false,
            memory64: false,
        }
    }
}

newtype!(
    /// A linear memory type with its size limits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct MemType(Limits);
);

impl MemType {
    /// The WebAssembly page size.
    pub const PAGE_SIZE: usize = 0x1_0000; // 64 KiB

    /// The maximum page count of a 32-bit memory.
    pub const MAX_PAGES_32: u64 = 1 << 16;

    /// The maximum page count of a 64-bit memory.
    pub const MAX_PAGES_64: u64 = 1 << 48;

    /// The applicable page-count cap for this memory.
    pub const fn page_cap(&self) -> u64 {
        if self.0.memory64 {
            Self::MAX_PAGES_64
        } else {
            Self::MAX_PAGES_32
        }
    }
}

/// WebAssembly table type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TableType {
    /// Type of references stored in the table.
    pub reftype: RefType,
    /// Table size limits.
    pub limits: Limits,
}

/// A table declaration: its type, plus an optional element initializer in
/// the extended (`0x40 0x00`-prefixed) encoding.
#[derive(Clone, Debug)]
pub struct Table<A: Allocator> {
    pub ty: TableType,
    /// Initial value for every element, when the extended form was used.
    pub init: Option<Expression<A>>,
}

/// Represents the type of a global variable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GlobalType {
    /// The type of the global.
    pub value: ValType,
    /// The mutability of the global.
    pub mutability: Mutability,
}

/// A global declaration.
#[derive(Clone, Debug)]
pub struct Global<A: Allocator> {
    /// Global type and mutability.
    pub ty: GlobalType,
    /// Initialization expression.
    pub init: Expression<A>,
}

/// The attribute byte of a control tag. Exceptions are the only kind
/// currently defined.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum TagAttribute {
    Exception = 0x00,
}

/// A control tag declaration, typed by a function signature.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TagType {
    pub attribute: TagAttribute,
    pub ty: TypeIdx,
}

newtype!(
    /// An index into the type section.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TypeIdx(u32);
);

newtype!(
    /// An index into the function index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct FuncIdx(u32);
);

newtype!(
    /// An index into the table index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TableIdx(u32);
);

newtype!(
    /// An index into the memory index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct MemIdx(u32);
);

newtype!(
    /// An index into the global index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct GlobalIdx(u32);
);

newtype!(
    /// An index into the tag index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TagIdx(u32);
);

newtype!(
    /// An index into the element section.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ElemIdx(u32);
);

newtype!(
    /// An index into the data section.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct DataIdx(u32);
);

newtype!(
    /// An index into a function's local variables.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LocalIdx(u32);
);

newtype!(
    /// An index referencing structured control instructions inside an
    /// instruction sequence.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LabelIdx(u32);
);

newtype!(
    /// A WebAssembly expression, preserved as its verbatim wire bytes
    /// (opcodes and immediates unchanged), terminated by the `end` opcode.
    ///
    /// The section codecs never re-interpret these bytes; consumers that
    /// need the instructions can run them back through
    /// [`decode_expression`](crate::decode::decode_expression).
    #[derive(Clone, Debug)]
    pub struct Expression<A: Allocator>(Box<[u8], A>);
);

impl<A: Allocator> cmp::PartialEq for Expression<A> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<A: Allocator> Expression<A> {
    /// The raw wire bytes, including the trailing `end` opcode.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl<A: Allocator + Clone> Expression<A> {
    /// Copies pre-encoded expression bytes, which must already end in the
    /// `end` opcode.
    pub fn from_bytes_in(bytes: &[u8], alloc: A) -> Result<Self, TryReserveError> {
        let mut copy = Vec::new_in(alloc);
        copy.try_reserve_exact(bytes.len())?;
        copy.extend_from_slice(bytes);
        Ok(Self::new(copy.into_boxed_slice()))
    }
}

/// Section identifier within a module.
///
/// `PartialOrd` is implemented over the *canonical* section ordering, which
/// differs from the raw ID numbering: the tag section (wire ID 13) sorts
/// between memory and global, and the data-count section precedes code.
/// Custom sections do not participate in the ordering.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum SectionId {
    /// Custom section with arbitrary data.
    Custom = 0,
    /// Type declarations.
    Type = 1,
    /// Import declarations.
    Import = 2,
    /// Function type indices for module functions.
    Function = 3,
    /// Table declarations.
    Table = 4,
    /// Memory declarations.
    Memory = 5,
    /// Global declarations.
    Global = 6,
    /// Export declarations.
    Export = 7,
    /// Start function index.
    Start = 8,
    /// Element segments for table initialization.
    Element = 9,
    /// Function bodies.
    Code = 10,
    /// Data segments for memory initialization.
    Data = 11,
    /// Data segment count (for bulk memory operations).
    DataCount = 12,
    /// Control tag declarations.
    Tag = 13,
}

impl SectionId {
    /// Position in the canonical section ordering, or None for custom
    /// sections.
    pub(crate) fn order(self) -> Option<u8> {
        match self {
            Self::Custom => None,
            Self::Type => Some(1),
            Self::Import => Some(2),
            Self::Function => Some(3),
            Self::Table => Some(4),
            Self::Memory => Some(5),
            Self::Tag => Some(6),
            Self::Global => Some(7),
            Self::Export => Some(8),
            Self::Start => Some(9),
            Self::Element => Some(10),
            Self::DataCount => Some(11),
            Self::Code => Some(12),
            Self::Data => Some(13),
        }
    }
}

impl PartialOrd for SectionId {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        match (self.order(), other.order()) {
            (Some(lhs), Some(rhs)) => lhs.partial_cmp(&rhs),
            _ => None,
        }
    }
}

/// Custom section with arbitrary binary data.
#[derive(Debug)]
pub struct CustomSection<A: Allocator> {
    /// Section name.
    pub name: Name<A>,
    /// Section content.
    pub bytes: Box<[u8], A>,
}

/// Import descriptor types.
#[derive(Clone, Copy, Debug)]
pub enum ImportDescriptor {
    /// Import a function with the given type index.
    Function(TypeIdx),
    /// Import a table with the given type.
    Table(TableType),
    /// Import a memory with the given type.
    Memory(MemType),
    /// Import a global with the given type.
    Global(GlobalType),
    /// Import a control tag with the given type.
    Tag(TagType),
}

impl ImportDescriptor {
    /// The wire value of this import's kind byte.
    pub(crate) fn kind(&self) -> u8 {
        match self {
            Self::Function(_) => 0,
            Self::Table(_) => 1,
            Self::Memory(_) => 2,
            Self::Global(_) => 3,
            Self::Tag(_) => 4,
        }
    }
}

/// An import declaration.
#[derive(Debug)]
pub struct Import<A: Allocator> {
    /// Name of the module to import from.
    pub module: Name<A>,
    /// Name of the imported entity.
    pub field: Name<A>,
    /// Type of the imported entity.
    pub descriptor: ImportDescriptor,
}

/// Describes what kind of entity is being exported.
#[derive(Clone, Copy, Debug)]
pub enum ExportDescriptor {
    /// Export a function with the given index.
    Function(FuncIdx),
    /// Export a table with the given index.
    Table(TableIdx),
    /// Export a memory with the given index.
    Memory(MemIdx),
    /// Export a global with the given index.
    Global(GlobalIdx),
    /// Export a control tag with the given index.
    Tag(TagIdx),
}

impl ExportDescriptor {
    /// The wire value of this export's kind byte.
    pub(crate) fn kind(&self) -> u8 {
        match self {
            Self::Function(_) => 0,
            Self::Table(_) => 1,
            Self::Memory(_) => 2,
            Self::Global(_) => 3,
            Self::Tag(_) => 4,
        }
    }
}

/// An export declaration.
#[derive(Debug)]
pub struct Export<A: Allocator> {
    /// Name of the exported entity.
    pub field: Name<A>,
    /// Type and index of the exported entity.
    pub descriptor: ExportDescriptor,
}

/// The element kind byte carried by non-reftype element segments.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ElemKind {
    FuncRef = 0x00,
}

/// The initialization payload of an element segment.
#[derive(Clone, Debug)]
pub enum ElementInit<A: Allocator> {
    /// A vector of function indices.
    Functions(Vec<FuncIdx, A>),
    /// A vector of constant expressions.
    Expressions(Vec<Expression<A>, A>),
}

/// A WebAssembly element segment.
///
/// The `flags` word (0–7) is the wire encoding's discriminator and is kept
/// as parsed so that re-encoding reproduces the original layout; the
/// optional fields are populated exactly as the flags dictate.
#[derive(Clone, Debug)]
pub struct ElementSegment<A: Allocator> {
    /// The wire flags word, 0 through 7.
    pub flags: u32,
    /// Explicit table index; present only for flags 2 and 6.
    pub table: Option<TableIdx>,
    /// Table offset expression; present for all active segments.
    pub offset: Option<Expression<A>>,
    /// Element kind byte; present for flags 1, 2, and 3.
    pub elemkind: Option<ElemKind>,
    /// Element reference type; present for flags 5, 6, and 7.
    pub reftype: Option<RefType>,
    /// The initial values.
    pub init: ElementInit<A>,
}

impl<A: Allocator> ElementSegment<A> {
    /// Whether this segment initializes a table at instantiation.
    pub fn is_active(&self) -> bool {
        self.flags & 0x01 == 0
    }

    /// Whether this segment is stored for later runtime copying.
    pub fn is_passive(&self) -> bool {
        self.flags & 0x03 == 1
    }

    /// Whether this segment only declares references for validation.
    pub fn is_declarative(&self) -> bool {
        self.flags & 0x03 == 3
    }

    /// The table an active segment initializes.
    pub fn table_index(&self) -> TableIdx {
        self.table.unwrap_or(TableIdx::new(0))
    }
}

/// A data segment for initializing linear memory.
///
/// As with [`ElementSegment`], the wire `flags` word (0–2) is kept as
/// parsed and governs which optional fields are present.
#[derive(Clone, Debug)]
pub struct DataSegment<A: Allocator> {
    /// The wire flags word, 0 through 2.
    pub flags: u32,
    /// Explicit memory index; present only for flags 2.
    pub memory: Option<MemIdx>,
    /// Memory offset expression; present unless passive (flags 1).
    pub offset: Option<Expression<A>>,
    /// The initial data bytes for this segment.
    pub init: Vec<u8, A>,
}

impl<A: Allocator> DataSegment<A> {
    /// Whether this segment initializes a memory at instantiation.
    pub fn is_active(&self) -> bool {
        self.flags != 1
    }

    /// The memory an active segment initializes.
    pub fn memory_index(&self) -> MemIdx {
        self.memory.unwrap_or(MemIdx::new(0))
    }
}

/// A run-length group of local variable declarations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LocalEntry {
    /// Number of consecutive locals of this type.
    pub count: u32,
    /// Their type.
    pub ty: ValType,
}

/// A function body: local declarations followed by the code expression.
#[derive(Clone, Debug)]
pub struct FuncBody<A: Allocator> {
    /// Local variable declarations, as run-length groups.
    pub locals: Vec<LocalEntry, A>,
    /// The raw code bytes, ending in the `end` opcode.
    pub code: Expression<A>,
}
