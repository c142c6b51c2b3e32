// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Structural module validation.
//!
//! Checks index bounds and structural invariants over a decoded module:
//! type/function/table/memory/global/tag index ranges, export uniqueness,
//! the start function's signature, data-count consistency, and memory and
//! table limit rules. Function bodies are not type-checked.
//!
//! Validation never mutates or reorders the module; the same value can be
//! re-encoded afterwards.

mod validate_impls;

use core::fmt;

use crate::Allocator;
use crate::types::{FuncIdx, Limits, Module, SectionId};

/// Represents errors that can arise during module validation.
#[derive(Clone, Copy)]
pub enum Error {
    /// The data-count section disagrees with the data section.
    DataCountMismatch { declared: u32, actual: usize },
    /// Two exports share a name.
    DuplicateExportName { index: u32 },
    /// The function and code sections have different lengths.
    FunctionCodeCountMismatch { funcs: usize, bodies: usize },
    /// An index is out of range for its index space. `id` names the space.
    IndexOutOfBounds {
        id: SectionId,
        index: u32,
        capacity: u32,
    },
    /// Limits with a minimum above the maximum.
    LimitsMinExceedsMax(Limits),
    /// The start function is missing or its signature is not `() -> ()`.
    InvalidStartFunction(FuncIdx),
    /// A memory's page counts exceed the cap for its addressing mode.
    MemoryTooLarge(Limits),
    /// A shared memory without a declared maximum.
    SharedMemoryWithoutMax(Limits),
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DataCountMismatch { declared, actual } => write!(
                f,
                "data count section declares {declared} segments, but data section has {actual}"
            ),
            Error::DuplicateExportName { index } => {
                write!(f, "duplicate export name (export {index})")
            }
            Error::FunctionCodeCountMismatch { funcs, bodies } => write!(
                f,
                "function section has {funcs} entries, but code section has {bodies}"
            ),
            Error::IndexOutOfBounds {
                id,
                index,
                capacity,
            } => write!(f, "{id:?} index {index} out of bounds (capacity {capacity})"),
            Error::LimitsMinExceedsMax(limits) => {
                write!(f, "limits minimum exceeds maximum ({limits:?})")
            }
            Error::InvalidStartFunction(idx) => {
                write!(f, "start function {} must have signature () -> ()", **idx)
            }
            Error::MemoryTooLarge(limits) => {
                write!(f, "memory page count exceeds addressing cap ({limits:?})")
            }
            Error::SharedMemoryWithoutMax(_) => {
                write!(f, "shared memory must have maximum limit")
            }
        }
    }
}

pub(crate) struct Validator<'module, A: Allocator> {
    module: &'module Module<A>,

    // Index space sizes, imports included, precomputed once.
    num_types: u32,
    num_funcs: u32,
    num_tables: u32,
    num_memories: u32,
    num_globals: u32,
    num_tags: u32,
}

impl<'module, A: Allocator> Validator<'module, A> {
    fn new(module: &'module Module<A>) -> Self {
        Self {
            module,
            num_types: module.num_types() as u32,
            num_funcs: module.num_funcs() as u32,
            num_tables: module.num_tables() as u32,
            num_memories: module.num_memories() as u32,
            num_globals: module.num_globals() as u32,
            num_tags: module.num_tags() as u32,
        }
    }

    fn validate<T: Validate<A>>(&self, value: &T) -> Result<(), Error> {
        value.validate(self)
    }
}

pub(crate) trait Validate<A: Allocator> {
    fn validate(&self, validator: &Validator<A>) -> Result<(), Error>;
}

/// Check the structural invariants of a decoded module.
pub fn validate_module<A: Allocator>(module: &Module<A>) -> Result<(), Error> {
    let validator = Validator::new(module);

    validator.validate(&module.imports)?;
    validator.validate(&module.funcs)?;
    validator.validate(&module.tables)?;
    validator.validate(&module.memories)?;
    validator.validate(&module.tags)?;
    validator.validate(&module.exports)?;
    validate_exports_unique(module)?;
    if let Some(start) = module.start {
        validate_start(&validator, start)?;
    }
    validator.validate(&module.elements)?;
    validator.validate(&module.data)?;

    if !module.code.is_empty() || !module.funcs.is_empty() {
        let funcs = module.funcs.len();
        let bodies = module.code.len();
        if funcs != bodies {
            return Err(Error::FunctionCodeCountMismatch { funcs, bodies });
        }
    }

    if let Some(declared) = module.data_count
        && (declared as usize) != module.data.len()
    {
        return Err(Error::DataCountMismatch {
            declared,
            actual: module.data.len(),
        });
    }

    Ok(())
}

// Export names must be distinct across the whole export section. The
// section order must be preserved for re-encoding, so this is a pairwise
// scan rather than a sort.
fn validate_exports_unique<A: Allocator>(module: &Module<A>) -> Result<(), Error> {
    for (idx, export) in module.exports.iter().enumerate() {
        for earlier in &module.exports[..idx] {
            if earlier.field.as_str() == export.field.as_str() {
                return Err(Error::DuplicateExportName { index: idx as u32 });
            }
        }
    }
    Ok(())
}

// The start function must exist and have the signature `() -> ()`,
// resolved through the full (rec-expanded) type index space.
fn validate_start<A: Allocator>(validator: &Validator<A>, start: FuncIdx) -> Result<(), Error> {
    validator.validate(&start)?;
    let signature = validator
        .module
        .func_type_index(start)
        .and_then(|type_idx| validator.module.func_type_at(type_idx))
        .ok_or(Error::InvalidStartFunction(start))?;
    if !signature.parameters.is_empty() || !signature.results.is_empty() {
        return Err(Error::InvalidStartFunction(start));
    }
    Ok(())
}
