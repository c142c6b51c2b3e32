// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The module container: one field per section, owning all parsed data.

use crate::Allocator;
use crate::compat::Vec;

use super::{
    CompType, CustomSection, DataSegment, ElementSegment, Export, FuncBody, FuncType, Global,
    FuncIdx, Import, ImportDescriptor, MemType, TagType, Table, TypeDef, TypeIdx,
};

/// A decoded WebAssembly module.
///
/// The module exclusively owns all of its contents; it is built by the
/// decoder, inspected by the encoder and the validator, and dropped as a
/// whole. Raw constant expressions inside globals, elements, tables, and
/// data segments are preserved verbatim.
#[derive(Debug)]
pub struct Module<A: Allocator> {
    /// Flat function signatures, one per function type in the type index
    /// space (for legacy-compatible access).
    pub types: Vec<FuncType<A>, A>,
    /// Rich type definitions; empty unless the module uses GC-era type
    /// forms. Function members are mirrored into `types` in encounter
    /// order.
    pub type_defs: Vec<TypeDef<A>, A>,
    /// Import declarations, in section order.
    pub imports: Vec<Import<A>, A>,
    /// Type indices of the locally-declared functions.
    pub funcs: Vec<TypeIdx, A>,
    /// Table declarations.
    pub tables: Vec<Table<A>, A>,
    /// Memory declarations.
    pub memories: Vec<MemType, A>,
    /// Global declarations.
    pub globals: Vec<Global<A>, A>,
    /// Control tag declarations.
    pub tags: Vec<TagType, A>,
    /// Export declarations, in section order.
    pub exports: Vec<Export<A>, A>,
    /// The start function, if any.
    pub start: Option<FuncIdx>,
    /// Element segments.
    pub elements: Vec<ElementSegment<A>, A>,
    /// Function bodies; must pair up with `funcs`.
    pub code: Vec<FuncBody<A>, A>,
    /// Data segments.
    pub data: Vec<DataSegment<A>, A>,
    /// The declared data segment count, when a data-count section was
    /// present.
    pub data_count: Option<u32>,
    /// Custom sections, in encounter order.
    pub custom_sections: Vec<CustomSection<A>, A>,
}

impl<A: Allocator + Clone> Module<A> {
    /// Creates an empty module allocating from `alloc`.
    pub fn empty_in(alloc: A) -> Self {
        Self {
            types: Vec::new_in(alloc.clone()),
            type_defs: Vec::new_in(alloc.clone()),
            imports: Vec::new_in(alloc.clone()),
            funcs: Vec::new_in(alloc.clone()),
            tables: Vec::new_in(alloc.clone()),
            memories: Vec::new_in(alloc.clone()),
            globals: Vec::new_in(alloc.clone()),
            tags: Vec::new_in(alloc.clone()),
            exports: Vec::new_in(alloc.clone()),
            start: None,
            elements: Vec::new_in(alloc.clone()),
            code: Vec::new_in(alloc.clone()),
            data: Vec::new_in(alloc.clone()),
            data_count: None,
            custom_sections: Vec::new_in(alloc),
        }
    }
}

impl<A: Allocator> Module<A> {
    /// The number of entries in the type index space. Rec groups count one
    /// slot per member.
    pub fn num_types(&self) -> usize {
        if self.type_defs.is_empty() {
            self.types.len()
        } else {
            self.type_defs.iter().map(TypeDef::index_slots).sum()
        }
    }

    /// The number of imports of the given kind, as selected by `pred`.
    fn count_imports(&self, pred: fn(&ImportDescriptor) -> bool) -> usize {
        self.imports
            .iter()
            .filter(|import| pred(&import.descriptor))
            .count()
    }

    /// The number of imported functions.
    pub fn num_imported_funcs(&self) -> usize {
        self.count_imports(|desc| matches!(desc, ImportDescriptor::Function(_)))
    }

    /// The size of the function index space (imports first).
    pub fn num_funcs(&self) -> usize {
        self.num_imported_funcs() + self.funcs.len()
    }

    /// The size of the table index space.
    pub fn num_tables(&self) -> usize {
        self.count_imports(|desc| matches!(desc, ImportDescriptor::Table(_))) + self.tables.len()
    }

    /// The size of the memory index space.
    pub fn num_memories(&self) -> usize {
        self.count_imports(|desc| matches!(desc, ImportDescriptor::Memory(_)))
            + self.memories.len()
    }

    /// The size of the global index space.
    pub fn num_globals(&self) -> usize {
        self.count_imports(|desc| matches!(desc, ImportDescriptor::Global(_))) + self.globals.len()
    }

    /// The size of the tag index space.
    pub fn num_tags(&self) -> usize {
        self.count_imports(|desc| matches!(desc, ImportDescriptor::Tag(_))) + self.tags.len()
    }

    /// Looks up the function signature at the given slot of the type index
    /// space, expanding rec groups. Returns None for out-of-range indices
    /// and for non-function definitions.
    pub fn func_type_at(&self, idx: TypeIdx) -> Option<&FuncType<A>> {
        let idx = *idx as usize;
        if self.type_defs.is_empty() {
            return self.types.get(idx);
        }

        let mut slot = 0;
        for def in &self.type_defs {
            let slots = def.index_slots();
            if idx < slot + slots {
                return match def {
                    TypeDef::Func(func) => Some(func),
                    TypeDef::Sub(sub) => match &sub.comp {
                        CompType::Func(func) => Some(func),
                        _ => None,
                    },
                    TypeDef::Rec(subs) => match &subs[idx - slot].comp {
                        CompType::Func(func) => Some(func),
                        _ => None,
                    },
                };
            }
            slot += slots;
        }
        None
    }

    /// Resolves a function index to its declared type index, looking
    /// through imports first.
    pub fn func_type_index(&self, func: FuncIdx) -> Option<TypeIdx> {
        let mut remaining = *func as usize;
        for import in &self.imports {
            if let ImportDescriptor::Function(type_idx) = import.descriptor {
                if remaining == 0 {
                    return Some(type_idx);
                }
                remaining -= 1;
            }
        }
        self.funcs.get(remaining).copied()
    }
}
