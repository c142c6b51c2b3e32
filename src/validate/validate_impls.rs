// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use crate::Allocator;
use crate::compat::Vec;
use crate::types::*;

use super::{Error, Validate, Validator};

macro_rules! impl_validate_for_idx {
    ($idx_type:ty, $id:path, $capacity:ident) => {
        impl<A: Allocator> Validate<A> for $idx_type {
            fn validate(&self, validator: &Validator<A>) -> Result<(), Error> {
                let index: u32 = **self;
                let capacity = validator.$capacity;
                if index >= capacity {
                    Err(Error::IndexOutOfBounds {
                        id: $id,
                        index,
                        capacity,
                    })
                } else {
                    Ok(())
                }
            }
        }
    };
}

impl_validate_for_idx!(TypeIdx, SectionId::Type, num_types);
impl_validate_for_idx!(FuncIdx, SectionId::Function, num_funcs);
impl_validate_for_idx!(TableIdx, SectionId::Table, num_tables);
impl_validate_for_idx!(MemIdx, SectionId::Memory, num_memories);
impl_validate_for_idx!(GlobalIdx, SectionId::Global, num_globals);
impl_validate_for_idx!(TagIdx, SectionId::Tag, num_tags);

impl<T: Validate<A>, A: Allocator> Validate<A> for Vec<T, A> {
    fn validate(&self, validator: &Validator<A>) -> Result<(), Error> {
        for elem in self {
            validator.validate(elem)?;
        }
        Ok(())
    }
}

impl<A: Allocator> Validate<A> for Limits {
    fn validate(&self, _validator: &Validator<A>) -> Result<(), Error> {
        if let Some(max) = self.max
            && self.min > max
        {
            return Err(Error::LimitsMinExceedsMax(*self));
        }
        Ok(())
    }
}

impl<A: Allocator> Validate<A> for MemType {
    fn validate(&self, validator: &Validator<A>) -> Result<(), Error> {
        let limits = **self;
        if limits.shared && limits.max.is_none() {
            return Err(Error::SharedMemoryWithoutMax(limits));
        }
        validator.validate(&limits)?;
        let cap = self.page_cap();
        if limits.min > cap || limits.max.is_some_and(|max| max > cap) {
            return Err(Error::MemoryTooLarge(limits));
        }
        Ok(())
    }
}

impl<A: Allocator> Validate<A> for TableType {
    fn validate(&self, validator: &Validator<A>) -> Result<(), Error> {
        validator.validate(&self.limits)
    }
}

impl<A: Allocator> Validate<A> for Table<A> {
    fn validate(&self, validator: &Validator<A>) -> Result<(), Error> {
        validator.validate(&self.ty)
    }
}

impl<A: Allocator> Validate<A> for TagType {
    fn validate(&self, validator: &Validator<A>) -> Result<(), Error> {
        validator.validate(&self.ty)
    }
}

impl<A: Allocator> Validate<A> for Import<A> {
    fn validate(&self, validator: &Validator<A>) -> Result<(), Error> {
        match &self.descriptor {
            ImportDescriptor::Function(type_idx) => validator.validate(type_idx),
            ImportDescriptor::Table(table) => validator.validate(table),
            ImportDescriptor::Memory(memory) => validator.validate(memory),
            ImportDescriptor::Global(_) => Ok(()), // A GlobalType is always valid.
            ImportDescriptor::Tag(tag) => validator.validate(tag),
        }
    }
}

impl<A: Allocator> Validate<A> for Export<A> {
    fn validate(&self, validator: &Validator<A>) -> Result<(), Error> {
        match &self.descriptor {
            ExportDescriptor::Function(idx) => validator.validate(idx),
            ExportDescriptor::Table(idx) => validator.validate(idx),
            ExportDescriptor::Memory(idx) => validator.validate(idx),
            ExportDescriptor::Global(idx) => validator.validate(idx),
            ExportDescriptor::Tag(idx) => validator.validate(idx),
        }
    }
}

impl<A: Allocator> Validate<A> for ElementSegment<A> {
    fn validate(&self, validator: &Validator<A>) -> Result<(), Error> {
        if let ElementInit::Functions(funcs) = &self.init {
            validator.validate(funcs)?;
        }
        if self.is_active() {
            validator.validate(&self.table_index())?;
        }
        Ok(())
    }
}

impl<A: Allocator> Validate<A> for DataSegment<A> {
    fn validate(&self, validator: &Validator<A>) -> Result<(), Error> {
        if self.is_active() {
            validator.validate(&self.memory_index())?;
        }
        Ok(())
    }
}
