// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! A byte-accurate codec for the WebAssembly binary module format.
//!
//! lamina decodes a `.wasm` byte stream into an owned [`Module`] and
//! re-encodes that value back to the wire format. Constant expressions are
//! preserved verbatim so that round-trips are exact, and a structural
//! validator checks index bounds and section invariants without
//! type-checking function bodies.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let bytes: Vec<u8> = Vec::new();
//! let module = lamina::parse_module(&bytes, &lamina::ParseOptions::default())
//!     .map_err(|err| format!("{err:?}"))?;
//! let rebuilt = lamina::encode_module(&module).map_err(|err| format!("{err:?}"))?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(nightly, feature(allocator_api))]

#[cfg(nightly)]
extern crate alloc;

pub mod compat;
pub mod decode;
pub mod encode;
pub mod storage;
pub mod types;
pub mod validate;

use core::fmt;

pub use compat::{Allocator, Global};
pub use decode::decode_expression;
pub use encode::{encode_instructions, encode_module_in};
pub use types::Module;
pub use validate::validate_module;

use compat::Vec;
use storage::{Buffer, Stream};

/// Options for [`parse_module`] and [`parse_module_in`].
#[derive(Clone, Copy, Debug)]
pub struct ParseOptions {
    /// Run the structural validator after a successful decode.
    pub validate: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

/// A decoding or validation failure from [`parse_module`].
pub enum ModuleError<Storage: Stream> {
    Parse(decode::ErrorWithContext<Storage>),
    Validate(validate::Error),
}

impl<Storage: Stream> fmt::Debug for ModuleError<Storage> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "{err:?}"),
            Self::Validate(err) => write!(f, "{err:?}"),
        }
    }
}

/// Parse a module from a contiguous byte buffer, allocating from the
/// global allocator.
pub fn parse_module<Bytes: AsRef<[u8]>>(
    bytes: Bytes,
    options: &ParseOptions,
) -> Result<Module<Global>, ModuleError<Buffer<Bytes>>> {
    parse_module_in(bytes, options, Global)
}

/// Parse a module from a contiguous byte buffer, allocating from `alloc`.
pub fn parse_module_in<Bytes, A>(
    bytes: Bytes,
    options: &ParseOptions,
    alloc: A,
) -> Result<Module<A>, ModuleError<Buffer<Bytes>>>
where
    Bytes: AsRef<[u8]>,
    A: Allocator + Clone,
{
    let module = decode::parse_module_in(Buffer::new(bytes), alloc).map_err(ModuleError::Parse)?;
    if options.validate {
        validate::validate_module(&module).map_err(ModuleError::Validate)?;
    }
    Ok(module)
}

/// Encode a module back to the binary format.
pub fn encode_module<A: Allocator + Clone + Default>(
    module: &Module<A>,
) -> Result<Vec<u8, A>, encode::Error> {
    encode::encode_module_in(module, A::default())
}

impl<A: Allocator> Module<A> {
    /// Check this module's structural invariants.
    pub fn validate(&self) -> Result<(), validate::Error> {
        validate::validate_module(self)
    }
}
