// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Allocator-API compatibility shim.
//!
//! On nightly toolchains the real `core`/`alloc` allocator APIs are used; on
//! stable, `allocator-api2` stands in for them. Everything the rest of the
//! crate needs is re-exported here under one path.
//!
//! The `nightly` cfg value is auto-detected and set in the crate's build
//! script.

#[cfg(nightly)]
pub use ::alloc::{alloc::Global, boxed::Box, collections::TryReserveError, vec::Vec};

#[cfg(nightly)]
pub use core::alloc::Allocator;

#[cfg(not(nightly))]
pub use allocator_api2::{
    alloc::{Allocator, Global},
    boxed::Box,
    collections::TryReserveError,
    vec::Vec,
};
