// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! LEB128 encoding.

use crate::Allocator;
use crate::compat::{TryReserveError, Vec};

/// Appends the unsigned LEB128 encoding of `value`.
pub(crate) fn write_unsigned<A: Allocator>(
    out: &mut Vec<u8, A>,
    mut value: u64,
) -> Result<(), TryReserveError> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        out.try_reserve(1)?;
        if value == 0 {
            out.push(byte);
            return Ok(());
        }
        out.push(byte | 0x80);
    }
}

/// Appends the signed LEB128 encoding of `value`.
///
/// Emission stops once the remaining value is 0 with the sign bit clear,
/// or -1 with the sign bit set.
pub(crate) fn write_signed<A: Allocator>(
    out: &mut Vec<u8, A>,
    mut value: i64,
) -> Result<(), TryReserveError> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        out.try_reserve(1)?;
        if done {
            out.push(byte);
            return Ok(());
        }
        out.push(byte | 0x80);
    }
}
