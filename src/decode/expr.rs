// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The init-expression shuttle.
//!
//! Constant expressions (global initializers, element and data offsets,
//! element expressions, table initializers) are preserved byte-for-byte
//! for re-encoding. The shuttle copies each opcode together with its
//! immediate bytes until the terminating `end`, without interpreting
//! anything. Only the immediates' framing matters here: enough to know how
//! many bytes to carry and to recognise `end`.

use crate::Allocator;
use crate::compat::Vec;
use crate::storage::Stream;
use crate::types::Expression;

use super::{ContextStack, Decoder, Error};

pub(crate) fn shuttle_expression<Storage, A>(
    decoder: &mut Decoder<Storage>,
    _context: &mut ContextStack,
    alloc: &A,
) -> Result<Expression<A>, Error<Storage>>
where
    Storage: Stream,
    A: Allocator + Clone,
{
    let mut bytes = Vec::new_in(alloc.clone());
    loop {
        let op = copy_byte(decoder, &mut bytes)?;
        match op {
            // end
            0x0b => break,
            // i32.const, i64.const, global.get, ref.null, ref.func: one
            // LEB128 immediate; a sign-agnostic byte copy suffices.
            0x41 | 0x42 | 0x23 | 0xd0 | 0xd2 => copy_leb(decoder, &mut bytes)?,
            // f32.const
            0x43 => copy_exact(decoder, &mut bytes, 4)?,
            // f64.const
            0x44 => copy_exact(decoder, &mut bytes, 8)?,
            // SIMD prefix: of the family, only v128.const appears in
            // constant expressions and carries its 16 literal bytes.
            0xfd => {
                let sub = copy_leb_value(decoder, &mut bytes)?;
                if sub == 12 {
                    copy_exact(decoder, &mut bytes, 16)?;
                }
            }
            // GC prefix: the aggregate constructors carry type-index (and
            // count/segment) immediates.
            0xfb => {
                let sub = copy_leb_value(decoder, &mut bytes)?;
                match sub {
                    // struct.new, struct.new_default, array.new,
                    // array.new_default: one type index.
                    0 | 1 | 6 | 7 => copy_leb(decoder, &mut bytes)?,
                    // array.new_fixed: type index and length.
                    // array.new_data, array.new_elem: type index and
                    // segment index.
                    8 | 9 | 10 => {
                        copy_leb(decoder, &mut bytes)?;
                        copy_leb(decoder, &mut bytes)?;
                    }
                    // any.convert_extern, extern.convert_any, ref.i31 and
                    // anything unexpected: no immediates.
                    _ => {}
                }
            }
            // Extended-const arithmetic and anything unexpected: no
            // immediates; the next `end` terminates.
            _ => {}
        }
    }
    Ok(Expression::new(bytes.into_boxed_slice()))
}

fn copy_byte<Storage: Stream, A: Allocator>(
    decoder: &mut Decoder<Storage>,
    out: &mut Vec<u8, A>,
) -> Result<u8, Error<Storage>> {
    let byte = decoder.read_byte_raw()?;
    out.try_reserve(1)?;
    out.push(byte);
    Ok(byte)
}

fn copy_exact<Storage: Stream, A: Allocator>(
    decoder: &mut Decoder<Storage>,
    out: &mut Vec<u8, A>,
    count: usize,
) -> Result<(), Error<Storage>> {
    for _ in 0..count {
        copy_byte(decoder, out)?;
    }
    Ok(())
}

// Copies one LEB128 of either signedness (at most 10 bytes).
fn copy_leb<Storage: Stream, A: Allocator>(
    decoder: &mut Decoder<Storage>,
    out: &mut Vec<u8, A>,
) -> Result<(), Error<Storage>> {
    for _ in 0..10 {
        if copy_byte(decoder, out)? & 0x80 == 0 {
            return Ok(());
        }
    }
    Err(Error::InvalidLeb128)
}

// Copies an unsigned 32-bit LEB128 while also returning its value, for
// sub-opcode dispatch.
fn copy_leb_value<Storage: Stream, A: Allocator>(
    decoder: &mut Decoder<Storage>,
    out: &mut Vec<u8, A>,
) -> Result<u32, Error<Storage>> {
    let mut value = 0u32;
    let mut shift = 0u32;
    for _ in 0..5 {
        let byte = copy_byte(decoder, out)?;
        value |= u32::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(Error::InvalidLeb128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::Global;
    use crate::storage::Buffer;

    fn shuttle(bytes: &[u8]) -> Result<(Expression<Global>, usize), ()> {
        let mut decoder = Decoder::new(Buffer::new(bytes));
        let mut context = ContextStack::default();
        let expr = shuttle_expression(&mut decoder, &mut context, &Global).map_err(|_| ())?;
        Ok((expr, decoder.offset()))
    }

    #[test]
    fn copies_const_expressions_verbatim() {
        let bytes = [0x41, 0x80, 0x01, 0x0b];
        let (expr, consumed) = shuttle(&bytes).unwrap();
        assert_eq!(expr.bytes(), &bytes);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn stops_at_first_end() {
        let bytes = [0x23, 0x05, 0x0b, 0x41, 0x00, 0x0b];
        let (expr, consumed) = shuttle(&bytes).unwrap();
        assert_eq!(expr.bytes(), &bytes[..3]);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn float_immediates_are_not_mistaken_for_end() {
        // f64.const with 0x0b inside the payload.
        let bytes = [0x44, 0x0b, 0x0b, 0x0b, 0x0b, 0x0b, 0x0b, 0x0b, 0x0b, 0x0b];
        let (expr, _) = shuttle(&bytes).unwrap();
        assert_eq!(expr.bytes(), &bytes);
    }

    #[test]
    fn v128_const_copies_16_bytes() {
        let mut bytes = vec![0xfd, 0x0c];
        bytes.extend([0x0b; 16]);
        bytes.push(0x0b);
        let (expr, _) = shuttle(&bytes).unwrap();
        assert_eq!(expr.bytes(), bytes.as_slice());
    }

    #[test]
    fn gc_constructors_carry_their_immediates() {
        // struct.new 3; array.new_fixed 2 11; ref.i31 (after i32.const);
        // end.
        let bytes = [
            0xfb, 0x00, 0x03, //
            0xfb, 0x08, 0x02, 0x0b, //
            0x41, 0x05, 0xfb, 0x1c, //
            0x0b,
        ];
        let (expr, _) = shuttle(&bytes).unwrap();
        assert_eq!(expr.bytes(), &bytes);
    }

    #[test]
    fn extended_const_arithmetic_has_no_immediates() {
        let bytes = [0x41, 0x02, 0x41, 0x03, 0x6a, 0x0b];
        let (expr, _) = shuttle(&bytes).unwrap();
        assert_eq!(expr.bytes(), &bytes);
    }

    #[test]
    fn truncated_expression_fails() {
        assert!(shuttle(&[0x41, 0x80]).is_err());
        assert!(shuttle(&[0x43, 0x00, 0x00]).is_err());
        assert!(shuttle(&[]).is_err());
    }
}
