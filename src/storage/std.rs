// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// Any seekable `std::io` reader can back the decoder. Seeking is what
/// makes `offset`, `skip_bytes`, and `reset` possible, so plain `Read` is
/// not enough.
impl<R: Read + Seek> super::Stream for R {
    type Error = std::io::Error;

    fn is_eof(err: &Self::Error) -> bool {
        matches!(err.kind(), ErrorKind::UnexpectedEof)
    }

    fn offset(&mut self) -> usize {
        let position = self.stream_position().expect("stream position unavailable");
        usize::try_from(position).expect("stream position exceeds the address space")
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut byte = [0u8];
        Read::read_exact(self, &mut byte).map(|()| byte[0])
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        Read::read_exact(self, buf)
    }

    fn skip_bytes(&mut self, count: usize) -> Result<(), Self::Error> {
        let delta = i64::try_from(count).expect("skip length exceeds the seek range");
        self.seek_relative(delta)
    }

    fn reset(&mut self, offset: usize) -> Result<(), Self::Error> {
        self.seek(SeekFrom::Start(offset as u64)).map(|_| ())
    }
}
