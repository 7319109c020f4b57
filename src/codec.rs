//! Big-endian put primitives and length back-writing.
//!
//! Parsing goes through `nom`; this module covers the encoding side, where
//! TLS needs vectors whose length prefix is only known once the body has
//! been written.

use crate::buffer::Buf;
use crate::Error;

/// Position of a length prefix that is filled in later.
#[derive(Debug, Clone, Copy)]
#[must_use = "an opened length must be closed"]
pub(crate) struct LengthMark {
    pos: usize,
    width: usize,
}

pub(crate) trait BufExt {
    fn put_u8(&mut self, v: u8);
    fn put_u16(&mut self, v: u16);
    fn put_u32(&mut self, v: u32);

    /// Reserve a `width` byte length prefix, 1 to 3 bytes.
    fn open_length(&mut self, width: usize) -> LengthMark;

    /// Write the number of bytes appended since `mark` into its prefix.
    fn close_length(&mut self, mark: LengthMark) -> Result<usize, Error>;

    /// Overwrite a big-endian value of `width` bytes at `pos`.
    fn put_at(&mut self, pos: usize, width: usize, value: usize) -> Result<(), Error>;

    /// Write `data` prefixed by its length in `width` bytes.
    fn put_vec(&mut self, width: usize, data: &[u8]) -> Result<(), Error>;
}

impl BufExt for Buf {
    fn put_u8(&mut self, v: u8) {
        self.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn open_length(&mut self, width: usize) -> LengthMark {
        debug_assert!((1..=3).contains(&width));
        let pos = self.len();
        self.resize(pos + width, 0);
        LengthMark { pos, width }
    }

    fn close_length(&mut self, mark: LengthMark) -> Result<usize, Error> {
        let len = self.len() - mark.pos - mark.width;
        self.put_at(mark.pos, mark.width, len)?;
        Ok(len)
    }

    fn put_at(&mut self, pos: usize, width: usize, value: usize) -> Result<(), Error> {
        if value >> (8 * width) != 0 {
            return Err(Error::Internal(format!(
                "length {} does not fit in {} bytes",
                value, width
            )));
        }
        let end = pos + width;
        if end > self.len() {
            return Err(Error::Internal("length prefix out of bounds".into()));
        }
        let bytes = (value as u32).to_be_bytes();
        self[pos..end].copy_from_slice(&bytes[4 - width..]);
        Ok(())
    }

    fn put_vec(&mut self, width: usize, data: &[u8]) -> Result<(), Error> {
        let mark = self.open_length(width);
        self.extend_from_slice(data);
        self.close_length(mark).map(|_| ())
    }
}

/// Fail with a decode error unless the parser consumed everything.
pub(crate) fn expect_empty(rest: &[u8], what: &str) -> Result<(), Error> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(Error::Decode(format!(
            "{} has {} trailing bytes",
            what,
            rest.len()
        )))
    }
}
