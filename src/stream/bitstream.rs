//! MSB-first bit buffering over a byte stream (§4.1 "BitStream"), grounded
//! in `destructify.parsing.bitstream.BitStream`. Deliberately does *not*
//! implement `std::io::{Read, Write, Seek}` — byte-level operations need to
//! report `MISALIGNED` through this crate's own `Result`, which an `io::Read`
//! impl can't express. Decode-side and encode-side methods live in separate
//! `impl` blocks so callers only need the bound their direction requires.

use crate::error::{Error, Result};
use std::io::{Read, Seek, SeekFrom, Write};

pub struct BitStream<S> {
    inner: S,
    /// Pending bits not yet consumed/flushed, MSB-first.
    bits: Vec<bool>,
}

impl<S> BitStream<S> {
    pub fn new(inner: S) -> Self {
        BitStream {
            inner,
            bits: Vec::new(),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn is_aligned(&self) -> bool {
        self.bits.is_empty()
    }

    /// Drops any pending, unconsumed bits without flushing them.
    pub fn discard_bits(&mut self) {
        self.bits.clear();
    }

    pub fn ensure_aligned(&self, path: &str) -> Result<()> {
        if self.is_aligned() {
            Ok(())
        } else {
            Err(Error::misaligned(path))
        }
    }
}

impl<S: Read + Seek> BitStream<S> {
    pub fn read_bits(&mut self, n: usize, path: &str) -> Result<Vec<bool>> {
        while self.bits.len() < n {
            let mut byte = [0u8; 1];
            let got = self.inner.read(&mut byte).map_err(|e| Error::io(path, e))?;
            if got == 0 {
                return Err(Error::stream_exhausted(path, n, self.bits.len()));
            }
            for i in (0..8).rev() {
                self.bits.push((byte[0] >> i) & 1 == 1);
            }
        }
        Ok(self.bits.drain(0..n).collect())
    }

    pub fn read_uint(&mut self, n: usize, path: &str) -> Result<u64> {
        let bits = self.read_bits(n, path)?;
        Ok(bits.iter().fold(0u64, |acc, &b| (acc << 1) | b as u64))
    }

    pub fn read_bytes(&mut self, n: usize, path: &str) -> Result<Vec<u8>> {
        self.read_bytes_opt(n, path, false)
    }

    /// Reads up to `n` bytes. When `lenient` is true and the stream runs
    /// short, returns however many bytes were actually available instead of
    /// failing `STREAM_EXHAUSTED` — the `strict=false` degrade path (§4.3.1).
    pub fn read_bytes_opt(&mut self, n: usize, path: &str, lenient: bool) -> Result<Vec<u8>> {
        self.ensure_aligned(path)?;
        let mut buf = vec![0u8; n];
        let mut total = 0;
        while total < n {
            let got = self.inner.read(&mut buf[total..]).map_err(|e| Error::io(path, e))?;
            if got == 0 {
                break;
            }
            total += got;
        }
        if total < n {
            if lenient {
                buf.truncate(total);
                return Ok(buf);
            }
            return Err(Error::stream_exhausted(path, n, total));
        }
        Ok(buf)
    }
}

impl<S: Seek> BitStream<S> {
    pub fn seek(&mut self, pos: SeekFrom, path: &str) -> Result<u64> {
        self.discard_bits();
        self.inner.seek(pos).map_err(|e| Error::io(path, e))
    }

    pub fn stream_position(&mut self, path: &str) -> Result<u64> {
        self.inner
            .seek(SeekFrom::Current(0))
            .map_err(|e| Error::io(path, e))
    }
}

impl<S: Write + Seek> BitStream<S> {
    pub fn write_bits(&mut self, bits: &[bool], path: &str) -> Result<()> {
        self.bits.extend_from_slice(bits);
        while self.bits.len() >= 8 {
            let byte_bits: Vec<bool> = self.bits.drain(0..8).collect();
            let byte = byte_bits.iter().fold(0u8, |acc, &b| (acc << 1) | b as u8);
            self.inner
                .write_all(&[byte])
                .map_err(|e| Error::io(path, e))?;
        }
        Ok(())
    }

    pub fn write_uint(&mut self, value: u64, n: usize, path: &str) -> Result<()> {
        let bits: Vec<bool> = (0..n).rev().map(|i| (value >> i) & 1 == 1).collect();
        self.write_bits(&bits, path)
    }

    /// Zero-pads any pending bits to a full byte and flushes it. Must be
    /// called before a `BitField` run ends and a byte-aligned field follows.
    pub fn finalize(&mut self, path: &str) -> Result<()> {
        if self.bits.is_empty() {
            return Ok(());
        }
        let pad = 8 - self.bits.len();
        self.bits.extend(std::iter::repeat(false).take(pad));
        let byte_bits: Vec<bool> = self.bits.drain(0..8).collect();
        let byte = byte_bits.iter().fold(0u8, |acc, &b| (acc << 1) | b as u8);
        self.inner
            .write_all(&[byte])
            .map_err(|e| Error::io(path, e))
    }

    pub fn write_bytes(&mut self, data: &[u8], path: &str) -> Result<()> {
        self.ensure_aligned(path)?;
        self.inner.write_all(data).map_err(|e| Error::io(path, e))
    }

    pub fn flush(&mut self, path: &str) -> Result<()> {
        self.inner.flush().map_err(|e| Error::io(path, e))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_unaligned_bit_runs() {
        let mut buf = Vec::new();
        {
            let mut bs = BitStream::new(Cursor::new(&mut buf));
            bs.write_uint(0b101, 3, "").unwrap();
            bs.write_uint(0b11110000, 8, "").unwrap();
            bs.finalize("").unwrap();
        }
        let mut bs = BitStream::new(Cursor::new(&buf));
        assert_eq!(bs.read_uint(3, "").unwrap(), 0b101);
        assert_eq!(bs.read_uint(8, "").unwrap(), 0b11110000);
    }

    #[test]
    fn byte_read_requires_alignment() {
        let mut bs = BitStream::new(Cursor::new(vec![0xffu8]));
        bs.read_bits(3, "").unwrap();
        assert!(matches!(
            bs.read_bytes(1, "field").unwrap_err(),
            Error::Misaligned { .. }
        ));
    }
}
