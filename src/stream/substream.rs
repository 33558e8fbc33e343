//! A bounded view over an underlying stream (§4.1 "Substream"), grounded in
//! `destructify.parsing.substream.Substream`: reads/writes/seeks are offset
//! by a fixed `start` and the local position is clamped into `[0, length]`
//! when a `length` is known.

use std::io::{self, Read, Seek, SeekFrom, Write};

pub struct Substream<S> {
    inner: S,
    start: u64,
    length: Option<u64>,
    position: u64,
}

impl<S> Substream<S> {
    pub fn new(inner: S, start: u64, length: Option<u64>) -> Self {
        Substream {
            inner,
            start,
            length,
            position: 0,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Bytes left before this substream's bound, if it has one.
    pub fn remaining(&self) -> Option<u64> {
        self.length.map(|len| len.saturating_sub(self.position))
    }

    fn clamp(&self, pos: i64) -> u64 {
        let pos = pos.max(0) as u64;
        match self.length {
            Some(len) => pos.min(len),
            None => pos,
        }
    }
}

impl<S: Read + Seek> Read for Substream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let cap = match self.remaining() {
            Some(rem) => rem.min(buf.len() as u64) as usize,
            None => buf.len(),
        };
        if cap == 0 {
            return Ok(0);
        }
        self.inner.seek(SeekFrom::Start(self.start + self.position))?;
        let n = self.inner.read(&mut buf[..cap])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: Write + Seek> Write for Substream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let cap = match self.remaining() {
            Some(rem) => rem.min(buf.len() as u64) as usize,
            None => buf.len(),
        };
        self.inner.seek(SeekFrom::Start(self.start + self.position))?;
        let n = self.inner.write(&buf[..cap])?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: Seek> Seek for Substream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => self.clamp(p as i64),
            SeekFrom::Current(delta) => self.clamp(self.position as i64 + delta),
            SeekFrom::End(delta) => match self.length {
                Some(len) => self.clamp(len as i64 + delta),
                None => {
                    let abs = self.inner.seek(SeekFrom::End(delta))?;
                    self.position = abs.saturating_sub(self.start);
                    return Ok(self.position);
                }
            },
        };
        self.position = target;
        Ok(self.position)
    }
}
