//! Mirrors every byte read or written through it into an offset-keyed
//! buffer, so a later field (e.g. a trailing CRC) can recover the exact raw
//! bytes of fields that already ran through decoders/encoders (§8 scenario
//! 4, "constant + CRC"). Grounded in the same need `destructify` meets by
//! letting a field's `decoder` see the pre-decode bytes — here made general
//! since this engine's decoders aren't guaranteed reversible.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

/// A shared handle to the captured bytes, independent of the
/// [`CaptureStream`] wrapper's own lifetime so the driver can keep reading
/// out of it after the wrapper guarding a given field has been dropped.
#[derive(Clone, Default)]
pub struct CaptureBuf(Rc<RefCell<BTreeMap<u64, u8>>>);

impl CaptureBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the captured bytes in `[start, end)`, substituting `0` for
    /// any offset that was never observed by a capturing read/write.
    pub fn bytes_in_range(&self, start: u64, end: u64) -> Vec<u8> {
        let map = self.0.borrow();
        (start..end).map(|off| *map.get(&off).unwrap_or(&0)).collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

pub struct CaptureStream<S> {
    inner: S,
    buf: CaptureBuf,
}

impl<S> CaptureStream<S> {
    pub fn new(inner: S, buf: CaptureBuf) -> Self {
        CaptureStream { inner, buf }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn buf(&self) -> &CaptureBuf {
        &self.buf
    }
}

impl<S: Read + Seek> Read for CaptureStream<S> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let start = self.inner.stream_position()?;
        let n = self.inner.read(out)?;
        let mut map = self.buf.0.borrow_mut();
        for (i, b) in out[..n].iter().enumerate() {
            map.insert(start + i as u64, *b);
        }
        Ok(n)
    }
}

impl<S: Write + Seek> Write for CaptureStream<S> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let start = self.inner.stream_position()?;
        let n = self.inner.write(data)?;
        let mut map = self.buf.0.borrow_mut();
        for (i, b) in data[..n].iter().enumerate() {
            map.insert(start + i as u64, *b);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: Seek> Seek for CaptureStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn captures_reads_at_absolute_offsets() {
        let buf = CaptureBuf::new();
        let mut cs = CaptureStream::new(Cursor::new(vec![1, 2, 3, 4]), buf.clone());
        let mut out = [0u8; 2];
        cs.seek(SeekFrom::Start(1)).unwrap();
        cs.read_exact(&mut out).unwrap();
        assert_eq!(buf.bytes_in_range(0, 4), vec![0, 2, 3, 0]);
    }
}
