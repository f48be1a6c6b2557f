//! Big-endian byte streams.

use crate::error::WireError;

/// Destination of a marshal walk. The counting stream and the real writer
/// share every code path through this trait.
pub trait WireSink {
    fn put_bytes(&mut self, bytes: &[u8]);

    fn bytes_written(&self) -> usize;

    fn put_u8(&mut self, v: u8) {
        self.put_bytes(&[v]);
    }

    fn put_be16(&mut self, v: u16) {
        self.put_bytes(&v.to_be_bytes());
    }

    fn put_be32(&mut self, v: u32) {
        self.put_bytes(&v.to_be_bytes());
    }

    fn put_be64(&mut self, v: u64) {
        self.put_bytes(&v.to_be_bytes());
    }
}

#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl WireSink for WireWriter {
    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn bytes_written(&self) -> usize {
        self.buf.len()
    }
}

/// Sizes a body without storing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingStream {
    written: usize,
}

impl CountingStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rewind(&mut self) {
        self.written = 0;
    }
}

impl WireSink for CountingStream {
    fn put_bytes(&mut self, bytes: &[u8]) {
        self.written += bytes.len();
    }

    fn bytes_written(&self) -> usize {
        self.written
    }
}

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::ShortRead {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), WireError> {
        self.read_bytes(n).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn get_be16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn get_be32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn get_be64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_be_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_layout() {
        let mut w = WireWriter::new();
        w.put_u8(1);
        w.put_be16(0x0203);
        w.put_be32(0x0405_0607);
        w.put_be64(0x0809_0a0b_0c0d_0e0f);
        assert_eq!(w.as_slice(), &(1u8..=15).collect::<Vec<u8>>()[..]);

        let mut r = WireReader::new(w.as_slice());
        assert_eq!(r.get_u8().unwrap(), 1);
        assert_eq!(r.get_be16().unwrap(), 0x0203);
        assert_eq!(r.get_be32().unwrap(), 0x0405_0607);
        assert_eq!(r.get_be64().unwrap(), 0x0809_0a0b_0c0d_0e0f);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_read_does_not_advance() {
        let mut r = WireReader::new(&[0, 0, 1]);
        assert!(matches!(
            r.get_be32(),
            Err(WireError::ShortRead { needed: 4, remaining: 3 })
        ));
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn counting_matches_writer() {
        let mut w = WireWriter::new();
        let mut c = CountingStream::new();
        for sink in [&mut w as &mut dyn WireSink, &mut c] {
            sink.put_be32(7);
            sink.put_bytes(b"abc");
        }
        assert_eq!(c.bytes_written(), w.bytes_written());
        c.rewind();
        assert_eq!(c.bytes_written(), 0);
    }
}
