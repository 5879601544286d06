//! Little-endian field cursors used by the record encoders.

use crate::AbiError;

/// Sequential writer over an output buffer that is known to be large enough.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    /// Fails with [`AbiError::BufferSize`] unless `buf` holds at least `expected` bytes.
    pub fn new(buf: &'a mut [u8], expected: usize) -> Result<Self, AbiError> {
        if buf.len() < expected {
            return Err(AbiError::BufferSize {
                expected,
                actual: buf.len(),
            });
        }
        Ok(Self { buf, pos: 0 })
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    pub fn u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.put(&v.to_le_bytes());
    }

    pub const fn position(&self) -> usize {
        self.pos
    }
}

/// Sequential reader over an input buffer of exactly the record's size.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Fails with [`AbiError::BufferSize`] unless `buf` is exactly `expected` bytes long.
    pub const fn new(buf: &'a [u8], expected: usize) -> Result<Self, AbiError> {
        if buf.len() != expected {
            return Err(AbiError::BufferSize {
                expected,
                actual: buf.len(),
            });
        }
        Ok(Self { buf, pos: 0 })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    pub fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }
}
