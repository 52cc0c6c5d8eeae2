//! Bounded, fail-closed access to intercepted buffers.

use bytes::Bytes;

use crate::error::DecodeError;
use crate::types::{ConnTuple, PATH_MAX};

/// Copy `dst.len()` bytes starting at `at` out of a buffer whose backing
/// memory may end before its declared length. Fails instead of reading
/// unbacked memory.
pub fn read_from_user_buffer(dst: &mut [u8], src: &[u8], at: u32) -> Result<(), DecodeError> {
    let start = at as usize;
    let bytes = start
        .checked_add(dst.len())
        .and_then(|end| src.get(start..end))
        .ok_or(DecodeError::Fault { offset: at })?;
    dst.copy_from_slice(bytes);
    Ok(())
}

/// Random-access view over an input buffer with a current offset and a
/// declared length.
///
/// Reads never move the offset; callers advance explicitly. Any read whose
/// span crosses the declared length fails, and the offset never ends up past
/// the declared length.
#[derive(Debug, Clone)]
pub struct BoundedReader {
    buf: Bytes,
    len: u32,
    off: u32,
}

impl BoundedReader {
    /// Reader whose declared length is the physical buffer length.
    pub fn new(buf: impl Into<Bytes>) -> Self {
        let buf = buf.into();
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        Self { buf, len, off: 0 }
    }

    /// Override the declared length. A declared length beyond the physical
    /// buffer models a user pointer whose tail is not mapped: reads there
    /// fail with [`DecodeError::Fault`].
    pub fn with_declared_len(mut self, len: u32) -> Self {
        self.len = len;
        self.off = self.off.min(len);
        self
    }

    pub fn with_offset(mut self, off: u32) -> Self {
        self.set_offset(off);
        self
    }

    pub fn offset(&self) -> u32 {
        self.off
    }

    /// Move to an absolute offset, clamped to the declared length.
    pub fn set_offset(&mut self, off: u32) {
        self.off = off.min(self.len);
    }

    /// Declared length.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> u32 {
        self.len - self.off
    }

    /// True if `n` bytes starting at the current offset lie within the
    /// declared length.
    pub fn fits(&self, n: u32) -> bool {
        u64::from(self.off) + u64::from(n) <= u64::from(self.len)
    }

    /// Copy exactly `dst.len()` bytes from the current offset.
    pub fn read_fixed(&self, dst: &mut [u8]) -> Result<(), DecodeError> {
        let needed = u32::try_from(dst.len()).unwrap_or(u32::MAX);
        if !self.fits(needed) {
            return Err(self.truncated(needed));
        }
        read_from_user_buffer(dst, &self.buf, self.off)
    }

    /// The byte at the current offset.
    pub fn read_u8(&self) -> Result<u8, DecodeError> {
        let mut byte = [0u8; 1];
        self.read_fixed(&mut byte)?;
        Ok(byte[0])
    }

    /// The byte at the current offset, then step past it.
    pub fn next_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = self.read_u8()?;
        self.off += 1;
        Ok(byte)
    }

    /// Skip `n` bytes. Skipping past the declared length parks the offset at
    /// the end and fails.
    pub fn advance(&mut self, n: u32) -> Result<(), DecodeError> {
        if !self.fits(n) {
            let err = self.truncated(n);
            self.off = self.len;
            return Err(err);
        }
        self.off += n;
        Ok(())
    }

    /// Fixed-width copy of `PATH_MAX` bytes starting at `offset`.
    ///
    /// Best effort: bytes outside the declared length or the backing memory
    /// are left zeroed, so the result never carries stale data.
    pub fn read_path(&self, offset: u32) -> [u8; PATH_MAX] {
        let mut dst = [0u8; PATH_MAX];
        let start = offset as usize;
        let end = start
            .saturating_add(PATH_MAX)
            .min(self.len as usize)
            .min(self.buf.len());
        if start < end {
            dst[..end - start].copy_from_slice(&self.buf[start..end]);
        }
        dst
    }

    fn truncated(&self, needed: u32) -> DecodeError {
        DecodeError::Truncated {
            offset: self.off,
            needed,
            len: self.len,
        }
    }
}

/// One delivery of decrypted bytes on a TLS-protected connection.
#[derive(Debug, Clone)]
pub struct TlsInput {
    pub reader: BoundedReader,
    pub tuple: ConnTuple,
    /// Transport attributes forwarded untouched into completion events.
    pub tags: u64,
}

impl TlsInput {
    pub fn new(tuple: ConnTuple, buf: impl Into<Bytes>, tags: u64) -> Self {
        Self {
            reader: BoundedReader::new(buf),
            tuple,
            tags,
        }
    }

    pub fn with_reader(tuple: ConnTuple, reader: BoundedReader, tags: u64) -> Self {
        Self { reader, tuple, tags }
    }
}
