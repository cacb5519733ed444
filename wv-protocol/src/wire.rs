//! Little-endian cursor helpers
//!
//! Every structure in this crate is decoded field by field through [`WireReader`]
//! and encoded through [`WireWriter`]. Padding bytes inserted by the firmware's
//! 4-byte-packed C layout are skipped or zero-filled explicitly at the call site.

use wv_error::{Result, WireViewError};

/// Bounds-checked little-endian reader over a byte slice
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Start reading `buf`, failing with `ShortRead` unless it holds at least `size` bytes
    pub fn with_size(buf: &'a [u8], size: usize) -> Result<Self> {
        if buf.len() < size {
            return Err(WireViewError::ShortRead {
                expected: size,
                actual: buf.len(),
            });
        }
        Ok(Self { buf, pos: 0 })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(WireViewError::ShortRead {
                expected: end,
                actual: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Little-endian writer into a growable buffer
#[derive(Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn pad(&mut self, n: usize) -> &mut Self {
        self.buf.extend(std::iter::repeat(0u8).take(n));
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn i8(&mut self, v: i8) -> &mut Self {
        self.buf.push(v as u8);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Decode a fixed-width ASCII field up to the first NUL
pub fn nul_terminated_ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Uppercase hex rendering used for device UIDs
pub fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_reports_short_read() {
        let buf = [1u8, 2, 3];
        match WireReader::with_size(&buf, 4) {
            Err(WireViewError::ShortRead { expected, actual }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            _ => panic!("expected ShortRead"),
        }
    }

    #[test]
    fn test_reader_little_endian() {
        let buf = [0x34, 0x12, 0xFE, 0xFF, 0x78, 0x56, 0x34, 0x12];
        let mut r = WireReader::with_size(&buf, buf.len()).unwrap();
        assert_eq!(r.u16().unwrap(), 0x1234);
        assert_eq!(r.i16().unwrap(), -2);
        assert_eq!(r.u32().unwrap(), 0x1234_5678);
        assert!(r.u8().is_err());
    }

    #[test]
    fn test_nul_terminated_ascii() {
        assert_eq!(nul_terminated_ascii(b"abc\0def"), "abc");
        assert_eq!(nul_terminated_ascii(b"abc"), "abc");
        assert_eq!(nul_terminated_ascii(b"\0"), "");
    }

    #[test]
    fn test_hex_upper() {
        assert_eq!(hex_upper(&[0x0a, 0xff, 0x00]), "0AFF00");
    }
}
