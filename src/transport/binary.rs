//! Big-endian binary reader/writer with the protocol's length-prefix rules.

use crate::error::FrameError;

/// How a length prefix is written in front of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    /// u16 prefix counting its own two bytes.
    U16WithSelf,
    /// u32 prefix counting its own four bytes.
    U32WithSelf,
    /// u32 prefix counting only the field.
    U32,
}

impl Prefix {
    fn width(self) -> usize {
        match self {
            Self::U16WithSelf => 2,
            Self::U32WithSelf | Self::U32 => 4,
        }
    }

    fn includes_self(self) -> bool {
        !matches!(self, Self::U32)
    }
}

/// Append-only frame builder.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn put_prefixed(&mut self, bytes: &[u8], prefix: Prefix) -> &mut Self {
        self.put_length(bytes.len(), prefix);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn put_prefixed_str(&mut self, s: &str, prefix: Prefix) -> &mut Self {
        self.put_prefixed(s.as_bytes(), prefix)
    }

    /// Writes whatever `body` produces behind a length prefix covering it.
    pub fn put_section(
        &mut self,
        prefix: Prefix,
        body: impl FnOnce(&mut BinaryWriter),
    ) -> &mut Self {
        let mut inner = BinaryWriter::new();
        body(&mut inner);
        self.put_prefixed(&inner.buf, prefix)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn put_length(&mut self, len: usize, prefix: Prefix) {
        let declared = if prefix.includes_self() {
            len + prefix.width()
        } else {
            len
        };
        match prefix {
            Prefix::U16WithSelf => self.buf.extend_from_slice(&(declared as u16).to_be_bytes()),
            Prefix::U32WithSelf | Prefix::U32 => {
                self.buf.extend_from_slice(&(declared as u32).to_be_bytes())
            }
        }
    }
}

/// Bounds-checked cursor over a received frame.
#[derive(Debug)]
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, FrameError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, FrameError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, FrameError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FrameError> {
        self.take(len)
    }

    /// Everything left in the buffer.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn read_prefixed(&mut self, prefix: Prefix) -> Result<&'a [u8], FrameError> {
        let declared = match prefix {
            Prefix::U16WithSelf => self.read_u16()? as u32,
            Prefix::U32WithSelf | Prefix::U32 => self.read_u32()?,
        };
        let len = if prefix.includes_self() {
            (declared as usize)
                .checked_sub(prefix.width())
                .ok_or(FrameError::BadPrefix {
                    declared,
                    width: prefix.width(),
                })?
        } else {
            declared as usize
        };
        self.take(len)
    }

    pub fn read_prefixed_string(
        &mut self,
        prefix: Prefix,
        field: &'static str,
    ) -> Result<String, FrameError> {
        let bytes = self.read_prefixed(prefix)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::InvalidUtf8(field))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FrameError> {
        if len > self.remaining() {
            return Err(FrameError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}
