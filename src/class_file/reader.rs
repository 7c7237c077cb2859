use crate::Error;
use byteorder::{BigEndian, ReadBytesExt};

/// Big-endian cursor over the raw class bytes
///
/// Every multi-byte quantity in the class file format is big endian. Reads
/// are bounds checked and failures carry the offset at which the input ran
/// out, for diagnostics.
pub struct ClassReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> ClassReader<'a> {
        ClassReader { bytes, offset: 0 }
    }

    /// Offset of the next unread byte
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn eof(&self) -> Error {
        Error::UnexpectedEndOfInput {
            offset: self.offset,
        }
    }

    /// Take the next `n` bytes as a slice
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < n {
            return Err(self.eof());
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        let mut rest = &self.bytes[self.offset..];
        let value = rest.read_u8().map_err(|_| self.eof())?;
        self.offset += 1;
        Ok(value)
    }

    pub fn u16(&mut self) -> Result<u16, Error> {
        let mut rest = &self.bytes[self.offset..];
        let value = rest.read_u16::<BigEndian>().map_err(|_| self.eof())?;
        self.offset += 2;
        Ok(value)
    }

    pub fn u32(&mut self) -> Result<u32, Error> {
        let mut rest = &self.bytes[self.offset..];
        let value = rest.read_u32::<BigEndian>().map_err(|_| self.eof())?;
        self.offset += 4;
        Ok(value)
    }

    pub fn i32(&mut self) -> Result<i32, Error> {
        Ok(self.u32()? as i32)
    }

    pub fn f32(&mut self) -> Result<f32, Error> {
        let mut rest = &self.bytes[self.offset..];
        let value = rest.read_f32::<BigEndian>().map_err(|_| self.eof())?;
        self.offset += 4;
        Ok(value)
    }

    pub fn i64(&mut self) -> Result<i64, Error> {
        let mut rest = &self.bytes[self.offset..];
        let value = rest.read_i64::<BigEndian>().map_err(|_| self.eof())?;
        self.offset += 8;
        Ok(value)
    }

    pub fn f64(&mut self) -> Result<f64, Error> {
        let mut rest = &self.bytes[self.offset..];
        let value = rest.read_f64::<BigEndian>().map_err(|_| self.eof())?;
        self.offset += 8;
        Ok(value)
    }

    /// Read a length-prefixed modified UTF-8 string
    pub fn modified_utf8(&mut self) -> Result<String, Error> {
        let len = self.u16()?;
        let start = self.offset;
        let payload = self.bytes(usize::from(len))?;
        decode_modified_utf8(payload).ok_or(Error::MalformedUtf8 { offset: start })
    }
}

/// Decode the modified UTF-8 format used in class files
///
/// Differences from standard UTF-8 (see the `DataInput` documentation):
/// the null character is encoded in the 2-byte form so no encoded string
/// contains a zero byte, only 1/2/3-byte forms exist, and supplementary
/// characters appear as a 3-byte surrogate pair. Returns `None` on any
/// malformed sequence.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;

    // Decode one 1-3 byte unit into a UTF-16 code unit
    fn unit(bytes: &[u8], i: &mut usize) -> Option<u32> {
        let a = *bytes.get(*i)?;
        match a {
            // The null byte and 4-byte lead bytes never appear
            0x01..=0x7F => {
                *i += 1;
                Some(u32::from(a))
            }
            0xC0..=0xDF => {
                let b = *bytes.get(*i + 1)?;
                if b & 0xC0 != 0x80 {
                    return None;
                }
                *i += 2;
                Some((u32::from(a & 0x1F) << 6) | u32::from(b & 0x3F))
            }
            0xE0..=0xEF => {
                let b = *bytes.get(*i + 1)?;
                let c = *bytes.get(*i + 2)?;
                if b & 0xC0 != 0x80 || c & 0xC0 != 0x80 {
                    return None;
                }
                *i += 3;
                Some((u32::from(a & 0x0F) << 12) | (u32::from(b & 0x3F) << 6) | u32::from(c & 0x3F))
            }
            _ => None,
        }
    }

    while i < bytes.len() {
        let first = unit(bytes, &mut i)?;
        let code = match first {
            // High surrogate: a low surrogate must follow immediately
            0xD800..=0xDBFF => {
                let second = unit(bytes, &mut i)?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return None;
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            // Lone low surrogate
            0xDC00..=0xDFFF => return None,
            _ => first,
        };
        out.push(char::from_u32(code)?);
    }
    Some(out)
}
