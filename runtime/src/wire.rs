//! Serialized-buffer encoding used for values that cross as bytes
//! (native error payloads).
//!
//! Little-endian. `bool` is one byte `0`/`1`, strings are a `u32` byte length
//! followed by UTF-8, handles are `u64`, optional values are a `u8` presence
//! tag followed by the payload.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("unexpected end of buffer: needed {needed} bytes, {remaining} left")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("invalid bool byte {0}")]
    InvalidBool(u8),
    #[error("invalid presence tag {0}")]
    InvalidTag(u8),
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("string of {0} bytes does not fit a u32 length prefix")]
    StringTooLong(usize),
    #[error("{0} trailing bytes after the encoded value")]
    TrailingBytes(usize),
}

#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

macro_rules! write_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(pub fn $name(&mut self, value: $ty) {
            self.buf.extend_from_slice(&value.to_le_bytes());
        })*
    };
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    write_le! {
        write_u8: u8, write_i8: i8,
        write_u16: u16, write_i16: i16,
        write_u32: u32, write_i32: i32,
        write_u64: u64, write_i64: i64,
        write_f32: f32, write_f64: f64,
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_handle(&mut self, handle: u64) {
        self.write_u64(handle);
    }

    pub fn write_str(&mut self, value: &str) -> Result<(), WireError> {
        let len = u32::try_from(value.len()).map_err(|_| WireError::StringTooLong(value.len()))?;
        self.write_u32(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn write_presence(&mut self, present: bool) {
        self.write_u8(u8::from(present));
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(pub fn $name(&mut self) -> Result<$ty, WireError> {
            let raw = self.take(std::mem::size_of::<$ty>())?;
            let mut arr = [0u8; std::mem::size_of::<$ty>()];
            arr.copy_from_slice(raw);
            Ok(<$ty>::from_le_bytes(arr))
        })*
    };
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], WireError> {
        let remaining = self.bytes.len() - self.pos;
        if needed > remaining {
            return Err(WireError::UnexpectedEof { needed, remaining });
        }
        let out = &self.bytes[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(out)
    }

    read_le! {
        read_u8: u8, read_i8: i8,
        read_u16: u16, read_i16: i16,
        read_u32: u32, read_i32: i32,
        read_u64: u64, read_i64: i64,
        read_f32: f32, read_f64: f64,
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }

    pub fn read_handle(&mut self) -> Result<u64, WireError> {
        self.read_u64()
    }

    pub fn read_presence(&mut self) -> Result<bool, WireError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidTag(other)),
        }
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_u32()? as usize;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8)
    }

    /// Fails when bytes remain after the last read value.
    pub fn finish(self) -> Result<(), WireError> {
        match self.bytes.len() - self.pos {
            0 => Ok(()),
            rest => Err(WireError::TrailingBytes(rest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_values_read_back_in_order() {
        let mut w = WireWriter::new();
        w.write_u32(87);
        w.write_str("Randall").unwrap();
        w.write_bool(true);
        w.write_presence(false);
        w.write_f64(-1.5);
        let bytes = w.finish();

        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), 87);
        assert_eq!(r.read_string().unwrap(), "Randall");
        assert!(r.read_bool().unwrap());
        assert!(!r.read_presence().unwrap());
        assert_eq!(r.read_f64().unwrap(), -1.5);
        r.finish().unwrap();
    }

    #[test]
    fn string_layout_is_length_prefixed() {
        let mut w = WireWriter::new();
        w.write_str("ab").unwrap();
        assert_eq!(w.finish(), vec![2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn truncated_input_reports_eof() {
        let mut r = WireReader::new(&[1, 0]);
        assert_eq!(
            r.read_u32().unwrap_err(),
            WireError::UnexpectedEof { needed: 4, remaining: 2 }
        );
    }

    #[test]
    fn bad_bool_and_trailing_bytes_are_errors() {
        let mut r = WireReader::new(&[2]);
        assert_eq!(r.read_bool().unwrap_err(), WireError::InvalidBool(2));
        let r = WireReader::new(&[0]);
        assert_eq!(r.finish().unwrap_err(), WireError::TrailingBytes(1));
    }
}
