//! Little-endian cursors over parameter and status records.
//!
//! Every record the client exchanges with the renderer is a fixed-layout
//! little-endian struct. [`Reader`] and [`Writer`] walk a byte slice with an
//! explicit offset and fail with [`WireError`] instead of panicking when a
//! record runs past the end of the buffer.

use core::fmt;

/// Error returned when a cursor runs out of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ends before the requested field.
    ShortBuffer {
        /// Offset the access started at.
        offset: usize,
        /// Bytes requested.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::ShortBuffer {
                offset,
                needed,
                available,
            } => write!(
                f,
                "short buffer at offset {offset:#x}: needed {needed} bytes, {available} available"
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WireError {}

/// Read cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

macro_rules! read_le {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Reads a little-endian `", stringify!($ty), "`.")]
            pub fn $name(&mut self) -> Result<$ty, WireError> {
                let bytes = self.array::<{ core::mem::size_of::<$ty>() }>()?;
                Ok(<$ty>::from_le_bytes(bytes))
            }
        )*
    };
}

impl<'a> Reader<'a> {
    /// Starts reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current offset from the start.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Takes the next `len` bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::ShortBuffer {
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(out)
    }

    /// Takes the next `N` bytes as an array.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    /// Skips `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<(), WireError> {
        self.bytes(len).map(|_| ())
    }

    /// Reads a byte as a bool; any non-zero value is true.
    pub fn bool(&mut self) -> Result<bool, WireError> {
        Ok(self.u8()? != 0)
    }

    read_le! {
        u8 -> u8,
        i8 -> i8,
        u16 -> u16,
        i16 -> i16,
        u32 -> u32,
        i32 -> i32,
        u64 -> u64,
        i64 -> i64,
        f32 -> f32,
    }
}

/// Write cursor over a mutable byte slice.
#[derive(Debug)]
pub struct Writer<'a> {
    data: &'a mut [u8],
    offset: usize,
}

macro_rules! write_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Writes a little-endian `", stringify!($ty), "`.")]
            pub fn $name(&mut self, value: $ty) -> Result<(), WireError> {
                self.bytes(&value.to_le_bytes())
            }
        )*
    };
}

impl<'a> Writer<'a> {
    /// Starts writing at the beginning of `data`.
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current offset from the start.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Copies `bytes` at the cursor.
    pub fn bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        if self.remaining() < bytes.len() {
            return Err(WireError::ShortBuffer {
                offset: self.offset,
                needed: bytes.len(),
                available: self.remaining(),
            });
        }
        self.data[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
        Ok(())
    }

    /// Writes `len` zero bytes.
    pub fn zeros(&mut self, len: usize) -> Result<(), WireError> {
        if self.remaining() < len {
            return Err(WireError::ShortBuffer {
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }
        self.data[self.offset..self.offset + len].fill(0);
        self.offset += len;
        Ok(())
    }

    /// Writes a bool as one byte.
    pub fn bool(&mut self, value: bool) -> Result<(), WireError> {
        self.u8(u8::from(value))
    }

    write_le! {
        u8: u8,
        i8: i8,
        u16: u16,
        i16: i16,
        u32: u32,
        i32: i32,
        u64: u64,
        i64: i64,
        f32: f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fields() {
        let data = [0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xFF];
        let mut r = Reader::new(&data);
        assert_eq!(r.u8().unwrap(), 1);
        assert_eq!(r.u16().unwrap(), 0x1234);
        assert_eq!(r.u32().unwrap(), 0x1234_5678);
        assert_eq!(r.i8().unwrap(), -1);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_read_reports_position() {
        let data = [0u8; 3];
        let mut r = Reader::new(&data);
        r.skip(2).unwrap();
        let err = r.u32().unwrap_err();
        assert_eq!(
            err,
            WireError::ShortBuffer {
                offset: 2,
                needed: 4,
                available: 1
            }
        );
        assert!(err.to_string().contains("0x2"));
    }

    #[test]
    fn writer_fills_in_order() {
        let mut buf = [0xAAu8; 8];
        let mut w = Writer::new(&mut buf);
        w.u16(0xBEEF).unwrap();
        w.zeros(2).unwrap();
        w.f32(1.0).unwrap();
        assert!(w.u8(0).is_err());
        assert_eq!(buf, [0xEF, 0xBE, 0, 0, 0, 0, 0x80, 0x3F]);
    }
}
