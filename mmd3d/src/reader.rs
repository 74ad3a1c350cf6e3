//! Cursor over a raw byte buffer with typed little-endian reads.
//!
//! Both asset decoders are IO-free and operate on in-memory byte slices.
//! Every read is bounds-checked; running past the end of the buffer aborts
//! decoding of that asset with [`Error::UnexpectedEof`].

use crate::Error;
use byteorder::{ByteOrder, LittleEndian};
use glam::{Quat, Vec2, Vec3, Vec4};

/// Byte width of the index fields declared in the PMX header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
}

impl IndexWidth {
    pub(crate) fn from_code(code: u8, field: &'static str) -> Result<Self, Error> {
        match code {
            1 => Ok(Self::U8),
            2 => Ok(Self::U16),
            4 => Ok(Self::U32),
            width => Err(Error::UnsupportedIndexWidth { field, width }),
        }
    }

    pub(crate) fn byte_len(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// The all-ones bit pattern for this width, stored on disk where the
    /// format means "no index" (-1 in the signed encoding).
    pub(crate) fn none_value(self) -> u32 {
        match self {
            Self::U8 => u8::MAX as u32,
            Self::U16 => u16::MAX as u32,
            Self::U32 => u32::MAX,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryInput<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.cursor
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < n {
            return Err(Error::UnexpectedEof {
                offset: self.cursor,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.bytes[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.take(n).map(|_| ())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    /// n-byte unsigned little-endian integer widened to `i64`. Widths outside
    /// {1, 2, 4, 8} yield 0 without advancing the cursor.
    pub(crate) fn read_uint(&mut self, n: usize) -> Result<i64, Error> {
        match n {
            1 => Ok(self.read_u8()? as i64),
            2 => Ok(self.read_u16()? as i64),
            4 => Ok(self.read_u32()? as i64),
            8 => Ok(LittleEndian::read_u64(self.take(8)?) as i64),
            _ => Ok(0),
        }
    }

    /// Raw unsigned index of the declared width. The caller maps the
    /// width's all-ones sentinel to "none".
    pub(crate) fn read_index(&mut self, width: IndexWidth) -> Result<u32, Error> {
        Ok(self.read_uint(width.byte_len())? as u32)
    }

    pub(crate) fn read_vec2(&mut self) -> Result<Vec2, Error> {
        Ok(Vec2::new(self.read_f32()?, self.read_f32()?))
    }

    pub(crate) fn read_vec3(&mut self) -> Result<Vec3, Error> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Vec3 with the handedness conversion applied on load: `(x, y, -z)`.
    pub(crate) fn read_vec3_flip_z(&mut self) -> Result<Vec3, Error> {
        Ok(Vec3::new(
            self.read_f32()?,
            self.read_f32()?,
            -self.read_f32()?,
        ))
    }

    pub(crate) fn read_vec4(&mut self) -> Result<Vec4, Error> {
        Ok(Vec4::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Quat with the handedness conversion applied on load: `(x, y, -z, -w)`.
    pub(crate) fn read_quat_flip(&mut self) -> Result<Quat, Error> {
        Ok(Quat::from_xyzw(
            self.read_f32()?,
            self.read_f32()?,
            -self.read_f32()?,
            -self.read_f32()?,
        ))
    }

    /// Length-prefixed string: 4-byte byte count, then that many bytes decoded
    /// per `encoding`. Zero length is the empty string.
    pub(crate) fn read_string(&mut self, encoding: TextEncoding) -> Result<String, Error> {
        let len = self.read_u32()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let offset = self.position();
        let bytes = self.take(len)?;
        decode_text(bytes, encoding, offset)
    }

    /// Fixed-width string: reads exactly `n` bytes, truncates at the first
    /// NUL, decodes the prefix as Shift_JIS. The cursor always advances by
    /// the full `n` bytes regardless of the string's actual length.
    pub(crate) fn read_fixed_string(&mut self, n: usize) -> Result<String, Error> {
        let offset = self.position();
        let bytes = self.take(n)?;
        let text = match bytes.iter().position(|&b| b == 0) {
            Some(nul) => &bytes[..nul],
            None => bytes,
        };
        let (decoded, _, malformed) = encoding_rs::SHIFT_JIS.decode(text);
        if malformed {
            return Err(Error::InvalidText {
                encoding: "Shift_JIS",
                offset,
            });
        }
        Ok(decoded.into_owned())
    }
}

/// Text encoding declared in the PMX header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TextEncoding {
    Utf16Le,
    Utf8,
}

impl TextEncoding {
    pub(crate) fn from_code(code: u8) -> Result<Self, Error> {
        match code {
            0 => Ok(Self::Utf16Le),
            1 => Ok(Self::Utf8),
            value => Err(Error::UnsupportedTextEncoding { value }),
        }
    }
}

fn decode_text(bytes: &[u8], encoding: TextEncoding, offset: usize) -> Result<String, Error> {
    match encoding {
        TextEncoding::Utf16Le => {
            let (decoded, _, malformed) = encoding_rs::UTF_16LE.decode(bytes);
            if malformed {
                return Err(Error::InvalidText {
                    encoding: "UTF-16LE",
                    offset,
                });
            }
            Ok(decoded.into_owned())
        }
        TextEncoding::Utf8 => match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => Err(Error::InvalidText {
                encoding: "UTF-8",
                offset,
            }),
        },
    }
}
