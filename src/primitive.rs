// SPDX-License-Identifier: MIT
//! Primitive field codec
//!
//! Fixed-width big-endian integers (1, 2 or 4 bytes, optionally masked to their
//! low bits) and fixed-length byte strings (optionally read as null-terminated ASCII).

use std::fmt;
use std::str::FromStr;

use crate::error::{DecodeError, EncodeError, SchemaError};

/// Storage kind of a primitive field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    /// Fixed-length byte string
    Bytes(usize),
}

impl PrimitiveKind {
    /// Width on the wire in bytes
    #[inline]
    pub fn width(&self) -> usize {
        match self {
            PrimitiveKind::U8 | PrimitiveKind::S8 => 1,
            PrimitiveKind::U16 | PrimitiveKind::S16 => 2,
            PrimitiveKind::U32 | PrimitiveKind::S32 => 4,
            PrimitiveKind::Bytes(n) => *n,
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, PrimitiveKind::Bytes(_))
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::S8 | PrimitiveKind::S16 | PrimitiveKind::S32
        )
    }
}

/// A decoded or to-be-encoded primitive value
///
/// Ordering is numeric for integers and lexicographic for text and bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    Int(i64),
    Bytes(Vec<u8>),
    Text(String),
}

impl Scalar {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Scalar::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Text(s) => write!(f, "{:?}", s),
            Scalar::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

/// Primitive type descriptor: kind, optional bit mask width, optional text flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Primitive {
    kind: PrimitiveKind,
    bits: Option<u32>,
    text: bool,
}

impl Primitive {
    pub const U8: Primitive = Primitive::of(PrimitiveKind::U8);
    pub const S8: Primitive = Primitive::of(PrimitiveKind::S8);
    pub const U16: Primitive = Primitive::of(PrimitiveKind::U16);
    pub const S16: Primitive = Primitive::of(PrimitiveKind::S16);
    pub const U32: Primitive = Primitive::of(PrimitiveKind::U32);
    pub const S32: Primitive = Primitive::of(PrimitiveKind::S32);

    const fn of(kind: PrimitiveKind) -> Self {
        Self {
            kind,
            bits: None,
            text: false,
        }
    }

    /// Raw fixed-length bytes, returned verbatim on decode
    pub const fn bytes(len: usize) -> Self {
        Self::of(PrimitiveKind::Bytes(len))
    }

    /// Fixed-length null-padded ASCII text
    pub const fn text(len: usize) -> Self {
        Self {
            kind: PrimitiveKind::Bytes(len),
            bits: None,
            text: true,
        }
    }

    /// Restrict an integer to its low `bits` bits
    pub fn masked(self, bits: u32) -> Result<Self, SchemaError> {
        if !self.kind.is_integer() {
            return Err(SchemaError::MaskOnBytes(self.to_string()));
        }
        let width = self.kind.width();
        if bits == 0 || bits as usize >= 8 * width {
            return Err(SchemaError::InvalidBitWidth { bits, width });
        }
        Ok(Self {
            bits: Some(bits),
            ..self
        })
    }

    /// Build from a pack-style descriptor (`b B h H i I l L` or `<n>s`),
    /// a text flag and a bit width (0 for none)
    pub fn from_descriptor(descriptor: &str, text: bool, bits: u32) -> Result<Self, SchemaError> {
        let kind = match descriptor {
            "b" => PrimitiveKind::S8,
            "B" => PrimitiveKind::U8,
            "c" => PrimitiveKind::Bytes(1),
            "h" => PrimitiveKind::S16,
            "H" => PrimitiveKind::U16,
            "i" | "l" => PrimitiveKind::S32,
            "I" | "L" => PrimitiveKind::U32,
            other => {
                let len = other
                    .strip_suffix('s')
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| SchemaError::UnknownPrimitive(other.to_string()))?;
                PrimitiveKind::Bytes(len)
            }
        };

        let mut primitive = Self::of(kind);
        if text {
            if kind.is_integer() {
                return Err(SchemaError::TextOnInteger(descriptor.to_string()));
            }
            primitive.text = true;
        }
        if bits > 0 {
            primitive = primitive.masked(bits)?;
        }
        Ok(primitive)
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.kind.width()
    }

    pub fn is_integer(&self) -> bool {
        self.kind.is_integer()
    }

    /// Value a blank field starts with
    pub fn default_value(&self) -> Scalar {
        match self.kind {
            PrimitiveKind::Bytes(n) if !self.text => Scalar::Bytes(vec![0; n]),
            PrimitiveKind::Bytes(_) => Scalar::Text(String::new()),
            _ => Scalar::Int(0),
        }
    }

    #[inline]
    fn mask(&self) -> u64 {
        match self.bits {
            Some(b) => (1u64 << b) - 1,
            None => u64::MAX,
        }
    }

    /// Decode from the front of `bytes`; `offset` is only used for error reporting
    pub fn decode(&self, bytes: &[u8], offset: usize) -> Result<Scalar, DecodeError> {
        let width = self.width();
        if bytes.len() < width {
            return Err(DecodeError::Truncated {
                offset,
                needed: width,
                available: bytes.len(),
            });
        }
        let raw = &bytes[..width];

        if !self.kind.is_integer() {
            if !self.text {
                return Ok(Scalar::Bytes(raw.to_vec()));
            }
            let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
            let prefix = &raw[..end];
            if !prefix.is_ascii() {
                return Err(DecodeError::InvalidEncoding { offset });
            }
            return Ok(Scalar::Text(prefix.iter().map(|&b| b as char).collect()));
        }

        let unsigned = raw.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        let value = if self.bits.is_some() {
            (unsigned & self.mask()) as i64
        } else if self.kind.is_signed() {
            let shift = 64 - 8 * width as u32;
            ((unsigned << shift) as i64) >> shift
        } else {
            unsigned as i64
        };
        Ok(Scalar::Int(value))
    }

    /// Append the encoded value to `out`
    ///
    /// Integers are masked or truncated to the field width, never rejected.
    /// Text and bytes are null-padded or truncated to the declared length.
    pub fn encode(&self, value: &Scalar, field: &str, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        let width = self.width();
        match (self.kind.is_integer(), self.text, value) {
            (true, _, Scalar::Int(v)) => {
                let bits = (*v as u64) & self.mask();
                out.extend_from_slice(&bits.to_be_bytes()[8 - width..]);
            }
            (false, true, Scalar::Text(s)) => {
                if !s.is_ascii() {
                    return Err(EncodeError::InvalidEncoding {
                        field: field.to_string(),
                    });
                }
                pad_into(s.as_bytes(), width, out);
            }
            (false, false, Scalar::Bytes(b)) => pad_into(b, width, out),
            (true, _, _) => return Err(mismatch(field, "an integer")),
            (false, true, _) => return Err(mismatch(field, "text")),
            (false, false, _) => return Err(mismatch(field, "bytes")),
        }
        Ok(())
    }
}

fn pad_into(src: &[u8], width: usize, out: &mut Vec<u8>) {
    let n = src.len().min(width);
    out.extend_from_slice(&src[..n]);
    out.resize(out.len() + (width - n), 0);
}

fn mismatch(field: &str, expected: &'static str) -> EncodeError {
    EncodeError::TypeMismatch {
        field: field.to_string(),
        expected,
    }
}

impl FromStr for Primitive {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_descriptor(s, false, 0)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PrimitiveKind::U8 => write!(f, "u8")?,
            PrimitiveKind::S8 => write!(f, "s8")?,
            PrimitiveKind::U16 => write!(f, "u16")?,
            PrimitiveKind::S16 => write!(f, "s16")?,
            PrimitiveKind::U32 => write!(f, "u32")?,
            PrimitiveKind::S32 => write!(f, "s32")?,
            PrimitiveKind::Bytes(n) if self.text => write!(f, "text({})", n)?,
            PrimitiveKind::Bytes(n) => write!(f, "bytes({})", n)?,
        }
        if let Some(bits) = self.bits {
            write!(f, ":{}", bits)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(p: Primitive, v: Scalar) -> Vec<u8> {
        let mut out = Vec::new();
        p.encode(&v, "f", &mut out).unwrap();
        out
    }

    #[test]
    fn test_integers_are_big_endian() {
        assert_eq!(encode(Primitive::U16, Scalar::Int(0x1234)), vec![0x12, 0x34]);
        assert_eq!(
            encode(Primitive::U32, Scalar::Int(0x01020304)),
            vec![1, 2, 3, 4]
        );
        assert_eq!(
            Primitive::U32.decode(&[0, 0, 1, 0], 0).unwrap(),
            Scalar::Int(256)
        );
    }

    #[test]
    fn test_signed_decode_sign_extends() {
        assert_eq!(Primitive::S8.decode(&[0xFF], 0).unwrap(), Scalar::Int(-1));
        assert_eq!(
            Primitive::S16.decode(&[0xFF, 0xFE], 0).unwrap(),
            Scalar::Int(-2)
        );
        assert_eq!(
            Primitive::S32.decode(&[0x80, 0, 0, 0], 0).unwrap(),
            Scalar::Int(i32::MIN as i64)
        );
        assert_eq!(Primitive::U8.decode(&[0xFF], 0).unwrap(), Scalar::Int(255));
    }

    #[test]
    fn test_out_of_range_truncates() {
        assert_eq!(encode(Primitive::U8, Scalar::Int(0x1FF)), vec![0xFF]);
        assert_eq!(encode(Primitive::S16, Scalar::Int(-1)), vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_masked_field() {
        let p = Primitive::U8.masked(3).unwrap();
        assert_eq!(encode(p, Scalar::Int(0xFF)), vec![0x07]);
        assert_eq!(p.decode(&[0xFA], 0).unwrap(), Scalar::Int(0x02));
    }

    #[test]
    fn test_invalid_masks() {
        assert!(matches!(
            Primitive::U8.masked(8),
            Err(SchemaError::InvalidBitWidth { bits: 8, width: 1 })
        ));
        assert!(Primitive::U16.masked(0).is_err());
        assert!(matches!(
            Primitive::bytes(4).masked(3),
            Err(SchemaError::MaskOnBytes(_))
        ));
    }

    #[test]
    fn test_text_pads_and_stops_at_null() {
        let p = Primitive::text(8);
        assert_eq!(encode(p, Scalar::Text("BUS1".into())), b"BUS1\0\0\0\0".to_vec());
        assert_eq!(
            p.decode(b"BUS1\0XYZ", 0).unwrap(),
            Scalar::Text("BUS1".into())
        );
        assert_eq!(
            p.decode(b"BUS00001", 0).unwrap(),
            Scalar::Text("BUS00001".into())
        );
    }

    #[test]
    fn test_text_truncates_long_values() {
        let p = Primitive::text(4);
        assert_eq!(encode(p, Scalar::Text("ABCDEFG".into())), b"ABCD".to_vec());
    }

    #[test]
    fn test_text_rejects_non_ascii() {
        let p = Primitive::text(4);
        assert!(matches!(
            p.decode(&[b'A', 0xC3, 0xA9, 0], 10),
            Err(DecodeError::InvalidEncoding { offset: 10 })
        ));
        let mut out = Vec::new();
        assert!(matches!(
            p.encode(&Scalar::Text("é".into()), "id", &mut out),
            Err(EncodeError::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn test_raw_bytes_verbatim() {
        let p = Primitive::bytes(3);
        assert_eq!(
            p.decode(&[0, 1, 0, 9], 0).unwrap(),
            Scalar::Bytes(vec![0, 1, 0])
        );
        assert_eq!(encode(p, Scalar::Bytes(vec![7])), vec![7, 0, 0]);
    }

    #[test]
    fn test_truncated() {
        assert_eq!(
            Primitive::U32.decode(&[1, 2], 40),
            Err(DecodeError::Truncated {
                offset: 40,
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn test_type_mismatch() {
        let mut out = Vec::new();
        let err = Primitive::U16
            .encode(&Scalar::Text("x".into()), "file_id", &mut out)
            .unwrap_err();
        assert_eq!(
            err,
            EncodeError::TypeMismatch {
                field: "file_id".into(),
                expected: "an integer"
            }
        );
    }

    #[test]
    fn test_descriptors() {
        assert_eq!("H".parse::<Primitive>().unwrap(), Primitive::U16);
        assert_eq!("l".parse::<Primitive>().unwrap(), Primitive::S32);
        assert_eq!("25s".parse::<Primitive>().unwrap(), Primitive::bytes(25));
        assert_eq!(
            Primitive::from_descriptor("12s", true, 0).unwrap(),
            Primitive::text(12)
        );
        assert_eq!(
            Primitive::from_descriptor("B", false, 3).unwrap(),
            Primitive::U8.masked(3).unwrap()
        );
        assert!(matches!(
            "q".parse::<Primitive>(),
            Err(SchemaError::UnknownPrimitive(_))
        ));
        assert!(matches!(
            Primitive::from_descriptor("H", true, 0),
            Err(SchemaError::TextOnInteger(_))
        ));
    }

    #[test]
    fn test_char_descriptor_is_one_byte() {
        let p: Primitive = "c".parse().unwrap();
        assert_eq!(p, Primitive::bytes(1));
        assert!(!p.is_integer());
        assert_eq!(p.decode(b"Z", 0).unwrap(), Scalar::Bytes(vec![b'Z']));
    }

    #[test]
    fn test_display() {
        assert_eq!(Primitive::text(8).to_string(), "text(8)");
        assert_eq!(Primitive::U8.masked(3).unwrap().to_string(), "u8:3");
        assert_eq!(Scalar::Bytes(vec![0xAB, 1]).to_string(), "0xab01");
    }
}
