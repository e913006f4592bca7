//! Numeric storage kinds and the conversion between stored bytes and the
//! double-precision representation the rest of the system computes in.
//!
//! This module owns the single bidirectional kind mapping; nothing else
//! keeps kind tables. Conversions happen only at the store boundary.

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

/// Numeric kind of stored samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

/// Global value-range scaling for integer storage: real values in
/// `[real_min, real_max]` map linearly onto the kind's valid raw range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeScale {
    pub real_min: f64,
    pub real_max: f64,
}

impl DataKind {
    /// Size of one stored sample in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            Self::Byte | Self::UByte => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }

    /// Whether samples are stored as integers (and therefore scaled).
    pub fn is_integer(self) -> bool {
        !matches!(self, Self::Float | Self::Double)
    }

    /// Valid raw range for integer kinds.
    pub fn valid_range(self) -> (f64, f64) {
        match self {
            Self::Byte => (i8::MIN as f64, i8::MAX as f64),
            Self::UByte => (0.0, u8::MAX as f64),
            Self::Short => (i16::MIN as f64, i16::MAX as f64),
            Self::UShort => (0.0, u16::MAX as f64),
            Self::Int => (i32::MIN as f64, i32::MAX as f64),
            Self::UInt => (0.0, u32::MAX as f64),
            Self::Float | Self::Double => (f64::NEG_INFINITY, f64::INFINITY),
        }
    }

    fn raw_to_real(self, raw: f64, scale: Option<&RangeScale>) -> f64 {
        match scale {
            Some(s) if self.is_integer() => {
                let (vmin, vmax) = self.valid_range();
                if s.real_max == s.real_min {
                    s.real_min
                } else {
                    s.real_min + (raw - vmin) * (s.real_max - s.real_min) / (vmax - vmin)
                }
            }
            _ => raw,
        }
    }

    fn real_to_raw(self, real: f64, scale: Option<&RangeScale>) -> f64 {
        match scale {
            Some(s) if self.is_integer() => {
                let (vmin, vmax) = self.valid_range();
                if s.real_max == s.real_min {
                    vmin
                } else {
                    let t = (real - s.real_min) / (s.real_max - s.real_min);
                    (vmin + t * (vmax - vmin)).round().clamp(vmin, vmax)
                }
            }
            _ => real,
        }
    }

    /// Decode little-endian stored bytes into representation values.
    pub fn decode(self, bytes: &[u8], scale: Option<&RangeScale>) -> Result<Vec<f64>> {
        let size = self.size_in_bytes();
        if bytes.len() % size != 0 {
            return Err(IoError::type_mismatch(format!(
                "{} bytes are not a whole number of {self:?} samples",
                bytes.len()
            )));
        }
        let out = bytes
            .chunks_exact(size)
            .map(|c| {
                let raw = match self {
                    Self::Byte => c[0] as i8 as f64,
                    Self::UByte => c[0] as f64,
                    Self::Short => i16::from_le_bytes([c[0], c[1]]) as f64,
                    Self::UShort => u16::from_le_bytes([c[0], c[1]]) as f64,
                    Self::Int => i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                    Self::UInt => u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                    Self::Float => f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                    Self::Double => f64::from_le_bytes(c.try_into().expect("8-byte chunk")),
                };
                self.raw_to_real(raw, scale)
            })
            .collect();
        Ok(out)
    }

    /// Encode representation values into little-endian stored bytes.
    pub fn encode(self, values: &[f64], scale: Option<&RangeScale>) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(values.len() * self.size_in_bytes());
        for &v in values {
            let raw = self.real_to_raw(v, scale);
            match self {
                Self::Byte => bytes.push(raw as i8 as u8),
                Self::UByte => bytes.push(raw as u8),
                Self::Short => bytes.extend_from_slice(&(raw as i16).to_le_bytes()),
                Self::UShort => bytes.extend_from_slice(&(raw as u16).to_le_bytes()),
                Self::Int => bytes.extend_from_slice(&(raw as i32).to_le_bytes()),
                Self::UInt => bytes.extend_from_slice(&(raw as u32).to_le_bytes()),
                Self::Float => bytes.extend_from_slice(&(raw as f32).to_le_bytes()),
                Self::Double => bytes.extend_from_slice(&raw.to_le_bytes()),
            }
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(DataKind::UByte.size_in_bytes(), 1);
        assert_eq!(DataKind::Short.size_in_bytes(), 2);
        assert_eq!(DataKind::Float.size_in_bytes(), 4);
        assert_eq!(DataKind::Double.size_in_bytes(), 8);
    }

    #[test]
    fn test_double_pass_through() {
        let values = [1.5, -2.25, 1e9];
        let bytes = DataKind::Double.encode(&values, None);
        let back = DataKind::Double.decode(&bytes, None).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn test_short_scaling_round_trip() {
        let scale = RangeScale {
            real_min: -1.0,
            real_max: 1.0,
        };
        let values = [-1.0, -0.5, 0.0, 0.5, 1.0];
        let bytes = DataKind::Short.encode(&values, Some(&scale));
        let back = DataKind::Short.decode(&bytes, Some(&scale)).unwrap();
        for (a, b) in values.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn test_constant_range_is_stable() {
        let scale = RangeScale {
            real_min: 7.0,
            real_max: 7.0,
        };
        let bytes = DataKind::Short.encode(&[7.0, 7.0], Some(&scale));
        let back = DataKind::Short.decode(&bytes, Some(&scale)).unwrap();
        assert_eq!(back, vec![7.0, 7.0]);
    }

    #[test]
    fn test_encode_clamps_outside_range() {
        let scale = RangeScale {
            real_min: 0.0,
            real_max: 1.0,
        };
        let bytes = DataKind::UByte.encode(&[2.0], Some(&scale));
        assert_eq!(bytes, vec![255]);
    }

    #[test]
    fn test_decode_rejects_ragged_buffer() {
        assert!(DataKind::Short.decode(&[1, 2, 3], None).is_err());
    }
}
