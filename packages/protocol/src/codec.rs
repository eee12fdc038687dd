//! C1 — Register Codec.
//!
//! Encodes `Int16/32/64` (two's-complement) and `Float32/64` (IEEE-754)
//! scalars into sequences of 16-bit words and back, under a configurable
//! byte order (within a 16-bit word) and word order (across multi-word
//! values). Pure and allocation-light: never a suspension point.

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordOrder {
    #[default]
    Big,
    Little,
}

/// The scalar variant a register holds, independent of width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Float,
}

/// A decoded/pre-encode numeric value. Coils and discrete inputs are plain
/// `bool` and never pass through this codec.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Int(i64),
    Float(f64),
}

impl NumericValue {
    pub fn kind(&self) -> ScalarKind {
        match self {
            NumericValue::Int(_) => ScalarKind::Int,
            NumericValue::Float(_) => ScalarKind::Float,
        }
    }
}

/// A configured codec instance — one per Modbus role (server, or each
/// configured client), since byte/word order is negotiated per link.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterCodec {
    pub byte_order: ByteOrder,
    pub word_order: WordOrder,
}

impl RegisterCodec {
    pub fn new(byte_order: ByteOrder, word_order: WordOrder) -> Self {
        Self {
            byte_order,
            word_order,
        }
    }

    /// Encode `value` into `width / 16` big/little-endian 16-bit words.
    pub fn encode(&self, value: NumericValue, width: u8) -> Result<Vec<u16>, ProtocolError> {
        let raw_be: Vec<u8> = match (value, width) {
            (NumericValue::Int(v), 16) => (v as i16).to_be_bytes().to_vec(),
            (NumericValue::Int(v), 32) => (v as i32).to_be_bytes().to_vec(),
            (NumericValue::Int(v), 64) => v.to_be_bytes().to_vec(),
            (NumericValue::Float(_), 16) => {
                return Err(ProtocolError::Unsupported {
                    reason: "16-bit float is forbidden".to_string(),
                })
            }
            (NumericValue::Float(v), 32) => (v as f32).to_be_bytes().to_vec(),
            (NumericValue::Float(v), 64) => v.to_be_bytes().to_vec(),
            (_, other) => {
                return Err(ProtocolError::Unsupported {
                    reason: format!("register width {other} is not one of 16, 32, 64"),
                })
            }
        };

        let word_count = width as usize / 16;
        let mut words_be = Vec::with_capacity(word_count);
        for chunk in raw_be.chunks(2) {
            let word = match self.byte_order {
                ByteOrder::Big => u16::from_be_bytes([chunk[0], chunk[1]]),
                ByteOrder::Little => u16::from_be_bytes([chunk[1], chunk[0]]),
            };
            words_be.push(word);
        }

        // words_be is currently most-significant-word-first; reorder per word_order.
        match self.word_order {
            WordOrder::Big => Ok(words_be),
            WordOrder::Little => {
                words_be.reverse();
                Ok(words_be)
            }
        }
    }

    /// Decode `words` (already in this codec's configured order) back into a
    /// scalar of the given `kind`. The width is implied by `words.len()`.
    pub fn decode(
        &self,
        words: &[u16],
        kind: ScalarKind,
    ) -> Result<NumericValue, ProtocolError> {
        let word_count = words.len();
        if !matches!(word_count, 1 | 2 | 4) {
            return Err(ProtocolError::InvalidWidth { words: word_count });
        }

        // Reconstruct most-significant-word-first ordering.
        let mut words_be = words.to_vec();
        if self.word_order == WordOrder::Little {
            words_be.reverse();
        }

        let mut raw_be = Vec::with_capacity(word_count * 2);
        for word in words_be {
            let [hi, lo] = word.to_be_bytes();
            match self.byte_order {
                ByteOrder::Big => raw_be.extend_from_slice(&[hi, lo]),
                ByteOrder::Little => raw_be.extend_from_slice(&[lo, hi]),
            }
        }

        let width = word_count * 16;
        match (kind, width) {
            (ScalarKind::Int, 16) => {
                let bytes: [u8; 2] = raw_be.try_into().unwrap();
                Ok(NumericValue::Int(i16::from_be_bytes(bytes) as i64))
            }
            (ScalarKind::Int, 32) => {
                let bytes: [u8; 4] = raw_be.try_into().unwrap();
                Ok(NumericValue::Int(i32::from_be_bytes(bytes) as i64))
            }
            (ScalarKind::Int, 64) => {
                let bytes: [u8; 8] = raw_be.try_into().unwrap();
                Ok(NumericValue::Int(i64::from_be_bytes(bytes)))
            }
            (ScalarKind::Float, 32) => {
                let bytes: [u8; 4] = raw_be.try_into().unwrap();
                Ok(NumericValue::Float(f32::from_be_bytes(bytes) as f64))
            }
            (ScalarKind::Float, 64) => {
                let bytes: [u8; 8] = raw_be.try_into().unwrap();
                Ok(NumericValue::Float(f64::from_be_bytes(bytes)))
            }
            (ScalarKind::Float, 16) => Err(ProtocolError::Unsupported {
                reason: "16-bit float is forbidden".to_string(),
            }),
            _ => unreachable!("width is constrained to 16/32/64 above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_orders() -> [(ByteOrder, WordOrder); 4] {
        [
            (ByteOrder::Big, WordOrder::Big),
            (ByteOrder::Big, WordOrder::Little),
            (ByteOrder::Little, WordOrder::Big),
            (ByteOrder::Little, WordOrder::Little),
        ]
    }

    #[test]
    fn int_round_trips_for_all_widths_and_orders() {
        for (bo, wo) in all_orders() {
            let codec = RegisterCodec::new(bo, wo);
            for width in [16u8, 32, 64] {
                let max = match width {
                    16 => i16::MAX as i64,
                    32 => i32::MAX as i64,
                    _ => i64::MAX,
                };
                let min = match width {
                    16 => i16::MIN as i64,
                    32 => i32::MIN as i64,
                    _ => i64::MIN,
                };
                for v in [0i64, 1, -1, max, min, 42] {
                    let words = codec.encode(NumericValue::Int(v), width).unwrap();
                    assert_eq!(words.len(), width as usize / 16);
                    let decoded = codec.decode(&words, ScalarKind::Int).unwrap();
                    assert_eq!(decoded, NumericValue::Int(v));
                }
            }
        }
    }

    #[test]
    fn float_round_trips_for_32_and_64() {
        for (bo, wo) in all_orders() {
            let codec = RegisterCodec::new(bo, wo);
            for width in [32u8, 64] {
                for v in [0.0f64, 1.5, -1.5, 3.14159, f64::MIN_POSITIVE] {
                    let words = codec.encode(NumericValue::Float(v), width).unwrap();
                    let decoded = codec.decode(&words, ScalarKind::Float).unwrap();
                    match decoded {
                        NumericValue::Float(d) => {
                            if width == 32 {
                                assert!((d - v as f32 as f64).abs() < 1e-6);
                            } else {
                                assert_eq!(d, v);
                            }
                        }
                        _ => panic!("expected float"),
                    }
                }
            }
        }
    }

    #[test]
    fn encoding_16_bit_float_is_unsupported() {
        let codec = RegisterCodec::default();
        let err = codec.encode(NumericValue::Float(1.0), 16).unwrap_err();
        assert!(matches!(err, ProtocolError::Unsupported { .. }));
    }

    #[test]
    fn decoding_wrong_word_count_is_invalid_width() {
        let codec = RegisterCodec::default();
        let err = codec.decode(&[1, 2, 3], ScalarKind::Int).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidWidth { words: 3 }));
    }

    #[test]
    fn little_endian_int32_matches_spec_example() {
        // spec.md scenario 4: byte_order=Little, word_order=Little,
        // Int32 0x01020304 -> [0x0403, 0x0201]
        let codec = RegisterCodec::new(ByteOrder::Little, WordOrder::Little);
        let words = codec.encode(NumericValue::Int(0x0102_0304), 32).unwrap();
        assert_eq!(words, vec![0x0403, 0x0201]);
    }

    #[test]
    fn big_word_order_emits_most_significant_word_first() {
        let codec = RegisterCodec::new(ByteOrder::Big, WordOrder::Big);
        let words = codec.encode(NumericValue::Int(0x0001_0002), 32).unwrap();
        assert_eq!(words, vec![0x0001, 0x0002]);
    }
}
