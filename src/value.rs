use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Error;

/// A value as tracked by the abstract domain: `bits` wide, with `top` marking
/// the bits that the engine could not determine.
///
/// Both fields are masked to `bits`. `value` bits that are also set in `top`
/// carry no meaning for comparison, but are kept as the engine reported them
/// so that they show up in diagnostics. Equality is structural, including
/// those bits.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawAbstractValue"))]
pub struct AbstractValue {
    value: u32,
    top: u32,
    bits: u8,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawAbstractValue {
    value: u32,
    top: u32,
    bits: u8,
}

#[cfg(feature = "serde")]
impl std::convert::TryFrom<RawAbstractValue> for AbstractValue {
    type Error = String;

    fn try_from(raw: RawAbstractValue) -> Result<AbstractValue, String> {
        if raw.bits == 0 || raw.bits > 32 {
            return Err(format!("Invalid abstract value width {}", raw.bits));
        }
        let mask = width_mask(raw.bits);
        if raw.value & !mask != 0 || raw.top & !mask != 0 {
            return Err(format!(
                "Abstract value {:x}?{:x} doesn't fit in {} bits", raw.value, raw.top, raw.bits,
            ));
        }
        Ok(AbstractValue::new(raw.value, raw.top, raw.bits))
    }
}

pub fn width_mask(bits: u8) -> u32 {
    match bits {
        0 => 0,
        x if x >= 32 => 0xffff_ffff,
        x => (1u32 << x) - 1,
    }
}

impl AbstractValue {
    /// Panics if `bits` is not in 1..=32.
    pub fn new(value: u32, top: u32, bits: u8) -> AbstractValue {
        assert!(bits != 0 && bits <= 32, "Invalid abstract value width {}", bits);
        let mask = width_mask(bits);
        AbstractValue {
            value: value & mask,
            top: top & mask,
            bits,
        }
    }

    pub fn concrete(value: u32, bits: u8) -> AbstractValue {
        AbstractValue::new(value, 0, bits)
    }

    pub fn unknown(bits: u8) -> AbstractValue {
        AbstractValue::new(0, 0xffff_ffff, bits)
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Bits which are both inside the width and not unknown.
    pub fn definite_mask(&self) -> u32 {
        !self.top & width_mask(self.bits)
    }

    pub fn is_concrete(&self) -> bool {
        self.top == 0
    }

    /// Bits of `concrete` that contradict a definite bit of this value.
    ///
    /// `concrete` is truncated to the width first.
    pub fn differing_bits(&self, concrete: u32) -> u32 {
        (concrete ^ self.value) & self.definite_mask()
    }

    pub fn agrees_with(&self, concrete: u32) -> bool {
        self.differing_bits(concrete) == 0
    }

    /// One-bit value at `offset`.
    pub fn bit(&self, offset: u8) -> AbstractValue {
        debug_assert!(offset < self.bits);
        AbstractValue::new(self.value >> offset, self.top >> offset, 1)
    }

    /// Parses the `0xVALUE`, `0xVALUE?0xTOP` or `?` notation. Decimal numbers
    /// are accepted as well.
    ///
    /// A leading alphabetic region tag (`G0x10`) is accepted and ignored.
    pub fn parse(text: &str, bits: u8) -> Result<AbstractValue, Error> {
        let malformed = || Error::MalformedValue(text.into());
        let text = text.trim();
        if text == "?" {
            return Ok(AbstractValue::unknown(bits));
        }
        let text = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        let (value, top) = match text.find('?') {
            Some(pos) => (&text[..pos], Some(&text[pos + 1..])),
            None => (text, None),
        };
        let value = parse_number(value).ok_or_else(malformed)?;
        let top = match top {
            Some(s) => parse_number(s).ok_or_else(malformed)?,
            None => 0,
        };
        let mask = width_mask(bits);
        if value & !mask != 0 || top & !mask != 0 {
            return Err(malformed());
        }
        Ok(AbstractValue::new(value, top, bits))
    }

    /// Formats bit by bit, most significant first, with `?` for unknown bits.
    pub fn bit_string(&self) -> String {
        (0..self.bits).rev().map(|i| {
            if self.top & (1 << i) != 0 {
                '?'
            } else if self.value & (1 << i) != 0 {
                '1'
            } else {
                '0'
            }
        }).collect()
    }

    fn hex_digits(&self) -> usize {
        (self.bits as usize + 3) / 4
    }
}

/// `0x`-prefixed hex, or plain decimal.
fn parse_number(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(digits) if !digits.is_empty() => u32::from_str_radix(digits, 16).ok(),
        Some(_) => None,
        None if !text.is_empty() && text.bytes().all(|x| x.is_ascii_digit()) => {
            text.parse().ok()
        }
        None => None,
    }
}

impl fmt::Debug for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AbstractValue({}, {}b)", self, self.bits)
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let width = self.hex_digits();
        if self.is_concrete() {
            write!(f, "0x{:0width$x}", self.value, width = width)
        } else {
            write!(f, "0x{:0width$x}?0x{:0width$x}", self.value, self.top, width = width)
        }
    }
}

impl fmt::LowerHex for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::LowerHex::fmt(&self.value, f)
    }
}
