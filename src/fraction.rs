/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Divider ratios and their p1/p2/p3 register encoding.

use crate::consts::*;
use crate::{Error, OutputDivider};

/// A divider `a + b / c`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DividerRatio {
    integer: u32,
    numerator: u32,
    denominator: u32,
}

/// How a multisynth runs a given ratio.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DividerMode {
    Fractional,
    /// Zero numerator; MSx_INT may be set for lower jitter
    Integer,
    /// Exactly 4, encoded with the MSx_DIVBY4 bits instead of p1
    DivideBy4,
}

/// The three multisynth parameters as written to the chip.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterFields {
    pub p1: u32,
    pub p2: u32,
    pub p3: u32,
}

const DIVBY4_BITS: u8 = 0b0000_1100;

impl DividerRatio {
    pub fn new(integer: u32, numerator: u32, denominator: u32) -> Result<Self, Error> {
        if denominator == 0 || denominator > FRAC_DENOM_MAX || numerator >= denominator {
            return Err(Error::InvalidParameter);
        }
        if numerator == 0 {
            return Ok(DividerRatio::integer(integer));
        }
        Ok(DividerRatio {
            integer,
            numerator,
            denominator,
        })
    }

    pub fn integer(integer: u32) -> Self {
        DividerRatio {
            integer,
            numerator: 0,
            denominator: 1,
        }
    }

    pub fn integer_part(&self) -> u32 {
        self.integer
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    /// The mode the hardware has to use for this ratio; derived from the
    /// value alone, never from what a caller asked for.
    pub fn mode(&self) -> DividerMode {
        match (self.integer, self.numerator) {
            (MULTISYNTH_A_DIVBY4, 0) => DividerMode::DivideBy4,
            (_, 0) => DividerMode::Integer,
            _ => DividerMode::Fractional,
        }
    }

    /// `freq * (a + b / c)`, rounded down.
    pub fn multiply(&self, freq: u64) -> Result<u64, Error> {
        let whole = freq
            .checked_mul(self.integer as u64)
            .ok_or(Error::ArithmeticOverflow)?;
        let frac = freq
            .checked_mul(self.numerator as u64)
            .ok_or(Error::ArithmeticOverflow)?
            / self.denominator as u64;
        whole.checked_add(frac).ok_or(Error::ArithmeticOverflow)
    }
}

/// Packs a ratio into p1/p2/p3.
///
/// `mode` has to agree with [`DividerRatio::mode`]: integers are never
/// written as fractions and divide-by-4 is only used for a ratio of 4.
pub fn encode(ratio: &DividerRatio, mode: DividerMode) -> Result<RegisterFields, Error> {
    if mode != ratio.mode() {
        return Err(Error::InvalidParameter);
    }

    let fields = match mode {
        DividerMode::DivideBy4 => RegisterFields { p1: 0, p2: 0, p3: 1 },
        DividerMode::Integer => RegisterFields {
            p1: ratio
                .integer
                .checked_mul(128)
                .and_then(|p| p.checked_sub(512))
                .ok_or(Error::InvalidRange)?,
            p2: 0,
            p3: 1,
        },
        DividerMode::Fractional => {
            let (a, b, c) = (
                ratio.integer as u64,
                ratio.numerator as u64,
                ratio.denominator as u64,
            );
            let floor = 128 * b / c;
            let p1 = (128 * a + floor)
                .checked_sub(512)
                .ok_or(Error::InvalidRange)?;
            RegisterFields {
                p1: p1 as u32,
                p2: (128 * b - c * floor) as u32,
                p3: c as u32,
            }
        }
    };

    fields.check()?;
    Ok(fields)
}

/// Inverse of [`encode`].
pub fn decode(fields: &RegisterFields, mode: DividerMode) -> Result<DividerRatio, Error> {
    fields.check()?;

    if mode == DividerMode::DivideBy4 {
        return if *fields == (RegisterFields { p1: 0, p2: 0, p3: 1 }) {
            Ok(DividerRatio::integer(MULTISYNTH_A_DIVBY4))
        } else {
            Err(Error::InvalidParameter)
        };
    }

    if fields.p3 == 0 || fields.p2 >= fields.p3 {
        return Err(Error::InvalidParameter);
    }

    // p1 + 512 = 128a + floor(128b / c) and 128b = floor(128b / c) * c + p2
    let sum = fields.p1 + 512;
    let integer = sum / 128;
    let floor = (sum % 128) as u64;
    let scaled = floor * fields.p3 as u64 + fields.p2 as u64;
    if scaled % 128 != 0 {
        return Err(Error::InvalidParameter);
    }

    let ratio = DividerRatio::new(integer, (scaled / 128) as u32, fields.p3)?;
    if ratio.mode() != mode {
        return Err(Error::InvalidParameter);
    }
    Ok(ratio)
}

/// MS6 and MS7 take an integer divider straight in p1.
pub fn encode_simple(ratio: &DividerRatio) -> Result<RegisterFields, Error> {
    if ratio.numerator != 0 {
        return Err(Error::InvalidParameter);
    }
    if !(MULTISYNTH67_A_MIN..=MULTISYNTH67_A_MAX).contains(&ratio.integer) {
        return Err(Error::InvalidRange);
    }
    Ok(RegisterFields {
        p1: ratio.integer,
        p2: 0,
        p3: 0,
    })
}

pub fn decode_simple(fields: &RegisterFields) -> Result<DividerRatio, Error> {
    if fields.p2 != 0 || fields.p3 != 0 {
        return Err(Error::InvalidParameter);
    }
    if !(MULTISYNTH67_A_MIN..=MULTISYNTH67_A_MAX).contains(&fields.p1) {
        return Err(Error::InvalidRange);
    }
    Ok(DividerRatio::integer(fields.p1))
}

impl RegisterFields {
    fn check(&self) -> Result<(), Error> {
        if self.p1 > P1_MAX || self.p2 > P2_MAX || self.p3 > P3_MAX {
            return Err(Error::InvalidRange);
        }
        Ok(())
    }

    /// The eight-byte parameter block, starting at the block's base address.
    pub fn to_bytes(&self, r_div: OutputDivider, divby4: bool) -> [u8; 8] {
        let (p1, p2, p3) = (self.p1, self.p2, self.p3);
        let divby4 = if divby4 { DIVBY4_BITS } else { 0 };

        [
            ((p3 & 0x0000FF00) >> 8) as u8,
            p3 as u8,
            ((p1 & 0x00030000) >> 16) as u8 | divby4 | (r_div.bits() << 4),
            ((p1 & 0x0000FF00) >> 8) as u8,
            p1 as u8,
            (((p3 & 0x000F0000) >> 12) | ((p2 & 0x000F0000) >> 16)) as u8,
            ((p2 & 0x0000FF00) >> 8) as u8,
            p2 as u8,
        ]
    }

    /// Parses a parameter block back into fields, R divider and divide-by-4 flag.
    pub fn from_bytes(bytes: &[u8; 8]) -> (RegisterFields, OutputDivider, bool) {
        let p3 = ((bytes[5] as u32 & 0xF0) << 12) | ((bytes[0] as u32) << 8) | bytes[1] as u32;
        let p1 = ((bytes[2] as u32 & 0x03) << 16) | ((bytes[3] as u32) << 8) | bytes[4] as u32;
        let p2 = ((bytes[5] as u32 & 0x0F) << 16) | ((bytes[6] as u32) << 8) | bytes[7] as u32;

        (
            RegisterFields { p1, p2, p3 },
            OutputDivider::from_bits((bytes[2] >> 4) & 0b111),
            bytes[2] & DIVBY4_BITS == DIVBY4_BITS,
        )
    }
}
