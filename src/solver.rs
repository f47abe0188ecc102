/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Divider search.
//!
//! Every frequency here is in centi-hertz (hertz times [`FREQ_MULT`]).

use core::convert::TryFrom;

use crate::consts::*;
use crate::fraction::{DividerMode, DividerRatio};
use crate::{Error, OutputClass, OutputDivider};

/// Reference frequency with a parts-per-billion correction applied.
pub fn correct_reference(freq: u32, correction_ppb: i32) -> Result<u64, Error> {
    let base = freq as i128 * FREQ_MULT as i128;
    let corrected = base + base * correction_ppb as i128 / PPB;

    match u64::try_from(corrected) {
        Ok(0) | Err(_) => Err(Error::ArithmeticOverflow),
        Ok(f) => Ok(f),
    }
}

/// round(rem / divisor * c_max), `rem < divisor`.
fn fraction(rem: u64, divisor: u64) -> Result<u32, Error> {
    let scaled = rem
        .checked_mul(FRAC_DENOM_MAX as u64)
        .and_then(|s| s.checked_add(divisor / 2))
        .ok_or(Error::ArithmeticOverflow)?;
    Ok((scaled / divisor) as u32)
}

/// Closest `a + b / c` to `num / den` with `c` no larger than [`FRAC_DENOM_MAX`].
fn best_ratio(num: u64, den: u64) -> Result<DividerRatio, Error> {
    if den == 0 {
        return Err(Error::InvalidParameter);
    }

    let mut a = num / den;
    let mut b = fraction(num % den, den)?;
    if b == FRAC_DENOM_MAX {
        a += 1;
        b = 0;
    }

    let a = u32::try_from(a).map_err(|_| Error::InvalidRange)?;
    DividerRatio::new(a, b, FRAC_DENOM_MAX)
}

/// Feedback divider for a PLL.
///
/// Returns the ratio and the VCO frequency it really produces from `reference`.
pub fn solve_pll(vco: u64, reference: u64) -> Result<(DividerRatio, u64), Error> {
    if !(PLL_VCO_MIN * FREQ_MULT..=PLL_VCO_MAX * FREQ_MULT).contains(&vco) {
        return Err(Error::InvalidRange);
    }

    let ratio = best_ratio(vco, reference)?;
    let a = ratio.integer_part();
    if a < PLL_A_MIN || a > PLL_A_MAX || (a == PLL_A_MAX && ratio.numerator() != 0) {
        return Err(Error::InvalidRange);
    }

    Ok((ratio, ratio.multiply(reference)?))
}

/// Lowest multisynth frequency the class can run before the R divider.
pub fn output_floor(class: OutputClass) -> u64 {
    match class {
        OutputClass::Standard => MULTISYNTH_MIN_FREQ * FREQ_MULT,
        OutputClass::Restricted => {
            let min = PLL_VCO_MIN * FREQ_MULT;
            let a = MULTISYNTH67_A_MAX as u64;
            (min + a - 1) / a
        }
    }
}

fn output_ceiling(class: OutputClass) -> u64 {
    match class {
        OutputClass::Standard => MULTISYNTH_MAX_FREQ * FREQ_MULT,
        OutputClass::Restricted => MULTISYNTH67_MAX_FREQ * FREQ_MULT,
    }
}

pub fn check_output_range(class: OutputClass, freq: u64) -> Result<(), Error> {
    if freq < output_floor(class) || freq > output_ceiling(class) {
        return Err(Error::InvalidRange);
    }
    Ok(())
}

/// Picks the R divider: doubles `freq` until it reaches `floor`.
///
/// Returns the divider and the frequency the multisynth has to produce.
pub fn select_r_div(freq: u64, floor: u64) -> Result<(OutputDivider, u64), Error> {
    let mut exponent = 0;
    let mut scaled = freq;

    while scaled < floor {
        if exponent == R_DIV_MAX_EXPONENT {
            return Err(Error::InvalidRange);
        }
        scaled = scaled.checked_mul(2).ok_or(Error::ArithmeticOverflow)?;
        exponent += 1;
    }

    Ok((OutputDivider::from_bits(exponent), scaled))
}

/// Output divider against a VCO that is already running.
pub fn solve_output(class: OutputClass, freq: u64, vco: u64) -> Result<DividerRatio, Error> {
    check_output_range(class, freq)?;

    let ratio = match class {
        OutputClass::Standard => {
            let ratio = best_ratio(vco, freq)?;
            let a = ratio.integer_part();
            let even_only = freq > MULTISYNTH_EVEN_FREQ * FREQ_MULT;
            let valid = match ratio.mode() {
                DividerMode::DivideBy4 => true,
                _ if freq >= MULTISYNTH_DIVBY4_FREQ * FREQ_MULT => false,
                DividerMode::Integer => {
                    (MULTISYNTH_A_MIN..=MULTISYNTH_A_MAX).contains(&a) && !(even_only && a % 2 != 0)
                }
                DividerMode::Fractional => {
                    !even_only && (MULTISYNTH_A_MIN..MULTISYNTH_A_MAX).contains(&a)
                }
            };
            if !valid {
                return Err(Error::InvalidRange);
            }
            ratio
        }
        OutputClass::Restricted => {
            let a = (vco + freq / 2) / freq;
            let (a_min, a_max) = (MULTISYNTH67_A_MIN as u64, MULTISYNTH67_A_MAX as u64);
            if a < a_min || a > a_max || a % 2 != 0 {
                return Err(Error::InvalidRange);
            }

            // integer only: accept when within one part in c_max
            let produced = a * freq;
            let error = if produced > vco { produced - vco } else { vco - produced };
            if error
                .checked_mul(FRAC_DENOM_MAX as u64)
                .ok_or(Error::ArithmeticOverflow)?
                > produced
            {
                return Err(Error::InvalidRange);
            }
            DividerRatio::integer(a as u32)
        }
    };

    Ok(ratio)
}

/// `vco / ratio / r_div`, rounded to nearest.
pub fn output_frequency(vco: u64, ratio: &DividerRatio, r_div: OutputDivider) -> Result<u64, Error> {
    let c = ratio.denominator() as u64;
    let divisor = (ratio.integer_part() as u64)
        .checked_mul(c)
        .and_then(|ac| ac.checked_add(ratio.numerator() as u64))
        .and_then(|d| d.checked_mul(r_div.denominator() as u64))
        .ok_or(Error::ArithmeticOverflow)?;
    if divisor == 0 {
        return Err(Error::InvalidParameter);
    }

    let scaled = vco
        .checked_mul(c)
        .and_then(|s| s.checked_add(divisor / 2))
        .ok_or(Error::ArithmeticOverflow)?;
    Ok(scaled / divisor)
}

/// Integer output divider for a channel that gets to choose its VCO.
///
/// The VCO to tune is `ratio * freq`.
pub fn output_for_free_vco(class: OutputClass, freq: u64) -> Result<DividerRatio, Error> {
    check_output_range(class, freq)?;

    let vco_min = PLL_VCO_MIN * FREQ_MULT;
    let vco_max = PLL_VCO_MAX * FREQ_MULT;

    let a = match class {
        OutputClass::Standard => {
            if freq >= MULTISYNTH_DIVBY4_FREQ * FREQ_MULT {
                MULTISYNTH_A_DIVBY4 as u64
            } else {
                match vco_max / freq {
                    7 if freq > MULTISYNTH_EVEN_FREQ * FREQ_MULT => 6,
                    a => a,
                }
            }
        }
        OutputClass::Restricted => {
            let mut a = (vco_max - MULTISYNTH67_VCO_MARGIN * FREQ_MULT) / freq;
            if a % 2 != 0 {
                a += 1;
            }
            a = a.max(MULTISYNTH67_A_MIN as u64).min(MULTISYNTH67_A_MAX as u64);

            if a * freq > vco_max {
                a -= 2;
            } else if a * freq < vco_min {
                a += 2;
            }
            a
        }
    };

    let vco = a.checked_mul(freq).ok_or(Error::ArithmeticOverflow)?;
    if !(vco_min..=vco_max).contains(&vco) {
        return Err(Error::InvalidRange);
    }

    let ratio = DividerRatio::integer(a as u32);
    match class {
        OutputClass::Standard => {
            if ratio.mode() != DividerMode::DivideBy4
                && !(MULTISYNTH_A_MIN..=MULTISYNTH_A_MAX).contains(&ratio.integer_part())
            {
                return Err(Error::InvalidRange);
            }
        }
        OutputClass::Restricted => {
            if !(MULTISYNTH67_A_MIN..=MULTISYNTH67_A_MAX).contains(&ratio.integer_part()) {
                return Err(Error::InvalidRange);
            }
        }
    }
    Ok(ratio)
}
