/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Chip limits.
//!
//! Frequencies are given in hertz; the planner works in hundredths of a
//! hertz, so multiply by [`FREQ_MULT`] before comparing.

/// Fixed-point multiplier: internal frequencies are centi-hertz.
pub const FREQ_MULT: u64 = 100;

/// Crystal fitted to most breakout boards
pub const XTAL_FREQ: u32 = 25_000_000;

pub const PLL_VCO_MIN: u64 = 600_000_000;
pub const PLL_VCO_MAX: u64 = 900_000_000;

pub const MULTISYNTH_MIN_FREQ: u64 = 500_000;
/// Above this frequency MS0..MS5 only divide by an even integer
pub const MULTISYNTH_EVEN_FREQ: u64 = 112_500_000;
/// At and above this frequency MS0..MS5 must run in divide-by-4 mode
pub const MULTISYNTH_DIVBY4_FREQ: u64 = 150_000_000;
pub const MULTISYNTH_MAX_FREQ: u64 = 225_000_000;
pub const MULTISYNTH67_MAX_FREQ: u64 = MULTISYNTH_DIVBY4_FREQ;

/// Headroom below the VCO maximum when MS6/MS7 pick the VCO
pub const MULTISYNTH67_VCO_MARGIN: u64 = 1_000_000;

pub const PLL_A_MIN: u32 = 15;
pub const PLL_A_MAX: u32 = 90;

pub const MULTISYNTH_A_MIN: u32 = 6;
pub const MULTISYNTH_A_MAX: u32 = 1800;
pub const MULTISYNTH_A_DIVBY4: u32 = 4;
pub const MULTISYNTH67_A_MIN: u32 = 4;
pub const MULTISYNTH67_A_MAX: u32 = 254;

/// Largest fractional denominator, also the resolution every solver aims for
pub const FRAC_DENOM_MAX: u32 = 0xF_FFFF;

pub const P1_MAX: u32 = (1 << 18) - 1;
pub const P2_MAX: u32 = (1 << 20) - 1;
pub const P3_MAX: u32 = (1 << 20) - 1;

pub const R_DIV_MAX_EXPONENT: u8 = 7;

/// Corrections are expressed in parts per billion
pub const PPB: i128 = 1_000_000_000;
