/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
/*!
A frequency planner and platform agnostic driver for the [Si5351], based on
the [`embedded-hal`] traits.

## The Device

The Silicon Labs [Si5351] is an any-frequency CMOS clock generator: two
PLLs multiply a reference up to 600..900 MHz, and eight output multisynths
divide one of the two VCOs back down. CLK0..CLK5 have fractional dividers,
CLK6 and CLK7 only integer ones.

The device has an I²C interface.

## Planning

[`Planner`] keeps track of which output runs from which PLL and works out
every divider in fixed point (hundredths of a hertz). The first output that
tunes a PLL picks its VCO; outputs joining later keep it, so they never
disturb what is already running. A request that can't be met from the
current VCO retunes the PLL and re-solves its other outputs, or fails with
[`Error::UnreachableWithCurrentPll`] under [`RetunePolicy::Strict`].

Each request returns a [`Plan`] holding the register images to write. The
planner doesn't touch the bus and can be used on its own:

```
use si5351_synth::{ClockOutput, Planner, PLL};

let mut planner = Planner::new(25_000_000);
let plan = planner.plan_frequency(ClockOutput::Clk0, 10_000_000, false).unwrap();
assert!(plan.pll(PLL::A).is_some());
```

## Usage

Instantiate the device over any `embedded_hal` I²C implementation:

```ignore
use si5351_synth::{Si5351, Si5351Device};

let mut clock = Si5351Device::new(i2c, false, 25_000_000);
clock.init(si5351_synth::CrystalLoad::_10)?;
```

Or, if you have an [Adafruit module], you can use shortcut functions to initializate it:

```ignore
let mut clock = Si5351Device::new_adafruit_module(i2c);
clock.init_adafruit_module()?;
```

And set frequency on one of the outputs:

```ignore
clock.set_frequency(si5351_synth::ClockOutput::Clk0, 14_175_000, false)?;
```

[Si5351]: https://www.silabs.com/documents/public/data-sheets/Si5351-B.pdf
[`embedded-hal`]: https://github.com/japaric/embedded-hal
[Adafruit module]: https://www.adafruit.com/product/2045
*/
//#![deny(missing_docs)]
#![no_std]

#[macro_use]
extern crate bitflags;

use core::fmt;

/// Emits a `defmt` debug record when the `defmt` feature is on.
macro_rules! debug {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        {
            defmt::debug!($fmt $(, $arg)*);
        }
        #[cfg(not(feature = "defmt"))]
        {
            $( let _ = &$arg; )*
        }
    }};
}

pub mod consts;
pub mod device;
pub mod fraction;
pub mod planner;
pub mod solver;

pub use crate::device::{DeviceStatusBits, Si5351, Si5351Device};
pub use crate::fraction::{DividerMode, DividerRatio, RegisterFields};
pub use crate::planner::{Plan, Planner, RetunePolicy};

/// Planning errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A frequency or divider is outside what the chip supports
    InvalidRange,
    /// The target needs a PLL retune that would disturb other outputs
    UnreachableWithCurrentPll,
    /// An intermediate value doesn't fit, or a corrected reference is zero
    ArithmeticOverflow,
    /// Malformed ratio or register image, or an unusable reference
    InvalidParameter,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRange => write!(f, "frequency or divider out of range"),
            Error::UnreachableWithCurrentPll => {
                write!(f, "target unreachable without retuning a shared PLL")
            }
            Error::ArithmeticOverflow => write!(f, "arithmetic overflow"),
            Error::InvalidParameter => write!(f, "invalid parameter"),
        }
    }
}

/// Errors of the I²C driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError<E> {
    /// The bus failed; the transport's error is passed through
    CommunicationError(E),
    /// The request couldn't be planned; nothing was written
    Synth(Error),
}

impl<E> From<Error> for DeviceError<E> {
    fn from(e: Error) -> Self {
        DeviceError::Synth(e)
    }
}

impl<E: fmt::Debug> fmt::Display for DeviceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::CommunicationError(e) => write!(f, "I2C error: {:?}", e),
            DeviceError::Synth(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CrystalLoad {
    _6,
    _8,
    _10,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PLL {
    A,
    B,
}

/// Reference a PLL runs from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllInput {
    Xtal,
    Clkin,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FeedbackMultisynth {
    MSNA,
    MSNB,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Multisynth {
    MS0,
    MS1,
    MS2,
    MS3,
    MS4,
    MS5,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SimpleMultisynth {
    MS6,
    MS7,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockOutput {
    Clk0 = 0,
    Clk1,
    Clk2,
    Clk3,
    Clk4,
    Clk5,
    Clk6,
    Clk7,
}

/// Kind of multisynth behind an output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputClass {
    /// MS0..MS5: fractional, divide-by-4 above 150 MHz
    Standard,
    /// MS6, MS7: integer only, up to 150 MHz
    Restricted,
}

/// R post-divider, `Div1` through `Div128`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputDivider {
    Div1 = 0,
    Div2,
    Div4,
    Div8,
    Div16,
    Div32,
    Div64,
    Div128,
}

impl PLL {
    pub const ALL: [PLL; 2] = [PLL::A, PLL::B];

    pub fn ix(self) -> usize {
        self as usize
    }

    pub fn multisynth(self) -> FeedbackMultisynth {
        match self {
            PLL::A => FeedbackMultisynth::MSNA,
            PLL::B => FeedbackMultisynth::MSNB,
        }
    }
}

impl PllInput {
    pub fn ix(self) -> usize {
        self as usize
    }
}

impl ClockOutput {
    pub const ALL: [ClockOutput; 8] = [
        ClockOutput::Clk0,
        ClockOutput::Clk1,
        ClockOutput::Clk2,
        ClockOutput::Clk3,
        ClockOutput::Clk4,
        ClockOutput::Clk5,
        ClockOutput::Clk6,
        ClockOutput::Clk7,
    ];

    pub fn ix(self) -> usize {
        self as usize
    }

    pub fn class(self) -> OutputClass {
        match self {
            ClockOutput::Clk6 | ClockOutput::Clk7 => OutputClass::Restricted,
            _ => OutputClass::Standard,
        }
    }

    pub fn multisynth(self) -> Option<Multisynth> {
        match self {
            ClockOutput::Clk0 => Some(Multisynth::MS0),
            ClockOutput::Clk1 => Some(Multisynth::MS1),
            ClockOutput::Clk2 => Some(Multisynth::MS2),
            ClockOutput::Clk3 => Some(Multisynth::MS3),
            ClockOutput::Clk4 => Some(Multisynth::MS4),
            ClockOutput::Clk5 => Some(Multisynth::MS5),
            _ => None,
        }
    }

    pub fn simple_multisynth(self) -> Option<SimpleMultisynth> {
        match self {
            ClockOutput::Clk6 => Some(SimpleMultisynth::MS6),
            ClockOutput::Clk7 => Some(SimpleMultisynth::MS7),
            _ => None,
        }
    }
}

impl OutputDivider {
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Inverse of [`bits`](Self::bits); only the low three bits count.
    pub fn from_bits(bits: u8) -> OutputDivider {
        match bits & 0b111 {
            0 => OutputDivider::Div1,
            1 => OutputDivider::Div2,
            2 => OutputDivider::Div4,
            3 => OutputDivider::Div8,
            4 => OutputDivider::Div16,
            5 => OutputDivider::Div32,
            6 => OutputDivider::Div64,
            _ => OutputDivider::Div128,
        }
    }

    pub fn denominator(self) -> u8 {
        1 << self.bits()
    }
}
