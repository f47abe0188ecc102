/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! I²C driver: applies [`Plan`]s to the chip.

use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::fraction::DividerMode;
use crate::planner::{ChannelState, Plan, Planner, RetunePolicy};
use crate::{
    ClockOutput, CrystalLoad, DeviceError, FeedbackMultisynth, Multisynth, OutputDivider, PllInput,
    SimpleMultisynth, PLL,
};

const ADDRESS: u8 = 0b0110_0000;

trait FractionalMultisynth {
    fn base_addr(&self) -> u8;
    /// Bit of this multisynth's MS_INT flag; the feedback ones live in the
    /// CLK6/CLK7 control registers.
    fn ix(&self) -> u8;
}

impl FractionalMultisynth for FeedbackMultisynth {
    fn base_addr(&self) -> u8 {
        match *self {
            FeedbackMultisynth::MSNA => 26,
            FeedbackMultisynth::MSNB => 34,
        }
    }
    fn ix(&self) -> u8 {
        match *self {
            FeedbackMultisynth::MSNA => 6,
            FeedbackMultisynth::MSNB => 7,
        }
    }
}

impl FractionalMultisynth for Multisynth {
    fn base_addr(&self) -> u8 {
        42 + 8 * self.ix()
    }
    fn ix(&self) -> u8 {
        *self as u8
    }
}

impl SimpleMultisynth {
    pub fn base_addr(&self) -> u8 {
        match *self {
            SimpleMultisynth::MS6 => 90,
            SimpleMultisynth::MS7 => 91,
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum Register {
    DeviceStatus = 0,
    OutputEnable = 3,
    PllInputSource = 15,
    Clk0 = 16,
    Clk1 = 17,
    Clk2 = 18,
    Clk3 = 19,
    Clk4 = 20,
    Clk5 = 21,
    Clk6 = 22,
    Clk7 = 23,
    Ms67OutputDivider = 92,
    Clk0PhaseOffset = 165,
    Clk1PhaseOffset = 166,
    Clk2PhaseOffset = 167,
    Clk3PhaseOffset = 168,
    Clk4PhaseOffset = 169,
    Clk5PhaseOffset = 170,
    PLLReset = 177,
    CrystalLoad = 183,
}

impl Register {
    pub fn addr(&self) -> u8 {
        *self as u8
    }
}

bitflags! {
    pub struct DeviceStatusBits: u8 {
        const SYS_INIT = 0b1000_0000;
        const LOL_B = 0b0100_0000;
        const LOL_A = 0b0010_0000;
        const LOS = 0b0001_0000;
    }
}

bitflags! {
    struct CrystalLoadBits: u8 {
        const RESERVED = 0b00_010010;
        const CL_MASK = 0b11_000000;
        const CL_6 = 0b01_000000;
        const CL_8 = 0b10_000000;
        const CL_10 = 0b11_000000;
    }
}

bitflags! {
    struct ClockControlBits: u8 {
        const CLK_PDN = 0b1000_0000;
        const MS_INT = 0b0100_0000;
        const MS_SRC = 0b0010_0000;
        const CLK_INV = 0b0001_0000;
        const CLK_SRC_MASK = 0b0000_1100;
        const CLK_SRC_XTAL = 0b0000_0000;
        const CLK_SRC_CLKIN = 0b0000_0100;
        const CLK_SRC_MS_ALT = 0b0000_1000;
        const CLK_SRC_MS = 0b0000_1100;
        const CLK_DRV_MASK = 0b0000_0011;
        const CLK_DRV_2 = 0b0000_0000;
        const CLK_DRV_4 = 0b0000_0001;
        const CLK_DRV_6 = 0b0000_0010;
        const CLK_DRV_8 = 0b0000_0011;
    }
}

bitflags! {
    struct PllInputBits: u8 {
        const PLLB_SRC_CLKIN = 0b0000_1000;
        const PLLA_SRC_CLKIN = 0b0000_0100;
    }
}

bitflags! {
    struct PLLResetBits: u8 {
        const PLLB_RST = 0b1000_0000;
        const PLLA_RST = 0b0010_0000;
    }
}

impl ClockOutput {
    fn register(self) -> Register {
        match self {
            ClockOutput::Clk0 => Register::Clk0,
            ClockOutput::Clk1 => Register::Clk1,
            ClockOutput::Clk2 => Register::Clk2,
            ClockOutput::Clk3 => Register::Clk3,
            ClockOutput::Clk4 => Register::Clk4,
            ClockOutput::Clk5 => Register::Clk5,
            ClockOutput::Clk6 => Register::Clk6,
            ClockOutput::Clk7 => Register::Clk7,
        }
    }

    fn phase_register(self) -> Option<Register> {
        match self {
            ClockOutput::Clk0 => Some(Register::Clk0PhaseOffset),
            ClockOutput::Clk1 => Some(Register::Clk1PhaseOffset),
            ClockOutput::Clk2 => Some(Register::Clk2PhaseOffset),
            ClockOutput::Clk3 => Some(Register::Clk3PhaseOffset),
            ClockOutput::Clk4 => Some(Register::Clk4PhaseOffset),
            ClockOutput::Clk5 => Some(Register::Clk5PhaseOffset),
            _ => None,
        }
    }
}

fn i2c_error<E>(e: E) -> DeviceError<E> {
    DeviceError::CommunicationError(e)
}

/// Si5351 driver
pub struct Si5351Device<I2C> {
    i2c: I2C,
    address: u8,
    planner: Planner,
    clk_enabled_mask: u8,
    ms_int_mode_mask: u8,
    ms_src_mask: u8,
}

pub trait Si5351 {
    type Error;

    fn init_adafruit_module(&mut self) -> Result<(), Self::Error>;
    fn init(&mut self, xtal_load: CrystalLoad) -> Result<(), Self::Error>;
    fn read_device_status(&mut self) -> Result<DeviceStatusBits, Self::Error>;

    /// Tunes `clk` to `freq` Hz, retuning its PLL when it has to (or when
    /// `force_retune` is set), and enables the output.
    fn set_frequency(&mut self, clk: ClockOutput, freq: u32, force_retune: bool) -> Result<(), Self::Error>;
    /// Same as [`set_frequency`](Self::set_frequency) with `freq` in hundredths of a hertz.
    fn set_frequency_centihertz(
        &mut self,
        clk: ClockOutput,
        freq: u64,
        force_retune: bool,
    ) -> Result<(), Self::Error>;
    /// Tunes the PLL of `clk` to `vco` and `clk` to `freq`, both in hundredths of a hertz.
    fn set_frequency_manual(&mut self, clk: ClockOutput, freq: u64, vco: u64) -> Result<(), Self::Error>;

    fn set_correction(&mut self, correction_ppb: i32, input: PllInput) -> Result<(), Self::Error>;
    /// Correction of `input` in parts per billion.
    fn get_correction(&self, input: PllInput) -> i32;
    fn set_reference_frequency(&mut self, freq: u32, input: PllInput) -> Result<(), Self::Error>;
    fn set_pll_input(&mut self, pll: PLL, input: PllInput) -> Result<(), Self::Error>;
    fn select_clock_pll(&mut self, clock: ClockOutput, pll: PLL);

    fn set_clock_enabled(&mut self, clk: ClockOutput, enabled: bool);
    fn flush_output_enabled(&mut self) -> Result<(), Self::Error>;
    fn flush_clock_control(&mut self, clk: ClockOutput) -> Result<(), Self::Error>;

    fn set_phase(&mut self, clock: ClockOutput, phase: u8) -> Result<(), Self::Error>;

    /// VCO frequency of `pll` in hundredths of a hertz, if it has been tuned.
    fn get_vco_frequency(&self, pll: PLL) -> Option<u64>;
}

impl<I2C, E> Si5351Device<I2C>
where
    I2C: WriteRead<Error = E> + Write<Error = E>,
{
    /// Creates a new driver from a I2C peripheral
    pub fn new(i2c: I2C, address_bit: bool, xtal_freq: u32) -> Self {
        Si5351Device {
            i2c,
            address: ADDRESS | if address_bit { 1 } else { 0 },
            planner: Planner::new(xtal_freq),
            clk_enabled_mask: 0,
            ms_int_mode_mask: 0,
            ms_src_mask: 0,
        }
    }

    pub fn new_adafruit_module(i2c: I2C) -> Self {
        Si5351Device::new(i2c, false, crate::consts::XTAL_FREQ)
    }

    pub fn with_policy(self, policy: RetunePolicy) -> Self {
        Si5351Device {
            planner: self.planner.with_policy(policy),
            ..self
        }
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Writes every register a plan touches, resetting retuned PLLs last.
    fn apply(&mut self, plan: &Plan) -> Result<(), DeviceError<E>> {
        let mut reset = PLLResetBits::empty();

        for setting in plan.plls() {
            let ms = setting.pll.multisynth();
            self.write_synth_registers(ms, setting.fields.to_bytes(OutputDivider::Div1, false))?;
            self.set_int_mode(ms, setting.ratio.numerator() == 0);

            // feedback MS_INT sits in the CLK6/CLK7 control registers
            let control = match setting.pll {
                PLL::A => ClockOutput::Clk6,
                PLL::B => ClockOutput::Clk7,
            };
            self.flush_clock_control(control)?;

            if setting.reset {
                reset |= match setting.pll {
                    PLL::A => PLLResetBits::PLLA_RST,
                    PLL::B => PLLResetBits::PLLB_RST,
                };
            }
        }

        let mut simple_r_div = false;
        for setting in plan.outputs() {
            if let Some(ms) = setting.clk.multisynth() {
                let divby4 = setting.mode == DividerMode::DivideBy4;
                self.write_synth_registers(ms, setting.fields.to_bytes(setting.r_div, divby4))?;
                self.set_int_mode(ms, setting.mode != DividerMode::Fractional);
            } else if let Some(ms) = setting.clk.simple_multisynth() {
                self.write_raw(ms.base_addr(), setting.fields.p1 as u8)?;
                simple_r_div = true;
            }

            self.route_clock(setting.clk, setting.pll);
            self.flush_clock_control(setting.clk)?;
        }

        if simple_r_div {
            self.flush_simple_output_dividers()?;
        }

        if !reset.is_empty() {
            self.write_register(Register::PLLReset, reset.bits())?;
        }
        self.flush_output_enabled()
    }

    fn set_int_mode<MS: FractionalMultisynth>(&mut self, ms: MS, int: bool) {
        let bit = 1u8 << ms.ix();
        if int {
            self.ms_int_mode_mask |= bit;
        } else {
            self.ms_int_mode_mask &= !bit;
        }
    }

    fn route_clock(&mut self, clock: ClockOutput, pll: PLL) {
        let bit = 1u8 << clock.ix();
        match pll {
            PLL::A => self.ms_src_mask &= !bit,
            PLL::B => self.ms_src_mask |= bit,
        }
    }

    /// CLK6 and CLK7 share one R divider register.
    fn flush_simple_output_dividers(&mut self) -> Result<(), DeviceError<E>> {
        let r_div = |clk| match self.planner.channel(clk).state {
            ChannelState::Configured(tuning) => tuning.r_div.bits(),
            ChannelState::Unconfigured => OutputDivider::Div1.bits(),
        };
        let byte = r_div(ClockOutput::Clk6) | (r_div(ClockOutput::Clk7) << 4);
        self.write_register(Register::Ms67OutputDivider, byte)
    }

    fn flush_pll_input(&mut self) -> Result<(), DeviceError<E>> {
        let mut bits = PllInputBits::empty();
        if self.planner.pll(PLL::A).input == PllInput::Clkin {
            bits |= PllInputBits::PLLA_SRC_CLKIN;
        }
        if self.planner.pll(PLL::B).input == PllInput::Clkin {
            bits |= PllInputBits::PLLB_SRC_CLKIN;
        }
        self.write_register(Register::PllInputSource, bits.bits())
    }

    fn read_register(&mut self, reg: Register) -> Result<u8, DeviceError<E>> {
        let mut buffer = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg.addr()], &mut buffer)
            .map_err(i2c_error)?;
        Ok(buffer[0])
    }

    fn write_register(&mut self, reg: Register, byte: u8) -> Result<(), DeviceError<E>> {
        self.write_raw(reg.addr(), byte)
    }

    fn write_raw(&mut self, addr: u8, byte: u8) -> Result<(), DeviceError<E>> {
        self.i2c.write(self.address, &[addr, byte]).map_err(i2c_error)
    }

    fn write_synth_registers<MS: FractionalMultisynth>(
        &mut self,
        ms: MS,
        params: [u8; 8],
    ) -> Result<(), DeviceError<E>> {
        self.i2c
            .write(
                self.address,
                &[
                    ms.base_addr(),
                    params[0],
                    params[1],
                    params[2],
                    params[3],
                    params[4],
                    params[5],
                    params[6],
                    params[7],
                ],
            )
            .map_err(i2c_error)
    }
}

impl<I2C, E> Si5351 for Si5351Device<I2C>
where
    I2C: WriteRead<Error = E> + Write<Error = E>,
{
    type Error = DeviceError<E>;

    fn init_adafruit_module(&mut self) -> Result<(), Self::Error> {
        self.init(CrystalLoad::_10)
    }

    fn init(&mut self, xtal_load: CrystalLoad) -> Result<(), Self::Error> {
        loop {
            let device_status = self.read_device_status()?;
            if !device_status.contains(DeviceStatusBits::SYS_INIT) {
                break;
            }
        }

        self.planner.reset();
        self.clk_enabled_mask = 0;
        self.flush_output_enabled()?;
        for &clk in ClockOutput::ALL.iter() {
            self.write_register(clk.register(), ClockControlBits::CLK_PDN.bits())?;
        }

        self.write_register(
            Register::CrystalLoad,
            (CrystalLoadBits::RESERVED
                | match xtal_load {
                    CrystalLoad::_6 => CrystalLoadBits::CL_6,
                    CrystalLoad::_8 => CrystalLoadBits::CL_8,
                    CrystalLoad::_10 => CrystalLoadBits::CL_10,
                })
            .bits(),
        )?;

        self.flush_pll_input()
    }

    fn read_device_status(&mut self) -> Result<DeviceStatusBits, Self::Error> {
        Ok(DeviceStatusBits::from_bits_truncate(
            self.read_register(Register::DeviceStatus)?,
        ))
    }

    fn set_frequency(&mut self, clk: ClockOutput, freq: u32, force_retune: bool) -> Result<(), Self::Error> {
        let plan = self.planner.plan_frequency(clk, freq, force_retune)?;
        self.set_clock_enabled(clk, true);
        self.apply(&plan)
    }

    fn set_frequency_centihertz(
        &mut self,
        clk: ClockOutput,
        freq: u64,
        force_retune: bool,
    ) -> Result<(), Self::Error> {
        let plan = self.planner.plan_frequency_centihertz(clk, freq, force_retune)?;
        self.set_clock_enabled(clk, true);
        self.apply(&plan)
    }

    fn set_frequency_manual(&mut self, clk: ClockOutput, freq: u64, vco: u64) -> Result<(), Self::Error> {
        let plan = self.planner.plan_manual(clk, freq, vco)?;
        self.set_clock_enabled(clk, true);
        self.apply(&plan)
    }

    fn set_correction(&mut self, correction_ppb: i32, input: PllInput) -> Result<(), Self::Error> {
        let plan = self.planner.set_correction(correction_ppb, input)?;
        self.apply(&plan)
    }

    fn get_correction(&self, input: PllInput) -> i32 {
        self.planner.reference(input).correction_ppb
    }

    fn set_reference_frequency(&mut self, freq: u32, input: PllInput) -> Result<(), Self::Error> {
        let plan = self.planner.set_reference(freq, input)?;
        self.apply(&plan)
    }

    fn set_pll_input(&mut self, pll: PLL, input: PllInput) -> Result<(), Self::Error> {
        let plan = self.planner.set_pll_input(pll, input)?;
        self.flush_pll_input()?;
        self.apply(&plan)
    }

    /// Moves `clock` to `pll`. A moved output has to be tuned again with
    /// [`set_frequency`](Self::set_frequency) before it is routed.
    fn select_clock_pll(&mut self, clock: ClockOutput, pll: PLL) {
        self.planner.assign_pll(clock, pll);
    }

    fn set_clock_enabled(&mut self, clk: ClockOutput, enabled: bool) {
        let bit = 1u8 << clk.ix();
        if enabled {
            self.clk_enabled_mask |= bit;
        } else {
            self.clk_enabled_mask &= !bit;
        }
    }

    fn flush_output_enabled(&mut self) -> Result<(), Self::Error> {
        let mask = self.clk_enabled_mask;
        self.write_register(Register::OutputEnable, !mask)
    }

    fn flush_clock_control(&mut self, clk: ClockOutput) -> Result<(), Self::Error> {
        let bit = 1u8 << clk.ix();
        let clk_control_pdn = if self.clk_enabled_mask & bit != 0 {
            ClockControlBits::empty()
        } else {
            ClockControlBits::CLK_PDN
        };

        let ms_int_mode = if self.ms_int_mode_mask & bit == 0 {
            ClockControlBits::empty()
        } else {
            ClockControlBits::MS_INT
        };

        let ms_src = if self.ms_src_mask & bit == 0 {
            ClockControlBits::empty()
        } else {
            ClockControlBits::MS_SRC
        };

        let base = ClockControlBits::CLK_SRC_MS | ClockControlBits::CLK_DRV_8;

        self.write_register(
            clk.register(),
            (clk_control_pdn | ms_int_mode | ms_src | base).bits(),
        )
    }

    /// Write the 7bit phase register.  The phase is in units of
    /// VCO/4 period.
    fn set_phase(&mut self, clock: ClockOutput, phase: u8) -> Result<(), Self::Error> {
        let reg = clock
            .phase_register()
            .ok_or(DeviceError::Synth(crate::Error::InvalidParameter))?;
        let phase = phase & 0b01111111; // upper bit is reserved
        self.write_register(reg, phase)
    }

    fn get_vco_frequency(&self, pll: PLL) -> Option<u64> {
        self.planner.pll(pll).tuning.map(|tuning| tuning.vco)
    }
}
