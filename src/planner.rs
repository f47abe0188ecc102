/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Frequency planning across both PLLs and all eight outputs.
//!
//! The [`Planner`] owns the whole tuning state of the chip. Each request is
//! worked out on copies of that state and only committed once every divider
//! has been found and encoded, so a failed request changes nothing. The
//! result is a [`Plan`]: the register values that have to be written.
//!
//! A PLL's VCO is dictated by whichever channel tunes it first (or asks for
//! a retune). Channels joining a PLL later take the VCO as it is and only
//! get their own output divider, so outputs that are already running are
//! not disturbed.

use crate::consts::FREQ_MULT;
use crate::fraction::{self, DividerMode, DividerRatio, RegisterFields};
use crate::solver;
use crate::{ClockOutput, Error, OutputClass, OutputDivider, PllInput, PLL};

/// What to do when a channel's target can't be reached with the VCO its
/// PLL is already running at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RetunePolicy {
    /// Retune the PLL and re-solve every other output on it.
    Implicit,
    /// Fail with [`Error::UnreachableWithCurrentPll`] if other configured
    /// outputs share the PLL.
    Strict,
}

impl Default for RetunePolicy {
    fn default() -> Self {
        RetunePolicy::Implicit
    }
}

/// A reference input: nominal frequency in Hz and its correction in ppb.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reference {
    pub frequency: u32,
    pub correction_ppb: i32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllTuning {
    /// VCO frequency that was asked for, centi-hertz
    pub nominal_vco: u64,
    /// VCO frequency the feedback divider produces, centi-hertz
    pub vco: u64,
    pub ratio: DividerRatio,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllState {
    pub input: PllInput,
    pub tuning: Option<PllTuning>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputTuning {
    /// Requested output frequency, centi-hertz
    pub target: u64,
    pub r_div: OutputDivider,
    pub ratio: DividerRatio,
    /// Output frequency actually produced, centi-hertz
    pub frequency: u64,
}

impl OutputTuning {
    /// Frequency at the multisynth, before the R divider.
    fn multisynth_frequency(&self) -> u64 {
        self.target * self.r_div.denominator() as u64
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    Unconfigured,
    Configured(OutputTuning),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel {
    pub pll: PLL,
    pub state: ChannelState,
}

impl Channel {
    pub fn is_configured(&self) -> bool {
        self.state != ChannelState::Unconfigured
    }
}

/// Feedback multisynth registers for one PLL.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllSetting {
    pub pll: PLL,
    pub ratio: DividerRatio,
    pub fields: RegisterFields,
    pub vco: u64,
    /// The PLL changed because of a frequency request and must be reset.
    pub reset: bool,
}

/// Output multisynth registers for one channel.
///
/// For CLK6 and CLK7 `fields.p1` holds the integer divider itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputSetting {
    pub clk: ClockOutput,
    pub pll: PLL,
    pub ratio: DividerRatio,
    pub mode: DividerMode,
    pub fields: RegisterFields,
    pub r_div: OutputDivider,
    pub frequency: u64,
}

/// Register values produced by one planning request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    plls: [Option<PllSetting>; 2],
    outputs: [Option<OutputSetting>; 8],
}

impl Plan {
    pub fn pll(&self, pll: PLL) -> Option<&PllSetting> {
        self.plls[pll.ix()].as_ref()
    }

    pub fn output(&self, clk: ClockOutput) -> Option<&OutputSetting> {
        self.outputs[clk.ix()].as_ref()
    }

    pub fn plls(&self) -> impl Iterator<Item = &PllSetting> + '_ {
        self.plls.iter().flatten()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputSetting> + '_ {
        self.outputs.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.plls().next().is_none() && self.outputs().next().is_none()
    }

    fn push_pll(&mut self, setting: PllSetting) {
        self.plls[setting.pll.ix()] = Some(setting);
    }

    fn push_output(&mut self, setting: OutputSetting) {
        self.outputs[setting.clk.ix()] = Some(setting);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Action {
    /// Pick a new VCO for the channel's PLL
    Retune,
    /// Keep the VCO (centi-hertz) and only solve the output divider
    Reuse(u64),
}

/// Tuning state of the whole chip.
#[derive(Debug, Clone)]
pub struct Planner {
    references: [Reference; 2],
    plls: [PllState; 2],
    channels: [Channel; 8],
    policy: RetunePolicy,
}

impl Planner {
    /// Both PLLs fed from the crystal, every output on PLL A and unconfigured.
    pub fn new(xtal_freq: u32) -> Self {
        Planner {
            references: [
                Reference {
                    frequency: xtal_freq,
                    correction_ppb: 0,
                },
                Reference {
                    frequency: 0,
                    correction_ppb: 0,
                },
            ],
            plls: [PllState {
                input: PllInput::Xtal,
                tuning: None,
            }; 2],
            channels: [Channel {
                pll: PLL::A,
                state: ChannelState::Unconfigured,
            }; 8],
            policy: RetunePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetunePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetunePolicy {
        self.policy
    }

    pub fn reference(&self, input: PllInput) -> Reference {
        self.references[input.ix()]
    }

    pub fn pll(&self, pll: PLL) -> &PllState {
        &self.plls[pll.ix()]
    }

    pub fn channel(&self, clk: ClockOutput) -> &Channel {
        &self.channels[clk.ix()]
    }

    /// Back to power-on state; references, PLL inputs and assignments are kept.
    pub fn reset(&mut self) {
        for pll in self.plls.iter_mut() {
            pll.tuning = None;
        }
        for channel in self.channels.iter_mut() {
            channel.state = ChannelState::Unconfigured;
        }
    }

    /// Plans `freq` Hz on `clk`.
    pub fn plan_frequency(
        &mut self,
        clk: ClockOutput,
        freq: u32,
        force_retune: bool,
    ) -> Result<Plan, Error> {
        self.plan_frequency_centihertz(clk, freq as u64 * FREQ_MULT, force_retune)
    }

    /// Plans `freq` (in hundredths of a hertz) on `clk`.
    pub fn plan_frequency_centihertz(
        &mut self,
        clk: ClockOutput,
        freq: u64,
        force_retune: bool,
    ) -> Result<Plan, Error> {
        let class = clk.class();
        let (r_div, ms_freq) = solver::select_r_div(freq, solver::output_floor(class))?;
        solver::check_output_range(class, ms_freq)?;

        let vco = match self.next_action(clk, force_retune) {
            Action::Retune => return self.retune(clk, freq, r_div, ms_freq, None),
            Action::Reuse(vco) => vco,
        };

        match solver::solve_output(class, ms_freq, vco) {
            Ok(ratio) => {
                let pll = self.channels[clk.ix()].pll;
                let tuning = OutputTuning {
                    target: freq,
                    r_div,
                    ratio,
                    frequency: solver::output_frequency(vco, &ratio, r_div)?,
                };

                let mut plan = Plan::default();
                plan.push_output(output_setting(clk, pll, &tuning)?);
                self.channels[clk.ix()].state = ChannelState::Configured(tuning);
                Ok(plan)
            }
            Err(Error::InvalidRange) => {
                if self.policy == RetunePolicy::Strict && self.has_configured_siblings(clk) {
                    return Err(Error::UnreachableWithCurrentPll);
                }
                debug!("CLK{} unreachable from {} cHz, retuning", clk.ix(), vco);
                self.retune(clk, freq, r_div, ms_freq, None)
            }
            Err(e) => Err(e),
        }
    }

    /// Tunes the channel's PLL to `vco` and plans `freq` against it, both in
    /// hundredths of a hertz.
    pub fn plan_manual(&mut self, clk: ClockOutput, freq: u64, vco: u64) -> Result<Plan, Error> {
        let class = clk.class();
        let (r_div, ms_freq) = solver::select_r_div(freq, solver::output_floor(class))?;
        solver::check_output_range(class, ms_freq)?;

        self.retune(clk, freq, r_div, ms_freq, Some(vco))
    }

    /// Moves a channel to another PLL. Its divider no longer means anything
    /// there, so the channel has to be planned again.
    pub fn assign_pll(&mut self, clk: ClockOutput, pll: PLL) {
        let channel = &mut self.channels[clk.ix()];
        if channel.pll != pll {
            channel.pll = pll;
            channel.state = ChannelState::Unconfigured;
        }
    }

    /// Feeds `pll` from another reference and re-solves its feedback divider.
    pub fn set_pll_input(&mut self, pll: PLL, input: PllInput) -> Result<Plan, Error> {
        let mut plls = self.plls;
        plls[pll.ix()].input = input;
        self.refresh(self.references, plls)
    }

    /// Updates the correction of a reference and re-solves the PLLs it feeds.
    pub fn set_correction(&mut self, correction_ppb: i32, input: PllInput) -> Result<Plan, Error> {
        let mut references = self.references;
        references[input.ix()].correction_ppb = correction_ppb;
        self.refresh(references, self.plls)
    }

    /// Updates the nominal frequency of a reference and re-solves the PLLs it feeds.
    pub fn set_reference(&mut self, freq: u32, input: PllInput) -> Result<Plan, Error> {
        let mut references = self.references;
        references[input.ix()].frequency = freq;
        self.refresh(references, self.plls)
    }

    fn has_configured_siblings(&self, clk: ClockOutput) -> bool {
        let pll = self.channels[clk.ix()].pll;
        ClockOutput::ALL.iter().any(|&other| {
            let channel = &self.channels[other.ix()];
            other != clk && channel.pll == pll && channel.is_configured()
        })
    }

    fn next_action(&self, clk: ClockOutput, force_retune: bool) -> Action {
        let channel = &self.channels[clk.ix()];
        match self.plls[channel.pll.ix()].tuning {
            _ if force_retune => Action::Retune,
            None => Action::Retune,
            Some(_) if !channel.is_configured() && !self.has_configured_siblings(clk) => {
                Action::Retune
            }
            Some(tuning) => Action::Reuse(tuning.vco),
        }
    }

    fn retune(
        &mut self,
        clk: ClockOutput,
        freq: u64,
        r_div: OutputDivider,
        ms_freq: u64,
        vco: Option<u64>,
    ) -> Result<Plan, Error> {
        let class = clk.class();
        let pll = self.channels[clk.ix()].pll;
        let reference = corrected_reference(&self.references, self.plls[pll.ix()].input)?;

        let (nominal_vco, chosen) = match vco {
            Some(vco) => (vco, None),
            None => {
                let ratio = solver::output_for_free_vco(class, ms_freq)?;
                (ratio.multiply(ms_freq)?, Some(ratio))
            }
        };
        let (pll_ratio, vco) = solver::solve_pll(nominal_vco, reference)?;
        let ratio = match chosen {
            Some(ratio) => ratio,
            None => solver::solve_output(class, ms_freq, vco)?,
        };

        debug!("PLL {} -> {} cHz for CLK{}", pll, vco, clk.ix());

        let mut channels = self.channels;
        let mut plan = Plan::default();

        for &sibling in ClockOutput::ALL.iter().filter(|&&other| other != clk) {
            let channel = &mut channels[sibling.ix()];
            let old = match channel.state {
                ChannelState::Configured(old) if channel.pll == pll => old,
                _ => continue,
            };

            let ratio = solver::solve_output(sibling.class(), old.multisynth_frequency(), vco)
                .map_err(|e| match e {
                    Error::InvalidRange => Error::UnreachableWithCurrentPll,
                    e => e,
                })?;
            let tuning = OutputTuning {
                ratio,
                frequency: solver::output_frequency(vco, &ratio, old.r_div)?,
                ..old
            };
            plan.push_output(output_setting(sibling, pll, &tuning)?);
            channel.state = ChannelState::Configured(tuning);
        }

        let tuning = OutputTuning {
            target: freq,
            r_div,
            ratio,
            frequency: solver::output_frequency(vco, &ratio, r_div)?,
        };
        plan.push_output(output_setting(clk, pll, &tuning)?);
        channels[clk.ix()].state = ChannelState::Configured(tuning);

        let pll_tuning = PllTuning {
            nominal_vco,
            vco,
            ratio: pll_ratio,
        };
        plan.push_pll(pll_setting(pll, &pll_tuning, true)?);

        self.channels = channels;
        self.plls[pll.ix()].tuning = Some(pll_tuning);
        Ok(plan)
    }

    /// Re-solves every tuned PLL for its nominal VCO under new references or
    /// inputs. Output dividers stay as they are.
    fn refresh(&mut self, references: [Reference; 2], mut plls: [PllState; 2]) -> Result<Plan, Error> {
        let mut channels = self.channels;
        let mut plan = Plan::default();

        for &pll in PLL::ALL.iter() {
            let state = &mut plls[pll.ix()];
            let tuning = match state.tuning {
                Some(tuning) => tuning,
                None => continue,
            };

            let reference = corrected_reference(&references, state.input)?;
            let (ratio, vco) = solver::solve_pll(tuning.nominal_vco, reference)?;
            if ratio == tuning.ratio && vco == tuning.vco {
                continue;
            }

            let tuning = PllTuning {
                ratio,
                vco,
                ..tuning
            };
            plan.push_pll(pll_setting(pll, &tuning, false)?);
            state.tuning = Some(tuning);

            for channel in channels.iter_mut().filter(|c| c.pll == pll) {
                if let ChannelState::Configured(ref mut output) = channel.state {
                    output.frequency = solver::output_frequency(vco, &output.ratio, output.r_div)?;
                }
            }
        }

        self.references = references;
        self.plls = plls;
        self.channels = channels;
        Ok(plan)
    }
}

fn corrected_reference(references: &[Reference; 2], input: PllInput) -> Result<u64, Error> {
    let reference = references[input.ix()];
    if reference.frequency == 0 {
        return Err(Error::InvalidParameter);
    }
    solver::correct_reference(reference.frequency, reference.correction_ppb)
}

fn pll_setting(pll: PLL, tuning: &PllTuning, reset: bool) -> Result<PllSetting, Error> {
    Ok(PllSetting {
        pll,
        ratio: tuning.ratio,
        fields: fraction::encode(&tuning.ratio, tuning.ratio.mode())?,
        vco: tuning.vco,
        reset,
    })
}

fn output_setting(clk: ClockOutput, pll: PLL, tuning: &OutputTuning) -> Result<OutputSetting, Error> {
    let (mode, fields) = match clk.class() {
        OutputClass::Standard => {
            let mode = tuning.ratio.mode();
            (mode, fraction::encode(&tuning.ratio, mode)?)
        }
        OutputClass::Restricted => (DividerMode::Integer, fraction::encode_simple(&tuning.ratio)?),
    };

    Ok(OutputSetting {
        clk,
        pll,
        ratio: tuning.ratio,
        mode,
        fields,
        r_div: tuning.r_div,
        frequency: tuning.frequency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{FRAC_DENOM_MAX, XTAL_FREQ};

    const MHZ: u64 = 1_000_000 * FREQ_MULT;

    fn close(actual: u64, target: u64) -> bool {
        let error = if actual > target { actual - target } else { target - actual };
        error * FRAC_DENOM_MAX as u64 <= target
    }

    #[test]
    fn first_request_dictates_vco() {
        let mut planner = Planner::new(XTAL_FREQ);
        assert!(!planner.channel(ClockOutput::Clk0).is_configured());

        let plan = planner.plan_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();

        let pll = plan.pll(PLL::A).unwrap();
        assert_eq!(pll.ratio, DividerRatio::integer(36));
        assert_eq!(pll.vco, 900 * MHZ);
        assert!(pll.reset);

        let output = plan.output(ClockOutput::Clk0).unwrap();
        assert_eq!(output.ratio, DividerRatio::integer(900));
        assert_eq!(output.mode, DividerMode::Integer);
        assert_eq!(output.r_div, OutputDivider::Div1);
        assert_eq!(output.frequency, MHZ);
        assert_eq!(output.fields, RegisterFields { p1: 114_688, p2: 0, p3: 1 });

        assert!(planner.channel(ClockOutput::Clk0).is_configured());
        assert_eq!(planner.pll(PLL::A).tuning.unwrap().vco, 900 * MHZ);
    }

    #[test]
    fn sibling_keeps_its_registers() {
        let mut planner = Planner::new(XTAL_FREQ);
        let first = planner.plan_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();
        let clk0 = *planner.channel(ClockOutput::Clk0);

        let plan = planner.plan_frequency(ClockOutput::Clk1, 3_000_000, false).unwrap();
        assert!(plan.pll(PLL::A).is_none());
        assert!(plan.output(ClockOutput::Clk0).is_none());
        assert_eq!(
            plan.output(ClockOutput::Clk1).unwrap().ratio,
            DividerRatio::integer(300)
        );

        let plan = planner.plan_frequency(ClockOutput::Clk1, 7_000_000, false).unwrap();
        assert!(plan.pll(PLL::A).is_none());
        assert!(plan.output(ClockOutput::Clk0).is_none());
        let clk1 = plan.output(ClockOutput::Clk1).unwrap();
        assert_eq!(clk1.mode, DividerMode::Fractional);
        assert!(close(clk1.frequency, 7 * MHZ));

        assert_eq!(*planner.channel(ClockOutput::Clk0), clk0);
        assert_eq!(
            planner.pll(PLL::A).tuning.unwrap().ratio,
            first.pll(PLL::A).unwrap().ratio
        );
    }

    #[test]
    fn unreachable_target_retunes_implicitly() {
        let mut planner = Planner::new(XTAL_FREQ);
        planner.plan_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();
        planner.plan_frequency(ClockOutput::Clk1, 3_000_000, false).unwrap();

        // 900 MHz / 200 MHz is not 4
        let plan = planner.plan_frequency(ClockOutput::Clk1, 200_000_000, false).unwrap();

        assert_eq!(plan.pll(PLL::A).unwrap().ratio, DividerRatio::integer(32));
        let clk1 = plan.output(ClockOutput::Clk1).unwrap();
        assert_eq!(clk1.mode, DividerMode::DivideBy4);
        assert_eq!(clk1.fields, RegisterFields { p1: 0, p2: 0, p3: 1 });

        let clk0 = plan.output(ClockOutput::Clk0).unwrap();
        assert_eq!(clk0.ratio, DividerRatio::integer(800));
        assert_eq!(clk0.frequency, MHZ);
    }

    #[test]
    fn strict_policy_refuses_to_disturb_siblings() {
        let mut planner = Planner::new(XTAL_FREQ).with_policy(RetunePolicy::Strict);
        planner.plan_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();
        let before = planner.clone();

        assert_eq!(
            planner.plan_frequency(ClockOutput::Clk1, 200_000_000, false),
            Err(Error::UnreachableWithCurrentPll)
        );
        assert!(!planner.channel(ClockOutput::Clk1).is_configured());
        assert_eq!(planner.pll(PLL::A), before.pll(PLL::A));

        // an explicit request is still honoured
        let plan = planner.plan_frequency(ClockOutput::Clk1, 200_000_000, true).unwrap();
        assert!(plan.output(ClockOutput::Clk0).is_some());
    }

    #[test]
    fn strict_policy_retunes_an_unshared_pll() {
        let mut planner = Planner::new(XTAL_FREQ).with_policy(RetunePolicy::Strict);
        planner.plan_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();

        let plan = planner.plan_frequency(ClockOutput::Clk0, 200_000_000, false).unwrap();
        assert_eq!(plan.pll(PLL::A).unwrap().vco, 800 * MHZ);
    }

    #[test]
    fn failed_request_leaves_state_untouched() {
        let mut planner = Planner::new(XTAL_FREQ);
        planner.plan_frequency(ClockOutput::Clk0, 200_000_000, false).unwrap();
        let before = planner.clone();

        // needs 720 MHz, which CLK0 at 200 MHz can't follow
        assert_eq!(
            planner.plan_frequency(ClockOutput::Clk1, 180_000_000, false),
            Err(Error::UnreachableWithCurrentPll)
        );
        assert_eq!(planner.pll(PLL::A), before.pll(PLL::A));
        assert_eq!(planner.channel(ClockOutput::Clk0), before.channel(ClockOutput::Clk0));
        assert!(!planner.channel(ClockOutput::Clk1).is_configured());

        assert_eq!(
            planner.plan_frequency(ClockOutput::Clk1, 226_000_000, true),
            Err(Error::InvalidRange)
        );
        assert_eq!(planner.pll(PLL::A), before.pll(PLL::A));
    }

    #[test]
    fn forced_retune_re_solves_siblings() {
        let mut planner = Planner::new(XTAL_FREQ);
        planner.plan_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();
        planner.plan_frequency(ClockOutput::Clk1, 3_000_000, false).unwrap();

        let plan = planner.plan_frequency(ClockOutput::Clk1, 7_000_000, true).unwrap();
        let pll = plan.pll(PLL::A).unwrap();
        assert_eq!(pll.vco, 896 * MHZ);
        assert_eq!(pll.ratio.mode(), DividerMode::Fractional);

        assert_eq!(
            plan.output(ClockOutput::Clk1).unwrap().ratio,
            DividerRatio::integer(128)
        );
        let clk0 = plan.output(ClockOutput::Clk0).unwrap();
        assert_eq!(clk0.ratio, DividerRatio::integer(896));
        assert_eq!(clk0.frequency, MHZ);
    }

    #[test]
    fn low_frequencies_use_r_divider() {
        let mut planner = Planner::new(XTAL_FREQ);
        let plan = planner.plan_frequency(ClockOutput::Clk2, 10_000, false).unwrap();

        let output = plan.output(ClockOutput::Clk2).unwrap();
        assert_eq!(output.r_div, OutputDivider::Div64);
        assert_eq!(output.ratio, DividerRatio::integer(1406));
        assert!(close(output.frequency, 10_000 * FREQ_MULT));

        assert_eq!(
            planner.plan_frequency(ClockOutput::Clk3, 1_000, false),
            Err(Error::InvalidRange)
        );
        assert_eq!(
            planner.plan_frequency(ClockOutput::Clk3, 0, false),
            Err(Error::InvalidRange)
        );
    }

    #[test]
    fn restricted_outputs_share_only_integer_ratios() {
        let mut planner = Planner::new(XTAL_FREQ);
        let plan = planner.plan_frequency(ClockOutput::Clk6, 10_000_000, false).unwrap();
        let clk6 = plan.output(ClockOutput::Clk6).unwrap();
        assert_eq!(clk6.fields, RegisterFields { p1: 90, p2: 0, p3: 0 });
        assert_eq!(clk6.mode, DividerMode::Integer);

        let plan = planner.plan_frequency(ClockOutput::Clk7, 9_000_000, false).unwrap();
        assert!(plan.pll(PLL::A).is_none());
        assert_eq!(plan.output(ClockOutput::Clk7).unwrap().fields.p1, 100);

        // 896 MHz would suit CLK7 but CLK6 can't divide it down to 10 MHz
        assert_eq!(
            planner.plan_frequency(ClockOutput::Clk7, 7_000_000, false),
            Err(Error::UnreachableWithCurrentPll)
        );
        assert_eq!(
            planner.plan_frequency(ClockOutput::Clk6, 151_000_000, false),
            Err(Error::InvalidRange)
        );
    }

    #[test]
    fn restricted_sibling_gets_an_even_ratio() {
        let mut planner = Planner::new(XTAL_FREQ);
        planner.plan_frequency(ClockOutput::Clk6, 10_000_000, false).unwrap();

        // 900 MHz / 20 MHz is 45, so the PLL moves to 880 MHz
        let plan = planner.plan_frequency(ClockOutput::Clk7, 20_000_000, false).unwrap();
        assert_eq!(plan.pll(PLL::A).unwrap().vco, 880 * MHZ);
        assert_eq!(plan.output(ClockOutput::Clk7).unwrap().fields.p1, 44);
        assert_eq!(plan.output(ClockOutput::Clk6).unwrap().fields.p1, 88);

        let mut planner = Planner::new(XTAL_FREQ).with_policy(RetunePolicy::Strict);
        planner.plan_frequency(ClockOutput::Clk6, 10_000_000, false).unwrap();
        assert_eq!(
            planner.plan_frequency(ClockOutput::Clk7, 20_000_000, false),
            Err(Error::UnreachableWithCurrentPll)
        );
    }

    #[test]
    fn sibling_above_112_5_mhz_gets_an_even_ratio() {
        let mut planner = Planner::new(XTAL_FREQ);
        planner.plan_frequency(ClockOutput::Clk0, 7_000_000, false).unwrap();
        assert_eq!(planner.pll(PLL::A).tuning.unwrap().vco, 896 * MHZ);

        // 896 MHz / 128 MHz is 7
        let plan = planner.plan_frequency(ClockOutput::Clk1, 128_000_000, false).unwrap();
        assert_eq!(plan.pll(PLL::A).unwrap().vco, 768 * MHZ);
        let clk1 = plan.output(ClockOutput::Clk1).unwrap();
        assert_eq!(clk1.ratio, DividerRatio::integer(6));
        assert_eq!(clk1.frequency, 128 * MHZ);
        assert!(close(plan.output(ClockOutput::Clk0).unwrap().frequency, 7 * MHZ));

        let mut planner = Planner::new(XTAL_FREQ).with_policy(RetunePolicy::Strict);
        planner.plan_frequency(ClockOutput::Clk0, 7_000_000, false).unwrap();
        assert_eq!(
            planner.plan_frequency(ClockOutput::Clk1, 128_000_000, false),
            Err(Error::UnreachableWithCurrentPll)
        );
    }

    #[test]
    fn correction_moves_pll_only() {
        let mut planner = Planner::new(XTAL_FREQ);
        planner.plan_frequency(ClockOutput::Clk0, 10_000_000, false).unwrap();

        let plan = planner.set_correction(10_000, PllInput::Xtal).unwrap();
        let pll = plan.pll(PLL::A).unwrap();
        assert!(!pll.reset);
        assert_eq!(pll.ratio.integer_part(), 35);
        assert_eq!(pll.ratio.mode(), DividerMode::Fractional);
        assert!(close(pll.vco, 900 * MHZ));
        assert!(plan.outputs().next().is_none());

        match planner.channel(ClockOutput::Clk0).state {
            ChannelState::Configured(output) => {
                assert_eq!(output.ratio, DividerRatio::integer(90));
                assert!(close(output.frequency, 10 * MHZ));
            }
            ChannelState::Unconfigured => panic!("CLK0 lost its configuration"),
        }
        assert_eq!(planner.reference(PllInput::Xtal).correction_ppb, 10_000);

        // nothing on PLL B, nothing to write
        assert!(planner.set_correction(0, PllInput::Clkin).unwrap().is_empty());
    }

    #[test]
    fn correction_applies_before_solving() {
        let mut planner = Planner::new(XTAL_FREQ);
        planner.set_correction(-10_000, PllInput::Xtal).unwrap();

        let plan = planner.plan_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();
        let pll = plan.pll(PLL::A).unwrap();
        assert_eq!(pll.ratio.mode(), DividerMode::Fractional);
        assert!(close(pll.vco, 900 * MHZ));
        assert!(close(plan.output(ClockOutput::Clk0).unwrap().frequency, MHZ));
    }

    #[test]
    fn manual_vco() {
        let mut planner = Planner::new(XTAL_FREQ);
        let plan = planner
            .plan_manual(ClockOutput::Clk0, 150 * MHZ, 600 * MHZ)
            .unwrap();
        assert_eq!(plan.pll(PLL::A).unwrap().ratio, DividerRatio::integer(24));
        assert_eq!(
            plan.output(ClockOutput::Clk0).unwrap().mode,
            DividerMode::DivideBy4
        );

        assert_eq!(
            planner.plan_manual(ClockOutput::Clk0, MHZ, 950 * MHZ),
            Err(Error::InvalidRange)
        );
    }

    #[test]
    fn moving_a_channel_to_pll_b() {
        let mut planner = Planner::new(XTAL_FREQ);
        planner.plan_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();

        planner.assign_pll(ClockOutput::Clk0, PLL::B);
        assert!(!planner.channel(ClockOutput::Clk0).is_configured());

        let plan = planner.plan_frequency(ClockOutput::Clk0, 2_000_000, false).unwrap();
        assert!(plan.pll(PLL::A).is_none());
        assert_eq!(plan.pll(PLL::B).unwrap().vco, 900 * MHZ);
        assert_eq!(plan.output(ClockOutput::Clk0).unwrap().pll, PLL::B);
    }

    #[test]
    fn pll_input_switch() {
        let mut planner = Planner::new(XTAL_FREQ);
        planner.plan_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();

        assert_eq!(
            planner.set_pll_input(PLL::A, PllInput::Clkin),
            Err(Error::InvalidParameter)
        );
        assert_eq!(planner.pll(PLL::A).input, PllInput::Xtal);

        assert!(planner.set_reference(10_000_000, PllInput::Clkin).unwrap().is_empty());
        let plan = planner.set_pll_input(PLL::A, PllInput::Clkin).unwrap();
        assert_eq!(plan.pll(PLL::A).unwrap().ratio, DividerRatio::integer(90));
        assert_eq!(planner.pll(PLL::A).input, PllInput::Clkin);
    }

    #[test]
    fn register_images_decode_back_to_target() {
        let targets: [u32; 8] = [
            500_000,
            1_234_567,
            10_000_000,
            14_175_000,
            27_000_000,
            99_999_999,
            112_500_001,
            224_999_999,
        ];

        for &target in targets.iter() {
            let mut planner = Planner::new(XTAL_FREQ);
            let plan = planner.plan_frequency(ClockOutput::Clk0, target, false).unwrap();

            let pll = plan.pll(PLL::A).unwrap();
            let pll_ratio = fraction::decode(&pll.fields, pll.ratio.mode()).unwrap();
            let reference = XTAL_FREQ as u64 * FREQ_MULT;
            let vco = pll_ratio.multiply(reference).unwrap();
            assert!(close(vco, pll.vco));

            let output = plan.output(ClockOutput::Clk0).unwrap();
            let ratio = fraction::decode(&output.fields, output.mode).unwrap();
            let freq = solver::output_frequency(vco, &ratio, output.r_div).unwrap();
            assert!(close(freq, target as u64 * FREQ_MULT), "{} -> {}", target, freq);
        }
    }

    #[test]
    fn reset_forgets_tuning() {
        let mut planner = Planner::new(XTAL_FREQ);
        planner.plan_frequency(ClockOutput::Clk0, 1_000_000, false).unwrap();
        planner.reset();

        assert!(planner.pll(PLL::A).tuning.is_none());
        assert!(!planner.channel(ClockOutput::Clk0).is_configured());
    }
}
