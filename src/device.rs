/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
use log::{debug, trace, warn};

use crate::interface::{I2cInterface, RegisterAccess};
use crate::regs::{
    ClockControlBits, CrystalLoadBits, FanoutBits, FractionalMultisynth, MsDivBits, Multisynth,
    OutputSynth, Register, SimpleMultisynth,
};
use crate::synth::{self, DividerParams};
use crate::{
    ClockDisableState, ClockFanout, ClockOutput, ClockSource, CrystalLoad, DeviceStatusBits,
    DriveStrength, Error, InterruptStatusBits, OutputDivider, CLKOUT67_MAX_FREQ,
    CLKOUT67_MIN_FREQ, CLKOUT_MAX_FREQ, CLKOUT_MIN_FREQ, FREQ_MULT, MULTISYNTH67_A_MAX,
    MULTISYNTH67_MIN_FREQ, MULTISYNTH_DIVBY4_FREQ, MULTISYNTH_SHARE_MAX, PLL, PLL_FIXED, XTAL_FREQ,
};

/// Board-level settings.
#[derive(Debug, Copy, Clone)]
pub struct Config {
    /// Nominal crystal frequency in Hz.
    pub xtal_freq: u32,
    /// Measured crystal error in parts per billion.
    pub correction: i32,
    /// PLL each output is tied to after a reset.
    pub pll_assignment: [PLL; 8],
}

impl Config {
    pub fn new(xtal_freq: u32) -> Self {
        Config {
            xtal_freq,
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            xtal_freq: XTAL_FREQ,
            correction: 0,
            pll_assignment: [PLL::A, PLL::A, PLL::A, PLL::A, PLL::A, PLL::A, PLL::B, PLL::B],
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SynthSetting {
    Fractional {
        ms: Multisynth,
        params: DividerParams,
        div_by_4: bool,
    },
    Integer {
        ms: SimpleMultisynth,
        divider: u8,
    },
}

/// Everything needed to program one output against a given PLL frequency.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct OutputPlan {
    r_div: OutputDivider,
    synth: SynthSetting,
    out_freq: u64,
}

fn plan_output(clk: ClockOutput, freq: u64, pll_freq: u64) -> OutputPlan {
    match clk.synth() {
        OutputSynth::Fractional(ms) => {
            let (r_div, ms_freq) = synth::select_r_divider(freq);
            let tuning = synth::tune_multisynth(ms_freq, Some(pll_freq));
            OutputPlan {
                r_div,
                synth: SynthSetting::Fractional {
                    ms,
                    params: tuning.params,
                    div_by_4: tuning.div_by_4,
                },
                out_freq: tuning.out_freq / r_div.denominator(),
            }
        }
        OutputSynth::Integer(ms) => {
            let (r_div, ms_freq) = synth::r_divider_for(freq, MULTISYNTH67_MIN_FREQ);
            let tuning = synth::tune_multisynth67(ms_freq, Some(pll_freq));
            OutputPlan {
                r_div,
                synth: SynthSetting::Integer {
                    ms,
                    divider: tuning.divider,
                },
                out_freq: tuning.out_freq / r_div.denominator(),
            }
        }
    }
}

/// PLL frequency that lets `clk` run from an integer divider.
fn exclusive_pll_freq(clk: ClockOutput, freq: u64) -> u64 {
    match clk.synth() {
        OutputSynth::Fractional(_) => synth::tune_multisynth(freq, None).pll_freq,
        OutputSynth::Integer(_) => synth::tune_multisynth67(freq, None).pll_freq,
    }
}

/// Output range of `clk` while its PLL runs at `pll_freq`. CLK6/CLK7 bottom
/// out at the PLL divided by 254 and then by 128.
fn output_range(clk: ClockOutput, pll_freq: u64) -> (u64, u64) {
    match clk.synth() {
        OutputSynth::Fractional(_) => (CLKOUT_MIN_FREQ, CLKOUT_MAX_FREQ),
        OutputSynth::Integer(_) => {
            let slowest = u64::from(MULTISYNTH67_A_MAX) * 128;
            let min = (pll_freq + slowest - 1) / slowest;
            (min.max(CLKOUT67_MIN_FREQ), CLKOUT67_MAX_FREQ)
        }
    }
}

/// Si5351 driver
pub struct Si5351Device<I> {
    interface: I,
    xtal_freq: u32,
    ref_correction: i32,
    default_assignment: [PLL; 8],
    pll_freq: [u64; 2],
    clk_freq: [u64; 8],
    pll_assignment: [PLL; 8],
    r_div: [OutputDivider; 8],
    drive: [DriveStrength; 8],
    source: [ClockSource; 8],
    clk_enabled_mask: u8,
    clk_powered_mask: u8,
    clk_invert_mask: u8,
    ms_int_mode_mask: u8,
    ms_src_mask: u8,
}

pub trait Si5351 {
    fn init_adafruit_module(&mut self) -> Result<(), Error>;
    fn init(&mut self, xtal_load: CrystalLoad) -> Result<(), Error>;
    fn reset(&mut self) -> Result<(), Error>;
    fn read_device_status(&mut self) -> Result<DeviceStatusBits, Error>;
    fn read_interrupt_status(&mut self) -> Result<InterruptStatusBits, Error>;

    fn set_frequency(&mut self, clk: ClockOutput, freq: u64) -> Result<(), Error>;
    fn set_frequency_manual(
        &mut self,
        clk: ClockOutput,
        freq: u64,
        pll_freq: u64,
    ) -> Result<(), Error>;
    fn set_pll(&mut self, pll: PLL, freq: u64) -> Result<(), Error>;
    fn reset_pll(&mut self, pll: PLL) -> Result<(), Error>;
    fn set_ms_source(&mut self, clk: ClockOutput, pll: PLL) -> Result<(), Error>;
    fn set_correction(&mut self, correction: i32);
    fn correction(&self) -> i32;

    fn set_clock_enabled(&mut self, clk: ClockOutput, enabled: bool) -> Result<(), Error>;
    fn set_clock_power(&mut self, clk: ClockOutput, powered: bool) -> Result<(), Error>;
    fn set_clock_invert(&mut self, clk: ClockOutput, inverted: bool) -> Result<(), Error>;
    fn set_clock_source(&mut self, clk: ClockOutput, source: ClockSource) -> Result<(), Error>;
    fn set_drive_strength(&mut self, clk: ClockOutput, drive: DriveStrength)
        -> Result<(), Error>;
    fn set_clock_disable(
        &mut self,
        clk: ClockOutput,
        state: ClockDisableState,
    ) -> Result<(), Error>;
    fn set_clock_fanout(&mut self, fanout: ClockFanout, enabled: bool) -> Result<(), Error>;
    fn set_phase(&mut self, clk: ClockOutput, phase: u8) -> Result<(), Error>;

    fn frequency(&self, clk: ClockOutput) -> u64;
    fn pll_frequency(&self, pll: PLL) -> u64;
    fn pll_assignment(&self, clk: ClockOutput) -> PLL;
}

impl<I2C> Si5351Device<I2cInterface<I2C>> {
    /// Creates a new driver from a I2C peripheral
    pub fn new_i2c(i2c: I2C, address_bit: bool, xtal_freq: u32) -> Self {
        Si5351Device::new(I2cInterface::new(i2c, address_bit), Config::new(xtal_freq))
    }

    pub fn new_adafruit_module(i2c: I2C) -> Self {
        Si5351Device::new_i2c(i2c, false, XTAL_FREQ)
    }
}

impl<I> Si5351Device<I> {
    /// Creates a driver over any register transport. Nothing is written
    /// until [`Si5351::init`] or [`Si5351::reset`].
    pub fn new(interface: I, config: Config) -> Self {
        let mut ms_src_mask = 0;
        for &clk in ClockOutput::ALL.iter() {
            if config.pll_assignment[clk.ix() as usize] == PLL::B {
                ms_src_mask |= clk.bit();
            }
        }

        Si5351Device {
            interface,
            xtal_freq: config.xtal_freq,
            ref_correction: config.correction,
            default_assignment: config.pll_assignment,
            pll_freq: [PLL_FIXED; 2],
            clk_freq: [0; 8],
            pll_assignment: config.pll_assignment,
            r_div: [OutputDivider::Div1; 8],
            drive: [DriveStrength::_2mA; 8],
            source: [ClockSource::Multisynth; 8],
            clk_enabled_mask: 0,
            clk_powered_mask: 0xFF,
            clk_invert_mask: 0,
            ms_int_mode_mask: 0,
            ms_src_mask,
        }
    }

    pub fn release(self) -> I {
        self.interface
    }
}

impl<I> Si5351Device<I>
where
    I: RegisterAccess,
{
    fn reference_freq(&self) -> u64 {
        u64::from(self.xtal_freq) * FREQ_MULT
    }

    fn read_register(&mut self, reg: Register) -> Result<u8, Error> {
        self.interface.read(reg.addr())
    }

    fn write_register(&mut self, reg: Register, byte: u8) -> Result<(), Error> {
        self.interface.write(reg.addr(), byte)
    }

    fn write_synth_registers<MS: FractionalMultisynth>(
        &mut self,
        ms: MS,
        params: [u8; 8],
    ) -> Result<(), Error> {
        self.interface.write_bulk(ms.base_addr(), &params)
    }

    fn write_multisynth(
        &mut self,
        ms: Multisynth,
        params: &DividerParams,
        r_div: OutputDivider,
        div_by_4: bool,
    ) -> Result<(), Error> {
        let existing = self.interface.read(ms.base_addr() + 2)?;
        let mut high = MsDivBits::from_bits_truncate(existing);
        high.remove(MsDivBits::R_DIV | MsDivBits::DIVBY4 | MsDivBits::P1_HIGH);
        high |= MsDivBits::from_bits_truncate(r_div.bits() << 4) & MsDivBits::R_DIV;
        if div_by_4 {
            high |= MsDivBits::DIVBY4;
        }
        self.write_synth_registers(ms, params.to_registers(high.bits()))
    }

    fn write_simple_multisynth(
        &mut self,
        ms: SimpleMultisynth,
        divider: u8,
        r_div: OutputDivider,
    ) -> Result<(), Error> {
        self.interface.write(ms.base_addr(), divider)?;

        let shift = ms.r_div_shift();
        let mut reg_val = self.read_register(Register::Ms67RDiv)?;
        reg_val &= !(0b111 << shift);
        reg_val |= r_div.bits() << shift;
        self.write_register(Register::Ms67RDiv, reg_val)
    }

    fn write_output(&mut self, clk: ClockOutput, plan: &OutputPlan) -> Result<(), Error> {
        trace!(
            "{:?}: {:?} r_div {:?}, {} cHz",
            clk,
            plan.synth,
            plan.r_div,
            plan.out_freq
        );
        self.r_div[clk.ix() as usize] = plan.r_div;

        match plan.synth {
            SynthSetting::Fractional {
                ms,
                params,
                div_by_4,
            } => {
                self.write_multisynth(ms, &params, plan.r_div, div_by_4)?;
                if div_by_4 || params.is_even_integer() {
                    self.ms_int_mode_mask |= clk.bit();
                } else {
                    self.ms_int_mode_mask &= !clk.bit();
                }
            }
            SynthSetting::Integer { ms, divider } => {
                self.write_simple_multisynth(ms, divider, plan.r_div)?;
            }
        }

        self.flush_clock_control(clk)
    }

    fn flush_output_enabled(&mut self) -> Result<(), Error> {
        let mask = self.clk_enabled_mask;
        self.write_register(Register::OutputEnable, !mask)
    }

    fn flush_clock_control(&mut self, clk: ClockOutput) -> Result<(), Error> {
        let bit = clk.bit();
        let ix = clk.ix() as usize;

        let mut control = match self.source[ix] {
            ClockSource::Xtal => ClockControlBits::CLK_SRC_XTAL,
            ClockSource::ClkIn => ClockControlBits::CLK_SRC_CLKIN,
            ClockSource::Multisynth0 => ClockControlBits::CLK_SRC_MS_ALT,
            ClockSource::Multisynth => ClockControlBits::CLK_SRC_MS,
        } | match self.drive[ix] {
            DriveStrength::_2mA => ClockControlBits::CLK_DRV_2,
            DriveStrength::_4mA => ClockControlBits::CLK_DRV_4,
            DriveStrength::_6mA => ClockControlBits::CLK_DRV_6,
            DriveStrength::_8mA => ClockControlBits::CLK_DRV_8,
        };

        if self.clk_powered_mask & bit == 0 {
            control |= ClockControlBits::CLK_PDN;
        }
        if self.ms_int_mode_mask & bit != 0 {
            control |= ClockControlBits::MS_INT;
        }
        if self.ms_src_mask & bit != 0 {
            control |= ClockControlBits::MS_SRC;
        }
        if self.clk_invert_mask & bit != 0 {
            control |= ClockControlBits::CLK_INV;
        }

        self.write_register(clk.register(), control.bits())
    }

    fn store_output(&mut self, clk: ClockOutput, freq: u64) {
        self.clk_freq[clk.ix() as usize] = freq;
        self.clk_enabled_mask |= clk.bit();
    }

    /// Retunes `pll` so `clk` gets an integer divider, then recalculates
    /// every other output running from it.
    fn claim_pll(&mut self, clk: ClockOutput, freq: u64) -> Result<(), Error> {
        // TODO: only outputs on the same PLL should conflict, pending
        // confirmation that the datasheet allows two exclusive PLLs.
        let holder = ClockOutput::ALL.iter().copied().find(|&other| {
            other != clk && self.clk_freq[other.ix() as usize] > MULTISYNTH_SHARE_MAX
        });
        if let Some(holder) = holder {
            warn!("{:?}: rejected, {:?} already holds its PLL", clk, holder);
            return Err(Error::RangeRejected);
        }

        self.store_output(clk, freq);

        let pll = self.pll_assignment(clk);
        let tuning = synth::tune_pll(
            exclusive_pll_freq(clk, freq),
            self.reference_freq(),
            self.ref_correction,
        );
        debug!("PLL {:?} -> {} cHz for {:?}", pll, tuning.vco_freq, clk);
        self.pll_freq[pll.ix()] = tuning.vco_freq;

        // multisynths first, the PLL must not be reset onto stale dividers
        for &other in ClockOutput::ALL.iter() {
            let other_freq = self.clk_freq[other.ix() as usize];
            if other_freq != 0 && self.pll_assignment(other) == pll {
                let plan = plan_output(other, other_freq, tuning.vco_freq);
                self.write_output(other, &plan)?;
            }
        }
        self.write_synth_registers(pll.multisynth(), tuning.params.to_registers(0))?;
        self.reset_pll(pll)
    }
}

impl<I> Si5351 for Si5351Device<I>
where
    I: RegisterAccess,
{
    fn init_adafruit_module(&mut self) -> Result<(), Error> {
        self.init(CrystalLoad::_10)
    }

    fn init(&mut self, xtal_load: CrystalLoad) -> Result<(), Error> {
        loop {
            let device_status = self.read_device_status()?;
            if !device_status.contains(DeviceStatusBits::SYS_INIT) {
                break;
            }
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

        self.reset()
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.clk_powered_mask = 0;
        for &clk in ClockOutput::ALL.iter() {
            self.flush_clock_control(clk)?;
        }

        self.pll_assignment = self.default_assignment;
        self.ms_src_mask = 0;
        self.ms_int_mode_mask = 0;
        self.clk_invert_mask = 0;
        self.clk_powered_mask = 0xFF;
        self.drive = [DriveStrength::_2mA; 8];
        self.source = [ClockSource::Multisynth; 8];
        self.r_div = [OutputDivider::Div1; 8];
        for &clk in ClockOutput::ALL.iter() {
            if self.pll_assignment(clk) == PLL::B {
                self.ms_src_mask |= clk.bit();
            }
            self.flush_clock_control(clk)?;
        }

        self.set_pll(PLL::A, PLL_FIXED)?;
        self.set_pll(PLL::B, PLL_FIXED)?;
        self.reset_pll(PLL::A)?;
        self.reset_pll(PLL::B)?;

        self.clk_freq = [0; 8];
        self.clk_enabled_mask = 0;
        self.flush_output_enabled()
    }

    fn read_device_status(&mut self) -> Result<DeviceStatusBits, Error> {
        Ok(DeviceStatusBits::from_bits_truncate(
            self.read_register(Register::DeviceStatus)?,
        ))
    }

    fn read_interrupt_status(&mut self) -> Result<InterruptStatusBits, Error> {
        Ok(InterruptStatusBits::from_bits_truncate(
            self.read_register(Register::InterruptStatus)?,
        ))
    }

    /// Sets an output to `freq` (in 0.01 Hz), choosing R divider, multisynth
    /// and, above 112.5 MHz, the PLL frequency as well.
    ///
    /// A frequency of 0 disables the output. Anything else is clamped into
    /// the output's range, topping out at 150 MHz. CLK6/CLK7 cannot go below
    /// their PLL frequency divided by 254 and 128.
    fn set_frequency(&mut self, clk: ClockOutput, freq: u64) -> Result<(), Error> {
        if freq == 0 {
            debug!("{:?}: disabled", clk);
            self.clk_freq[clk.ix() as usize] = 0;
            return self.set_clock_enabled(clk, false);
        }

        let pll_freq = self.pll_frequency(self.pll_assignment(clk));
        let (min, _) = output_range(clk, pll_freq);
        let freq = freq.clamp(min, MULTISYNTH_DIVBY4_FREQ);

        if freq > MULTISYNTH_SHARE_MAX {
            self.claim_pll(clk, freq)?;
        } else {
            self.store_output(clk, freq);
            let plan = plan_output(clk, freq, pll_freq);
            self.write_output(clk, &plan)?;
        }

        self.flush_output_enabled()
    }

    /// Sets an output against a PLL frequency the caller has already
    /// programmed (0 means the frequency this driver last set). The PLL
    /// itself is left alone.
    fn set_frequency_manual(
        &mut self,
        clk: ClockOutput,
        freq: u64,
        pll_freq: u64,
    ) -> Result<(), Error> {
        if freq == 0 {
            return self.set_frequency(clk, 0);
        }

        let pll_freq = if pll_freq == 0 {
            self.pll_frequency(self.pll_assignment(clk))
        } else {
            pll_freq
        };
        let (min, max) = output_range(clk, pll_freq);
        let freq = freq.clamp(min, max);

        self.store_output(clk, freq);
        let plan = plan_output(clk, freq, pll_freq);
        self.write_output(clk, &plan)?;
        self.flush_output_enabled()
    }

    fn set_pll(&mut self, pll: PLL, freq: u64) -> Result<(), Error> {
        let tuning = synth::tune_pll(freq, self.reference_freq(), self.ref_correction);
        debug!("PLL {:?} -> {} cHz", pll, tuning.vco_freq);
        self.write_synth_registers(pll.multisynth(), tuning.params.to_registers(0))?;
        self.pll_freq[pll.ix()] = tuning.vco_freq;
        Ok(())
    }

    fn reset_pll(&mut self, pll: PLL) -> Result<(), Error> {
        self.write_register(Register::PLLReset, pll.reset_bits().bits())
    }

    fn set_ms_source(&mut self, clk: ClockOutput, pll: PLL) -> Result<(), Error> {
        self.pll_assignment[clk.ix() as usize] = pll;
        match pll {
            PLL::A => self.ms_src_mask &= !clk.bit(),
            PLL::B => self.ms_src_mask |= clk.bit(),
        }
        self.flush_clock_control(clk)
    }

    fn set_correction(&mut self, correction: i32) {
        self.ref_correction = correction;
    }

    fn correction(&self) -> i32 {
        self.ref_correction
    }

    fn set_clock_enabled(&mut self, clk: ClockOutput, enabled: bool) -> Result<(), Error> {
        if enabled {
            self.clk_enabled_mask |= clk.bit();
        } else {
            self.clk_enabled_mask &= !clk.bit();
        }
        self.flush_output_enabled()
    }

    fn set_clock_power(&mut self, clk: ClockOutput, powered: bool) -> Result<(), Error> {
        if powered {
            self.clk_powered_mask |= clk.bit();
        } else {
            self.clk_powered_mask &= !clk.bit();
        }
        self.flush_clock_control(clk)
    }

    fn set_clock_invert(&mut self, clk: ClockOutput, inverted: bool) -> Result<(), Error> {
        if inverted {
            self.clk_invert_mask |= clk.bit();
        } else {
            self.clk_invert_mask &= !clk.bit();
        }
        self.flush_clock_control(clk)
    }

    /// CLK0 and CLK4 cannot take [`ClockSource::Multisynth0`], that would be
    /// their own multisynth.
    fn set_clock_source(&mut self, clk: ClockOutput, source: ClockSource) -> Result<(), Error> {
        if source == ClockSource::Multisynth0
            && (clk == ClockOutput::Clk0 || clk == ClockOutput::Clk4)
        {
            return Err(Error::InvalidParameter);
        }
        self.source[clk.ix() as usize] = source;
        self.flush_clock_control(clk)
    }

    fn set_drive_strength(
        &mut self,
        clk: ClockOutput,
        drive: DriveStrength,
    ) -> Result<(), Error> {
        self.drive[clk.ix() as usize] = drive;
        self.flush_clock_control(clk)
    }

    fn set_clock_disable(
        &mut self,
        clk: ClockOutput,
        state: ClockDisableState,
    ) -> Result<(), Error> {
        let (reg, shift) = clk.disable_state_register();
        let mut reg_val = self.read_register(reg)?;
        reg_val &= !(0b11 << shift);
        reg_val |= (state as u8) << shift;
        self.write_register(reg, reg_val)
    }

    fn set_clock_fanout(&mut self, fanout: ClockFanout, enabled: bool) -> Result<(), Error> {
        let bit = match fanout {
            ClockFanout::ClkIn => FanoutBits::CLKIN_EN,
            ClockFanout::Xo => FanoutBits::XO_EN,
            ClockFanout::Multisynth => FanoutBits::MS_EN,
        };
        let mut reg_val = FanoutBits::from_bits_truncate(self.read_register(Register::FanoutEnable)?);
        reg_val.set(bit, enabled);
        self.write_register(Register::FanoutEnable, reg_val.bits())
    }

    /// Write the 7bit phase register.  The phase is in units of
    /// VCO/4 period.
    fn set_phase(&mut self, clk: ClockOutput, phase: u8) -> Result<(), Error> {
        let reg = clk.phase_register().ok_or(Error::InvalidParameter)?;
        let phase = phase & 0b01111111; // upper bit is reserved
        self.write_register(reg, phase)
    }

    fn frequency(&self, clk: ClockOutput) -> u64 {
        self.clk_freq[clk.ix() as usize]
    }

    fn pll_frequency(&self, pll: PLL) -> u64 {
        self.pll_freq[pll.ix()]
    }

    fn pll_assignment(&self, clk: ClockOutput) -> PLL {
        self.pll_assignment[clk.ix() as usize]
    }
}
