/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Register map, see Silicon Labs AN619.

use crate::{ClockOutput, PLL};

#[derive(Debug, Copy, Clone)]
pub(crate) enum Register {
    DeviceStatus = 0,
    InterruptStatus = 1,
    OutputEnable = 3,
    Clk0 = 16,
    Clk1 = 17,
    Clk2 = 18,
    Clk3 = 19,
    Clk4 = 20,
    Clk5 = 21,
    Clk6 = 22,
    Clk7 = 23,
    Clk3_0DisableState = 24,
    Clk7_4DisableState = 25,
    Ms67RDiv = 92,
    Clk0PhaseOffset = 165,
    Clk1PhaseOffset = 166,
    Clk2PhaseOffset = 167,
    Clk3PhaseOffset = 168,
    Clk4PhaseOffset = 169,
    Clk5PhaseOffset = 170,
    PLLReset = 177,
    CrystalLoad = 183,
    FanoutEnable = 187,
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
        const REVID = 0b0000_0011;
    }
}

bitflags! {
    pub struct InterruptStatusBits: u8 {
        const SYS_INIT_STKY = 0b1000_0000;
        const LOL_B_STKY = 0b0100_0000;
        const LOL_A_STKY = 0b0010_0000;
        const LOS_STKY = 0b0001_0000;
    }
}

bitflags! {
    pub(crate) struct CrystalLoadBits: u8 {
        const RESERVED = 0b00_010010;
        const CL_6 = 0b01_000000;
        const CL_8 = 0b10_000000;
        const CL_10 = 0b11_000000;
    }
}

bitflags! {
    pub(crate) struct ClockControlBits: u8 {
        const CLK_PDN = 0b1000_0000;
        const MS_INT = 0b0100_0000;
        const MS_SRC = 0b0010_0000;
        const CLK_INV = 0b0001_0000;
        const CLK_SRC_XTAL = 0b0000_0000;
        const CLK_SRC_CLKIN = 0b0000_0100;
        const CLK_SRC_MS_ALT = 0b0000_1000;
        const CLK_SRC_MS = 0b0000_1100;
        const CLK_DRV_2 = 0b0000_0000;
        const CLK_DRV_4 = 0b0000_0001;
        const CLK_DRV_6 = 0b0000_0010;
        const CLK_DRV_8 = 0b0000_0011;
    }
}

bitflags! {
    pub(crate) struct PLLResetBits: u8 {
        const PLLB_RST = 0b1000_0000;
        const PLLA_RST = 0b0010_0000;
    }
}

bitflags! {
    /// Third byte of an MS0..MS5 parameter block.
    pub(crate) struct MsDivBits: u8 {
        const RESERVED = 0b1000_0000;
        const R_DIV = 0b0111_0000;
        const DIVBY4 = 0b0000_1100;
        const P1_HIGH = 0b0000_0011;
    }
}

bitflags! {
    pub(crate) struct FanoutBits: u8 {
        const CLKIN_EN = 0b1000_0000;
        const XO_EN = 0b0100_0000;
        const MS_EN = 0b0001_0000;
    }
}

pub(crate) const PLL_A_PARAMETERS: u8 = 26;
pub(crate) const PLL_B_PARAMETERS: u8 = 34;
pub(crate) const MS0_PARAMETERS: u8 = 42;
pub(crate) const MS6_PARAMETERS: u8 = 90;
pub(crate) const MS7_PARAMETERS: u8 = 91;

/// Multisynths with a full 8-byte `p1/p2/p3` parameter block.
pub(crate) trait FractionalMultisynth {
    fn base_addr(&self) -> u8;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum FeedbackMultisynth {
    MSNA,
    MSNB,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Multisynth {
    MS0,
    MS1,
    MS2,
    MS3,
    MS4,
    MS5,
}

/// Integer-only multisynths; a single divider byte each.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SimpleMultisynth {
    MS6,
    MS7,
}

/// The divider stage in front of a clock output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum OutputSynth {
    Fractional(Multisynth),
    Integer(SimpleMultisynth),
}

impl PLL {
    pub(crate) fn multisynth(&self) -> FeedbackMultisynth {
        match *self {
            PLL::A => FeedbackMultisynth::MSNA,
            PLL::B => FeedbackMultisynth::MSNB,
        }
    }

    pub(crate) fn reset_bits(&self) -> PLLResetBits {
        match *self {
            PLL::A => PLLResetBits::PLLA_RST,
            PLL::B => PLLResetBits::PLLB_RST,
        }
    }
}

impl FractionalMultisynth for FeedbackMultisynth {
    fn base_addr(&self) -> u8 {
        match *self {
            FeedbackMultisynth::MSNA => PLL_A_PARAMETERS,
            FeedbackMultisynth::MSNB => PLL_B_PARAMETERS,
        }
    }
}

impl FractionalMultisynth for Multisynth {
    fn base_addr(&self) -> u8 {
        MS0_PARAMETERS + 8 * (*self as u8)
    }
}

impl SimpleMultisynth {
    pub fn base_addr(&self) -> u8 {
        match *self {
            SimpleMultisynth::MS6 => MS6_PARAMETERS,
            SimpleMultisynth::MS7 => MS7_PARAMETERS,
        }
    }

    /// Bit offset of this multisynth's R divider inside register 92.
    pub fn r_div_shift(&self) -> u8 {
        match *self {
            SimpleMultisynth::MS6 => 0,
            SimpleMultisynth::MS7 => 4,
        }
    }
}

impl ClockOutput {
    pub(crate) fn register(self) -> Register {
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

    /// CLK6 and CLK7 have no phase offset register.
    pub(crate) fn phase_register(self) -> Option<Register> {
        match self {
            ClockOutput::Clk0 => Some(Register::Clk0PhaseOffset),
            ClockOutput::Clk1 => Some(Register::Clk1PhaseOffset),
            ClockOutput::Clk2 => Some(Register::Clk2PhaseOffset),
            ClockOutput::Clk3 => Some(Register::Clk3PhaseOffset),
            ClockOutput::Clk4 => Some(Register::Clk4PhaseOffset),
            ClockOutput::Clk5 => Some(Register::Clk5PhaseOffset),
            ClockOutput::Clk6 | ClockOutput::Clk7 => None,
        }
    }

    /// Disable-state register and the bit offset of this output's field.
    pub(crate) fn disable_state_register(self) -> (Register, u8) {
        let ix = self.ix();
        if ix < 4 {
            (Register::Clk3_0DisableState, ix * 2)
        } else {
            (Register::Clk7_4DisableState, (ix - 4) * 2)
        }
    }

    pub(crate) fn synth(self) -> OutputSynth {
        match self {
            ClockOutput::Clk0 => OutputSynth::Fractional(Multisynth::MS0),
            ClockOutput::Clk1 => OutputSynth::Fractional(Multisynth::MS1),
            ClockOutput::Clk2 => OutputSynth::Fractional(Multisynth::MS2),
            ClockOutput::Clk3 => OutputSynth::Fractional(Multisynth::MS3),
            ClockOutput::Clk4 => OutputSynth::Fractional(Multisynth::MS4),
            ClockOutput::Clk5 => OutputSynth::Fractional(Multisynth::MS5),
            ClockOutput::Clk6 => OutputSynth::Integer(SimpleMultisynth::MS6),
            ClockOutput::Clk7 => OutputSynth::Integer(SimpleMultisynth::MS7),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_block_addresses() {
        assert_eq!(PLL::A.multisynth().base_addr(), 26);
        assert_eq!(PLL::B.multisynth().base_addr(), 34);
        assert_eq!(Multisynth::MS0.base_addr(), 42);
        assert_eq!(Multisynth::MS3.base_addr(), 66);
        assert_eq!(Multisynth::MS5.base_addr(), 82);
        assert_eq!(SimpleMultisynth::MS7.base_addr(), 91);
    }

    #[test]
    fn disable_state_covers_upper_outputs() {
        assert_eq!(ClockOutput::Clk2.disable_state_register().0.addr(), 24);
        assert_eq!(ClockOutput::Clk2.disable_state_register().1, 4);
        assert_eq!(ClockOutput::Clk5.disable_state_register().0.addr(), 25);
        assert_eq!(ClockOutput::Clk5.disable_state_register().1, 2);
    }
}
