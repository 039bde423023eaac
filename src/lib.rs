/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
/*!
Frequency planning and register programming for the [Si5351] clock
generator, based on the [`embedded-hal`] traits.

## The Device

The Silicon Labs [Si5351] derives up to eight clock outputs from two PLLs
locked to a crystal reference. Each PLL multiplies the reference by a
fractional feedback divider `a + b/c`; each output divides a PLL down again
through a multisynth and an optional power-of-two R divider.

## Frequencies

All frequencies handled by this crate are `u64` values in hundredths of a
hertz, i.e. multiplied by [`FREQ_MULT`]. 14.175 MHz is
`14_175_000 * FREQ_MULT`.

## Usage

Wrap an I²C bus and initialize the chip:

```ignore
use si5351_synth::{Si5351, Si5351Device, CrystalLoad};

let mut clock = Si5351Device::new_i2c(i2c, false, 25_000_000);
clock.init(CrystalLoad::_10)?;
```

Or, for an [Adafruit module]:

```ignore
let mut clock = Si5351Device::new_adafruit_module(i2c);
clock.init_adafruit_module()?;
```

Then request output frequencies. Outputs at or below 112.5 MHz share their
PLL with the other outputs; a single output above that gets its PLL retuned
for it, and everything else on that PLL is recalculated around it:

```ignore
use si5351_synth::{ClockOutput, FREQ_MULT};

clock.set_frequency(ClockOutput::Clk0, 14_175_000 * FREQ_MULT)?;
clock.set_frequency(ClockOutput::Clk1, 125_000_000 * FREQ_MULT)?;
```

Any other transport can be used by implementing [`RegisterAccess`].

[Si5351]: https://www.silabs.com/documents/public/data-sheets/Si5351-B.pdf
[`embedded-hal`]: https://github.com/rust-embedded/embedded-hal
[Adafruit module]: https://www.adafruit.com/product/2045
*/
#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate bitflags;
use embedded_hal as hal;

use core::fmt;

mod device;
mod interface;
mod regs;
pub mod synth;

pub use crate::device::{Config, Si5351, Si5351Device};
pub use crate::interface::{I2cInterface, RegisterAccess, ADDRESS};
pub use crate::regs::{DeviceStatusBits, InterruptStatusBits};
pub use crate::synth::DividerParams;

/// Scale applied to every frequency value.
pub const FREQ_MULT: u64 = 100;

/// Crystal frequency of most breakout boards, in Hz.
pub const XTAL_FREQ: u32 = 25_000_000;
/// VCO frequency both PLLs are set to after a reset.
pub const PLL_FIXED: u64 = 900_000_000 * FREQ_MULT;

pub const PLL_VCO_MIN: u64 = 600_000_000 * FREQ_MULT;
pub const PLL_VCO_MAX: u64 = 900_000_000 * FREQ_MULT;
pub const PLL_A_MIN: u32 = 15;
pub const PLL_A_MAX: u32 = 90;

pub const MULTISYNTH_MIN_FREQ: u64 = 500_000 * FREQ_MULT;
pub const MULTISYNTH_MAX_FREQ: u64 = 225_000_000 * FREQ_MULT;
/// From here on up the output multisynth runs in fixed divide-by-4 mode.
pub const MULTISYNTH_DIVBY4_FREQ: u64 = 150_000_000 * FREQ_MULT;
/// Highest output frequency that can share its PLL with other outputs.
pub const MULTISYNTH_SHARE_MAX: u64 = 112_500_000 * FREQ_MULT;
pub const MULTISYNTH_A_MIN: u32 = 6;
pub const MULTISYNTH_A_MAX: u32 = 1800;

pub const MULTISYNTH67_A_MAX: u32 = 254;
pub const MULTISYNTH67_MIN_FREQ: u64 = PLL_VCO_MIN / MULTISYNTH67_A_MAX as u64;
pub const MULTISYNTH67_MAX_FREQ: u64 = MULTISYNTH_DIVBY4_FREQ;

pub const CLKOUT_MIN_FREQ: u64 = 4_000 * FREQ_MULT;
pub const CLKOUT_MAX_FREQ: u64 = MULTISYNTH_MAX_FREQ;
/// Lowest CLK6/CLK7 frequency with the PLL at the bottom of the VCO range.
/// A faster PLL raises the floor, see [`Si5351::set_frequency`].
pub const CLKOUT67_MIN_FREQ: u64 = MULTISYNTH67_MIN_FREQ / 128;
pub const CLKOUT67_MAX_FREQ: u64 = MULTISYNTH67_MAX_FREQ;

/// Fixed denominator used for every fractional divider.
pub const RFRAC_DENOM: u32 = (1 << 20) - 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The register transport failed.
    CommunicationError,
    /// The hardware has no way to express the request.
    InvalidParameter,
    /// Another output already holds a PLL exclusively.
    RangeRejected,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::CommunicationError => write!(f, "Communication Error"),
            Error::InvalidParameter => write!(f, "Invalid Parameter"),
            Error::RangeRejected => write!(f, "Range Rejected"),
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

/// R divider applied after the output multisynth.
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

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveStrength {
    _2mA,
    _4mA,
    _6mA,
    _8mA,
}

/// What feeds a clock output's driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    Xtal,
    ClkIn,
    /// MS0 for CLK1..CLK3, MS4 for CLK5..CLK7. Not available on CLK0 or CLK4.
    Multisynth0,
    /// The output's own multisynth.
    Multisynth,
}

/// Output level while a clock is disabled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDisableState {
    Low = 0,
    High = 1,
    HighImpedance = 2,
    NeverDisabled = 3,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockFanout {
    ClkIn,
    Xo,
    Multisynth,
}

impl PLL {
    fn ix(&self) -> usize {
        *self as usize
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

    fn ix(&self) -> u8 {
        *self as u8
    }

    fn bit(&self) -> u8 {
        1u8 << self.ix()
    }
}

impl OutputDivider {
    fn bits(&self) -> u8 {
        *self as u8
    }

    pub fn denominator(&self) -> u64 {
        1 << self.bits()
    }

    /// The next larger divider, if any.
    pub fn doubled(&self) -> Option<OutputDivider> {
        match *self {
            OutputDivider::Div1 => Some(OutputDivider::Div2),
            OutputDivider::Div2 => Some(OutputDivider::Div4),
            OutputDivider::Div4 => Some(OutputDivider::Div8),
            OutputDivider::Div8 => Some(OutputDivider::Div16),
            OutputDivider::Div16 => Some(OutputDivider::Div32),
            OutputDivider::Div32 => Some(OutputDivider::Div64),
            OutputDivider::Div64 => Some(OutputDivider::Div128),
            OutputDivider::Div128 => None,
        }
    }
}
