/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Divider arithmetic for the feedback and output multisynths.
//!
//! Every frequency here is scaled by [`FREQ_MULT`](crate::FREQ_MULT).

use crate::regs::MsDivBits;
use crate::OutputDivider;
use crate::{
    CLKOUT_MIN_FREQ, MULTISYNTH67_A_MAX, MULTISYNTH67_MAX_FREQ, MULTISYNTH67_MIN_FREQ,
    MULTISYNTH_A_MAX, MULTISYNTH_A_MIN, MULTISYNTH_DIVBY4_FREQ, MULTISYNTH_MAX_FREQ,
    MULTISYNTH_MIN_FREQ, PLL_A_MAX, PLL_A_MIN, PLL_VCO_MAX, PLL_VCO_MIN, RFRAC_DENOM,
};

/// Packed `(p1, p2, p3)` encoding of a fractional divider `a + b/c`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DividerParams {
    pub p1: u32,
    pub p2: u32,
    pub p3: u32,
}

impl DividerParams {
    /// Marks a multisynth running in fixed divide-by-4 mode.
    pub const DIV_BY_4: DividerParams = DividerParams {
        p1: 0,
        p2: 0,
        p3: 1,
    };

    pub fn from_ratio(a: u32, b: u32, c: u32) -> Self {
        let ratio = 128 * b / c;
        DividerParams {
            p1: 128 * a + ratio - 512,
            p2: 128 * b - c * ratio,
            p3: c,
        }
    }

    /// True when the divider is an even integer, which is when the chip
    /// wants MS_INT set.
    pub fn is_even_integer(&self) -> bool {
        self.p2 == 0 && self.p3 == 1 && (self.p1 + 512) % 256 == 0
    }

    /// Lays the parameters out as an 8-byte parameter block. `byte2_high`
    /// supplies bits 7:2 of the third byte (R divider, DIVBY4, reserved).
    pub fn to_registers(&self, byte2_high: u8) -> [u8; 8] {
        let (p1, p2, p3) = (self.p1, self.p2, self.p3);
        [
            ((p3 & 0x0000_FF00) >> 8) as u8,
            p3 as u8,
            (byte2_high & !MsDivBits::P1_HIGH.bits()) | ((p1 & 0x0003_0000) >> 16) as u8,
            ((p1 & 0x0000_FF00) >> 8) as u8,
            p1 as u8,
            (((p3 & 0x000F_0000) >> 12) | ((p2 & 0x000F_0000) >> 16)) as u8,
            ((p2 & 0x0000_FF00) >> 8) as u8,
            p2 as u8,
        ]
    }

    pub fn from_registers(regs: &[u8; 8]) -> Self {
        let p3 = (u32::from(regs[5] >> 4) << 16) | (u32::from(regs[0]) << 8) | u32::from(regs[1]);
        let p1 = (u32::from(regs[2] & 0x03) << 16) | (u32::from(regs[3]) << 8) | u32::from(regs[4]);
        let p2 = (u32::from(regs[5] & 0x0F) << 16) | (u32::from(regs[6]) << 8) | u32::from(regs[7]);
        DividerParams { p1, p2, p3 }
    }
}

/// Approximates `remainder / base` as `b / c` over the fixed denominator.
///
/// Not a best-rational search: with `c` pinned at `RFRAC_DENOM` the error
/// stays below one part in 2^20 of `base`.
pub fn approximate(remainder: u64, base: u64) -> (u32, u32) {
    if remainder == 0 {
        return (0, 1);
    }
    let b = (remainder * u64::from(RFRAC_DENOM) / base) as u32;
    if b == 0 {
        (0, 1)
    } else {
        (b, RFRAC_DENOM)
    }
}

/// Applies a parts-per-billion correction to the nominal reference,
/// rounding half away from zero. Never returns less than 1.
pub fn corrected_reference(xtal_freq: u64, correction: i32) -> u64 {
    let delta = i128::from(correction) * i128::from(xtal_freq);
    let half = if delta < 0 { -500_000_000 } else { 500_000_000 };
    let adjusted = i128::from(xtal_freq) + (delta + half) / 1_000_000_000;
    adjusted.max(1) as u64
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllTuning {
    /// VCO frequency the parameters actually produce.
    pub vco_freq: u64,
    pub params: DividerParams,
}

/// Feedback divider for a VCO target. Out-of-range targets are clamped to the
/// nearest achievable frequency rather than rejected.
pub fn tune_pll(target: u64, xtal_freq: u64, correction: i32) -> PllTuning {
    let ref_freq = corrected_reference(xtal_freq, correction);
    let mut freq = target.clamp(PLL_VCO_MIN, PLL_VCO_MAX);

    let mut a = freq / ref_freq;
    if a < u64::from(PLL_A_MIN) {
        a = u64::from(PLL_A_MIN);
        freq = ref_freq * a;
    } else if a > u64::from(PLL_A_MAX) {
        a = u64::from(PLL_A_MAX);
        freq = ref_freq * a;
    }

    let (b, c) = approximate(freq % ref_freq, ref_freq);
    let vco_freq = ref_freq * a + ref_freq * u64::from(b) / u64::from(c);

    PllTuning {
        vco_freq,
        params: DividerParams::from_ratio(a as u32, b, c),
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MultisynthTuning {
    /// PLL frequency the divider was computed against. When no PLL frequency
    /// was supplied this is the frequency the PLL has to be tuned to.
    pub pll_freq: u64,
    /// Output frequency the divider produces from `pll_freq`.
    pub out_freq: u64,
    pub params: DividerParams,
    pub div_by_4: bool,
}

/// Divider for one of the fractional output multisynths (MS0..MS5).
///
/// With `pll_freq == None` an integer divider is chosen that puts the PLL as
/// close to the top of the VCO range as possible. With a fixed PLL the
/// divider is fractional and the achievable output frequency is returned.
/// A fixed PLL frequency outside the VCO range is clamped into it first.
pub fn tune_multisynth(target: u64, pll_freq: Option<u64>) -> MultisynthTuning {
    let mut freq = target.clamp(MULTISYNTH_MIN_FREQ, MULTISYNTH_MAX_FREQ);
    let pll_freq = pll_freq.map(|f| f.clamp(PLL_VCO_MIN, PLL_VCO_MAX));
    let div_by_4 = freq >= MULTISYNTH_DIVBY4_FREQ;

    let (pll_freq, a, b, c) = match pll_freq {
        None => {
            let a = if div_by_4 { 4 } else { PLL_VCO_MAX / freq };
            (a * freq, a, 0, 1)
        }
        Some(pll_freq) if div_by_4 => {
            freq = pll_freq / 4;
            (pll_freq, 4, 0, 1)
        }
        Some(pll_freq) => {
            let mut a = pll_freq / freq;
            if a < u64::from(MULTISYNTH_A_MIN) {
                freq = pll_freq / u64::from(MULTISYNTH_A_MIN);
                a = pll_freq / freq;
            } else if a > u64::from(MULTISYNTH_A_MAX) {
                freq = pll_freq / u64::from(MULTISYNTH_A_MAX);
                a = pll_freq / freq;
            }
            let (b, c) = approximate(pll_freq % freq, freq);
            (pll_freq, a, b, c)
        }
    };

    let params = if div_by_4 {
        DividerParams::DIV_BY_4
    } else {
        DividerParams::from_ratio(a as u32, b, c)
    };

    MultisynthTuning {
        pll_freq,
        out_freq: freq,
        params,
        div_by_4,
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IntegerTuning {
    pub pll_freq: u64,
    pub out_freq: u64,
    /// Even divide ratio, written verbatim to MS6_P1/MS7_P1.
    pub divider: u8,
}

fn even_divider(ratio: u64) -> u64 {
    ratio.clamp(u64::from(MULTISYNTH_A_MIN), u64::from(MULTISYNTH67_A_MAX)) & !1
}

/// Divider for the integer-only multisynths behind CLK6 and CLK7.
pub fn tune_multisynth67(target: u64, pll_freq: Option<u64>) -> IntegerTuning {
    let freq = target.clamp(MULTISYNTH67_MIN_FREQ, MULTISYNTH67_MAX_FREQ);
    match pll_freq.map(|f| f.clamp(PLL_VCO_MIN, PLL_VCO_MAX)) {
        None => {
            let a = even_divider(PLL_VCO_MAX / freq);
            IntegerTuning {
                pll_freq: a * freq,
                out_freq: freq,
                divider: a as u8,
            }
        }
        Some(pll_freq) => {
            let a = even_divider(pll_freq / freq);
            IntegerTuning {
                pll_freq,
                out_freq: pll_freq / a,
                divider: a as u8,
            }
        }
    }
}

/// Smallest power-of-two post divider lifting `freq` to at least `floor`.
/// Saturates at divide-by-128.
pub fn r_divider_for(freq: u64, floor: u64) -> (OutputDivider, u64) {
    let mut r_div = OutputDivider::Div1;
    while freq * r_div.denominator() < floor {
        match r_div.doubled() {
            Some(next) => r_div = next,
            None => break,
        }
    }
    (r_div, freq * r_div.denominator())
}

/// R divider for MS0..MS5: each doubling of the output frequency above
/// `CLKOUT_MIN_FREQ` drops one step, from divide-by-128 down to divide-by-1.
pub fn select_r_divider(freq: u64) -> (OutputDivider, u64) {
    r_divider_for(freq, CLKOUT_MIN_FREQ * 128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FREQ_MULT, XTAL_FREQ};

    const MHZ: u64 = 1_000_000 * FREQ_MULT;
    const XTAL: u64 = XTAL_FREQ as u64 * FREQ_MULT;

    #[test]
    fn approximate_uses_fixed_denominator() {
        assert_eq!(approximate(0, XTAL), (0, 1));
        assert_eq!(approximate(15 * MHZ, XTAL), (629_145, RFRAC_DENOM));
        // Too small to register against the denominator.
        assert_eq!(approximate(1, XTAL), (0, 1));
    }

    #[test]
    fn from_ratio_matches_register_formula() {
        assert_eq!(
            DividerParams::from_ratio(36, 0, 1),
            DividerParams {
                p1: 4096,
                p2: 0,
                p3: 1
            }
        );
        let params = DividerParams::from_ratio(33, 629_145, RFRAC_DENOM);
        // floor(128 * 0.6) = 76
        assert_eq!(params.p1, 128 * 33 + 76 - 512);
        assert_eq!(params.p2, 128 * 629_145 - RFRAC_DENOM * 76);
        assert_eq!(params.p3, RFRAC_DENOM);
    }

    #[test]
    fn register_block_round_trips() {
        for a in PLL_A_MIN..=PLL_A_MAX {
            for &(b, c) in &[(0, 1), (1, RFRAC_DENOM), (524_287, RFRAC_DENOM), (RFRAC_DENOM - 1, RFRAC_DENOM)] {
                let params = DividerParams::from_ratio(a, b, c);
                let regs = params.to_registers(0);
                assert_eq!(DividerParams::from_registers(&regs), params, "a={} b={} c={}", a, b, c);
            }
        }
    }

    #[test]
    fn register_block_layout() {
        let params = DividerParams {
            p1: 0x2_3456,
            p2: 0xA_BCDE,
            p3: 0xF_1234,
        };
        assert_eq!(
            params.to_registers(0b1011_0000),
            [0x12, 0x34, 0b1011_0010, 0x34, 0x56, 0xFA, 0xBC, 0xDE]
        );
    }

    #[test]
    fn correction_is_parts_per_billion() {
        assert_eq!(corrected_reference(XTAL, 0), XTAL);
        assert_eq!(corrected_reference(XTAL, 1_000), XTAL + 2_500);
        assert_eq!(corrected_reference(XTAL, -1_000), XTAL - 2_500);
        // 2.5 rounds away from zero
        assert_eq!(corrected_reference(XTAL, 1), XTAL + 3);
        assert_eq!(corrected_reference(XTAL, -1), XTAL - 3);
    }

    #[test]
    fn pll_tuning_stays_in_range_and_close() {
        let step = 7_777_777 * FREQ_MULT;
        let mut target = PLL_VCO_MIN;
        while target <= PLL_VCO_MAX {
            let tuning = tune_pll(target, XTAL, 0);
            let regs = tuning.params.to_registers(0);
            let params = DividerParams::from_registers(&regs);
            let a = (params.p1 + 512) / 128;
            assert!(a >= PLL_A_MIN && a <= PLL_A_MAX);
            assert!(tuning.vco_freq <= target);
            assert!(target - tuning.vco_freq < XTAL / u64::from(RFRAC_DENOM) + 1);
            target += step;
        }
    }

    #[test]
    fn zero_reference_is_floored() {
        assert_eq!(corrected_reference(XTAL, -1_000_000_000), 1);
        assert_eq!(corrected_reference(XTAL, i32::MIN), 1);
        assert_eq!(corrected_reference(0, 0), 1);

        let tuning = tune_pll(PLL_VCO_MAX, XTAL, -1_000_000_000);
        assert_eq!(tuning.params, DividerParams::from_ratio(PLL_A_MAX, 0, 1));
        assert_eq!(tuning.vco_freq, u64::from(PLL_A_MAX));
    }

    #[test]
    fn pll_tuning_clamps_vco() {
        assert_eq!(tune_pll(100 * MHZ, XTAL, 0).vco_freq, PLL_VCO_MIN);
        assert_eq!(tune_pll(2_000 * MHZ, XTAL, 0).vco_freq, PLL_VCO_MAX);
    }

    #[test]
    fn pll_tuning_clamps_feedback_integer() {
        // With a 50 MHz reference, 600 MHz needs a = 12, below the minimum.
        let tuning = tune_pll(600 * MHZ, 50 * MHZ, 0);
        assert_eq!(tuning.vco_freq, 750 * MHZ);
        assert_eq!(tuning.params, DividerParams::from_ratio(15, 0, 1));
    }

    #[test]
    fn pll_tuning_exact_fraction() {
        let tuning = tune_pll(840 * MHZ, XTAL, 0);
        assert_eq!(tuning.vco_freq, 840 * MHZ);
        assert_eq!(tuning.params, DividerParams::from_ratio(33, 629_145, RFRAC_DENOM));
    }

    #[test]
    fn multisynth_picks_pll_for_integer_divider() {
        let tuning = tune_multisynth(10 * MHZ, None);
        assert_eq!(tuning.pll_freq, 900 * MHZ);
        assert_eq!(tuning.out_freq, 10 * MHZ);
        assert_eq!(tuning.params, DividerParams::from_ratio(90, 0, 1));
        assert!(!tuning.div_by_4);

        let tuning = tune_multisynth(120 * MHZ, None);
        assert_eq!(tuning.pll_freq, 840 * MHZ);
        assert_eq!(tuning.params, DividerParams::from_ratio(7, 0, 1));
    }

    #[test]
    fn multisynth_div_by_4_sentinel() {
        for &freq in &[150 * MHZ, 180 * MHZ, 225 * MHZ, 300 * MHZ] {
            let tuning = tune_multisynth(freq, None);
            assert!(tuning.div_by_4);
            assert_eq!(tuning.params, DividerParams::DIV_BY_4);
            assert_eq!(tuning.pll_freq, 4 * freq.min(MULTISYNTH_MAX_FREQ));

            let tuning = tune_multisynth(freq, Some(800 * MHZ));
            assert!(tuning.div_by_4);
            assert_eq!(tuning.params, DividerParams::DIV_BY_4);
            assert_eq!(tuning.out_freq, 200 * MHZ);
        }
    }

    #[test]
    fn multisynth_fractional_against_fixed_pll() {
        let tuning = tune_multisynth(7 * MHZ, Some(900 * MHZ));
        assert_eq!(tuning.pll_freq, 900 * MHZ);
        assert_eq!(tuning.out_freq, 7 * MHZ);
        // 900 / 7 = 128 + 4/7
        let (b, c) = approximate(4 * MHZ, 7 * MHZ);
        assert_eq!(tuning.params, DividerParams::from_ratio(128, b, c));
        assert!(!tuning.params.is_even_integer());
    }

    #[test]
    fn multisynth_clamps_divider_by_moving_output() {
        // 600 / 120 = 5 is below the minimum divider of 6
        let tuning = tune_multisynth(120 * MHZ, Some(600 * MHZ));
        assert_eq!(tuning.out_freq, 100 * MHZ);
        assert_eq!(tuning.params, DividerParams::from_ratio(6, 0, 1));

        // below the multisynth floor the target itself is clamped
        let tuning = tune_multisynth(100_000 * FREQ_MULT, Some(900 * MHZ));
        assert_eq!(tuning.out_freq, MULTISYNTH_MIN_FREQ);
        assert_eq!(tuning.params, DividerParams::from_ratio(1800, 0, 1));
    }

    #[test]
    fn multisynth_clamps_fixed_pll_into_vco_range() {
        let tuning = tune_multisynth(10 * MHZ, Some(5));
        assert_eq!(tuning.pll_freq, PLL_VCO_MIN);
        assert_eq!(tuning.out_freq, 10 * MHZ);
        assert_eq!(tuning.params, DividerParams::from_ratio(60, 0, 1));

        let tuning = tune_multisynth67(10 * MHZ, Some(0));
        assert_eq!(tuning.divider, 60);
        assert_eq!(tuning.out_freq, 10 * MHZ);
    }

    #[test]
    fn integer_multisynth_is_even() {
        let tuning = tune_multisynth67(10 * MHZ, None);
        assert_eq!(tuning.divider, 90);
        assert_eq!(tuning.pll_freq, 900 * MHZ);

        let tuning = tune_multisynth67(7 * MHZ, Some(900 * MHZ));
        assert_eq!(tuning.divider, 128);
        assert_eq!(tuning.out_freq, 900 * MHZ / 128);

        let tuning = tune_multisynth67(3 * MHZ, Some(900 * MHZ));
        assert_eq!(tuning.divider, 254);
    }

    #[test]
    fn r_divider_bands() {
        let min = CLKOUT_MIN_FREQ;
        assert_eq!(select_r_divider(min), (OutputDivider::Div128, min * 128));
        assert_eq!(select_r_divider(2 * min - 1), (OutputDivider::Div128, (2 * min - 1) * 128));
        assert_eq!(select_r_divider(2 * min), (OutputDivider::Div64, 2 * min * 64));
        assert_eq!(select_r_divider(64 * min), (OutputDivider::Div2, 128 * min));
        assert_eq!(select_r_divider(128 * min), (OutputDivider::Div1, 128 * min));
        assert_eq!(select_r_divider(10 * MHZ), (OutputDivider::Div1, 10 * MHZ));
    }
}
