//! Two-stage pixel clock PLL solver
//!
//! The head PLL synthesizes `refclk * (NA/MA) * (NB/MB) / 2^P`. Stage A and
//! stage B each have VCO and input-frequency windows; the search walks the
//! plausible post-dividers and keeps the first coefficient set with the
//! smallest error.
//!
//! All comparisons are done on exact integer ratios so the result does not
//! depend on floating point rounding.

use core::cmp::Ordering;

/// Reference crystal, kHz
pub const REFCLK_KHZ: u64 = 27_000;

const MIN_VCO_A: u64 = 100_000;
const MAX_VCO_A: u64 = 400_000;
const MIN_VCO_B: u64 = 600_000;
const MAX_VCO_B: u64 = 1_400_000;
const MIN_UA: u64 = 2_000;
const MAX_UA: u64 = 400_000;
const MIN_UB: u64 = 50_000;
const MAX_UB: u64 = 200_000;
const MAX_NA: u32 = 255;
const MAX_MA: u32 = 255;
const MAX_NB: u64 = 31;
const MAX_MB: u32 = 31;
const MAX_P: u32 = 6;

/// PLL coefficients. All zero means no feasible solution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PllParams {
    pub na: u32,
    pub ma: u32,
    pub nb: u32,
    pub mb: u32,
    pub p: u32,
}

/// Absolute frequency error kept as the fraction `num / den` kHz.
#[derive(Clone, Copy)]
struct Error {
    num: u64,
    den: u64,
}

impl Error {
    fn cmp(&self, other: &Error) -> Ordering {
        let lhs = self.num as u128 * other.den as u128;
        let rhs = other.num as u128 * self.den as u128;
        lhs.cmp(&rhs)
    }
}

/// Round `num / den` to the nearest integer, ties to even.
fn div_round_even(num: u64, den: u64) -> u64 {
    let q = num / den;
    let r = num % den;
    match (2 * r).cmp(&den) {
        Ordering::Less => q,
        Ordering::Greater => q + 1,
        Ordering::Equal => q + (q & 1),
    }
}

impl PllParams {
    pub fn is_zero(&self) -> bool {
        *self == PllParams::default()
    }

    /// Synthesized frequency in kHz, rounded to nearest.
    pub fn frequency_khz(&self) -> u32 {
        if self.ma == 0 || self.mb == 0 {
            return 0;
        }
        let num = REFCLK_KHZ * self.na as u64 * self.nb as u64;
        let den = (self.ma as u64 * self.mb as u64) << self.p;
        ((num + den / 2) / den) as u32
    }

    /// Find the coefficients closest to `pclk` kHz.
    pub fn solve(pclk: u32) -> PllParams {
        let requested = pclk;
        let mut pclk = pclk as u64;

        // maxVcoB scaled by 200 so the +0.5% widening stays exact
        let max_vco_b_200 = (MAX_VCO_B * 200).max(pclk * 201);
        if MIN_VCO_B / (1 << MAX_P) > pclk {
            pclk = MIN_VCO_B / (1 << MAX_P);
        }

        // smallest P whose doubled target exceeds the deflated VCO ceiling
        let fits = |p: u32, scale: u64| pclk * 40_000 * (1u64 << (p + 1)) <= max_vco_b_200 * scale;
        let mut low_p = 0;
        while fits(low_p, 199) && low_p < MAX_P {
            low_p += 1;
        }
        let mut high_p = low_p;
        while fits(high_p, 201) && high_p < MAX_P {
            high_p += 1;
        }

        let mut best: Option<(PllParams, Error)> = None;

        for p in low_p..=high_p {
            for ma in 1..=MAX_MA {
                let ma64 = ma as u64;
                if REFCLK_KHZ < MIN_UA * ma64 {
                    break;
                }
                if REFCLK_KHZ > MAX_UA * ma64 {
                    continue;
                }

                for na in 1..=MAX_NA {
                    let na64 = na as u64;
                    let vco_a = REFCLK_KHZ * na64;
                    if vco_a < MIN_VCO_A * ma64 || vco_a > MAX_VCO_A * ma64 {
                        continue;
                    }

                    for mb in 1..=MAX_MB {
                        let mb64 = mb as u64;
                        if vco_a < MIN_UB * ma64 * mb64 {
                            break;
                        }
                        if vco_a > MAX_UB * ma64 * mb64 {
                            continue;
                        }

                        let nb = div_round_even((pclk << p) * ma64 * mb64, na64 * REFCLK_KHZ);
                        if nb > MAX_NB {
                            break;
                        }
                        if nb < 1 {
                            continue;
                        }

                        let den = (ma64 * mb64) << p;
                        let achieved = REFCLK_KHZ * na64 * nb;
                        let target = pclk * den;
                        let error = Error {
                            num: target.abs_diff(achieved),
                            den,
                        };

                        let better = match &best {
                            None => true,
                            Some((_, e)) => error.cmp(e) == Ordering::Less,
                        };
                        if better {
                            let params = PllParams {
                                na,
                                ma,
                                nb: nb as u32,
                                mb,
                                p,
                            };
                            best = Some((params, error));
                        }
                    }
                }
            }
        }

        match best {
            Some((params, _)) => params,
            None => {
                log::warn!("pll: no coefficients for {} kHz", requested);
                PllParams::default()
            }
        }
    }
}
