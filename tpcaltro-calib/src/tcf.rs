//! Tail-cancellation-filter coefficient derivation.
//!
//! From the fitted three-exponential pulse the first two filter stages are
//! derived analytically: the slow signal time constants become the stage
//! zeros, and the roots of the partial-fraction numerator quadratic become
//! the stage poles. The third stage is a height-equalization term computed
//! by forward-simulating stages one and two over the mean pulse.

use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fit::{fit_pulse, FitResult};
use crate::pulse::PulseHistogram;
use crate::shaper::N_PARAMS;

/// Three pole/zero pairs of the tail-cancellation filter.
///
/// Stages one and two carry `exp(-1/T)` coefficients in `(0, 1)`; the third
/// stage is the height-equalization term with exactly one of its pair
/// nonzero (or both zero when no correction is needed).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TcfCoefficients {
    /// Stage zeros.
    pub zeros: [f64; 3],
    /// Stage poles.
    pub poles: [f64; 3],
}

impl TcfCoefficients {
    /// The identity filter: all stages pass the signal through unchanged.
    pub fn identity() -> Self {
        Self {
            zeros: [0.0; 3],
            poles: [0.0; 3],
        }
    }
}

/// Calibration record for one pad or sector, as consumed by the hardware
/// filter loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcfRecord {
    /// TPC sector.
    pub sector: u8,
    /// Global pad row.
    pub row: u16,
    /// Pad within the row.
    pub pad: u16,
    /// Pulses behind the fit.
    pub n_pulses: u32,
    /// Stage zeros.
    pub zeros: [f64; 3],
    /// Stage poles.
    pub poles: [f64; 3],
}

/// Moves the largest-T amplitude/time pair to stage one.
///
/// Explicit three-way comparison: the two remaining pairs keep their fitted
/// order, because the pairing of amplitudes to time constants is fixed by
/// the fit and only the stage order is re-derived.
fn order_stages(params: &[f64; N_PARAMS]) -> [(f64, f64); 3] {
    let pairs = [
        (params[0], params[3]),
        (params[1], params[4]),
        (params[2], params[5]),
    ];
    if pairs[1].1 > pairs[0].1 && pairs[1].1 >= pairs[2].1 {
        [pairs[1], pairs[0], pairs[2]]
    } else if pairs[2].1 > pairs[0].1 && pairs[2].1 > pairs[1].1 {
        [pairs[2], pairs[0], pairs[1]]
    } else {
        pairs
    }
}

/// Runs one filter stage as a difference equation over `input`.
///
/// `s_out[n] = s_in[n] + pole * s_out[n-1] - zero * s_in[n-1]`
pub fn apply_stage(input: &[f64], pole: f64, zero: f64) -> Vec<f64> {
    let mut output = Vec::with_capacity(input.len());
    let mut prev_in = 0.0;
    let mut prev_out = 0.0;
    for &x in input {
        let y = x + pole * prev_out - zero * prev_in;
        output.push(y);
        prev_in = x;
        prev_out = y;
    }
    output
}

/// Derives the three pole/zero pairs from a converged fit and the mean
/// pulse the fit was run on.
pub fn derive_coefficients(fit: &FitResult, mean_pulse: &[f64]) -> Result<TcfCoefficients> {
    let stages = order_stages(&fit.params);
    let (a1, t1) = stages[0];
    let (a2, t2) = stages[1];
    let (a3, t3) = stages[2];

    // Partial-fraction numerator of A1/(1+sT1) + A2/(1+sT2) + A3/(1+sT3),
    // reduced to the monic quadratic s^2 + beq*s + ceq.
    let a_sum = a1 + a2 + a3;
    let denom = t1 * t2 * t3 * a_sum;
    if denom.abs() < 1e-300 {
        return Err(Error::NonPhysicalFit(
            "vanishing time constants or amplitudes".into(),
        ));
    }
    let beq = (a1 * t1 * (t2 + t3) + a2 * t2 * (t1 + t3) + a3 * t3 * (t1 + t2)) / denom;
    let ceq = (a1 * t1 + a2 * t2 + a3 * t3) / denom;

    let discriminant = beq * beq - 4.0 * ceq;
    if discriminant < 0.0 {
        return Err(Error::NonPhysicalFit(format!(
            "complex numerator roots (disc {discriminant:.3e})"
        )));
    }
    let s1 = (-beq + discriminant.sqrt()) / 2.0;
    let s2 = (-beq - discriminant.sqrt()) / 2.0;
    if s1 >= 0.0 || s2 >= 0.0 {
        return Err(Error::NonPhysicalFit(format!(
            "non-negative numerator root (s1 {s1:.3e}, s2 {s2:.3e})"
        )));
    }

    // Empirical assignment rule; keeps Ta on the slow stage and avoids
    // filters with significant undershoot.
    let (ta, tb) = if t2 < t3 {
        (-1.0 / s1, -1.0 / s2)
    } else {
        (-1.0 / s2, -1.0 / s1)
    };

    let zeros = [(-1.0 / t1).exp(), (-1.0 / t2).exp(), 0.0];
    let poles = [(-1.0 / ta).exp(), (-1.0 / tb).exp(), 0.0];
    for stage in 0..2 {
        if !(0.0..1.0).contains(&zeros[stage]) || !(0.0..1.0).contains(&poles[stage]) {
            return Err(Error::NonPhysicalFit(format!(
                "stage {stage} coefficients outside (0,1): zero {}, pole {}",
                zeros[stage], poles[stage]
            )));
        }
    }

    let mut coefficients = TcfCoefficients { zeros, poles };
    equalize_height(&mut coefficients, mean_pulse)?;
    Ok(coefficients)
}

/// Computes the third-stage coefficient so the twice-filtered pulse height
/// matches the original. Exactly one of `(pole3, zero3)` ends up nonzero.
fn equalize_height(coefficients: &mut TcfCoefficients, pulse: &[f64]) -> Result<()> {
    let stage1 = apply_stage(pulse, coefficients.poles[0], coefficients.zeros[0]);
    let stage2 = apply_stage(&stage1, coefficients.poles[1], coefficients.zeros[1]);

    let peak_bin = pulse
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    if peak_bin == 0 {
        return Err(Error::NonPhysicalFit(
            "pulse peaks in its first bin, no pre-peak sample for equalization".into(),
        ));
    }
    let peak0 = pulse[peak_bin];
    let peak2 = stage2.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let reference = pulse[peak_bin - 1];
    if reference.abs() < 1e-300 {
        return Err(Error::NonPhysicalFit(
            "vanishing pre-peak sample, equalization undefined".into(),
        ));
    }

    if peak2 < peak0 {
        coefficients.poles[2] = (peak0 - peak2) / reference;
        coefficients.zeros[2] = 0.0;
    } else if peak2 > peak0 {
        coefficients.zeros[2] = (peak2 - peak0) / reference;
        coefficients.poles[2] = 0.0;
    } else {
        coefficients.poles[2] = 0.0;
        coefficients.zeros[2] = 0.0;
    }
    Ok(())
}

/// Fits one histogram and derives its filter record.
pub fn calibrate_pad(histogram: &PulseHistogram) -> Result<TcfRecord> {
    let mean_pulse = histogram.mean_pulse()?;
    let fit = fit_pulse(&mean_pulse)?;
    let coefficients = derive_coefficients(&fit, &mean_pulse)?;
    Ok(TcfRecord {
        sector: histogram.sector,
        row: histogram.row,
        pad: histogram.pad,
        n_pulses: histogram.n_pulses,
        zeros: coefficients.zeros,
        poles: coefficients.poles,
    })
}

/// Calibrates a batch of histograms in parallel.
///
/// Per-pad failures are logged and skipped; the batch never aborts.
pub fn calibrate_batch(histograms: &[PulseHistogram]) -> Vec<TcfRecord> {
    histograms
        .par_iter()
        .filter_map(|histogram| match calibrate_pad(histogram) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(
                    "sector {} row {} pad {}: {err}",
                    histogram.sector, histogram.row, histogram.pad
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaper::sample_model;

    #[test]
    fn test_stage_ordering_moves_largest_forward_only() {
        // Fitted order (150,1), (6,8), (1,120): the 120 pair moves to the
        // front, the other two keep their fitted order.
        let params = [150.0, 6.0, 1.0, 1.0, 8.0, 120.0, 0.0];
        let ordered = order_stages(&params);
        assert_eq!(ordered[0], (1.0, 120.0));
        assert_eq!(ordered[1], (150.0, 1.0));
        assert_eq!(ordered[2], (6.0, 8.0));
    }

    #[test]
    fn test_stage_ordering_already_sorted() {
        let params = [1.0, 150.0, 6.0, 120.0, 1.0, 8.0, 0.0];
        let ordered = order_stages(&params);
        assert_eq!(ordered[0], (1.0, 120.0));
        assert_eq!(ordered[1], (150.0, 1.0));
        assert_eq!(ordered[2], (6.0, 8.0));
    }

    #[test]
    fn test_tie_break_swaps_when_t2_not_less_than_t3() {
        // Construct two fits with the middle stages exchanged: the root
        // assignment must swap with them.
        let pulse = sample_model(&[150.0, 6.0, 1.0, 1.0, 8.0, 120.0, 0.0], 446);
        let fit_a = FitResult {
            params: [1.0, 150.0, 6.0, 120.0, 1.0, 8.0, 0.0], // T2=1 < T3=8
            chi2: 0.0,
            iterations: 1,
        };
        let fit_b = FitResult {
            params: [1.0, 6.0, 150.0, 120.0, 8.0, 1.0, 0.0], // T2=8 > T3=1
            chi2: 0.0,
            iterations: 1,
        };
        let ca = derive_coefficients(&fit_a, &pulse).unwrap();
        let cb = derive_coefficients(&fit_b, &pulse).unwrap();
        // Same exponential mixture, so the same two roots come out, but the
        // tie-break assigns them to opposite stages.
        assert!((ca.poles[0] - cb.poles[1]).abs() < 1e-9);
        assert!((ca.poles[1] - cb.poles[0]).abs() < 1e-9);
    }

    #[test]
    fn test_first_two_stages_in_unit_interval() {
        let truth = [150.0, 6.0, 1.0, 1.0, 8.0, 120.0, 0.0];
        let pulse = sample_model(&truth, 446);
        let fit = FitResult {
            params: truth,
            chi2: 0.0,
            iterations: 1,
        };
        let coefficients = derive_coefficients(&fit, &pulse).unwrap();
        for stage in 0..2 {
            assert!(coefficients.zeros[stage] > 0.0 && coefficients.zeros[stage] < 1.0);
            assert!(coefficients.poles[stage] > 0.0 && coefficients.poles[stage] < 1.0);
        }
    }

    #[test]
    fn test_third_stage_exactly_one_nonzero() {
        let truth = [150.0, 6.0, 1.0, 1.0, 8.0, 120.0, 0.0];
        let pulse = sample_model(&truth, 446);
        let fit = FitResult {
            params: truth,
            chi2: 0.0,
            iterations: 1,
        };
        let c = derive_coefficients(&fit, &pulse).unwrap();
        let third_nonzero =
            usize::from(c.zeros[2] != 0.0) + usize::from(c.poles[2] != 0.0);
        assert!(third_nonzero <= 1, "at most one of zero3/pole3 nonzero");
    }

    #[test]
    fn test_identity_passthrough_stage() {
        let pulse = vec![0.0, 1.0, 4.0, 2.0, 0.5];
        assert_eq!(apply_stage(&pulse, 0.0, 0.0), pulse);
    }
}
