//! Nonlinear least-squares fit of the three-exponential pulse model.
//!
//! A plain Levenberg-Marquardt loop over the seven model parameters:
//! numeric Jacobian, damped normal equations solved by Gaussian elimination
//! with partial pivoting, and hard parameter bounds enforced by clipping
//! every step. Bins past 100 carry a hundredfold larger uncertainty so the
//! fit is driven by the pulse region rather than the far tail.

use crate::error::{Error, Result};
use crate::shaper::{pulse_model, N_PARAMS};

/// Iteration budget of the minimizer.
pub const MAX_ITERATIONS: usize = 2000;

/// Time bin past which samples are down-weighted.
const TAIL_START: usize = 100;

/// Uncertainty scale factor for tail bins.
const TAIL_ERROR_FACTOR: f64 = 100.0;

/// Hard lower bounds: `[A1, A2, A3, T1, T2, T3, t0]`.
pub const LOWER_BOUNDS: [f64; N_PARAMS] = [100.0, 3.0, 0.1, 0.2, 3.0, 60.0, 0.0];

/// Hard upper bounds: `[A1, A2, A3, T1, T2, T3, t0]`.
pub const UPPER_BOUNDS: [f64; N_PARAMS] = [200.0, 20.0, 5.0, 3.0, 30.0, 300.0, 20.0];

/// Starting point of the minimization, inside the bounded box.
pub const INITIAL_GUESS: [f64; N_PARAMS] = [150.0, 10.0, 1.0, 1.0, 10.0, 100.0, 0.0];

/// Converged fit output.
#[derive(Debug, Clone, Copy)]
pub struct FitResult {
    /// Fitted parameters `[A1, A2, A3, T1, T2, T3, t0]`.
    pub params: [f64; N_PARAMS],
    /// Final weighted chi-square.
    pub chi2: f64,
    /// Iterations used.
    pub iterations: usize,
}

/// Per-bin uncertainty used in the weighted residuals.
#[inline]
fn bin_error(t: usize) -> f64 {
    if t > TAIL_START {
        TAIL_ERROR_FACTOR
    } else {
        1.0
    }
}

fn chi2(signal: &[f64], params: &[f64; N_PARAMS]) -> f64 {
    signal
        .iter()
        .enumerate()
        .map(|(t, &y)| {
            let r = (y - pulse_model(t as f64, params)) / bin_error(t);
            r * r
        })
        .sum()
}

fn clip(params: &mut [f64; N_PARAMS]) {
    for i in 0..N_PARAMS {
        params[i] = params[i].clamp(LOWER_BOUNDS[i], UPPER_BOUNDS[i]);
    }
}

/// Solves `m · x = rhs` by Gaussian elimination with partial pivoting.
/// Returns `None` for a singular system.
fn solve(mut m: [[f64; N_PARAMS]; N_PARAMS], mut rhs: [f64; N_PARAMS]) -> Option<[f64; N_PARAMS]> {
    for col in 0..N_PARAMS {
        let pivot_row = (col..N_PARAMS).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot_row][col].abs() < 1e-300 {
            return None;
        }
        m.swap(col, pivot_row);
        rhs.swap(col, pivot_row);
        for row in col + 1..N_PARAMS {
            let factor = m[row][col] / m[col][col];
            for k in col..N_PARAMS {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut x = [0.0; N_PARAMS];
    for row in (0..N_PARAMS).rev() {
        let mut acc = rhs[row];
        for k in row + 1..N_PARAMS {
            acc -= m[row][k] * x[k];
        }
        x[row] = acc / m[row][row];
    }
    Some(x)
}

/// Jacobian of the model by central differences, scaled by the bin errors.
fn jacobian(signal_len: usize, params: &[f64; N_PARAMS]) -> Vec<[f64; N_PARAMS]> {
    let mut jac = vec![[0.0; N_PARAMS]; signal_len];
    for k in 0..N_PARAMS {
        let h = 1e-6 * params[k].abs().max(1.0);
        let mut plus = *params;
        let mut minus = *params;
        plus[k] += h;
        minus[k] -= h;
        for (t, row) in jac.iter_mut().enumerate() {
            let d = (pulse_model(t as f64, &plus) - pulse_model(t as f64, &minus)) / (2.0 * h);
            row[k] = d / bin_error(t);
        }
    }
    jac
}

/// Fits the pulse model to a mean pulse.
///
/// Fails with [`Error::FitNotConverged`] when the iteration budget runs out
/// or the damping diverges; no parameters are reported in that case.
pub fn fit_pulse(signal: &[f64]) -> Result<FitResult> {
    fit_pulse_from(signal, INITIAL_GUESS)
}

/// Fits starting from an explicit (in-bounds) initial guess.
pub fn fit_pulse_from(signal: &[f64], start: [f64; N_PARAMS]) -> Result<FitResult> {
    if signal.len() <= N_PARAMS {
        return Err(Error::InvalidConfiguration(format!(
            "{} samples cannot constrain {} parameters",
            signal.len(),
            N_PARAMS
        )));
    }

    let mut params = start;
    clip(&mut params);
    let mut current_chi2 = chi2(signal, &params);
    let mut lambda = 1e-3;

    for iteration in 1..=MAX_ITERATIONS {
        let jac = jacobian(signal.len(), &params);

        // Normal equations: (JtJ + lambda*diag(JtJ)) delta = Jt r.
        let mut jtj = [[0.0; N_PARAMS]; N_PARAMS];
        let mut jtr = [0.0; N_PARAMS];
        for (t, row) in jac.iter().enumerate() {
            let r = (signal[t] - pulse_model(t as f64, &params)) / bin_error(t);
            for i in 0..N_PARAMS {
                jtr[i] += row[i] * r;
                for j in 0..N_PARAMS {
                    jtj[i][j] += row[i] * row[j];
                }
            }
        }

        let mut damped = jtj;
        for i in 0..N_PARAMS {
            damped[i][i] += lambda * jtj[i][i].max(1e-12);
        }

        let step = match solve(damped, jtr) {
            Some(step) => step,
            None => {
                lambda *= 10.0;
                if lambda > 1e12 {
                    return Err(Error::FitNotConverged {
                        iterations: iteration,
                        chi2: current_chi2,
                    });
                }
                continue;
            }
        };

        let mut candidate = params;
        for i in 0..N_PARAMS {
            candidate[i] += step[i];
        }
        clip(&mut candidate);
        let candidate_chi2 = chi2(signal, &candidate);

        if candidate_chi2 < current_chi2 {
            let improvement = (current_chi2 - candidate_chi2) / current_chi2.max(1e-300);
            params = candidate;
            current_chi2 = candidate_chi2;
            lambda = (lambda * 0.3).max(1e-12);
            if improvement < 1e-12 || current_chi2 < 1e-18 {
                return Ok(FitResult {
                    params,
                    chi2: current_chi2,
                    iterations: iteration,
                });
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                // The step direction is exhausted; accept only if the fit
                // already sits in a minimum.
                return Ok(FitResult {
                    params,
                    chi2: current_chi2,
                    iterations: iteration,
                });
            }
        }
    }

    Err(Error::FitNotConverged {
        iterations: MAX_ITERATIONS,
        chi2: current_chi2,
    })
}
