//! The front-end shaper response and the three-exponential pulse model.
//!
//! The preamplifier/shaper chain responds to a charge deposit with a fixed
//! single-lobe shape of rise time `t_p`; the measured pulse is modelled as
//! the sum of three such lobes with different decay constants:
//!
//! `f(t) = Σ_{i=1..3} A_i · g(t - t0; T_i)`
//!
//! with, for `t >= 0`,
//!
//! `g(t; T) = [24·t_p·e⁴ / (4 - t_p/T)⁵] · [e^{-t/T} - e^{-4t/t_p} · Σ_{k=0..4} x^k/k!]`
//!
//! where `x = t·(4 - t_p/T)/t_p`, and `g(t < 0) = 0`.

/// Fixed shaper rise time in time bins. Not a free fit parameter.
pub const TTP: f64 = 2.24;

/// Number of free parameters of the pulse model:
/// `[A1, A2, A3, T1, T2, T3, t0]`.
pub const N_PARAMS: usize = 7;

/// The shaper response `g(t; T)` for one decay constant.
pub fn shaper_response(t: f64, tau: f64) -> f64 {
    if t < 0.0 {
        return 0.0;
    }
    let d = 4.0 - TTP / tau;
    let norm = 24.0 * TTP * 4.0f64.exp() / d.powi(5);
    let x = t * d / TTP;
    let poly = 1.0 + x + x * x / 2.0 + x * x * x / 6.0 + x * x * x * x / 24.0;
    norm * ((-t / tau).exp() - (-4.0 * t / TTP).exp() * poly)
}

/// The three-lobe pulse model at time bin `t`.
///
/// `params` is `[A1, A2, A3, T1, T2, T3, t0]`.
pub fn pulse_model(t: f64, params: &[f64; N_PARAMS]) -> f64 {
    let shifted = t - params[6];
    params[0] * shaper_response(shifted, params[3])
        + params[1] * shaper_response(shifted, params[4])
        + params[2] * shaper_response(shifted, params[5])
}

/// Samples the model over `length` consecutive time bins.
pub fn sample_model(params: &[f64; N_PARAMS], length: usize) -> Vec<f64> {
    (0..length).map(|t| pulse_model(t as f64, params)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_response_is_causal() {
        assert_eq!(shaper_response(-1.0, 5.0), 0.0);
        assert_eq!(shaper_response(-1e-9, 5.0), 0.0);
    }

    #[test]
    fn test_response_starts_at_zero() {
        // At t = 0 the polynomial factor equals one, so the bracket
        // cancels exactly.
        assert_relative_eq!(shaper_response(0.0, 5.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_response_single_lobe() {
        // Rises, peaks, decays back toward zero without a second lobe.
        let tau = 8.0;
        let values: Vec<f64> = (0..200).map(|t| shaper_response(t as f64, tau)).collect();
        let peak_bin = values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;
        assert!(peak_bin > 0 && peak_bin < 30);
        assert!(values[peak_bin] > 0.0);
        assert!(values[199] < values[peak_bin] * 0.05);
        for t in peak_bin..199 {
            assert!(values[t + 1] <= values[t] + 1e-9, "no second lobe at {t}");
        }
    }

    #[test]
    fn test_model_superposition() {
        let params = [150.0, 6.0, 1.0, 1.0, 8.0, 120.0, 0.0];
        let t = 12.5;
        let by_hand = 150.0 * shaper_response(t, 1.0)
            + 6.0 * shaper_response(t, 8.0)
            + shaper_response(t, 120.0);
        assert_relative_eq!(pulse_model(t, &params), by_hand, epsilon = 1e-12);
    }

    #[test]
    fn test_time_offset_shifts_model() {
        let base = [150.0, 6.0, 1.0, 1.0, 8.0, 120.0, 0.0];
        let shifted = [150.0, 6.0, 1.0, 1.0, 8.0, 120.0, 3.0];
        assert_relative_eq!(
            pulse_model(10.0, &base),
            pulse_model(13.0, &shifted),
            epsilon = 1e-12
        );
    }
}
