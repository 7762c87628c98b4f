//! Illumination generators.

use ndarray::Array2;
use num_complex::Complex64;
use ptycho_types::error::{PtychoError, PtychoResult};

/// Soft-edged disk weights in [0, 1] on a `size × size` grid.
///
/// Pixel centers at distance `r` from the frame center get weight 1 for
/// `r <= r_min`, 0 for `r >= r_max` and a linear ramp in between, with
/// `r_min = √2/2·rin·max(r)` and `r_max = √2/2·rout·max(r) + 1`.
pub fn gaussian_probe_weights(size: usize, rin: f64, rout: f64) -> PtychoResult<Array2<f64>> {
    if size == 0 {
        return Err(PtychoError::ConfigError("probe size must be >= 1".to_string()));
    }
    if !(rin.is_finite() && rout.is_finite()) || rin < 0.0 || rin > rout {
        return Err(PtychoError::ConfigError(format!(
            "probe radii must satisfy 0 <= rin <= rout, got rin={rin}, rout={rout}"
        )));
    }

    let center = size as f64 / 2.0;
    let radius = |i: usize, j: usize| {
        let r = i as f64 + 0.5 - center;
        let c = j as f64 + 0.5 - center;
        (r * r + c * c).sqrt()
    };
    // Corner pixels are the farthest from the center
    let r_far = radius(0, 0);
    let r_max = std::f64::consts::FRAC_1_SQRT_2 * rout * r_far + 1.0;
    let r_min = std::f64::consts::FRAC_1_SQRT_2 * rin * r_far;

    Ok(Array2::from_shape_fn((size, size), |(i, j)| {
        let r = radius(i, j);
        if r <= r_min {
            1.0
        } else if r >= r_max {
            0.0
        } else {
            (r_max - r) / (r_max - r_min)
        }
    }))
}

/// Complex probe `w·exp(i·phase_scale·w)` from real weights.
pub fn phase_modulated_probe(weights: &Array2<f64>, phase_scale: f64) -> Array2<Complex64> {
    weights.mapv(|w| Complex64::from_polar(w, phase_scale * w))
}
