// ─────────────────────────────────────────────────────────────────────
// Ptycho Core — Data Fidelity
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Negative log-likelihood of measured intensities given a farplane.
//!
//! Poisson:  Σ |F|² − d·ln(|F|² + ε),   gradient F·(1 − d/(|F|² + ε))
//! Gaussian: Σ (|F| − √d)²,             gradient F − √d·exp(i·arg F)

use ndarray::{Array3, Zip};
use num_complex::Complex64;
use ptycho_types::config::NoiseModel;
use ptycho_types::constants::POISSON_EPSILON;
use ptycho_types::error::{PtychoError, PtychoResult};

/// Cost of a farplane against measured intensities and its gradient with
/// respect to conj(farplane). Shapes must agree; see [`check_fidelity_inputs`].
pub trait DataFidelity {
    fn cost(&self, data: &Array3<f64>, farplane: &Array3<Complex64>) -> f64;

    fn gradient(&self, data: &Array3<f64>, farplane: &Array3<Complex64>) -> Array3<Complex64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonFidelity;

#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianFidelity;

impl DataFidelity for PoissonFidelity {
    fn cost(&self, data: &Array3<f64>, farplane: &Array3<Complex64>) -> f64 {
        Zip::from(data).and(farplane).fold(0.0, |acc, &d, f| {
            let sim = f.norm_sqr();
            acc + sim - d * (sim + POISSON_EPSILON).ln()
        })
    }

    fn gradient(&self, data: &Array3<f64>, farplane: &Array3<Complex64>) -> Array3<Complex64> {
        Zip::from(data)
            .and(farplane)
            .map_collect(|&d, &f| f * (1.0 - d / (f.norm_sqr() + POISSON_EPSILON)))
    }
}

impl DataFidelity for GaussianFidelity {
    fn cost(&self, data: &Array3<f64>, farplane: &Array3<Complex64>) -> f64 {
        Zip::from(data).and(farplane).fold(0.0, |acc, &d, f| {
            let r = f.norm() - d.sqrt();
            acc + r * r
        })
    }

    fn gradient(&self, data: &Array3<f64>, farplane: &Array3<Complex64>) -> Array3<Complex64> {
        Zip::from(data)
            .and(farplane)
            .map_collect(|&d, &f| f - Complex64::from_polar(d.sqrt(), f.arg()))
    }
}

impl DataFidelity for NoiseModel {
    fn cost(&self, data: &Array3<f64>, farplane: &Array3<Complex64>) -> f64 {
        match self {
            NoiseModel::Poisson => PoissonFidelity.cost(data, farplane),
            NoiseModel::Gaussian => GaussianFidelity.cost(data, farplane),
        }
    }

    fn gradient(&self, data: &Array3<f64>, farplane: &Array3<Complex64>) -> Array3<Complex64> {
        match self {
            NoiseModel::Poisson => PoissonFidelity.gradient(data, farplane),
            NoiseModel::Gaussian => GaussianFidelity.gradient(data, farplane),
        }
    }
}

/// Check that measured data is finite and non-negative.
pub fn check_measured_data(data: &Array3<f64>) -> PtychoResult<()> {
    if let Some(bad) = data.iter().find(|d| !d.is_finite() || **d < 0.0) {
        return Err(PtychoError::ConfigError(format!(
            "measured intensities must be finite and >= 0, found {bad}"
        )));
    }
    Ok(())
}

/// Check that data and farplane shapes agree and the data is valid.
pub fn check_fidelity_inputs(data: &Array3<f64>, farplane: &Array3<Complex64>) -> PtychoResult<()> {
    if data.dim() != farplane.dim() {
        let fmt = |(a, b, c): (usize, usize, usize)| format!("{a}x{b}x{c}");
        return Err(PtychoError::ShapeMismatch {
            what: "farplane",
            expected: fmt(data.dim()),
            found: fmt(farplane.dim()),
        });
    }
    check_measured_data(data)
}

/// Validated cost for a model name, as accepted from configuration.
pub fn fidelity_cost(
    model: &str,
    data: &Array3<f64>,
    farplane: &Array3<Complex64>,
) -> PtychoResult<f64> {
    let model: NoiseModel = model.parse()?;
    check_fidelity_inputs(data, farplane)?;
    Ok(model.cost(data, farplane))
}

/// Validated gradient for a model name, as accepted from configuration.
pub fn fidelity_gradient(
    model: &str,
    data: &Array3<f64>,
    farplane: &Array3<Complex64>,
) -> PtychoResult<Array3<Complex64>> {
    let model: NoiseModel = model.parse()?;
    check_fidelity_inputs(data, farplane)?;
    Ok(model.gradient(data, farplane))
}
