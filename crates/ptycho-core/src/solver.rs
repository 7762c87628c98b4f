// ─────────────────────────────────────────────────────────────────────
// Ptycho Core — Reconstruction Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Conjugate-gradient ptychographic reconstruction.
//!
//! One call performs one outer update: `inner_iterations` conjugate-gradient
//! steps on
//!
//! ```text
//! cost(ψ) = fidelity(forward(ψ)) + ρ‖reg − ψ‖²
//! grad(ψ) = adjoint(fidelity'(forward(ψ))) / max|probe|² − ρ(reg − ψ)
//! ```
//!
//! The division by max|probe|² is an empirical step-size normalization, not
//! part of the exact gradient. The caller drives the outer loop.

use log::info;
use ndarray::{Array2, Array3, Ix2};
use num_complex::Complex64;
use ptycho_math::backend::ArrayBackend;
use ptycho_math::cgrad::{CgReport, ConjugateGradient};
use ptycho_math::objective::Objective;
use ptycho_types::config::{Algorithm, NoiseModel, SolverConfig};
use ptycho_types::error::{PtychoError, PtychoResult};
use ptycho_types::state::{ProblemShape, ScanPosition};

use crate::fidelity::{check_measured_data, DataFidelity};
use crate::position::check_allowed_positions;
use crate::propagation::Propagator;

/// Diagnostics of one reconstruction call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveReport {
    pub object: CgReport,
    /// Present only when the probe was co-optimized.
    pub probe: Option<CgReport>,
}

impl SolveReport {
    pub fn skipped_steps(&self) -> usize {
        self.object.skipped_steps + self.probe.as_ref().map_or(0, |p| p.skipped_steps)
    }
}

/// Result of one reconstruction call.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub psi: Array2<Complex64>,
    pub probe: Array2<Complex64>,
    pub report: SolveReport,
}

/// Common interface of registered reconstruction algorithms.
pub trait PtychoSolver {
    fn algorithm(&self) -> Algorithm;

    fn reconstruct(
        &self,
        data: &Array3<f64>,
        probe: &Array2<Complex64>,
        scan: &[ScanPosition],
        psi: &Array2<Complex64>,
        regularizer: Option<&Array2<Complex64>>,
    ) -> PtychoResult<Reconstruction>;
}

/// Build the solver registered for `config.algorithm`.
pub fn build_solver<'a, B: ArrayBackend + 'a>(
    backend: &'a B,
    config: SolverConfig,
) -> PtychoResult<Box<dyn PtychoSolver + 'a>> {
    match config.algorithm {
        Algorithm::ConjugateGradient => Ok(Box::new(ConjugateGradientSolver::new(backend, config)?)),
    }
}

pub struct ConjugateGradientSolver<'a, B> {
    backend: &'a B,
    config: SolverConfig,
}

impl<'a, B: ArrayBackend> ConjugateGradientSolver<'a, B> {
    pub fn new(backend: &'a B, config: SolverConfig) -> PtychoResult<Self> {
        config.validate()?;
        Ok(ConjugateGradientSolver { backend, config })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn validate_inputs(
        &self,
        data: &Array3<f64>,
        probe: &Array2<Complex64>,
        scan: &[ScanPosition],
        psi: &Array2<Complex64>,
        regularizer: Option<&Array2<Complex64>>,
    ) -> PtychoResult<ProblemShape> {
        let (n_frames, dh, dw) = data.dim();
        if scan.is_empty() {
            return Err(PtychoError::ConfigError(
                "at least one scan position is required".to_string(),
            ));
        }
        if n_frames != scan.len() {
            return Err(PtychoError::ShapeMismatch {
                what: "data frames",
                expected: scan.len().to_string(),
                found: n_frames.to_string(),
            });
        }
        let shape = ProblemShape {
            object: psi.dim(),
            probe: probe.dim(),
            detector: (dh, dw),
        };
        shape.validate()?;
        if let Some(reg) = regularizer {
            if reg.dim() != psi.dim() {
                return Err(PtychoError::shape_2d("regularizer", psi.dim(), reg.dim()));
            }
        }
        check_allowed_positions(scan, shape.object, shape.probe)?;
        check_measured_data(data)?;
        check_finite("probe", probe)?;
        check_finite("object estimate", psi)?;
        if let Some(reg) = regularizer {
            check_finite("regularizer", reg)?;
        }

        let probe_max = self.backend.max_abs(probe.view());
        if !probe_max.is_finite() || probe_max == 0.0 {
            return Err(PtychoError::ConfigError(format!(
                "probe must have a finite non-zero peak amplitude, got {probe_max}"
            )));
        }
        Ok(shape)
    }
}

impl<B: ArrayBackend> PtychoSolver for ConjugateGradientSolver<'_, B> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::ConjugateGradient
    }

    fn reconstruct(
        &self,
        data: &Array3<f64>,
        probe: &Array2<Complex64>,
        scan: &[ScanPosition],
        psi: &Array2<Complex64>,
        regularizer: Option<&Array2<Complex64>>,
    ) -> PtychoResult<Reconstruction> {
        let shape = self.validate_inputs(data, probe, scan, psi, regularizer)?;
        let config = &self.config;
        let propagator = Propagator::new(self.backend, shape)?;

        let mut object_objective = ObjectObjective {
            propagator: &propagator,
            model: config.model,
            data,
            scan,
            probe,
            penalty_weight: config.penalty_weight,
            regularizer,
            grad_scale: 1.0 / self.backend.max_abs(probe.view()).powi(2),
        };
        let (psi, object_report) = ConjugateGradient::new(self.backend, config.line_search.clone())
            .run(psi.clone(), &mut object_objective, config.inner_iterations);

        let (probe, probe_report) = if config.recover_probe && config.inner_iterations > 0 {
            let (probe, report) = self.update_probe(&propagator, data, scan, &psi, probe)?;
            (probe, Some(report))
        } else {
            (probe.clone(), None)
        };

        let report = SolveReport {
            object: object_report,
            probe: probe_report,
        };
        info!(
            "{} reconstruct on {}: model {}, {} inner iterations, cost {:?} -> {:?}, {} skipped steps",
            config.algorithm,
            self.backend.name(),
            config.model,
            config.inner_iterations,
            report.object.cost_history.first(),
            report.object.final_cost(),
            report.skipped_steps()
        );

        Ok(Reconstruction { psi, probe, report })
    }
}

impl<B: ArrayBackend> ConjugateGradientSolver<'_, B> {
    fn update_probe(
        &self,
        propagator: &Propagator<'_, B>,
        data: &Array3<f64>,
        scan: &[ScanPosition],
        psi: &Array2<Complex64>,
        probe: &Array2<Complex64>,
    ) -> PtychoResult<(Array2<Complex64>, CgReport)> {
        let psi_max = self.backend.max_abs(psi.view());
        if !psi_max.is_finite() || psi_max == 0.0 {
            return Err(PtychoError::Numerical(format!(
                "cannot normalize probe gradient, object peak amplitude is {psi_max}"
            )));
        }
        let mut objective = ProbeObjective {
            propagator,
            model: self.config.model,
            data,
            scan,
            psi,
            grad_scale: 1.0 / (psi_max * psi_max * scan.len() as f64),
        };
        Ok(
            ConjugateGradient::new(self.backend, self.config.line_search.clone()).run(
                probe.clone(),
                &mut objective,
                self.config.inner_iterations,
            ),
        )
    }
}

fn check_finite(what: &str, field: &Array2<Complex64>) -> PtychoResult<()> {
    match field.indexed_iter().find(|(_, v)| !(v.re.is_finite() && v.im.is_finite())) {
        Some(((i, j), v)) => Err(PtychoError::ConfigError(format!(
            "{what} must be finite, found {v} at ({i}, {j})"
        ))),
        None => Ok(()),
    }
}

/// Object-space cost and normalized gradient.
struct ObjectObjective<'p, 'a, B> {
    propagator: &'p Propagator<'a, B>,
    model: NoiseModel,
    data: &'p Array3<f64>,
    scan: &'p [ScanPosition],
    probe: &'p Array2<Complex64>,
    penalty_weight: f64,
    regularizer: Option<&'p Array2<Complex64>>,
    grad_scale: f64,
}

impl<B: ArrayBackend> ObjectObjective<'_, '_, B> {
    /// reg − ψ, with an absent regularizer read as zero.
    fn residual_to_regularizer(&self, x: &Array2<Complex64>) -> Array2<Complex64> {
        match self.regularizer {
            Some(reg) => reg - x,
            None => x.mapv(|v| -v),
        }
    }
}

impl<B: ArrayBackend> Objective<Ix2> for ObjectObjective<'_, '_, B> {
    fn cost(&mut self, x: &Array2<Complex64>) -> f64 {
        let farplane = self.propagator.forward_unchecked(x, self.scan, self.probe);
        let mut cost = self.model.cost(self.data, &farplane);
        if self.penalty_weight > 0.0 {
            let residual = self.residual_to_regularizer(x);
            cost += self.penalty_weight * self.propagator.backend().norm_sqr(residual.view());
        }
        cost
    }

    fn gradient(&mut self, x: &Array2<Complex64>) -> Array2<Complex64> {
        let farplane = self.propagator.forward_unchecked(x, self.scan, self.probe);
        let correction = self.model.gradient(self.data, &farplane);
        let mut grad = self
            .propagator
            .adjoint_unchecked(&correction, self.scan, self.probe);
        grad.mapv_inplace(|g| g * self.grad_scale);
        if self.penalty_weight > 0.0 {
            let residual = self.residual_to_regularizer(x);
            grad.scaled_add(Complex64::new(-self.penalty_weight, 0.0), &residual);
        }
        grad
    }
}

/// Probe-space cost and normalized gradient at a fixed object.
struct ProbeObjective<'p, 'a, B> {
    propagator: &'p Propagator<'a, B>,
    model: NoiseModel,
    data: &'p Array3<f64>,
    scan: &'p [ScanPosition],
    psi: &'p Array2<Complex64>,
    grad_scale: f64,
}

impl<B: ArrayBackend> Objective<Ix2> for ProbeObjective<'_, '_, B> {
    fn cost(&mut self, p: &Array2<Complex64>) -> f64 {
        let farplane = self.propagator.forward_unchecked(self.psi, self.scan, p);
        self.model.cost(self.data, &farplane)
    }

    fn gradient(&mut self, p: &Array2<Complex64>) -> Array2<Complex64> {
        let farplane = self.propagator.forward_unchecked(self.psi, self.scan, p);
        let correction = self.model.gradient(self.data, &farplane);
        let mut grad = self
            .propagator
            .adjoint_probe_unchecked(&correction, self.scan, self.psi);
        grad.mapv_inplace(|g| g * self.grad_scale);
        grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::simulate;
    use ptycho_math::backend::CpuBackend;
    use ptycho_types::config::LineSearchConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ones(shape: (usize, usize)) -> Array2<Complex64> {
        Array2::from_elem(shape, Complex64::new(1.0, 0.0))
    }

    fn small_problem() -> (Array3<f64>, Array2<Complex64>, Vec<ScanPosition>, Array2<Complex64>) {
        let truth = Array2::from_shape_fn((8, 8), |(i, j)| {
            Complex64::from_polar(1.0, 0.05 * i as f64 - 0.03 * j as f64)
        });
        let probe = ones((4, 4));
        let scan = vec![
            ScanPosition::new(0, 0),
            ScanPosition::new(0, 4),
            ScanPosition::new(4, 0),
            ScanPosition::new(4, 4),
            ScanPosition::new(2, 2),
        ];
        let data = simulate(&CpuBackend, (4, 4), &probe, &scan, &truth).unwrap();
        (data, probe, scan, truth)
    }

    fn solver(config: SolverConfig) -> ConjugateGradientSolver<'static, CpuBackend> {
        static BACKEND: CpuBackend = CpuBackend;
        ConjugateGradientSolver::new(&BACKEND, config).unwrap()
    }

    #[test]
    fn test_negative_penalty_rejected_at_construction() {
        let config = SolverConfig {
            penalty_weight: -1.0,
            ..SolverConfig::default()
        };
        assert!(matches!(
            ConjugateGradientSolver::new(&CpuBackend, config),
            Err(PtychoError::ConfigError(_))
        ));
    }

    #[test]
    fn test_zero_inner_iterations_is_identity() {
        let (data, probe, scan, _) = small_problem();
        let start = CpuBackend.random_phase((8, 8), 0.3, &mut StdRng::seed_from_u64(1));
        let s = solver(SolverConfig {
            inner_iterations: 0,
            recover_probe: true,
            ..SolverConfig::default()
        });
        let out = s.reconstruct(&data, &probe, &scan, &start, None).unwrap();
        assert_eq!(out.psi, start);
        assert_eq!(out.probe, probe);
        assert_eq!(out.report, SolveReport::default());
    }

    #[test]
    fn test_cost_decreases_for_both_models() {
        let (data, probe, scan, _) = small_problem();
        for model in [NoiseModel::Poisson, NoiseModel::Gaussian] {
            let start = ones((8, 8));
            let s = solver(SolverConfig {
                model,
                inner_iterations: 12,
                ..SolverConfig::default()
            });
            let out = s.reconstruct(&data, &probe, &scan, &start, None).unwrap();
            let history = &out.report.object.cost_history;
            assert_eq!(history.len(), 13);
            for pair in history.windows(2) {
                assert!(pair[1] <= pair[0], "{model}: cost rose {} -> {}", pair[0], pair[1]);
            }
            assert!(history[12] < history[0], "{model}: no progress");
        }
    }

    #[test]
    fn test_penalty_pulls_toward_regularizer() {
        // With no data signal the penalty alone drives psi to reg
        let probe = ones((2, 2));
        let scan = [ScanPosition::new(0, 0)];
        let psi = ones((4, 4));
        let data = simulate(&CpuBackend, (2, 2), &probe, &scan, &psi).unwrap();
        let reg = Array2::from_elem((4, 4), Complex64::new(0.0, 2.0));

        let s = solver(SolverConfig {
            model: NoiseModel::Gaussian,
            inner_iterations: 20,
            penalty_weight: 0.5,
            ..SolverConfig::default()
        });
        let out = s.reconstruct(&data, &probe, &scan, &psi, Some(&reg)).unwrap();
        // Pixels outside the probe only feel the penalty
        let before = (psi[[3, 3]] - reg[[3, 3]]).norm();
        let after = (out.psi[[3, 3]] - reg[[3, 3]]).norm();
        assert!(after < 0.1 * before, "{before} -> {after}");
    }

    #[test]
    fn test_input_validation() {
        let (data, probe, scan, truth) = small_problem();
        let s = solver(SolverConfig::default());

        let err = s.reconstruct(&data, &probe, &scan[..4], &truth, None).unwrap_err();
        assert!(matches!(err, PtychoError::ShapeMismatch { .. }), "{err:?}");

        let mut bad = scan.clone();
        bad[4] = ScanPosition::new(5, 5);
        let err = s.reconstruct(&data, &probe, &bad, &truth, None).unwrap_err();
        assert!(matches!(err, PtychoError::PositionOutOfBounds { index: 4, .. }), "{err:?}");

        let mut negative = data.clone();
        negative[[0, 0, 0]] = -1.0;
        let err = s.reconstruct(&negative, &probe, &scan, &truth, None).unwrap_err();
        assert!(matches!(err, PtychoError::ConfigError(_)), "{err:?}");

        let reg = ones((7, 8));
        let err = s.reconstruct(&data, &probe, &scan, &truth, Some(&reg)).unwrap_err();
        assert!(matches!(err, PtychoError::ShapeMismatch { .. }), "{err:?}");

        let dark = Array2::zeros((4, 4));
        let err = s.reconstruct(&data, &dark, &scan, &truth, None).unwrap_err();
        assert!(matches!(err, PtychoError::ConfigError(_)), "{err:?}");

        let err = s.reconstruct(&data, &probe, &[], &truth, None).unwrap_err();
        assert!(matches!(err, PtychoError::ConfigError(_)), "{err:?}");
    }

    #[test]
    fn test_non_finite_fields_rejected() {
        let (data, probe, scan, truth) = small_problem();
        let s = solver(SolverConfig::default());

        let mut nan_probe = probe.clone();
        nan_probe[[1, 2]] = Complex64::new(f64::NAN, 0.0);
        let err = s.reconstruct(&data, &nan_probe, &scan, &truth, None).unwrap_err();
        assert!(matches!(err, PtychoError::ConfigError(ref m) if m.contains("probe")), "{err:?}");

        let mut inf_psi = truth.clone();
        inf_psi[[7, 0]] = Complex64::new(0.0, f64::INFINITY);
        let err = s.reconstruct(&data, &probe, &scan, &inf_psi, None).unwrap_err();
        assert!(matches!(err, PtychoError::ConfigError(ref m) if m.contains("object")), "{err:?}");

        let reg = Array2::from_elem((8, 8), Complex64::new(f64::NAN, f64::NAN));
        let err = s.reconstruct(&data, &probe, &scan, &truth, Some(&reg)).unwrap_err();
        assert!(matches!(err, PtychoError::ConfigError(_)), "{err:?}");
    }

    #[test]
    fn test_failed_line_search_reported_to_caller() {
        let (data, probe, scan, _) = small_problem();
        let start = ones((8, 8));
        // A single oversized trial per step can never lower the cost
        let s = solver(SolverConfig {
            inner_iterations: 2,
            recover_probe: true,
            line_search: LineSearchConfig {
                initial_step: 1e6,
                shrink: 0.5,
                max_backtracks: 1,
            },
            ..SolverConfig::default()
        });
        let out = s.reconstruct(&data, &probe, &scan, &start, None).unwrap();

        assert_eq!(out.report.object.skipped_steps, 2);
        assert_eq!(out.report.probe.as_ref().map(|p| p.skipped_steps), Some(2));
        assert_eq!(out.report.skipped_steps(), 4);
        assert_eq!(out.psi, start);
        assert_eq!(out.probe, probe);
        let history = &out.report.object.cost_history;
        assert!(history.windows(2).all(|w| w[0] == w[1]), "{history:?}");
    }

    #[test]
    fn test_probe_unchanged_unless_recovered() {
        let (data, probe, scan, _) = small_problem();
        let s = solver(SolverConfig {
            inner_iterations: 3,
            ..SolverConfig::default()
        });
        let out = s.reconstruct(&data, &probe, &scan, &ones((8, 8)), None).unwrap();
        assert_eq!(out.probe, probe);
        assert!(out.report.probe.is_none());
    }

    #[test]
    fn test_probe_recovery_lowers_probe_cost() {
        let (data, probe, scan, truth) = small_problem();
        let dim_probe = probe.mapv(|p| p * 0.6);
        let s = solver(SolverConfig {
            inner_iterations: 5,
            recover_probe: true,
            ..SolverConfig::default()
        });
        let out = s.reconstruct(&data, &dim_probe, &scan, &truth, None).unwrap();
        let probe_report = out.report.probe.expect("probe report");
        let history = &probe_report.cost_history;
        assert_eq!(history.len(), 6);
        assert!(history[5] < history[0], "probe cost {history:?}");
        assert_ne!(out.probe, dim_probe);
    }

    #[test]
    fn test_build_solver_from_registry() {
        let s = build_solver(&CpuBackend, SolverConfig::default()).unwrap();
        assert_eq!(s.algorithm(), Algorithm::ConjugateGradient);
        let (data, probe, scan, truth) = small_problem();
        let out = s.reconstruct(&data, &probe, &scan, &truth, None).unwrap();
        assert_eq!(out.psi.dim(), (8, 8));
    }
}
