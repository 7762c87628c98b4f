// ─────────────────────────────────────────────────────────────────────
// Ptycho Core — Nonlinear Conjugate Gradient
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Dai-Yuan nonlinear conjugate gradient over complex arrays.
//!
//! Each step computes the gradient `g`, mixes it with the previous
//! search direction
//!
//! ```text
//! d = -g + d_prev * ‖g‖² / (Re⟨d_prev, g - g_prev⟩ + ε)
//! ```
//!
//! and backtracks along `d` until the cost stops increasing. The first
//! step of a fresh solve, and the step after a skipped one, use steepest
//! descent. A step whose line search finds nothing is skipped: the
//! estimate stays put and the skip is counted in [`CgReport`].

use log::{debug, warn};
use ndarray::{Array, Dimension};
use num_complex::Complex64;
use ptycho_types::config::LineSearchConfig;
use ptycho_types::constants::CONJUGACY_EPSILON;

use crate::backend::ArrayBackend;
use crate::line_search::backtracking;
use crate::objective::Objective;

/// Diagnostics of a conjugate-gradient run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CgReport {
    /// Steps attempted.
    pub iterations: usize,
    /// Steps whose line search found no acceptable step length.
    pub skipped_steps: usize,
    /// Cost before the first step followed by the cost after every step.
    /// Empty when no step was requested.
    pub cost_history: Vec<f64>,
    /// Accepted step lengths, one per non-skipped step.
    pub step_sizes: Vec<f64>,
    /// Cost evaluations, including those spent in line searches.
    pub cost_evals: usize,
}

impl CgReport {
    pub fn final_cost(&self) -> Option<f64> {
        self.cost_history.last().copied()
    }
}

/// Conjugate-gradient state: the previous gradient and search direction.
pub struct ConjugateGradient<'a, B, D: Dimension> {
    backend: &'a B,
    params: LineSearchConfig,
    previous: Option<(Array<Complex64, D>, Array<Complex64, D>)>,
}

impl<'a, B: ArrayBackend, D: Dimension> ConjugateGradient<'a, B, D> {
    pub fn new(backend: &'a B, params: LineSearchConfig) -> Self {
        ConjugateGradient {
            backend,
            params,
            previous: None,
        }
    }

    /// Forget the retained direction; the next step is steepest descent.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn has_direction(&self) -> bool {
        self.previous.is_some()
    }

    /// Run `num_iter` steps from `x` and return the final estimate.
    pub fn run<O: Objective<D>>(
        &mut self,
        mut x: Array<Complex64, D>,
        objective: &mut O,
        num_iter: usize,
    ) -> (Array<Complex64, D>, CgReport) {
        let mut report = CgReport::default();
        if num_iter == 0 {
            return (x, report);
        }

        let mut cost = objective.cost(&x);
        report.cost_evals += 1;
        report.cost_history.push(cost);

        for i in 0..num_iter {
            report.iterations += 1;
            let grad = objective.gradient(&x);
            let direction = self.search_direction(&grad);

            match backtracking(objective, &x, &direction, cost, &self.params) {
                Some(accepted) => {
                    report.cost_evals += accepted.evals;
                    report.step_sizes.push(accepted.step);
                    debug!(
                        "cg step {i}: cost {cost:.6e} -> {:.6e}, step {:.3e}",
                        accepted.cost, accepted.step
                    );
                    x = accepted.point;
                    cost = accepted.cost;
                    self.previous = Some((grad, direction));
                }
                None => {
                    report.cost_evals += self.params.max_backtracks;
                    report.skipped_steps += 1;
                    warn!(
                        "cg step {i}: no decreasing step within {} backtracks, step skipped",
                        self.params.max_backtracks
                    );
                    self.previous = None;
                }
            }
            report.cost_history.push(cost);
        }

        (x, report)
    }

    fn search_direction(&mut self, grad: &Array<Complex64, D>) -> Array<Complex64, D> {
        let steepest = grad.mapv(|g| -g);
        let Some((grad_prev, dir_prev)) = self.previous.take() else {
            return steepest;
        };

        let grad_diff = grad - &grad_prev;
        let denom = self.backend.inner(dir_prev.view(), grad_diff.view()).re + CONJUGACY_EPSILON;
        let beta = self.backend.norm_sqr(grad.view()) / denom;
        if !beta.is_finite() || denom <= 0.0 {
            return steepest;
        }

        let mut direction = steepest;
        direction.scaled_add(Complex64::new(beta, 0.0), &dir_prev);

        // Restart when mixing produced a non-descent direction
        if self.backend.inner(grad.view(), direction.view()).re >= 0.0 {
            return grad.mapv(|g| -g);
        }
        direction
    }
}

/// Run `num_iter` conjugate-gradient steps from a fresh state.
pub fn conjugate_gradient<B, D, O>(
    backend: &B,
    x: Array<Complex64, D>,
    objective: &mut O,
    num_iter: usize,
    params: &LineSearchConfig,
) -> (Array<Complex64, D>, CgReport)
where
    B: ArrayBackend,
    D: Dimension,
    O: Objective<D>,
{
    ConjugateGradient::new(backend, params.clone()).run(x, objective, num_iter)
}
