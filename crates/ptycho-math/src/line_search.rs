use ndarray::{Array, Dimension};
use num_complex::Complex64;
use ptycho_types::config::LineSearchConfig;

use crate::objective::Objective;

/// Result of a successful line search.
#[derive(Debug)]
pub struct LineSearchResult<D: Dimension> {
    /// The accepted step length.
    pub step: f64,
    /// `x + step * d`.
    pub point: Array<Complex64, D>,
    /// Objective value at `point`.
    pub cost: f64,
    /// Number of cost evaluations used.
    pub evals: usize,
}

/// Backtracking search for a step that does not increase the cost.
///
/// Starts at `params.initial_step` and multiplies by `params.shrink` after
/// every trial with `cost(x + step*d) > f_x` (or a non-finite cost).
///
/// Returns `None` after `params.max_backtracks` rejected trials.
pub fn backtracking<D, O>(
    obj: &mut O,
    x: &Array<Complex64, D>,
    d: &Array<Complex64, D>,
    f_x: f64,
    params: &LineSearchConfig,
) -> Option<LineSearchResult<D>>
where
    D: Dimension,
    O: Objective<D>,
{
    let mut step = params.initial_step;
    let mut trial = x.clone();

    for evals in 1..=params.max_backtracks {
        trial.assign(x);
        trial.scaled_add(Complex64::new(step, 0.0), d);
        let f_new = obj.cost(&trial);

        if f_new.is_finite() && f_new <= f_x {
            return Some(LineSearchResult {
                step,
                point: trial,
                cost: f_new,
                evals,
            });
        }
        step *= params.shrink;
    }
    None
}
