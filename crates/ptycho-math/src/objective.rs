use ndarray::{Array, Dimension};
use num_complex::Complex64;

/// Real-valued cost of a complex array and its descent gradient.
///
/// `gradient` returns any positive multiple of ∂f/∂conj(x); the optimizer
/// only relies on it pointing uphill. Methods take `&mut self` so
/// implementors can cache and count evaluations.
pub trait Objective<D: Dimension> {
    fn cost(&mut self, x: &Array<Complex64, D>) -> f64;

    fn gradient(&mut self, x: &Array<Complex64, D>) -> Array<Complex64, D>;
}

/// Adapter building an [`Objective`] from a cost closure and a gradient closure.
pub struct FnObjective<C, G> {
    cost: C,
    gradient: G,
}

impl<C, G> FnObjective<C, G> {
    pub fn new(cost: C, gradient: G) -> Self {
        FnObjective { cost, gradient }
    }
}

impl<D, C, G> Objective<D> for FnObjective<C, G>
where
    D: Dimension,
    C: FnMut(&Array<Complex64, D>) -> f64,
    G: FnMut(&Array<Complex64, D>) -> Array<Complex64, D>,
{
    fn cost(&mut self, x: &Array<Complex64, D>) -> f64 {
        (self.cost)(x)
    }

    fn gradient(&mut self, x: &Array<Complex64, D>) -> Array<Complex64, D> {
        (self.gradient)(x)
    }
}
