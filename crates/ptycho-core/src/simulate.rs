//! Synthetic diffraction data from a known object, probe and scan.

use ndarray::{Array2, Array3};
use num_complex::Complex64;
use ptycho_math::backend::ArrayBackend;
use ptycho_types::error::{PtychoError, PtychoResult};
use ptycho_types::state::{ProblemShape, ScanPosition};
use rand::Rng;
use rand_distr::{Distribution, Poisson};

use crate::propagation::Propagator;

/// Noiseless far-field intensities |forward(psi)|², shape (N, detector).
pub fn simulate<B: ArrayBackend>(
    backend: &B,
    detector: (usize, usize),
    probe: &Array2<Complex64>,
    scan: &[ScanPosition],
    psi: &Array2<Complex64>,
) -> PtychoResult<Array3<f64>> {
    let shape = ProblemShape {
        object: psi.dim(),
        probe: probe.dim(),
        detector,
    };
    let propagator = Propagator::new(backend, shape)?;
    let farplane = propagator.forward(psi, scan, probe)?;
    Ok(farplane.mapv(|f| f.norm_sqr()))
}

/// Replace each intensity with a Poisson draw of that mean.
///
/// Pixels with zero mean stay zero.
pub fn add_poisson_noise<R: Rng + ?Sized>(
    data: &Array3<f64>,
    rng: &mut R,
) -> PtychoResult<Array3<f64>> {
    let mut noisy = Array3::zeros(data.dim());
    for (out, &mean) in noisy.iter_mut().zip(data.iter()) {
        if mean == 0.0 {
            continue;
        }
        let dist = Poisson::new(mean).map_err(|e| {
            PtychoError::Numerical(format!("cannot draw Poisson counts with mean {mean}: {e}"))
        })?;
        *out = dist.sample(rng);
    }
    Ok(noisy)
}

/// Noisy intensities: [`simulate`] followed by [`add_poisson_noise`].
pub fn simulate_with_poisson_noise<B: ArrayBackend, R: Rng + ?Sized>(
    backend: &B,
    detector: (usize, usize),
    probe: &Array2<Complex64>,
    scan: &[ScanPosition],
    psi: &Array2<Complex64>,
    rng: &mut R,
) -> PtychoResult<Array3<f64>> {
    let clean = simulate(backend, detector, probe, scan, psi)?;
    add_poisson_noise(&clean, rng)
}
