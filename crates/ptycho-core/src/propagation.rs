// ─────────────────────────────────────────────────────────────────────
// Ptycho Core — Far-Field Propagation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Forward and adjoint ptychographic propagation.
//!
//! Forward: for every scan position the object patch under the probe is
//! multiplied by the probe, zero-padded (centered) into the detector
//! frame and transformed to the far field.
//!
//! Adjoint: every far-field frame is transformed back, the probe window is
//! cropped out of the detector frame, multiplied by conj(probe) and added
//! into object space. Overlapping patches accumulate.
//!
//! Patches that leave the object are rejected up front; there is no
//! implicit padding of the object.

use ndarray::{s, Array2, Array3, Zip};
use num_complex::Complex64;
use ptycho_math::backend::ArrayBackend;
use ptycho_types::error::{PtychoError, PtychoResult};
use ptycho_types::state::{ProblemShape, ScanPosition};

use crate::position::check_allowed_positions;

/// Propagation operator bound to one set of object/probe/detector extents.
pub struct Propagator<'a, B> {
    backend: &'a B,
    shape: ProblemShape,
}

impl<'a, B: ArrayBackend> Propagator<'a, B> {
    pub fn new(backend: &'a B, shape: ProblemShape) -> PtychoResult<Self> {
        shape.validate()?;
        Ok(Propagator { backend, shape })
    }

    pub fn shape(&self) -> ProblemShape {
        self.shape
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    /// Farplane stack, one frame per scan position in scan order.
    pub fn forward(
        &self,
        psi: &Array2<Complex64>,
        scan: &[ScanPosition],
        probe: &Array2<Complex64>,
    ) -> PtychoResult<Array3<Complex64>> {
        self.check_object(psi)?;
        self.check_probe(probe)?;
        check_allowed_positions(scan, self.shape.object, self.shape.probe)?;
        Ok(self.forward_unchecked(psi, scan, probe))
    }

    /// Object-space gradient from a farplane correction.
    pub fn adjoint(
        &self,
        farplane: &Array3<Complex64>,
        scan: &[ScanPosition],
        probe: &Array2<Complex64>,
    ) -> PtychoResult<Array2<Complex64>> {
        self.check_farplane(farplane, scan)?;
        self.check_probe(probe)?;
        check_allowed_positions(scan, self.shape.object, self.shape.probe)?;
        Ok(self.adjoint_unchecked(farplane, scan, probe))
    }

    /// Probe-space gradient from a farplane correction, summed over positions.
    pub fn adjoint_probe(
        &self,
        farplane: &Array3<Complex64>,
        scan: &[ScanPosition],
        psi: &Array2<Complex64>,
    ) -> PtychoResult<Array2<Complex64>> {
        self.check_farplane(farplane, scan)?;
        self.check_object(psi)?;
        check_allowed_positions(scan, self.shape.object, self.shape.probe)?;
        Ok(self.adjoint_probe_unchecked(farplane, scan, psi))
    }

    pub(crate) fn forward_unchecked(
        &self,
        psi: &Array2<Complex64>,
        scan: &[ScanPosition],
        probe: &Array2<Complex64>,
    ) -> Array3<Complex64> {
        let (ph, pw) = self.shape.probe;
        let (dh, dw) = self.shape.detector;
        let (r0, c0) = self.shape.pad_offset();

        let mut frames = Array3::zeros((scan.len(), dh, dw));
        for (k, pos) in scan.iter().enumerate() {
            let patch = psi.slice(s![pos.row..pos.row + ph, pos.col..pos.col + pw]);
            let mut window = frames.slice_mut(s![k, r0..r0 + ph, c0..c0 + pw]);
            Zip::from(&mut window)
                .and(&patch)
                .and(probe)
                .for_each(|w, &o, &p| *w = o * p);
        }
        self.backend.fft2(&mut frames);
        frames
    }

    pub(crate) fn adjoint_unchecked(
        &self,
        farplane: &Array3<Complex64>,
        scan: &[ScanPosition],
        probe: &Array2<Complex64>,
    ) -> Array2<Complex64> {
        let (ph, pw) = self.shape.probe;
        let waves = self.nearplane(farplane);
        let (r0, c0) = self.shape.pad_offset();

        let mut grad = Array2::zeros(self.shape.object);
        for (k, pos) in scan.iter().enumerate() {
            let window = waves.slice(s![k, r0..r0 + ph, c0..c0 + pw]);
            let mut target = grad.slice_mut(s![pos.row..pos.row + ph, pos.col..pos.col + pw]);
            Zip::from(&mut target)
                .and(&window)
                .and(probe)
                .for_each(|g, &w, &p| *g += w * p.conj());
        }
        grad
    }

    pub(crate) fn adjoint_probe_unchecked(
        &self,
        farplane: &Array3<Complex64>,
        scan: &[ScanPosition],
        psi: &Array2<Complex64>,
    ) -> Array2<Complex64> {
        let (ph, pw) = self.shape.probe;
        let waves = self.nearplane(farplane);
        let (r0, c0) = self.shape.pad_offset();

        let mut grad = Array2::zeros(self.shape.probe);
        for (k, pos) in scan.iter().enumerate() {
            let window = waves.slice(s![k, r0..r0 + ph, c0..c0 + pw]);
            let patch = psi.slice(s![pos.row..pos.row + ph, pos.col..pos.col + pw]);
            Zip::from(&mut grad)
                .and(&window)
                .and(&patch)
                .for_each(|g, &w, &o| *g += w * o.conj());
        }
        grad
    }

    fn nearplane(&self, farplane: &Array3<Complex64>) -> Array3<Complex64> {
        let mut waves = farplane.clone();
        self.backend.ifft2(&mut waves);
        waves
    }

    fn check_object(&self, psi: &Array2<Complex64>) -> PtychoResult<()> {
        if psi.dim() != self.shape.object {
            return Err(PtychoError::shape_2d("object", self.shape.object, psi.dim()));
        }
        Ok(())
    }

    fn check_probe(&self, probe: &Array2<Complex64>) -> PtychoResult<()> {
        if probe.dim() != self.shape.probe {
            return Err(PtychoError::shape_2d("probe", self.shape.probe, probe.dim()));
        }
        Ok(())
    }

    fn check_farplane(&self, farplane: &Array3<Complex64>, scan: &[ScanPosition]) -> PtychoResult<()> {
        let (n, dh, dw) = farplane.dim();
        if n != scan.len() || (dh, dw) != self.shape.detector {
            return Err(PtychoError::ShapeMismatch {
                what: "farplane",
                expected: format!(
                    "{}x{}x{}",
                    scan.len(),
                    self.shape.detector.0,
                    self.shape.detector.1
                ),
                found: format!("{n}x{dh}x{dw}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptycho_math::backend::CpuBackend;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_field(shape: (usize, usize), rng: &mut StdRng) -> Array2<Complex64> {
        Array2::from_shape_fn(shape, |_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
    }

    fn random_stack(shape: (usize, usize, usize), rng: &mut StdRng) -> Array3<Complex64> {
        Array3::from_shape_fn(shape, |_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
    }

    fn shape(object: usize, probe: usize, detector: usize) -> ProblemShape {
        ProblemShape {
            object: (object, object),
            probe: (probe, probe),
            detector: (detector, detector),
        }
    }

    #[test]
    fn test_forward_shape_and_order() {
        let backend = CpuBackend;
        let op = Propagator::new(&backend, shape(8, 4, 4)).unwrap();
        let mut psi = Array2::from_elem((8, 8), Complex64::new(1.0, 0.0));
        psi[[5, 5]] = Complex64::new(3.0, 0.0);
        let probe = Array2::from_elem((4, 4), Complex64::new(1.0, 0.0));
        let scan = [ScanPosition::new(0, 0), ScanPosition::new(4, 4)];

        let far = op.forward(&psi, &scan, &probe).unwrap();
        assert_eq!(far.dim(), (2, 4, 4));
        // Orthonormal DC = sum / 4
        assert!((far[[0, 0, 0]].re - 4.0).abs() < 1e-12);
        assert!((far[[1, 0, 0]].re - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_adjoint_inner_product_identity() {
        let mut rng = StdRng::seed_from_u64(42);
        let backend = CpuBackend;
        let op = Propagator::new(&backend, shape(12, 5, 9)).unwrap();
        let scan = [
            ScanPosition::new(0, 0),
            ScanPosition::new(2, 3),
            ScanPosition::new(7, 7),
            ScanPosition::new(3, 3),
        ];
        let probe = random_field((5, 5), &mut rng);
        let x = random_field((12, 12), &mut rng);
        let y = random_stack((4, 9, 9), &mut rng);

        let fx = op.forward(&x, &scan, &probe).unwrap();
        let ay = op.adjoint(&y, &scan, &probe).unwrap();
        let lhs = backend.inner(fx.view(), y.view());
        let rhs = backend.inner(x.view(), ay.view());
        assert!((lhs - rhs).norm() < 1e-10 * lhs.norm().max(1.0), "{lhs} vs {rhs}");
    }

    #[test]
    fn test_adjoint_probe_inner_product_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        let backend = CpuBackend;
        let op = Propagator::new(&backend, shape(10, 4, 6)).unwrap();
        let scan = [ScanPosition::new(1, 1), ScanPosition::new(2, 5), ScanPosition::new(6, 0)];
        let psi = random_field((10, 10), &mut rng);
        let p = random_field((4, 4), &mut rng);
        let y = random_stack((3, 6, 6), &mut rng);

        let fp = op.forward(&psi, &scan, &p).unwrap();
        let ay = op.adjoint_probe(&y, &scan, &psi).unwrap();
        let lhs = backend.inner(fp.view(), y.view());
        let rhs = backend.inner(p.view(), ay.view());
        assert!((lhs - rhs).norm() < 1e-10 * lhs.norm().max(1.0), "{lhs} vs {rhs}");
    }

    #[test]
    fn test_isolated_position_recovers_patch_times_probe_power() {
        let mut rng = StdRng::seed_from_u64(11);
        let backend = CpuBackend;
        let op = Propagator::new(&backend, shape(8, 4, 6)).unwrap();
        let scan = [ScanPosition::new(2, 3)];
        let psi = random_field((8, 8), &mut rng);
        let probe = random_field((4, 4), &mut rng);

        let far = op.forward(&psi, &scan, &probe).unwrap();
        let back = op.adjoint(&far, &scan, &probe).unwrap();
        for ((i, j), v) in back.indexed_iter() {
            let inside = (2..6).contains(&i) && (3..7).contains(&j);
            let expected = if inside {
                psi[[i, j]] * probe[[i - 2, j - 3]].norm_sqr()
            } else {
                Complex64::new(0.0, 0.0)
            };
            assert!((v - expected).norm() < 1e-10, "({i}, {j}): {v} vs {expected}");
        }
    }

    #[test]
    fn test_overlapping_positions_accumulate() {
        let backend = CpuBackend;
        let op = Propagator::new(&backend, shape(6, 4, 4)).unwrap();
        let probe = Array2::from_elem((4, 4), Complex64::new(1.0, 0.0));
        let psi = Array2::from_elem((6, 6), Complex64::new(1.0, 0.0));
        let scan = [ScanPosition::new(0, 0), ScanPosition::new(2, 2)];

        let far = op.forward(&psi, &scan, &probe).unwrap();
        let back = op.adjoint(&far, &scan, &probe).unwrap();
        // Overlap region [2..4, 2..4] is covered twice
        assert!((back[[3, 3]].re - 2.0).abs() < 1e-12);
        assert!((back[[0, 0]].re - 1.0).abs() < 1e-12);
        assert!(back[[0, 5]].norm() < 1e-12);
    }

    #[test]
    fn test_out_of_bounds_position_rejected() {
        let backend = CpuBackend;
        let op = Propagator::new(&backend, shape(8, 4, 4)).unwrap();
        let psi = Array2::zeros((8, 8));
        let probe = Array2::zeros((4, 4));
        let scan = [ScanPosition::new(0, 0), ScanPosition::new(5, 0)];
        match op.forward(&psi, &scan, &probe) {
            Err(PtychoError::PositionOutOfBounds { index, row, col }) => {
                assert_eq!((index, row, col), (1, 5, 0));
            }
            other => panic!("expected bounds error, got {other:?}"),
        }
    }

    #[test]
    fn test_shape_mismatches_rejected() {
        let backend = CpuBackend;
        assert!(Propagator::new(&backend, shape(4, 5, 5)).is_err());
        assert!(Propagator::new(&backend, shape(8, 4, 3)).is_err());

        let op = Propagator::new(&backend, shape(8, 4, 4)).unwrap();
        let scan = [ScanPosition::new(0, 0)];
        let probe = Array2::zeros((4, 4));
        assert!(matches!(
            op.forward(&Array2::zeros((7, 8)), &scan, &probe),
            Err(PtychoError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            op.adjoint(&Array3::zeros((2, 4, 4)), &scan, &probe),
            Err(PtychoError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            op.adjoint(&Array3::zeros((1, 4, 4)), &scan, &Array2::zeros((3, 4))),
            Err(PtychoError::ShapeMismatch { .. })
        ));
    }
}
