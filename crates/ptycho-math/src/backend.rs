// ─────────────────────────────────────────────────────────────────────
// Ptycho Core — Array Backend
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Array-operations capability the reconstruction is written against.
//!
//! The propagation operator, fidelity model and optimizer only touch the
//! far-field transform and reductions through [`ArrayBackend`]. A backend
//! is chosen by the caller and passed in at construction; there is no
//! process-wide selection.

use std::f64::consts::PI;

use ndarray::{Array2, Array3, ArrayView, Dimension, Zip};
use num_complex::Complex64;
use rand::Rng;

use crate::fft::{fft2_frames, ifft2_frames};

pub trait ArrayBackend {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Orthonormal forward 2D transform of every frame, in place.
    fn fft2(&self, frames: &mut Array3<Complex64>);

    /// Orthonormal inverse 2D transform of every frame, in place.
    /// Exact adjoint of [`ArrayBackend::fft2`].
    fn ifft2(&self, frames: &mut Array3<Complex64>);

    /// Σ conj(a)·b. Shapes must match.
    fn inner<D: Dimension>(
        &self,
        a: ArrayView<'_, Complex64, D>,
        b: ArrayView<'_, Complex64, D>,
    ) -> Complex64 {
        Zip::from(&a)
            .and(&b)
            .fold(Complex64::new(0.0, 0.0), |acc, x, y| acc + x.conj() * *y)
    }

    /// Σ |a|².
    fn norm_sqr<D: Dimension>(&self, a: ArrayView<'_, Complex64, D>) -> f64 {
        a.iter().map(|c| c.norm_sqr()).sum()
    }

    /// max |a|, zero for an empty array.
    fn max_abs<D: Dimension>(&self, a: ArrayView<'_, Complex64, D>) -> f64 {
        a.iter().fold(0.0_f64, |m, c| m.max(c.norm()))
    }

    /// Unit-modulus field with phase drawn uniformly from [-amplitude, amplitude].
    ///
    /// The amplitude is clamped to π; NaN and infinite amplitudes draw the
    /// full circle.
    fn random_phase<R: Rng + ?Sized>(
        &self,
        shape: (usize, usize),
        amplitude: f64,
        rng: &mut R,
    ) -> Array2<Complex64> {
        let a = if amplitude.is_nan() {
            PI
        } else {
            amplitude.abs().min(PI)
        };
        Array2::from_shape_fn(shape, |_| {
            let phase = if a > 0.0 { rng.gen_range(-a..=a) } else { 0.0 };
            Complex64::from_polar(1.0, phase)
        })
    }
}

/// Sequential CPU backend using rustfft.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl ArrayBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn fft2(&self, frames: &mut Array3<Complex64>) {
        fft2_frames(frames);
    }

    fn ifft2(&self, frames: &mut Array3<Complex64>) {
        ifft2_frames(frames);
    }
}
