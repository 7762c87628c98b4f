//! 2D FFT wrappers around rustfft, applied frame-by-frame to stacks.
//!
//! Convention matches `numpy.fft.fft2(..., norm="ortho")` on the last two
//! axes:
//! - Forward FFT (fft2): normalized by 1/sqrt(nrows*ncols)
//! - Inverse FFT (ifft2): normalized by 1/sqrt(nrows*ncols)
//!
//! With this scaling the inverse is also the exact adjoint of the forward
//! transform.

use std::cell::RefCell;
use std::sync::Arc;

use ndarray::{Array2, Array3, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};

thread_local! {
    // Plans are cached per length and direction for the life of the thread
    static PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

/// Cached plan for a transform of `len` points.
pub(crate) fn plan(len: usize, direction: FftDirection) -> Arc<dyn Fft<f64>> {
    PLANNER.with(|planner| planner.borrow_mut().plan_fft(len, direction))
}

/// Forward orthonormal 2D FFT of every frame of `frames` in place.
pub fn fft2_frames(frames: &mut Array3<Complex64>) {
    transform(frames, FftDirection::Forward);
}

/// Inverse orthonormal 2D FFT of every frame of `frames` in place.
pub fn ifft2_frames(frames: &mut Array3<Complex64>) {
    transform(frames, FftDirection::Inverse);
}

/// Forward orthonormal 2D FFT of a single field.
pub fn fft2(field: &Array2<Complex64>) -> Array2<Complex64> {
    single(field, FftDirection::Forward)
}

/// Inverse orthonormal 2D FFT of a single field.
pub fn ifft2(field: &Array2<Complex64>) -> Array2<Complex64> {
    single(field, FftDirection::Inverse)
}

fn single(field: &Array2<Complex64>, direction: FftDirection) -> Array2<Complex64> {
    let mut frames = field.clone().insert_axis(Axis(0));
    transform(&mut frames, direction);
    frames.index_axis_move(Axis(0), 0)
}

fn transform(frames: &mut Array3<Complex64>, direction: FftDirection) {
    let (_, nrows, ncols) = frames.dim();
    if nrows == 0 || ncols == 0 {
        return;
    }
    // FFT along each row (axis 2), then along each column (axis 1)
    let row_plan = plan(ncols, direction);
    apply_along(frames, Axis(2), row_plan.as_ref());
    let col_plan = plan(nrows, direction);
    apply_along(frames, Axis(1), col_plan.as_ref());

    let norm = 1.0 / ((nrows * ncols) as f64).sqrt();
    frames.mapv_inplace(|c| c * norm);
}

fn apply_along(frames: &mut Array3<Complex64>, axis: Axis, plan: &dyn Fft<f64>) {
    let len = frames.len_of(axis);
    let zero = Complex64::new(0.0, 0.0);
    let mut buffer = vec![zero; len];
    let mut scratch = vec![zero; plan.get_inplace_scratch_len()];

    for mut lane in frames.lanes_mut(axis) {
        if let Some(slice) = lane.as_slice_mut() {
            plan.process_with_scratch(slice, &mut scratch);
            continue;
        }
        // Strided lane: gather, transform, scatter
        for (b, v) in buffer.iter_mut().zip(lane.iter()) {
            *b = *v;
        }
        plan.process_with_scratch(&mut buffer, &mut scratch);
        for (v, b) in lane.iter_mut().zip(buffer.iter()) {
            *v = *b;
        }
    }
}
