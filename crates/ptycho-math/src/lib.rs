//! Mathematical primitives for the ptychography core.

pub mod backend;
pub mod cgrad;
pub mod fft;
pub mod line_search;
pub mod objective;

pub use backend::{ArrayBackend, CpuBackend};
pub use cgrad::{conjugate_gradient, CgReport, ConjugateGradient};
pub use line_search::{backtracking, LineSearchResult};
pub use objective::{FnObjective, Objective};
