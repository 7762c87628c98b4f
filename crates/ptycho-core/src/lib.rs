//! Ptychographic forward model and reconstruction.
//!
//! propagation, fidelity: the physics and the likelihood
//! solver: conjugate-gradient object (and optional probe) updates
//! position, probe, simulate: scan geometry and synthetic data

pub mod fidelity;
pub mod position;
pub mod probe;
pub mod propagation;
pub mod simulate;
pub mod solver;

pub use fidelity::{DataFidelity, GaussianFidelity, PoissonFidelity};
pub use propagation::Propagator;
pub use solver::{build_solver, ConjugateGradientSolver, PtychoSolver, Reconstruction, SolveReport};
