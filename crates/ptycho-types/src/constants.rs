// ─────────────────────────────────────────────────────────────────────
// Ptycho Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Stabilizer added to simulated intensity inside the Poisson log and ratio.
pub const POISSON_EPSILON: f64 = 1e-32;

/// Guard added to the Dai-Yuan denominator.
pub const CONJUGACY_EPSILON: f64 = 1e-32;

/// Name under which the conjugate-gradient solver is registered.
pub const CGRAD_SOLVER_NAME: &str = "cgrad";

/// Default inner/outer ring fractions of the soft-edged probe.
pub const PROBE_RIN: f64 = 0.8;
pub const PROBE_ROUT: f64 = 1.0;
