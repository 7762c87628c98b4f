// ─────────────────────────────────────────────────────────────────────
// Ptycho Core — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::error::{PtychoError, PtychoResult};

/// Top-left pixel offset of the probe on the object for one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanPosition {
    pub row: usize,
    pub col: usize,
}

impl ScanPosition {
    pub fn new(row: usize, col: usize) -> Self {
        ScanPosition { row, col }
    }

    /// True if a `probe`-sized patch starting here fits inside `object`.
    pub fn fits(&self, object: (usize, usize), probe: (usize, usize)) -> bool {
        self.row
            .checked_add(probe.0)
            .is_some_and(|end| end <= object.0)
            && self
                .col
                .checked_add(probe.1)
                .is_some_and(|end| end <= object.1)
    }
}

impl From<(usize, usize)> for ScanPosition {
    fn from((row, col): (usize, usize)) -> Self {
        ScanPosition { row, col }
    }
}

/// Extents shared by the object, probe and detector frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemShape {
    pub object: (usize, usize),
    pub probe: (usize, usize),
    pub detector: (usize, usize),
}

impl ProblemShape {
    /// Check probe <= object and probe <= detector, all non-empty.
    pub fn validate(&self) -> PtychoResult<()> {
        for (what, (h, w)) in [
            ("object", self.object),
            ("probe", self.probe),
            ("detector", self.detector),
        ] {
            if h == 0 || w == 0 {
                return Err(PtychoError::ConfigError(format!(
                    "{what} must be non-empty, got {h}x{w}"
                )));
            }
        }
        if self.probe.0 > self.object.0 || self.probe.1 > self.object.1 {
            return Err(PtychoError::shape_2d(
                "probe (must fit inside object)",
                self.object,
                self.probe,
            ));
        }
        if self.probe.0 > self.detector.0 || self.probe.1 > self.detector.1 {
            return Err(PtychoError::shape_2d(
                "detector (must be at least the probe size)",
                self.probe,
                self.detector,
            ));
        }
        Ok(())
    }

    /// Offset of the probe window inside the detector frame (centered).
    pub fn pad_offset(&self) -> (usize, usize) {
        (
            self.detector.0.saturating_sub(self.probe.0) / 2,
            self.detector.1.saturating_sub(self.probe.1) / 2,
        )
    }
}
