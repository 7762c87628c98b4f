//! Scan position generation and validation.

use ptycho_types::error::{PtychoError, PtychoResult};
use ptycho_types::state::ScanPosition;

/// Fail on the first position whose probe patch leaves the object.
pub fn check_allowed_positions(
    scan: &[ScanPosition],
    object: (usize, usize),
    probe: (usize, usize),
) -> PtychoResult<()> {
    match scan.iter().position(|p| !p.fits(object, probe)) {
        Some(index) => Err(PtychoError::PositionOutOfBounds {
            index,
            row: scan[index].row,
            col: scan[index].col,
        }),
        None => Ok(()),
    }
}

/// Row-major raster of `steps × steps` positions.
///
/// Offsets along each axis are `floor(i * (object - probe) / steps)` for
/// `i in 0..steps`, i.e. an endpoint-exclusive linspace from 0 to
/// `object - probe`.
pub fn raster_scan(
    object: (usize, usize),
    probe: (usize, usize),
    steps: usize,
) -> PtychoResult<Vec<ScanPosition>> {
    if steps == 0 {
        return Err(PtychoError::ConfigError(
            "raster scan needs at least one step per axis".to_string(),
        ));
    }
    if probe.0 > object.0 || probe.1 > object.1 {
        return Err(PtychoError::shape_2d("probe (must fit inside object)", object, probe));
    }

    let axis = |span: usize| -> Vec<usize> {
        (0..steps)
            .map(|i| (i as f64 * span as f64 / steps as f64).floor() as usize)
            .collect()
    };
    let rows = axis(object.0 - probe.0);
    let cols = axis(object.1 - probe.1);

    let scan = rows
        .iter()
        .flat_map(|&row| cols.iter().map(move |&col| ScanPosition::new(row, col)))
        .collect();
    Ok(scan)
}
