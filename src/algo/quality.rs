//! Cell quality statistics.
//!
//! Read-only scans over every live cell, evaluated in parallel with rayon.
//! [`bad_cells`] is what the sweep uses to pick its work list.

use rayon::prelude::*;

use crate::mesh::{CellId, MeshIndex, TetMesh};

use super::metric::QualityOracle;

/// Number of histogram bins over `[0, 1]`.
pub const HISTOGRAM_BINS: usize = 10;

/// Quality summary of a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport<I: MeshIndex = u32> {
    /// Number of live cells.
    pub num_cells: usize,
    /// Worst quality (`+inf` for an empty mesh).
    pub min: f64,
    /// Best quality (`-inf` for an empty mesh).
    pub max: f64,
    /// Mean quality (0 for an empty mesh).
    pub mean: f64,
    /// Cell counts per quality band of width `1 / HISTOGRAM_BINS`. Qualities
    /// outside `[0, 1]` land in the first or last bin.
    pub histogram: [usize; HISTOGRAM_BINS],
    /// The cell with the worst quality.
    pub worst_cell: Option<CellId<I>>,
}

fn bin(q: f64) -> usize {
    if q.is_nan() || q <= 0.0 {
        0
    } else {
        ((q * HISTOGRAM_BINS as f64) as usize).min(HISTOGRAM_BINS - 1)
    }
}

/// Quality of every live cell.
pub fn cell_qualities<I: MeshIndex>(mesh: &TetMesh<I>, metric: &dyn QualityOracle, parallel: bool) -> Vec<(CellId<I>, f64)> {
    let ids: Vec<CellId<I>> = mesh.cell_ids().collect();
    if parallel {
        ids.into_par_iter()
            .map(|c| (c, metric.quality(&mesh.cell_positions(c))))
            .collect()
    } else {
        ids.into_iter()
            .map(|c| (c, metric.quality(&mesh.cell_positions(c))))
            .collect()
    }
}

/// Compute the quality summary of a mesh.
pub fn quality_report<I: MeshIndex>(mesh: &TetMesh<I>, metric: &dyn QualityOracle) -> QualityReport<I> {
    let qualities = cell_qualities(mesh, metric, true);

    let mut report = QualityReport {
        num_cells: qualities.len(),
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        mean: 0.0,
        histogram: [0; HISTOGRAM_BINS],
        worst_cell: None,
    };
    let mut sum = 0.0;
    for &(c, q) in &qualities {
        if q < report.min {
            report.min = q;
            report.worst_cell = Some(c);
        }
        report.max = report.max.max(q);
        report.histogram[bin(q)] += 1;
        sum += q;
    }
    if !qualities.is_empty() {
        report.mean = sum / qualities.len() as f64;
    }
    report
}

/// Cells with quality below `threshold`, worst first.
///
/// With `boundary_only`, only cells carrying a boundary record are listed.
pub fn bad_cells<I: MeshIndex>(
    mesh: &TetMesh<I>,
    metric: &dyn QualityOracle,
    threshold: f64,
    boundary_only: bool,
) -> Vec<(CellId<I>, f64)> {
    let ids: Vec<CellId<I>> = if boundary_only {
        mesh.boundary_cell_ids().collect()
    } else {
        mesh.cell_ids().collect()
    };
    let mut bad: Vec<(CellId<I>, f64)> = ids
        .into_par_iter()
        .map(|c| (c, metric.quality(&mesh.cell_positions(c))))
        .filter(|&(_, q)| q < threshold)
        .collect();
    bad.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    bad
}
