//! Reference sweep over the poorly shaped boundary cells.

use tracing::{debug, warn};

use crate::algo::metric::QualityOracle;
use crate::algo::quality::bad_cells;
use crate::algo::spatial::SpatialIndex;
use crate::algo::Progress;
use crate::error::{MeshError, Result};
use crate::mesh::{CellId, Epoch, MeshIndex, TetMesh, VertexId};

use super::{optimize_boundary_cell, BoundaryOutcome, Edit, OptimizeContext, OptimizeOptions};

/// Options for [`optimize_boundary`].
#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Boundary cells with quality below this are visited.
    pub quality_threshold: f64,

    /// Visit at most this many cells (worst first).
    pub max_cells: Option<usize>,

    /// Options forwarded to the per-cell driver.
    pub optimize: OptimizeOptions,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            quality_threshold: 0.5,
            max_cells: None,
            optimize: OptimizeOptions::default(),
        }
    }
}

impl SweepOptions {
    /// Set the quality threshold.
    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    /// Limit the number of visited cells.
    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = Some(max_cells);
        self
    }

    /// Set the per-cell driver options.
    pub fn with_optimize(mut self, optimize: OptimizeOptions) -> Self {
        self.optimize = optimize;
        self
    }

    /// Check that all numeric parameters are usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.quality_threshold > 0.0 && self.quality_threshold.is_finite()) {
            return Err(MeshError::invalid_param(
                "quality_threshold",
                self.quality_threshold,
                "must be positive and finite",
            ));
        }
        self.optimize.validate()
    }
}

/// What a sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Cells handed to the driver.
    pub visited: usize,
    /// Cells improved by relocation alone.
    pub relocated: usize,
    /// Collapses of a free vertex.
    pub collapsed: usize,
    /// Point deletions.
    pub deleted: usize,
    /// Internal edge swaps.
    pub internal_swaps: usize,
    /// Boundary edge swaps.
    pub boundary_swaps: usize,
}

impl SweepStats {
    /// Total number of improved cells.
    pub fn improved(&self) -> usize {
        self.relocated + self.collapsed + self.deleted + self.internal_swaps + self.boundary_swaps
    }

    fn record(&mut self, edit: Edit) {
        match edit {
            Edit::Relocated => self.relocated += 1,
            Edit::Collapsed => self.collapsed += 1,
            Edit::PointDeleted => self.deleted += 1,
            Edit::InternalSwap => self.internal_swaps += 1,
            Edit::BoundarySwap => self.boundary_swaps += 1,
        }
    }
}

/// Run the boundary-cell driver once on every boundary cell of poor quality.
///
/// Candidates are the cells with a boundary face whose quality is below
/// `quality_threshold`, visited worst first. Cells destroyed or moved off
/// the boundary by earlier edits are skipped, and so are cells created by
/// earlier edits in a slot freed during the sweep. All vertices processed during
/// the sweep are stamped with `epoch`, which should be fresh.
///
/// The sweep stops at the first error. The mesh is then inconsistent and
/// should be discarded in favor of a copy taken before the sweep.
pub fn optimize_boundary<I: MeshIndex>(
    mesh: &mut TetMesh<I>,
    metric: &dyn QualityOracle,
    index: &mut dyn SpatialIndex<I>,
    options: &SweepOptions,
    epoch: Epoch,
) -> Result<SweepStats> {
    optimize_boundary_internal(mesh, metric, index, options, epoch, None)
}

/// Run the boundary sweep with progress reporting.
///
/// See [`optimize_boundary`] for details.
pub fn optimize_boundary_with_progress<I: MeshIndex>(
    mesh: &mut TetMesh<I>,
    metric: &dyn QualityOracle,
    index: &mut dyn SpatialIndex<I>,
    options: &SweepOptions,
    epoch: Epoch,
    progress: &Progress,
) -> Result<SweepStats> {
    optimize_boundary_internal(mesh, metric, index, options, epoch, Some(progress))
}

/// Returns `true` if `cell` still holds the cell it was listed for.
fn still_listed<I: MeshIndex>(mesh: &TetMesh<I>, cell: CellId<I>, vertices: &[VertexId<I>; 4]) -> bool {
    mesh.try_cell(cell).map_or(false, |t| t.vertices == *vertices)
}

fn optimize_boundary_internal<I: MeshIndex>(
    mesh: &mut TetMesh<I>,
    metric: &dyn QualityOracle,
    index: &mut dyn SpatialIndex<I>,
    options: &SweepOptions,
    epoch: Epoch,
    progress: Option<&Progress>,
) -> Result<SweepStats> {
    options.validate()?;

    let mut candidates = bad_cells(mesh, metric, options.quality_threshold, true);
    if let Some(max) = options.max_cells {
        candidates.truncate(max);
    }
    // slots are reused, so each entry remembers the cell it was listed for
    let work: Vec<(CellId<I>, f64, [VertexId<I>; 4])> = candidates
        .into_iter()
        .map(|(c, q)| (c, q, mesh.cell(c).vertices))
        .collect();
    let total = work.len();
    debug!(
        candidates = total,
        threshold = options.quality_threshold,
        worst = work.first().map(|&(_, q, _)| q),
        "starting boundary sweep"
    );

    let mut stats = SweepStats::default();
    let mut ctx = OptimizeContext::new(mesh, metric, index, &options.optimize);
    for (step, (cell, _, vertices)) in work.into_iter().enumerate() {
        if let Some(p) = progress {
            p.report(step, total, "Optimizing boundary cells");
        }
        if !still_listed(ctx.mesh, cell, &vertices) || !ctx.mesh.is_boundary_cell(cell) {
            continue;
        }

        stats.visited += 1;
        match optimize_boundary_cell(&mut ctx, cell, epoch) {
            Ok(BoundaryOutcome::Improved(edit)) => stats.record(edit),
            Ok(BoundaryOutcome::NoImprovement) => {}
            Err(err) => {
                warn!(cell = ?cell, error = %err, "boundary sweep aborted");
                return Err(err);
            }
        }
    }

    if let Some(p) = progress {
        p.report(total, total, "Boundary optimization complete");
    }
    debug!(
        visited = stats.visited,
        improved = stats.improved(),
        collapsed = stats.collapsed,
        swaps = stats.internal_swaps + stats.boundary_swaps,
        "boundary sweep done"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::metric::IsotropicMetric;
    use crate::algo::spatial::{GridIndex, NoSpatialIndex};
    use crate::mesh::{build_from_tetrahedra, detect_features, shapes};
    use nalgebra::Vector3;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn perturbed_cube(n: usize) -> TetMesh {
        let (mut points, cells) = shapes::cube_tetrahedra(n);
        for (i, p) in points.iter_mut().enumerate() {
            let interior = p.coords.iter().all(|&x| x > 1e-9 && x < 1.0 - 1e-9);
            if interior {
                let s = i as f64;
                *p += Vector3::new((s * 1.3).sin(), (s * 2.1).cos(), (s * 0.7).sin()) * 0.04;
            }
        }
        let mut mesh = build_from_tetrahedra(&points, &cells).unwrap();
        detect_features(&mut mesh, 45.0);
        mesh
    }

    #[test]
    fn test_sweep_keeps_mesh_valid() {
        let mut mesh = perturbed_cube(3);
        let vertices_before = mesh.num_vertices();
        let mut index = GridIndex::from_mesh(&mesh, 0.25).unwrap();
        let metric = IsotropicMetric::new(1.0 / 3.0).unwrap();
        let options = SweepOptions::default().with_quality_threshold(1.0);

        let stats = optimize_boundary(&mut mesh, &metric, &mut index, &options, Epoch(1)).unwrap();
        assert!(stats.visited > 0);
        assert!(stats.improved() <= stats.visited);
        mesh.check().unwrap();

        // collapses and deletions are the only vertex removals
        assert_eq!(mesh.num_vertices() + stats.collapsed + stats.deleted, vertices_before);
        assert_eq!(index.len(), mesh.num_vertices());
        for (v, vertex) in mesh.vertices() {
            assert!(index.contains(v, &vertex.position));
        }
    }

    #[test]
    fn test_reused_slot_is_not_listed() {
        let p = nalgebra::Point3::new(1.0, 1.0, 1.0);
        let q = p + Vector3::new(1.0, 1.0, 1.0).normalize() * 0.3;
        let (mut points, cells) = shapes::star_tetrahedra(4.0, p);
        points.push(q);
        let mut split: Vec<[usize; 4]> = cells[1..].to_vec();
        split.extend([[5, 1, 2, 3], [4, 5, 2, 3], [4, 1, 5, 3], [4, 1, 2, 5]]);
        let mut mesh: TetMesh = build_from_tetrahedra(&points, &split).unwrap();
        let listed: Vec<(CellId, [VertexId; 4])> = mesh.cells().map(|(c, t)| (c, t.vertices)).collect();
        assert!(listed.iter().all(|(c, v)| still_listed(&mesh, *c, v)));

        let q = VertexId::new(5);
        let (cell, local) = mesh.find_cell_of_vertex(q).unwrap();
        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(crate::algo::delete::delete_vertex(&mut ctx, cell, local).unwrap());

        // the collapse rebuilt the cells around q in freed slots
        let reused: Vec<CellId> = listed
            .iter()
            .filter(|(c, v)| mesh.try_cell(*c).map_or(false, |t| t.vertices != *v))
            .map(|&(c, _)| c)
            .collect();
        assert!(!reused.is_empty());
        for c in &reused {
            let (_, v) = listed.iter().find(|(x, _)| x == c).unwrap();
            assert!(!still_listed(&mesh, *c, v));
        }
    }

    #[test]
    fn test_zero_budget_is_a_no_op() {
        let mut mesh = perturbed_cube(2);
        let before = mesh.clone();
        let metric = IsotropicMetric::default();
        let options = SweepOptions::default().with_quality_threshold(1.0).with_max_cells(0);

        let stats = optimize_boundary(&mut mesh, &metric, &mut NoSpatialIndex, &options, Epoch(1)).unwrap();
        assert_eq!(stats, SweepStats::default());
        assert_eq!(mesh, before);
    }

    #[test]
    fn test_invalid_threshold() {
        let mut mesh = perturbed_cube(2);
        let metric = IsotropicMetric::default();
        let options = SweepOptions::default().with_quality_threshold(f64::NAN);
        let err = optimize_boundary(&mut mesh, &metric, &mut NoSpatialIndex, &options, Epoch(1)).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { .. }));
    }

    #[test]
    fn test_progress_reports_completion() {
        let mut mesh = perturbed_cube(2);
        let metric = IsotropicMetric::new(0.5).unwrap();
        let options = SweepOptions::default().with_quality_threshold(1.0);

        let calls = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (c, f) = (Arc::clone(&calls), Arc::clone(&finished));
        let progress = Progress::new(move |current, total, _| {
            c.fetch_add(1, Ordering::Relaxed);
            if current == total {
                f.fetch_add(1, Ordering::Relaxed);
            }
        });

        optimize_boundary_with_progress(&mut mesh, &metric, &mut NoSpatialIndex, &options, Epoch(1), &progress)
            .unwrap();
        assert!(calls.load(Ordering::Relaxed) > 1);
        assert_eq!(finished.load(Ordering::Relaxed), 1);
        mesh.check().unwrap();
    }
}
