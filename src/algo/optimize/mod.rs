//! Boundary-cell optimization.
//!
//! [`optimize_boundary_cell`] is the per-cell decision engine: given a cell
//! with a face on the boundary, it tries relocation, then collapse and point
//! deletion, then internal and boundary edge swaps, and stops at the first
//! topological edit that succeeds. [`optimize_boundary`] is a reference sweep
//! that calls it on every poorly shaped boundary cell.
//!
//! # Example
//!
//! ```
//! use tetmend::prelude::*;
//! use tetmend::algo::optimize::{optimize_boundary_cell, OptimizeContext, OptimizeOptions};
//!
//! let (points, cells) = tetmend::mesh::shapes::cube_tetrahedra(2);
//! let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
//! let cell = mesh.boundary_cell_ids().next().unwrap();
//!
//! let metric = IsotropicMetric::new(0.5).unwrap();
//! let options = OptimizeOptions::default();
//! let mut index = NoSpatialIndex;
//! let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
//!
//! let outcome = optimize_boundary_cell(&mut ctx, cell, Epoch(1)).unwrap();
//! println!("{outcome:?}");
//! assert!(mesh.is_valid());
//! ```

mod sweep;

pub use sweep::{optimize_boundary, optimize_boundary_with_progress, SweepOptions, SweepStats};

use nalgebra::Point3;
use tracing::{debug, trace};

use crate::error::{MeshError, Result};
use crate::mesh::local::{FACE_EDGES, VERTEX_EDGES};
use crate::mesh::{CellId, Epoch, MeshIndex, TetMesh, VertexId};

use super::collapse::collapse_vertex_edges;
use super::delete::delete_vertex;
use super::metric::QualityOracle;
use super::relocate::move_cell_points;
use super::spatial::SpatialIndex;
use super::swap::{swap_boundary_edge, swap_internal_edge};

/// Options for the boundary-cell optimization.
#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    /// Allow vertex relocation.
    pub relocate: bool,

    /// Allow collapse and point deletion.
    pub insert: bool,

    /// Allow edge swaps.
    pub swap: bool,

    /// Allow relocation of boundary (surface, ridge, reference and
    /// non-manifold) vertices. Interior vertices are always movable.
    pub boundary_relocation: bool,

    /// Maximum number of relocation rounds per cell.
    pub relocation_rounds: usize,

    /// Edges longer than this (in metric space) are never collapsed.
    pub collapse_max_length: f64,

    /// A collapse may not create an edge longer than this.
    pub collapse_max_new_length: f64,

    /// A collapsed cell must keep at least this fraction of its quality.
    pub collapse_quality_ratio: f64,

    /// Point deletion is not attempted on balls larger than this.
    pub deletion_ball_limit: usize,

    /// A swap must raise the worst quality of its shell by this factor.
    pub swap_gain: f64,

    /// Minimum cosine between a surface normal before and after an edit.
    pub min_normal_cos: f64,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            relocate: true,
            insert: true,
            swap: true,
            boundary_relocation: true,
            relocation_rounds: 3,
            collapse_max_length: 1.1,
            collapse_max_new_length: 1.6,
            collapse_quality_ratio: 0.3,
            deletion_ball_limit: 30,
            swap_gain: 1.01,
            min_normal_cos: std::f64::consts::FRAC_1_SQRT_2,
        }
    }
}

impl OptimizeOptions {
    /// Disable vertex relocation.
    pub fn without_relocation(mut self) -> Self {
        self.relocate = false;
        self
    }

    /// Disable collapse and point deletion.
    pub fn without_insertion(mut self) -> Self {
        self.insert = false;
        self
    }

    /// Disable edge swaps.
    pub fn without_swap(mut self) -> Self {
        self.swap = false;
        self
    }

    /// Set whether boundary vertices may be relocated.
    pub fn with_boundary_relocation(mut self, enabled: bool) -> Self {
        self.boundary_relocation = enabled;
        self
    }

    /// Set the maximum number of relocation rounds.
    pub fn with_relocation_rounds(mut self, rounds: usize) -> Self {
        self.relocation_rounds = rounds;
        self
    }

    /// Set the collapse length threshold.
    pub fn with_collapse_max_length(mut self, length: f64) -> Self {
        self.collapse_max_length = length;
        self
    }

    /// Set the required swap gain.
    pub fn with_swap_gain(mut self, gain: f64) -> Self {
        self.swap_gain = gain;
        self
    }

    /// Check that all numeric parameters are usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("collapse_max_length", self.collapse_max_length),
            ("collapse_max_new_length", self.collapse_max_new_length),
            ("swap_gain", self.swap_gain),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(MeshError::invalid_param(name, value, "must be positive and finite"));
            }
        }
        if !(0.0..=1.0).contains(&self.collapse_quality_ratio) {
            return Err(MeshError::invalid_param(
                "collapse_quality_ratio",
                self.collapse_quality_ratio,
                "must lie in [0, 1]",
            ));
        }
        if !(-1.0..=1.0).contains(&self.min_normal_cos) {
            return Err(MeshError::invalid_param(
                "min_normal_cos",
                self.min_normal_cos,
                "must lie in [-1, 1]",
            ));
        }
        if self.deletion_ball_limit == 0 {
            return Err(MeshError::invalid_param(
                "deletion_ball_limit",
                self.deletion_ball_limit,
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Everything an operator needs: the mesh, the oracle, the spatial index
/// and the options.
pub struct OptimizeContext<'a, I: MeshIndex = u32> {
    /// The mesh being edited.
    pub mesh: &'a mut TetMesh<I>,
    /// Length and quality oracle.
    pub metric: &'a dyn QualityOracle,
    /// Spatial index kept in sync with vertex moves and removals.
    pub index: &'a mut dyn SpatialIndex<I>,
    /// Read-only options.
    pub options: &'a OptimizeOptions,
}

impl<'a, I: MeshIndex> OptimizeContext<'a, I> {
    /// Bundle the collaborators of an optimization pass.
    pub fn new(
        mesh: &'a mut TetMesh<I>,
        metric: &'a dyn QualityOracle,
        index: &'a mut dyn SpatialIndex<I>,
        options: &'a OptimizeOptions,
    ) -> Self {
        Self {
            mesh,
            metric,
            index,
            options,
        }
    }

    /// Quality of a live cell.
    #[inline]
    pub fn quality(&self, c: CellId<I>) -> f64 {
        self.metric.quality(&self.mesh.cell_positions(c))
    }

    /// Quality of a prospective cell with the given vertices.
    #[inline]
    pub fn quality_of(&self, vertices: &[VertexId<I>; 4]) -> f64 {
        self.metric.quality(&vertices.map(|v| *self.mesh.position(v)))
    }

    /// Quality of a live cell with vertex `moved` placed at `at`.
    pub fn quality_moved(&self, c: CellId<I>, moved: VertexId<I>, at: &Point3<f64>) -> f64 {
        self.metric.quality(&self.positions_moved(c, moved, at))
    }

    /// Positions of a live cell with vertex `moved` placed at `at`.
    pub fn positions_moved(&self, c: CellId<I>, moved: VertexId<I>, at: &Point3<f64>) -> [Point3<f64>; 4] {
        self.mesh
            .cell(c)
            .vertices
            .map(|v| if v == moved { *at } else { *self.mesh.position(v) })
    }

    /// Metric length of the edge `(a, b)`.
    #[inline]
    pub fn length(&self, a: VertexId<I>, b: VertexId<I>) -> f64 {
        self.metric.length(self.mesh.position(a), self.mesh.position(b))
    }
}

/// The edit that improved a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edit {
    /// At least one vertex moved and no topological edit succeeded.
    Relocated,
    /// The free vertex was collapsed along an edge of the cell.
    Collapsed,
    /// The free vertex was collapsed along an edge of another ball cell.
    PointDeleted,
    /// An edge incident to the free vertex was swapped.
    InternalSwap,
    /// A boundary edge of the cell was swapped.
    BoundarySwap,
}

/// Result of one driver invocation on a boundary cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryOutcome {
    /// The given edit was applied.
    Improved(Edit),
    /// Nothing admissible was found; the mesh is unchanged.
    NoImprovement,
}

impl BoundaryOutcome {
    /// Returns `true` if the mesh changed.
    pub fn is_improved(self) -> bool {
        matches!(self, BoundaryOutcome::Improved(_))
    }
}

/// Optimize a cell with a face on the boundary.
///
/// The cell's first boundary face and the vertex opposite to it (the free
/// vertex) drive the whole attempt; if the free vertex is itself on the
/// boundary there is nothing to do. Otherwise, in order and as enabled by
/// the options:
///
/// 1. relocate the vertices of the cell, up to `relocation_rounds` rounds
/// 2. collapse the free vertex along an edge of the cell, then anywhere in
///    its ball
/// 3. swap the three edges of the free vertex
/// 4. swap the three edges of the boundary face, skipping feature, required
///    and non-manifold edges
///
/// The first successful edit of steps 2-4 ends the attempt. An error means
/// the mesh was found inconsistent; the caller must stop editing it.
pub fn optimize_boundary_cell<I: MeshIndex>(
    ctx: &mut OptimizeContext<'_, I>,
    cell: CellId<I>,
    epoch: Epoch,
) -> Result<BoundaryOutcome> {
    let t = ctx.mesh.try_cell(cell).ok_or(MeshError::DeadHandle {
        what: "cell",
        index: cell.index(),
    })?;
    let Some(ib) = t.boundary.and_then(|r| r.first_boundary_face()) else {
        trace!(cell = ?cell, "cell has no boundary face");
        return Ok(BoundaryOutcome::NoImprovement);
    };
    let free = t.vertices[ib];
    if ctx.mesh.vertex_tags(free).is_boundary() {
        return Ok(BoundaryOutcome::NoImprovement);
    }

    let mut moved = false;
    if ctx.options.relocate {
        for _ in 0..ctx.options.relocation_rounds {
            if !move_cell_points(ctx, cell, epoch)? {
                break;
            }
            moved = true;
        }
    }

    if ctx.options.insert {
        if collapse_vertex_edges(ctx, cell, ib)?.is_some() {
            debug!(cell = ?cell, vertex = ?free, "removed free vertex by collapse");
            return Ok(BoundaryOutcome::Improved(Edit::Collapsed));
        }
        if delete_vertex(ctx, cell, ib)? {
            debug!(cell = ?cell, vertex = ?free, "removed free vertex from its ball");
            return Ok(BoundaryOutcome::Improved(Edit::PointDeleted));
        }
    }

    if ctx.options.swap {
        for e in VERTEX_EDGES[ib] {
            if swap_internal_edge(ctx, cell, e)? {
                return Ok(BoundaryOutcome::Improved(Edit::InternalSwap));
            }
        }
        for e in FACE_EDGES[ib] {
            if ctx.mesh.cell(cell).edge_tags(e).blocks_swap() {
                continue;
            }
            if swap_boundary_edge(ctx, cell, ib, e)? {
                return Ok(BoundaryOutcome::Improved(Edit::BoundarySwap));
            }
        }
    }

    Ok(if moved {
        BoundaryOutcome::Improved(Edit::Relocated)
    } else {
        BoundaryOutcome::NoImprovement
    })
}
