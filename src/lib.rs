//! # Tetmend
//!
//! Local optimization of tetrahedral meshes with tagged boundaries.
//!
//! Tetmend stores a volume mesh as cells with explicit face adjacency and
//! boundary records, and improves it one cell at a time with small edits:
//! vertex relocation, edge collapse, point deletion and edge swaps. Every
//! edit is validated before it is committed, so the mesh is never left
//! inverted or inconsistent. Protection tags (required, corner, ridge,
//! reference, non-manifold) keep the boundary geometry intact.
//!
//! ## Features
//!
//! - **Arena mesh store**: typed 16, 32 or 64-bit handles with slot reuse
//! - **Commit-or-reject edits**: replacements are planned, checked, then applied
//! - **Pluggable metric**: isotropic or constant anisotropic sizing through
//!   a [`QualityOracle`](algo::metric::QualityOracle)
//! - **Spatial index hooks**: vertex moves and removals are reported to a
//!   [`SpatialIndex`](algo::spatial::SpatialIndex)
//!
//! ## Quick Start
//!
//! ```
//! use tetmend::prelude::*;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 1.0),
//! ];
//! let cells = vec![[0, 1, 2, 3]];
//!
//! let mesh: TetMesh = build_from_tetrahedra(&vertices, &cells).unwrap();
//! assert_eq!(mesh.num_vertices(), 4);
//! assert_eq!(mesh.num_cells(), 1);
//! assert!(mesh.is_boundary_cell(CellId::new(0)));
//! ```
//!
//! ## Optimizing Boundary Cells
//!
//! ```
//! use tetmend::prelude::*;
//!
//! let (points, cells) = tetmend::mesh::shapes::cube_tetrahedra(3);
//! let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
//! detect_features(&mut mesh, 45.0);
//!
//! let metric = IsotropicMetric::new(1.0 / 3.0).unwrap();
//! let options = SweepOptions::default().with_quality_threshold(0.7);
//! let stats = optimize_boundary(&mut mesh, &metric, &mut NoSpatialIndex, &options, Epoch(1)).unwrap();
//! println!("{stats:?}");
//! assert!(mesh.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use tetmend::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::metric::{IsotropicMetric, QualityOracle};
    pub use crate::algo::optimize::{
        optimize_boundary, optimize_boundary_cell, BoundaryOutcome, Edit, OptimizeContext, OptimizeOptions,
        SweepOptions, SweepStats,
    };
    pub use crate::algo::spatial::{NoSpatialIndex, SpatialIndex};
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        build_from_tetrahedra, detect_features, to_cell_vertex, CellId, Epoch, MeshIndex, PointClass, Tags,
        TetMesh, Tetra, Vertex, VertexId,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;
