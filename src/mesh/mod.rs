//! Core mesh data structures.
//!
//! This module provides the tetrahedral mesh store and the types used to
//! address and classify its elements.
//!
//! # Overview
//!
//! The primary type is [`TetMesh`], an arena of vertices and tetrahedra with
//! face adjacency. Cells touching the domain boundary carry a
//! [`BoundaryRecord`] with per-face and per-edge [`Tags`].
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`CellId`] - Identifies a tetrahedron
//!
//! These indices are generic over the underlying integer type ([`MeshIndex`] trait),
//! allowing you to choose `u16`, `u32`, or `u64` based on mesh size.
//!
//! # Construction
//!
//! Meshes are typically constructed from cell-vertex lists:
//!
//! ```
//! use tetmend::mesh::{build_from_tetrahedra, shapes, TetMesh};
//!
//! let (points, cells) = shapes::cube_tetrahedra(2);
//! let mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
//! assert_eq!(mesh.num_cells(), 48);
//! ```

mod builder;
mod cavity;
mod index;
pub mod local;
pub mod shapes;
mod tags;
mod tetmesh;

pub use builder::{build_from_tetrahedra, detect_features, to_cell_vertex, FeatureSummary};
pub use cavity::{CavityPlan, FreshFace};
pub use index::{CellId, MeshIndex, VertexId};
pub use tags::{Epoch, PointClass, Tags};
pub use tetmesh::{
    orient3d, triangle_normal, Adjacent, BoundaryRecord, SurfaceNormals, TetMesh, Tetra, Vertex,
};
