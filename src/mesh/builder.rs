//! Mesh construction utilities.
//!
//! This module builds a [`TetMesh`] from a plain cell-vertex list: it links
//! neighbors by hashing faces, classifies the hull as boundary and computes
//! surface normals. [`detect_features`] adds ridge, corner and non-manifold
//! tags from the hull geometry.

use std::collections::{HashMap, HashSet};

use nalgebra::{Point3, Vector3};
use tracing::{debug, warn};

use super::index::{CellId, MeshIndex, VertexId};
use super::local::{EDGE_VERTICES, FACE_EDGES, FACE_VERTICES};
use super::tags::Tags;
use super::tetmesh::{orient3d, triangle_normal, Adjacent, BoundaryRecord, SurfaceNormals, TetMesh, Tetra};
use crate::error::{MeshError, Result};

/// Build a tetrahedral mesh from vertices and cells.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `cells` - List of tetrahedra, each as `[v0, v1, v2, v3]` indices
///
/// Negatively oriented cells are reoriented. Faces without a neighbor are
/// tagged as boundary faces, and their vertices and edges as boundary
/// entities; boundary vertices receive an area-weighted normal.
///
/// # Example
/// ```
/// use tetmend::mesh::{build_from_tetrahedra, TetMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
/// ];
/// let cells = vec![[0, 1, 2, 3]];
///
/// let mesh: TetMesh = build_from_tetrahedra(&vertices, &cells).unwrap();
/// assert_eq!(mesh.num_vertices(), 4);
/// assert_eq!(mesh.num_cells(), 1);
/// assert!(mesh.is_valid());
/// ```
pub fn build_from_tetrahedra<I: MeshIndex>(
    vertices: &[Point3<f64>],
    cells: &[[usize; 4]],
) -> Result<TetMesh<I>> {
    if cells.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    let mut oriented = Vec::with_capacity(cells.len());
    let mut flipped = 0usize;
    for (ci, cell) in cells.iter().enumerate() {
        for &vi in cell {
            if vi >= vertices.len() {
                return Err(MeshError::InvalidVertexIndex { cell: ci, vertex: vi });
            }
        }
        let distinct: HashSet<usize> = cell.iter().copied().collect();
        if distinct.len() != 4 {
            return Err(MeshError::DegenerateCell { cell: ci });
        }

        let [a, b, c, d] = cell.map(|i| vertices[i]);
        let det = orient3d(&a, &b, &c, &d);
        if det == 0.0 || !det.is_finite() {
            return Err(MeshError::DegenerateCell { cell: ci });
        }
        if det < 0.0 {
            flipped += 1;
            oriented.push([cell[0], cell[1], cell[3], cell[2]]);
        } else {
            oriented.push(*cell);
        }
    }
    if flipped > 0 {
        warn!(flipped, "reoriented negatively oriented cells");
    }

    let mut mesh = TetMesh::with_capacity(vertices.len(), cells.len());
    let vertex_ids: Vec<VertexId<I>> = vertices.iter().map(|&p| mesh.add_vertex(p)).collect();
    let cell_ids: Vec<CellId<I>> = oriented
        .iter()
        .map(|c| mesh.insert_cell(Tetra::new(c.map(|i| vertex_ids[i]))))
        .collect();

    // Link neighbors through shared faces
    let mut face_map: HashMap<[usize; 3], Vec<(usize, usize)>> = HashMap::new();
    for (ci, cell) in oriented.iter().enumerate() {
        for (f, fv) in FACE_VERTICES.iter().enumerate() {
            let mut key = [cell[fv[0]], cell[fv[1]], cell[fv[2]]];
            key.sort_unstable();
            face_map.entry(key).or_default().push((ci, f));
        }
    }

    let mut hull_faces = Vec::new();
    for (key, owners) in &face_map {
        match owners.as_slice() {
            [(c0, f0), (c1, f1)] => {
                mesh.cell_mut(cell_ids[*c0]).adjacency[*f0] = Some(Adjacent::new(cell_ids[*c1], *f1));
                mesh.cell_mut(cell_ids[*c1]).adjacency[*f1] = Some(Adjacent::new(cell_ids[*c0], *f0));
            }
            [(c, f)] => hull_faces.push((cell_ids[*c], *f)),
            _ => {
                return Err(MeshError::NonManifoldFace {
                    v0: key[0],
                    v1: key[1],
                    v2: key[2],
                })
            }
        }
    }

    classify_hull(&mut mesh, &hull_faces);

    debug!(
        vertices = mesh.num_vertices(),
        cells = mesh.num_cells(),
        hull_faces = hull_faces.len(),
        "built tetrahedral mesh"
    );

    Ok(mesh)
}

/// Tag hull faces, edges and vertices as boundary and compute normals.
fn classify_hull<I: MeshIndex>(mesh: &mut TetMesh<I>, hull_faces: &[(CellId<I>, usize)]) {
    let mut hull_edges: HashSet<[VertexId<I>; 2]> = HashSet::new();
    let mut normals: HashMap<VertexId<I>, Vector3<f64>> = HashMap::new();

    for &(c, f) in hull_faces {
        let face = mesh.cell(c).face_vertices(f);
        let n = triangle_normal(mesh.position(face[0]), mesh.position(face[1]), mesh.position(face[2]));
        for (i, &v) in face.iter().enumerate() {
            *normals.entry(v).or_insert_with(Vector3::zeros) += n;
            let w = face[(i + 1) % 3];
            hull_edges.insert(if v < w { [v, w] } else { [w, v] });
        }

        let record = mesh.cell_mut(c).boundary.get_or_insert_with(BoundaryRecord::default);
        record.face_tags[f] |= Tags::BOUNDARY;
        record.set_oriented(f, true);
    }

    let boundary_cells: Vec<CellId<I>> = mesh.boundary_cell_ids().collect();
    for c in boundary_cells {
        let cell = mesh.cell_mut(c);
        let vertices = cell.vertices;
        if let Some(record) = cell.boundary.as_mut() {
            for (e, [a, b]) in EDGE_VERTICES.iter().enumerate() {
                let (va, vb) = (vertices[*a], vertices[*b]);
                let key = if va < vb { [va, vb] } else { [vb, va] };
                if hull_edges.contains(&key) {
                    record.edge_tags[e] |= Tags::BOUNDARY;
                }
            }
        }
    }

    for (v, n) in normals {
        let vertex = mesh.vertex_mut(v);
        vertex.tags |= Tags::BOUNDARY;
        let len = n.norm();
        if len > 0.0 {
            vertex.normals = Some(SurfaceNormals::single(n / len));
        }
    }
}

/// Counts reported by [`detect_features`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureSummary {
    /// Edges tagged as ridges.
    pub ridges: usize,
    /// Edges tagged as non-manifold.
    pub non_manifold: usize,
    /// Vertices tagged as corners.
    pub corners: usize,
}

/// Tag sharp hull edges as ridges and their end points accordingly.
///
/// An edge is a ridge when the normals of its two hull triangles deviate by
/// more than `angle_degrees`; an edge shared by more than two hull triangles
/// is non-manifold. Vertices where the number of ridge edges is not two
/// become corners. Ridge vertices keep their first normal and get the normal
/// of the second sheet as `n2`.
pub fn detect_features<I: MeshIndex>(mesh: &mut TetMesh<I>, angle_degrees: f64) -> FeatureSummary {
    let cos_limit = angle_degrees.to_radians().cos();

    let mut edge_faces: HashMap<[VertexId<I>; 2], Vec<Vector3<f64>>> = HashMap::new();
    for (id, cell) in mesh.cells() {
        for f in 0..4 {
            if cell.adjacency[f].is_some() || !cell.is_boundary_face(f) {
                continue;
            }
            let n = mesh.face_normal(id, f);
            let len = n.norm();
            if len == 0.0 {
                continue;
            }
            for &e in &FACE_EDGES[f] {
                let [a, b] = cell.edge_vertices(e);
                let key = if a < b { [a, b] } else { [b, a] };
                edge_faces.entry(key).or_default().push(n / len);
            }
        }
    }

    let mut summary = FeatureSummary::default();
    let mut ridge_count: HashMap<VertexId<I>, usize> = HashMap::new();
    let mut second_normal: HashMap<VertexId<I>, Vector3<f64>> = HashMap::new();
    for ([a, b], ns) in &edge_faces {
        let tags = match ns.as_slice() {
            [n0, n1] if n0.dot(n1) < cos_limit => {
                for v in [*a, *b] {
                    let first = mesh.vertex(v).normals.map(|s| s.n1);
                    let other = match first {
                        Some(n) if n.dot(n0) < n.dot(n1) => *n0,
                        _ => *n1,
                    };
                    second_normal.insert(v, other);
                }
                summary.ridges += 1;
                Tags::RIDGE
            }
            [_, _] => continue,
            _ => {
                summary.non_manifold += 1;
                Tags::NON_MANIFOLD
            }
        };
        mesh.set_edge_tags(*a, *b, tags);
        if tags == Tags::RIDGE {
            *ridge_count.entry(*a).or_default() += 1;
            *ridge_count.entry(*b).or_default() += 1;
        }
    }

    for (v, count) in ridge_count {
        let vertex = mesh.vertex_mut(v);
        if count != 2 {
            vertex.tags |= Tags::CORNER;
            summary.corners += 1;
        } else if let (Some(normals), Some(n2)) = (vertex.normals.as_mut(), second_normal.get(&v)) {
            normals.n2 = Some(*n2);
        }
    }

    debug!(?summary, "detected boundary features");
    summary
}

/// Convert a mesh back to a compact cell-vertex representation.
///
/// Removed slots are skipped and the remaining vertices renumbered in
/// handle order.
pub fn to_cell_vertex<I: MeshIndex>(mesh: &TetMesh<I>) -> (Vec<Point3<f64>>, Vec<[usize; 4]>) {
    let mut remap: HashMap<VertexId<I>, usize> = HashMap::with_capacity(mesh.num_vertices());
    let mut points = Vec::with_capacity(mesh.num_vertices());
    for (id, v) in mesh.vertices() {
        remap.insert(id, points.len());
        points.push(v.position);
    }
    let cells = mesh
        .cells()
        .map(|(_, c)| c.vertices.map(|v| remap[&v]))
        .collect();
    (points, cells)
}
