//! Tagged tetrahedral mesh store.
//!
//! This module provides the arena-backed tetrahedral mesh used by every
//! operator in the crate.
//!
//! # Structure
//!
//! - Each **cell** stores its four vertices, one optional [`Adjacent`] per face
//!   and, for cells touching the boundary, a [`BoundaryRecord`]
//! - Adjacency is symmetric: if cell `A` sees `(B, g)` across face `f`, then
//!   `B` sees `(A, f)` across face `g`
//! - Each **vertex** stores its position, classification tags, the last
//!   sweep epoch that processed it and optional surface normals
//!
//! Removed vertices and cells leave an empty slot that is recycled by the
//! next insertion, so handles stay stable while their element is alive.

use nalgebra::{Point3, Vector3};

use super::index::{CellId, MeshIndex, VertexId};
use super::local::{EDGE_VERTICES, FACE_VERTICES};
use super::tags::{Epoch, Tags};
use crate::error::{MeshError, Result};

/// Signed determinant `(b - a) . ((c - a) x (d - a))`, six times the volume.
#[inline]
pub fn orient3d(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a)))
}

/// Non-normalized normal of the triangle `(a, b, c)`.
#[inline]
pub fn triangle_normal(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Vector3<f64> {
    (b - a).cross(&(c - a))
}

/// Surface normals attached to a boundary vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceNormals {
    /// Unit normal of the (first) surface sheet.
    pub n1: Vector3<f64>,
    /// Unit normal of the second sheet for ridge vertices.
    pub n2: Option<Vector3<f64>>,
}

impl SurfaceNormals {
    /// Normals with a single sheet.
    pub fn single(n: Vector3<f64>) -> Self {
        Self { n1: n, n2: None }
    }
}

/// A vertex of the tetrahedral mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// The 3D position of this vertex.
    pub position: Point3<f64>,

    /// Classification tags.
    pub tags: Tags,

    /// Last sweep epoch that processed this vertex.
    pub epoch: Epoch,

    /// Surface normals, present only for surface vertices.
    pub normals: Option<SurfaceNormals>,
}

impl Vertex {
    /// Create a new interior vertex at the given position.
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            tags: Tags::empty(),
            epoch: Epoch::default(),
            normals: None,
        }
    }
}

/// Neighbor across a face: the adjacent cell and the matching local face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Adjacent<I: MeshIndex = u32> {
    /// The neighboring cell.
    pub cell: CellId<I>,
    /// The local face of the neighbor shared with this cell.
    pub face: u8,
}

impl<I: MeshIndex> Adjacent<I> {
    /// Create a new adjacency entry.
    #[inline]
    pub fn new(cell: CellId<I>, face: usize) -> Self {
        Self {
            cell,
            face: face as u8,
        }
    }

    /// The local face as an index.
    #[inline]
    pub fn face(self) -> usize {
        self.face as usize
    }
}

/// Boundary extension of a cell that touches the domain boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundaryRecord {
    /// Tags of each local face; [`Tags::BOUNDARY`] marks a boundary face.
    pub face_tags: [Tags; 4],
    /// Bit `f` is set when face `f` is oriented along the outward surface normal.
    pub orientation: u8,
    /// Tags of each local edge.
    pub edge_tags: [Tags; 6],
}

impl BoundaryRecord {
    /// Returns `true` if face `f` is a boundary face.
    #[inline]
    pub fn is_boundary_face(&self, f: usize) -> bool {
        self.face_tags[f].is_boundary()
    }

    /// Returns `true` if face `f` is oriented along the surface normal.
    #[inline]
    pub fn is_oriented(&self, f: usize) -> bool {
        self.orientation & (1 << f) != 0
    }

    /// Set or clear the orientation bit of face `f`.
    #[inline]
    pub fn set_oriented(&mut self, f: usize, oriented: bool) {
        if oriented {
            self.orientation |= 1 << f;
        } else {
            self.orientation &= !(1 << f);
        }
    }

    /// Returns `true` if at least one face is on the boundary.
    pub fn has_boundary_face(&self) -> bool {
        (0..4).any(|f| self.is_boundary_face(f))
    }

    /// First boundary face, if any.
    pub fn first_boundary_face(&self) -> Option<usize> {
        (0..4).find(|&f| self.is_boundary_face(f))
    }
}

/// A tetrahedron.
#[derive(Debug, Clone, PartialEq)]
pub struct Tetra<I: MeshIndex = u32> {
    /// The four vertices, positively oriented.
    pub vertices: [VertexId<I>; 4],

    /// Neighbor across each local face (`None` on the hull).
    pub adjacency: [Option<Adjacent<I>>; 4],

    /// Boundary extension; present iff a face touches the boundary.
    pub boundary: Option<BoundaryRecord>,
}

impl<I: MeshIndex> Tetra<I> {
    /// Create a cell with no neighbors and no boundary record.
    pub fn new(vertices: [VertexId<I>; 4]) -> Self {
        Self {
            vertices,
            adjacency: [None; 4],
            boundary: None,
        }
    }

    /// Local index of a vertex in this cell.
    #[inline]
    pub fn local_vertex(&self, v: VertexId<I>) -> Option<usize> {
        self.vertices.iter().position(|&x| x == v)
    }

    /// Returns `true` if the cell uses vertex `v`.
    #[inline]
    pub fn contains(&self, v: VertexId<I>) -> bool {
        self.vertices.contains(&v)
    }

    /// Global vertices of local face `f`, outward oriented.
    #[inline]
    pub fn face_vertices(&self, f: usize) -> [VertexId<I>; 3] {
        let [a, b, c] = FACE_VERTICES[f];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    /// Global endpoints of local edge `e`.
    #[inline]
    pub fn edge_vertices(&self, e: usize) -> [VertexId<I>; 2] {
        let [a, b] = EDGE_VERTICES[e];
        [self.vertices[a], self.vertices[b]]
    }

    /// Local edge joining two global vertices, if both belong to the cell.
    pub fn local_edge(&self, a: VertexId<I>, b: VertexId<I>) -> Option<usize> {
        let (la, lb) = (self.local_vertex(a)?, self.local_vertex(b)?);
        if la == lb {
            return None;
        }
        Some(super::local::edge_between(la, lb))
    }

    /// Tags of local edge `e` (empty without a boundary record).
    #[inline]
    pub fn edge_tags(&self, e: usize) -> Tags {
        self.boundary.map_or(Tags::empty(), |r| r.edge_tags[e])
    }

    /// Tags of local face `f` (empty without a boundary record).
    #[inline]
    pub fn face_tags(&self, f: usize) -> Tags {
        self.boundary.map_or(Tags::empty(), |r| r.face_tags[f])
    }

    /// Returns `true` if local face `f` is a boundary face.
    #[inline]
    pub fn is_boundary_face(&self, f: usize) -> bool {
        self.face_tags(f).is_boundary()
    }
}

/// An arena-backed tetrahedral mesh with boundary classification.
#[derive(Debug, Clone, PartialEq)]
pub struct TetMesh<I: MeshIndex = u32> {
    /// Vertex slots; `None` marks a free slot.
    pub(crate) vertices: Vec<Option<Vertex>>,

    /// Cell slots; `None` marks a free slot.
    pub(crate) cells: Vec<Option<Tetra<I>>>,

    free_vertices: Vec<VertexId<I>>,
    free_cells: Vec<CellId<I>>,
    live_vertices: usize,
    live_cells: usize,
}

impl<I: MeshIndex> Default for TetMesh<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MeshIndex> TetMesh<I> {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_cells: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(num_vertices),
            cells: Vec::with_capacity(num_cells),
            free_vertices: Vec::new(),
            free_cells: Vec::new(),
            live_vertices: 0,
            live_cells: 0,
        }
    }

    // ==================== Accessors ====================

    /// Number of live vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.live_vertices
    }

    /// Number of live cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.live_cells
    }

    /// Get a vertex if its handle is alive.
    #[inline]
    pub fn try_vertex(&self, id: VertexId<I>) -> Option<&Vertex> {
        self.vertices.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a cell if its handle is alive.
    #[inline]
    pub fn try_cell(&self, id: CellId<I>) -> Option<&Tetra<I>> {
        self.cells.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a vertex by ID.
    ///
    /// # Panics
    /// Panics if the vertex has been removed.
    #[inline]
    pub fn vertex(&self, id: VertexId<I>) -> &Vertex {
        self.try_vertex(id)
            .unwrap_or_else(|| panic!("vertex {id:?} is not alive"))
    }

    /// Get a mutable vertex by ID.
    ///
    /// # Panics
    /// Panics if the vertex has been removed.
    #[inline]
    pub fn vertex_mut(&mut self, id: VertexId<I>) -> &mut Vertex {
        self.vertices
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("vertex {id:?} is not alive"))
    }

    /// Get a cell by ID.
    ///
    /// # Panics
    /// Panics if the cell has been removed.
    #[inline]
    pub fn cell(&self, id: CellId<I>) -> &Tetra<I> {
        self.try_cell(id)
            .unwrap_or_else(|| panic!("cell {id:?} is not alive"))
    }

    /// Get a mutable cell by ID.
    ///
    /// # Panics
    /// Panics if the cell has been removed.
    #[inline]
    pub fn cell_mut(&mut self, id: CellId<I>) -> &mut Tetra<I> {
        self.cells
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("cell {id:?} is not alive"))
    }

    /// Returns `true` if the cell handle refers to a live cell.
    #[inline]
    pub fn is_cell_alive(&self, id: CellId<I>) -> bool {
        self.try_cell(id).is_some()
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId<I>) -> &Point3<f64> {
        &self.vertex(v).position
    }

    /// Set the position of a vertex.
    #[inline]
    pub fn set_position(&mut self, v: VertexId<I>, pos: Point3<f64>) {
        self.vertex_mut(v).position = pos;
    }

    /// Tags of a vertex.
    #[inline]
    pub fn vertex_tags(&self, v: VertexId<I>) -> Tags {
        self.vertex(v).tags
    }

    /// Replace the tags of a vertex.
    pub fn set_vertex_tags(&mut self, v: VertexId<I>, tags: Tags) {
        self.vertex_mut(v).tags = tags;
    }

    /// Neighbor of a cell across local face `f`.
    #[inline]
    pub fn neighbor(&self, c: CellId<I>, f: usize) -> Option<Adjacent<I>> {
        self.cell(c).adjacency[f]
    }

    /// Returns `true` if the cell carries a boundary record.
    #[inline]
    pub fn is_boundary_cell(&self, c: CellId<I>) -> bool {
        self.cell(c).boundary.is_some()
    }

    /// Positions of the four vertices of a cell.
    pub fn cell_positions(&self, c: CellId<I>) -> [Point3<f64>; 4] {
        let v = self.cell(c).vertices;
        [
            *self.position(v[0]),
            *self.position(v[1]),
            *self.position(v[2]),
            *self.position(v[3]),
        ]
    }

    /// Six times the signed volume of a cell.
    pub fn orientation(&self, c: CellId<I>) -> f64 {
        let [a, b, c, d] = self.cell_positions(c);
        orient3d(&a, &b, &c, &d)
    }

    /// Signed volume of a cell.
    pub fn volume(&self, c: CellId<I>) -> f64 {
        self.orientation(c) / 6.0
    }

    /// Outward (non-normalized) normal of local face `f` of a cell.
    pub fn face_normal(&self, c: CellId<I>, f: usize) -> Vector3<f64> {
        let [a, b, d] = self.cell(c).face_vertices(f);
        triangle_normal(self.position(a), self.position(b), self.position(d))
    }

    // ==================== Iteration ====================

    /// Iterate over all live vertex IDs.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_some())
            .map(|(i, _)| VertexId::new(i))
    }

    /// Iterate over all live vertices with their IDs.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId<I>, &Vertex)> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (VertexId::new(i), v)))
    }

    /// Iterate over all live cell IDs.
    pub fn cell_ids(&self) -> impl Iterator<Item = CellId<I>> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .map(|(i, _)| CellId::new(i))
    }

    /// Iterate over all live cells with their IDs.
    pub fn cells(&self) -> impl Iterator<Item = (CellId<I>, &Tetra<I>)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (CellId::new(i), c)))
    }

    /// Iterate over cells carrying a boundary record.
    pub fn boundary_cell_ids(&self) -> impl Iterator<Item = CellId<I>> + '_ {
        self.cells()
            .filter(|(_, c)| c.boundary.is_some())
            .map(|(id, _)| id)
    }

    /// Some live cell using vertex `v` together with the local index of `v`.
    ///
    /// This is a linear scan; operators get their starting cell from the
    /// caller instead.
    pub fn find_cell_of_vertex(&self, v: VertexId<I>) -> Option<(CellId<I>, usize)> {
        self.cells()
            .find_map(|(id, c)| c.local_vertex(v).map(|l| (id, l)))
    }

    /// Live vertex closest to `p` (linear scan).
    pub fn nearest_vertex(&self, p: &Point3<f64>) -> Option<VertexId<I>> {
        self.vertices()
            .map(|(id, v)| (id, (v.position - p).norm_squared()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    // ==================== Construction ====================

    /// Add a new vertex and return its ID.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> VertexId<I> {
        self.insert_vertex(Vertex::new(position))
    }

    /// Insert a fully specified vertex and return its ID.
    pub fn insert_vertex(&mut self, vertex: Vertex) -> VertexId<I> {
        self.live_vertices += 1;
        if let Some(id) = self.free_vertices.pop() {
            self.vertices[id.index()] = Some(vertex);
            id
        } else {
            let id = VertexId::new(self.vertices.len());
            self.vertices.push(Some(vertex));
            id
        }
    }

    /// Remove a vertex. The caller guarantees no live cell references it.
    pub(crate) fn remove_vertex(&mut self, id: VertexId<I>) -> Result<()> {
        match self.vertices.get_mut(id.index()) {
            Some(slot @ Some(_)) => {
                *slot = None;
                self.free_vertices.push(id);
                self.live_vertices -= 1;
                Ok(())
            }
            _ => Err(MeshError::DeadHandle {
                what: "vertex",
                index: id.index(),
            }),
        }
    }

    /// Insert a cell and return its ID. Adjacency is the caller's business.
    pub(crate) fn insert_cell(&mut self, cell: Tetra<I>) -> CellId<I> {
        self.live_cells += 1;
        if let Some(id) = self.free_cells.pop() {
            self.cells[id.index()] = Some(cell);
            id
        } else {
            let id = CellId::new(self.cells.len());
            self.cells.push(Some(cell));
            id
        }
    }

    /// Remove a cell. Neighbors are not updated.
    pub(crate) fn remove_cell(&mut self, id: CellId<I>) -> Result<Tetra<I>> {
        match self.cells.get_mut(id.index()).and_then(Option::take) {
            Some(cell) => {
                self.free_cells.push(id);
                self.live_cells -= 1;
                Ok(cell)
            }
            None => Err(MeshError::DeadHandle {
                what: "cell",
                index: id.index(),
            }),
        }
    }

    // ==================== Tagging ====================

    /// Add tags to the edge `(a, b)` in every boundary cell that contains it.
    ///
    /// Vertices of a ridge, reference or non-manifold edge also receive the
    /// tag so that they are classified accordingly. Returns the number of
    /// cell records updated.
    pub fn set_edge_tags(&mut self, a: VertexId<I>, b: VertexId<I>, tags: Tags) -> usize {
        let mut updated = 0;
        for slot in self.cells.iter_mut() {
            let Some(cell) = slot.as_mut() else { continue };
            let Some(e) = cell.local_edge(a, b) else { continue };
            if let Some(record) = cell.boundary.as_mut() {
                record.edge_tags[e] |= tags;
                updated += 1;
            }
        }
        let propagate = tags & (Tags::RIDGE | Tags::REFERENCE | Tags::NON_MANIFOLD | Tags::REQUIRED);
        if updated > 0 && !propagate.is_empty() {
            for v in [a, b] {
                self.vertex_mut(v).tags |= propagate;
            }
        }
        updated
    }

    /// Tags of the edge `(a, b)` as seen from cell `c`.
    pub fn edge_tags(&self, c: CellId<I>, a: VertexId<I>, b: VertexId<I>) -> Tags {
        let cell = self.cell(c);
        cell.local_edge(a, b)
            .map_or(Tags::empty(), |e| cell.edge_tags(e))
    }

    // ==================== Validation ====================

    /// Check that the mesh is consistent.
    ///
    /// Verifies that every cell references live vertices, is positively
    /// oriented, has symmetric adjacency with matching face vertices, and
    /// carries a boundary record exactly when one of its faces is a boundary
    /// face. Hull faces (no neighbor) must be tagged as boundary.
    pub fn check(&self) -> Result<()> {
        for (id, cell) in self.cells() {
            for &v in &cell.vertices {
                if self.try_vertex(v).is_none() {
                    return Err(MeshError::DeadHandle {
                        what: "vertex",
                        index: v.index(),
                    });
                }
            }

            let det = self.orientation(id);
            if det <= 0.0 {
                return Err(MeshError::InvertedCell {
                    cell: id.index(),
                    det,
                });
            }

            for f in 0..4 {
                match cell.adjacency[f] {
                    Some(adj) => {
                        let other = self.try_cell(adj.cell).ok_or(MeshError::DeadHandle {
                            what: "cell",
                            index: adj.cell.index(),
                        })?;
                        let back = other.adjacency[adj.face()];
                        if back != Some(Adjacent::new(id, f)) {
                            return Err(MeshError::AdjacencyMismatch {
                                cell: id.index(),
                                face: f,
                            });
                        }
                        let mut mine = cell.face_vertices(f);
                        let mut theirs = other.face_vertices(adj.face());
                        mine.sort();
                        theirs.sort();
                        if mine != theirs {
                            return Err(MeshError::AdjacencyMismatch {
                                cell: id.index(),
                                face: f,
                            });
                        }
                    }
                    None => {
                        if !cell.is_boundary_face(f) {
                            return Err(MeshError::InvalidState(format!(
                                "hull face {f} of cell {id:?} is not tagged as boundary"
                            )));
                        }
                    }
                }
            }

            if let Some(record) = &cell.boundary {
                if !record.has_boundary_face() {
                    return Err(MeshError::InvalidState(format!(
                        "cell {id:?} has a boundary record without boundary face"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if [`check`](Self::check) succeeds.
    pub fn is_valid(&self) -> bool {
        self.check().is_ok()
    }
}
