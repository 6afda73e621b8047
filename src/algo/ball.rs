//! Topological balls and edge shells.
//!
//! A ball is the list of cells around a vertex, a shell the list of cells
//! around an edge. Neither is stored: they are recomputed from adjacency
//! every time an operator needs one, and any topology change invalidates
//! them.
//!
//! Inconsistent adjacency met during a walk is reported as an error. A ball
//! or shell growing past [`BALL_LIMIT`] is not: the query comes back empty
//! and the caller skips the edit.

use std::collections::{HashMap, HashSet};

use crate::error::{MeshError, Result};
use crate::mesh::local::{EDGE_FACES, EDGE_VERTICES};
use crate::mesh::{CellId, MeshIndex, TetMesh, VertexId};

/// Hard limit on the number of cells in a ball or shell.
pub const BALL_LIMIT: usize = 1024;

/// A cell of a ball together with the local index of the ball vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BallEntry<I: MeshIndex = u32> {
    /// The cell.
    pub cell: CellId<I>,
    /// Local index of the ball vertex in `cell`.
    pub local: usize,
}

fn dead_cell<I: MeshIndex>(c: CellId<I>) -> MeshError {
    MeshError::DeadHandle {
        what: "cell",
        index: c.index(),
    }
}

/// All cells incident to vertex `local` of `cell`, start cell first.
///
/// Returns `Ok(None)` if the ball has more than [`BALL_LIMIT`] cells.
pub fn volume_ball<I: MeshIndex>(
    mesh: &TetMesh<I>,
    cell: CellId<I>,
    local: usize,
) -> Result<Option<Vec<BallEntry<I>>>> {
    volume_ball_limited(mesh, cell, local, BALL_LIMIT)
}

/// Like [`volume_ball`] with a caller-supplied size limit.
pub fn volume_ball_limited<I: MeshIndex>(
    mesh: &TetMesh<I>,
    cell: CellId<I>,
    local: usize,
    limit: usize,
) -> Result<Option<Vec<BallEntry<I>>>> {
    let v = mesh.try_cell(cell).ok_or_else(|| dead_cell(cell))?.vertices[local];

    let mut ball = vec![BallEntry { cell, local }];
    let mut seen = HashSet::from([cell]);
    let mut head = 0;
    while head < ball.len() {
        let entry = ball[head];
        head += 1;
        let t = mesh.cell(entry.cell);
        for f in 0..4 {
            if f == entry.local {
                continue;
            }
            let Some(adj) = t.adjacency[f] else { continue };
            if !seen.insert(adj.cell) {
                continue;
            }
            let neighbor = mesh.try_cell(adj.cell).ok_or_else(|| dead_cell(adj.cell))?;
            let Some(l) = neighbor.local_vertex(v) else {
                return Err(MeshError::AdjacencyMismatch {
                    cell: entry.cell.index(),
                    face: f,
                });
            };
            if ball.len() >= limit {
                return Ok(None);
            }
            ball.push(BallEntry {
                cell: adj.cell,
                local: l,
            });
        }
    }
    Ok(Some(ball))
}

/// A boundary triangle, addressed by the cell it is seen from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceTriangle<I: MeshIndex = u32> {
    /// Cell carrying the face.
    pub cell: CellId<I>,
    /// Local face index.
    pub face: usize,
}

/// Volume ball and surface fan around a boundary vertex.
#[derive(Debug, Clone)]
pub struct SurfaceBall<I: MeshIndex = u32> {
    /// The center vertex.
    pub vertex: VertexId<I>,
    /// Every cell around the vertex.
    pub volume: Vec<BallEntry<I>>,
    /// Boundary triangles around the vertex, each seen from its oriented side.
    pub surface: Vec<SurfaceTriangle<I>>,
}

impl<I: MeshIndex> SurfaceBall<I> {
    /// Vertices of the surface triangles, outward oriented.
    pub fn triangles<'a>(&'a self, mesh: &'a TetMesh<I>) -> impl Iterator<Item = [VertexId<I>; 3]> + 'a {
        self.surface
            .iter()
            .map(move |t| mesh.cell(t.cell).face_vertices(t.face))
    }

    /// Distinct vertices joined to the center by a surface edge.
    pub fn surface_neighbors(&self, mesh: &TetMesh<I>) -> Vec<VertexId<I>> {
        let mut out: Vec<VertexId<I>> = Vec::new();
        for tri in self.triangles(mesh) {
            for v in tri {
                if v != self.vertex && !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }
}

/// Outcome of [`surface_ball`].
#[derive(Debug, Clone)]
pub enum SurfaceBallQuery<I: MeshIndex = u32> {
    /// The vertex has a well-formed surface fan.
    Found(SurfaceBall<I>),
    /// No boundary face touches the vertex.
    NoBoundaryFace,
    /// The surface fan is not a single closed loop and the caller did not
    /// ask for a non-manifold vertex.
    NonManifold,
    /// The volume ball has more than [`BALL_LIMIT`] cells.
    TooLarge,
}

/// Volume ball plus surface fan of vertex `local` of `cell`.
///
/// A face counts as surface when it is tagged as boundary and is either on
/// the hull or carries the orientation bit, so that an interface between two
/// cells is listed once. With `non_manifold == false` the fan must be a
/// closed loop: every surface neighbor of the vertex is shared by exactly
/// two triangles.
pub fn surface_ball<I: MeshIndex>(
    mesh: &TetMesh<I>,
    cell: CellId<I>,
    local: usize,
    non_manifold: bool,
) -> Result<SurfaceBallQuery<I>> {
    let Some(volume) = volume_ball(mesh, cell, local)? else {
        return Ok(SurfaceBallQuery::TooLarge);
    };
    let vertex = mesh.cell(cell).vertices[local];

    let mut surface = Vec::new();
    for entry in &volume {
        let t = mesh.cell(entry.cell);
        let Some(record) = &t.boundary else { continue };
        for f in 0..4 {
            if f == entry.local || !record.is_boundary_face(f) {
                continue;
            }
            if t.adjacency[f].is_none() || record.is_oriented(f) {
                surface.push(SurfaceTriangle {
                    cell: entry.cell,
                    face: f,
                });
            }
        }
    }

    if surface.is_empty() {
        return Ok(SurfaceBallQuery::NoBoundaryFace);
    }

    if !non_manifold {
        let mut count: HashMap<VertexId<I>, usize> = HashMap::new();
        for t in &surface {
            for v in mesh.cell(t.cell).face_vertices(t.face) {
                if v != vertex {
                    *count.entry(v).or_default() += 1;
                }
            }
        }
        if count.values().any(|&n| n != 2) {
            return Ok(SurfaceBallQuery::NonManifold);
        }
    }

    Ok(SurfaceBallQuery::Found(SurfaceBall {
        vertex,
        volume,
        surface,
    }))
}

/// The cells around an edge, in rotation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell<I: MeshIndex = u32> {
    /// The two endpoints of the edge.
    pub edge: [VertexId<I>; 2],
    /// Cells around the edge; consecutive cells share a face.
    pub cells: Vec<CellId<I>>,
    /// Ring vertices. Cell `i` spans `ring[i]` and `ring[i + 1]` (indices
    /// taken modulo the ring length for closed shells). An open shell has
    /// one more ring vertex than cells.
    pub ring: Vec<VertexId<I>>,
    /// `true` when the walk came back to its first cell.
    pub closed: bool,
    /// Boundary faces containing the edge, each from its oriented side.
    pub boundary_faces: Vec<(CellId<I>, usize)>,
}

impl<I: MeshIndex> Shell<I> {
    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` for an empty shell.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns `true` if a boundary face contains the edge.
    pub fn touches_boundary(&self) -> bool {
        !self.boundary_faces.is_empty()
    }
}

struct Walk<I: MeshIndex> {
    cells: Vec<CellId<I>>,
    ring: Vec<VertexId<I>>,
    end: Option<(CellId<I>, usize)>,
}

/// Rotate around `[a, b]` starting in `start`, entering through `entry`.
///
/// `None` once the walk passes [`BALL_LIMIT`] cells.
fn walk<I: MeshIndex>(
    mesh: &TetMesh<I>,
    start: CellId<I>,
    entry: usize,
    [a, b]: [VertexId<I>; 2],
) -> Result<Option<Walk<I>>> {
    let mut cells = Vec::new();
    let mut ring = Vec::new();
    let (mut cur, mut entry) = (start, entry);
    let mut from = (start, entry);

    loop {
        let t = mesh.try_cell(cur).ok_or_else(|| dead_cell(cur))?;
        let e = t.local_edge(a, b).ok_or(MeshError::AdjacencyMismatch {
            cell: from.0.index(),
            face: from.1,
        })?;
        let [la, lb] = EDGE_VERTICES[e];
        // faces containing the edge hold the two other locals; 6 = 0+1+2+3
        if cells.is_empty() {
            ring.push(t.vertices[6 - entry - la - lb]);
        }
        let [f0, f1] = EDGE_FACES[e];
        let exit = if f0 == entry { f1 } else { f0 };
        cells.push(cur);
        ring.push(t.vertices[6 - exit - la - lb]);
        if cells.len() > BALL_LIMIT {
            return Ok(None);
        }

        match t.adjacency[exit] {
            None => {
                return Ok(Some(Walk {
                    cells,
                    ring,
                    end: Some((cur, exit)),
                }))
            }
            Some(adj) if adj.cell == start => {
                ring.pop();
                return Ok(Some(Walk {
                    cells,
                    ring,
                    end: None,
                }));
            }
            Some(adj) => {
                from = (cur, exit);
                cur = adj.cell;
                entry = adj.face();
            }
        }
    }
}

/// The shell of local edge `local_edge` of `cell`.
///
/// Open shells are walked from one hull end to the other. Returns `Ok(None)`
/// if the shell has more than [`BALL_LIMIT`] cells. Adjacency that does not
/// carry the edge through is an error.
pub fn edge_shell<I: MeshIndex>(mesh: &TetMesh<I>, cell: CellId<I>, local_edge: usize) -> Result<Option<Shell<I>>> {
    let edge = mesh.try_cell(cell).ok_or_else(|| dead_cell(cell))?.edge_vertices(local_edge);
    let [f0, _] = EDGE_FACES[local_edge];

    let Some(first) = walk(mesh, cell, f0, edge)? else {
        return Ok(None);
    };
    let walked = match first {
        Walk { end: Some((c, f)), .. } => walk(mesh, c, f, edge)?,
        closed => Some(closed),
    };
    let Some(Walk { cells, ring, end }) = walked else {
        return Ok(None);
    };
    let closed = end.is_none();

    let mut boundary_faces = Vec::new();
    for &c in &cells {
        let t = mesh.cell(c);
        let Some(record) = &t.boundary else { continue };
        let Some(e) = t.local_edge(edge[0], edge[1]) else { continue };
        for f in EDGE_FACES[e] {
            if record.is_boundary_face(f) && (t.adjacency[f].is_none() || record.is_oriented(f)) {
                boundary_faces.push((c, f));
            }
        }
    }

    Ok(Some(Shell {
        edge,
        cells,
        ring,
        closed,
        boundary_faces,
    }))
}
