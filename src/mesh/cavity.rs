//! Atomic replacement of a group of cells.
//!
//! Collapse and swap both remove a set of cells (the cavity) and fill the
//! same region with new cells. [`TetMesh::plan_cavity`] does all the work that
//! can fail: it reads the cavity boundary, matches every face of the new
//! cells against it and carries boundary tags over. The returned
//! [`CavityPlan`] is then applied by [`TetMesh::apply_cavity`], which only
//! writes. A rejected plan leaves the store untouched.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use super::index::{CellId, MeshIndex, VertexId};
use super::local::{EDGE_VERTICES, FACE_EDGES};
use super::tags::Tags;
use super::tetmesh::{orient3d, Adjacent, BoundaryRecord, TetMesh, Tetra};
use crate::error::{MeshError, Result};

type FaceKey<I> = [VertexId<I>; 3];
type EdgeKey<I> = [VertexId<I>; 2];

fn face_key<I: MeshIndex>(mut f: [VertexId<I>; 3]) -> FaceKey<I> {
    f.sort();
    f
}

fn edge_key<I: MeshIndex>(a: VertexId<I>, b: VertexId<I>) -> EdgeKey<I> {
    if a < b {
        [a, b]
    } else {
        [b, a]
    }
}

/// A face on the border of the cavity, seen from the removed cell.
#[derive(Debug, Clone, Copy)]
struct OuterFace<I: MeshIndex> {
    neighbor: Option<Adjacent<I>>,
    tags: Tags,
    oriented: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link<I: MeshIndex> {
    Created { index: usize, face: usize },
    Outer(Adjacent<I>),
    Hull,
}

#[derive(Debug, Clone)]
struct PlannedCell<I: MeshIndex> {
    vertices: [VertexId<I>; 4],
    links: [Link<I>; 4],
    boundary: Option<BoundaryRecord>,
}

/// A validated cell replacement, ready to be applied.
#[derive(Debug, Clone)]
pub struct CavityPlan<I: MeshIndex = u32> {
    removed: Vec<CellId<I>>,
    created: Vec<PlannedCell<I>>,
    glued: Vec<(Adjacent<I>, Adjacent<I>)>,
}

impl<I: MeshIndex> CavityPlan<I> {
    /// Cells that will be removed.
    pub fn removed(&self) -> &[CellId<I>] {
        &self.removed
    }

    /// Number of cells that will be created.
    pub fn num_created(&self) -> usize {
        self.created.len()
    }

    /// Vertices of the cells that will be created.
    pub fn created_cells(&self) -> impl Iterator<Item = [VertexId<I>; 4]> + '_ {
        self.created.iter().map(|c| c.vertices)
    }
}

/// A boundary face introduced by a re-triangulation of the surface.
#[derive(Debug, Clone, Copy)]
pub struct FreshFace<I: MeshIndex = u32> {
    /// The face vertices (any order).
    pub vertices: [VertexId<I>; 3],
    /// Tags of the new face.
    pub tags: Tags,
}

impl<I: MeshIndex> TetMesh<I> {
    /// Plan the replacement of `removed` by cells with the given vertices.
    ///
    /// `merge = Some((from, into))` renames `from` to `into` on the cavity
    /// border, which is how a collapse glues the faces of the contracted cells.
    /// `fresh` lists boundary faces that the new cells introduce on the
    /// surface. The old hull faces they replace disappear; those must have
    /// all their vertices on the fresh faces, any other lost hull face is
    /// an error.
    ///
    /// Returns `Ok(None)` if the replacement is not a valid filling of the
    /// cavity (inverted cell, non-manifold face, lost boundary) and `Err` if
    /// the current mesh is inconsistent around the cavity.
    pub fn plan_cavity(
        &self,
        removed: &[CellId<I>],
        created: &[[VertexId<I>; 4]],
        merge: Option<(VertexId<I>, VertexId<I>)>,
        fresh: &[FreshFace<I>],
    ) -> Result<Option<CavityPlan<I>>> {
        let rename = |v: VertexId<I>| match merge {
            Some((from, into)) if v == from => into,
            _ => v,
        };
        let in_cavity: HashSet<CellId<I>> = removed.iter().copied().collect();

        let mut outer: HashMap<FaceKey<I>, Vec<OuterFace<I>>> = HashMap::new();
        let mut edge_tags: HashMap<EdgeKey<I>, Tags> = HashMap::new();

        for &c in removed {
            let cell = self.try_cell(c).ok_or(MeshError::DeadHandle {
                what: "cell",
                index: c.index(),
            })?;

            if let Some(record) = &cell.boundary {
                for e in 0..6 {
                    let [a, b] = cell.edge_vertices(e);
                    let (a, b) = (rename(a), rename(b));
                    if a != b && !record.edge_tags[e].is_empty() {
                        *edge_tags.entry(edge_key(a, b)).or_default() |= record.edge_tags[e];
                    }
                }
            }

            for f in 0..4 {
                let adj = cell.adjacency[f];
                if let Some(adj) = adj {
                    let back = self
                        .try_cell(adj.cell)
                        .and_then(|n| n.adjacency[adj.face()]);
                    if back != Some(Adjacent::new(c, f)) {
                        return Err(MeshError::AdjacencyMismatch {
                            cell: c.index(),
                            face: f,
                        });
                    }
                    if in_cavity.contains(&adj.cell) {
                        continue;
                    }
                }

                let face = cell.face_vertices(f).map(rename);
                if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                    if adj.is_some() {
                        return Err(MeshError::InvalidState(format!(
                            "face {f} of cell {c:?} collapses but its neighbor is outside the cavity"
                        )));
                    }
                    trace!(cell = ?c, face = f, "cavity would erase a boundary face");
                    return Ok(None);
                }

                let tags = cell.face_tags(f);
                let oriented = cell.boundary.map_or(false, |r| r.is_oriented(f));
                outer.entry(face_key(face)).or_default().push(OuterFace {
                    neighbor: adj,
                    tags,
                    oriented,
                });
            }
        }

        let mut inner: HashMap<FaceKey<I>, Vec<(usize, usize)>> = HashMap::new();
        for (index, cell) in created.iter().enumerate() {
            let t = Tetra::new(*cell);
            for f in 0..4 {
                let face = t.face_vertices(f);
                if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                    return Err(MeshError::InvalidState(format!(
                        "replacement cell {cell:?} repeats a vertex"
                    )));
                }
                inner.entry(face_key(face)).or_default().push((index, f));
            }

            let [a, b, c, d] = cell.map(|v| *self.position(v));
            if orient3d(&a, &b, &c, &d) <= 0.0 {
                trace!(cell = ?cell, "replacement cell is not positively oriented");
                return Ok(None);
            }
        }

        let fresh: HashMap<FaceKey<I>, Tags> = fresh
            .iter()
            .map(|f| (face_key(f.vertices), f.tags | Tags::BOUNDARY))
            .collect();
        let patch: HashSet<VertexId<I>> = fresh.keys().flatten().copied().collect();

        let mut planned: Vec<PlannedCell<I>> = created
            .iter()
            .map(|&vertices| PlannedCell {
                vertices,
                links: [Link::Hull; 4],
                boundary: None,
            })
            .collect();
        let mut face_info: Vec<[(Tags, bool); 4]> = vec![[(Tags::empty(), false); 4]; created.len()];
        let mut glued = Vec::new();

        for (key, news) in &inner {
            let olds = outer.get(key).map(Vec::as_slice).unwrap_or(&[]);
            match (news.as_slice(), olds) {
                (&[(i, f), (j, g)], []) => {
                    planned[i].links[f] = Link::Created { index: j, face: g };
                    planned[j].links[g] = Link::Created { index: i, face: f };
                }
                (&[(i, f)], [old]) => {
                    if old.neighbor.is_none() && !old.tags.is_boundary() {
                        return Err(MeshError::InvalidState(format!(
                            "hull face {key:?} is not tagged as boundary"
                        )));
                    }
                    planned[i].links[f] = match old.neighbor {
                        Some(adj) => Link::Outer(adj),
                        None => Link::Hull,
                    };
                    face_info[i][f] = (old.tags, old.oriented);
                }
                (&[(i, f)], []) => match fresh.get(key) {
                    Some(&tags) => {
                        planned[i].links[f] = Link::Hull;
                        face_info[i][f] = (tags, true);
                    }
                    None => {
                        return Err(MeshError::InvalidState(format!(
                            "face {key:?} of the replacement has no counterpart on the cavity border"
                        )));
                    }
                },
                _ => {
                    trace!(face = ?key, "replacement face is shared by too many cells");
                    return Ok(None);
                }
            }
        }

        for (key, olds) in &outer {
            if inner.contains_key(key) {
                continue;
            }
            match olds.as_slice() {
                [a, b] => match (a.neighbor, b.neighbor) {
                    (Some(x), Some(y)) if x.cell != y.cell => glued.push((x, y)),
                    _ => {
                        trace!(face = ?key, "contraction would pinch the boundary");
                        return Ok(None);
                    }
                },
                [old] if old.neighbor.is_none() && !fresh.is_empty() => {
                    // Only faces of the re-triangulated patch may disappear.
                    if !old.tags.is_boundary() || !key.iter().all(|v| patch.contains(v)) {
                        return Err(MeshError::InvalidState(format!(
                            "hull face {key:?} is dropped outside the re-triangulated surface"
                        )));
                    }
                }
                [old] if old.neighbor.is_some() => {
                    return Err(MeshError::InvalidState(format!(
                        "cavity border face {key:?} is left without a replacement"
                    )));
                }
                _ => {
                    trace!(face = ?key, "cavity border face is lost by the replacement");
                    return Ok(None);
                }
            }
        }

        for (cell, info) in planned.iter_mut().zip(&face_info) {
            if !info.iter().any(|(tags, _)| tags.is_boundary()) {
                continue;
            }
            let mut record = BoundaryRecord::default();
            for (f, &(tags, oriented)) in info.iter().enumerate() {
                record.face_tags[f] = tags;
                record.set_oriented(f, oriented && tags.is_boundary());
            }
            for (e, [a, b]) in EDGE_VERTICES.iter().enumerate() {
                let key = edge_key(cell.vertices[*a], cell.vertices[*b]);
                record.edge_tags[e] = edge_tags.get(&key).copied().unwrap_or_default();
            }
            for (f, &(tags, _)) in info.iter().enumerate() {
                if tags.is_boundary() {
                    for &e in &FACE_EDGES[f] {
                        record.edge_tags[e] |= Tags::BOUNDARY;
                    }
                }
            }
            cell.boundary = Some(record);
        }

        Ok(Some(CavityPlan {
            removed: removed.to_vec(),
            created: planned,
            glued,
        }))
    }

    /// Apply a plan produced by [`plan_cavity`](Self::plan_cavity).
    ///
    /// Returns the handles of the created cells, in plan order. An error
    /// means the mesh changed between planning and applying.
    pub fn apply_cavity(&mut self, plan: CavityPlan<I>) -> Result<Vec<CellId<I>>> {
        for &c in &plan.removed {
            if !self.is_cell_alive(c) {
                return Err(MeshError::DeadHandle {
                    what: "cell",
                    index: c.index(),
                });
            }
        }
        for &c in &plan.removed {
            self.remove_cell(c)?;
        }

        let ids: Vec<CellId<I>> = plan
            .created
            .iter()
            .map(|p| {
                let mut cell = Tetra::new(p.vertices);
                cell.boundary = p.boundary;
                self.insert_cell(cell)
            })
            .collect();

        for (i, p) in plan.created.iter().enumerate() {
            for f in 0..4 {
                let adj = match p.links[f] {
                    Link::Created { index, face } => Some(Adjacent::new(ids[index], face)),
                    Link::Outer(outer) => {
                        if !self.is_cell_alive(outer.cell) {
                            return Err(MeshError::DeadHandle {
                                what: "cell",
                                index: outer.cell.index(),
                            });
                        }
                        self.cell_mut(outer.cell).adjacency[outer.face()] =
                            Some(Adjacent::new(ids[i], f));
                        Some(outer)
                    }
                    Link::Hull => None,
                };
                self.cell_mut(ids[i]).adjacency[f] = adj;
            }
        }

        for (x, y) in plan.glued {
            self.cell_mut(x.cell).adjacency[x.face()] = Some(y);
            self.cell_mut(y.cell).adjacency[y.face()] = Some(x);
        }

        Ok(ids)
    }
}
