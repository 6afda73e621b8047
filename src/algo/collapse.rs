//! Edge collapse.
//!
//! An interior vertex `p` is removed by contracting one of its edges `pq`
//! onto `q`. The cells around the edge (its shell) disappear and every other
//! cell around `p` is reattached to `q`.
//!
//! A collapse is only legal when:
//!
//! 1. the edge is short in metric space
//! 2. `p` is an interior vertex and neither endpoint is required
//! 3. the link condition holds, so the contraction does not change topology
//! 4. no reattached cell inverts or loses too much quality
//! 5. no new edge at `q` is too long
//!
//! Only then is the replacement committed, atomically, through a
//! [`CavityPlan`].

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::error::{MeshError, Result};
use crate::mesh::local::{EDGE_VERTICES, VERTEX_EDGES};
use crate::mesh::{orient3d, CavityPlan, CellId, MeshIndex, PointClass, TetMesh, VertexId};

use super::ball::{volume_ball, BallEntry};
use super::optimize::OptimizeContext;

/// A legal collapse, ready to be committed by [`collapse`].
#[derive(Debug, Clone)]
pub struct CollapsePlan<I: MeshIndex = u32> {
    /// The vertex that disappears.
    pub removed: VertexId<I>,
    /// The vertex that survives.
    pub target: VertexId<I>,
    /// Number of cells around the contracted edge.
    pub shell_size: usize,
    cavity: CavityPlan<I>,
}

/// Try to remove vertex `local` of `cell` by collapsing one of its three
/// edges in the cell.
///
/// Returns the removed vertex on the first edge that collapses, `None` if
/// none does. An error means the mesh was found inconsistent.
pub fn collapse_vertex_edges<I: MeshIndex>(
    ctx: &mut OptimizeContext<'_, I>,
    cell: CellId<I>,
    local: usize,
) -> Result<Option<VertexId<I>>> {
    let t = ctx.mesh.try_cell(cell).ok_or(MeshError::DeadHandle {
        what: "cell",
        index: cell.index(),
    })?;
    let p = t.vertices[local];
    if ctx.mesh.vertex_tags(p).classify() != PointClass::Interior {
        return Ok(None);
    }

    for e in VERTEX_EDGES[local] {
        let t = ctx.mesh.cell(cell);
        let [a, b] = EDGE_VERTICES[e];
        let lq = if a == local { b } else { a };
        let q = t.vertices[lq];
        if t.edge_tags(e).is_required() || ctx.mesh.vertex_tags(q).is_required() {
            continue;
        }

        let len = ctx.length(p, q);
        if len > ctx.options.collapse_max_length {
            trace!(removed = ?p, target = ?q, len, "edge too long to collapse");
            continue;
        }

        if let Some(plan) = check_interior_collapse(ctx, cell, local, lq)? {
            return collapse(ctx, plan).map(Some);
        }
    }
    Ok(None)
}

/// Link of a vertex: the faces of its ball opposite to it, with their edges
/// and vertices.
struct Link<I: MeshIndex> {
    vertices: HashSet<VertexId<I>>,
    edges: HashSet<[VertexId<I>; 2]>,
    faces: HashSet<[VertexId<I>; 3]>,
}

impl<I: MeshIndex> Link<I> {
    fn of(mesh: &TetMesh<I>, ball: &[BallEntry<I>]) -> Self {
        let mut link = Link {
            vertices: HashSet::new(),
            edges: HashSet::new(),
            faces: HashSet::new(),
        };
        for e in ball {
            let mut face = mesh.cell(e.cell).face_vertices(e.local);
            face.sort();
            let [x, y, z] = face;
            link.vertices.extend(face);
            link.edges.extend([[x, y], [x, z], [y, z]]);
            link.faces.insert(face);
        }
        link
    }
}

/// Check whether vertex `lp` of `cell` may be collapsed onto vertex `lq`.
///
/// Returns the plan of a legal collapse, `None` for a rejected one.
pub fn check_interior_collapse<I: MeshIndex>(
    ctx: &OptimizeContext<'_, I>,
    cell: CellId<I>,
    lp: usize,
    lq: usize,
) -> Result<Option<CollapsePlan<I>>> {
    let mesh: &TetMesh<I> = ctx.mesh;
    let t = mesh.try_cell(cell).ok_or(MeshError::DeadHandle {
        what: "cell",
        index: cell.index(),
    })?;
    let (p, q) = (t.vertices[lp], t.vertices[lq]);

    let Some(ball_p) = volume_ball(mesh, cell, lp)? else {
        return Ok(None);
    };
    let Some(ball_q) = volume_ball(mesh, cell, lq)? else {
        return Ok(None);
    };

    let (shell, rest): (Vec<&BallEntry<I>>, Vec<&BallEntry<I>>) =
        ball_p.iter().partition(|e| mesh.cell(e.cell).contains(q));

    // Lk(p) and Lk(q) may only meet in Lk(pq)
    let link_p = Link::of(mesh, &ball_p);
    let link_q = Link::of(mesh, &ball_q);
    let mut edge_vertices = HashSet::new();
    let mut edge_edges = HashSet::new();
    for e in &shell {
        let mut opposite: Vec<VertexId<I>> = mesh
            .cell(e.cell)
            .vertices
            .into_iter()
            .filter(|&v| v != p && v != q)
            .collect();
        opposite.sort();
        edge_vertices.extend(opposite.iter().copied());
        edge_edges.insert([opposite[0], opposite[1]]);
    }
    let shared_vertices: HashSet<_> = link_p.vertices.intersection(&link_q.vertices).copied().collect();
    let shared_edges: HashSet<_> = link_p.edges.intersection(&link_q.edges).copied().collect();
    if shared_vertices != edge_vertices
        || shared_edges != edge_edges
        || link_p.faces.intersection(&link_q.faces).next().is_some()
    {
        trace!(removed = ?p, target = ?q, "link condition fails");
        return Ok(None);
    }

    let mut created = Vec::with_capacity(rest.len());
    for e in &rest {
        let vertices = mesh.cell(e.cell).vertices.map(|v| if v == p { q } else { v });
        let [a, b, c, d] = vertices.map(|v| *mesh.position(v));
        if orient3d(&a, &b, &c, &d) <= 0.0 {
            trace!(removed = ?p, target = ?q, "collapse would invert a cell");
            return Ok(None);
        }
        let before = ctx.quality(e.cell);
        let after = ctx.quality_of(&vertices);
        if after < ctx.options.collapse_quality_ratio * before {
            trace!(removed = ?p, target = ?q, before, after, "collapse degrades a cell");
            return Ok(None);
        }
        created.push(vertices);
    }

    for &x in link_p.vertices.difference(&link_q.vertices) {
        if x != q && ctx.length(q, x) > ctx.options.collapse_max_new_length {
            trace!(removed = ?p, target = ?q, "collapse creates a long edge");
            return Ok(None);
        }
    }

    let removed: Vec<CellId<I>> = ball_p.iter().map(|e| e.cell).collect();
    let Some(cavity) = mesh.plan_cavity(&removed, &created, Some((p, q)), &[])? else {
        return Ok(None);
    };

    Ok(Some(CollapsePlan {
        removed: p,
        target: q,
        shell_size: shell.len(),
        cavity,
    }))
}

/// Commit a collapse and return the removed vertex.
pub fn collapse<I: MeshIndex>(ctx: &mut OptimizeContext<'_, I>, plan: CollapsePlan<I>) -> Result<VertexId<I>> {
    let CollapsePlan {
        removed,
        target,
        shell_size,
        cavity,
    } = plan;
    let position = *ctx.mesh.position(removed);

    ctx.mesh.apply_cavity(cavity)?;
    ctx.mesh.remove_vertex(removed)?;
    ctx.index.remove(removed, &position);

    debug!(removed = ?removed, target = ?target, shell_size, "collapsed edge");
    Ok(removed)
}
