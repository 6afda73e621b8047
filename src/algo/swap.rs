//! Edge swaps.
//!
//! A swap removes an edge `ab` by re-triangulating its shell around one of
//! the ring vertices, the apex. Every old cell `(a, b, r_i, r_i+1)` that does
//! not touch the apex is split into `(a, apex, r_i, r_i+1)` and
//! `(apex, b, r_i, r_i+1)`; the cells that touch it simply disappear.
//!
//! An internal swap turns a closed shell of `n` cells into `2(n - 2)` cells.
//! A boundary swap turns an open shell of `n` cells into `2(n - 1)` and flips
//! the two boundary triangles around the edge into `(a, r_0, r_n)` and
//! `(b, r_0, r_n)`.
//!
//! Either swap is applied only if it raises the worst quality of the shell
//! by the `swap_gain` factor.

use std::collections::HashSet;

use nalgebra::Vector3;
use tracing::{debug, trace};

use crate::error::{MeshError, Result};
use crate::mesh::local::edge_in_face;
use crate::mesh::{orient3d, triangle_normal, CellId, FreshFace, MeshIndex, Tags, TetMesh, VertexId};

use super::ball::{edge_shell, volume_ball, Shell};
use super::optimize::OptimizeContext;

/// A re-triangulation of a shell around one apex.
struct Candidate<I: MeshIndex> {
    apex: VertexId<I>,
    cells: Vec<[VertexId<I>; 4]>,
    worst: f64,
}

fn dead_cell<I: MeshIndex>(c: CellId<I>) -> MeshError {
    MeshError::DeadHandle {
        what: "cell",
        index: c.index(),
    }
}

/// Union of the tags of the shell edge over all cells that record it.
fn shell_edge_tags<I: MeshIndex>(mesh: &TetMesh<I>, shell: &Shell<I>) -> Tags {
    let [a, b] = shell.edge;
    shell
        .cells
        .iter()
        .fold(Tags::empty(), |acc, &c| acc | mesh.edge_tags(c, a, b))
}

fn worst_quality<I: MeshIndex>(ctx: &OptimizeContext<'_, I>, shell: &Shell<I>) -> f64 {
    shell
        .cells
        .iter()
        .map(|&c| ctx.quality(c))
        .fold(f64::INFINITY, f64::min)
}

/// Split the shell cells onto `apex`. `None` if a new cell would not be
/// positively oriented.
fn split_onto<I: MeshIndex>(ctx: &OptimizeContext<'_, I>, shell: &Shell<I>, apex: VertexId<I>) -> Option<Candidate<I>> {
    let [a, b] = shell.edge;
    let mut cells = Vec::with_capacity(2 * shell.len());
    let mut worst = f64::INFINITY;

    for &c in &shell.cells {
        let old = ctx.mesh.cell(c).vertices;
        if old.contains(&apex) {
            continue;
        }
        for from in [b, a] {
            let new = old.map(|v| if v == from { apex } else { v });
            let [p0, p1, p2, p3] = new.map(|v| *ctx.mesh.position(v));
            if orient3d(&p0, &p1, &p2, &p3) <= 0.0 {
                return None;
            }
            worst = worst.min(ctx.quality_of(&new));
            cells.push(new);
        }
    }
    Some(Candidate { apex, cells, worst })
}

/// Returns `true` if `apex` is already joined by an edge to a ring vertex it
/// does not share a shell cell with. Splitting onto it would duplicate that
/// edge.
fn duplicates_edge<I: MeshIndex>(mesh: &TetMesh<I>, shell: &Shell<I>, apex: VertexId<I>) -> Result<bool> {
    let Some((cell, local)) = shell
        .cells
        .iter()
        .find_map(|&c| mesh.cell(c).local_vertex(apex).map(|l| (c, l)))
    else {
        return Err(MeshError::InvalidState(format!(
            "ring vertex {apex:?} is not in its shell"
        )));
    };
    let Some(ball) = volume_ball(mesh, cell, local)? else {
        return Ok(true);
    };

    let linked: HashSet<VertexId<I>> = ball
        .iter()
        .flat_map(|e| mesh.cell(e.cell).vertices)
        .collect();
    let in_shell: HashSet<VertexId<I>> = shell
        .cells
        .iter()
        .map(|&c| mesh.cell(c).vertices)
        .filter(|vs| vs.contains(&apex))
        .flatten()
        .collect();

    Ok(shell
        .ring
        .iter()
        .any(|v| linked.contains(v) && !in_shell.contains(v)))
}

/// Outward unit normal of the new boundary triangle `tri`, oriented by the
/// candidate cell that contains it. `None` for a degenerate triangle.
fn fresh_normal<I: MeshIndex>(
    mesh: &TetMesh<I>,
    cells: &[[VertexId<I>; 4]],
    tri: [VertexId<I>; 3],
) -> Option<Vector3<f64>> {
    let cell = cells.iter().find(|c| tri.iter().all(|v| c.contains(v)))?;
    let inner = cell.iter().find(|v| !tri.contains(v))?;
    let [x, y, z] = tri.map(|v| *mesh.position(v));
    let n = triangle_normal(&x, &y, &z).try_normalize(f64::EPSILON)?;
    if n.dot(&(mesh.position(*inner) - x)) > 0.0 {
        Some(-n)
    } else {
        Some(n)
    }
}

fn commit<I: MeshIndex>(
    ctx: &mut OptimizeContext<'_, I>,
    shell: &Shell<I>,
    best: Candidate<I>,
    fresh: &[FreshFace<I>],
) -> Result<bool> {
    let Some(plan) = ctx.mesh.plan_cavity(&shell.cells, &best.cells, None, fresh)? else {
        return Ok(false);
    };
    ctx.mesh.apply_cavity(plan)?;
    debug!(
        edge = ?shell.edge,
        apex = ?best.apex,
        removed = shell.len(),
        created = best.cells.len(),
        "swapped edge"
    );
    Ok(true)
}

/// Swap local edge `local_edge` of `cell` if it is an interior edge.
///
/// The edge must carry no tags and its shell must be closed with at least
/// three cells. Every ring vertex is tried as apex and the best one is kept.
pub fn swap_internal_edge<I: MeshIndex>(
    ctx: &mut OptimizeContext<'_, I>,
    cell: CellId<I>,
    local_edge: usize,
) -> Result<bool> {
    if !ctx.mesh.try_cell(cell).ok_or_else(|| dead_cell(cell))?.edge_tags(local_edge).is_empty() {
        return Ok(false);
    }
    let Some(shell) = edge_shell(ctx.mesh, cell, local_edge)? else {
        trace!(cell = ?cell, local_edge, "shell too large to swap");
        return Ok(false);
    };
    if !shell.closed || shell.touches_boundary() || shell.len() < 3 {
        return Ok(false);
    }
    if !shell_edge_tags(ctx.mesh, &shell).is_empty() {
        return Ok(false);
    }

    let old = worst_quality(ctx, &shell);
    let mut best: Option<Candidate<I>> = None;
    for &apex in &shell.ring {
        if duplicates_edge(ctx.mesh, &shell, apex)? {
            continue;
        }
        let Some(candidate) = split_onto(ctx, &shell, apex) else {
            continue;
        };
        if best.as_ref().map_or(true, |b| candidate.worst > b.worst) {
            best = Some(candidate);
        }
    }

    match best {
        Some(best) if best.worst > ctx.options.swap_gain * old => commit(ctx, &shell, best, &[]),
        _ => {
            trace!(edge = ?shell.edge, old, "no internal swap improves the shell");
            Ok(false)
        }
    }
}

/// Swap local edge `local_edge` of boundary face `face` of `cell`.
///
/// The edge must lie on exactly two boundary triangles that are close to
/// coplanar, and must not be a feature, required or non-manifold edge. The
/// two triangles are replaced by the other diagonal of their quadrilateral,
/// which must not already exist, and whose triangles must keep the surface
/// orientation within `min_normal_cos`.
pub fn swap_boundary_edge<I: MeshIndex>(
    ctx: &mut OptimizeContext<'_, I>,
    cell: CellId<I>,
    face: usize,
    local_edge: usize,
) -> Result<bool> {
    let t = ctx.mesh.try_cell(cell).ok_or_else(|| dead_cell(cell))?;
    if !t.is_boundary_face(face) || edge_in_face(face, local_edge).is_none() {
        return Ok(false);
    }

    let Some(shell) = edge_shell(ctx.mesh, cell, local_edge)? else {
        trace!(cell = ?cell, local_edge, "shell too large to swap");
        return Ok(false);
    };
    if shell.closed || shell.len() < 2 || shell.boundary_faces.len() != 2 {
        return Ok(false);
    }
    if shell_edge_tags(ctx.mesh, &shell).blocks_swap() {
        return Ok(false);
    }

    let cos = ctx.options.min_normal_cos;
    let mut normals = [Vector3::zeros(); 2];
    let mut tags = Tags::empty();
    for (slot, &(c, f)) in normals.iter_mut().zip(&shell.boundary_faces) {
        let Some(n) = ctx.mesh.face_normal(c, f).try_normalize(f64::EPSILON) else {
            return Ok(false);
        };
        *slot = n;
        tags |= ctx.mesh.cell(c).face_tags(f);
    }
    if normals[0].dot(&normals[1]) < cos {
        trace!(edge = ?shell.edge, "boundary triangles are not coplanar enough");
        return Ok(false);
    }

    let [a, b] = shell.edge;
    let (first, last) = (shell.ring[0], shell.ring[shell.len()]);
    let fresh = [[a, first, last], [b, first, last]];

    let old = worst_quality(ctx, &shell);
    let mut best: Option<Candidate<I>> = None;
    for apex in [first, last] {
        if duplicates_edge(ctx.mesh, &shell, apex)? {
            continue;
        }
        let Some(candidate) = split_onto(ctx, &shell, apex) else {
            continue;
        };
        let keeps_orientation = fresh.iter().all(|&tri| {
            fresh_normal(ctx.mesh, &candidate.cells, tri)
                .map_or(false, |n| normals.iter().all(|old| n.dot(old) >= cos))
        });
        if !keeps_orientation {
            continue;
        }
        if best.as_ref().map_or(true, |b| candidate.worst > b.worst) {
            best = Some(candidate);
        }
    }

    match best {
        Some(best) if best.worst > ctx.options.swap_gain * old => {
            let fresh = fresh.map(|vertices| FreshFace { vertices, tags });
            commit(ctx, &shell, best, &fresh)
        }
        _ => {
            trace!(edge = ?shell.edge, old, "no boundary swap improves the shell");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::metric::IsotropicMetric;
    use crate::algo::optimize::OptimizeOptions;
    use crate::algo::spatial::NoSpatialIndex;
    use crate::mesh::build_from_tetrahedra;
    use nalgebra::Point3;
    use std::f64::consts::TAU;

    /// Three cells around the long edge (0, 1).
    fn three_cell_shell() -> TetMesh {
        let mut points = vec![Point3::new(0.0, 0.0, -2.0), Point3::new(0.0, 0.0, 2.0)];
        for i in 0..3 {
            let theta = TAU * i as f64 / 3.0;
            points.push(Point3::new(theta.cos(), theta.sin(), 0.0));
        }
        build_from_tetrahedra(&points, &[[0, 1, 2, 3], [0, 1, 3, 4], [0, 1, 4, 2]]).unwrap()
    }

    /// Two cells around the boundary edge (0, 1), whose two bottom triangles
    /// form a flat quadrilateral with a poor diagonal.
    fn flat_pair() -> TetMesh {
        let points = [
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, -0.4, 0.0),
            Point3::new(0.0, 0.0, 0.6),
            Point3::new(0.0, 0.4, 0.0),
        ];
        build_from_tetrahedra(&points, &[[0, 1, 2, 3], [0, 1, 3, 4]]).unwrap()
    }

    fn edge_location(mesh: &TetMesh, a: VertexId, b: VertexId) -> (CellId, usize) {
        mesh.cells()
            .find_map(|(id, t)| t.local_edge(a, b).map(|e| (id, e)))
            .unwrap()
    }

    fn has_edge(mesh: &TetMesh, a: VertexId, b: VertexId) -> bool {
        mesh.cells().any(|(_, t)| t.contains(a) && t.contains(b))
    }

    #[test]
    fn test_internal_three_to_two() {
        let mut mesh = three_cell_shell();
        let (a, b) = (VertexId::new(0), VertexId::new(1));
        let (cell, e) = edge_location(&mesh, a, b);

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        let before = ctx.mesh.cell_ids().map(|c| ctx.quality(c)).fold(f64::INFINITY, f64::min);
        assert!(swap_internal_edge(&mut ctx, cell, e).unwrap());
        let after = ctx.mesh.cell_ids().map(|c| ctx.quality(c)).fold(f64::INFINITY, f64::min);
        assert!(after > before);

        assert_eq!(mesh.num_cells(), 2);
        assert_eq!(mesh.num_vertices(), 5);
        assert!(!has_edge(&mesh, a, b));
        mesh.check().unwrap();
    }

    #[test]
    fn test_internal_swap_needs_gain() {
        let mut mesh = three_cell_shell();
        let before = mesh.clone();
        let (cell, e) = edge_location(&mesh, VertexId::new(0), VertexId::new(1));

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default().with_swap_gain(10.0);
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(!swap_internal_edge(&mut ctx, cell, e).unwrap());
        assert_eq!(mesh, before);
    }

    #[test]
    fn test_boundary_edge_is_not_swapped_internally() {
        let mut mesh = flat_pair();
        let (cell, e) = edge_location(&mesh, VertexId::new(0), VertexId::new(1));

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(!swap_internal_edge(&mut ctx, cell, e).unwrap());
    }

    #[test]
    fn test_boundary_swap_flips_diagonal() {
        let mut mesh = flat_pair();
        let (a, b) = (VertexId::new(0), VertexId::new(1));
        let (p0, top, p2) = (VertexId::new(2), VertexId::new(3), VertexId::new(4));
        let (cell, e) = edge_location(&mesh, a, b);
        // the bottom face of the cell: the one opposite the top vertex
        let face = mesh.cell(cell).local_vertex(top).unwrap();

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(swap_boundary_edge(&mut ctx, cell, face, e).unwrap());

        assert_eq!(mesh.num_cells(), 2);
        assert_eq!(mesh.num_vertices(), 5);
        assert!(!has_edge(&mesh, a, b));
        assert!(has_edge(&mesh, p0, p2));
        mesh.check().unwrap();

        // the new diagonal lies on the boundary
        let (c, _) = edge_location(&mesh, p0, p2);
        assert!(mesh.edge_tags(c, p0, p2).is_boundary());
    }

    #[test]
    fn test_ridge_edge_is_not_swapped() {
        let mut mesh = flat_pair();
        let (a, b) = (VertexId::new(0), VertexId::new(1));
        assert_eq!(mesh.set_edge_tags(a, b, Tags::RIDGE), 2);
        let before = mesh.clone();
        let (cell, e) = edge_location(&mesh, a, b);
        let face = mesh.cell(cell).local_vertex(VertexId::new(3)).unwrap();

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(!swap_boundary_edge(&mut ctx, cell, face, e).unwrap());
        assert_eq!(mesh, before);
    }

    #[test]
    fn test_interior_face_is_rejected() {
        let mut mesh = flat_pair();
        let (a, b) = (VertexId::new(0), VertexId::new(1));
        let (cell, e) = edge_location(&mesh, a, b);
        // the face shared by the two cells contains (a, b) but is not boundary
        let t = mesh.cell(cell);
        let other = [VertexId::new(2), VertexId::new(4)]
            .into_iter()
            .find(|&v| t.contains(v))
            .unwrap();
        let face = t.local_vertex(other).unwrap();

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(!swap_boundary_edge(&mut ctx, cell, face, e).unwrap());
    }
}
