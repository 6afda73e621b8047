//! Vertex relocation.
//!
//! [`move_cell_points`] tries to move each vertex of a cell to a better
//! position. The target depends on the vertex classification:
//!
//! | Class | Move |
//! |-------|------|
//! | required, corner | never |
//! | interior | toward the ideal apex above the opposite face |
//! | surface | toward the centroid of its surface neighbors, projected back onto the surface |
//! | ridge, reference, non-manifold | along the curve of its two tagged edges |
//!
//! Every target goes through [`relocate_to`], which rejects moves that
//! invert or flatten a cell, lower the worst quality of the ball, or tilt a
//! surface triangle too far.

use nalgebra::{Point3, Vector3};
use tracing::{debug, trace};

use crate::error::{MeshError, Result};
use crate::mesh::local::{EDGE_VERTICES, FACE_EDGES, FACE_VERTICES};
use crate::mesh::{orient3d, triangle_normal, CellId, Epoch, MeshIndex, PointClass, SurfaceNormals, Tags, VertexId};

use super::ball::{surface_ball, volume_ball, BallEntry, SurfaceBall, SurfaceBallQuery};
use super::optimize::OptimizeContext;

/// Damping factors tried in turn for every target.
const DAMPING: [f64; 3] = [1.0, 0.5, 0.25];

/// Height of the regular tetrahedron with unit edges.
const REGULAR_HEIGHT: f64 = 0.816_496_580_927_726;

/// Try to move the vertices of `cell`.
///
/// Visits every (face, vertex) pair of the cell. A vertex is skipped when it
/// already carries `epoch`, when the face edge opposite to it is required,
/// or when its class forbids moving. Boundary vertices are only
/// handled from a boundary face. Moved vertices are stamped with `epoch`.
///
/// Returns `true` if at least one vertex moved.
pub fn move_cell_points<I: MeshIndex>(
    ctx: &mut OptimizeContext<'_, I>,
    cell: CellId<I>,
    epoch: Epoch,
) -> Result<bool> {
    if !ctx.mesh.is_cell_alive(cell) {
        return Err(MeshError::DeadHandle {
            what: "cell",
            index: cell.index(),
        });
    }

    let mut moved = 0usize;
    for f in 0..4 {
        for j in 0..3 {
            let t = ctx.mesh.cell(cell);
            if t.edge_tags(FACE_EDGES[f][j]).is_required() {
                continue;
            }
            let local = FACE_VERTICES[f][j];
            let v = t.vertices[local];
            let vertex = ctx.mesh.vertex(v);
            if vertex.epoch == epoch {
                continue;
            }

            let class = vertex.tags.classify();
            let on_boundary_face = t.is_boundary_face(f);
            let on_hull = t.adjacency[f].is_none();

            let done = match class {
                PointClass::Required | PointClass::Corner => false,
                PointClass::Interior => relocate_interior(ctx, cell, local)?,
                _ if !ctx.options.boundary_relocation || !on_boundary_face => false,
                PointClass::NonManifold => {
                    on_hull && relocate_on_curve(ctx, cell, local, Tags::NON_MANIFOLD, true)?
                }
                PointClass::Ridge => relocate_on_curve(ctx, cell, local, Tags::RIDGE, false)?,
                PointClass::Reference => relocate_on_curve(ctx, cell, local, Tags::REFERENCE, false)?,
                PointClass::Surface => relocate_on_surface(ctx, cell, local, f)?,
            };

            if done {
                ctx.mesh.vertex_mut(v).epoch = epoch;
                moved += 1;
            }
        }
    }
    Ok(moved > 0)
}

/// Move `vertex` to `target` if the ball stays valid and does not get worse.
///
/// `ball` lists the cells around the vertex and `surface` the boundary
/// triangles that contain it. The move is rejected if any ball cell becomes
/// non-positive, if the worst ball quality drops, or if a surface triangle
/// degenerates or turns by more than the allowed normal deviation. On
/// success the spatial index is updated and `true` is returned.
pub fn relocate_to<I: MeshIndex>(
    ctx: &mut OptimizeContext<'_, I>,
    vertex: VertexId<I>,
    ball: &[BallEntry<I>],
    surface: &[[VertexId<I>; 3]],
    target: Point3<f64>,
) -> bool {
    let old = *ctx.mesh.position(vertex);
    let scale = ball
        .iter()
        .map(|e| ctx.mesh.volume(e.cell).abs().cbrt())
        .fold(0.0, f64::max);
    if !target.coords.iter().all(|x| x.is_finite()) || (target - old).norm() <= 1e-9 * scale {
        return false;
    }

    let mut old_worst = f64::INFINITY;
    let mut new_worst = f64::INFINITY;
    for e in ball {
        let moved = ctx.positions_moved(e.cell, vertex, &target);
        let [a, b, c, d] = &moved;
        if orient3d(a, b, c, d) <= 0.0 {
            trace!(vertex = ?vertex, cell = ?e.cell, "relocation would invert a cell");
            return false;
        }
        old_worst = old_worst.min(ctx.quality(e.cell));
        new_worst = new_worst.min(ctx.metric.quality(&moved));
    }
    if new_worst < old_worst {
        trace!(vertex = ?vertex, old_worst, new_worst, "relocation lowers quality");
        return false;
    }

    for tri in surface {
        let at = |v: VertexId<I>| if v == vertex { target } else { *ctx.mesh.position(v) };
        let before = triangle_normal(ctx.mesh.position(tri[0]), ctx.mesh.position(tri[1]), ctx.mesh.position(tri[2]));
        let after = triangle_normal(&at(tri[0]), &at(tri[1]), &at(tri[2]));
        let (lb, la) = (before.norm(), after.norm());
        if la <= f64::EPSILON * lb || before.dot(&after) < ctx.options.min_normal_cos * lb * la {
            trace!(vertex = ?vertex, "relocation tilts the surface");
            return false;
        }
    }

    ctx.index.remove(vertex, &old);
    ctx.mesh.set_position(vertex, target);
    ctx.index.insert(vertex, &target);
    true
}

/// Try `target` with decreasing damping, from the current position.
fn relocate_damped<I: MeshIndex>(
    ctx: &mut OptimizeContext<'_, I>,
    vertex: VertexId<I>,
    ball: &[BallEntry<I>],
    surface: &[[VertexId<I>; 3]],
    target: Point3<f64>,
) -> bool {
    let p = *ctx.mesh.position(vertex);
    DAMPING
        .iter()
        .any(|&lambda| relocate_to(ctx, vertex, ball, surface, p + (target - p) * lambda))
}

/// Position of an apex making a regular cell over face `f` of `cell`.
fn ideal_apex<I: MeshIndex>(ctx: &OptimizeContext<'_, I>, cell: CellId<I>, f: usize) -> Option<Point3<f64>> {
    let [a, b, c] = ctx.mesh.cell(cell).face_vertices(f).map(|v| *ctx.mesh.position(v));
    let n = triangle_normal(&a, &b, &c);
    let len = n.norm();
    if len == 0.0 {
        return None;
    }
    let mean_edge = ((b - a).norm() + (c - b).norm() + (a - c).norm()) / 3.0;
    let centroid = Point3::from((a.coords + b.coords + c.coords) / 3.0);
    // the face normal points away from the opposite vertex
    Some(centroid - n * (REGULAR_HEIGHT * mean_edge / len))
}

fn relocate_interior<I: MeshIndex>(ctx: &mut OptimizeContext<'_, I>, cell: CellId<I>, local: usize) -> Result<bool> {
    let Some(ball) = volume_ball(ctx.mesh, cell, local)? else {
        return Ok(false);
    };
    let v = ctx.mesh.cell(cell).vertices[local];

    if let Some(target) = ideal_apex(ctx, cell, local) {
        if relocate_damped(ctx, v, &ball, &[], target) {
            debug!(vertex = ?v, "moved interior vertex toward the ideal apex");
            return Ok(true);
        }
    }

    let apexes: Vec<Point3<f64>> = ball
        .iter()
        .filter_map(|e| ideal_apex(ctx, e.cell, e.local))
        .collect();
    if apexes.is_empty() {
        return Ok(false);
    }
    let mean = apexes.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / apexes.len() as f64;
    if relocate_damped(ctx, v, &ball, &[], Point3::from(mean)) {
        debug!(vertex = ?v, "moved interior vertex toward the mean ideal apex");
        return Ok(true);
    }
    Ok(false)
}

/// The cell and face from which the boundary face `f` of `cell` is oriented.
///
/// Faces between two cells are oriented from one side only; when `cell`
/// sees the face from the other side, the neighbor must carry the bit.
fn directed_face<I: MeshIndex>(ctx: &OptimizeContext<'_, I>, cell: CellId<I>, f: usize) -> Option<(CellId<I>, usize)> {
    let t = ctx.mesh.cell(cell);
    let record = t.boundary?;
    match t.adjacency[f] {
        None => Some((cell, f)),
        Some(_) if record.is_oriented(f) => Some((cell, f)),
        Some(adj) => {
            let other = ctx.mesh.try_cell(adj.cell)?.boundary?;
            other.is_oriented(adj.face()).then_some((adj.cell, adj.face()))
        }
    }
}

/// Closest point to `p` on the triangle `[a, b, c]`.
fn closest_point_on_triangle(p: &Point3<f64>, [a, b, c]: &[Point3<f64>; 3]) -> Point3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && d4 - d3 >= 0.0 && d5 - d6 >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Closest point to `p` on a triangle fan.
fn project_onto_fan(p: &Point3<f64>, fan: &[[Point3<f64>; 3]]) -> Option<Point3<f64>> {
    fan.iter()
        .map(|tri| closest_point_on_triangle(p, tri))
        .min_by(|x, y| (x - p).norm_squared().total_cmp(&(y - p).norm_squared()))
}

fn fan_normal<I: MeshIndex>(ctx: &OptimizeContext<'_, I>, ball: &SurfaceBall<I>) -> Option<Vector3<f64>> {
    let n = ball.triangles(ctx.mesh).fold(Vector3::zeros(), |acc, [a, b, c]| {
        acc + triangle_normal(ctx.mesh.position(a), ctx.mesh.position(b), ctx.mesh.position(c))
    });
    let len = n.norm();
    (len > 0.0).then(|| n / len)
}

fn relocate_on_surface<I: MeshIndex>(
    ctx: &mut OptimizeContext<'_, I>,
    cell: CellId<I>,
    local: usize,
    f: usize,
) -> Result<bool> {
    // Seen from the unoriented side, the face is taken from the neighbor.
    let Some((oc, of)) = directed_face(ctx, cell, f) else {
        trace!(cell = ?cell, face = f, "surface fan has no consistent orientation");
        return Ok(false);
    };
    let SurfaceBallQuery::Found(ball) = surface_ball(ctx.mesh, cell, local, false)? else {
        return Ok(false);
    };
    let v = ball.vertex;

    let outward = ctx.mesh.face_normal(oc, of);
    let Some(fan) = fan_normal(ctx, &ball) else {
        return Ok(false);
    };
    if fan.dot(&outward) <= 0.0 {
        trace!(vertex = ?v, "surface fan disagrees with the face orientation");
        return Ok(false);
    }
    let normal = match ctx.mesh.vertex(v).normals.map(|n| n.n1) {
        Some(n) if n.dot(&outward) < 0.0 => -n,
        Some(n) => n,
        None => fan,
    };

    let neighbors = ball.surface_neighbors(ctx.mesh);
    if neighbors.is_empty() {
        return Ok(false);
    }
    let p = *ctx.mesh.position(v);
    let centroid = neighbors
        .iter()
        .fold(Vector3::zeros(), |acc, &x| acc + ctx.mesh.position(x).coords)
        / neighbors.len() as f64;
    let d = centroid - p.coords;
    let step = d - normal * d.dot(&normal);

    // Candidates are projected back onto the surface as it was before the move.
    let triangles: Vec<[VertexId<I>; 3]> = ball.triangles(ctx.mesh).collect();
    let patch: Vec<[Point3<f64>; 3]> = triangles
        .iter()
        .map(|tri| tri.map(|x| *ctx.mesh.position(x)))
        .collect();
    let moved = DAMPING.iter().any(|&lambda| {
        project_onto_fan(&(p + step * lambda), &patch)
            .map_or(false, |target| relocate_to(ctx, v, &ball.volume, &triangles, target))
    });
    if !moved {
        return Ok(false);
    }

    if let Some(n) = fan_normal(ctx, &ball) {
        let normals = ctx.mesh.vertex(v).normals;
        ctx.mesh.vertex_mut(v).normals = Some(SurfaceNormals {
            n1: n,
            n2: normals.and_then(|s| s.n2),
        });
    }
    debug!(vertex = ?v, "moved surface vertex");
    Ok(true)
}

fn relocate_on_curve<I: MeshIndex>(
    ctx: &mut OptimizeContext<'_, I>,
    cell: CellId<I>,
    local: usize,
    tag: Tags,
    non_manifold: bool,
) -> Result<bool> {
    let SurfaceBallQuery::Found(ball) = surface_ball(ctx.mesh, cell, local, non_manifold)? else {
        return Ok(false);
    };
    let v = ball.vertex;

    let mut ends: Vec<VertexId<I>> = Vec::with_capacity(2);
    for e in &ball.volume {
        let t = ctx.mesh.cell(e.cell);
        for (k, [a, b]) in EDGE_VERTICES.iter().enumerate() {
            if *a != e.local && *b != e.local {
                continue;
            }
            if !t.edge_tags(k).contains(tag) {
                continue;
            }
            let other = t.vertices[if *a == e.local { *b } else { *a }];
            if !ends.contains(&other) {
                ends.push(other);
            }
        }
    }
    let &[e0, e1] = ends.as_slice() else {
        trace!(vertex = ?v, curve_edges = ends.len(), "vertex is not on a simple curve");
        return Ok(false);
    };

    let (l0, l1) = (ctx.length(v, e0), ctx.length(v, e1));
    let (far, l_far, l_near) = if l0 >= l1 { (e0, l0, l1) } else { (e1, l1, l0) };
    if l_far <= 0.0 {
        return Ok(false);
    }
    let p = *ctx.mesh.position(v);
    let target = p + (ctx.mesh.position(far) - p) * ((l_far - l_near) / (2.0 * l_far));

    let triangles: Vec<[VertexId<I>; 3]> = ball.triangles(ctx.mesh).collect();
    if !relocate_damped(ctx, v, &ball.volume, &triangles, target) {
        return Ok(false);
    }
    debug!(vertex = ?v, curve = ?tag, "moved vertex along its curve");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::metric::IsotropicMetric;
    use crate::algo::optimize::OptimizeOptions;
    use crate::algo::spatial::{GridIndex, NoSpatialIndex};
    use crate::mesh::{build_from_tetrahedra, detect_features, shapes, TetMesh};

    fn perturbed_cube() -> (TetMesh, VertexId) {
        let (points, cells) = shapes::cube_tetrahedra(2);
        let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
        detect_features(&mut mesh, 45.0);
        let center = mesh.nearest_vertex(&Point3::new(0.5, 0.5, 0.5)).unwrap();
        mesh.set_position(center, Point3::new(0.62, 0.41, 0.55));
        (mesh, center)
    }

    #[test]
    fn test_inverting_target_is_rejected() {
        let (mut mesh, center) = perturbed_cube();
        let (cell, local) = mesh.find_cell_of_vertex(center).unwrap();
        let ball = volume_ball(&mesh, cell, local).unwrap().unwrap();
        let before = *mesh.position(center);

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(!relocate_to(&mut ctx, center, &ball, &[], Point3::new(2.0, 0.5, 0.5)));
        assert_eq!(*mesh.position(center), before);
    }

    #[test]
    fn test_interior_vertex_improves() {
        let (mut mesh, center) = perturbed_cube();
        let (cell, local) = mesh.find_cell_of_vertex(center).unwrap();
        let ball = volume_ball(&mesh, cell, local).unwrap().unwrap();
        let worst = |mesh: &TetMesh| {
            ball.iter()
                .map(|e| crate::algo::metric::shape_quality(&mesh.cell_positions(e.cell)))
                .fold(f64::INFINITY, f64::min)
        };
        let before = worst(&mesh);
        let old_position = *mesh.position(center);

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index: GridIndex = GridIndex::from_mesh(&mesh, 0.25).unwrap();
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        let moved = move_cell_points(&mut ctx, cell, Epoch(7)).unwrap();
        assert!(moved);

        assert!(worst(&mesh) >= before);
        mesh.check().unwrap();
        assert_ne!(*mesh.position(center), old_position);
        assert_eq!(mesh.vertex(center).epoch, Epoch(7));
        assert!(index.contains(center, mesh.position(center)));
        assert_eq!(index.len(), mesh.num_vertices());
    }

    #[test]
    fn test_stamped_vertex_is_skipped() {
        let (mut mesh, center) = perturbed_cube();
        let (cell, _) = mesh.find_cell_of_vertex(center).unwrap();
        mesh.vertex_mut(center).epoch = Epoch(3);
        let before = *mesh.position(center);

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default().with_boundary_relocation(false);
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(!move_cell_points(&mut ctx, cell, Epoch(3)).unwrap());
        assert_eq!(*mesh.position(center), before);
    }

    #[test]
    fn test_ridge_vertex_slides_along_ridge() {
        let (points, cells) = shapes::cube_tetrahedra(2);
        let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
        detect_features(&mut mesh, 45.0);
        let v = mesh.nearest_vertex(&Point3::new(0.5, 0.0, 0.0)).unwrap();
        mesh.set_position(v, Point3::new(0.3, 0.0, 0.0));
        assert_eq!(mesh.vertex_tags(v).classify(), PointClass::Ridge);

        let (cell, local) = mesh
            .cells()
            .find_map(|(id, t)| {
                let l = t.local_vertex(v)?;
                (0..4).find(|&f| f != l && t.is_boundary_face(f)).map(|_| (id, l))
            })
            .unwrap();

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(relocate_on_curve(&mut ctx, cell, local, Tags::RIDGE, false).unwrap());

        let p = *mesh.position(v);
        assert!(p.y.abs() < 1e-12 && p.z.abs() < 1e-12);
        assert!(p.x > 0.3 && p.x <= 0.5 + 1e-12);
        mesh.check().unwrap();
    }

    /// A cell around `v` together with the local index of `v` and a
    /// boundary face of the cell containing it.
    fn boundary_corner(mesh: &TetMesh, v: VertexId, hull: bool) -> (CellId, usize, usize) {
        mesh.cells()
            .find_map(|(id, t)| {
                let l = t.local_vertex(v)?;
                (0..4)
                    .find(|&f| f != l && t.is_boundary_face(f) && t.adjacency[f].is_none() == hull)
                    .map(|f| (id, l, f))
            })
            .unwrap()
    }

    /// Stamp every vertex but `v`, so that only `v` can move.
    fn freeze_all_but(mesh: &mut TetMesh, v: VertexId, epoch: Epoch) {
        let ids: Vec<VertexId> = mesh.vertex_ids().filter(|&x| x != v).collect();
        for x in ids {
            mesh.vertex_mut(x).epoch = epoch;
        }
    }

    /// Turn the faces of the plane `z = height` into an internal boundary,
    /// oriented from the cells above it when `oriented` is set.
    fn tag_interface(mesh: &mut TetMesh, height: f64, oriented: bool) {
        let faces: Vec<(CellId, usize, bool)> = mesh
            .cells()
            .flat_map(|(id, t)| {
                (0..4).filter_map(move |f| {
                    t.adjacency[f]?;
                    Some((id, f, t.vertices[f]))
                })
            })
            .filter(|&(id, f, apex)| {
                let t = mesh.cell(id);
                t.face_vertices(f)
                    .iter()
                    .all(|&x| (mesh.position(x).z - height).abs() < 1e-12)
                    && mesh.position(apex).z != height
            })
            .map(|(id, f, apex)| (id, f, mesh.position(apex).z > height))
            .collect();
        for (id, f, above) in faces {
            let record = mesh.cell_mut(id).boundary.get_or_insert_with(Default::default);
            record.face_tags[f] |= Tags::BOUNDARY;
            record.set_oriented(f, oriented && above);
        }
    }

    fn on_patch(p: &Point3<f64>, patch: &[[Point3<f64>; 3]]) -> bool {
        project_onto_fan(p, patch).map_or(false, |q| (q - p).norm() < 1e-9)
    }

    #[test]
    fn test_closest_point_on_triangle() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let inside = closest_point_on_triangle(&Point3::new(0.2, 0.3, 0.7), &tri);
        assert!((inside - Point3::new(0.2, 0.3, 0.0)).norm() < 1e-12);
        let corner = closest_point_on_triangle(&Point3::new(-1.0, -1.0, 0.5), &tri);
        assert_eq!(corner, tri[0]);
        let edge = closest_point_on_triangle(&Point3::new(1.0, 1.0, 0.0), &tri);
        assert!((edge - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_surface_vertex_stays_in_its_face() {
        let (points, cells) = shapes::cube_tetrahedra(2);
        let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
        detect_features(&mut mesh, 45.0);
        let v = mesh.nearest_vertex(&Point3::new(0.5, 0.5, 0.0)).unwrap();
        assert_eq!(mesh.vertex_tags(v).classify(), PointClass::Surface);
        mesh.set_position(v, Point3::new(0.35, 0.6, 0.0));
        let (cell, local, f) = boundary_corner(&mesh, v, true);

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(relocate_on_surface(&mut ctx, cell, local, f).unwrap());

        let p = *mesh.position(v);
        assert!((p - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-9);
        let n = mesh.vertex(v).normals.unwrap().n1;
        assert!((n - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-9);
        mesh.check().unwrap();
    }

    #[test]
    fn test_surface_move_keeps_curved_surface() {
        let (points, cells) = shapes::cube_tetrahedra(2);
        let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
        let v = mesh.nearest_vertex(&Point3::new(0.5, 0.5, 0.0)).unwrap();
        let start = Point3::new(0.45, 0.53, -0.1);
        mesh.set_position(v, start);
        let (cell, local, f) = boundary_corner(&mesh, v, true);

        let SurfaceBallQuery::Found(ball) = surface_ball(&mesh, cell, local, false).unwrap() else {
            panic!("expected a surface ball");
        };
        let patch: Vec<[Point3<f64>; 3]> = ball
            .triangles(&mesh)
            .map(|tri| tri.map(|x| *mesh.position(x)))
            .collect();

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(relocate_on_surface(&mut ctx, cell, local, f).unwrap());

        // A move in the tangent plane alone would keep z = -0.1 and leave
        // the dent.
        let p = *mesh.position(v);
        assert_ne!(p, start);
        assert!(p.z > start.z);
        assert!(on_patch(&p, &patch));
        mesh.check().unwrap();
    }

    #[test]
    fn test_interface_is_used_from_its_oriented_side() {
        let (points, cells) = shapes::cube_tetrahedra(2);
        let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
        let v = mesh.nearest_vertex(&Point3::new(0.5, 0.5, 0.5)).unwrap();
        tag_interface(&mut mesh, 0.5, true);
        mesh.set_vertex_tags(v, Tags::BOUNDARY);
        mesh.set_position(v, Point3::new(0.35, 0.6, 0.5));
        mesh.check().unwrap();

        // seen from below, where the orientation bit is clear
        let (cell, local, f) = mesh
            .cells()
            .find_map(|(id, t)| {
                let l = t.local_vertex(v)?;
                let f = (0..4).find(|&f| f != l && t.is_boundary_face(f))?;
                (mesh.position(t.vertices[f]).z < 0.5).then_some((id, l, f))
            })
            .unwrap();
        assert!(!mesh.cell(cell).boundary.unwrap().is_oriented(f));

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        let (oc, of) = directed_face(&ctx, cell, f).unwrap();
        assert_ne!(oc, cell);
        assert!(ctx.mesh.cell(oc).boundary.unwrap().is_oriented(of));
        assert!(relocate_on_surface(&mut ctx, cell, local, f).unwrap());

        assert!((mesh.position(v) - Point3::new(0.5, 0.5, 0.5)).norm() < 1e-9);
        mesh.check().unwrap();
    }

    #[test]
    fn test_unoriented_interface_is_skipped() {
        let (points, cells) = shapes::cube_tetrahedra(2);
        let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
        let v = mesh.nearest_vertex(&Point3::new(0.5, 0.5, 0.5)).unwrap();
        tag_interface(&mut mesh, 0.5, false);
        mesh.set_vertex_tags(v, Tags::BOUNDARY);
        mesh.set_position(v, Point3::new(0.35, 0.6, 0.5));
        let (cell, local, f) = boundary_corner(&mesh, v, false);
        let before = mesh.clone();

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(directed_face(&ctx, cell, f).is_none());
        assert!(!relocate_on_surface(&mut ctx, cell, local, f).unwrap());
        assert_eq!(mesh, before);
        mesh.check().unwrap();
    }

    /// The vertex halfway along the bottom front edge of the cube, pulled
    /// toward the origin, with its two edges tagged `tag`.
    fn tagged_edge_vertex(tag: Tags) -> (TetMesh, VertexId) {
        let (points, cells) = shapes::cube_tetrahedra(2);
        let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
        let v = mesh.nearest_vertex(&Point3::new(0.5, 0.0, 0.0)).unwrap();
        let a = mesh.nearest_vertex(&Point3::new(0.0, 0.0, 0.0)).unwrap();
        let b = mesh.nearest_vertex(&Point3::new(1.0, 0.0, 0.0)).unwrap();
        assert!(mesh.set_edge_tags(a, v, tag) > 0);
        assert!(mesh.set_edge_tags(v, b, tag) > 0);
        mesh.set_position(v, Point3::new(0.3, 0.0, 0.0));
        freeze_all_but(&mut mesh, v, Epoch(1));
        (mesh, v)
    }

    #[test]
    fn test_reference_vertex_slides_along_reference() {
        let (mut mesh, v) = tagged_edge_vertex(Tags::REFERENCE);
        assert_eq!(mesh.vertex_tags(v).classify(), PointClass::Reference);
        let (cell, _, _) = boundary_corner(&mesh, v, true);

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(move_cell_points(&mut ctx, cell, Epoch(1)).unwrap());

        let p = *mesh.position(v);
        assert!(p.y.abs() < 1e-12 && p.z.abs() < 1e-12);
        assert!(p.x > 0.3 && p.x <= 0.5 + 1e-12);
        assert_eq!(mesh.vertex(v).epoch, Epoch(1));
        mesh.check().unwrap();
    }

    #[test]
    fn test_non_manifold_vertex_moves_from_the_hull() {
        let (mut mesh, v) = tagged_edge_vertex(Tags::NON_MANIFOLD);
        assert_eq!(mesh.vertex_tags(v).classify(), PointClass::NonManifold);
        let (cell, _, _) = boundary_corner(&mesh, v, true);

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(move_cell_points(&mut ctx, cell, Epoch(1)).unwrap());

        let p = *mesh.position(v);
        assert!(p.y.abs() < 1e-12 && p.z.abs() < 1e-12);
        assert!(p.x > 0.3 && p.x <= 0.5 + 1e-12);
        mesh.check().unwrap();
    }

    #[test]
    fn test_non_manifold_vertex_off_the_hull_is_kept() {
        let (points, cells) = shapes::cube_tetrahedra(2);
        let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
        let v = mesh.nearest_vertex(&Point3::new(0.5, 0.5, 0.5)).unwrap();
        tag_interface(&mut mesh, 0.5, true);
        mesh.set_vertex_tags(v, Tags::BOUNDARY | Tags::NON_MANIFOLD);
        mesh.set_position(v, Point3::new(0.35, 0.6, 0.5));
        freeze_all_but(&mut mesh, v, Epoch(1));
        // every boundary face around the center is an interface face
        let (cell, _, _) = boundary_corner(&mesh, v, false);
        let before = mesh.clone();

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        assert!(!move_cell_points(&mut ctx, cell, Epoch(1)).unwrap());
        assert_eq!(mesh, before);
        mesh.check().unwrap();
    }

    #[test]
    fn test_corner_never_moves() {
        let (points, cells) = shapes::cube_tetrahedra(1);
        let mut mesh: TetMesh = build_from_tetrahedra(&points, &cells).unwrap();
        detect_features(&mut mesh, 45.0);
        let before = mesh.clone();

        let metric = IsotropicMetric::default();
        let options = OptimizeOptions::default();
        let mut index = NoSpatialIndex;
        let cells: Vec<CellId> = mesh.cell_ids().collect();
        let mut ctx = OptimizeContext::new(&mut mesh, &metric, &mut index, &options);
        for c in cells {
            assert!(!move_cell_points(&mut ctx, c, Epoch(1)).unwrap());
        }
        assert_eq!(mesh, before);
    }
}
