//! Structured tetrahedral meshes for tests and benchmarks.

use nalgebra::Point3;

/// Cell-vertex lists of the unit cube split into `n^3` sub-cubes.
///
/// Each sub-cube is cut into six tetrahedra around its main diagonal, which
/// makes the split conforming across neighboring sub-cubes. Some cells come
/// out negatively oriented; [`build_from_tetrahedra`](super::build_from_tetrahedra)
/// fixes that.
///
/// # Panics
/// Panics if `n == 0`.
pub fn cube_tetrahedra(n: usize) -> (Vec<Point3<f64>>, Vec<[usize; 4]>) {
    assert!(n > 0, "cube needs at least one subdivision");

    let side = n + 1;
    let index = |i: usize, j: usize, k: usize| i + side * (j + side * k);
    let h = 1.0 / n as f64;

    let mut points = Vec::with_capacity(side * side * side);
    for k in 0..side {
        for j in 0..side {
            for i in 0..side {
                points.push(Point3::new(i as f64 * h, j as f64 * h, k as f64 * h));
            }
        }
    }

    const AXIS_ORDERS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    let mut cells = Vec::with_capacity(6 * n * n * n);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                for order in &AXIS_ORDERS {
                    let mut corner = [i, j, k];
                    let mut tet = [index(i, j, k); 4];
                    for (step, &axis) in order.iter().enumerate() {
                        corner[axis] += 1;
                        tet[step + 1] = index(corner[0], corner[1], corner[2]);
                    }
                    cells.push(tet);
                }
            }
        }
    }

    (points, cells)
}

/// A single tetrahedron split at an interior point into four cells.
///
/// The outer corners are `(0,0,0)`, `(s,0,0)`, `(0,s,0)` and `(0,0,s)`; the
/// last point is `center`.
pub fn star_tetrahedra(size: f64, center: Point3<f64>) -> (Vec<Point3<f64>>, Vec<[usize; 4]>) {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(size, 0.0, 0.0),
        Point3::new(0.0, size, 0.0),
        Point3::new(0.0, 0.0, size),
        center,
    ];
    let cells = vec![[4, 1, 2, 3], [0, 4, 2, 3], [0, 1, 4, 3], [0, 1, 2, 4]];
    (points, cells)
}
