//! Local numbering of the vertices, edges and faces of a tetrahedron.
//!
//! Face `i` is the face opposite vertex `i`. Its vertices are listed so that
//! the face normal points out of a positively oriented cell. Edge `e` and edge
//! `5 - e` are opposite (share no vertex).

/// Vertices of each face, outward oriented.
pub const FACE_VERTICES: [[usize; 3]; 4] = [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

/// Endpoints of each edge.
pub const EDGE_VERTICES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];

/// Edges of each face; entry `j` is the edge opposite face-local vertex `j`.
pub const FACE_EDGES: [[usize; 3]; 4] = [[5, 4, 3], [5, 1, 2], [4, 2, 0], [3, 0, 1]];

/// Edges incident to each vertex.
pub const VERTEX_EDGES: [[usize; 3]; 4] = [[0, 1, 2], [0, 3, 4], [1, 3, 5], [2, 4, 5]];

/// The two faces containing each edge.
pub const EDGE_FACES: [[usize; 2]; 6] = [[2, 3], [1, 3], [1, 2], [0, 3], [0, 2], [0, 1]];

/// Local index of the edge joining local vertices `a` and `b`.
///
/// # Panics
/// Panics if `a == b` or either index is out of range.
pub fn edge_between(a: usize, b: usize) -> usize {
    let (a, b) = if a < b { (a, b) } else { (b, a) };
    EDGE_VERTICES
        .iter()
        .position(|e| e[0] == a && e[1] == b)
        .unwrap_or_else(|| panic!("no edge between local vertices {a} and {b}"))
}

/// Returns `true` if local vertex `v` belongs to face `f`.
#[inline]
pub fn face_contains(f: usize, v: usize) -> bool {
    f != v
}

/// Local index of edge `e` within face `f`, if the face contains it.
pub fn edge_in_face(f: usize, e: usize) -> Option<usize> {
    FACE_EDGES[f].iter().position(|&x| x == e)
}
