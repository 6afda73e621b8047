//! Spatial index collaborator.
//!
//! The operators never query the spatial index; they only keep it in sync:
//! a relocated vertex is removed at its old position and inserted at the new
//! one, a collapsed vertex is removed. [`NoSpatialIndex`] ignores the
//! notifications and [`GridIndex`] is a uniform bucket grid.

use std::collections::HashMap;

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::mesh::{MeshIndex, TetMesh, VertexId};

/// Notifications sent to the spatial index when vertices move or disappear.
pub trait SpatialIndex<I: MeshIndex> {
    /// Forget vertex `v`, currently stored at `position`.
    fn remove(&mut self, v: VertexId<I>, position: &Point3<f64>);

    /// Record vertex `v` at `position`.
    fn insert(&mut self, v: VertexId<I>, position: &Point3<f64>);
}

/// A spatial index that ignores all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpatialIndex;

impl<I: MeshIndex> SpatialIndex<I> for NoSpatialIndex {
    #[inline]
    fn remove(&mut self, _v: VertexId<I>, _position: &Point3<f64>) {}

    #[inline]
    fn insert(&mut self, _v: VertexId<I>, _position: &Point3<f64>) {}
}

/// Uniform grid of buckets keyed by integer cell coordinates.
#[derive(Debug, Clone)]
pub struct GridIndex<I: MeshIndex = u32> {
    spacing: f64,
    buckets: HashMap<[i64; 3], Vec<VertexId<I>>>,
    len: usize,
}

impl<I: MeshIndex> GridIndex<I> {
    /// Create an empty grid with the given bucket size.
    pub fn new(spacing: f64) -> Result<Self> {
        if !(spacing > 0.0 && spacing.is_finite()) {
            return Err(MeshError::invalid_param("spacing", spacing, "must be positive and finite"));
        }
        Ok(Self {
            spacing,
            buckets: HashMap::new(),
            len: 0,
        })
    }

    /// Build a grid holding every live vertex of a mesh.
    pub fn from_mesh(mesh: &TetMesh<I>, spacing: f64) -> Result<Self> {
        let mut grid = Self::new(spacing)?;
        for (id, v) in mesh.vertices() {
            grid.insert(id, &v.position);
        }
        Ok(grid)
    }

    /// Number of stored vertices.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the grid holds no vertex.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn key(&self, p: &Point3<f64>) -> [i64; 3] {
        [
            (p.x / self.spacing).floor() as i64,
            (p.y / self.spacing).floor() as i64,
            (p.z / self.spacing).floor() as i64,
        ]
    }

    /// Returns `true` if `v` is stored in the bucket of `position`.
    pub fn contains(&self, v: VertexId<I>, position: &Point3<f64>) -> bool {
        self.buckets
            .get(&self.key(position))
            .map_or(false, |b| b.contains(&v))
    }

    /// Vertices stored in the bucket of `position` and its 26 neighbors.
    pub fn nearby(&self, position: &Point3<f64>) -> Vec<VertexId<I>> {
        let [x, y, z] = self.key(position);
        let mut out = Vec::new();
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if let Some(b) = self.buckets.get(&[x + dx, y + dy, z + dz]) {
                        out.extend_from_slice(b);
                    }
                }
            }
        }
        out
    }
}

impl<I: MeshIndex> SpatialIndex<I> for GridIndex<I> {
    fn remove(&mut self, v: VertexId<I>, position: &Point3<f64>) {
        let key = self.key(position);
        if let Some(bucket) = self.buckets.get_mut(&key) {
            if let Some(i) = bucket.iter().position(|&x| x == v) {
                bucket.swap_remove(i);
                self.len -= 1;
            }
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
    }

    fn insert(&mut self, v: VertexId<I>, position: &Point3<f64>) {
        let key = self.key(position);
        self.buckets.entry(key).or_default().push(v);
        self.len += 1;
    }
}
