//! Boundary classification tags.
//!
//! Tags are stored as bit sets because several of them legitimately combine
//! (a ridge edge can also be required, a corner is always on the boundary).
//! Decisions that need mutually exclusive cases go through [`PointClass`],
//! which resolves a vertex tag set into a single classification.

use bitflags::bitflags;

bitflags! {
    /// Classification bits carried by vertices, faces and edges.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Tags: u16 {
        /// Entity lies on the domain boundary.
        const BOUNDARY = 1 << 0;
        /// Entity lies on the border between two surface references.
        const REFERENCE = 1 << 1;
        /// Geometric ridge (sharp feature curve).
        const RIDGE = 1 << 2;
        /// Entity is shared by more than two surface sheets.
        const NON_MANIFOLD = 1 << 3;
        /// Corner (singular) vertex.
        const CORNER = 1 << 4;
        /// Locked by the user: never moved, collapsed or swapped.
        const REQUIRED = 1 << 5;
    }
}

impl Tags {
    /// Tags that make a vertex singular: it must never move.
    pub const SINGULAR: Tags = Tags::CORNER.union(Tags::REQUIRED);

    /// Tags of edges that carry the surface geometry (ridge or reference curve).
    pub const FEATURE: Tags = Tags::RIDGE.union(Tags::REFERENCE);

    /// Returns `true` if the entity is on the boundary.
    #[inline]
    pub fn is_boundary(self) -> bool {
        self.contains(Tags::BOUNDARY)
    }

    /// Returns `true` if the entity is locked.
    #[inline]
    pub fn is_required(self) -> bool {
        self.contains(Tags::REQUIRED)
    }

    /// Returns `true` for corner or required vertices.
    #[inline]
    pub fn is_singular(self) -> bool {
        self.intersects(Tags::SINGULAR)
    }

    /// Returns `true` for ridge or reference edges.
    #[inline]
    pub fn is_feature(self) -> bool {
        self.intersects(Tags::FEATURE)
    }

    /// Returns `true` if an edge with these tags must never be swapped.
    #[inline]
    pub fn blocks_swap(self) -> bool {
        self.is_feature() || self.intersects(Tags::REQUIRED | Tags::NON_MANIFOLD)
    }

    /// Resolve a vertex tag set into its classification.
    pub fn classify(self) -> PointClass {
        if self.contains(Tags::REQUIRED) {
            PointClass::Required
        } else if self.contains(Tags::CORNER) {
            PointClass::Corner
        } else if !self.is_boundary() {
            PointClass::Interior
        } else if self.contains(Tags::NON_MANIFOLD) {
            PointClass::NonManifold
        } else if self.contains(Tags::RIDGE) {
            PointClass::Ridge
        } else if self.contains(Tags::REFERENCE) {
            PointClass::Reference
        } else {
            PointClass::Surface
        }
    }
}

/// Mutually exclusive vertex classification used to dispatch edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointClass {
    /// Not on the boundary: free volume moves.
    Interior,
    /// Regular surface point: moves within the tangent plane.
    Surface,
    /// On a reference curve: slides along it.
    Reference,
    /// On a ridge curve: slides along it.
    Ridge,
    /// On a non-manifold curve: slides along it.
    NonManifold,
    /// Corner: fixed.
    Corner,
    /// Required: fixed.
    Required,
}

impl PointClass {
    /// Returns `true` if the vertex can never be moved or removed.
    #[inline]
    pub fn is_fixed(self) -> bool {
        matches!(self, PointClass::Corner | PointClass::Required)
    }

    /// Edge tag that describes the curve a curve-constrained vertex slides on.
    pub fn curve_tag(self) -> Option<Tags> {
        match self {
            PointClass::Reference => Some(Tags::REFERENCE),
            PointClass::Ridge => Some(Tags::RIDGE),
            PointClass::NonManifold => Some(Tags::NON_MANIFOLD),
            _ => None,
        }
    }
}

/// Sweep stamp used to skip vertices already processed in the current sweep.
///
/// The caller owns the counter and passes the current value explicitly to
/// the optimization driver; each vertex remembers the last epoch that
/// touched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(pub u64);

impl Epoch {
    /// The epoch following this one.
    #[inline]
    pub fn next(self) -> Epoch {
        Epoch(self.0 + 1)
    }
}
