//! Edge length and cell quality in metric space.
//!
//! Every decision taken by the operators goes through a [`QualityOracle`]:
//! edges are "short" or "long" relative to the metric, and cells are ranked
//! by a shape quality normalized so that the regular tetrahedron scores 1.
//!
//! Two oracles are provided:
//!
//! - [`IsotropicMetric`]: a constant target size
//! - [`ConstantMetric`]: a constant symmetric positive definite tensor
//!
//! # Example
//!
//! ```
//! use tetmend::algo::metric::{IsotropicMetric, QualityOracle};
//! use nalgebra::Point3;
//!
//! let metric = IsotropicMetric::new(0.5).unwrap();
//! let l = metric.length(&Point3::origin(), &Point3::new(1.0, 0.0, 0.0));
//! assert!((l - 2.0).abs() < 1e-12);
//! ```

use nalgebra::{Matrix3, Point3};

use crate::error::{MeshError, Result};
use crate::mesh::orient3d;

/// Normalization constant of [`shape_quality`], `12 * sqrt(3)`.
pub const ALPHAD: f64 = 20.784_609_690_826_528;

/// Length and quality evaluation supplied by the metric subsystem.
pub trait QualityOracle: Sync {
    /// Length of the edge `(a, b)` in metric space.
    fn length(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64;

    /// Quality of a tetrahedron, in `[0, 1]`; non-positive orientation scores 0.
    fn quality(&self, tet: &[Point3<f64>; 4]) -> f64;
}

/// Mean-ratio style shape quality of a tetrahedron.
///
/// Computes `ALPHAD * det / (sum of squared edge lengths)^(3/2)`, which is 1
/// for the regular tetrahedron and 0 for flat or inverted cells.
pub fn shape_quality(tet: &[Point3<f64>; 4]) -> f64 {
    let [a, b, c, d] = tet;
    let det = orient3d(a, b, c, d);
    if det <= 0.0 {
        return 0.0;
    }
    let sum = (b - a).norm_squared()
        + (c - a).norm_squared()
        + (d - a).norm_squared()
        + (c - b).norm_squared()
        + (d - b).norm_squared()
        + (d - c).norm_squared();
    if sum <= 0.0 {
        return 0.0;
    }
    ALPHAD * det / (sum * sum.sqrt())
}

/// Constant isotropic size field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsotropicMetric {
    size: f64,
}

impl Default for IsotropicMetric {
    fn default() -> Self {
        Self { size: 1.0 }
    }
}

impl IsotropicMetric {
    /// Create a metric with the given target edge length.
    pub fn new(size: f64) -> Result<Self> {
        if !(size > 0.0 && size.is_finite()) {
            return Err(MeshError::invalid_param("size", size, "must be positive and finite"));
        }
        Ok(Self { size })
    }

    /// The target edge length.
    pub fn size(&self) -> f64 {
        self.size
    }
}

impl QualityOracle for IsotropicMetric {
    #[inline]
    fn length(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        (b - a).norm() / self.size
    }

    #[inline]
    fn quality(&self, tet: &[Point3<f64>; 4]) -> f64 {
        shape_quality(tet)
    }
}

/// Constant anisotropic metric given by a symmetric positive definite tensor.
///
/// Lengths are `sqrt(d^T M d)`; quality is the shape quality of the cell
/// mapped through the Cholesky factor of `M`, where the metric is Euclidean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantMetric {
    tensor: Matrix3<f64>,
    transform: Matrix3<f64>,
}

impl ConstantMetric {
    /// Create a metric from a tensor.
    ///
    /// Returns [`MeshError::InvalidParameter`] if the tensor is not symmetric
    /// positive definite.
    pub fn new(tensor: Matrix3<f64>) -> Result<Self> {
        if (tensor - tensor.transpose()).amax() > 1e-12 * tensor.amax() {
            return Err(MeshError::invalid_param("tensor", tensor, "must be symmetric"));
        }
        let cholesky = tensor
            .cholesky()
            .ok_or_else(|| MeshError::invalid_param("tensor", tensor, "must be positive definite"))?;
        Ok(Self {
            tensor,
            transform: cholesky.l().transpose(),
        })
    }

    /// Diagonal metric with the given sizes along each axis.
    pub fn from_sizes(hx: f64, hy: f64, hz: f64) -> Result<Self> {
        for (name, h) in [("hx", hx), ("hy", hy), ("hz", hz)] {
            if !(h > 0.0 && h.is_finite()) {
                return Err(MeshError::invalid_param(name, h, "must be positive and finite"));
            }
        }
        Self::new(Matrix3::from_diagonal(&nalgebra::Vector3::new(
            1.0 / (hx * hx),
            1.0 / (hy * hy),
            1.0 / (hz * hz),
        )))
    }

    /// The metric tensor.
    pub fn tensor(&self) -> &Matrix3<f64> {
        &self.tensor
    }
}

impl QualityOracle for ConstantMetric {
    fn length(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        let d = b - a;
        d.dot(&(self.tensor * d)).max(0.0).sqrt()
    }

    fn quality(&self, tet: &[Point3<f64>; 4]) -> f64 {
        let mapped = tet.map(|p| Point3::from(self.transform * p.coords));
        shape_quality(&mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_tet() -> [Point3<f64>; 4] {
        [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ]
    }

    #[test]
    fn test_regular_tet_quality_is_one() {
        let q = shape_quality(&regular_tet());
        assert!((q - 1.0).abs() < 1e-12, "quality {q}");
    }

    #[test]
    fn test_inverted_tet_quality_is_zero() {
        let [a, b, c, d] = regular_tet();
        assert_eq!(shape_quality(&[b, a, c, d]), 0.0);
        assert_eq!(shape_quality(&[a, a, c, d]), 0.0);
    }

    #[test]
    fn test_quality_is_scale_invariant() {
        let scaled = regular_tet().map(|p| Point3::from(p.coords * 7.5));
        assert!((shape_quality(&scaled) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_isotropic_length() {
        let m = IsotropicMetric::new(2.0).unwrap();
        let l = m.length(&Point3::origin(), &Point3::new(0.0, 3.0, 4.0));
        assert!((l - 2.5).abs() < 1e-12);
        assert!(IsotropicMetric::new(0.0).is_err());
        assert!(IsotropicMetric::new(f64::NAN).is_err());
    }

    #[test]
    fn test_constant_metric_stretch() {
        // A cell squashed by 1/4 along z is regular in a metric that asks for
        // four times smaller sizes along z.
        let squashed = regular_tet().map(|p| Point3::new(p.x, p.y, p.z * 0.25));
        let iso = IsotropicMetric::default();
        let aniso = ConstantMetric::from_sizes(1.0, 1.0, 0.25).unwrap();
        assert!(iso.quality(&squashed) < 0.6);
        assert!((aniso.quality(&squashed) - 1.0).abs() < 1e-9);

        let l = aniso.length(&Point3::origin(), &Point3::new(0.0, 0.0, 0.5));
        assert!((l - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_metric_rejects_indefinite() {
        let m = Matrix3::from_diagonal(&nalgebra::Vector3::new(1.0, -1.0, 1.0));
        assert!(ConstantMetric::new(m).is_err());
    }
}
