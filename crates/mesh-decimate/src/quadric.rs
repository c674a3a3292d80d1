//! Quadric error metrics.
//!
//! A quadric is the symmetric 4x4 bilinear form of a plane, stored as its ten
//! upper-triangle coefficients. Summing the area-weighted quadrics of a
//! vertex's incident triangle planes yields a form whose evaluation at a point
//! measures the squared deviation from those planes. An `area` accumulator
//! (one third of each incident triangle's area, the corner share) rides along
//! for penalty scaling and error normalization.

use nalgebra::{Matrix3, Point3, Vector3};

/// Determinant threshold below which the 3x3 minimization system is treated
/// as ill-conditioned and the collapse point falls back to the edge midpoint.
pub const ILL_CONDITIONED_DET: f64 = 1e-12;

/// Symmetric 4x4 quadric of the homogeneous plane vector `(a, b, c, d)`.
///
/// Coefficients hold the upper triangle row-major:
/// `[xx, xy, xz, xd, yy, yz, yd, zz, zd, dd]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quadric {
    coeffs: [f64; 10],
    /// Accumulated corner-share surface area.
    area: f64,
}

impl Quadric {
    /// Quadric of a unit-normal plane `n · p + offset = 0`, weighted by the
    /// supporting triangle's area. `corner_area` is the share recorded in the
    /// area accumulator.
    pub fn from_plane(normal: &Vector3<f64>, offset: f64, weight: f64, corner_area: f64) -> Self {
        let p = [normal.x, normal.y, normal.z, offset];
        let mut coeffs = [0.0; 10];
        let mut k = 0;
        for i in 0..4 {
            for j in i..4 {
                coeffs[k] = weight * p[i] * p[j];
                k += 1;
            }
        }
        Self {
            coeffs,
            area: corner_area,
        }
    }

    /// Add another quadric into this one.
    pub fn add(&mut self, other: &Quadric) {
        for (c, o) in self.coeffs.iter_mut().zip(&other.coeffs) {
            *c += o;
        }
        self.area += other.area;
    }

    /// Sum of two quadrics.
    pub fn sum(&self, other: &Quadric) -> Quadric {
        let mut q = *self;
        q.add(other);
        q
    }

    /// Accumulated corner-share area.
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Evaluate `v^T Q v` for `v = [x, y, z, 1]`, the squared deviation of
    /// the point from the accumulated planes.
    pub fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let v = [p.x, p.y, p.z, 1.0];
        let mut sum = 0.0;
        let mut k = 0;
        for i in 0..4 {
            for j in i..4 {
                let term = self.coeffs[k] * v[i] * v[j];
                // Off-diagonal coefficients appear twice in the full form.
                sum += if i == j { term } else { 2.0 * term };
                k += 1;
            }
        }
        sum
    }

    /// Point minimizing the quadric error, or `None` when the 3x3 system
    /// `A x = -b` (the spatial block of the form against its plane-offset
    /// column) is ill-conditioned, as it is for coplanar plane sets.
    pub fn optimal_point(&self) -> Option<Point3<f64>> {
        let [xx, xy, xz, xd, yy, yz, yd, zz, zd, _dd] = self.coeffs;
        #[rustfmt::skip]
        let a = Matrix3::new(
            xx, xy, xz,
            xy, yy, yz,
            xz, yz, zz,
        );
        if a.determinant().abs() < ILL_CONDITIONED_DET {
            return None;
        }
        let x = a.try_inverse()? * Vector3::new(-xd, -yd, -zd);
        if x.iter().all(|c| c.is_finite()) {
            Some(Point3::from(x))
        } else {
            None
        }
    }
}
