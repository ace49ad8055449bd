//! Proper rotations of 3-d Fourier space.
//!
//! A `Rotation` maps volume coordinates onto image coordinates: the central
//! section of an image with rotation `R` is the set of volume points
//! `Rᵀ (kx, ky, 0)`.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation(Matrix3<f32>);

impl Rotation {

    pub fn identity() -> Self { Self(Matrix3::identity()) }

    /// Wrap a matrix which the caller guarantees to be orthonormal with unit
    /// determinant.
    pub fn from_matrix(m: Matrix3<f32>) -> Self { Self(m) }

    /// Convert from the double precision matrices used while generating
    /// symmetry groups.
    pub fn from_matrix_f64(m: &Matrix3<f64>) -> Self { Self(m.cast::<f32>()) }

    /// ZYZ Euler rotation: `Rz(psi) · Ry(theta) · Rz(phi)`, angles in radians.
    #[allow(clippy::many_single_char_names)]
    pub fn from_euler_radians(phi: f32, theta: f32, psi: f32) -> Self {
        let (sf, cf) = phi  .sin_cos();
        let (st, ct) = theta.sin_cos();
        let (sp, cp) = psi  .sin_cos();
        Self(Matrix3::new(
             cp*ct*cf - sp*sf,   cp*ct*sf + sp*cf,  -cp*st,
            -sp*ct*cf - cp*sf,  -sp*ct*sf + cp*cf,   sp*st,
                st*cf        ,      st*sf        ,      ct,
        ))
    }

    pub fn matrix(&self) -> &Matrix3<f32> { &self.0 }

    /// Apply `self` first, then `other`, to image coordinates: the product
    /// `self · other`.
    pub fn then(&self, other: &Rotation) -> Rotation { Rotation(self.0 * other.0) }

    pub fn inverse(&self) -> Rotation { Rotation(self.0.transpose()) }

    /// Volume coordinates of the in-plane frequency `(kx, ky)`.
    #[inline]
    pub fn slice_point(&self, kx: f32, ky: f32) -> [f32; 3] {
        let m = &self.0;
        [kx * m[(0,0)] + ky * m[(1,0)],
         kx * m[(0,1)] + ky * m[(1,1)],
         kx * m[(0,2)] + ky * m[(1,2)]]
    }

    /// Image coordinates of the volume point `p`.
    #[inline]
    pub fn apply(&self, p: [f32; 3]) -> [f32; 3] {
        let v = self.0 * Vector3::new(p[0], p[1], p[2]);
        [v.x, v.y, v.z]
    }

    pub fn is_finite(&self) -> bool { self.0.iter().all(|x| x.is_finite()) }

    /// Finite, orthonormal and with unit determinant, each to within `tolerance`.
    pub fn is_proper(&self, tolerance: f32) -> bool {
        self.is_finite()
            && (self.0 * self.0.transpose() - Matrix3::identity()).abs().max() <= tolerance
            && (self.0.determinant() - 1.0).abs() <= tolerance
    }

    /// Largest absolute element-wise difference from `other`.
    pub fn distance(&self, other: &Rotation) -> f32 {
        (self.0 - other.0).abs().max()
    }
}

impl Default for Rotation {
    fn default() -> Self { Self::identity() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn zero_angles_give_identity() {
        let r = Rotation::from_euler_radians(0.0, 0.0, 0.0);
        assert_eq!(r, Rotation::identity());
    }

    #[test]
    fn phi_and_psi_add_when_theta_is_zero() {
        let a = Rotation::from_euler_radians(0.3, 0.0, 0.4);
        let b = Rotation::from_euler_radians(0.7, 0.0, 0.0);
        assert!(a.distance(&b) < 1e-6);
    }

    #[test]
    fn side_view_slice_contains_z_axis() {
        // theta = 90°: the image x axis lies along -z of the volume
        let r = Rotation::from_euler_radians(0.0, FRAC_PI_2, 0.0);
        let [x, y, z] = r.slice_point(1.0, 0.0);
        assert_float_eq!((x, y, z), (0.0, 0.0, -1.0), abs <= (1e-6, 1e-6, 1e-6));
        let [x, y, z] = r.slice_point(0.0, 1.0);
        assert_float_eq!((x, y, z), (0.0, 1.0, 0.0), abs <= (1e-6, 1e-6, 1e-6));
    }

    #[test]
    fn slice_point_inverts_apply() {
        let r = Rotation::from_euler_radians(0.4, 1.1, -2.0);
        let p = r.slice_point(3.0, -5.0);
        let [u, v, w] = r.apply(p);
        assert_float_eq!((u, v, w), (3.0, -5.0, 0.0), abs <= (1e-5, 1e-5, 1e-5));
    }

    #[test]
    fn improper_matrices_are_recognized() {
        assert!( Rotation::from_euler_radians(0.4, 1.1, -2.0).is_proper(1e-5));
        assert!(!Rotation::from_matrix(Matrix3::identity() * 2.0).is_proper(1e-3));
        assert!(!Rotation::from_matrix(-Matrix3::identity()).is_proper(1e-3));
        assert!(!Rotation::from_euler_radians(f32::NAN, 0.0, 0.0).is_proper(1e-3));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn euler_matrices_are_orthonormal(
            phi   in -PI..PI,
            theta in 0.0..PI,
            psi   in -PI..PI,
        ) {
            let r = Rotation::from_euler_radians(phi, theta, psi);
            let should_be_identity = r.then(&r.inverse());
            prop_assert!(should_be_identity.distance(&Rotation::identity()) < 1e-5);
            prop_assert!((r.matrix().determinant() - 1.0).abs() < 1e-5);
            prop_assert!(r.is_proper(1e-5));
        }
    }
}

// ----- Imports -----------------------------------------------------------------------------------------
use nalgebra::{Matrix3, Vector3};
