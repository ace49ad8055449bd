//! Image orientation: Euler angles plus in-plane shift.

/// Orientation of one projection image.
///
/// Angles follow the ZYZ convention (`phi`, `theta`, `psi`); `sx`, `sy` are
/// the in-plane shifts, in pixels, which were applied to the image to centre
/// the particle and which must be undone during insertion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub phi  : Angle,
    pub theta: Angle,
    pub psi  : Angle,
    pub sx   : Lengthf32,
    pub sy   : Lengthf32,
}

impl Transform {

    pub fn identity() -> Self { Self::from_degrees(0.0, 0.0, 0.0) }

    pub fn from_degrees(phi: f32, theta: f32, psi: f32) -> Self {
        Self { phi: deg(phi), theta: deg(theta), psi: deg(psi), sx: 0.0, sy: 0.0 }
    }

    pub fn with_shift(self, sx: Lengthf32, sy: Lengthf32) -> Self { Self { sx, sy, ..self } }

    pub fn rotation(&self) -> Rotation {
        Rotation::from_euler_radians(radian_(self.phi), radian_(self.theta), radian_(self.psi))
    }

    /// The same orientation jittered by the given angular offsets, shift
    /// unchanged.
    pub fn perturbed(&self, dphi: Angle, dtheta: Angle, dpsi: Angle) -> Self {
        Self {
            phi  : self.phi   + dphi,
            theta: self.theta + dtheta,
            psi  : self.psi   + dpsi,
            ..*self
        }
    }

    pub fn is_finite(&self) -> bool {
        [radian_(self.phi), radian_(self.theta), radian_(self.psi), self.sx, self.sy]
            .iter()
            .all(|x| x.is_finite())
    }
}

impl Default for Transform {
    fn default() -> Self { Self::identity() }
}


// ----- Imports -----------------------------------------------------------------------------------------
use units::{deg, radian_, Angle, todo::Lengthf32};
use crate::Rotation;
