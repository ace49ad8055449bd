//! Real-space masks applied to half maps before correlating them.

/// 1 within `radius` voxels of the volume origin, 0 beyond.
pub fn sphere(size: usize, radius: Lengthf32) -> Volume {
    let c = (size / 2) as f32;
    let r2 = radius * radius;
    Volume::from_fn(size, |[x, y, z]| {
        let (dx, dy, dz) = (x as f32 - c, y as f32 - c, z as f32 - c);
        if dx*dx + dy*dy + dz*dz <= r2 { 1.0 } else { 0.0 }
    })
}

/// Two voxels inside the inscribed sphere, but never less than one voxel.
pub fn default_radius(size: usize) -> Lengthf32 { ((size / 2) as f32 - 2.0).max(1.0) }

pub fn default_mask(size: usize) -> Volume { sphere(size, default_radius(size)) }


// ----- Imports -----------------------------------------------------------------------------------------
use units::todo::Lengthf32;

use crate::volume::Volume;
