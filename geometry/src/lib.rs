mod rotation;
mod transform;

pub use rotation::Rotation;
pub use transform::Transform;

pub use nalgebra::{Matrix3, Vector3};
