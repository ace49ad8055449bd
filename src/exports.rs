pub use units::todo::{Densityf32, Intensityf32, Lengthf32, Ratiof32, Weightf32};

pub use crate::accumulator::{Accumulator, Params, Weighting};
pub use crate::error::{Error, Result};
pub use crate::fsc::{FscCurve, Resolution};
pub use crate::image::OrientedImage;
pub use crate::index::{BoxDim_u, Index1_u, Index3_u};
pub use crate::volume::Volume;

pub use geometry::{Rotation, Transform};
