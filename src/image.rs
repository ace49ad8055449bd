//! Projection images with their orientation and optical metadata.

pub type ImageData = Vec<Intensityf32>;

/// A square `size × size` projection, x varying fastest, whose centre pixel
/// `(size/2, size/2)` is the projection of the volume origin (after the
/// transform's shift is undone).
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedImage {
    pub size: usize,
    pub data: ImageData,
    pub transform: Transform,
    pub ctf: Option<CtfDescriptor>,
    pub weight: Weightf32,
    /// Defocus group or similar, used to keep correlated images in the same
    /// half of a split
    pub group: Option<u32>,
    /// Pre-assigned half (0 or 1)
    pub chunk: Option<u8>,
    pub noise: Option<Arc<NoiseSpectrum>>,
}

impl OrientedImage {

    pub fn new(size: usize, data: ImageData, transform: Transform) -> Self {
        Self { size, data, transform, ctf: None, weight: 1.0, group: None, chunk: None, noise: None }
    }

    pub fn zeros(size: usize, transform: Transform) -> Self {
        Self::new(size, vec![0.0; size * size], transform)
    }

    pub fn with_ctf   (self, ctf: CtfDescriptor)       -> Self { Self { ctf: Some(ctf), ..self } }
    pub fn with_weight(self, weight: Weightf32)        -> Self { Self { weight, ..self } }
    pub fn with_group (self, group: u32)               -> Self { Self { group: Some(group), ..self } }
    pub fn with_chunk (self, chunk: u8)                -> Self { Self { chunk: Some(chunk), ..self } }
    pub fn with_noise (self, noise: Arc<NoiseSpectrum>) -> Self { Self { noise: Some(noise), ..self } }

    /// Check everything that can be checked without knowing the reconstruction
    /// parameters; `index` is the image's position in the global sequence.
    pub fn validate(&self, index: usize, expected_size: usize) -> Result<()> {
        let invalid = |reason: String| Err(Error::InvalidImage { index, reason });
        if self.size != expected_size {
            return invalid(format!("size {} does not match reconstruction size {expected_size}", self.size));
        }
        if self.data.len() != self.size * self.size {
            return invalid(format!("{} pixels in a {}x{} image", self.data.len(), self.size, self.size));
        }
        if !self.transform.is_finite() {
            return invalid("non-finite orientation or shift".into());
        }
        if !self.weight.is_finite() {
            return invalid("non-finite weight".into());
        }
        Ok(())
    }

    #[inline]
    pub fn pixel(&self, ix: usize, iy: usize) -> Intensityf32 { self.data[ix + iy * self.size] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn blank() -> OrientedImage { OrientedImage::zeros(4, Transform::identity()) }

    #[test]
    fn builders_fill_optional_fields() {
        let image = blank().with_weight(0.5).with_group(3).with_chunk(1);
        assert_eq!(image.weight, 0.5);
        assert_eq!(image.group, Some(3));
        assert_eq!(image.chunk, Some(1));
        assert!(image.ctf.is_none());
    }

    #[rstest(/**/ image                                                       , valid,
             case(blank()                                                     , true ),
             case(OrientedImage::zeros(5, Transform::identity())              , false),
             case(OrientedImage { data: vec![0.0; 15], ..blank() }            , false),
             case(blank().with_weight(f32::INFINITY)                          , false),
             case(OrientedImage::zeros(4, Transform::from_degrees(f32::NAN, 0.0, 0.0)), false),
    )]
    fn validation(image: OrientedImage, valid: bool) {
        assert_eq!(image.validate(9, 4).is_ok(), valid);
    }

    #[test]
    fn validation_errors_carry_the_index() {
        let err = blank().with_weight(f32::NAN).validate(42, 4).unwrap_err();
        assert!(matches!(err, Error::InvalidImage { index: 42, .. }));
    }
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::sync::Arc;

use geometry::Transform;
use units::todo::{Intensityf32, Weightf32};

use crate::{
    ctf::{CtfDescriptor, NoiseSpectrum},
    error::{Error, Result},
};
