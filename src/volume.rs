//! Real-space cubic density volumes.

pub type VolumeData = Vec<Densityf32>;

/// A `size³` real-space density, x varying fastest. The origin of the
/// reconstruction sits at voxel `(size/2, size/2, size/2)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    pub size: usize,
    pub data: VolumeData,
}

impl Volume {

    pub fn zeros(size: usize) -> Self { Self { size, data: vec![0.0; size * size * size] } }

    pub fn new(size: usize, data: VolumeData) -> Result<Self> {
        if data.len() != size * size * size {
            return Err(Error::InvalidConfiguration(format!(
                "volume of size {size} needs {} voxels, got {}", size * size * size, data.len())));
        }
        Ok(Self { size, data })
    }

    pub fn from_fn(size: usize, f: impl Fn(Index3_u) -> Densityf32) -> Self {
        let dims = [size; 3];
        let data = (0..size * size * size).map(|i| f(index1_to_3(i, dims))).collect();
        Self { size, data }
    }

    pub fn dims(&self) -> BoxDim_u { [self.size; 3] }

    pub fn centre(&self) -> Index3_u { [self.size / 2; 3] }

    /// Position and value of the largest voxel. NaNs never win.
    pub fn peak(&self) -> (Index3_u, Densityf32) {
        let (i, v) = self.data.iter()
            .enumerate()
            .max_by_key(|(_, &v)| OrderedFloat(if v.is_nan() { f32::MIN } else { v }))
            .map(|(i, &v)| (i, v))
            .unwrap_or((0, 0.0));
        (index1_to_3(i, self.dims()), v)
    }

    pub fn max_abs(&self) -> Densityf32 {
        self.data.iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    pub fn is_finite(&self) -> bool { self.data.iter().all(|v| v.is_finite()) }

    /// Voxel-by-voxel product with `mask`, which must have the same size.
    pub fn masked(&self, mask: &Volume) -> Result<Volume> {
        if mask.size != self.size {
            return Err(Error::InvalidConfiguration(format!(
                "mask of size {} applied to volume of size {}", mask.size, self.size)));
        }
        let data = self.data.iter().zip(&mask.data).map(|(v, m)| v * m).collect();
        Ok(Volume { size: self.size, data })
    }

    pub fn from_raw_file(path: &Path) -> Result<Self> {
        let data: VolumeData = raw::read(path)
            .and_then(|it| it.collect::<std::io::Result<_>>())
            .map_err(Error::io(path))?;
        let size = (data.len() as f64).cbrt().round() as usize;
        Volume::new(size, data)
    }

    pub fn write_to_raw_file(&self, path: &Path) -> Result<()> {
        raw::write(self.data.iter().copied(), path).map_err(Error::io(path))
    }
}

impl core::ops::IndexMut<Index1_u> for Volume {
    #[inline]
    fn index_mut(&mut self, i: Index1_u) -> &mut Self::Output { &mut self.data[i] }
}

impl core::ops::Index<Index1_u> for Volume {
    type Output = Densityf32;
    #[inline]
    fn index(&self, i: Index1_u) -> &Self::Output { &self.data[i] }
}

impl core::ops::IndexMut<Index3_u> for Volume {
    fn index_mut(&mut self, i3: Index3_u) -> &mut Self::Output {
        let i1 = index3_to_1(i3, self.dims());
        &mut self.data[i1]
    }
}

impl core::ops::Index<Index3_u> for Volume {
    type Output = Densityf32;
    fn index(&self, i3: Index3_u) -> &Self::Output {
        let i1 = index3_to_1(i3, self.dims());
        &self.data[i1]
    }
}


// ----- Imports -----------------------------------------------------------------------------------------
use std::path::Path;

use ordered_float::OrderedFloat;

use crate::{
    error::{Error, Result},
    index::{index1_to_3, index3_to_1, BoxDim_u, Index1_u, Index3_u},
    io::raw,
    Densityf32,
};
