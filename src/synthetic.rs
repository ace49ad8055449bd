//! Synthetic phantoms and projections, for demos and tests.
//!
//! Projections are computed analytically from Gaussian blobs, so they are
//! independent of the gridding code they are used to check.

/// An image which is zero apart from a unit spike at the centre pixel.
pub fn delta_projection(size: usize, transform: Transform) -> OrientedImage {
    let mut image = OrientedImage::zeros(size, transform);
    let c = size / 2;
    image.data[c + c * size] = 1.0;
    image
}

/// Volume containing the unit-height Gaussian `exp(-|r - centre|² / 2σ²)`,
/// `centre` in voxels relative to the volume origin.
pub fn gaussian_blob(size: usize, centre: [f32; 3], sigma: f32) -> Volume {
    let o = (size / 2) as f32;
    let two_s2 = 2.0 * sigma * sigma;
    Volume::from_fn(size, |[x, y, z]| {
        let d = [x as f32 - o - centre[0], y as f32 - o - centre[1], z as f32 - o - centre[2]];
        (-(d[0] * d[0] + d[1] * d[1] + d[2] * d[2]) / two_s2).exp()
    })
}

/// Line integral through `gaussian_blob(size, centre, sigma)` viewed along
/// `transform`, with the particle displaced by the transform's shift.
pub fn gaussian_projection(size: usize, transform: Transform, centre: [f32; 3], sigma: f32) -> OrientedImage {
    let [px, py, _] = transform.rotation().apply(centre);
    let (px, py) = (px + transform.sx, py + transform.sy);
    let o = (size / 2) as f32;
    let two_s2 = 2.0 * sigma * sigma;
    let height = (TAU).sqrt() * sigma;
    let data = iproduct!(0..size, 0..size)
        .map(|(iy, ix)| {
            let (dx, dy) = (ix as f32 - o - px, iy as f32 - o - py);
            height * (-(dx * dx + dy * dy) / two_s2).exp()
        })
        .collect();
    OrientedImage::new(size, data, transform)
}

/// Orientation drawn uniformly over the sphere of viewing directions.
pub fn random_orientation<R: Rng + ?Sized>(rng: &mut R) -> Transform {
    let phi   = rng.gen_range(0.0..360.0);
    let theta = rng.gen_range(-1.0_f32..=1.0).acos().to_degrees();
    let psi   = rng.gen_range(0.0..360.0);
    Transform::from_degrees(phi, theta, psi)
}

/// Gaussian white noise of standard deviation `sigma`.
pub fn noise_image<R: Rng + ?Sized>(rng: &mut R, size: usize, transform: Transform, sigma: f32) -> Result<OrientedImage> {
    OrientedImage::zeros(size, transform).with_noise_added(rng, sigma)
}

impl OrientedImage {
    /// Add Gaussian white noise of standard deviation `sigma` to every pixel.
    pub fn with_noise_added<R: Rng + ?Sized>(mut self, rng: &mut R, sigma: f32) -> Result<Self> {
        let normal = Normal::new(0.0, sigma)
            .map_err(|e| Error::InvalidConfiguration(format!("noise sigma {sigma}: {e}")))?;
        for v in self.data.iter_mut() { *v += normal.sample(rng); }
        Ok(self)
    }

    /// Modulate the image by the CTF of `desc`, as the microscope would.
    /// The descriptor is attached to the result.
    pub fn with_ctf_applied(mut self, desc: CtfDescriptor) -> Self {
        let n = self.size;
        let half = (n / 2) as i32;
        let map = ctf_map(&desc, n);
        let at = |ix: usize, iy: usize| wrap(ix as i32 - half, n) + wrap(iy as i32 - half, n) * n;

        let mut buffer = vec![Complex32::zero(); n * n];
        for (iy, ix) in iproduct!(0..n, 0..n) {
            buffer[at(ix, iy)] = Complex32::new(self.pixel(ix, iy), 0.0);
        }
        let mut fft = Fft2d::new(n);
        fft.forward(&mut buffer);
        for (i, c) in buffer.iter_mut().enumerate() {
            let (kx, ky) = (signed(i % n, n), signed(i / n, n));
            let ctf = if kx >= 0 { map.get(kx as usize, ky) } else { map.get((-kx) as usize, -ky) };
            *c *= ctf;
        }
        fft.inverse(&mut buffer);
        for (iy, ix) in iproduct!(0..n, 0..n) {
            self.data[ix + iy * n] = buffer[at(ix, iy)].re;
        }
        self.ctf = Some(desc);
        self
    }
}


// ----- Imports -----------------------------------------------------------------------------------------
use std::f32::consts::TAU;

use itertools::iproduct;
use num_complex::Complex32;
use num_traits::Zero;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use geometry::Transform;

use crate::{
    ctf::{ctf_map, CtfDescriptor},
    error::{Error, Result},
    fft::Fft2d,
    image::OrientedImage,
    index::{signed, wrap},
    volume::Volume,
};
