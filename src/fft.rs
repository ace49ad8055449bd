//! 2-d and 3-d complex FFTs built from per-axis `rustfft` plans.
//!
//! Arrays are stored with x varying fastest: `index = x + y*nx + z*nx*ny`.
//! Inverse transforms are normalized by the total number of elements, so
//! `inverse(forward(x)) == x`.

/// Index into a 3D array stored with x fastest.
#[inline(always)]
pub fn idx3d(i: usize, j: usize, k: usize, nx: usize, ny: usize) -> usize {
    i + j * nx + k * nx * ny
}

struct AxisPlans {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
    buffer: Vec<Complex32>,
}

impl AxisPlans {
    fn new(planner: &mut FftPlanner<f32>, n: usize) -> Self {
        let forward = planner.plan_fft(n, FftDirection::Forward);
        let inverse = planner.plan_fft(n, FftDirection::Inverse);
        let scratch_len = forward.get_inplace_scratch_len().max(inverse.get_inplace_scratch_len());
        Self {
            forward,
            inverse,
            scratch: vec![Complex32::zero(); scratch_len],
            buffer: vec![Complex32::zero(); n],
        }
    }

    fn plan(&self, direction: FftDirection) -> &Arc<dyn Fft<f32>> {
        match direction {
            FftDirection::Forward => &self.forward,
            FftDirection::Inverse => &self.inverse,
        }
    }

    /// Transform the contiguous run `data[start .. start + n]`.
    fn contiguous(&mut self, data: &mut [Complex32], start: usize, direction: FftDirection) {
        let n = self.buffer.len();
        let plan = Arc::clone(self.plan(direction));
        plan.process_with_scratch(&mut data[start..start + n], &mut self.scratch);
    }

    /// Transform the strided run `data[start + m*stride]`, `m in 0..n`.
    fn strided(&mut self, data: &mut [Complex32], start: usize, stride: usize, direction: FftDirection) {
        let n = self.buffer.len();
        for m in 0..n { self.buffer[m] = data[start + m * stride]; }
        let plan = Arc::clone(self.plan(direction));
        plan.process_with_scratch(&mut self.buffer, &mut self.scratch);
        for m in 0..n { data[start + m * stride] = self.buffer[m]; }
    }
}

/// Square 2-d FFT workspace, reusable across images of the same size.
pub struct Fft2d {
    n: usize,
    axis: AxisPlans,
}

impl Fft2d {
    pub fn new(n: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self { n, axis: AxisPlans::new(&mut planner, n) }
    }

    pub fn size(&self) -> usize { self.n }

    /// In-place forward 2D FFT of an `n × n` array.
    pub fn forward(&mut self, data: &mut [Complex32]) { self.transform(data, FftDirection::Forward) }

    pub fn inverse(&mut self, data: &mut [Complex32]) {
        self.transform(data, FftDirection::Inverse);
        let n_total = (self.n * self.n) as f32;
        for val in data.iter_mut() { *val /= n_total; }
    }

    fn transform(&mut self, data: &mut [Complex32], direction: FftDirection) {
        let n = self.n;
        for j in 0..n { self.axis.contiguous(data, j * n, direction); }
        for i in 0..n { self.axis.strided(data, i, n, direction); }
    }
}

/// 3-d FFT workspace that caches plans and scratch buffers for reuse
pub struct Fft3d {
    nx: usize,
    ny: usize,
    nz: usize,
    x: AxisPlans,
    y: AxisPlans,
    z: AxisPlans,
}

impl Fft3d {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            nx, ny, nz,
            x: AxisPlans::new(&mut planner, nx),
            y: AxisPlans::new(&mut planner, ny),
            z: AxisPlans::new(&mut planner, nz),
        }
    }

    pub fn cube(n: usize) -> Self { Self::new(n, n, n) }

    pub fn forward(&mut self, data: &mut [Complex32]) { self.transform(data, FftDirection::Forward) }

    /// In-place inverse 3D FFT (with normalization)
    pub fn inverse(&mut self, data: &mut [Complex32]) {
        self.transform(data, FftDirection::Inverse);
        let n_total = (self.nx * self.ny * self.nz) as f32;
        for val in data.iter_mut() { *val /= n_total; }
    }

    fn transform(&mut self, data: &mut [Complex32], direction: FftDirection) {
        let (nx, ny, nz) = (self.nx, self.ny, self.nz);
        for k in 0..nz {
            for j in 0..ny { self.x.contiguous(data, idx3d(0, j, k, nx, ny), direction); }
        }
        for k in 0..nz {
            for i in 0..nx { self.y.strided(data, idx3d(i, 0, k, nx, ny), nx, direction); }
        }
        for j in 0..ny {
            for i in 0..nx { self.z.strided(data, idx3d(i, j, 0, nx, ny), nx * ny, direction); }
        }
    }
}

/// Promote real samples to complex.
pub fn complexify(data: &[f32]) -> Vec<Complex32> {
    data.iter().map(|&r| Complex32::new(r, 0.0)).collect()
}


// ----- Imports -----------------------------------------------------------------------------------------
use std::sync::Arc;

use num_complex::Complex32;
use num_traits::Zero;
use rustfft::{Fft, FftDirection, FftPlanner};
