//! Fourier shell correlation between two volumes, and the resolution at
//! which it falls below a threshold.

/// Conventional cut-off for half-map correlations
pub const DEFAULT_THRESHOLD: f32 = 0.143;

/// Number of consecutive shells which must stay above the threshold
pub const DEFAULT_RUN: usize = 3;

/// FSC per integer shell `r = round(|k|)`, `r` from 0 to `size/2`.
#[derive(Debug, Clone, PartialEq)]
pub struct FscCurve {
    /// Cycles per voxel, `r / size`
    pub frequency: Vec<Frequencyf32>,
    pub fsc: Vec<f32>,
    /// Fourier voxels contributing to each shell
    pub voxels: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Highest frequency (cycles per voxel) which is still reliable
    Resolved(Frequencyf32),
    /// No run of shells reaches the threshold
    Unresolved,
}

impl Resolution {
    /// In Å, given the pixel size in Å.
    pub fn in_angstrom(&self, pixel_size: Lengthf32) -> Option<Lengthf32> {
        match *self {
            Resolution::Resolved(f) if f > 0.0 => Some(pixel_size / f),
            _ => None,
        }
    }
}

impl FscCurve {

    pub fn len(&self) -> usize { self.fsc.len() }

    pub fn is_empty(&self) -> bool { self.fsc.is_empty() }

    /// Estimate for a map built from both halves: `2 FSC / (1 + FSC)`, with
    /// negative correlations reported as 0.
    pub fn full_map(&self) -> FscCurve {
        let fsc = self.fsc.iter().map(|&f| {
            let f = f.max(0.0);
            2.0 * f / (1.0 + f)
        }).collect();
        FscCurve { fsc, ..self.clone() }
    }

    pub fn resolution(&self, threshold: f32, run: usize) -> Resolution { resolution(self, threshold, run) }

    /// Whitespace-separated table, one shell per line: frequency, FSC,
    /// full-map FSC, voxel count.
    pub fn write_table(&self, path: &Path) -> Result<()> {
        let full = self.full_map();
        let file = File::create(path).map_err(Error::io(path))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "# frequency fsc full_map voxels").map_err(Error::io(path))?;
        for r in 0..self.len() {
            writeln!(out, "{:.6} {:.6} {:.6} {}", self.frequency[r], self.fsc[r], full.fsc[r], self.voxels[r])
                .map_err(Error::io(path))?;
        }
        out.flush().map_err(Error::io(path))
    }
}

#[derive(Clone)]
struct Shells { num: Vec<f64>, d1: Vec<f64>, d2: Vec<f64>, count: Vec<usize> }

impl Shells {
    fn zeros(n: usize) -> Self { Self { num: vec![0.0; n], d1: vec![0.0; n], d2: vec![0.0; n], count: vec![0; n] } }

    fn add(mut self, other: Self) -> Self {
        for r in 0..self.num.len() {
            self.num  [r] += other.num  [r];
            self.d1   [r] += other.d1   [r];
            self.d2   [r] += other.d2   [r];
            self.count[r] += other.count[r];
        }
        self
    }
}

/// Correlate two volumes of the same size shell by shell. Shells in which
/// either volume has no energy report 0.
pub fn fsc(a: &Volume, b: &Volume) -> Result<FscCurve> {
    if a.size != b.size {
        return Err(Error::InvalidConfiguration(format!("cannot correlate volumes of size {} and {}", a.size, b.size)));
    }
    let n = a.size;
    let n_shells = n / 2 + 1;

    let mut fa = complexify(&a.data);
    let mut fb = complexify(&b.data);
    let mut fft = Fft3d::cube(n);
    fft.forward(&mut fa);
    fft.forward(&mut fb);

    let dims = [n; 3];
    let shells = (0..fa.len())
        .into_par_iter()
        .fold(|| Shells::zeros(n_shells), |mut s, i| {
            let [x, y, z] = index1_to_3(i, dims);
            let [kx, ky, kz] = [signed(x, n), signed(y, n), signed(z, n)].map(|k| k as f64);
            let r = (kx*kx + ky*ky + kz*kz).sqrt().round() as usize;
            if r < n_shells {
                let (p, q) = (fa[i], fb[i]);
                s.num  [r] += (p * q.conj()).re as f64;
                s.d1   [r] += p.norm_sqr() as f64;
                s.d2   [r] += q.norm_sqr() as f64;
                s.count[r] += 1;
            }
            s
        })
        .reduce(|| Shells::zeros(n_shells), Shells::add);

    let fsc = (0..n_shells).map(|r| {
        let denominator = (shells.d1[r] * shells.d2[r]).sqrt();
        if denominator > 0.0 { (shells.num[r] / denominator) as f32 } else { 0.0 }
    }).collect();
    let frequency = (0..n_shells).map(|r| r as f32 / n as f32).collect();
    Ok(FscCurve { frequency, fsc, voxels: shells.count })
}

/// Scan down from Nyquist for the first shell which starts a run of `run`
/// consecutive shells (going down) with `FSC ≥ threshold`.
///
/// The run must be unbroken. Scattered shells above the threshold never add
/// up to a run, however many there are, so noisy curves which hover around
/// the threshold report the lower, consecutive cut-off.
pub fn resolution(curve: &FscCurve, threshold: f32, run: usize) -> Resolution {
    let run = run.max(1);
    if curve.len() < run { return Resolution::Unresolved }
    (run - 1..curve.len())
        .rev()
        .find(|&top| curve.fsc[top + 1 - run..=top].iter().all(|&f| f >= threshold))
        .map_or(Resolution::Unresolved, |top| Resolution::Resolved(curve.frequency[top]))
}


// ----- Imports -----------------------------------------------------------------------------------------
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;

use units::todo::{Frequencyf32, Lengthf32};

use crate::{
    error::{Error, Result},
    fft::{complexify, Fft3d},
    index::{index1_to_3, signed},
    volume::Volume,
};
