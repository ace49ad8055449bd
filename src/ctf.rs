//! Contrast transfer function model.
//!
//! All map constructors are pure: callers that insert many images sharing a
//! descriptor keep the map themselves (see `Accumulator`'s map cache).

/// Astigmatic defocus: the defocus varies as `Δf + diff/2 · cos 2(α - angle)`
/// with azimuth `α` in the image plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Astigmatism {
    pub defocus_difference: Length,
    pub angle: Angle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CtfDescriptor {
    /// Positive values are underfocus
    pub defocus: Length,
    pub voltage: ElectricPotential,
    /// Spherical aberration
    pub cs: Length,
    pub pixel_size: Length,
    pub amplitude_contrast: Ratio,
    pub astigmatism: Option<Astigmatism>,
    /// Envelope decay `exp(-B s²/4)`, in Å²
    pub bfactor: BFactorf32,
    /// The image has already been multiplied by this CTF. Phase-flipped data
    /// do not qualify.
    pub applied: bool,
}

impl CtfDescriptor {

    pub fn new(defocus: Length, voltage: ElectricPotential, cs: Length, pixel_size: Length, amplitude_contrast: Ratio) -> Self {
        Self { defocus, voltage, cs, pixel_size, amplitude_contrast, astigmatism: None, bfactor: 0.0, applied: false }
    }

    pub fn with_astigmatism(self, defocus_difference: Length, angle: Angle) -> Self {
        Self { astigmatism: Some(Astigmatism { defocus_difference, angle }), ..self }
    }

    pub fn with_bfactor(self, bfactor: BFactorf32) -> Self { Self { bfactor, ..self } }

    pub fn already_applied(self) -> Self { Self { applied: true, ..self } }

    pub fn validate(&self) -> Result<()> {
        let bad = |what: &str| Err(Error::InvalidConfiguration(format!("CTF {what}")));
        let a = ratio_(self.amplitude_contrast);
        if !(0.0..1.0).contains(&a)            { return bad(&format!("amplitude contrast {a} outside [0, 1)")) }
        if !(angstrom_(self.pixel_size) > 0.0) { return bad("pixel size must be positive") }
        if !(volt_(self.voltage) > 0.0)        { return bad("voltage must be positive") }
        if !angstrom_(self.defocus).is_finite() || !angstrom_(self.cs).is_finite() || !self.bfactor.is_finite() {
            return bad("parameters must be finite")
        }
        Ok(())
    }

    /// Relativistic electron wavelength in Å.
    pub fn wavelength(&self) -> Lengthf32 {
        let v = volt_(self.voltage);
        12.2643247 / (v * (1.0 + 0.978466e-6 * v)).sqrt()
    }

    /// CTF at spatial frequency `s` (1/Å) and azimuth `alpha` (radians).
    pub fn value(&self, s: f32, alpha: f32) -> f32 {
        let Precomputed { lambda, defocus, cs, amplitude, phase_weight } = self.precompute();
        let defocus = match self.astigmatism {
            Some(Astigmatism { defocus_difference, angle }) =>
                defocus + 0.5 * angstrom_(defocus_difference) * (2.0 * (alpha - radian_(angle))).cos(),
            None => defocus,
        };
        let s2 = s * s;
        let chi = PI * lambda * defocus * s2 - FRAC_PI_2 * cs * lambda.powi(3) * s2 * s2;
        let envelope = (-self.bfactor * s2 / 4.0).exp();
        (phase_weight * chi.sin() + amplitude * chi.cos()) * envelope
    }

    fn precompute(&self) -> Precomputed {
        let amplitude = ratio_(self.amplitude_contrast);
        Precomputed {
            lambda: self.wavelength(),
            defocus: angstrom_(self.defocus),
            cs: angstrom_(self.cs),
            amplitude,
            phase_weight: (1.0 - amplitude * amplitude).sqrt(),
        }
    }
}

struct Precomputed { lambda: f32, defocus: f32, cs: f32, amplitude: f32, phase_weight: f32 }

/// Sign applied to the CTF before it multiplies inserted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CtfSign {
    #[default]
    Positive,
    Negative,
}

impl CtfSign {
    pub fn factor(self) -> f32 {
        match self { CtfSign::Positive => 1.0, CtfSign::Negative => -1.0 }
    }
}

/// A CTF-derived quantity sampled on the `kx ≥ 0` half of a `P × P` frequency
/// plane; stored as `[[ky index, kx]]` with FFT-ordered `ky`.
#[derive(Debug, Clone, PartialEq)]
pub struct CtfMap {
    padded: usize,
    values: Array2<f32>,
}

impl CtfMap {
    #[inline]
    pub fn get(&self, kx: usize, ky: i32) -> f32 { self.values[[wrap(ky, self.padded), kx]] }

    pub fn padded(&self) -> usize { self.padded }

    /// Sample an arbitrary function of the in-plane frequency `(kx, ky)`.
    pub fn from_fn(padded: usize, f: impl Fn(usize, i32) -> f32) -> Self {
        let values = Array2::from_shape_fn((padded, padded / 2 + 1), |(iy, kx)| f(kx, signed(iy, padded)));
        Self { padded, values }
    }

    pub fn values(&self) -> &Array2<f32> { &self.values }
}

fn sample(desc: &CtfDescriptor, padded: usize, f: impl Fn(f32) -> f32) -> CtfMap {
    let scale = 1.0 / (padded as f32 * angstrom_(desc.pixel_size));
    CtfMap::from_fn(padded, |kx, ky| {
        let (kx, ky) = (kx as f32, ky as f32);
        let s = (kx * kx + ky * ky).sqrt() * scale;
        f(desc.value(s, ky.atan2(kx)))
    })
}

/// Signed CTF over the padded frequency plane.
pub fn ctf_map(desc: &CtfDescriptor, padded: usize) -> CtfMap { sample(desc, padded, |c| c) }

pub fn ctf_squared_map(desc: &CtfDescriptor, padded: usize) -> CtfMap { sample(desc, padded, |c| c * c) }

pub fn ctf_abs_map(desc: &CtfDescriptor, padded: usize) -> CtfMap { sample(desc, padded, f32::abs) }

/// Per-shell background noise variance of one image (or micrograph), indexed
/// by radius in unpadded Fourier pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSpectrum {
    variance: Vec<Variancef32>,
}

impl NoiseSpectrum {

    pub fn new(variance: Vec<Variancef32>) -> Result<Self> {
        if variance.is_empty() || variance.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(Error::InvalidConfiguration(
                "noise variances must be positive and finite".into()));
        }
        Ok(Self { variance })
    }

    /// `1/σ²` for a frequency at radius `padded_radius` on a grid padded by
    /// `npad`; radii beyond the last shell use the last shell.
    #[inline]
    pub fn inverse_variance(&self, padded_radius: f32, npad: usize) -> f32 {
        let shell = (padded_radius / npad as f32).round() as usize;
        1.0 / self.variance[shell.min(self.variance.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use units::{angstrom, kv, mm, ratio, um, deg};

    fn krios(defocus_um: f32) -> CtfDescriptor {
        CtfDescriptor::new(um(defocus_um), kv(300.0), mm(2.7), angstrom(1.0), ratio(0.1))
    }

    #[rstest(/**/ kilovolts, lambda,
             case(100.0, 0.037014),
             case(200.0, 0.025079),
             case(300.0, 0.019687),
    )]
    fn relativistic_wavelength(kilovolts: f32, lambda: f32) {
        let desc = CtfDescriptor { voltage: kv(kilovolts), ..krios(1.0) };
        assert_float_eq!(desc.wavelength(), lambda, abs <= 2e-5);
    }

    #[test]
    fn dc_term_is_amplitude_contrast() {
        assert_float_eq!(krios(2.0).value(0.0, 0.0), 0.1, abs <= 1e-6);
    }

    #[test]
    fn first_zero_of_pure_phase_contrast() {
        let desc = CtfDescriptor { cs: mm(0.0), amplitude_contrast: ratio(0.0), ..krios(1.0) };
        // chi = pi  <=>  lambda * defocus * s^2 = 1
        let s = 1.0 / (desc.wavelength() * 1.0e4).sqrt();
        assert_float_eq!(desc.value(s, 0.0), 0.0, abs <= 1e-3);
        assert!(desc.value(0.5 * s, 0.0) > 0.5);
    }

    #[test]
    fn astigmatism_shifts_defocus_along_its_axis() {
        let round = krios(1.0);
        let astig = round.with_astigmatism(um(0.4), deg(30.0));
        let s = 0.1;
        let along  = 30.0_f32.to_radians();
        let across = along + FRAC_PI_2;
        assert_float_eq!(astig.value(s, along ), krios(1.2).value(s, 0.0), abs <= 1e-4);
        assert_float_eq!(astig.value(s, across), krios(0.8).value(s, 0.0), abs <= 1e-4);
    }

    #[test]
    fn bfactor_damps_high_frequencies() {
        let s = 0.2;
        let sharp = krios(1.5);
        let soft  = sharp.with_bfactor(100.0);
        assert_float_eq!(soft.value(s, 0.0), sharp.value(s, 0.0) * (-1.0_f32).exp(), r2nd <= 1e-4);
    }

    #[test]
    fn derived_maps_agree_with_signed_map() {
        let desc = krios(1.3).with_astigmatism(um(0.2), deg(10.0));
        let p = 32;
        let signed  = ctf_map(&desc, p);
        let squared = ctf_squared_map(&desc, p);
        let abs     = ctf_abs_map(&desc, p);
        assert_eq!(signed.values().dim(), (32, 17));
        for ky in -15..=15 {
            for kx in 0..=15 {
                let c = signed.get(kx, ky);
                assert_float_eq!(squared.get(kx, ky), c * c  , ulps <= 1);
                assert_float_eq!(abs    .get(kx, ky), c.abs(), ulps <= 1);
            }
        }
    }

    #[rstest(/**/ amplitude, pixel, ok,
             case(0.1, 1.0, true ),
             case(1.0, 1.0, false),
             case(-0.1, 1.0, false),
             case(0.1, 0.0, false),
    )]
    fn descriptor_validation(amplitude: f32, pixel: f32, ok: bool) {
        let desc = CtfDescriptor { amplitude_contrast: ratio(amplitude), pixel_size: angstrom(pixel), ..krios(1.0) };
        assert_eq!(desc.validate().is_ok(), ok);
    }

    #[test]
    fn noise_shells_follow_unpadded_radius() {
        let noise = NoiseSpectrum::new(vec![1.0, 2.0, 4.0]).unwrap();
        assert_float_eq!(noise.inverse_variance(0.0, 2), 1.0 , ulps <= 1);
        assert_float_eq!(noise.inverse_variance(2.2, 2), 0.5 , ulps <= 1);
        assert_float_eq!(noise.inverse_variance(9.0, 2), 0.25, ulps <= 1);
        assert!(NoiseSpectrum::new(vec![1.0, 0.0]).is_err());
    }

    #[test]
    fn sign_factor() {
        assert_eq!(CtfSign::default().factor(), 1.0);
        assert_eq!(CtfSign::Negative .factor(), -1.0);
    }
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::f32::consts::{FRAC_PI_2, PI};

use ndarray::Array2;

use units::{
    angstrom_, radian_, ratio_, volt_,
    Angle, ElectricPotential, Length, Ratio,
    todo::{BFactorf32, Lengthf32, Variancef32},
};

use crate::{
    error::{Error, Result},
    index::{signed, wrap},
};
