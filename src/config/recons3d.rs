//! Configuration file parser for `recons3d`

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {

    /// Side of the cubic output volume, in voxels
    pub size: usize,

    /// Fourier grid oversampling
    #[serde(default = "default_npad")]
    pub npad: usize,

    /// Point group: `c<n>`, `d<n>`, `tet`, `oct` or `icos`
    #[serde(default = "default_symmetry")]
    pub symmetry: String,

    #[serde(default = "default_snr")]
    pub snr: Ratiof32,

    /// Number of local workers sharing the images
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Divide the result by the gridding kernel's transform
    #[serde(default = "default_true")]
    pub compensate: bool,

    /// Presence enables CTF weighting
    pub ctf: Option<Ctf>,

    pub smear: Option<SmearConfig>,

    #[serde(default)]
    pub resolution: ResolutionConfig,
}

/// Optics shared by every image in the stack. Defocus is per image.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Ctf {
    #[serde(default)]
    pub sign: CtfSign,

    #[serde(deserialize_with = "deserialize_uom")]
    pub voltage: ElectricPotential,

    #[serde(deserialize_with = "deserialize_uom")]
    pub cs: Length,

    #[serde(deserialize_with = "deserialize_uom")]
    pub pixel: Length,

    pub amplitude: Ratiof32,

    /// Envelope B-factor in Å²
    #[serde(default)]
    pub bfactor: BFactorf32,

    /// Images have already been multiplied by their CTF (not merely phase
    /// flipped): insertion then applies only the sign, while the weight is
    /// still CTF²
    #[serde(default)]
    pub applied: bool,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SmearConfig {
    pub count: usize,
    #[serde(deserialize_with = "deserialize_uom")]
    pub step: Angle,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResolutionConfig {

    /// Also build odd and even halves and correlate them
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub split: SplitRule,

    pub only_group: Option<u32>,

    /// Radius of the spherical mask applied to both halves, in voxels
    pub mask_radius: Option<Lengthf32>,

    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default = "default_run")]
    pub run: usize,

    /// Report at least this frequency (cycles per voxel)
    pub floor: Option<Frequencyf32>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            split: SplitRule::default(),
            only_group: None,
            mask_radius: None,
            threshold: default_threshold(),
            run: default_run(),
            floor: None,
        }
    }
}

fn default_npad     () -> usize    { 2 }
fn default_symmetry () -> String   { "c1".into() }
fn default_snr      () -> Ratiof32 { 1.0 }
fn default_workers  () -> usize    { 1 }
fn default_true     () -> bool     { true }
fn default_threshold() -> f32      { DEFAULT_THRESHOLD }
fn default_run      () -> usize    { DEFAULT_RUN }

impl Config {

    /// Accumulator parameters, validated.
    pub fn params(&self) -> Result<Params> {
        let weighting = Weighting {
            snr: Some(self.snr),
            ctf: self.ctf.is_some(),
            sign: self.ctf.as_ref().map_or(CtfSign::Positive, |c| c.sign),
            smear: self.smear.map(|SmearConfig { count, step }| Smear { count, step }),
        };
        let params = Params::new(self.size)
            .with_npad(self.npad)
            .with_symmetry(&self.symmetry)?
            .with_weighting(weighting);
        params.validate()?;
        if self.workers == 0 {
            return Err(Error::InvalidConfiguration("need at least one worker".into()));
        }
        Ok(params)
    }

    /// CTF parameters for `RawStack::open`. The defocus is a placeholder which
    /// each image replaces with its own.
    pub fn optics(&self) -> Option<CtfDescriptor> {
        self.ctf.as_ref().map(|c| {
            let desc = CtfDescriptor::new(um(0.0), c.voltage, c.cs, c.pixel, ratio(c.amplitude))
                .with_bfactor(c.bfactor);
            if c.applied { desc.already_applied() } else { desc }
        })
    }

    pub fn resolution_settings(&self) -> Settings {
        let r = &self.resolution;
        Settings {
            split: r.split,
            only_group: r.only_group,
            mask: r.mask_radius.map(|radius| sphere(self.size, radius)),
            threshold: r.threshold,
            run: r.run,
            compensate: self.compensate,
        }
    }
}

impl ResolutionConfig {
    /// Apply the optional floor: estimates below it, and unresolved curves,
    /// report the floor instead.
    pub fn floored(&self, resolution: Resolution) -> Resolution {
        match (self.floor, resolution) {
            (None, r) => r,
            (Some(floor), Resolution::Resolved(f)) => Resolution::Resolved(f.max(floor)),
            (Some(floor), Resolution::Unresolved ) => Resolution::Resolved(floor),
        }
    }
}

pub fn read_config_file(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path).map_err(Error::io(path))?;
    toml::from_str(&text).map_err(|source| Error::Config { path: path.into(), source })
}


// ----- Imports -----------------------------------------------------------------------------------------
use std::fs;
use std::path::Path;

use serde::Deserialize;

use units::{ratio, um, Angle, ElectricPotential, Length, todo::{BFactorf32, Frequencyf32, Lengthf32, Ratiof32}};

use crate::{
    accumulator::{Params, Weighting},
    config::deserialize_uom,
    ctf::{CtfDescriptor, CtfSign},
    error::{Error, Result},
    fsc::{Resolution, DEFAULT_RUN, DEFAULT_THRESHOLD},
    inserter::Smear,
    mask::sphere,
    resolution::{Settings, SplitRule},
};
