//! Split-half resolution estimation.
//!
//! Images are divided into two independent halves which are accumulated in
//! a single pass, reduced, finished and correlated. The full map is the sum
//! of both halves. Reducing and finishing the odd half, the even half and the
//! full map happen on different workers where possible, to spread memory.

/// Which half of the split an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half { Odd, Even }

/// How images are assigned to halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitRule {
    /// Images 0, 2, 4, ... of the global sequence form the odd half
    Parity,
    /// Whole groups go to one half, by parity of the group tag
    Group,
    /// The image's chunk tag (0 or 1) decides
    Chunk,
    /// Group parity for images with a group tag, sequence parity otherwise
    #[default]
    Auto,
}

impl SplitRule {
    pub fn half(&self, index: usize, image: &OrientedImage) -> Result<Half> {
        let by_parity = |n: usize| if n % 2 == 0 { Half::Odd } else { Half::Even };
        match self {
            SplitRule::Parity => Ok(by_parity(index)),
            SplitRule::Group => image.group
                .map(|g| by_parity(g as usize))
                .ok_or_else(|| Error::InvalidImage { index, reason: "split by group, but image has no group tag".into() }),
            SplitRule::Chunk => match image.chunk {
                Some(0) => Ok(Half::Odd),
                Some(1) => Ok(Half::Even),
                other => Err(Error::InvalidImage { index, reason: format!("chunk tag {other:?} is neither 0 nor 1") }),
            },
            SplitRule::Auto => Ok(by_parity(image.group.map_or(index, |g| g as usize))),
        }
    }
}

/// Workers responsible for the odd half, the even half and the full map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles { pub odd: usize, pub even: usize, pub full: usize }

pub fn roles(root: usize, workers: usize) -> Roles {
    match workers {
        0 | 1 => Roles { odd: root, even: root, full: root },
        2     => Roles { odd: root, even: (root + 1) % 2, full: root },
        w     => Roles { odd: root, even: (root + w - 1) % w, full: (root + w / 2) % w },
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub split: SplitRule,
    /// Only use images carrying this group tag
    pub only_group: Option<u32>,
    /// Defaults to a sphere of radius `size/2 - 2`
    pub mask: Option<Volume>,
    pub threshold: f32,
    pub run: usize,
    pub compensate: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { split: SplitRule::Auto, only_group: None, mask: None, threshold: DEFAULT_THRESHOLD, run: DEFAULT_RUN, compensate: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionEstimate {
    /// Correlation between the two half maps
    pub fsc: FscCurve,
    /// Cut-off of the half-map curve
    pub resolution: Resolution,
}

#[derive(Debug)]
pub struct ReconstructionResult {
    /// Built from both halves
    pub volume: Volume,
    pub odd: Option<Volume>,
    pub even: Option<Volume>,
    /// `InsufficientData` if either half was empty
    pub estimate: Result<ResolutionEstimate>,
}

/// Reconstruct two half maps and the full map from this worker's `share` of
/// the images, and estimate resolution. The result is returned on `root`;
/// other workers get `None`. Must be called by all workers.
pub fn estimate<'a, C, S>(comm: &C, share: S, params: &Params, root: usize, settings: &Settings) -> Result<Option<ReconstructionResult>>
where
    C: Communicator,
    S: IntoIterator<Item = Result<Indexed<'a>>>,
{
    let local = accumulate_halves(share, params, settings);
    let (odd, even) = agree(comm, local)?;

    let n_odd  = comm.all_reduce_count(odd .n_images() as u64)?;
    let n_even = comm.all_reduce_count(even.n_images() as u64)?;
    if n_odd + n_even == 0 {
        return Err(Error::InsufficientData("no images selected for reconstruction".into()));
    }
    let halves_ok = n_odd > 0 && n_even > 0;
    if !halves_ok {
        warn!("Odd half has {n_odd} images, even half {n_even}: skipping resolution estimate");
    }

    let roles = roles(root, comm.size());
    let rank = comm.rank();
    debug!("Worker {rank}: roles {roles:?}");
    let odd  = reduce_to_root(comm, odd , roles.odd )?;
    let even = reduce_to_root(comm, even, roles.even)?;

    // ----- assemble the full map on its worker --------------------------------------
    if rank == roles.odd  && roles.odd  != roles.full { send_accumulator(comm, roles.full, clone_of(&odd )?)?; }
    if rank == roles.even && roles.even != roles.full { send_accumulator(comm, roles.full, clone_of(&even)?)?; }
    let full = if rank == roles.full {
        let mut full = if roles.odd == rank { clone_of(&odd)? } else { recv_accumulator(comm, roles.odd, params)? };
        if roles.even == rank { full.merge(held(&even)?)?; }
        else                  { full.merge(&recv_accumulator(comm, roles.even, params)?)?; }
        Some(full.finish(settings.compensate))
    } else { None };

    let odd  = odd .filter(|_| halves_ok).map(|acc| acc.finish(settings.compensate));
    let even = even.filter(|_| halves_ok).map(|acc| acc.finish(settings.compensate));

    // ----- gather volumes on root ---------------------------------------------------
    let full = move_to_root(comm, full, roles.full, root, true)?;
    let odd  = move_to_root(comm, odd , roles.odd , root, halves_ok)?;
    let even = move_to_root(comm, even, roles.even, root, halves_ok)?;
    if rank != root { return Ok(None) }

    let volume = full.ok_or_else(|| Error::CollectiveProtocol("full map did not reach root".into()))?;
    let estimate = match (&odd, &even) {
        (Some(odd), Some(even)) => correlate(odd, even, params.size, settings),
        _ => Err(Error::InsufficientData(format!("odd half has {n_odd} images, even half {n_even}"))),
    };
    if let Ok(ResolutionEstimate { resolution, .. }) = &estimate {
        info!("Resolution estimate: {resolution:?}");
    }
    Ok(Some(ReconstructionResult { volume, odd, even, estimate }))
}

/// Convenience wrapper for a single process holding all images.
pub fn estimate_local(images: &[OrientedImage], params: &Params, settings: &Settings) -> Result<ReconstructionResult> {
    estimate(&Solo, in_memory(images, 0), params, 0, settings)?
        .ok_or_else(|| Error::CollectiveProtocol("single worker produced no result".into()))
}

fn accumulate_halves<'a, S>(share: S, params: &Params, settings: &Settings) -> Result<(Accumulator, Accumulator)>
where
    S: IntoIterator<Item = Result<Indexed<'a>>>,
{
    let mut odd  = Accumulator::new(params)?;
    let mut even = Accumulator::new(params)?;
    for item in share {
        let Indexed { index, image } = item?;
        if settings.only_group.is_some() && image.group != settings.only_group { continue }
        let target = match settings.split.half(index, &image)? {
            Half::Odd  => &mut odd,
            Half::Even => &mut even,
        };
        target.insert_indexed(index, &image, &image.transform, image.weight)?;
    }
    Ok((odd, even))
}

fn held(acc: &Option<Accumulator>) -> Result<&Accumulator> {
    acc.as_ref().ok_or_else(|| Error::CollectiveProtocol("reduced accumulator missing on its role worker".into()))
}

fn clone_of(acc: &Option<Accumulator>) -> Result<Accumulator> { held(acc).cloned() }

/// Send `volume` from `holder` to `root` when they differ. `expected` says
/// whether the holder has anything to send at all.
fn move_to_root<C: Communicator>(comm: &C, volume: Option<Volume>, holder: usize, root: usize, expected: bool) -> Result<Option<Volume>> {
    if !expected || holder == root { return Ok(volume) }
    let rank = comm.rank();
    if rank == holder {
        let volume = volume.ok_or_else(|| Error::CollectiveProtocol(format!("worker {rank} has no volume to send")))?;
        send_volume(comm, root, volume)?;
        Ok(None)
    } else if rank == root {
        Ok(Some(recv_volume(comm, holder)?))
    } else {
        Ok(None)
    }
}

fn correlate(odd: &Volume, even: &Volume, size: usize, settings: &Settings) -> Result<ResolutionEstimate> {
    let mask = settings.mask.clone().unwrap_or_else(|| default_mask(size));
    let fsc = fsc(&odd.masked(&mask)?, &even.masked(&mask)?)?;
    let resolution = fsc.resolution(settings.threshold, settings.run);
    Ok(ResolutionEstimate { fsc, resolution })
}


// ----- Imports -----------------------------------------------------------------------------------------
use tracing::{debug, info, warn};

use crate::{
    accumulator::{Accumulator, Params},
    comm::{Communicator, Solo},
    error::{Error, Result},
    fsc::{fsc, FscCurve, Resolution, DEFAULT_RUN, DEFAULT_THRESHOLD},
    image::OrientedImage,
    mask::default_mask,
    reduction::{agree, recv_accumulator, recv_volume, reduce_to_root, send_accumulator, send_volume},
    source::{in_memory, Indexed},
    volume::Volume,
};
