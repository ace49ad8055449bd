//! Distributing images over workers and summing their partial volumes.

/// Split `n_items` into `n_workers` contiguous shares; the first
/// `n_items % n_workers` shares hold one extra item. Shares may be empty.
pub fn partition(n_items: usize, n_workers: usize) -> Result<Vec<Range<usize>>> {
    if n_workers == 0 {
        return Err(Error::InvalidConfiguration("need at least one worker".into()));
    }
    let (base, extra) = (n_items / n_workers, n_items % n_workers);
    let mut start = 0;
    Ok((0..n_workers).map(|w| {
        let len = base + usize::from(w < extra);
        let range = start..start + len;
        start += len;
        range
    }).collect())
}

/// This worker's share of `n_items`.
pub fn my_share<C: Communicator>(comm: &C, n_items: usize) -> Result<Range<usize>> {
    Ok(partition(n_items, comm.size())?.swap_remove(comm.rank()))
}

// ----- Packing accumulators into messages -----------------------------------------------

fn pack_fourier(fourier: &FourierVolume) -> (Vec<usize>, Vec<f32>) {
    let (a, b, c) = fourier.dim();
    (vec![a, b, c, 2], fourier.iter().flat_map(|z| [z.re, z.im]).collect())
}

fn pack_weight(weight: &WeightVolume) -> (Vec<usize>, Vec<f32>) {
    let (a, b, c) = weight.dim();
    (vec![a, b, c], weight.iter().copied().collect())
}

fn unpack_fourier(shape: (usize, usize, usize), data: Vec<f32>) -> Result<FourierVolume> {
    let complex: Vec<Complex32> = data.chunks_exact(2).map(|c| Complex32::new(c[0], c[1])).collect();
    Array3::from_shape_vec(shape, complex).map_err(protocol)
}

fn unpack_weight(shape: (usize, usize, usize), data: Vec<f32>) -> Result<WeightVolume> {
    Array3::from_shape_vec(shape, data).map_err(protocol)
}

fn protocol(e: impl std::fmt::Display) -> Error { Error::CollectiveProtocol(e.to_string()) }

/// Sum every worker's accumulator onto `root`, which receives the combined
/// accumulator; everybody else gets `None`. Must be called by all workers,
/// including those which inserted nothing.
pub fn reduce_to_root<C: Communicator>(comm: &C, acc: Accumulator, root: usize) -> Result<Option<Accumulator>> {
    let params = acc.params().clone();
    let shape = params.volume_shape();
    let (fourier, weight, n_images) = acc.into_parts();
    let n_images = comm.all_reduce_count(n_images as u64)? as usize;

    let (f_shape, f_data) = pack_fourier(&fourier);
    drop(fourier);
    let fourier = comm.reduce_sum(&f_shape, f_data, root)?;

    let (w_shape, w_data) = pack_weight(&weight);
    drop(weight);
    let weight = comm.reduce_sum(&w_shape, w_data, root)?;

    match (fourier, weight) {
        (Some(f), Some(w)) => {
            info!("Reduced {} images from {} workers onto worker {root}", n_images, comm.size());
            Ok(Some(Accumulator::from_parts(&params, unpack_fourier(shape, f)?, unpack_weight(shape, w)?, n_images)?))
        },
        _ => Ok(None),
    }
}

/// Point-to-point transfer of a whole accumulator.
pub fn send_accumulator<C: Communicator>(comm: &C, to: usize, acc: Accumulator) -> Result<()> {
    let (fourier, weight, n_images) = acc.into_parts();
    let (shape, data) = pack_fourier(&fourier);
    comm.send(to, Message::Data { shape, data })?;
    let (shape, data) = pack_weight(&weight);
    comm.send(to, Message::Data { shape, data })?;
    comm.send(to, Message::Count(n_images as u64))
}

pub fn recv_accumulator<C: Communicator>(comm: &C, from: usize, params: &Params) -> Result<Accumulator> {
    let shape = params.volume_shape();
    let fourier = match comm.recv(from)? {
        Message::Data { data, .. } => unpack_fourier(shape, data)?,
        other => return Err(Error::CollectiveProtocol(format!("expected Fourier volume, got {other:?}"))),
    };
    let weight = match comm.recv(from)? {
        Message::Data { data, .. } => unpack_weight(shape, data)?,
        other => return Err(Error::CollectiveProtocol(format!("expected weight volume, got {other:?}"))),
    };
    let n_images = match comm.recv(from)? {
        Message::Count(n) => n as usize,
        other => return Err(Error::CollectiveProtocol(format!("expected image count, got {other:?}"))),
    };
    Accumulator::from_parts(params, fourier, weight, n_images)
}

pub fn send_volume<C: Communicator>(comm: &C, to: usize, volume: Volume) -> Result<()> {
    comm.send(to, Message::Data { shape: volume.dims().to_vec(), data: volume.data })
}

pub fn recv_volume<C: Communicator>(comm: &C, from: usize) -> Result<Volume> {
    volume_from_message(comm.recv(from)?)
}

fn volume_from_message(message: Message) -> Result<Volume> {
    match message {
        Message::Data { shape, data } => match shape[..] {
            [n, m, k] if n == m && m == k => Volume::new(n, data).map_err(protocol),
            _ => Err(Error::CollectiveProtocol(format!("{shape:?} is not a cubic volume"))),
        },
        other => Err(Error::CollectiveProtocol(format!("expected volume, got {}", other.kind()))),
    }
}

/// Give every worker a copy of the volume held by `root`.
pub fn broadcast_volume<C: Communicator>(comm: &C, volume: Option<Volume>, root: usize) -> Result<Volume> {
    let message = volume.map(|v| Message::Data { shape: v.dims().to_vec(), data: v.data });
    volume_from_message(comm.broadcast(message, root)?)
}

/// Fail on every worker if any worker failed locally; the local error wins
/// where there is one.
pub fn agree<C: Communicator, T>(comm: &C, local: Result<T>) -> Result<T> {
    let failures = comm.all_reduce_count(u64::from(local.is_err()))?;
    match local {
        Err(e) => Err(e),
        Ok(_) if failures > 0 => Err(Error::CollectiveProtocol(format!("{failures} worker(s) failed"))),
        ok => ok,
    }
}

/// Insert this worker's share, reduce onto `root` and finish there.
/// Returns the volume on `root` and `None` elsewhere.
pub fn reconstruct<'a, C, S>(comm: &C, share: S, params: &Params, root: usize, compensate: bool) -> Result<Option<Volume>>
where
    C: Communicator,
    S: IntoIterator<Item = Result<Indexed<'a>>>,
{
    let local = Accumulator::new(params).and_then(|mut acc| {
        acc.accumulate(share)?;
        Ok(acc)
    });
    let acc = agree(comm, local)?;
    debug!("Worker {} inserted {} images", comm.rank(), acc.n_images());

    let total = comm.all_reduce_count(acc.n_images() as u64)?;
    if total == 0 {
        return Err(Error::InsufficientData("no images to reconstruct".into()));
    }
    Ok(reduce_to_root(comm, acc, root)?.map(|acc| acc.finish(compensate)))
}


// ----- Imports -----------------------------------------------------------------------------------------
use std::ops::Range;

use ndarray::Array3;
use num_complex::Complex32;
use tracing::{debug, info};

use crate::{
    accumulator::{Accumulator, FourierVolume, Params, WeightVolume},
    comm::{Communicator, Message},
    error::{Error, Result},
    source::Indexed,
    volume::Volume,
};
