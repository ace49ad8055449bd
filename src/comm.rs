//! Message passing between reconstruction workers.
//!
//! Workers exchange typed `Message`s point to point; messages between any
//! pair of workers arrive in the order they were sent. The collectives built
//! on top (`reduce_sum`, `broadcast`, `all_reduce_count`) must be entered by
//! every worker, in the same order, or the run stalls.

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Data { shape: Vec<usize>, data: Vec<f32> },
    Count(u64),
    /// Outcome of a collective as seen by its root: `None` means success
    Status(Option<String>),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Data { .. } => "data",
            Message::Count(_)    => "count",
            Message::Status(_)   => "status",
        }
    }
}

fn unexpected(expected: &str, got: &Message, from: usize) -> Error {
    Error::CollectiveProtocol(format!("expected {expected} from worker {from}, got {}", got.kind()))
}

pub trait Communicator {

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn send(&self, to: usize, message: Message) -> Result<()>;
    fn recv(&self, from: usize) -> Result<Message>;

    fn barrier(&self);

    fn is_root(&self, root: usize) -> bool { self.rank() == root }

    /// Element-wise sum of every worker's `data` (all of shape `shape`),
    /// delivered to `root`. Every worker learns whether the reduction
    /// succeeded, so a shape mismatch anywhere fails everywhere.
    fn reduce_sum(&self, shape: &[usize], data: Vec<f32>, root: usize) -> Result<Option<Vec<f32>>> {
        check_root(self, root)?;
        let expected_len: usize = shape.iter().product();
        if self.rank() != root {
            self.send(root, Message::Data { shape: shape.to_vec(), data })?;
            return match self.recv(root)? {
                Message::Status(None)         => Ok(None),
                Message::Status(Some(reason)) => Err(Error::CollectiveProtocol(reason)),
                other => Err(unexpected("status", &other, root)),
            };
        }

        let mut sum = data;
        let mut failure = (sum.len() != expected_len)
            .then(|| format!("root holds {} values for shape {shape:?}", sum.len()));
        for source in (0..self.size()).filter(|&r| r != root) {
            match self.recv(source) {
                Ok(Message::Data { shape: their_shape, data }) if their_shape == shape && data.len() == sum.len() => {
                    sum.iter_mut().zip(&data).for_each(|(s, d)| *s += d);
                },
                Ok(Message::Data { shape: their_shape, .. }) => {
                    failure.get_or_insert(format!("worker {source} sent shape {their_shape:?}, expected {shape:?}"));
                },
                Ok(other) => { failure.get_or_insert(unexpected("data", &other, source).to_string()); },
                Err(e)    => { failure.get_or_insert(e.to_string()); },
            }
        }
        for dest in (0..self.size()).filter(|&r| r != root) {
            // A worker which has already gone away cannot be told
            let _ = self.send(dest, Message::Status(failure.clone()));
        }
        match failure {
            None         => Ok(Some(sum)),
            Some(reason) => Err(Error::CollectiveProtocol(reason)),
        }
    }

    /// `root` supplies the message; everybody returns it.
    fn broadcast(&self, message: Option<Message>, root: usize) -> Result<Message> {
        check_root(self, root)?;
        if self.rank() == root {
            let message = message.ok_or_else(|| Error::CollectiveProtocol("broadcast root has nothing to send".into()))?;
            for dest in (0..self.size()).filter(|&r| r != root) {
                self.send(dest, message.clone())?;
            }
            Ok(message)
        } else {
            self.recv(root)
        }
    }

    /// Sum of `count` over all workers, known to all workers.
    fn all_reduce_count(&self, count: u64) -> Result<u64> {
        let total = if self.rank() == 0 {
            let mut total = count;
            for source in 1..self.size() {
                match self.recv(source)? {
                    Message::Count(c) => total += c,
                    other => return Err(unexpected("count", &other, source)),
                }
            }
            Some(Message::Count(total))
        } else {
            self.send(0, Message::Count(count))?;
            None
        };
        match self.broadcast(total, 0)? {
            Message::Count(total) => Ok(total),
            other => Err(unexpected("count", &other, 0)),
        }
    }
}

fn check_root<C: Communicator + ?Sized>(comm: &C, root: usize) -> Result<()> {
    if root >= comm.size() {
        return Err(Error::InvalidConfiguration(format!("root {root} out of range for {} workers", comm.size())));
    }
    Ok(())
}

/// A single worker with no peers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Solo;

impl Communicator for Solo {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }

    fn send(&self, to: usize, _: Message) -> Result<()> {
        Err(Error::CollectiveProtocol(format!("single worker cannot send to worker {to}")))
    }

    fn recv(&self, from: usize) -> Result<Message> {
        Err(Error::CollectiveProtocol(format!("single worker cannot receive from worker {from}")))
    }

    fn barrier(&self) {}
}

/// One endpoint of an in-process cluster: each worker runs on its own thread
/// and owns its data; only messages cross between threads.
pub struct LocalComm {
    rank: usize,
    size: usize,
    outgoing: Vec<Option<Sender<Message>>>,
    incoming: Vec<Option<Receiver<Message>>>,
    barrier: Arc<Barrier>,
}

impl LocalComm {
    /// Fully connected endpoints for `size` workers.
    pub fn create(size: usize) -> Vec<LocalComm> {
        let barrier = Arc::new(Barrier::new(size));
        let mut comms: Vec<LocalComm> = (0..size)
            .map(|rank| LocalComm {
                rank, size,
                outgoing: (0..size).map(|_| None).collect(),
                incoming: (0..size).map(|_| None).collect(),
                barrier: Arc::clone(&barrier),
            })
            .collect();
        for (from, to) in iproduct!(0..size, 0..size).filter(|(a, b)| a != b) {
            let (tx, rx) = channel();
            comms[from].outgoing[to] = Some(tx);
            comms[to].incoming[from] = Some(rx);
        }
        comms
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.size }

    fn send(&self, to: usize, message: Message) -> Result<()> {
        let channel = self.outgoing.get(to).and_then(Option::as_ref)
            .ok_or_else(|| Error::CollectiveProtocol(format!("worker {} has no channel to {to}", self.rank)))?;
        channel.send(message)
            .map_err(|_| Error::CollectiveProtocol(format!("worker {to} has gone away")))
    }

    fn recv(&self, from: usize) -> Result<Message> {
        let channel = self.incoming.get(from).and_then(Option::as_ref)
            .ok_or_else(|| Error::CollectiveProtocol(format!("worker {} has no channel from {from}", self.rank)))?;
        channel.recv()
            .map_err(|_| Error::CollectiveProtocol(format!("worker {from} disconnected")))
    }

    fn barrier(&self) { self.barrier.wait(); }
}

/// Run `work` on `workers` threads, one `LocalComm` each, and collect the
/// results in rank order. A panic on any worker is propagated.
pub fn run_local<T, F>(workers: usize, work: F) -> Vec<T>
where
    T: Send,
    F: Fn(LocalComm) -> T + Sync,
{
    let comms = LocalComm::create(workers);
    std::thread::scope(|scope| {
        let work = &work;
        let handles: Vec<_> = comms.into_iter()
            .map(|comm| scope.spawn(move || work(comm)))
            .collect();
        handles.into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}


// ----- Imports -----------------------------------------------------------------------------------------
use std::sync::{mpsc::{channel, Receiver, Sender}, Arc, Barrier};

use itertools::iproduct;

use crate::error::{Error, Result};
