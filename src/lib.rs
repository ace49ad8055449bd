//! Direct Fourier-space reconstruction of a 3-d density from oriented 2-d
//! projections, with distributed reduction and split-half resolution
//! estimation.

mod exports;
pub use exports::*;

pub mod accumulator;
pub mod comm;
pub mod config;
pub mod ctf;
pub mod error;
pub mod fft;
pub mod fsc;
pub mod image;
pub mod index;
pub mod inserter;
pub mod io;
pub mod mask;
pub mod reduction;
pub mod resolution;
pub mod source;
pub mod symmetry;
pub mod synthetic;
pub mod utils;
pub mod volume;
