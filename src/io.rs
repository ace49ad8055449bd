//! Headerless little-endian `f32` files: volumes and image stacks.
pub mod raw;
