/// Units which are simply type aliases for `f32` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// This may be because:
///
/// + We do not know how to implement them in `uom`.
///
/// + There are other complications in the client code which make using `uom`
///   difficult (FFT kernels, per-voxel arithmetic), so we use plain `f32`s, but
///   still want some clues in the source as to what they represent.

pub type Lengthf32    = f32;
pub type Anglef32     = f32;
pub type Weightf32    = f32;
pub type Ratiof32     = f32;
pub type Frequencyf32 = f32; // cycles per voxel
pub type Densityf32   = f32;
pub type Intensityf32 = f32;
pub type BFactorf32   = f32; // TODO uom Area in square angstroms
pub type Variancef32  = f32;
