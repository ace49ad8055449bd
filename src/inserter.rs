//! Expansion of one image insertion into all symmetry-related (and optionally
//! angularly smeared) grid insertions.
//!
//! Images are never resampled: every copy reuses the image's Fourier
//! transform and differs only in the rotation used to place it.

/// Angular jitter applied to each insertion: `count` steps of `step` on each
/// side of the nominal orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smear {
    pub count: usize,
    pub step: Angle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmearStep {
    pub dphi: Angle,
    pub dtheta: Angle,
    pub dpsi: Angle,
    pub weight: Weightf32,
}

/// Jitter offsets in (phi, theta, psi), weights summing to one.
///
/// At `theta = 0` only `phi + psi` matters, so the untilted steps are merged
/// into a single axis whose weights count the `(phi, psi)` combinations they
/// stand for.
pub fn smear_kernel(Smear { count, step }: Smear) -> Vec<SmearStep> {
    let n = count as i32;
    let at = |i: i32| step * i as f32;
    let zero = at(0);

    let tilted = iproduct!((-n..=n).filter(|&j| j != 0), -n..=n, -n..=n)
        .map(|(j, i, k)| (at(i), at(j), at(k), 1.0));

    let untilted = (-2 * n..=2 * n).map(|i| {
        let combinations = iproduct!(-n..=n, -n..=n).filter(|(a, b)| a + b == i).count();
        (at(i), zero, zero, combinations as f32)
    });

    let raw: Vec<_> = tilted.chain(untilted).collect();
    let total: f32 = raw.iter().map(|s| s.3).sum();
    raw.into_iter()
        .map(|(dphi, dtheta, dpsi, w)| SmearStep { dphi, dtheta, dpsi, weight: w / total })
        .collect()
}

/// One grid insertion of an image's central section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Insertion {
    pub rotation: Rotation,
    pub weight: Weightf32,
}

#[derive(Debug, Clone)]
pub struct SliceInserter {
    symmetry: Symmetry,
    smear: Option<Vec<SmearStep>>,
}

impl SliceInserter {

    pub fn new(symmetry: Symmetry, smear: Option<Smear>) -> Self {
        let smear = smear.filter(|s| s.count > 0).map(smear_kernel);
        Self { symmetry, smear }
    }

    pub fn symmetry(&self) -> &Symmetry { &self.symmetry }

    /// Number of grid insertions produced per image.
    pub fn multiplicity(&self) -> usize {
        self.symmetry.order() * self.smear.as_ref().map_or(1, Vec::len)
    }

    /// Symmetry operators in the outer loop, smear steps in the inner one.
    /// Each copy carries the image's full weight (times its smear weight).
    pub fn expand(&self, transform: &Transform, weight: Weightf32) -> Vec<Insertion> {
        let orientations: Vec<(Rotation, Weightf32)> = match &self.smear {
            None => vec![(transform.rotation(), weight)],
            Some(kernel) => kernel.iter()
                .map(|s| (transform.perturbed(s.dphi, s.dtheta, s.dpsi).rotation(), weight * s.weight))
                .collect(),
        };
        let mut insertions = Vec::with_capacity(self.multiplicity());
        for (j, op) in self.symmetry.operators().iter().enumerate() {
            for (rotation, weight) in &orientations {
                let rotation = if j == 0 { *rotation } else { rotation.then(op) };
                insertions.push(Insertion { rotation, weight: *weight });
            }
        }
        insertions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use units::{deg, deg_};

    #[rstest(/**/ count, entries,
             case(1, 18 + 5),
             case(2, 4 * 25 + 9),
    )]
    fn kernel_size_and_normalization(count: usize, entries: usize) {
        let kernel = smear_kernel(Smear { count, step: deg(1.5) });
        assert_eq!(kernel.len(), entries);
        let total: f32 = kernel.iter().map(|s| s.weight).sum();
        assert_float_eq!(total, 1.0, abs <= 1e-6);
    }

    #[test]
    fn untilted_kernel_weights_count_combinations() {
        let kernel = smear_kernel(Smear { count: 1, step: deg(2.0) });
        let untilted: Vec<_> = kernel.iter().filter(|s| deg_(s.dtheta) == 0.0).collect();
        let weights: Vec<f32> = untilted.iter().map(|s| s.weight * 27.0).collect();
        assert_float_eq!(weights, vec![1.0, 2.0, 3.0, 2.0, 1.0], abs_all <= 1e-5);
        assert_float_eq!(deg_(untilted[0].dphi), -4.0, abs <= 1e-5);
    }

    #[test]
    fn c1_without_smear_is_the_image_rotation() {
        let inserter = SliceInserter::new(Symmetry::identity(), None);
        let t = Transform::from_degrees(12.0, 34.0, 56.0);
        let insertions = inserter.expand(&t, 0.7);
        assert_eq!(insertions, vec![Insertion { rotation: t.rotation(), weight: 0.7 }]);
    }

    #[test]
    fn symmetry_copies_keep_full_weight() {
        let inserter = SliceInserter::new(Symmetry::parse("d3").unwrap(), None);
        let insertions = inserter.expand(&Transform::from_degrees(10.0, 20.0, 30.0), 2.0);
        assert_eq!(insertions.len(), 6);
        assert!(insertions.iter().all(|i| i.weight == 2.0));
    }

    #[test]
    fn symmetry_outer_smear_inner() {
        let smear = Smear { count: 1, step: deg(1.0) };
        let inserter = SliceInserter::new(Symmetry::parse("c2").unwrap(), Some(smear));
        assert_eq!(inserter.multiplicity(), 46);
        let t = Transform::from_degrees(5.0, 40.0, 0.0);
        let insertions = inserter.expand(&t, 1.0);
        let op = inserter.symmetry().operators()[1];
        let first_of_second_block = insertions[23].rotation;
        let expected = insertions[0].rotation.then(&op);
        assert!(first_of_second_block.distance(&expected) < 1e-6);
    }

    #[test]
    fn zero_count_smear_is_no_smear() {
        let inserter = SliceInserter::new(Symmetry::identity(), Some(Smear { count: 0, step: deg(1.0) }));
        assert_eq!(inserter.multiplicity(), 1);
    }
}

// ----- Imports -----------------------------------------------------------------------------------------
use itertools::iproduct;

use geometry::{Rotation, Transform};
use units::{Angle, todo::Weightf32};

use crate::symmetry::Symmetry;
