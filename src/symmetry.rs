//! Point-group symmetry operators.
//!
//! Identifiers: `c<n>`, `d<n>`, `t`/`tet`, `o`/`oct`, `i`/`icos` (case
//! insensitive). The symmetry axis of `c<n>` and `d<n>` is z; the 2-fold axes
//! of `d<n>` include x. Tetrahedral, octahedral and icosahedral groups have
//! 2-fold (or 4-fold) axes along x, y and z and a 3-fold axis along (1,1,1);
//! icosahedral 5-folds pass through `(0, ±1, ±φ)`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointGroup {
    Cyclic(u32),
    Dihedral(u32),
    Tetrahedral,
    Octahedral,
    Icosahedral,
}

impl FromStr for PointGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        let fold = |digits: &str| -> Result<u32> {
            match digits.parse::<u32>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(Error::InvalidConfiguration(format!("bad symmetry fold in '{s}'"))),
            }
        };
        Ok(match s.as_str() {
            "t" | "tet"  => PointGroup::Tetrahedral,
            "o" | "oct"  => PointGroup::Octahedral,
            "i" | "icos" => PointGroup::Icosahedral,
            _ if s.starts_with('c') => PointGroup::Cyclic  (fold(&s[1..])?),
            _ if s.starts_with('d') => PointGroup::Dihedral(fold(&s[1..])?),
            _ => return Err(Error::InvalidConfiguration(format!("unknown symmetry '{s}'"))),
        })
    }
}

impl std::fmt::Display for PointGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointGroup::Cyclic(n)   => write!(f, "c{n}"),
            PointGroup::Dihedral(n) => write!(f, "d{n}"),
            PointGroup::Tetrahedral => write!(f, "tet"),
            PointGroup::Octahedral  => write!(f, "oct"),
            PointGroup::Icosahedral => write!(f, "icos"),
        }
    }
}

impl PointGroup {
    pub fn order(&self) -> usize {
        match *self {
            PointGroup::Cyclic(n)   => n as usize,
            PointGroup::Dihedral(n) => 2 * n as usize,
            PointGroup::Tetrahedral => 12,
            PointGroup::Octahedral  => 24,
            PointGroup::Icosahedral => 60,
        }
    }
}

/// The ordered operator list of a point group; the identity always comes
/// first.
#[derive(Debug, Clone, PartialEq)]
pub struct Symmetry {
    group: PointGroup,
    operators: Vec<Rotation>,
}

impl Symmetry {

    pub fn new(group: PointGroup) -> Self {
        let operators = generate(group).iter().map(Rotation::from_matrix_f64).collect();
        Self { group, operators }
    }

    pub fn parse(s: &str) -> Result<Self> { Ok(Self::new(s.parse()?)) }

    pub fn identity() -> Self { Self::new(PointGroup::Cyclic(1)) }

    pub fn group(&self) -> PointGroup { self.group }

    pub fn order(&self) -> usize { self.operators.len() }

    pub fn operators(&self) -> &[Rotation] { &self.operators }
}

impl Default for Symmetry {
    fn default() -> Self { Self::identity() }
}

type M = Matrix3<f64>;

fn rz(angle: f64) -> M {
    let (s, c) = angle.sin_cos();
    M::new(c, -s, 0.0,
           s,  c, 0.0,
           0.0, 0.0, 1.0)
}

/// Rotation by `angle` about the unit vector `axis` (Rodrigues).
fn about_axis(axis: Vector3<f64>, angle: f64) -> M {
    let u = axis.normalize();
    let (s, c) = angle.sin_cos();
    M::identity() * c + u.cross_matrix() * s + (u * u.transpose()) * (1.0 - c)
}

fn three_fold() -> M {
    M::new(0.0, 0.0, 1.0,
           1.0, 0.0, 0.0,
           0.0, 1.0, 0.0)
}

fn generate(group: PointGroup) -> Vec<M> {
    let ops = match group {
        PointGroup::Cyclic(n) => cyclic(n),
        PointGroup::Dihedral(n) => {
            let flip = M::from_diagonal(&Vector3::new(1.0, -1.0, -1.0));
            let c = cyclic(n);
            let flipped: Vec<M> = c.iter().map(|m| m * flip).collect();
            c.into_iter().chain(flipped).collect()
        },
        PointGroup::Tetrahedral => closure(&[rz(PI), three_fold()]),
        PointGroup::Octahedral  => closure(&[rz(FRAC_PI_2), three_fold()]),
        PointGroup::Icosahedral => {
            let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
            let five_fold = about_axis(Vector3::new(0.0, 1.0, phi), TAU / 5.0);
            closure(&[rz(PI), three_fold(), five_fold])
        },
    };
    ops.into_iter().map(snap).collect()
}

fn cyclic(n: u32) -> Vec<M> {
    (0..n).map(|k| if k == 0 { M::identity() } else { rz(TAU * k as f64 / n as f64) }).collect()
}

/// All products of `generators`, breadth first from the identity.
fn closure(generators: &[M]) -> Vec<M> {
    let mut group = vec![M::identity()];
    let mut frontier = 0;
    while frontier < group.len() {
        let current = group[frontier];
        for g in generators {
            let candidate = current * g;
            if !group.iter().any(|m| (m - candidate).abs().max() < 1e-6) {
                group.push(candidate);
            }
        }
        frontier += 1;
    }
    group
}

/// Remove rounding noise from entries which are exactly 0, ±1/2 or ±1.
fn snap(m: M) -> M {
    m.map(|x| {
        for exact in [0.0, 0.5, -0.5, 1.0, -1.0] {
            if (x - exact).abs() < 1e-9 { return exact }
        }
        x
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest(/**/ name  , order,
             case("c1"  ,  1),
             case("C4"  ,  4),
             case("c13" , 13),
             case("d1"  ,  2),
             case("d7"  , 14),
             case("t"   , 12),
             case("tet" , 12),
             case("o"   , 24),
             case("oct" , 24),
             case("i"   , 60),
             case("icos", 60),
    )]
    fn group_orders(name: &str, order: usize) {
        let sym = Symmetry::parse(name).unwrap();
        assert_eq!(sym.order(), order);
        assert_eq!(sym.group().order(), order);
        assert_eq!(sym.operators()[0], Rotation::identity());
    }

    #[rstest(/**/ name,
             case(""), case("x3"), case("c0"), case("d"), case("cfour"), case("ico"),
    )]
    fn unknown_symmetries_are_rejected(name: &str) {
        assert!(matches!(Symmetry::parse(name), Err(Error::InvalidConfiguration(_))));
    }

    #[rstest(/**/ name, case("d5"), case("t"), case("o"), case("i"))]
    fn operators_form_a_closed_group(name: &str) {
        let sym = Symmetry::parse(name).unwrap();
        let ops = sym.operators();
        for a in ops {
            for b in ops {
                let ab = a.then(b);
                assert!(ops.iter().any(|c| c.distance(&ab) < 1e-4), "{name}: product escaped the group");
            }
        }
    }

    #[test]
    fn operators_are_distinct_rotations() {
        let sym = Symmetry::parse("i").unwrap();
        let ops = sym.operators();
        for (i, a) in ops.iter().enumerate() {
            assert!((a.matrix().determinant() - 1.0).abs() < 1e-5);
            for b in &ops[i + 1..] {
                assert!(a.distance(b) > 1e-3);
            }
        }
    }

    #[test]
    fn display_roundtrip() {
        for name in ["c3", "d2", "tet", "oct", "icos"] {
            assert_eq!(name.parse::<PointGroup>().unwrap().to_string(), name);
        }
    }
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::str::FromStr;

use geometry::{Matrix3, Rotation, Vector3};

use crate::error::{Error, Result};
