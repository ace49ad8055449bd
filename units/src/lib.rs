pub mod todo;

pub use uom;
pub use float_eq;

pub use uom::si::Quantity;
pub use uom::si::f32::{Angle, ElectricPotential, Length, Ratio};

mod units {
  pub use uom::si::{length           ::{angstrom, nanometer, micrometer, millimeter},
                    electric_potential::{volt, kilovolt},
                    ratio            ::ratio,
                    angle            ::{radian, degree},
  };
}
// Making values from float literals seems to be very long-winded, so provide
// some pithily-named convenience constructors.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f32) -> $quantity { $quantity::new::<units::$unit>(x) }
  };
}

wrap!(angstrom Length                angstrom);
wrap!(nm       Length               nanometer);
wrap!(um       Length              micrometer);
wrap!(mm       Length              millimeter);
wrap!(volt     ElectricPotential         volt);
wrap!(kv       ElectricPotential     kilovolt);
wrap!(ratio    Ratio                    ratio);
wrap!(radian   Angle                   radian);
wrap!(deg      Angle                   degree);

// Reverse direction of the above.
pub fn angstrom_(x: Length) -> f32 { x.get::<units::angstrom>  () }
pub fn nm_      (x: Length) -> f32 { x.get::<units::nanometer> () }
pub fn um_      (x: Length) -> f32 { x.get::<units::micrometer>() }
pub fn mm_      (x: Length) -> f32 { x.get::<units::millimeter>() }

pub fn volt_(x: ElectricPotential) -> f32 { x.get::<units::volt>    () }
pub fn kv_  (x: ElectricPotential) -> f32 { x.get::<units::kilovolt>() }

pub fn ratio_ (x: Ratio) -> f32 { x.get::<units::ratio>() }
pub fn radian_(x: Angle) -> f32 { x.get::<units::radian>() }
pub fn deg_   (x: Angle) -> f32 { x.get::<units::degree>() }

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    $crate::float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lengths_sum_across_units() {
    let v = vec![angstrom(5.0), nm(1.0)];
    let total: Length = v.into_iter().sum();
    use units::nanometer;
    assert_uom_eq!(nanometer, total, nm(1.5), ulps <= 2);
  }

  #[test]
  fn micrometers_are_ten_thousand_angstroms() {
    assert_float_eq!(angstrom_(um(2.5)), 25_000.0, r2nd <= 1e-6);
  }

  #[test]
  fn kilovolts_to_volts() {
    assert_float_eq!(volt_(kv(300.0)), 300_000.0, r2nd <= 1e-6);
  }

  #[test]
  fn degrees_and_radians_agree() {
    assert_float_eq!(radian_(deg(180.0)), std::f32::consts::PI, ulps <= 2);
    assert_float_eq!(deg_(radian(std::f32::consts::FRAC_PI_2)), 90.0, ulps <= 2);
  }

  #[test]
  fn quantities_parse_with_units() -> Result<(), Box<dyn std::error::Error>> {
    let v: ElectricPotential = "200 kV".parse()?;
    assert_float_eq!(kv_(v), 200.0, ulps <= 1);
    let l: Length = "2 mm".parse()?;
    assert_float_eq!(mm_(l), 2.0, ulps <= 1);
    Ok(())
  }

  use float_eq::assert_float_eq;
}
