//! Physical quantities used throughout the tally crates.
//!
//! Quantities are `uom` types in a millimetre / nanosecond system, so that the
//! value held in base units is directly the number a detector works with
//! internally (mm, ns, rad, GHz). Hot loops work on plain `f64`s (see
//! [`todo`]); `uom` types appear at the edges, where values enter from
//! configuration files.

pub mod todo;

pub use uom;

pub mod mmns {

  pub mod f64 {
    #[allow(unused_imports)]
    use uom::{ISQ, system};
    ISQ!(uom::si, f64, (millimeter, kilogram, nanosecond, ampere, kelvin, mole, candela));

    /// Speed of light in vacuum, held in mm/ns.
    pub const C: Velocity = Velocity {
      dimension: std::marker::PhantomData,
      units: std::marker::PhantomData,
      value: 299.792458,
    };
  }

}

pub use mmns::f64::{Angle, Frequency, Length, Time, Velocity, C};

mod units {
  pub use uom::si::{length   ::{millimeter, centimeter},
                    time     ::{nanosecond, picosecond},
                    frequency::gigahertz,
                    velocity ::meter_per_second,
                    angle    ::radian,
  };
}

// Making values from float literals is very long-winded, so provide some
// pithily-named convenience constructors.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f64) -> $quantity { $quantity::new::<units::$unit>(x) }
  };
}

wrap!(mm     Length         millimeter);
wrap!(cm     Length         centimeter);
wrap!(ns     Time           nanosecond);
wrap!(ps     Time           picosecond);
wrap!(ghz    Frequency       gigahertz);
wrap!(m_s    Velocity meter_per_second);
wrap!(radian Angle              radian);

// Reverse direction of the above: strip the units, leaving the value in the
// unit the detectors use internally.
pub fn mm_    (x: Length   ) -> f64 { x.get::<units::millimeter>() }
pub fn ns_    (x: Time     ) -> f64 { x.get::<units::nanosecond>() }
pub fn ghz_   (x: Frequency) -> f64 { x.get::<units::gigahertz >() }
pub fn radian_(x: Angle    ) -> f64 { x.get::<units::radian    >() }

pub fn m_s_  (x: Velocity) -> f64 { x.get::<units::meter_per_second>() }
pub fn mm_ns_(x: Velocity) -> f64 { m_s_(x) * 1e-6 }

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}

#[cfg(test)]
mod tests {
  use super::*;
  use float_eq::assert_float_eq;

  #[test]
  fn mixed_length_units_sum() {
    let v = vec![mm(1.0), cm(1.0), mm(0.5)];
    let total: Length = v.into_iter().sum();
    use units::millimeter;
    assert_uom_eq!(millimeter, total, mm(11.5), ulps <= 2);
  }

  #[test]
  fn base_units_are_mm_and_ns() {
    assert_eq!(mm(3.0).value, 3.0);
    assert_eq!(ns(2.0).value, 2.0);
    assert_float_eq!(ps(1500.0).value, 1.5, ulps <= 1);
    // GHz is the reciprocal of the base time unit
    assert_float_eq!(ghz(0.25).value, 0.25, ulps <= 1);
  }

  #[test]
  fn speed_of_light() {
    assert_float_eq!(mm_ns_(C), 299.792458, r2nd <= 1e-12);
    assert_float_eq!(m_s_(C), 299_792_458.0, r2nd <= 1e-12);
  }

  #[test]
  fn parse_with_units() -> Result<(), Box<dyn std::error::Error>> {
    let t: Time = "2 ns".parse()?;
    assert_eq!(ns_(t), 2.0);
    let l: Length = "1.5 cm".parse()?;
    assert_float_eq!(mm_(l), 15.0, ulps <= 1);
    let f: Frequency = "500 MHz".parse()?;
    assert_float_eq!(ghz_(f), 0.5, ulps <= 1);
    let a: Angle = "1 rad".parse()?;
    assert_eq!(radian_(a), 1.0);
    Ok(())
  }
}
