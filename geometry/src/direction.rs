use std::ops::Neg;
use units::todo::{Anglef64, Ratiof64};

pub trait Dot<RHS = Self> {
    type Output;
    fn dot(self, other: RHS) -> Self::Output;
}

/// Unit vector of photon propagation (direction cosines).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Direction {
    pub ux: Ratiof64,
    pub uy: Ratiof64,
    pub uz: Ratiof64,
}

impl Direction {
    pub fn new(ux: Ratiof64, uy: Ratiof64, uz: Ratiof64) -> Self { Self { ux, uy, uz } }

    /// Direction given by polar angle `theta` from +z and azimuth `phi`
    pub fn from_angles(theta: Anglef64, phi: Anglef64) -> Self {
        let (st, ct) = theta.sin_cos();
        let (sp, cp) = phi.sin_cos();
        Self { ux: st * cp, uy: st * sp, uz: ct }
    }

    pub fn norm(&self) -> Ratiof64 {
        let &Self { ux, uy, uz } = self;
        (ux*ux + uy*uy + uz*uz).sqrt()
    }

    /// Polar angle measured from the +z axis, in `[0, π]`
    pub fn polar_angle(&self) -> Anglef64 { self.uz.clamp(-1.0, 1.0).acos() }

    /// `1 - cos θ`, where θ is the angle between `self` and `other`.
    pub fn momentum_transfer(&self, other: &Self) -> Ratiof64 {
        1.0 - self.dot(*other).clamp(-1.0, 1.0)
    }
}

impl Dot for Direction {
    type Output = Ratiof64;
    fn dot(self, other: Self) -> Self::Output {
        self.ux * other.ux + self.uy * other.uy + self.uz * other.uz
    }
}

impl Neg for Direction {
    type Output = Self;
    fn neg(self) -> Self::Output { Self::new(-self.ux, -self.uy, -self.uz) }
}

/// Straight down into the tissue
impl Default for Direction {
    fn default() -> Self { Self::new(0.0, 0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[rstest(/**/ theta    , phi      ,
             case(0.0      , 0.0      ),
             case(FRAC_PI_2, 0.3      ),
             case(1.0      , 2.0      ),
             case(PI       , 5.0      ),
    )]
    fn from_angles_is_unit_and_roundtrips_polar(theta: f64, phi: f64) {
        let d = Direction::from_angles(theta, phi);
        assert_float_eq!(d.norm(), 1.0, abs <= 1e-15);
        assert_float_eq!(d.polar_angle(), theta, abs <= 1e-7);
    }

    #[rstest(/**/     a           ,       b          , expected,
             case((0.0, 0.0, 1.0), (0.0, 0.0,  1.0), 0.0),
             case((0.0, 0.0, 1.0), (1.0, 0.0,  0.0), 1.0),
             case((0.0, 0.0, 1.0), (0.0, 0.0, -1.0), 2.0),
    )]
    fn momentum_transfer(a: (f64, f64, f64), b: (f64, f64, f64), expected: f64) {
        let a = Direction::new(a.0, a.1, a.2);
        let b = Direction::new(b.0, b.1, b.2);
        assert_float_eq!(a.momentum_transfer(&b), expected, ulps <= 1);
        assert_float_eq!(b.momentum_transfer(&a), expected, ulps <= 1);
    }

    #[test]
    fn negation_reverses() {
        let d = -Direction::default();
        assert_eq!(d, Direction::new(0.0, 0.0, -1.0));
        assert_eq!(d.dot(Direction::default()), -1.0);
    }
}
