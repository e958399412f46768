use std::ops::{Add, Index, Sub};
use units::todo::Lengthf64;
use crate::Direction;

/// A point in tissue coordinates, in mm.
///
/// The tissue surface is the plane `z = 0`, with `z` increasing into the
/// tissue.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: Lengthf64,
    pub y: Lengthf64,
    pub z: Lengthf64,
}

impl Position {
    pub fn new(x: Lengthf64, y: Lengthf64, z: Lengthf64) -> Self { Self { x, y, z } }

    /// Distance from the z-axis
    pub fn rho(&self) -> Lengthf64 { crate::rho(self.x, self.y) }

    pub fn distance_to(&self, other: &Self) -> Lengthf64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx*dx + dy*dy + dz*dz).sqrt()
    }
}

impl Sub for Position {
    type Output = [Lengthf64; 3];
    fn sub(self, rhs: Self) -> Self::Output {
        [self.x - rhs.x, self.y - rhs.y, self.z - rhs.z]
    }
}

/// Move `s` mm along a direction
impl Add<(Direction, Lengthf64)> for Position {
    type Output = Self;
    fn add(self, (d, s): (Direction, Lengthf64)) -> Self::Output {
        Self {
            x: self.x + d.ux * s,
            y: self.y + d.uy * s,
            z: self.z + d.uz * s,
        }
    }
}

impl Index<usize> for Position {
    type Output = Lengthf64;
    fn index(&self, index: usize) -> &Self::Output {
        match index {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("index {index} is out of bounds [0,2]")
        }
    }
}

use core::fmt;
impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:8.3} {:8.3} {:8.3}) mm", self.x, self.y, self.z)
    }
}
