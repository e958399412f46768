mod point;
mod direction;

pub use point::Position;
pub use direction::{Direction, Dot};

/// Distance of `(x, y)` from the z-axis: the radial coordinate of
/// cylindrically symmetric detectors.
#[inline]
pub fn rho(x: f64, y: f64) -> f64 { (x*x + y*y).sqrt() }

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    #[test]
    fn rho_of_pythagorean_triple() {
        assert_float_eq!(rho( 3.0,  4.0), 5.0, ulps <= 1);
        assert_float_eq!(rho(-3.0, -4.0), 5.0, ulps <= 1);
        assert_eq!(rho(0.0, 0.0), 0.0);
    }
}
