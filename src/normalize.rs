//! Volume elements by which accumulated weights are divided to turn them into
//! densities per unit area, volume, solid angle and time.
//!
//! Curvilinear elements are evaluated at bin midpoints. Evaluating them at
//! an edge would give the innermost `rho` bin zero area, and bias every
//! other bin.

use std::f64::consts::PI;

use crate::axis::{Axis, Bins};

/// Area of annulus `i` of a radial axis: `2π ρ_mid Δρ`
#[inline]
pub fn ring(rho: &Axis, i: usize) -> f64 { 2.0 * PI * rho.midpoint(i) * rho.delta() }

/// Area of annulus `i` of radial bins of either kind. Uneven bins have no
/// single width, so their exact area `π (ρ_hi² - ρ_lo²)` is used.
#[inline]
pub fn annulus(rho: &Bins, i: usize) -> f64 {
    match rho {
        Bins::Uniform(axis) => ring(axis, i),
        Bins::Centers(centers) => {
            let (lo, hi) = centers.edges(i);
            PI * (hi * hi - lo * lo)
        }
    }
}

/// Solid angle of polar-angle bin `i`: `2π |sin θ_mid| Δθ`
#[inline]
pub fn solid_angle(angle: &Axis, i: usize) -> f64 {
    2.0 * PI * angle.midpoint(i).sin().abs() * angle.delta()
}

/// Width of any bin of a linear axis (`Δx`, `Δz`, `Δt`, ...)
#[inline]
pub fn width(axis: &Axis) -> f64 { axis.delta() }
