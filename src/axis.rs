//! Mapping continuous physical values onto discrete bins.
//!
//! Two conventions coexist in detectors and are kept apart by type:
//!
//! + [`Axis`]: `bin_count` equal intervals covering `[start, stop)`. Values
//!   are histogrammed into intervals.
//!
//! + [`Points`]: `count` sample points `start, start + delta, ..., stop`. Used
//!   for spatial or temporal modulation frequencies, at which a transform is
//!   *evaluated* rather than histogrammed.

use ndhistogram::axis::{Axis as HistogramAxis, BinInterval};
use serde::{Deserialize, Serialize};

/// Index of the bin containing `value`, on an axis of `bin_count` bins of
/// width `delta` starting at `start`.
///
/// A value lying exactly on an internal boundary belongs to the higher bin;
/// `start` belongs to bin 0; `start + bin_count * delta` is outside the axis.
#[inline]
pub fn which_bin(value: f64, bin_count: usize, delta: f64, start: f64) -> Option<usize> {
    let bin = ((value - start) / delta).floor();
    // Written so that NaN falls through to `None`
    if bin >= 0.0 && bin < bin_count as f64 { Some(bin as usize) }
    else                                    { None }
}

/// Index of the bin, around one of the strictly increasing `centers`, which
/// contains `value`.
///
/// Neighbouring bins meet halfway between their centres; each outermost bin
/// reaches as far beyond its centre as it does towards its only neighbour.
/// As on uniform axes, a value on an internal boundary belongs to the higher
/// bin and the upper outer edge lies outside the axis. Fewer than two
/// centres define no bins.
pub fn which_bin_centers(value: f64, centers: &[f64]) -> Option<usize> {
    let n = centers.len();
    if n < 2 { return None }
    let low  = centers[0]     - (centers[1]     - centers[0]    ) / 2.0;
    let high = centers[n - 1] + (centers[n - 1] - centers[n - 2]) / 2.0;
    // Written so that NaN falls through to `None`
    if !(value >= low && value < high) { return None }
    Some(centers.windows(2).take_while(|w| (w[0] + w[1]) / 2.0 <= value).count())
}

/// Number of elements an axis contributes to an array dimension.
pub trait Extent {
    fn extent(&self) -> usize;
}

/// Shape of the array spanned by `axes`, in the given order
pub fn shape_of(axes: &[&dyn Extent]) -> Vec<usize> {
    axes.iter().map(|a| a.extent()).collect()
}

/// An axis with `bin_count` equally-sized bins covering `[start, stop)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    start: f64,
    stop: f64,
    bin_count: usize,
}

impl Axis {
    /// # Panics
    /// Panics if `bin_count == 0` or `start >= stop`.
    pub fn new(start: f64, stop: f64, bin_count: usize) -> Self {
        if bin_count == 0  { panic!("Need more than zero bins on axis") }
        if !(start < stop) { panic!("Axis range must be increasing and non-empty: {start}..{stop}") }
        Self { start, stop, bin_count }
    }

    pub fn start    (&self) -> f64   { self.start }
    pub fn stop     (&self) -> f64   { self.stop }
    pub fn bin_count(&self) -> usize { self.bin_count }
    pub fn delta    (&self) -> f64   { (self.stop - self.start) / self.bin_count as f64 }

    #[inline]
    pub fn which_bin(&self, value: f64) -> Option<usize> {
        which_bin(value, self.bin_count, self.delta(), self.start)
    }

    pub fn low_edge(&self, i: usize) -> f64 { self.start + i as f64 * self.delta() }

    /// Centre of bin `i`. Normalizations use this rather than an edge, to
    /// avoid biasing area elements.
    pub fn midpoint(&self, i: usize) -> f64 { self.start + (i as f64 + 0.5) * self.delta() }

    /// Centres of all bins
    pub fn midpoints(&self) -> Vec<f64> {
        self.bins()
            .filter_map(|bin| Some((bin.start()? + bin.end()?) / 2.0))
            .collect()
    }
}

impl HistogramAxis for Axis {
    type Coordinate = f64;
    type BinInterval = BinInterval<f64>;

    #[inline]
    fn index(&self, coordinate: &Self::Coordinate) -> Option<usize> { self.which_bin(*coordinate) }

    fn num_bins(&self) -> usize { self.bin_count }

    fn bin(&self, index: usize) -> Option<Self::BinInterval> {
        if index < self.bin_count { Some(BinInterval::new(self.low_edge(index), self.low_edge(index + 1))) }
        else                      { None }
    }
}

impl Extent for Axis {
    fn extent(&self) -> usize { self.bin_count }
}

/// Bins around externally supplied, possibly unevenly spaced, centres. See
/// [`which_bin_centers`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Centers {
    centers: Vec<f64>,
}

impl Centers {
    /// # Panics
    /// Panics unless there are at least two strictly increasing centres.
    pub fn new(centers: Vec<f64>) -> Self {
        if centers.len() < 2 { panic!("Need at least two bin centres") }
        if !centers.windows(2).all(|w| w[0] < w[1]) { panic!("Bin centres must increase: {centers:?}") }
        Self { centers }
    }

    pub fn bin_count(&self) -> usize { self.centers.len() }

    #[inline]
    pub fn which_bin(&self, value: f64) -> Option<usize> { which_bin_centers(value, &self.centers) }

    /// Lower and upper edges of bin `i`
    pub fn edges(&self, i: usize) -> (f64, f64) {
        let c = &self.centers;
        let n = c.len();
        let low  = if i == 0     { c[0]     - (c[1]     - c[0]    ) / 2.0 } else { (c[i - 1] + c[i]) / 2.0 };
        let high = if i == n - 1 { c[n - 1] + (c[n - 1] - c[n - 2]) / 2.0 } else { (c[i] + c[i + 1]) / 2.0 };
        (low, high)
    }
}

impl Extent for Centers {
    fn extent(&self) -> usize { self.centers.len() }
}

/// Either kind of histogram binning, for detectors which accept both.
#[derive(Clone, Debug, PartialEq)]
pub enum Bins {
    Uniform(Axis),
    Centers(Centers),
}

impl Bins {
    pub fn bin_count(&self) -> usize {
        match self {
            Bins::Uniform(a) => a.bin_count(),
            Bins::Centers(c) => c.bin_count(),
        }
    }

    #[inline]
    pub fn which_bin(&self, value: f64) -> Option<usize> {
        match self {
            Bins::Uniform(a) => a.which_bin(value),
            Bins::Centers(c) => c.which_bin(value),
        }
    }
}

impl Extent for Bins {
    fn extent(&self) -> usize { self.bin_count() }
}

/// `count` equally-spaced sample points from `start` to `stop` inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Points {
    start: f64,
    stop: f64,
    count: usize,
}

impl Points {
    /// # Panics
    /// Panics if `count == 0`, or if `count > 1` and `start == stop`.
    pub fn new(start: f64, stop: f64, count: usize) -> Self {
        if count == 0                  { panic!("Need at least one sample point") }
        if count > 1 && start == stop  { panic!("Multiple sample points need a non-empty range") }
        Self { start, stop, count }
    }

    pub fn count(&self) -> usize { self.count }

    pub fn delta(&self) -> f64 {
        if self.count > 1 { (self.stop - self.start) / (self.count - 1) as f64 }
        else              { 0.0 }
    }

    pub fn value(&self, i: usize) -> f64 { self.start + i as f64 * self.delta() }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.count).map(|i| self.value(i))
    }
}

impl Extent for Points {
    fn extent(&self) -> usize { self.count }
}
