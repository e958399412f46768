//! The accumulation engine shared by all detectors.
//!
//! A [`Tally`] owns a detector's principal array (the running mean, before
//! normalization) and, optionally, its second moment. It enforces the
//! detector lifecycle:
//!
//! ```text
//!   Configured --allocate--> Accumulating --normalize--> Normalized
//! ```
//!
//! Contributions can only be added while `Accumulating`, and normalization
//! happens exactly once.
//!
//! Second moments are estimated per photon. Terminal detectors make at most
//! one contribution per photon, which is squared directly. History detectors
//! may hit the same bin several times along one walk: their contributions
//! are collected in a scratch array for the duration of the photon, and the
//! squared per-photon totals are folded into the second moment when the
//! photon is done, so the second moment is `Σ_photons (Σ_bin-hits w)^2`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::histogram::{Element, Histogram};
use crate::index::index_to_flat;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Axes known, arrays not yet allocated
    Configured,
    Accumulating,
    /// Arrays hold final, normalized estimates
    Normalized,
}

/// When a detector looks at a photon
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accumulation {
    /// Once, at the end of the walk, at most one contribution per photon
    Terminal,
    /// Along the whole walk, possibly many contributions per photon
    History,
}

#[derive(Clone, Debug)]
struct Scratch<E> {
    values: Histogram<E>,
    /// Flat offsets written during the current photon; may contain repeats
    touched: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct Tally<E> {
    owner: String,
    phase: Phase,
    tally_count: u64,
    mean: Histogram<E>,
    second_moment: Option<Histogram<f64>>,
    scratch: Option<Scratch<E>>,
}

impl<E: Element> Tally<E> {

    /// Describe the arrays of the detector called `owner`, without allocating
    /// them.
    pub fn configure(owner: impl Into<String>, shape: Vec<usize>, second_moment: bool, accumulation: Accumulation) -> Self {
        let second_moment_array = second_moment.then(|| Histogram::unallocated(shape.clone()));
        let scratch = (second_moment && accumulation == Accumulation::History)
            .then(|| Scratch { values: Histogram::unallocated(shape.clone()), touched: vec![] });
        Self {
            owner: owner.into(),
            phase: Phase::Configured,
            tally_count: 0,
            mean: Histogram::unallocated(shape),
            second_moment: second_moment_array,
            scratch,
        }
    }

    pub fn owner(&self) -> &str { &self.owner }
    pub fn phase(&self) -> Phase { self.phase }
    pub fn tally_count(&self) -> u64 { self.tally_count }
    pub fn shape(&self) -> &[usize] { self.mean.shape() }
    pub fn mean(&self) -> &Histogram<E> { &self.mean }
    pub fn second_moment(&self) -> Option<&Histogram<f64>> { self.second_moment.as_ref() }
    pub fn tracks_second_moment(&self) -> bool { self.second_moment.is_some() }

    /// The mean and second moment, open for writing
    pub fn arrays_mut(&mut self) -> (&mut Histogram<E>, Option<&mut Histogram<f64>>) {
        (&mut self.mean, self.second_moment.as_mut())
    }

    /// Create zero-filled arrays and start accepting contributions.
    pub fn allocate(&mut self) -> Result<()> {
        self.require(Phase::Configured, "initialize")?;
        self.mean.allocate();
        if let Some(sm) = self.second_moment.as_mut() { sm.allocate() }
        if let Some(s) = self.scratch.as_mut() { s.values.allocate() }
        self.phase = Phase::Accumulating;
        Ok(())
    }

    /// Access for adding contributions; fails unless `Accumulating`.
    pub fn accumulate(&mut self) -> Result<Accumulator<'_, E>> {
        self.require(Phase::Accumulating, "tally")?;
        Ok(Accumulator { tally: self })
    }

    /// Divide the mean by `volume(index) * n` and the second moment by
    /// `volume(index)^2 * n`. Bins whose volume is zero become zero.
    pub fn normalize<V>(&mut self, photons: u64, volume: V) -> Result<()>
    where
        V: Fn(&[usize]) -> f64,
    {
        self.require(Phase::Accumulating, "normalize")?;
        let n = photons as f64;
        self.mean.divide_by(|i| volume(i) * n);
        if let Some(sm) = self.second_moment.as_mut() {
            sm.divide_by(|i| volume(i).powi(2) * n);
        }
        self.phase = Phase::Normalized;
        Ok(())
    }

    /// Account for contributions that were summed into these arrays from
    /// elsewhere: another worker's detector, or results read from disk.
    pub fn add_tally_count(&mut self, count: u64) { self.tally_count += count }

    pub fn require(&self, phase: Phase, operation: &'static str) -> Result<()> {
        if self.phase == phase { Ok(()) }
        else {
            Err(TallyError::Phase { detector: self.owner.clone(), operation, phase: self.phase })
        }
    }
}

/// Write access to a [`Tally`] that is known to be accumulating.
pub struct Accumulator<'t, E: Element> {
    tally: &'t mut Tally<E>,
}

impl<'t, E: Element> Accumulator<'t, E> {

    /// Record a terminal detector's (single) contribution for one photon.
    /// Zero contributions are ignored.
    #[inline]
    pub fn add(&mut self, index: &[usize], value: E) {
        if value.is_zero() { return }
        let t = &mut *self.tally;
        t.mean.add(index, value);
        if let Some(sm) = t.second_moment.as_mut() {
            sm.add(index, value.squared_magnitude());
        }
        t.tally_count += 1;
    }

    /// Start collecting a history detector's contributions for one photon.
    /// The per-photon totals are folded into the second moment when the
    /// returned scope is dropped.
    pub fn photon(&mut self) -> PhotonScope<'_, E> {
        PhotonScope { tally: &mut *self.tally }
    }
}

/// A history detector's contributions from a single photon.
pub struct PhotonScope<'t, E: Element> {
    tally: &'t mut Tally<E>,
}

impl<'t, E: Element> PhotonScope<'t, E> {

    /// Zero contributions are ignored.
    #[inline]
    pub fn add(&mut self, index: &[usize], value: E) {
        if value.is_zero() { return }
        let t = &mut *self.tally;
        let flat = index_to_flat(index, t.mean.shape());
        t.mean.add_flat(flat, value);
        if let Some(scratch) = t.scratch.as_mut() {
            scratch.values.add_flat(flat, value);
            scratch.touched.push(flat);
        }
        t.tally_count += 1;
    }
}

impl<'t, E: Element> Drop for PhotonScope<'t, E> {
    fn drop(&mut self) {
        let t = &mut *self.tally;
        if let (Some(scratch), Some(sm)) = (t.scratch.as_mut(), t.second_moment.as_mut()) {
            let values = scratch.values.data_mut();
            for flat in scratch.touched.drain(..) {
                // Repeated offsets find the slot already cleared and add 0
                let total = std::mem::replace(&mut values[flat], E::zero());
                sm.add_flat(flat, total.squared_magnitude());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use float_eq::assert_float_eq;
    use num_complex::Complex64;

    fn accumulating<E: Element>(shape: Vec<usize>, accumulation: Accumulation) -> Tally<E> {
        let mut t = Tally::configure("test", shape, true, accumulation);
        t.allocate().unwrap();
        t
    }

    #[test]
    fn lifecycle_is_enforced() {
        let mut t = Tally::<f64>::configure("t", vec![2], false, Accumulation::Terminal);
        assert_eq!(t.phase(), Phase::Configured);
        assert!(matches!(t.accumulate(), Err(TallyError::Phase { phase: Phase::Configured, .. })));
        assert!(t.normalize(1, |_| 1.0).is_err());

        t.allocate().unwrap();
        assert!(t.allocate().is_err());
        t.accumulate().unwrap().add(&[1], 1.0);

        t.normalize(1, |_| 1.0).unwrap();
        assert_eq!(t.phase(), Phase::Normalized);
        // Normalization is not idempotent, so a second call must fail
        assert!(matches!(t.normalize(1, |_| 1.0), Err(TallyError::Phase { phase: Phase::Normalized, .. })));
        assert!(t.accumulate().is_err());
        assert_eq!(t.mean().data(), &[0.0, 1.0]);
    }

    #[test]
    fn terminal_second_moment_squares_each_contribution() {
        let mut t = accumulating::<f64>(vec![3], Accumulation::Terminal);
        {
            let mut acc = t.accumulate().unwrap();
            acc.add(&[1], 0.5);
            acc.add(&[1], 0.25);
            acc.add(&[2], 0.0); // ignored
        }
        assert_eq!(t.mean().data(), &[0.0, 0.75, 0.0]);
        assert_eq!(t.second_moment().unwrap().data(), &[0.0, 0.3125, 0.0]);
        assert_eq!(t.tally_count(), 2);
    }

    #[test]
    fn history_second_moment_squares_per_photon_totals() {
        let (w1, w2): (f64, f64) = (0.3, 0.2);
        let mut t = accumulating::<f64>(vec![2], Accumulation::History);
        {
            let mut acc = t.accumulate().unwrap();
            // Photon 1 hits bin 0 twice
            {
                let mut photon = acc.photon();
                photon.add(&[0], w1);
                photon.add(&[0], w2);
            }
            // Photon 2 hits bin 0 once and bin 1 once
            {
                let mut photon = acc.photon();
                photon.add(&[0], w1);
                photon.add(&[1], w2);
            }
        }
        let sm = t.second_moment().unwrap();
        assert_float_eq!(sm[0], (w1 + w2).powi(2) + w1 * w1, ulps <= 2);
        assert_float_eq!(sm[1], w2 * w2, ulps <= 1);
        assert_float_eq!(t.mean()[0], 2.0 * w1 + w2, ulps <= 4);
        assert_eq!(t.tally_count(), 4);
    }

    #[test]
    fn complex_second_moment_is_squared_magnitude() {
        let mut t = accumulating::<Complex64>(vec![1], Accumulation::Terminal);
        t.accumulate().unwrap().add(&[0], Complex64::new(0.6, -0.8));
        assert_float_eq!(t.second_moment().unwrap()[0], 1.0, abs <= 1e-15);
    }

    #[test]
    fn normalization_divides_by_volume_and_photon_count() {
        let mut t = accumulating::<f64>(vec![2], Accumulation::Terminal);
        {
            let mut acc = t.accumulate().unwrap();
            acc.add(&[0], 2.0);
            acc.add(&[1], 2.0);
        }
        t.normalize(4, |i| if i[0] == 0 { 0.5 } else { 0.0 }).unwrap();
        assert_eq!(t.mean().data(), &[1.0, 0.0]);
        // 4 / (0.5^2 * 4)
        assert_eq!(t.second_moment().unwrap().data(), &[4.0, 0.0]);
    }

    #[test]
    fn scaling_bin_width_scales_normalized_mean_inversely() {
        let k = 4.0;
        let run = |width: f64| {
            let mut t = accumulating::<f64>(vec![3], Accumulation::Terminal);
            {
                let mut acc = t.accumulate().unwrap();
                for (i, w) in [0.2, 0.7, 0.1].into_iter().enumerate() { acc.add(&[i], w) }
            }
            t.normalize(10, |_| width).unwrap();
            t.mean().data().to_vec()
        };
        let narrow = run(1.0);
        let wide   = run(k);
        for (n, w) in narrow.iter().zip(&wide) {
            assert_float_eq!(*w, n / k, ulps <= 4);
        }
    }
}
