//! What detectors are told about a photon: its sequence of recorded states
//! and per-region totals accumulated during its random walk.

use geometry::{Direction, Position};
use serde::{Deserialize, Serialize};
use units::todo::{Lengthf64, Timef64, Weightf64};

/// How a recorded state relates to the end of the walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fate {
    /// Still propagating: a collision or boundary interaction
    Alive,
    /// Left the tissue through the top surface (reflected)
    ExitedTop,
    /// Left the tissue through the bottom surface (transmitted)
    ExitedBottom,
    /// Weight fully deposited (analog absorption)
    Absorbed,
    /// Terminated by roulette, path-length or time limits
    Killed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhotonState {
    pub position: Position,
    pub direction: Direction,
    pub weight: Weightf64,
    /// Time since launch, ns
    pub time: Timef64,
    pub region: usize,
    pub fate: Fate,
}

impl PhotonState {
    pub fn new(position: Position, direction: Direction, weight: Weightf64, time: Timef64, region: usize) -> Self {
        Self { position, direction, weight, time, region, fate: Fate::Alive }
    }

    pub fn with_fate(self, fate: Fate) -> Self { Self { fate, ..self } }

    pub fn exited_top   (&self) -> bool { self.fate == Fate::ExitedTop }
    pub fn exited_bottom(&self) -> bool { self.fate == Fate::ExitedBottom }
    pub fn absorbed     (&self) -> bool { self.fate == Fate::Absorbed }
}

/// Totals gathered in one tissue region over a whole walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubRegionInfo {
    /// Number of real (weight-changing) collisions
    pub collisions: u64,
    /// Total distance travelled, mm
    pub path_length: Lengthf64,
}

/// Accumulates a photon's history while its random walk is in progress.
#[derive(Clone, Debug)]
pub struct HistoryBuilder {
    states: Vec<PhotonState>,
    subregions: Vec<SubRegionInfo>,
}

impl HistoryBuilder {
    pub fn new(launch: PhotonState, number_of_regions: usize) -> Self {
        Self {
            states: vec![launch],
            subregions: vec![SubRegionInfo::default(); number_of_regions],
        }
    }

    pub fn push(&mut self, state: PhotonState) -> &mut Self {
        self.states.push(state);
        self
    }

    /// Record `path_length` travelled through `region`, ending in a collision
    /// if `collided`.
    ///
    /// # Panics
    /// Panics if `region` was not among the regions announced to `new`.
    pub fn record_segment(&mut self, region: usize, path_length: Lengthf64, collided: bool) -> &mut Self {
        let info = &mut self.subregions[region];
        info.path_length += path_length;
        if collided { info.collisions += 1 }
        self
    }

    pub fn last(&self) -> &PhotonState {
        // `new` guarantees at least one state
        &self.states[self.states.len() - 1]
    }

    /// Seal the history: from here on it can only be read.
    pub fn finish(self) -> Photon {
        let Self { states, subregions } = self;
        Photon { states, subregions }
    }
}

/// A completed photon: its immutable history, from launch to termination.
#[derive(Clone, Debug)]
pub struct Photon {
    states: Vec<PhotonState>,
    subregions: Vec<SubRegionInfo>,
}

impl Photon {
    pub fn history(&self) -> &[PhotonState] { &self.states }

    /// Final state: where and how the walk ended.
    pub fn terminal(&self) -> &PhotonState { &self.states[self.states.len() - 1] }

    /// State immediately preceding the terminal one, if any.
    pub fn previous(&self) -> Option<&PhotonState> {
        let n = self.states.len();
        if n >= 2 { Some(&self.states[n - 2]) } else { None }
    }

    /// Consecutive `(previous, current)` pairs along the walk
    pub fn segments(&self) -> impl Iterator<Item = (&PhotonState, &PhotonState)> {
        self.states.windows(2).map(|w| (&w[0], &w[1]))
    }

    pub fn subregions(&self) -> &[SubRegionInfo] { &self.subregions }

    pub fn total_path_length(&self) -> Lengthf64 {
        self.subregions.iter().map(|s| s.path_length).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn at(z: f64, weight: f64) -> PhotonState {
        PhotonState::new(Position::new(0.0, 0.0, z), Direction::default(), weight, 0.0, 1)
    }

    #[test]
    fn builder_records_states_and_subregions() {
        let mut builder = HistoryBuilder::new(at(0.0, 1.0), 3);
        builder
            .record_segment(1, 0.5, true ).push(at(0.5, 0.9))
            .record_segment(1, 0.25, false).push(at(0.75, 0.9))
            .record_segment(2, 1.0, true ).push(at(1.75, 0.8).with_fate(Fate::ExitedBottom));
        assert_eq!(builder.last().fate, Fate::ExitedBottom);
        let photon = builder.finish();

        assert_eq!(photon.history().len(), 4);
        assert!(photon.terminal().exited_bottom());
        assert_eq!(photon.previous().map(|s| s.position.z), Some(0.75));
        assert_eq!(photon.segments().count(), 3);
        assert_eq!(photon.subregions()[1], SubRegionInfo { collisions: 1, path_length: 0.75 });
        assert_eq!(photon.subregions()[2], SubRegionInfo { collisions: 1, path_length: 1.0  });
        assert_eq!(photon.total_path_length(), 1.75);
    }

    #[test]
    fn launch_only_history_has_no_previous() {
        let photon = HistoryBuilder::new(at(0.0, 1.0), 1).finish();
        assert!(photon.previous().is_none());
        assert_eq!(photon.segments().count(), 0);
    }
}
