//! A minimal layered tissue and random walker, just realistic enough to feed
//! the detectors with complete photon histories.

use std::f64::consts::TAU;

use geometry::{Direction, Position};
use rand::{rngs::StdRng, Rng, SeedableRng};

use mctally::{AbsorptionWeighting, Fate, HistoryBuilder, OpticalProperties, Photon, PhotonState, Tissue};

/// Speed of light in vacuum, mm/ns
const C: f64 = 299.792458;

/// Weight below which walks are abandoned
const CUTOFF: f64 = 1e-4;

/// Index-matched layers stacked along z, starting at `z = 0`, with air above
/// and below.
pub struct Layers {
    regions: Vec<OpticalProperties>,
    /// z of each interface, top first
    interfaces: Vec<f64>,
    weighting: AbsorptionWeighting,
}

impl Layers {
    pub fn new(weighting: AbsorptionWeighting, layers: &[(OpticalProperties, f64)]) -> Self {
        let air = OpticalProperties::new(0.0, 1e-10, 1.0, 1.0);
        let mut regions = vec![air];
        let mut interfaces = vec![0.0];
        for &(ops, thickness) in layers {
            regions.push(ops);
            interfaces.push(interfaces[interfaces.len() - 1] + thickness);
        }
        regions.push(air);
        Self { regions, interfaces, weighting }
    }

    /// One 5 mm layer of typical soft tissue
    pub fn slab(weighting: AbsorptionWeighting) -> Self {
        Self::new(weighting, &[(OpticalProperties::new(0.1, 5.0, 0.0, 1.0), 5.0)])
    }

    /// Two layers of different absorption
    pub fn two_layers(weighting: AbsorptionWeighting) -> Self {
        Self::new(weighting, &[
            (OpticalProperties::new(0.05, 4.0, 0.0, 1.0), 1.0),
            (OpticalProperties::new(0.2 , 6.0, 0.0, 1.0), 4.0),
        ])
    }

    fn is_tissue(&self, region: usize) -> bool { region > 0 && region < self.regions.len() - 1 }

    /// Distance along `d` from `p` (inside `region`) to the region's boundary
    fn to_boundary(&self, p: &Position, d: &Direction, region: usize) -> f64 {
        let (top, bottom) = (self.interfaces[region - 1], self.interfaces[region]);
        if      d.uz > 0.0 { (bottom - p.z) / d.uz }
        else if d.uz < 0.0 { (top    - p.z) / d.uz }
        else               { f64::INFINITY }
    }

    /// Random walk of one photon launched straight down at the origin.
    ///
    /// Scattering is isotropic and all interfaces are index matched, so
    /// photons only change direction at collisions.
    pub fn walk(&self, rng: &mut StdRng) -> Photon {
        let launch = PhotonState::new(Position::new(0.0, 0.0, 0.0), Direction::default(), 1.0, 0.0, 1);
        let mut history = HistoryBuilder::new(launch, self.regions.len());
        let mut s = *history.last();
        let caw = self.weighting == AbsorptionWeighting::Continuous;
        loop {
            let ops = self.regions[s.region];
            // Continuous weighting absorbs along the path, not at collisions
            let interacting = if caw { ops.mus } else { ops.mut_() };
            let step = -(1.0 - rng.gen::<f64>()).ln() / interacting;
            let boundary = self.to_boundary(&s.position, &s.direction, s.region);
            let travelled = step.min(boundary);
            history.record_segment(s.region, travelled, step < boundary);
            s.position = s.position + (s.direction, travelled);
            s.time += travelled * ops.n / C;
            if caw { s.weight *= (-ops.mua * travelled).exp() }

            if step >= boundary {
                s.region = if s.direction.uz > 0.0 { s.region + 1 } else { s.region - 1 };
                if !self.is_tissue(s.region) {
                    let fate = if s.direction.uz > 0.0 { Fate::ExitedBottom } else { Fate::ExitedTop };
                    history.push(s.with_fate(fate));
                    break;
                }
                history.push(s);
                continue;
            }

            match self.weighting {
                AbsorptionWeighting::Analog => {
                    if rng.gen::<f64>() < ops.absorbed_fraction() {
                        history.push(s.with_fate(Fate::Absorbed));
                        break;
                    }
                }
                AbsorptionWeighting::Discrete   => s.weight *= 1.0 - ops.absorbed_fraction(),
                AbsorptionWeighting::Continuous => {}
            }
            let cos_theta: f64 = rng.gen_range(-1.0..1.0);
            s.direction = Direction::from_angles(cos_theta.acos(), rng.gen_range(0.0..TAU));
            history.push(s);
            if s.weight < CUTOFF {
                history.push(s.with_fate(Fate::Killed));
                break;
            }
        }
        history.finish()
    }

    /// `batches` batches of `per_batch` photons, each batch from its own seed
    pub fn walk_batches(&self, batches: usize, per_batch: usize) -> Vec<Vec<Photon>> {
        (0..batches)
            .map(|b| {
                let mut rng = StdRng::seed_from_u64(1000 + b as u64);
                (0..per_batch).map(|_| self.walk(&mut rng)).collect()
            })
            .collect()
    }
}

impl Tissue for Layers {
    fn regions(&self) -> &[OpticalProperties] { &self.regions }

    fn region_index(&self, p: &Position) -> usize {
        self.interfaces.iter().take_while(|&&z| p.z >= z).count()
    }

    fn absorption_weighting(&self) -> AbsorptionWeighting { self.weighting }
}
