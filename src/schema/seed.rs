//! Initial grid patterns.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{SeedPolicy, SimulationParameters};

/// One grid cell: `[A, B]` concentrations.
pub type Cell = [f32; 2];

/// Cell value everywhere outside the seeded region.
pub const BACKGROUND_CELL: Cell = [1.0, 0.0];

/// Cell value inside the seeded region.
pub const SEEDED_CELL: Cell = [1.0, 1.0];

/// Produces initial grid contents for a fixed [`SeedPolicy`].
///
/// Keeps its RNG between calls so that reseeding a noise grid without a fixed
/// `rng_seed` draws a fresh pattern.
#[derive(Debug)]
pub struct Seeder {
    policy: SeedPolicy,
    rng: StdRng,
}

impl Seeder {
    pub fn new(policy: SeedPolicy) -> Self {
        let rng = match policy {
            SeedPolicy::Noise {
                rng_seed: Some(seed),
            } => StdRng::seed_from_u64(seed),
            _ => StdRng::from_entropy(),
        };
        Self { policy, rng }
    }

    /// The policy this seeder applies.
    pub fn policy(&self) -> SeedPolicy {
        self.policy
    }

    /// Generate a row-major `width * height` grid.
    pub fn generate(&mut self, params: &SimulationParameters) -> Vec<Cell> {
        let width = params.width as usize;
        let height = params.height as usize;
        let mut cells = vec![BACKGROUND_CELL; width * height];

        match self.policy {
            SeedPolicy::Noise { .. } => {
                // NaN seeds nothing.
                let density = match params.noise_density {
                    d if d.is_nan() => 0.0,
                    d => f64::from(d.clamp(0.0, 1.0)),
                };
                for cell in &mut cells {
                    if self.rng.gen_bool(density) {
                        *cell = SEEDED_CELL;
                    }
                }
            }
            SeedPolicy::CenteredSquare { size } => {
                let (x0, x1) = centered_span(width, size as usize);
                let (y0, y1) = centered_span(height, size as usize);
                for row in cells.chunks_exact_mut(width).take(y1).skip(y0) {
                    row[x0..x1].fill(SEEDED_CELL);
                }
            }
        }

        cells
    }
}

/// Half-open range of length `size` centred in `0..extent`, clipped to it.
fn centered_span(extent: usize, size: usize) -> (usize, usize) {
    let size = size.min(extent);
    let start = (extent - size) / 2;
    (start, start + size)
}
