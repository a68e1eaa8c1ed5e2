//! Gray-Scott update rule (host reference).
//!
//! Mirrors `sim_main` in `shaders/gray_scott.wgsl` cell for cell. The CPU
//! backend runs these functions directly; the GPU tests use them as the
//! reference the device output is compared against.

use super::StepUniforms;
use crate::schema::{BoundaryMode, Cell, SimulationParameters};

/// 3x3 Laplacian stencil. Weights sum to zero, so uniform fields do not diffuse.
pub const LAPLACIAN_WEIGHTS: [[f32; 3]; 3] = [
    [0.05, 0.20, 0.05],
    [0.20, -1.00, 0.20],
    [0.05, 0.20, 0.05],
];

/// Coefficients of one explicit update, copied out of [`SimulationParameters`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionRates {
    pub diffusion_a: f32,
    pub diffusion_b: f32,
    pub feed: f32,
    pub kill: f32,
    pub dt: f32,
}

impl From<&SimulationParameters> for ReactionRates {
    fn from(params: &SimulationParameters) -> Self {
        Self {
            diffusion_a: params.diffusion_rate_a,
            diffusion_b: params.diffusion_rate_b,
            feed: params.feed_rate,
            kill: params.kill_rate,
            dt: params.time_step,
        }
    }
}

impl From<&StepUniforms> for ReactionRates {
    fn from(uniforms: &StepUniforms) -> Self {
        Self {
            diffusion_a: uniforms.diffusion_a,
            diffusion_b: uniforms.diffusion_b,
            feed: uniforms.feed,
            kill: uniforms.kill,
            dt: uniforms.dt,
        }
    }
}

/// Resolve a possibly out-of-range coordinate along one axis.
#[inline]
fn resolve(coord: i64, extent: usize, boundary: BoundaryMode) -> usize {
    let extent = extent as i64;
    match boundary {
        BoundaryMode::Wrap => coord.rem_euclid(extent) as usize,
        BoundaryMode::Clamp => coord.clamp(0, extent - 1) as usize,
    }
}

/// Read the cell at `(x, y)`, applying the boundary policy.
#[inline]
pub fn sample(
    cells: &[Cell],
    width: usize,
    height: usize,
    x: i64,
    y: i64,
    boundary: BoundaryMode,
) -> Cell {
    let sx = resolve(x, width, boundary);
    let sy = resolve(y, height, boundary);
    cells[sy * width + sx]
}

/// Discrete Laplacian of both channels at `(x, y)`.
pub fn laplacian(
    cells: &[Cell],
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    boundary: BoundaryMode,
) -> Cell {
    let mut lap = [0.0f32; 2];
    for (ky, row) in LAPLACIAN_WEIGHTS.iter().enumerate() {
        for (kx, &weight) in row.iter().enumerate() {
            let c = sample(
                cells,
                width,
                height,
                x as i64 + kx as i64 - 1,
                y as i64 + ky as i64 - 1,
                boundary,
            );
            lap[0] += weight * c[0];
            lap[1] += weight * c[1];
        }
    }
    lap
}

/// Apply the reaction-diffusion update to one cell given its Laplacian.
///
/// `reaction = A*B^2`
/// `dA = Da*lapA - reaction + F*(1 - A)`
/// `dB = Db*lapB + reaction - (F + k)*B`
/// Results are not clamped.
#[inline]
pub fn react(cell: Cell, lap: Cell, rates: &ReactionRates) -> Cell {
    let [a, b] = cell;
    let reaction = a * b * b;
    let da = rates.diffusion_a * lap[0] - reaction + rates.feed * (1.0 - a);
    let db = rates.diffusion_b * lap[1] + reaction - (rates.feed + rates.kill) * b;
    [a + rates.dt * da, b + rates.dt * db]
}

/// New value of the cell at `(x, y)` after one step.
#[inline]
pub fn update_cell(
    read: &[Cell],
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    rates: &ReactionRates,
    boundary: BoundaryMode,
) -> Cell {
    let lap = laplacian(read, width, height, x, y, boundary);
    react(read[y * width + x], lap, rates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATES: ReactionRates = ReactionRates {
        diffusion_a: 1.0,
        diffusion_b: 0.5,
        feed: 0.055,
        kill: 0.062,
        dt: 1.0,
    };

    #[test]
    fn test_stencil_sums_to_zero() {
        let sum: f32 = LAPLACIAN_WEIGHTS.iter().flatten().sum();
        assert!(sum.abs() < 1e-6);
    }

    #[test]
    fn test_background_is_fixed_point() {
        // A = 1, B = 0 has no reaction and no feed deficit.
        let out = react([1.0, 0.0], [0.0, 0.0], &RATES);
        assert_eq!(out, [1.0, 0.0]);
    }

    #[test]
    fn test_reaction_converts_a_to_b() {
        let rates = ReactionRates {
            diffusion_a: 0.0,
            diffusion_b: 0.0,
            feed: 0.0,
            kill: 0.0,
            dt: 0.5,
        };
        let [a, b] = react([0.5, 1.0], [0.0, 0.0], &rates);
        assert!((a - 0.25).abs() < 1e-6);
        assert!((b - 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_wrap_reads_opposite_edge() {
        // 3x1 grid, only the last cell has B.
        let cells = [[1.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        let wrapped = laplacian(&cells, 3, 1, 0, 0, BoundaryMode::Wrap);
        let clamped = laplacian(&cells, 3, 1, 0, 0, BoundaryMode::Clamp);
        // Wrap: the left column neighbours (weights 0.05 + 0.2 + 0.05) are cell 2.
        assert!((wrapped[1] - 0.3).abs() < 1e-6);
        // Clamp: column -1 resamples column 0, so cell 2 is never seen.
        assert!(clamped[1].abs() < 1e-6);
    }

    #[test]
    fn test_sample_clamps_and_wraps() {
        let cells: Vec<Cell> = (0..6).map(|i| [i as f32, 0.0]).collect();
        assert_eq!(sample(&cells, 3, 2, -1, 0, BoundaryMode::Wrap)[0], 2.0);
        assert_eq!(sample(&cells, 3, 2, -1, 0, BoundaryMode::Clamp)[0], 0.0);
        assert_eq!(sample(&cells, 3, 2, 1, 2, BoundaryMode::Wrap)[0], 1.0);
        assert_eq!(sample(&cells, 3, 2, 1, 2, BoundaryMode::Clamp)[0], 4.0);
    }

    #[test]
    fn test_diffusion_spreads_b() {
        let mut cells = vec![[1.0, 0.0]; 25];
        cells[12] = [1.0, 1.0];
        let rates = ReactionRates {
            feed: 0.0,
            kill: 0.0,
            ..RATES
        };
        let centre = update_cell(&cells, 5, 5, 2, 2, &rates, BoundaryMode::Wrap);
        let side = update_cell(&cells, 5, 5, 3, 2, &rates, BoundaryMode::Wrap);
        let corner = update_cell(&cells, 5, 5, 3, 3, &rates, BoundaryMode::Wrap);
        // Centre loses 0.5 to diffusion but gains A*B^2 = 1 from the reaction.
        assert!((centre[1] - 1.5).abs() < 1e-6);
        assert!((side[1] - 0.1).abs() < 1e-6);
        assert!((corner[1] - 0.025).abs() < 1e-6);
    }
}
