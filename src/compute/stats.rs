//! Summary statistics over a read-back grid.

use crate::schema::Cell;

/// B concentration above which a cell counts as active.
pub const ACTIVE_THRESHOLD: f32 = 0.1;

/// Per-chemical concentration summary for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChannelStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// Grid statistics for monitoring.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GridStats {
    pub a: ChannelStats,
    pub b: ChannelStats,
    /// Cells with B above [`ACTIVE_THRESHOLD`].
    pub active_cells: usize,
    /// Cells holding a NaN or infinite concentration.
    pub non_finite_cells: usize,
}

impl GridStats {
    /// Compute statistics from grid contents.
    pub fn from_cells(cells: &[Cell]) -> Self {
        let mut sum = [0.0f64; 2];
        let mut max = [f32::NEG_INFINITY; 2];
        let mut min = [f32::INFINITY; 2];
        let mut active_cells = 0usize;
        let mut non_finite_cells = 0usize;

        for cell in cells {
            if !cell[0].is_finite() || !cell[1].is_finite() {
                non_finite_cells += 1;
                continue;
            }
            for (channel, &v) in cell.iter().enumerate() {
                sum[channel] += v as f64;
                max[channel] = max[channel].max(v);
                min[channel] = min[channel].min(v);
            }
            if cell[1] > ACTIVE_THRESHOLD {
                active_cells += 1;
            }
        }

        let count = (cells.len() - non_finite_cells).max(1) as f64;
        let channel = |i: usize| ChannelStats {
            min: min[i],
            max: max[i],
            mean: (sum[i] / count) as f32,
        };

        Self {
            a: channel(0),
            b: channel(1),
            active_cells,
            non_finite_cells,
        }
    }

    /// Whether any cell diverged.
    pub fn is_diverged(&self) -> bool {
        self.non_finite_cells > 0
    }
}
