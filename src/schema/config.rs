//! Configuration types for Gray-Scott simulation parameters.

use serde::{Deserialize, Serialize};

/// Top-level simulation parameters.
///
/// Immutable once a simulation has been built from them; changing any field
/// means building a new simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Diffusion coefficient of chemical A.
    pub diffusion_rate_a: f32,
    /// Diffusion coefficient of chemical B.
    pub diffusion_rate_b: f32,
    /// Rate at which A is replenished.
    pub feed_rate: f32,
    /// Rate at which B is removed.
    pub kill_rate: f32,
    /// Explicit Euler integration step.
    pub time_step: f32,
    /// Simulation steps recorded per displayed frame.
    pub steps_per_frame: u32,
    /// Probability that a cell starts with B = 1 under [`SeedPolicy::Noise`].
    pub noise_density: f32,
    /// Initial pattern.
    pub seed: SeedPolicy,
    /// Neighbour sampling at the grid edges.
    pub boundary: BoundaryMode,
    /// Colour mapping used by the presentation pass.
    pub palette: Palette,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            width: 600,
            height: 800,
            diffusion_rate_a: 1.0,
            diffusion_rate_b: 0.5,
            feed_rate: 0.055,
            kill_rate: 0.062,
            time_step: 1.0,
            steps_per_frame: 8,
            noise_density: 0.05,
            seed: SeedPolicy::default(),
            boundary: BoundaryMode::default(),
            palette: Palette::default(),
        }
    }
}

/// How the input grid is populated before the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SeedPolicy {
    /// Every cell gets A = 1; B = 1 with probability `noise_density`.
    Noise {
        /// Fixed RNG seed for reproducible runs (None = OS entropy).
        #[serde(default)]
        rng_seed: Option<u64>,
    },
    /// A = 1 everywhere, B = 1 inside a centred `size x size` block.
    CenteredSquare {
        /// Side length of the block in cells.
        size: u32,
    },
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self::Noise { rng_seed: None }
    }
}

/// Neighbour sampling policy for cells on the grid edge.
///
/// Applied uniformly to every cell by every backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// Toroidal: the left neighbour of column 0 is the last column.
    #[default]
    Wrap,
    /// Out-of-range neighbours re-sample the nearest edge cell.
    Clamp,
}

impl BoundaryMode {
    /// Shader-side encoding.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Wrap => 0,
            Self::Clamp => 1,
        }
    }

    /// Inverse of [`as_u32`](Self::as_u32); unknown codes clamp.
    pub fn from_u32(code: u32) -> Self {
        match code {
            0 => Self::Wrap,
            _ => Self::Clamp,
        }
    }
}

/// Mapping from the two concentrations to a displayed colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Palette {
    /// `clamp(A - B, 0, 1)` as grey.
    #[default]
    Grayscale,
    /// Blend from `foreground` (B dominant) to `background` (A dominant).
    TwoColor {
        background: [f32; 3],
        foreground: [f32; 3],
    },
}

impl SimulationParameters {
    /// Total number of cells (width * height).
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.steps_per_frame == 0 {
            return Err(ConfigError::InvalidStepsPerFrame);
        }
        for (name, rate) in [("A", self.diffusion_rate_a), ("B", self.diffusion_rate_b)] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ConfigError::InvalidDiffusionRate { chemical: name, rate });
            }
        }
        if !self.feed_rate.is_finite() || !self.kill_rate.is_finite() {
            return Err(ConfigError::InvalidReactionRates);
        }
        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(ConfigError::InvalidTimeStep);
        }
        let stiffness = self.diffusion_rate_a.max(self.diffusion_rate_b) * self.time_step;
        if stiffness > 1.0 {
            return Err(ConfigError::UnstableTimeStep { stiffness });
        }
        if !(0.0..=1.0).contains(&self.noise_density) {
            return Err(ConfigError::InvalidNoiseDensity(self.noise_density));
        }
        if let SeedPolicy::CenteredSquare { size: 0 } = self.seed {
            return Err(ConfigError::InvalidSeedSquare);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid dimensions (width, height) must be non-zero")]
    InvalidDimensions,
    #[error("steps_per_frame must be at least 1")]
    InvalidStepsPerFrame,
    #[error("Diffusion rate of chemical {chemical} must be finite and non-negative, got {rate}")]
    InvalidDiffusionRate { chemical: &'static str, rate: f32 },
    #[error("Feed and kill rates must be finite")]
    InvalidReactionRates,
    #[error("Time step must be positive")]
    InvalidTimeStep,
    #[error("Explicit update is unstable: max diffusion * time_step = {stiffness} exceeds 1")]
    UnstableTimeStep { stiffness: f32 },
    #[error("Noise density must lie in [0, 1], got {0}")]
    InvalidNoiseDensity(f32),
    #[error("Centered square seed must have a non-zero size")]
    InvalidSeedSquare,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(SimulationParameters::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_steps_per_frame_rejected() {
        let params = SimulationParameters {
            steps_per_frame: 0,
            ..Default::default()
        };
        assert_eq!(params.validate(), Err(ConfigError::InvalidStepsPerFrame));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let params = SimulationParameters {
            width: 0,
            ..Default::default()
        };
        assert_eq!(params.validate(), Err(ConfigError::InvalidDimensions));

        let params = SimulationParameters {
            height: 0,
            ..Default::default()
        };
        assert_eq!(params.validate(), Err(ConfigError::InvalidDimensions));
    }

    #[test]
    fn test_unstable_time_step_rejected() {
        let params = SimulationParameters {
            diffusion_rate_a: 1.0,
            time_step: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::UnstableTimeStep { .. })
        ));
    }

    #[test]
    fn test_noise_density_bounds() {
        for density in [-0.1, 1.1, f32::NAN] {
            let params = SimulationParameters {
                noise_density: density,
                ..Default::default()
            };
            assert!(matches!(
                params.validate(),
                Err(ConfigError::InvalidNoiseDensity(_))
            ));
        }
    }

    #[test]
    fn test_negative_diffusion_rejected() {
        let params = SimulationParameters {
            diffusion_rate_b: -0.5,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidDiffusionRate { chemical: "B", .. })
        ));
    }

    #[test]
    fn test_json_defaults_fill_missing_fields() {
        let params: SimulationParameters =
            serde_json::from_str(r#"{ "width": 64, "height": 32, "seed": { "type": "CenteredSquare", "size": 8 } }"#)
                .unwrap();
        assert_eq!(params.width, 64);
        assert_eq!(params.height, 32);
        assert_eq!(params.seed, SeedPolicy::CenteredSquare { size: 8 });
        assert_eq!(params.boundary, BoundaryMode::Wrap);
        assert_eq!(params.steps_per_frame, 8);
    }

    #[test]
    fn test_boundary_json_names() {
        let params: SimulationParameters =
            serde_json::from_str(r#"{ "boundary": "clamp" }"#).unwrap();
        assert_eq!(params.boundary, BoundaryMode::Clamp);
        assert_eq!(params.boundary.as_u32(), 1);
    }
}
