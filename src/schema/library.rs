//! Named parameter sets loaded from a JSON configuration file.
//!
//! A configuration file is a JSON object whose keys are configuration names
//! and whose values are [`SimulationParameters`]:
//!
//! ```json
//! {
//!   "coral": { "width": 512, "height": 512, "feed_rate": 0.0545, "kill_rate": 0.062 },
//!   "mitosis": { "diffusion_rate_a": 0.16, "diffusion_rate_b": 0.08, "feed_rate": 0.022 }
//! }
//! ```
//!
//! Fields left out take their [`SimulationParameters::default`] values.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ConfigError, SimulationParameters};

/// Default configuration file looked up by the CLI.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// A set of named [`SimulationParameters`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterLibrary {
    entries: BTreeMap<String, SimulationParameters>,
}

impl ParameterLibrary {
    /// Parse a library from JSON text.
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a library file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Look up a configuration by name and validate it.
    pub fn get(&self, name: &str) -> Result<SimulationParameters, LoadError> {
        let params = self
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::UnknownConfiguration {
                name: name.to_string(),
                available: self.names().map(str::to_string).collect(),
            })?;
        params.validate()?;
        Ok(params)
    }

    /// Configuration names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, params: SimulationParameters) {
        self.entries.insert(name.into(), params);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Well-known Gray-Scott regimes.
    pub fn builtin() -> Self {
        let slow = |feed_rate: f32, kill_rate: f32, steps_per_frame: u32| SimulationParameters {
            diffusion_rate_a: 0.16,
            diffusion_rate_b: 0.08,
            feed_rate,
            kill_rate,
            steps_per_frame,
            ..Default::default()
        };

        let mut library = Self::default();
        library.insert("mitosis", slow(0.022, 0.051, 10));
        library.insert("worms", slow(0.0285, 0.059, 8));
        library.insert("solitons", slow(0.035, 0.0595, 10));
        library.insert("spots", slow(0.027, 0.0545, 10));
        library.insert("stripes", slow(0.042, 0.059, 12));
        library.insert(
            "coral",
            SimulationParameters {
                feed_rate: 0.0545,
                kill_rate: 0.062,
                ..Default::default()
            },
        );
        library
    }
}

/// Errors from loading a named configuration.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No configuration named '{name}' (available: {available:?})")]
    UnknownConfiguration {
        name: String,
        available: Vec<String>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}
