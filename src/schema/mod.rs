//! Schema module - Configuration and seeding types for Gray-Scott simulations.

mod config;
mod library;
mod seed;

pub use config::*;
pub use library::*;
pub use seed::*;
