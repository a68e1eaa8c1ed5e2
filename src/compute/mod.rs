//! Compute module - Simulation pipeline for Gray-Scott reaction-diffusion.

mod backend;
mod diagnostics;
mod dispatch;
mod grid;
mod program;
mod reaction;
mod simulation;
mod stats;

pub mod cpu;
pub mod gpu;

pub use backend::*;
pub use cpu::CpuBackend;
pub use diagnostics::*;
pub use dispatch::*;
pub use gpu::WgpuBackend;
pub use grid::*;
pub use program::*;
pub use reaction::*;
pub use simulation::*;
pub use stats::*;
