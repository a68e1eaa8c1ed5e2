//! Gray-Scott - GPU-resident reaction-diffusion with ping-pong grids.
//!
//! This crate runs a two-chemical Gray-Scott simulation on a pair of
//! device-resident grids, advancing it several steps per displayed frame and
//! drawing the latest state to a presentation target.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Simulation parameters, named configurations and seeding
//! - `compute`: The backend trait, CPU and wgpu backends, and the frame orchestrator
//!
//! # Example
//!
//! ```rust,no_run
//! use gray_scott::{
//!     compute::{CpuBackend, GridStats, ProgramLibrary, Simulation},
//!     schema::SimulationParameters,
//! };
//!
//! let params = SimulationParameters {
//!     width: 256,
//!     height: 256,
//!     ..Default::default()
//! };
//!
//! let backend = CpuBackend::new(256, 256);
//! let mut simulation = Simulation::new(backend, params, ProgramLibrary::builtin())?;
//! for _ in 0..100 {
//!     simulation.render_frame();
//! }
//!
//! let stats = GridStats::from_cells(&simulation.read_current()?);
//! println!("Active cells after 100 frames: {}", stats.active_cells);
//! # Ok::<(), gray_scott::compute::BackendError>(())
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{BackendError, ComputeBackend, CpuBackend, FrameOutcome, Simulation, WgpuBackend};
pub use schema::{ParameterLibrary, SeedPolicy, SimulationParameters};
