//! GPU Compute Backend for Gray-Scott
//!
//! Runs the step and presentation programs on a WebGPU (wgpu) device.

mod backend;

pub use backend::{GpuGrid, GpuPresentProgram, GpuStepProgram, GpuTarget, OFFSCREEN_FORMAT, WgpuBackend};
