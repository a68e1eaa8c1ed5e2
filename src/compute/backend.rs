//! Capability set the simulation needs from a compute device.
//!
//! [`Simulation`](super::Simulation) only talks to a device through this
//! trait. [`CpuBackend`](super::cpu::CpuBackend) implements it on the host,
//! [`WgpuBackend`](super::gpu::WgpuBackend) on a WebGPU device.

use super::{ProgramLibrary, WorkgroupCount};
use crate::schema::{Cell, ConfigError, Palette, SimulationParameters};

/// Uniform block bound at slot 2 of the step program.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StepUniforms {
    pub width: u32,
    pub height: u32,
    pub boundary: u32,
    pub _pad0: u32,
    pub diffusion_a: f32,
    pub diffusion_b: f32,
    pub feed: f32,
    pub kill: f32,
    pub dt: f32,
    pub _pad1: [f32; 3],
}

impl From<&SimulationParameters> for StepUniforms {
    fn from(params: &SimulationParameters) -> Self {
        Self {
            width: params.width,
            height: params.height,
            boundary: params.boundary.as_u32(),
            _pad0: 0,
            diffusion_a: params.diffusion_rate_a,
            diffusion_b: params.diffusion_rate_b,
            feed: params.feed_rate,
            kill: params.kill_rate,
            dt: params.time_step,
            _pad1: [0.0; 3],
        }
    }
}

/// Uniform block bound at slot 3 of the presentation program.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewUniforms {
    pub width: u32,
    pub height: u32,
    /// 0 = grayscale, 1 = two-colour blend.
    pub mode: u32,
    pub _pad: u32,
    pub background: [f32; 4],
    pub foreground: [f32; 4],
}

impl From<&SimulationParameters> for ViewUniforms {
    fn from(params: &SimulationParameters) -> Self {
        let (mode, background, foreground) = match params.palette {
            Palette::Grayscale => (0, [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]),
            Palette::TwoColor {
                background,
                foreground,
            } => (1, background, foreground),
        };
        let [br, bg, bb] = background;
        let [fr, fg, fb] = foreground;
        Self {
            width: params.width,
            height: params.height,
            mode,
            _pad: 0,
            background: [br, bg, bb, 1.0],
            foreground: [fr, fg, fb, 1.0],
        }
    }
}

impl ViewUniforms {
    /// Colour of a cell, as computed by `sim_visualizer`.
    pub fn shade(&self, cell: Cell) -> [f32; 3] {
        let t = (cell[0] - cell[1]).clamp(0.0, 1.0);
        if self.mode == 0 {
            return [t, t, t];
        }
        std::array::from_fn(|i| self.foreground[i] + (self.background[i] - self.foreground[i]) * t)
    }
}

/// Error type for backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Program library '{library}' has no entry point '{entry_point}'")]
    MissingEntryPoint {
        library: String,
        entry_point: &'static str,
    },

    #[error("Cannot allocate {width}x{height} grid: {bytes} bytes exceeds the device limit of {limit}")]
    GridTooLarge {
        width: u32,
        height: u32,
        bytes: u64,
        limit: u64,
    },

    #[error("Device cannot run {extent}x{extent} workgroups (max {max_invocations} invocations)")]
    WorkgroupUnsupported { extent: u32, max_invocations: u32 },

    #[error("Grid of {width}x{height} needs {x}x{y} workgroups, device allows {limit} per dimension")]
    DispatchTooLarge {
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        limit: u32,
    },

    #[error("Device rejected the {program} program: {message}")]
    PipelineCreation {
        program: &'static str,
        message: String,
    },

    #[error("Device failed to allocate '{label}': {message}")]
    AllocationFailed { label: String, message: String },

    #[error("Waiting for the device failed: {0}")]
    DevicePoll(#[from] wgpu::PollError),

    #[error("Grid upload has {actual} cells, grid holds {expected}")]
    GridSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Opaque compute device, queue and presentation target.
///
/// Work is recorded into a `Frame` in call order and executes in that order
/// once submitted. Submission does not wait for completion.
pub trait ComputeBackend {
    /// Device-resident two-channel grid.
    type Grid;
    /// Device-resident step parameters.
    type Uniforms;
    /// Compiled step kernel with bindings `{0: grid-read, 1: grid-write, 2: parameters}`.
    type StepProgram;
    /// Compiled full-surface draw with bindings `{0: grid-read, 3: view}`.
    type PresentProgram;
    /// An acquired presentable image.
    type Target;
    /// Work recorded for one submission.
    type Frame;

    /// Per-axis workgroup extent the step program runs with.
    fn workgroup_extent(&self) -> u32;

    /// Largest workgroup count a single dispatch accepts along one axis.
    fn max_workgroups_per_dimension(&self) -> u32 {
        u32::MAX
    }

    fn load_step_program(
        &mut self,
        library: &ProgramLibrary,
    ) -> Result<Self::StepProgram, BackendError>;

    fn load_present_program(
        &mut self,
        library: &ProgramLibrary,
        view: &ViewUniforms,
    ) -> Result<Self::PresentProgram, BackendError>;

    /// Allocate a `width x height` grid usable as step input, step output
    /// and presentation source.
    fn create_grid(&mut self, label: &str, width: u32, height: u32)
    -> Result<Self::Grid, BackendError>;

    /// Overwrite a whole grid with host data (row-major).
    fn write_grid(&mut self, grid: &Self::Grid, cells: &[Cell]) -> Result<(), BackendError>;

    /// Copy a grid back to the host, waiting for all submitted work first.
    fn read_grid(&mut self, grid: &Self::Grid) -> Result<Vec<Cell>, BackendError>;

    fn create_uniforms(&mut self, uniforms: &StepUniforms) -> Result<Self::Uniforms, BackendError>;

    /// Acquire the next presentable target, or `None` if none is available
    /// right now (busy, lost, outdated). Not an error.
    fn acquire_target(&mut self) -> Option<Self::Target>;

    fn begin_frame(&mut self) -> Self::Frame;

    /// Record one step reading `read` and writing `write`.
    /// Callers guarantee `read` and `write` are distinct grids.
    fn encode_step(
        &mut self,
        frame: &mut Self::Frame,
        program: &Self::StepProgram,
        read: &Self::Grid,
        write: &Self::Grid,
        uniforms: &Self::Uniforms,
        workgroups: WorkgroupCount,
    );

    /// Record a clear-then-draw of `source` into `target`.
    fn encode_present(
        &mut self,
        frame: &mut Self::Frame,
        program: &Self::PresentProgram,
        source: &Self::Grid,
        target: &Self::Target,
    );

    /// Submit recorded work as one unit; present `target` once it completes.
    fn submit(&mut self, frame: Self::Frame, target: Option<Self::Target>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layouts_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<StepUniforms>(), 48);
        assert_eq!(std::mem::size_of::<ViewUniforms>(), 48);
    }

    #[test]
    fn test_poll_failure_converts() {
        let error = BackendError::from(wgpu::PollError::Timeout);
        assert!(matches!(error, BackendError::DevicePoll(wgpu::PollError::Timeout)));
        assert!(error.to_string().starts_with("Waiting for the device failed"));
    }

    #[test]
    fn test_grayscale_shading() {
        let view = ViewUniforms::from(&SimulationParameters::default());
        assert_eq!(view.shade([1.0, 0.0]), [1.0, 1.0, 1.0]);
        assert_eq!(view.shade([0.2, 0.9]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_two_color_shading() {
        let params = SimulationParameters {
            palette: Palette::TwoColor {
                background: [0.0, 0.0, 1.0],
                foreground: [1.0, 0.0, 0.0],
            },
            ..Default::default()
        };
        let view = ViewUniforms::from(&params);
        assert_eq!(view.mode, 1);
        assert_eq!(view.shade([1.0, 0.0]), [0.0, 0.0, 1.0]);
        assert_eq!(view.shade([0.0, 1.0]), [1.0, 0.0, 0.0]);
    }
}
