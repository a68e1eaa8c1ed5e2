//! Frame orchestrator.
//!
//! A [`Simulation`] owns a backend, the two compiled programs and the grid
//! pair. Each displayed frame records `steps_per_frame` steps followed by one
//! presentation pass and submits them as a single unit:
//!
//! ```text
//! acquire target ── none ──> skip (no work recorded)
//!       │
//!       ▼
//! step(input -> output), swap   × steps_per_frame
//!       │
//!       ▼
//! present(input) -> target, submit
//! ```
//!
//! After the swaps the input slot names the grid written last, so presentation
//! always reads the most recent state.

use log::Level;

use super::diagnostics::{Diagnostic, DiagnosticSink, log_sink};
use super::{
    BackendError, ComputeBackend, GridPair, ProgramLibrary, StepUniforms, ViewUniforms,
    WorkgroupCount,
};
use crate::schema::{Cell, Seeder, SimulationParameters};

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    /// No target held.
    #[default]
    Idle,
    /// A target is acquired and frame work is being recorded.
    Rendering,
}

/// Result of one [`Simulation::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Steps and presentation were submitted.
    Presented { steps: u32 },
    /// No target was available; nothing was recorded.
    Skipped,
}

/// Running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameStats {
    pub frames_presented: u64,
    pub frames_skipped: u64,
    /// Simulation steps submitted, including those from [`Simulation::advance`].
    pub steps: u64,
}

/// Device resources built from one set of parameters.
struct Pipeline<B: ComputeBackend> {
    step_program: B::StepProgram,
    present_program: B::PresentProgram,
    uniforms: B::Uniforms,
    grids: GridPair<B::Grid>,
    workgroups: WorkgroupCount,
}

impl<B: ComputeBackend> Pipeline<B> {
    /// Validate, size the dispatch, compile, allocate and seed.
    ///
    /// Nothing is touched on the backend when validation fails. Resources
    /// created before a later failure are dropped on return.
    fn build(
        backend: &mut B,
        params: &SimulationParameters,
        library: &ProgramLibrary,
        seeder: &mut Seeder,
    ) -> Result<Self, BackendError> {
        params.validate()?;

        let workgroups =
            WorkgroupCount::covering(params.width, params.height, backend.workgroup_extent());
        let limit = backend.max_workgroups_per_dimension();
        if workgroups.x > limit || workgroups.y > limit {
            return Err(BackendError::DispatchTooLarge {
                width: params.width,
                height: params.height,
                x: workgroups.x,
                y: workgroups.y,
                limit,
            });
        }

        let step_program = backend.load_step_program(library)?;
        let present_program = backend.load_present_program(library, &ViewUniforms::from(params))?;
        let uniforms = backend.create_uniforms(&StepUniforms::from(params))?;

        let first = backend.create_grid("Grid A", params.width, params.height)?;
        let second = backend.create_grid("Grid B", params.width, params.height)?;
        let grids = GridPair::new(first, second);
        backend.write_grid(grids.input(), &seeder.generate(params))?;

        Ok(Self {
            step_program,
            present_program,
            uniforms,
            grids,
            workgroups,
        })
    }

    /// Record one step and flip the grid roles.
    fn record_step(&mut self, backend: &mut B, frame: &mut B::Frame) {
        let (read, write) = self.grids.roles();
        backend.encode_step(
            frame,
            &self.step_program,
            read,
            write,
            &self.uniforms,
            self.workgroups,
        );
        self.grids.swap();
    }
}

/// Gray-Scott simulation bound to a compute backend.
pub struct Simulation<B: ComputeBackend> {
    params: SimulationParameters,
    library: ProgramLibrary,
    pipeline: Pipeline<B>,
    seeder: Seeder,
    phase: FramePhase,
    stats: FrameStats,
    diagnostics: DiagnosticSink,
    backend: B,
}

impl<B: ComputeBackend> Simulation<B> {
    /// Build a simulation reporting diagnostics through `log`.
    pub fn new(
        backend: B,
        params: SimulationParameters,
        library: ProgramLibrary,
    ) -> Result<Self, BackendError> {
        Self::with_diagnostics(backend, params, library, log_sink())
    }

    /// Build a simulation reporting diagnostics to `diagnostics`.
    ///
    /// Fails if the parameters are invalid, the grid needs more workgroups
    /// than one dispatch allows, a program is rejected, or a grid cannot be
    /// allocated. The failure is reported to the sink before it is returned.
    pub fn with_diagnostics(
        mut backend: B,
        params: SimulationParameters,
        library: ProgramLibrary,
        mut diagnostics: DiagnosticSink,
    ) -> Result<Self, BackendError> {
        let mut seeder = Seeder::new(params.seed);
        let pipeline = match Pipeline::build(&mut backend, &params, &library, &mut seeder) {
            Ok(pipeline) => pipeline,
            Err(error) => {
                diagnostics(Level::Error, &Diagnostic::ConstructionFailed { error: &error });
                return Err(error);
            }
        };

        log::info!(
            "simulation ready: {}x{} grid, {} steps/frame, {}x{} workgroups",
            params.width,
            params.height,
            params.steps_per_frame,
            pipeline.workgroups.x,
            pipeline.workgroups.y,
        );

        Ok(Self {
            params,
            library,
            pipeline,
            seeder,
            phase: FramePhase::Idle,
            stats: FrameStats::default(),
            diagnostics,
            backend,
        })
    }

    /// Run one displayed frame.
    ///
    /// Returns [`FrameOutcome::Skipped`] without recording anything when the
    /// backend has no target available. Does not wait for the device.
    pub fn render_frame(&mut self) -> FrameOutcome {
        let Some(target) = self.backend.acquire_target() else {
            self.stats.frames_skipped += 1;
            let frame = self.stats.frames_presented + self.stats.frames_skipped;
            (self.diagnostics)(Level::Debug, &Diagnostic::FrameSkipped { frame });
            return FrameOutcome::Skipped;
        };
        self.phase = FramePhase::Rendering;

        let steps = self.params.steps_per_frame;
        let mut frame = self.backend.begin_frame();
        for _ in 0..steps {
            self.pipeline.record_step(&mut self.backend, &mut frame);
        }
        self.backend.encode_present(
            &mut frame,
            &self.pipeline.present_program,
            self.pipeline.grids.input(),
            &target,
        );
        self.backend.submit(frame, Some(target));

        self.phase = FramePhase::Idle;
        self.stats.frames_presented += 1;
        self.stats.steps += u64::from(steps);
        FrameOutcome::Presented { steps }
    }

    /// Submit `steps` steps without presenting.
    pub fn advance(&mut self, steps: u32) {
        if steps == 0 {
            return;
        }
        let mut frame = self.backend.begin_frame();
        for _ in 0..steps {
            self.pipeline.record_step(&mut self.backend, &mut frame);
        }
        self.backend.submit(frame, None);
        self.stats.steps += u64::from(steps);
    }

    /// Repopulate the current grid from the configured seed policy.
    pub fn reseed(&mut self) -> Result<(), BackendError> {
        let cells = self.seeder.generate(&self.params);
        self.backend.write_grid(self.pipeline.grids.input(), &cells)?;
        (self.diagnostics)(Level::Info, &Diagnostic::Reseeded { cells: cells.len() });
        Ok(())
    }

    /// Rebuild programs and grids from new parameters on the same backend.
    ///
    /// On failure the simulation keeps running with its previous parameters.
    pub fn reconfigure(&mut self, params: SimulationParameters) -> Result<(), BackendError> {
        let mut seeder = Seeder::new(params.seed);
        match Pipeline::build(&mut self.backend, &params, &self.library, &mut seeder) {
            Ok(pipeline) => {
                self.pipeline = pipeline;
                self.seeder = seeder;
                self.params = params;
                Ok(())
            }
            Err(error) => {
                (self.diagnostics)(Level::Error, &Diagnostic::ConstructionFailed { error: &error });
                Err(error)
            }
        }
    }

    /// Replace the current state with host cells (row-major).
    pub fn upload(&mut self, cells: &[Cell]) -> Result<(), BackendError> {
        self.backend.write_grid(self.pipeline.grids.input(), cells)
    }

    /// Copy the most recent state back to the host.
    pub fn read_current(&mut self) -> Result<Vec<Cell>, BackendError> {
        self.backend.read_grid(self.pipeline.grids.input())
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn library(&self) -> &ProgramLibrary {
        &self.library
    }

    /// Grid holding the most recently completed state.
    pub fn current_grid(&self) -> &B::Grid {
        self.pipeline.grids.input()
    }

    pub fn grids(&self) -> &GridPair<B::Grid> {
        &self.pipeline.grids
    }

    pub fn workgroups(&self) -> WorkgroupCount {
        self.pipeline.workgroups
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Tear down the simulation and hand the backend back.
    pub fn into_backend(self) -> B {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::compute::cpu::{Command, CpuBackend};
    use crate::compute::GridSlot;
    use crate::schema::{BoundaryMode, ConfigError, SeedPolicy};

    type Log = Arc<Mutex<Vec<(Level, String)>>>;

    fn collecting_sink() -> (DiagnosticSink, Log) {
        let log: Log = Arc::default();
        let sink_log = Arc::clone(&log);
        let sink: DiagnosticSink = Box::new(move |level: Level, diagnostic: &Diagnostic<'_>| {
            sink_log.lock().unwrap().push((level, diagnostic.to_string()));
        });
        (sink, log)
    }

    fn small_params() -> SimulationParameters {
        SimulationParameters {
            width: 20,
            height: 12,
            steps_per_frame: 3,
            noise_density: 0.3,
            seed: SeedPolicy::Noise { rng_seed: Some(7) },
            ..Default::default()
        }
    }

    fn cpu_simulation(params: SimulationParameters) -> Simulation<CpuBackend> {
        let backend = CpuBackend::new(16, 16).with_history();
        Simulation::new(backend, params, ProgramLibrary::builtin()).unwrap()
    }

    #[test]
    fn test_steps_per_frame_chain() {
        let mut sim = cpu_simulation(small_params());
        assert_eq!(sim.render_frame(), FrameOutcome::Presented { steps: 3 });

        let history = sim.backend().history();
        assert_eq!(history.len(), 4);

        let steps: Vec<_> = sim.backend().step_history().collect();
        assert_eq!(steps.len(), 3);
        for (read, write) in &steps {
            assert_ne!(read, write);
        }
        for pair in steps.windows(2) {
            assert_eq!(pair[1].0, pair[0].1);
        }

        let last_write = steps[2].1;
        assert!(matches!(history[3], Command::Present { source, .. } if source == last_write));
        assert_eq!(sim.current_grid().id(), last_write);
        assert_eq!(sim.backend().submissions(), 1);
        assert_eq!(sim.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_swap_parity() {
        let mut sim = cpu_simulation(small_params());
        let first = sim.grids().get(GridSlot::A).id();
        for k in 1..=7u32 {
            sim.advance(1);
            let expected = if k % 2 == 0 { GridSlot::A } else { GridSlot::B };
            assert_eq!(sim.grids().input_slot(), expected);
        }
        // Every step wrote the grid the following step read.
        let steps: Vec<_> = sim.backend().step_history().collect();
        assert_eq!(steps[0].0, first);
        for pair in steps.windows(2) {
            assert_eq!(pair[1].0, pair[0].1);
        }
        assert_eq!(sim.stats().steps, 7);
        assert_eq!(sim.backend().presents(), 0);
    }

    #[test]
    fn test_unavailable_target_skips_frame() {
        let (sink, log) = collecting_sink();
        let mut sim = Simulation::with_diagnostics(
            CpuBackend::new(16, 16).with_history(),
            small_params(),
            ProgramLibrary::builtin(),
            sink,
        )
        .unwrap();
        let before = sim.read_current().unwrap();

        sim.backend_mut().set_target_available(false);
        assert_eq!(sim.render_frame(), FrameOutcome::Skipped);

        assert!(sim.backend().history().is_empty());
        assert_eq!(sim.backend().submissions(), 0);
        assert_eq!(sim.read_current().unwrap(), before);
        assert_eq!(sim.stats().frames_skipped, 1);
        assert_eq!(sim.stats().steps, 0);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, Level::Debug);
        assert!(log[0].1.contains("skipped"));
        drop(log);

        // The next callback retries normally.
        sim.backend_mut().set_target_available(true);
        assert_eq!(sim.render_frame(), FrameOutcome::Presented { steps: 3 });
    }

    /// Cells with `A = 0` or `B = 0` have no reaction term, so with every
    /// rate at zero a step must copy them exactly, neighbours notwithstanding.
    fn zero_rate_params() -> SimulationParameters {
        SimulationParameters {
            diffusion_rate_a: 0.0,
            diffusion_rate_b: 0.0,
            feed_rate: 0.0,
            kill_rate: 0.0,
            ..small_params()
        }
    }

    /// Checkerboard of `[0, 1]` and `[0.3, 0]`: far from the background
    /// fixed point and with a non-zero Laplacian everywhere.
    fn zero_rate_cells(width: u32, height: u32) -> Vec<Cell> {
        (0..width * height)
            .map(|i| {
                let (x, y) = (i % width, i / width);
                if (x + y) % 2 == 0 { [0.0, 1.0] } else { [0.3, 0.0] }
            })
            .collect()
    }

    #[test]
    fn test_zero_rates_leave_grid_unchanged() {
        let params = zero_rate_params();
        let cells = zero_rate_cells(params.width, params.height);
        let mut sim = cpu_simulation(params);
        sim.upload(&cells).unwrap();
        for _ in 0..5 {
            sim.render_frame();
        }
        assert_eq!(sim.read_current().unwrap(), cells);
        assert_eq!(sim.stats().steps, 15);
    }

    #[test]
    fn test_upload_size_mismatch() {
        let mut sim = cpu_simulation(small_params());
        assert!(matches!(
            sim.upload(&[[1.0, 0.0]; 4]),
            Err(BackendError::GridSizeMismatch { expected: 240, actual: 4 })
        ));
    }

    #[test]
    fn test_missing_entry_point_fails_construction() {
        let (sink, log) = collecting_sink();
        let library = ProgramLibrary::from_wgsl("step only", "@compute @workgroup_size(16, 16, 1)\nfn sim_main() {}\n");
        let result = Simulation::with_diagnostics(CpuBackend::new(8, 8), small_params(), library, sink);

        assert!(matches!(
            result,
            Err(BackendError::MissingEntryPoint { entry_point: "full_screen_tri", .. })
        ));
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, Level::Error);
        assert!(log[0].1.contains("full_screen_tri"));
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let params = SimulationParameters {
            steps_per_frame: 0,
            ..small_params()
        };
        let result = Simulation::new(CpuBackend::new(8, 8), params, ProgramLibrary::builtin());
        assert!(matches!(
            result,
            Err(BackendError::InvalidConfig(ConfigError::InvalidStepsPerFrame))
        ));
    }

    #[test]
    fn test_grid_allocation_failure() {
        let backend = CpuBackend::new(8, 8).with_grid_limit(1024);
        let result = Simulation::new(backend, small_params(), ProgramLibrary::builtin());
        assert!(matches!(
            result,
            Err(BackendError::GridTooLarge { width: 20, height: 12, .. })
        ));
    }

    #[test]
    fn test_reseed_restores_pattern() {
        let params = SimulationParameters {
            width: 16,
            height: 16,
            seed: SeedPolicy::CenteredSquare { size: 4 },
            ..small_params()
        };
        let (sink, log) = collecting_sink();
        let mut sim = Simulation::with_diagnostics(
            CpuBackend::new(16, 16),
            params.clone(),
            ProgramLibrary::builtin(),
            sink,
        )
        .unwrap();
        let seeded = Seeder::new(params.seed).generate(&params);
        assert_eq!(sim.read_current().unwrap(), seeded);

        sim.advance(10);
        assert_ne!(sim.read_current().unwrap(), seeded);

        sim.reseed().unwrap();
        assert_eq!(sim.read_current().unwrap(), seeded);
        assert!(log.lock().unwrap().iter().any(|(_, msg)| msg == "reseeded 256 cells"));
    }

    #[test]
    fn test_reconfigure() {
        let mut sim = cpu_simulation(small_params());
        sim.render_frame();

        let params = SimulationParameters {
            width: 8,
            height: 8,
            boundary: BoundaryMode::Clamp,
            ..small_params()
        };
        sim.reconfigure(params).unwrap();
        assert_eq!(sim.params().width, 8);
        assert_eq!(sim.read_current().unwrap().len(), 64);
        assert_eq!(sim.workgroups(), WorkgroupCount::covering(8, 8, 16));

        let invalid = SimulationParameters {
            width: 0,
            ..small_params()
        };
        assert!(sim.reconfigure(invalid).is_err());
        assert_eq!(sim.params().width, 8);
        assert_eq!(sim.render_frame(), FrameOutcome::Presented { steps: 3 });
    }

    #[test]
    fn test_reconfigure_releases_old_grids() {
        let mut sim = Simulation::new(CpuBackend::new(16, 16), small_params(), ProgramLibrary::builtin())
            .unwrap();
        for width in 10..20 {
            let params = SimulationParameters {
                width,
                ..small_params()
            };
            sim.reconfigure(params).unwrap();
        }
        for _ in 0..100 {
            sim.render_frame();
        }
        assert_eq!(sim.backend().live_grids(), 2);
        assert!(sim.backend().history().is_empty());
        assert_eq!(sim.stats().steps, 300);
    }

    #[test]
    fn test_oversized_dispatch_fails_construction() {
        let (sink, log) = collecting_sink();
        let params = SimulationParameters {
            width: 1_100_000,
            height: 1,
            ..small_params()
        };
        let backend = CpuBackend::new(8, 8).with_grid_limit(1024);
        let result = Simulation::with_diagnostics(backend, params, ProgramLibrary::builtin(), sink);

        // 1_100_000 / 16 rounds up to 68750 groups, over the 65535 default.
        assert!(matches!(
            result,
            Err(BackendError::DispatchTooLarge { x: 68_750, y: 1, limit: 65_535, .. })
        ));
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, Level::Error);
    }

    #[test]
    fn test_dispatch_limit_is_inclusive() {
        let params = SimulationParameters {
            width: 64,
            height: 16,
            ..small_params()
        };
        let backend = CpuBackend::new(8, 8).with_dispatch_limit(4);
        assert!(Simulation::new(backend, params.clone(), ProgramLibrary::builtin()).is_ok());

        let backend = CpuBackend::new(8, 8).with_dispatch_limit(3);
        assert!(matches!(
            Simulation::new(backend, params, ProgramLibrary::builtin()),
            Err(BackendError::DispatchTooLarge { x: 4, y: 1, limit: 3, .. })
        ));
    }

    #[test]
    fn test_background_presents_white() {
        let params = SimulationParameters {
            noise_density: 0.0,
            ..small_params()
        };
        let mut sim = cpu_simulation(params);
        sim.render_frame();
        let framebuffer = sim.backend().framebuffer();
        assert_eq!(framebuffer.len(), 16 * 16);
        assert!(framebuffer.iter().all(|&pixel| pixel == [255, 255, 255, 255]));
    }

    #[test]
    fn test_uneven_grid_fully_processed() {
        // Background with a single spot: every cell near the spot must move.
        let params = SimulationParameters {
            width: 37,
            height: 23,
            steps_per_frame: 1,
            seed: SeedPolicy::CenteredSquare { size: 1 },
            boundary: BoundaryMode::Wrap,
            ..Default::default()
        };
        let mut sim = cpu_simulation(params.clone());
        let seeded = sim.read_current().unwrap();
        sim.advance(1);
        let stepped = sim.read_current().unwrap();

        let rates = crate::compute::ReactionRates::from(&params);
        for y in 0..23 {
            for x in 0..37 {
                let expected =
                    crate::compute::update_cell(&seeded, 37, 23, x, y, &rates, BoundaryMode::Wrap);
                assert_eq!(stepped[y * 37 + x], expected, "cell ({x}, {y})");
            }
        }
    }
}
