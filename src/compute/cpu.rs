//! Host implementation of the compute backend.
//!
//! Grids are plain vectors and frames are command lists executed in order on
//! submit. With history enabled, everything the simulation records can be
//! inspected afterwards.
//! Steps honour the dispatched workgroup count exactly like the device: cells
//! outside the dispatched tiles are left untouched.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use rayon::prelude::*;

use super::reaction::{ReactionRates, update_cell};
use super::{
    BackendError, ComputeBackend, ProgramLibrary, StepUniforms, ViewUniforms, WORKGROUP_EXTENT,
    WorkgroupCount,
};
use crate::schema::{BoundaryMode, Cell};

/// Colour the presentation pass clears to before drawing.
pub const CLEAR_COLOR: [u8; 4] = [0, 0, 0, 255];

/// Per-axis dispatch limit, matching the WebGPU default.
pub const DEFAULT_MAX_WORKGROUPS: u32 = 65_535;

type Storage = Arc<RwLock<Vec<Cell>>>;

fn read_cells(storage: &Storage) -> RwLockReadGuard<'_, Vec<Cell>> {
    storage.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_cells(storage: &Storage) -> RwLockWriteGuard<'_, Vec<Cell>> {
    storage.write().unwrap_or_else(PoisonError::into_inner)
}

/// Grid allocated by a [`CpuBackend`].
///
/// The handle owns its cells: they are freed once the handle and every
/// unsubmitted frame recorded against it are dropped.
#[derive(Debug)]
pub struct CpuGrid {
    id: usize,
    width: u32,
    height: u32,
    cells: Storage,
}

impl CpuGrid {
    /// Allocation serial, unique for the backend's lifetime.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl PartialEq for CpuGrid {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cells, &other.cells)
    }
}

impl Eq for CpuGrid {}

#[derive(Debug)]
pub struct CpuStepProgram;

#[derive(Debug)]
pub struct CpuPresentProgram {
    view: ViewUniforms,
}

/// An acquired framebuffer.
#[derive(Debug)]
pub struct CpuTarget {
    width: u32,
    height: u32,
}

/// Recorded but not yet executed work.
#[derive(Debug, Default)]
pub struct CpuFrame {
    work: Vec<Recorded>,
}

/// A command holding on to the grids it touches.
#[derive(Debug)]
enum Recorded {
    Step {
        read: (usize, Storage),
        write: (usize, Storage),
        workgroups: WorkgroupCount,
        uniforms: StepUniforms,
    },
    Present {
        source: (usize, Storage),
        view: ViewUniforms,
        width: u32,
        height: u32,
    },
}

impl Recorded {
    fn command(&self) -> Command {
        match *self {
            Self::Step {
                read: (read, _),
                write: (write, _),
                workgroups,
                uniforms,
            } => Command::Step {
                read,
                write,
                workgroups,
                uniforms,
            },
            Self::Present {
                source: (source, _),
                view,
                width,
                height,
            } => Command::Present {
                source,
                view,
                width,
                height,
            },
        }
    }
}

/// One executed unit of work. Grids are named by [`CpuGrid::id`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Step {
        read: usize,
        write: usize,
        workgroups: WorkgroupCount,
        uniforms: StepUniforms,
    },
    Present {
        source: usize,
        view: ViewUniforms,
        width: u32,
        height: u32,
    },
}

/// Software compute backend.
#[derive(Debug)]
pub struct CpuBackend {
    next_grid_id: usize,
    allocations: Vec<Weak<RwLock<Vec<Cell>>>>,
    target_size: (u32, u32),
    target_available: bool,
    workgroup_extent: u32,
    max_workgroups: u32,
    /// Largest grid allocation accepted, in bytes.
    max_grid_bytes: u64,
    framebuffer: Vec<[u8; 4]>,
    record_history: bool,
    history: Vec<Command>,
    submissions: u64,
    presents: u64,
}

impl CpuBackend {
    /// Backend presenting into a `width x height` framebuffer.
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            next_grid_id: 0,
            allocations: Vec::new(),
            target_size: (target_width, target_height),
            target_available: true,
            workgroup_extent: WORKGROUP_EXTENT,
            max_workgroups: DEFAULT_MAX_WORKGROUPS,
            max_grid_bytes: u64::MAX,
            framebuffer: Vec::new(),
            record_history: false,
            history: Vec::new(),
            submissions: 0,
            presents: 0,
        }
    }

    /// Override the workgroup extent reported to the simulation.
    pub fn with_workgroup_extent(mut self, extent: u32) -> Self {
        self.workgroup_extent = extent.max(1);
        self
    }

    /// Refuse grid allocations larger than `bytes`.
    pub fn with_grid_limit(mut self, bytes: u64) -> Self {
        self.max_grid_bytes = bytes;
        self
    }

    /// Accept at most `limit` workgroups per axis in one dispatch.
    pub fn with_dispatch_limit(mut self, limit: u32) -> Self {
        self.max_workgroups = limit;
        self
    }

    /// Log every executed command in [`history`](Self::history).
    pub fn with_history(mut self) -> Self {
        self.record_history = true;
        self
    }

    /// Make [`acquire_target`](ComputeBackend::acquire_target) succeed or fail.
    pub fn set_target_available(&mut self, available: bool) {
        self.target_available = available;
    }

    pub fn resize_target(&mut self, width: u32, height: u32) {
        self.target_size = (width, height);
    }

    /// Grids still held by a handle or a pending frame.
    pub fn live_grids(&self) -> usize {
        self.allocations
            .iter()
            .filter(|grid| grid.strong_count() > 0)
            .count()
    }

    /// Every command executed so far, in execution order. Empty unless built
    /// [`with_history`](Self::with_history).
    pub fn history(&self) -> &[Command] {
        &self.history
    }

    /// `(read, write)` grid ids of every recorded step.
    pub fn step_history(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.history.iter().filter_map(|command| match command {
            Command::Step { read, write, .. } => Some((*read, *write)),
            Command::Present { .. } => None,
        })
    }

    /// Number of `submit` calls.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Number of targets presented.
    pub fn presents(&self) -> u64 {
        self.presents
    }

    /// Last presented image, row-major RGBA8.
    pub fn framebuffer(&self) -> &[[u8; 4]] {
        &self.framebuffer
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    fn execute(&mut self, recorded: &Recorded) {
        match recorded {
            Recorded::Step {
                read: (_, read),
                write: (_, write),
                workgroups,
                uniforms,
            } => {
                assert!(!Arc::ptr_eq(read, write), "step read and write grids alias");
                let src = read_cells(read);
                let mut dst = write_cells(write);
                run_step(&src, &mut dst, *workgroups, uniforms);
            }
            Recorded::Present {
                source: (_, source),
                view,
                width,
                height,
            } => {
                let cells = read_cells(source);
                self.run_present(&cells, view, *width, *height);
            }
        }
    }

    fn run_present(&mut self, cells: &[Cell], view: &ViewUniforms, width: u32, height: u32) {
        let grid_w = view.width as usize;
        let grid_h = view.height as usize;
        let width = width as usize;
        let height = height as usize;

        // Clear, then draw the full-surface triangle.
        self.framebuffer.clear();
        self.framebuffer.resize(width * height, CLEAR_COLOR);

        for (py, row) in self.framebuffer.chunks_mut(width.max(1)).enumerate() {
            let v = (py as f32 + 0.5) / height as f32;
            let y = ((v * grid_h as f32) as usize).min(grid_h - 1);
            for (px, pixel) in row.iter_mut().enumerate() {
                let u = (px as f32 + 0.5) / width as f32;
                let x = ((u * grid_w as f32) as usize).min(grid_w - 1);
                let [r, g, b] = view.shade(cells[y * grid_w + x]);
                *pixel = [to_unorm8(r), to_unorm8(g), to_unorm8(b), 255];
            }
        }
    }
}

/// One step over the dispatched tiles of `dst`, reading `src`.
fn run_step(src: &[Cell], dst: &mut [Cell], workgroups: WorkgroupCount, uniforms: &StepUniforms) {
    let width = uniforms.width as usize;
    let height = uniforms.height as usize;
    let rates = ReactionRates::from(uniforms);
    let boundary = BoundaryMode::from_u32(uniforms.boundary);
    let extent = workgroups.extent as usize;
    let covered_x = (workgroups.x as usize * extent).min(width);

    // One band of `extent` rows per workgroup row.
    dst.par_chunks_mut(width * extent)
        .take(workgroups.y as usize)
        .enumerate()
        .for_each(|(group_y, band)| {
            for (local_y, row) in band.chunks_mut(width).enumerate() {
                let y = group_y * extent + local_y;
                for (x, cell) in row.iter_mut().enumerate().take(covered_x) {
                    *cell = update_cell(src, width, height, x, y, &rates, boundary);
                }
            }
        });
}

#[inline]
fn to_unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl ComputeBackend for CpuBackend {
    type Grid = CpuGrid;
    type Uniforms = StepUniforms;
    type StepProgram = CpuStepProgram;
    type PresentProgram = CpuPresentProgram;
    type Target = CpuTarget;
    type Frame = CpuFrame;

    fn workgroup_extent(&self) -> u32 {
        self.workgroup_extent
    }

    fn max_workgroups_per_dimension(&self) -> u32 {
        self.max_workgroups
    }

    fn load_step_program(
        &mut self,
        library: &ProgramLibrary,
    ) -> Result<CpuStepProgram, BackendError> {
        library.require_step()?;
        Ok(CpuStepProgram)
    }

    fn load_present_program(
        &mut self,
        library: &ProgramLibrary,
        view: &ViewUniforms,
    ) -> Result<CpuPresentProgram, BackendError> {
        library.require_present()?;
        Ok(CpuPresentProgram { view: *view })
    }

    fn create_grid(&mut self, label: &str, width: u32, height: u32) -> Result<CpuGrid, BackendError> {
        let cells = width as u64 * height as u64;
        let bytes = cells * std::mem::size_of::<Cell>() as u64;
        if bytes > self.max_grid_bytes {
            return Err(BackendError::GridTooLarge {
                width,
                height,
                bytes,
                limit: self.max_grid_bytes,
            });
        }

        log::trace!("allocating {label} ({width}x{height})");
        self.allocations.retain(|grid| grid.strong_count() > 0);
        let storage: Storage = Arc::new(RwLock::new(vec![[0.0; 2]; cells as usize]));
        self.allocations.push(Arc::downgrade(&storage));

        let id = self.next_grid_id;
        self.next_grid_id += 1;
        Ok(CpuGrid {
            id,
            width,
            height,
            cells: storage,
        })
    }

    fn write_grid(&mut self, grid: &CpuGrid, cells: &[Cell]) -> Result<(), BackendError> {
        let mut target = write_cells(&grid.cells);
        if target.len() != cells.len() {
            return Err(BackendError::GridSizeMismatch {
                expected: target.len(),
                actual: cells.len(),
            });
        }
        target.copy_from_slice(cells);
        Ok(())
    }

    fn read_grid(&mut self, grid: &CpuGrid) -> Result<Vec<Cell>, BackendError> {
        Ok(read_cells(&grid.cells).clone())
    }

    fn create_uniforms(&mut self, uniforms: &StepUniforms) -> Result<StepUniforms, BackendError> {
        Ok(*uniforms)
    }

    fn acquire_target(&mut self) -> Option<CpuTarget> {
        let (width, height) = self.target_size;
        (self.target_available && width > 0 && height > 0).then_some(CpuTarget { width, height })
    }

    fn begin_frame(&mut self) -> CpuFrame {
        CpuFrame::default()
    }

    fn encode_step(
        &mut self,
        frame: &mut CpuFrame,
        _program: &CpuStepProgram,
        read: &CpuGrid,
        write: &CpuGrid,
        uniforms: &StepUniforms,
        workgroups: WorkgroupCount,
    ) {
        frame.work.push(Recorded::Step {
            read: (read.id, Arc::clone(&read.cells)),
            write: (write.id, Arc::clone(&write.cells)),
            workgroups,
            uniforms: *uniforms,
        });
    }

    fn encode_present(
        &mut self,
        frame: &mut CpuFrame,
        program: &CpuPresentProgram,
        source: &CpuGrid,
        target: &CpuTarget,
    ) {
        frame.work.push(Recorded::Present {
            source: (source.id, Arc::clone(&source.cells)),
            view: program.view,
            width: target.width,
            height: target.height,
        });
    }

    fn submit(&mut self, frame: CpuFrame, target: Option<CpuTarget>) {
        for recorded in &frame.work {
            self.execute(recorded);
            if self.record_history {
                self.history.push(recorded.command());
            }
        }
        self.submissions += 1;
        if target.is_some() {
            self.presents += 1;
        }
    }
}
