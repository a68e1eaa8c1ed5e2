//! Workgroup tiling for compute dispatches.

/// Per-axis workgroup extent the step kernel is compiled with
/// (`@workgroup_size(16, 16, 1)`).
pub const WORKGROUP_EXTENT: u32 = 16;

/// Number of workgroups to dispatch along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupCount {
    pub x: u32,
    pub y: u32,
    /// Per-axis extent of one workgroup in cells.
    pub extent: u32,
}

impl WorkgroupCount {
    /// Smallest tiling of `extent x extent` groups covering `width x height`.
    ///
    /// Edge groups overhang the grid; kernels bounds-check their invocation id.
    pub fn covering(width: u32, height: u32, extent: u32) -> Self {
        let extent = extent.max(1);
        Self {
            x: width.div_ceil(extent),
            y: height.div_ceil(extent),
            extent,
        }
    }

    /// Total workgroups in the dispatch.
    pub fn total(&self) -> u64 {
        u64::from(self.x) * u64::from(self.y)
    }

    /// Cells spanned by the dispatch along each axis.
    pub fn span(&self) -> (u64, u64) {
        (
            u64::from(self.x) * u64::from(self.extent),
            u64::from(self.y) * u64::from(self.extent),
        )
    }

    /// Whether every cell of a `width x height` grid falls inside some group.
    pub fn covers(&self, width: u32, height: u32) -> bool {
        let (span_x, span_y) = self.span();
        span_x >= u64::from(width) && span_y >= u64::from(height)
    }
}
