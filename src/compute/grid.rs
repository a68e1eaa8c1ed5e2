//! Ping-pong grid pair.

/// Identifies one of the two grid slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridSlot {
    A,
    B,
}

impl GridSlot {
    #[inline]
    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// The other slot.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Two same-sized grids with swappable read/write roles.
///
/// The grids live in a fixed two-element arena and only the index of the
/// input slot moves, so the read and write grids can never be the same one.
/// The input grid always holds the most recently completed state.
#[derive(Debug)]
pub struct GridPair<G> {
    grids: [G; 2],
    input: GridSlot,
}

impl<G> GridPair<G> {
    /// `first` starts as the input grid.
    pub fn new(first: G, second: G) -> Self {
        Self {
            grids: [first, second],
            input: GridSlot::A,
        }
    }

    /// Slot currently read by the step kernel.
    #[inline]
    pub fn input_slot(&self) -> GridSlot {
        self.input
    }

    /// Slot currently written by the step kernel.
    #[inline]
    pub fn output_slot(&self) -> GridSlot {
        self.input.other()
    }

    /// Grid holding the latest completed state.
    #[inline]
    pub fn input(&self) -> &G {
        &self.grids[self.input.index()]
    }

    /// Grid the next step writes into.
    #[inline]
    pub fn output(&self) -> &G {
        &self.grids[self.output_slot().index()]
    }

    /// `(read, write)` for the next step.
    #[inline]
    pub fn roles(&self) -> (&G, &G) {
        (self.input(), self.output())
    }

    #[inline]
    pub fn get(&self, slot: GridSlot) -> &G {
        &self.grids[slot.index()]
    }

    /// Exchange roles after a completed step. O(1), no data moves.
    #[inline]
    pub fn swap(&mut self) {
        self.input = self.input.other();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_never_alias() {
        let mut pair = GridPair::new("a", "b");
        for _ in 0..5 {
            let (read, write) = pair.roles();
            assert_ne!(read, write);
            assert_ne!(pair.input_slot(), pair.output_slot());
            pair.swap();
        }
    }

    #[test]
    fn test_written_grid_is_read_next() {
        let mut pair = GridPair::new(0u8, 1u8);
        for step in 0..8 {
            let written = *pair.output();
            pair.swap();
            assert_eq!(*pair.input(), written, "step {step}");
        }
    }

    #[test]
    fn test_parity_tracks_step_count() {
        let mut pair = GridPair::new('a', 'b');
        for step in 0..9u32 {
            let expected = if step % 2 == 0 { GridSlot::A } else { GridSlot::B };
            assert_eq!(pair.input_slot(), expected);
            assert_eq!(*pair.get(expected), *pair.input());
            pair.swap();
        }
    }
}
