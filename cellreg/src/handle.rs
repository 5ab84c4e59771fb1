//! # Cell Handles
//!
//! Every cell is addressed by a [`CellId`]: an arena index paired with the
//! generation the slot had when the cell was appended. Removing a cell bumps
//! its slot's generation, so a handle kept past removal can never resolve to
//! an unrelated cell that later reuses the slot (the ABA problem).
//!
//! ## Technical References
//!
//! - [Generational References](https://floooh.github.io/2018/06/17/handles-vs-pointers.html)
//! - [generational-arena](https://github.com/fitzgen/generational-arena)

use std::fmt;

/// Generation counter for detecting stale handles.
pub type Generation = u32;

/// Reserved generation values.
pub mod generation {
    use super::Generation;

    /// Never issued; marks a handle that was not produced by a registry.
    pub const UNINITIALIZED: Generation = 0;
    /// First valid generation.
    pub const FIRST: Generation = 1;
    /// Slots that reach this generation are retired instead of reused.
    pub const OVERFLOW_GUARD: Generation = u32::MAX - 1;
}

/// Opaque identity of a registered cell.
///
/// Returned by [`CellRegistry::append`](crate::CellRegistry::append) and
/// required by every other registry operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    index: u32,
    generation: Generation,
}

impl CellId {
    /// A handle no registry ever issues.
    pub const DANGLING: CellId = CellId {
        index: u32::MAX,
        generation: generation::UNINITIALIZED,
    };

    pub(crate) const fn new(index: u32, generation: Generation) -> Self {
        Self { index, generation }
    }

    /// Arena slot this handle points at.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation the slot had when the cell was appended.
    pub const fn generation(&self) -> Generation {
        self.generation
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellId")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Advance a generation after its slot is vacated.
///
/// Saturates at [`generation::OVERFLOW_GUARD`]; the caller retires the slot
/// once that value is reached.
pub(crate) fn next_generation(current: Generation) -> Generation {
    if current < generation::OVERFLOW_GUARD {
        current + 1
    } else {
        generation::OVERFLOW_GUARD
    }
}
