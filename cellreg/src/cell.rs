//! Registry entries.

use crate::buffer::{CellBuffer, Ownership};
use crate::handle::CellId;

/// Reference count of a cell. A linked cell never holds zero.
pub type RefCount = u32;

/// One registry entry: a buffer plus its bookkeeping.
///
/// Everything except the reference count is fixed at append time.
#[derive(Debug)]
pub struct Cell {
    id: CellId,
    buffer: CellBuffer,
    size: usize,
    type_code: i32,
    pub(crate) ref_count: RefCount,
    /// Previous cell in insertion order (arena index).
    pub(crate) prev: Option<u32>,
    /// Next cell in insertion order (arena index).
    pub(crate) next: Option<u32>,
}

impl Cell {
    pub(crate) fn new(id: CellId, buffer: CellBuffer, size: usize, type_code: i32) -> Self {
        Self {
            id,
            buffer,
            size,
            type_code,
            ref_count: 1,
            prev: None,
            next: None,
        }
    }

    /// Handle of this cell.
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Declared size in bytes. Informational; may differ from the storage length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Caller-defined classification.
    pub fn type_code(&self) -> i32 {
        self.type_code
    }

    /// Current reference count.
    pub fn ref_count(&self) -> RefCount {
        self.ref_count
    }

    /// Who releases the storage.
    pub fn ownership(&self) -> Ownership {
        self.buffer.ownership()
    }

    /// The wrapped storage.
    pub fn buffer(&self) -> &CellBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut CellBuffer {
        &mut self.buffer
    }

    /// Take a snapshot of the observable fields.
    pub fn info(&self) -> CellInfo {
        CellInfo {
            id: self.id,
            size: self.size,
            type_code: self.type_code,
            ownership: self.ownership(),
            ref_count: self.ref_count,
        }
    }

    pub(crate) fn into_buffer(self) -> CellBuffer {
        self.buffer
    }
}

/// Snapshot of a cell, as yielded by [`CellRegistry::iter`](crate::CellRegistry::iter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellInfo {
    /// Handle of the cell.
    pub id: CellId,
    /// Declared size in bytes.
    pub size: usize,
    /// Caller-defined classification.
    pub type_code: i32,
    /// Who releases the storage.
    pub ownership: Ownership,
    /// Reference count at snapshot time.
    pub ref_count: RefCount,
}
