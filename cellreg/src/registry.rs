//! # Cell Registry
//!
//! An ordered collection of reference-counted cells anchored by one
//! [`CellRegistry`] value.
//!
//! ## Design
//!
//! - Cells live in an arena of slots addressed by index. Vacated slots go on
//!   a free list and are handed out again with a bumped generation, so stale
//!   [`CellId`]s never resolve.
//! - Insertion order is kept by `prev`/`next` arena indices threaded through
//!   the cells, with the registry holding `head`, `tail` and the live count.
//! - Lookup by handle is O(1); unlinking is O(1) once the cell is found.
//!
//! ```text
//!   head ──► [slot 0] ◄──► [slot 3] ◄──► [slot 1] ◀── tail
//!            free list: [2]
//! ```

use std::fmt;
use std::iter::FusedIterator;
use std::ptr::NonNull;

use tracing::{debug, error, trace, warn};

use crate::buffer::{CellBuffer, ExternalBuffer, Ownership};
use crate::cell::{Cell, CellInfo, RefCount};
use crate::config::RegistryConfig;
use crate::error::{InvariantViolation, RegistryError, Result};
use crate::handle::{generation, next_generation, CellId, Generation};

/// Maximum number of arena slots. Index `u32::MAX` is reserved for
/// [`CellId::DANGLING`].
pub const MAX_CELLS: usize = u32::MAX as usize;

/// An arena slot.
#[derive(Debug)]
struct Slot {
    /// Generation of the current (or next) occupant.
    generation: Generation,
    cell: Option<Cell>,
}

/// Counters describing the registry's lifetime activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Cells appended.
    pub appended: u64,
    /// Cells removed, by any path.
    pub removed: u64,
    /// Highest live count observed.
    pub peak_len: usize,
    /// Buffers the registry allocated itself.
    pub zeroed_allocations: u64,
    /// Registry-owned bytes currently live.
    pub owned_bytes_live: usize,
    /// Registry-owned bytes released so far.
    pub owned_bytes_released: u64,
    /// Slots retired after their generation saturated.
    pub retired_slots: usize,
}

/// Result of [`CellRegistry::decrement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// The handle was not registered; nothing happened.
    Missing,
    /// The cell is still linked with this many references.
    Retained(RefCount),
    /// The count reached zero and the cell was removed.
    Released,
}

/// Registry of reference-counted cells.
pub struct CellRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
    stats: RegistryStats,
    config: RegistryConfig,
}

impl CellRegistry {
    /// Create an empty registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry.
    ///
    /// An invalid configuration is accepted but logged; an oversize
    /// `initial_capacity` only affects the up-front reservation.
    pub fn with_config(config: RegistryConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!(%err, "registry created with invalid configuration");
        }
        let mut slots = Vec::new();
        // Pre-reservation is a hint; a refusal just means growing later.
        let _ = slots.try_reserve(config.memory.initial_capacity);
        Self {
            slots,
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            stats: RegistryStats::default(),
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Insertion and lookup
    // -----------------------------------------------------------------------

    /// Register a buffer and return its handle.
    ///
    /// With `None` the registry allocates `size` zeroed bytes and owns them.
    /// `size` is recorded as given; it is not checked against the storage.
    /// The new cell starts with a reference count of 1 and is placed after
    /// every existing cell.
    pub fn append(
        &mut self,
        buffer: Option<CellBuffer>,
        size: usize,
        type_code: i32,
    ) -> Result<CellId> {
        let buffer = match buffer {
            Some(buffer) => buffer,
            None => self.allocate_zeroed(size)?,
        };

        let index = self.vacant_slot()?;
        let slot = &mut self.slots[index as usize];
        let id = CellId::new(index, slot.generation);
        let ownership = buffer.ownership();
        if ownership == Ownership::RegistryOwned {
            self.stats.owned_bytes_live += buffer.len();
        }

        let mut cell = Cell::new(id, buffer, size, type_code);
        cell.prev = self.tail;
        slot.cell = Some(cell);

        match self.tail {
            Some(tail) => {
                if let Some(tail_cell) = self.slots[tail as usize].cell.as_mut() {
                    tail_cell.next = Some(index);
                }
            }
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        self.stats.appended += 1;
        self.stats.peak_len = self.stats.peak_len.max(self.len);
        trace!(cell = %id, size, type_code, %ownership, len = self.len, "appended cell");
        self.after_mutation("append", &[Some(index)]);
        Ok(id)
    }

    /// Append `size` zeroed bytes owned by the registry.
    pub fn append_zeroed(&mut self, size: usize, type_code: i32) -> Result<CellId> {
        self.append(None, size, type_code)
    }

    /// Hand a heap buffer over to the registry. The declared size is the buffer length.
    pub fn append_owned(&mut self, bytes: Box<[u8]>, type_code: i32) -> Result<CellId> {
        let size = bytes.len();
        self.append(Some(CellBuffer::Owned(bytes)), size, type_code)
    }

    /// Register caller-owned storage. The declared size is the storage length.
    pub fn append_external(
        &mut self,
        buffer: ExternalBuffer,
        type_code: i32,
    ) -> Result<CellId> {
        let size = buffer.len();
        self.append(Some(CellBuffer::External(buffer)), size, type_code)
    }

    /// Register raw storage under the sign convention: a negative
    /// `type_code` hands the storage to the registry, any other value leaves
    /// it with the caller.
    ///
    /// # Safety
    ///
    /// See [`CellBuffer::from_type_code`].
    pub unsafe fn append_by_type_code(
        &mut self,
        ptr: NonNull<u8>,
        len: usize,
        size: usize,
        type_code: i32,
    ) -> Result<CellId> {
        let buffer = CellBuffer::from_type_code(ptr, len, type_code);
        self.append(Some(buffer), size, type_code)
    }

    /// Look up a cell by handle.
    pub fn find(&self, id: CellId) -> Option<&Cell> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.cell.as_ref())
    }

    fn find_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.cell.as_mut())
    }

    /// Check if a handle resolves to a live cell.
    pub fn contains(&self, id: CellId) -> bool {
        self.find(id).is_some()
    }

    /// Storage of a cell.
    pub fn data(&self, id: CellId) -> Result<&[u8]> {
        self.find(id)
            .map(|cell| cell.buffer().as_slice())
            .ok_or(RegistryError::NotFound(id))
    }

    /// Mutable storage of a registry-owned cell.
    pub fn data_mut(&mut self, id: CellId) -> Result<&mut [u8]> {
        let cell = self.find_mut(id).ok_or(RegistryError::NotFound(id))?;
        cell.buffer_mut()
            .as_mut_slice()
            .ok_or(RegistryError::CallerOwned(id))
    }

    // -----------------------------------------------------------------------
    // Reference counting
    // -----------------------------------------------------------------------

    /// Add a reference. Returns the new count.
    pub fn increment(&mut self, id: CellId) -> Result<RefCount> {
        let Some(cell) = self.find_mut(id) else {
            warn!(cell = %id, "increment of unregistered cell");
            return Err(RegistryError::NotFound(id));
        };
        cell.ref_count = cell
            .ref_count
            .checked_add(1)
            .ok_or(RegistryError::RefCountOverflow(id))?;
        trace!(cell = %id, ref_count = cell.ref_count, "incremented");
        Ok(cell.ref_count)
    }

    /// Drop a reference, removing the cell when the count reaches zero.
    ///
    /// Unknown handles are ignored.
    pub fn decrement(&mut self, id: CellId) -> Decrement {
        let Some(cell) = self.find_mut(id) else {
            trace!(cell = %id, "decrement of unregistered cell ignored");
            return Decrement::Missing;
        };
        cell.ref_count = cell.ref_count.saturating_sub(1);
        let remaining = cell.ref_count;
        trace!(cell = %id, ref_count = remaining, "decremented");

        if remaining > 0 {
            return Decrement::Retained(remaining);
        }
        if let Some(cell) = self.unlink(id.index()) {
            let neighbours = [cell.prev, cell.next];
            self.release(cell);
            self.after_mutation("decrement", &neighbours);
        }
        Decrement::Released
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Remove a cell regardless of its reference count.
    ///
    /// Returns `false` if the handle was not registered.
    pub fn remove(&mut self, id: CellId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if let Some(cell) = self.unlink(id.index()) {
            let neighbours = [cell.prev, cell.next];
            self.release(cell);
            self.after_mutation("remove", &neighbours);
        }
        true
    }

    /// Remove every cell (`force`) or only the cells holding at most one
    /// reference. Returns the number of cells removed.
    ///
    /// Cells that do not qualify stay linked in insertion order with
    /// their storage and counts untouched.
    pub fn release_all(&mut self, force: bool) -> usize {
        let mut removed = 0;
        let mut cursor = self.head;

        while let Some(index) = cursor {
            let Some(cell) = self.slots[index as usize].cell.as_ref() else {
                break;
            };
            // Unlinking rewires neighbours but never the successor's own slot.
            cursor = cell.next;
            if force || cell.ref_count <= 1 {
                if let Some(cell) = self.unlink(index) {
                    self.release(cell);
                    removed += 1;
                }
            }
        }

        debug!(force, removed, remaining = self.len, "released cells");
        self.after_mutation("release_all", &[]);
        removed
    }

    /// Detach the cell in `index` from the chain and vacate its slot.
    fn unlink(&mut self, index: u32) -> Option<Cell> {
        let slot = self.slots.get_mut(index as usize)?;
        let cell = slot.cell.take()?;

        slot.generation = next_generation(slot.generation);
        if slot.generation < generation::OVERFLOW_GUARD {
            self.free.push(index);
        } else {
            self.stats.retired_slots += 1;
        }

        match cell.prev {
            Some(prev) => {
                if let Some(prev_cell) = self.slots[prev as usize].cell.as_mut() {
                    prev_cell.next = cell.next;
                }
            }
            None => self.head = cell.next,
        }
        match cell.next {
            Some(next) => {
                if let Some(next_cell) = self.slots[next as usize].cell.as_mut() {
                    next_cell.prev = cell.prev;
                }
            }
            None => self.tail = cell.prev,
        }

        self.len -= 1;
        if self.len == 0 {
            self.head = None;
            self.tail = None;
        }
        Some(cell)
    }

    /// Account for and drop a detached cell. Registry-owned storage is freed
    /// here; caller-owned storage is left alone.
    fn release(&mut self, cell: Cell) {
        let id = cell.id();
        let buffer = cell.into_buffer();
        match buffer.ownership() {
            Ownership::RegistryOwned => {
                let bytes = buffer.len();
                self.stats.owned_bytes_live -= bytes;
                self.stats.owned_bytes_released += bytes as u64;
                debug!(cell = %id, bytes, "removed cell and freed owned buffer");
            }
            Ownership::CallerOwned => {
                debug!(cell = %id, "removed cell");
            }
        }
        self.stats.removed += 1;
        drop(buffer);
    }

    // -----------------------------------------------------------------------
    // Allocation helpers
    // -----------------------------------------------------------------------

    fn allocate_zeroed(&mut self, size: usize) -> Result<CellBuffer> {
        let limit = self.config.memory.max_owned_bytes;
        let in_use = self.stats.owned_bytes_live;
        if limit > 0 && in_use.saturating_add(size) > limit {
            warn!(requested = size, in_use, limit, "owned-byte limit reached");
            return Err(RegistryError::OwnedLimitExceeded {
                requested: size,
                in_use,
                limit,
            });
        }

        let buffer = CellBuffer::zeroed(size).map_err(|err| {
            warn!(requested = size, "buffer allocation failed");
            err
        })?;
        self.stats.zeroed_allocations += 1;
        Ok(buffer)
    }

    fn vacant_slot(&mut self) -> Result<u32> {
        if let Some(index) = self.free.pop() {
            return Ok(index);
        }
        if self.slots.len() >= MAX_CELLS {
            return Err(RegistryError::CapacityExhausted {
                slots: self.slots.len(),
            });
        }
        self.slots.push(Slot {
            generation: generation::FIRST,
            cell: None,
        });
        Ok((self.slots.len() - 1) as u32)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the registry holds no cells.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First cell in insertion order.
    pub fn head(&self) -> Option<CellId> {
        self.id_at(self.head)
    }

    /// Last cell in insertion order.
    pub fn tail(&self) -> Option<CellId> {
        self.id_at(self.tail)
    }

    fn id_at(&self, index: Option<u32>) -> Option<CellId> {
        index
            .and_then(|index| self.slots.get(index as usize))
            .and_then(|slot| slot.cell.as_ref())
            .map(Cell::id)
    }

    /// Snapshots of every cell, in insertion order.
    pub fn iter(&self) -> Cells<'_> {
        Cells {
            registry: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    /// Handles of every cell, in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.iter().map(|info| info.id)
    }

    /// Lifetime counters.
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Active configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Slots currently allocated in the arena, occupied or not.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Check the structural invariants.
    ///
    /// - head, tail and the count agree on emptiness;
    /// - walking `next` from the head visits exactly `len` cells, ends at
    ///   the tail, and every `prev` mirrors the step before it;
    /// - every linked cell holds at least one reference;
    /// - no occupied slot is left out of the chain.
    pub fn verify(&self) -> std::result::Result<(), InvariantViolation> {
        match (self.head, self.tail) {
            (None, None) if self.len == 0 => {}
            (Some(_), Some(_)) if self.len > 0 => {}
            _ => return Err(InvariantViolation::EndpointMismatch),
        }

        let mut walked = 0;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            if walked == self.len {
                // Longer than recorded, possibly a cycle.
                return Err(InvariantViolation::CountMismatch {
                    walked: walked + 1,
                    recorded: self.len,
                });
            }
            let cell = self
                .slots
                .get(index as usize)
                .and_then(|slot| slot.cell.as_ref())
                .ok_or(InvariantViolation::DanglingLink(index))?;
            if cell.prev != prev {
                return Err(InvariantViolation::BrokenBackLink(index));
            }
            if cell.ref_count == 0 {
                return Err(InvariantViolation::DeadCellLinked(cell.id()));
            }
            prev = Some(index);
            cursor = cell.next;
            walked += 1;
        }

        if walked != self.len {
            return Err(InvariantViolation::CountMismatch {
                walked,
                recorded: self.len,
            });
        }
        if prev != self.tail {
            return Err(InvariantViolation::TailMismatch {
                found: prev,
                tail: self.tail,
            });
        }

        let occupied = self.slots.iter().filter(|slot| slot.cell.is_some()).count();
        if occupied != walked {
            return Err(InvariantViolation::Unreachable(occupied - walked));
        }
        Ok(())
    }

    /// Check the links around `touched` slots and both endpoints.
    ///
    /// Constant time, unlike [`verify`](Self::verify): it only looks at the
    /// given cells and their immediate neighbours.
    fn check_local(&self, touched: &[Option<u32>]) -> std::result::Result<(), InvariantViolation> {
        match (self.head, self.tail) {
            (None, None) if self.len == 0 => {}
            (Some(_), Some(_)) if self.len > 0 => {}
            _ => return Err(InvariantViolation::EndpointMismatch),
        }
        let sites = [self.head, self.tail].into_iter().chain(touched.iter().copied());
        for index in sites.flatten() {
            self.check_links(index)?;
        }
        Ok(())
    }

    fn check_links(&self, index: u32) -> std::result::Result<(), InvariantViolation> {
        let cell = self.linked(index)?;
        if cell.ref_count == 0 {
            return Err(InvariantViolation::DeadCellLinked(cell.id()));
        }
        if (self.head == Some(index)) != cell.prev.is_none() {
            return Err(InvariantViolation::BrokenBackLink(index));
        }
        if (self.tail == Some(index)) != cell.next.is_none() {
            return Err(InvariantViolation::TailMismatch {
                found: Some(index),
                tail: self.tail,
            });
        }
        if let Some(prev) = cell.prev {
            if self.linked(prev)?.next != Some(index) {
                return Err(InvariantViolation::BrokenBackLink(index));
            }
        }
        if let Some(next) = cell.next {
            if self.linked(next)?.prev != Some(index) {
                return Err(InvariantViolation::BrokenBackLink(next));
            }
        }
        Ok(())
    }

    fn linked(&self, index: u32) -> std::result::Result<&Cell, InvariantViolation> {
        self.slots
            .get(index as usize)
            .and_then(|slot| slot.cell.as_ref())
            .ok_or(InvariantViolation::DanglingLink(index))
    }

    fn after_mutation(&self, op: &'static str, touched: &[Option<u32>]) {
        if !self.config.memory.verify_on_mutation {
            return;
        }
        if let Err(violation) = self.check_local(touched) {
            error!(op, %violation, "registry invariant violated");
            debug_assert!(false, "registry invariant violated after {}: {}", op, violation);
        }
    }
}

impl Default for CellRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CellRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellRegistry")
            .field("len", &self.len)
            .field("head", &self.head())
            .field("tail", &self.tail())
            .field("slots", &self.slots.len())
            .field("free", &self.free.len())
            .finish()
    }
}

impl<'a> IntoIterator for &'a CellRegistry {
    type Item = CellInfo;
    type IntoIter = Cells<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Insertion-order iterator over cell snapshots.
///
/// A clone replays from the clone point; [`CellRegistry::iter`] starts over.
#[derive(Clone)]
pub struct Cells<'a> {
    registry: &'a CellRegistry,
    cursor: Option<u32>,
    remaining: usize,
}

impl Iterator for Cells<'_> {
    type Item = CellInfo;

    fn next(&mut self) -> Option<CellInfo> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.cursor?;
        let cell = self.registry.slots.get(index as usize)?.cell.as_ref()?;
        self.cursor = cell.next;
        self.remaining -= 1;
        Some(cell.info())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Cells<'_> {}

impl FusedIterator for Cells<'_> {}

impl fmt::Debug for Cells<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cells")
            .field("remaining", &self.remaining)
            .finish()
    }
}
