//! Serialized access to one registry from several threads.
//!
//! The whole registry sits behind a single `parking_lot` mutex. Count
//! changes and relinking always touch the same structure, so there is no
//! finer-grained locking to be had.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::CellBuffer;
use crate::cell::RefCount;
use crate::error::Result;
use crate::handle::CellId;
use crate::registry::{CellRegistry, Decrement};

/// Cloneable handle to a registry shared between threads.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<Mutex<CellRegistry>>,
}

impl SharedRegistry {
    /// Share an existing registry.
    pub fn new(registry: CellRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Lock the registry for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, CellRegistry> {
        self.inner.lock()
    }

    /// Run `f` with the registry locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut CellRegistry) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// See [`CellRegistry::append`].
    pub fn append(&self, buffer: Option<CellBuffer>, size: usize, type_code: i32) -> Result<CellId> {
        self.inner.lock().append(buffer, size, type_code)
    }

    /// See [`CellRegistry::increment`].
    pub fn increment(&self, id: CellId) -> Result<RefCount> {
        self.inner.lock().increment(id)
    }

    /// See [`CellRegistry::decrement`].
    pub fn decrement(&self, id: CellId) -> Decrement {
        self.inner.lock().decrement(id)
    }

    /// See [`CellRegistry::remove`].
    pub fn remove(&self, id: CellId) -> bool {
        self.inner.lock().remove(id)
    }

    /// See [`CellRegistry::release_all`].
    pub fn release_all(&self, force: bool) -> usize {
        self.inner.lock().release_all(force)
    }

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the registry holds no cells.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Take the registry back if this is the last handle.
    pub fn try_unwrap(self) -> std::result::Result<CellRegistry, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl From<CellRegistry> for SharedRegistry {
    fn from(registry: CellRegistry) -> Self {
        Self::new(registry)
    }
}

impl fmt::Debug for SharedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegistry")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}
