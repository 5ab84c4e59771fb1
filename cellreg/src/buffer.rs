//! # Cell Buffers
//!
//! The storage a cell wraps, and who is responsible for releasing it.
//!
//! A [`CellBuffer`] is either heap storage the registry owns outright
//! ([`CellBuffer::Owned`]) or a view of storage that stays with the caller
//! ([`CellBuffer::External`]). The [`Ownership`] of a cell is derived from the
//! variant, so it can never disagree with what is actually stored.

use std::fmt;
use std::ptr::{self, NonNull};
use std::slice;

use crate::error::{RegistryError, Result};

/// Who releases a cell's storage when the cell is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// The registry frees the storage on removal.
    RegistryOwned,
    /// The caller keeps the storage alive and frees it; removal leaves it untouched.
    CallerOwned,
}

impl Ownership {
    /// Map the sign-bit convention used by older clients: a negative type
    /// code meant "registry frees the data".
    pub fn from_type_code(type_code: i32) -> Self {
        if type_code < 0 {
            Ownership::RegistryOwned
        } else {
            Ownership::CallerOwned
        }
    }

    /// Short name used by the diagnostic dump.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ownership::RegistryOwned => "registry",
            Ownership::CallerOwned => "caller",
        }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-owned storage registered by address.
///
/// The registry reads through the pointer but never writes or frees it.
#[derive(Clone, Copy)]
pub struct ExternalBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl ExternalBuffer {
    /// Wrap storage that lives for the whole program.
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self {
            // A slice pointer is never null, even for empty slices.
            ptr: NonNull::from(bytes).cast(),
            len: bytes.len(),
        }
    }

    /// Wrap arbitrary caller storage.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes, and must stay valid and
    /// unmodified through other aliases for as long as any cell wrapping it
    /// is registered. The storage must be safe to read from whichever thread
    /// holds the registry.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Length of the wrapped storage in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the wrapped storage is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address of the wrapped storage.
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    fn as_slice(&self) -> &[u8] {
        // Safety: upheld by the constructors' contracts.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl fmt::Debug for ExternalBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalBuffer")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len)
            .finish()
    }
}

// Safety: thread-safety of the pointee is part of `from_raw_parts`'s
// contract, and `from_static` only accepts shared 'static data.
unsafe impl Send for ExternalBuffer {}
unsafe impl Sync for ExternalBuffer {}

/// Storage wrapped by a cell.
pub enum CellBuffer {
    /// Heap storage owned and released by the registry.
    Owned(Box<[u8]>),
    /// Storage owned by the caller.
    External(ExternalBuffer),
}

impl CellBuffer {
    /// Allocate `size` zero-initialised bytes.
    ///
    /// Reports [`RegistryError::AllocationFailure`] instead of aborting when
    /// the allocator refuses the request.
    pub fn zeroed(size: usize) -> Result<Self> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(size)
            .map_err(|_| RegistryError::AllocationFailure { requested: size })?;
        storage.resize(size, 0);
        Ok(CellBuffer::Owned(storage.into_boxed_slice()))
    }

    /// Wrap raw storage, taking ownership when `type_code` is negative.
    ///
    /// # Safety
    ///
    /// For a negative `type_code`, `ptr` and `len` must come from a
    /// `Box<[u8]>` released with [`Box::into_raw`], and nothing else may free
    /// it afterwards. Otherwise the contract of
    /// [`ExternalBuffer::from_raw_parts`] applies.
    pub unsafe fn from_type_code(ptr: NonNull<u8>, len: usize, type_code: i32) -> Self {
        match Ownership::from_type_code(type_code) {
            Ownership::RegistryOwned => {
                let raw = ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len);
                CellBuffer::Owned(Box::from_raw(raw))
            }
            Ownership::CallerOwned => CellBuffer::External(ExternalBuffer::from_raw_parts(ptr, len)),
        }
    }

    /// Who releases this storage.
    pub fn ownership(&self) -> Ownership {
        match self {
            CellBuffer::Owned(_) => Ownership::RegistryOwned,
            CellBuffer::External(_) => Ownership::CallerOwned,
        }
    }

    /// View the storage.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            CellBuffer::Owned(bytes) => bytes,
            CellBuffer::External(ext) => ext.as_slice(),
        }
    }

    /// Mutable view, only available for registry-owned storage.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self {
            CellBuffer::Owned(bytes) => Some(bytes),
            CellBuffer::External(_) => None,
        }
    }

    /// Actual storage length in bytes.
    pub fn len(&self) -> usize {
        match self {
            CellBuffer::Owned(bytes) => bytes.len(),
            CellBuffer::External(ext) => ext.len(),
        }
    }

    /// Check if the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address of the storage, for diagnostics.
    pub fn addr(&self) -> usize {
        match self {
            CellBuffer::Owned(bytes) => bytes.as_ptr() as usize,
            CellBuffer::External(ext) => ext.addr(),
        }
    }
}

impl fmt::Debug for CellBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellBuffer")
            .field("ownership", &self.ownership())
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len())
            .finish()
    }
}

impl From<Box<[u8]>> for CellBuffer {
    fn from(bytes: Box<[u8]>) -> Self {
        CellBuffer::Owned(bytes)
    }
}

impl From<Vec<u8>> for CellBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        CellBuffer::Owned(bytes.into_boxed_slice())
    }
}

impl From<ExternalBuffer> for CellBuffer {
    fn from(ext: ExternalBuffer) -> Self {
        CellBuffer::External(ext)
    }
}

impl From<&'static [u8]> for CellBuffer {
    fn from(bytes: &'static [u8]) -> Self {
        CellBuffer::External(ExternalBuffer::from_static(bytes))
    }
}
