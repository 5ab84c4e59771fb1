//! # cellreg
//!
//! An explicit reference-counted registry for opaque data buffers.
//!
//! - **Cells**: each registered buffer carries a declared size, a
//!   caller-defined type code, an ownership tag and a reference count
//! - **Handles**: generational [`CellId`]s, so a handle kept past removal
//!   never resolves to a later cell
//! - **Ownership**: registry-owned storage is freed on removal; caller-owned
//!   storage is never touched
//! - **Bulk release**: drop every cell, or only the ones nobody shares
//!
//! This is not a garbage collector: there is no tracing, no cycle detection
//! and no root discovery. Counts change only when the caller says so.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CELL REGISTRY                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐        │
//! │  │   Handles    │  │    Cells     │  │   Buffers    │        │
//! │  │ (handle.rs)  │  │  (cell.rs)   │  │ (buffer.rs)  │        │
//! │  └──────────────┘  └──────────────┘  └──────────────┘        │
//! │         │                 │                 │                │
//! │         └─────────────────┼─────────────────┘                │
//! │                           │                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐        │
//! │  │    Shared    │  │   Registry   │  │     Dump     │        │
//! │  │ (shared.rs)  │  │(registry.rs) │  │  (dump.rs)   │        │
//! │  └──────────────┘  └──────────────┘  └──────────────┘        │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use cellreg::{CellRegistry, Decrement, ExternalBuffer};
//!
//! static GREETING: &[u8] = b"hello";
//!
//! let mut registry = CellRegistry::new();
//! let owned = registry.append_zeroed(800, -1).unwrap();
//! let shared = registry
//!     .append_external(ExternalBuffer::from_static(GREETING), 0)
//!     .unwrap();
//!
//! registry.increment(shared).unwrap();
//! assert_eq!(registry.decrement(shared), Decrement::Retained(1));
//!
//! assert_eq!(registry.release_all(false), 2);
//! assert!(registry.find(owned).is_none());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod buffer;
pub mod cell;
pub mod config;
pub mod dump;
pub mod error;
pub mod handle;
pub mod registry;
pub mod shared;

// Re-exports
pub use buffer::{CellBuffer, ExternalBuffer, Ownership};
pub use cell::{Cell, CellInfo, RefCount};
pub use config::{ConfigError, LogLevel, RegistryConfig, RegistryConfigBuilder};
pub use dump::RegistryDump;
pub use error::{InvariantViolation, RegistryError, Result};
pub use handle::{generation, CellId, Generation};
pub use registry::{CellRegistry, Cells, Decrement, RegistryStats, MAX_CELLS};
pub use shared::SharedRegistry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a registry configured from `CELLREG_*` environment variables.
///
/// See [`RegistryConfig::from_env`] for the supported variables.
pub fn from_env() -> CellRegistry {
    CellRegistry::with_config(RegistryConfig::from_env())
}
