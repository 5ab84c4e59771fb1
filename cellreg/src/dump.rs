//! Human-readable registry dump.
//!
//! ```text
//! cell registry dump
//! cell count=2, head=#0v1, tail=#1v1
//!  index=0, id=#0v1, addr=0x55d0c2a4e9c0, size=800, type=-1, owner=registry, refs=1
//!  index=1, id=#1v1, addr=0x55d0c1f0a2b4, size=10, type=0, owner=caller, refs=1
//! ```

use std::fmt;

use crate::handle::CellId;
use crate::registry::CellRegistry;

/// Display adapter returned by [`CellRegistry::dump`].
#[derive(Debug, Clone, Copy)]
pub struct RegistryDump<'a> {
    registry: &'a CellRegistry,
}

impl CellRegistry {
    /// Render the registry for diagnostics.
    pub fn dump(&self) -> RegistryDump<'_> {
        RegistryDump { registry: self }
    }
}

struct OptId(Option<CellId>);

impl fmt::Display for OptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{}", id),
            None => f.write_str("none"),
        }
    }
}

impl fmt::Display for RegistryDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry;
        writeln!(f, "cell registry dump")?;
        writeln!(
            f,
            "cell count={}, head={}, tail={}",
            registry.len(),
            OptId(registry.head()),
            OptId(registry.tail())
        )?;
        if registry.is_empty() {
            return writeln!(f, "registry empty");
        }
        for (index, info) in registry.iter().enumerate() {
            let addr = registry
                .find(info.id)
                .map(|cell| cell.buffer().addr())
                .unwrap_or_default();
            writeln!(
                f,
                " index={}, id={}, addr={:#x}, size={}, type={}, owner={}, refs={}",
                index, info.id, addr, info.size, info.type_code, info.ownership, info.ref_count
            )?;
        }
        Ok(())
    }
}
