//! Property-based tests for the cell registry.
//!
//! Uses proptest to drive random operation sequences against the registry
//! and a plain `Vec` model, checking that both agree after every step.

use cellreg::{CellBuffer, CellId, CellRegistry, Decrement, ExternalBuffer, Ownership, RegistryError};
use proptest::prelude::*;

static EXTERNAL: [u8; 64] = [0xAB; 64];

/// One registry operation. Indices pick a model entry modulo its length.
#[derive(Debug, Clone)]
enum Op {
    AppendZeroed { size: usize, type_code: i32 },
    AppendOwned { size: usize, type_code: i32 },
    AppendExternal { size: usize, type_code: i32 },
    Increment(usize),
    Decrement(usize),
    Remove(usize),
    ReleaseAll { force: bool },
    TouchRemoved(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..64, -4i32..0).prop_map(|(size, type_code)| Op::AppendZeroed { size, type_code }),
        2 => (0usize..64, -4i32..0).prop_map(|(size, type_code)| Op::AppendOwned { size, type_code }),
        3 => (0usize..=64, 0i32..4).prop_map(|(size, type_code)| Op::AppendExternal { size, type_code }),
        4 => any::<usize>().prop_map(Op::Increment),
        4 => any::<usize>().prop_map(Op::Decrement),
        2 => any::<usize>().prop_map(Op::Remove),
        1 => any::<bool>().prop_map(|force| Op::ReleaseAll { force }),
        1 => any::<usize>().prop_map(Op::TouchRemoved),
    ]
}

#[derive(Debug, Clone, Copy)]
struct ModelCell {
    id: CellId,
    ref_count: u32,
    size: usize,
    type_code: i32,
    ownership: Ownership,
}

struct Harness {
    registry: CellRegistry,
    model: Vec<ModelCell>,
    removed: Vec<CellId>,
}

impl Harness {
    fn new() -> Self {
        Self {
            registry: CellRegistry::new(),
            model: Vec::new(),
            removed: Vec::new(),
        }
    }

    fn pick(&self, n: usize) -> Option<usize> {
        if self.model.is_empty() {
            None
        } else {
            Some(n % self.model.len())
        }
    }

    fn push(&mut self, id: CellId, size: usize, type_code: i32, ownership: Ownership) {
        self.model.push(ModelCell {
            id,
            ref_count: 1,
            size,
            type_code,
            ownership,
        });
    }

    fn drop_at(&mut self, pos: usize) {
        let cell = self.model.remove(pos);
        self.removed.push(cell.id);
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::AppendZeroed { size, type_code } => {
                let id = self.registry.append_zeroed(size, type_code).unwrap();
                self.push(id, size, type_code, Ownership::RegistryOwned);
            }
            Op::AppendOwned { size, type_code } => {
                let buffer = CellBuffer::from(vec![0x11u8; size]);
                let id = self.registry.append(Some(buffer), size, type_code).unwrap();
                self.push(id, size, type_code, Ownership::RegistryOwned);
            }
            Op::AppendExternal { size, type_code } => {
                let ext = ExternalBuffer::from_static(&EXTERNAL[..size]);
                let id = self.registry.append_external(ext, type_code).unwrap();
                self.push(id, size, type_code, Ownership::CallerOwned);
            }
            Op::Increment(n) => {
                if let Some(pos) = self.pick(n) {
                    let id = self.model[pos].id;
                    self.model[pos].ref_count += 1;
                    assert_eq!(self.registry.increment(id), Ok(self.model[pos].ref_count));
                }
            }
            Op::Decrement(n) => {
                if let Some(pos) = self.pick(n) {
                    let id = self.model[pos].id;
                    self.model[pos].ref_count -= 1;
                    let remaining = self.model[pos].ref_count;
                    if remaining == 0 {
                        assert_eq!(self.registry.decrement(id), Decrement::Released);
                        self.drop_at(pos);
                    } else {
                        assert_eq!(self.registry.decrement(id), Decrement::Retained(remaining));
                    }
                }
            }
            Op::Remove(n) => {
                if let Some(pos) = self.pick(n) {
                    assert!(self.registry.remove(self.model[pos].id));
                    self.drop_at(pos);
                }
            }
            Op::ReleaseAll { force } => {
                let before = self.model.len();
                let mut pos = 0;
                while pos < self.model.len() {
                    if force || self.model[pos].ref_count <= 1 {
                        self.drop_at(pos);
                    } else {
                        pos += 1;
                    }
                }
                assert_eq!(self.registry.release_all(force), before - self.model.len());
            }
            Op::TouchRemoved(n) => {
                if !self.removed.is_empty() {
                    let id = self.removed[n % self.removed.len()];
                    assert!(self.registry.find(id).is_none());
                    assert_eq!(self.registry.increment(id), Err(RegistryError::NotFound(id)));
                    assert_eq!(self.registry.decrement(id), Decrement::Missing);
                    assert!(!self.registry.remove(id));
                }
            }
        }
    }

    fn check(&self) -> Result<(), TestCaseError> {
        prop_assert!(self.registry.verify().is_ok());
        prop_assert_eq!(self.registry.len(), self.model.len());
        prop_assert_eq!(self.registry.head(), self.model.first().map(|c| c.id));
        prop_assert_eq!(self.registry.tail(), self.model.last().map(|c| c.id));

        let snapshots: Vec<_> = self.registry.iter().collect();
        prop_assert_eq!(snapshots.len(), self.model.len());
        for (info, cell) in snapshots.iter().zip(&self.model) {
            prop_assert_eq!(info.id, cell.id);
            prop_assert_eq!(info.ref_count, cell.ref_count);
            prop_assert_eq!(info.size, cell.size);
            prop_assert_eq!(info.type_code, cell.type_code);
            prop_assert_eq!(info.ownership, cell.ownership);
        }

        let owned: usize = self
            .model
            .iter()
            .filter(|c| c.ownership == Ownership::RegistryOwned)
            .map(|c| c.size)
            .sum();
        prop_assert_eq!(self.registry.stats().owned_bytes_live, owned);
        Ok(())
    }
}

proptest! {
    /// Count, links and order match the model after every operation
    #[test]
    fn registry_matches_model(ops in prop::collection::vec(op(), 0..120)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
            harness.check()?;
        }

        harness.registry.release_all(true);
        prop_assert!(harness.registry.is_empty());
        prop_assert_eq!(harness.registry.stats().owned_bytes_live, 0);
        // Caller-owned storage is never written or freed.
        prop_assert!(EXTERNAL.iter().all(|&b| b == 0xAB));
    }

    /// Appends alone come back in insertion order with a count of 1
    #[test]
    fn append_preserves_order(sizes in prop::collection::vec(0usize..256, 0..64)) {
        let mut registry = CellRegistry::new();
        let ids: Vec<_> = sizes
            .iter()
            .map(|&size| registry.append_zeroed(size, -1).unwrap())
            .collect();

        for &id in &ids {
            prop_assert_eq!(registry.find(id).map(|c| c.ref_count()), Some(1));
        }
        let seen: Vec<_> = registry.ids().collect();
        prop_assert_eq!(seen, ids);
        let seen_sizes: Vec<_> = registry.iter().map(|info| info.size).collect();
        prop_assert_eq!(seen_sizes, sizes);
    }

    /// N increments then N+1 decrements remove the cell on the last one only
    #[test]
    fn increment_decrement_symmetry(n in 0u32..40) {
        let mut registry = CellRegistry::new();
        let id = registry.append_zeroed(8, -1).unwrap();
        for _ in 0..n {
            registry.increment(id).unwrap();
        }
        for remaining in (1..=n).rev() {
            prop_assert_eq!(registry.decrement(id), Decrement::Retained(remaining));
            prop_assert!(registry.contains(id));
        }
        prop_assert_eq!(registry.decrement(id), Decrement::Released);
        prop_assert!(registry.find(id).is_none());
        prop_assert!(registry.is_empty());
    }

    /// Handles of removed cells never resolve, even after their slot is reused
    #[test]
    fn stale_handles_never_resolve(rounds in 1usize..30) {
        let mut registry = CellRegistry::new();
        let mut stale = Vec::new();
        for _ in 0..rounds {
            let id = registry.append_zeroed(4, -1).unwrap();
            prop_assert!(registry.remove(id));
            stale.push(id);
        }
        let live = registry.append_zeroed(4, -1).unwrap();
        for id in stale {
            prop_assert_eq!(id.index(), live.index());
            prop_assert!(registry.find(id).is_none());
        }
        prop_assert_eq!(registry.slot_count(), 1);
    }
}
