//! End-to-end registry scenarios.

use std::ptr::NonNull;

use cellreg::{
    CellBuffer, CellId, CellRegistry, Decrement, ExternalBuffer, Ownership, RegistryError,
};

/// Wrap a caller-held vector without handing it over.
fn borrow_vec(storage: &mut Vec<u8>) -> ExternalBuffer {
    let ptr = NonNull::new(storage.as_mut_ptr()).unwrap();
    // Safety: every test keeps `storage` alive and unmodified until the
    // wrapping cell is gone.
    unsafe { ExternalBuffer::from_raw_parts(ptr, storage.len()) }
}

fn order(registry: &CellRegistry) -> Vec<CellId> {
    registry.ids().collect()
}

#[test]
fn scenario_a_single_owned_cell() {
    let mut registry = CellRegistry::new();
    let buf100 = registry
        .append(Some(CellBuffer::from(vec![0u8; 800])), 800, -1)
        .unwrap();
    assert_eq!(registry.len(), 1);

    assert!(registry.remove(buf100));
    assert_eq!(registry.len(), 0);
    assert!(registry.head().is_none());
    assert!(registry.tail().is_none());
    assert_eq!(registry.stats().owned_bytes_released, 800);
    assert_eq!(registry.stats().owned_bytes_live, 0);
}

#[test]
fn scenario_b_count_dance() {
    let mut storage = vec![vec![0u8; 12], vec![0u8; 12], vec![0u8; 12]];
    let mut registry = CellRegistry::new();
    let ids: Vec<_> = storage
        .iter_mut()
        .map(|bytes| registry.append_external(borrow_vec(bytes), 0).unwrap())
        .collect();
    let (v1, v3) = (ids[0], ids[2]);

    registry.increment(v1).unwrap();
    registry.increment(v3).unwrap();
    registry.increment(v3).unwrap();
    assert_eq!(registry.find(v3).unwrap().ref_count(), 3);

    assert_eq!(registry.decrement(v1), Decrement::Retained(1));
    assert_eq!(registry.decrement(v1), Decrement::Released);
    assert!(registry.find(v1).is_none());

    assert_eq!(registry.decrement(v3), Decrement::Retained(2));
    assert_eq!(registry.find(v3).unwrap().ref_count(), 2);
    assert_eq!(order(&registry), vec![ids[1], v3]);

    registry.release_all(true);
    drop(registry);
    assert!(storage.iter().all(|bytes| bytes == &vec![0u8; 12]));
}

#[test]
fn scenario_c_forced_release_mixed_ownership() {
    let mut caller_bytes = b"caller-owned".to_vec();
    let mut registry = CellRegistry::new();
    let owned = registry.append_zeroed(100, -1).unwrap();
    let external = registry.append_external(borrow_vec(&mut caller_bytes), 1).unwrap();
    let handed = registry
        .append_owned(vec![0x40u8; 64].into_boxed_slice(), -1)
        .unwrap();
    registry.increment(external).unwrap();

    assert_eq!(registry.release_all(true), 3);
    assert_eq!(registry.len(), 0);
    for id in [owned, external, handed] {
        assert!(registry.find(id).is_none());
    }
    assert_eq!(registry.stats().owned_bytes_released, 164);
    assert_eq!(registry.stats().owned_bytes_live, 0);

    // The caller's storage is intact and still the caller's to free.
    assert_eq!(caller_bytes, b"caller-owned");
    caller_bytes.push(b'!');
    assert_eq!(caller_bytes.len(), 13);
}

#[test]
fn scenario_d_release_unshared_equals_force_when_nothing_is_shared() {
    let mut forced = CellRegistry::new();
    let mut unforced = CellRegistry::new();
    for registry in [&mut forced, &mut unforced] {
        registry.append_zeroed(8, -1).unwrap();
        registry.append(Some(CellBuffer::from(&b"static"[..])), 6, 0).unwrap();
        registry.append_zeroed(16, -3).unwrap();
    }

    assert_eq!(forced.release_all(true), 3);
    assert_eq!(unforced.release_all(false), 3);
    assert_eq!(forced.len(), unforced.len());
    assert_eq!(forced.stats(), unforced.stats());
}

#[test]
fn scenario_d_release_unshared_keeps_shared_cells_consistent() {
    let mut registry = CellRegistry::new();
    let ids: Vec<_> = (0..6)
        .map(|n| registry.append_zeroed(8, -(n + 1)).unwrap())
        .collect();
    for &shared in &[ids[0], ids[3], ids[5]] {
        registry.increment(shared).unwrap();
    }

    assert_eq!(registry.release_all(false), 3);
    assert!(registry.verify().is_ok());
    assert_eq!(order(&registry), vec![ids[0], ids[3], ids[5]]);
    assert_eq!(registry.head(), Some(ids[0]));
    assert_eq!(registry.tail(), Some(ids[5]));
    assert_eq!(registry.stats().owned_bytes_live, 24);

    // The repaired chain keeps working.
    let extra = registry.append_zeroed(1, -1).unwrap();
    assert!(registry.remove(ids[3]));
    assert_eq!(order(&registry), vec![ids[0], ids[5], extra]);
    assert_eq!(registry.decrement(ids[5]), Decrement::Retained(1));
    assert_eq!(registry.release_all(false), 2);
    assert_eq!(order(&registry), vec![ids[0]]);
    assert_eq!(registry.find(ids[0]).unwrap().ref_count(), 2);
    assert!(registry.verify().is_ok());

    assert_eq!(registry.decrement(ids[0]), Decrement::Retained(1));
    assert_eq!(registry.release_all(false), 1);
    assert!(registry.is_empty());
}

#[test]
fn owned_buffer_is_unreachable_after_decrement() {
    let mut registry = CellRegistry::new();
    let id = registry.append_zeroed(32, -1).unwrap();
    registry.data_mut(id).unwrap()[..4].copy_from_slice(b"live");

    assert_eq!(registry.decrement(id), Decrement::Released);
    assert_eq!(registry.data(id), Err(RegistryError::NotFound(id)));
    assert!(registry.iter().all(|info| info.id != id));
    assert_eq!(registry.stats().owned_bytes_released, 32);
}

#[test]
fn ownership_follows_the_buffer_not_the_type_code() {
    let mut registry = CellRegistry::new();
    let external = registry
        .append(Some(CellBuffer::from(&b"abc"[..])), 3, -1)
        .unwrap();
    let zeroed = registry.append_zeroed(3, 5).unwrap();

    assert_eq!(registry.find(external).unwrap().ownership(), Ownership::CallerOwned);
    assert_eq!(registry.find(zeroed).unwrap().ownership(), Ownership::RegistryOwned);
}

/// Replays the walkthrough the registry was first exercised with.
#[test]
fn walkthrough() {
    static DIGITS: &[u8] = b"0123456789";
    static LETTERS: &[u8] = b"!ABCDEF";

    let mut registry = CellRegistry::new();
    assert_eq!(registry.len(), 0);

    // Heap array of 100 doubles, handed to the registry.
    let array = registry.append_zeroed(8 * 100, -1).unwrap();
    registry.data_mut(array).unwrap()[..8].copy_from_slice(&123.45f64.to_ne_bytes());
    let first = registry.data(registry.head().unwrap()).unwrap();
    assert_eq!(f64::from_ne_bytes(first[..8].try_into().unwrap()), 123.45);

    let digits = registry
        .append_external(ExternalBuffer::from_static(DIGITS), 0)
        .unwrap();
    assert_eq!(registry.data(registry.tail().unwrap()).unwrap(), DIGITS);

    let mut n = 100i32.to_ne_bytes().to_vec();
    let number = registry.append_external(borrow_vec(&mut n), 1).unwrap();
    assert_eq!(registry.len(), 3);

    assert!(registry.remove(number));
    let letters = registry
        .append_external(ExternalBuffer::from_static(LETTERS), 0)
        .unwrap();
    assert_eq!(order(&registry), vec![array, digits, letters]);

    assert_eq!(registry.release_all(true), 3);
    assert!(registry.is_empty());
    assert_eq!(i32::from_ne_bytes(n[..].try_into().unwrap()), 100);

    // Heap string with an overstated size; the sole cell is removed.
    let mut text = vec![0x40u8; 64];
    text[63] = 0;
    let text = registry.append(Some(CellBuffer::from(text)), 100, -1).unwrap();
    assert_eq!(registry.data(text).unwrap()[0], b'@');
    assert!(registry.remove(text));
    assert!(registry.is_empty());

    // Four cells, counts shuffled.
    let mut storage = vec![vec![0u8; 12]; 4];
    let mut cells = storage.iter_mut().map(borrow_vec);
    let v1 = registry.append_external(cells.next().unwrap(), 0).unwrap();
    registry.increment(v1).unwrap();
    let v2 = registry.append_external(cells.next().unwrap(), 0).unwrap();
    let v3 = registry.append_external(cells.next().unwrap(), 0).unwrap();
    registry.increment(v3).unwrap();
    registry.increment(v3).unwrap();
    let v4 = registry.append_external(cells.next().unwrap(), 0).unwrap();
    drop(cells);

    assert!(registry.remove(v4));
    assert!(registry.remove(v2));
    assert_eq!(order(&registry), vec![v1, v3]);

    registry.decrement(v1);
    registry.decrement(v1);
    assert_eq!(order(&registry), vec![v3]);

    // v3 is shared, so the unforced release leaves it alone.
    assert_eq!(registry.release_all(false), 0);
    assert_eq!(registry.find(v3).unwrap().ref_count(), 3);

    assert_eq!(registry.decrement(v3), Decrement::Retained(2));
    assert_eq!(registry.release_all(true), 1);
    assert!(registry.is_empty());
    assert!(registry.verify().is_ok());
    assert_eq!(registry.stats().appended, 9);
    assert_eq!(registry.stats().removed, 9);
}
