//! Generational handle tables.
//!
//! A handle is `generation << 32 | slot`. Generations start at 1, so `0` is
//! never a live handle. Removing a value bumps the slot's generation, which
//! makes every outstanding copy of the old handle stale: freeing it again is
//! a no-op instead of a double free.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("null handle")]
    Null,
    #[error("stale or foreign handle {0:#018x}")]
    Stale(u64),
}

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    entries: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

/// Per-type table owning every native value currently referenced by a
/// managed wrapper.
pub struct HandleMap<T> {
    slots: Mutex<Slots<T>>,
}

impl<T> HandleMap<T> {
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new(Slots { entries: Vec::new(), free: Vec::new(), live: 0 }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        // values are only moved in and out under the lock, a poisoned guard
        // still holds a consistent table
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, value: T) -> u64 {
        let mut slots = self.lock();
        slots.live += 1;
        if let Some(index) = slots.free.pop() {
            let slot = &mut slots.entries[index as usize];
            slot.value = Some(Arc::new(value));
            return encode(slot.generation, index);
        }
        let index = slots.entries.len() as u32;
        slots.entries.push(Slot { generation: 1, value: Some(Arc::new(value)) });
        encode(1, index)
    }

    /// Shared access; the table lock is released before the value is used.
    pub fn get(&self, handle: u64) -> Result<Arc<T>, HandleError> {
        let slots = self.lock();
        let (generation, index) = decode(handle)?;
        slots
            .entries
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.clone())
            .ok_or(HandleError::Stale(handle))
    }

    /// Owned copy for by-value parameters; the handle stays valid.
    pub fn get_cloned(&self, handle: u64) -> Result<T, HandleError>
    where
        T: Clone,
    {
        Ok(T::clone(&*self.get(handle)?))
    }

    /// Move the value out and invalidate the handle.
    ///
    /// Falls back to a clone when another call still holds a shared
    /// reference to the same value.
    pub fn take(&self, handle: u64) -> Result<T, HandleError>
    where
        T: Clone,
    {
        let value = self.detach(handle).ok_or(HandleError::Stale(handle))?;
        Ok(Arc::try_unwrap(value).unwrap_or_else(|shared| T::clone(&shared)))
    }

    /// Release the value behind `handle`. Returns `false` for stale handles.
    pub fn remove(&self, handle: u64) -> bool {
        self.detach(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn detach(&self, handle: u64) -> Option<Arc<T>> {
        let (generation, index) = decode(handle).ok()?;
        let mut slots = self.lock();
        let slot = slots.entries.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.checked_add(1).unwrap_or(1);
        slots.free.push(index);
        slots.live -= 1;
        Some(value)
    }
}

impl<T> Default for HandleMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(generation: u32, index: u32) -> u64 {
    (u64::from(generation) << 32) | u64::from(index)
}

fn decode(handle: u64) -> Result<(u32, u32), HandleError> {
    if handle == 0 {
        return Err(HandleError::Null);
    }
    Ok(((handle >> 32) as u32, handle as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_returns_value() {
        let map = HandleMap::new();
        let h = map.insert("a".to_string());
        assert_ne!(h, 0);
        assert_eq!(*map.get(h).unwrap(), "a");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn double_remove_is_a_noop() {
        let map = HandleMap::new();
        let h = map.insert(1u32);
        assert!(map.remove(h));
        assert!(!map.remove(h));
        assert!(map.is_empty());
    }

    #[test]
    fn stale_handle_does_not_reach_reused_slot() {
        let map = HandleMap::new();
        let old = map.insert(1u32);
        map.remove(old);
        let new = map.insert(2u32);
        // same slot, different generation
        assert_eq!(old as u32, new as u32);
        assert_ne!(old, new);
        assert_eq!(map.get(old).unwrap_err(), HandleError::Stale(old));
        assert!(!map.remove(old));
        assert_eq!(*map.get(new).unwrap(), 2);
    }

    #[test]
    fn null_handle_is_rejected() {
        let map: HandleMap<u32> = HandleMap::new();
        assert_eq!(map.get(0).unwrap_err(), HandleError::Null);
        assert!(!map.remove(0));
    }

    #[test]
    fn take_invalidates_and_clones_when_shared() {
        let map = HandleMap::new();
        let h = map.insert(vec![1, 2, 3]);
        let shared = map.get(h).unwrap();
        assert_eq!(map.take(h).unwrap(), vec![1, 2, 3]);
        assert_eq!(*shared, vec![1, 2, 3]);
        assert!(map.get(h).is_err());
    }

    #[test]
    fn get_cloned_keeps_handle_alive() {
        let map = HandleMap::new();
        let h = map.insert("x".to_string());
        assert_eq!(map.get_cloned(h).unwrap(), "x");
        assert!(map.get(h).is_ok());
    }
}
