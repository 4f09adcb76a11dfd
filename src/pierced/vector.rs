//! A pierced kernel together with its primary value array.

use std::{cell::Ref, cmp::Ordering, slice};

use itertools::Itertools;

use super::{
    kernel::{KernelRef, PiercedId, PiercedKernel},
    storage::{PiercedIter, PiercedStorage, SharedStorage},
    sync::{commit_values, SyncMode},
};
use crate::error::PiercedError;

/// Values addressed by stable ids.
///
/// The vector owns a kernel and keeps its values in lockstep with it: each
/// kernel edit returns its action and the vector applies it to its own
/// array right away, without going through the journal. Further storages
/// are attached with [PiercedVector::attach_storage] to carry extra data
/// per id. The kernel itself is only lent out for reading, so every edit
/// goes through the vector.
pub struct PiercedVector<V, Id: PiercedId> {
    kernel: KernelRef<Id>,
    values: Vec<V>,
}

impl<V: Default, Id: PiercedId> Default for PiercedVector<V, Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Default, Id: PiercedId> PiercedVector<V, Id> {
    /// Create an empty vector with its own kernel.
    pub fn new() -> Self {
        Self {
            kernel: PiercedKernel::new_shared(),
            values: Vec::new(),
        }
    }

    /// Read access to the kernel of the vector.
    ///
    /// # Panics
    /// Editing the vector while the returned guard is alive panics.
    pub fn kernel(&self) -> Ref<'_, PiercedKernel<Id>> {
        self.kernel.borrow()
    }

    /// Create a storage that follows the slots of the vector in the given mode.
    pub fn attach_storage<S: Default + 'static>(
        &self,
        mode: SyncMode,
    ) -> Result<SharedStorage<S, Id>, PiercedError> {
        PiercedStorage::attach(&self.kernel, mode)
    }

    /// Replay the journal into the journaled storages.
    pub fn sync_storages(&self) {
        self.kernel.borrow_mut().sync();
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.kernel.borrow().len()
    }

    /// Whether the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.kernel.borrow().is_empty()
    }

    /// Number of slots, holes included.
    pub fn raw_len(&self) -> usize {
        self.values.len()
    }

    /// Number of holes.
    pub fn hole_count(&self) -> usize {
        self.kernel.borrow().hole_count()
    }

    /// Store `value` under `id` and return its slot.
    pub fn insert(&mut self, id: Id, value: V) -> Result<usize, PiercedError> {
        let (slot, action) = self.kernel.borrow_mut().insert_recorded(id)?;
        commit_values(&mut self.values, &action);
        self.values[slot] = value;
        Ok(slot)
    }

    /// Remove `id` and return its value.
    pub fn erase(&mut self, id: Id) -> Result<V, PiercedError> {
        let (slot, action) = self.kernel.borrow_mut().erase_recorded(id)?;
        let value = std::mem::take(&mut self.values[slot]);
        commit_values(&mut self.values, &action);
        Ok(value)
    }

    /// Remove all values.
    pub fn clear(&mut self) {
        let action = self.kernel.borrow_mut().clear_recorded();
        commit_values(&mut self.values, &action);
    }

    /// Move all values to the front, keeping their relative order.
    pub fn squeeze(&mut self) {
        let action = self.kernel.borrow_mut().squeeze_recorded();
        commit_values(&mut self.values, &action);
    }

    /// Permute the values so that new slot `i` holds old slot `order[i]`.
    pub fn reorder(&mut self, order: &[usize]) -> Result<(), PiercedError> {
        let action = self.kernel.borrow_mut().reorder_recorded(order)?;
        commit_values(&mut self.values, &action);
        Ok(())
    }

    /// Sort the values with `compare`, dropping all holes.
    pub fn sort_by<F>(&mut self, mut compare: F) -> Result<(), PiercedError>
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        let order = {
            let kernel = self.kernel.borrow();
            (0..self.values.len())
                .filter(|&slot| kernel.id_at(slot).is_some())
                .sorted_by(|&a, &b| compare(&self.values[a], &self.values[b]))
                .collect_vec()
        };
        let in_place = order.iter().enumerate().all(|(i, &slot)| i == slot);
        if in_place && order.len() == self.values.len() {
            return Ok(());
        }
        self.reorder(&order)
    }
}

impl<V, Id: PiercedId> PiercedVector<V, Id> {
    /// Slot of `id`.
    pub fn find(&self, id: Id) -> Option<usize> {
        self.kernel.borrow().find(id)
    }

    /// Whether `id` is stored.
    pub fn contains(&self, id: Id) -> bool {
        self.kernel.borrow().contains(id)
    }

    /// Id at `slot`.
    pub fn id_at(&self, slot: usize) -> Option<Id> {
        self.kernel.borrow().id_at(slot)
    }

    /// Value of `id`.
    pub fn get(&self, id: Id) -> Option<&V> {
        self.find(id).map(|slot| &self.values[slot])
    }

    /// Mutable value of `id`.
    pub fn get_mut(&mut self, id: Id) -> Option<&mut V> {
        self.find(id).map(|slot| &mut self.values[slot])
    }

    /// Value at `slot`.
    ///
    /// # Panics
    /// Panics if `slot` is past the end.
    pub fn raw_at(&self, slot: usize) -> &V {
        &self.values[slot]
    }

    /// Mutable value at `slot`.
    ///
    /// # Panics
    /// Panics if `slot` is past the end.
    pub fn raw_at_mut(&mut self, slot: usize) -> &mut V {
        &mut self.values[slot]
    }

    /// All values as a slice, provided there are no holes.
    pub fn as_slice(&self) -> Option<&[V]> {
        (self.kernel.borrow().hole_count() == 0).then_some(self.values.as_slice())
    }

    /// Live ids in slot order.
    pub fn ids(&self) -> Vec<Id> {
        self.kernel.borrow().ids().collect()
    }

    /// Iterate over `(id, &value)` pairs in slot order.
    pub fn iter(&self) -> PiercedIter<'_, Id, slice::Iter<'_, V>> {
        PiercedIter::new(self.kernel.borrow(), self.values.iter())
    }

    /// Iterate over `(id, &mut value)` pairs in slot order.
    pub fn iter_mut(&mut self) -> PiercedIter<'_, Id, slice::IterMut<'_, V>> {
        PiercedIter::new(self.kernel.borrow(), self.values.iter_mut())
    }
}

impl<V: Clone + Default, Id: PiercedId> Clone for PiercedVector<V, Id> {
    /// Deep copy with a fresh kernel. Slaves of the original are not carried over.
    fn clone(&self) -> Self {
        let mut copy = Self::new();
        for (id, value) in self.iter() {
            // The ids of a kernel are unique.
            let _ = copy.insert(id, value.clone());
        }
        copy
    }
}
