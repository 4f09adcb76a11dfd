//! Value arrays bound to a pierced kernel.

use std::{
    cell::{Ref, RefCell},
    iter::Enumerate,
    rc::Rc,
    slice,
};

use super::{
    kernel::{KernelRef, PiercedId, PiercedKernel},
    sync::{commit_values, PiercedSyncSlave, SyncAction, SyncMode},
};
use crate::error::PiercedError;

/// Shared handle to a storage, as registered with its kernel.
pub type SharedStorage<V, Id> = Rc<RefCell<PiercedStorage<V, Id>>>;

/// Iterator over the live slots of a value array.
///
/// The same type serves shared and mutable iteration, depending on the
/// slice iterator `I` it wraps. Items are `(id, value)` pairs in slot order.
/// The kernel stays borrowed while the iterator is alive, so it cannot be
/// edited underneath.
pub struct PiercedIter<'a, Id: PiercedId, I> {
    kernel: Ref<'a, PiercedKernel<Id>>,
    inner: Enumerate<I>,
}

impl<'a, Id: PiercedId, I: Iterator> PiercedIter<'a, Id, I> {
    pub(crate) fn new(kernel: Ref<'a, PiercedKernel<Id>>, inner: I) -> Self {
        Self {
            kernel,
            inner: inner.enumerate(),
        }
    }
}

impl<Id: PiercedId, I: Iterator> Iterator for PiercedIter<'_, Id, I> {
    type Item = (Id, I::Item);

    fn next(&mut self) -> Option<Self::Item> {
        for (slot, value) in self.inner.by_ref() {
            if let Some(id) = self.kernel.id_at(slot) {
                return Some((id, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}

impl<Id: PiercedId, I: DoubleEndedIterator + ExactSizeIterator> DoubleEndedIterator
    for PiercedIter<'_, Id, I>
{
    fn next_back(&mut self) -> Option<Self::Item> {
        while let Some((slot, value)) = self.inner.next_back() {
            if let Some(id) = self.kernel.id_at(slot) {
                return Some((id, value));
            }
        }
        None
    }
}

impl<Id: PiercedId, I: Clone> Clone for PiercedIter<'_, Id, I> {
    fn clone(&self) -> Self {
        Self {
            kernel: Ref::clone(&self.kernel),
            inner: self.inner.clone(),
        }
    }
}

/// A value array that follows the slots of a kernel.
///
/// The storage registers itself as a slave of the kernel: new slots are
/// filled with `V::default()` and reordered slots move their values along.
/// In [SyncMode::Journaled] mode the values only follow once the kernel is
/// synced, and accessing them before that is a logic error.
pub struct PiercedStorage<V, Id: PiercedId> {
    kernel: Option<KernelRef<Id>>,
    mode: SyncMode,
    values: Vec<V>,
}

impl<V: Default + 'static, Id: PiercedId> PiercedStorage<V, Id> {
    /// Create a storage that follows `kernel` concurrently.
    pub fn new(kernel: &KernelRef<Id>) -> Result<SharedStorage<V, Id>, PiercedError> {
        Self::attach(kernel, SyncMode::Concurrent)
    }

    /// Create a storage sized to the slots of `kernel` and register it with the given mode.
    pub fn attach(
        kernel: &KernelRef<Id>,
        mode: SyncMode,
    ) -> Result<SharedStorage<V, Id>, PiercedError> {
        let mut values = Vec::new();
        values.resize_with(kernel.borrow().raw_len(), V::default);
        let storage = Rc::new(RefCell::new(Self {
            kernel: Some(kernel.clone()),
            mode,
            values,
        }));
        kernel.borrow_mut().register_slave(&storage, mode)?;
        Ok(storage)
    }

    /// Unregister the storage from its kernel. The values are kept.
    pub fn detach(storage: &SharedStorage<V, Id>) {
        let kernel = storage.borrow_mut().kernel.take();
        if let Some(kernel) = kernel {
            kernel.borrow_mut().unregister_slave(storage);
        }
    }
}

impl<V, Id: PiercedId> PiercedStorage<V, Id> {
    fn kernel_ref(&self) -> Result<&KernelRef<Id>, PiercedError> {
        self.kernel.as_ref().ok_or(PiercedError::Detached)
    }

    fn slot_of(&self, id: Id) -> Result<usize, PiercedError> {
        self.kernel_ref()?
            .borrow()
            .find(id)
            .ok_or_else(|| PiercedError::NotFound(format!("{id:?}")))
    }

    /// The kernel the storage follows, `None` once detached.
    pub(crate) fn kernel(&self) -> Option<&KernelRef<Id>> {
        self.kernel.as_ref()
    }

    /// Whether the storage follows a kernel.
    pub fn is_attached(&self) -> bool {
        self.kernel.is_some()
    }

    /// Synchronization mode.
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Whether the values reflect the current slots of the kernel.
    pub fn is_synced(&self) -> bool {
        match (&self.kernel, self.mode) {
            (Some(kernel), SyncMode::Journaled) => kernel.borrow().is_synced(),
            (Some(_), SyncMode::Concurrent) => true,
            (None, _) => false,
        }
    }

    /// Value of `id`.
    pub fn at(&self, id: Id) -> Result<&V, PiercedError> {
        let slot = self.slot_of(id)?;
        Ok(&self.values[slot])
    }

    /// Mutable value of `id`.
    pub fn at_mut(&mut self, id: Id) -> Result<&mut V, PiercedError> {
        let slot = self.slot_of(id)?;
        Ok(&mut self.values[slot])
    }

    /// Replace the value of `id`.
    pub fn set(&mut self, id: Id, value: V) -> Result<(), PiercedError> {
        *self.at_mut(id)? = value;
        Ok(())
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

    /// All values, holes included.
    pub fn raw_values(&self) -> &[V] {
        &self.values
    }

    /// Iterate over `(id, &value)` pairs of the live slots.
    pub fn iter(&self) -> Result<PiercedIter<'_, Id, slice::Iter<'_, V>>, PiercedError> {
        let kernel = self.kernel_ref()?.borrow();
        Ok(PiercedIter::new(kernel, self.values.iter()))
    }

    /// Iterate over `(id, &mut value)` pairs of the live slots.
    pub fn iter_mut(&mut self) -> Result<PiercedIter<'_, Id, slice::IterMut<'_, V>>, PiercedError> {
        let kernel = self.kernel.as_ref().ok_or(PiercedError::Detached)?.borrow();
        Ok(PiercedIter::new(kernel, self.values.iter_mut()))
    }
}

impl<V: Default, Id: PiercedId> PiercedSyncSlave for PiercedStorage<V, Id> {
    fn commit_sync_action(&mut self, action: &SyncAction) {
        commit_values(&mut self.values, action);
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use proptest::prelude::{prop, prop_assert_eq, proptest, Just, Strategy};

    use super::PiercedStorage;
    use crate::{
        error::PiercedError,
        pierced::{kernel::PiercedKernel, sync::SyncMode},
    };

    #[test]
    fn test_concurrent_storage_follows_kernel() {
        let kernel = PiercedKernel::<u64>::new_shared();
        let storage = PiercedStorage::<f64, u64>::new(&kernel).unwrap();

        for id in [5, 7, 2] {
            kernel.borrow_mut().insert(id).unwrap();
            storage.borrow_mut().set(id, id as f64).unwrap();
        }
        kernel.borrow_mut().erase(7).unwrap();
        assert_eq!(storage.borrow().raw_values(), [5.0, 0.0, 2.0]);

        kernel.borrow_mut().insert(9).unwrap();
        storage.borrow_mut().set(9, 9.0).unwrap();
        kernel.borrow_mut().erase(5).unwrap();
        kernel.borrow_mut().squeeze();

        let storage = storage.borrow();
        assert_eq!(storage.raw_values(), [9.0, 2.0]);
        assert_eq!(*storage.at(2).unwrap(), 2.0);
        assert!(matches!(storage.at(5), Err(PiercedError::NotFound(_))));
    }

    #[test]
    fn test_iterators() {
        let kernel = PiercedKernel::<u32>::new_shared();
        let storage = PiercedStorage::<u32, u32>::new(&kernel).unwrap();
        for id in 0..5 {
            kernel.borrow_mut().insert(id).unwrap();
        }
        kernel.borrow_mut().erase(1).unwrap();
        kernel.borrow_mut().erase(4).unwrap();

        {
            let mut storage = storage.borrow_mut();
            for (id, value) in storage.iter_mut().unwrap() {
                *value = 10 * id;
            }
        }

        let storage = storage.borrow();
        let iter = storage.iter().unwrap();
        let restarted = iter.clone();
        assert_eq!(iter.map(|(id, &v)| (id, v)).collect_vec(), [(0, 0), (2, 20), (3, 30)]);
        assert_eq!(restarted.rev().map(|(id, _)| id).collect_vec(), [3, 2, 0]);
    }

    #[test]
    fn test_detach() {
        let kernel = PiercedKernel::<u64>::new_shared();
        let storage = PiercedStorage::<i32, u64>::new(&kernel).unwrap();
        assert!(kernel.borrow().is_slave_registered(&storage));

        PiercedStorage::detach(&storage);
        assert!(!kernel.borrow().is_slave_registered(&storage));
        kernel.borrow_mut().insert(1).unwrap();
        assert!(storage.borrow().raw_values().is_empty());
        assert!(matches!(storage.borrow().at(1), Err(PiercedError::Detached)));
        assert!(storage.borrow().iter().is_err());
    }

    #[test]
    fn test_several_storages_share_a_kernel() {
        let kernel = PiercedKernel::<u64>::new_shared();
        let first = PiercedStorage::<u8, u64>::new(&kernel).unwrap();
        let second = PiercedStorage::<String, u64>::attach(&kernel, SyncMode::Journaled).unwrap();

        kernel.borrow_mut().insert(3).unwrap();
        kernel.borrow_mut().insert(4).unwrap();
        assert_eq!(first.borrow().raw_values().len(), 2);
        assert!(second.borrow().raw_values().is_empty());
        assert!(!second.borrow().is_synced());

        kernel.borrow_mut().sync();
        assert!(second.borrow().is_synced());
        second.borrow_mut().set(4, "four".to_string()).unwrap();
        assert_eq!(second.borrow().at(4).unwrap(), "four");
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(u64),
        Erase(usize),
        Squeeze,
        Reverse,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop::strategy::Union::new(vec![
            (100u64..200).prop_map(Op::Insert).boxed(),
            (0usize..64).prop_map(Op::Erase).boxed(),
            Just(Op::Squeeze).boxed(),
            Just(Op::Reverse).boxed(),
        ])
    }

    proptest! {
        #[test]
        fn test_journal_replay_matches_concurrent(ops in prop::collection::vec(op_strategy(), 0..40)) {
            let kernel = PiercedKernel::<u64>::new_shared();
            let concurrent = PiercedStorage::<u64, u64>::attach(&kernel, SyncMode::Concurrent).unwrap();
            let journaled = PiercedStorage::<u64, u64>::attach(&kernel, SyncMode::Journaled).unwrap();

            for id in 0..20 {
                kernel.borrow_mut().insert(id).unwrap();
            }
            kernel.borrow_mut().sync();
            for id in 0..20 {
                concurrent.borrow_mut().set(id, id + 1).unwrap();
                journaled.borrow_mut().set(id, id + 1).unwrap();
            }

            for op in ops {
                let mut kernel = kernel.borrow_mut();
                match op {
                    Op::Insert(id) => {
                        let _ = kernel.insert(id);
                    }
                    Op::Erase(n) => {
                        let ids = kernel.ids().collect_vec();
                        if !ids.is_empty() {
                            kernel.erase(ids[n % ids.len()]).unwrap();
                        }
                    }
                    Op::Squeeze => kernel.squeeze(),
                    Op::Reverse => {
                        let order = (0..kernel.raw_len())
                            .rev()
                            .filter(|&slot| kernel.id_at(slot).is_some())
                            .collect_vec();
                        kernel.reorder(&order).unwrap();
                    }
                }
            }

            kernel.borrow_mut().sync();
            let concurrent_ref = concurrent.borrow();
            let journaled_ref = journaled.borrow();
            prop_assert_eq!(concurrent_ref.raw_values(), journaled_ref.raw_values());
            for id in kernel.borrow().ids() {
                prop_assert_eq!(concurrent_ref.at(id).unwrap(), journaled_ref.at(id).unwrap());
            }
        }
    }
}
