//! Id to slot bookkeeping of the pierced containers.

use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap},
    fmt::Debug,
    hash::Hash,
    io::{Read, Write},
    rc::Rc,
};

use itertools::Itertools;

use super::sync::{PiercedSyncMaster, PiercedSyncSlave, SyncAction, SyncMode};
use crate::error::PiercedError;

/// Element identifiers stored in a kernel.
pub trait PiercedId: Copy + Eq + Hash + Debug + 'static {}

impl<T: Copy + Eq + Hash + Debug + 'static> PiercedId for T {}

/// Shared handle to a kernel. Storages keep one to look up their ids.
pub type KernelRef<Id> = Rc<RefCell<PiercedKernel<Id>>>;

/// Maps stable ids to positions (slots) of a sparse array.
///
/// Erasing an id leaves a hole at its slot. Holes are filled again by later
/// inserts, lowest slot first, so the slot of a live id never changes unless
/// the kernel is explicitly squeezed or reordered.
///
/// Every structural edit is forwarded to the registered slaves as a
/// [SyncAction], see [PiercedSyncMaster].
pub struct PiercedKernel<Id: PiercedId> {
    slots: Vec<Option<Id>>,
    positions: HashMap<Id, usize>,
    holes: BTreeSet<usize>,
    sync: PiercedSyncMaster,
}

impl<Id: PiercedId> Default for PiercedKernel<Id> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            positions: HashMap::new(),
            holes: BTreeSet::new(),
            sync: PiercedSyncMaster::new(),
        }
    }
}

impl<Id: PiercedId> PiercedKernel<Id> {
    /// Create an empty kernel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty kernel behind a shared handle.
    pub fn new_shared() -> KernelRef<Id> {
        Rc::new(RefCell::new(Self::new()))
    }

    fn emit(&mut self, action: SyncAction) -> SyncAction {
        self.sync.process(&action);
        action
    }

    /// Insert `id` and return its slot.
    pub fn insert(&mut self, id: Id) -> Result<usize, PiercedError> {
        self.insert_recorded(id).map(|(slot, _)| slot)
    }

    pub(crate) fn insert_recorded(&mut self, id: Id) -> Result<(usize, SyncAction), PiercedError> {
        if self.positions.contains_key(&id) {
            return Err(PiercedError::DuplicateId(format!("{id:?}")));
        }

        let (slot, action) = match self.holes.pop_first() {
            Some(slot) => {
                self.slots[slot] = Some(id);
                (slot, SyncAction::Overwrite { pos: slot })
            }
            None => {
                let slot = self.slots.len();
                self.slots.push(Some(id));
                (slot, SyncAction::Append { pos: slot })
            }
        };
        self.positions.insert(id, slot);

        Ok((slot, self.emit(action)))
    }

    /// Erase `id` and return the slot it occupied.
    pub fn erase(&mut self, id: Id) -> Result<usize, PiercedError> {
        self.erase_recorded(id).map(|(slot, _)| slot)
    }

    pub(crate) fn erase_recorded(&mut self, id: Id) -> Result<(usize, SyncAction), PiercedError> {
        let slot = self
            .positions
            .remove(&id)
            .ok_or_else(|| PiercedError::NotFound(format!("{id:?}")))?;
        self.slots[slot] = None;
        self.holes.insert(slot);

        Ok((slot, self.emit(SyncAction::Pierce { pos: slot })))
    }

    /// Remove all ids.
    pub fn clear(&mut self) {
        self.clear_recorded();
    }

    pub(crate) fn clear_recorded(&mut self) -> SyncAction {
        self.slots.clear();
        self.positions.clear();
        self.holes.clear();
        self.emit(SyncAction::Clear)
    }

    /// Move all live ids to the front, keeping their relative order.
    ///
    /// Does nothing if there are no holes.
    pub fn squeeze(&mut self) {
        self.squeeze_recorded();
    }

    pub(crate) fn squeeze_recorded(&mut self) -> SyncAction {
        if self.holes.is_empty() {
            return SyncAction::Noop;
        }
        let order = self
            .slots
            .iter()
            .positions(|id| id.is_some())
            .collect_vec();
        self.apply_order(order)
    }

    /// Permute the live ids so that new slot `i` holds the id of old slot `order[i]`.
    ///
    /// `order` must list every live slot exactly once; holes are dropped.
    pub fn reorder(&mut self, order: &[usize]) -> Result<(), PiercedError> {
        self.reorder_recorded(order).map(|_| ())
    }

    pub(crate) fn reorder_recorded(&mut self, order: &[usize]) -> Result<SyncAction, PiercedError> {
        if order.len() != self.positions.len() {
            return Err(PiercedError::InvalidOrder(format!(
                "{} entries for {} live slots",
                order.len(),
                self.positions.len()
            )));
        }
        let mut seen = vec![false; self.slots.len()];
        for &slot in order {
            match self.slots.get(slot) {
                Some(Some(_)) if !seen[slot] => seen[slot] = true,
                Some(Some(_)) => {
                    return Err(PiercedError::InvalidOrder(format!("slot {slot} listed twice")))
                }
                _ => {
                    return Err(PiercedError::InvalidOrder(format!(
                        "slot {slot} is not occupied"
                    )))
                }
            }
        }
        Ok(self.apply_order(order.to_vec()))
    }

    fn apply_order(&mut self, order: Vec<usize>) -> SyncAction {
        self.slots = order.iter().map(|&slot| self.slots[slot]).collect();
        self.holes.clear();
        for (slot, id) in self.slots.iter().enumerate() {
            if let Some(id) = id {
                self.positions.insert(*id, slot);
            }
        }
        self.emit(SyncAction::Reorder { order })
    }

    /// Slot of `id`.
    pub fn find(&self, id: Id) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Whether `id` is stored.
    pub fn contains(&self, id: Id) -> bool {
        self.positions.contains_key(&id)
    }

    /// Id stored at `slot`, `None` for holes and slots past the end.
    pub fn id_at(&self, slot: usize) -> Option<Id> {
        self.slots.get(slot).copied().flatten()
    }

    /// Number of live ids.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no id is stored.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of slots, holes included.
    pub fn raw_len(&self) -> usize {
        self.slots.len()
    }

    /// Number of holes.
    pub fn hole_count(&self) -> usize {
        self.holes.len()
    }

    /// Live ids in slot order.
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = Id> + '_ {
        self.slots.iter().flatten().copied()
    }

    /// See [PiercedSyncMaster::register_slave].
    pub fn register_slave<S: PiercedSyncSlave + 'static>(
        &mut self,
        slave: &Rc<RefCell<S>>,
        mode: SyncMode,
    ) -> Result<(), PiercedError> {
        self.sync.register_slave(slave, mode)
    }

    /// See [PiercedSyncMaster::unregister_slave].
    pub fn unregister_slave<S: ?Sized>(&mut self, slave: &Rc<RefCell<S>>) {
        self.sync.unregister_slave(slave)
    }

    /// See [PiercedSyncMaster::is_slave_registered].
    pub fn is_slave_registered<S: ?Sized>(&self, slave: &Rc<RefCell<S>>) -> bool {
        self.sync.is_slave_registered(slave)
    }

    /// Replay pending actions on the journaled slaves.
    pub fn sync(&mut self) {
        self.sync.sync()
    }

    /// Whether every slave has seen every action.
    pub fn is_synced(&self) -> bool {
        self.sync.is_synced()
    }

    /// Pending actions of the journaled slaves.
    pub fn journal(&self) -> &[SyncAction] {
        self.sync.journal()
    }

    /// The synchronization master.
    pub fn sync_master(&self) -> &PiercedSyncMaster {
        &self.sync
    }

    /// See [PiercedSyncMaster::dump_journal].
    pub fn dump_journal<W: Write>(&self, writer: &mut W) -> Result<(), PiercedError> {
        self.sync.dump_journal(writer)
    }

    /// See [PiercedSyncMaster::restore_journal].
    pub fn restore_journal<R: Read>(&mut self, reader: &mut R) -> Result<(), PiercedError> {
        self.sync.restore_journal(reader)
    }
}
