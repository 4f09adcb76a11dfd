//! Synchronization between a pierced kernel and the storages bound to it.
//!
//! The kernel is the master: every structural edit is described by a
//! [SyncAction]. Concurrent slaves apply each action immediately. Journaled
//! slaves only see the actions when the master is synced, at which point the
//! coalesced journal is replayed in record order.

use std::{
    cell::RefCell,
    io::{Read, Write},
    rc::{Rc, Weak},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::trace;

use crate::error::PiercedError;

/// Marker for unused info fields in the binary record.
const UNUSED_INFO: u64 = u64::MAX;

/// How a slave follows the actions of its master.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// Actions are applied as soon as they happen.
    Concurrent,
    /// Actions are recorded and replayed on [PiercedSyncMaster::sync].
    Journaled,
}

/// A structural edit of a pierced kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncAction {
    /// All slots were removed.
    Clear,
    /// A slot was added at the end.
    Append {
        /// Position of the new slot.
        pos: usize,
    },
    /// The slot array was resized.
    Resize {
        /// New number of slots.
        size: usize,
    },
    /// A slot became a hole.
    Pierce {
        /// Position of the hole.
        pos: usize,
    },
    /// Several slots became holes.
    PierceMultiple {
        /// Positions of the holes, in the order they were created.
        positions: Vec<usize>,
    },
    /// A hole was filled again.
    Overwrite {
        /// Position of the filled hole.
        pos: usize,
    },
    /// Several holes were filled again.
    OverwriteMultiple {
        /// Positions of the filled holes.
        positions: Vec<usize>,
    },
    /// Slots were permuted and compacted: new slot `i` holds old slot `order[i]`.
    Reorder {
        /// Old position of every new slot.
        order: Vec<usize>,
    },
    /// Nothing happened.
    Noop,
}

impl SyncAction {
    fn tag(&self) -> i32 {
        match self {
            SyncAction::Noop => 0,
            SyncAction::Clear => 1,
            SyncAction::Append { .. } => 2,
            SyncAction::Resize { .. } => 3,
            SyncAction::Pierce { .. } => 4,
            SyncAction::PierceMultiple { .. } => 5,
            SyncAction::Overwrite { .. } => 6,
            SyncAction::OverwriteMultiple { .. } => 7,
            SyncAction::Reorder { .. } => 8,
        }
    }

    /// Write the binary record of the action.
    ///
    /// The record is the tag (`i32`), three info fields (`u64` position, next
    /// position and size, unused ones set to `u64::MAX`), the data length
    /// (`u64`) and the data (`u64` each). Everything is little endian.
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let (pos, size, data): (u64, u64, &[usize]) = match self {
            SyncAction::Append { pos }
            | SyncAction::Pierce { pos }
            | SyncAction::Overwrite { pos } => (*pos as u64, UNUSED_INFO, &[][..]),
            SyncAction::Resize { size } => (UNUSED_INFO, *size as u64, &[][..]),
            SyncAction::PierceMultiple { positions }
            | SyncAction::OverwriteMultiple { positions } => {
                (UNUSED_INFO, UNUSED_INFO, positions.as_slice())
            }
            SyncAction::Reorder { order } => (UNUSED_INFO, order.len() as u64, order.as_slice()),
            SyncAction::Clear | SyncAction::Noop => (UNUSED_INFO, UNUSED_INFO, &[][..]),
        };

        writer.write_i32::<LittleEndian>(self.tag())?;
        writer.write_u64::<LittleEndian>(pos)?;
        writer.write_u64::<LittleEndian>(UNUSED_INFO)?;
        writer.write_u64::<LittleEndian>(size)?;
        writer.write_u64::<LittleEndian>(data.len() as u64)?;
        for &value in data {
            writer.write_u64::<LittleEndian>(value as u64)?;
        }
        Ok(())
    }

    /// Read an action written by [SyncAction::write_binary].
    pub fn read_binary<R: Read>(reader: &mut R) -> Result<SyncAction, PiercedError> {
        let tag = reader.read_i32::<LittleEndian>()?;
        let pos = reader.read_u64::<LittleEndian>()?;
        let _pos_next = reader.read_u64::<LittleEndian>()?;
        let size = reader.read_u64::<LittleEndian>()?;
        let len = reader.read_u64::<LittleEndian>()?;
        let data = (0..len)
            .map(|_| reader.read_u64::<LittleEndian>().map(|value| value as usize))
            .collect::<Result<Vec<_>, _>>()?;

        let pos = pos as usize;
        let action = match tag {
            0 => SyncAction::Noop,
            1 => SyncAction::Clear,
            2 => SyncAction::Append { pos },
            3 => SyncAction::Resize {
                size: size as usize,
            },
            4 => SyncAction::Pierce { pos },
            5 => SyncAction::PierceMultiple { positions: data },
            6 => SyncAction::Overwrite { pos },
            7 => SyncAction::OverwriteMultiple { positions: data },
            8 => {
                if data.len() as u64 != size {
                    return Err(PiercedError::CorruptJournal(format!(
                        "reorder of size {size} carries {} entries",
                        data.len()
                    )));
                }
                SyncAction::Reorder { order: data }
            }
            _ => return Err(PiercedError::CorruptJournal(format!("unknown tag {tag}"))),
        };
        Ok(action)
    }
}

/// Merge `action` into `previous` if the two can be expressed as one.
///
/// Returns the action back if it has to be recorded on its own.
fn merge(previous: &mut SyncAction, action: SyncAction) -> Option<SyncAction> {
    let replacement = match (&*previous, &action) {
        (SyncAction::Append { .. } | SyncAction::Resize { .. }, SyncAction::Append { pos }) => {
            Some(SyncAction::Resize { size: pos + 1 })
        }
        (SyncAction::Append { .. } | SyncAction::Resize { .. }, SyncAction::Resize { size }) => {
            Some(SyncAction::Resize { size: *size })
        }
        (SyncAction::Pierce { pos: first }, SyncAction::Pierce { pos }) => {
            Some(SyncAction::PierceMultiple {
                positions: vec![*first, *pos],
            })
        }
        (SyncAction::Overwrite { pos: first }, SyncAction::Overwrite { pos }) => {
            Some(SyncAction::OverwriteMultiple {
                positions: vec![*first, *pos],
            })
        }
        _ => None,
    };
    if let Some(replacement) = replacement {
        *previous = replacement;
        return None;
    }

    match (previous, action) {
        (SyncAction::PierceMultiple { positions }, SyncAction::Pierce { pos })
        | (SyncAction::OverwriteMultiple { positions }, SyncAction::Overwrite { pos }) => {
            positions.push(pos);
            None
        }
        (SyncAction::PierceMultiple { positions }, SyncAction::PierceMultiple { positions: more })
        | (
            SyncAction::OverwriteMultiple { positions },
            SyncAction::OverwriteMultiple { positions: more },
        ) => {
            positions.extend(more);
            None
        }
        (_, action) => Some(action),
    }
}

/// Apply `action` to a value array that mirrors the slots of a kernel.
///
/// New and pierced slots hold `V::default()`.
pub(crate) fn commit_values<V: Default>(values: &mut Vec<V>, action: &SyncAction) {
    match action {
        SyncAction::Clear => values.clear(),
        SyncAction::Append { pos } => values.resize_with(pos + 1, V::default),
        SyncAction::Resize { size } => values.resize_with(*size, V::default),
        SyncAction::Pierce { pos } | SyncAction::Overwrite { pos } => {
            values[*pos] = V::default();
        }
        SyncAction::PierceMultiple { positions } | SyncAction::OverwriteMultiple { positions } => {
            for &pos in positions {
                values[pos] = V::default();
            }
        }
        SyncAction::Reorder { order } => {
            let mut old = values.drain(..).map(Some).collect::<Vec<_>>();
            values.extend(order.iter().map(|&slot| old[slot].take().unwrap_or_default()));
        }
        SyncAction::Noop => (),
    }
}

/// Something that follows the structural edits of a pierced kernel.
pub trait PiercedSyncSlave {
    /// Apply one action.
    fn commit_sync_action(&mut self, action: &SyncAction);
}

struct SlaveEntry {
    slave: Weak<RefCell<dyn PiercedSyncSlave>>,
    address: usize,
    mode: SyncMode,
}

fn address_of<S: ?Sized>(slave: &Rc<RefCell<S>>) -> usize {
    Rc::as_ptr(slave) as *const () as usize
}

/// Registry of slaves and journal of pending actions.
///
/// Slaves are held weakly: a dropped slave silently leaves the registry.
#[derive(Default)]
pub struct PiercedSyncMaster {
    slaves: Vec<SlaveEntry>,
    journal: Vec<SyncAction>,
}

impl PiercedSyncMaster {
    /// Create a master without slaves.
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(&mut self) {
        self.slaves.retain(|entry| entry.slave.strong_count() > 0);
    }

    fn has_journaled_slaves(&self) -> bool {
        self.slaves
            .iter()
            .any(|entry| entry.mode == SyncMode::Journaled && entry.slave.strong_count() > 0)
    }

    /// Register `slave` with the given mode.
    ///
    /// A journaled slave that joins while other journaled slaves have pending
    /// actions triggers a sync first, so that the journal only ever describes
    /// edits that every journaled slave has yet to see.
    pub fn register_slave<S: PiercedSyncSlave + 'static>(
        &mut self,
        slave: &Rc<RefCell<S>>,
        mode: SyncMode,
    ) -> Result<(), PiercedError> {
        self.prune();
        let address = address_of(slave);
        if self.slaves.iter().any(|entry| entry.address == address) {
            return Err(PiercedError::AlreadyRegistered);
        }
        if mode == SyncMode::Journaled && !self.journal.is_empty() {
            self.sync();
        }

        let slave: Rc<RefCell<dyn PiercedSyncSlave>> = slave.clone();
        self.slaves.push(SlaveEntry {
            slave: Rc::downgrade(&slave),
            address,
            mode,
        });
        Ok(())
    }

    /// Remove `slave` from the registry. Unknown slaves are ignored.
    pub fn unregister_slave<S: ?Sized>(&mut self, slave: &Rc<RefCell<S>>) {
        let address = address_of(slave);
        self.slaves.retain(|entry| entry.address != address);
        self.prune();
        if !self.has_journaled_slaves() {
            self.journal.clear();
        }
    }

    /// Whether `slave` is registered.
    pub fn is_slave_registered<S: ?Sized>(&self, slave: &Rc<RefCell<S>>) -> bool {
        let address = address_of(slave);
        self.slaves
            .iter()
            .any(|entry| entry.address == address && entry.slave.strong_count() > 0)
    }

    /// Mode of a registered slave.
    pub fn slave_mode<S: ?Sized>(&self, slave: &Rc<RefCell<S>>) -> Option<SyncMode> {
        let address = address_of(slave);
        self.slaves
            .iter()
            .find(|entry| entry.address == address)
            .map(|entry| entry.mode)
    }

    /// Number of live slaves.
    pub fn slave_count(&self) -> usize {
        self.slaves
            .iter()
            .filter(|entry| entry.slave.strong_count() > 0)
            .count()
    }

    /// Dispatch an action to the slaves.
    ///
    /// # Panics
    /// Panics if a concurrent slave is borrowed while the kernel is edited.
    pub(crate) fn process(&mut self, action: &SyncAction) {
        self.prune();
        let mut journaled = false;
        for entry in &self.slaves {
            match entry.mode {
                SyncMode::Concurrent => {
                    if let Some(slave) = entry.slave.upgrade() {
                        slave.borrow_mut().commit_sync_action(action);
                    }
                }
                SyncMode::Journaled => journaled = true,
            }
        }
        if journaled {
            self.record(action.clone());
        }
    }

    fn record(&mut self, action: SyncAction) {
        trace!(?action, "journal sync action");
        match action {
            SyncAction::Noop => (),
            SyncAction::Clear => {
                self.journal.clear();
                self.journal.push(SyncAction::Clear);
            }
            action => {
                let pending = match self.journal.last_mut() {
                    Some(previous) => merge(previous, action),
                    None => Some(action),
                };
                if let Some(action) = pending {
                    self.journal.push(action);
                }
            }
        }
    }

    /// Replay the journal on every journaled slave and clear it.
    pub fn sync(&mut self) {
        self.prune();
        for entry in &self.slaves {
            if entry.mode != SyncMode::Journaled {
                continue;
            }
            if let Some(slave) = entry.slave.upgrade() {
                let mut slave = slave.borrow_mut();
                for action in &self.journal {
                    slave.commit_sync_action(action);
                }
            }
        }
        if !self.journal.is_empty() {
            trace!(actions = self.journal.len(), "replayed sync journal");
        }
        self.journal.clear();
    }

    /// Whether every slave has seen every action.
    pub fn is_synced(&self) -> bool {
        self.journal.is_empty() || !self.has_journaled_slaves()
    }

    /// Pending actions.
    pub fn journal(&self) -> &[SyncAction] {
        &self.journal
    }

    /// Write the pending actions, prefixed by their number.
    pub fn dump_journal<W: Write>(&self, writer: &mut W) -> Result<(), PiercedError> {
        writer.write_u64::<LittleEndian>(self.journal.len() as u64)?;
        for action in &self.journal {
            action.write_binary(writer)?;
        }
        Ok(())
    }

    /// Replace the pending actions with a journal written by [PiercedSyncMaster::dump_journal].
    pub fn restore_journal<R: Read>(&mut self, reader: &mut R) -> Result<(), PiercedError> {
        let len = reader.read_u64::<LittleEndian>()?;
        self.journal = (0..len)
            .map(|_| SyncAction::read_binary(reader))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use super::{commit_values, merge, PiercedSyncMaster, PiercedSyncSlave, SyncAction, SyncMode};
    use crate::error::PiercedError;

    #[derive(Default)]
    struct Recorder {
        actions: Vec<SyncAction>,
    }

    impl PiercedSyncSlave for Recorder {
        fn commit_sync_action(&mut self, action: &SyncAction) {
            self.actions.push(action.clone());
        }
    }

    fn journal_of(actions: Vec<SyncAction>) -> Vec<SyncAction> {
        let mut master = PiercedSyncMaster::new();
        let slave = Rc::new(RefCell::new(Recorder::default()));
        master.register_slave(&slave, SyncMode::Journaled).unwrap();
        for action in &actions {
            master.process(action);
        }
        master.journal().to_vec()
    }

    #[test]
    fn test_coalescing() {
        let journal = journal_of(vec![
            SyncAction::Append { pos: 0 },
            SyncAction::Append { pos: 1 },
            SyncAction::Append { pos: 2 },
            SyncAction::Pierce { pos: 1 },
            SyncAction::Pierce { pos: 0 },
            SyncAction::Pierce { pos: 2 },
            SyncAction::Noop,
            SyncAction::Overwrite { pos: 1 },
            SyncAction::Overwrite { pos: 0 },
        ]);
        assert_eq!(
            journal,
            [
                SyncAction::Resize { size: 3 },
                SyncAction::PierceMultiple {
                    positions: vec![1, 0, 2]
                },
                SyncAction::OverwriteMultiple {
                    positions: vec![1, 0]
                },
            ]
        );

        let journal = journal_of(vec![
            SyncAction::Resize { size: 4 },
            SyncAction::Append { pos: 4 },
            SyncAction::Reorder { order: vec![1, 0] },
            SyncAction::Append { pos: 2 },
        ]);
        assert_eq!(
            journal,
            [
                SyncAction::Resize { size: 5 },
                SyncAction::Reorder { order: vec![1, 0] },
                SyncAction::Append { pos: 2 },
            ]
        );

        let journal = journal_of(vec![
            SyncAction::Append { pos: 0 },
            SyncAction::Pierce { pos: 0 },
            SyncAction::Clear,
            SyncAction::Append { pos: 0 },
        ]);
        assert_eq!(journal, [SyncAction::Clear, SyncAction::Append { pos: 0 }]);
    }

    #[test]
    fn test_merge_keeps_unrelated_actions() {
        let mut previous = SyncAction::Pierce { pos: 3 };
        let back = merge(&mut previous, SyncAction::Overwrite { pos: 3 });
        assert_eq!(back, Some(SyncAction::Overwrite { pos: 3 }));
        assert_eq!(previous, SyncAction::Pierce { pos: 3 });
    }

    #[test]
    fn test_modes() {
        let mut master = PiercedSyncMaster::new();
        let concurrent = Rc::new(RefCell::new(Recorder::default()));
        let journaled = Rc::new(RefCell::new(Recorder::default()));

        // Without journaled slaves nothing is recorded.
        master.register_slave(&concurrent, SyncMode::Concurrent).unwrap();
        master.process(&SyncAction::Append { pos: 0 });
        assert!(master.journal().is_empty());
        assert!(master.is_synced());

        master.register_slave(&journaled, SyncMode::Journaled).unwrap();
        master.process(&SyncAction::Append { pos: 1 });
        assert_eq!(concurrent.borrow().actions.len(), 2);
        assert!(journaled.borrow().actions.is_empty());
        assert!(!master.is_synced());

        master.sync();
        assert!(master.is_synced());
        assert_eq!(journaled.borrow().actions, [SyncAction::Append { pos: 1 }]);

        assert!(matches!(
            master.register_slave(&journaled, SyncMode::Concurrent),
            Err(PiercedError::AlreadyRegistered)
        ));

        master.unregister_slave(&journaled);
        master.unregister_slave(&journaled);
        assert!(!master.is_slave_registered(&journaled));
        assert_eq!(master.slave_mode(&concurrent), Some(SyncMode::Concurrent));

        drop(concurrent);
        assert_eq!(master.slave_count(), 0);
    }

    #[test]
    fn test_dropped_journaled_slave_is_synced() {
        let mut master = PiercedSyncMaster::new();
        let journaled = Rc::new(RefCell::new(Recorder::default()));
        master.register_slave(&journaled, SyncMode::Journaled).unwrap();
        master.process(&SyncAction::Append { pos: 0 });
        assert!(!master.is_synced());
        drop(journaled);
        assert!(master.is_synced());
    }

    #[test]
    fn test_journal_dump_and_restore() {
        let mut master = PiercedSyncMaster::new();
        let slave = Rc::new(RefCell::new(Recorder::default()));
        master.register_slave(&slave, SyncMode::Journaled).unwrap();
        for action in [
            SyncAction::Append { pos: 0 },
            SyncAction::Append { pos: 1 },
            SyncAction::Pierce { pos: 0 },
            SyncAction::Reorder { order: vec![1] },
            SyncAction::Overwrite { pos: 0 },
        ] {
            master.process(&action);
        }

        let mut buffer = Vec::new();
        master.dump_journal(&mut buffer).unwrap();
        // Length prefix plus four records of 36 bytes and the reorder data.
        assert_eq!(buffer.len(), 8 + 4 * 36 + 8);

        let mut restored = PiercedSyncMaster::new();
        restored.restore_journal(&mut buffer.as_slice()).unwrap();
        assert_eq!(restored.journal(), master.journal());

        buffer[8] = 42;
        assert!(matches!(
            restored.restore_journal(&mut buffer.as_slice()),
            Err(PiercedError::CorruptJournal(_))
        ));
        assert!(matches!(
            restored.restore_journal(&mut &buffer[..20]),
            Err(PiercedError::Io(_))
        ));
    }

    #[test]
    fn test_commit_values() {
        let mut values = vec![10, 11, 12];
        commit_values(&mut values, &SyncAction::Append { pos: 3 });
        commit_values(&mut values, &SyncAction::Pierce { pos: 1 });
        assert_eq!(values, [10, 0, 12, 0]);
        commit_values(&mut values, &SyncAction::Reorder { order: vec![2, 0, 3] });
        assert_eq!(values, [12, 10, 0]);
        commit_values(&mut values, &SyncAction::Clear);
        assert!(values.is_empty());
    }
}
