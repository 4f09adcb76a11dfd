//! Linear octree of a single rank.
//!
//! The leaves are kept in a [PiercedVector] in Morton order. Every structural
//! edit goes through the kernel of the vector, so storages created with
//! [LocalTree::attach_storage] follow refinement, coarsening and partitioning.
mod balance;
mod neighbours;

use std::{
    cell::Ref,
    io::{Read, Write},
    slice,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use itertools::Itertools;
use tracing::{debug, warn};

pub use neighbours::Neighbour;
pub(crate) use neighbours::{directions, search_sorted};

use crate::{
    adaption::{count_kind, AdaptionInfo, AdaptionKind},
    constants::MAX_LEVEL,
    error::{OctreeError, OctreeResult},
    octant::Octant,
    pierced::{PiercedIter, PiercedKernel, PiercedVector, SharedStorage, SyncMode},
    topology::TreeConstants,
};

/// Stable handle of an octant.
pub type OctantId = u64;

/// Clamp `marker` so that `level + marker` stays a valid level.
fn clamp_marker(level: u8, marker: i8) -> i8 {
    let level = level as i16;
    (marker as i16).clamp(-level, MAX_LEVEL as i16 - level) as i8
}

/// The octants owned by one rank.
///
/// Between operations the octants are stored without holes and sorted, so
/// the position of an octant equals its index in Morton order.
pub struct LocalTree {
    dim: u8,
    octants: PiercedVector<Octant, OctantId>,
    next_id: OctantId,
    balance_codim: u8,
}

impl LocalTree {
    /// A tree holding only the root octant.
    pub fn new(dim: u8) -> OctreeResult<Self> {
        let mut tree = Self::empty(dim)?;
        tree.insert_octant(Octant::root(dim)?)?;
        Ok(tree)
    }

    /// A tree without octants.
    pub fn empty(dim: u8) -> OctreeResult<Self> {
        TreeConstants::instance(dim)?;
        Ok(Self {
            dim,
            octants: PiercedVector::new(),
            next_id: 0,
            balance_codim: 1,
        })
    }

    /// Build a tree from a set of non overlapping octants.
    ///
    /// The octants are sorted and get the ids `0..n` in Morton order.
    pub fn from_octants(dim: u8, mut octants: Vec<Octant>) -> OctreeResult<Self> {
        let mut tree = Self::empty(dim)?;
        if let Some(other) = octants.iter().find(|octant| octant.dim() != dim) {
            return Err(OctreeError::InvalidConfig(format!(
                "octant of dimension {} in a tree of dimension {dim}",
                other.dim()
            )));
        }
        octants.sort();
        if let Some((first, second)) = octants
            .iter()
            .tuple_windows()
            .find(|(first, second)| first.contains(second))
        {
            return Err(OctreeError::InvalidConfig(format!(
                "octants {first} and {second} overlap"
            )));
        }
        for octant in octants {
            tree.insert_octant(octant)?;
        }
        Ok(tree)
    }

    /// Space dimension.
    pub fn dim(&self) -> u8 {
        self.dim
    }

    /// Codimension up to which 2:1 balance is enforced.
    pub fn balance_codim(&self) -> u8 {
        self.balance_codim
    }

    /// Set the codimension up to which 2:1 balance is enforced.
    pub fn set_balance_codim(&mut self, codim: u8) -> OctreeResult<()> {
        if codim == 0 || codim > self.dim {
            return Err(OctreeError::InvalidConfig(format!(
                "balance codimension {codim} in {} dimensions",
                self.dim
            )));
        }
        self.balance_codim = codim;
        Ok(())
    }

    /// Number of octants.
    pub fn len(&self) -> usize {
        self.octants.len()
    }

    /// Whether the tree has no octants.
    pub fn is_empty(&self) -> bool {
        self.octants.is_empty()
    }

    /// Read access to the kernel of the octant storage.
    ///
    /// # Panics
    /// Editing the tree while the returned guard is alive panics.
    pub fn kernel(&self) -> Ref<'_, PiercedKernel<OctantId>> {
        self.octants.kernel()
    }

    /// Create a storage carrying a value per octant, following every edit of the tree.
    pub fn attach_storage<V: Default + 'static>(
        &self,
        mode: SyncMode,
    ) -> OctreeResult<SharedStorage<V, OctantId>> {
        Ok(self.octants.attach_storage(mode)?)
    }

    /// Bring the journaled storages up to date with the octants.
    pub fn sync_storages(&self) {
        self.octants.sync_storages();
    }

    /// The octant with the given id.
    pub fn octant(&self, id: OctantId) -> Option<&Octant> {
        self.octants.get(id)
    }

    /// All octants in Morton order.
    pub fn octants(&self) -> &[Octant] {
        self.octants.as_slice().unwrap_or_default()
    }

    /// Id of the octant at position `index` in Morton order.
    pub fn id_at(&self, index: usize) -> Option<OctantId> {
        self.octants.id_at(index)
    }

    /// Position of the octant in Morton order.
    pub fn index_of(&self, id: OctantId) -> Option<usize> {
        self.octants.find(id)
    }

    /// Iterate over `(id, octant)` pairs in Morton order.
    pub fn iter(&self) -> PiercedIter<'_, OctantId, slice::Iter<'_, Octant>> {
        self.octants.iter()
    }

    /// All ids in Morton order.
    pub fn ids(&self) -> Vec<OctantId> {
        self.octants.ids()
    }

    fn octant_mut(&mut self, id: OctantId) -> OctreeResult<&mut Octant> {
        self.octants
            .get_mut(id)
            .ok_or(OctreeError::UnknownOctant(id))
    }

    /// Set the refinement marker of an octant.
    ///
    /// The marker is clamped so that the requested level stays within
    /// `0..=MAX_LEVEL`.
    pub fn set_marker(&mut self, id: OctantId, marker: i8) -> OctreeResult<()> {
        let octant = self.octant_mut(id)?;
        let clamped = clamp_marker(octant.level(), marker);
        if clamped != marker {
            warn!(id, marker, clamped, level = octant.level(), "marker clamped");
        }
        octant.set_marker(clamped);
        Ok(())
    }

    /// Marker of an octant.
    pub fn marker(&self, id: OctantId) -> OctreeResult<i8> {
        self.octant(id)
            .map(Octant::marker)
            .ok_or(OctreeError::UnknownOctant(id))
    }

    /// Set the same marker on every octant, clamped per octant.
    pub fn mark_all(&mut self, marker: i8) {
        let mut clamped = 0;
        for (_, octant) in self.octants.iter_mut() {
            let value = clamp_marker(octant.level(), marker);
            if value != marker {
                clamped += 1;
            }
            octant.set_marker(value);
        }
        if clamped > 0 {
            warn!(marker, clamped, "markers clamped");
        }
    }

    /// Enable or disable the 2:1 balance of an octant.
    pub fn set_balance(&mut self, id: OctantId, balance: bool) -> OctreeResult<()> {
        self.octant_mut(id)?.set_balance(balance);
        Ok(())
    }

    /// Set the auxiliary flag of an octant. The flag is free for user code.
    pub fn set_aux(&mut self, id: OctantId, aux: bool) -> OctreeResult<()> {
        self.octant_mut(id)?.set_aux(aux);
        Ok(())
    }

    /// Key of the first deepest descendant of the first octant.
    pub fn first_descendant_key(&self) -> Option<u64> {
        self.octants().first().map(Octant::absolute_key)
    }

    /// Key of the last deepest descendant of the last octant.
    pub fn last_descendant_key(&self) -> Option<u64> {
        self.octants().last().map(Octant::last_descendant_key)
    }

    /// Balance the markers and apply one step of refinement and coarsening.
    ///
    /// `ghosts` are the sorted octants of other ranks adjacent to this tree.
    pub fn adapt(&mut self, ghosts: &[Octant]) -> OctreeResult<Vec<AdaptionInfo>> {
        self.balance(ghosts);
        self.apply()
    }

    /// Adapt until no marker is left.
    pub fn adapt_all(&mut self, ghosts: &[Octant]) -> OctreeResult<Vec<AdaptionInfo>> {
        let mut changelog = Vec::new();
        while self.iter().any(|(_, octant)| octant.marker() != 0) {
            changelog.extend(self.adapt(ghosts)?);
        }
        Ok(changelog)
    }

    /// Refine every octant once.
    pub fn global_refine(&mut self) -> OctreeResult<Vec<AdaptionInfo>> {
        self.mark_all(1);
        self.adapt(&[])
    }

    /// Coarsen every complete family once.
    pub fn global_coarsen(&mut self) -> OctreeResult<Vec<AdaptionInfo>> {
        self.mark_all(-1);
        self.adapt(&[])
    }

    /// Replace marked octants by their children or fathers and restore Morton order.
    pub(crate) fn apply(&mut self) -> OctreeResult<Vec<AdaptionInfo>> {
        for (_, octant) in self.octants.iter_mut() {
            octant.set_new_refined(false);
            octant.set_new_coarsened(false);
        }
        let snapshot = self
            .octants
            .iter()
            .map(|(id, octant)| (id, *octant))
            .collect_vec();
        let n_children = 1usize << self.dim;

        let mut changelog = Vec::new();
        let mut index = 0;
        while index < snapshot.len() {
            let (id, octant) = snapshot[index];
            let marker = octant.marker();

            if marker > 0 && octant.level() < MAX_LEVEL {
                self.octants.erase(id)?;
                let current = octant
                    .build_children()?
                    .into_iter()
                    .map(|child| self.insert_octant(child))
                    .collect::<OctreeResult<Vec<_>>>()?;
                changelog.push(AdaptionInfo::new(AdaptionKind::Refinement, vec![id], current));
                index += 1;
            } else if marker < 0 && is_complete_family(&snapshot[index..], n_children) {
                let family = &snapshot[index..index + n_children];
                let mut father = octant.build_father()?;
                let highest = family
                    .iter()
                    .map(|(_, sibling)| sibling.marker())
                    .max()
                    .unwrap_or(marker);
                father.set_marker(clamp_marker(father.level(), highest + 1));
                father.set_new_coarsened(true);

                let previous = family.iter().map(|&(sibling, _)| sibling).collect_vec();
                for &sibling in &previous {
                    self.octants.erase(sibling)?;
                }
                let current = vec![self.insert_octant(father)?];
                changelog.push(AdaptionInfo::new(AdaptionKind::Coarsening, previous, current));
                index += n_children;
            } else {
                if marker != 0 {
                    self.octant_mut(id)?.set_marker(0);
                }
                index += 1;
            }
        }
        self.sort()?;

        debug!(
            refined = count_kind(&changelog, AdaptionKind::Refinement),
            coarsened = count_kind(&changelog, AdaptionKind::Coarsening),
            octants = self.len(),
            "adapted local tree"
        );
        Ok(changelog)
    }

    /// The octant containing a logical point.
    pub fn locate_logical_point(&self, point: [u32; 3]) -> Option<OctantId> {
        let deepest = Octant::from_coordinates(self.dim, MAX_LEVEL, point).ok()?;
        let octants = self.octants();
        let pos = octants.partition_point(|octant| *octant <= deepest);
        if pos > 0 && octants[pos - 1].contains(&deepest) {
            self.id_at(pos - 1)
        } else {
            None
        }
    }

    /// Write a checkpoint of the tree, ids included.
    pub fn dump<W: Write>(&self, writer: &mut W) -> OctreeResult<()> {
        writer.write_u8(self.dim)?;
        writer.write_u8(self.balance_codim)?;
        writer.write_u64::<LittleEndian>(self.len() as u64)?;
        for (id, octant) in self.iter() {
            writer.write_u64::<LittleEndian>(id)?;
            octant.write_binary(writer)?;
        }
        Ok(())
    }

    /// Read a checkpoint written by [LocalTree::dump].
    pub fn restore<R: Read>(reader: &mut R) -> OctreeResult<Self> {
        let dim = reader.read_u8()?;
        let balance_codim = reader.read_u8()?;
        let mut tree = Self::empty(dim)
            .map_err(|_| OctreeError::InvalidStream(format!("dimension {dim}")))?;
        tree.set_balance_codim(balance_codim)
            .map_err(|_| OctreeError::InvalidStream(format!("balance codimension {balance_codim}")))?;

        let count = reader.read_u64::<LittleEndian>()?;
        let mut previous: Option<Octant> = None;
        for _ in 0..count {
            let id = reader.read_u64::<LittleEndian>()?;
            let octant = Octant::read_binary(reader)?;
            if octant.dim() != dim {
                return Err(OctreeError::InvalidStream(format!(
                    "octant {octant} in a tree of dimension {dim}"
                )));
            }
            if let Some(previous) = previous {
                if previous >= octant || previous.contains(&octant) {
                    return Err(OctreeError::InvalidStream(format!(
                        "octant {octant} does not follow {previous}"
                    )));
                }
            }
            tree.octants.insert(id, octant)?;
            tree.next_id = tree.next_id.max(id.saturating_add(1));
            previous = Some(octant);
        }
        Ok(tree)
    }

    /// Store an octant under a fresh id.
    pub(crate) fn insert_octant(&mut self, octant: Octant) -> OctreeResult<OctantId> {
        let id = self.next_id;
        self.octants.insert(id, octant)?;
        self.next_id += 1;
        Ok(id)
    }

    /// Remove an octant.
    pub(crate) fn erase(&mut self, id: OctantId) -> OctreeResult<Octant> {
        Ok(self.octants.erase(id)?)
    }

    /// Restore Morton order and remove holes.
    pub(crate) fn sort(&mut self) -> OctreeResult<()> {
        self.octants.sort_by(|a, b| a.cmp(b))?;
        Ok(())
    }

    /// Mutable access to every octant, in slot order.
    pub(crate) fn octants_mut(&mut self) -> impl Iterator<Item = &mut Octant> + '_ {
        self.octants.iter_mut().map(|(_, octant)| octant)
    }
}

/// Whether `octants` starts with a complete family of siblings that all request coarsening.
fn is_complete_family(octants: &[(OctantId, Octant)], n_children: usize) -> bool {
    if octants.len() < n_children {
        return false;
    }
    let first = &octants[0].1;
    first.level() > 0
        && octants[..n_children]
            .iter()
            .enumerate()
            .all(|(index, (_, sibling))| {
                sibling.is_sibling_of(first) && sibling.child_index() == index && sibling.marker() < 0
            })
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use super::LocalTree;
    use crate::{
        adaption::{count_kind, AdaptionKind},
        constants::{LOGICAL_LENGTH, MAX_LEVEL},
        error::{OctreeError, PiercedError},
        octant::Octant,
        pierced::{SyncAction, SyncMode},
    };

    /// Whether two octants share a face of positive measure.
    fn face_adjacent(a: &Octant, b: &Octant) -> bool {
        let dim = a.dim() as usize;
        let (ca, cb) = (a.logical_coordinates(), b.logical_coordinates());
        let (sa, sb) = (a.logical_size(), b.logical_size());
        (0..dim).any(|axis| {
            let touching = ca[axis] + sa == cb[axis] || cb[axis] + sb == ca[axis];
            touching
                && (0..dim)
                    .filter(|&other| other != axis)
                    .all(|other| ca[other] < cb[other] + sb && cb[other] < ca[other] + sa)
        })
    }

    fn assert_face_balanced(tree: &LocalTree) {
        for (a, b) in tree.octants().iter().tuple_combinations() {
            if face_adjacent(a, b) {
                assert!(
                    a.level().abs_diff(b.level()) <= 1,
                    "{a} and {b} are not balanced"
                );
            }
        }
    }

    #[test]
    fn test_refine_and_coarsen_root_2d() {
        let mut tree = LocalTree::new(2).unwrap();
        let root = tree.ids()[0];
        tree.set_marker(root, 1).unwrap();

        let changelog = tree.adapt(&[]).unwrap();
        assert_eq!(tree.len(), 4);
        assert_eq!(changelog.len(), 1);
        assert_eq!(changelog[0].kind, AdaptionKind::Refinement);
        assert_eq!(changelog[0].previous, [root]);
        assert_eq!(changelog[0].current, tree.ids());
        for (index, octant) in tree.octants().iter().enumerate() {
            assert_eq!(octant.level(), 1);
            assert_eq!(octant.morton(), index as u64);
            assert!(octant.is_new_refined());
            assert_eq!(octant.marker(), 0);
        }
        assert!(tree.octant(root).is_none());

        tree.mark_all(-1);
        let changelog = tree.adapt(&[]).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(count_kind(&changelog, AdaptionKind::Coarsening), 1);
        assert_eq!(changelog[0].previous.len(), 4);
        let octant = tree.octants()[0];
        assert_eq!(octant, Octant::root(2).unwrap());
        assert!(octant.is_new_coarsened());
        assert!(!octant.is_new_refined());
    }

    #[test]
    fn test_markers_are_clamped() {
        let mut tree = LocalTree::new(3).unwrap();
        let root = tree.ids()[0];

        tree.set_marker(root, -1).unwrap();
        assert_eq!(tree.marker(root).unwrap(), 0);
        tree.set_marker(root, 100).unwrap();
        assert_eq!(tree.marker(root).unwrap(), MAX_LEVEL as i8);

        assert!(matches!(
            tree.set_marker(42, 1),
            Err(OctreeError::UnknownOctant(42))
        ));
        assert!(matches!(tree.marker(42), Err(OctreeError::UnknownOctant(42))));
        assert!(matches!(LocalTree::new(1), Err(OctreeError::InvalidDimension(1))));
    }

    #[test]
    fn test_refinement_is_balanced_2d() {
        let mut tree = LocalTree::new(2).unwrap();
        tree.global_refine().unwrap();
        tree.global_refine().unwrap();
        assert_eq!(tree.len(), 16);

        // Push the lower left corner three levels deeper.
        let corner = tree.locate_logical_point([0, 0, 0]).unwrap();
        tree.set_marker(corner, 3).unwrap();
        let changelog = tree.adapt_all(&[]).unwrap();

        assert!(count_kind(&changelog, AdaptionKind::Refinement) > 1 + 4 + 16);
        assert!(tree.is_balanced(&[]));
        assert_face_balanced(&tree);
        let deepest = tree.octants().iter().map(Octant::level).max().unwrap();
        assert_eq!(deepest, 5);
        assert!(tree.iter().all(|(_, octant)| octant.marker() == 0));
    }

    #[test]
    fn test_balance_cancels_coarsening() {
        let quarter = LOGICAL_LENGTH / 4;
        let half = LOGICAL_LENGTH / 2;

        let mut tree = LocalTree::new(2).unwrap();
        tree.global_refine().unwrap();
        tree.global_refine().unwrap();
        let inner = tree.locate_logical_point([quarter, quarter, 0]).unwrap();
        tree.set_marker(inner, 1).unwrap();
        tree.adapt(&[]).unwrap();
        assert_eq!(tree.len(), 19);

        // Coarsening the lower right quadrant would put a level 1 octant next to level 3.
        for id in tree.ids() {
            let [x, y, _] = tree.octant(id).unwrap().logical_coordinates();
            if x >= half && y < half {
                tree.set_marker(id, -1).unwrap();
            }
        }
        let changelog = tree.adapt(&[]).unwrap();
        assert!(changelog.is_empty());
        assert_eq!(tree.len(), 19);
        assert_face_balanced(&tree);

        // Partial families keep their level, complete ones coarsen.
        tree.mark_all(-1);
        let changelog = tree.adapt(&[]).unwrap();
        assert_eq!(count_kind(&changelog, AdaptionKind::Coarsening), 4);
        assert_eq!(tree.len(), 7);
        assert_face_balanced(&tree);
    }

    #[test]
    fn test_disabled_balance() {
        let mut tree = LocalTree::new(2).unwrap();
        tree.global_refine().unwrap();
        for id in tree.ids() {
            tree.set_balance(id, false).unwrap();
        }
        let corner = tree.ids()[0];
        tree.set_marker(corner, 2).unwrap();
        tree.adapt_all(&[]).unwrap();

        // Only the corner was refined, next to unrefined level 1 octants.
        assert_eq!(tree.len(), 3 + 16);
        assert!(tree.octants().iter().all(|octant| !octant.balance()));
        assert!(tree.is_balanced(&[]));
    }

    #[test]
    fn test_edits_reach_attached_storages() {
        let mut tree = LocalTree::new(2).unwrap();
        tree.global_refine().unwrap();
        let storage = tree.attach_storage::<f64>(SyncMode::Journaled).unwrap();
        for (value, id) in tree.ids().into_iter().enumerate() {
            storage.borrow_mut().set(id, value as f64).unwrap();
        }

        let ids = tree.ids();
        tree.set_marker(ids[1], 1).unwrap();
        tree.adapt(&[]).unwrap();
        assert!(matches!(
            tree.kernel().journal().last(),
            Some(SyncAction::Reorder { .. })
        ));
        assert!(!storage.borrow().is_synced());

        tree.sync_storages();
        assert_eq!(tree.kernel().raw_len(), tree.octants().len());
        let storage = storage.borrow();
        assert_eq!(storage.raw_values().len(), 7);
        assert_eq!(*storage.at(ids[0]).unwrap(), 0.0);
        assert_eq!(*storage.at(ids[2]).unwrap(), 2.0);
        assert_eq!(*storage.at(ids[3]).unwrap(), 3.0);
        assert!(matches!(storage.at(ids[1]), Err(PiercedError::NotFound(_))));
        for id in tree.ids().into_iter().skip(1).take(4) {
            assert_eq!(*storage.at(id).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_kernel_view_matches_octants() {
        let mut tree = LocalTree::new(3).unwrap();
        tree.global_refine().unwrap();
        let levels = tree.attach_storage::<u8>(SyncMode::Concurrent).unwrap();
        {
            let kernel = tree.kernel();
            assert_eq!(kernel.len(), tree.len());
            assert_eq!(kernel.raw_len(), tree.octants().len());
            assert_eq!(kernel.ids().collect_vec(), tree.ids());
        }

        tree.global_refine().unwrap();
        assert_eq!(tree.kernel().raw_len(), 64);
        assert_eq!(tree.kernel().hole_count(), 0);
        assert_eq!(levels.borrow().raw_values().len(), 64);
    }

    #[test]
    fn test_locate_logical_point() {
        let mut tree = LocalTree::new(3).unwrap();
        tree.global_refine().unwrap();
        let half = LOGICAL_LENGTH / 2;

        let id = tree.locate_logical_point([half, 0, half + 7]).unwrap();
        assert_eq!(tree.octant(id).unwrap().logical_coordinates(), [half, 0, half]);
        assert_eq!(tree.index_of(id), Some(5));
        assert_eq!(tree.locate_logical_point([LOGICAL_LENGTH, 0, 0]), None);
        assert_eq!(LocalTree::empty(3).unwrap().locate_logical_point([0, 0, 0]), None);
    }

    #[test]
    fn test_dump_and_restore() {
        let mut tree = LocalTree::new(3).unwrap();
        tree.set_balance_codim(3).unwrap();
        tree.global_refine().unwrap();
        let ids = tree.ids();
        tree.set_marker(ids[3], 1).unwrap();
        tree.adapt(&[]).unwrap();

        let mut buffer = Vec::new();
        tree.dump(&mut buffer).unwrap();
        let restored = LocalTree::restore(&mut buffer.as_slice()).unwrap();
        assert_eq!(restored.dim(), 3);
        assert_eq!(restored.balance_codim(), 3);
        assert_eq!(restored.ids(), tree.ids());
        assert_eq!(restored.octants(), tree.octants());

        // Fresh ids do not collide with restored ones.
        let mut restored = restored;
        restored.global_refine().unwrap();
        assert_eq!(restored.ids().into_iter().unique().count(), restored.len());

        // Swap the first two records.
        let record = 8 + Octant::BINARY_SIZE;
        let mut swapped = buffer.clone();
        swapped[10..10 + 2 * record].rotate_left(record);
        assert!(matches!(
            LocalTree::restore(&mut swapped.as_slice()),
            Err(OctreeError::InvalidStream(_))
        ));
        assert!(matches!(
            LocalTree::restore(&mut &buffer[..buffer.len() - 1]),
            Err(OctreeError::Io(_))
        ));
    }

    #[test]
    fn test_from_octants() {
        let children = Octant::root(2).unwrap().build_children().unwrap();
        let reversed = children.iter().rev().copied().collect_vec();
        let tree = LocalTree::from_octants(2, reversed).unwrap();
        assert_eq!(tree.octants(), children);
        assert_eq!(tree.first_descendant_key(), Some(0));
        assert_eq!(
            tree.last_descendant_key(),
            Some(children[3].last_descendant_key())
        );

        let mut overlapping = children.clone();
        overlapping.push(Octant::root(2).unwrap());
        assert!(matches!(
            LocalTree::from_octants(2, overlapping),
            Err(OctreeError::InvalidConfig(_))
        ));
        assert!(LocalTree::from_octants(3, children).is_err());
    }
}
