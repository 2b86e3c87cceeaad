//! The explicit filesystem handle.
//!
//! `FsState` bundles everything the original system kept in process-wide
//! variables: the id-keyed object index, the registered-area table, the
//! scratch-area index, the root-directory pointer, the next-id counter, and
//! the object pools. The mount path constructs one, populates it, and hands
//! it to the caller only after validation; clients never observe a partial
//! state.

use crate::area::Area;
use crate::{Block, Inode, Object};
use ember_alloc::ObjectPools;
use ember_error::{EmberError, Result};
use ember_types::{AreaIdx, ObjectId, SeqNum};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

#[derive(Debug)]
pub struct FsState {
    objects: BTreeMap<ObjectId, Object>,
    areas: Vec<Area>,
    scratch_idx: Option<AreaIdx>,
    root_id: Option<ObjectId>,
    next_id: ObjectId,
    pools: ObjectPools,
    /// Largest permissible block payload; fixed after validation from the
    /// smallest registered area.
    max_block_data_len: u16,
}

impl FsState {
    #[must_use]
    pub fn new(pools: ObjectPools) -> Self {
        Self {
            objects: BTreeMap::new(),
            areas: Vec::new(),
            scratch_idx: None,
            root_id: None,
            next_id: ObjectId(0),
            pools,
            max_block_data_len: 0,
        }
    }

    /// Return to the pre-mount empty condition, keeping pool capacities.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.areas.clear();
        self.scratch_idx = None;
        self.root_id = None;
        self.next_id = ObjectId(0);
        self.pools.reset();
        self.max_block_data_len = 0;
    }

    // ── Object index ────────────────────────────────────────────────────

    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Ids of every indexed object. A snapshot, so callers may remove
    /// objects while walking it.
    #[must_use]
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    /// Look up an inode by id. A block under the same id is an id-space
    /// collision and reported as corruption, not a miss.
    pub fn find_inode(&self, id: ObjectId) -> Result<&Inode> {
        match self.objects.get(&id) {
            Some(Object::Inode(inode)) => Ok(inode),
            Some(Object::Block(_)) => Err(EmberError::corrupt(format!(
                "object {id} is a block where an inode was expected"
            ))),
            None => Err(EmberError::NotFound(id.0)),
        }
    }

    pub fn find_inode_mut(&mut self, id: ObjectId) -> Result<&mut Inode> {
        match self.objects.get_mut(&id) {
            Some(Object::Inode(inode)) => Ok(inode),
            Some(Object::Block(_)) => Err(EmberError::corrupt(format!(
                "object {id} is a block where an inode was expected"
            ))),
            None => Err(EmberError::NotFound(id.0)),
        }
    }

    pub fn find_block(&self, id: ObjectId) -> Result<&Block> {
        match self.objects.get(&id) {
            Some(Object::Block(block)) => Ok(block),
            Some(Object::Inode(_)) => Err(EmberError::corrupt(format!(
                "object {id} is an inode where a block was expected"
            ))),
            None => Err(EmberError::NotFound(id.0)),
        }
    }

    pub fn find_block_mut(&mut self, id: ObjectId) -> Result<&mut Block> {
        match self.objects.get_mut(&id) {
            Some(Object::Block(block)) => Ok(block),
            Some(Object::Inode(_)) => Err(EmberError::corrupt(format!(
                "object {id} is an inode where a block was expected"
            ))),
            None => Err(EmberError::NotFound(id.0)),
        }
    }

    /// Index a fresh inode, charging the inode pool.
    pub fn insert_inode(&mut self, inode: Inode) -> Result<()> {
        if self.objects.contains_key(&inode.id) {
            return Err(EmberError::corrupt(format!(
                "duplicate insert for object {}",
                inode.id
            )));
        }
        self.pools.inodes.take()?;
        self.objects.insert(inode.id, Object::Inode(inode));
        Ok(())
    }

    /// Index a fresh block, charging the block pool.
    pub fn insert_block(&mut self, block: Block) -> Result<()> {
        if self.objects.contains_key(&block.id) {
            return Err(EmberError::corrupt(format!(
                "duplicate insert for object {}",
                block.id
            )));
        }
        self.pools.blocks.take()?;
        self.objects.insert(block.id, Object::Block(block));
        Ok(())
    }

    /// Drop an inode from RAM: detach it from its parent's child list,
    /// remove it from the index, and return its pool charge. Children of the
    /// removed inode keep their (now dangling) parent id.
    pub fn delete_inode(&mut self, id: ObjectId) -> Result<()> {
        let parent = self.find_inode(id)?.parent;
        if let Some(parent_id) = parent
            && let Ok(parent) = self.find_inode_mut(parent_id)
        {
            parent.children.retain(|child| *child != id);
        }

        self.objects.remove(&id);
        self.pools.inodes.put();
        if self.root_id == Some(id) {
            self.root_id = None;
        }
        trace!(target: "ember::obj", id = id.0, "inode removed from ram");
        Ok(())
    }

    /// Drop a block from RAM: detach it from its owner's block list, remove
    /// it from the index, and return its pool charge.
    pub fn delete_block(&mut self, id: ObjectId) -> Result<()> {
        let owner = self.find_block(id)?.owner;
        if let Some(owner_id) = owner
            && let Ok(owner) = self.find_inode_mut(owner_id)
        {
            owner.blocks.retain(|block| *block != id);
        }

        self.objects.remove(&id);
        self.pools.blocks.put();
        trace!(target: "ember::obj", id = id.0, "block removed from ram");
        Ok(())
    }

    // ── Graph edges ─────────────────────────────────────────────────────

    /// Append `child_id` to `parent_id`'s child list and point the child
    /// back at the parent. Both inodes must be indexed.
    pub fn add_child(&mut self, parent_id: ObjectId, child_id: ObjectId) -> Result<()> {
        self.find_inode_mut(parent_id)?.children.push(child_id);
        self.find_inode_mut(child_id)?.parent = Some(parent_id);
        Ok(())
    }

    /// Detach `child_id` from its current parent, if any.
    pub fn remove_child(&mut self, child_id: ObjectId) -> Result<()> {
        let Some(parent_id) = self.find_inode(child_id)?.parent else {
            return Ok(());
        };
        if let Ok(parent) = self.find_inode_mut(parent_id) {
            parent.children.retain(|child| *child != child_id);
        }
        self.find_inode_mut(child_id)?.parent = None;
        Ok(())
    }

    /// Append `block_id` to its owner's block list.
    pub fn link_block(&mut self, owner_id: ObjectId, block_id: ObjectId) -> Result<()> {
        self.find_inode_mut(owner_id)?.blocks.push(block_id);
        Ok(())
    }

    // ── Areas ───────────────────────────────────────────────────────────

    /// Append an area to the table, assigning the next free index.
    pub fn push_area(&mut self, area: Area) -> Result<AreaIdx> {
        let idx = u16::try_from(self.areas.len())
            .map_err(|_| EmberError::Invalid("area table overflow"))?;
        self.areas.push(area);
        Ok(AreaIdx(idx))
    }

    pub fn area(&self, idx: AreaIdx) -> Result<&Area> {
        self.areas
            .get(usize::from(idx.0))
            .ok_or(EmberError::Invalid("area index out of range"))
    }

    pub fn area_mut(&mut self, idx: AreaIdx) -> Result<&mut Area> {
        self.areas
            .get_mut(usize::from(idx.0))
            .ok_or(EmberError::Invalid("area index out of range"))
    }

    #[must_use]
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    #[must_use]
    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    #[must_use]
    pub fn scratch_idx(&self) -> Option<AreaIdx> {
        self.scratch_idx
    }

    pub fn set_scratch_idx(&mut self, idx: Option<AreaIdx>) {
        self.scratch_idx = idx;
    }

    /// Flag every object whose latest record lives in `area` as suspect.
    /// Returns the number of objects flagged.
    pub fn flag_area_content_dummy(&mut self, area: AreaIdx) -> usize {
        let mut flagged = 0_usize;
        for object in self.objects.values_mut() {
            if object.loc().is_some_and(|loc| loc.area == area) {
                object.mark_dummy();
                flagged += 1;
            }
        }
        flagged
    }

    // ── Root, ids, limits ───────────────────────────────────────────────

    #[must_use]
    pub fn root_id(&self) -> Option<ObjectId> {
        self.root_id
    }

    pub fn set_root_id(&mut self, id: Option<ObjectId>) {
        self.root_id = id;
    }

    pub fn root(&self) -> Result<&Inode> {
        let id = self
            .root_id
            .ok_or_else(|| EmberError::corrupt("no root directory"))?;
        self.find_inode(id)
    }

    #[must_use]
    pub fn next_id(&self) -> ObjectId {
        self.next_id
    }

    /// Keep the id allocator ahead of every id seen on flash.
    pub fn observe_id(&mut self, id: ObjectId) {
        if id.successor() > self.next_id {
            self.next_id = id.successor();
        }
    }

    #[must_use]
    pub fn pools(&self) -> &ObjectPools {
        &self.pools
    }

    #[must_use]
    pub fn max_block_data_len(&self) -> u16 {
        self.max_block_data_len
    }

    pub fn set_max_block_data_len(&mut self, len: u16) {
        self.max_block_data_len = len;
    }

    /// Canonical content view for comparing two restored states. Area
    /// indices and record offsets are deliberately excluded: they depend on
    /// the order areas were supplied, while the graph itself must not.
    #[must_use]
    pub fn graph_summary(&self) -> GraphSummary {
        let objects = self
            .objects
            .iter()
            .map(|(id, object)| {
                let summary = match object {
                    Object::Inode(inode) => ObjectSummary::Inode {
                        seq: inode.seq,
                        parent: inode.parent,
                        children: inode.children.iter().copied().collect(),
                        blocks: inode.blocks.iter().copied().collect(),
                        name: inode.name.clone(),
                        directory: inode.is_directory(),
                    },
                    Object::Block(block) => ObjectSummary::Block {
                        seq: block.seq,
                        owner: block.owner,
                        data_len: block.data_len,
                    },
                };
                (*id, summary)
            })
            .collect();

        GraphSummary {
            root: self.root_id,
            next_id: self.next_id,
            objects,
        }
    }
}

/// Content summary of one object, location-free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectSummary {
    Inode {
        seq: SeqNum,
        parent: Option<ObjectId>,
        children: BTreeSet<ObjectId>,
        blocks: BTreeSet<ObjectId>,
        name: String,
        directory: bool,
    },
    Block {
        seq: SeqNum,
        owner: Option<ObjectId>,
        data_len: u16,
    },
}

/// Location-free view of a restored graph, suitable for equality checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub root: Option<ObjectId>,
    pub next_id: ObjectId,
    pub objects: BTreeMap<ObjectId, ObjectSummary>,
}
