#![forbid(unsafe_code)]
//! In-RAM object graph for EmberFS.
//!
//! The mount path reconstructs every live filesystem object from the flash
//! log into the structures defined here: inodes and data blocks share a
//! common identity head (id, sequence number, record location) and live in a
//! single id-keyed index inside [`FsState`], the explicit filesystem handle.
//!
//! Parent and owner edges are stored as ids and resolved through the index
//! on demand. The tree edges (directory child lists, file block lists) are
//! id lists as well; nothing in the graph owns anything else, so removal
//! never traverses ownership cycles.

pub mod area;
pub mod state;

pub use area::{Area, AreaDesc};
pub use state::{FsState, GraphSummary, ObjectSummary};

use bitflags::bitflags;
use ember_ondisk::{DiskBlock, DiskInode, INODE_F_DELETED, INODE_F_DIRECTORY, INODE_F_ROOT};
use ember_types::{AreaIdx, ObjectId, SeqNum};
use serde::{Deserialize, Serialize};

// ── Flags ───────────────────────────────────────────────────────────────────

bitflags! {
    /// In-RAM inode flags. The low bits mirror the on-disk flags byte;
    /// `DUMMY` exists only in RAM and marks a placeholder whose defining
    /// record has not been seen.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InodeFlags: u8 {
        const DELETED = INODE_F_DELETED;
        const DIRECTORY = INODE_F_DIRECTORY;
        const ROOT = INODE_F_ROOT;
        const DUMMY = 0x80;
    }
}

bitflags! {
    /// In-RAM data block flags. `DUMMY` marks content made suspect by an
    /// interrupted garbage collection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u8 {
        const DELETED = 0x01;
        const DUMMY = 0x80;
    }
}

impl InodeFlags {
    /// Lift an on-disk flags byte into RAM flags. Unknown bits are kept for
    /// the layers above the mount path; the RAM-only `DUMMY` bit can never
    /// arrive from disk.
    #[must_use]
    pub fn from_disk(raw: u8) -> Self {
        Self::from_bits_retain(raw).difference(Self::DUMMY)
    }
}

// ── Record location ─────────────────────────────────────────────────────────

/// Where an object's latest record lives on flash. `None` on an object means
/// "nowhere yet": the object is a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjLoc {
    pub area: AreaIdx,
    /// Offset of the record within its area.
    pub offset: u32,
}

// ── Inode ───────────────────────────────────────────────────────────────────

/// In-RAM inode: a file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub id: ObjectId,
    pub seq: SeqNum,
    pub loc: Option<ObjLoc>,
    pub flags: InodeFlags,
    /// Open-handle count; always 1 during restore.
    pub refcnt: u16,
    pub parent: Option<ObjectId>,
    /// Child inodes, directories only. Encounter order; callers sort.
    pub children: Vec<ObjectId>,
    /// Data blocks, files only. Encounter order; callers sort.
    pub blocks: Vec<ObjectId>,
    pub name: String,
}

impl Inode {
    /// Build a fresh inode from its disk record.
    #[must_use]
    pub fn from_disk(disk: &DiskInode, loc: ObjLoc) -> Self {
        Self {
            id: disk.id,
            seq: disk.seq,
            loc: Some(loc),
            flags: InodeFlags::from_disk(disk.flags),
            refcnt: 1,
            parent: disk.parent_id,
            children: Vec::new(),
            blocks: Vec::new(),
            name: disk.filename.clone(),
        }
    }

    /// Replace this inode's identity fields from a disk record, keeping the
    /// child and block lists accumulated so far.
    ///
    /// Forward references depend on this: children attach to a placeholder
    /// before its defining record arrives, and the overwrite must not lose
    /// them.
    pub fn overwrite_from_disk(&mut self, disk: &DiskInode, loc: ObjLoc) {
        debug_assert_eq!(self.id, disk.id);
        self.seq = disk.seq;
        self.loc = Some(loc);
        self.flags = InodeFlags::from_disk(disk.flags);
        self.parent = disk.parent_id;
        self.name = disk.filename.clone();
    }

    /// Build a placeholder for an id that was referenced before being
    /// defined.
    #[must_use]
    pub fn new_dummy(id: ObjectId, is_dir: bool) -> Self {
        let mut flags = InodeFlags::DUMMY;
        if is_dir {
            flags |= InodeFlags::DIRECTORY;
        }
        Self {
            id,
            seq: SeqNum::ZERO,
            loc: None,
            flags,
            refcnt: 1,
            parent: None,
            children: Vec::new(),
            blocks: Vec::new(),
            name: String::new(),
        }
    }

    #[must_use]
    pub fn is_dummy(&self) -> bool {
        self.flags.contains(InodeFlags::DUMMY)
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(InodeFlags::DELETED)
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.flags.contains(InodeFlags::DIRECTORY)
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.flags.contains(InodeFlags::ROOT)
    }
}

// ── Block ───────────────────────────────────────────────────────────────────

/// In-RAM data block descriptor. The payload itself stays on flash; RAM
/// holds only the location and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub id: ObjectId,
    pub seq: SeqNum,
    pub loc: Option<ObjLoc>,
    pub flags: BlockFlags,
    pub owner: Option<ObjectId>,
    pub data_len: u16,
}

impl Block {
    #[must_use]
    pub fn from_disk(disk: &DiskBlock, loc: ObjLoc) -> Self {
        Self {
            id: disk.id,
            seq: disk.seq,
            loc: Some(loc),
            flags: BlockFlags::empty(),
            owner: Some(disk.inode_id),
            data_len: disk.data_len,
        }
    }

    /// Replace identity fields from a newer disk record. The owner link is
    /// untouched; the caller has already checked that the record names the
    /// same owner.
    pub fn overwrite_from_disk(&mut self, disk: &DiskBlock, loc: ObjLoc) {
        debug_assert_eq!(self.id, disk.id);
        self.seq = disk.seq;
        self.loc = Some(loc);
        self.flags = BlockFlags::empty();
        self.data_len = disk.data_len;
    }

    #[must_use]
    pub fn is_dummy(&self) -> bool {
        self.flags.contains(BlockFlags::DUMMY)
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(BlockFlags::DELETED)
    }
}

// ── Object ──────────────────────────────────────────────────────────────────

/// Any logged entity. The closed variant set replaces a type tag; there is
/// no "unknown type" arm to assert on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Inode(Inode),
    Block(Block),
}

impl Object {
    #[must_use]
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Inode(inode) => inode.id,
            Self::Block(block) => block.id,
        }
    }

    #[must_use]
    pub fn loc(&self) -> Option<ObjLoc> {
        match self {
            Self::Inode(inode) => inode.loc,
            Self::Block(block) => block.loc,
        }
    }

    /// Flag the object's content as suspect. Used when the area holding its
    /// record turns out to be the partial half of an interrupted GC swap.
    pub fn mark_dummy(&mut self) {
        match self {
            Self::Inode(inode) => inode.flags |= InodeFlags::DUMMY,
            Self::Block(block) => block.flags |= BlockFlags::DUMMY,
        }
    }

    #[must_use]
    pub fn as_inode(&self) -> Option<&Inode> {
        match self {
            Self::Inode(inode) => Some(inode),
            Self::Block(_) => None,
        }
    }

    #[must_use]
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Self::Inode(_) => None,
            Self::Block(block) => Some(block),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
