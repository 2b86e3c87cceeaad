#![forbid(unsafe_code)]
//! Capacity-bounded object pools.
//!
//! Devices running EmberFS size their RAM representation up front: the
//! number of in-RAM inode and block records is fixed at mount time. A `Pool`
//! tracks one such budget; exceeding it surfaces as a distinct out-of-memory
//! error so callers can tell resource exhaustion from corruption.
//!
//! Pools count charges; object storage itself lives in the object index.

use ember_error::{EmberError, Result};
use serde::Serialize;

/// One allocation budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pool {
    name: &'static str,
    capacity: usize,
    in_use: usize,
    high_water: usize,
}

impl Pool {
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            in_use: 0,
            high_water: 0,
        }
    }

    /// Charge one object against the budget.
    pub fn take(&mut self) -> Result<()> {
        if self.in_use >= self.capacity {
            return Err(EmberError::OutOfMemory { pool: self.name });
        }
        self.in_use += 1;
        self.high_water = self.high_water.max(self.in_use);
        Ok(())
    }

    /// Return one object to the budget.
    pub fn put(&mut self) {
        debug_assert!(self.in_use > 0, "pool {} freed more than it allocated", self.name);
        self.in_use = self.in_use.saturating_sub(1);
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.in_use)
    }

    /// Largest simultaneous charge observed over the pool's lifetime.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Drop all charges, keeping the high-water mark.
    pub fn reset(&mut self) {
        self.in_use = 0;
    }
}

/// The two pools the restore path draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectPools {
    pub inodes: Pool,
    pub blocks: Pool,
}

impl ObjectPools {
    #[must_use]
    pub fn new(inode_capacity: usize, block_capacity: usize) -> Self {
        Self {
            inodes: Pool::new("inode", inode_capacity),
            blocks: Pool::new("block", block_capacity),
        }
    }

    pub fn reset(&mut self) {
        self.inodes.reset();
        self.blocks.reset();
    }
}
