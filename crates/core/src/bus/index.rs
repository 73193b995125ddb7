//! Per-category auto-numbering.
//!
//! Resources without an explicit number (boot order, drive index, NIC index) are
//! numbered from a per-category set of used indices. Explicit numbers are recorded
//! first so the automatic ones never collide with them.

use std::collections::{BTreeSet, HashMap};

use crate::common::AllocationError;

/// Category used for `bootindex=` values.
pub const BOOT_INDEX: &str = "bootindex";

/// Category used for drive numbering.
pub const DRIVE_INDEX: &str = "drive";

/// Category used for network interface numbering.
pub const NET_INDEX: &str = "net";

/// Used indices, keyed by category name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentifierRegistry {
    used: HashMap<String, BTreeSet<u32>>,
}

impl IdentifierRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next index of `category` and marks it used.
    ///
    /// Returns `0` for a fresh category, otherwise one past the largest used index.
    /// Gaps below the maximum are never filled, so a returned index is never reused.
    pub fn next(&mut self, category: &str) -> Result<u32, AllocationError> {
        if category.is_empty() {
            return Err(AllocationError::EmptyCategory);
        }
        let set = self.used.entry(category.to_string()).or_default();
        let next = set.last().map_or(0, |max| max + 1);
        let _ = set.insert(next);
        Ok(next)
    }

    /// Records an explicitly chosen index.
    ///
    /// # Returns
    ///
    /// `IndexTaken` if the index was already used in this category.
    pub fn set(&mut self, category: &str, index: u32) -> Result<(), AllocationError> {
        if category.is_empty() {
            return Err(AllocationError::EmptyCategory);
        }
        if self.used.entry(category.to_string()).or_default().insert(index) {
            Ok(())
        } else {
            Err(AllocationError::IndexTaken {
                category: category.to_string(),
                index,
            })
        }
    }

    /// Returns whether `index` is used in `category`.
    pub fn contains(&self, category: &str, index: u32) -> bool {
        self.used
            .get(category)
            .is_some_and(|set| set.contains(&index))
    }

    /// Next free boot index.
    pub fn next_boot_index(&mut self) -> Result<u32, AllocationError> {
        self.next(BOOT_INDEX)
    }

    /// Reserves an explicit boot index.
    pub fn set_boot_index(&mut self, index: u32) -> Result<(), AllocationError> {
        self.set(BOOT_INDEX, index)
    }

    /// Next free drive index.
    pub fn next_drive_index(&mut self) -> Result<u32, AllocationError> {
        self.next(DRIVE_INDEX)
    }

    /// Reserves an explicit drive index.
    pub fn set_drive_index(&mut self, index: u32) -> Result<(), AllocationError> {
        self.set(DRIVE_INDEX, index)
    }

    /// Next free network interface index.
    pub fn next_net_index(&mut self) -> Result<u32, AllocationError> {
        self.next(NET_INDEX)
    }

    /// Reserves an explicit network interface index.
    pub fn set_net_index(&mut self, index: u32) -> Result<(), AllocationError> {
        self.set(NET_INDEX, index)
    }
}
