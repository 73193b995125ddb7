//! Bus and index bookkeeping for one assembly run.
//!
//! This module provides:
//! 1. **PCI bus:** `PciBus`, the slot allocator for devices on the root bus.
//! 2. **Registry:** `IdentifierRegistry`, per-category automatic numbering.
//!
//! Both are created fresh for every run and never shared between runs.

/// Per-category index registry.
pub mod index;
/// Root PCI bus slot allocator.
pub mod pci;

pub use index::{BOOT_INDEX, DRIVE_INDEX, IdentifierRegistry, NET_INDEX};
pub use pci::{
    CollisionPolicy, PciBus, RESERVED_SLOTS, SLOT_COUNT, parse_bus_addr, parse_slot_function,
};
