//! PCI slot allocator.
//!
//! Devices that sit directly on the root PCI bus need a unique slot. This module
//! tracks which slots are in use for a single assembly run. It provides:
//! 1. **Explicit placement:** Honors a caller-supplied address such as `3`, `0x1e`, or `pcie.0/5`.
//! 2. **Automatic placement:** Searches from the top of the bus downward, leaving the
//!    low slots to the devices the hypervisor creates implicitly.
//! 3. **Collision policy:** Strict (error) or legacy (silently reassign) handling of
//!    explicit requests for an occupied slot.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::AllocationError;

/// Number of slots on the bus.
pub const SLOT_COUNT: usize = 31;

/// Slots `0..=RESERVED_SLOTS` are never handed out automatically.
pub const RESERVED_SLOTS: usize = 3;

/// Highest slot the automatic search starts from.
const FIRST_AUTO: usize = SLOT_COUNT - 1;

/// Lowest slot the automatic search may return.
const LAST_AUTO: usize = RESERVED_SLOTS + 1;

/// What happens when an explicit address names a slot that is already taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail with `AllocationError::Collision`.
    #[default]
    Strict,
    /// Fall through to automatic search and place the device elsewhere.
    Legacy,
}

/// Slot occupancy of one root PCI bus.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PciBus {
    slots: [bool; SLOT_COUNT],
    policy: CollisionPolicy,
}

impl PciBus {
    /// Creates an empty bus with the given collision policy.
    pub const fn new(policy: CollisionPolicy) -> Self {
        Self {
            slots: [false; SLOT_COUNT],
            policy,
        }
    }

    /// Collision policy in force.
    pub const fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Returns whether `slot` is occupied; out-of-range slots report `false`.
    pub fn is_used(&self, slot: usize) -> bool {
        self.slots.get(slot).copied().unwrap_or(false)
    }

    /// Occupied slots in ascending order.
    pub fn used_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, used)| used.then_some(slot))
            .collect()
    }

    /// Marks a slot as occupied.
    ///
    /// # Arguments
    ///
    /// * `slot` - Slot number, `0..SLOT_COUNT`.
    ///
    /// # Returns
    ///
    /// `OutOfRange` past the end of the bus, `Collision` if the slot is already used.
    pub fn set_slot(&mut self, slot: usize) -> Result<(), AllocationError> {
        let Some(entry) = self.slots.get_mut(slot) else {
            return Err(AllocationError::OutOfRange { slot });
        };
        if *entry {
            return Err(AllocationError::Collision { slot });
        }
        *entry = true;
        debug!(slot = format_args!("0x{slot:02x}"), "allocated PCI slot");
        Ok(())
    }

    /// Records the slot of a device that carries its own address.
    ///
    /// Functions of one multifunction slot share it, so a slot that is already
    /// claimed is accepted as is.
    ///
    /// # Returns
    ///
    /// `OutOfRange` past the end of the bus.
    pub fn claim(&mut self, slot: usize) -> Result<(), AllocationError> {
        if self.is_used(slot) {
            return Ok(());
        }
        self.set_slot(slot)
    }

    /// Allocates a slot for a device.
    ///
    /// An explicit address that parses to a free slot in `1..SLOT_COUNT` is used as is.
    /// An empty, unparsable, or out-of-range address falls back to automatic search.
    /// An occupied explicit slot is a collision under the strict policy and falls back
    /// to automatic search under the legacy policy.
    ///
    /// # Arguments
    ///
    /// * `explicit` - Caller-supplied address; may be empty.
    ///
    /// # Returns
    ///
    /// The allocated slot, or an error on collision or exhaustion.
    pub fn allocate(&mut self, explicit: &str) -> Result<usize, AllocationError> {
        if !explicit.is_empty() {
            match parse_bus_addr(explicit) {
                Some(slot) if (1..SLOT_COUNT).contains(&slot) => {
                    if !self.slots[slot] {
                        self.set_slot(slot)?;
                        return Ok(slot);
                    }
                    match self.policy {
                        CollisionPolicy::Strict => {
                            return Err(AllocationError::Collision { slot });
                        }
                        CollisionPolicy::Legacy => {
                            warn!(
                                slot = format_args!("0x{slot:02x}"),
                                "requested PCI slot is taken, reassigning"
                            );
                        }
                    }
                }
                _ => warn!(address = explicit, "ignoring unusable PCI address"),
            }
        }
        self.allocate_auto()
    }

    /// Takes the highest free slot above the reserved range.
    pub fn allocate_auto(&mut self) -> Result<usize, AllocationError> {
        let slot = (LAST_AUTO..=FIRST_AUTO)
            .rev()
            .find(|&slot| !self.slots[slot])
            .ok_or(AllocationError::Exhausted {
                first: LAST_AUTO,
                last: FIRST_AUTO,
            })?;
        self.set_slot(slot)?;
        Ok(slot)
    }
}

/// Parses a bus address string into a slot number.
///
/// Accepts plain decimal (`"5"`), hexadecimal with a `0x` prefix (`"0x1e"`), and either
/// form behind a bus path (`"pcie.0/5"`).
pub fn parse_bus_addr(addr: &str) -> Option<usize> {
    let addr = addr.rsplit('/').next().unwrap_or(addr).trim();
    if let Some(hex) = addr.strip_prefix("0x").or_else(|| addr.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        addr.parse().ok()
    }
}

/// Parses the slot of a `slot.function` address such as `0x5.0x1`.
///
/// Plain slot addresses and bus paths are accepted as by [`parse_bus_addr`].
pub fn parse_slot_function(addr: &str) -> Option<usize> {
    let addr = addr.rsplit('/').next().unwrap_or(addr);
    parse_bus_addr(addr.split('.').next().unwrap_or(addr))
}
