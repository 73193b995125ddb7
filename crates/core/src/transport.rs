//! Virtio transport resolution.
//!
//! A virtio device can be instantiated on one of three mutually exclusive bus
//! families. This module picks the family for each device. It provides:
//! 1. **Transport:** The `Transport` enum and the rendering predicates that follow from it.
//! 2. **Resolution:** `TransportResolver`, a pure function of the explicit override,
//!    the host architecture, and the machine type.
//!
//! The assembler resolves each device exactly once, during normalization, and
//! caches the answer on the device's build context.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{HostArch, MICROVM};

/// Bus family a virtio device is instantiated on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// PCI / PCI Express (`-pci` device names).
    Pci,
    /// IBM channel I/O (`-ccw` device names).
    Ccw,
    /// Memory-mapped virtio (`-device` device names).
    Mmio,
}

impl Transport {
    /// Returns `true` for the PCI transport.
    pub const fn is_pci(self) -> bool {
        matches!(self, Self::Pci)
    }

    /// Returns `true` for the channel I/O transport.
    pub const fn is_ccw(self) -> bool {
        matches!(self, Self::Ccw)
    }

    /// Device-name suffix for this transport.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Pci => "pci",
            Self::Ccw => "ccw",
            Self::Mmio => "device",
        }
    }

    /// Builds the transport-specific device name, e.g. `virtio-blk` -> `virtio-blk-pci`.
    pub fn device_name(self, base: &str) -> String {
        format!("{base}-{}", self.suffix())
    }

    /// Returns the `disable-modern` property, which only PCI devices understand.
    ///
    /// # Arguments
    ///
    /// * `disable` - Whether legacy-only (non-modern) virtio should be forced.
    ///
    /// # Returns
    ///
    /// `Some("disable-modern=true|false")` on PCI, `None` on CCW and MMIO.
    pub const fn disable_modern(self, disable: bool) -> Option<&'static str> {
        match (self, disable) {
            (Self::Pci, true) => Some("disable-modern=true"),
            (Self::Pci, false) => Some("disable-modern=false"),
            _ => None,
        }
    }

    /// Lowercase transport name as used in configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pci => "pci",
            Self::Ccw => "ccw",
            Self::Mmio => "mmio",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the transport for devices that do not name one explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResolver {
    arch: HostArch,
    machine_type: String,
}

impl TransportResolver {
    /// Creates a resolver for one host/machine combination.
    ///
    /// # Arguments
    ///
    /// * `arch` - Host architecture.
    /// * `machine_type` - Configured machine type (may be empty).
    pub fn new(arch: HostArch, machine_type: impl Into<String>) -> Self {
        Self {
            arch,
            machine_type: machine_type.into(),
        }
    }

    /// Default transport for this host and machine type.
    ///
    /// x86 hosts use PCI unless the machine is `microvm`, which only has MMIO;
    /// s390x always uses channel I/O; every other architecture uses PCI.
    pub fn default_transport(&self) -> Transport {
        match self.arch {
            HostArch::X86_64 | HostArch::X86 if self.machine_type == MICROVM => Transport::Mmio,
            HostArch::S390x => Transport::Ccw,
            _ => Transport::Pci,
        }
    }

    /// Resolves a device's transport; an explicit choice always wins.
    pub fn resolve(&self, explicit: Option<Transport>) -> Transport {
        explicit.unwrap_or_else(|| self.default_transport())
    }

    /// Host architecture this resolver was built for.
    pub const fn arch(&self) -> HostArch {
        self.arch
    }
}
