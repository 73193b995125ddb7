//! Device contract shared by every configurable device.
//!
//! This module defines the two-phase interface the assembler drives. It provides:
//! 1. **`Device` trait:** Side-effect-free validation plus rendering against a build context.
//! 2. **`DeviceContext`:** The per-device view of the run's bus, registry, and descriptor table,
//!    with the device's transport already resolved.
//! 3. **Validation helpers:** Small checks reused by several device kinds.

use std::fmt;

use crate::builder::BuildContext;
use crate::bus::parse_slot_function;
use crate::common::{AllocationError, HostArch, ValidationError};
use crate::config::{Knobs, defaults};
use crate::transport::Transport;

/// Keyword that asks the registry to pick the next free boot index.
pub const AUTO_BOOT_INDEX: &str = "auto";

/// Trait for a device that contributes tokens to the command line.
pub trait Device: fmt::Debug {
    /// Static label used in validation errors (for example `"BlockDevice"`).
    fn kind(&self) -> &'static str;

    /// Caller-supplied identifier, if this kind has one and it is set.
    fn id(&self) -> Option<&str>;

    /// Checks the device's own fields. Must not touch any shared state.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Explicit transport choice; `None` lets the resolver decide.
    fn transport_override(&self) -> Option<Transport> {
        None
    }

    /// Configured boot index (`"auto"` or a non-negative integer).
    fn boot_index(&self) -> Option<&str> {
        None
    }

    /// Emits this device's tokens.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Per-device build context with the resolved transport.
    ///
    /// # Returns
    ///
    /// The ordered tokens, or an allocation error that aborts the run.
    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError>;
}

/// What a device sees of the run while rendering.
#[derive(Debug)]
pub struct DeviceContext<'a> {
    build: &'a mut BuildContext,
    knobs: &'a Knobs,
    transport: Transport,
}

impl<'a> DeviceContext<'a> {
    /// Creates a context for one device.
    ///
    /// # Arguments
    ///
    /// * `build` - The run's shared state.
    /// * `knobs` - Global boolean settings of the configuration.
    /// * `transport` - Transport resolved for this device during normalization.
    pub const fn new(build: &'a mut BuildContext, knobs: &'a Knobs, transport: Transport) -> Self {
        Self {
            build,
            knobs,
            transport,
        }
    }

    /// Resolved transport of the device being rendered.
    pub const fn transport(&self) -> Transport {
        self.transport
    }

    /// Host architecture of the run.
    pub const fn arch(&self) -> HostArch {
        self.build.arch()
    }

    /// Global boolean settings.
    pub const fn knobs(&self) -> &Knobs {
        self.knobs
    }

    /// `iommu_platform=on` for channel I/O devices when the platform IOMMU is enabled.
    pub const fn iommu_platform(&self) -> Option<&'static str> {
        if self.transport.is_ccw() && self.knobs.iommu_platform {
            Some("iommu_platform=on")
        } else {
            None
        }
    }

    /// Allocates a root bus slot, honoring `explicit` when possible.
    pub fn allocate_slot(&mut self, explicit: &str) -> Result<usize, AllocationError> {
        self.build.bus_mut().allocate(explicit)
    }

    /// Records the explicit address of a device that plugs into the root bus.
    ///
    /// Only devices on the root bus (`bus` empty, `pcie.0`, or `pci.0`) claim a slot;
    /// functions of one multifunction slot share it. An address that names no slot
    /// claims nothing.
    pub fn claim_root_slot(&mut self, bus: &str, addr: &str) -> Result<(), AllocationError> {
        let on_root = bus.is_empty() || bus == defaults::PCIE_BUS || bus == defaults::PCI_BUS;
        match parse_slot_function(addr) {
            Some(slot) if on_root => self.build.bus_mut().claim(slot),
            _ => Ok(()),
        }
    }

    /// Resolves a configured boot index into the value to render.
    ///
    /// Explicit indices were reserved during normalization and are rendered as given;
    /// `"auto"` takes the next free index from the registry.
    pub fn resolve_boot_index(
        &mut self,
        configured: Option<&str>,
    ) -> Result<Option<String>, AllocationError> {
        match configured {
            None | Some("") => Ok(None),
            Some(AUTO_BOOT_INDEX) => {
                let index = self.build.registry_mut().next_boot_index()?;
                Ok(Some(index.to_string()))
            }
            Some(explicit) => Ok(Some(explicit.to_string())),
        }
    }

    /// Registers host descriptors the child must inherit.
    ///
    /// # Returns
    ///
    /// The descriptor numbers the child process will see, in the same order.
    pub fn append_fds(&mut self, fds: &[i32]) -> Vec<u32> {
        self.build.append_fds(fds)
    }
}

/// Fails with `Missing` when `value` is empty.
pub fn require(kind: &'static str, field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::Missing { kind, field })
    } else {
        Ok(())
    }
}

/// Accepts an empty value or one of `allowed`.
pub fn one_of(
    kind: &'static str,
    field: &'static str,
    value: &str,
    allowed: &[&str],
    expected: &'static str,
) -> Result<(), ValidationError> {
    if value.is_empty() || allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            kind,
            field,
            value: value.to_string(),
            expected,
        })
    }
}

/// Accepts an empty value, `on`, or `off`.
pub fn on_off(kind: &'static str, field: &'static str, value: &str) -> Result<(), ValidationError> {
    one_of(kind, field, value, &["on", "off"], "'on' or 'off'")
}

/// Renders `key=value` when `value` is a non-empty on/off switch.
pub fn on_off_param(key: &str, value: &str) -> Option<String> {
    (!value.is_empty()).then(|| format!("{key}={value}"))
}

/// Accepts an unset boot index, `"auto"`, or a non-negative integer.
pub fn check_boot_index(kind: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        None | Some("" | AUTO_BOOT_INDEX) => Ok(()),
        Some(explicit) if explicit.parse::<u32>().is_ok() => Ok(()),
        Some(other) => Err(ValidationError::InvalidValue {
            kind,
            field: "bootindex",
            value: other.to_string(),
            expected: "'auto' or a non-negative integer",
        }),
    }
}

/// Returns `value`, or `default` when `value` is empty.
pub fn or_default<'s>(value: &'s str, default: &'s str) -> &'s str {
    if value.is_empty() { default } else { value }
}

/// Wraps a joined parameter list behind its flag.
pub fn flag(name: &str, params: &[String]) -> [String; 2] {
    [name.to_string(), params.join(",")]
}
