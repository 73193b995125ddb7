//! Per-run assembly state.
//!
//! A `BuildContext` bundles everything that is mutated while one configuration is
//! assembled: the root bus, the index registry, and the table of host descriptors
//! the child process will inherit. A context is created for exactly one run.

use tracing::debug;

use crate::bus::{CollisionPolicy, IdentifierRegistry, PciBus};
use crate::common::HostArch;
use crate::transport::TransportResolver;

/// Descriptor number the child sees for the first inherited host descriptor.
pub const FIRST_CHILD_FD: u32 = 3;

/// Mutable state of one assembly run.
#[derive(Debug)]
pub struct BuildContext {
    arch: HostArch,
    resolver: TransportResolver,
    bus: PciBus,
    registry: IdentifierRegistry,
    fds: Vec<i32>,
}

impl BuildContext {
    /// Creates fresh state for one run.
    ///
    /// # Arguments
    ///
    /// * `arch` - Host architecture the invocation targets.
    /// * `policy` - Collision policy for explicit bus addresses.
    /// * `machine_type` - Configured machine type, used for transport defaults.
    pub fn new(arch: HostArch, policy: CollisionPolicy, machine_type: &str) -> Self {
        Self {
            arch,
            resolver: TransportResolver::new(arch, machine_type),
            bus: PciBus::new(policy),
            registry: IdentifierRegistry::new(),
            fds: Vec::new(),
        }
    }

    /// Host architecture of the run.
    pub const fn arch(&self) -> HostArch {
        self.arch
    }

    /// Transport resolver for this host and machine type.
    pub const fn resolver(&self) -> &TransportResolver {
        &self.resolver
    }

    /// Root bus occupancy.
    pub const fn bus(&self) -> &PciBus {
        &self.bus
    }

    /// Mutable root bus.
    pub const fn bus_mut(&mut self) -> &mut PciBus {
        &mut self.bus
    }

    /// Index registry.
    pub const fn registry(&self) -> &IdentifierRegistry {
        &self.registry
    }

    /// Mutable index registry.
    pub const fn registry_mut(&mut self) -> &mut IdentifierRegistry {
        &mut self.registry
    }

    /// Appends host descriptors to the inheritance table.
    ///
    /// Entry `i` of the table becomes descriptor `3 + i` in the child, so the returned
    /// numbers continue from whatever was registered before.
    pub fn append_fds(&mut self, fds: &[i32]) -> Vec<u32> {
        let start = self.fds.len();
        self.fds.extend_from_slice(fds);
        let numbers: Vec<u32> = (start..self.fds.len())
            .map(|i| FIRST_CHILD_FD.saturating_add(u32::try_from(i).unwrap_or(u32::MAX)))
            .collect();
        debug!(?fds, child = ?numbers, "registered inherited descriptors");
        numbers
    }

    /// Host descriptors registered so far, in inheritance order.
    pub fn fds(&self) -> &[i32] {
        &self.fds
    }

    /// Consumes the context, returning the descriptor table.
    pub fn into_fds(self) -> Vec<i32> {
        self.fds
    }
}
