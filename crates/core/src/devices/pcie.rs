//! PCI Express root ports.
//!
//! Root ports are the hot-plug points of a q35-class machine. They carry their own
//! address (including the function number for multifunction slots). A port on the root
//! bus claims that slot so automatic placement skips it; sibling functions share it.

use serde::{Deserialize, Serialize};

use super::drivers;
use super::traits::{Device, DeviceContext, flag, or_default, require};
use crate::common::{AllocationError, ValidationError};
use crate::config::defaults;
use crate::transport::Transport;

const KIND: &str = "PCIeRootPort";

/// A `pcie-root-port` device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PcieRootPort {
    /// Port identifier.
    pub id: String,
    /// Parent bus; `pcie.0` when empty.
    pub bus: String,
    /// Chassis number; `0x00` when empty.
    pub chassis: String,
    /// Slot number; `0x00` when empty.
    pub slot: String,
    /// Port number on the parent bus.
    pub port: String,
    /// Marks function 0 of a multifunction slot.
    pub multifunction: bool,
    /// Address on the parent bus, optionally `slot.function`; `0x00` when empty.
    pub addr: String,
    /// Secondary bus reservation, needed to hot-plug a PCIe-to-PCI bridge.
    pub bus_reserve: String,
    /// 64-bit prefetchable MMIO reservation.
    pub pref64_reserve: String,
    /// 32-bit prefetchable MMIO reservation.
    pub pref32_reserve: String,
    /// Non-prefetchable MMIO reservation.
    pub mem_reserve: String,
    /// I/O port reservation.
    pub io_reserve: String,
    /// Option ROM image.
    pub rom_file: String,
    /// Transport override.
    pub transport: Option<Transport>,
}

impl PcieRootPort {
    /// Builds `count` root ports sharing one slot, one function each.
    ///
    /// Port `p` gets id `{prefix}.{base_addr}.{p}`, port and chassis `0x{p}`, and address
    /// `{base_addr}.0x{p}`; function 0 is flagged multifunction.
    ///
    /// # Returns
    ///
    /// The ports, or a validation error when an argument is empty or `count` is zero.
    pub fn multifunction_range(
        prefix: &str,
        bus: &str,
        base_addr: &str,
        count: usize,
    ) -> Result<Vec<Self>, ValidationError> {
        require(KIND, "id-prefix", prefix)?;
        require(KIND, "base-addr", base_addr)?;
        if count == 0 {
            return Err(ValidationError::InvalidValue {
                kind: KIND,
                field: "count",
                value: count.to_string(),
                expected: "at least one port",
            });
        }
        (0..count)
            .map(|p| {
                let port = Self {
                    id: format!("{prefix}.{base_addr}.{p}"),
                    bus: bus.to_string(),
                    chassis: format!("0x{p:x}"),
                    port: format!("0x{p:x}"),
                    addr: format!("{base_addr}.0x{p:x}"),
                    multifunction: p == 0,
                    ..Self::default()
                };
                port.validate().map(|()| port)
            })
            .collect()
    }
}

impl Device for PcieRootPort {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if !self.pref64_reserve.is_empty() && !self.pref32_reserve.is_empty() {
            return Err(ValidationError::Exclusive {
                kind: KIND,
                first: "pref64-reserve",
                second: "pref32-reserve",
            });
        }
        require(KIND, "id", &self.id)
    }

    fn transport_override(&self) -> Option<Transport> {
        self.transport
    }

    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        let addr = or_default(&self.addr, defaults::ROOT_PORT_ADDR);
        ctx.claim_root_slot(&self.bus, addr)?;
        let mut params = vec![
            format!("{},id={}", drivers::PCIE_ROOT_PORT, self.id),
            format!("bus={}", or_default(&self.bus, defaults::PCIE_BUS)),
            format!("chassis={}", or_default(&self.chassis, defaults::ROOT_PORT_CHASSIS)),
            format!("slot={}", or_default(&self.slot, defaults::ROOT_PORT_SLOT)),
        ];
        if !self.port.is_empty() {
            params.push(format!("port={}", self.port));
        }
        params.push(format!("addr={addr}"));
        if self.multifunction {
            params.push("multifunction=on".to_string());
        } else if !addr.contains('.') {
            // sub-functions inherit the slot's setting
            params.push("multifunction=off".to_string());
        }
        let reserves = [
            ("bus-reserve", &self.bus_reserve),
            ("pref64-reserve", &self.pref64_reserve),
            ("pref32-reserve", &self.pref32_reserve),
            ("mem-reserve", &self.mem_reserve),
            ("io-reserve", &self.io_reserve),
        ];
        params.extend(
            reserves
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(key, value)| format!("{key}={value}")),
        );
        if ctx.transport().is_pci() && !self.rom_file.is_empty() {
            params.push(format!("romfile={}", self.rom_file));
        }
        Ok(flag("-device", &params).into())
    }
}
