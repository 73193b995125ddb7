//! PCI and PCIe-to-PCI bridges.

use serde::{Deserialize, Serialize};

use super::drivers;
use super::traits::{Device, DeviceContext, flag, require};
use crate::bus::parse_bus_addr;
use crate::common::{AllocationError, ValidationError};
use crate::transport::Transport;

const KIND: &str = "BridgeDevice";

/// Flavour of bridge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeType {
    /// Conventional `pci-bridge` with a standard hot-plug controller.
    #[default]
    Pci,
    /// `pcie-pci-bridge`, plugged into a PCI Express hierarchy.
    Pcie,
}

/// A bridge to a secondary bus.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BridgeDevice {
    /// Bridge flavour.
    #[serde(rename = "type")]
    pub bridge_type: BridgeType,
    /// Bus the bridge plugs into, typically `pci.0` or `pcie.0`.
    pub bus: String,
    /// Bridge identifier.
    pub id: String,
    /// Chassis number (conventional bridges only).
    pub chassis: u32,
    /// Enables the standard hot-plug controller (conventional bridges only).
    pub shpc: bool,
    /// Slot on the parent bus.
    pub addr: String,
    /// Option ROM image.
    pub rom_file: String,
    /// I/O port reservation for the secondary bus.
    pub io_reserve: String,
    /// MMIO reservation for the secondary bus.
    pub mem_reserve: String,
    /// 64-bit prefetchable MMIO reservation for the secondary bus.
    pub pref64_reserve: String,
}

impl Device for BridgeDevice {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(KIND, "bus", &self.bus)?;
        require(KIND, "id", &self.id)
    }

    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        ctx.claim_root_slot(&self.bus, &self.addr)?;
        let mut params = vec![match self.bridge_type {
            BridgeType::Pcie => format!(
                "{},bus={},id={}",
                drivers::PCIE_PCI_BRIDGE,
                self.bus,
                self.id
            ),
            BridgeType::Pci => format!(
                "{},bus={},id={},chassis_nr={},shpc={}",
                drivers::PCI_BRIDGE,
                self.bus,
                self.id,
                self.chassis,
                if self.shpc { "on" } else { "off" }
            ),
        }];
        if let Some(addr) = parse_bus_addr(&self.addr) {
            params.push(format!("addr={addr:x}"));
        }
        if ctx.transport() == Transport::Pci && !self.rom_file.is_empty() {
            params.push(format!("romfile={}", self.rom_file));
        }
        for (key, value) in [
            ("io-reserve", &self.io_reserve),
            ("mem-reserve", &self.mem_reserve),
            ("pref64-reserve", &self.pref64_reserve),
        ] {
            if !value.is_empty() {
                params.push(format!("{key}={value}"));
            }
        }
        Ok(flag("-device", &params).into())
    }
}
