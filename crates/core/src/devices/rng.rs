//! Entropy source.

use serde::{Deserialize, Serialize};

use super::drivers;
use super::traits::{Device, DeviceContext, flag, require};
use crate::common::{AllocationError, ValidationError};
use crate::transport::Transport;

const KIND: &str = "RngDevice";

/// Host entropy file normally fed to guests.
pub const DEV_URANDOM: &str = "/dev/urandom";

/// A `rng-random` backend object and its guest device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RngDevice {
    /// Backend object identifier.
    pub id: String,
    /// Device driver, normally `virtio-rng`.
    pub driver: String,
    /// Parent bus.
    pub bus: String,
    /// Requested slot on PCI; automatic when empty.
    #[serde(rename = "address")]
    pub addr: String,
    /// Host entropy source.
    pub filename: String,
    /// Bytes the guest may read per period.
    pub max_bytes: u32,
    /// Period length in milliseconds.
    pub period: u32,
    /// Option ROM image (PCI only).
    pub rom_file: String,
    /// Channel I/O device number (CCW only).
    pub devno: String,
    /// Transport override.
    pub transport: Option<Transport>,
}

impl Device for RngDevice {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(KIND, "id", &self.id)?;
        require(KIND, "driver", &self.driver)
    }

    fn transport_override(&self) -> Option<Transport> {
        self.transport
    }

    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        let transport = ctx.transport();

        let mut object = vec!["rng-random".to_string(), format!("id={}", self.id)];
        if !self.filename.is_empty() {
            object.push(format!("filename={}", self.filename));
        }

        let name = if self.driver == drivers::VIRTIO_RNG {
            transport.device_name(drivers::VIRTIO_RNG)
        } else {
            self.driver.clone()
        };
        let mut device = vec![name, format!("rng={}", self.id)];
        if !self.bus.is_empty() {
            device.push(format!("bus={}", self.bus));
        }
        if transport.is_pci() {
            let slot = ctx.allocate_slot(&self.addr)?;
            device.push(format!("addr=0x{slot:02x}"));
            if !self.rom_file.is_empty() {
                device.push(format!("romfile={}", self.rom_file));
            }
        }
        if transport.is_ccw() {
            device.extend(ctx.iommu_platform().map(String::from));
            device.push(format!("devno={}", self.devno));
        }
        if self.max_bytes > 0 {
            device.push(format!("max-bytes={}", self.max_bytes));
        }
        if self.period > 0 {
            device.push(format!("period={}", self.period));
        }

        let mut tokens: Vec<String> = flag("-object", &object).into();
        tokens.extend(flag("-device", &device));
        Ok(tokens)
    }
}
