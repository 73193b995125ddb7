//! Storage and USB bus controllers.
//!
//! Controllers are referenced by the disks attached to them, so the assembler emits
//! them before any block device. IDE and USB controllers always take a root bus slot;
//! the SCSI controller takes one only on the PCI transport.

use serde::{Deserialize, Serialize};

use super::drivers;
use super::traits::{Device, DeviceContext, flag, or_default, require};
use crate::common::{AllocationError, ValidationError};
use crate::config::defaults;
use crate::transport::Transport;

/// A `virtio-scsi` controller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScsiController {
    /// Controller identifier.
    pub id: String,
    /// Parent bus; `pcie.0` when empty.
    pub bus: String,
    /// Requested slot; automatic when empty.
    pub addr: String,
    /// Forces legacy-only virtio on PCI.
    pub disable_modern: bool,
    /// IO thread servicing this controller; also declares the thread object.
    pub iothread: String,
    /// Option ROM image (PCI only).
    pub rom_file: String,
    /// Channel I/O device number (CCW only).
    pub devno: String,
    /// Transport override.
    pub transport: Option<Transport>,
}

impl Device for ScsiController {
    fn kind(&self) -> &'static str {
        "SCSIController"
    }

    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(self.kind(), "id", &self.id)
    }

    fn transport_override(&self) -> Option<Transport> {
        self.transport
    }

    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        let transport = ctx.transport();
        let mut params = vec![format!(
            "{},id={}",
            transport.device_name(drivers::VIRTIO_SCSI),
            self.id
        )];
        if transport.is_pci() {
            let slot = ctx.allocate_slot(&self.addr)?;
            params.push(format!("addr=0x{slot:02x}"));
            params.push(format!("bus={}", or_default(&self.bus, defaults::PCIE_BUS)));
        }
        params.extend(transport.disable_modern(self.disable_modern).map(String::from));
        if !self.iothread.is_empty() {
            params.push(format!("iothread={}", self.iothread));
        }
        if transport.is_pci() && !self.rom_file.is_empty() {
            params.push(format!("romfile={}", self.rom_file));
        }
        if transport.is_ccw() {
            params.extend(ctx.iommu_platform().map(String::from));
            params.push(format!("devno={}", self.devno));
        }
        let mut tokens: Vec<String> = flag("-device", &params).into();
        if !self.iothread.is_empty() {
            tokens.push("-object".to_string());
            tokens.push(format!(
                "iothread,poll-max-ns={},id={}",
                defaults::IOTHREAD_POLL_MAX_NS,
                self.iothread
            ));
        }
        Ok(tokens)
    }
}

/// Fields shared by the IDE/AHCI and USB host controllers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PciController {
    /// Controller identifier.
    pub id: String,
    /// Device driver, e.g. `ich9-ahci` or `qemu-xhci`.
    pub driver: String,
    /// Parent bus (IDE only); `pcie.0` when empty.
    pub bus: String,
    /// Requested slot; automatic when empty.
    pub addr: String,
    /// Option ROM image.
    pub rom_file: String,
    /// Option ROM BAR setting.
    pub rom_bar: String,
    /// Marks function 0 of a multifunction slot.
    pub multifunction: bool,
}

impl PciController {
    fn validate_as(&self, kind: &'static str) -> Result<(), ValidationError> {
        require(kind, "id", &self.id)?;
        require(kind, "driver", &self.driver)
    }

    fn render_with_bus(
        &self,
        ctx: &mut DeviceContext<'_>,
        with_bus: bool,
    ) -> Result<Vec<String>, AllocationError> {
        let slot = ctx.allocate_slot(&self.addr)?;
        let mut params = vec![
            format!("{},id={}", self.driver, self.id),
            format!("addr=0x{slot:02x}"),
        ];
        if with_bus {
            params.push(format!("bus={}", or_default(&self.bus, defaults::PCIE_BUS)));
        }
        if !self.rom_file.is_empty() {
            params.push(format!("romfile={}", self.rom_file));
        }
        if !self.rom_bar.is_empty() {
            params.push(format!("rombar={}", self.rom_bar));
        }
        if self.multifunction {
            params.push("multifunction=on".to_string());
        }
        Ok(flag("-device", &params).into())
    }
}

/// An IDE or AHCI controller (`ich9-ahci`, `piix3-ide`, `piix4-ide`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdeController(pub PciController);

impl Device for IdeController {
    fn kind(&self) -> &'static str {
        "IDEController"
    }

    fn id(&self) -> Option<&str> {
        (!self.0.id.is_empty()).then_some(self.0.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        self.0.validate_as(self.kind())
    }

    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        self.0.render_with_bus(ctx, true)
    }
}

/// A USB host controller (`qemu-xhci`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsbController(pub PciController);

impl Device for UsbController {
    fn kind(&self) -> &'static str {
        "USBController"
    }

    fn id(&self) -> Option<&str> {
        (!self.0.id.is_empty()).then_some(self.0.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        self.0.validate_as(self.kind())
    }

    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        self.0.render_with_bus(ctx, false)
    }
}

impl IdeController {
    /// Convenience constructor for a controller with a driver and an id.
    pub fn new(driver: &str, id: &str) -> Self {
        Self(PciController {
            id: id.to_string(),
            driver: driver.to_string(),
            ..PciController::default()
        })
    }
}

impl UsbController {
    /// An xHCI controller with the given id.
    pub fn xhci(id: &str) -> Self {
        Self(PciController {
            id: id.to_string(),
            driver: drivers::QEMU_XHCI.to_string(),
            ..PciController::default()
        })
    }
}
