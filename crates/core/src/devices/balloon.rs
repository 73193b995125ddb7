//! Memory balloon.

use serde::{Deserialize, Serialize};

use super::drivers;
use super::traits::{Device, DeviceContext, flag, require};
use crate::common::{AllocationError, ValidationError};
use crate::transport::Transport;

/// A `virtio-balloon` device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BalloonDevice {
    /// Device identifier.
    pub id: String,
    /// Lets the guest deflate the balloon under memory pressure.
    pub deflate_on_oom: bool,
    /// Forces legacy-only virtio on PCI.
    pub disable_modern: bool,
    /// Option ROM image (PCI only).
    pub rom_file: String,
    /// Channel I/O device number (CCW only).
    pub devno: String,
    /// Transport override.
    pub transport: Option<Transport>,
}

impl Device for BalloonDevice {
    fn kind(&self) -> &'static str {
        "BalloonDevice"
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
        let mut params = vec![
            transport.device_name(drivers::VIRTIO_BALLOON),
            format!("id={}", self.id),
        ];
        if transport.is_pci() && !self.rom_file.is_empty() {
            params.push(format!("romfile={}", self.rom_file));
        }
        if transport.is_ccw() {
            params.push(format!("devno={}", self.devno));
        }
        params.push(format!(
            "deflate-on-oom={}",
            if self.deflate_on_oom { "on" } else { "off" }
        ));
        params.extend(transport.disable_modern(self.disable_modern).map(String::from));
        Ok(flag("-device", &params).into())
    }
}
