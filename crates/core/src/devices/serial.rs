//! Serial ports.
//!
//! Two unrelated things share the name: the legacy `-serial` option, which wires a
//! guest UART to a host endpoint, and the `virtio-serial` controller that hosts
//! `virtserialport` devices.

use serde::{Deserialize, Serialize};

use super::chardev::CharBackend;
use super::drivers;
use super::traits::{Device, DeviceContext, flag, require};
use crate::common::{AllocationError, ValidationError};
use crate::transport::Transport;

/// Checks the endpoint shape shared by `-serial` and `-monitor`.
///
/// Without a backend exactly one of `name` or `chardev-id` is set; with one, the
/// backend must be a socket and a path is required.
pub(crate) fn validate_endpoint(
    kind: &'static str,
    name: &str,
    chardev_id: &str,
    backend: Option<CharBackend>,
    path: &str,
) -> Result<(), ValidationError> {
    match backend {
        None if name.is_empty() && chardev_id.is_empty() => Err(ValidationError::OneRequired {
            kind,
            first: "name",
            second: "chardev-id",
        }),
        None if !name.is_empty() && !chardev_id.is_empty() => Err(ValidationError::Exclusive {
            kind,
            first: "name",
            second: "chardev-id",
        }),
        None => Ok(()),
        Some(CharBackend::Socket) => require(kind, "path", path),
        Some(other) => Err(ValidationError::Unsupported {
            kind,
            detail: format!("only supports the socket backend, found '{other}'"),
        }),
    }
}

/// Renders the value of a `-serial` or `-monitor` option.
pub(crate) fn endpoint(
    name: &str,
    chardev_id: &str,
    backend: Option<CharBackend>,
    path: &str,
) -> String {
    if backend == Some(CharBackend::Socket) {
        format!("unix:{path},server=on,wait=off")
    } else if !chardev_id.is_empty() {
        format!("chardev:{chardev_id}")
    } else {
        name.to_string()
    }
}

/// A legacy `-serial` port.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LegacySerial {
    /// Existing character device to connect to.
    pub chardev_id: String,
    /// Plain endpoint name, e.g. `stdio` or `none`.
    pub name: String,
    /// Multiplexes the serial port and the monitor on stdio.
    pub mon_mux: bool,
    /// Host backend; only `socket` is accepted.
    pub backend: Option<CharBackend>,
    /// Socket path.
    pub path: String,
}

impl Device for LegacySerial {
    fn kind(&self) -> &'static str {
        "LegacySerialDevice"
    }

    fn id(&self) -> Option<&str> {
        None
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.mon_mux {
            return Ok(());
        }
        validate_endpoint(
            self.kind(),
            &self.name,
            &self.chardev_id,
            self.backend,
            &self.path,
        )
    }

    fn render(&self, _ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        let value = if self.mon_mux {
            "mon:stdio".to_string()
        } else {
            endpoint(&self.name, &self.chardev_id, self.backend, &self.path)
        };
        Ok(vec!["-serial".to_string(), value])
    }
}

/// A `virtio-serial` controller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VirtioSerial {
    /// Device driver, normally `virtio-serial`.
    pub driver: String,
    /// Controller identifier.
    pub id: String,
    /// Forces legacy-only virtio on PCI.
    pub disable_modern: bool,
    /// Option ROM image (PCI only).
    pub rom_file: String,
    /// Channel I/O device number (CCW only).
    pub devno: String,
    /// Transport override.
    pub transport: Option<Transport>,
    /// Port limit; rendered together with a ROM file on PCI.
    pub max_ports: u32,
}

impl Device for VirtioSerial {
    fn kind(&self) -> &'static str {
        "SerialDevice"
    }

    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(self.kind(), "driver", &self.driver)?;
        require(self.kind(), "id", &self.id)
    }

    fn transport_override(&self) -> Option<Transport> {
        self.transport
    }

    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        let transport = ctx.transport();
        let virtio = self.driver == drivers::VIRTIO_SERIAL;
        let mut params = vec![if virtio {
            transport.device_name(drivers::VIRTIO_SERIAL)
        } else {
            self.driver.clone()
        }];
        params.extend(transport.disable_modern(self.disable_modern).map(String::from));
        params.push(format!("id={}", self.id));
        if transport.is_pci() && !self.rom_file.is_empty() {
            params.push(format!("romfile={}", self.rom_file));
            if virtio && self.max_ports != 0 {
                params.push(format!("max_ports={}", self.max_ports));
            }
        }
        if transport.is_ccw() {
            params.extend(ctx.iommu_platform().map(String::from));
            params.push(format!("devno={}", self.devno));
        }
        Ok(flag("-device", &params).into())
    }
}
