//! Character devices.
//!
//! A character device is a host-side `-chardev` backend, optionally paired with a guest
//! frontend. The legacy serial and PCI serial drivers are wired up through `-serial`
//! instead, so they emit no `-device` of their own.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::drivers;
use super::traits::{Device, DeviceContext, flag, on_off, on_off_param, require};
use crate::common::{AllocationError, ValidationError};
use crate::transport::Transport;

const KIND: &str = "CharDevice";

/// Host side of a character device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharBackend {
    /// Named pipe pair.
    Pipe,
    /// Stream socket; rendered as a listening unix server.
    #[default]
    Socket,
    /// QEMU's standard output.
    Console,
    /// Host serial device.
    Serial,
    /// Alias of `serial`.
    Tty,
    /// Fresh pseudo-terminal.
    Pty,
    /// Output file.
    File,
    /// QEMU's standard input and output.
    Stdio,
    /// Spice channel.
    Spicevmc,
}

impl CharBackend {
    /// Backend keyword used on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pipe => "pipe",
            Self::Socket => "socket",
            Self::Console => "console",
            Self::Serial => "serial",
            Self::Tty => "tty",
            Self::Pty => "pty",
            Self::File => "file",
            Self::Stdio => "stdio",
            Self::Spicevmc => "spicevmc",
        }
    }
}

impl fmt::Display for CharBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `-chardev` backend and its guest frontend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CharDevice {
    /// Host backend.
    pub backend: CharBackend,
    /// Guest frontend driver, e.g. `virtserialport` or `serial`.
    pub driver: String,
    /// Bus of the frontend (for ports, the virtio-serial bus).
    pub bus: String,
    /// Frontend identifier.
    pub device_id: String,
    /// Backend identifier.
    pub id: String,
    /// Socket or file path.
    pub path: String,
    /// Port name seen by the guest.
    pub name: String,
    /// Forces legacy-only virtio on PCI.
    pub disable_modern: bool,
    /// Option ROM image (PCI only).
    pub rom_file: String,
    /// Channel I/O device number (CCW only).
    pub devno: String,
    /// Transport override.
    pub transport: Option<Transport>,
    /// Multiplexing, `on` or `off`.
    #[serde(rename = "multiplex")]
    pub mux: String,
    /// Signal processing, `on` or `off`.
    pub signal: String,
}

impl Device for CharDevice {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(KIND, "id", &self.id)?;
        if self.backend != CharBackend::Stdio {
            require(KIND, "path", &self.path)?;
        }
        on_off(KIND, "multiplex", &self.mux)?;
        on_off(KIND, "signal", &self.signal)
    }

    fn transport_override(&self) -> Option<Transport> {
        self.transport
    }

    fn render(&self, ctx: &mut DeviceContext<'_>) -> Result<Vec<String>, AllocationError> {
        let transport = ctx.transport();
        let virtio_serial = self.driver == drivers::VIRTIO_SERIAL;

        let mut device = vec![if virtio_serial {
            transport.device_name(drivers::VIRTIO_SERIAL)
        } else {
            self.driver.clone()
        }];
        if virtio_serial {
            device.extend(transport.disable_modern(self.disable_modern).map(String::from));
        }
        if !self.bus.is_empty() {
            device.push(format!("bus={}", self.bus));
        }
        device.push(format!("chardev={}", self.id));
        device.push(format!("id={}", self.device_id));
        if !self.name.is_empty() {
            device.push(format!("name={}", self.name));
        }
        if virtio_serial && transport.is_pci() && !self.rom_file.is_empty() {
            device.push(format!("romfile={}", self.rom_file));
        }
        if virtio_serial && transport.is_ccw() {
            device.extend(ctx.iommu_platform().map(String::from));
            device.push(format!("devno={}", self.devno));
        }

        let mut backend = vec![self.backend.to_string(), format!("id={}", self.id)];
        match self.backend {
            CharBackend::Socket => {
                backend.push(format!("path={},server=on,wait=off", self.path));
            }
            CharBackend::File => backend.push(format!("path={}", self.path)),
            _ => {}
        }
        backend.extend(on_off_param("mux", &self.mux));
        backend.extend(on_off_param("signal", &self.signal));

        let mut tokens = Vec::new();
        if self.driver != drivers::LEGACY_SERIAL && self.driver != drivers::PCI_SERIAL {
            tokens.extend(flag("-device", &device));
        }
        if self.driver == drivers::PCI_SERIAL {
            tokens.push("-serial".to_string());
            tokens.push("none".to_string());
        }
        tokens.extend(flag("-chardev", &backend));
        Ok(tokens)
    }
}
