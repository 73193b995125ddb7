//! Device catalogue.
//!
//! Every configurable device implements [`Device`]. The catalogue is closed: the
//! categories and the order in which the assembler emits them are declared by
//! [`DeviceCategory::ORDER`], and [`DeviceCategory::devices`] is the dispatch table
//! from a category to the configured devices of that category.
//!
//! Token layouts (optional parts in brackets, `SFX` is the transport suffix):
//!
//! | Kind | Tokens |
//! |------|--------|
//! | root port | `-device pcie-root-port,id,bus,chassis,slot[,port],addr[,multifunction][,reserves][,romfile]` |
//! | bridge | `-device pci-bridge,bus,id,chassis_nr,shpc[,addr][,romfile][,reserves]` |
//! | SCSI | `-device virtio-scsi-SFX,id,addr,bus[,disable-modern][,iothread][,romfile]` then `-object iothread` |
//! | IDE / USB | `-device DRIVER,id[,bus],addr[,romfile][,rombar][,multifunction]` |
//! | block | `-drive file,id,if,format[,aio][,cache][,discard][,detect-zeroes]` then `-device DRIVER,drive,serial,...` |
//! | char | `[-device DRIVER,...] -chardev BACKEND,id[,path...]` |
//! | legacy serial | `-serial ENDPOINT` |
//! | monitor | `-monitor ENDPOINT` |
//! | net | `-netdev TYPE,id[,vhost][,fds\|ifname\|ipv4,hostfwd\|mcast]` then `-device DRIVER,netdev,mac,...` |
//! | rng | `-object rng-random,id[,filename]` then `-device virtio-rng-SFX,rng[,bus][,addr]...` |
//! | balloon | `-device virtio-balloon-SFX,id,...,deflate-on-oom` |
//! | virtio-serial | `-device virtio-serial-SFX[,disable-modern],id` |
//! | UEFI | `-drive if=pflash,...,readonly=on,file=CODE -drive if=pflash,...,file=VARS` |
//! | TPM | `-chardev socket -tpmdev TYPE -device DRIVER,tpmdev` |
//! | spice | `-spice ... -device virtio-serial-pci -device virtserialport -chardev spicevmc` |

/// Memory balloon.
pub mod balloon;
/// Block devices and their drive backends.
pub mod block;
/// PCI bridges.
pub mod bridge;
/// Character devices.
pub mod chardev;
/// SCSI, IDE, and USB controllers.
pub mod controller;
/// Human monitor.
pub mod monitor;
/// Network devices.
pub mod net;
/// PCI Express root ports.
pub mod pcie;
/// Entropy source.
pub mod rng;
/// Legacy serial ports and the virtio-serial controller.
pub mod serial;
/// Spice display.
pub mod spice;
/// Trusted platform module.
pub mod tpm;
/// Device contract and helpers.
pub mod traits;
/// UEFI firmware pair and discovery.
pub mod uefi;

use std::fmt;

pub use balloon::BalloonDevice;
pub use block::{Aio, BlockDevice, CacheMode, DetectZeroes, DiscardMode};
pub use bridge::{BridgeDevice, BridgeType};
pub use chardev::{CharBackend, CharDevice};
pub use controller::{IdeController, PciController, ScsiController, UsbController};
pub use monitor::MonitorDevice;
pub use net::{McastSocket, NetDevice, NetTap, NetType, NetUser, Port, PortRule};
pub use pcie::PcieRootPort;
pub use rng::RngDevice;
pub use serial::{LegacySerial, VirtioSerial};
pub use spice::SpiceDevice;
pub use tpm::TpmDevice;
pub use traits::{AUTO_BOOT_INDEX, Device, DeviceContext};
pub use uefi::UefiFirmware;

use crate::config::Config;

/// Driver names the renderers special-case.
pub mod drivers {
    /// PCI Express root port.
    pub const PCIE_ROOT_PORT: &str = "pcie-root-port";
    /// Conventional PCI bridge.
    pub const PCI_BRIDGE: &str = "pci-bridge";
    /// PCI Express to PCI bridge.
    pub const PCIE_PCI_BRIDGE: &str = "pcie-pci-bridge";
    /// Virtio SCSI controller.
    pub const VIRTIO_SCSI: &str = "virtio-scsi";
    /// USB 3 controller.
    pub const QEMU_XHCI: &str = "qemu-xhci";
    /// Virtio disk.
    pub const VIRTIO_BLOCK: &str = "virtio-blk";
    /// SCSI disk.
    pub const SCSI_HD: &str = "scsi-hd";
    /// IDE CD-ROM.
    pub const IDE_CD: &str = "ide-cd";
    /// Virtio serial controller.
    pub const VIRTIO_SERIAL: &str = "virtio-serial";
    /// Port on a virtio serial controller.
    pub const VIRTSERIALPORT: &str = "virtserialport";
    /// Legacy ISA serial port.
    pub const LEGACY_SERIAL: &str = "serial";
    /// PCI serial card.
    pub const PCI_SERIAL: &str = "pci-serial";
    /// Virtio network card.
    pub const VIRTIO_NET: &str = "virtio-net";
    /// Virtio entropy source.
    pub const VIRTIO_RNG: &str = "virtio-rng";
    /// Virtio memory balloon.
    pub const VIRTIO_BALLOON: &str = "virtio-balloon";
    /// TPM interface specification frontend.
    pub const TPM_TIS: &str = "tpm-tis";
    /// TPM command response buffer frontend.
    pub const TPM_CRB: &str = "tpm-crb";
    /// ICH9 AHCI controller.
    pub const ICH9_AHCI: &str = "ich9-ahci";
    /// PIIX3 IDE controller.
    pub const PIIX3_IDE: &str = "piix3-ide";
    /// PIIX4 IDE controller.
    pub const PIIX4_IDE: &str = "piix4-ide";
}

/// Device categories in emission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceCategory {
    /// PCI Express root ports.
    PcieRootPort,
    /// PCI bridges.
    Bridge,
    /// SCSI controllers.
    Scsi,
    /// IDE controllers.
    Ide,
    /// USB controllers.
    Usb,
    /// Disks and drives.
    Block,
    /// Character devices.
    Char,
    /// Legacy `-serial` ports.
    LegacySerial,
    /// `-monitor` endpoints.
    Monitor,
    /// Network interfaces.
    Net,
    /// Entropy sources.
    Rng,
    /// Memory balloons.
    Balloon,
    /// Virtio serial controllers.
    VirtioSerial,
    /// UEFI flash pairs.
    Uefi,
}

impl DeviceCategory {
    /// Emission order; controllers and buses precede the devices that reference them.
    pub const ORDER: [Self; 14] = [
        Self::PcieRootPort,
        Self::Bridge,
        Self::Scsi,
        Self::Ide,
        Self::Usb,
        Self::Block,
        Self::Char,
        Self::LegacySerial,
        Self::Monitor,
        Self::Net,
        Self::Rng,
        Self::Balloon,
        Self::VirtioSerial,
        Self::Uefi,
    ];

    /// Configuration key of the category's collection.
    pub const fn label(self) -> &'static str {
        match self {
            Self::PcieRootPort => "pcie-root-port-devices",
            Self::Bridge => "pci-bridge-devices",
            Self::Scsi => "scsi-controller-devices",
            Self::Ide => "ide-controller-devices",
            Self::Usb => "usb-controller-devices",
            Self::Block => "blk-devices",
            Self::Char => "char-devices",
            Self::LegacySerial => "legacy-serial-devices",
            Self::Monitor => "monitor-devices",
            Self::Net => "net-devices",
            Self::Rng => "rng-devices",
            Self::Balloon => "balloon-devices",
            Self::VirtioSerial => "serial-devices",
            Self::Uefi => "uefi-firmware-devices",
        }
    }

    /// Configured devices of this category, in configuration order.
    pub fn devices(self, config: &Config) -> Vec<&dyn Device> {
        fn erase<T: Device>(items: &[T]) -> Vec<&dyn Device> {
            items.iter().map(|d| d as &dyn Device).collect()
        }

        match self {
            Self::PcieRootPort => erase(&config.pcie_root_port_devices),
            Self::Bridge => erase(&config.pci_bridge_devices),
            Self::Scsi => erase(&config.scsi_controller_devices),
            Self::Ide => erase(&config.ide_controller_devices),
            Self::Usb => erase(&config.usb_controller_devices),
            Self::Block => erase(&config.blk_devices),
            Self::Char => erase(&config.char_devices),
            Self::LegacySerial => erase(&config.legacy_serial_devices),
            Self::Monitor => erase(&config.monitor_devices),
            Self::Net => erase(&config.net_devices),
            Self::Rng => erase(&config.rng_devices),
            Self::Balloon => erase(&config.balloon_devices),
            Self::VirtioSerial => erase(&config.serial_devices),
            Self::Uefi => erase(&config.uefi_firmware_devices),
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
