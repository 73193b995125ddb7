//! Declarative description of a virtual machine.
//!
//! This module defines the aggregate the assembler consumes. It provides:
//! 1. **Defaults:** Named constants for every implicit value the renderers fall back to.
//! 2. **Structures:** `Config` with one collection per device category plus global settings.
//! 3. **Persistence:** JSON loading and saving through `serde_json`.
//!
//! Every field is optional in the persisted form; a missing key takes its default so
//! partial documents load.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{BuildError, Result};
use crate::devices::{
    BalloonDevice, BlockDevice, BridgeDevice, CharDevice, IdeController, LegacySerial,
    MonitorDevice, NetDevice, PcieRootPort, RngDevice, ScsiController, SpiceDevice, TpmDevice,
    UefiFirmware, UsbController, VirtioSerial,
};

/// Machine, memory, and boot settings.
pub mod machine;
/// Optional runtime facilities (clock, migration, firmware config, control sockets).
pub mod runtime;
/// SMBIOS tables.
pub mod smbios;

pub use machine::{Kernel, Knobs, Machine, Memory, Smp};
pub use runtime::{FwCfg, Incoming, IoThread, QmpSocket, Rtc, RtcBase};
pub use smbios::{
    SmbiosInfo, SmbiosTableBaseboard, SmbiosTableBios, SmbiosTableChassis, SmbiosTableMemory,
    SmbiosTableProcessor, SmbiosTableSystem,
};

/// Values the renderers use when a setting is left empty.
pub(crate) mod defaults {
    /// Root PCI Express bus of q35-class machines.
    pub const PCIE_BUS: &str = "pcie.0";

    /// Root PCI bus of i440fx-class machines.
    pub const PCI_BUS: &str = "pci.0";

    /// First IDE bus.
    pub const IDE_BUS: &str = "ide.0";

    /// Root-port address when none is given.
    pub const ROOT_PORT_ADDR: &str = "0x00";

    /// Root-port chassis when none is given.
    pub const ROOT_PORT_CHASSIS: &str = "0x00";

    /// Root-port slot when none is given.
    pub const ROOT_PORT_SLOT: &str = "0x00";

    /// Polling window, in nanoseconds, of IO threads declared by SCSI controllers.
    pub const IOTHREAD_POLL_MAX_NS: u32 = 32;

    /// Spice listens on loopback unless told otherwise.
    pub const SPICE_ADDR: &str = "127.0.0.1";

    /// Identifier of the guest memory backend object.
    pub const MEMORY_BACKEND_ID: &str = "dimm1";

    /// Mount point of the host hugetlbfs.
    pub const HUGEPAGES_PATH: &str = "/dev/hugepages";

    /// The only supported QMP socket type.
    pub const QMP_SOCKET_TYPE: &str = "unix";
}

/// Root configuration of one virtual machine.
///
/// # Examples
///
/// ```
/// use qcmd_core::Config;
///
/// let config = Config::from_json(r#"{
///     "machine": { "type": "q35", "acceleration": "kvm" },
///     "memory": { "size": "4096" },
///     "smp": { "cpus": 2 }
/// }"#).unwrap();
/// assert_eq!(config.machine.machine_type, "q35");
/// assert_eq!(config.smp.cpus, 2);
/// assert!(config.blk_devices.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Guest name (`-name`).
    pub name: String,
    /// Guest UUID (`-uuid`).
    pub uuid: String,
    /// CPU model (`-cpu`).
    pub cpu_model: String,
    /// Extra CPU feature flags, e.g. `+x2apic`.
    pub cpu_model_flags: Vec<String>,
    /// Seccomp sandbox profile (`-sandbox`).
    pub seccomp_sandbox: String,
    /// Machine descriptor.
    pub machine: Machine,
    /// SMBIOS tables.
    pub smbios: SmbiosInfo,
    /// QMP control sockets.
    pub qmp_sockets: Vec<QmpSocket>,

    /// PCI Express root ports.
    pub pcie_root_port_devices: Vec<PcieRootPort>,
    /// PCI bridges.
    pub pci_bridge_devices: Vec<BridgeDevice>,
    /// SCSI controllers.
    pub scsi_controller_devices: Vec<ScsiController>,
    /// IDE controllers.
    pub ide_controller_devices: Vec<IdeController>,
    /// USB controllers.
    pub usb_controller_devices: Vec<UsbController>,
    /// Disks and drives.
    pub blk_devices: Vec<BlockDevice>,
    /// Character devices.
    pub char_devices: Vec<CharDevice>,
    /// Legacy serial ports.
    pub legacy_serial_devices: Vec<LegacySerial>,
    /// Monitor endpoints.
    pub monitor_devices: Vec<MonitorDevice>,
    /// Network interfaces.
    pub net_devices: Vec<NetDevice>,
    /// Entropy sources.
    pub rng_devices: Vec<RngDevice>,
    /// Memory balloons.
    pub balloon_devices: Vec<BalloonDevice>,
    /// Virtio serial controllers.
    pub serial_devices: Vec<VirtioSerial>,
    /// UEFI flash pairs.
    pub uefi_firmware_devices: Vec<UefiFirmware>,

    /// Real-time clock.
    #[serde(rename = "real-time-clock")]
    pub rtc: Option<Rtc>,
    /// VGA card type (`-vga`).
    #[serde(rename = "vga-mode")]
    pub vga: String,
    /// Spice display.
    pub spice: Option<SpiceDevice>,
    /// TPM.
    pub tpm: Option<TpmDevice>,
    /// Direct kernel boot.
    pub kernel: Kernel,
    /// Guest memory.
    pub memory: Memory,
    /// CPU topology.
    pub smp: Smp,
    /// Raw `-global` properties.
    pub global_params: Vec<String>,
    /// Global boolean switches.
    pub knobs: Knobs,
    /// Legacy BIOS image (`-bios`).
    #[serde(rename = "bios-path")]
    pub bios: String,
    /// Raw flash images (`-pflash`).
    #[serde(rename = "pflash-images")]
    pub pflash: Vec<String>,
    /// Incoming migration.
    pub incoming: Incoming,
    /// Firmware configuration blobs.
    #[serde(rename = "firmware-config")]
    pub fw_cfg: Vec<FwCfg>,
    /// IO thread objects.
    pub iothreads: Vec<IoThread>,
    /// PID file (`-pidfile`).
    pub pid_file: String,
    /// Debug log file (`-D`).
    pub log_file: String,
}

impl Config {
    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// `BuildError::ConfigParse` when the text is not a valid configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// `BuildError::ConfigIo` when the file cannot be read, `BuildError::ConfigParse`
    /// when its contents are not a valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| BuildError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Serializes the configuration as indented JSON.
    ///
    /// # Errors
    ///
    /// `BuildError::ConfigParse` if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the configuration to `path` as indented JSON.
    ///
    /// # Errors
    ///
    /// `BuildError::ConfigIo` when the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json_pretty()?).map_err(|source| BuildError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })
    }
}
