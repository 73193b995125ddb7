//! Emission stages.
//!
//! The hypervisor interprets some options relative to ones seen earlier, so the
//! command line is emitted in a fixed sequence of stages. Devices occupy a single
//! stage and are further ordered by [`DeviceCategory::ORDER`](crate::devices::DeviceCategory::ORDER).

use std::fmt;

/// One stage of the emitted command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// `-name` and `-uuid`.
    Identity,
    /// `-machine`.
    Machine,
    /// `-cpu`.
    Cpu,
    /// Spice display.
    Display,
    /// TPM.
    Tpm,
    /// SMBIOS tables.
    Smbios,
    /// QMP sockets.
    Qmp,
    /// `-m`.
    Memory,
    /// Every catalogue device.
    Devices,
    /// `-rtc`.
    Rtc,
    /// `-global`.
    Global,
    /// `-pflash`.
    Pflash,
    /// `-vga`.
    Vga,
    /// Memory backend and boolean switches.
    Knobs,
    /// `-kernel`, `-initrd`, `-append`.
    Kernel,
    /// `-bios`.
    Bios,
    /// IO thread objects.
    IoThreads,
    /// `-incoming`.
    Incoming,
    /// `-pidfile` and `-D`.
    Files,
    /// `-fw_cfg`.
    FwCfg,
    /// `-sandbox`.
    Sandbox,
    /// `-smp`.
    Smp,
}

impl Stage {
    /// Emission order.
    pub const ORDER: [Self; 22] = [
        Self::Identity,
        Self::Machine,
        Self::Cpu,
        Self::Display,
        Self::Tpm,
        Self::Smbios,
        Self::Qmp,
        Self::Memory,
        Self::Devices,
        Self::Rtc,
        Self::Global,
        Self::Pflash,
        Self::Vga,
        Self::Knobs,
        Self::Kernel,
        Self::Bios,
        Self::IoThreads,
        Self::Incoming,
        Self::Files,
        Self::FwCfg,
        Self::Sandbox,
        Self::Smp,
    ];

    /// Short lowercase name, used in diagnostics.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Machine => "machine",
            Self::Cpu => "cpu",
            Self::Display => "display",
            Self::Tpm => "tpm",
            Self::Smbios => "smbios",
            Self::Qmp => "qmp",
            Self::Memory => "memory",
            Self::Devices => "devices",
            Self::Rtc => "rtc",
            Self::Global => "global",
            Self::Pflash => "pflash",
            Self::Vga => "vga",
            Self::Knobs => "knobs",
            Self::Kernel => "kernel",
            Self::Bios => "bios",
            Self::IoThreads => "iothreads",
            Self::Incoming => "incoming",
            Self::Files => "files",
            Self::FwCfg => "fw_cfg",
            Self::Sandbox => "sandbox",
            Self::Smp => "smp",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
