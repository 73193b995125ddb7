//! Machine descriptor, memory, CPU topology, kernel boot, and global switches.

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::common::{ValidationError, ValidationErrors};
use crate::devices::traits::{flag, on_off, one_of};

const MACHINE: &str = "Machine";

/// The `-machine` descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Machine {
    /// Machine type, e.g. `q35`, `pc`, `virt`, or `microvm`.
    #[serde(rename = "type")]
    pub machine_type: String,
    /// Accelerator, e.g. `kvm` or `tcg`.
    pub acceleration: String,
    /// Free-form options appended verbatim.
    pub options: String,
    /// System management mode, `on` or `off`.
    pub smm: String,
    /// In-kernel interrupt controller: `on`, `off`, or `split`.
    pub kernel_irq_chip: String,
    /// VMware I/O port emulation: `on`, `off`, or `auto`.
    pub vm_port: String,
    /// KVM shadow MMU size in bytes; unset when zero.
    pub kvm_shadow_mem_size_bytes: u64,
    /// Include guest memory in core dumps, `on` or `off`.
    pub dump_guest_core: String,
    /// Kernel same-page merging, `on` or `off`.
    pub memory_merge: String,
    /// Intel graphics passthrough, `on` or `off`.
    pub igd_passthrough: String,
    /// s390 AES key wrapping, `on` or `off`.
    pub aes_key_wrap: String,
    /// s390 DEA key wrapping, `on` or `off`.
    pub dea_key_wrap: String,
    /// Omit the VM description from migration streams, `on` or `off`.
    pub suppress_vm_description: String,
    /// NVDIMM support, `on` or `off`.
    pub nvdimm: String,
    /// Force the configuration section in migration streams, `on` or `off`.
    pub enforce_config_section: String,
}

impl Machine {
    /// The on/off switches in rendering order, as (option key, config key, value).
    fn switches(&self) -> [(&'static str, &'static str, &str); 9] {
        [
            ("smm", "smm", self.smm.as_str()),
            ("dump-guest-core", "dump-guest-core", self.dump_guest_core.as_str()),
            ("mem-merge", "memory-merge", self.memory_merge.as_str()),
            ("igd-passthrough", "igd-passthrough", self.igd_passthrough.as_str()),
            ("aes-key-wrap", "aes-key-wrap", self.aes_key_wrap.as_str()),
            ("dea-key-wrap", "dea-key-wrap", self.dea_key_wrap.as_str()),
            ("suppress-vmdesc", "suppress-vm-description", self.suppress_vm_description.as_str()),
            ("nvdimm", "nvdimm", self.nvdimm.as_str()),
            ("enforce-config-section", "enforce-config-section", self.enforce_config_section.as_str()),
        ]
    }

    /// Records every malformed enumerated value.
    pub fn validate(&self, errors: &mut ValidationErrors) {
        errors.check(one_of(
            MACHINE,
            "kernel-irq-chip",
            &self.kernel_irq_chip,
            &["on", "off", "split"],
            "'on', 'off', or 'split'",
        ));
        errors.check(one_of(
            MACHINE,
            "vm-port",
            &self.vm_port,
            &["on", "off", "auto"],
            "'on', 'off', or 'auto'",
        ));
        for (_, field, value) in self.switches() {
            errors.check(on_off(MACHINE, field, value));
        }
    }

    /// Renders `-machine`, or nothing when no type is set.
    pub fn args(&self) -> Vec<String> {
        if self.machine_type.is_empty() {
            return Vec::new();
        }
        let mut params = vec![self.machine_type.clone()];
        if !self.acceleration.is_empty() {
            params.push(format!("accel={}", self.acceleration));
        }
        if !self.kernel_irq_chip.is_empty() {
            params.push(format!("kernel_irqchip={}", self.kernel_irq_chip));
        }
        if !self.vm_port.is_empty() {
            params.push(format!("vmport={}", self.vm_port));
        }
        if self.kvm_shadow_mem_size_bytes > 0 {
            params.push(format!("kvm_shadow_mem={}", self.kvm_shadow_mem_size_bytes));
        }
        params.extend(
            self.switches()
                .into_iter()
                .filter(|(_, _, value)| !value.is_empty())
                .map(|(key, _, value)| format!("{key}={value}")),
        );
        if !self.options.is_empty() {
            params.push(self.options.clone());
        }
        flag("-machine", &params).into()
    }
}

/// CPU topology.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Smp {
    /// Boot CPUs; no `-smp` is emitted when zero.
    pub cpus: u32,
    /// Cores per socket.
    pub cores: u32,
    /// Threads per core.
    pub threads: u32,
    /// Sockets.
    pub sockets: u32,
    /// Hot-pluggable CPU ceiling.
    pub max_cpus: u32,
}

impl Smp {
    /// Fails when the CPU ceiling is set below the boot CPU count.
    pub const fn validate(&self) -> Result<(), ValidationError> {
        if self.max_cpus > 0 && self.max_cpus < self.cpus {
            Err(ValidationError::MaxCpus {
                max_cpus: self.max_cpus,
                cpus: self.cpus,
            })
        } else {
            Ok(())
        }
    }

    /// Renders `-smp`, or nothing when no CPU count is set.
    pub fn args(&self) -> Vec<String> {
        if self.cpus == 0 {
            return Vec::new();
        }
        let mut params = vec![self.cpus.to_string()];
        for (key, value) in [
            ("cores", self.cores),
            ("threads", self.threads),
            ("sockets", self.sockets),
            ("maxcpus", self.max_cpus),
        ] {
            if value > 0 {
                params.push(format!("{key}={value}"));
            }
        }
        flag("-smp", &params).into()
    }
}

/// Guest memory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Memory {
    /// Size with optional unit suffix, e.g. `4096` or `1G`.
    pub size: String,
    /// Hot-plug slots.
    pub slots: u8,
    /// Hot-plug ceiling.
    pub max_mem: String,
    /// Backing file for file-backed memory.
    pub path: String,
}

impl Memory {
    /// Renders `-m`, or nothing when no size is set.
    pub fn args(&self) -> Vec<String> {
        if self.size.is_empty() {
            return Vec::new();
        }
        let mut params = vec![self.size.clone()];
        if self.slots > 0 {
            params.push(format!("slots={}", self.slots));
        }
        if !self.max_mem.is_empty() {
            params.push(format!("maxmem={}", self.max_mem));
        }
        flag("-m", &params).into()
    }

    /// Renders the guest memory backend object and its attachment.
    ///
    /// # Arguments
    ///
    /// * `knobs` - Hugepage, file-backing, sharing, and preallocation switches.
    /// * `numa` - Attach as a NUMA node backend; otherwise set `memory-backend` on the machine.
    ///
    /// # Returns
    ///
    /// Nothing when no size is set or no memory switch asks for a backend.
    pub fn backend_args(&self, knobs: &Knobs, numa: bool) -> Vec<String> {
        if self.size.is_empty() || !knobs.wants_memory_backend() {
            return Vec::new();
        }
        let id = defaults::MEMORY_BACKEND_ID;
        let mut object = if knobs.hugepages {
            format!(
                "memory-backend-file,id={id},size={},mem-path={}",
                self.size,
                defaults::HUGEPAGES_PATH
            )
        } else if knobs.file_backed_mem && !self.path.is_empty() {
            format!(
                "memory-backend-file,id={id},size={},mem-path={}",
                self.size, self.path
            )
        } else {
            format!("memory-backend-ram,id={id},size={}", self.size)
        };
        if knobs.mem_shared {
            object.push_str(",share=on");
        }
        if knobs.mem_prealloc {
            object.push_str(",prealloc=on");
        }

        let mut tokens = vec!["-object".to_string(), object];
        if numa {
            tokens.push("-numa".to_string());
            tokens.push(format!("node,memdev={id}"));
        } else {
            tokens.push("-machine".to_string());
            tokens.push(format!("memory-backend={id}"));
        }
        tokens
    }
}

/// Direct kernel boot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Kernel {
    /// Kernel image.
    pub path: String,
    /// Initial ramdisk.
    pub initrd_path: String,
    /// Kernel command line.
    pub params: String,
}

impl Kernel {
    /// Renders `-kernel` with its ramdisk and command line, or nothing without a kernel.
    pub fn args(&self) -> Vec<String> {
        if self.path.is_empty() {
            return Vec::new();
        }
        let mut tokens = vec!["-kernel".to_string(), self.path.clone()];
        if !self.initrd_path.is_empty() {
            tokens.push("-initrd".to_string());
            tokens.push(self.initrd_path.clone());
        }
        if !self.params.is_empty() {
            tokens.push("-append".to_string());
            tokens.push(self.params.clone());
        }
        tokens
    }
}

/// Global boolean switches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Knobs {
    /// Skip the host's user configuration files.
    pub no_user_config: bool,
    /// Create no default devices.
    pub no_defaults: bool,
    /// Disable graphical output.
    pub no_graphic: bool,
    /// Detach from the terminal once started.
    pub daemonize: bool,
    /// Back guest memory with hugepages.
    pub hugepages: bool,
    /// Preallocate guest memory.
    pub mem_prealloc: bool,
    /// Back guest memory with `memory.path`.
    pub file_backed_mem: bool,
    /// Share guest memory with other processes.
    pub mem_shared: bool,
    /// Lock guest memory into RAM.
    pub mlock: bool,
    /// Start with the CPUs stopped.
    pub stopped: bool,
    /// Exit instead of rebooting.
    pub no_reboot: bool,
    /// Stop instead of exiting on guest shutdown.
    pub no_shutdown: bool,
    /// Route channel I/O devices through the platform IOMMU.
    pub iommu_platform: bool,
    /// Disable the HPET.
    pub no_hpet: bool,
    /// Write disk changes to temporary files.
    pub snapshot: bool,
}

impl Knobs {
    /// Returns whether any switch needs an explicit guest memory backend.
    pub const fn wants_memory_backend(&self) -> bool {
        self.hugepages || self.file_backed_mem || self.mem_shared || self.mem_prealloc
    }

    /// Renders the enabled switches in the hypervisor's expected order.
    pub fn args(&self) -> Vec<String> {
        let switches: [(bool, &[&str]); 10] = [
            (self.no_user_config, &["-no-user-config"]),
            (self.no_defaults, &["-nodefaults"]),
            (self.no_graphic, &["-nographic"]),
            (self.no_reboot, &["--no-reboot"]),
            (self.no_shutdown, &["--no-shutdown"]),
            (self.daemonize, &["-daemonize"]),
            (self.mlock, &["-overcommit", "mem-lock=on"]),
            (self.stopped, &["-S"]),
            (self.no_hpet, &["-no-hpet"]),
            (self.snapshot, &["-snapshot"]),
        ];
        switches
            .into_iter()
            .filter(|(enabled, _)| *enabled)
            .flat_map(|(_, tokens)| tokens.iter().map(ToString::to_string))
            .collect()
    }
}
