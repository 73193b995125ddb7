//! SMBIOS tables.
//!
//! Each table renders as one `-smbios type=N,...` option listing only the fields that
//! are set; a table with no fields set renders nothing.

use serde::{Deserialize, Serialize};

use crate::common::{ValidationError, ValidationErrors};

/// Renders one table from its (key, value) pairs in order.
fn table(table_type: u8, fields: &[(&str, &str)]) -> Vec<String> {
    let params: Vec<String> = fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    if params.is_empty() {
        return Vec::new();
    }
    vec![
        "-smbios".to_string(),
        format!("type={table_type},{}", params.join(",")),
    ]
}

/// Returns the value of a leading, optionally signed decimal integer.
fn leading_int(text: &str) -> Option<(i64, &str)> {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let digits = unsigned.len() - unsigned.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let end = text.len() - unsigned.len() + digits;
    text[..end].parse().ok().map(|value| (value, &text[end..]))
}

/// Type 0: BIOS information.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbiosTableBios {
    /// Vendor string.
    pub vendor: String,
    /// Version string.
    pub version: String,
    /// Release date.
    pub date: String,
    /// Release as `<major>.<minor>`.
    pub release: String,
    /// UEFI support, `on` or `off` (any case).
    pub uefi: String,
}

impl SmbiosTableBios {
    fn validate(&self) -> Result<(), ValidationError> {
        const KIND: &str = "SMBIOS type 0";
        if !self.release.is_empty() {
            let well_formed = leading_int(&self.release)
                .and_then(|(_, rest)| rest.strip_prefix('.'))
                .and_then(leading_int)
                .is_some();
            if !well_formed {
                return Err(ValidationError::InvalidValue {
                    kind: KIND,
                    field: "release",
                    value: self.release.clone(),
                    expected: "<major>.<minor>",
                });
            }
        }
        if !self.uefi.is_empty() && !matches!(self.uefi.to_ascii_lowercase().as_str(), "on" | "off") {
            return Err(ValidationError::InvalidValue {
                kind: KIND,
                field: "uefi",
                value: self.uefi.clone(),
                expected: "'on' or 'off'",
            });
        }
        Ok(())
    }

    fn args(&self) -> Vec<String> {
        table(
            0,
            &[
                ("vendor", self.vendor.as_str()),
                ("version", self.version.as_str()),
                ("date", self.date.as_str()),
                ("release", self.release.as_str()),
                ("uefi", self.uefi.as_str()),
            ],
        )
    }
}

/// Type 1: system information.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbiosTableSystem {
    /// Manufacturer.
    pub manufacturer: String,
    /// Product name.
    pub product: String,
    /// Version.
    pub version: String,
    /// Serial number.
    pub serial: String,
    /// System UUID.
    pub uuid: String,
    /// SKU number.
    pub sku: String,
    /// Product family.
    pub family: String,
}

impl SmbiosTableSystem {
    fn args(&self) -> Vec<String> {
        table(
            1,
            &[
                ("manufacturer", self.manufacturer.as_str()),
                ("product", self.product.as_str()),
                ("version", self.version.as_str()),
                ("serial", self.serial.as_str()),
                ("uuid", self.uuid.as_str()),
                ("sku", self.sku.as_str()),
                ("family", self.family.as_str()),
            ],
        )
    }
}

/// Type 2: baseboard information.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbiosTableBaseboard {
    /// Manufacturer.
    pub manufacturer: String,
    /// Product name.
    pub product: String,
    /// Version.
    pub version: String,
    /// Serial number.
    pub serial: String,
    /// Asset tag.
    pub asset: String,
    /// Location in chassis.
    pub location: String,
}

impl SmbiosTableBaseboard {
    fn args(&self) -> Vec<String> {
        table(
            2,
            &[
                ("manufacturer", self.manufacturer.as_str()),
                ("product", self.product.as_str()),
                ("version", self.version.as_str()),
                ("serial", self.serial.as_str()),
                ("asset", self.asset.as_str()),
                ("location", self.location.as_str()),
            ],
        )
    }
}

/// Type 3: chassis information.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbiosTableChassis {
    /// Manufacturer.
    pub manufacturer: String,
    /// Version.
    pub version: String,
    /// Serial number.
    pub serial: String,
    /// Asset tag.
    pub asset: String,
    /// SKU number.
    pub sku: String,
}

impl SmbiosTableChassis {
    fn args(&self) -> Vec<String> {
        table(
            3,
            &[
                ("manufacturer", self.manufacturer.as_str()),
                ("version", self.version.as_str()),
                ("serial", self.serial.as_str()),
                ("asset", self.asset.as_str()),
                ("sku", self.sku.as_str()),
            ],
        )
    }
}

/// Type 4: processor information, one per socket.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SmbiosTableProcessor {
    /// Socket designation prefix.
    pub socket_prefix: String,
    /// Manufacturer.
    pub manufacturer: String,
    /// Version.
    pub version: String,
    /// Serial number.
    pub serial: String,
    /// Asset tag.
    pub asset: String,
    /// Part number.
    pub part: String,
}

impl SmbiosTableProcessor {
    fn args(&self) -> Vec<String> {
        table(
            4,
            &[
                ("sock_pfx", self.socket_prefix.as_str()),
                ("manufacturer", self.manufacturer.as_str()),
                ("version", self.version.as_str()),
                ("serial", self.serial.as_str()),
                ("asset", self.asset.as_str()),
                ("part", self.part.as_str()),
            ],
        )
    }
}

/// Type 17: memory device, one per DIMM.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SmbiosTableMemory {
    /// Device locator prefix.
    pub location_prefix: String,
    /// Bank locator.
    pub bank: String,
    /// Manufacturer.
    pub manufacturer: String,
    /// Serial number.
    pub serial: String,
    /// Asset tag.
    pub asset: String,
    /// Part number.
    pub part: String,
    /// Speed in MT/s; must start with a number.
    pub speed: String,
}

impl SmbiosTableMemory {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.speed.is_empty() || leading_int(&self.speed).is_some() {
            Ok(())
        } else {
            Err(ValidationError::InvalidValue {
                kind: "SMBIOS type 17",
                field: "speed",
                value: self.speed.clone(),
                expected: "a number",
            })
        }
    }

    fn args(&self) -> Vec<String> {
        table(
            17,
            &[
                ("loc_pfx", self.location_prefix.as_str()),
                ("bank", self.bank.as_str()),
                ("manufacturer", self.manufacturer.as_str()),
                ("serial", self.serial.as_str()),
                ("asset", self.asset.as_str()),
                ("part", self.part.as_str()),
                ("speed", self.speed.as_str()),
            ],
        )
    }
}

/// All SMBIOS settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbiosInfo {
    /// Binary table blob loaded before the individual tables.
    pub file: String,
    /// Type 0.
    pub bios: SmbiosTableBios,
    /// Type 1.
    pub system: SmbiosTableSystem,
    /// Type 2.
    pub baseboard: SmbiosTableBaseboard,
    /// Type 3.
    pub chassis: SmbiosTableChassis,
    /// Type 4 entries.
    pub processors: Vec<SmbiosTableProcessor>,
    /// Type 17 entries.
    pub memory: Vec<SmbiosTableMemory>,
}

impl SmbiosInfo {
    /// Records every malformed table.
    pub fn validate(&self, errors: &mut ValidationErrors) {
        errors.check(self.bios.validate());
        for memory in &self.memory {
            errors.check(memory.validate());
        }
    }

    /// Renders the blob file and then every table with at least one field set.
    pub fn args(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        if !self.file.is_empty() {
            tokens.push("-smbios".to_string());
            tokens.push(format!("file={}", self.file));
        }
        tokens.extend(self.bios.args());
        tokens.extend(self.system.args());
        tokens.extend(self.baseboard.args());
        tokens.extend(self.chassis.args());
        tokens.extend(self.processors.iter().flat_map(SmbiosTableProcessor::args));
        tokens.extend(self.memory.iter().flat_map(SmbiosTableMemory::args));
        tokens
    }
}
