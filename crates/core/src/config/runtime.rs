//! Clock, migration, firmware configuration, IO threads, and control sockets.

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::builder::BuildContext;
use crate::common::ValidationError;
use crate::devices::traits::{flag, require};

/// Reference point of the guest clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtcBase {
    /// Coordinated universal time.
    #[default]
    Utc,
    /// Host local time.
    Localtime,
}

impl RtcBase {
    /// Keyword used on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Utc => "utc",
            Self::Localtime => "localtime",
        }
    }
}

/// Real-time clock settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rtc {
    /// Clock base.
    pub base: RtcBase,
    /// Clock source: `host`, `rt`, or `vm`.
    pub clock: String,
    /// Drift compensation: `slew` or `none`.
    pub driftfix: String,
}

impl Rtc {
    /// Returns `true` when both the clock source and the drift fix are recognised.
    pub fn is_valid(&self) -> bool {
        matches!(self.clock.as_str(), "host" | "rt" | "vm")
            && matches!(self.driftfix.as_str(), "slew" | "none")
    }

    /// Renders `-rtc`. Callers check [`Rtc::is_valid`] first.
    pub fn args(&self) -> Vec<String> {
        let mut params = vec![format!("base={}", self.base.as_str())];
        if !self.driftfix.is_empty() {
            params.push(format!("driftfix={}", self.driftfix));
        }
        if !self.clock.is_empty() {
            params.push(format!("clock={}", self.clock));
        }
        flag("-rtc", &params).into()
    }
}

/// Incoming migration source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Incoming {
    /// No incoming migration.
    #[default]
    None,
    /// Migration stream on an inherited host descriptor.
    Fd {
        /// Host descriptor; registered in the run's descriptor table.
        fd: i32,
    },
    /// Migration stream produced by a shell command.
    Exec {
        /// Command whose output is the stream.
        command: String,
    },
    /// Wait for the URI to be supplied over QMP.
    Defer,
}

impl Incoming {
    /// Renders `-S -incoming URI`, registering the descriptor of an `fd` source.
    pub fn args(&self, ctx: &mut BuildContext) -> Vec<String> {
        let uri = match self {
            Self::None => return Vec::new(),
            Self::Exec { command } => format!("exec:{command}"),
            Self::Fd { fd } => {
                let child = ctx.append_fds(&[*fd]);
                format!("fd:{}", child.first().copied().unwrap_or_default())
            }
            Self::Defer => "defer".to_string(),
        };
        vec!["-S".to_string(), "-incoming".to_string(), uri]
    }
}

/// An IO thread object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoThread {
    /// Thread identifier; the entry is skipped when empty.
    pub id: String,
}

/// A firmware configuration blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FwCfg {
    /// Item name, e.g. `opt/com.example/config`.
    pub name: String,
    /// Host file with the contents.
    pub file: String,
    /// Inline contents.
    #[serde(rename = "string")]
    pub contents: String,
}

impl FwCfg {
    /// Needs a name and exactly one of file or string.
    pub fn validate(&self) -> Result<(), ValidationError> {
        const KIND: &str = "FwCfg";
        require(KIND, "name", &self.name)?;
        match (self.file.is_empty(), self.contents.is_empty()) {
            (true, true) => Err(ValidationError::OneRequired {
                kind: KIND,
                first: "file",
                second: "string",
            }),
            (false, false) => Err(ValidationError::Exclusive {
                kind: KIND,
                first: "file",
                second: "string",
            }),
            _ => Ok(()),
        }
    }

    /// Renders this entry's own `-fw_cfg`.
    pub fn args(&self) -> Vec<String> {
        let mut params = vec![format!("name={}", self.name)];
        if !self.file.is_empty() {
            params.push(format!("file={}", self.file));
        }
        if !self.contents.is_empty() {
            params.push(format!("string={}", self.contents));
        }
        flag("-fw_cfg", &params).into()
    }
}

/// A QMP control socket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QmpSocket {
    /// Socket family; only `unix` is supported.
    #[serde(rename = "type")]
    pub socket_type: String,
    /// Socket path.
    pub name: String,
    /// Listen instead of connecting.
    pub server: bool,
    /// Do not wait for a client before starting (servers only).
    pub no_wait: bool,
}

impl Default for QmpSocket {
    fn default() -> Self {
        Self {
            socket_type: defaults::QMP_SOCKET_TYPE.to_string(),
            name: String::new(),
            server: false,
            no_wait: false,
        }
    }
}

impl QmpSocket {
    /// Returns `true` for a unix-domain socket.
    pub fn is_unix(&self) -> bool {
        self.socket_type == defaults::QMP_SOCKET_TYPE
    }

    /// Needs a type and a name; the type must be `unix`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        const KIND: &str = "QMPSocket";
        require(KIND, "type", &self.socket_type)?;
        require(KIND, "name", &self.name)?;
        if self.is_unix() {
            Ok(())
        } else {
            Err(ValidationError::InvalidValue {
                kind: KIND,
                field: "type",
                value: self.socket_type.clone(),
                expected: "'unix'",
            })
        }
    }

    /// Renders `-qmp`.
    pub fn args(&self) -> Vec<String> {
        let mut params = vec![format!("{}:{}", self.socket_type, self.name)];
        if self.server {
            params.push("server=on".to_string());
            if self.no_wait {
                params.push("wait=off".to_string());
            }
        }
        flag("-qmp", &params).into()
    }
}
