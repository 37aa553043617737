//! Data model and push-channel protocol shared by the dashboard library,
//! its binary and the workspace tests.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod protocol;

pub use protocol::{DecodeError, Envelope, PushEvent};

/// Number of metric samples kept for the utilization chart.
pub const METRICS_CAPACITY: usize = 20;
/// Largest file accepted by any upload form.
pub const MAX_UPLOAD_BYTES: u64 = 30 * 1024 * 1024;
/// Wall-clock limit for a single presigned upload.
pub const UPLOAD_TIMEOUT_SECS: u64 = 30;
/// Marker the game server puts in automatic backup file names.
pub const BACKUP_AUTO_MARKER: &str = "_backup_auto-";
/// Seed file extension of a world save pair.
pub const SEED_EXTENSION: &str = ".fwl";
/// World data extension of a world save pair.
pub const WORLD_EXTENSION: &str = ".db";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Scheduling,
    Loading,
    Running,
    Terminating,
    Stopped,
    Terminated,
    #[serde(other)]
    Unknown,
}

impl ServerState {
    /// A start action is only offered for servers that are fully down.
    pub fn can_start(self) -> bool {
        matches!(self, ServerState::Stopped | ServerState::Terminated)
    }

    pub fn can_stop(self) -> bool {
        matches!(self, ServerState::Running | ServerState::Loading)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServerState::Scheduling => "scheduling",
            ServerState::Loading => "loading",
            ServerState::Running => "running",
            ServerState::Terminating => "terminating",
            ServerState::Stopped => "stopped",
            ServerState::Terminated => "terminated",
            ServerState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container kind named by lifecycle events.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ContainerType {
    #[serde(rename = "server")]
    Server,
    #[serde(rename = "file-install")]
    FileInstall,
    #[serde(other)]
    Other,
}

/// Operation carried out by a file-install container.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Write,
    Copy,
    Delete,
    #[serde(other)]
    Other,
}

impl FileOperation {
    /// Whether a finished operation leaves the file present on the server.
    pub fn leaves_installed(self) -> bool {
        self == FileOperation::Write
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Modifier {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WorldDetails {
    pub name: String,
    pub world: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub enable_crossplay: bool,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub save_interval_seconds: u64,
    #[serde(default)]
    pub backup_count: u32,
    #[serde(default)]
    pub initial_backup_seconds: u64,
    #[serde(default)]
    pub backup_interval_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Server {
    pub deployment_name: String,
    #[serde(default)]
    pub server_ip: String,
    #[serde(default)]
    pub server_port: u16,
    pub state: ServerState,
    pub world_details: WorldDetails,
    #[serde(rename = "joinCode", default, skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_pvc_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Mod {
    pub id: String,
    /// Object-store key of the mod archive.
    #[serde(default)]
    pub key: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "default")]
    pub is_default: bool,
    pub installed: bool,
    pub installing: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub key: String,
    pub name: String,
    pub size: u64,
    pub installed: bool,
    pub installing: bool,
    #[serde(default)]
    pub content: Option<String>,
}

/// A world save in object storage, primary or replica.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Backup {
    pub key: String,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
    pub installed: bool,
    pub installing: bool,
}

impl Backup {
    pub fn new(key: impl Into<String>, file_size: u64) -> Self {
        Self {
            key: key.into(),
            file_size,
            installed: false,
            installing: false,
        }
    }

    pub fn reset(&mut self) {
        self.installed = false;
        self.installing = false;
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MetricSample {
    pub cpu: f64,
    pub memory: f64,
    /// Milliseconds since the Unix epoch at which the sample arrived.
    pub time: u64,
}

/// Truncates (does not round) to two decimal places.
///
/// The cut is made on the shortest decimal rendering of `value`, so a reading
/// such as `0.29` stays `0.29` instead of drifting to `0.28` through binary
/// multiplication.
pub fn truncate_to_hundredths(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    truncate_decimal(&value.to_string()).unwrap_or(value)
}

/// Parses decimal text, keeping at most two digits after the `.`.
/// Returns `None` when the text is not a number.
pub fn truncate_decimal(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.contains(['e', 'E']) {
        return text.parse::<f64>().ok().map(truncate_to_hundredths);
    }

    let cut = match text.split_once('.') {
        Some((whole, fraction)) => {
            let digits = fraction
                .char_indices()
                .nth(2)
                .map_or(fraction.len(), |(i, _)| i);
            &text[..whole.len() + 1 + digits]
        }
        None => text,
    };
    cut.parse().ok()
}

/// Text before the first `.` of a file name, used to pair seed and world files.
pub fn base_name(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// Last `/`-separated segment of an object key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
