//! Push-channel wire format.
//!
//! Every frame is a JSON envelope `{ "type": ..., "content": ... }` whose
//! `content` is itself a JSON document encoded as a string, so a frame is
//! decoded twice: once for the envelope and once for the typed payload.

use crate::{truncate_decimal, truncate_to_hundredths, ContainerType, FileOperation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed {kind} payload: {error}")]
    Payload {
        kind: &'static str,
        #[source]
        error: serde_json::Error,
    },
    #[error("unknown event type {0:?}")]
    UnknownType(String),
    #[error("{field} is not a number: {value:?}")]
    NotANumber { field: &'static str, value: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl Envelope {
    /// Builds an envelope by encoding `payload` into the `content` string.
    pub fn wrap<T: Serialize>(kind: &str, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: kind.to_string(),
            content: serde_json::to_string(payload)?,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A decoded push event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Logs {
        logs: Vec<String>,
    },
    JoinCode {
        join_code: String,
        container_name: String,
    },
    Metrics {
        cpu: f64,
        memory: f64,
    },
    PostStart {
        container_name: String,
    },
    ContainerReady {
        container_name: String,
        container_type: ContainerType,
    },
    PreStop {
        container_name: String,
        container_type: ContainerType,
        operation: FileOperation,
        /// Echo of the install request id, when the backend supplies one.
        request_id: Option<u64>,
    },
}

#[derive(Deserialize)]
struct LogsPayload {
    logs: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinCodePayload {
    join_code: String,
    container_name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricsPayload {
    cpu_utilization: Numeric,
    memory_utilization: Numeric,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostStartPayload {
    container_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerReadyPayload {
    container_name: String,
    container_type: ContainerType,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreStopPayload {
    #[serde(default)]
    container_name: String,
    container_type: ContainerType,
    #[serde(default = "unspecified_operation")]
    operation: FileOperation,
    #[serde(default)]
    request_id: Option<u64>,
}

fn unspecified_operation() -> FileOperation {
    FileOperation::Other
}

fn payload<T: DeserializeOwned>(kind: &'static str, content: &str) -> Result<T, DecodeError> {
    serde_json::from_str(content).map_err(|error| DecodeError::Payload { kind, error })
}

fn numeric(field: &'static str, value: Numeric) -> Result<f64, DecodeError> {
    match value {
        Numeric::Number(n) => Ok(truncate_to_hundredths(n)),
        Numeric::Text(text) => {
            truncate_decimal(&text).ok_or(DecodeError::NotANumber { field, value: text })
        }
    }
}

impl PushEvent {
    /// Decodes a raw text frame.
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(frame).map_err(DecodeError::Envelope)?;
        Self::from_envelope(&envelope)
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self, DecodeError> {
        let content = envelope.content.as_str();
        let event = match envelope.kind.as_str() {
            "Logs" => {
                let p: LogsPayload = payload("Logs", content)?;
                PushEvent::Logs { logs: p.logs }
            }
            "JoinCode" => {
                let p: JoinCodePayload = payload("JoinCode", content)?;
                PushEvent::JoinCode {
                    join_code: p.join_code,
                    container_name: p.container_name,
                }
            }
            "Metrics" => {
                let p: MetricsPayload = payload("Metrics", content)?;
                PushEvent::Metrics {
                    cpu: numeric("cpuUtilization", p.cpu_utilization)?,
                    memory: numeric("memoryUtilization", p.memory_utilization)?,
                }
            }
            "PostStart" => {
                let p: PostStartPayload = payload("PostStart", content)?;
                PushEvent::PostStart {
                    container_name: p.container_name,
                }
            }
            "ContainerReady" => {
                let p: ContainerReadyPayload = payload("ContainerReady", content)?;
                PushEvent::ContainerReady {
                    container_name: p.container_name,
                    container_type: p.container_type,
                }
            }
            "PreStop" => {
                let p: PreStopPayload = payload("PreStop", content)?;
                PushEvent::PreStop {
                    container_name: p.container_name,
                    container_type: p.container_type,
                    operation: p.operation,
                    request_id: p.request_id,
                }
            }
            other => return Err(DecodeError::UnknownType(other.to_string())),
        };
        Ok(event)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::Logs { .. } => "Logs",
            PushEvent::JoinCode { .. } => "JoinCode",
            PushEvent::Metrics { .. } => "Metrics",
            PushEvent::PostStart { .. } => "PostStart",
            PushEvent::ContainerReady { .. } => "ContainerReady",
            PushEvent::PreStop { .. } => "PreStop",
        }
    }
}
