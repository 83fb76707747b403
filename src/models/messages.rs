use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ApplicationError, CodeFile, CursorPosition, Participant, ProtocolError, RemoteCursor};

/// Every event name that travels over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Join,
    Joined,
    FirstJoin,
    Disconnected,
    FileChange,
    CursorChange,
    FileCreated,
    ExecuteCode,
    ExecutionResult,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::Join,
        EventKind::Joined,
        EventKind::FirstJoin,
        EventKind::Disconnected,
        EventKind::FileChange,
        EventKind::CursorChange,
        EventKind::FileCreated,
        EventKind::ExecuteCode,
        EventKind::ExecutionResult,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Join => "join",
            EventKind::Joined => "joined",
            EventKind::FirstJoin => "first-join",
            EventKind::Disconnected => "disconnected",
            EventKind::FileChange => "file-change",
            EventKind::CursorChange => "cursor-change",
            EventKind::FileCreated => "file-created",
            EventKind::ExecuteCode => "execute-code",
            EventKind::ExecutionResult => "execution-result",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        EventKind::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn anonymous() -> String {
    crate::models::ANONYMOUS.to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub room_id: String,
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPayload {
    #[serde(default)]
    pub clients: Vec<Participant>,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<CodeFile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursors: Option<HashMap<String, RemoteCursor>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FirstJoinPayload {
    #[serde(default)]
    pub clients: Vec<Participant>,
    #[serde(default)]
    pub files: Vec<CodeFile>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectedPayload {
    pub socket_id: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileChangePayload {
    #[serde(default)]
    pub room_id: String,
    pub file_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<CursorPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CursorChangePayload {
    #[serde(default)]
    pub room_id: String,
    pub file_id: String,
    pub position: CursorPosition,
    pub socket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileCreatedPayload {
    #[serde(default)]
    pub room_id: String,
    pub file: CodeFile,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCodePayload {
    pub room_id: String,
    pub file_id: String,
    pub code: String,
    pub file_name: String,
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResultPayload {
    #[serde(default)]
    pub result: ExecutionOutcome,
    #[serde(default = "anonymous")]
    pub username: String,
}

impl ExecutionResultPayload {
    /// Output on success, an `ApplicationError` when the server reported one.
    pub fn into_result(self) -> Result<String, ApplicationError> {
        match self.result.error {
            Some(message) => Err(ApplicationError::Execution {
                username: self.username,
                message,
            }),
            None => Ok(self.result.output.unwrap_or_default()),
        }
    }
}

/// Events this client sends.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join")]
    Join(JoinPayload),
    #[serde(rename = "file-change")]
    FileChange(FileChangePayload),
    #[serde(rename = "cursor-change")]
    CursorChange(CursorChangePayload),
    #[serde(rename = "file-created")]
    FileCreated(FileCreatedPayload),
    #[serde(rename = "execute-code")]
    ExecuteCode(ExecuteCodePayload),
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Join(_) => EventKind::Join,
            ClientEvent::FileChange(_) => EventKind::FileChange,
            ClientEvent::CursorChange(_) => EventKind::CursorChange,
            ClientEvent::FileCreated(_) => EventKind::FileCreated,
            ClientEvent::ExecuteCode(_) => EventKind::ExecuteCode,
        }
    }
}

/// Events the server pushes to this client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "joined")]
    Joined(JoinedPayload),
    #[serde(rename = "first-join")]
    FirstJoin(FirstJoinPayload),
    #[serde(rename = "disconnected")]
    Disconnected(DisconnectedPayload),
    #[serde(rename = "file-change")]
    FileChange(FileChangePayload),
    #[serde(rename = "cursor-change")]
    CursorChange(CursorChangePayload),
    #[serde(rename = "file-created")]
    FileCreated(FileCreatedPayload),
    #[serde(rename = "execution-result")]
    ExecutionResult(ExecutionResultPayload),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Joined(_) => EventKind::Joined,
            ServerEvent::FirstJoin(_) => EventKind::FirstJoin,
            ServerEvent::Disconnected(_) => EventKind::Disconnected,
            ServerEvent::FileChange(_) => EventKind::FileChange,
            ServerEvent::CursorChange(_) => EventKind::CursorChange,
            ServerEvent::FileCreated(_) => EventKind::FileCreated,
            ServerEvent::ExecutionResult(_) => EventKind::ExecutionResult,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

fn payload<T: DeserializeOwned>(kind: EventKind, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::Malformed {
        event: kind.as_str(),
        source,
    })
}

/// Decode a text frame from the server.
///
/// Unknown event names and malformed payloads are errors here; callers log
/// and drop them so that no session mutator ever sees a broken event.
pub fn decode_server_frame(text: &str) -> Result<ServerEvent, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Envelope)?;
    let kind = EventKind::from_wire(&envelope.event)
        .ok_or_else(|| ProtocolError::UnknownEvent(envelope.event.clone()))?;
    let data = envelope.data;

    let event = match kind {
        EventKind::Joined => ServerEvent::Joined(payload(kind, data)?),
        EventKind::FirstJoin => ServerEvent::FirstJoin(payload(kind, data)?),
        EventKind::Disconnected => ServerEvent::Disconnected(payload(kind, data)?),
        EventKind::FileChange => ServerEvent::FileChange(payload(kind, data)?),
        EventKind::CursorChange => ServerEvent::CursorChange(payload(kind, data)?),
        EventKind::FileCreated => ServerEvent::FileCreated(payload(kind, data)?),
        EventKind::ExecutionResult => ServerEvent::ExecutionResult(payload(kind, data)?),
        // Client-only events never come back from the server
        EventKind::Join | EventKind::ExecuteCode => {
            return Err(ProtocolError::UnknownEvent(envelope.event));
        }
    };
    Ok(event)
}

pub fn encode_client_event(event: &ClientEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|source| ProtocolError::Encode {
        event: event.kind().as_str(),
        source,
    })
}

pub fn encode_server_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|source| ProtocolError::Encode {
        event: event.kind().as_str(),
        source,
    })
}
