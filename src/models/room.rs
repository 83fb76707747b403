use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ANONYMOUS: &str = "Anonymous";

fn anonymous() -> String {
    ANONYMOUS.to_string()
}

/// A connected member of the room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub socket_id: String,
    #[serde(default = "anonymous")]
    pub username: String,
}

impl Participant {
    pub fn new(socket_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            socket_id: socket_id.into(),
            username: username.into(),
        }
    }
}

/// A file shared in the room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CodeFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_by: String,
}

impl CodeFile {
    /// Create a file with a freshly generated id.
    pub fn new(name: impl Into<String>, content: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: generate_file_id(),
            name: name.into(),
            content: content.into(),
            created_by: created_by.into(),
        }
    }

    /// Length of the content in UTF-16 code units, the unit cursor offsets
    /// are expressed in.
    pub fn utf16_len(&self) -> usize {
        self.content.encode_utf16().count()
    }
}

/// File ids are `file-<millis>-<random>`. The random suffix keeps ids unique
/// when two participants create a file within the same millisecond.
pub fn generate_file_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("file-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}
