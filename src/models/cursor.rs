use serde::{Deserialize, Serialize};

/// A caret/selection in a file, as offsets into its content counted in
/// UTF-16 code units, the unit browser editors report.
///
/// Offsets are signed on the wire so that a bogus negative value from a peer
/// can be clamped instead of failing the whole frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPosition {
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
    #[serde(default)]
    pub head: i64,
    #[serde(default)]
    pub anchor: i64,
}

impl CursorPosition {
    /// A collapsed selection at `offset`.
    pub fn caret(offset: i64) -> Self {
        Self::selection(offset, offset)
    }

    /// A selection from `anchor` to `head`; `from`/`to` are derived.
    pub fn selection(anchor: i64, head: i64) -> Self {
        Self {
            from: anchor.min(head),
            to: anchor.max(head),
            head,
            anchor,
        }
    }

    /// Whether every offset lies within `0..=len`.
    pub fn fits(&self, len: usize) -> bool {
        let len = len as i64;
        [self.from, self.to, self.head, self.anchor]
            .iter()
            .all(|v| (0..=len).contains(v))
    }

    /// Copy with every offset clamped into `0..=len`.
    pub fn clamped(&self, len: usize) -> Self {
        let len = len as i64;
        let clamp = |v: i64| v.clamp(0, len);
        Self {
            from: clamp(self.from),
            to: clamp(self.to),
            head: clamp(self.head),
            anchor: clamp(self.anchor),
        }
    }
}

/// Byte index into `text` for a UTF-16 offset. Offsets past the end map to
/// `text.len()`; an offset inside a surrogate pair moves to the next char.
pub fn utf16_to_byte(text: &str, offset: i64) -> usize {
    let mut units = 0i64;
    for (idx, ch) in text.char_indices() {
        if units >= offset {
            return idx;
        }
        units += ch.len_utf16() as i64;
    }
    text.len()
}

/// The last known cursor of a remote participant. One per participant per room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorEntry {
    pub owner_socket_id: String,
    pub file_id: String,
    pub position: CursorPosition,
    pub username: String,
}

/// Cursor as it appears in the `joined` snapshot, keyed by owner socket id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCursor {
    pub file_id: String,
    #[serde(default)]
    pub position: CursorPosition,
    #[serde(default)]
    pub username: Option<String>,
}
