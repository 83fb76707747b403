//! Remote cursors as the editor surface should draw them.
//!
//! Cursor offsets refer to the content their owner saw when the event was
//! produced. By the time we render, the file may have shrunk, so every
//! position is clamped into the current content.

use crate::models::CursorPosition;
use crate::session::state::SessionState;

/// Hue used when a cursor has no username to hash.
const DEFAULT_HUE: u16 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCursor {
    pub socket_id: String,
    pub username: String,
    pub position: CursorPosition,
    /// HSL hue, stable per username.
    pub hue: u16,
}

impl RenderedCursor {
    /// CSS-style colour string for the cursor and its label.
    pub fn color(&self) -> String {
        format!("hsl({}, 80%, 60%)", self.hue)
    }
}

/// Remote cursors on the active file, clamped to its current length.
///
/// The local socket's cursor and cursors on files that no longer exist are
/// never returned. Output is sorted by socket id.
pub fn visible_cursors(state: &SessionState) -> Vec<RenderedCursor> {
    let Some(active) = state.active_file() else {
        return Vec::new();
    };
    let len = active.utf16_len();

    let mut cursors: Vec<RenderedCursor> = state
        .cursors()
        .values()
        .filter(|entry| entry.file_id == active.id && !state.is_local(&entry.owner_socket_id))
        .map(|entry| RenderedCursor {
            socket_id: entry.owner_socket_id.clone(),
            username: entry.username.clone(),
            position: entry.position.clamped(len),
            hue: cursor_hue(&entry.username),
        })
        .collect();
    cursors.sort_by(|a, b| a.socket_id.cmp(&b.socket_id));
    cursors
}

/// Stable hue for a username: a 31-multiplier string hash over UTF-16 units.
pub fn cursor_hue(username: &str) -> u16 {
    if username.is_empty() {
        return DEFAULT_HUE;
    }
    // Only the shift truncates to 32 bits; the rest of the sum is unbounded
    let mut hash: i64 = 0;
    for unit in username.encode_utf16() {
        hash = ((hash as i32).wrapping_shl(5) as i64) - hash + unit as i64;
    }
    (hash.unsigned_abs() % 360) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{utf16_to_byte, CodeFile, CursorChangePayload, FileChangePayload, FileCreatedPayload, ServerEvent};
    use crate::session::engine::{DefaultFile, LocalIntent, Reconciler};

    fn engine_with_file(content: &str) -> Reconciler {
        let mut engine = Reconciler::new(SessionState::new("room", "ann", "local"), DefaultFile::default());
        engine.apply_remote(ServerEvent::FileCreated(FileCreatedPayload {
            room_id: "room".to_string(),
            file: CodeFile {
                id: "F1".to_string(),
                name: "a.js".to_string(),
                content: content.to_string(),
                created_by: "bob".to_string(),
            },
        }));
        engine.apply_local(LocalIntent::SelectFile("F1".to_string()));
        engine
    }

    #[test]
    fn test_stale_cursor_is_clamped_after_shrink() {
        let mut engine = engine_with_file("hello world");
        engine.apply_remote(ServerEvent::CursorChange(CursorChangePayload {
            room_id: "room".to_string(),
            file_id: "F1".to_string(),
            position: CursorPosition { from: 5, to: 5, head: 5, anchor: 5 },
            socket_id: "x".to_string(),
            username: Some("Xavier".to_string()),
        }));
        engine.apply_remote(ServerEvent::FileChange(FileChangePayload {
            room_id: "room".to_string(),
            file_id: "F1".to_string(),
            content: "abc".to_string(),
            cursor_position: None,
            socket_id: Some("y".to_string()),
            username: None,
        }));

        let cursors = visible_cursors(engine.state());
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].position, CursorPosition::caret(3));
        assert!(cursors[0].position.fits(3));
    }

    #[test]
    fn test_cursors_on_other_files_are_hidden() {
        let mut engine = engine_with_file("abc");
        engine.apply_remote(ServerEvent::CursorChange(CursorChangePayload {
            room_id: "room".to_string(),
            file_id: "F2".to_string(),
            position: CursorPosition::caret(1),
            socket_id: "x".to_string(),
            username: None,
        }));
        assert!(visible_cursors(engine.state()).is_empty());
    }

    #[test]
    fn test_no_active_file_renders_nothing() {
        let state = SessionState::new("room", "ann", "local");
        assert!(visible_cursors(&state).is_empty());
    }

    #[test]
    fn test_cursor_hue_is_stable() {
        assert_eq!(cursor_hue(""), DEFAULT_HUE);
        // "a" hashes to 97
        assert_eq!(cursor_hue("a"), 97);
        // "ab": 98 + (97 << 5) - 97 = 3105 -> 3105 % 360 = 225
        assert_eq!(cursor_hue("ab"), 225);
        assert_eq!(cursor_hue("Ann"), 105);
    }

    #[test]
    fn test_cursor_hue_matches_browser_peers_for_long_names() {
        assert_eq!(cursor_hue("Prasad Hiwarkhede"), 267);
        assert_eq!(cursor_hue("alice@example.com"), 195);
        assert_eq!(cursor_hue("😀"), 259);
    }

    #[test]
    fn test_offsets_count_utf16_units() {
        let mut engine = engine_with_file("😀ab");
        engine.apply_remote(ServerEvent::CursorChange(CursorChangePayload {
            room_id: "room".to_string(),
            file_id: "F1".to_string(),
            position: CursorPosition::caret(2),
            socket_id: "x".to_string(),
            username: None,
        }));
        let cursors = visible_cursors(engine.state());
        assert_eq!(cursors[0].position, CursorPosition::caret(2));
        assert_eq!(utf16_to_byte("😀ab", cursors[0].position.head), "😀".len());

        // The emoji is two units wide, so the end of the file is 4
        engine.apply_remote(ServerEvent::CursorChange(CursorChangePayload {
            room_id: "room".to_string(),
            file_id: "F1".to_string(),
            position: CursorPosition::caret(9),
            socket_id: "x".to_string(),
            username: None,
        }));
        assert_eq!(visible_cursors(engine.state())[0].position, CursorPosition::caret(4));
    }
}
