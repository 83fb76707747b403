//! Line-oriented console for a session: commands on stdin, rendering on
//! stdout. Logs go to stderr so the two do not interleave.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::{utf16_to_byte, CursorPosition};
use crate::session::{
    colorize, EditorUpdate, LocalIntent, Notice, NoticeLevel, RenderedCursor, SessionState, Surface,
    TerminalFrame,
};

pub const HELP: &str = "commands: :new <name> | :open <name|id> | :set <text> | :append <text> | \
:caret <offset> [anchor] | :run | :clear | :quit";

/// What the console last showed of the editor. Commands are resolved
/// against it, the way a widget edits the document it displays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorView {
    pub file_id: Option<String>,
    pub content: String,
    /// (id, name) of every file in the room
    pub files: Vec<(String, String)>,
}

impl EditorView {
    fn capture(state: &SessionState) -> Self {
        Self {
            file_id: state.active_file_id().map(str::to_string),
            content: state.active_file().map(|f| f.content.clone()).unwrap_or_default(),
            files: state.files().iter().map(|f| (f.id.clone(), f.name.clone())).collect(),
        }
    }
}

pub type SharedView = Arc<Mutex<EditorView>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Intent(LocalIntent),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', try :help")]
    Unknown(String),
    #[error("{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("no file is open")]
    NoActiveFile,
    #[error("invalid offset '{0}'")]
    InvalidOffset(String),
}

/// Parse one input line. Blank lines yield nothing.
pub fn parse_command(line: &str, view: &EditorView) -> Result<Option<Command>, CommandError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let (name, rest) = match line.split_once(' ') {
        Some((name, rest)) => (name, rest),
        None => (line, ""),
    };

    let command = match name {
        ":new" => Command::Intent(LocalIntent::CreateFile {
            name: required(":new", rest)?.trim().to_string(),
            content: String::new(),
        }),
        ":open" => {
            let wanted = required(":open", rest)?.trim();
            let id = view
                .files
                .iter()
                .find(|(_, name)| name == wanted)
                .map(|(id, _)| id.clone())
                .unwrap_or_else(|| wanted.to_string());
            Command::Intent(LocalIntent::SelectFile(id))
        }
        ":set" => edit(view, unescape(rest))?,
        ":append" => edit(view, format!("{}{}", view.content, unescape(required(":append", rest)?)))?,
        ":caret" => {
            let mut args = rest.split_whitespace();
            let head = offset(args.next().ok_or(CommandError::MissingArgument(":caret"))?)?;
            let anchor = args.next().map(offset).transpose()?.unwrap_or(head);
            Command::Intent(LocalIntent::Editor(EditorUpdate::CaretMoved {
                selection: CursorPosition::selection(anchor, head),
            }))
        }
        ":run" => Command::Intent(LocalIntent::Run),
        ":clear" => Command::Intent(LocalIntent::ClearTerminal),
        ":help" => Command::Help,
        ":quit" | ":q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn required<'a>(command: &'static str, rest: &'a str) -> Result<&'a str, CommandError> {
    if rest.trim().is_empty() {
        Err(CommandError::MissingArgument(command))
    } else {
        Ok(rest)
    }
}

fn offset(raw: &str) -> Result<i64, CommandError> {
    match raw.parse::<i64>() {
        Ok(value) if value >= 0 => Ok(value),
        _ => Err(CommandError::InvalidOffset(raw.to_string())),
    }
}

fn edit(view: &EditorView, content: String) -> Result<Command, CommandError> {
    let file_id = view.file_id.as_deref().ok_or(CommandError::NoActiveFile)?;
    let caret = CursorPosition::caret(content.encode_utf16().count() as i64);
    Ok(Command::Intent(LocalIntent::Editor(EditorUpdate::from_widget(
        file_id,
        content != view.content,
        &content,
        caret,
    ))))
}

fn unescape(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\t", "\t")
}

/// Read commands from stdin until `:quit` or end of input. Dropping the
/// sender on return ends the session.
pub fn spawn_stdin_reader(view: SharedView, intents: mpsc::Sender<LocalIntent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            };
            let parsed = {
                let view = view.lock();
                parse_command(&line, &view)
            };
            match parsed {
                Ok(Some(Command::Intent(intent))) => {
                    if intents.send(intent).await.is_err() {
                        break;
                    }
                }
                Ok(Some(Command::Help)) => println!("{}", HELP),
                Ok(Some(Command::Quit)) => break,
                Ok(None) => {}
                Err(e) => println!("! {}", e),
            }
        }
        debug!("Input closed");
    })
}

/// Renders the session as text. Status and file content are only
/// reprinted when they change.
pub struct ConsoleSurface<W: Write> {
    out: W,
    view: SharedView,
    last_status: String,
    last_content: Option<(String, String)>,
}

impl<W: Write> ConsoleSurface<W> {
    pub fn new(out: W, view: SharedView) -> Self {
        Self {
            out,
            view,
            last_status: String::new(),
            last_content: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            debug!("Console write failed: {}", e);
        }
    }
}

pub fn status_line(state: &SessionState, cursors: &[RenderedCursor]) -> String {
    let users: Vec<&str> = state.participants().iter().map(|p| p.username.as_str()).collect();
    let file = state.active_file().map(|f| f.name.as_str()).unwrap_or("-");
    let mut line = format!(
        "[{}] users: {} | file: {} ({} files)",
        state.room_id(),
        if users.is_empty() { "-".to_string() } else { users.join(", ") },
        file,
        state.files().len()
    );
    if !cursors.is_empty() {
        let marks: Vec<String> = cursors
            .iter()
            .map(|c| {
                if c.position.anchor == c.position.head {
                    format!("{}@{}", c.username, c.position.head)
                } else {
                    format!("{}@{}..{}", c.username, c.position.from, c.position.to)
                }
            })
            .collect();
        line.push_str(&format!(" | cursors: {}", marks.join(", ")));
    }
    line
}

/// File content with a `[name]` marker at each remote caret.
pub fn annotate(content: &str, cursors: &[RenderedCursor]) -> String {
    let mut marks: Vec<(usize, &str)> = cursors
        .iter()
        .map(|c| (utf16_to_byte(content, c.position.head), c.username.as_str()))
        .collect();
    // Insert back to front so earlier byte indices stay valid
    marks.sort_by(|a, b| b.0.cmp(&a.0));

    let mut annotated = content.to_string();
    for (at, name) in marks {
        annotated.insert_str(at, &format!("[{}]", name));
    }
    annotated
}

impl<W: Write> Surface for ConsoleSurface<W> {
    fn notify(&mut self, notice: &Notice) {
        let tag = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Error => "error",
        };
        self.emit(&format!("({}) {}", tag, notice.message));
    }

    fn render(&mut self, state: &SessionState, cursors: &[RenderedCursor]) {
        *self.view.lock() = EditorView::capture(state);

        let status = status_line(state, cursors);
        if status != self.last_status {
            self.emit(&status);
            self.last_status = status;
        }

        let shown = state
            .active_file()
            .map(|f| (f.id.clone(), annotate(&f.content, cursors)));
        if shown != self.last_content {
            if let Some((_, content)) = &shown {
                self.emit(&format!("----\n{}\n----", content));
            }
            self.last_content = shown;
        }
    }

    fn write_terminal(&mut self, frame: TerminalFrame) {
        match frame {
            TerminalFrame::Append(text) => self.emit(&colorize(&text)),
            TerminalFrame::Reset(text) => {
                self.emit("==== terminal ====");
                self.emit(&colorize(&text));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> EditorView {
        EditorView {
            file_id: Some("f1".to_string()),
            content: "ab".to_string(),
            files: vec![
                ("f1".to_string(), "main.js".to_string()),
                ("f2".to_string(), "util.js".to_string()),
            ],
        }
    }

    fn intent(line: &str) -> LocalIntent {
        match parse_command(line, &view()) {
            Ok(Some(Command::Intent(intent))) => intent,
            other => panic!("expected intent for {:?}, got {:?}", line, other),
        }
    }

    #[test]
    fn test_blank_line_is_nothing() {
        assert_eq!(parse_command("   ", &view()), Ok(None));
    }

    #[test]
    fn test_open_resolves_names_then_ids() {
        assert_eq!(intent(":open util.js"), LocalIntent::SelectFile("f2".to_string()));
        assert_eq!(intent(":open f1"), LocalIntent::SelectFile("f1".to_string()));
    }

    #[test]
    fn test_append_edits_active_file() {
        assert_eq!(
            intent(":append c"),
            LocalIntent::Editor(EditorUpdate::Edited {
                file_id: "f1".to_string(),
                content: "abc".to_string(),
                selection: CursorPosition::caret(3),
            })
        );
    }

    #[test]
    fn test_set_unescapes_newlines() {
        match intent(":set a\\nb") {
            LocalIntent::Editor(EditorUpdate::Edited { content, .. }) => assert_eq!(content, "a\nb"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_to_same_content_is_a_caret_move() {
        assert_eq!(
            intent(":set ab"),
            LocalIntent::Editor(EditorUpdate::CaretMoved {
                selection: CursorPosition::caret(2)
            })
        );
    }

    #[test]
    fn test_caret_with_anchor() {
        assert_eq!(
            intent(":caret 2 0"),
            LocalIntent::Editor(EditorUpdate::CaretMoved {
                selection: CursorPosition::selection(0, 2)
            })
        );
        assert_eq!(
            parse_command(":caret -1", &view()),
            Err(CommandError::InvalidOffset("-1".to_string()))
        );
    }

    #[test]
    fn test_edit_without_open_file() {
        assert_eq!(
            parse_command(":append x", &EditorView::default()),
            Err(CommandError::NoActiveFile)
        );
    }

    #[test]
    fn test_misc_commands() {
        assert_eq!(intent(":run"), LocalIntent::Run);
        assert_eq!(intent(":clear"), LocalIntent::ClearTerminal);
        assert_eq!(parse_command(":quit", &view()), Ok(Some(Command::Quit)));
        assert_eq!(parse_command(":new", &view()), Err(CommandError::MissingArgument(":new")));
        assert!(matches!(parse_command("hello", &view()), Err(CommandError::Unknown(_))));
    }

    #[test]
    fn test_edit_caret_counts_utf16_units() {
        assert_eq!(
            intent(":set 😀!"),
            LocalIntent::Editor(EditorUpdate::Edited {
                file_id: "f1".to_string(),
                content: "😀!".to_string(),
                selection: CursorPosition::caret(3),
            })
        );
    }

    #[test]
    fn test_annotate_places_markers_by_utf16_offset() {
        let cursor = |name: &str, head: i64| RenderedCursor {
            socket_id: name.to_lowercase(),
            username: name.to_string(),
            position: CursorPosition::caret(head),
            hue: 0,
        };
        assert_eq!(annotate("😀ab", &[cursor("Bob", 2)]), "😀[Bob]ab");
        assert_eq!(
            annotate("😀ab", &[cursor("Bob", 0), cursor("Cat", 4)]),
            "[Bob]😀ab[Cat]"
        );
        assert_eq!(annotate("abc", &[]), "abc");
    }

    #[test]
    fn test_surface_prints_status_once_and_captures_view() {
        let shared: SharedView = Arc::default();
        let mut surface = ConsoleSurface::new(Vec::new(), shared.clone());
        let state = SessionState::new("room", "Ann", "s1");

        surface.render(&state, &[]);
        surface.render(&state, &[]);
        surface.notify(&Notice::new(NoticeLevel::Warning, "careful"));

        let out = String::from_utf8(surface.into_inner()).unwrap();
        assert_eq!(out.matches("[room] users: -").count(), 1);
        assert!(out.contains("(warn) careful"));
        assert_eq!(*shared.lock(), EditorView::default());
    }
}
