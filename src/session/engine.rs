//! Reconciliation of local intents and remote events into the session.
//!
//! Policy is last-writer-wins per field: the content of a file is owned by
//! whichever `file-change` was applied last, a remote cursor by whichever
//! `cursor-change` (or cursor-carrying `file-change`) was applied last.
//! There is no sequence number on the wire, so "last" means receipt order.
//!
//! Two participants typing into the same file at the same time race, and the
//! loser's edit is silently replaced. Every local edit broadcasts the whole
//! file, so a diff-based or OT/CRDT sync would slot in at `on_edit` and
//! `on_remote_change`.
//!
//! The engine never performs I/O. Each entry point returns a [`Reaction`]
//! holding the events to send and the notices to show.

use tracing::{debug, info, warn};

use crate::models::{
    ClientEvent, CodeFile, CursorChangePayload, CursorEntry, CursorPosition, DisconnectedPayload,
    ExecuteCodePayload, ExecutionResultPayload, FileChangePayload, FileCreatedPayload,
    FirstJoinPayload, JoinPayload, JoinedPayload, ServerEvent, ANONYMOUS,
};
use crate::session::state::SessionState;
use crate::session::terminal::{TerminalFrame, TerminalLog};
use crate::transport::LinkEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Side effects requested by the engine for one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub outbound: Vec<ClientEvent>,
    pub notices: Vec<Notice>,
}

impl Reaction {
    fn send(event: ClientEvent) -> Self {
        Self {
            outbound: vec![event],
            notices: Vec::new(),
        }
    }

    fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            outbound: Vec::new(),
            notices: vec![Notice::new(level, message)],
        }
    }

    fn merge(mut self, other: Reaction) -> Self {
        self.outbound.extend(other.outbound);
        self.notices.extend(other.notices);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.notices.is_empty()
    }
}

/// One update from the editor widget. An input event is either an edit or a
/// caret move, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorUpdate {
    Edited {
        file_id: String,
        content: String,
        selection: CursorPosition,
    },
    CaretMoved {
        selection: CursorPosition,
    },
}

impl EditorUpdate {
    /// Classify a raw widget update by whether the document changed.
    pub fn from_widget(file_id: &str, doc_changed: bool, content: &str, selection: CursorPosition) -> Self {
        if doc_changed {
            EditorUpdate::Edited {
                file_id: file_id.to_string(),
                content: content.to_string(),
                selection,
            }
        } else {
            EditorUpdate::CaretMoved { selection }
        }
    }
}

/// Things the local user asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalIntent {
    Editor(EditorUpdate),
    CreateFile { name: String, content: String },
    SelectFile(String),
    Run,
    ClearTerminal,
}

/// File synthesized by the first participant of an empty room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultFile {
    pub name: String,
    pub content: String,
}

impl Default for DefaultFile {
    fn default() -> Self {
        Self {
            name: "main.js".to_string(),
            content: "// Start coding here".to_string(),
        }
    }
}

pub struct Reconciler {
    state: SessionState,
    terminal: TerminalLog,
    defaults: DefaultFile,
    running: bool,
}

impl Reconciler {
    pub fn new(state: SessionState, defaults: DefaultFile) -> Self {
        Self {
            state,
            terminal: TerminalLog::new(),
            defaults,
            running: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn terminal(&self) -> &TerminalLog {
        &self.terminal
    }

    pub fn take_terminal_frame(&mut self) -> Option<TerminalFrame> {
        self.terminal.take_frame()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The JOIN request for this session.
    pub fn join_request(&self) -> ClientEvent {
        ClientEvent::Join(JoinPayload {
            room_id: self.state.room_id().to_string(),
            username: self.state.username().to_string(),
        })
    }

    pub fn apply_remote(&mut self, event: ServerEvent) -> Reaction {
        debug!("Applying remote {} in room {}", event.kind(), self.state.room_id());
        match event {
            ServerEvent::Joined(p) => self.on_joined(p),
            ServerEvent::FirstJoin(p) => self.on_first_join(p),
            ServerEvent::Disconnected(p) => self.on_disconnected(p),
            ServerEvent::FileChange(p) => self.on_remote_change(p),
            ServerEvent::CursorChange(p) => self.on_remote_cursor(p),
            ServerEvent::FileCreated(p) => self.on_remote_file(p),
            ServerEvent::ExecutionResult(p) => self.on_execution_result(p),
        }
    }

    pub fn apply_local(&mut self, intent: LocalIntent) -> Reaction {
        match intent {
            LocalIntent::Editor(EditorUpdate::Edited {
                file_id,
                content,
                selection,
            }) => self.on_edit(file_id, content, selection),
            LocalIntent::Editor(EditorUpdate::CaretMoved { selection }) => self.on_caret(selection),
            LocalIntent::CreateFile { name, content } => self.create_file(&name, &content),
            LocalIntent::SelectFile(file_id) => {
                if self.state.select_file(&file_id) {
                    Reaction::default()
                } else {
                    Reaction::notice(NoticeLevel::Warning, format!("No such file: {}", file_id))
                }
            }
            LocalIntent::Run => self.run_active_file(),
            LocalIntent::ClearTerminal => {
                self.terminal.clear();
                Reaction::default()
            }
        }
    }

    pub fn apply_link(&mut self, event: &LinkEvent) -> Reaction {
        match event {
            LinkEvent::Connected => {
                info!("Link restored, rejoining room {}", self.state.room_id());
                Reaction::send(self.join_request())
                    .merge(Reaction::notice(NoticeLevel::Success, "Reconnected to the server."))
            }
            LinkEvent::Disconnected => {
                Reaction::notice(NoticeLevel::Warning, "Disconnected from the server.")
            }
            LinkEvent::ConnectError(reason) => {
                debug!("Connect error: {}", reason);
                Reaction::notice(NoticeLevel::Error, "Failed to connect to the server.")
            }
        }
    }

    // Participant table first, then the name the sender claims, then anonymous.
    fn attribute(&self, socket_id: &str, claimed: Option<&str>) -> String {
        self.state
            .participant(socket_id)
            .map(|p| p.username.clone())
            .or_else(|| claimed.filter(|name| !name.is_empty()).map(str::to_string))
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    fn on_joined(&mut self, p: JoinedPayload) -> Reaction {
        self.state.replace_participants(p.clients);
        if let Some(files) = p.files {
            self.state.replace_files(files);
        }
        if let Some(cursors) = p.cursors {
            let entries: Vec<CursorEntry> = cursors
                .into_iter()
                .map(|(owner, cursor)| CursorEntry {
                    username: self.attribute(&owner, cursor.username.as_deref()),
                    owner_socket_id: owner,
                    file_id: cursor.file_id,
                    position: cursor.position,
                })
                .collect();
            self.state.replace_cursors(entries);
        }
        self.state.ensure_active_file();
        self.state.mark_joined();

        info!(
            "Joined room {}: {} participants, {} files",
            self.state.room_id(),
            self.state.participants().len(),
            self.state.files().len()
        );

        if !p.username.is_empty() && p.username != self.state.username() {
            return Reaction::notice(NoticeLevel::Success, format!("{} joined the room", p.username));
        }
        Reaction::default()
    }

    fn on_first_join(&mut self, p: FirstJoinPayload) -> Reaction {
        self.state.replace_participants(p.clients);
        self.state.mark_joined();

        if let Some(first) = p.files.first().map(|f| f.id.clone()) {
            self.state.replace_files(p.files);
            self.state.select_file(&first);
            return Reaction::default();
        }

        if !self.state.files().is_empty() {
            debug!(
                "Room {} reported empty, keeping {} local files",
                self.state.room_id(),
                self.state.files().len()
            );
            return Reaction::default();
        }

        info!("First in room {}, creating default file", self.state.room_id());
        let defaults = self.defaults.clone();
        self.create_file(&defaults.name, &defaults.content)
    }

    fn on_disconnected(&mut self, p: DisconnectedPayload) -> Reaction {
        match self.state.remove_participant(&p.socket_id) {
            Some(participant) => {
                let name = if p.username.is_empty() {
                    participant.username
                } else {
                    p.username
                };
                Reaction::notice(NoticeLevel::Success, format!("{} left the room", name))
            }
            None => {
                debug!("Disconnect for unknown socket {}", p.socket_id);
                Reaction::default()
            }
        }
    }

    fn on_remote_change(&mut self, p: FileChangePayload) -> Reaction {
        if !self.state.set_file_content(&p.file_id, &p.content) {
            debug!("Change for unknown file {}", p.file_id);
        }

        if let (Some(position), Some(sender)) = (p.cursor_position, p.socket_id.as_deref()) {
            if !self.state.is_local(sender) {
                let entry = CursorEntry {
                    owner_socket_id: sender.to_string(),
                    file_id: p.file_id.clone(),
                    position,
                    username: self.attribute(sender, p.username.as_deref()),
                };
                self.state.upsert_cursor(entry);
            }
        }
        Reaction::default()
    }

    fn on_remote_cursor(&mut self, p: CursorChangePayload) -> Reaction {
        if self.state.is_local(&p.socket_id) {
            return Reaction::default();
        }
        let entry = CursorEntry {
            username: self.attribute(&p.socket_id, p.username.as_deref()),
            owner_socket_id: p.socket_id,
            file_id: p.file_id,
            position: p.position,
        };
        self.state.upsert_cursor(entry);
        Reaction::default()
    }

    fn on_remote_file(&mut self, p: FileCreatedPayload) -> Reaction {
        let name = p.file.name.clone();
        let id = p.file.id.clone();
        if self.state.append_file(p.file) {
            Reaction::notice(NoticeLevel::Success, format!("New file created: {}", name))
        } else {
            debug!("Ignoring duplicate file {}", id);
            Reaction::default()
        }
    }

    fn on_execution_result(&mut self, p: ExecutionResultPayload) -> Reaction {
        self.running = false;
        let username = p.username.clone();
        match p.into_result() {
            Ok(output) => self.terminal.push_output(&username, &output),
            Err(error) => {
                warn!("Remote execution failed: {}", error);
                self.terminal.push_error(&error);
            }
        }
        Reaction::default()
    }

    fn on_edit(&mut self, file_id: String, content: String, selection: CursorPosition) -> Reaction {
        match self.state.file(&file_id) {
            None => {
                debug!("Edit for unknown file {}", file_id);
                return Reaction::default();
            }
            Some(file) if file.content == content => return Reaction::default(),
            Some(_) => {}
        }

        // Optimistic: the edit is ours before the server has seen it
        self.state.set_file_content(&file_id, &content);

        Reaction::send(ClientEvent::FileChange(FileChangePayload {
            room_id: self.state.room_id().to_string(),
            file_id,
            content,
            cursor_position: Some(selection),
            socket_id: Some(self.state.local_socket_id().to_string()),
            username: Some(self.state.username().to_string()),
        }))
    }

    fn on_caret(&mut self, selection: CursorPosition) -> Reaction {
        let Some(file_id) = self.state.active_file_id() else {
            return Reaction::default();
        };

        Reaction::send(ClientEvent::CursorChange(CursorChangePayload {
            room_id: self.state.room_id().to_string(),
            file_id: file_id.to_string(),
            position: selection,
            socket_id: self.state.local_socket_id().to_string(),
            username: Some(self.state.username().to_string()),
        }))
    }

    fn create_file(&mut self, name: &str, content: &str) -> Reaction {
        let name = name.trim();
        if name.is_empty() {
            return Reaction::notice(NoticeLevel::Error, "File name cannot be empty");
        }

        let file = CodeFile::new(name, content, self.state.username());
        let event = ClientEvent::FileCreated(FileCreatedPayload {
            room_id: self.state.room_id().to_string(),
            file: file.clone(),
        });
        let id = file.id.clone();
        self.state.append_file(file);
        self.state.select_file(&id);
        info!("Created file {} ({})", name, id);

        Reaction::send(event)
    }

    fn run_active_file(&mut self) -> Reaction {
        let Some(file) = self.state.active_file() else {
            return Reaction::notice(NoticeLevel::Error, "No file selected to run");
        };
        if self.running {
            return Reaction::notice(NoticeLevel::Warning, "Code is already running");
        }

        let payload = ExecuteCodePayload {
            room_id: self.state.room_id().to_string(),
            file_id: file.id.clone(),
            code: file.content.clone(),
            file_name: file.name.clone(),
            username: self.state.username().to_string(),
        };
        self.running = true;
        self.terminal.push_running(&payload.file_name);

        Reaction::send(ClientEvent::ExecuteCode(payload))
    }
}
