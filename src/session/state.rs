use std::collections::HashMap;

use crate::models::{CodeFile, CursorEntry, Participant};

/// The client's view of one room for the lifetime of an editor visit.
///
/// Every mutator is total. Nothing here performs I/O; the reconciliation
/// engine decides which mutators run and what gets sent as a result.
#[derive(Debug, Clone)]
pub struct SessionState {
    room_id: String,
    username: String,
    local_socket_id: String,
    participants: Vec<Participant>,
    files: Vec<CodeFile>,
    active_file_id: Option<String>,
    cursors: HashMap<String, CursorEntry>,
    joined: bool,
}

impl SessionState {
    pub fn new(room_id: impl Into<String>, username: impl Into<String>, local_socket_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            username: username.into(),
            local_socket_id: local_socket_id.into(),
            participants: Vec::new(),
            files: Vec::new(),
            active_file_id: None,
            cursors: HashMap::new(),
            joined: false,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn local_socket_id(&self) -> &str {
        &self.local_socket_id
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, socket_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.socket_id == socket_id)
    }

    pub fn files(&self) -> &[CodeFile] {
        &self.files
    }

    pub fn file(&self, file_id: &str) -> Option<&CodeFile> {
        self.files.iter().find(|f| f.id == file_id)
    }

    pub fn active_file_id(&self) -> Option<&str> {
        self.active_file_id.as_deref()
    }

    pub fn active_file(&self) -> Option<&CodeFile> {
        self.active_file_id.as_deref().and_then(|id| self.file(id))
    }

    pub fn cursors(&self) -> &HashMap<String, CursorEntry> {
        &self.cursors
    }

    pub fn cursor(&self, socket_id: &str) -> Option<&CursorEntry> {
        self.cursors.get(socket_id)
    }

    pub fn has_joined(&self) -> bool {
        self.joined
    }

    pub fn is_local(&self, socket_id: &str) -> bool {
        socket_id == self.local_socket_id
    }

    pub(crate) fn mark_joined(&mut self) {
        self.joined = true;
    }

    /// Replace the participant list with the server's. Duplicate socket ids
    /// collapse to the last occurrence. Cursors of sockets missing from the
    /// new list are dropped with them.
    pub(crate) fn replace_participants(&mut self, clients: Vec<Participant>) {
        let mut participants: Vec<Participant> = Vec::with_capacity(clients.len());
        for client in clients {
            match participants.iter_mut().find(|p| p.socket_id == client.socket_id) {
                Some(existing) => *existing = client,
                None => participants.push(client),
            }
        }
        self.cursors
            .retain(|owner, _| participants.iter().any(|p| &p.socket_id == owner));
        self.participants = participants;
    }

    /// Remove a participant together with its cursor. Returns the removed
    /// participant, `None` when the socket was unknown.
    pub(crate) fn remove_participant(&mut self, socket_id: &str) -> Option<Participant> {
        self.cursors.remove(socket_id);
        let index = self.participants.iter().position(|p| p.socket_id == socket_id)?;
        Some(self.participants.remove(index))
    }

    /// Replace the file sequence with a snapshot. The active selection is kept
    /// only if the file still exists.
    pub(crate) fn replace_files(&mut self, files: Vec<CodeFile>) {
        self.files.clear();
        for file in files {
            self.append_file(file);
        }
        if let Some(active) = self.active_file_id.as_deref() {
            if self.file(active).is_none() {
                self.active_file_id = None;
            }
        }
    }

    /// Append a file. A file whose id is already present is ignored.
    pub(crate) fn append_file(&mut self, file: CodeFile) -> bool {
        if self.file(&file.id).is_some() {
            return false;
        }
        self.files.push(file);
        true
    }

    /// Overwrite a file's content. Returns whether the file exists.
    pub(crate) fn set_file_content(&mut self, file_id: &str, content: &str) -> bool {
        match self.files.iter_mut().find(|f| f.id == file_id) {
            Some(file) => {
                if file.content != content {
                    file.content = content.to_string();
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn select_file(&mut self, file_id: &str) -> bool {
        if self.file(file_id).is_none() {
            return false;
        }
        self.active_file_id = Some(file_id.to_string());
        true
    }

    /// Select the first file when nothing (valid) is selected.
    pub(crate) fn ensure_active_file(&mut self) {
        if self.active_file().is_none() {
            self.active_file_id = self.files.first().map(|f| f.id.clone());
        }
    }

    /// Store a remote cursor, replacing the owner's previous one. The local
    /// socket's own cursor is never stored.
    pub(crate) fn upsert_cursor(&mut self, entry: CursorEntry) -> bool {
        if self.is_local(&entry.owner_socket_id) {
            return false;
        }
        self.cursors.insert(entry.owner_socket_id.clone(), entry);
        true
    }

    pub(crate) fn replace_cursors(&mut self, entries: Vec<CursorEntry>) {
        self.cursors.clear();
        for entry in entries {
            self.upsert_cursor(entry);
        }
    }
}
