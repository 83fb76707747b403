use colabri_code::models::{
    ClientEvent, CodeFile, CursorPosition, EventKind, ExecutionOutcome, ExecutionResultPayload,
    FileChangePayload, FirstJoinPayload, JoinedPayload, Participant, ServerEvent,
};
use colabri_code::session::{
    DefaultFile, EditorUpdate, LocalIntent, Notice, Reconciler, RenderedCursor, SessionDriver,
    SessionState, Surface, TerminalFrame,
};
use colabri_code::transport::memory::{self, MemoryServer};
use tokio::sync::mpsc;

#[derive(Default)]
struct Recorder {
    notices: Vec<String>,
    last_cursors: Vec<RenderedCursor>,
    frames: Vec<TerminalFrame>,
}

impl Surface for Recorder {
    fn notify(&mut self, notice: &Notice) {
        self.notices.push(notice.message.clone());
    }

    fn render(&mut self, _state: &SessionState, cursors: &[RenderedCursor]) {
        self.last_cursors = cursors.to_vec();
    }

    fn write_terminal(&mut self, frame: TerminalFrame) {
        self.frames.push(frame);
    }
}

fn reconciler(socket_id: &str, username: &str) -> Reconciler {
    Reconciler::new(SessionState::new("room-1", username, socket_id), DefaultFile::default())
}

async fn attached(socket_id: &str) -> (SessionDriver, MemoryServer) {
    let (conn, mut server) = memory::connect(socket_id);
    let driver = SessionDriver::attach(reconciler(socket_id, "Ann"), conn).unwrap();
    let join = server.next_sent().await.unwrap();
    assert_eq!(join.kind(), EventKind::Join);
    (driver, server)
}

fn file(id: &str, content: &str) -> CodeFile {
    CodeFile {
        id: id.to_string(),
        name: format!("{}.js", id),
        content: content.to_string(),
        created_by: "Bob".to_string(),
    }
}

fn joined(files: Vec<CodeFile>) -> ServerEvent {
    ServerEvent::Joined(JoinedPayload {
        clients: vec![Participant::new("me", "Ann"), Participant::new("bob", "Bob")],
        username: "Ann".to_string(),
        files: Some(files),
        cursors: None,
    })
}

fn edited(file_id: &str, content: &str) -> LocalIntent {
    LocalIntent::Editor(EditorUpdate::Edited {
        file_id: file_id.to_string(),
        content: content.to_string(),
        selection: CursorPosition::caret(content.encode_utf16().count() as i64),
    })
}

#[tokio::test]
async fn join_is_the_first_event_sent() {
    let (conn, mut server) = memory::connect("me");
    let _driver = SessionDriver::attach(reconciler("me", "Ann"), conn).unwrap();
    assert_eq!(server.subscriber_count(), 1);
    match server.drain_sent().as_slice() {
        [ClientEvent::Join(join)] => {
            assert_eq!(join.room_id, "room-1");
            assert_eq!(join.username, "Ann");
        }
        other => panic!("unexpected outbound {:?}", other),
    }
}

#[tokio::test]
async fn first_join_creates_default_file_and_runs_it() {
    let (driver, mut server) = attached("me").await;
    let (tx, rx) = mpsc::channel(8);
    let mut surface = Recorder::default();

    let script = async {
        server.push(ServerEvent::FirstJoin(FirstJoinPayload {
            clients: vec![Participant::new("me", "Ann")],
            files: vec![],
        }));
        let created = match server.next_sent().await {
            Some(ClientEvent::FileCreated(p)) => p.file,
            other => panic!("expected file-created, got {:?}", other),
        };
        assert_eq!(created.name, "main.js");
        assert_eq!(created.content, "// Start coding here");
        assert_eq!(created.created_by, "Ann");

        tx.send(LocalIntent::Run).await.unwrap();
        match server.next_sent().await {
            Some(ClientEvent::ExecuteCode(p)) => {
                assert_eq!(p.file_id, created.id);
                assert_eq!(p.code, "// Start coding here");
                assert_eq!(p.file_name, "main.js");
            }
            other => panic!("expected execute-code, got {:?}", other),
        }

        server.push(ServerEvent::ExecutionResult(ExecutionResultPayload {
            result: ExecutionOutcome {
                output: Some("42".to_string()),
                error: None,
            },
            username: "Ann".to_string(),
        }));
        drop(tx);
        server
    };

    let (engine, mut server) = tokio::join!(driver.run(rx, &mut surface), script);

    assert_eq!(engine.state().files().len(), 1);
    assert!(!engine.is_running());
    assert!(engine.terminal().contents().contains("[Ann] execution output:\n42"));
    assert!(surface
        .frames
        .iter()
        .any(|f| matches!(f, TerminalFrame::Append(text) if text.contains("> Running main.js..."))));
    assert!(server.is_closed());
    assert_eq!(server.subscriber_count(), 0);
}

#[tokio::test]
async fn remote_changes_and_cursors_reach_the_surface() {
    let (driver, server) = attached("me").await;
    let (tx, rx) = mpsc::channel(8);
    let mut surface = Recorder::default();

    server.push(joined(vec![file("F1", "")]));
    server.push(ServerEvent::FileChange(FileChangePayload {
        room_id: "room-1".to_string(),
        file_id: "F1".to_string(),
        content: "hello".to_string(),
        cursor_position: Some(CursorPosition::caret(5)),
        socket_id: Some("bob".to_string()),
        username: None,
    }));
    // Shrink after the cursor was placed; the rendered cursor is clamped
    server.push(ServerEvent::FileChange(FileChangePayload {
        room_id: "room-1".to_string(),
        file_id: "F1".to_string(),
        content: "he".to_string(),
        cursor_position: None,
        socket_id: Some("carol".to_string()),
        username: None,
    }));
    drop(tx);

    let engine = driver.run(rx, &mut surface).await;

    assert_eq!(engine.state().file("F1").unwrap().content, "he");
    assert_eq!(surface.last_cursors.len(), 1);
    assert_eq!(surface.last_cursors[0].username, "Bob");
    assert_eq!(surface.last_cursors[0].position, CursorPosition::caret(2));
    assert_eq!(engine.state().cursor("bob").unwrap().position.head, 5);
}

#[tokio::test]
async fn reconnect_sends_join_again() {
    let (driver, mut server) = attached("me").await;
    let (tx, rx) = mpsc::channel(8);
    let mut surface = Recorder::default();

    let script = async {
        server.push(joined(vec![file("F1", "x")]));
        server.drop_link();
        server.fail_reconnect("connection refused");
        server.restore_link();
        match server.next_sent().await {
            Some(ClientEvent::Join(join)) => assert_eq!(join.room_id, "room-1"),
            other => panic!("expected join, got {:?}", other),
        }
        drop(tx);
        server
    };

    let (engine, _server) = tokio::join!(driver.run(rx, &mut surface), script);

    assert_eq!(
        surface.notices,
        vec![
            "Disconnected from the server.".to_string(),
            "Failed to connect to the server.".to_string(),
            "Reconnected to the server.".to_string(),
        ]
    );
    assert_eq!(engine.state().file("F1").unwrap().content, "x");
}

#[tokio::test]
async fn malformed_frames_change_nothing() {
    let (driver, server) = attached("me").await;
    let (tx, rx) = mpsc::channel(8);
    let mut surface = Recorder::default();

    server.push(joined(vec![file("F1", "keep")]));
    assert!(server.push_frame("not json").is_err());
    assert!(server.push_frame(r#"{"event":"shout","data":{}}"#).is_err());
    assert!(server
        .push_frame(r#"{"event":"file-change","data":{"fileId":"F1"}}"#)
        .is_err());
    assert!(server
        .push_frame(r#"{"event":"disconnected","data":{"socketId":"bob","username":"Bob"}}"#)
        .is_ok());
    drop(tx);

    let engine = driver.run(rx, &mut surface).await;

    assert_eq!(engine.state().file("F1").unwrap().content, "keep");
    assert!(engine.state().participant("bob").is_none());
    assert_eq!(surface.notices, vec!["Bob left the room".to_string()]);
}

#[tokio::test]
async fn session_survives_a_dead_link() {
    let (driver, mut server) = attached("me").await;
    let (tx, rx) = mpsc::channel(8);
    let mut surface = Recorder::default();

    let script = async {
        server.push(joined(vec![file("F1", "")]));
        server.give_up();
        tx.send(edited("F1", "offline")).await.unwrap();
        drop(tx);
        server
    };

    let (engine, mut server) = tokio::join!(driver.run(rx, &mut surface), script);

    assert_eq!(engine.state().file("F1").unwrap().content, "offline");
    assert!(server.drain_sent().is_empty());
    assert_eq!(surface.notices, vec!["Connection lost. Changes stay local.".to_string()]);
}

/// Relay what one client sent to every other client, the way the server
/// broadcasts to the room.
fn relay(sent: Vec<ClientEvent>, others: &mut [&mut Reconciler]) {
    for event in sent {
        let inbound = match event {
            ClientEvent::FileChange(p) => ServerEvent::FileChange(p),
            ClientEvent::CursorChange(p) => ServerEvent::CursorChange(p),
            ClientEvent::FileCreated(p) => ServerEvent::FileCreated(p),
            ClientEvent::Join(_) | ClientEvent::ExecuteCode(_) => continue,
        };
        for other in others.iter_mut() {
            other.apply_remote(inbound.clone());
        }
    }
}

#[test]
fn three_clients_converge_on_the_last_edit() {
    let roster = vec![
        Participant::new("a", "Ann"),
        Participant::new("b", "Bob"),
        Participant::new("c", "Cat"),
    ];
    let snapshot = ServerEvent::Joined(JoinedPayload {
        clients: roster,
        username: String::new(),
        files: Some(vec![file("F1", "")]),
        cursors: None,
    });

    let mut a = reconciler("a", "Ann");
    let mut b = reconciler("b", "Bob");
    let mut c = reconciler("c", "Cat");
    for engine in [&mut a, &mut b, &mut c] {
        engine.apply_remote(snapshot.clone());
    }

    let sent = a.apply_local(edited("F1", "a")).outbound;
    relay(sent, &mut [&mut b, &mut c]);
    let sent = b.apply_local(edited("F1", "ab")).outbound;
    relay(sent, &mut [&mut a, &mut c]);
    let sent = c.apply_local(edited("F1", "abc")).outbound;
    relay(sent, &mut [&mut a, &mut b]);

    for engine in [&a, &b, &c] {
        assert_eq!(engine.state().file("F1").unwrap().content, "abc");
    }
    assert_eq!(a.state().cursor("c").unwrap().position, CursorPosition::caret(3));
    assert_eq!(a.state().cursor("b").unwrap().username, "Bob");
    assert!(a.state().cursor("a").is_none());
}
