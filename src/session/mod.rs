//! A participant's view of one collaboration room.

pub mod driver;
pub mod engine;
pub mod presence;
pub mod state;
pub mod terminal;

pub use driver::{SessionDriver, Surface};
pub use engine::{DefaultFile, EditorUpdate, LocalIntent, Notice, NoticeLevel, Reaction, Reconciler};
pub use presence::{cursor_hue, visible_cursors, RenderedCursor};
pub use state::SessionState;
pub use terminal::{colorize, TerminalFrame, TerminalLog, READY_BANNER};
