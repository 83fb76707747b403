use crate::models::ApplicationError;

pub const READY_BANNER: &str = "Terminal ready. Run a file to see output.";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// What the terminal view has to do to catch up with the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalFrame {
    /// Write this text after what is already shown.
    Append(String),
    /// Clear the view and write this text.
    Reset(String),
}

/// Accumulated execution output for the room.
#[derive(Debug, Clone)]
pub struct TerminalLog {
    output: String,
    flushed: usize,
    reset_pending: bool,
}

impl Default for TerminalLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalLog {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            flushed: 0,
            reset_pending: true,
        }
    }

    pub fn contents(&self) -> &str {
        &self.output
    }

    pub fn push_running(&mut self, file_name: &str) {
        self.output.push_str(&format!("\n\n> Running {}...", file_name));
    }

    pub fn push_output(&mut self, username: &str, output: &str) {
        self.output
            .push_str(&format!("\n\n[{}] execution output:\n{}", username, output));
    }

    pub fn push_error(&mut self, error: &ApplicationError) {
        self.output.push_str(&format!("\n\n{}", error));
    }

    pub fn clear(&mut self) {
        self.output.clear();
        self.flushed = 0;
        self.reset_pending = true;
    }

    /// The next frame to render, if anything changed since the last call.
    pub fn take_frame(&mut self) -> Option<TerminalFrame> {
        if self.reset_pending {
            self.reset_pending = false;
            self.flushed = self.output.len();
            let text = if self.output.is_empty() {
                READY_BANNER.to_string()
            } else {
                self.output.clone()
            };
            return Some(TerminalFrame::Reset(text));
        }

        if self.flushed < self.output.len() {
            let part = self.output[self.flushed..].to_string();
            self.flushed = self.output.len();
            return Some(TerminalFrame::Append(part));
        }
        None
    }
}

/// Render terminal text with ANSI colours, one line at a time.
pub fn colorize(text: &str) -> String {
    text.split('\n')
        .map(colorize_line)
        .collect::<Vec<_>>()
        .join("\r\n")
}

fn colorize_line(line: &str) -> String {
    let is_error = ["error:", "Error:", "exception", "Exception", "failed"]
        .iter()
        .any(|needle| line.contains(needle));

    if is_error {
        format!("{RED}{line}{RESET}")
    } else if line.contains("warning:") || line.contains("Warning:") {
        format!("{YELLOW}{line}{RESET}")
    } else if line.contains("> Running") {
        format!("{GREEN}{line}{RESET}")
    } else if line.contains('[') && line.contains(']') {
        highlight_tags(line)
    } else {
        line.to_string()
    }
}

// Paint every `[...]` span cyan.
fn highlight_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 16);
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']') else {
            break;
        };
        let close = open + close;
        out.push_str(&rest[..open]);
        out.push_str(CYAN);
        out.push_str(&rest[open..=close]);
        out.push_str(RESET);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}
