//! User-facing output sink
//!
//! Logs go through `tracing`; everything meant for the person at the keyboard
//! goes through a [`Console`].

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

/// Line-oriented output for the interactive user
pub trait Console: Send + Sync {
    fn line(&self, text: &str);

    /// Print each line of a multi-line block
    fn block(&self, text: &str) {
        for line in text.lines() {
            self.line(line);
        }
    }
}

/// Shared console handle
pub type ConsoleHandle = Arc<dyn Console>;

/// Writes to the process stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn line(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", text);
        let _ = out.flush();
    }
}

/// Captures lines in memory
#[derive(Debug, Default)]
pub struct BufferConsole {
    lines: Mutex<Vec<String>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Whether any line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Console for BufferConsole {
    fn line(&self, text: &str) {
        self.lines.lock().push(text.to_string());
    }
}
