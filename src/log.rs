//! Scenario log
//!
//! Every line goes to `tracing` and to an in-memory buffer shared by clones,
//! so a test can inspect exactly what a scenario emitted.

use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct Logger {
    lines: Rc<RefCell<Vec<String>>>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a log entry
    pub fn logf(&self, msg: &str) {
        tracing::info!(target: "svcctl::scenario", "{}", msg);
        self.lines.borrow_mut().push(msg.trim_end_matches('\n').to_string());
    }

    /// Log a named section, then run it.
    pub fn section<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        self.logf(&format!("==> {}", name));
        f()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn text(&self) -> String {
        let mut text = self.lines.borrow().join("\n");
        text.push('\n');
        text
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|line| line.contains(needle))
    }
}
