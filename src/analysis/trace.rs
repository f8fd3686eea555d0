//! Step-by-step explanation for one symbol.
//!
//! Screens call `note` at every decision point; only the traced symbol's
//! messages are formatted and kept.

use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Default)]
pub struct TraceLog {
    target: Option<String>,
    lines: Mutex<Vec<String>>,
}

impl TraceLog {
    pub fn new(target: Option<String>) -> Self {
        Self {
            target: target.map(|s| s.trim().to_uppercase()),
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn is_traced(&self, symbol: &str) -> bool {
        self.target.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(symbol))
    }

    pub fn note<F>(&self, symbol: &str, message: F)
    where
        F: FnOnce() -> String,
    {
        if !self.is_traced(symbol) {
            return;
        }
        let line = format!("[{}] {}", symbol, message());
        info!("trace {}", line);
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}
