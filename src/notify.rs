//! User-visible notices.
//!
//! Logging goes through `tracing`; a notice is the separate, louder channel
//! the host uses to tell the user something needs attention (for example that
//! GitHub stopped answering until a reset time).

use std::sync::Mutex;

use tracing::warn;

/// Sink for user-visible messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that only logs. Used when the host has no notice surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Notifier that writes to stderr so notices never mix with JSON on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, message: &str) {
        eprintln!("{} {}", console::style("notice:").yellow().bold(), message);
    }
}

/// Notifier that keeps every message, for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}
