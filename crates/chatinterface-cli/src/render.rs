//! Line-oriented terminal renderer.

use std::io::{self, Write};
use std::sync::Mutex;

use chatinterface_client::{Renderer, Severity};

/// Writes everything the session shows as plain lines.
pub struct TerminalRenderer<W = io::Stdout> {
    out: Mutex<W>,
}

impl TerminalRenderer {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn line(&self, text: &str) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        // A closed stdout leaves nothing useful to do with the error.
        let _ = writeln!(out, "{text}").and_then(|()| out.flush());
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap()
    }
}

fn format_message(label: &str, body: &str, timestamp: Option<&str>) -> String {
    match timestamp {
        Some(ts) => format!("[{ts}] {label}: {body}"),
        None => format!("{label}: {body}"),
    }
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Critical => "error",
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn render_message(&self, label: &str, body: &str, timestamp: Option<&str>) {
        self.line(&format_message(label, body, timestamp));
    }

    fn clear_conversation(&self) {
        self.line(&"\u{2500}".repeat(40));
    }

    fn list_peer(&self, peer: &str) {
        self.line(&format!("+ {peer}"));
    }

    fn show_active_peer(&self, peer: &str) {
        self.line(&format!("== {peer} =="));
    }

    fn show_identity(&self, username: &str) {
        self.line(&format!("Signed in as {username}"));
    }

    fn report(&self, severity: Severity, title: &str, detail: &str) {
        self.line(&format!("{}: {title}: {detail}", severity_tag(severity)));
    }
}
