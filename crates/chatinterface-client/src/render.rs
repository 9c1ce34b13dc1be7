//! Rendering boundary.
//!
//! The session layer pushes everything the user sees through [`Renderer`];
//! layout and styling belong to the implementor.

/// How loudly a report should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

pub trait Renderer: Send + Sync {
    /// Append one message to the visible conversation.
    fn render_message(&self, label: &str, body: &str, timestamp: Option<&str>);

    /// Clear the visible conversation.
    fn clear_conversation(&self);

    /// Add a peer to the contact list.
    fn list_peer(&self, peer: &str);

    /// Show which peer the visible conversation belongs to.
    fn show_active_peer(&self, peer: &str);

    /// Show the local username.
    fn show_identity(&self, username: &str);

    /// Tell the user something went wrong (or needs attention).
    fn report(&self, severity: Severity, title: &str, detail: &str);
}
