//! User-facing messages.
//!
//! Operational problems the user should know about (a failed import, a
//! background job that could not finish) are reported through a
//! [`MessageHandler`]. The host decides how to show them; the editor only
//! sends.

use std::fmt;

use dto_editor_core::Signal;

/// How serious a message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSeverity {
    /// Something worth knowing; nothing went wrong.
    Information,
    /// The operation finished, but not entirely as asked.
    Warning,
    /// The operation failed.
    Error,
}

impl fmt::Display for MessageSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Information => "information",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// How serious the message is.
    pub severity: MessageSeverity,
    /// Short summary, suitable for a dialog title.
    pub title: String,
    /// Full message body.
    pub text: String,
}

impl Message {
    /// Create a message with an explicit severity.
    pub fn new(severity: MessageSeverity, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            text: text.into(),
        }
    }

    /// An [`Information`](MessageSeverity::Information) message.
    pub fn information(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageSeverity::Information, title, text)
    }

    /// A [`Warning`](MessageSeverity::Warning) message.
    pub fn warning(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageSeverity::Warning, title, text)
    }

    /// An [`Error`](MessageSeverity::Error) message.
    pub fn error(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageSeverity::Error, title, text)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.title, self.text)
    }
}

/// Channel for messages meant for the user.
pub trait MessageHandler: Send + Sync {
    /// Deliver `message` to the user. May be called from any thread.
    fn send_message(&self, message: Message);
}

/// A [`MessageHandler`] that logs each message and re-emits it on a signal.
///
/// Connect a slot to [`sent`](Self::sent) to present messages in the UI.
#[derive(Default)]
pub struct SignalMessageHandler {
    sent: Signal<Message>,
}

impl SignalMessageHandler {
    /// Create a handler with no connected slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emitted for every message, on the sending thread.
    pub fn sent(&self) -> &Signal<Message> {
        &self.sent
    }
}

impl MessageHandler for SignalMessageHandler {
    fn send_message(&self, message: Message) {
        match message.severity {
            MessageSeverity::Information => {
                tracing::info!(target: "dto_editor::messages", title = %message.title, "{}", message.text)
            }
            MessageSeverity::Warning => {
                tracing::warn!(target: "dto_editor::messages", title = %message.title, "{}", message.text)
            }
            MessageSeverity::Error => {
                tracing::error!(target: "dto_editor::messages", title = %message.title, "{}", message.text)
            }
        }
        self.sent.emit(message);
    }
}

impl fmt::Debug for SignalMessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalMessageHandler")
            .field("connections", &self.sent.connection_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_message_display() {
        let message = Message::warning("Import", "3 values skipped");
        assert_eq!(message.to_string(), "[warning] Import: 3 values skipped");
    }

    #[test]
    fn test_signal_handler_forwards() {
        let handler = SignalMessageHandler::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        handler.sent().connect(move |message| {
            received_clone.lock().push(message.clone());
        });

        handler.send_message(Message::error("Save", "disk full"));
        handler.send_message(Message::information("Save", "done"));

        let received = received.lock();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].severity, MessageSeverity::Error);
        assert_eq!(received[1].text, "done");
    }
}
