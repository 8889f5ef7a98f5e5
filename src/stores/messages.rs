use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub summary: String,
    pub details: Option<String>,
    pub reported_at: String,
}

/// User-facing error channel. Reporting never fails and never blocks the
/// caller on anyone reading the message.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Mutex<Vec<Message>>,
}

impl MessageStore {
    pub fn report_error(&self, summary: &str, details: Option<String>) {
        error!(summary, details = details.as_deref().unwrap_or(""), "reported error");
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Message {
                summary: summary.to_string(),
                details,
                reported_at: chrono::Utc::now().to_rfc3339(),
            });
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
