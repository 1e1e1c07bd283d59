//! # Notifications
//!
//! Maps bus events to the toasts a user would see. Vote updates and
//! presence changes stay silent; they move counters, not attention.

use stackit_bus::{Event, EventPayload};
use tracing::info;

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Destination for notifications. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Default sink; writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(title = %notification.title, body = %notification.body, "notification");
    }
}

/// The notification an event warrants, if any.
#[must_use]
pub fn notification_for(event: &Event) -> Option<Notification> {
    match &event.payload {
        EventPayload::NewAnswer {
            question_title,
            author_name,
            ..
        } => Some(Notification {
            title: format!("New answer on: {question_title}"),
            body: format!("{author_name} just posted an answer"),
        }),
        EventPayload::NewQuestion {
            title, author_name, ..
        } => Some(Notification {
            title: "New question posted".to_string(),
            body: format!("{author_name} asked: {title}"),
        }),
        EventPayload::Mention {
            mentioned_by,
            excerpt,
            ..
        } => Some(Notification {
            title: format!("{mentioned_by} mentioned you"),
            body: excerpt.clone(),
        }),
        EventPayload::SystemMessage { body } => Some(Notification {
            title: "StackIt".to_string(),
            body: body.clone(),
        }),
        EventPayload::VoteUpdate { .. } | EventPayload::UserOnlineCount { .. } => None,
    }
}
