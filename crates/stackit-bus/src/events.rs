//! # Realtime Events
//!
//! Defines all event types that flow through the realtime bus.
//! The payload shape of every event is fixed by its variant, so a
//! kind/payload mismatch cannot be constructed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The closed set of event kinds recognized by the bus.
///
/// Subscriptions are keyed by kind; there is no wildcard kind. The
/// serialized names match the wire-level discriminants used by the
/// application (`new_answer`, `vote_update`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Someone answered a question.
    NewAnswer,
    /// A question was posted.
    NewQuestion,
    /// The vote total of a question or answer changed.
    VoteUpdate,
    /// The number of users currently online changed.
    UserOnlineCount,
    /// The current user was mentioned in a post.
    Mention,
    /// An operator-issued announcement.
    SystemMessage,
}

impl EventKind {
    /// Every recognized kind, in declaration order.
    pub const ALL: [EventKind; 6] = [
        EventKind::NewAnswer,
        EventKind::NewQuestion,
        EventKind::VoteUpdate,
        EventKind::UserOnlineCount,
        EventKind::Mention,
        EventKind::SystemMessage,
    ];

    /// The wire-level name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewAnswer => "new_answer",
            Self::NewQuestion => "new_question",
            Self::VoteUpdate => "vote_update",
            Self::UserOnlineCount => "user_online_count",
            Self::Mention => "mention",
            Self::SystemMessage => "system_message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a vote target is a question or an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A top-level question post.
    Question,
    /// An answer attached to a question.
    Answer,
}

/// All payloads that can be published to the event bus.
///
/// Each variant carries the full data for its kind. The bus stamps the
/// payload into an [`Event`] at publish time; consumers never see a
/// bare payload on the delivery side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    /// Someone answered a question.
    NewAnswer {
        /// Id of the question that was answered.
        question_id: String,
        /// Title of the question, for display without a lookup.
        question_title: String,
        /// Display name of the answer's author.
        author_name: String,
    },

    /// A question was posted.
    NewQuestion {
        /// Id of the new question.
        question_id: String,
        /// Title of the new question.
        title: String,
        /// Display name of the question's author.
        author_name: String,
        /// Tags the author attached to the question.
        tags: Vec<String>,
    },

    /// The vote total of a question or answer changed.
    VoteUpdate {
        /// Id of the voted item.
        item_id: String,
        /// Whether the item is a question or an answer.
        item_kind: ItemKind,
        /// The item's new vote total. Negative totals are valid.
        new_vote_count: i64,
    },

    /// The number of users currently online changed.
    UserOnlineCount {
        /// Current online-user count.
        count: u32,
    },

    /// The current user was mentioned in a post.
    Mention {
        /// Id of the post containing the mention.
        item_id: String,
        /// Display name of the user who wrote the mention.
        mentioned_by: String,
        /// Short excerpt of the mentioning post.
        excerpt: String,
    },

    /// An operator-issued announcement.
    SystemMessage {
        /// Announcement text.
        body: String,
    },
}

impl EventPayload {
    /// Get the kind this payload belongs to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NewAnswer { .. } => EventKind::NewAnswer,
            Self::NewQuestion { .. } => EventKind::NewQuestion,
            Self::VoteUpdate { .. } => EventKind::VoteUpdate,
            Self::UserOnlineCount { .. } => EventKind::UserOnlineCount,
            Self::Mention { .. } => EventKind::Mention,
            Self::SystemMessage { .. } => EventKind::SystemMessage,
        }
    }

    /// Check the semantic rules the type system cannot express.
    ///
    /// The bus calls this before stamping and delivering; a rejected
    /// payload is never seen by any subscriber.
    pub fn validate(&self) -> Result<(), InvalidEvent> {
        match self {
            Self::NewAnswer { question_id, .. } | Self::NewQuestion { question_id, .. } => {
                if question_id.is_empty() {
                    return Err(InvalidEvent::EmptyField {
                        kind: self.kind(),
                        field: "question_id",
                    });
                }
            }
            Self::VoteUpdate { item_id, .. } | Self::Mention { item_id, .. } => {
                if item_id.is_empty() {
                    return Err(InvalidEvent::EmptyField {
                        kind: self.kind(),
                        field: "item_id",
                    });
                }
            }
            Self::SystemMessage { body } => {
                if body.is_empty() {
                    return Err(InvalidEvent::EmptyField {
                        kind: self.kind(),
                        field: "body",
                    });
                }
            }
            Self::UserOnlineCount { .. } => {}
        }
        Ok(())
    }
}

/// A stamped event as delivered to subscribers.
///
/// `seq` is assigned by the bus and strictly increases in delivery
/// order, so consumers can reject stale or duplicate deliveries by
/// comparing sequence numbers. `timestamp_ms` is wall-clock and only
/// informational; `seq` is the authoritative ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Bus-assigned sequence number, starting at 1.
    pub seq: u64,
    /// Milliseconds since the Unix epoch, non-decreasing per bus.
    pub timestamp_ms: u64,
    /// The user whose action produced this event, if any.
    pub user_id: Option<String>,
    /// The kind-specific event data.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Get the kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// A payload that failed semantic validation at publish time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidEvent {
    /// A required identifying field was empty.
    #[error("{kind} event has an empty {field}")]
    EmptyField {
        /// Kind of the rejected payload.
        kind: EventKind,
        /// Name of the offending field.
        field: &'static str,
    },
}
