// src/io/types.rs
//
// Events handed from a reader task to whoever consumes it.

use serde::Serialize;

use crate::error::ErrorKind;
use crate::io::serial::{Message, MessageConsumer};

// ============================================================================
// Stream Events
// ============================================================================

/// Why a poll loop stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Cancel flag was raised by the caller
    Stopped,
    /// A read failed or the session was closed underneath the loop
    Error,
}

/// Event sent from the reader task over the hand-off channel
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    Message {
        /// Wall clock time the closing marker was read (microseconds)
        timestamp_us: u64,
        message: Message,
    },
    Status {
        text: String,
    },
    Error {
        kind: ErrorKind,
        detail: String,
    },
    Ended {
        reason: StopReason,
    },
}

impl StreamEvent {
    /// Replay this event on a consumer, e.g. on the receiving side of the
    /// reader channel. `Ended` has no consumer callback and is dropped.
    pub fn deliver_to<C: MessageConsumer + ?Sized>(self, consumer: &mut C) {
        match self {
            StreamEvent::Message { message, .. } => consumer.on_message(message),
            StreamEvent::Status { text } => consumer.on_status(&text),
            StreamEvent::Error { kind, detail } => consumer.on_error(kind, &detail),
            StreamEvent::Ended { .. } => {}
        }
    }
}
