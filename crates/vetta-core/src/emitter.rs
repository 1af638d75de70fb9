//! Event emitter handle threaded through the turn pipeline.
//!
//! The blocking and streaming entry points share one code path; the only
//! difference is the emitter. A silent emitter drops every event, a channel
//! emitter forwards them to the stream consumer. Sends are infallible: a
//! consumer that disconnects mid-stream (client cancellation) must never
//! abort the turn, so send errors are ignored and the turn runs to its
//! commit point.

use tokio::sync::mpsc::UnboundedSender;

use vetta_types::event::{TurnEvent, TurnStage};

/// Handle for emitting observation events during a turn.
#[derive(Clone, Default)]
pub struct TurnEmitter {
    sender: Option<UnboundedSender<TurnEvent>>,
}

impl TurnEmitter {
    /// Emitter that discards all events (blocking invocation).
    pub fn silent() -> Self {
        Self { sender: None }
    }

    /// Emitter that forwards events to a channel (streaming invocation).
    pub fn channel(sender: UnboundedSender<TurnEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn token(&self, text: impl Into<String>) {
        self.emit(TurnEvent::Token { text: text.into() });
    }

    pub fn node(&self, stage: TurnStage, detail: impl Into<String>) {
        self.emit(TurnEvent::NodeUpdate {
            stage,
            detail: detail.into(),
        });
    }

    pub fn custom(&self, stage: impl Into<String>, detail: serde_json::Value) {
        self.emit(TurnEvent::Custom {
            stage: stage.into(),
            detail,
        });
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(sender) = &self.sender {
            // A dropped receiver means the client went away; the turn still
            // completes and commits.
            let _ = sender.send(event);
        }
    }
}
