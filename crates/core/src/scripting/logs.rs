//! Per-script log fan-out.
//!
//! [`ScriptLogHub`] keeps one `tokio::sync::broadcast` channel per script
//! name that currently has subscribers. Channels are created on the first
//! [`subscribe`](ScriptLogHub::subscribe) and removed when the last
//! [`LogSubscription`] is dropped. Publishing to a name nobody listens to is
//! a no-op. The hub is independent of the registry: it never sees
//! mutations, only evaluation output.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::Timestamp;

/// Default buffer capacity per script channel.
const DEFAULT_CAPACITY: usize = 256;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

/// One line of script output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLogEvent {
    pub script: String,
    pub version: i64,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: Timestamp,
}

impl ScriptLogEvent {
    pub fn new(script: &str, version: i64, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            script: script.to_string(),
            version,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Publish/subscribe hub keyed by script name.
#[derive(Debug)]
pub struct ScriptLogHub {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<ScriptLogEvent>>>,
}

impl ScriptLogHub {
    /// Create a hub whose per-script channels buffer `capacity` events.
    ///
    /// Slow subscribers that fall behind observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Start receiving events for `script`. Dropping the subscription
    /// unsubscribes.
    pub fn subscribe(self: &Arc<Self>, script: &str) -> LogSubscription {
        let mut channels = self.lock();
        let receiver = channels
            .entry(script.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        LogSubscription {
            hub: Arc::clone(self),
            script: script.to_string(),
            receiver: Some(receiver),
        }
    }

    /// Deliver `event` to the subscribers of `event.script`, if any.
    pub fn publish(&self, event: ScriptLogEvent) {
        if let Some(sender) = self.lock().get(&event.script) {
            // Only fails when there are no receivers left.
            let _ = sender.send(event);
        }
    }

    /// Number of live subscriptions for `script`.
    pub fn subscriber_count(&self, script: &str) -> usize {
        self.lock()
            .get(script)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Names that currently have a channel.
    pub fn active_channels(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, script: &str) {
        let mut channels = self.lock();
        if channels
            .get(script)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(script);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<ScriptLogEvent>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ScriptLogHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A live subscription to one script's log events.
#[derive(Debug)]
pub struct LogSubscription {
    hub: Arc<ScriptLogHub>,
    script: String,
    receiver: Option<broadcast::Receiver<ScriptLogEvent>>,
}

impl LogSubscription {
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Wait for the next event. `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Result<ScriptLogEvent, broadcast::error::RecvError>> {
        let receiver = self.receiver.as_mut()?;
        match receiver.recv().await {
            Err(broadcast::error::RecvError::Closed) => None,
            other => Some(other),
        }
    }

    /// Hand the raw receiver to a stream adapter while keeping the
    /// subscription alive for cleanup.
    pub fn take_receiver(&mut self) -> Option<broadcast::Receiver<ScriptLogEvent>> {
        self.receiver.take()
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        // The receiver must be gone before the hub counts what is left.
        drop(self.receiver.take());
        self.hub.release(&self.script);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
