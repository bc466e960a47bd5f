//! Task event fan-out
//!
//! A thin wrapper over a `tokio::sync::broadcast` channel. Every subscriber
//! receives every event published after it subscribed; events for the same
//! task arrive in the order the registry applied them.

use crate::types::TaskEvent;
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// Broadcast channel for [`TaskEvent`]s
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all current subscribers
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: TaskEvent) {
        // send() only fails when nobody is listening
        self.tx.send(event).ok();
    }

    /// Subscribe to future events
    ///
    /// A subscriber that falls more than the buffer size behind gets
    /// `RecvError::Lagged` and should re-read the task list.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Subscribe as a stream; lag gaps are logged and skipped
    pub fn subscribe_stream(&self) -> impl Stream<Item = TaskEvent> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event subscriber lagged, events dropped");
                None
            }
        })
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
