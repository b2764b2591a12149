//! Message Bus for query progress events
//!
//! The MessageBus provides a pub/sub pattern so the CLI (or any other
//! front-end) can follow a query live without coupling to the iteration
//! controller. It uses bounded channels to prevent unbounded memory growth
//! and supports both specific event subscriptions and global "All"
//! subscriptions.
//!
//! Publishing never waits on subscribers: a full channel drops the event for
//! that subscriber only, so a slow consumer cannot stall a running query.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Channel buffer size for bounded channels
pub const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// The planner produced a plan
    PlanCreated,
    /// A task acquired a worker and started running
    TaskStarted,
    /// A task reached a terminal status
    TaskCompleted,
    /// The controller is starting another planning round
    IterationAdvanced,
    /// The query reached a terminal state
    QueryFinished,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PlanCreated {
        plan_id: String,
        iteration: u32,
        tasks: Vec<String>,
        degraded: bool,
    },
    TaskStarted {
        task_id: String,
        label: String,
        pages: usize,
    },
    TaskCompleted {
        task_id: String,
        label: String,
        success: bool,
        cost: f64,
        elapsed_ms: u64,
        failure: Option<String>,
    },
    IterationAdvanced {
        iteration: u32,
    },
    /// `aborted` is set when the query ended in an error
    QueryFinished {
        iterations: u32,
        cancelled: bool,
        aborted: bool,
        cost: f64,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::PlanCreated { .. } => EventType::PlanCreated,
            Event::TaskStarted { .. } => EventType::TaskStarted,
            Event::TaskCompleted { .. } => EventType::TaskCompleted,
            Event::IterationAdvanced { .. } => EventType::IterationAdvanced,
            Event::QueryFinished { .. } => EventType::QueryFinished,
        }
    }
}

/// Message bus for pub/sub communication between components
pub struct MessageBus {
    /// Map of event types to lists of subscribers
    /// Each subscriber gets a bounded channel with CHANNEL_BUFFER_SIZE capacity
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers
    ///
    /// The event is sent to subscribers of its type and to `All`
    /// subscribers. Subscribers whose receiver was dropped are removed.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!("Dropping {:?} event for a full subscriber", event_type);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    /// Number of live subscribers across all event types
    pub async fn subscriber_count(&self) -> usize {
        let channels = self.channels.lock().await;
        channels.values().map(|v| v.len()).sum()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
