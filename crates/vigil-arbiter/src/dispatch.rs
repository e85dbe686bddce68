//! Listener registry and the dispatch queue
//!
//! Delivery never happens under the arbitration lock. The arbiter pushes
//! commands onto an mpsc queue consumed by a single background task,
//! which fans events out to subscribers. A slow or dead subscriber loses
//! only its own events.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use vigil_core::{DistractionEvent, SubscriptionId, VigilError, VigilResult};

/// Buffered events per subscriber before overflow drops begin
const SUBSCRIBER_BUFFER: usize = 16;
/// Commands in flight between the arbiter and the dispatch task
const QUEUE_BUFFER: usize = 64;

enum DispatchCommand {
    /// Deliver to every subscriber
    Broadcast(DistractionEvent),
    /// Deliver the registration snapshot to one subscriber
    Snapshot(SubscriptionId, DistractionEvent),
}

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: HashMap<SubscriptionId, mpsc::Sender<DistractionEvent>>,
}

/// The dispatch side of the arbiter
pub(crate) struct Dispatcher {
    queue: mpsc::Sender<DispatchCommand>,
    registry: Arc<Mutex<ListenerRegistry>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the dispatch task. Requires a running Tokio runtime.
    pub fn start() -> Self {
        let (queue, mut commands) = mpsc::channel(QUEUE_BUFFER);
        let registry = Arc::new(Mutex::new(ListenerRegistry::default()));

        let worker = Arc::clone(&registry);
        let task = tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                match command {
                    DispatchCommand::Broadcast(event) => deliver_all(&worker, event),
                    DispatchCommand::Snapshot(id, event) => deliver_one(&worker, id, event),
                }
            }
        });

        Dispatcher {
            queue,
            registry,
            task: Mutex::new(Some(task)),
        }
    }

    /// Register a subscriber and queue its snapshot delivery
    pub fn add_listener(
        &self,
        snapshot: DistractionEvent,
    ) -> (SubscriptionId, mpsc::Receiver<DistractionEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = {
            let mut registry = self.registry.lock();
            registry.next_id += 1;
            let id = SubscriptionId::new(registry.next_id);
            registry.listeners.insert(id, tx);
            id
        };

        // Late subscribers see the current state without waiting for the
        // next arbitration round.
        self.enqueue(DispatchCommand::Snapshot(id, snapshot));
        (id, rx)
    }

    pub fn remove_listener(&self, id: SubscriptionId) -> VigilResult<()> {
        match self.registry.lock().listeners.remove(&id) {
            Some(_) => Ok(()),
            None => Err(VigilError::UnknownSubscription(id)),
        }
    }

    pub fn broadcast(&self, event: DistractionEvent) {
        self.enqueue(DispatchCommand::Broadcast(event));
    }

    fn enqueue(&self, command: DispatchCommand) {
        // Arbitration never blocks on delivery; a rejected command is a
        // logged drop.
        if self.queue.try_send(command).is_err() {
            tracing::warn!("dispatch queue rejected command, event dropped");
        }
    }

    /// Stop the dispatch task and drop every subscription. Idempotent.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.registry.lock().listeners.clear();
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

fn deliver_all(registry: &Mutex<ListenerRegistry>, event: DistractionEvent) {
    // Senders are cloned out so the registry lock is not held during sends.
    let listeners: Vec<_> = registry
        .lock()
        .listeners
        .iter()
        .map(|(id, tx)| (*id, tx.clone()))
        .collect();

    let mut gone = Vec::new();
    for (id, tx) in listeners {
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    error = %VigilError::DispatchOverflow(id),
                    "subscriber too slow, event dropped"
                );
            }
            Err(TrySendError::Closed(_)) => gone.push(id),
        }
    }

    if !gone.is_empty() {
        let mut registry = registry.lock();
        for id in gone {
            registry.listeners.remove(&id);
            tracing::debug!(subscription = %id, "subscriber gone, removed");
        }
    }
}

fn deliver_one(registry: &Mutex<ListenerRegistry>, id: SubscriptionId, event: DistractionEvent) {
    let Some(tx) = registry.lock().listeners.get(&id).cloned() else {
        return;
    };
    match tx.try_send(event) {
        Ok(()) | Err(TrySendError::Full(_)) => {}
        Err(TrySendError::Closed(_)) => {
            registry.lock().listeners.remove(&id);
        }
    }
}
