//! Event Dispatcher - in-process publish/subscribe bus
//!
//! Handles:
//! - One unbounded queue per event kind, created up front
//! - Exactly one handler per kind; a second subscription is rejected
//! - Handler invocations on a shared semaphore-bounded worker pool
//! - In-flight tracking so shutdown can drain
//!
//! Events published before a kind's handler subscribes wait in its queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::DispatchError;
use crate::event::{DeliveryEvent, EventKind};

/// Subscriber for one event kind
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    fn kind(&self) -> EventKind;

    /// Must not fail; every error path is handled inside
    async fn handle(&self, event: DeliveryEvent);
}

/// Counts published events until their handler returns
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn acquire(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Releases its in-flight slot even if the handler panics
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Cheap cloneable publishing side of the dispatcher
#[derive(Clone)]
pub struct EventPublisher {
    queues: Arc<HashMap<EventKind, mpsc::UnboundedSender<DeliveryEvent>>>,
    in_flight: Arc<InFlight>,
}

impl EventPublisher {
    /// Enqueue an event for its kind's handler. Never waits.
    pub fn publish(&self, event: DeliveryEvent) -> Result<(), DispatchError> {
        let kind = event.kind;
        let queue = self.queues.get(&kind).ok_or(DispatchError::NoQueue(kind))?;

        self.in_flight.acquire();
        if queue.send(event).is_err() {
            self.in_flight.release();
            return Err(DispatchError::Closed(kind));
        }

        debug!(kind = %kind, "Event published");
        Ok(())
    }

    /// Events published but not yet fully handled
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }
}

pub struct EventDispatcher {
    publisher: EventPublisher,
    receivers: Mutex<HashMap<EventKind, mpsc::UnboundedReceiver<DeliveryEvent>>>,
    /// Worker pool shared by every kind
    semaphore: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
    shut_down: AtomicBool,
}

impl EventDispatcher {
    pub fn new(concurrency: usize) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for kind in EventKind::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(kind, tx);
            receivers.insert(kind, rx);
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            publisher: EventPublisher {
                queues: Arc::new(senders),
                in_flight: Arc::new(InFlight::default()),
            },
            receivers: Mutex::new(receivers),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            shutdown_tx,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// Register the single handler for `handler.kind()` and start its loop
    pub fn subscribe(&self, handler: Arc<dyn DeliveryHandler>) -> Result<JoinHandle<()>, DispatchError> {
        let kind = handler.kind();
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(DispatchError::Closed(kind));
        }

        let mut rx = self
            .receivers
            .lock()
            .remove(&kind)
            .ok_or(DispatchError::AlreadySubscribed(kind))?;

        let semaphore = self.semaphore.clone();
        let in_flight = self.publisher.in_flight.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(kind = %kind, "Handler subscribed");

        Ok(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    received = rx.recv() => match received {
                        Some(event) => event,
                        None => break,
                    },
                    _ = shutdown_rx.recv() => {
                        info!(kind = %kind, "Dispatch loop shutting down");
                        break;
                    }
                };

                let guard = InFlightGuard(in_flight.clone());
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        error!(kind = %kind, "Worker pool closed");
                        break;
                    }
                };

                let handler = handler.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    handler.handle(event).await;
                });
            }
        }))
    }

    /// Stop every dispatch loop. Handlers already running finish on their own.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Resolves once every published event has been handled
    pub async fn wait_idle(&self) {
        let in_flight = &self.publisher.in_flight;
        loop {
            let notified = in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
