//! Live fan-out of serialized event payloads.
//!
//! [`Hub`] is an actor: one task owns the subscriber set and every
//! register/unregister/broadcast reaches it as a message. Nothing here ever
//! blocks a producer.
//!
//! ```text
//! HubHandle::register/unregister --unbounded--> +-----+ --try_send--> subscriber 1
//! HubHandle::broadcast ------bounded, try_send--> | Hub | --try_send--> subscriber 2
//!                                                 +-----+ --try_send--> ...
//! ```
//!
//! A full broadcast queue drops the newest payload; a full subscriber buffer
//! drops only that subscriber's copy.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tailhub_core::metrics as m;

enum Command {
    Register { id: Uuid, tx: mpsc::Sender<Bytes> },
    Unregister(Uuid),
}

/// Coordinating task state. Create with [`Hub::new`], then spawn [`Hub::run`].
pub struct Hub {
    control: mpsc::UnboundedReceiver<Command>,
    queue: mpsc::Receiver<Bytes>,
    subscribers: HashMap<Uuid, mpsc::Sender<Bytes>>,
}

/// Cloneable entry point into a running [`Hub`].
#[derive(Clone)]
pub struct HubHandle {
    control: mpsc::UnboundedSender<Command>,
    queue: mpsc::Sender<Bytes>,
    subscriber_buffer: usize,
}

/// A registered live-stream consumer.
///
/// `recv` returns `None` once the subscriber is unregistered or the hub
/// shuts down.
pub struct Subscription {
    pub id: Uuid,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Hub {
    /// Builds the hub and its handle.
    ///
    /// `queue_capacity` bounds pending broadcasts, `subscriber_buffer`
    /// bounds each subscriber's own queue. Zero values are raised to 1.
    pub fn new(queue_capacity: usize, subscriber_buffer: usize) -> (Self, HubHandle) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity.max(1));

        let hub = Self {
            control: control_rx,
            queue: queue_rx,
            subscribers: HashMap::new(),
        };
        let handle = HubHandle {
            control: control_tx,
            queue: queue_tx,
            subscriber_buffer: subscriber_buffer.max(1),
        };
        (hub, handle)
    }

    /// Serves commands and broadcasts until `cancel` fires.
    ///
    /// On exit every subscriber is closed.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!("hub started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(cmd) = self.control.recv() => self.handle_command(cmd),
                Some(payload) = self.queue.recv() => self.deliver(&payload),
                else => break,
            }
        }

        let closed = self.subscribers.len();
        self.subscribers.clear();
        metrics::gauge!(m::HUB_SUBSCRIBERS).set(0.0);
        tracing::debug!(subscribers = closed, "hub stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Register { id, tx } => {
                self.subscribers.insert(id, tx);
                tracing::debug!(subscriber = %id, total = self.subscribers.len(), "subscriber registered");
            }
            Command::Unregister(id) => {
                // dropping the sender ends the subscriber's stream
                if self.subscribers.remove(&id).is_some() {
                    tracing::debug!(subscriber = %id, total = self.subscribers.len(), "subscriber unregistered");
                }
            }
        }
        metrics::gauge!(m::HUB_SUBSCRIBERS).set(self.subscribers.len() as f64);
    }

    fn deliver(&mut self, payload: &Bytes) {
        let mut gone = Vec::new();
        for (id, tx) in &self.subscribers {
            match tx.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    metrics::counter!(m::HUB_DROPPED_TOTAL).increment(1);
                }
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }
        if !gone.is_empty() {
            for id in gone {
                self.subscribers.remove(&id);
            }
            metrics::gauge!(m::HUB_SUBSCRIBERS).set(self.subscribers.len() as f64);
        }
    }
}

impl HubHandle {
    /// Registers a new subscriber with its own bounded buffer.
    ///
    /// If the hub has already stopped the returned subscription is closed.
    pub fn register(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        if self.control.send(Command::Register { id, tx }).is_err() {
            tracing::debug!(subscriber = %id, "hub stopped, subscription closed");
        }
        Subscription { id, rx }
    }

    /// Removes a subscriber and closes its stream. Unknown ids are ignored.
    pub fn unregister(&self, id: Uuid) {
        let _ = self.control.send(Command::Unregister(id));
    }

    /// Queues `payload` for fan-out without waiting.
    ///
    /// Returns `false` when the payload was dropped (queue full, hub
    /// stopped or empty payload).
    pub fn broadcast(&self, payload: Bytes) -> bool {
        if payload.is_empty() {
            return false;
        }
        match self.queue.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                metrics::counter!(m::HUB_DROPPED_TOTAL).increment(1);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn spawn_hub(queue: usize, buffer: usize) -> (HubHandle, CancellationToken, tokio::task::JoinHandle<()>) {
        let (hub, handle) = Hub::new(queue, buffer);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(hub.run(cancel.clone()));
        (handle, cancel, task)
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_does_not_block() {
        let (handle, cancel, task) = spawn_hub(4, 4);
        for _ in 0..100 {
            handle.broadcast(Bytes::from_static(b"{}"));
        }
        cancel.cancel();
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn subscribers_receive_broadcasts() {
        let (handle, cancel, _task) = spawn_hub(8, 8);
        let mut a = handle.register();
        let mut b = handle.register();

        assert!(handle.broadcast(Bytes::from_static(b"one")));
        assert_eq!(timeout(WAIT, a.recv()).await.unwrap().unwrap(), "one");
        assert_eq!(timeout(WAIT, b.recv()).await.unwrap().unwrap(), "one");
        cancel.cancel();
    }

    #[tokio::test]
    async fn full_queue_drops_newest() {
        // hub not running, so nothing drains the queue
        let (_hub, handle) = Hub::new(1, 1);
        assert!(handle.broadcast(Bytes::from_static(b"first")));
        assert!(!handle.broadcast(Bytes::from_static(b"second")));
    }

    #[tokio::test]
    async fn slow_subscriber_only_loses_its_own_copy() {
        let (handle, cancel, _task) = spawn_hub(16, 1);
        let mut slow = handle.register();
        let mut fast = handle.register();

        handle.broadcast(Bytes::from_static(b"1"));
        assert_eq!(timeout(WAIT, fast.recv()).await.unwrap().unwrap(), "1");
        handle.broadcast(Bytes::from_static(b"2"));
        assert_eq!(timeout(WAIT, fast.recv()).await.unwrap().unwrap(), "2");

        // slow kept only the first payload; the second was dropped for it
        assert_eq!(timeout(WAIT, slow.recv()).await.unwrap().unwrap(), "1");
        handle.broadcast(Bytes::from_static(b"3"));
        assert_eq!(timeout(WAIT, slow.recv()).await.unwrap().unwrap(), "3");
        cancel.cancel();
    }

    #[tokio::test]
    async fn unregister_closes_stream_and_is_idempotent() {
        let (handle, cancel, _task) = spawn_hub(4, 4);
        let mut sub = handle.register();
        handle.unregister(sub.id);
        handle.unregister(sub.id);
        handle.unregister(Uuid::new_v4());

        assert!(timeout(WAIT, sub.recv()).await.unwrap().is_none());
        cancel.cancel();
    }

    #[tokio::test]
    async fn shutdown_closes_every_subscriber() {
        let (handle, cancel, task) = spawn_hub(4, 4);
        let mut a = handle.register();
        let mut b = handle.register();
        // let the hub pick up both registrations
        handle.broadcast(Bytes::from_static(b"x"));
        timeout(WAIT, a.recv()).await.unwrap().unwrap();
        timeout(WAIT, b.recv()).await.unwrap().unwrap();

        cancel.cancel();
        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn register_after_shutdown_is_closed() {
        let (handle, cancel, task) = spawn_hub(4, 4);
        cancel.cancel();
        timeout(WAIT, task).await.unwrap().unwrap();

        let mut sub = handle.register();
        assert!(sub.recv().await.is_none());
        assert!(!handle.broadcast(Bytes::from_static(b"late")));
    }

    #[test]
    fn empty_payload_is_ignored() {
        let (_hub, handle) = Hub::new(1, 1);
        assert!(!handle.broadcast(Bytes::new()));
    }
}
