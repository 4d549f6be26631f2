use crate::error::TransportError;
use crate::message::{self, Message, Selector};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Caller-owned handle awaiting messages routed by a selector.
///
/// A listener receives either matching messages until it is removed, or a
/// single terminal error delivered by `Dispatcher::error_all`.
pub struct Listener {
    rx: mpsc::UnboundedReceiver<Result<Message, TransportError>>,
}

impl Listener {
    /// Await the next matching message or terminal error.
    pub async fn next(&mut self) -> Result<Message, TransportError> {
        match self.rx.recv().await {
            Some(result) => result,
            None => Err(TransportError::ListenerRemoved),
        }
    }

    /// Await the next matching message or terminal error, bounded by a
    /// deadline.
    pub async fn next_timeout(&mut self, timeout: Duration) -> Result<Message, TransportError> {
        match tokio::time::timeout(timeout, self.next()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

type ListenerTx = mpsc::UnboundedSender<Result<Message, TransportError>>;

/// Routes decoded inbound messages to the listener registered for the most
/// specific matching selector, and fans a fatal error out to every
/// registered listener so no caller blocks past a transport failure.
#[derive(Default)]
pub struct Dispatcher {
    listeners: Mutex<HashMap<Selector, ListenerTx>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register a listener for `selector`. At most one listener may be
    /// registered per distinct selector at a time.
    pub fn add_listener(&self, selector: Selector) -> Result<Listener, TransportError> {
        let mut listeners = self.listeners.lock().unwrap();
        if listeners.contains_key(&selector) {
            return Err(TransportError::DuplicateListener(selector));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        listeners.insert(selector, tx);
        Ok(Listener { rx })
    }

    pub fn remove_listener(&self, selector: &Selector) {
        self.listeners.lock().unwrap().remove(selector);
    }

    /// Decode an inbound frame and route it to the matching listener.
    /// Unroutable or undecodable messages are dropped.
    pub fn dispatch(&self, buf: &[u8]) {
        let msg = match message::decode(buf) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(error = %err, "Dropping undecodable frame");
                return;
            }
        };

        let envelope = *msg.envelope();
        let listeners = self.listeners.lock().unwrap();
        let target = listeners
            .iter()
            .filter(|(selector, _)| selector.matches(&envelope))
            .max_by_key(|(selector, _)| selector.specificity());

        match target {
            Some((selector, tx)) => {
                trace!(?selector, "Dispatching message");
                let _ = tx.send(Ok(msg));
            }
            None => {
                debug!(?envelope, "No listener for message; dropping");
            }
        }
    }

    /// Deliver `err` to every registered listener exactly once. The
    /// listeners stay registered; the error is terminal for each of them.
    pub fn error_all(&self, err: &TransportError) {
        let listeners = self.listeners.lock().unwrap();
        for tx in listeners.values() {
            let _ = tx.send(Err(err.clone()));
        }
    }

    /// Forcibly remove all listeners. Called at the start of a fresh
    /// orchestration attempt so no stale selector blocks a registration.
    pub fn clear(&self) {
        self.listeners.lock().unwrap().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}
