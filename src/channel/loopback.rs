//! In-process credential channel.
//!
//! Stands in for the radio when no peripheral daemon is configured, and
//! lets tests play the peer: connect, read at offsets, disconnect.
//!
//! Only the value currently published is held. Replacing it wipes the
//! previous payload.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use zeroize::Zeroizing;

use super::{CredentialChannel, PeerEvent, PeerEvents};

#[derive(Debug)]
pub struct LoopbackChannel {
    events: mpsc::UnboundedSender<PeerEvent>,
    current: Mutex<Option<Zeroizing<Vec<u8>>>>,
    publishes: AtomicU64,
    disconnects: AtomicU64,
}

impl LoopbackChannel {
    /// Create a channel and the event stream the agent consumes.
    pub fn new() -> (Arc<Self>, PeerEvents) {
        let (events, receiver) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            events,
            current: Mutex::new(None),
            publishes: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
        });
        (channel, receiver)
    }

    /// Simulate a peer connecting.
    pub fn connect(&self, peer: &str) {
        let _ = self.events.send(PeerEvent::Connect {
            peer: Some(peer.to_string()),
        });
    }

    /// Simulate a read request; resolves once the agent has answered.
    pub async fn read(&self, offset: usize) -> Option<Vec<u8>> {
        let (reply, response) = oneshot::channel();
        self.events.send(PeerEvent::Read { offset, reply }).ok()?;
        response.await.ok()
    }

    /// Simulate the peer leaving.
    pub fn disconnect(&self) {
        let _ = self.events.send(PeerEvent::Disconnect);
    }

    /// Number of forced disconnects issued by the agent.
    pub fn disconnect_count(&self) -> u64 {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// The value currently served, if any.
    pub fn current_value(&self) -> Option<Vec<u8>> {
        self.current
            .lock()
            .ok()
            .and_then(|current| current.as_ref().map(|value| value.to_vec()))
    }

    /// Number of values published so far.
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::SeqCst)
    }
}

impl CredentialChannel for LoopbackChannel {
    fn set_current_value(&self, value: &[u8]) {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut current) = self.current.lock() {
            // Dropping the old Zeroizing buffer wipes it.
            *current = Some(Zeroizing::new(value.to_vec()));
        }
    }

    fn force_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        // The link layer reports the drop like any other disconnect.
        let _ = self.events.send(PeerEvent::Disconnect);
    }
}
