//! Read-once gate over the active segment's key.
//!
//! ```text
//!            first read                 rotation
//!   ARMED ─────────────────▶ CONSUMED ───────────▶ ARMED
//! ```
//!
//! Reads are always answered; only the first read of a segment changes
//! state. Two one-shot timers bound how long a peer may hold the link:
//!
//! - bonding timeout, started on connect, disconnects a peer that never reads;
//! - post-read timeout, started on the first read, disconnects the peer
//!   that obtained the key.
//!
//! Timers are [`TimerToken`]s stored next to the state; dropping or
//! cancelling a token aborts its pending disconnect.

use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::channel::SharedChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No read since the current segment became active
    Armed,
    /// The current key has been read
    Consumed,
}

/// What a read did to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEffect {
    /// First read of this segment's key
    FirstRead,
    /// Key already consumed; no state change
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Bonding,
    PostRead,
}

/// A scheduled forced disconnect.
#[derive(Debug)]
pub struct TimerToken {
    deadline: Instant,
    handle: AbortHandle,
}

impl TimerToken {
    fn schedule(kind: TimerKind, after: Duration, channel: SharedChannel) -> Self {
        let deadline = Instant::now() + after;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            info!(timer = ?kind, "Timeout reached, disconnecting peer");
            channel.force_disconnect();
        });
        Self {
            deadline,
            handle: task.abort_handle(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel(self) {}
}

impl Drop for TimerToken {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct ReadOnceGate {
    state: GateState,
    connected: bool,
    bonding_timeout: Duration,
    read_timeout: Duration,
    bonding_timer: Option<TimerToken>,
    post_read_timer: Option<TimerToken>,
    channel: SharedChannel,
}

impl ReadOnceGate {
    pub fn new(channel: SharedChannel, bonding_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            state: GateState::Armed,
            connected: false,
            bonding_timeout,
            read_timeout,
            bonding_timer: None,
            post_read_timer: None,
            channel,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Deadline of the pending bonding disconnect, if armed.
    pub fn bonding_deadline(&self) -> Option<Instant> {
        self.bonding_timer.as_ref().map(TimerToken::deadline)
    }

    /// Deadline of the pending post-read disconnect, if armed.
    pub fn post_read_deadline(&self) -> Option<Instant> {
        self.post_read_timer.as_ref().map(TimerToken::deadline)
    }

    /// A peer connected: it has `bonding_timeout` to read the key.
    pub fn on_connect(&mut self) {
        self.connected = true;
        self.bonding_timer = Some(TimerToken::schedule(
            TimerKind::Bonding,
            self.bonding_timeout,
            self.channel.clone(),
        ));
        debug!(state = ?self.state, "Peer connected, bonding timer armed");
    }

    /// A peer read the key. The caller serves the bytes regardless of the
    /// returned effect.
    pub fn on_read(&mut self) -> ReadEffect {
        match self.state {
            GateState::Armed => {
                if let Some(timer) = self.bonding_timer.take() {
                    timer.cancel();
                }
                self.state = GateState::Consumed;
                self.post_read_timer = Some(TimerToken::schedule(
                    TimerKind::PostRead,
                    self.read_timeout,
                    self.channel.clone(),
                ));
                info!("Key read");
                ReadEffect::FirstRead
            }
            GateState::Consumed => {
                debug!("Key already read, connection is timing out");
                ReadEffect::Repeat
            }
        }
    }

    /// The peer is gone; nothing left to disconnect.
    pub fn on_disconnect(&mut self) {
        self.connected = false;
        self.cancel_timers();
        debug!(state = ?self.state, "Peer disconnected");
    }

    /// Re-arm for a new segment.
    ///
    /// Pending timers belong to the previous key and are cancelled. A peer
    /// still connected across the boundary gets a fresh bonding timer, so
    /// its link stays bounded under the new key too.
    pub fn reset(&mut self) {
        self.cancel_timers();
        self.state = GateState::Armed;
        if self.connected {
            self.on_connect();
        }
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.bonding_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.post_read_timer.take() {
            timer.cancel();
        }
    }
}
