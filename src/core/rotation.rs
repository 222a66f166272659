//! Segment rotation controller.
//!
//! Owns the active [`Segment`], the capture device and the read-once gate.
//! On every tick of a fixed-period timer it closes the active segment,
//! opens the next one under fresh key material and hands the closed one to
//! the pipeline (or deletes it when nobody read its key). Rotation never
//! waits for a job to finish.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use rand::rngs::OsRng;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use zeroize::Zeroize;

use crate::capture::CaptureDevice;
use crate::channel::{KeyCharacteristic, PeerEvent, PeerEvents, SharedChannel};
use crate::core::gate::{GateState, ReadEffect, ReadOnceGate};
use crate::core::pipeline::{JobReport, Pipeline};
use crate::core::segment::{Segment, SegmentClock, SegmentSnapshot};
use crate::error::AgentError;
use crate::keys::{mint_destination, DisclosedKey, EntropySource, KeyError, KeyMaterial};
use crate::transparency::SharedTransparencyLog;

/// Timing and naming inputs of the controller.
#[derive(Debug, Clone)]
pub struct RotationSettings {
    pub segment_duration: Duration,
    pub bonding_timeout: Duration,
    pub read_timeout: Duration,
    pub work_dir: PathBuf,
    /// Public prefix the uploaded objects appear under
    pub base_url: String,
}

/// What happened to the segment closed by a rotation.
#[derive(Debug)]
pub enum Handoff {
    /// First rotation; nothing was closed
    Started,
    /// Key was read; a pipeline job is running
    Processing(JoinHandle<JobReport>),
    /// Key was never read; the recording is being deleted
    Discarded(JoinHandle<()>),
}

impl Handoff {
    pub fn is_finished(&self) -> bool {
        match self {
            Handoff::Started => true,
            Handoff::Processing(handle) => handle.is_finished(),
            Handoff::Discarded(handle) => handle.is_finished(),
        }
    }

    /// Wait for the background work. Returns the job report, if a job ran.
    pub async fn join(self) -> Option<JobReport> {
        match self {
            Handoff::Started => None,
            Handoff::Processing(handle) => match handle.await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(error = %e, "Pipeline job panicked");
                    None
                }
            },
            Handoff::Discarded(handle) => {
                if let Err(e) = handle.await {
                    error!(error = %e, "Discard task panicked");
                }
                None
            }
        }
    }
}

pub struct RotationController {
    settings: RotationSettings,
    capture: Box<dyn CaptureDevice>,
    channel: SharedChannel,
    gate: ReadOnceGate,
    characteristic: KeyCharacteristic,
    active: Option<Segment>,
    clock: SegmentClock,
    pipeline: Arc<Pipeline>,
    transparency: SharedTransparencyLog,
    entropy: Box<dyn EntropySource>,
}

impl RotationController {
    pub fn new(
        settings: RotationSettings,
        capture: Box<dyn CaptureDevice>,
        channel: SharedChannel,
        pipeline: Arc<Pipeline>,
        transparency: SharedTransparencyLog,
    ) -> Self {
        let gate = ReadOnceGate::new(
            channel.clone(),
            settings.bonding_timeout,
            settings.read_timeout,
        );
        Self {
            settings,
            capture,
            channel,
            gate,
            characteristic: KeyCharacteristic::new(),
            active: None,
            clock: SegmentClock::new(),
            pipeline,
            transparency,
            entropy: Box::new(OsRng),
        }
    }

    /// Draw key material from `entropy` instead of the OS RNG.
    pub fn with_entropy(mut self, entropy: Box<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn gate(&self) -> &ReadOnceGate {
        &self.gate
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn active_segment(&self) -> Option<&Segment> {
        self.active.as_ref()
    }

    /// Close the active segment and open the next one.
    ///
    /// Fresh key material is drawn before anything is torn down, so an
    /// entropy failure leaves the active segment untouched and is returned
    /// to the caller. Capture failures are logged and do not stop the
    /// rotation.
    pub async fn rotate(&mut self) -> Result<Handoff, KeyError> {
        let material = KeyMaterial::generate_from(self.entropy.as_mut())?;
        let destination = mint_destination();
        let now = Utc::now();

        if let Err(e) = self.capture.stop().await {
            warn!(error = %e, "Failed to stop capture");
        }
        let closed = self.active.take().map(|segment| segment.close(now));

        let id = self.clock.next_id(now);
        let segment = Segment::open(id, &self.settings.work_dir, material, destination, now);

        if let Err(e) = self.capture.start(segment.raw_path()).await {
            error!(
                segment = %segment.id(),
                error = %e,
                "Failed to start capture, segment will be empty"
            );
        }

        self.gate.reset();
        self.publish(&segment);
        self.transparency.record_segment();
        info!(segment = %segment.id(), "Recording new segment");
        self.active = Some(segment);

        Ok(match closed {
            None => Handoff::Started,
            Some(snapshot) => self.hand_off(snapshot),
        })
    }

    fn publish(&mut self, segment: &Segment) {
        let mut payload = DisclosedKey::new(
            segment.material(),
            segment.destination(),
            &self.settings.base_url,
            self.settings.segment_duration,
        );
        let bytes = payload.to_bytes();
        self.characteristic.update(&bytes);
        self.channel.set_current_value(&bytes);

        let shown = payload.redacted();
        payload.zeroize();
        debug!(
            segment = %segment.id(),
            destination = %shown.destination,
            url = %shown.url,
            reconnect_in = shown.reconnect_in,
            "Published key"
        );
    }

    fn hand_off(&self, snapshot: SegmentSnapshot) -> Handoff {
        if snapshot.was_key_read() {
            info!(
                segment = %snapshot.id,
                reads = snapshot.reads,
                "Key was read, processing previous recording"
            );
            Handoff::Processing(self.pipeline.spawn_job(snapshot))
        } else {
            Handoff::Discarded(self.pipeline.spawn_discard(snapshot))
        }
    }

    /// Apply one peripheral event to the gate and the active segment.
    pub fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Connect { peer } => {
                info!(
                    peer = peer.as_deref().unwrap_or("unknown"),
                    "Peer connected"
                );
                self.gate.on_connect();
            }
            PeerEvent::Read { offset, reply } => {
                let Some(segment) = self.active.as_mut() else {
                    let _ = reply.send(Vec::new());
                    return;
                };
                if self.gate.on_read() == ReadEffect::FirstRead {
                    segment.mark_read();
                    self.transparency.record_key_read();
                    info!(segment = %segment.id(), "Key read for segment");
                }
                // Serving the value never depends on the gate state.
                let _ = reply.send(self.characteristic.read(offset));
            }
            PeerEvent::Disconnect => {
                self.gate.on_disconnect();
            }
        }
    }

    /// Stop capture, drop any connected peer and dispatch the active
    /// segment.
    pub async fn finish(&mut self) -> Option<Handoff> {
        if let Err(e) = self.capture.stop().await {
            warn!(error = %e, "Failed to stop capture");
        }
        if self.gate.is_connected() {
            self.channel.force_disconnect();
        }
        self.gate.on_disconnect();
        self.channel.set_current_value(&[]);
        self.characteristic.update(&[]);

        let snapshot = self.active.take()?.close(Utc::now());
        Some(self.hand_off(snapshot))
    }

    /// Rotate every segment period until `shutdown` flips to `true`.
    ///
    /// The active segment is dispatched on shutdown and every in-flight job
    /// is awaited before returning.
    pub async fn run(
        mut self,
        mut events: PeerEvents,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), AgentError> {
        let period = self.settings.segment_duration;
        let mut inflight = vec![self.rotate().await?];

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let handoff = self.rotate().await?;
                    inflight.retain(|h| !h.is_finished());
                    inflight.push(handoff);
                }
                Some(event) = events.recv() => self.handle_peer_event(event),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Shutting down, waiting for in-flight jobs");
        if let Some(handoff) = self.finish().await {
            inflight.push(handoff);
        }
        for handoff in inflight {
            handoff.join().await;
        }
        Ok(())
    }
}
