//! Bridge to an external peripheral daemon over a Unix socket.
//!
//! The radio stack (GATT server, advertising, bonding) lives in a separate
//! daemon. It connects to the socket served here and exchanges
//! newline-delimited JSON:
//!
//! ```text
//! daemon -> agent   {"type":"connect","peer":"aa:bb:cc:dd:ee:ff"}
//!                   {"type":"read","id":7,"offset":0}
//!                   {"type":"disconnect"}
//! agent  -> daemon  {"type":"advertise","name":..,"service":..,"characteristic":..}
//!                   {"type":"value","length":182}
//!                   {"type":"read_response","id":7,"data":"7b226b6579..."}
//!                   {"type":"disconnect"}
//! ```
//!
//! Only one daemon connection is served at a time.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{ChannelError, CredentialChannel, PeerEvent, PeerEvents};

/// What the daemon should advertise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub name: String,
    pub service: String,
    pub characteristic: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DaemonMessage {
    Connect {
        #[serde(default)]
        peer: Option<String>,
    },
    Read {
        id: u64,
        #[serde(default)]
        offset: usize,
    },
    Disconnect,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AgentMessage {
    Advertise {
        name: String,
        service: String,
        characteristic: String,
    },
    Value {
        length: usize,
    },
    ReadResponse {
        id: u64,
        data: String,
    },
    Disconnect,
}

pub struct PeripheralBridge {
    advertisement: Advertisement,
    outgoing: Mutex<Option<mpsc::UnboundedSender<AgentMessage>>>,
    value_len: AtomicUsize,
}

impl PeripheralBridge {
    /// Bind the socket and start accepting daemon connections.
    ///
    /// Returns the bridge, the peer event stream for the agent, and a
    /// shutdown handle.
    pub async fn bind(
        path: &Path,
        advertisement: Advertisement,
    ) -> Result<(Arc<Self>, PeerEvents, oneshot::Sender<()>), ChannelError> {
        // A socket left behind by a previous run blocks bind.
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path).map_err(|source| ChannelError::Bind {
            path: path.display().to_string(),
            source,
        })?;

        info!(socket = %path.display(), "Peripheral bridge listening");

        let bridge = Arc::new(Self {
            advertisement,
            outgoing: Mutex::new(None),
            value_len: AtomicUsize::new(0),
        });
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task_bridge = bridge.clone();
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            warn!(error = %e, "Peripheral accept failed");
                            continue;
                        }
                    },
                };

                info!("Peripheral daemon connected");
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = task_bridge.serve(stream, &events_tx) => {
                        info!("Peripheral daemon disconnected");
                    }
                }
            }
            debug!("Peripheral bridge stopped");
        });

        Ok((bridge, events_rx, shutdown_tx))
    }

    fn send(&self, message: AgentMessage) {
        if let Ok(outgoing) = self.outgoing.lock() {
            if let Some(ref tx) = *outgoing {
                let _ = tx.send(message);
            }
        }
    }

    fn set_outgoing(&self, tx: Option<mpsc::UnboundedSender<AgentMessage>>) {
        if let Ok(mut outgoing) = self.outgoing.lock() {
            *outgoing = tx;
        }
    }

    async fn serve(&self, stream: UnixStream, events: &mpsc::UnboundedSender<PeerEvent>) {
        let (read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<AgentMessage>();

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let mut line = match serde_json::to_vec(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode bridge message");
                        continue;
                    }
                };
                line.push(b'\n');
                if write_half.write_all(&line).await.is_err() {
                    break;
                }
            }
        });

        let _ = tx.send(AgentMessage::Advertise {
            name: self.advertisement.name.clone(),
            service: self.advertisement.service.clone(),
            characteristic: self.advertisement.characteristic.clone(),
        });
        let _ = tx.send(AgentMessage::Value {
            length: self.value_len.load(Ordering::SeqCst),
        });
        self.set_outgoing(Some(tx.clone()));

        let mut lines = BufReader::new(read_half).lines();
        let mut peer_connected = false;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Peripheral socket read failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<DaemonMessage>(&line) {
                Ok(DaemonMessage::Connect { peer }) => {
                    peer_connected = true;
                    let _ = events.send(PeerEvent::Connect { peer });
                }
                Ok(DaemonMessage::Read { id, offset }) => {
                    let (reply, response) = oneshot::channel();
                    if events.send(PeerEvent::Read { offset, reply }).is_err() {
                        break;
                    }
                    let data = response.await.unwrap_or_default();
                    let _ = tx.send(AgentMessage::ReadResponse {
                        id,
                        data: hex::encode(data),
                    });
                }
                Ok(DaemonMessage::Disconnect) => {
                    peer_connected = false;
                    let _ = events.send(PeerEvent::Disconnect);
                }
                Err(e) => warn!(error = %e, "Ignoring malformed peripheral message"),
            }
        }

        // A daemon that goes away takes its peer with it.
        if peer_connected {
            let _ = events.send(PeerEvent::Disconnect);
        }
        self.set_outgoing(None);
        drop(tx);
        let _ = writer.await;
    }
}

impl CredentialChannel for PeripheralBridge {
    fn set_current_value(&self, value: &[u8]) {
        self.value_len.store(value.len(), Ordering::SeqCst);
        self.send(AgentMessage::Value {
            length: value.len(),
        });
    }

    fn force_disconnect(&self) {
        self.send(AgentMessage::Disconnect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertisement() -> Advertisement {
        Advertisement {
            name: "CryptoCam".to_string(),
            service: "svc".to_string(),
            characteristic: "chr".to_string(),
        }
    }

    #[tokio::test]
    async fn test_daemon_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("peripheral.sock");
        let (bridge, mut events, _shutdown) = PeripheralBridge::bind(&socket, advertisement())
            .await
            .unwrap();
        bridge.set_current_value(b"secret-payload");

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let advertise: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(advertise["type"], "advertise");
        assert_eq!(advertise["name"], "CryptoCam");

        let value: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(value["type"], "value");
        assert_eq!(value["length"], 14);

        let script = concat!(
            "{\"type\":\"connect\",\"peer\":\"aa:bb\"}\n",
            "{\"type\":\"read\",\"id\":3,\"offset\":7}\n",
        );
        write_half.write_all(script.as_bytes()).await.unwrap();

        assert!(matches!(
            events.recv().await,
            Some(PeerEvent::Connect { .. })
        ));
        match events.recv().await {
            Some(PeerEvent::Read { offset, reply }) => {
                assert_eq!(offset, 7);
                reply.send(b"payload".to_vec()).unwrap();
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let response: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(response["type"], "read_response");
        assert_eq!(response["id"], 3);
        assert_eq!(response["data"], hex::encode(b"payload"));

        bridge.force_disconnect();
        let command: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(command["type"], "disconnect");

        // Dropping the daemon connection reports the peer as gone.
        drop(write_half);
        drop(lines);
        assert!(matches!(events.recv().await, Some(PeerEvent::Disconnect)));
    }
}
