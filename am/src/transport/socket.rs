//! Unix socket transport speaking newline-delimited JSON

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{MAX_MESSAGE_SIZE, Transport, write_line};
use crate::error::{MessagerError, Result};
use crate::strategy::{InboundHandler, Unsubscribe};

/// Default timeout for connecting to the socket
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages queued for the writer task
const WRITE_QUEUE: usize = 256;

type ReadSlot = Arc<Mutex<Option<BufReader<OwnedReadHalf>>>>;

/// Client end of a socket connection
pub struct SocketTransport {
    outbound: mpsc::Sender<Value>,
    reader: ReadSlot,
}

impl SocketTransport {
    /// Connect to the socket at `path` and start the writer task
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(?path, "SocketTransport::connect: called");
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(path))
            .await
            .map_err(|_| MessagerError::Transport(format!("timed out connecting to {}", path.display())))??;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (outbound, queue) = mpsc::channel(WRITE_QUEUE);
        tokio::spawn(Self::write_loop(write_half, queue));
        Self {
            outbound,
            reader: Arc::new(Mutex::new(Some(BufReader::new(read_half)))),
        }
    }

    async fn write_loop(mut writer: OwnedWriteHalf, mut queue: mpsc::Receiver<Value>) {
        while let Some(payload) = queue.recv().await {
            if let Err(e) = write_line(&mut writer, &payload).await {
                warn!(error = %e, "SocketTransport: write failed, stopping writer");
                break;
            }
        }
        debug!("SocketTransport: writer stopped");
    }
}

impl Transport for SocketTransport {
    fn subscribe(&self, handler: InboundHandler) -> Result<Unsubscribe> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| MessagerError::Transport(e.to_string()))?;
        let Some(mut reader) = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return Err(MessagerError::Transport("socket already has a subscriber".to_string()));
        };

        let slot = self.reader.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        runtime.spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                tokio::select! {
                    _ = &mut stop_rx => break,
                    read = reader.read_line(&mut line) => match read {
                        Ok(0) => {
                            debug!("SocketTransport: peer closed connection");
                            return;
                        }
                        Ok(n) if n > MAX_MESSAGE_SIZE => {
                            warn!(bytes = n, "SocketTransport: message too large, skipping");
                        }
                        Ok(_) => match serde_json::from_str::<Value>(line.trim()) {
                            Ok(msg) => handler(msg),
                            Err(e) => warn!(error = %e, "SocketTransport: invalid JSON line, skipping"),
                        },
                        Err(e) => {
                            warn!(error = %e, "SocketTransport: read failed");
                            return;
                        }
                    },
                }
            }
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(reader);
        });

        Ok(Box::new(move || {
            let _ = stop_tx.send(());
        }))
    }

    fn send(&self, payload: &Value, request_id: Option<&str>, _args: &[Value]) -> Result<()> {
        debug!(?request_id, "SocketTransport::send: called");
        let size = serde_json::to_vec(payload)?.len();
        if size > MAX_MESSAGE_SIZE {
            return Err(MessagerError::Send(format!("message too large: {} bytes", size)));
        }
        self.outbound.try_send(payload.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MessagerError::Send("write queue full".to_string()),
            mpsc::error::TrySendError::Closed(_) => MessagerError::ChannelClosed,
        })
    }
}
