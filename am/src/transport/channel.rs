//! In-process transport over a pair of mpsc channels

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::Transport;
use crate::error::{MessagerError, Result};
use crate::strategy::{InboundHandler, Unsubscribe};

type Inbox = Arc<Mutex<Option<mpsc::Receiver<Value>>>>;

/// One end of an in-process bridge
///
/// What one end sends, the other end's subscriber receives.
pub struct ChannelTransport {
    tx: mpsc::Sender<Value>,
    rx: Inbox,
}

/// Create two connected ends with `capacity` buffered messages per direction
pub fn pair(capacity: usize) -> (ChannelTransport, ChannelTransport) {
    debug!(%capacity, "channel::pair: called");
    let (a_tx, a_rx) = mpsc::channel(capacity);
    let (b_tx, b_rx) = mpsc::channel(capacity);
    (
        ChannelTransport {
            tx: a_tx,
            rx: Arc::new(Mutex::new(Some(b_rx))),
        },
        ChannelTransport {
            tx: b_tx,
            rx: Arc::new(Mutex::new(Some(a_rx))),
        },
    )
}

impl Transport for ChannelTransport {
    /// Spawn a pump task feeding `handler`; must be called inside a tokio runtime
    fn subscribe(&self, handler: InboundHandler) -> Result<Unsubscribe> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| MessagerError::Transport(e.to_string()))?;
        let Some(mut rx) = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return Err(MessagerError::Transport("channel already has a subscriber".to_string()));
        };

        let slot = self.rx.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        runtime.spawn(async move {
            debug!("ChannelTransport: pump started");
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    msg = rx.recv() => match msg {
                        Some(msg) => handler(msg),
                        None => break,
                    },
                }
            }
            // Hand the receiver back so a later subscribe can resume
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
            debug!("ChannelTransport: pump stopped");
        });

        Ok(Box::new(move || {
            let _ = stop_tx.send(());
        }))
    }

    fn send(&self, payload: &Value, request_id: Option<&str>, _args: &[Value]) -> Result<()> {
        debug!(?request_id, "ChannelTransport::send: called");
        self.tx.try_send(payload.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MessagerError::Send("channel full".to_string()),
            mpsc::error::TrySendError::Closed(_) => MessagerError::ChannelClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn collector() -> (InboundHandler, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(move |msg: Value| {
                let _ = tx.send(msg);
            }),
            rx,
        )
    }

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (left, right) = pair(8);
        let (left_handler, mut left_seen) = collector();
        let (right_handler, mut right_seen) = collector();
        let _l = left.subscribe(left_handler).unwrap();
        let _r = right.subscribe(right_handler).unwrap();

        left.send(&json!({"type": "ping"}), None, &[]).unwrap();
        right.send(&json!({"type": "pong"}), None, &[]).unwrap();

        assert_eq!(right_seen.recv().await.unwrap()["type"], "ping");
        assert_eq!(left_seen.recv().await.unwrap()["type"], "pong");
    }

    #[tokio::test]
    async fn test_second_subscriber_is_rejected() {
        let (left, _right) = pair(1);
        let (handler, _seen) = collector();
        let _unsubscribe = left.subscribe(handler.clone()).unwrap();

        assert!(matches!(left.subscribe(handler), Err(MessagerError::Transport(_))));
    }

    #[tokio::test]
    async fn test_resubscribe_after_unsubscribe() {
        let (left, right) = pair(4);
        let (handler, _seen) = collector();
        let unsubscribe = left.subscribe(handler).unwrap();
        unsubscribe();

        // Give the pump a moment to hand the receiver back
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (handler, mut seen) = collector();
        let _unsubscribe = left.subscribe(handler).unwrap();
        right.send(&json!({"n": 1}), None, &[]).unwrap();
        assert_eq!(seen.recv().await.unwrap()["n"], 1);
    }

    #[tokio::test]
    async fn test_full_and_closed_channels() {
        let (left, right) = pair(1);
        left.send(&json!(1), None, &[]).unwrap();
        assert!(matches!(left.send(&json!(2), None, &[]), Err(MessagerError::Send(_))));

        drop(right);
        assert!(matches!(left.send(&json!(3), None, &[]), Err(MessagerError::ChannelClosed)));
    }

    #[test]
    fn test_subscribe_outside_runtime_fails() {
        let (left, _right) = pair(1);
        let (handler, _seen) = collector();
        assert!(matches!(left.subscribe(handler), Err(MessagerError::Transport(_))));
    }
}
