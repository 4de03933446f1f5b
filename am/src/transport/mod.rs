//! Reference transports
//!
//! A transport only knows how to send a message and how to deliver inbound
//! messages to a handler. [`Hooks::with_transport`](crate::Hooks::with_transport)
//! plugs one into a [`Messager`](crate::Messager).

use std::path::PathBuf;

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::strategy::{InboundHandler, Unsubscribe};

pub mod channel;
pub mod listener;
pub mod socket;

pub use channel::ChannelTransport;
pub use socket::SocketTransport;

/// Largest single JSON line a socket peer accepts
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// One-way message transport
pub trait Transport: Send + Sync {
    /// Start delivering inbound messages to `handler`
    fn subscribe(&self, handler: InboundHandler) -> Result<Unsubscribe>;

    /// Send `payload`; `request_id` and `args` are what the messager passed along
    fn send(&self, payload: &Value, request_id: Option<&str>, args: &[Value]) -> Result<()>;
}

/// Default socket path for `am serve` and `am invoke`
pub fn get_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("asyncmessager")
        .join("am.sock")
}

/// Write `payload` as one newline-terminated JSON line
pub(crate) async fn write_line<W>(writer: &mut W, payload: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = serde_json::to_string(payload)?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_ends_with_am_sock() {
        let path = get_socket_path();
        assert!(path.ends_with("asyncmessager/am.sock"));
    }

    #[tokio::test]
    async fn test_write_line_appends_newline() {
        let mut buf = Vec::new();
        write_line(&mut buf, &serde_json::json!({"type": "ping"})).await.unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "{\"type\":\"ping\"}\n");
    }
}
