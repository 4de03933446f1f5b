//! Server side of the socket transport
//!
//! Binds the Unix socket and answers each JSON line with whatever the
//! responder returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use super::{MAX_MESSAGE_SIZE, write_line};
use crate::error::Result;
use crate::message::{DATA_FIELD, METHOD_FIELD, REQUEST_ID_FIELD, SCOPE_FIELD, TYPE_FIELD};

/// Produces the reply for one inbound message; `None` sends nothing back
pub type Responder = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Create and bind a listener at `socket_path`
///
/// Creates the parent directory and removes a stale socket file first.
pub fn create_listener_at(socket_path: &Path) -> Result<(UnixListener, PathBuf)> {
    debug!(?socket_path, "create_listener_at: creating socket");

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if socket_path.exists() {
        debug!(?socket_path, "create_listener_at: removing stale socket");
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    debug!(?socket_path, "create_listener_at: socket bound");
    Ok((listener, socket_path.to_path_buf()))
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(socket_path: &Path) {
    if socket_path.exists() {
        debug!(?socket_path, "cleanup_socket: removing socket file");
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "Failed to remove socket file");
        }
    }
}

/// Accept connections until the listener fails
pub async fn serve(listener: UnixListener, responder: Responder) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        debug!("serve: accepted connection");
        let responder = responder.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, responder).await {
                warn!(error = %e, "serve: connection failed");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, responder: Responder) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.len() > MAX_MESSAGE_SIZE {
            warn!(bytes = line.len(), "handle_connection: message too large, skipping");
            continue;
        }
        let request: Value = match serde_json::from_str(line.trim()) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "handle_connection: invalid JSON line, skipping");
                continue;
            }
        };
        info!(%request, "handle_connection: received");

        if let Some(reply) = responder(&request) {
            write_line(&mut write_half, &reply).await?;
        }
    }

    debug!("handle_connection: peer closed");
    Ok(())
}

/// Built-in responder used by `am serve`
///
/// Copies the identity fields so the reply correlates. `ping` is answered
/// with `"pong"`, anything else echoes the request's `data`.
pub fn echo_reply(request: &Value) -> Option<Value> {
    let fields = request.as_object()?;

    let mut reply = Map::new();
    for key in [TYPE_FIELD, METHOD_FIELD, REQUEST_ID_FIELD, SCOPE_FIELD] {
        if let Some(value) = fields.get(key) {
            reply.insert(key.to_string(), value.clone());
        }
    }

    let is_ping = [TYPE_FIELD, METHOD_FIELD]
        .iter()
        .any(|key| fields.get(*key).and_then(Value::as_str) == Some("ping"));
    let data = if is_ping {
        json!("pong")
    } else {
        json!({ "echo": fields.get(DATA_FIELD).cloned().unwrap_or(Value::Null) })
    };
    reply.insert(DATA_FIELD.to_string(), data);

    Some(Value::Object(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_listener_creates_parent_dir() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("subdir").join("am.sock");

        let (_, path) = create_listener_at(&socket_path).unwrap();
        assert_eq!(path, socket_path);
        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn test_create_listener_removes_stale_socket() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("am.sock");
        std::fs::write(&socket_path, "stale").unwrap();

        assert!(create_listener_at(&socket_path).is_ok());
    }

    #[test]
    fn test_cleanup_socket() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("am.sock");
        std::fs::write(&socket_path, "test").unwrap();

        cleanup_socket(&socket_path);
        assert!(!socket_path.exists());

        // Missing file is fine
        cleanup_socket(&socket_path);
    }

    #[test]
    fn test_echo_reply() {
        let reply = echo_reply(&json!({"type": "ping", "requestId": "r1", "scope": "s"})).unwrap();
        assert_eq!(reply, json!({"type": "ping", "requestId": "r1", "scope": "s", "data": "pong"}));

        let reply = echo_reply(&json!({"method": "sum", "data": [1, 2]})).unwrap();
        assert_eq!(reply, json!({"method": "sum", "data": {"echo": [1, 2]}}));

        assert!(echo_reply(&json!("bare string")).is_none());
    }

    #[tokio::test]
    async fn test_serve_answers_each_line() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("serve.sock");
        let (listener, _) = create_listener_at(&socket_path).unwrap();
        let server = tokio::spawn(serve(listener, Arc::new(echo_reply)));

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_line(&mut write_half, &json!({"type": "ping", "requestId": "a"}))
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["data"], "pong");
        assert_eq!(reply["requestId"], "a");

        write_line(&mut write_half, &json!({"type": "add", "data": 3})).await.unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["data"]["echo"], 3);

        server.abort();
    }
}
