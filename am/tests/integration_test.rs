//! Integration tests for asyncmessager
//!
//! These tests drive the messager end to end over the reference transports
//! and exercise the `am` binary.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

use asyncmessager::transport::channel::{self, ChannelTransport};
use asyncmessager::transport::listener::{Responder, create_listener_at, echo_reply, serve};
use asyncmessager::transport::{SocketTransport, Transport};
use asyncmessager::{Hooks, InvokeOptions, Messager, MessagerConfig, MessagerError, listener};

/// Answer every request arriving on `server` with `echo_reply`
fn spawn_echo_peer(server: ChannelTransport) -> Box<dyn FnOnce() + Send> {
    let server = Arc::new(server);
    let responder = server.clone();
    server
        .subscribe(Arc::new(move |request: Value| {
            if let Some(reply) = echo_reply(&request) {
                responder.send(&reply, None, &[]).expect("reply failed");
            }
        }))
        .expect("subscribe failed")
}

fn quiet_config() -> MessagerConfig {
    MessagerConfig {
        enable_log: false,
        ..Default::default()
    }
}

// =============================================================================
// Channel Transport Tests
// =============================================================================

#[tokio::test]
async fn test_channel_round_trip() {
    let (client, server) = channel::pair(16);
    let _peer = spawn_echo_peer(server);
    let messager = Messager::new(quiet_config(), Hooks::with_transport(Arc::new(client)));

    let response = messager
        .invoke(json!({"type": "ping"}), InvokeOptions::new())
        .await
        .expect("invoke failed")
        .expect("expected a response");

    assert_eq!(response["data"], "pong");
    assert!(response["requestId"].is_string());

    let stats = messager.statistics();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.timeout, 0);
}

#[tokio::test]
async fn test_channel_concurrent_requests_match_by_id() {
    let (client, server) = channel::pair(64);
    let _peer = spawn_echo_peer(server);
    let messager = Messager::new(quiet_config(), Hooks::with_transport(Arc::new(client)));

    let mut calls = Vec::new();
    for i in 0..10 {
        let messager = messager.clone();
        calls.push(tokio::spawn(async move {
            messager
                .invoke(json!({"type": "calc", "data": i}), InvokeOptions::new())
                .await
        }));
    }

    for (i, call) in calls.into_iter().enumerate() {
        let response = call.await.unwrap().unwrap().unwrap();
        assert_eq!(response["data"]["echo"], i);
    }
    assert_eq!(messager.pending_count(), 0);
    assert_eq!(messager.statistics().success, 10);
}

#[tokio::test]
async fn test_channel_push_reaches_listener() {
    let (client, server) = channel::pair(16);
    let messager = Messager::new(quiet_config(), Hooks::with_transport(Arc::new(client)));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    messager.on(
        "notify",
        listener(move |event| {
            let _ = tx.send(event.payload.clone());
        }),
        None,
    );

    server
        .send(&json!({"type": "notify", "data": "server push"}), None, &[])
        .unwrap();

    let pushed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("listener not called")
        .unwrap();
    assert_eq!(pushed["data"], "server push");
    assert_eq!(messager.statistics().success, 1);
}

#[tokio::test]
async fn test_channel_peers_with_hub_responder() {
    // Both ends run a messager; the server answers from a hub listener
    let (client, server) = channel::pair(16);
    let server = Arc::new(server);
    let server_messager = Messager::new(quiet_config(), Hooks::with_transport(server.clone()));
    let replies = server.clone();
    server_messager.on(
        "whoami",
        listener(move |event| {
            let mut reply = event.payload.clone();
            reply["data"] = json!("server");
            replies.send(&reply, None, &[]).unwrap();
        }),
        None,
    );

    let client_messager = Messager::new(quiet_config(), Hooks::with_transport(Arc::new(client)));
    let response = client_messager
        .invoke(json!({"type": "whoami"}), InvokeOptions::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response["data"], "server");
    assert_eq!(server_messager.statistics().success, 1);
}

#[tokio::test]
async fn test_channel_destroy_rejects_in_flight_request() {
    let (client, _server) = channel::pair(16);
    let messager = Messager::new(quiet_config(), Hooks::with_transport(Arc::new(client)));

    let call = tokio::spawn({
        let messager = messager.clone();
        async move { messager.invoke(json!({"type": "ping"}), InvokeOptions::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    messager.destroy();
    messager.destroy();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, MessagerError::Destroyed));
    assert!(!messager.is_subscribed());
}

// =============================================================================
// Socket Transport Tests
// =============================================================================

/// Responder that never answers `silent` requests
fn selective_reply() -> Responder {
    Arc::new(|request: &Value| {
        if request["type"] == "silent" {
            None
        } else {
            echo_reply(request)
        }
    })
}

#[tokio::test]
async fn test_socket_round_trip() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let socket_path = temp.path().join("am.sock");
    let (listener, _) = create_listener_at(&socket_path).unwrap();
    let server = tokio::spawn(serve(listener, selective_reply()));

    let transport = SocketTransport::connect(&socket_path).await.unwrap();
    let messager = Messager::new(quiet_config(), Hooks::with_transport(Arc::new(transport)));

    let response = messager
        .invoke(json!({"type": "ping", "scope": "frame-1"}), InvokeOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response["data"], "pong");
    assert_eq!(response["scope"], "frame-1");

    let err = messager
        .invoke(
            json!({"type": "silent"}),
            InvokeOptions::new()
                .timeout_ms(100)
                .fallback(json!({"code": "E_TIMEOUT"})),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.timeout_payload(),
        Some(&json!({"message": "request timed out", "code": "E_TIMEOUT"}))
    );

    let sent = messager
        .invoke(json!({"type": "log"}), InvokeOptions::new().send_only())
        .await
        .unwrap();
    assert!(sent.is_none());

    let stats = messager.statistics();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.timeout, 1);

    messager.destroy();
    server.abort();
}

#[tokio::test]
async fn test_socket_custom_hooks_reshape_payload() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let socket_path = temp.path().join("hooks.sock");
    let (listener, _) = create_listener_at(&socket_path).unwrap();
    let server = tokio::spawn(serve(listener, Arc::new(echo_reply)));

    let transport = SocketTransport::connect(&socket_path).await.unwrap();
    let ids = Arc::new(Mutex::new(0u32));
    let hooks = Hooks::with_transport(Arc::new(transport))
        .request_id({
            let ids = ids.clone();
            move |_| {
                let mut next = ids.lock().unwrap();
                *next += 1;
                Some(format!("req-{}", next))
            }
        })
        .on_response(|_, mut payload| {
            let data = payload["data"].take();
            payload["unwrapped"] = data;
            payload
        });
    let messager = Messager::new(quiet_config(), hooks);

    let response = messager
        .invoke(json!({"method": "ping"}), InvokeOptions::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response["requestId"], "req-1");
    assert_eq!(response["unwrapped"], "pong");
    server.abort();
}

// =============================================================================
// CLI Tests
// =============================================================================

#[test]
fn test_cli_help() {
    Command::cargo_bin("am")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("invoke"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_cli_config_prints_yaml() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp.path().join("am.yml");
    std::fs::write(&config_path, "messager:\n  timeout-ms: 250\n").unwrap();

    Command::cargo_bin("am")
        .unwrap()
        .arg("--config")
        .arg(&config_path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("timeout-ms: 250"))
        .stdout(predicate::str::contains("clear-timeout-requests: true"));
}

#[test]
fn test_cli_invoke_without_server_fails() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    Command::cargo_bin("am")
        .unwrap()
        .args(["invoke", "ping", "--socket"])
        .arg(temp.path().join("nobody.sock"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to connect"));
}

#[test]
fn test_cli_invoke_rejects_bad_json() {
    Command::cargo_bin("am")
        .unwrap()
        .args(["invoke", "ping", "--data", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("valid JSON"));
}

/// Start `am serve` on `socket_path` and wait for the socket to appear
fn spawn_server(socket_path: &std::path::Path) -> std::process::Child {
    let server = std::process::Command::new(assert_cmd::cargo::cargo_bin("am"))
        .args(["serve", "--socket"])
        .arg(socket_path)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .expect("Failed to start server");

    for _ in 0..100 {
        if socket_path.exists() {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    server
}

#[test]
fn test_cli_serve_and_invoke() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let socket_path = temp.path().join("cli.sock");
    let mut server = spawn_server(&socket_path);

    let assert = Command::cargo_bin("am")
        .unwrap()
        .args(["invoke", "ping", "--format", "json", "--socket"])
        .arg(&socket_path)
        .assert();

    server.kill().ok();
    server.wait().ok();

    assert
        .success()
        .stdout(predicate::str::contains("\"pong\""))
        .stdout(predicate::str::contains("\"success\": 1"));
}

#[test]
fn test_cli_invoke_with_auto_subscribe_disabled() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let socket_path = temp.path().join("manual.sock");
    let config_path = temp.path().join("am.yml");
    std::fs::write(&config_path, "messager:\n  auto-subscribe: false\n  timeout-ms: 2000\n").unwrap();
    let mut server = spawn_server(&socket_path);

    let assert = Command::cargo_bin("am")
        .unwrap()
        .arg("--config")
        .arg(&config_path)
        .args(["invoke", "ping", "--format", "json", "--socket"])
        .arg(&socket_path)
        .assert();

    server.kill().ok();
    server.wait().ok();

    assert
        .success()
        .stdout(predicate::str::contains("\"pong\""))
        .stdout(predicate::str::contains("\"timeout\": 0"));
}
