// tests/integration/handshake_test.rs

//! Registration handshake scenarios against a scripted backend.

use super::test_helpers::{
    REGISTERED_LINE, ScriptedConn, WELCOME_LINE, bind_backend, init_tracing, test_config,
};
use chatbridge::bridge::ConnectionRegistry;
use chatbridge::core::commands::Command;
use chatbridge::core::errors::BridgeError;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_handshake_registers_identity_and_settles_after_confirmation() {
    init_tracing();
    let (listener, port) = bind_backend().await;
    let backend = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = ScriptedConn::new(stream);
        // Stretch each phase out so the create call observably waits for it.
        tokio::time::sleep(Duration::from_millis(100)).await;
        conn.send_line(WELCOME_LINE).await;
        let register = conn.recv_command().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        conn.send_line(REGISTERED_LINE).await;
        (conn, register)
    });

    let registry = ConnectionRegistry::new(test_config(port));
    let started = Instant::now();
    let connection = registry.get_or_create("alice").await.unwrap();

    // The create call settles only after the confirmation line, not the welcome.
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(connection.is_registered());
    assert_eq!(connection.identity(), "alice");
    assert_eq!(registry.count(), 1);

    let (_conn, register) = backend.await.unwrap();
    assert_eq!(
        register,
        Command::Register {
            username: "alice".to_string()
        }
    );
}

#[tokio::test]
async fn test_noise_before_the_welcome_line_is_ignored() {
    init_tracing();
    let (listener, port) = bind_backend().await;
    let backend = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = ScriptedConn::new(stream);
        conn.send_line(r#"{"success":true,"message":"MOTD: maintenance at noon"}"#)
            .await;
        conn.send_line("this is not json").await;
        conn.send_line(WELCOME_LINE).await;
        conn.recv_command().await;
        conn.send_line(REGISTERED_LINE).await;
        conn
    });

    let registry = ConnectionRegistry::new(test_config(port));
    let connection = registry.get_or_create("alice").await.unwrap();
    assert!(connection.is_registered());
    let _conn = backend.await.unwrap();
}

#[tokio::test]
async fn test_registration_failure_fails_the_create_call() {
    init_tracing();
    let (listener, port) = bind_backend().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = ScriptedConn::new(stream);
        conn.send_line(WELCOME_LINE).await;
        conn.recv_command().await;
        conn.send_line(r#"{"success":false,"message":"Username already taken"}"#)
            .await;
        // Hold the socket open; the bridge is the one that must give up.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let registry = ConnectionRegistry::new(test_config(port));
    let err = registry.get_or_create("alice").await.unwrap_err();
    assert!(
        matches!(&err, BridgeError::Registration(msg) if msg.contains("already taken")),
        "unexpected error: {err}"
    );
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn test_backend_closing_before_welcome_fails_the_create_call() {
    init_tracing();
    let (listener, port) = bind_backend().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let registry = ConnectionRegistry::new(test_config(port));
    let err = registry.get_or_create("alice").await.unwrap_err();
    assert!(
        matches!(err, BridgeError::ConnectionClosed | BridgeError::Io(_)),
        "unexpected error: {err}"
    );
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn test_silent_backend_times_out_the_handshake() {
    init_tracing();
    let (listener, port) = bind_backend().await;
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        // Say nothing and keep the socket open.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut config = test_config(port);
    config.handshake_timeout = Duration::from_millis(200);
    let registry = ConnectionRegistry::new(config);

    let started = Instant::now();
    let err = registry.get_or_create("alice").await.unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(
        matches!(&err, BridgeError::Registration(msg) if msg.contains("timed out")),
        "unexpected error: {err}"
    );
    assert_eq!(registry.count(), 0);
}
