//! End-to-end worker handshakes over real rustls sessions.

mod common;

use std::time::Duration;

use tokio::io::{duplex, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use common::Harness;
use tollgate_controller::listener::{handle_connection, ConnectionError};
use tollgate_controller::metrics::collect_metrics;
use tollgate_controller::workerauth::AuthErrorKind;
use tollgate_controller::{WorkerAuthError, WorkerListener};
use tollgate_kms::{generate_key_hex, AeadWrapper};
use tollgate_worker::WorkerCredentials;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_worker_completes_handshake_and_is_evicted_on_close() {
    let h = Harness::new();
    let creds = h.mint("worker-a").await;
    let (client_io, server_io) = duplex(64 * 1024);

    let auth = h.authenticator.clone();
    let server =
        tokio::spawn(async move { handle_connection(&auth, server_io, None, TIMEOUT).await });

    let mut tls = tollgate_worker::handshake(client_io, &creds).await.unwrap();
    let negotiated = tls.get_ref().1.alpn_protocol().map(|p| p.to_vec());
    assert_eq!(negotiated, Some(creds.alpn_protocols()[0].as_bytes().to_vec()));

    let entry = h.state.cache.get(creds.nonce()).unwrap();
    assert_eq!(entry.info.name, "worker-a");
    assert_eq!(h.state.cache.len(), 1);

    tls.shutdown().await.unwrap();
    server.await.unwrap().unwrap();

    assert!(h.state.cache.is_empty());
    assert_eq!(h.state.metrics.admitted(), 1);
}

#[tokio::test]
async fn test_replayed_credential_fails_handshake() {
    let h = Harness::new();
    let creds = h.mint("worker-a").await;

    let (client_io, server_io) = duplex(64 * 1024);
    let auth = h.authenticator.clone();
    let server =
        tokio::spawn(async move { handle_connection(&auth, server_io, None, TIMEOUT).await });
    let mut tls = tollgate_worker::handshake(client_io, &creds).await.unwrap();
    tls.shutdown().await.unwrap();
    server.await.unwrap().unwrap();

    let (client_io, server_io) = duplex(64 * 1024);
    let (client, server) = tokio::join!(
        tollgate_worker::handshake(client_io, &creds),
        handle_connection(&h.authenticator, server_io, None, TIMEOUT),
    );

    assert!(client.is_err());
    assert!(matches!(
        server,
        Err(ConnectionError::Auth(WorkerAuthError::ReplayDetected(_)))
    ));
    assert_eq!(h.state.metrics.rejected(AuthErrorKind::ReplayDetected), 1);
}

#[tokio::test]
async fn test_worker_with_foreign_key_is_rejected() {
    let h = Harness::new();
    let stranger = AeadWrapper::from_hex(common::KEY_ID, &generate_key_hex()).unwrap();
    let creds = WorkerCredentials::mint("worker-a", None, &stranger).await.unwrap();

    let (client_io, server_io) = duplex(64 * 1024);
    let (client, server) = tokio::join!(
        tollgate_worker::handshake(client_io, &creds),
        handle_connection(&h.authenticator, server_io, None, TIMEOUT),
    );

    assert!(client.is_err());
    assert!(matches!(
        server,
        Err(ConnectionError::Auth(WorkerAuthError::DecryptionFailed(_)))
    ));
    assert_eq!(h.store.adds(), 0);
    assert!(h.state.cache.is_empty());
}

#[tokio::test]
async fn test_client_certificate_must_match_claims() {
    let h = Harness::new();
    let owner = h.mint("worker-a").await;

    // A second worker offers the first worker's sealed claims while holding
    // its own certificate and key.
    let thief = h
        .mint("worker-b")
        .await
        .with_alpn_protocols(owner.alpn_protocols().to_vec());

    let (client_io, server_io) = duplex(64 * 1024);
    let (client, server) = tokio::join!(
        tollgate_worker::handshake(client_io, &thief),
        handle_connection(&h.authenticator, server_io, None, TIMEOUT),
    );

    assert!(client.is_err());
    assert!(matches!(server, Err(ConnectionError::Io(_))));
    // The nonce is spent even though the handshake failed.
    assert_eq!(h.store.len(), 1);
    assert!(h.state.cache.is_empty());

    assert_eq!(h.state.metrics.admitted(), 0);
    assert_eq!(h.state.metrics.handshake_failed(), 1);
    let metrics = collect_metrics(&h.state);
    assert!(metrics.contains("tollgate_worker_auth_admitted_total 0"));
    assert!(metrics.contains("tollgate_worker_auth_handshake_failed_total 1"));
}

#[tokio::test(start_paused = true)]
async fn test_silent_client_times_out() {
    let h = Harness::new();
    let (_client_io, server_io) = duplex(64 * 1024);

    let result =
        handle_connection(&h.authenticator, server_io, None, Duration::from_secs(10)).await;

    assert!(matches!(result, Err(ConnectionError::HandshakeTimeout)));
    assert_eq!(h.wrapper.decrypts(), 0);
}

#[tokio::test]
async fn test_listener_serves_workers_until_shutdown() {
    let h = Harness::new();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();

    let listener = WorkerListener::new(h.authenticator.clone(), Duration::from_secs(1));
    let shutdown = CancellationToken::new();
    let serve = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listener.serve(tcp, shutdown).await })
    };

    let creds = h.mint("worker-a").await;
    let mut tls = tollgate_worker::connect(&addr.to_string(), &creds).await.unwrap();

    let entry = h.state.cache.get(creds.nonce()).unwrap();
    assert!(entry.peer_addr.is_some());

    tls.shutdown().await.unwrap();
    drop(tls);

    shutdown.cancel();
    serve.await.unwrap().unwrap();
    assert!(h.state.cache.is_empty());
}
