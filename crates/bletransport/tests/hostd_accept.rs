#![cfg(unix)]

use bletransport::{BleTransport, TransportConfig, TransportError, TransportState};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .try_init();
}

/// A child that runs but never connects to the socket must fail the start
/// with an accept timeout, the "controller not attached" case.
#[tokio::test]
async fn test_accept_timeout_when_daemon_never_connects() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let config = TransportConfig::builder()
        .sock_path(dir.path().join("hostd.sock"))
        .hostd_path("/bin/sleep")
        .dev_path("5")
        .accept_timeout_ms(200u64)
        .restart(false)
        .build()
        .unwrap();

    let transport = BleTransport::new(config).unwrap();
    assert_eq!(transport.start().await, Err(TransportError::AcceptTimeout));
    assert_eq!(transport.state(), TransportState::Stopped);
}

/// A missing daemon executable is a typed child-process error, not a panic.
#[tokio::test]
async fn test_spawn_failure_is_reported() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let config = TransportConfig::builder()
        .sock_path(dir.path().join("hostd.sock"))
        .hostd_path(dir.path().join("no-such-daemon"))
        .dev_path("/dev/null")
        .accept_timeout_ms(200u64)
        .restart(false)
        .build()
        .unwrap();

    let transport = BleTransport::new(config).unwrap();
    match transport.start().await {
        Err(TransportError::ChildProcess(detail)) => {
            assert!(detail.contains("failed to start host daemon"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(transport.state(), TransportState::Stopped);
}

/// The socket file must be released after a failed attempt so a later
/// attempt can rebind the same path.
#[tokio::test]
async fn test_socket_path_reusable_after_failed_attempt() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let config = TransportConfig::builder()
        .sock_path(dir.path().join("hostd.sock"))
        .hostd_path("/bin/sleep")
        .dev_path("5")
        .accept_timeout_ms(200u64)
        .restart(false)
        .build()
        .unwrap();

    let transport = BleTransport::new(config.clone()).unwrap();
    assert_eq!(transport.start().await, Err(TransportError::AcceptTimeout));

    let transport = BleTransport::new(config).unwrap();
    assert_eq!(transport.start().await, Err(TransportError::AcceptTimeout));
}
