//! Unix domain socket session to the BLE host daemon.
//!
//! The factory binds the socket, spawns the daemon with the device and
//! socket paths as positional arguments, and waits (bounded by the accept
//! timeout) for the daemon to connect back. Frames are newline-delimited
//! JSON in both directions.

use async_trait::async_trait;
use bletransport_core::{Session, SessionChannels, SessionFactory, TransportConfig, TransportError};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::net::unix::OwnedWriteHalf;
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct HostdSessionFactory;

#[async_trait]
impl SessionFactory for HostdSessionFactory {
    async fn open(
        &self,
        cfg: &TransportConfig,
    ) -> Result<(Box<dyn Session>, SessionChannels), TransportError> {
        // A stale socket file from a prior run blocks the bind.
        let _ = std::fs::remove_file(&cfg.sock_path);
        let listener = UnixListener::bind(&cfg.sock_path).map_err(TransportError::io)?;

        let mut child = match Command::new(&cfg.hostd_path)
            .arg(&cfg.dev_path)
            .arg(&cfg.sock_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let _ = std::fs::remove_file(&cfg.sock_path);
                return Err(TransportError::ChildProcess(format!(
                    "failed to start host daemon: {e}"
                )));
            }
        };

        let stream = match tokio::time::timeout(cfg.accept_timeout(), listener.accept()).await {
            Ok(Ok((stream, _addr))) => stream,
            Ok(Err(e)) => {
                let _ = child.start_kill();
                let _ = std::fs::remove_file(&cfg.sock_path);
                return Err(TransportError::io(e));
            }
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = std::fs::remove_file(&cfg.sock_path);
                return Err(TransportError::AcceptTimeout);
            }
        };

        debug!(sock_path = %cfg.sock_path.display(), "Host daemon connected");

        let (read_half, write_half) = stream.into_split();
        let (inbound_tx, inbound_rx) = mpsc::channel(32);
        let (failure_tx, failure_rx) = mpsc::channel(4);
        let token = CancellationToken::new();

        // Reader: one JSON envelope per line.
        {
            let token = token.clone();
            let failure_tx = failure_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(read_half).lines();
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => {
                                if inbound_tx.send(line.into_bytes()).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {
                                let _ = failure_tx
                                    .send(TransportError::ChildProcess(
                                        "host daemon closed the socket".to_string(),
                                    ))
                                    .await;
                                return;
                            }
                            Err(e) => {
                                let _ = failure_tx.send(TransportError::io(e)).await;
                                return;
                            }
                        },
                    }
                }
            });
        }

        // Waiter: surface an unexpected child exit; kill the child once the
        // session stops.
        {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                    status = child.wait() => {
                        let detail = match status {
                            Ok(status) => format!("host daemon exited: {status}"),
                            Err(e) => format!("host daemon wait failed: {e}"),
                        };
                        let _ = failure_tx.send(TransportError::ChildProcess(detail)).await;
                    }
                }
            });
        }

        let session = HostdSession {
            writer: Mutex::new(write_half),
            token,
            sock_path: cfg.sock_path.clone(),
        };

        Ok((
            Box::new(session),
            SessionChannels {
                inbound: inbound_rx,
                failure: failure_rx,
            },
        ))
    }
}

pub struct HostdSession {
    writer: Mutex<OwnedWriteHalf>,
    token: CancellationToken,
    sock_path: PathBuf,
}

#[async_trait]
impl Session for HostdSession {
    async fn send(&self, mut buf: Vec<u8>) -> Result<(), TransportError> {
        buf.push(b'\n');
        // A write can stall indefinitely when the daemon stops reading;
        // stopping the session must still release the sender.
        tokio::select! {
            _ = self.token.cancelled() => Err(TransportError::Stopped),
            result = async {
                let mut writer = self.writer.lock().await;
                writer.write_all(&buf).await.map_err(TransportError::io)?;
                writer.flush().await.map_err(TransportError::io)
            } => result,
        }
    }

    async fn stop(&self) {
        self.token.cancel();
        // Unlink the socket so a restart attempt can rebind the path.
        let _ = std::fs::remove_file(&self.sock_path);
    }
}
