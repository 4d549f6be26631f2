use bletransport_core::{
    Dispatcher, Listener, Message, Selector, SeqCounter, Session, SessionFactory, StateCell,
    SyncReq, TransportConfig, TransportError, TransportState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// BLE host transport orchestrator.
///
/// Owns the process/socket session, runs the host<->controller sync
/// handshake, supervises the receive / error-forwarding / sync-loss watcher
/// tasks, and restarts the whole pipeline on fatal error when configured
/// to. Shared pieces are held behind `Arc` so worker tasks can trigger
/// shutdown independently; the lifecycle state cell makes concurrent
/// shutdown triggers race to a single teardown.
pub struct BleTransport {
    cfg: TransportConfig,
    factory: Arc<dyn SessionFactory>,
    dispatcher: Dispatcher,
    state: StateCell,
    seq: SeqCounter,
    session: tokio::sync::Mutex<Option<Arc<dyn Session>>>,
    /// Cancellation token for the current orchestration attempt; observed
    /// by every worker task spawned for that attempt.
    attempt: std::sync::Mutex<CancellationToken>,
    shutdown_tx: mpsc::Sender<bool>,
    /// Held by the restart supervisor for as long as one is running.
    shutdown_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<bool>>>,
}

impl BleTransport {
    /// Create a transport using the default Unix-socket host daemon session.
    #[cfg(unix)]
    pub fn new(cfg: TransportConfig) -> Result<Arc<Self>, TransportError> {
        Self::with_factory(cfg, Arc::new(crate::hostd::HostdSessionFactory))
    }

    /// Create a transport with a custom session factory.
    pub fn with_factory(
        cfg: TransportConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<Arc<Self>, TransportError> {
        cfg.validate()
            .map_err(|e| TransportError::Configuration(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Ok(Arc::new(BleTransport {
            cfg,
            factory,
            dispatcher: Dispatcher::new(),
            state: StateCell::new(),
            seq: SeqCounter::new(),
            session: tokio::sync::Mutex::new(None),
            attempt: std::sync::Mutex::new(CancellationToken::new()),
            shutdown_tx,
            shutdown_rx: Arc::new(tokio::sync::Mutex::new(shutdown_rx)),
        }))
    }

    pub fn state(&self) -> TransportState {
        self.state.load()
    }

    /// How long management sessions should wait for a host daemon response.
    pub fn rsp_timeout(&self) -> Duration {
        self.cfg.rsp_timeout()
    }

    /// Fresh sequence number for tagging an outgoing request.
    pub fn next_seq(&self) -> i32 {
        self.seq.next()
    }

    /// Register a listener for inbound messages matching `selector`.
    pub fn listen(&self, selector: Selector) -> Result<Listener, TransportError> {
        self.dispatcher.add_listener(selector)
    }

    pub fn unlisten(&self, selector: &Selector) {
        self.dispatcher.remove_listener(selector);
    }

    /// Start the transport. The first attempt reports failure directly and
    /// is not retried; once it succeeds, a background supervisor restarts
    /// the transport after fatal errors if restarts are enabled.
    pub async fn start(self: &Arc<Self>) -> Result<(), TransportError> {
        self.start_once()
            .await
            .inspect_err(|e| debug!(error = %e, "Error starting BLE transport"))?;

        let this = Arc::clone(self);
        tokio::spawn(async move { this.supervise_restarts().await });

        Ok(())
    }

    /// Request a graceful shutdown. Never propagates a restart.
    pub async fn stop(&self) -> Result<(), TransportError> {
        self.shutdown(false, TransportError::Stopped).await;
        Ok(())
    }

    /// Hand a frame to the host daemon. Rejected unless the transport is
    /// fully started; correlation and response waiting are the caller's
    /// responsibility via listeners.
    pub async fn tx(&self, data: Vec<u8>) -> Result<(), TransportError> {
        let state = self.state.load();
        if state != TransportState::Started {
            return Err(TransportError::NotStarted(state));
        }

        self.tx_unchecked(data).await
    }

    /// Transmit without the started-state check; used by the handshake,
    /// which runs before the transport is declared started.
    async fn tx_unchecked(&self, data: Vec<u8>) -> Result<(), TransportError> {
        debug!(frame = %hex::encode(&data), "Tx to host daemon");
        // Clone the session handle out of the lock; holding the lock across
        // the send would let a stalled write block shutdown.
        let session = self.session.lock().await.as_ref().map(Arc::clone);
        match session {
            Some(session) => session.send(data).await,
            None => Err(TransportError::NotStarted(self.state.load())),
        }
    }

    /// One orchestration attempt: open the session, spawn the worker tasks,
    /// run the sync handshake, and declare the transport started.
    async fn start_once(self: &Arc<Self>) -> Result<(), TransportError> {
        if !self
            .state
            .transition(TransportState::Stopped, TransportState::Starting)
        {
            return Err(TransportError::StartedTwice);
        }

        info!("Starting BLE transport");

        // Fresh token before any task is spawned, so no task can race its
        // own registration with a shutdown.
        let token = CancellationToken::new();
        *self.attempt.lock().unwrap() = token.clone();

        // No stale selector from a prior attempt may block a registration.
        self.dispatcher.clear();

        let (session, channels) = match self.factory.open(&self.cfg).await {
            Ok(opened) => opened,
            Err(err) => {
                self.shutdown(true, err.clone()).await;
                return Err(err);
            }
        };
        *self.session.lock().await = Some(Arc::from(session));

        self.spawn_failure_task(channels.failure, &token);
        self.spawn_receive_task(channels.inbound, &token);

        let sync_listener = match self.establish_sync().await {
            Ok(listener) => listener,
            Err(err) => {
                self.shutdown(true, err.clone()).await;
                return Err(err);
            }
        };

        // Host and controller are synced. Watch for sync loss in the
        // background for the remaining started lifetime.
        self.spawn_sync_watch_task(sync_listener, &token);

        if !self
            .state
            .transition(TransportState::Starting, TransportState::Started)
        {
            let err =
                TransportError::InvalidState("transport left Starting during startup".to_string());
            self.shutdown(true, err.clone()).await;
            return Err(err);
        }

        info!("BLE transport started");
        Ok(())
    }

    /// Sync handshake: query the sync status, and if host and controller
    /// are not yet synced, wait for the asynchronous sync event bounded by
    /// the sync timeout. Returns the standing sync-event listener, which
    /// stays registered to detect later loss of sync.
    async fn establish_sync(&self) -> Result<Listener, TransportError> {
        let mut sync_listener = self.dispatcher.add_listener(Selector::sync_evt())?;

        let synced = match self.query_sync_status().await {
            Ok(synced) => synced,
            Err(err) => {
                self.dispatcher.remove_listener(&Selector::sync_evt());
                return Err(err);
            }
        };

        if synced {
            return Ok(sync_listener);
        }

        // Not synced yet. Wait for a sync event.
        let deadline = tokio::time::Instant::now() + self.cfg.sync_timeout();
        loop {
            match tokio::time::timeout_at(deadline, sync_listener.next()).await {
                Ok(Ok(Message::SyncEvt(evt))) if evt.synced => return Ok(sync_listener),
                Ok(Ok(_)) => continue,
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(TransportError::SyncTimeout),
            }
        }
    }

    /// Send a one-shot sync-status request and await its response. Blocks
    /// the orchestration task only; the receive task keeps servicing other
    /// listeners.
    async fn query_sync_status(&self) -> Result<bool, TransportError> {
        let seq = self.seq.next();
        let selector = Selector::for_seq(seq);
        let mut listener = self.dispatcher.add_listener(selector)?;

        let result = async {
            let frame = serde_json::to_vec(&SyncReq::new(seq))
                .map_err(|e| TransportError::Codec(e.to_string()))?;
            self.tx_unchecked(frame).await?;

            loop {
                match listener.next().await? {
                    Message::SyncRsp(rsp) => return Ok(rsp.synced),
                    _ => continue,
                }
            }
        }
        .await;

        self.dispatcher.remove_listener(&selector);
        result
    }

    /// Single teardown path for every shutdown trigger. Only the first
    /// concurrent caller to win the state transition proceeds; everyone
    /// else observes a shutdown already in progress and returns.
    async fn shutdown(&self, restart: bool, cause: TransportError) {
        let fully_started = if self
            .state
            .transition(TransportState::Started, TransportState::Stopping)
        {
            true
        } else if self
            .state
            .transition(TransportState::Starting, TransportState::Stopping)
        {
            false
        } else {
            // Shutdown already in progress.
            return;
        };

        info!(cause = %cause, restart, "Shutting down BLE transport");

        // Stop the host daemon and its socket channel.
        if let Some(session) = self.session.lock().await.take() {
            session.stop().await;
        }

        // Indicate an error to all of this transport's listeners so none of
        // them blocks endlessly awaiting a message.
        self.dispatcher.error_all(&cause);

        // Release the worker tasks.
        self.attempt.lock().unwrap().cancel();

        if !self
            .state
            .transition(TransportState::Stopping, TransportState::Stopped)
        {
            error!("BLE transport in unexpected state at end of shutdown");
        }

        // If the attempt had fully started, hand the restart decision to
        // the supervisor.
        if fully_started {
            let _ = self.shutdown_tx.send(restart).await;
        }
    }

    /// Restart supervisor: blocks until the transport shuts down, then
    /// restarts it after the settling delay unless restarts are disabled or
    /// the shutdown was an explicit stop. Failed restart attempts are only
    /// logged and retried.
    async fn supervise_restarts(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_rx.clone().lock_owned().await;

        let Some(mut restart) = shutdown_rx.recv().await else {
            return;
        };

        loop {
            if !self.cfg.restart || !restart {
                return;
            }

            // Let the socket path become reusable before rebinding.
            tokio::time::sleep(self.cfg.settle_delay()).await;

            match self.start_once().await {
                Err(err) => {
                    warn!(error = %err, "Error restarting BLE transport");
                }
                Ok(()) => match shutdown_rx.recv().await {
                    Some(next) => restart = next,
                    None => return,
                },
            }
        }
    }

    /// Error-forwarding task: converts a session failure into a shutdown
    /// with restart allowed.
    fn spawn_failure_task(
        self: &Arc<Self>,
        mut failure: mpsc::Receiver<TransportError>,
        token: &CancellationToken,
    ) {
        let this = Arc::clone(self);
        let token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    received = failure.recv() => match received {
                        Some(err) => {
                            error!(error = %err, "BLE transport error");
                            let this = Arc::clone(&this);
                            tokio::spawn(async move { this.shutdown(true, err).await });
                        }
                        None => return,
                    },
                }
            }
        });
    }

    /// Receive task: hands every non-empty inbound frame to the dispatcher.
    fn spawn_receive_task(
        self: &Arc<Self>,
        mut inbound: mpsc::Receiver<Vec<u8>>,
        token: &CancellationToken,
    ) {
        let this = Arc::clone(self);
        let token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    received = inbound.recv() => match received {
                        Some(buf) => {
                            if !buf.is_empty() {
                                debug!(frame = %hex::encode(&buf), "Receive from host daemon");
                                this.dispatcher.dispatch(&buf);
                            }
                        }
                        None => return,
                    },
                }
            }
        });
    }

    /// Sync-loss watcher: a later event reporting desynchronization is
    /// treated like any other fatal transport error.
    fn spawn_sync_watch_task(
        self: &Arc<Self>,
        mut sync_listener: Listener,
        token: &CancellationToken,
    ) {
        let this = Arc::clone(self);
        let token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    received = sync_listener.next() => match received {
                        Ok(Message::SyncEvt(evt)) if !evt.synced => {
                            let this = Arc::clone(&this);
                            tokio::spawn(async move {
                                this.shutdown(true, TransportError::SyncLost).await
                            });
                        }
                        Ok(_) => {}
                        // The listener errors only when a teardown already
                        // owns the shutdown.
                        Err(_) => return,
                    },
                }
            }
        });
    }
}
