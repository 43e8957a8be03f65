use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::ServerSettings,
    errors::{ConfigError, PorticoError},
    server::{
        conn::{
            listener::{Listener, ListenerResult},
            transport::Transport,
        },
        http::serve_connection,
        router::Router,
    },
    ServerHandle,
};

type TokioTcpListener = tokio::net::TcpListener;

/// Pause before accepting again after the process ran short of resources.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(500);

/// Result of one connection, reported back to the accept loop.
struct ConnectionOutcome {
    remote_addr: SocketAddr,
    result: Result<(), PorticoError>,
}

pub struct TcpListener {
    settings: Arc<ServerSettings>,
    transport: Arc<Transport>,
    router: Arc<Router>,
    handle: ServerHandle,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    task: Option<JoinHandle<()>>,
}

impl TcpListener {
    pub fn new(
        settings: Arc<ServerSettings>,
        transport: Transport,
        router: Arc<Router>,
        handle: ServerHandle,
    ) -> Self {
        Self {
            settings,
            transport: Arc::new(transport),
            router,
            handle,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            task: None,
        }
    }
}

impl Listener for TcpListener {
    fn listen(&mut self) -> ListenerResult<'_, SocketAddr> {
        let future = async move {
            let addr = SocketAddr::new(
                self.settings
                    .bind_address(),
                self.settings
                    .bind_port(),
            );

            let listener = TokioTcpListener::bind(addr)
                .await
                .map_err(|e| ConfigError::Bind(format!("{}: {}", addr, e)))?;

            let local_addr = listener
                .local_addr()
                .map_err(|e| ConfigError::Bind(format!("{}: {}", addr, e)))?;

            self.handle
                .set_running(local_addr.port());

            let task = tokio::spawn(accept_loop(
                listener,
                self.settings
                    .clone(),
                self.transport
                    .clone(),
                self.router
                    .clone(),
                self.handle
                    .clone(),
                self.shutdown
                    .clone(),
                self.tracker
                    .clone(),
            ));

            self.task = Some(task);

            Ok(local_addr)
        };

        Box::pin(future)
    }

    fn stop(&mut self) -> ListenerResult<'_, ()> {
        let future = async move {
            self.shutdown
                .cancel();

            if let Some(task) = self
                .task
                .take()
            {
                if let Err(e) = task.await {
                    error!("Accept loop ended abnormally: {}", e);
                }
            }

            self.tracker
                .close();

            let grace = self
                .settings
                .shutdown_timeout();
            if timeout(
                grace,
                self.tracker
                    .wait(),
            )
            .await
            .is_err()
            {
                warn!(
                    "{} connection(s) still running after {:?}, leaving them detached",
                    self.tracker
                        .len(),
                    grace
                );
            }

            Ok(())
        };

        Box::pin(future)
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        self.shutdown
            .cancel();
    }
}

async fn accept_loop(
    listener: TokioTcpListener,
    settings: Arc<ServerSettings>,
    transport: Arc<Transport>,
    router: Arc<Router>,
    handle: ServerHandle,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    let (outcomes, mut outcome_rx) = mpsc::unbounded_channel::<ConnectionOutcome>();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Listener closed, no longer accepting connections");
                break;
            }
            Some(outcome) = outcome_rx.recv() => report(outcome),
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => match AcceptFailure::classify(&e) {
                        AcceptFailure::Connection => {
                            warn!("Cannot accept connection: {}", e);
                            continue;
                        }
                        AcceptFailure::Exhausted => {
                            error!("Cannot accept connection, retrying in {:?}: {}", ACCEPT_BACKOFF, e);
                            tokio::select! {
                                _ = shutdown.cancelled() => {
                                    info!("Listener closed, no longer accepting connections");
                                    break;
                                }
                                _ = sleep(ACCEPT_BACKOFF) => continue,
                            }
                        }
                        AcceptFailure::Fatal => {
                            error!("Listener failed, stopping server: {}", e);
                            handle.set_stopped();
                            shutdown.cancel();
                            break;
                        }
                    },
                };

                debug!("Accepted connection from {}", remote_addr);

                let settings = settings.clone();
                let transport = transport.clone();
                let router = router.clone();
                let shutdown = shutdown.clone();
                let outcomes = outcomes.clone();

                tracker.spawn(async move {
                    let result = async {
                        let negotiation =
                            transport.negotiate(stream, remote_addr, settings.handshake_timeout());
                        let connection = tokio::select! {
                            _ = shutdown.cancelled() => {
                                debug!("Dropped handshake with {} on shutdown", remote_addr);
                                return Ok(());
                            }
                            negotiated = negotiation => negotiated.map_err(PorticoError::from)?,
                        };
                        serve_connection(connection, router, settings, shutdown).await
                    }
                    .await;

                    // The accept loop is gone after stop, log here instead.
                    if let Err(mpsc::error::SendError(outcome)) =
                        outcomes.send(ConnectionOutcome { remote_addr, result })
                    {
                        report(outcome);
                    }
                });
            }
        }
    }
}

fn report(outcome: ConnectionOutcome) {
    match outcome.result {
        Ok(()) => debug!("Connection from {} closed", outcome.remote_addr),
        Err(PorticoError::Negotiation(e)) => {
            warn!("Rejected connection from {}: {}", outcome.remote_addr, e)
        }
        Err(e) => error!("Connection from {} failed: {}", outcome.remote_addr, e),
    }
}

/// How the accept loop reacts to a failed `accept`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AcceptFailure {
    /// The peer went away before the connection was handed over.
    Connection,
    /// The process is short of descriptors, buffers or memory. Retry later.
    Exhausted,
    /// The listening socket itself is unusable.
    Fatal,
}

impl AcceptFailure {
    pub(crate) fn classify(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock => return AcceptFailure::Connection,
            io::ErrorKind::OutOfMemory => return AcceptFailure::Exhausted,
            _ => {}
        }

        #[cfg(unix)]
        if let Some(code) = e.raw_os_error() {
            match code {
                libc::EBADF | libc::EINVAL | libc::ENOTSOCK | libc::EOPNOTSUPP => {
                    return AcceptFailure::Fatal
                }
                libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM => {
                    return AcceptFailure::Exhausted
                }
                libc::ECONNABORTED | libc::EPROTO | libc::EPERM => {
                    return AcceptFailure::Connection
                }
                _ => {}
            }
        }

        // Unrecognised errors are retried.
        AcceptFailure::Exhausted
    }
}
