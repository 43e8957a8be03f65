//! # Portico
//!
//! **A protocol negotiating HTTP server core with mutual TLS**
//!
//! Portico terminates plain HTTP, HTTPS and HTTP/2 over TLS on a single
//! listener, optionally demands client certificates, and hands the verified
//! client identity to route handlers.
//!
//! ## Features
//!
//! - **Three transports**: `Http`, `Https` and `Http2`, selected by configuration
//! - **Mutual TLS**: required or optional client certificates, verified
//!   against a configured trust store
//! - **ALPN**: HTTP/2 when the client offers `h2`, HTTP/1.1 otherwise
//! - **Ordered routing**: first matching route wins, with `{param}` and `*` patterns
//! - **Graceful shutdown**: in-flight requests finish before the server stops
//!
//! ## Basic Usage
//!
//! ```rust,ignore
//! use portico::{
//!     config::{Protocol, ServerSettings, SslSettings},
//!     server::router::{handler_fn, Router},
//!     Server,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ssl_settings = SslSettings::builder()
//!         .key_store("resource://localhost/ssl/hexagonkt.pem")
//!         .trust_store("resource://localhost/ssl/trust.pem")
//!         .client_auth(true)
//!         .build()?;
//!
//!     let settings = ServerSettings::builder()
//!         .bind_port(0)
//!         .protocol(Protocol::Https)
//!         .ssl_settings(ssl_settings)
//!         .build()?;
//!
//!     let router = Router::builder()
//!         .get("/hello", handler_fn(|mut context| async move {
//!             let subject = context
//!                 .certificate()
//!                 .map(|certificate| certificate.subject().to_string())
//!                 .unwrap_or_default();
//!             context.response_mut().set_header("cert", &subject)?;
//!             context.ok("Hello World!")?;
//!             Ok(context)
//!         }))
//!         .build()?;
//!
//!     let mut server = Server::new(settings, router);
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Crypto providers
//!
//! - **ring** (default): enable with the `ring` feature
//! - **aws-lc-rs**: enable with the `aws-lc-rs` feature
//!
//! ## Modules
//!
//! - [`config`]: Server and TLS settings builders
//! - [`errors`]: Error types
//! - [`server`]: Transports, routing, request contexts and TLS

#[cfg(not(any(feature = "ring", feature = "aws-lc-rs")))]
compile_error!("Either the ring or the aws-lc-rs feature must be enabled!");

use std::sync::{
    atomic::{AtomicU16, AtomicU8, Ordering},
    Arc,
};

use log::{error, info};

use crate::{
    config::ServerSettings,
    errors::PorticoError,
    server::{
        http::HttpServer,
        resolver::{FileResolver, KeyMaterialResolver},
        router::Router,
    },
};

pub mod config;
pub mod errors;
pub mod server;
mod tests;

pub use crate::{
    config::{Protocol, SslSettings},
    server::{
        context::{Context, Request, Response},
        router::handler_fn,
    },
};

/// Lifecycle of a [`Server`].
///
/// `Created -> Running -> Stopped`. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Running,
    Stopped,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServerState::Running,
            2 => ServerState::Stopped,
            _ => ServerState::Created,
        }
    }
}

#[derive(Debug, Default)]
struct HandleState {
    port: AtomicU16,
    state: AtomicU8,
}

/// Shared view of a server's port and state.
///
/// Cheap to clone; every clone observes the same server.
#[derive(Clone, Debug, Default)]
pub struct ServerHandle {
    inner: Arc<HandleState>,
}

impl ServerHandle {
    /// Port actually bound, known once the server is running.
    pub fn runtime_port(&self) -> Option<u16> {
        match self
            .inner
            .port
            .load(Ordering::Acquire)
        {
            0 => None,
            port => Some(port),
        }
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(
            self.inner
                .state
                .load(Ordering::Acquire),
        )
    }

    pub(crate) fn set_running(&self, port: u16) {
        self.inner
            .port
            .store(port, Ordering::Release);
        self.inner
            .state
            .store(1, Ordering::Release);
    }

    pub(crate) fn set_stopped(&self) {
        self.inner
            .state
            .store(2, Ordering::Release);
    }
}

/// Server owning one listener.
///
/// The `Server` struct ties together:
/// - the [`ServerSettings`] selecting address, port and protocol
/// - the [`Router`] dispatching requests
/// - the [`KeyMaterialResolver`] used to load TLS key material
///
/// # Examples
///
/// ```rust,ignore
/// use portico::{config::ServerSettings, server::router::Router, Server};
///
/// let settings = ServerSettings::builder().bind_port(0).build()?;
/// let mut server = Server::new(settings, Router::builder().build()?);
///
/// server.start().await?;
/// println!("listening on {:?}", server.runtime_port());
/// server.stop().await?;
/// ```
pub struct Server {
    settings: Arc<ServerSettings>,
    router: Arc<Router>,
    resolver: Arc<dyn KeyMaterialResolver>,
    handle: ServerHandle,
    instance: Option<HttpServer>,
}

impl Server {
    /// Creates a server reading key material from the working directory.
    pub fn new(settings: ServerSettings, router: Router) -> Server {
        Server {
            settings: Arc::new(settings),
            router: Arc::new(router),
            resolver: Arc::new(FileResolver::default()),
            handle: ServerHandle::default(),
            instance: None,
        }
    }

    /// Replaces the key material resolver.
    pub fn with_resolver(mut self, resolver: impl KeyMaterialResolver) -> Server {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Port actually bound, `None` before the server runs.
    pub fn runtime_port(&self) -> Option<u16> {
        self.handle
            .runtime_port()
    }

    pub fn state(&self) -> ServerState {
        self.handle
            .state()
    }

    /// Returns a handle that can be moved to other tasks.
    pub fn handle(&self) -> ServerHandle {
        self.handle
            .clone()
    }

    /// Starts the server without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the server is already running ([`PorticoError::AlreadyRunning`])
    /// - the server was stopped ([`PorticoError::Terminated`])
    /// - key material cannot be loaded or the port cannot be bound
    ///   ([`PorticoError::Config`]); the server then stays `Created`
    pub async fn start(&mut self) -> Result<(), PorticoError> {
        match self.state() {
            ServerState::Running => return Err(PorticoError::AlreadyRunning),
            ServerState::Stopped => return Err(PorticoError::Terminated),
            ServerState::Created => {}
        }

        let mut server = HttpServer::new(
            self.settings
                .clone(),
            self.router
                .clone(),
            self.resolver
                .clone(),
        );

        let addr = match server
            .start(self.handle())
            .await
        {
            Ok(addr) => addr,
            Err(e) => {
                error!("Cannot start server: {}", e);
                return Err(e);
            }
        };

        info!(
            "Server listening on {}://{} ({})",
            self.settings
                .protocol()
                .scheme(),
            addr,
            self.settings
                .protocol()
        );

        self.instance = Some(server);

        Ok(())
    }

    /// Stops accepting, lets in-flight requests finish and moves to `Stopped`.
    ///
    /// Waits at most the configured shutdown timeout for live connections.
    /// Stopping a stopped server does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PorticoError::NotRunning`] if the server never started.
    pub async fn stop(&mut self) -> Result<(), PorticoError> {
        if self.state() == ServerState::Created {
            return Err(PorticoError::NotRunning);
        }

        if let Some(mut server) = self
            .instance
            .take()
        {
            info!("Stopping server...");
            server
                .stop()
                .await?;
            info!("Server stopped");
        }

        self.handle
            .set_stopped();

        Ok(())
    }

    /// Starts the server and runs until Ctrl+C.
    pub async fn run(&mut self) -> Result<(), PorticoError> {
        self.start()
            .await?;

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for shutdown signal: {}", e);
        }

        self.stop()
            .await
    }
}

/// Creates and starts a server in one call.
///
/// ```rust,ignore
/// let server = portico::serve(settings, router).await?;
/// ```
pub async fn serve(settings: ServerSettings, router: Router) -> Result<Server, PorticoError> {
    let mut server = Server::new(settings, router);
    server
        .start()
        .await?;
    Ok(server)
}
