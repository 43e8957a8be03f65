//! HTTP/1.1 and HTTP/2 serving on top of negotiated connections.

use std::{convert::Infallible, panic::AssertUnwindSafe, pin::pin, sync::Arc};

use bytes::Bytes;
use futures_util::FutureExt;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    body::Incoming,
    server::conn::{http1, http2},
    service::service_fn,
};
use hyper_util::rt::{TokioExecutor, TokioIo};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ServerSettings,
    errors::{ConfigError, PorticoError},
    server::{
        certificate::CertificateChain,
        conn::{
            listener::{tcp::TcpListener, Listener},
            transport::Transport,
            ApplicationProtocol, NegotiatedConnection,
        },
        context::{Context, Request},
        resolver::KeyMaterialResolver,
        router::Router,
        tls::TlsFactory,
    },
    ServerHandle,
};

/// One bound listener together with everything it serves.
pub struct HttpServer {
    settings: Arc<ServerSettings>,
    router: Arc<Router>,
    resolver: Arc<dyn KeyMaterialResolver>,
    listener: Option<TcpListener>,
}

impl HttpServer {
    pub fn new(
        settings: Arc<ServerSettings>,
        router: Arc<Router>,
        resolver: Arc<dyn KeyMaterialResolver>,
    ) -> Self {
        Self { settings, router, resolver, listener: None }
    }

    /// Builds TLS when the protocol needs it, binds and starts accepting.
    ///
    /// Nothing is left listening when this fails.
    pub async fn start(
        &mut self,
        handle: ServerHandle,
    ) -> Result<std::net::SocketAddr, PorticoError> {
        let protocol = self
            .settings
            .protocol();

        let tls = if protocol.requires_tls() {
            let ssl_settings = self
                .settings
                .ssl_settings()
                .ok_or_else(|| ConfigError::MissingSslSettings(protocol.to_string()))?;
            Some(TlsFactory::create_tls_context(ssl_settings, self.resolver.as_ref())?)
        } else {
            None
        };

        let transport = Transport::new(protocol, tls.as_ref())?;
        debug!("Using {:?} transport for {}", transport, protocol);

        let mut listener = TcpListener::new(
            self.settings
                .clone(),
            transport,
            self.router
                .clone(),
            handle,
        );
        let addr = listener
            .listen()
            .await?;

        self.listener = Some(listener);

        Ok(addr)
    }

    /// Stops accepting and drains live connections.
    pub async fn stop(&mut self) -> Result<(), PorticoError> {
        if let Some(mut listener) = self
            .listener
            .take()
        {
            listener
                .stop()
                .await?;
        }
        Ok(())
    }
}

/// Per connection data shared by all requests of that connection.
struct ConnectionScope {
    router: Arc<Router>,
    body_limit: usize,
    certificate_chain: CertificateChain,
    remote_addr: std::net::SocketAddr,
}

/// Serves HTTP on `connection` until the peer closes it or `shutdown` fires.
///
/// On shutdown, in-flight requests complete before the connection closes.
pub(crate) async fn serve_connection(
    connection: NegotiatedConnection,
    router: Arc<Router>,
    settings: Arc<ServerSettings>,
    shutdown: CancellationToken,
) -> Result<(), PorticoError> {
    let protocol = connection.application_protocol();
    let scope = Arc::new(ConnectionScope {
        router,
        body_limit: settings.body_limit(),
        certificate_chain: connection
            .peer_certificates()
            .clone(),
        remote_addr: connection.remote_addr(),
    });

    let service = service_fn(move |request| {
        let scope = scope.clone();
        async move { Ok::<_, Infallible>(process_request(request, scope).await) }
    });

    let io = TokioIo::new(connection.into_io());

    let result = match protocol {
        ApplicationProtocol::Http1 => {
            let mut conn = pin!(http1::Builder::new().serve_connection(io, service));
            tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            }
        }
        ApplicationProtocol::Http2 => {
            let mut conn =
                pin!(http2::Builder::new(TokioExecutor::new()).serve_connection(io, service));
            tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            }
        }
    };

    result.map_err(|e| PorticoError::Connection(e.to_string()))
}

async fn process_request(
    request: http::Request<Incoming>,
    scope: Arc<ConnectionScope>,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    let method = parts
        .method
        .clone();
    let path = parts
        .uri
        .path()
        .to_string();

    let Some(route_match) = scope
        .router
        .match_route(&method, &path)
    else {
        debug!("No route for {} {}", method, path);
        return status_response(StatusCode::NOT_FOUND);
    };

    let body = match Limited::new(body, scope.body_limit)
        .collect()
        .await
    {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!("Body of {} {} exceeds {} bytes", method, path, scope.body_limit);
            return status_response(StatusCode::PAYLOAD_TOO_LARGE);
        }
        Err(e) => {
            warn!("Cannot read body of {} {}: {}", method, path, e);
            return status_response(StatusCode::BAD_REQUEST);
        }
    };

    let route = route_match.route();
    let request = Request::from_parts(
        parts,
        body,
        scope
            .certificate_chain
            .clone(),
        route_match.into_params(),
        Some(scope.remote_addr),
    );

    let handled = AssertUnwindSafe(route.handle(Context::new(request)))
        .catch_unwind()
        .await;

    match handled {
        Ok(Ok(context)) => match context
            .into_response()
            .send()
        {
            Ok(response) => {
                info!("{} {} -> {}", method, path, response.status());
                response
            }
            Err(e) => {
                error!("Cannot send response for {} {}: {}", method, path, e);
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        },
        Ok(Err(e)) => {
            error!("Handler for {} {} failed: {}", method, path, e);
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(_) => {
            error!("Handler for {} {} panicked", method, path);
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn status_response(status: StatusCode) -> http::Response<Full<Bytes>> {
    let reason = status
        .canonical_reason()
        .unwrap_or_default();
    let mut response = http::Response::new(Full::new(Bytes::from_static(reason.as_bytes())));
    *response.status_mut() = status;
    response
}
