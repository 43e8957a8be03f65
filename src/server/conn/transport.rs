//! Transport variants.
//!
//! [`Transport`] is chosen once from the configured [`Protocol`] and then
//! negotiates every accepted socket the same way:
//!
//! - `Plain` hands the socket over untouched and speaks HTTP/1.1.
//! - `Tls` runs a TLS handshake advertising `http/1.1`.
//! - `Tls2` runs a TLS handshake advertising `h2` then `http/1.1`, and speaks
//!   whatever the client picked. Clients sending no ALPN get HTTP/1.1.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use log::{debug, warn};
use tokio::{net::TcpStream, time::timeout};
use tokio_rustls::{server::TlsStream, TlsAcceptor};

use crate::{
    config::Protocol,
    errors::{ConfigError, NegotiationError, PorticoError},
    server::{
        certificate::CertificateChain,
        conn::{ApplicationProtocol, NegotiatedConnection},
        tls::TlsContext,
    },
};

pub const ALPN_HTTP1: &[u8] = b"http/1.1";
pub const ALPN_H2: &[u8] = b"h2";

/// How accepted sockets become [`NegotiatedConnection`]s.
#[derive(Clone)]
pub enum Transport {
    Plain,
    Tls(TlsAcceptor),
    Tls2(TlsAcceptor),
}

impl Transport {
    /// Selects the variant for `protocol`.
    ///
    /// # Errors
    ///
    /// Fails when `protocol` needs TLS and `tls` is `None`, or when rustls
    /// rejects the context.
    pub fn new(protocol: Protocol, tls: Option<&TlsContext>) -> Result<Self, PorticoError> {
        if !protocol.requires_tls() {
            return Ok(Transport::Plain);
        }

        let context = tls.ok_or_else(|| ConfigError::MissingSslSettings(protocol.to_string()))?;
        let config = context.server_config(alpn_protocols(protocol))?;
        let acceptor = TlsAcceptor::from(Arc::new(config));

        match protocol {
            Protocol::Http2 => Ok(Transport::Tls2(acceptor)),
            _ => Ok(Transport::Tls(acceptor)),
        }
    }

    /// Negotiates an accepted socket.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError`] when the handshake fails, including a
    /// missing or untrusted client certificate, or takes longer than
    /// `handshake_timeout`.
    pub async fn negotiate(
        &self,
        stream: TcpStream,
        remote_addr: SocketAddr,
        handshake_timeout: Duration,
    ) -> Result<NegotiatedConnection, NegotiationError> {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Cannot set TCP_NODELAY for {}: {}", remote_addr, e);
        }

        match self {
            Transport::Plain => Ok(NegotiatedConnection::new(
                Box::new(stream),
                CertificateChain::empty(),
                ApplicationProtocol::Http1,
                remote_addr,
            )),
            Transport::Tls(acceptor) => {
                let tls_stream = handshake(acceptor, stream, handshake_timeout).await?;
                let peer_certificates = peer_certificates(&tls_stream)?;
                Ok(NegotiatedConnection::new(
                    Box::new(tls_stream),
                    peer_certificates,
                    ApplicationProtocol::Http1,
                    remote_addr,
                ))
            }
            Transport::Tls2(acceptor) => {
                let tls_stream = handshake(acceptor, stream, handshake_timeout).await?;
                let peer_certificates = peer_certificates(&tls_stream)?;
                let application_protocol = match tls_stream
                    .get_ref()
                    .1
                    .alpn_protocol()
                {
                    Some(ALPN_H2) => ApplicationProtocol::Http2,
                    _ => ApplicationProtocol::Http1,
                };
                debug!("Negotiated {} with {}", application_protocol, remote_addr);
                Ok(NegotiatedConnection::new(
                    Box::new(tls_stream),
                    peer_certificates,
                    application_protocol,
                    remote_addr,
                ))
            }
        }
    }
}

/// ALPN identifiers advertised for `protocol`, in preference order.
pub fn alpn_protocols(protocol: Protocol) -> Vec<Vec<u8>> {
    match protocol {
        Protocol::Http => Vec::new(),
        Protocol::Https => vec![ALPN_HTTP1.to_vec()],
        Protocol::Http2 => vec![ALPN_H2.to_vec(), ALPN_HTTP1.to_vec()],
    }
}

async fn handshake(
    acceptor: &TlsAcceptor,
    stream: TcpStream,
    handshake_timeout: Duration,
) -> Result<TlsStream<TcpStream>, NegotiationError> {
    match timeout(handshake_timeout, acceptor.accept(stream)).await {
        Ok(Ok(tls_stream)) => Ok(tls_stream),
        Ok(Err(e)) => Err(NegotiationError::Handshake(e.to_string())),
        Err(_) => Err(NegotiationError::Timeout(handshake_timeout.as_millis())),
    }
}

fn peer_certificates(
    tls_stream: &TlsStream<TcpStream>,
) -> Result<CertificateChain, NegotiationError> {
    match tls_stream
        .get_ref()
        .1
        .peer_certificates()
    {
        Some(certificates) => CertificateChain::from_der(certificates),
        None => Ok(CertificateChain::empty()),
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Plain => f.write_str("Plain"),
            Transport::Tls(_) => f.write_str("Tls"),
            Transport::Tls2(_) => f.write_str("Tls2"),
        }
    }
}
