//! Connection handling.
//!
//! - [`listener`]: binds the socket and owns the accept loop.
//! - [`transport`]: turns an accepted socket into a [`NegotiatedConnection`].
//!
//! Everything above this module works on [`NegotiatedConnection`] and never
//! looks at which transport produced it.

use std::{fmt, net::SocketAddr};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::server::certificate::CertificateChain;

pub mod listener;
pub mod transport;

/// Byte stream of an established connection, plain or encrypted.
pub trait ConnectionIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ConnectionIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// HTTP framing spoken on a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplicationProtocol {
    Http1,
    Http2,
}

impl fmt::Display for ApplicationProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationProtocol::Http1 => f.write_str("HTTP/1.1"),
            ApplicationProtocol::Http2 => f.write_str("HTTP/2"),
        }
    }
}

/// A connection ready to carry HTTP.
pub struct NegotiatedConnection {
    io: Box<dyn ConnectionIo>,
    peer_certificates: CertificateChain,
    application_protocol: ApplicationProtocol,
    remote_addr: SocketAddr,
}

impl NegotiatedConnection {
    pub(crate) fn new(
        io: Box<dyn ConnectionIo>,
        peer_certificates: CertificateChain,
        application_protocol: ApplicationProtocol,
        remote_addr: SocketAddr,
    ) -> Self {
        Self { io, peer_certificates, application_protocol, remote_addr }
    }

    /// Verified client certificates, empty when none were presented.
    pub fn peer_certificates(&self) -> &CertificateChain {
        &self.peer_certificates
    }

    pub fn application_protocol(&self) -> ApplicationProtocol {
        self.application_protocol
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub(crate) fn into_io(self) -> Box<dyn ConnectionIo> {
        self.io
    }
}

impl fmt::Debug for NegotiatedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiatedConnection")
            .field("peer_certificates", &self.peer_certificates)
            .field("application_protocol", &self.application_protocol)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}
