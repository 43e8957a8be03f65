//! Peer certificate records exposed to handlers.

use std::{ops::Deref, sync::Arc};

use rustls::pki_types::CertificateDer;
use x509_parser::parse_x509_certificate;

use crate::errors::NegotiationError;

/// A decoded X.509 certificate presented by a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    der: CertificateDer<'static>,
    subject: String,
    issuer: String,
    serial: String,
}

impl Certificate {
    /// Decodes a DER encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::Certificate`] if the bytes are not a certificate.
    pub fn from_der(der: CertificateDer<'static>) -> Result<Self, NegotiationError> {
        let (subject, issuer, serial) = {
            let (_, parsed) = parse_x509_certificate(der.as_ref())
                .map_err(|e| NegotiationError::Certificate(e.to_string()))?;
            (
                parsed
                    .subject()
                    .to_string(),
                parsed
                    .issuer()
                    .to_string(),
                parsed.raw_serial_as_string(),
            )
        };

        Ok(Self { der, subject, issuer, serial })
    }

    /// Subject distinguished name, e.g. `CN=hexagonkt.com`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serial number as colon separated hex.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Raw DER bytes.
    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }
}

/// Certificates presented by a peer, leaf first.
///
/// Empty when the peer presented none. Cloning is cheap, all requests of a
/// connection share the same chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertificateChain {
    certificates: Arc<[Certificate]>,
}

impl CertificateChain {
    /// An empty chain.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decodes the chain rustls reports for a connection.
    pub fn from_der(certificates: &[CertificateDer<'_>]) -> Result<Self, NegotiationError> {
        let certificates = certificates
            .iter()
            .map(|der| Certificate::from_der(der.clone().into_owned()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { certificates: certificates.into() })
    }

    /// The leaf certificate, if any.
    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificates
            .first()
    }
}

impl Deref for CertificateChain {
    type Target = [Certificate];

    fn deref(&self) -> &Self::Target {
        &self.certificates
    }
}

impl From<Vec<Certificate>> for CertificateChain {
    fn from(certificates: Vec<Certificate>) -> Self {
        Self { certificates: certificates.into() }
    }
}
