//! Configuration builders and types for portico.
//!
//! This module provides a fluent builder API for configuring:
//! - The bound listener (address, port, protocol, timeouts)
//! - TLS key material and client authentication
//!
//! Settings are immutable once built and are validated by `build()`.
//!
//! # Examples
//!
//! ```rust,ignore
//! use portico::config::{Protocol, ServerSettings, SslSettings};
//!
//! let ssl = SslSettings::builder()
//!     .key_store("resource://localhost/ssl/identity.pem")
//!     .trust_store("resource://localhost/ssl/trust.pem")
//!     .client_auth(true)
//!     .build()?;
//!
//! let settings = ServerSettings::builder()
//!     .bind_port(0)
//!     .protocol(Protocol::Https)
//!     .ssl_settings(ssl)
//!     .build()?;
//! ```

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use url::Url;

use crate::errors::{ConfigError, PorticoError};

/// Default port, used when none is configured.
pub const DEFAULT_PORT: u16 = 2010;

/// Application protocols the server can terminate.
///
/// # Examples
///
/// ```rust,ignore
/// use portico::config::Protocol;
///
/// assert!(!Protocol::Http.requires_tls());
/// assert!(Protocol::Https.requires_tls());
/// assert!(Protocol::Http2.requires_tls());
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Protocol {
    /// Plain HTTP/1.1
    #[default]
    Http,
    /// HTTP/1.1 over TLS
    Https,
    /// HTTP/2 over TLS, negotiated with ALPN, falling back to HTTP/1.1
    Http2,
}

impl Protocol {
    /// Returns whether this protocol needs SSL settings.
    pub fn requires_tls(&self) -> bool {
        matches!(self, Protocol::Https | Protocol::Http2)
    }

    /// URI scheme clients use to reach a server speaking this protocol.
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https | Protocol::Http2 => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "HTTP"),
            Protocol::Https => write!(f, "HTTPS"),
            Protocol::Http2 => write!(f, "HTTP2"),
        }
    }
}

/// Builder for creating `SslSettings` instances.
///
/// Locations are URIs handed to a
/// [`KeyMaterialResolver`](crate::server::resolver::KeyMaterialResolver).
/// When a password is not set, the host part of its location is used, so
/// `resource://secret/ssl/identity.pem` carries the password `secret`.
#[derive(Clone, Default)]
pub struct SslSettingsBuilder {
    key_store: String,
    key_store_password: Option<String>,
    trust_store: Option<String>,
    trust_store_password: Option<String>,
    client_auth: bool,
}

impl SslSettingsBuilder {
    /// Sets the key store location (server certificate chain and private key).
    pub fn key_store(mut self, location: &str) -> Self {
        self.key_store = location.to_string();
        self
    }

    /// Sets the key store password.
    pub fn key_store_password(mut self, password: &str) -> Self {
        self.key_store_password = Some(password.to_string());
        self
    }

    /// Sets the trust store location (certificates of accepted client issuers).
    pub fn trust_store(mut self, location: &str) -> Self {
        self.trust_store = Some(location.to_string());
        self
    }

    /// Sets the trust store password.
    pub fn trust_store_password(mut self, password: &str) -> Self {
        self.trust_store_password = Some(password.to_string());
        self
    }

    /// Requires clients to present a trusted certificate (mutual TLS).
    pub fn client_auth(mut self, client_auth: bool) -> Self {
        self.client_auth = client_auth;
        self
    }

    /// Creates the `SslSettings`, validating the locations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLocation`] when a location is empty or not a URI.
    pub fn build(self) -> Result<SslSettings, PorticoError> {
        let key_store = parse_location(&self.key_store)?;
        let trust_store = self
            .trust_store
            .as_deref()
            .map(parse_location)
            .transpose()?;

        Ok(SslSettings {
            key_store,
            key_store_password: self.key_store_password,
            trust_store,
            trust_store_password: self.trust_store_password,
            client_auth: self.client_auth,
        })
    }
}

fn parse_location(location: &str) -> Result<Url, PorticoError> {
    if location.is_empty() {
        return Err(ConfigError::InvalidLocation {
            location: location.to_string(),
            reason: "location is empty".to_string(),
        }
        .into());
    }

    Url::parse(location).map_err(|e| {
        ConfigError::InvalidLocation { location: location.to_string(), reason: e.to_string() }
            .into()
    })
}

fn password_for(explicit: &Option<String>, location: &Url) -> String {
    match explicit {
        Some(password) => password.clone(),
        None => location
            .host_str()
            .unwrap_or_default()
            .to_string(),
    }
}

/// TLS key material and client authentication settings.
#[derive(Clone, PartialEq)]
pub struct SslSettings {
    key_store: Url,
    key_store_password: Option<String>,
    trust_store: Option<Url>,
    trust_store_password: Option<String>,
    client_auth: bool,
}

impl SslSettings {
    /// Creates a new `SslSettingsBuilder` without client authentication.
    pub fn builder() -> SslSettingsBuilder {
        SslSettingsBuilder::default()
    }

    /// Returns the key store location.
    pub fn key_store(&self) -> &Url {
        &self.key_store
    }

    /// Returns the effective key store password.
    pub fn key_store_password(&self) -> String {
        password_for(&self.key_store_password, &self.key_store)
    }

    /// Returns whether the key store password was set rather than derived.
    pub fn has_key_store_password(&self) -> bool {
        self.key_store_password
            .is_some()
    }

    /// Returns the trust store location, if any.
    pub fn trust_store(&self) -> Option<&Url> {
        self.trust_store
            .as_ref()
    }

    /// Returns the effective trust store password, if a trust store is configured.
    pub fn trust_store_password(&self) -> Option<String> {
        self.trust_store
            .as_ref()
            .map(|location| password_for(&self.trust_store_password, location))
    }

    /// Returns whether clients must present a trusted certificate.
    pub fn client_auth(&self) -> bool {
        self.client_auth
    }
}

impl fmt::Debug for SslSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslSettings")
            .field("key_store", &self.key_store.as_str())
            .field("key_store_password", &"<redacted>")
            .field(
                "trust_store",
                &self
                    .trust_store
                    .as_ref()
                    .map(Url::as_str),
            )
            .field("trust_store_password", &"<redacted>")
            .field("client_auth", &self.client_auth)
            .finish()
    }
}

/// Builder for creating `ServerSettings` instances.
///
/// # Examples
///
/// ```rust,ignore
/// use portico::config::ServerSettings;
///
/// let settings = ServerSettings::builder()
///     .bind_address("0.0.0.0")
///     .bind_port(8080)
///     .build()?;
/// ```
#[derive(Clone, Debug)]
pub struct ServerSettingsBuilder {
    bind_address: String,
    bind_port: u16,
    protocol: Protocol,
    ssl_settings: Option<SslSettings>,
    shutdown_timeout: Duration,
    handshake_timeout: Duration,
    body_limit: usize,
}

impl ServerSettingsBuilder {
    /// Sets the address to bind to.
    ///
    /// Common values:
    /// - "127.0.0.1" - Localhost only (default)
    /// - "0.0.0.0" - All IPv4 interfaces
    /// - "::" - All IPv6 interfaces
    pub fn bind_address(mut self, bind_address: &str) -> Self {
        self.bind_address = bind_address.to_string();
        self
    }

    /// Sets the port to bind to, `0` lets the operating system choose.
    pub fn bind_port(mut self, bind_port: u16) -> Self {
        self.bind_port = bind_port;
        self
    }

    /// Sets the protocol served by the listener.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the TLS settings, required for HTTPS and HTTP2.
    pub fn ssl_settings(mut self, ssl_settings: SslSettings) -> Self {
        self.ssl_settings = Some(ssl_settings);
        self
    }

    /// Sets how long `stop` waits for in-flight responses.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets how long a TLS handshake may take before the connection is dropped.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the maximum accepted request body size in bytes.
    pub fn body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    /// Creates the `ServerSettings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address is not an IP address, or if the
    /// protocol requires TLS and no SSL settings were given.
    pub fn build(self) -> Result<ServerSettings, PorticoError> {
        let bind_address = self
            .bind_address
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidAddress(self.bind_address.clone()))?;

        if self
            .protocol
            .requires_tls()
            && self
                .ssl_settings
                .is_none()
        {
            return Err(ConfigError::MissingSslSettings(
                self.protocol
                    .to_string(),
            )
            .into());
        }

        Ok(ServerSettings {
            bind_address,
            bind_port: self.bind_port,
            protocol: self.protocol,
            ssl_settings: self.ssl_settings,
            shutdown_timeout: self.shutdown_timeout,
            handshake_timeout: self.handshake_timeout,
            body_limit: self.body_limit,
        })
    }
}

/// Settings of the single listener a server binds.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerSettings {
    bind_address: IpAddr,
    bind_port: u16,
    protocol: Protocol,
    ssl_settings: Option<SslSettings>,
    shutdown_timeout: Duration,
    handshake_timeout: Duration,
    body_limit: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bind_port: DEFAULT_PORT,
            protocol: Protocol::Http,
            ssl_settings: None,
            shutdown_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            body_limit: 8 * 1024 * 1024,
        }
    }
}

impl ServerSettings {
    /// Creates a new `ServerSettingsBuilder` with default settings.
    ///
    /// Default values:
    /// - bind_address: "127.0.0.1"
    /// - bind_port: 2010
    /// - protocol: HTTP
    /// - shutdown_timeout: 5 seconds
    /// - handshake_timeout: 10 seconds
    /// - body_limit: 8 MiB
    pub fn builder() -> ServerSettingsBuilder {
        ServerSettings::default().to_builder()
    }

    /// Returns a builder seeded with these settings, to derive a variant.
    ///
    /// ```rust,ignore
    /// let https = settings.to_builder().protocol(Protocol::Https).build()?;
    /// ```
    pub fn to_builder(&self) -> ServerSettingsBuilder {
        ServerSettingsBuilder {
            bind_address: self
                .bind_address
                .to_string(),
            bind_port: self.bind_port,
            protocol: self.protocol,
            ssl_settings: self
                .ssl_settings
                .clone(),
            shutdown_timeout: self.shutdown_timeout,
            handshake_timeout: self.handshake_timeout,
            body_limit: self.body_limit,
        }
    }

    /// Returns the bind address.
    pub fn bind_address(&self) -> IpAddr {
        self.bind_address
    }

    /// Returns the configured port, `0` meaning ephemeral.
    pub fn bind_port(&self) -> u16 {
        self.bind_port
    }

    /// Returns the protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the TLS settings.
    pub fn ssl_settings(&self) -> Option<&SslSettings> {
        self.ssl_settings
            .as_ref()
    }

    /// Returns the graceful shutdown bound.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the TLS handshake bound.
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Returns the maximum request body size.
    pub fn body_limit(&self) -> usize {
        self.body_limit
    }
}
