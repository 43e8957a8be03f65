//! Per-request context handed to route handlers.
//!
//! A [`Context`] pairs the immutable [`Request`] read from the wire with the
//! [`Response`] the handler is building. Handlers take the context by value
//! and hand it back once the response is ready.
//!
//! # Examples
//!
//! ```rust,ignore
//! use portico::server::{context::Context, router::handler_fn};
//!
//! let hello = handler_fn(|mut context: Context| async move {
//!     if let Some(certificate) = context.certificate() {
//!         let subject = certificate.subject().to_string();
//!         context.response_mut().set_header("cert", &subject)?;
//!     }
//!     context.ok("Hello World!")?;
//!     Ok(context)
//! });
//! ```

use std::{net::SocketAddr, str};

use bytes::Bytes;
use http::{
    header::{HeaderName, HeaderValue},
    HeaderMap, Method, StatusCode, Uri, Version,
};
use http_body_util::Full;

use crate::{
    errors::{ContextError, PorticoError},
    server::{
        certificate::{Certificate, CertificateChain},
        router::PathParams,
    },
};

/// HTTP request as seen by a handler.
///
/// The body is fully read before the handler runs. The peer certificate chain
/// is the one verified while negotiating the connection, whatever transport
/// produced it.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    certificate_chain: CertificateChain,
    path_params: PathParams,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        certificate_chain: CertificateChain,
        path_params: PathParams,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            certificate_chain,
            path_params,
            remote_addr,
        }
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the URI path.
    pub fn path(&self) -> &str {
        self.uri
            .path()
    }

    /// Returns the query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.uri
            .query()
    }

    /// Returns the HTTP version the request arrived with.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of a header, if present and textual.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| {
                value
                    .to_str()
                    .ok()
            })
    }

    /// Returns the raw request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the request body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidBody`] when the body is not UTF-8.
    pub fn body_text(&self) -> Result<&str, PorticoError> {
        str::from_utf8(&self.body).map_err(|_| ContextError::InvalidBody.into())
    }

    /// Returns the certificates presented by the client, leaf first.
    pub fn certificate_chain(&self) -> &CertificateChain {
        &self.certificate_chain
    }

    /// Returns the client certificate, if one was presented.
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate_chain
            .leaf()
    }

    /// Returns the parameters bound by the matched route pattern.
    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// Returns a single path parameter.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .get(name)
    }

    /// Returns the peer address.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Response under construction.
///
/// Mutable until the server sends it; afterwards every mutation fails with
/// [`ContextError::AlreadySent`]. The server takes the response out of the
/// [`Context`] before sending it, so handlers only ever hold an unsent one.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    sent: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: Bytes::new(), sent: false }
    }
}

impl Response {
    /// Creates an empty `200 OK` response.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_mutable(&self) -> Result<(), PorticoError> {
        if self.sent {
            return Err(ContextError::AlreadySent.into());
        }
        Ok(())
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns whether the response was already sent.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) -> Result<(), PorticoError> {
        self.ensure_mutable()?;
        self.status = status;
        Ok(())
    }

    /// Sets a header, replacing previous values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), PorticoError> {
        self.ensure_mutable()?;
        let (name, value) = header_pair(name, value)?;
        self.headers
            .insert(name, value);
        Ok(())
    }

    /// Adds a header value, keeping previous values.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<(), PorticoError> {
        self.ensure_mutable()?;
        let (name, value) = header_pair(name, value)?;
        self.headers
            .append(name, value);
        Ok(())
    }

    /// Removes all values of a header.
    pub fn remove_header(&mut self, name: &str) -> Result<(), PorticoError> {
        self.ensure_mutable()?;
        self.headers
            .remove(name);
        Ok(())
    }

    /// Sets the body.
    pub fn set_body(&mut self, body: impl Into<Bytes>) -> Result<(), PorticoError> {
        self.ensure_mutable()?;
        self.body = body.into();
        Ok(())
    }

    /// Marks the response as sent and converts it for the wire.
    pub(crate) fn send(&mut self) -> Result<http::Response<Full<Bytes>>, PorticoError> {
        self.ensure_mutable()?;
        self.sent = true;

        let mut response = http::Response::new(Full::new(self.body.clone()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self
            .headers
            .clone();

        Ok(response)
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), PorticoError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ContextError::InvalidHeader(name.to_string()))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| ContextError::InvalidHeader(format!("{}: {}", name, value)))?;
    Ok((header_name, header_value))
}

/// Request and response of one exchange.
#[derive(Debug)]
pub struct Context {
    request: Request,
    response: Response,
}

impl Context {
    /// Creates a context with a fresh `200 OK` response.
    pub fn new(request: Request) -> Self {
        Self { request, response: Response::new() }
    }

    /// Returns the request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the response.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Returns the response for modification.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Shortcut for [`Request::certificate_chain`].
    pub fn certificate_chain(&self) -> &CertificateChain {
        self.request
            .certificate_chain()
    }

    /// Shortcut for [`Request::certificate`].
    pub fn certificate(&self) -> Option<&Certificate> {
        self.request
            .certificate()
    }

    /// Responds `200 OK` with `body`.
    pub fn ok(&mut self, body: impl Into<Bytes>) -> Result<(), PorticoError> {
        self.send(StatusCode::OK, body)
    }

    /// Responds with `status` and `body`.
    pub fn send(&mut self, status: StatusCode, body: impl Into<Bytes>) -> Result<(), PorticoError> {
        self.response
            .set_status(status)?;
        self.response
            .set_body(body)
    }

    /// Splits the context, used by the server once the handler returned.
    pub(crate) fn into_response(self) -> Response {
        self.response
    }
}
