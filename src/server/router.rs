//! Request routing.
//!
//! A [`Router`] is an ordered list of routes, each pairing an HTTP method and
//! a path pattern with a handler. Matching walks the list in insertion order
//! and the first route that fits wins, so specific patterns must be added
//! before catch-alls.
//!
//! Pattern syntax:
//!
//! - `/hello` matches the literal path.
//! - `/users/{id}` binds any non-empty segment to `id`.
//! - `/static/*` matches any remainder, bound to `*`.
//!
//! # Examples
//!
//! ```rust,ignore
//! use portico::server::router::{handler_fn, Router};
//!
//! let router = Router::builder()
//!     .get("/users/me", handler_fn(|mut context| async move {
//!         context.ok("me")?;
//!         Ok(context)
//!     }))
//!     .get("/users/{id}", handler_fn(|mut context| async move {
//!         let id = context.request().path_param("id").unwrap_or_default().to_string();
//!         context.ok(id)?;
//!         Ok(context)
//!     }))
//!     .build()?;
//! ```

use std::{collections::HashSet, fmt, future::Future, pin::Pin};

use http::Method;

use crate::{
    errors::{ConfigError, PorticoError},
    server::context::Context,
};

/// Name under which a trailing `*` binds the matched remainder.
pub const WILDCARD: &str = "*";

/// Future returned by route handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Context, PorticoError>> + Send>>;

/// Type alias for boxed handler closures.
///
/// A handler receives the request context, fills in the response and returns
/// the context. Returning an error makes the server answer
/// `500 Internal Server Error`.
pub type BoxedHandler = Box<dyn Fn(Context) -> HandlerFuture + Send + Sync>;

/// Creates a handler closure from an async function.
///
/// # Examples
///
/// ```rust,ignore
/// use portico::server::{context::Context, router::handler_fn};
/// use portico::errors::PorticoError;
///
/// async fn hello(mut context: Context) -> Result<Context, PorticoError> {
///     context.ok("Hello!")?;
///     Ok(context)
/// }
///
/// let handler = handler_fn(hello);
/// ```
pub fn handler_fn<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Context, PorticoError>> + Send + 'static,
{
    Box::new(move |context| Box::pin(f(context)))
}

/// Parameters bound while matching a path, in pattern order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    fn push(&mut self, name: &str, value: &str) {
        self.params
            .push((name.to_string(), value.to_string()));
    }

    /// Returns the value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.params
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.params
            .is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// A parsed route pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parses a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRoute`] when the pattern does not start
    /// with `/`, has an empty or repeated parameter name, mixes literal text
    /// with a parameter inside one segment, or has `*` before its last segment.
    pub fn parse(pattern: &str) -> Result<Self, PorticoError> {
        let invalid = |reason: &str| -> PorticoError {
            ConfigError::InvalidRoute { pattern: pattern.to_string(), reason: reason.to_string() }
                .into()
        };

        let rest = pattern
            .strip_prefix('/')
            .ok_or_else(|| invalid("pattern must start with '/'"))?;

        let parts: Vec<&str> = rest
            .split('/')
            .collect();
        let mut names = HashSet::new();
        let mut segments = Vec::with_capacity(parts.len());

        for (index, part) in parts
            .iter()
            .enumerate()
        {
            let segment = if *part == WILDCARD {
                if index + 1 != parts.len() {
                    return Err(invalid("'*' is only allowed as the last segment"));
                }
                Segment::Wildcard
            } else if let Some(name) = part
                .strip_prefix('{')
                .and_then(|part| part.strip_suffix('}'))
            {
                if name.is_empty() {
                    return Err(invalid("parameter name is empty"));
                }
                if !names.insert(name) {
                    return Err(invalid("parameter name is repeated"));
                }
                Segment::Param(name.to_string())
            } else if part.contains(['{', '}']) {
                return Err(invalid("parameters must span a whole segment"));
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self { raw: pattern.to_string(), segments })
    }

    /// Returns the pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches `path` structurally, returning the bound parameters.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let rest = path.strip_prefix('/')?;
        let mut parts = rest.split('/');
        let mut params = PathParams::default();

        for segment in &self.segments {
            match segment {
                Segment::Wildcard => {
                    let remainder: Vec<&str> = parts.collect();
                    params.push(WILDCARD, &remainder.join("/"));
                    return Some(params);
                }
                Segment::Literal(literal) => {
                    if parts.next()? != literal {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.next()?;
                    if value.is_empty() {
                        return None;
                    }
                    params.push(name, value);
                }
            }
        }

        match parts.next() {
            Some(_) => None,
            None => Some(params),
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A method, a pattern and the handler serving them.
pub struct Route {
    method: Method,
    pattern: PathPattern,
    handler: BoxedHandler,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Runs the handler.
    pub fn handle(&self, context: Context) -> HandlerFuture {
        (self.handler)(context)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.raw)
            .finish_non_exhaustive()
    }
}

/// Result of a successful [`Router::match_route`].
#[derive(Debug)]
pub struct RouteMatch<'a> {
    route: &'a Route,
    params: PathParams,
}

impl<'a> RouteMatch<'a> {
    pub fn route(&self) -> &'a Route {
        self.route
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn into_params(self) -> PathParams {
        self.params
    }
}

/// Builder collecting routes in registration order.
#[derive(Default)]
pub struct RouterBuilder {
    routes: Vec<Route>,
    error: Option<PorticoError>,
}

impl RouterBuilder {
    /// Adds a route for `method` and `pattern`.
    ///
    /// Pattern errors are reported by [`RouterBuilder::build`].
    pub fn route(mut self, method: Method, pattern: &str, handler: BoxedHandler) -> Self {
        match PathPattern::parse(pattern) {
            Ok(pattern) => self
                .routes
                .push(Route { method, pattern, handler }),
            Err(e) => {
                if self
                    .error
                    .is_none()
                {
                    self.error = Some(e);
                }
            }
        }
        self
    }

    pub fn get(self, pattern: &str, handler: BoxedHandler) -> Self {
        self.route(Method::GET, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: BoxedHandler) -> Self {
        self.route(Method::POST, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: BoxedHandler) -> Self {
        self.route(Method::PUT, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: BoxedHandler) -> Self {
        self.route(Method::DELETE, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: BoxedHandler) -> Self {
        self.route(Method::PATCH, pattern, handler)
    }

    pub fn head(self, pattern: &str, handler: BoxedHandler) -> Self {
        self.route(Method::HEAD, pattern, handler)
    }

    pub fn options(self, pattern: &str, handler: BoxedHandler) -> Self {
        self.route(Method::OPTIONS, pattern, handler)
    }

    /// Freezes the route table.
    ///
    /// # Errors
    ///
    /// Returns the first invalid pattern error.
    pub fn build(self) -> Result<Router, PorticoError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Router { routes: self.routes })
    }
}

/// Immutable, insertion ordered route table.
///
/// Matching is a pure function of the table and its input, so a router can be
/// shared between any number of connections.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Returns the earliest registered route matching `method` and `path`.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| &route.method == method)
            .find_map(|route| {
                route
                    .pattern
                    .matches(path)
                    .map(|params| RouteMatch { route, params })
            })
    }

    /// Returns the routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
