//! Server implementation.
//!
//! # Modules
//!
//! - [`certificate`]: Peer certificate records
//! - [`conn`]: Listener, transports and negotiated connections
//! - [`context`]: Request/response context handed to handlers
//! - [`http`]: HTTP/1.1 and HTTP/2 serving and request dispatch
//! - [`resolver`]: Key material lookup
//! - [`router`]: Route table and path patterns
//! - [`tls`]: TLS context construction
//!
//! # Examples
//!
//! ```rust,ignore
//! use portico::server::{context::Context, router::{handler_fn, Router}};
//!
//! let router = Router::builder()
//!     .get("/hello", handler_fn(|mut context: Context| async move {
//!         context.ok("Hello World!")?;
//!         Ok(context)
//!     }))
//!     .build()?;
//! ```

pub mod certificate;
pub mod conn;
pub mod context;
pub mod http;
pub mod resolver;
pub mod router;
pub mod tls;
