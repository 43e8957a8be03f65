use std::{future::Future, net::SocketAddr, pin::Pin};

use crate::errors::PorticoError;

pub(crate) mod tcp;

pub type ListenerResult<'a, T> = Pin<Box<dyn Future<Output = Result<T, PorticoError>> + Send + 'a>>;

/// A bound socket feeding connections into the server.
pub trait Listener {
    /// Binds and starts accepting, returning the address actually bound.
    fn listen(&mut self) -> ListenerResult<'_, SocketAddr>;

    /// Stops accepting and drains live connections.
    fn stop(&mut self) -> ListenerResult<'_, ()>;
}
