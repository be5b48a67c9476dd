//! Transport seams for the primary store and the cache.
//!
//! Each transport is selected once at startup as either a live client or
//! the mock substitute. Callers match on [`Backend`] rather than probing the
//! client type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::record::User;

/// Durable record store.
#[async_trait]
pub trait PrimaryClient: Send + Sync {
    /// Whether the connection is still usable.
    fn is_connected(&self) -> bool;

    /// Lists every stored user.
    async fn fetch_users(&self) -> TransportResult<Vec<User>>;

    /// Inserts a single user row.
    async fn insert_user(&self, user: &User) -> TransportResult<()>;

    /// Releases the connection. Further calls fail with `Disconnected`.
    async fn close(&self);
}

/// Fast, lossy key-value store.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Whether the connection is still usable.
    fn is_connected(&self) -> bool;

    /// Reads a key; `None` when absent.
    async fn get(&self, key: &str) -> TransportResult<Option<String>>;

    /// Writes a key. `None` ttl keeps the entry until evicted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> TransportResult<()>;

    /// Sends a raw control command (e.g. `FAULT.START 100`) and returns the reply.
    async fn send_control(&self, args: &[String]) -> TransportResult<String>;

    /// Releases the connection. Further calls fail with `Disconnected`.
    async fn close(&self);
}

/// A transport chosen at initialization: live, or the mock substitute.
pub enum Backend<T: ?Sized> {
    Live(Arc<T>),
    Mock,
}

pub type PrimaryBackend = Backend<dyn PrimaryClient>;
pub type CacheBackend = Backend<dyn CacheClient>;

impl<T: ?Sized> Backend<T> {
    /// The live client, if any.
    pub fn live(&self) -> Option<&Arc<T>> {
        match self {
            Self::Live(client) => Some(client),
            Self::Mock => None,
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, Self::Mock)
    }
}

impl<T: ?Sized> Clone for Backend<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Live(client) => Self::Live(Arc::clone(client)),
            Self::Mock => Self::Mock,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Backend<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live(_) => f.write_str("Live"),
            Self::Mock => f.write_str("Mock"),
        }
    }
}

impl PrimaryBackend {
    /// Wraps a shared primary client as the live backend.
    pub fn from_client<C: PrimaryClient + 'static>(client: Arc<C>) -> Self {
        Self::Live(client)
    }
}

impl CacheBackend {
    /// Wraps a shared cache client as the live backend.
    pub fn from_client<C: CacheClient + 'static>(client: Arc<C>) -> Self {
        Self::Live(client)
    }
}
