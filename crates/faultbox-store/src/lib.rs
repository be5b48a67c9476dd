//! Cache-aside data layer for Faultbox.
//!
//! A [`Store`] composes a durable primary store and a cache. Reads prefer the
//! cache, fall back to the primary store, and degrade to deterministic mock
//! records whenever a transport is missing or unreachable:
//!
//! - [`Store::query_users_from_cache`] never fails. A mock or disconnected
//!   cache simulates an external fetch; a miss or an incomplete cache is
//!   repopulated with fresh mock records.
//! - [`Store::query_users_from_primary`] seeds an empty table with mock
//!   records. Only a failed seed insert (or query) is surfaced.
//!
//! Transports are selected once, at [`Store::connect`], as either
//! [`Backend::Live`] or [`Backend::Mock`].

pub mod backend;
pub mod error;
pub mod memory;
pub mod mysql_primary;
pub mod record;
pub mod redis_cache;
mod store;

pub use backend::{Backend, CacheBackend, CacheClient, PrimaryBackend, PrimaryClient};
pub use error::{StoreError, TransportError, TransportResult};
pub use memory::{MemoryCache, MemoryPrimary};
pub use mysql_primary::MySqlPrimary;
pub use record::{MockSource, USER_IDS_KEY, User, mock_users, user_key};
pub use redis_cache::RedisCache;
pub use store::Store;
