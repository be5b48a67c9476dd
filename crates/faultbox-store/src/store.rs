//! Cache-aside store over a primary store and a cache.

use std::sync::Arc;
use std::time::Duration;

use faultbox_config::{DataConfig, FaultboxConfig};
use tracing::{info, warn};

use crate::backend::{Backend, CacheBackend, CacheClient, PrimaryBackend};
use crate::error::{StoreError, TransportError, TransportResult};
use crate::mysql_primary::MySqlPrimary;
use crate::record::{MockSource, USER_IDS_KEY, User, mock_users, user_key};
use crate::redis_cache::RedisCache;

/// Serves user records, preferring the cache, and degrades to mock data
/// whenever a backing store is unavailable.
#[derive(Debug, Clone)]
pub struct Store {
    primary: PrimaryBackend,
    cache: CacheBackend,
    data: DataConfig,
    cache_ttl: Option<Duration>,
}

impl Store {
    pub fn new(primary: PrimaryBackend, cache: CacheBackend, data: DataConfig) -> Self {
        Self {
            primary,
            cache,
            data,
            cache_ttl: None,
        }
    }

    /// Expire cache entries after `ttl`.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Connects the configured transports.
    ///
    /// A transport that is disabled or fails to connect is replaced by
    /// [`Backend::Mock`] for the lifetime of the store.
    pub async fn connect(config: &FaultboxConfig) -> Self {
        let primary = if config.primary.enabled {
            match MySqlPrimary::connect(&config.primary).await {
                Ok(client) => PrimaryBackend::from_client(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "MySQL connection failed, using mock primary store");
                    Backend::Mock
                }
            }
        } else {
            info!("Primary store disabled, using mock primary store");
            Backend::Mock
        };

        let cache = if config.cache.enabled {
            match RedisCache::connect(&config.cache).await {
                Ok(client) => CacheBackend::from_client(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "Redis connection failed, using mock cache");
                    Backend::Mock
                }
            }
        } else {
            info!("Cache disabled, using mock cache");
            Backend::Mock
        };

        let mut store = Self::new(primary, cache, config.data.clone());
        if config.cache.ttl_secs > 0 {
            store = store.with_cache_ttl(Duration::from_secs(config.cache.ttl_secs));
        }

        info!(
            primary = ?store.primary,
            cache = ?store.cache,
            "Storage layer initialized"
        );
        store
    }

    pub fn primary(&self) -> &PrimaryBackend {
        &self.primary
    }

    /// The cache transport; the downstream-latency fault drives it too.
    pub fn cache(&self) -> &CacheBackend {
        &self.cache
    }

    /// Reads the user set through the cache.
    ///
    /// Never fails: a missing or disconnected cache yields a simulated
    /// fetch, and a miss or incomplete cache is repopulated with fresh
    /// mock records.
    pub async fn query_users_from_cache(&self) -> Vec<User> {
        let client = match &self.cache {
            Backend::Live(client) if client.is_connected() => client,
            _ => return self.simulate_http_fetch().await,
        };

        if let Some(users) = self.read_cached_users(client.as_ref()).await {
            info!(count = users.len(), "All users retrieved from cache");
            return users;
        }

        let users = mock_users(MockSource::Cache, self.data.mock_count);
        self.populate_cache(client.as_ref(), &users).await;
        info!(count = users.len(), "Mocked users and cached them");
        users
    }

    /// Reads the user set from the primary store.
    ///
    /// A mock primary yields mock records without any write-back. An empty
    /// table is seeded with mock records; a failed seed insert is fatal.
    pub async fn query_users_from_primary(&self) -> Result<Vec<User>, StoreError> {
        let client = match &self.primary {
            Backend::Live(client) if client.is_connected() => client,
            _ => {
                info!("Primary store unavailable, returning mock users");
                return Ok(mock_users(MockSource::Database, self.data.mock_count));
            }
        };

        let users = client.fetch_users().await.map_err(StoreError::Query)?;
        if !users.is_empty() {
            info!(count = users.len(), "Retrieved users from primary store");
            return Ok(users);
        }

        info!("No users found in primary store, seeding mock users");
        let users = mock_users(MockSource::Database, self.data.mock_count);
        for user in &users {
            client
                .insert_user(user)
                .await
                .map_err(|source| StoreError::Seed {
                    id: user.id.clone(),
                    source,
                })?;
        }
        info!(count = users.len(), "Seeded primary store with mock users");
        Ok(users)
    }

    /// Disconnects both transports.
    pub async fn close(&self) {
        if let Some(client) = self.primary.live() {
            client.close().await;
        }
        if let Some(client) = self.cache.live() {
            client.close().await;
        }
    }

    async fn simulate_http_fetch(&self) -> Vec<User> {
        info!("Cache unavailable, simulating HTTP fetch of users");
        tokio::time::sleep(self.data.simulated_fetch_delay()).await;
        mock_users(MockSource::Http, self.data.mock_count)
    }

    /// Returns the cached set only if every listed id resolves to a record.
    async fn read_cached_users(&self, client: &dyn CacheClient) -> Option<Vec<User>> {
        let ids = match read_json::<Vec<String>>(client, USER_IDS_KEY).await {
            Ok(Some(ids)) if !ids.is_empty() => ids,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read user id list from cache");
                return None;
            }
        };

        let mut users = Vec::with_capacity(ids.len());
        for id in &ids {
            match read_json::<User>(client, &user_key(id)).await {
                Ok(Some(user)) => users.push(user),
                Ok(None) => warn!(user_id = %id, "User missing from cache"),
                Err(e) => warn!(user_id = %id, error = %e, "Failed to get user from cache"),
            }
        }

        if users.len() == ids.len() {
            Some(users)
        } else {
            warn!(
                listed = ids.len(),
                found = users.len(),
                "Incomplete users retrieved from cache, repopulating"
            );
            None
        }
    }

    /// Best-effort write of every user and then the id list.
    async fn populate_cache(&self, client: &dyn CacheClient, users: &[User]) {
        for user in users {
            let result = match encode(&user.cache_key(), user) {
                Ok(value) => client.set(&user.cache_key(), &value, self.cache_ttl).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(user_id = %user.id, error = %e, "Failed to cache user");
            }
        }

        let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        let result = match encode(USER_IDS_KEY, &ids) {
            Ok(value) => client.set(USER_IDS_KEY, &value, self.cache_ttl).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to cache user id list");
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    client: &dyn CacheClient,
    key: &str,
) -> TransportResult<Option<T>> {
    let Some(raw) = client.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| TransportError::Decode {
            key: key.to_string(),
            message: e.to_string(),
        })
}

fn encode<T: serde::Serialize + ?Sized>(key: &str, value: &T) -> TransportResult<String> {
    serde_json::to_string(value).map_err(|e| TransportError::Decode {
        key: key.to_string(),
        message: e.to_string(),
    })
}
