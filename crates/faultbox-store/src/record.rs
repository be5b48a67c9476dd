//! Record shapes and mock-data synthesis.

use serde::{Deserialize, Serialize};

/// Fixed cache key holding the JSON array of cached user ids.
pub const USER_IDS_KEY: &str = "all_user_ids";

/// A user record as served by the data surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }

    /// Cache key of the individual entry for this user.
    pub fn cache_key(&self) -> String {
        user_key(&self.id)
    }
}

/// Cache key for the user with the given id.
pub fn user_key(id: &str) -> String {
    format!("user:{id}")
}

/// Where a synthesized batch stands in for real data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSource {
    /// No cache available; stands in for an external HTTP fetch.
    Http,
    /// Written back to the cache after a miss.
    Cache,
    /// Served or seeded in place of primary-store rows.
    Database,
}

impl MockSource {
    fn id_prefix(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Cache => "cache",
            Self::Database => "db",
        }
    }

    fn name_label(self) -> &'static str {
        match self {
            Self::Http => "Mock User HTTP",
            Self::Cache => "Mock User",
            Self::Database => "Mock User DB",
        }
    }

    fn email_label(self) -> &'static str {
        match self {
            Self::Http => "mock_http",
            Self::Cache => "mock",
            Self::Database => "mock_db",
        }
    }
}

/// Synthesizes `count` deterministic users, numbered from 1.
pub fn mock_users(source: MockSource, count: usize) -> Vec<User> {
    (1..=count)
        .map(|n| {
            User::new(
                format!("{}-{n:04}", source.id_prefix()),
                format!("{} {n}", source.name_label()),
                format!("{}{n}@example.com", source.email_label()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use test_case::test_case;

    #[test_case(MockSource::Http, "http-0001", "Mock User HTTP 1", "mock_http1@example.com")]
    #[test_case(MockSource::Cache, "cache-0001", "Mock User 1", "mock1@example.com")]
    #[test_case(MockSource::Database, "db-0001", "Mock User DB 1", "mock_db1@example.com")]
    fn test_mock_users_are_labelled_by_source(source: MockSource, id: &str, name: &str, email: &str) {
        let users = mock_users(source, 10);
        assert_eq!(users.len(), 10);
        assert_eq!(users[0], User::new(id, name, email));
    }

    #[test]
    fn test_mock_users_are_deterministic_and_unique() {
        let first = mock_users(MockSource::Cache, 10);
        let second = mock_users(MockSource::Cache, 10);
        assert_eq!(first, second);

        let ids: HashSet<_> = first.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn test_user_json_shape() {
        let user = User::new("cache-0003", "Mock User 3", "mock3@example.com");
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "cache-0003", "name": "Mock User 3", "email": "mock3@example.com"})
        );
        assert_eq!(user.cache_key(), "user:cache-0003");
    }
}
