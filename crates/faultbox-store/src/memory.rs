//! In-process transports.
//!
//! `MemoryCache` understands the same `FAULT.START <ms>` / `FAULT.STOP`
//! control commands as the latency proxy and delays every read and write
//! while a delay is set. Both transports count their calls and can be told
//! to fail, which the tests rely on.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{CacheClient, PrimaryClient};
use crate::error::{TransportError, TransportResult};
use crate::record::User;

const CACHE_BACKEND: &str = "memory-cache";
const PRIMARY_BACKEND: &str = "memory-primary";

/// In-process key-value cache.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
    control_log: Mutex<Vec<Vec<String>>>,
    injected_delay_ms: AtomicU64,
    connected: AtomicBool,
    fail_writes: AtomicBool,
    fail_control: AtomicBool,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            control_log: Mutex::new(Vec::new()),
            injected_delay_ms: AtomicU64::new(0),
            connected: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            fail_control: AtomicBool::new(false),
            get_calls: AtomicUsize::new(0),
            set_calls: AtomicUsize::new(0),
        }
    }

    /// Raw value stored under `key`, bypassing delay and counters.
    pub fn entry(&self, key: &str) -> Option<String> {
        self.lock_entries().get(key).cloned()
    }

    /// Stores a raw value, bypassing delay and counters.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock_entries().insert(key.into(), value.into());
    }

    /// Removes a key, bypassing delay and counters.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.lock_entries().remove(key)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every control command received, in order.
    pub fn control_commands(&self) -> Vec<Vec<String>> {
        self.control_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::Relaxed)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::Relaxed)
    }

    /// Delay currently applied to reads and writes.
    pub fn injected_delay(&self) -> Duration {
        Duration::from_millis(self.injected_delay_ms.load(Ordering::Acquire))
    }

    /// Makes every subsequent `set` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Makes every subsequent control command fail.
    pub fn fail_control(&self, fail: bool) {
        self.fail_control.store(fail, Ordering::Release);
    }

    /// Drops the connection without clearing stored entries.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::Disconnected {
                backend: CACHE_BACKEND,
            })
        }
    }

    async fn apply_injected_delay(&self) {
        let delay = self.injected_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn get(&self, key: &str) -> TransportResult<Option<String>> {
        self.ensure_connected()?;
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        self.apply_injected_delay().await;
        Ok(self.entry(key))
    }

    async fn set(&self, key: &str, value: &str, _ttl: Option<Duration>) -> TransportResult<()> {
        self.ensure_connected()?;
        self.set_calls.fetch_add(1, Ordering::Relaxed);
        self.apply_injected_delay().await;
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(TransportError::Command {
                backend: CACHE_BACKEND,
                message: "OOM command not allowed when used memory > 'maxmemory'".to_string(),
            });
        }
        self.insert_raw(key, value);
        Ok(())
    }

    async fn send_control(&self, args: &[String]) -> TransportResult<String> {
        self.ensure_connected()?;
        self.control_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(args.to_vec());

        if self.fail_control.load(Ordering::Acquire) {
            return Err(TransportError::Command {
                backend: CACHE_BACKEND,
                message: "control channel unavailable".to_string(),
            });
        }

        let command_error = |message: String| TransportError::Command {
            backend: CACHE_BACKEND,
            message,
        };

        match args {
            [name, delay] if name.eq_ignore_ascii_case("FAULT.START") => {
                let delay_ms = delay
                    .parse::<u64>()
                    .map_err(|_| command_error("ERR invalid delay argument".to_string()))?;
                self.injected_delay_ms.store(delay_ms, Ordering::Release);
                Ok("OK".to_string())
            }
            [name] if name.eq_ignore_ascii_case("FAULT.STOP") => {
                self.injected_delay_ms.store(0, Ordering::Release);
                Ok("OK".to_string())
            }
            _ => Err(command_error(format!(
                "ERR unknown command '{}'",
                args.join(" ")
            ))),
        }
    }

    async fn close(&self) {
        self.disconnect();
    }
}

/// In-process stand-in for the `users` table.
#[derive(Debug)]
pub struct MemoryPrimary {
    rows: Mutex<Vec<User>>,
    connected: AtomicBool,
    fail_inserts: AtomicBool,
    query_calls: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl MemoryPrimary {
    pub fn new() -> Self {
        Self::with_rows(Vec::new())
    }

    /// Starts with the given rows already present.
    pub fn with_rows(rows: Vec<User>) -> Self {
        Self {
            rows: Mutex::new(rows),
            connected: AtomicBool::new(true),
            fail_inserts: AtomicBool::new(false),
            query_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
        }
    }

    /// Snapshot of the stored rows.
    pub fn rows(&self) -> Vec<User> {
        self.lock_rows().clone()
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::Relaxed)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::Relaxed)
    }

    /// Makes every subsequent insert fail.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::Release);
    }

    fn lock_rows(&self) -> std::sync::MutexGuard<'_, Vec<User>> {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::Disconnected {
                backend: PRIMARY_BACKEND,
            })
        }
    }
}

impl Default for MemoryPrimary {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrimaryClient for MemoryPrimary {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn fetch_users(&self) -> TransportResult<Vec<User>> {
        self.ensure_connected()?;
        self.query_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.rows())
    }

    async fn insert_user(&self, user: &User) -> TransportResult<()> {
        self.ensure_connected()?;
        self.insert_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_inserts.load(Ordering::Acquire) {
            return Err(TransportError::Command {
                backend: PRIMARY_BACKEND,
                message: "Duplicate entry for key 'users.email'".to_string(),
            });
        }

        let mut rows = self.lock_rows();
        if rows.iter().any(|row| row.id == user.id) {
            return Err(TransportError::Command {
                backend: PRIMARY_BACKEND,
                message: format!("Duplicate entry '{}' for key 'PRIMARY'", user.id),
            });
        }
        rows.push(user.clone());
        Ok(())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::Release);
    }
}
