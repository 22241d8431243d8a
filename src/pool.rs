//! Keyed reuse of authenticated Flight SQL clients.
//!
//! One mutex guards the map; it is never held across an RPC. A caller that
//! finds its entry busy gets a freshly connected unmanaged client instead of
//! waiting, so concurrent scans sharing credentials never queue on each
//! other. Eviction is lazy: stale or unhealthy entries are closed and
//! replaced on the next `get`.

use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::client::FlightSqlClient;
use crate::config::ConnectionConfig;
use crate::logging::log_debug;

const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(600);

pub type PoolKey = [u8; 32];

/// Null-byte delimiters prevent field-boundary collisions between configs
/// such as ("u\0p", "") and ("u", "\0p").
pub fn pool_key(config: &ConnectionConfig) -> PoolKey {
    let mut hasher = Sha256::new();
    hasher.update(config.uri.as_bytes());
    hasher.update([0u8]);
    hasher.update(config.username.as_bytes());
    hasher.update([0u8]);
    hasher.update(config.password.as_bytes());
    hasher.update([0u8]);
    hasher.update([config.skip_verify as u8]);
    hasher.finalize().into()
}

struct PooledEntry {
    client: Arc<Mutex<FlightSqlClient>>,
    last_used: Instant,
    in_use: Arc<AtomicBool>,
}

/// A borrowed-or-owned client. Pooled clients go back to the pool on
/// release; unmanaged ones are closed outright.
pub struct ConnectionResult {
    client: Arc<Mutex<FlightSqlClient>>,
    config: ConnectionConfig,
    pooled: bool,
}

impl ConnectionResult {
    pub fn client(&self) -> &Arc<Mutex<FlightSqlClient>> {
        &self.client
    }

    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn release(self, pool: &ConnectionPool) {
        if self.pooled {
            pool.release(&self.config);
        } else {
            let mut client = self
                .client
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = client.close();
        }
    }
}

enum GetPlan {
    Reuse(Arc<Mutex<FlightSqlClient>>),
    Busy,
    Connect,
}

pub struct ConnectionPool {
    entries: Mutex<HashMap<PoolKey, PooledEntry>>,
    max_idle: Duration,
}

impl ConnectionPool {
    pub fn new() -> Self {
        let max_idle = env::var("DUCKARROW_POOL_MAX_IDLE_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_IDLE);
        ConnectionPool {
            entries: Mutex::new(HashMap::new()),
            max_idle,
        }
    }

    pub fn get(&self, config: &ConnectionConfig) -> Result<ConnectionResult, Box<dyn Error>> {
        let key = pool_key(config);
        let plan = self.plan_for(&key);
        match plan {
            GetPlan::Reuse(client) => Ok(ConnectionResult {
                client,
                config: config.clone(),
                pooled: true,
            }),
            GetPlan::Busy => {
                // The entry is serving another scan; connect outside the
                // pool rather than waiting on it.
                log_debug!("POOL", "entry busy for {}, using unmanaged connection", config.uri);
                let client = Arc::new(Mutex::new(FlightSqlClient::connect(config)?));
                Ok(ConnectionResult {
                    client,
                    config: config.clone(),
                    pooled: false,
                })
            }
            GetPlan::Connect => {
                let client = Arc::new(Mutex::new(FlightSqlClient::connect(config)?));
                let mut entries = self
                    .entries
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if entries.contains_key(&key) {
                    // Another caller installed an entry while we were
                    // connecting; ours stays unmanaged.
                    return Ok(ConnectionResult {
                        client,
                        config: config.clone(),
                        pooled: false,
                    });
                }
                entries.insert(
                    key,
                    PooledEntry {
                        client: Arc::clone(&client),
                        last_used: Instant::now(),
                        in_use: Arc::new(AtomicBool::new(true)),
                    },
                );
                Ok(ConnectionResult {
                    client,
                    config: config.clone(),
                    pooled: true,
                })
            }
        }
    }

    fn plan_for(&self, key: &PoolKey) -> GetPlan {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = match entries.get_mut(key) {
            Some(entry) => entry,
            None => return GetPlan::Connect,
        };
        if entry.in_use.load(Ordering::Acquire) {
            return GetPlan::Busy;
        }
        let healthy = entry
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_healthy();
        let fresh = entry.last_used.elapsed() < self.max_idle;
        if healthy && fresh {
            entry.in_use.store(true, Ordering::Release);
            entry.last_used = Instant::now();
            return GetPlan::Reuse(Arc::clone(&entry.client));
        }
        log_debug!(
            "POOL",
            "evicting entry (healthy={}, idle={:?})",
            healthy,
            entry.last_used.elapsed()
        );
        let stale = entries.remove(key);
        drop(entries);
        if let Some(stale) = stale {
            let mut client = stale
                .client
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = client.close();
        }
        GetPlan::Connect
    }

    /// Unknown keys are a no-op; released entries stay pooled until
    /// staleness evicts them.
    pub fn release(&self, config: &ConnectionConfig) {
        let key = pool_key(config);
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(entry) = entries.get_mut(&key) {
            entry.in_use.store(false, Ordering::Release);
            entry.last_used = Instant::now();
        }
    }

    /// Safe to call repeatedly and concurrently with get/release.
    pub fn close(&self) {
        let drained: Vec<PooledEntry> = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            let mut client = entry
                .client
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = client.close();
        }
    }

    #[cfg(test)]
    pub(crate) fn test_unmanaged(client: FlightSqlClient, config: ConnectionConfig) -> ConnectionResult {
        ConnectionResult {
            client: Arc::new(Mutex::new(client)),
            config,
            pooled: false,
        }
    }

    #[cfg(test)]
    fn with_max_idle(max_idle: Duration) -> Self {
        ConnectionPool {
            entries: Mutex::new(HashMap::new()),
            max_idle,
        }
    }

    #[cfg(test)]
    fn insert_entry(&self, key: PoolKey, client: FlightSqlClient, last_used: Instant, in_use: bool) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(
            key,
            PooledEntry {
                client: Arc::new(Mutex::new(client)),
                last_used,
                in_use: Arc::new(AtomicBool::new(in_use)),
            },
        );
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

pub fn global_pool() -> &'static ConnectionPool {
    static POOL: OnceLock<ConnectionPool> = OnceLock::new();
    POOL.get_or_init(ConnectionPool::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(uri: &str, user: &str, pass: &str, skip: bool) -> ConnectionConfig {
        ConnectionConfig::new(uri, user, pass, skip)
    }

    #[test]
    fn test_key_equal_for_equal_configs() {
        let a = config("grpc://h:1", "u", "p", false);
        let b = config("grpc://h:1", "u", "p", false);
        assert_eq!(pool_key(&a), pool_key(&b));
    }

    #[test]
    fn test_key_differs_per_field() {
        let base = config("grpc://h:1", "u", "p", false);
        for other in [
            config("grpc://h:2", "u", "p", false),
            config("grpc://h:1", "v", "p", false),
            config("grpc://h:1", "u", "q", false),
            config("grpc://h:1", "u", "p", true),
        ] {
            assert_ne!(pool_key(&base), pool_key(&other));
        }
    }

    #[test]
    fn test_key_resists_field_boundary_shifts() {
        let a = config("grpc://h:1", "u\0p", "", false);
        let b = config("grpc://h:1", "u", "\0p", false);
        assert_ne!(pool_key(&a), pool_key(&b));
        let c = config("grpc://h:1u", "", "p", false);
        assert_ne!(pool_key(&a), pool_key(&c));
        assert_ne!(pool_key(&b), pool_key(&c));
    }

    #[test]
    fn test_release_unknown_key_is_noop() {
        let pool = ConnectionPool::new();
        pool.release(&config("grpc://nobody:1", "", "", false));
        assert_eq!(pool.entry_count(), 0);
    }

    #[test]
    fn test_reuse_within_max_idle() {
        let pool = ConnectionPool::new();
        let cfg = config("grpc://h:1", "u", "p", false);
        let key = pool_key(&cfg);
        pool.insert_entry(key, FlightSqlClient::stub(), Instant::now(), false);
        match pool.plan_for(&key) {
            GetPlan::Reuse(_) => {}
            _ => panic!("expected reuse of a fresh healthy entry"),
        }
        assert_eq!(pool.entry_count(), 1);
    }

    #[test]
    fn test_busy_entry_is_not_reassigned() {
        let pool = ConnectionPool::new();
        let cfg = config("grpc://h:1", "u", "p", false);
        let key = pool_key(&cfg);
        pool.insert_entry(key, FlightSqlClient::stub(), Instant::now(), true);
        match pool.plan_for(&key) {
            GetPlan::Busy => {}
            _ => panic!("expected busy entry to force an unmanaged connection"),
        }
        assert_eq!(pool.entry_count(), 1);
    }

    #[test]
    fn test_stale_entry_is_evicted() {
        let pool = ConnectionPool::with_max_idle(Duration::ZERO);
        let cfg = config("grpc://h:1", "u", "p", false);
        let key = pool_key(&cfg);
        pool.insert_entry(key, FlightSqlClient::stub(), Instant::now(), false);
        match pool.plan_for(&key) {
            GetPlan::Connect => {}
            _ => panic!("expected stale entry to be evicted"),
        }
        assert_eq!(pool.entry_count(), 0);
    }

    #[test]
    fn test_unhealthy_entry_is_evicted() {
        let pool = ConnectionPool::new();
        let cfg = config("grpc://h:1", "u", "p", false);
        let key = pool_key(&cfg);
        let mut client = FlightSqlClient::stub();
        client.close().expect("close never fails");
        pool.insert_entry(key, client, Instant::now(), false);
        match pool.plan_for(&key) {
            GetPlan::Connect => {}
            _ => panic!("expected unhealthy entry to be evicted"),
        }
        assert_eq!(pool.entry_count(), 0);
    }

    #[test]
    fn test_release_clears_in_use() {
        let pool = ConnectionPool::new();
        let cfg = config("grpc://h:1", "u", "p", false);
        let key = pool_key(&cfg);
        pool.insert_entry(key, FlightSqlClient::stub(), Instant::now(), true);
        pool.release(&cfg);
        match pool.plan_for(&key) {
            GetPlan::Reuse(_) => {}
            _ => panic!("expected released entry to be reusable"),
        }
    }

    #[test]
    fn test_close_drains_entries() {
        let pool = ConnectionPool::new();
        let cfg = config("grpc://h:1", "u", "p", false);
        pool.insert_entry(pool_key(&cfg), FlightSqlClient::stub(), Instant::now(), false);
        pool.close();
        assert_eq!(pool.entry_count(), 0);
        pool.close();
        assert_eq!(pool.entry_count(), 0);
    }
}
