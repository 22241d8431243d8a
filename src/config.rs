use std::env;
use std::sync::{Arc, OnceLock, RwLock};

pub const ENV_USERNAME: &str = "DUCKARROW_USERNAME";
pub const ENV_PASSWORD: &str = "DUCKARROW_PASSWORD";

/// Immutable per-connection settings; also the pool key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub token: String,
    pub skip_verify: bool,
}

impl ConnectionConfig {
    pub fn new(uri: &str, username: &str, password: &str, skip_verify: bool) -> Self {
        ConnectionConfig {
            uri: uri.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: String::new(),
            skip_verify,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }
}

fn global_config() -> &'static RwLock<Option<Arc<ConnectionConfig>>> {
    static CONFIG: OnceLock<RwLock<Option<Arc<ConnectionConfig>>>> = OnceLock::new();
    CONFIG.get_or_init(|| RwLock::new(None))
}

/// Replaces the process-wide snapshot. In-flight scans keep whatever
/// snapshot they read at bind time.
pub fn set_global_config(config: ConnectionConfig) {
    let mut guard = global_config()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = Some(Arc::new(config));
}

pub fn get_global_config() -> Option<Arc<ConnectionConfig>> {
    let guard = global_config()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

#[cfg(test)]
pub fn clear_global_config() {
    let mut guard = global_config()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = None;
}

/// Precedence: explicit parameter > environment variable > empty.
/// Only empty parameters consult the environment.
pub fn resolve_credentials(username: &str, password: &str) -> (String, String) {
    let username = if username.is_empty() {
        env::var(ENV_USERNAME).unwrap_or_default()
    } else {
        username.to_string()
    };
    let password = if password.is_empty() {
        env::var(ENV_PASSWORD).unwrap_or_default()
    } else {
        password.to_string()
    };
    (username, password)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test owns the process-global snapshot; splitting it would race
    // under the parallel test runner.
    #[test]
    fn test_config_round_trip_and_snapshot_isolation() {
        let config = ConnectionConfig::new("grpc://h:1", "u", "p", true);
        set_global_config(config.clone());
        let snapshot = get_global_config().expect("config was just set");
        assert_eq!(*snapshot, config);

        set_global_config(ConnectionConfig::new("grpc://new:1", "", "", false));
        // The old snapshot is unchanged; readers keep what they read.
        assert_eq!(snapshot.uri, "grpc://h:1");
        let new = get_global_config().expect("config was just set");
        assert_eq!(new.uri, "grpc://new:1");
        clear_global_config();
        assert!(get_global_config().is_none());
    }

    #[test]
    fn test_explicit_credentials_win() {
        let (user, pass) = resolve_credentials("alice", "secret");
        assert_eq!(user, "alice");
        assert_eq!(pass, "secret");
    }

    #[test]
    fn test_token_builder() {
        let config = ConnectionConfig::new("grpc://h:1", "", "", false).with_token("tok");
        assert_eq!(config.token, "tok");
    }
}
