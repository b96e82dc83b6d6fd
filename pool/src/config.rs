//! Pool sizing and health-check parameters, layered on top of a connection
//! config the same way `connection::config::ConnectConfig` layers on top of
//! plain connect parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub initial_size: u32,
    pub max_size: u32,
    #[serde(with = "millis", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "millis", default = "default_retry_interval")]
    pub retry_interval: Duration,
    /// `0` disables periodic health-check pings on idle connections.
    #[serde(with = "millis", default)]
    pub ping_interval: Duration,
    #[serde(with = "millis", default = "default_ping_timeout")]
    pub ping_timeout: Duration,
    /// When set, all pool-state mutations serialize on a single strand
    /// rather than relying on the shared state's own locking.
    pub thread_safety: bool,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_ping_timeout() -> Duration {
    Duration::from_secs(2)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            initial_size: 1,
            max_size: 10,
            connect_timeout: default_connect_timeout(),
            retry_interval: default_retry_interval(),
            ping_interval: Duration::ZERO,
            ping_timeout: default_ping_timeout(),
            thread_safety: true,
        }
    }
}

impl PoolConfig {
    /// A lazily-filled pool: nodes connect on demand, up to `max_size`.
    pub fn new(max_size: u32) -> Self {
        PoolConfig { max_size, initial_size: 0, ..PoolConfig::default() }
    }

    pub fn with_initial_size(mut self, initial_size: u32) -> Self {
        self.initial_size = initial_size.min(self.max_size);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_disables_ping_and_allows_ten_connections() {
        let cfg = PoolConfig::default();
        assert_eq!(cfg.ping_interval, Duration::ZERO);
        assert_eq!(cfg.max_size, 10);
    }

    #[test]
    fn with_initial_size_clamps_to_max() {
        let cfg = PoolConfig::new(3).with_initial_size(10);
        assert_eq!(cfg.initial_size, 3);
    }
}
