use std::time::Duration;

/// Default TLS port.
pub const HTTPS_PORT: u16 = 443;

/// Hosts started longer ago than this without finishing are rescanned.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    #[default]
    Any,
    V4Only,
    V6Only,
}

/// What to do with a host's remaining addresses once one fails to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressPolicy {
    /// Record the failure and abandon the host.
    #[default]
    FirstFailureAborts,
    /// Record the failure and move on to the next resolved address.
    TryAllAddresses,
}

/// How hosts are split between workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardPolicy {
    /// Every shard holds `len / workers` hosts; the remainder is not scanned.
    #[default]
    Truncate,
    /// The first `len % workers` shards take one extra host each.
    Spread,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot scan hosts using only IPv4 and only IPv6 at the same time")]
    ConflictingAddressFamilies,
    #[error("cannot load hosts from the database and write them to it in the same run")]
    ConflictingHostSources,
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("host list is empty")]
    NoHosts,
}

/// Immutable settings shared by every pipeline component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub workers: usize,
    pub port: u16,
    pub family: AddressFamily,
    pub address_policy: AddressPolicy,
    pub shard_policy: ShardPolicy,
    /// Bound on TCP connect plus handshake. `None` leaves it to the OS.
    pub connect_timeout: Option<Duration>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: 50,
            port: HTTPS_PORT,
            family: AddressFamily::Any,
            address_policy: AddressPolicy::default(),
            shard_policy: ShardPolicy::default(),
            connect_timeout: None,
        }
    }
}

impl ScanConfig {
    /// Build the family filter from the two command-line switches.
    pub fn family_from_flags(ipv4_only: bool, ipv6_only: bool) -> Result<AddressFamily, ConfigError> {
        match (ipv4_only, ipv6_only) {
            (true, true) => Err(ConfigError::ConflictingAddressFamilies),
            (true, false) => Ok(AddressFamily::V4Only),
            (false, true) => Ok(AddressFamily::V6Only),
            (false, false) => Ok(AddressFamily::Any),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}
