use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use cert_archiver::config::{AddressPolicy, ConfigError, ScanConfig, ShardPolicy, HTTPS_PORT};
use cert_archiver::net::{OpensslDialer, SystemResolver};
use cert_archiver::store::CertStore;
use cert_archiver::{hosts, logging, scanner};

/// cert-archiver: retrieve the TLS certificate chains of many hosts and store them in a database.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cert-archiver",
    version,
    about = "Retrieve the TLS certificate chains of the given hosts and store the results inside a database.",
    long_about = None
)]
struct Cli {
    /// File containing the list of hosts to scan, one per line.
    #[arg(short = 'f', long = "hosts", default_value = "top-hosts.txt")]
    hosts_file: PathBuf,

    /// Number of workers.
    #[arg(long, default_value_t = 50)]
    concurrency: usize,

    /// Verbose logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Only scan IPv4 addresses.
    #[arg(short = '4', long = "ipv4-only", default_value_t = false)]
    ipv4_only: bool,

    /// Only scan IPv6 addresses.
    #[arg(short = '6', long = "ipv6-only", default_value_t = false)]
    ipv6_only: bool,

    /// Write the hosts list to the database and exit.
    #[arg(long = "hosts-to-db", default_value_t = false)]
    hosts_to_db: bool,

    /// Load the hosts to scan from the database instead of the hosts file.
    #[arg(long = "hosts-from-db", default_value_t = false)]
    hosts_from_db: bool,

    /// SQLite database the certificates are archived in.
    #[arg(long, env = "CERT_ARCHIVER_DATABASE", default_value = "certificates.sqlite3")]
    database: PathBuf,

    /// TLS port to connect to.
    #[arg(long, default_value_t = HTTPS_PORT)]
    port: u16,

    /// Connect plus handshake timeout in milliseconds (0 leaves it to the OS).
    #[arg(long = "timeout-ms", default_value_t = 0)]
    timeout_ms: u64,

    /// Seconds after which a started but unfinished host is scanned again.
    #[arg(long = "staleness-secs", default_value_t = cert_archiver::config::DEFAULT_STALENESS.as_secs())]
    staleness_secs: u64,

    /// Keep trying a host's other addresses after one fails to connect.
    #[arg(long = "try-all-addresses", default_value_t = false)]
    try_all_addresses: bool,

    /// Hand the hosts left over by the worker split to the first workers.
    #[arg(long = "spread-remainder", default_value_t = false)]
    spread_remainder: bool,
}

impl Cli {
    fn scan_config(&self) -> Result<ScanConfig, ConfigError> {
        if self.hosts_from_db && self.hosts_to_db {
            return Err(ConfigError::ConflictingHostSources);
        }
        let config = ScanConfig {
            workers: self.concurrency,
            port: self.port,
            family: ScanConfig::family_from_flags(self.ipv4_only, self.ipv6_only)?,
            address_policy: if self.try_all_addresses {
                AddressPolicy::TryAllAddresses
            } else {
                AddressPolicy::FirstFailureAborts
            },
            shard_policy: if self.spread_remainder {
                ShardPolicy::Spread
            } else {
                ShardPolicy::Truncate
            },
            connect_timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::initialize_logging(cli.verbose);

    let config = match cli.scan_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut store = CertStore::open(&cli.database)
        .with_context(|| format!("failed to open database {}", cli.database.display()))?;

    let host_list = if cli.hosts_from_db {
        let pending = store.load_pending_hosts(Duration::from_secs(cli.staleness_secs))?;
        println!("Loaded {} hosts from {}", pending.len(), cli.database.display());
        pending
    } else {
        let list = hosts::load_hosts_from_path(&cli.hosts_file)?;
        println!("Loaded {} hosts from {}", list.len(), cli.hosts_file.display());
        list
    };

    if cli.hosts_to_db {
        let inserted = store.insert_hosts(&host_list)?;
        println!("Wrote {inserted} new hosts to {}", cli.database.display());
        return Ok(ExitCode::SUCCESS);
    }

    if host_list.is_empty() {
        info!("nothing to scan");
        return Ok(ExitCode::SUCCESS);
    }

    let dialer = OpensslDialer::new(config.connect_timeout).context("failed to build the TLS client")?;
    let summary = match scanner::run_scan(
        host_list,
        config,
        Arc::new(SystemResolver::new()),
        Arc::new(dialer),
        &mut store,
    )
    .await
    {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "scan refused to start");
            eprintln!("configuration error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    println!(
        "\nScanned {} of {} hosts ({} left over by the worker split), {} probes saved, {} failed to save",
        summary.hosts_dispatched,
        summary.hosts_total,
        summary.hosts_dropped,
        summary.probes_saved,
        summary.probes_failed_to_save,
    );
    Ok(ExitCode::SUCCESS)
}
