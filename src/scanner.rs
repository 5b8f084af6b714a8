use std::net::{IpAddr, SocketAddr};
use std::ops::Range;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collector::{self, ProbeSink};
use crate::completion;
use crate::config::{AddressFamily, AddressPolicy, ConfigError, ScanConfig, ShardPolicy};
use crate::extract::{self, CertMeta};
use crate::net::{display_ip, protocol_name, Resolver, TlsDialer};
use crate::progress;
use crate::types::{
    CertStat, Probe, ProbeFailure, ProbeOutcome, ProbedCertificate, ScanEvent, ScanSummary,
};

/// Sending halves a worker reports through. `run_scan` gives every channel
/// capacity 1, so a slow consumer stalls the workers instead of buffering.
#[derive(Clone)]
pub struct WorkerChannels {
    pub events: mpsc::Sender<ScanEvent>,
    pub host_counts: mpsc::Sender<u64>,
    pub cert_counts: mpsc::Sender<CertStat>,
    pub done: mpsc::Sender<usize>,
}

/// Probes hosts one after the other. Cheap to clone; clones share the
/// resolver and the TLS dialer.
#[derive(Clone)]
pub struct ProbeWorker {
    config: Arc<ScanConfig>,
    resolver: Arc<dyn Resolver>,
    dialer: Arc<dyn TlsDialer>,
}

impl ProbeWorker {
    pub fn new(config: Arc<ScanConfig>, resolver: Arc<dyn Resolver>, dialer: Arc<dyn TlsDialer>) -> Self {
        Self { config, resolver, dialer }
    }

    /// Probe one host and emit its results in order: one failure probe, or
    /// one probe per presented certificate across the addresses tried.
    ///
    /// Returns `false` when a receiver has gone away and the worker should stop.
    pub async fn probe_host(&self, host: &str, chans: &WorkerChannels) -> bool {
        debug!(host, "probing server");
        let timestamp = OffsetDateTime::now_utc();

        let ips = match self.resolver.lookup(host).await {
            Ok(ips) => ips,
            Err(reason) => {
                let failure = ProbeFailure::Resolution { host: host.to_string(), reason };
                return fail_probe(host, String::new(), timestamp, failure, chans).await;
            }
        };

        for ip in ips {
            if !self.family_allows(ip) {
                debug!(host, %ip, "skipping address outside the selected family");
                continue;
            }
            let shown = display_ip(ip);
            debug!(host, ip = %shown, "trying address");

            let addr = SocketAddr::new(ip, self.config.port);
            let session = match self.dialer.dial(host, addr).await {
                Ok(session) => session,
                Err(reason) => {
                    let failure = ProbeFailure::Connection { addr: format!("{shown}:{}", self.config.port), reason };
                    if !fail_probe(host, shown, timestamp, failure, chans).await {
                        return false;
                    }
                    match self.config.address_policy {
                        AddressPolicy::FirstFailureAborts => return true,
                        AddressPolicy::TryAllAddresses => continue,
                    }
                }
            };

            debug!(
                host,
                protocol = protocol_name(session.protocol),
                cipher_suite = session.cipher_suite,
                certificates = session.chain.len(),
                "server presented certificates"
            );
            let stat = CertStat { host: host.to_string(), new_certs: session.chain.len() };
            if chans.cert_counts.send(stat).await.is_err() {
                return false;
            }

            for (index, der) in session.chain.into_iter().enumerate() {
                let record = extract::extract(&der, CertMeta { host, ip: &shown, index });
                if let Some(record) = &record {
                    debug!(host, index, subject = %extract::describe_subject(record), "certificate");
                }
                let probe = Probe {
                    host: host.to_string(),
                    ip: shown.clone(),
                    timestamp,
                    outcome: ProbeOutcome::Certificate(ProbedCertificate {
                        protocol: session.protocol,
                        cipher_suite: session.cipher_suite,
                        index,
                        der,
                        record,
                    }),
                };
                if chans.events.send(ScanEvent::Probe(probe)).await.is_err() {
                    return false;
                }
            }
        }
        true
    }

    /// Scan a whole shard, then report the worker as done.
    pub async fn run_shard(self, worker_id: usize, hosts: Vec<String>, chans: WorkerChannels) {
        debug!(worker_id, hosts = hosts.len(), "starting worker");
        for host in &hosts {
            if chans.events.send(ScanEvent::HostStarted(host.clone())).await.is_err()
                || chans.host_counts.send(1).await.is_err()
            {
                break;
            }
            if !self.probe_host(host, &chans).await {
                break;
            }
            if chans.events.send(ScanEvent::HostFinished(host.clone())).await.is_err() {
                break;
            }
        }
        debug!(worker_id, "worker drained its shard");
        if chans.done.send(1).await.is_err() {
            warn!(worker_id, "completion detector is gone");
        }
    }

    fn family_allows(&self, ip: IpAddr) -> bool {
        match (self.config.family, ip) {
            (AddressFamily::Any, _) => true,
            (AddressFamily::V4Only, IpAddr::V4(_)) => true,
            (AddressFamily::V6Only, IpAddr::V6(_)) => true,
            _ => false,
        }
    }
}

async fn fail_probe(
    host: &str,
    ip: String,
    timestamp: OffsetDateTime,
    failure: ProbeFailure,
    chans: &WorkerChannels,
) -> bool {
    warn!(host, error = %failure, "probe failed");
    let probe = Probe {
        host: host.to_string(),
        ip,
        timestamp,
        outcome: ProbeOutcome::Failed(failure),
    };
    chans.events.send(ScanEvent::Probe(probe)).await.is_ok()
}

/// Contiguous, non-overlapping shard ranges over `len` hosts.
pub fn shard_bounds(len: usize, workers: usize, policy: ShardPolicy) -> Result<Vec<Range<usize>>, ConfigError> {
    if workers == 0 {
        return Err(ConfigError::NoWorkers);
    }
    if len == 0 {
        return Err(ConfigError::NoHosts);
    }
    let base = len / workers;
    let extra = match policy {
        ShardPolicy::Truncate => 0,
        ShardPolicy::Spread => len % workers,
    };
    let mut start = 0;
    let bounds = (0..workers)
        .map(|id| {
            let size = base + usize::from(id < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect();
    Ok(bounds)
}

/// Spawn one worker per shard onto `set`. Returns how many hosts were handed out.
pub fn dispatch(
    hosts: &[String],
    worker: &ProbeWorker,
    chans: &WorkerChannels,
    set: &mut JoinSet<()>,
) -> Result<usize, ConfigError> {
    let bounds = shard_bounds(hosts.len(), worker.config.workers, worker.config.shard_policy)?;
    let mut dispatched = 0;
    for (worker_id, range) in bounds.into_iter().enumerate() {
        dispatched += range.len();
        let shard = hosts[range].to_vec();
        set.spawn(worker.clone().run_shard(worker_id + 1, shard, chans.clone()));
    }
    Ok(dispatched)
}

/// Run a full scan: dispatch workers, collect every probe into `sink`, report
/// progress, and return once every worker has drained its shard.
pub async fn run_scan<S: ProbeSink>(
    hosts: Vec<String>,
    config: ScanConfig,
    resolver: Arc<dyn Resolver>,
    dialer: Arc<dyn TlsDialer>,
    sink: &mut S,
) -> Result<ScanSummary, ConfigError> {
    config.validate()?;
    if hosts.is_empty() {
        return Err(ConfigError::NoHosts);
    }
    let workers = config.workers;
    let total = hosts.len();

    let (events_tx, events_rx) = mpsc::channel(1);
    let (hosts_tx, hosts_rx) = mpsc::channel(1);
    let (certs_tx, certs_rx) = mpsc::channel(1);
    let (done_tx, done_rx) = mpsc::channel(1);
    let chans = WorkerChannels {
        events: events_tx,
        host_counts: hosts_tx,
        cert_counts: certs_tx,
        done: done_tx,
    };
    let finished = CancellationToken::new();

    let worker = ProbeWorker::new(Arc::new(config), resolver, dialer);
    let mut set = JoinSet::new();
    let dispatched = dispatch(&hosts, &worker, &chans, &mut set)?;
    drop(chans);
    if dispatched < total {
        warn!(dropped = total - dispatched, "host count is not a multiple of the worker count, remainder is not scanned");
    }
    info!(hosts = total, workers, "scan started");

    let detector = tokio::spawn(completion::detect_completion(done_rx, workers, finished.clone()));
    let aggregator = tokio::spawn(progress::aggregate_progress(hosts_rx, certs_rx, total, finished.clone()));

    let stats = collector::collect(events_rx, sink, &finished).await;

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "worker task failed");
        }
    }
    if let Err(e) = detector.await {
        error!(error = %e, "completion detector failed");
    }
    if let Err(e) = aggregator.await {
        error!(error = %e, "progress aggregator failed");
    }

    let summary = ScanSummary {
        hosts_total: total,
        hosts_dispatched: dispatched,
        hosts_dropped: total - dispatched,
        probes_saved: stats.saved,
        probes_failed_to_save: stats.failed,
    };
    info!(?summary, "scan finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(bounds: &[Range<usize>]) -> Vec<usize> {
        bounds.iter().map(|r| r.len()).collect()
    }

    #[test]
    fn truncate_drops_remainder() {
        let b = shard_bounds(10, 3, ShardPolicy::Truncate).unwrap();
        assert_eq!(sizes(&b), vec![3, 3, 3]);
        assert_eq!(b[2], 6..9);
    }

    #[test]
    fn spread_covers_every_host() {
        let b = shard_bounds(10, 3, ShardPolicy::Spread).unwrap();
        assert_eq!(sizes(&b), vec![4, 3, 3]);
        assert_eq!(b.last().unwrap().end, 10);
    }

    #[test]
    fn more_workers_than_hosts() {
        let b = shard_bounds(2, 5, ShardPolicy::Truncate).unwrap();
        assert!(b.iter().all(|r| r.is_empty()));
        let b = shard_bounds(2, 5, ShardPolicy::Spread).unwrap();
        assert_eq!(sizes(&b), vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn invalid_inputs_rejected() {
        assert_eq!(shard_bounds(10, 0, ShardPolicy::Truncate), Err(ConfigError::NoWorkers));
        assert_eq!(shard_bounds(0, 3, ShardPolicy::Truncate), Err(ConfigError::NoHosts));
    }
}
