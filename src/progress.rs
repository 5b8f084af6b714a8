use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::CertStat;

/// Running totals rendered as one progress line per certificate batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressCounters {
    total_hosts: usize,
    width: usize,
    hosts_started: u64,
    certs_seen: u64,
}

impl ProgressCounters {
    pub fn new(total_hosts: usize) -> Self {
        Self {
            total_hosts,
            width: counter_width(total_hosts),
            hosts_started: 0,
            certs_seen: 0,
        }
    }

    pub fn host_started(&mut self, n: u64) {
        self.hosts_started += n;
    }

    /// Account for `stat` and render the resulting progress line.
    pub fn certificates(&mut self, stat: &CertStat) -> String {
        self.certs_seen += stat.new_certs as u64;
        let pct = if self.total_hosts == 0 {
            0.0
        } else {
            100.0 * self.hosts_started as f64 / self.total_hosts as f64
        };
        format!(
            "{pct:7.3}% [{:0width$}/{}] {} \t{} certificates (+{})",
            self.hosts_started,
            self.total_hosts,
            stat.host,
            self.certs_seen,
            stat.new_certs,
            width = self.width,
        )
    }

    pub fn hosts_started(&self) -> u64 {
        self.hosts_started
    }

    pub fn certs_seen(&self) -> u64 {
        self.certs_seen
    }
}

/// Digits reserved for the host counter: `ceil(log10(total))`.
pub fn counter_width(total_hosts: usize) -> usize {
    if total_hosts <= 1 {
        return 0;
    }
    (total_hosts as f64).log10().ceil() as usize
}

/// Print a progress line for every certificate count until `finished` is
/// cancelled, then drain what is already queued.
pub async fn aggregate_progress(
    mut hosts: mpsc::Receiver<u64>,
    mut certs: mpsc::Receiver<CertStat>,
    total_hosts: usize,
    finished: CancellationToken,
) -> ProgressCounters {
    let mut counters = ProgressCounters::new(total_hosts);
    loop {
        tokio::select! {
            biased;
            Some(n) = hosts.recv() => counters.host_started(n),
            Some(stat) = certs.recv() => println!("{}", counters.certificates(&stat)),
            _ = finished.cancelled() => break,
            else => break,
        }
    }
    while let Ok(n) = hosts.try_recv() {
        counters.host_started(n);
    }
    while let Ok(stat) = certs.try_recv() {
        println!("{}", counters.certificates(&stat));
    }
    counters
}
