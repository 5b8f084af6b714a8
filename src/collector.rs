use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace, warn};

use crate::store::StoreError;
use crate::types::{Probe, ScanEvent};

/// Where probe results end up. Only the collector ever calls into a sink, so
/// implementations need no internal locking.
pub trait ProbeSink: Send {
    /// Persist one probe, returning the number of affected rows.
    fn save(&mut self, probe: &Probe) -> Result<u64, StoreError>;

    fn host_started(&mut self, _host: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn host_finished(&mut self, _host: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory sink, mostly useful in tests and dry runs.
impl ProbeSink for Vec<Probe> {
    fn save(&mut self, probe: &Probe) -> Result<u64, StoreError> {
        self.push(probe.clone());
        Ok(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub saved: u64,
    pub failed: u64,
}

/// Hand every event to `sink` until `finished` is cancelled, then drain what
/// is already queued. Sink errors are logged and never stop the loop.
pub async fn collect<S: ProbeSink + ?Sized>(
    mut events: mpsc::Receiver<ScanEvent>,
    sink: &mut S,
    finished: &CancellationToken,
) -> CollectStats {
    let mut stats = CollectStats::default();
    loop {
        tokio::select! {
            biased;
            ev = events.recv() => match ev {
                Some(ev) => handle(ev, sink, &mut stats),
                None => break,
            },
            _ = finished.cancelled() => break,
        }
    }
    while let Ok(ev) = events.try_recv() {
        handle(ev, sink, &mut stats);
    }
    stats
}

fn handle<S: ProbeSink + ?Sized>(ev: ScanEvent, sink: &mut S, stats: &mut CollectStats) {
    match ev {
        ScanEvent::Probe(probe) => match sink.save(&probe) {
            Ok(rows) => {
                trace!(host = %probe.host, rows, "probe saved");
                stats.saved += 1;
            }
            Err(e) => {
                error!(host = %probe.host, ip = %probe.ip, error = %e, "failed to save probe");
                stats.failed += 1;
            }
        },
        ScanEvent::HostStarted(host) => {
            if let Err(e) = sink.host_started(&host) {
                warn!(host = %host, error = %e, "failed to mark host as started");
            }
        }
        ScanEvent::HostFinished(host) => {
            if let Err(e) = sink.host_finished(&host) {
                warn!(host = %host, error = %e, "failed to mark host as finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProbeFailure, ProbeOutcome};
    use time::OffsetDateTime;

    fn failed(host: &str) -> ScanEvent {
        ScanEvent::Probe(Probe {
            host: host.to_string(),
            ip: String::new(),
            timestamp: OffsetDateTime::now_utc(),
            outcome: ProbeOutcome::Failed(ProbeFailure::Resolution {
                host: host.to_string(),
                reason: "no such host".into(),
            }),
        })
    }

    /// Rejects every other write.
    struct Flaky {
        calls: u64,
        kept: Vec<String>,
    }

    impl ProbeSink for Flaky {
        fn save(&mut self, probe: &Probe) -> Result<u64, StoreError> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(StoreError::Other("disk full".into()));
            }
            self.kept.push(probe.host.clone());
            Ok(1)
        }
    }

    #[tokio::test]
    async fn sink_errors_do_not_stop_collection() {
        let (tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        for h in ["a", "b", "c", "d"] {
            tx.send(failed(h)).await.unwrap();
        }
        drop(tx);
        let mut sink = Flaky { calls: 0, kept: Vec::new() };
        let stats = collect(rx, &mut sink, &token).await;
        assert_eq!(stats, CollectStats { saved: 2, failed: 2 });
        assert_eq!(sink.kept, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn stops_on_termination_even_with_live_senders() {
        let (tx, rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        tx.send(failed("queued")).await.unwrap();
        token.cancel();

        let mut sink: Vec<Probe> = Vec::new();
        let stats = collect(rx, &mut sink, &token).await;
        assert_eq!(stats.saved, 1);
        assert_eq!(sink.len(), 1);
        // The receiver is gone; nothing sent afterwards is processed.
        assert!(tx.send(failed("late")).await.is_err());
        assert_eq!(sink.len(), 1);
    }
}
