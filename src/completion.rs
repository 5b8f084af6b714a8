use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Count "worker done" signals and cancel `finished` once all `workers`
/// have drained their shard. This is the only place `finished` is cancelled.
pub async fn detect_completion(mut done: mpsc::Receiver<usize>, workers: usize, finished: CancellationToken) {
    let mut remaining = workers;
    while remaining > 0 {
        match done.recv().await {
            Some(n) => {
                remaining = remaining.saturating_sub(n);
                debug!(remaining, "worker finished");
            }
            None => {
                // A worker died without signalling; nothing else can arrive.
                error!(remaining, "done channel closed before every worker finished");
                break;
            }
        }
    }
    info!("all workers finished");
    finished.cancel();
}
