use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{trace, warn};

/// Resolves once every forwarder of a [`merge`] has finished.
#[derive(Debug)]
pub struct Completion {
    barrier: JoinHandle<usize>,
}

impl Completion {
    /// Wait for all sources to drain. Returns the number of items forwarded,
    /// or the join error if the barrier task was cancelled or panicked.
    pub async fn wait(self) -> Result<usize, JoinError> {
        self.barrier.await
    }

    pub fn is_finished(&self) -> bool {
        self.barrier.is_finished()
    }
}

/// Fan `streams` into one receiver.
///
/// Each source gets its own forwarder task, so items come out in whichever
/// order they become ready; order within one source is kept. The merged
/// receiver closes only after every source has closed and every forwarder
/// has exited. Must be called from within a Tokio runtime.
pub fn merge<T: Send + 'static>(streams: Vec<mpsc::Receiver<T>>) -> (mpsc::Receiver<T>, Completion) {
    let (out, merged) = mpsc::channel(1);
    let mut forwarders = JoinSet::new();

    for (source, mut stream) in streams.into_iter().enumerate() {
        let out = out.clone();
        forwarders.spawn(async move {
            let mut forwarded = 0usize;
            while let Some(item) = stream.recv().await {
                if out.send(item).await.is_err() {
                    break;
                }
                forwarded += 1;
            }
            trace!(source, forwarded, "merge source drained");
            forwarded
        });
    }

    let barrier = tokio::spawn(async move {
        let mut forwarded = 0usize;
        while let Some(result) = forwarders.join_next().await {
            match result {
                Ok(n) => forwarded += n,
                Err(e) => warn!(error = %e, "merge forwarder failed"),
            }
        }
        // Last sender: the merged receiver closes here, not before.
        drop(out);
        forwarded
    });

    (merged, Completion { barrier })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn producer(tag: u32, count: u32) -> mpsc::Receiver<(u32, u32)> {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for i in 0..count {
                tx.send((tag, i)).await.unwrap();
            }
        });
        rx
    }

    #[tokio::test]
    async fn test_merge_yields_every_item() {
        let (mut merged, completion) = merge(vec![producer(0, 10), producer(1, 5), producer(2, 0)]);

        let mut items = Vec::new();
        while let Some(item) = timeout(WAIT, merged.recv()).await.expect("timely") {
            items.push(item);
        }

        assert_eq!(items.len(), 15);
        assert_eq!(items.iter().filter(|(tag, _)| *tag == 0).count(), 10);
        assert_eq!(items.iter().filter(|(tag, _)| *tag == 1).count(), 5);
        assert_eq!(timeout(WAIT, completion.wait()).await.expect("timely").expect("barrier"), 15);
    }

    #[tokio::test]
    async fn test_merge_keeps_per_source_order() {
        let (mut merged, _completion) = merge(vec![producer(0, 50), producer(1, 50)]);

        let mut next = [0u32; 2];
        while let Some((tag, seq)) = timeout(WAIT, merged.recv()).await.expect("timely") {
            assert_eq!(seq, next[tag as usize]);
            next[tag as usize] += 1;
        }
        assert_eq!(next, [50, 50]);
    }

    #[tokio::test]
    async fn test_merge_stays_open_until_last_source_closes() {
        let (tx_a, rx_a) = mpsc::channel::<u8>(4);
        let (tx_b, rx_b) = mpsc::channel::<u8>(4);
        let (mut merged, completion) = merge(vec![rx_a, rx_b]);

        tx_a.send(1).await.unwrap();
        drop(tx_a);
        assert_eq!(timeout(WAIT, merged.recv()).await.expect("timely"), Some(1));

        // One source still open: nothing to read, but not closed either
        assert!(timeout(Duration::from_millis(50), merged.recv()).await.is_err());
        assert!(!completion.is_finished());

        tx_b.send(2).await.unwrap();
        drop(tx_b);
        assert_eq!(timeout(WAIT, merged.recv()).await.expect("timely"), Some(2));
        assert_eq!(timeout(WAIT, merged.recv()).await.expect("timely"), None);
        assert_eq!(completion.wait().await.expect("barrier"), 2);
    }

    #[tokio::test]
    async fn test_merge_of_nothing_closes_immediately() {
        let (mut merged, completion) = merge::<u8>(Vec::new());
        assert_eq!(timeout(WAIT, merged.recv()).await.expect("timely"), None);
        assert_eq!(completion.wait().await.expect("barrier"), 0);
    }

    #[tokio::test]
    async fn test_dropping_merged_stops_forwarders() {
        let (tx, rx) = mpsc::channel::<u8>(1);
        let (merged, completion) = merge(vec![rx]);
        drop(merged);

        // The forwarder exits on its next send and drops the source
        let _ = tx.send(1).await;
        timeout(WAIT, tx.closed()).await.expect("source closed");
        assert_eq!(timeout(WAIT, completion.wait()).await.expect("timely").expect("barrier"), 0);
    }

    #[tokio::test]
    async fn test_failed_barrier_is_not_an_empty_merge() {
        let barrier = tokio::spawn(std::future::pending::<usize>());
        barrier.abort();
        let completion = Completion { barrier };

        let err = timeout(WAIT, completion.wait()).await.expect("timely").unwrap_err();
        assert!(err.is_cancelled());
    }
}
