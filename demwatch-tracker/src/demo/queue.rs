//! Bounded job queue + fixed-size worker pool
//!
//! Both demo pipelines (acquisition, parse) run on this abstraction: a
//! bounded mpsc channel feeding a fixed number of workers. Producers
//! block on a full queue ("excess jobs wait"), never spawn unbounded
//! tasks, and a per-job panic or error stays inside its worker iteration.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queue is shut down; the job was not accepted
#[derive(Debug, thiserror::Error)]
#[error("Job queue '{0}' is closed")]
pub struct QueueClosed(pub &'static str);

/// Producer handle for a job queue
pub struct JobQueue<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    depth: Arc<AtomicUsize>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            depth: Arc::clone(&self.depth),
        }
    }
}

/// Consumer side handed to `spawn_workers`
pub struct JobReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    depth: Arc<AtomicUsize>,
}

impl<T> Clone for JobReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
            depth: Arc::clone(&self.depth),
        }
    }
}

impl<T> JobReceiver<T> {
    /// Jobs waiting in the queue
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

impl<T: Send + 'static> JobQueue<T> {
    /// Create a bounded queue with its receiver half
    pub fn new(name: &'static str, capacity: usize) -> (Self, JobReceiver<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        let depth = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                tx,
                depth: Arc::clone(&depth),
            },
            JobReceiver {
                rx: Arc::new(Mutex::new(rx)),
                depth,
            },
        )
    }

    /// Enqueue a job, waiting while the queue is full
    pub async fn submit(&self, job: T) -> Result<(), QueueClosed> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(job).await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Err(QueueClosed(self.name))
            }
        }
    }

    /// Jobs enqueued but not yet picked up by a worker
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Spawn the fixed worker pool consuming a queue
///
/// Workers pull jobs one at a time; a pull blocks until a job exists or
/// the pool is cancelled. The handler owns all per-job error handling.
pub fn spawn_workers<T, H, Fut>(
    name: &'static str,
    workers: usize,
    receiver: JobReceiver<T>,
    handler: H,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    T: Send + 'static,
    H: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    if workers == 0 {
        // Dropping the receiver would close the channel and turn every
        // submit into QueueClosed. Park it instead: jobs queue up until
        // the pool is cancelled.
        warn!(pool = name, "Worker pool has zero workers; jobs will queue unprocessed");
        return vec![tokio::spawn(async move {
            cancel.cancelled().await;
            drop(receiver);
        })];
    }

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let receiver = receiver.clone();
        let handler = handler.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            debug!(pool = name, worker = worker_id, "Worker started");
            loop {
                let job = tokio::select! {
                    _ = cancel.cancelled() => None,
                    job = async {
                        let mut rx = receiver.rx.lock().await;
                        rx.recv().await
                    } => job,
                };

                match job {
                    Some(job) => {
                        receiver.depth.fetch_sub(1, Ordering::SeqCst);
                        handler(job).await;
                    }
                    None => break,
                }
            }
            debug!(pool = name, worker = worker_id, "Worker stopped");
        }));
    }

    info!("Worker pool '{}' started with {} workers", name, workers);
    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_are_processed_by_bounded_pool() {
        let (queue, receiver) = JobQueue::<u32>::new("test", 16);
        let processed = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let counter = Arc::clone(&processed);
        let handles = spawn_workers(
            "test",
            3,
            receiver,
            move |_job| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            cancel.clone(),
        );
        assert_eq!(handles.len(), 3);

        for i in 0..10 {
            queue.submit(i).await.unwrap();
        }

        // Wait for drain
        for _ in 0..100 {
            if processed.load(Ordering::SeqCst) == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(processed.load(Ordering::SeqCst), 10);
        assert_eq!(queue.depth(), 0);

        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_zero_worker_pool_keeps_queue_open() {
        let (queue, receiver) = JobQueue::<u32>::new("test", 4);
        let cancel = CancellationToken::new();

        let handles = spawn_workers("test", 0, receiver, |_job| async {}, cancel.clone());
        assert_eq!(handles.len(), 1);

        // Jobs are accepted and sit in the queue
        queue.submit(1).await.unwrap();
        queue.submit(2).await.unwrap();
        assert_eq!(queue.depth(), 2);

        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_pool_size() {
        let (queue, receiver) = JobQueue::<u32>::new("test", 32);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let active_c = Arc::clone(&active);
        let peak_c = Arc::clone(&peak);
        let _handles = spawn_workers(
            "test",
            2,
            receiver,
            move |_job| {
                let active = Arc::clone(&active_c);
                let peak = Arc::clone(&peak_c);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            },
            cancel.clone(),
        );

        for i in 0..8 {
            queue.submit(i).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let (queue, receiver) = JobQueue::<u32>::new("test", 4);
        drop(receiver);
        assert!(queue.submit(1).await.is_err());
    }
}
