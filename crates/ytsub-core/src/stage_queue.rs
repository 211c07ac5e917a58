//! Stage queue: a reusable bounded FIFO with a named worker pool that
//! consumes items through a user-provided processor (spec §4.6).
//!
//! Generalizes the consumer-pool shape of a Redis-Streams job executor
//! (`Arc<Semaphore>`-gated concurrency, a `watch`-driven shutdown signal,
//! one spawned task per in-flight item) onto a plain in-process bounded
//! `tokio::mpsc` channel, since this pipeline has no distributed queue to
//! talk to.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::error::CoreError;

/// What a processor did with one item.
pub enum StageOutcome<T> {
    /// Processing succeeded; `T` is forwarded to the next stage queue, if
    /// any, or dropped if this is the last stage.
    Forward(T),
    /// Processing failed; `T` is routed to the stage's failure sink, not
    /// forwarded downstream (spec §4.7 "Failure routing").
    Fail(T, CoreError),
    /// A terminal *non-error* state (spec §4.7 "Success routing" — DETECT
    /// finding no subtitles): routed to the failure sink with
    /// `error_type=CONTENT` but recorded as `SKIPPED`, not `FAILED`.
    Skip(T, String),
}

/// Per-stage business logic, invoked once per item by every worker.
#[async_trait]
pub trait StageProcessor<T: Send + 'static>: Send + Sync {
    async fn process(&self, item: T) -> StageOutcome<T>;
}

/// Terminal sink for items a stage could not forward: real failures and
/// drained cancellations alike (spec §4.6 "Cancellation").
#[async_trait]
pub trait FailSink<T: Send + 'static>: Send + Sync {
    async fn on_failure(&self, item: T, error: CoreError);

    /// Default routes through `on_failure` with `ErrorType::Content`;
    /// implementations that distinguish SKIPPED from FAILED in the
    /// manifest should override this.
    async fn on_skip(&self, item: T, reason: String) {
        self.on_failure(item, CoreError::content(reason)).await;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub processed: u64,
    pub failed: u64,
    pub in_flight: i64,
    pub queue_depth: usize,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicI64,
}

/// One stage: an input channel, `worker_count` tasks draining it
/// concurrently, and an optional sender to the next stage.
pub struct StageQueue<T: Send + 'static> {
    name: String,
    tx: StdMutex<Option<mpsc::Sender<T>>>,
    max_capacity: usize,
    counters: Arc<Counters>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> StageQueue<T> {
    /// Spawns `worker_count` tasks pulling from a channel of
    /// `input_capacity` items (spec §4.7 "default sized 2 × worker_count").
    /// `next` is the sender side of the following stage's input channel,
    /// obtained via that stage's [`StageQueue::sender`] before this stage
    /// starts — pipeline wiring happens once, at construction.
    pub fn spawn(
        name: impl Into<String>,
        input_capacity: usize,
        worker_count: usize,
        processor: Arc<dyn StageProcessor<T>>,
        next: Option<mpsc::Sender<T>>,
        fail_sink: Arc<dyn FailSink<T>>,
        cancel: CancelToken,
    ) -> Arc<Self> {
        let name = name.into();
        let (tx, rx) = mpsc::channel(input_capacity.max(1));
        let rx = Arc::new(AsyncMutex::new(rx));
        let counters = Arc::new(Counters::default());

        let queue = Arc::new(Self {
            name: name.clone(),
            tx: StdMutex::new(Some(tx)),
            max_capacity: input_capacity.max(1),
            counters: counters.clone(),
            workers: StdMutex::new(Vec::new()),
        });

        let mut handles = Vec::with_capacity(worker_count.max(1));
        for worker_id in 0..worker_count.max(1) {
            let rx = Arc::clone(&rx);
            let processor = Arc::clone(&processor);
            let next = next.clone();
            let fail_sink = Arc::clone(&fail_sink);
            let cancel = cancel.clone();
            let counters = Arc::clone(&counters);
            let stage_name = name.clone();
            handles.push(tokio::spawn(async move {
                run_worker(stage_name, worker_id, rx, processor, next, fail_sink, cancel, counters).await;
            }));
        }
        *queue.workers.lock().unwrap() = handles;

        queue
    }

    /// A cloneable sender for wiring this queue as another stage's `next`.
    pub fn sender(&self) -> Option<mpsc::Sender<T>> {
        self.tx.lock().unwrap().clone()
    }

    /// Blocks (backpressure) when the input channel is full.
    pub async fn submit(&self, item: T) -> Result<(), CoreError> {
        let tx = self.tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(item).await.map_err(|_| CoreError::invalid_input(format!("{} stage queue is closed", self.name))),
            None => Err(CoreError::invalid_input(format!("{} stage queue is closed", self.name))),
        }
    }

    /// Signals no more items will be submitted. Workers exit once the
    /// channel is both closed and drained (spec §4.6 "Workers").
    pub fn close_input(&self) {
        self.tx.lock().unwrap().take();
    }

    /// Awaits every worker task's completion — i.e. input closed and
    /// empty, or cancellation fully drained.
    pub async fn wait_drained(&self) {
        let handles = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn stats(&self) -> StageStats {
        let queue_depth = self
            .tx
            .lock()
            .unwrap()
            .as_ref()
            .map(|tx| self.max_capacity - tx.capacity())
            .unwrap_or(0);
        StageStats {
            processed: self.counters.processed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            queue_depth,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker<T: Send + 'static>(
    stage_name: String,
    _worker_id: usize,
    rx: Arc<AsyncMutex<mpsc::Receiver<T>>>,
    processor: Arc<dyn StageProcessor<T>>,
    next: Option<mpsc::Sender<T>>,
    fail_sink: Arc<dyn FailSink<T>>,
    cancel: CancelToken,
    counters: Arc<Counters>,
) {
    loop {
        if cancel.is_cancelled() {
            drain_as_cancelled(&stage_name, &rx, &fail_sink, &counters).await;
            return;
        }

        let item = {
            let mut guard = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                maybe_item = guard.recv() => maybe_item,
            }
        };

        let Some(item) = item else {
            if cancel.is_cancelled() {
                drain_as_cancelled(&stage_name, &rx, &fail_sink, &counters).await;
            }
            return;
        };

        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        let outcome = processor.process(item).await;
        counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            StageOutcome::Forward(out) => {
                counters.processed.fetch_add(1, Ordering::SeqCst);
                if let Some(next_tx) = &next {
                    let _ = next_tx.send(out).await;
                }
            }
            StageOutcome::Fail(item, err) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                fail_sink.on_failure(item, err).await;
            }
            StageOutcome::Skip(item, reason) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                fail_sink.on_skip(item, reason).await;
            }
        }
    }
}

async fn drain_as_cancelled<T: Send + 'static>(
    _stage_name: &str,
    rx: &Arc<AsyncMutex<mpsc::Receiver<T>>>,
    fail_sink: &Arc<dyn FailSink<T>>,
    counters: &Arc<Counters>,
) {
    let mut guard = rx.lock().await;
    while let Ok(item) = guard.try_recv() {
        counters.failed.fetch_add(1, Ordering::SeqCst);
        fail_sink.on_failure(item, CoreError::cancelled("pipeline cancelled")).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex as TokioMutex;

    struct DoubleProcessor;

    #[async_trait]
    impl StageProcessor<i32> for DoubleProcessor {
        async fn process(&self, item: i32) -> StageOutcome<i32> {
            if item < 0 {
                StageOutcome::Fail(item, CoreError::invalid_input("negative"))
            } else {
                StageOutcome::Forward(item * 2)
            }
        }
    }

    struct CollectingSink {
        failures: Arc<TokioMutex<Vec<(i32, String)>>>,
    }

    #[async_trait]
    impl FailSink<i32> for CollectingSink {
        async fn on_failure(&self, item: i32, error: CoreError) {
            self.failures.lock().await.push((item, error.to_string()));
        }
    }

    #[tokio::test]
    async fn processes_items_and_forwards_results() {
        let output = Arc::new(TokioMutex::new(Vec::new()));
        let output_clone = Arc::clone(&output);
        let (next_tx, mut next_rx) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some(item) = next_rx.recv().await {
                output_clone.lock().await.push(item);
            }
        });

        let failures = Arc::new(TokioMutex::new(Vec::new()));
        let sink = Arc::new(CollectingSink { failures: Arc::clone(&failures) });
        let cancel = CancelToken::new();
        let queue = StageQueue::spawn("double", 8, 2, Arc::new(DoubleProcessor), Some(next_tx), sink, cancel);

        for i in 1..=5 {
            queue.submit(i).await.unwrap();
        }
        queue.close_input();
        queue.wait_drained().await;

        let mut results = output.lock().await.clone();
        results.sort();
        assert_eq!(results, vec![2, 4, 6, 8, 10]);
        assert_eq!(queue.stats().processed, 5);
    }

    #[tokio::test]
    async fn failed_items_go_to_fail_sink_not_downstream() {
        let failures = Arc::new(TokioMutex::new(Vec::new()));
        let sink = Arc::new(CollectingSink { failures: Arc::clone(&failures) });
        let cancel = CancelToken::new();
        let queue = StageQueue::spawn("double", 8, 1, Arc::new(DoubleProcessor), None, sink, cancel);

        queue.submit(-1).await.unwrap();
        queue.submit(3).await.unwrap();
        queue.close_input();
        queue.wait_drained().await;

        assert_eq!(queue.stats().failed, 1);
        assert_eq!(queue.stats().processed, 1);
        assert_eq!(failures.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn submission_order_preserved_into_channel() {
        let processed = Arc::new(AtomicUsize::new(0));
        let processed_clone = Arc::clone(&processed);

        struct CountingProcessor(Arc<AtomicUsize>);
        #[async_trait]
        impl StageProcessor<i32> for CountingProcessor {
            async fn process(&self, item: i32) -> StageOutcome<i32> {
                self.0.fetch_add(1, Ordering::SeqCst);
                StageOutcome::Forward(item)
            }
        }

        let failures = Arc::new(TokioMutex::new(Vec::new()));
        let sink = Arc::new(CollectingSink { failures });
        let cancel = CancelToken::new();
        let queue = StageQueue::spawn(
            "count",
            8,
            1,
            Arc::new(CountingProcessor(processed_clone)),
            None,
            sink,
            cancel,
        );
        for i in 0..10 {
            queue.submit(i).await.unwrap();
        }
        queue.close_input();
        queue.wait_drained().await;
        assert_eq!(processed.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn cancellation_drains_remaining_items_as_cancelled() {
        struct SlowProcessor;
        #[async_trait]
        impl StageProcessor<i32> for SlowProcessor {
            async fn process(&self, item: i32) -> StageOutcome<i32> {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                StageOutcome::Forward(item)
            }
        }

        let failures = Arc::new(TokioMutex::new(Vec::new()));
        let sink = Arc::new(CollectingSink { failures: Arc::clone(&failures) });
        let cancel = CancelToken::new();
        let queue = StageQueue::spawn("slow", 16, 1, Arc::new(SlowProcessor), None, sink, cancel.clone());

        for i in 0..5 {
            queue.submit(i).await.unwrap();
        }
        queue.close_input();
        cancel.cancel("test cancel");
        queue.wait_drained().await;

        let recorded = failures.lock().await;
        assert!(recorded.iter().any(|(_, msg)| msg.contains("cancelled")));
    }
}
