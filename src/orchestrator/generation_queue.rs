//! 生成队列 - 编排层
//!
//! ## 职责
//!
//! 保证同一时刻只有一个生成任务在执行，并严格按提交顺序放行，
//! 上游模型服务因此永远不会收到并发的生成请求。
//!
//! ## 设计
//!
//! - 单个 worker 任务持有 mpsc 接收端，串行执行收到的任务（FIFO）
//! - 每个任务附带一个 oneshot，用来把任务自己的结果原样交还给提交者
//! - 任务失败或 panic 都不影响后续任务
//! - 每个进程只创建一个实例，由 [`App`](crate::orchestrator::App) 持有

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::QueueError;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// 排队中的任务
struct QueuedJob {
    id: u64,
    enqueued_at: Instant,
    run: Job,
}

/// 队列运行状态
#[derive(Default)]
struct QueueState {
    pending: AtomicUsize,
    running: AtomicBool,
    /// 0 表示没有任务在执行
    current: AtomicU64,
    completed: AtomicU64,
    closed: AtomicBool,
}

/// 队列状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub running: bool,
    pub current: Option<u64>,
    pub completed: u64,
}

/// 单并发生成队列
#[derive(Clone)]
pub struct GenerationQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    state: Arc<QueueState>,
    next_id: Arc<AtomicU64>,
}

impl GenerationQueue {
    /// 创建队列并启动 worker
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());

        tokio::spawn(run_worker(receiver, state.clone()));

        Self {
            sender,
            state,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// 提交任务
    ///
    /// 队列已关闭时立即返回 [`QueueError::Closed`]，任务不会进入队列。
    /// 返回的 [`Submission`] 在任务结束后得到任务自己的输出。
    pub fn submit<F, Fut, T>(&self, task: F) -> Result<Submission<T>, QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let run: Job = Box::new(move || {
            async move {
                let output = AssertUnwindSafe(async move { task().await })
                    .catch_unwind()
                    .await
                    .map_err(|_| QueueError::TaskPanicked { task_id: id });
                // 提交者可能已经不再等待结果
                let _ = tx.send(output);
            }
            .boxed()
        });

        self.state.pending.fetch_add(1, Ordering::SeqCst);
        let job = QueuedJob {
            id,
            enqueued_at: Instant::now(),
            run,
        };
        if self.sender.send(job).is_err() {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }

        debug!(
            "📥 任务 #{} 进入队列，当前排队 {} 个",
            id,
            self.state.pending.load(Ordering::SeqCst)
        );

        Ok(Submission {
            task_id: id,
            receiver: rx,
        })
    }

    /// 关闭队列：拒绝新任务，已排队的任务继续执行
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> QueueStats {
        let current = self.state.current.load(Ordering::SeqCst);
        QueueStats {
            pending: self.state.pending.load(Ordering::SeqCst),
            running: self.state.running.load(Ordering::SeqCst),
            current: (current != 0).then_some(current),
            completed: self.state.completed.load(Ordering::SeqCst),
        }
    }
}

impl Default for GenerationQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// 串行执行任务
async fn run_worker(mut receiver: mpsc::UnboundedReceiver<QueuedJob>, state: Arc<QueueState>) {
    while let Some(job) = receiver.recv().await {
        state.pending.fetch_sub(1, Ordering::SeqCst);
        state.current.store(job.id, Ordering::SeqCst);
        state.running.store(true, Ordering::SeqCst);

        debug!(
            "▶️ 任务 #{} 开始执行，排队等待 {:?}",
            job.id,
            job.enqueued_at.elapsed()
        );
        let started = Instant::now();

        (job.run)().await;

        state.running.store(false, Ordering::SeqCst);
        state.current.store(0, Ordering::SeqCst);
        state.completed.fetch_add(1, Ordering::SeqCst);

        debug!("⏹️ 任务 #{} 执行结束，耗时 {:?}", job.id, started.elapsed());
    }

    debug!("生成队列已无提交端，worker 退出");
}

/// 已提交任务的结果
pub struct Submission<T> {
    task_id: u64,
    receiver: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> Submission<T> {
    pub fn task_id(&self) -> u64 {
        self.task_id
    }
}

impl<T> std::fmt::Debug for Submission<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("task_id", &self.task_id)
            .finish()
    }
}

impl<T> Future for Submission<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task_id = self.task_id;
        Pin::new(&mut self.receiver).poll(cx).map(|received| match received {
            Ok(output) => output,
            Err(_) => Err(QueueError::Dropped { task_id }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_single_flight_and_fifo() {
        let queue = GenerationQueue::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let admitted = Arc::new(Mutex::new(Vec::new()));

        let mut submissions = Vec::new();
        for i in 0..8u64 {
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            let admitted = admitted.clone();
            let submission = queue
                .submit(move || async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    admitted.lock().unwrap().push(i);
                    // 时长各不相同
                    tokio::time::sleep(Duration::from_millis(5 * (8 - i))).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    i * 10
                })
                .unwrap();
            submissions.push(submission);
        }

        let results = futures::future::join_all(submissions).await;

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*admitted.lock().unwrap(), (0..8).collect::<Vec<_>>());
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..8).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_queue() {
        let queue = GenerationQueue::new();

        let failing = queue
            .submit(|| async { Err::<u32, String>("boom".to_string()) })
            .unwrap();
        let panicking = queue
            .submit(|| async {
                if true {
                    panic!("task panic");
                }
                0u32
            })
            .unwrap();
        let ok = queue.submit(|| async { Ok::<u32, String>(3) }).unwrap();

        assert_eq!(failing.await.unwrap(), Err("boom".to_string()));
        let panicked = panicking.await;
        assert!(matches!(panicked, Err(QueueError::TaskPanicked { .. })));
        assert_eq!(ok.await.unwrap(), Ok(3));
    }

    #[tokio::test]
    async fn test_results_returned_unmodified() {
        let queue = GenerationQueue::new();
        let result = assert_ok!(queue.submit(|| async { vec!["a", "b"] })).await;
        assert_eq!(result.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_synchronously() {
        let queue = GenerationQueue::new();
        let before = queue.submit(|| async { 1 }).unwrap();
        queue.close();

        assert!(queue.is_closed());
        let rejected = assert_err!(queue.submit(|| async { 2 }));
        assert_eq!(rejected, QueueError::Closed);

        // 关闭前提交的任务仍然执行
        assert_eq!(before.await.unwrap(), 1);
        assert_eq!(queue.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_stats_while_running() {
        let queue = GenerationQueue::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = queue
            .submit(move || async move {
                let _ = release_rx.await;
            })
            .unwrap();
        let second = queue.submit(|| async {}).unwrap();
        let first_id = first.task_id();

        // 等待 worker 放行第一个任务
        for _ in 0..50 {
            if queue.stats().running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let stats = queue.stats();
        assert!(stats.running);
        assert_eq!(stats.current, Some(first_id));
        assert_eq!(stats.pending, 1);

        release_tx.send(()).unwrap();
        first.await.unwrap();
        second.await.unwrap();

        // 结果先于计数更新送达，稍等 worker 收尾
        for _ in 0..50 {
            if queue.stats().completed == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let stats = queue.stats();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.pending, 0);
    }
}
