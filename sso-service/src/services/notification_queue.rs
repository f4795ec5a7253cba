//! Bounded fire-and-forget delivery of verification emails.
//!
//! `enqueue` never waits: a full queue drops the job. Workers share one
//! receiver; a job is only lost on a full queue, on `Discard` shutdown, or
//! when a `Drain` shutdown runs out of time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::NotificationConfig;
use crate::services::email::EmailProvider;
use crate::services::events::{EventSink, RegistrationEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Notification queue full")]
    Full,

    #[error("Notification queue closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJob {
    pub email: String,
    pub activation_link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Deliver everything already queued, bounded by the timeout.
    Drain,
    /// Finish in-flight sends within the timeout, drop the rest.
    Discard,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub discarded: Vec<NotificationJob>,
    pub timed_out: bool,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<NotificationJob>>>;

pub struct NotificationQueue {
    sender: Mutex<Option<mpsc::Sender<NotificationJob>>>,
    receiver: SharedReceiver,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_token: CancellationToken,
    sink: Arc<dyn EventSink>,
}

impl NotificationQueue {
    /// Spawn the worker pool. Must be called inside a Tokio runtime.
    pub fn start(
        config: &NotificationConfig,
        provider: Arc<dyn EmailProvider>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shutdown_token = CancellationToken::new();

        tracing::info!(
            worker_count = config.worker_count,
            queue_size = config.queue_size,
            "Starting notification workers"
        );

        let workers = (0..config.worker_count.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    receiver: receiver.clone(),
                    provider: provider.clone(),
                    sink: sink.clone(),
                    shutdown: shutdown_token.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(workers),
            shutdown_token,
            sink,
        }
    }

    pub fn enqueue(&self, job: NotificationJob) -> Result<(), QueueError> {
        let result = match self.sender.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(sender) => sender.try_send(job).map_err(|e| match e {
                    TrySendError::Full(job) => (QueueError::Full, job),
                    TrySendError::Closed(job) => (QueueError::Closed, job),
                }),
                None => Err((QueueError::Closed, job)),
            },
            Err(_) => Err((QueueError::Closed, job)),
        };

        result.map_err(|(err, job)| {
            let reason = match err {
                QueueError::Full => "queue_full",
                QueueError::Closed => "queue_closed",
            };
            self.sink.record(&RegistrationEvent::NotificationDropped {
                email: job.email,
                reason,
            });
            err
        })
    }

    /// Stop accepting jobs and wind the workers down. Calling it twice is
    /// harmless; the second call finds nothing to do.
    pub async fn shutdown(&self, mode: ShutdownMode, timeout: Duration) -> ShutdownReport {
        tracing::info!(?mode, "Initiating notification queue shutdown");

        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let mut workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => Vec::new(),
        };

        let deadline = tokio::time::Instant::now() + timeout;
        let mut timed_out = false;
        if mode == ShutdownMode::Drain {
            let finished =
                tokio::time::timeout_at(deadline, join_all(workers.iter_mut())).await;
            if finished.is_err() {
                tracing::warn!("Notification drain timed out, discarding remaining jobs");
                timed_out = true;
            }
        }

        self.shutdown_token.cancel();
        // Handles already driven to completion by the drain must not be polled again.
        workers.retain(|handle| !handle.is_finished());
        if !workers.is_empty() {
            let stopped = tokio::time::timeout_at(deadline, join_all(workers.iter_mut())).await;
            if stopped.is_err() {
                tracing::warn!(
                    stuck_workers = workers.len(),
                    "Aborting notification workers stuck in delivery"
                );
                timed_out = true;
                for handle in &workers {
                    handle.abort();
                }
                workers.retain(|handle| !handle.is_finished());
                join_all(workers).await;
            }
        }

        let mut discarded = Vec::new();
        {
            let mut receiver = self.receiver.lock().await;
            receiver.close();
            while let Ok(job) = receiver.try_recv() {
                discarded.push(job);
            }
        }

        for job in &discarded {
            self.sink.record(&RegistrationEvent::NotificationDropped {
                email: job.email.clone(),
                reason: "shutdown",
            });
        }

        tracing::info!(
            discarded = discarded.len(),
            timed_out,
            "Notification queue stopped"
        );

        ShutdownReport {
            discarded,
            timed_out,
        }
    }
}

struct Worker {
    id: usize,
    receiver: SharedReceiver,
    provider: Arc<dyn EmailProvider>,
    sink: Arc<dyn EventSink>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self) {
        loop {
            let job = {
                let mut receiver = self.receiver.lock().await;
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => None,
                    job = receiver.recv() => job,
                }
            };

            match job {
                Some(job) => self.deliver(job).await,
                None => break,
            }
        }

        tracing::debug!(worker_id = self.id, "Notification worker exiting");
    }

    async fn deliver(&self, job: NotificationJob) {
        match self
            .provider
            .send_verification_email(&job.email, &job.activation_link)
            .await
        {
            Ok(()) => self
                .sink
                .record(&RegistrationEvent::NotificationSent { email: job.email }),
            Err(e) => self.sink.record(&RegistrationEvent::DeliveryFailed {
                email: job.email,
                error: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email::MockEmailService;
    use crate::services::events::RecordingEventSink;

    fn config(worker_count: usize, queue_size: usize) -> NotificationConfig {
        NotificationConfig {
            worker_count,
            queue_size,
            shutdown_timeout_seconds: 1,
        }
    }

    fn job(n: usize) -> NotificationJob {
        NotificationJob {
            email: format!("user{}@example.com", n),
            activation_link: format!("http://localhost/activate/{}", n),
        }
    }

    #[tokio::test]
    async fn delivers_and_records() {
        let mail = Arc::new(MockEmailService::new());
        let sink = RecordingEventSink::new();
        let queue = NotificationQueue::start(&config(2, 8), mail.clone(), Arc::new(sink.clone()));

        queue.enqueue(job(1)).unwrap();
        assert!(mail.wait_for_attempts(1, Duration::from_secs(2)).await);

        let report = queue.shutdown(ShutdownMode::Drain, Duration::from_secs(1)).await;
        assert!(report.discarded.is_empty());
        assert_eq!(
            sink.count_matching(|e| matches!(e, RegistrationEvent::NotificationSent { .. })),
            1
        );
    }

    #[tokio::test]
    async fn delivery_failure_is_recorded() {
        let mail = Arc::new(MockEmailService::failing());
        let sink = RecordingEventSink::new();
        let queue = NotificationQueue::start(&config(1, 8), mail.clone(), Arc::new(sink.clone()));

        queue.enqueue(job(1)).unwrap();
        queue.shutdown(ShutdownMode::Drain, Duration::from_secs(1)).await;

        assert_eq!(
            sink.count_matching(|e| matches!(e, RegistrationEvent::DeliveryFailed { .. })),
            1
        );
    }

    #[tokio::test]
    async fn drain_delivers_everything_queued() {
        let mail = Arc::new(MockEmailService::new());
        let sink = RecordingEventSink::new();
        let queue = NotificationQueue::start(&config(2, 16), mail.clone(), Arc::new(sink));

        for n in 0..10 {
            queue.enqueue(job(n)).unwrap();
        }
        let report = queue.shutdown(ShutdownMode::Drain, Duration::from_secs(2)).await;

        assert!(!report.timed_out);
        assert!(report.discarded.is_empty());
        assert_eq!(mail.sent().len(), 10);
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_closed() {
        let mail = Arc::new(MockEmailService::new());
        let sink = RecordingEventSink::new();
        let queue = NotificationQueue::start(&config(1, 4), mail, Arc::new(sink.clone()));

        queue.shutdown(ShutdownMode::Discard, Duration::from_secs(1)).await;

        assert_eq!(queue.enqueue(job(1)), Err(QueueError::Closed));
        assert_eq!(
            sink.count_matching(|e| matches!(
                e,
                RegistrationEvent::NotificationDropped { reason: "queue_closed", .. }
            )),
            1
        );
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let mail = Arc::new(MockEmailService::new());
        let sink = RecordingEventSink::new();
        // Workers cannot run until this test task yields.
        let queue = NotificationQueue::start(&config(1, 1), mail, Arc::new(sink.clone()));

        queue.enqueue(job(1)).unwrap();
        assert_eq!(queue.enqueue(job(2)), Err(QueueError::Full));
        assert_eq!(
            sink.count_matching(|e| matches!(
                e,
                RegistrationEvent::NotificationDropped { reason: "queue_full", .. }
            )),
            1
        );
    }

    #[tokio::test]
    async fn discard_reports_unsent_jobs() {
        let mail = Arc::new(MockEmailService::new());
        let sink = RecordingEventSink::new();
        let queue = NotificationQueue::start(&config(1, 8), mail.clone(), Arc::new(sink));

        // Hold the receiver so no worker can pick up jobs.
        let guard = queue.receiver.clone();
        let held = guard.lock().await;
        for n in 0..3 {
            queue.enqueue(job(n)).unwrap();
        }
        drop(held);

        queue.shutdown_token.cancel();
        let report = queue.shutdown(ShutdownMode::Discard, Duration::from_secs(1)).await;

        assert_eq!(report.discarded.len() + mail.attempts(), 3);
        assert!(!report.discarded.is_empty());
    }

    struct StallingProvider {
        started: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl EmailProvider for StallingProvider {
        async fn send_verification_email(
            &self,
            _to_email: &str,
            _activation_link: &str,
        ) -> Result<(), crate::services::email::MailError> {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    async fn stalled_queue() -> NotificationQueue {
        let provider = Arc::new(StallingProvider {
            started: tokio::sync::Notify::new(),
        });
        let sink = RecordingEventSink::new();
        let queue = NotificationQueue::start(&config(1, 8), provider.clone(), Arc::new(sink));

        queue.enqueue(job(1)).unwrap();
        provider.started.notified().await;
        queue
    }

    #[tokio::test]
    async fn discard_does_not_wait_out_a_stuck_delivery() {
        let queue = stalled_queue().await;

        let report = tokio::time::timeout(
            Duration::from_secs(2),
            queue.shutdown(ShutdownMode::Discard, Duration::from_millis(200)),
        )
        .await
        .expect("shutdown overran its timeout");

        assert!(report.timed_out);
    }

    #[tokio::test]
    async fn drain_gives_up_on_a_stuck_delivery() {
        let queue = stalled_queue().await;

        let report = tokio::time::timeout(
            Duration::from_secs(2),
            queue.shutdown(ShutdownMode::Drain, Duration::from_millis(200)),
        )
        .await
        .expect("shutdown overran its timeout");

        assert!(report.timed_out);
    }
}
