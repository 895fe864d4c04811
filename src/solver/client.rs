//! High-level solving client: upload once, then poll until solved or the
//! deadline passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::error::Result;
use crate::solver::poll::PollSchedule;
use crate::solver::transport::SolverTransport;
use crate::solver::types::{CaptchaJob, CaptchaTask};

/// Default deadline for image uploads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Token tasks are solved by a live session on the vendor side and take
/// noticeably longer.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(120);

/// Decode-loop wrapper around a [`SolverTransport`].
#[derive(Clone)]
pub struct SolverClient {
    transport: Arc<dyn SolverTransport>,
    schedule: PollSchedule,
}

impl SolverClient {
    pub fn new(transport: Arc<dyn SolverTransport>) -> Self {
        Self {
            transport,
            schedule: PollSchedule::default(),
        }
    }

    pub fn with_schedule(transport: Arc<dyn SolverTransport>, schedule: PollSchedule) -> Self {
        Self { transport, schedule }
    }

    /// Upload a task and poll until it is solved or `timeout` elapses.
    ///
    /// Returns `None` when the deadline passes or the service marked the
    /// solution incorrect; the two outcomes are deliberately
    /// indistinguishable here, matching the service's own reporting.
    pub async fn decode(
        &self,
        task: &CaptchaTask,
        timeout: Option<Duration>,
    ) -> Result<Option<CaptchaJob>> {
        let timeout = timeout.unwrap_or(if task.carries_image() {
            DEFAULT_TIMEOUT
        } else {
            DEFAULT_TOKEN_TIMEOUT
        });
        let deadline = Instant::now() + timeout;

        let mut job = self.transport.submit(task).await?;
        if job.is_empty() {
            debug!("upload yielded no job");
            return Ok(None);
        }
        let id = job.id;
        info!(job = id, "uploaded CAPTCHA, polling for solution");

        let mut poll = 0;
        while !job.is_solved() && Instant::now() < deadline {
            sleep(self.schedule.interval(poll)).await;
            poll += 1;
            job = self.transport.job_status(id).await?;
            debug!(job = id, poll, solved = job.is_solved(), "polled job");
        }

        if job.is_solved_correctly() {
            Ok(Some(job))
        } else {
            Ok(None)
        }
    }

    /// Account balance in US cents. Propagates `AccessDenied`.
    pub async fn balance(&self) -> Result<f64> {
        Ok(self.transport.account_status().await?.balance)
    }

    pub async fn report_incorrect(&self, id: u64) -> Result<bool> {
        self.transport.report_incorrect(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapdriverError;
    use crate::solver::types::AccountStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport whose job becomes solved after a fixed number of polls.
    struct CountingTransport {
        solve_after: u32,
        correct: bool,
        polls: AtomicU32,
    }

    impl CountingTransport {
        fn new(solve_after: u32, correct: bool) -> Self {
            Self {
                solve_after,
                correct,
                polls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SolverTransport for CountingTransport {
        async fn account_status(&self) -> Result<AccountStatus> {
            Ok(AccountStatus::default())
        }

        async fn job_status(&self, id: u64) -> Result<CaptchaJob> {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if poll >= self.solve_after {
                Ok(CaptchaJob {
                    id,
                    text: Some("[[10,20]]".into()),
                    is_correct: Some(self.correct),
                })
            } else {
                Ok(CaptchaJob {
                    id,
                    text: None,
                    is_correct: None,
                })
            }
        }

        async fn submit(&self, _task: &CaptchaTask) -> Result<CaptchaJob> {
            Ok(CaptchaJob {
                id: 42,
                text: None,
                is_correct: None,
            })
        }

        async fn report_incorrect(&self, _id: u64) -> Result<bool> {
            Ok(true)
        }
    }

    /// Transport whose upload never produces a job.
    struct RejectingTransport;

    #[async_trait]
    impl SolverTransport for RejectingTransport {
        async fn account_status(&self) -> Result<AccountStatus> {
            Ok(AccountStatus::default())
        }

        async fn job_status(&self, _id: u64) -> Result<CaptchaJob> {
            panic!("must not poll after an empty upload");
        }

        async fn submit(&self, _task: &CaptchaTask) -> Result<CaptchaJob> {
            Ok(CaptchaJob::default())
        }

        async fn report_incorrect(&self, _id: u64) -> Result<bool> {
            Ok(false)
        }
    }

    fn coordinates_task() -> CaptchaTask {
        CaptchaTask::Coordinates {
            image: vec![0u8; 8],
            hint: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn decode_returns_after_the_solving_poll() {
        let transport = Arc::new(CountingTransport::new(4, true));
        let client = SolverClient::new(transport.clone());

        let job = client
            .decode(&coordinates_task(), Some(Duration::from_secs(60)))
            .await
            .unwrap()
            .expect("job should be solved");

        assert_eq!(job.id, 42);
        assert_eq!(job.text.as_deref(), Some("[[10,20]]"));
        assert_eq!(transport.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn incorrectly_marked_solutions_are_absent() {
        let transport = Arc::new(CountingTransport::new(1, false));
        let client = SolverClient::new(transport);

        let job = client
            .decode(&coordinates_task(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(job.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn decode_gives_up_at_the_deadline() {
        let transport = Arc::new(CountingTransport::new(u32::MAX, true));
        let client = SolverClient::new(transport.clone());

        let started = Instant::now();
        let job = client
            .decode(&coordinates_task(), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(job.is_none());

        // Total sleep may overshoot the deadline by at most one interval
        // (the fallback, 3s).
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed <= Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_uploads_skip_polling() {
        let client = SolverClient::new(Arc::new(RejectingTransport));
        let job = client
            .decode(&coordinates_task(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        struct DeniedTransport;

        #[async_trait]
        impl SolverTransport for DeniedTransport {
            async fn account_status(&self) -> Result<AccountStatus> {
                Err(CapdriverError::AccessDenied("bad credentials".into()))
            }
            async fn job_status(&self, _id: u64) -> Result<CaptchaJob> {
                Err(CapdriverError::AccessDenied("bad credentials".into()))
            }
            async fn submit(&self, _task: &CaptchaTask) -> Result<CaptchaJob> {
                Err(CapdriverError::AccessDenied("bad credentials".into()))
            }
            async fn report_incorrect(&self, _id: u64) -> Result<bool> {
                Err(CapdriverError::AccessDenied("bad credentials".into()))
            }
        }

        let client = SolverClient::new(Arc::new(DeniedTransport));
        let err = client.decode(&coordinates_task(), None).await.unwrap_err();
        assert!(matches!(err, CapdriverError::AccessDenied(_)));
    }
}
