//! Job orchestrator: one submission, bounded polling.

use std::sync::Arc;
use std::time::Duration;

use restora_core::PollingConfig;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::runner::JobRunner;
use crate::types::{JobFailure, JobHandle, JobOutcome, JobRequest, JobStatus};

/// Upper bound on the background cancel issued after a timeout.
const CANCEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs external jobs to a terminal outcome.
///
/// Lifecycle of one run: `Submitted -> Pending -> {Succeeded | Failed}`, ending
/// in `TimedOut` from either state once the deadline or poll budget is spent.
#[derive(Clone)]
pub struct JobOrchestrator {
    runner: Arc<dyn JobRunner>,
    poll_interval: Duration,
    deadline: Duration,
    max_polls: Option<u32>,
}

impl JobOrchestrator {
    pub fn new(runner: Arc<dyn JobRunner>, polling: &PollingConfig) -> Self {
        Self {
            runner,
            poll_interval: polling.interval,
            deadline: polling.deadline,
            max_polls: polling.max_polls,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Submit `request` once and poll until it settles.
    ///
    /// Never retries: a failed submission, a failed job, or an unreadable
    /// status all end the run. The whole run, submission included, settles
    /// within the configured deadline. Dropping the returned future stops
    /// polling but leaves the external job running.
    pub async fn run(&self, request: &JobRequest) -> JobOutcome {
        let started = Instant::now();
        let deadline = started + self.deadline;

        // No handle comes back from a submission that outlives the deadline,
        // so there is nothing to cancel.
        let handle = match tokio::time::timeout(self.deadline, self.runner.submit(request)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                error!("Job submission failed: {}", e);
                return JobOutcome::Failed(JobFailure::Submission(e.to_string()));
            }
            Err(_) => {
                warn!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Job submission did not complete before the deadline"
                );
                return JobOutcome::TimedOut;
            }
        };
        info!(job_id = %handle.id, "Job submitted");

        let mut polls: u32 = 0;
        loop {
            if self.max_polls.is_some_and(|max| polls >= max) {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            polls += 1;
            let result = match tokio::time::timeout(deadline - now, self.runner.poll(&handle)).await
            {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    error!(job_id = %handle.id, "Job status check failed: {}", e);
                    return JobOutcome::Failed(JobFailure::Status(e.to_string()));
                }
                Err(_) => break,
            };

            match result.status {
                JobStatus::Succeeded => {
                    info!(
                        job_id = %handle.id,
                        polls,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Job succeeded"
                    );
                    return JobOutcome::Succeeded(result.output);
                }
                JobStatus::Failed | JobStatus::Canceled => {
                    let reason = result
                        .error
                        .unwrap_or_else(|| format!("job {}", result.status));
                    error!(job_id = %handle.id, "Job ended unsuccessfully: {}", reason);
                    return JobOutcome::Failed(JobFailure::Job(reason));
                }
                JobStatus::Starting | JobStatus::Processing => {
                    debug!(job_id = %handle.id, polls, status = %result.status, "Job pending");
                    let wake = (Instant::now() + self.poll_interval).min(deadline);
                    tokio::time::sleep_until(wake).await;
                }
            }
        }

        warn!(
            job_id = %handle.id,
            polls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job timed out"
        );
        self.cancel_in_background(handle);
        JobOutcome::TimedOut
    }

    /// Best-effort cancel that never delays the caller past its deadline.
    fn cancel_in_background(&self, handle: JobHandle) {
        let runner = self.runner.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(CANCEL_TIMEOUT, runner.cancel(&handle)).await {
                Ok(Ok(())) => debug!(job_id = %handle.id, "Timed out job canceled"),
                Ok(Err(e)) => {
                    warn!(job_id = %handle.id, "Failed to cancel timed out job: {}", e)
                }
                Err(_) => warn!(job_id = %handle.id, "Cancel request for timed out job hung"),
            }
        });
    }
}
