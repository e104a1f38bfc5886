use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};

use super::simulation::{ServiceError, SimulationService};
use crate::models::job::{JobId, JobState, StreamRef};

/// How often to query job status, and when to give up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Stop after this many queries.
    pub max_attempts: Option<u32>,
    /// Stop once this much time has passed since the first query.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: None,
            deadline: None,
        }
    }
}

/// Terminal result of waiting on a job, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed(Vec<StreamRef>),
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Simulation {job_id} failed: {message}")]
    Failed { job_id: JobId, message: String },

    #[error("Simulation {job_id} completed without any streams")]
    NoStreams { job_id: JobId },

    #[error("Simulation {job_id} still {last_state} after {attempts} status checks ({waited:?})")]
    TimedOut {
        job_id: JobId,
        last_state: JobState,
        attempts: u32,
        waited: Duration,
    },
}

/// Fixed-interval status poller.
pub struct StatusPoller {
    policy: PollPolicy,
}

impl StatusPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Query `job_id` until it reaches a terminal state.
    ///
    /// Sleeps the interval between queries and never queries again after a
    /// terminal state. Service errors are not retried. With a deadline, the
    /// last sleep is shortened so one query lands on the deadline, and a
    /// single query may run at most one interval past it.
    pub async fn wait(
        &self,
        service: &dyn SimulationService,
        job_id: &JobId,
    ) -> Result<PollOutcome, PollError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut last_state = JobState::Pending;

        loop {
            attempts += 1;
            metrics::counter!("simulation_polls_total").increment(1);

            let status = match self.policy.deadline {
                Some(deadline) => {
                    let budget = deadline
                        .saturating_sub(started.elapsed())
                        .max(self.policy.interval);
                    match timeout(budget, service.poll(job_id)).await {
                        Ok(status) => status?,
                        Err(_) => {
                            tracing::warn!(job_id = %job_id, ?budget, "Status query did not answer");
                            return Err(self.timed_out(job_id, last_state, attempts, started));
                        }
                    }
                }
                None => service.poll(job_id).await?,
            };
            last_state = status.status;

            match status.status {
                JobState::Completed => {
                    metrics::histogram!("simulation_wait_seconds")
                        .record(started.elapsed().as_secs_f64());
                    if status.streams.is_empty() {
                        return Err(PollError::NoStreams {
                            job_id: job_id.clone(),
                        });
                    }
                    tracing::info!(
                        job_id = %job_id,
                        streams = status.streams.len(),
                        attempts,
                        "Simulation completed"
                    );
                    return Ok(PollOutcome::Completed(status.streams));
                }
                JobState::Failed => {
                    let message = status
                        .error_message
                        .unwrap_or_else(|| "no error message reported".to_string());
                    tracing::error!(job_id = %job_id, error = %message, "Simulation failed");
                    return Err(PollError::Failed {
                        job_id: job_id.clone(),
                        message,
                    });
                }
                JobState::Cancelled => {
                    tracing::warn!(job_id = %job_id, "Simulation cancelled");
                    return Ok(PollOutcome::Cancelled);
                }
                JobState::Pending | JobState::Running => {
                    tracing::debug!(job_id = %job_id, state = %status.status, attempts, "Simulation in progress");
                }
            }

            if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(self.timed_out(job_id, last_state, attempts, started));
            }

            let pause = match self.policy.deadline {
                Some(deadline) => {
                    let waited = started.elapsed();
                    if waited >= deadline {
                        return Err(self.timed_out(job_id, last_state, attempts, started));
                    }
                    self.policy.interval.min(deadline - waited)
                }
                None => self.policy.interval,
            };
            sleep(pause).await;
        }
    }

    fn timed_out(
        &self,
        job_id: &JobId,
        last_state: JobState,
        attempts: u32,
        started: Instant,
    ) -> PollError {
        PollError::TimedOut {
            job_id: job_id.clone(),
            last_state,
            attempts,
            waited: started.elapsed(),
        }
    }
}
