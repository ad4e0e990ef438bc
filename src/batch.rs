//! Batch Coordinator
//!
//! Fans the validate -> compile -> engine pipeline out over many rows.
//! Admission is FIFO by row order with at most `max_concurrency` jobs at the
//! engine; completion order is unconstrained. Per-row failures are recorded
//! on the job and never abort siblings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::design::{DesignModel, DesignPatch};
use crate::engine::{EngineFailure, EngineOutput, GeometryEngine};
use crate::plan::PlanCompiler;
use crate::rows::BatchRow;
use crate::validation::ValidationResult;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("Row {row_id}: cannot move from {from:?} to {to:?}")]
    IllegalTransition { row_id: usize, from: JobStatus, to: JobStatus },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Validated,
    Rejected,
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Rejected)
    }

    /// Forward-only transitions. `Failed -> Pending` is the single
    /// backward edge and is only reachable through `BatchJob::retry`.
    fn allows(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Validated)
                | (Pending, Rejected)
                | (Validated, Queued)
                | (Validated, Rejected)
                | (Queued, Running)
                | (Queued, Rejected)
                | (Running, Done)
                | (Running, Failed)
        )
    }
}

/// Why a job ended in `Rejected` or `Failed`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum JobReason {
    /// Validation found errors; see the attached result.
    Invalid,
    /// The run was cancelled before this job was dispatched.
    Cancelled,
    /// The design validated but could not be laid out.
    Layout { message: String },
    Timeout { after_ms: u64 },
    Engine { failure: EngineFailure },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchJob {
    pub row_id: usize,
    pub overrides: DesignPatch,
    pub resolved: DesignModel,
    pub validation: Option<ValidationResult>,
    pub status: JobStatus,
    pub reason: Option<JobReason>,
    pub output: Option<PathBuf>,
    /// Every status the job has held, oldest first.
    pub history: Vec<JobStatus>,
}

impl BatchJob {
    pub fn new(row: BatchRow, base: &DesignModel) -> Self {
        let resolved = row.overrides.apply_to(base);
        Self {
            row_id: row.row_id,
            overrides: row.overrides,
            resolved,
            validation: None,
            status: JobStatus::Pending,
            reason: None,
            output: None,
            history: vec![JobStatus::Pending],
        }
    }

    /// Reset a failed job so the next run dispatches it again.
    pub fn retry(&mut self) -> Result<(), BatchError> {
        if self.status != JobStatus::Failed {
            return Err(BatchError::IllegalTransition {
                row_id: self.row_id,
                from: self.status,
                to: JobStatus::Pending,
            });
        }
        self.status = JobStatus::Pending;
        self.history.push(JobStatus::Pending);
        self.reason = None;
        self.output = None;
        self.validation = None;
        Ok(())
    }

    fn advance(&mut self, next: JobStatus) {
        if !self.status.allows(next) {
            warn!(row_id = self.row_id, from = ?self.status, to = ?next, "Ignoring illegal job transition");
            return;
        }
        debug!(row_id = self.row_id, status = ?next, "Job transition");
        self.status = next;
        self.history.push(next);
    }

    fn end(&mut self, status: JobStatus, reason: JobReason) {
        self.advance(status);
        self.reason = Some(reason);
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_concurrency: NonZeroUsize,
    pub job_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
            job_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub jobs: Vec<BatchJob>,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let count = |s: JobStatus| self.jobs.iter().filter(|j| j.status == s).count();
        BatchSummary {
            total: self.jobs.len(),
            done: count(JobStatus::Done),
            failed: count(JobStatus::Failed),
            rejected: count(JobStatus::Rejected),
        }
    }

    pub fn job(&self, row_id: usize) -> Option<&BatchJob> {
        self.jobs.iter().find(|j| j.row_id == row_id)
    }

    pub fn job_mut(&mut self, row_id: usize) -> Option<&mut BatchJob> {
        self.jobs.iter_mut().find(|j| j.row_id == row_id)
    }
}

enum Outcome {
    Finished(Result<EngineOutput, EngineFailure>),
    TimedOut,
    Crashed(JoinError),
}

/// A worker's result together with the concurrency slot it still holds.
type Settled = (usize, Outcome, OwnedSemaphorePermit);

pub struct BatchCoordinator {
    compiler: Arc<PlanCompiler>,
    engine: Arc<dyn GeometryEngine>,
    options: BatchOptions,
}

impl BatchCoordinator {
    pub fn new(compiler: Arc<PlanCompiler>, engine: Arc<dyn GeometryEngine>, options: BatchOptions) -> Self {
        Self { compiler, engine, options }
    }

    pub async fn run(&self, base: &DesignModel, rows: Vec<BatchRow>, cancel: CancellationToken) -> BatchReport {
        let jobs = rows.into_iter().map(|row| BatchJob::new(row, base)).collect();
        self.run_jobs(jobs, cancel).await
    }

    /// Process every `Pending` job; jobs in any other state are carried
    /// through untouched. Returns once all processed jobs are terminal.
    pub async fn run_jobs(&self, mut jobs: Vec<BatchJob>, cancel: CancellationToken) -> BatchReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, jobs = jobs.len(), max_concurrency = self.options.max_concurrency.get(), "Batch started");

        let mut queue = Vec::new();
        for (idx, job) in jobs.iter_mut().enumerate() {
            if job.status != JobStatus::Pending {
                continue;
            }
            let validation = self.compiler.validator().validate(&job.resolved);
            let valid = validation.is_valid;
            job.validation = Some(validation);
            if !valid {
                job.end(JobStatus::Rejected, JobReason::Invalid);
                continue;
            }
            job.advance(JobStatus::Validated);

            let stem = format!("nameplate_row{:03}", job.row_id);
            match self.compiler.compile_with_stem(&job.resolved, Some(&stem)) {
                Ok(plan) => {
                    job.advance(JobStatus::Queued);
                    queue.push((idx, plan));
                }
                Err(e) => job.end(JobStatus::Rejected, JobReason::Layout { message: e.to_string() }),
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.get()));
        let mut running: JoinSet<Settled> = JoinSet::new();
        let mut queue = queue.into_iter();

        while let Some((idx, plan)) = queue.next() {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break None,
                    Some(joined) = running.join_next(), if !running.is_empty() => {
                        settle(&mut jobs, joined, self.options.job_timeout);
                    }
                    permit = semaphore.clone().acquire_owned() => break permit.ok(),
                }
            };

            let Some(permit) = permit else {
                info!(%run_id, "Batch cancelled; rejecting queued jobs");
                jobs[idx].end(JobStatus::Rejected, JobReason::Cancelled);
                for (rest, _) in queue.by_ref() {
                    jobs[rest].end(JobStatus::Rejected, JobReason::Cancelled);
                }
                break;
            };

            jobs[idx].advance(JobStatus::Running);
            let engine = Arc::clone(&self.engine);
            let timeout = self.options.job_timeout;
            running.spawn(async move {
                let mut handle = tokio::spawn(async move { engine.execute(plan).await });
                let outcome = match tokio::time::timeout(timeout, &mut handle).await {
                    Ok(Ok(result)) => Outcome::Finished(result),
                    Ok(Err(join_err)) => Outcome::Crashed(join_err),
                    Err(_) => {
                        handle.abort();
                        Outcome::TimedOut
                    }
                };
                // The slot is released in `settle`, after the status is final.
                (idx, outcome, permit)
            });
        }

        while let Some(joined) = running.join_next().await {
            settle(&mut jobs, joined, self.options.job_timeout);
        }

        for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Running) {
            job.end(
                JobStatus::Failed,
                JobReason::Engine { failure: EngineFailure::new("worker task lost") },
            );
        }

        let report = BatchReport { run_id, started_at, finished_at: Utc::now(), jobs };
        let summary = report.summary();
        info!(
            %run_id,
            done = summary.done,
            failed = summary.failed,
            rejected = summary.rejected,
            "Batch finished"
        );
        report
    }
}

fn settle(jobs: &mut [BatchJob], joined: Result<Settled, JoinError>, timeout: Duration) {
    let (idx, outcome, _permit) = match joined {
        Ok(settled) => settled,
        Err(e) => {
            warn!(error = %e, "Batch worker did not complete");
            return;
        }
    };
    let job = &mut jobs[idx];
    match outcome {
        Outcome::Finished(Ok(output)) => {
            job.output = Some(output.output_path);
            job.advance(JobStatus::Done);
        }
        Outcome::Finished(Err(failure)) => {
            warn!(row_id = job.row_id, %failure, "Job failed");
            job.end(JobStatus::Failed, JobReason::Engine { failure });
        }
        Outcome::TimedOut => {
            warn!(row_id = job.row_id, "Job timed out");
            job.end(
                JobStatus::Failed,
                JobReason::Timeout { after_ms: timeout.as_millis() as u64 },
            );
        }
        Outcome::Crashed(e) => {
            warn!(row_id = job.row_id, error = %e, "Engine task panicked");
            job.end(
                JobStatus::Failed,
                JobReason::Engine { failure: EngineFailure::new(format!("engine task panicked: {}", e)) },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> BatchJob {
        BatchJob::new(BatchRow { row_id: 1, overrides: DesignPatch::default() }, &DesignModel::default())
    }

    #[test]
    fn test_transitions_are_forward_only() {
        assert!(JobStatus::Pending.allows(JobStatus::Validated));
        assert!(JobStatus::Running.allows(JobStatus::Failed));
        assert!(!JobStatus::Done.allows(JobStatus::Running));
        assert!(!JobStatus::Failed.allows(JobStatus::Pending));
        assert!(!JobStatus::Queued.allows(JobStatus::Validated));
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let mut job = job();
        job.advance(JobStatus::Done);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.history, vec![JobStatus::Pending]);
    }

    #[test]
    fn test_retry_only_from_failed() {
        let mut job = job();
        assert!(job.retry().is_err());

        job.advance(JobStatus::Validated);
        job.advance(JobStatus::Queued);
        job.advance(JobStatus::Running);
        job.end(JobStatus::Failed, JobReason::Timeout { after_ms: 10 });
        job.retry().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.reason.is_none());
    }

    #[test]
    fn test_slot_is_freed_only_after_status_is_final() {
        let semaphore = Arc::new(Semaphore::new(1));
        let permit = semaphore.clone().try_acquire_owned().unwrap();
        let mut jobs = vec![job()];
        jobs[0].advance(JobStatus::Validated);
        jobs[0].advance(JobStatus::Queued);
        jobs[0].advance(JobStatus::Running);
        assert_eq!(semaphore.available_permits(), 0);

        let output = EngineOutput { output_path: PathBuf::from("output/sign.stl") };
        settle(&mut jobs, Ok((0, Outcome::Finished(Ok(output)), permit)), Duration::from_secs(1));

        assert_eq!(jobs[0].status, JobStatus::Done);
        assert_eq!(semaphore.available_permits(), 1);
    }

    #[test]
    fn test_resolved_model_merges_overrides() {
        let row = BatchRow {
            row_id: 7,
            overrides: DesignPatch { line2: Some("102".to_string()), ..DesignPatch::default() },
        };
        let base = DesignModel::default();
        let job = BatchJob::new(row, &base);
        assert_eq!(job.resolved.line2, "102");
        assert_eq!(job.resolved.line1, base.line1);
    }
}
