//! `job`
//!
//! The record of the current (or most recent) plot job.
//!
//! There is only ever one job. The record is shared between the [`crate::Supervisor`], the
//! background thread that follows the tool's output, and anything that asks for a status
//! snapshot, so every access goes through the one mutex inside [`JobState`]. Writes made on
//! behalf of a running process carry that process's generation and are dropped if the job
//! has since been cancelled or replaced.

use std::{
    process::Child,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use serde::Serialize;
use tempfile::TempDir;

use crate::output::{ExitOutcome, ProgressSample};

/// A drawing tool process owned by the job.
#[derive(Debug, Clone)]
pub(crate) struct RunningProcess {
    /// The generation of the job that launched this process.
    pub(crate) generation: u64,
    /// The operating system id of the process.
    pub(crate) pid: u32,
    /// The child handle, shared with the job's output reader.
    pub(crate) child: Arc<Mutex<Child>>,
}

impl RunningProcess {
    /// Whether the process has not exited yet.
    pub(crate) fn is_alive(&self) -> bool {
        let mut child = lock_child(&self.child);
        matches!(child.try_wait(), Ok(None))
    }
}

/// Locks a child handle, ignoring poisoning.
pub(crate) fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The state of the current or most recent job.
#[derive(Debug, Default)]
pub struct Job {
    /// The running tool process, if any.
    pub(crate) process: Option<RunningProcess>,
    /// Incremented for every launched job.
    pub(crate) generation: u64,
    /// Name of the design being (or last) plotted.
    pub(crate) file: Option<String>,
    /// Progress in percent, `None` when unknown.
    pub(crate) progress: Option<f64>,
    /// When the job started.
    pub(crate) started_at: Option<Instant>,
    /// When the job stopped, `None` while it is running.
    pub(crate) ended_at: Option<Instant>,
    /// Elapsed time reported by the tool, preferred over the wall clock.
    pub(crate) elapsed_override: Option<f64>,
    /// Distance drawn (or estimated) in mm.
    pub(crate) distance_mm: Option<f64>,
    /// Diagnostic text of the last failure.
    pub(crate) error: Option<String>,
    /// Plotter model selected for the job.
    pub(crate) device_model: Option<String>,
    /// Temporary directory holding the working copy of the design.
    pub(crate) workspace: Option<TempDir>,
}

impl Job {
    /// Whether `generation` still identifies the job's running process.
    pub(crate) fn owns(&self, generation: u64) -> bool {
        self.process
            .as_ref()
            .is_some_and(|process| process.generation == generation)
    }

    /// Whether the job's process exists and is still running.
    pub(crate) fn is_running(&self) -> bool {
        self.process.as_ref().is_some_and(RunningProcess::is_alive)
    }

    /// Records everything learned from one line of output.
    pub(crate) fn apply_sample(&mut self, sample: &ProgressSample) {
        // Progress only moves forward within a job.
        if let Some(percent) = sample.percent {
            self.progress = Some(self.progress.map_or(percent, |current| current.max(percent)));
        }
        if let Some(seconds) = sample.elapsed_seconds {
            #[allow(clippy::cast_precision_loss)]
            let seconds = seconds as f64;
            self.elapsed_override = Some(seconds);
        }
        if let Some(distance_mm) = sample.distance_mm {
            self.distance_mm = Some(distance_mm);
        }
    }

    /// Marks the job as stopped with the given outcome.
    pub(crate) fn finish(&mut self, outcome: &ExitOutcome) {
        self.process = None;
        self.ended_at = Some(Instant::now());
        match outcome {
            ExitOutcome::Completed => {
                self.progress = Some(100.0);
                self.error = None;
            }
            ExitOutcome::Failed(message) => {
                self.progress = None;
                self.error = Some(message.clone());
            }
        }
    }

    /// Builds the status snapshot reported to the dashboard.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Builds the status snapshot as of `now`.
    fn snapshot_at(&self, now: Instant) -> StatusSnapshot {
        let running = self.is_running();
        // The process has exited but its reader has not recorded the outcome yet.
        let settling = !running && self.process.is_some();

        #[allow(clippy::float_cmp)]
        let progress = self
            .progress
            .filter(|&progress| running || settling || progress == 100.0);

        let mut elapsed_seconds = self.started_at.map(|started_at| {
            self.ended_at
                .filter(|_| !running)
                .unwrap_or(now)
                .duration_since(started_at)
                .as_secs_f64()
        });
        if self.started_at.is_some() && self.elapsed_override.is_some() {
            elapsed_seconds = self.elapsed_override;
        }

        StatusSnapshot {
            running,
            file: self.file.clone(),
            progress,
            elapsed_seconds,
            distance_mm: self.distance_mm,
            error: self.error.clone(),
        }
    }
}

/// What the dashboard is told about the job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Whether the tool is currently running.
    pub running: bool,
    /// Name of the design being (or last) plotted.
    pub file: Option<String>,
    /// Progress in percent. Only reported while running, or once complete.
    pub progress: Option<f64>,
    /// Seconds the job has been (or was) running.
    pub elapsed_seconds: Option<f64>,
    /// Distance drawn (or estimated) in mm.
    pub distance_mm: Option<f64>,
    /// Diagnostic text of the last failure.
    pub error: Option<String>,
}

/// Shared handle to the job record.
#[derive(Debug, Clone, Default)]
pub struct JobState {
    /// The job record.
    inner: Arc<Mutex<Job>>,
}

impl JobState {
    /// Creates a handle to an empty job record.
    pub fn new() -> Self {
        JobState::default()
    }

    /// Locks the job record.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Job> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes a consistent snapshot of the job for status reporting.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().snapshot()
    }

    /// The plotter model of the current or last job.
    pub fn device_model(&self) -> Option<String> {
        self.lock().device_model.clone()
    }

    /// Applies a sample from the output of the process launched by `generation`.
    ///
    /// # Returns
    /// `false` if the job no longer belongs to that process and nothing was written.
    pub(crate) fn apply_sample(&self, generation: u64, sample: &ProgressSample) -> bool {
        let mut job = self.lock();
        if !job.owns(generation) {
            return false;
        }
        job.apply_sample(sample);
        true
    }

    /// Records the end of the process launched by `generation`.
    ///
    /// # Returns
    /// `false` if the job no longer belongs to that process and nothing was written.
    pub(crate) fn finish(&self, generation: u64, outcome: &ExitOutcome) -> bool {
        let mut job = self.lock();
        if !job.owns(generation) {
            return false;
        }
        job.finish(outcome);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn stopped_job() -> (Job, Instant) {
        let started_at = Instant::now();
        let job = Job {
            file: Some("logo.svg".to_string()),
            started_at: Some(started_at),
            ended_at: Some(started_at + Duration::from_secs(12)),
            ..Job::default()
        };
        (job, started_at)
    }

    #[test]
    fn test_snapshot_of_empty_job() {
        let snapshot = JobState::new().snapshot();
        assert_eq!(
            snapshot,
            StatusSnapshot {
                running: false,
                file: None,
                progress: None,
                elapsed_seconds: None,
                distance_mm: None,
                error: None,
            }
        );
    }

    #[test]
    fn test_snapshot_freezes_elapsed_at_end() {
        let (job, started_at) = stopped_job();
        let snapshot = job.snapshot_at(started_at + Duration::from_secs(60));
        assert_eq!(snapshot.elapsed_seconds, Some(12.0));
        assert!(!snapshot.running);
    }

    #[test]
    fn test_snapshot_prefers_reported_elapsed() {
        let (mut job, started_at) = stopped_job();
        job.elapsed_override = Some(7.0);
        assert_eq!(job.snapshot_at(started_at).elapsed_seconds, Some(7.0));
    }

    #[test]
    fn test_snapshot_hides_stale_progress() {
        let (mut job, _) = stopped_job();
        job.progress = Some(42.0);
        assert_eq!(job.snapshot().progress, None, "partial progress of a stopped job");

        job.progress = Some(100.0);
        assert_eq!(job.snapshot().progress, Some(100.0), "complete job");
    }

    #[test]
    fn test_finish_records_outcome() {
        let (mut job, _) = stopped_job();
        job.progress = Some(40.0);
        job.finish(&ExitOutcome::Failed("No NextDraw found".to_string()));
        assert_eq!(job.progress, None);
        assert_eq!(job.error.as_deref(), Some("No NextDraw found"));

        job.finish(&ExitOutcome::Completed);
        assert_eq!(job.progress, Some(100.0));
        assert_eq!(job.error, None);
    }

    #[test]
    fn test_writes_without_a_process_are_dropped() {
        let state = JobState::new();
        let sample = ProgressSample {
            percent: Some(50.0),
            ..ProgressSample::default()
        };
        assert!(!state.apply_sample(0, &sample));
        assert!(!state.finish(0, &ExitOutcome::Completed));
        assert_eq!(state.lock().progress, None);
    }

    #[test]
    fn test_progress_never_goes_backwards() {
        let (mut job, _) = stopped_job();
        job.progress = Some(0.0);
        job.apply_sample(&ProgressSample::from_line("Progress: 80%"));
        job.apply_sample(&ProgressSample::from_line("Progress: 20%"));
        assert_eq!(job.progress, Some(80.0), "lower reading after a higher one");
        job.apply_sample(&ProgressSample::from_line("95%"));
        assert_eq!(job.progress, Some(95.0), "higher reading");
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_while_outcome_is_pending() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        child.wait().unwrap();
        let started_at = Instant::now();
        let job = Job {
            process: Some(RunningProcess {
                generation: 1,
                pid: child.id(),
                child: Arc::new(Mutex::new(child)),
            }),
            generation: 1,
            progress: Some(60.0),
            started_at: Some(started_at),
            ..Job::default()
        };

        let snapshot = job.snapshot_at(started_at + Duration::from_secs(9));
        assert!(!snapshot.running);
        assert_eq!(snapshot.progress, Some(60.0));
        assert_eq!(snapshot.elapsed_seconds, Some(9.0));
    }

    #[test]
    fn test_apply_sample_overwrites_metrics() {
        let (mut job, _) = stopped_job();
        job.apply_sample(&ProgressSample::from_line("Progress: 20%"));
        job.apply_sample(&ProgressSample::from_line("Elapsed: 0:05 Distance: 2 cm"));
        assert_eq!(job.progress, Some(20.0));
        assert_eq!(job.elapsed_override, Some(5.0));
        assert_eq!(job.distance_mm, Some(20.0));
    }

    #[test]
    fn test_snapshot_serializes_for_the_dashboard() {
        let (mut job, started_at) = stopped_job();
        job.progress = Some(100.0);
        job.distance_mm = Some(250.5);
        let json = serde_json::to_string(&job.snapshot_at(started_at)).unwrap();
        insta::assert_snapshot!(
            json,
            @r#"{"running":false,"file":"logo.svg","progress":100.0,"elapsed_seconds":12.0,"distance_mm":250.5,"error":null}"#
        );
    }
}
