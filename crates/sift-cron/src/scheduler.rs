//! Scheduler loop and manual triggering.
//!
//! The loop sleeps until the earliest fire time in the [`JobRegistry`], fires
//! every due job on its own task and goes back to sleep. A job whose previous
//! run is still active is skipped for that fire, never queued. Each run is
//! spawned under a supervisor task that records the outcome in the registry,
//! so a panicking run marks its job `Failed` and leaves the loop untouched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sift_core::{JobId, RunResult, RunStatus, RunTrigger};
use sift_settings::{ManualTriggerPolicy, ScheduleSettings};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{CronError, Result};
use crate::registry::{JobRegistry, JobState};
use crate::schedule::Schedule;

/// Longest single sleep. Bounds drift when the host clock jumps.
const MAX_SLEEP: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Source of "now" for fire-time decisions.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The host wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that advances with tokio time from a fixed base.
///
/// Under a paused runtime this makes fire times fully deterministic.
#[derive(Clone, Copy, Debug)]
pub struct TokioClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Clock reading `base` right now.
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.origin.elapsed()).map_or(self.base, |elapsed| self.base + elapsed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runner seam
// ─────────────────────────────────────────────────────────────────────────────

/// Executes one run of a job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run `job` to completion. Cancellation is cooperative via `cancel`.
    async fn run(&self, job: &JobId, trigger: RunTrigger, cancel: CancellationToken) -> RunResult;
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    job: JobId,
    result: oneshot::Receiver<Option<RunResult>>,
}

impl RunHandle {
    /// Job the run belongs to.
    pub fn job(&self) -> &JobId {
        &self.job
    }

    /// Wait for the run. `None` when the run panicked or was aborted.
    pub async fn wait(self) -> Option<RunResult> {
        self.result.await.ok().flatten()
    }
}

/// Result of a manual trigger.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A run was started.
    Started(RunHandle),
    /// A run was already active and the policy is to skip.
    Skipped,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

struct Inner {
    registry: Mutex<JobRegistry>,
    runner: Arc<dyn JobRunner>,
    clock: Arc<dyn Clock>,
    manual_policy: ManualTriggerPolicy,
    tasks: Mutex<JoinSet<()>>,
    wake: Notify,
}

/// Fires registered jobs on their cadence.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Scheduler over an already-populated registry, using the system clock.
    pub fn new(registry: JobRegistry, runner: Arc<dyn JobRunner>, manual_policy: ManualTriggerPolicy) -> Self {
        Self::with_clock(registry, runner, manual_policy, Arc::new(SystemClock))
    }

    /// Scheduler with an explicit clock.
    pub fn with_clock(
        registry: JobRegistry,
        runner: Arc<dyn JobRunner>,
        manual_policy: ManualTriggerPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(registry),
                runner,
                clock,
                manual_policy,
                tasks: Mutex::new(JoinSet::new()),
                wake: Notify::new(),
            }),
        }
    }

    /// Build from schedule settings, registering every enabled job.
    pub fn from_settings(settings: &ScheduleSettings, runner: Arc<dyn JobRunner>) -> Result<Self> {
        let registry = JobRegistry::from_settings(settings, Utc::now())?;
        Ok(Self::new(registry, runner, settings.manual_trigger))
    }

    /// Register another job while the loop is running.
    pub fn register(&self, id: JobId, schedule: Schedule) -> Result<()> {
        let now = self.inner.clock.now();
        self.inner.registry.lock().register(id, schedule, now)?;
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Registered job ids.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.inner.registry.lock().ids()
    }

    /// Point-in-time state of every job.
    pub fn snapshot(&self) -> Vec<JobState> {
        self.inner.registry.lock().snapshot()
    }

    /// Run the loop until `shutdown` fires, then wait for active runs.
    ///
    /// Active runs receive a child of `shutdown`, so they observe the same
    /// cancellation and stop at their next checkpoint.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(jobs = self.inner.registry.lock().len(), "scheduler started");
        loop {
            self.fire_due(&shutdown);
            let sleep_for = self.sleep_duration();
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(sleep_for) => {}
                () = self.inner.wake.notified() => {}
            }
        }
        info!("scheduler stopping, waiting for active runs");
        self.drain().await;
        info!("scheduler stopped");
    }

    /// Start `job` now, outside its cadence.
    ///
    /// While a run is active this returns [`CronError::AlreadyRunning`] or
    /// [`TriggerOutcome::Skipped`] depending on the manual trigger policy.
    pub fn trigger_now(&self, job: &JobId, cancel: CancellationToken) -> Result<TriggerOutcome> {
        match self.inner.start(job, RunTrigger::Manual, cancel) {
            Ok(handle) => Ok(TriggerOutcome::Started(handle)),
            Err(CronError::AlreadyRunning(id)) => match self.inner.manual_policy {
                ManualTriggerPolicy::Reject => Err(CronError::AlreadyRunning(id)),
                ManualTriggerPolicy::Skip => {
                    info!(job = %id, "manual trigger skipped, run already active");
                    Ok(TriggerOutcome::Skipped)
                }
            },
            Err(e) => Err(e),
        }
    }

    /// Wait for every active run to finish.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "run supervisor failed");
            }
        }
    }

    fn fire_due(&self, shutdown: &CancellationToken) {
        let now = self.inner.clock.now();
        let due = {
            let mut registry = self.inner.registry.lock();
            let due = registry.due(now);
            for id in &due {
                if let Err(e) = registry.advance(id, now) {
                    warn!(job = %id, error = %e, "failed to advance schedule");
                }
            }
            due
        };

        for id in due {
            match self.inner.start(&id, RunTrigger::Scheduled, shutdown.child_token()) {
                Ok(_) => metrics::counter!("sift_job_fires_total", "outcome" => "started").increment(1),
                Err(CronError::AlreadyRunning(_)) => {
                    warn!(job = %id, "previous run still active, skipping this fire");
                    metrics::counter!("sift_job_fires_total", "outcome" => "skipped").increment(1);
                }
                Err(e) => warn!(job = %id, error = %e, "failed to start scheduled run"),
            }
        }
    }

    fn sleep_duration(&self) -> Duration {
        let now = self.inner.clock.now();
        self.inner
            .registry
            .lock()
            .next_wake()
            .map_or(MAX_SLEEP, |wake| (wake - now).to_std().unwrap_or(Duration::ZERO))
            .min(MAX_SLEEP)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.inner.registry.lock().len())
            .field("manual_policy", &self.inner.manual_policy)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn start(self: &Arc<Self>, job: &JobId, trigger: RunTrigger, cancel: CancellationToken) -> Result<RunHandle> {
        self.registry.lock().try_begin(job, self.clock.now())?;
        info!(job = %job, ?trigger, "run started");

        let run = {
            let runner = Arc::clone(&self.runner);
            let job = job.clone();
            tokio::spawn(async move { runner.run(&job, trigger, cancel).await })
        };

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(self);
        let supervised = job.clone();
        let supervisor = async move {
            let (outcome, result) = match run.await {
                Ok(result) => (run_outcome(&result), Some(result)),
                Err(e) if e.is_panic() => {
                    warn!(job = %supervised, "run panicked");
                    (Err("run panicked".to_string()), None)
                }
                Err(_) => (Err("run aborted".to_string()), None),
            };
            if let Some(result) = &result {
                info!(job = %supervised, status = %result.status, "run finished");
            }
            let now = inner.clock.now();
            if let Err(e) = inner.registry.lock().finish(&supervised, outcome, now) {
                warn!(job = %supervised, error = %e, "failed to record run outcome");
            }
            let _ = tx.send(result);
        };

        let mut tasks = self.tasks.lock();
        while tasks.try_join_next().is_some() {}
        let _ = tasks.spawn(supervisor);

        Ok(RunHandle {
            job: job.clone(),
            result: rx,
        })
    }
}

fn run_outcome(result: &RunResult) -> std::result::Result<(), String> {
    match result.status {
        RunStatus::Success | RunStatus::Degraded => Ok(()),
        RunStatus::Failed => Err(result.error.clone().unwrap_or_else(|| "failed".to_string())),
        RunStatus::Cancelled => Err("cancelled".to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveTime, TimeZone};
    use chrono_tz::Tz;
    use sift_core::RunId;

    use crate::registry::JobPhase;

    fn result(job: &JobId, trigger: RunTrigger, status: RunStatus, at: DateTime<Utc>) -> RunResult {
        RunResult {
            run_id: RunId::new(),
            job_id: Some(job.clone()),
            trigger,
            started_at: at,
            finished_at: at,
            duration_ms: 0,
            status,
            payload: None,
            outcomes: vec![],
            warnings: vec![],
            error: (status == RunStatus::Failed).then(|| "all channels failed".to_string()),
        }
    }

    /// Records calls; blocks on `gate` when gated; panics for job `boom`.
    struct TestRunner {
        clock: TokioClock,
        calls: Mutex<Vec<(JobId, RunTrigger, DateTime<Utc>)>>,
        gate: Option<Arc<Notify>>,
        status: RunStatus,
    }

    impl TestRunner {
        fn new(clock: TokioClock) -> Self {
            Self {
                clock,
                calls: Mutex::new(Vec::new()),
                gate: None,
                status: RunStatus::Success,
            }
        }

        fn gated(clock: TokioClock, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(clock)
            }
        }

        fn calls(&self) -> Vec<(JobId, RunTrigger, DateTime<Utc>)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl JobRunner for TestRunner {
        async fn run(&self, job: &JobId, trigger: RunTrigger, _cancel: CancellationToken) -> RunResult {
            let now = self.clock.now();
            self.calls.lock().push((job.clone(), trigger, now));
            assert!(job.as_str() != "boom", "runner exploded");
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            result(job, trigger, self.status, now)
        }
    }

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    fn registry(jobs: &[(&str, Schedule)], now: DateTime<Utc>) -> JobRegistry {
        let mut r = JobRegistry::new(Tz::UTC);
        for (id, schedule) in jobs {
            r.register(JobId::from(*id), *schedule, now).unwrap();
        }
        r
    }

    fn every(minutes: u64) -> Schedule {
        Schedule::Interval {
            every: Duration::from_secs(minutes * 60),
        }
    }

    fn daily(h: u32, m: u32) -> Schedule {
        Schedule::Daily {
            at: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
        }
    }

    fn scheduler(
        jobs: &[(&str, Schedule)],
        runner: Arc<TestRunner>,
        policy: ManualTriggerPolicy,
    ) -> Scheduler {
        let clock = runner.clock;
        Scheduler::with_clock(registry(jobs, clock.now()), runner, policy, Arc::new(clock))
    }

    // -- scheduled firing --

    #[tokio::test(start_paused = true)]
    async fn daily_job_fires_at_wall_clock_time() {
        let clock = TokioClock::starting_at(t(8, 0));
        let runner = Arc::new(TestRunner::new(clock));
        let sched = scheduler(&[("daily", daily(9, 0))], runner.clone(), ManualTriggerPolicy::Reject);

        let shutdown = CancellationToken::new();
        let loop_task = tokio::spawn({
            let sched = sched.clone();
            let shutdown = shutdown.clone();
            async move { sched.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
        shutdown.cancel();
        loop_task.await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, RunTrigger::Scheduled);
        assert_eq!(calls[0].2, t(9, 0));

        let snap = sched.snapshot();
        assert_eq!(snap[0].phase, JobPhase::Succeeded { at: t(9, 0) });
        assert_eq!(snap[0].next_fire, Some(Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_job_fires_repeatedly() {
        let clock = TokioClock::starting_at(t(8, 0));
        let runner = Arc::new(TestRunner::new(clock));
        let sched = scheduler(&[("tick", every(10))], runner.clone(), ManualTriggerPolicy::Reject);

        let shutdown = CancellationToken::new();
        let loop_task = tokio::spawn({
            let sched = sched.clone();
            let shutdown = shutdown.clone();
            async move { sched.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_secs(35 * 60)).await;
        shutdown.cancel();
        loop_task.await.unwrap();

        let times: Vec<_> = runner.calls().into_iter().map(|c| c.2).collect();
        assert_eq!(times, vec![t(8, 10), t(8, 20), t(8, 30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_fire_is_skipped_not_queued() {
        let clock = TokioClock::starting_at(t(8, 0));
        let gate = Arc::new(Notify::new());
        let runner = Arc::new(TestRunner::gated(clock, gate.clone()));
        let sched = scheduler(&[("tick", every(1))], runner.clone(), ManualTriggerPolicy::Reject);

        let shutdown = CancellationToken::new();
        let loop_task = tokio::spawn({
            let sched = sched.clone();
            let shutdown = shutdown.clone();
            async move { sched.run(shutdown).await }
        });

        // Fires at 8:01 (runs), 8:02 and 8:03 (skipped).
        tokio::time::sleep(Duration::from_secs(210)).await;
        assert_eq!(runner.calls().len(), 1);
        let snap = sched.snapshot();
        assert!(snap[0].phase.is_running());
        assert_eq!(snap[0].skipped, 2);

        gate.notify_one();
        shutdown.cancel();
        loop_task.await.unwrap();
        assert_eq!(runner.calls().len(), 1);
        assert_matches!(sched.snapshot()[0].phase, JobPhase::Succeeded { .. });
    }

    // -- manual triggers --

    #[tokio::test(start_paused = true)]
    async fn manual_trigger_runs_immediately() {
        let clock = TokioClock::starting_at(t(8, 0));
        let runner = Arc::new(TestRunner::new(clock));
        let sched = scheduler(&[("daily", daily(9, 0))], runner.clone(), ManualTriggerPolicy::Reject);

        let outcome = sched.trigger_now(&"daily".into(), CancellationToken::new()).unwrap();
        let TriggerOutcome::Started(handle) = outcome else {
            panic!("expected a started run");
        };
        assert_eq!(handle.job().as_str(), "daily");
        let result = handle.wait().await.unwrap();
        assert_eq!(result.trigger, RunTrigger::Manual);
        assert_eq!(runner.calls()[0].2, t(8, 0));
        // Manual runs leave the cadence alone.
        assert_eq!(sched.snapshot()[0].next_fire, Some(t(9, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_trigger_while_running_rejected() {
        let clock = TokioClock::starting_at(t(8, 0));
        let gate = Arc::new(Notify::new());
        let runner = Arc::new(TestRunner::gated(clock, gate.clone()));
        let sched = scheduler(&[("daily", daily(9, 0))], runner.clone(), ManualTriggerPolicy::Reject);

        let TriggerOutcome::Started(handle) = sched.trigger_now(&"daily".into(), CancellationToken::new()).unwrap()
        else {
            panic!("expected a started run");
        };
        assert_matches!(
            sched.trigger_now(&"daily".into(), CancellationToken::new()),
            Err(CronError::AlreadyRunning(_))
        );

        gate.notify_one();
        assert!(handle.wait().await.is_some());
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(sched.snapshot()[0].skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_trigger_while_running_skipped() {
        let clock = TokioClock::starting_at(t(8, 0));
        let gate = Arc::new(Notify::new());
        let runner = Arc::new(TestRunner::gated(clock, gate.clone()));
        let sched = scheduler(&[("daily", daily(9, 0))], runner.clone(), ManualTriggerPolicy::Skip);

        let TriggerOutcome::Started(handle) = sched.trigger_now(&"daily".into(), CancellationToken::new()).unwrap()
        else {
            panic!("expected a started run");
        };
        assert_matches!(
            sched.trigger_now(&"daily".into(), CancellationToken::new()),
            Ok(TriggerOutcome::Skipped)
        );

        gate.notify_one();
        assert!(handle.wait().await.is_some());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_trigger_unknown_job() {
        let clock = TokioClock::starting_at(t(8, 0));
        let runner = Arc::new(TestRunner::new(clock));
        let sched = scheduler(&[("daily", daily(9, 0))], runner, ManualTriggerPolicy::Reject);
        assert_matches!(
            sched.trigger_now(&"weekly".into(), CancellationToken::new()),
            Err(CronError::UnknownJob(_))
        );
    }

    // -- failure isolation --

    #[tokio::test(start_paused = true)]
    async fn panicking_run_marks_job_failed_and_others_continue() {
        let clock = TokioClock::starting_at(t(8, 0));
        let runner = Arc::new(TestRunner::new(clock));
        let sched = scheduler(
            &[("boom", daily(9, 0)), ("daily", daily(9, 0))],
            runner.clone(),
            ManualTriggerPolicy::Reject,
        );

        let TriggerOutcome::Started(handle) = sched.trigger_now(&"boom".into(), CancellationToken::new()).unwrap()
        else {
            panic!("expected a started run");
        };
        assert!(handle.wait().await.is_none());

        let snap = sched.snapshot();
        let boom = snap.iter().find(|j| j.id.as_str() == "boom").unwrap();
        assert_matches!(boom.phase, JobPhase::Failed { ref error, .. } if error == "run panicked");

        let TriggerOutcome::Started(handle) = sched.trigger_now(&"daily".into(), CancellationToken::new()).unwrap()
        else {
            panic!("expected a started run");
        };
        assert_eq!(handle.wait().await.unwrap().status, RunStatus::Success);

        // A failed job can run again.
        assert_matches!(
            sched.trigger_now(&"boom".into(), CancellationToken::new()),
            Ok(TriggerOutcome::Started(_))
        );
        sched.drain().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_recorded_with_error() {
        let clock = TokioClock::starting_at(t(8, 0));
        let runner = Arc::new(TestRunner {
            status: RunStatus::Failed,
            ..TestRunner::new(clock)
        });
        let sched = scheduler(&[("daily", daily(9, 0))], runner, ManualTriggerPolicy::Reject);

        let TriggerOutcome::Started(handle) = sched.trigger_now(&"daily".into(), CancellationToken::new()).unwrap()
        else {
            panic!("expected a started run");
        };
        let _ = handle.wait().await;
        assert_matches!(
            sched.snapshot()[0].phase,
            JobPhase::Failed { ref error, .. } if error == "all channels failed"
        );
    }

    // -- shutdown --

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_and_waits_for_active_runs() {
        struct CancelAware {
            clock: TokioClock,
        }

        #[async_trait]
        impl JobRunner for CancelAware {
            async fn run(&self, job: &JobId, trigger: RunTrigger, cancel: CancellationToken) -> RunResult {
                cancel.cancelled().await;
                result(job, trigger, RunStatus::Cancelled, self.clock.now())
            }
        }

        let clock = TokioClock::starting_at(t(8, 0));
        let sched = Scheduler::with_clock(
            registry(&[("tick", every(1))], clock.now()),
            Arc::new(CancelAware { clock }),
            ManualTriggerPolicy::Reject,
            Arc::new(clock),
        );

        let shutdown = CancellationToken::new();
        let loop_task = tokio::spawn({
            let sched = sched.clone();
            let shutdown = shutdown.clone();
            async move { sched.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(sched.snapshot()[0].phase.is_running());

        shutdown.cancel();
        loop_task.await.unwrap();
        assert_matches!(
            sched.snapshot()[0].phase,
            JobPhase::Failed { ref error, .. } if error == "cancelled"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn register_while_running_wakes_loop() {
        let clock = TokioClock::starting_at(t(8, 0));
        let runner = Arc::new(TestRunner::new(clock));
        let sched = scheduler(&[], runner.clone(), ManualTriggerPolicy::Reject);

        let shutdown = CancellationToken::new();
        let loop_task = tokio::spawn({
            let sched = sched.clone();
            let shutdown = shutdown.clone();
            async move { sched.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        sched.register("late".into(), every(1)).unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        shutdown.cancel();
        loop_task.await.unwrap();

        assert_eq!(runner.calls().len(), 1);
        assert_eq!(sched.job_ids(), vec![JobId::from("late")]);
    }
}
