use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tempo_core::config::SchedulerConfig;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clock::{Clock, SystemClock},
    dispatcher::JobExecutionDispatcher,
    error::{Result, SchedulerError, StoreError},
    recorder::ExecutionRecorder,
    registry::{Entry, JobRegistry},
    store::JobStore,
    trigger::{self, Trigger},
    types::{ExecutionStatus, FrequencyType, Job, JobSnapshot, JobType},
};

/// A pending fire time. Ordered by instant so the queue pops the earliest.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct FireEvent {
    at: DateTime<Utc>,
    generation: u64,
    job_id: String,
}

/// Everything an execution task needs, captured at fire time.
#[derive(Debug)]
struct Launch {
    job_id: String,
    name: String,
    job_type: JobType,
    token: u64,
    fired_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    registry: JobRegistry,
    queue: BinaryHeap<Reverse<FireEvent>>,
    last_token: u64,
}

impl State {
    fn enqueue(&mut self, at: DateTime<Utc>, generation: u64, job_id: &str) {
        self.queue.push(Reverse(FireEvent {
            at,
            generation,
            job_id: job_id.to_string(),
        }));
    }

    /// Pop every event due at `now` and decide what each one does.
    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<Launch> {
        let mut launches = Vec::new();
        while self.queue.peek().is_some_and(|Reverse(ev)| ev.at <= now) {
            let Some(Reverse(ev)) = self.queue.pop() else {
                break;
            };
            if let Some(launch) = self.fire(ev, now) {
                launches.push(launch);
            }
        }
        launches
    }

    fn fire(&mut self, ev: FireEvent, now: DateTime<Utc>) -> Option<Launch> {
        let Some(entry) = self.registry.lookup_mut(&ev.job_id) else {
            debug!(job_id = %ev.job_id, "dropping fire event for removed job");
            return None;
        };
        if entry.generation != ev.generation {
            return None;
        }

        if !entry.job.is_active {
            if entry.trigger.is_recurring() {
                entry.job.next_run = entry.trigger.next_fire_after(now);
                if let Some(at) = entry.job.next_run {
                    self.queue.push(Reverse(FireEvent {
                        at,
                        generation: ev.generation,
                        job_id: ev.job_id,
                    }));
                }
            }
            debug!(job_id = %entry.job.id, "job paused, fire event skipped");
            return None;
        }

        entry.job.next_run = entry.trigger.next_fire_after(now);
        if let Some(at) = entry.job.next_run {
            self.queue.push(Reverse(FireEvent {
                at,
                generation: ev.generation,
                job_id: ev.job_id.clone(),
            }));
        }

        if entry.running.is_some() {
            warn!(
                job_id = %entry.job.id,
                name = %entry.job.name,
                "previous execution still running, fire event skipped"
            );
            return None;
        }

        self.last_token += 1;
        entry.running = Some(self.last_token);
        entry.job.last_run = Some(now);
        Some(Launch {
            job_id: ev.job_id,
            name: entry.job.name.clone(),
            job_type: entry.job_type,
            token: self.last_token,
            fired_at: now,
        })
    }
}

struct Inner {
    state: Mutex<State>,
    dispatcher: JobExecutionDispatcher,
    recorder: Arc<dyn ExecutionRecorder>,
    clock: Arc<dyn Clock>,
    permits: Semaphore,
    wake: Notify,
    tracker: TaskTracker,
    max_idle: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn execute(&self, launch: Launch) {
        let Ok(_permit) = self.permits.acquire().await else {
            warn!(job_id = %launch.job_id, "concurrency limiter closed, execution abandoned");
            self.finish(&launch);
            return;
        };

        let started = Instant::now();
        let execution_id = match self
            .recorder
            .on_start(&launch.job_id, launch.job_type, launch.fired_at)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                let id = Uuid::new_v4().to_string();
                warn!(job_id = %launch.job_id, execution_id = %id, "failed to record execution start: {e}");
                id
            }
        };

        info!(
            job_id = %launch.job_id,
            name = %launch.name,
            job_type = %launch.job_type,
            %execution_id,
            "executing job"
        );

        let outcome = self
            .dispatcher
            .execute(launch.job_type, &launch.job_id)
            .await;
        let duration = started.elapsed().as_secs();

        let (status, message) = match outcome {
            Ok(()) => {
                info!(job_id = %launch.job_id, %execution_id, duration_secs = duration, "job completed");
                (ExecutionStatus::Success, "Job completed successfully".to_string())
            }
            Err(e) => {
                error!(job_id = %launch.job_id, %execution_id, duration_secs = duration, "job failed: {e}");
                (ExecutionStatus::Error, format!("Job failed: {e}"))
            }
        };

        if let Err(e) = self
            .recorder
            .on_finish(&execution_id, status, Some(message), duration)
            .await
        {
            warn!(job_id = %launch.job_id, %execution_id, "failed to record execution end: {e}");
        }

        self.finish(&launch);
    }

    fn finish(&self, launch: &Launch) {
        self.lock().registry.finish(&launch.job_id, launch.token);
    }
}

/// Outcome of [`SchedulerEngine::restore_all`].
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: usize,
    /// Jobs that failed validation, with the reason.
    pub failed: Vec<(String, String)>,
}

/// The scheduling and execution engine.
///
/// Cheap to clone: every clone drives the same registry. One clone runs the
/// timer loop ([`run`](Self::run)); the others register and observe jobs.
#[derive(Clone)]
pub struct SchedulerEngine {
    inner: Arc<Inner>,
}

impl SchedulerEngine {
    pub fn new(
        dispatcher: JobExecutionDispatcher,
        recorder: Arc<dyn ExecutionRecorder>,
        config: &SchedulerConfig,
    ) -> Self {
        Self::with_clock(dispatcher, recorder, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        dispatcher: JobExecutionDispatcher,
        recorder: Arc<dyn ExecutionRecorder>,
        config: &SchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                dispatcher,
                recorder,
                clock,
                permits: Semaphore::new(config.max_concurrency.max(1)),
                wake: Notify::new(),
                tracker: TaskTracker::new(),
                max_idle: Duration::from_secs(config.max_idle_secs.max(1)),
            }),
        }
    }

    /// Register a job. An existing registration with the same ID is replaced.
    pub fn add(&self, job: Job) -> Result<JobSnapshot> {
        let now = self.inner.clock.now();
        let (job_type, trigger) = self.admit(&job, now)?;
        self.install(job, job_type, trigger, now, false)
    }

    /// Re-register a job loaded from persistent state. Interval triggers
    /// are anchored at the job's `last_run` when it has one.
    pub fn restore(&self, job: Job) -> Result<JobSnapshot> {
        let now = self.inner.clock.now();
        let anchor = job.last_run.unwrap_or(now);
        let (job_type, trigger) = self.admit(&job, anchor)?;
        self.install(job, job_type, trigger, now, false)
    }

    /// Replace the trigger and metadata of a registered job.
    pub fn update(&self, job: Job) -> Result<JobSnapshot> {
        let now = self.inner.clock.now();
        let (job_type, trigger) = self.admit(&job, now)?;
        self.install(job, job_type, trigger, now, true)
    }

    pub fn pause(&self, id: &str) -> Result<JobSnapshot> {
        let mut state = self.inner.lock();
        let snapshot = state.registry.set_active(id, false)?.snapshot();
        info!(job_id = %id, "job paused");
        Ok(snapshot)
    }

    /// Reactivate a job. The fire time it held while paused is kept.
    pub fn resume(&self, id: &str) -> Result<JobSnapshot> {
        let snapshot = {
            let mut state = self.inner.lock();
            let entry = state.registry.set_active(id, true)?;
            let (generation, next_run, snapshot) =
                (entry.generation, entry.job.next_run, entry.snapshot());
            if let Some(at) = next_run {
                state.enqueue(at, generation, id);
            }
            snapshot
        };
        self.inner.wake.notify_one();
        info!(job_id = %id, next_run = ?snapshot.next_run, "job resumed");
        Ok(snapshot)
    }

    /// Unregister a job. A run already in flight still completes and is
    /// recorded; no further fires happen for this ID.
    pub fn remove(&self, id: &str) -> Result<()> {
        let entry = self.inner.lock().registry.remove(id)?;
        info!(job_id = %id, name = %entry.job.name, "job removed");
        Ok(())
    }

    /// Restore every active job from `store`. A job that fails validation
    /// is logged and reported; the others are still restored.
    pub async fn restore_all(
        &self,
        store: &dyn JobStore,
    ) -> std::result::Result<RestoreReport, StoreError> {
        let jobs = store.list_active_jobs().await?;
        let mut report = RestoreReport::default();
        for job in jobs {
            let id = job.id.clone();
            match self.restore(job) {
                Ok(snapshot) => {
                    debug!(job_id = %id, next_run = ?snapshot.next_run, "job restored");
                    report.restored += 1;
                }
                Err(e) => {
                    error!(job_id = %id, "failed to restore job: {e}");
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        info!(
            restored = report.restored,
            failed = report.failed.len(),
            "jobs restored from store"
        );
        Ok(report)
    }

    pub fn snapshot(&self, id: &str) -> Option<JobSnapshot> {
        self.inner.lock().registry.lookup(id).map(Entry::snapshot)
    }

    /// Snapshots of every registered job, sorted by ID.
    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.inner.lock().registry.snapshots()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().registry.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().registry.is_empty()
    }

    /// Timer loop. Fires due jobs until `shutdown` broadcasts `true`, then
    /// waits for in-flight executions.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(jobs = self.len(), "scheduler engine started");
        loop {
            let wait = self.fire_due();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.inner.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
        self.drain().await;
    }

    /// Stop accepting executions and wait for those in flight.
    pub async fn drain(&self) {
        let tracker = &self.inner.tracker;
        tracker.close();
        if !tracker.is_empty() {
            info!(in_flight = tracker.len(), "waiting for running executions");
        }
        tracker.wait().await;
        info!("scheduler engine stopped");
    }

    /// Launch everything due and return how long to sleep.
    fn fire_due(&self) -> Duration {
        let now = self.inner.clock.now();
        let (launches, next_at) = {
            let mut state = self.inner.lock();
            let launches = state.take_due(now);
            let next_at = state.queue.peek().map(|Reverse(ev)| ev.at);
            (launches, next_at)
        };

        for launch in launches {
            let inner = Arc::clone(&self.inner);
            self.inner
                .tracker
                .spawn(async move { inner.execute(launch).await });
        }

        next_at
            .map(|at| (at - now).to_std().unwrap_or_default())
            .map_or(self.inner.max_idle, |wait| wait.min(self.inner.max_idle))
    }

    /// Validate a job without touching the registry.
    fn admit(&self, job: &Job, anchor: DateTime<Utc>) -> Result<(JobType, Trigger)> {
        let job_type: JobType = job.job_type.parse().map_err(SchedulerError::validation)?;
        if !self.inner.dispatcher.supports(job_type) {
            return Err(SchedulerError::validation(format!(
                "no task body registered for job type {job_type}"
            )));
        }
        let frequency_type: FrequencyType = job
            .frequency_type
            .parse()
            .map_err(SchedulerError::validation)?;
        let trigger = trigger::resolve(frequency_type, &job.frequency_config, anchor)?;
        Ok((job_type, trigger))
    }

    fn install(
        &self,
        mut job: Job,
        job_type: JobType,
        trigger: Trigger,
        now: DateTime<Utc>,
        replace: bool,
    ) -> Result<JobSnapshot> {
        let id = job.id.clone();
        job.next_run = trigger.next_fire_after(now);
        if job.next_run.is_none() {
            warn!(job_id = %id, name = %job.name, "run date already passed, job will not fire");
        }

        let snapshot = {
            let mut state = self.inner.lock();
            if job.last_run.is_none() {
                job.last_run = state.registry.lookup(&id).and_then(|e| e.job.last_run);
            }
            let next_run = job.next_run;
            let generation = if replace {
                state.registry.replace(job, job_type, trigger)?
            } else {
                state.registry.insert(job, job_type, trigger)
            };
            if let Some(at) = next_run {
                state.enqueue(at, generation, &id);
            }
            state
                .registry
                .lookup(&id)
                .map(Entry::snapshot)
                .ok_or_else(|| SchedulerError::not_found(&id))?
        };

        self.inner.wake.notify_one();
        info!(
            job_id = %id,
            name = %snapshot.name,
            %job_type,
            frequency = %snapshot.frequency_type,
            next_run = ?snapshot.next_run,
            "job {}",
            if replace { "updated" } else { "scheduled" }
        );
        Ok(snapshot)
    }
}
