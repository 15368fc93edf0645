use std::collections::HashMap;

use crate::error::{Result, SchedulerError};
use crate::trigger::Trigger;
use crate::types::{Job, JobSnapshot, JobState, JobType};

/// One registered job: metadata, resolved trigger and run state.
#[derive(Debug)]
pub struct Entry {
    pub job: Job,
    pub job_type: JobType,
    pub trigger: Trigger,
    /// Token of the in-flight execution, if any.
    pub running: Option<u64>,
    /// Bumped on every change that invalidates queued fire events.
    pub generation: u64,
}

impl Entry {
    pub fn state(&self) -> JobState {
        if self.running.is_some() {
            JobState::Running
        } else if self.job.next_run.is_none() {
            JobState::Completed
        } else {
            JobState::Scheduled
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.job.id.clone(),
            name: self.job.name.clone(),
            job_type: self.job_type,
            frequency_type: self.trigger.frequency_type(),
            is_active: self.job.is_active,
            state: self.state(),
            last_run: self.job.last_run,
            next_run: self.job.next_run,
        }
    }
}

/// In-memory table of scheduled jobs keyed by job ID.
///
/// Not synchronised on its own: the engine keeps it behind the same mutex
/// as the fire queue so every transition is atomic with respect to firing.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Entry>,
    /// Run tokens of removed jobs whose execution is still in flight.
    /// Re-adding the ID inherits the token.
    detached: HashMap<String, u64>,
    last_generation: u64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.last_generation += 1;
        self.last_generation
    }

    /// Register `job`, replacing any prior registration under the same ID.
    /// A run already in flight for that ID stays tracked.
    ///
    /// Returns the entry's new generation.
    pub fn insert(&mut self, job: Job, job_type: JobType, trigger: Trigger) -> u64 {
        let generation = self.bump();
        let running = match self.jobs.get(&job.id) {
            Some(prior) => prior.running,
            None => self.detached.remove(&job.id),
        };
        self.jobs.insert(
            job.id.clone(),
            Entry {
                job,
                job_type,
                trigger,
                running,
                generation,
            },
        );
        generation
    }

    /// Like [`insert`](Self::insert) but only for an already registered ID.
    pub fn replace(&mut self, job: Job, job_type: JobType, trigger: Trigger) -> Result<u64> {
        if !self.jobs.contains_key(&job.id) {
            return Err(SchedulerError::not_found(&job.id));
        }
        Ok(self.insert(job, job_type, trigger))
    }

    pub fn remove(&mut self, id: &str) -> Result<Entry> {
        let entry = self
            .jobs
            .remove(id)
            .ok_or_else(|| SchedulerError::not_found(id))?;
        if let Some(token) = entry.running {
            self.detached.insert(id.to_string(), token);
        }
        Ok(entry)
    }

    /// Clear the run token `token` for `id`, whether the job is still
    /// registered or was removed mid-run. A stale token is ignored.
    pub fn finish(&mut self, id: &str, token: u64) {
        if let Some(entry) = self.jobs.get_mut(id) {
            if entry.running == Some(token) {
                entry.running = None;
            }
        } else if self.detached.get(id) == Some(&token) {
            self.detached.remove(id);
        }
    }

    /// Toggle the active flag. Activating bumps the generation so the
    /// caller can re-enqueue the retained fire time without duplicates.
    pub fn set_active(&mut self, id: &str, active: bool) -> Result<&Entry> {
        let generation = if active { Some(self.bump()) } else { None };
        let entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| SchedulerError::not_found(id))?;
        entry.job.is_active = active;
        if let Some(generation) = generation {
            entry.generation = generation;
        }
        Ok(entry)
    }

    pub fn lookup(&self, id: &str) -> Option<&Entry> {
        self.jobs.get(id)
    }

    pub fn lookup_mut(&mut self, id: &str) -> Option<&mut Entry> {
        self.jobs.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Snapshots of every entry, sorted by ID for deterministic output.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let mut out: Vec<JobSnapshot> = self.jobs.values().map(Entry::snapshot).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
