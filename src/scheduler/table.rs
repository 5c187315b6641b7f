use super::cron_expr::{next_fire_after, parse_cron};
use crate::error::EngineResult;
use crate::store::BackupJob;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

struct ScheduledJob {
    job: BackupJob,
    schedule: Schedule,
    next_fire: Option<DateTime<Utc>>,
}

/// In-memory registry of active jobs and their next fire times.
///
/// Time is always passed in, so the table can be driven by a simulated clock.
#[derive(Default)]
pub struct ScheduleTable {
    jobs: HashMap<Uuid, ScheduledJob>,
}

impl ScheduleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `job`, computing its next fire time from `now`.
    /// Inactive jobs are removed instead. Returns the next fire time.
    pub fn upsert(
        &mut self,
        job: BackupJob,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<DateTime<Utc>>> {
        self.upsert_with_next(job, now, None)
    }

    /// Like `upsert`, but keeps a previously persisted fire time. A persisted
    /// time in the past makes the job due immediately.
    pub fn upsert_with_next(
        &mut self,
        job: BackupJob,
        now: DateTime<Utc>,
        persisted_next: Option<DateTime<Utc>>,
    ) -> EngineResult<Option<DateTime<Utc>>> {
        if !job.is_active {
            self.jobs.remove(&job.id);
            return Ok(None);
        }
        let schedule = parse_cron(&job.cron_expression)?;
        let next_fire = persisted_next.or_else(|| next_fire_after(&schedule, now));
        self.jobs.insert(
            job.id,
            ScheduledJob {
                job,
                schedule,
                next_fire,
            },
        );
        Ok(next_fire)
    }

    pub fn remove(&mut self, job_id: Uuid) -> bool {
        self.jobs.remove(&job_id).is_some()
    }

    pub fn contains(&self, job_id: Uuid) -> bool {
        self.jobs.contains_key(&job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn next_fire(&self, job_id: Uuid) -> Option<DateTime<Utc>> {
        self.jobs.get(&job_id).and_then(|j| j.next_fire)
    }

    /// Recomputes the next fire time of `job_id` from `now`.
    pub fn reschedule(&mut self, job_id: Uuid, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let entry = self.jobs.get_mut(&job_id)?;
        entry.next_fire = next_fire_after(&entry.schedule, now);
        entry.next_fire
    }

    /// Jobs whose fire time is at or before `now`. Each due job fires once no
    /// matter how many windows were missed; its next fire time moves to the
    /// first slot after `now`.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<(BackupJob, Option<DateTime<Utc>>)> {
        let mut due = Vec::new();
        for entry in self.jobs.values_mut() {
            if matches!(entry.next_fire, Some(next) if next <= now) {
                entry.next_fire = next_fire_after(&entry.schedule, now);
                due.push((entry.job.clone(), entry.next_fire));
            }
        }
        due
    }

    /// How long until the earliest fire time, capped at `max_idle`.
    pub fn time_until_next(&self, now: DateTime<Utc>, max_idle: Duration) -> Duration {
        self.jobs
            .values()
            .filter_map(|j| j.next_fire)
            .min()
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(max_idle)
            .min(max_idle)
    }
}
