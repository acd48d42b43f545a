//! Cron-driven scheduler for background jobs.
//!
//! # Schedule Configuration
//!
//! ```json
//! {
//!   "alerts": {
//!     "enabled": true,
//!     "schedule_cron": "0 * 13-21 * * Mon-Fri"
//!   },
//!   "heatmap": {
//!     "enabled": true,
//!     "schedule_cron": "0 0 22 * * Mon-Fri"
//!   }
//! }
//! ```
//!
//! Expressions use the six-field `cron` crate syntax (seconds first) and are
//! evaluated in UTC. The alert default fires every minute from 13:00 to 21:59
//! UTC on weekdays, which covers US market hours; the heatmap default runs
//! once a day after the close.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

/// Default polling period of the scheduler loop
const CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// A unit of work run by a [`CronScheduler`].
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Job name for logging
    fn name(&self) -> &'static str;

    /// Run once. `Err` carries the reason the run counts as failed.
    async fn run_scheduled(&self) -> std::result::Result<(), String>;
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Scheduler not started, or its loop has exited
    Stopped,
    /// Scheduler loop running
    Running,
    /// Loop alive but skipping runs (e.g., market holiday)
    Paused,
}

/// Runs a job on a cron schedule.
///
/// Runs are awaited inline on the scheduler task, so a slow run delays the
/// next one rather than overlapping it.
pub struct CronScheduler {
    job: Arc<dyn ScheduledJob>,
    schedule: Schedule,
    state: Arc<RwLock<SchedulerState>>,
    /// Scheduled instant of the last executed run
    last_execution: Arc<RwLock<Option<DateTime<Utc>>>>,
    /// Consecutive failed runs
    failure_count: Arc<RwLock<u32>>,
    /// Failure count that raises an error log
    alert_threshold: u32,
    check_interval: Duration,
}

impl CronScheduler {
    pub fn new(job: Arc<dyn ScheduledJob>, cron_expression: &str, alert_threshold: u32) -> Result<Self> {
        let schedule = Schedule::from_str(cron_expression)
            .with_context(|| format!("Invalid schedule for {}: {cron_expression}", job.name()))?;

        Ok(Self {
            job,
            schedule,
            state: Arc::new(RwLock::new(SchedulerState::Stopped)),
            last_execution: Arc::new(RwLock::new(None)),
            failure_count: Arc::new(RwLock::new(0)),
            alert_threshold: alert_threshold.max(1),
            check_interval: CHECK_INTERVAL,
        })
    }

    /// Override how often the loop checks for a due run
    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Get current scheduler state
    pub async fn get_state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Stop the scheduler; the loop exits at its next tick
    pub async fn stop(&self) {
        *self.state.write().await = SchedulerState::Stopped;
        info!(job = self.job.name(), "Scheduler stopped");
    }

    /// Pause a running scheduler (e.g., for holidays).
    ///
    /// Returns false, leaving the state unchanged, unless it was `Running`.
    pub async fn pause(&self) -> bool {
        self.transition(SchedulerState::Running, SchedulerState::Paused).await
    }

    /// Resume a paused scheduler.
    ///
    /// Returns false, leaving the state unchanged, unless it was `Paused`.
    /// A stopped scheduler has no loop left to resume; call `run` instead.
    pub async fn resume(&self) -> bool {
        self.transition(SchedulerState::Paused, SchedulerState::Running).await
    }

    async fn transition(&self, from: SchedulerState, to: SchedulerState) -> bool {
        let mut state = self.state.write().await;
        if *state != from {
            debug!(job = self.job.name(), current = ?*state, requested = ?to, "Scheduler transition ignored");
            return false;
        }
        *state = to;
        info!(job = self.job.name(), state = ?to, "Scheduler state changed");
        true
    }

    /// Run the scheduler loop until stopped.
    pub async fn run(&self) {
        *self.state.write().await = SchedulerState::Running;
        info!(job = self.job.name(), next = ?self.next_run(), "Scheduler started");

        let mut check_interval = interval(self.check_interval);

        loop {
            check_interval.tick().await;

            let current_state = *self.state.read().await;
            match current_state {
                SchedulerState::Stopped => break,
                SchedulerState::Paused => continue,
                SchedulerState::Running => {
                    self.tick(Utc::now()).await;
                }
            }
        }

        info!(job = self.job.name(), "Scheduler loop exited");
    }

    /// Execute the job if a run is due at `now`.
    ///
    /// Returns true when the job ran.
    pub async fn tick(&self, now: DateTime<Utc>) -> bool {
        let Some(scheduled) = self.due_at(now).await else {
            return false;
        };

        *self.last_execution.write().await = Some(scheduled);
        debug!(job = self.job.name(), scheduled = %scheduled, "Running scheduled job");

        match self.job.run_scheduled().await {
            Ok(()) => *self.failure_count.write().await = 0,
            Err(reason) => self.track_failure(&reason).await,
        }
        true
    }

    /// The most recent scheduled instant within the last minute that has
    /// not been executed yet.
    async fn due_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let last_exec = *self.last_execution.read().await;
        let after = now - chrono::Duration::seconds(60);

        let mut due = None;
        for scheduled in self.schedule.after(&after).take(10) {
            if scheduled > now {
                break;
            }
            if last_exec.is_some_and(|last| last >= scheduled) {
                continue; // Already executed
            }
            due = Some(scheduled);
        }
        due
    }

    async fn track_failure(&self, reason: &str) {
        let failure_count = {
            let mut failures = self.failure_count.write().await;
            *failures += 1;
            *failures
        };

        if failure_count >= self.alert_threshold {
            error!(
                job = self.job.name(),
                failure_count,
                threshold = self.alert_threshold,
                last_error = %reason,
                "ALERT: Scheduled job failure threshold exceeded! Backing store may need attention."
            );

            // Reset count after alert to avoid spam
            *self.failure_count.write().await = 0;
        }
    }

    /// Consecutive failed runs since the last success or threshold alert
    pub async fn consecutive_failures(&self) -> u32 {
        *self.failure_count.read().await
    }

    /// Next scheduled run
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_scheduled(&self) -> std::result::Result<(), String> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err("store locked".into())
            } else {
                Ok(())
            }
        }
    }

    fn scheduler(cron: &str) -> (Arc<CountingJob>, CronScheduler) {
        let job = Arc::new(CountingJob::default());
        let scheduler = CronScheduler::new(job.clone(), cron, 3).unwrap();
        (job, scheduler)
    }

    async fn wait_for_state(scheduler: &CronScheduler, expected: SchedulerState) {
        for _ in 0..200 {
            if scheduler.get_state().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("scheduler never reached {expected:?}");
    }

    #[test]
    fn test_default_crons_parse() {
        assert!(Schedule::from_str("0 * 13-21 * * Mon-Fri").is_ok());
        assert!(Schedule::from_str("0 0 22 * * Mon-Fri").is_ok());
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let job: Arc<dyn ScheduledJob> = Arc::new(CountingJob::default());
        assert!(CronScheduler::new(job, "not a cron", 5).is_err());
    }

    #[tokio::test]
    async fn test_tick_runs_once_per_scheduled_minute() {
        let (job, scheduler) = scheduler("0 * * * * *");
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 5).unwrap();

        assert!(scheduler.tick(base).await);
        // Same minute, ten seconds later: already executed
        assert!(!scheduler.tick(base + chrono::Duration::seconds(10)).await);
        // Next minute
        assert!(scheduler.tick(base + chrono::Duration::seconds(60)).await);
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tick_outside_window_does_nothing() {
        // Weekdays 13:00-21:59 UTC only; this is a Sunday
        let (_job, scheduler) = scheduler("0 * 13-21 * * Mon-Fri");
        let sunday = Utc.with_ymd_and_hms(2024, 3, 3, 15, 0, 30).unwrap();
        assert!(!scheduler.tick(sunday).await);

        let monday_evening = Utc.with_ymd_and_hms(2024, 3, 4, 23, 0, 30).unwrap();
        assert!(!scheduler.tick(monday_evening).await);

        let monday_session = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 30).unwrap();
        assert!(scheduler.tick(monday_session).await);
    }

    #[tokio::test]
    async fn test_failures_counted_and_reset() {
        let (job, scheduler) = scheduler("0 * * * * *");
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 5).unwrap();

        job.failing.store(true, Ordering::SeqCst);
        scheduler.tick(base).await;
        scheduler.tick(base + chrono::Duration::seconds(60)).await;
        assert_eq!(scheduler.consecutive_failures().await, 2);

        // Third failure reaches the threshold and resets the counter
        scheduler.tick(base + chrono::Duration::seconds(120)).await;
        assert_eq!(scheduler.consecutive_failures().await, 0);

        scheduler.tick(base + chrono::Duration::seconds(180)).await;
        assert_eq!(scheduler.consecutive_failures().await, 1);
        job.failing.store(false, Ordering::SeqCst);
        scheduler.tick(base + chrono::Duration::seconds(240)).await;
        assert_eq!(scheduler.consecutive_failures().await, 0);
    }

    #[tokio::test]
    async fn test_stopped_scheduler_cannot_be_resumed_or_paused() {
        let (_job, scheduler) = scheduler("0 * * * * *");
        assert_eq!(scheduler.get_state().await, SchedulerState::Stopped);

        assert!(!scheduler.resume().await);
        assert!(!scheduler.pause().await);
        assert_eq!(scheduler.get_state().await, SchedulerState::Stopped);
        assert!(scheduler.next_run().is_some());
    }

    #[tokio::test]
    async fn test_pause_resume_stop_with_live_loop() {
        let (_job, scheduler) = scheduler("0 * * * * *");
        let scheduler = Arc::new(scheduler.with_check_interval(Duration::from_millis(10)));

        let handle = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.run().await }
        });
        wait_for_state(&scheduler, SchedulerState::Running).await;

        assert!(scheduler.pause().await);
        assert_eq!(scheduler.get_state().await, SchedulerState::Paused);
        assert!(!scheduler.pause().await);

        assert!(scheduler.resume().await);
        assert_eq!(scheduler.get_state().await, SchedulerState::Running);

        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should exit after stop")
            .unwrap();

        // The loop is gone; resuming must not claim it is running again
        assert!(!scheduler.resume().await);
        assert_eq!(scheduler.get_state().await, SchedulerState::Stopped);
    }
}
