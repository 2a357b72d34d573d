//! Periodic analysis scheduler.
//!
//! A single actor task owns all scheduler state: the settings, the timer
//! registration in a [`JobScheduler`], and the cycle-in-progress flag. Callers
//! talk to it through a cloneable [`SchedulerHandle`]. A tick that arrives
//! while a cycle is still running is dropped, never queued.

mod cycle;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reelscope_core::SchedulerSettings;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

pub use cycle::{run_cycle, JobProcessor, JobSource, PassProcessor, PgJobSource};
use cycle::CycleGuard;

const COMMAND_BUFFER: usize = 32;
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler task is not running")]
    Unavailable,
    #[error("timer registration failed: {0}")]
    Timer(#[from] JobSchedulerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    Started,
    SkippedInProgress,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    /// A periodic timer is registered.
    pub running: bool,
    pub cycle_in_progress: bool,
    pub enabled: bool,
    pub interval_minutes: u64,
    pub max_jobs_per_cycle: usize,
    pub cycles_started: u64,
    pub last_cycle_started_at: Option<DateTime<Utc>>,
}

enum Command {
    Start {
        settings: SchedulerSettings,
        reply: oneshot::Sender<Result<SchedulerStatus, SchedulerError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<SchedulerStatus, SchedulerError>>,
    },
    Status {
        reply: oneshot::Sender<SchedulerStatus>,
    },
    Tick {
        reply: Option<oneshot::Sender<TickOutcome>>,
    },
}

/// Cloneable front end to the scheduler actor.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Registers the periodic timer and fires one immediate tick. Restarting
    /// replaces the previous timer. With `enabled = false` the settings are
    /// recorded and nothing is scheduled.
    pub async fn start(
        &self,
        settings: SchedulerSettings,
    ) -> Result<SchedulerStatus, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { settings, reply }).await?;
        rx.await.map_err(|_| SchedulerError::Unavailable)?
    }

    /// Cancels future ticks. A cycle already running is left to finish.
    pub async fn stop(&self) -> Result<SchedulerStatus, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        rx.await.map_err(|_| SchedulerError::Unavailable)?
    }

    pub async fn status(&self) -> Result<SchedulerStatus, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| SchedulerError::Unavailable)
    }

    /// Requests a cycle now, subject to the same single-flight rule as timer
    /// ticks.
    pub async fn trigger(&self) -> Result<TickOutcome, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Tick { reply: Some(reply) }).await?;
        rx.await.map_err(|_| SchedulerError::Unavailable)
    }

    /// Waits for the in-flight cycle, if any, to finish. Returns `false`
    /// when a cycle was still running once `timeout` elapsed.
    pub async fn wait_idle(&self, timeout: Duration) -> Result<bool, SchedulerError> {
        let poll = async {
            loop {
                if !self.status().await?.cycle_in_progress {
                    return Ok::<(), SchedulerError>(());
                }
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    async fn send(&self, command: Command) -> Result<(), SchedulerError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| SchedulerError::Unavailable)
    }
}

pub struct CycleScheduler {
    rx: mpsc::Receiver<Command>,
    tick_tx: mpsc::WeakSender<Command>,
    timer: Option<JobScheduler>,
    timer_job: Option<Uuid>,
    settings: SchedulerSettings,
    in_progress: Arc<AtomicBool>,
    source: Arc<dyn JobSource>,
    processor: Arc<dyn JobProcessor>,
    cycles_started: u64,
    last_cycle_started_at: Option<DateTime<Utc>>,
}

impl CycleScheduler {
    /// Spawns the actor in the stopped state and returns its handle.
    pub fn spawn(
        source: Arc<dyn JobSource>,
        processor: Arc<dyn JobProcessor>,
        settings: SchedulerSettings,
    ) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = Self {
            rx,
            tick_tx: tx.downgrade(),
            timer: None,
            timer_job: None,
            settings: settings.clamped(),
            in_progress: Arc::new(AtomicBool::new(false)),
            source,
            processor,
            cycles_started: 0,
            last_cycle_started_at: None,
        };
        tokio::spawn(actor.run());
        SchedulerHandle { tx }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Start { settings, reply } => {
                    let result = self.start(settings).await.map(|()| self.status());
                    let _ = reply.send(result);
                }
                Command::Stop { reply } => {
                    let result = self.stop().await.map(|()| self.status());
                    let _ = reply.send(result);
                }
                Command::Status { reply } => {
                    let _ = reply.send(self.status());
                }
                Command::Tick { reply } => {
                    let outcome = self.tick();
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
            }
        }

        if let Some(mut timer) = self.timer.take() {
            if let Err(e) = timer.shutdown().await {
                tracing::warn!(error = %e, "scheduler: timer shutdown failed");
            }
        }
        tracing::info!("scheduler: actor stopped");
    }

    async fn start(&mut self, settings: SchedulerSettings) -> Result<(), SchedulerError> {
        self.stop().await?;
        self.settings = settings.clamped();

        if !self.settings.enabled {
            tracing::info!("scheduler: analysis disabled; not scheduling cycles");
            return Ok(());
        }

        let timer = match self.timer.as_ref() {
            Some(timer) => timer.clone(),
            None => {
                let timer = JobScheduler::new().await?;
                timer.start().await?;
                self.timer = Some(timer.clone());
                timer
            }
        };

        let period = Duration::from_secs(self.settings.interval_minutes.saturating_mul(60));
        let tick_tx = self.tick_tx.clone();
        let job = Job::new_repeated_async(period, move |_uuid, _lock| {
            let tick_tx = tick_tx.clone();
            Box::pin(async move {
                if let Some(tx) = tick_tx.upgrade() {
                    let _ = tx.send(Command::Tick { reply: None }).await;
                }
            })
        })?;
        self.timer_job = Some(timer.add(job).await?);

        tracing::info!(
            interval_minutes = self.settings.interval_minutes,
            max_jobs_per_cycle = self.settings.max_jobs_per_cycle,
            "scheduler: started"
        );

        self.tick();
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SchedulerError> {
        if let (Some(timer), Some(job_id)) = (self.timer.as_ref(), self.timer_job.take()) {
            timer.remove(&job_id).await?;
            tracing::info!("scheduler: stopped");
        }
        Ok(())
    }

    fn tick(&mut self) -> TickOutcome {
        if !self.settings.enabled {
            return TickOutcome::Disabled;
        }
        if self.in_progress.swap(true, Ordering::SeqCst) {
            tracing::info!("scheduler: cycle still in progress; dropping tick");
            return TickOutcome::SkippedInProgress;
        }

        self.cycles_started += 1;
        self.last_cycle_started_at = Some(Utc::now());
        let guard = CycleGuard::new(Arc::clone(&self.in_progress));
        let source = Arc::clone(&self.source);
        let processor = Arc::clone(&self.processor);
        let max_jobs = self.settings.max_jobs_per_cycle;
        let cycle = self.cycles_started;

        tokio::spawn(async move {
            let _guard = guard;
            tracing::info!(cycle, "scheduler: cycle started");
            run_cycle(source, processor, max_jobs).await;
        });

        TickOutcome::Started
    }

    fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.timer_job.is_some(),
            cycle_in_progress: self.in_progress.load(Ordering::SeqCst),
            enabled: self.settings.enabled,
            interval_minutes: self.settings.interval_minutes,
            max_jobs_per_cycle: self.settings.max_jobs_per_cycle,
            cycles_started: self.cycles_started,
            last_cycle_started_at: self.last_cycle_started_at,
        }
    }
}
