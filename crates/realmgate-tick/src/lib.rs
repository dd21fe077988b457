//! Fixed-timestep tick scheduler for Realmgate.
//!
//! The world advances in fixed steps (default 30 Hz): move entities,
//! sweep admission deadlines, flush replicated state. This crate only
//! decides when a step is due and how long it took; it never sees what a
//! step does.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(event) = events.recv() => handle(event),
//!         tick = scheduler.wait_for_tick() => {
//!             world.tick(tick.dt_secs(), tick.tick);
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! All timing goes through Tokio's clock, so paused-clock tests are exact.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Reaction to a tick that woke up late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Forget the missed ticks; the next one is a full period from now.
    #[default]
    Skip,
    /// Fire missed ticks immediately, at most `max_catchup` of them.
    CatchUp { max_catchup: u32 },
    /// Keep the original deadlines as if nothing happened.
    Drop,
}

/// Fractions of the tick period at which work time gets reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetThresholds {
    pub warn: f64,
    pub critical: f64,
}

impl Default for BudgetThresholds {
    fn default() -> Self {
        Self {
            warn: 0.8,
            critical: 1.0,
        }
    }
}

impl BudgetThresholds {
    /// Both in `0.0..=1.0`, `warn <= critical`.
    fn normalized(self) -> Self {
        let critical = self.critical.clamp(0.0, 1.0);
        Self {
            warn: self.warn.clamp(0.0, critical),
            critical,
        }
    }

    pub fn classify(&self, utilization: f64) -> BudgetLevel {
        if utilization >= self.critical {
            BudgetLevel::Critical
        } else if utilization >= self.warn {
            BudgetLevel::Warn
        } else {
            BudgetLevel::Ok
        }
    }
}

/// How much of its period a tick's work used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BudgetLevel {
    #[default]
    Ok,
    Warn,
    Critical,
}

#[derive(Debug, Clone)]
pub struct TickConfig {
    pub tick_rate_hz: u32,
    pub policy: TickPolicy,
    pub budget: BudgetThresholds,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self::at_rate(Self::DEFAULT_TICK_RATE_HZ)
    }
}

impl TickConfig {
    pub const DEFAULT_TICK_RATE_HZ: u32 = 30;
    pub const MIN_TICK_RATE_HZ: u32 = 1;
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    pub fn at_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            policy: TickPolicy::default(),
            budget: BudgetThresholds::default(),
        }
    }

    /// Pulls the rate into `MIN_TICK_RATE_HZ..=MAX_TICK_RATE_HZ` (the
    /// world has no idle mode, so it can never be zero) and orders the
    /// budget thresholds.
    pub fn normalized(self) -> Self {
        let rate = self
            .tick_rate_hz
            .clamp(Self::MIN_TICK_RATE_HZ, Self::MAX_TICK_RATE_HZ);
        if rate != self.tick_rate_hz {
            warn!(requested = self.tick_rate_hz, rate, "tick rate out of range");
        }
        Self {
            tick_rate_hz: rate,
            policy: self.policy,
            budget: self.budget.normalized(),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}

/// A tick that is due, as handed out by
/// [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// 1 for the first tick, then +1 each time.
    pub tick: u64,
    /// Always one period. Movement integrates by this, not by wall time.
    pub dt: Duration,
    pub overrun: bool,
    /// Ticks given up under [`TickPolicy::Skip`] or past the catch-up cap.
    pub skipped: u64,
}

impl TickInfo {
    pub fn dt_secs(&self) -> f32 {
        self.dt.as_secs_f32()
    }
}

/// Counters kept by the scheduler. Work time is measured from
/// `wait_for_tick` returning to `record_tick_end`.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub ticks: u64,
    pub overruns: u64,
    pub skipped: u64,
    /// Exponential moving average of work time.
    pub avg_work: Duration,
    pub max_work: Duration,
    /// Last work time divided by the period.
    pub last_utilization: f64,
    pub last_level: BudgetLevel,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// A tick later than `period / OVERRUN_TOLERANCE` is an overrun.
const OVERRUN_TOLERANCE: u32 = 10;

/// Weight of the newest sample in `avg_work`.
const EMA_ALPHA: f64 = 0.1;

struct Reschedule {
    next: Instant,
    skipped: u64,
}

/// Fixed-timestep tick scheduler. One per authority loop.
#[derive(Debug)]
pub struct TickScheduler {
    config: TickConfig,
    period: Duration,
    tick_count: u64,
    deadline: Instant,
    /// Set by `wait_for_tick`, taken by `record_tick_end`.
    work_started: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Creates a scheduler whose first tick fires one tick from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.normalized();
        let period = config.period();

        debug!(
            rate_hz = config.tick_rate_hz,
            budget_ms = period.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "tick scheduler created"
        );

        Self {
            config,
            period,
            tick_count: 0,
            deadline: Instant::now() + period,
            work_started: None,
            metrics: TickMetrics::default(),
        }
    }

    /// Waits until the next tick is due.
    ///
    /// Cancel-safe: nothing is updated until the sleep has completed, so a
    /// `select!` that drops this future loses no tick.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let scheduled = self.deadline;
        time::sleep_until(scheduled).await;

        let woke = Instant::now();
        let late_by = woke.saturating_duration_since(scheduled);
        let overrun = late_by > self.period / OVERRUN_TOLERANCE;

        self.tick_count += 1;
        self.work_started = Some(woke);

        let Reschedule { next, skipped } = self.reschedule(scheduled, woke, late_by, overrun);
        self.deadline = next;

        self.metrics.ticks += 1;
        self.metrics.skipped += skipped;
        if overrun {
            self.metrics.overruns += 1;
        }
        trace!(tick = self.tick_count, overrun, skipped, "tick fired");

        TickInfo {
            tick: self.tick_count,
            dt: self.period,
            overrun,
            skipped,
        }
    }

    /// Applies the overrun policy to pick the next deadline.
    fn reschedule(
        &self,
        scheduled: Instant,
        woke: Instant,
        late_by: Duration,
        overrun: bool,
    ) -> Reschedule {
        let period = self.period;
        let missed = (late_by.as_nanos() / period.as_nanos()) as u64;
        let late_ms = late_by.as_secs_f64() * 1000.0;

        match self.config.policy {
            TickPolicy::Skip => {
                let skipped = if overrun { missed } else { 0 };
                if skipped > 0 {
                    warn!(tick = self.tick_count, skipped, late_ms, "tick overrun, skipping ahead");
                }
                Reschedule {
                    next: woke + period,
                    skipped,
                }
            }
            TickPolicy::CatchUp { max_catchup } => {
                let cap = u64::from(max_catchup);
                let skipped = if overrun { missed.saturating_sub(cap) } else { 0 };
                if overrun && missed > 0 {
                    warn!(
                        tick = self.tick_count,
                        behind = missed,
                        catching_up = missed.min(cap),
                        skipped,
                        "tick overrun, catching up"
                    );
                }
                let next = if missed <= cap {
                    scheduled + period
                } else {
                    woke + period
                };
                Reschedule { next, skipped }
            }
            TickPolicy::Drop => {
                if overrun {
                    warn!(tick = self.tick_count, late_ms, "tick overrun, keeping cadence");
                }
                Reschedule {
                    next: scheduled + period,
                    skipped: 0,
                }
            }
        }
    }

    /// Marks the end of the current tick's work and logs it if it ran
    /// close to or past its period. Does nothing outside a tick.
    pub fn record_tick_end(&mut self) {
        let Some(started) = self.work_started.take() else {
            return;
        };
        let worked = started.elapsed();
        let utilization = worked.as_secs_f64() / self.period.as_secs_f64();
        let level = self.config.budget.classify(utilization);

        let m = &mut self.metrics;
        m.last_utilization = utilization;
        m.last_level = level;
        m.max_work = m.max_work.max(worked);
        m.avg_work = Duration::from_secs_f64(
            m.avg_work.as_secs_f64() * (1.0 - EMA_ALPHA) + worked.as_secs_f64() * EMA_ALPHA,
        );

        if level == BudgetLevel::Ok {
            return;
        }
        let worked_ms = worked.as_secs_f64() * 1000.0;
        let budget_ms = self.period.as_secs_f64() * 1000.0;
        if level == BudgetLevel::Critical {
            warn!(tick = self.tick_count, worked_ms, budget_ms, "tick exceeded its budget");
        } else {
            warn!(tick = self.tick_count, worked_ms, budget_ms, "tick close to its budget");
        }
    }

    /// Number of ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
