//! Scheduler - 1 日 1 回の tick 実行
//!
//! 起動直後に 1 回 tick を実行し、以降は毎日決まった時刻（固定オフセット）に実行します。
//! `shutdown` が true になるか送信側が drop されると終了します。tick の途中では止めません。

use std::str::FromStr;

use chrono::{DateTime, Days, FixedOffset, NaiveTime, Offset, TimeDelta, Utc};
use tokio::sync::watch;

use super::orchestrator::Orchestrator;
use crate::domain::SetupError;
use crate::ports::{Clock, RemoteStore, SystemClock};

/// Wall-clock time of day in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
    offset: FixedOffset,
}

impl Default for DailySchedule {
    /// 03:00 at UTC+07:00.
    fn default() -> Self {
        Self {
            at: NaiveTime::MIN + TimeDelta::hours(3),
            offset: FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl DailySchedule {
    pub fn new(at: NaiveTime, offset: FixedOffset) -> Self {
        Self { at, offset }
    }

    /// Parse `HH:MM[:SS]` and `±HH:MM` (or `Z` / `UTC`).
    pub fn parse(at: &str, offset: &str) -> Result<Self, SetupError> {
        let at = at.trim();
        let at = NaiveTime::parse_from_str(at, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(at, "%H:%M"))
            .map_err(|e| SetupError::InvalidConfig {
                field: "run_at",
                message: format!("{at:?}: {e}"),
            })?;

        let offset = offset.trim();
        let offset = match offset {
            "Z" | "z" | "UTC" | "utc" => Some(Utc.fix()),
            other => FixedOffset::from_str(other).ok(),
        }
        .ok_or_else(|| SetupError::InvalidConfig {
            field: "utc_offset",
            message: format!("{offset:?} is not an offset like +07:00"),
        })?;

        Ok(Self { at, offset })
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_now = now.with_timezone(&self.offset).naive_local();
        let mut next = local_now.date().and_time(self.at);
        if next <= local_now {
            next = next + Days::new(1);
        }
        (next - TimeDelta::seconds(self.offset.local_minus_utc().into())).and_utc()
    }
}

pub struct Scheduler<C = SystemClock> {
    schedule: DailySchedule,
    clock: C,
}

impl Scheduler<SystemClock> {
    pub fn new(schedule: DailySchedule) -> Self {
        Self {
            schedule,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> Scheduler<C> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Scheduler<C2> {
        Scheduler {
            schedule: self.schedule,
            clock,
        }
    }

    pub fn schedule(&self) -> DailySchedule {
        self.schedule
    }

    /// Tick now, then once a day until shutdown. Returns the number of ticks run.
    pub async fn run<S, OC>(
        &self,
        orchestrator: &mut Orchestrator<S, OC>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64
    where
        S: RemoteStore,
        OC: Clock,
    {
        let mut ticks = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }
            run_tick(orchestrator).await;
            ticks += 1;

            let now = self.clock.now();
            let next = self.schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(next = %next, wait_secs = wait.as_secs(), "next tick scheduled");

            // shutdown が来たら次の tick を待たずに抜ける
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(ticks, "scheduler stopped");
        ticks
    }
}

async fn run_tick<S: RemoteStore, C: Clock>(orchestrator: &mut Orchestrator<S, C>) {
    match orchestrator.tick().await {
        Ok(report) => tracing::info!(
            phase = %report.phase,
            folder = report.folder.as_deref().unwrap_or("-"),
            downloaded = report.downloaded,
            failed = report.failed,
            deleted = report.sweep.as_ref().map_or(0, |s| s.deleted.len()),
            "tick complete"
        ),
        Err(e) => tracing::error!(error = %e, "tick aborted"),
    }
}
