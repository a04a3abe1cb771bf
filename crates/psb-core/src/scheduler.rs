//! Cron-driven update runs.
//!
//! Standard 5-field syntax (`min hour dom mon dow`) with `*`, lists, ranges and
//! steps. `7` is accepted as Sunday. When both day fields are restricted, a time
//! matches if either does.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::ChatId,
    errors::Error,
    formatting::format_outcome,
    pipeline::{UpdateOutcome, UpdateService},
    ports::MessagingPort,
    Result,
};

#[derive(Clone)]
pub struct UpdateScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    service: Arc<UpdateService>,
    messenger: Option<Arc<dyn MessagingPort>>,
    expr: CronExpr,
    running: AtomicBool,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl UpdateScheduler {
    pub fn new(
        service: Arc<UpdateService>,
        messenger: Option<Arc<dyn MessagingPort>>,
        cron: &str,
    ) -> Result<Self> {
        let expr = CronExpr::parse(cron)
            .map_err(|e| Error::Config(format!("invalid update cron `{cron}`: {e}")))?;
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                service,
                messenger,
                expr,
                running: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        })
    }

    /// Spawn the timer loop (no-op if already started).
    pub async fn start(&self) {
        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let scheduler = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { scheduler.job_loop(token).await });
        *task = Some((cancel, handle));

        match self.next_run() {
            Some(next) => tracing::info!(next = %next.format("%Y-%m-%d %H:%M"), "scheduler started"),
            None => tracing::warn!("scheduler started but the cron expression never fires"),
        }
    }

    pub async fn stop(&self) {
        let task = self.inner.task.lock().await.take();
        if let Some((cancel, handle)) = task {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    pub fn next_run(&self) -> Option<DateTime<Local>> {
        self.inner.expr.next_after(Local::now())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Run one update pass over all users and notify them.
    ///
    /// Returns `false` without doing anything if a pass is already in progress.
    pub async fn run_once(&self) -> Result<bool> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            tracing::info!("update run already in progress, skipping");
            return Ok(false);
        }
        let res = self.run_and_notify().await;
        self.inner.running.store(false, Ordering::SeqCst);
        res.map(|_| true)
    }

    async fn run_and_notify(&self) -> Result<()> {
        let results = self.inner.service.update_all().await?;
        let Some(messenger) = &self.inner.messenger else {
            return Ok(());
        };
        for (user, res) in results {
            if matches!(
                res,
                Ok(UpdateOutcome::NoChannels | UpdateOutcome::AlreadyRunning)
            ) {
                continue;
            }
            let record = self.inner.service.store().get(user).ok();
            let repo = record.as_ref().and_then(|r| r.repo_name.as_deref());
            let html = format!("🔄 <b>Scheduled update</b>\n{}", format_outcome(repo, &res));
            if let Err(e) = messenger.send_html(ChatId::from(user), &html).await {
                tracing::warn!(user = %user, "failed to notify user: {e}");
            }
        }
        Ok(())
    }

    async fn job_loop(&self, cancel: CancellationToken) {
        loop {
            let Some(next) = self.next_run() else {
                tracing::error!("cron expression has no next run, stopping scheduler");
                break;
            };
            let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(wait) => {
                    tracing::info!("scheduled update run starting");
                    if let Err(e) = self.run_once().await {
                        tracing::error!("scheduled update run failed: {e}");
                    }
                }
            }
        }
    }
}

// === Cron expression engine ===

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronExpr {
    minutes: Field,
    hours: Field,
    days: Field,
    months: Field,
    weekdays: Field,
}

/// Allowed values of one cron field as a bit set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Field {
    bits: u64,
    wildcard: bool,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        let [min, hour, dom, mon, dow] = parts.as_slice() else {
            return Err(Error::Config(format!(
                "expected 5 fields, got {}",
                parts.len()
            )));
        };
        Ok(Self {
            minutes: Field::parse(min, 0, 59)?,
            hours: Field::parse(hour, 0, 23)?,
            days: Field::parse(dom, 1, 31)?,
            months: Field::parse(mon, 1, 12)?,
            weekdays: Field::parse_weekdays(dow)?,
        })
    }

    pub fn matches<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        if !(self.minutes.has(t.minute())
            && self.hours.has(t.hour())
            && self.months.has(t.month()))
        {
            return false;
        }
        let dom = self.days.has(t.day());
        let dow = self.weekdays.has(t.weekday().num_days_from_sunday());
        match (self.days.wildcard, self.weekdays.wildcard) {
            (true, true) => true,
            (true, false) => dow,
            (false, true) => dom,
            (false, false) => dom || dow,
        }
    }

    /// First matching minute strictly after `now`, searching up to one year ahead.
    pub fn next_after<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut t = now.with_second(0)?.with_nanosecond(0)? + chrono::Duration::minutes(1);
        for _ in 0..366 * 24 * 60 {
            if self.matches(&t) {
                return Some(t);
            }
            t = t + chrono::Duration::minutes(1);
        }
        None
    }
}

impl Field {
    fn parse(raw: &str, lo: u32, hi: u32) -> Result<Self> {
        let mut bits = 0u64;
        for part in raw.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((r, s)) => {
                    let step = parse_num(s)?;
                    if step == 0 {
                        return Err(Error::Config("step must be > 0".to_string()));
                    }
                    (r, step)
                }
                None => (part, 1),
            };

            let (start, end) = if range == "*" {
                (lo, hi)
            } else if let Some((a, b)) = range.split_once('-') {
                (parse_num(a)?, parse_num(b)?)
            } else {
                let v = parse_num(range)?;
                // `5/15` means "from 5 every 15".
                (v, if step > 1 { hi } else { v })
            };

            if start < lo || end > hi || start > end {
                return Err(Error::Config(format!(
                    "value out of range {lo}-{hi}: {part}"
                )));
            }
            for v in (start..=end).step_by(step as usize) {
                bits |= 1 << v;
            }
        }

        let full = (lo..=hi).fold(0u64, |acc, v| acc | 1 << v);
        Ok(Self {
            bits,
            wildcard: bits == full,
        })
    }

    fn parse_weekdays(raw: &str) -> Result<Self> {
        let mut f = Self::parse(raw, 0, 7)?;
        if f.bits & (1 << 7) != 0 {
            f.bits = (f.bits & !(1 << 7)) | 1;
        }
        f.wildcard = f.bits == 0x7f;
        Ok(f)
    }

    fn has(&self, v: u32) -> bool {
        v < 64 && self.bits & (1 << v) != 0
    }
}

fn parse_num(s: &str) -> Result<u32> {
    s.trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid number: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn every_six_hours_fires_on_the_hour() {
        let expr = CronExpr::parse("0 */6 * * *").unwrap();
        assert!(expr.matches(&at(2026, 1, 1, 12, 0)));
        assert!(!expr.matches(&at(2026, 1, 1, 13, 0)));
        assert!(!expr.matches(&at(2026, 1, 1, 12, 1)));

        let next = expr.next_after(at(2026, 1, 1, 12, 0)).unwrap();
        assert_eq!(next, at(2026, 1, 1, 18, 0));
    }

    #[test]
    fn next_after_rounds_up_to_the_next_minute() {
        let expr = CronExpr::parse("*/5 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 1, 30).unwrap();
        assert_eq!(expr.next_after(now).unwrap(), at(2026, 1, 1, 10, 5));
    }

    #[test]
    fn lists_ranges_and_offset_steps() {
        let expr = CronExpr::parse("5/20 8-10 1,15 * *").unwrap();
        assert!(expr.matches(&at(2026, 2, 15, 9, 25)));
        assert!(expr.matches(&at(2026, 2, 1, 10, 45)));
        assert!(!expr.matches(&at(2026, 2, 2, 9, 25)));
        assert!(!expr.matches(&at(2026, 2, 1, 11, 5)));
    }

    #[test]
    fn day_fields_match_either_when_both_restricted() {
        // 2026-01-04 is a Sunday.
        let expr = CronExpr::parse("0 0 13 * 7").unwrap();
        assert!(expr.matches(&at(2026, 1, 4, 0, 0)));
        assert!(expr.matches(&at(2026, 1, 13, 0, 0)));
        assert!(!expr.matches(&at(2026, 1, 5, 0, 0)));
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["", "* * * *", "60 * * * *", "* * 0 * *", "*/0 * * * *", "a * * * *", "5-1 * * * *"] {
            assert!(CronExpr::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn impossible_dates_never_fire() {
        let expr = CronExpr::parse("0 0 31 2 *").unwrap();
        assert!(expr.next_after(at(2026, 1, 1, 0, 0)).is_none());
    }
}
