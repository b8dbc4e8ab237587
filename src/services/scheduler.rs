//! Unattended daily and weekly scans.
//!
//! Each job sleeps until its next fixed time-of-day, runs one scan of every
//! configured provider, and goes back to sleep. A failed run is logged and
//! waits for the next tick; there is no retry or backoff. The scan
//! service's in-flight guard keeps a slow run from overlapping the next
//! tick or an on-demand scan.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Utc, Weekday};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::model::ScanType;
use crate::services::scan_service::ScanService;

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub daily_at: NaiveTime,
    pub weekly_day: Weekday,
    pub weekly_at: NaiveTime,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: hm(2, 0),
            weekly_day: Weekday::Sun,
            weekly_at: hm(3, 0),
        }
    }
}

pub(crate) fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Daily,
    Weekly,
}

impl JobKind {
    fn name(&self) -> &'static str {
        match self {
            JobKind::Daily => "daily",
            JobKind::Weekly => "weekly",
        }
    }
}

pub fn spawn_scheduled_scans(scans: Arc<ScanService>, settings: Arc<Settings>) {
    tokio::spawn(job_loop(JobKind::Daily, scans.clone(), settings.clone()));
    tokio::spawn(job_loop(JobKind::Weekly, scans, settings));
}

async fn job_loop(kind: JobKind, scans: Arc<ScanService>, settings: Arc<Settings>) {
    loop {
        let now = Utc::now();
        let next = match kind {
            JobKind::Daily => next_daily(now, settings.schedule.daily_at),
            JobKind::Weekly => next_weekly(
                now,
                settings.schedule.weekly_day,
                settings.schedule.weekly_at,
            ),
        };
        let wait = (next - now).to_std().unwrap_or_default();
        debug!("{} scan sleeping until {next}", kind.name());
        tokio::time::sleep(wait).await;
        run_scheduled_scan(kind.name(), &scans, &settings).await;
    }
}

async fn run_scheduled_scan(name: &str, scans: &ScanService, settings: &Settings) {
    let providers = settings.configured_providers();
    if providers.is_empty() {
        warn!("{name} scan skipped: no providers configured");
        return;
    }

    let adapters: Result<Vec<_>, _> = providers
        .iter()
        .map(|provider| settings.adapter_for(*provider))
        .collect();
    let adapters = match adapters {
        Ok(adapters) => adapters,
        Err(e) => {
            error!("{name} scan could not build adapters: {e}");
            return;
        }
    };

    match scans.scan_all(adapters, ScanType::Scheduled).await {
        Ok(outcome) if outcome.success => {
            info!(
                "{name} scan completed: {} assets, {:.2} month-to-date",
                outcome.assets.len(),
                outcome.cost_summary.total_cost
            );
        }
        Ok(outcome) => {
            warn!(
                "{name} scan finished with {} provider failures",
                outcome.errors.len()
            );
        }
        // Covers the overlap guard; the next tick will try again.
        Err(e) => error!("{name} scan not started: {e}"),
    }
}

fn next_daily(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

fn next_weekly(now: DateTime<Utc>, day: Weekday, at: NaiveTime) -> DateTime<Utc> {
    let mut candidate = next_daily(now, at);
    while candidate.weekday() != day {
        candidate += ChronoDuration::days(1);
    }
    candidate
}
