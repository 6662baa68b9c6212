//! Attendance ledger, regularization workflow and the read models derived
//! from them.
//!
//! [`AttendanceEngine`] is the single entry point used by the HTTP layer.
//! Each operation lives in its own module as an `impl AttendanceEngine` block.

pub mod approval;
pub mod dashboard;
pub mod ledger;
pub mod regularization;
pub mod stats;
pub mod streak;

use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;

use crate::store::{AttendanceStore, Calendar, Directory};
use crate::utils::{clock::Clock, dashboard_cache::DashboardCache};

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSettings {
    /// Start of the school day in local time.
    pub start_time: NaiveTime,
    pub grace_minutes: u32,
    /// Check-outs below this many hours downgrade the day to HALF_DAY.
    pub half_day_hours: f64,
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            grace_minutes: 15,
            half_day_hours: 4.0,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

#[derive(Clone)]
pub struct AttendanceEngine {
    store: Arc<dyn AttendanceStore>,
    calendar: Arc<dyn Calendar>,
    directory: Arc<dyn Directory>,
    clock: Arc<dyn Clock>,
    cache: DashboardCache,
    settings: AttendanceSettings,
}

impl AttendanceEngine {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        calendar: Arc<dyn Calendar>,
        directory: Arc<dyn Directory>,
        clock: Arc<dyn Clock>,
        cache: DashboardCache,
        settings: AttendanceSettings,
    ) -> Self {
        Self {
            store,
            calendar,
            directory,
            clock,
            cache,
            settings,
        }
    }

    /// Engine over a backend that serves the ledger, calendar and directory at once.
    pub fn with_backend<B>(
        backend: B,
        clock: Arc<dyn Clock>,
        cache: DashboardCache,
        settings: AttendanceSettings,
    ) -> Self
    where
        B: AttendanceStore + Calendar + Directory + Clone + 'static,
    {
        Self::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(backend),
            clock,
            cache,
            settings,
        )
    }

    pub fn settings(&self) -> &AttendanceSettings {
        &self.settings
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}

/// Rounds to two decimals, the precision of every stored percentage.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::model::{member::Member, role::Role};
    use crate::store::memory::MemoryStore;
    use crate::utils::clock::FixedClock;
    use std::time::Duration;

    pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Engine over `store` with the clock pinned to `date` at `hh:mm`.
    pub fn engine_at(store: &MemoryStore, date: NaiveDate, hh: u32, mm: u32) -> AttendanceEngine {
        let now = date.and_hms_opt(hh, mm, 0).unwrap().and_utc();
        AttendanceEngine::with_backend(
            store.clone(),
            Arc::new(FixedClock::new(now)),
            DashboardCache::new(1_000, Duration::from_secs(60)),
            AttendanceSettings::default(),
        )
    }

    pub fn member(user_id: u64, name: &str, role: Role) -> Member {
        Member {
            user_id,
            name: name.to_string(),
            role,
            class_id: None,
            class_name: None,
            section: None,
        }
    }

    pub fn student(user_id: u64, name: &str, class_id: u64, class_name: &str) -> Member {
        Member {
            class_id: Some(class_id),
            class_name: Some(class_name.to_string()),
            section: Some("A".to_string()),
            ..member(user_id, name, Role::Student)
        }
    }
}
