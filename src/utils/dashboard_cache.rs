use chrono::NaiveDate;
use moka::{PredicateError, future::Cache};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::dashboard::Dashboard;
use crate::model::{attendance::AttendanceStatus, role::Role};
use crate::utils::clock::month_bounds;

/// Dates a dashboard was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Day(NaiveDate),
    Range(NaiveDate, NaiveDate),
}

impl Window {
    pub fn start(&self) -> NaiveDate {
        match *self {
            Window::Day(date) => date,
            Window::Range(from, _) => from,
        }
    }

    /// Target date of the overview and trend sections.
    pub fn end(&self) -> NaiveDate {
        match *self {
            Window::Day(date) => date,
            Window::Range(_, to) => to,
        }
    }

    /// True when a write on `date` can change a dashboard built for this window.
    pub fn touches_month_of(&self, date: NaiveDate) -> bool {
        let (first, _) = month_bounds(self.start());
        let (_, last) = month_bounds(self.end());
        date >= first && date <= last
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DashboardKey {
    pub school_id: u64,
    pub window: Window,
    pub role: Option<Role>,
    pub class_id: Option<u64>,
    /// Detail list selection.
    pub status: Option<AttendanceStatus>,
    pub page: u64,
    pub limit: u64,
}

/// Read-through cache owned by the dashboard aggregator.
#[derive(Clone)]
pub struct DashboardCache {
    inner: Cache<DashboardKey, Arc<Dashboard>>,
}

impl DashboardCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .support_invalidation_closures()
                .build(),
        }
    }

    pub async fn get(&self, key: &DashboardKey) -> Option<Arc<Dashboard>> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: DashboardKey, dashboard: Arc<Dashboard>) {
        self.inner.insert(key, dashboard).await;
    }

    /// Drops every cached dashboard of `school_id` whose window covers the month of `date`.
    pub fn invalidate(&self, school_id: u64, date: NaiveDate) {
        let result = self.inner.invalidate_entries_if(move |key, _| {
            key.school_id == school_id && key.window.touches_month_of(date)
        });
        self.log_invalidation(result.map(|_| ()), school_id);
    }

    /// Drops every cached dashboard of `school_id`. Approval-state writes go
    /// through here: the pending count spans all dates.
    pub fn invalidate_school(&self, school_id: u64) {
        let result = self
            .inner
            .invalidate_entries_if(move |key, _| key.school_id == school_id);
        self.log_invalidation(result.map(|_| ()), school_id);
    }

    fn log_invalidation(&self, result: Result<(), PredicateError>, school_id: u64) {
        match result {
            Ok(()) => tracing::debug!(school_id, "Dashboard cache invalidated"),
            Err(e) => {
                // No predicate registered: flush the whole cache.
                tracing::warn!(error = %e, school_id, "Dashboard cache predicate rejected");
                self.inner.invalidate_all();
            }
        }
    }
}

impl Default for DashboardCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn day_window_touches_its_whole_month() {
        let window = Window::Day(d(2024, 1, 10));
        assert!(window.touches_month_of(d(2024, 1, 1)));
        assert!(window.touches_month_of(d(2024, 1, 31)));
        assert!(!window.touches_month_of(d(2024, 2, 1)));
    }

    #[test]
    fn range_window_spans_every_month_it_crosses() {
        let window = Window::Range(d(2024, 1, 25), d(2024, 3, 2));
        assert!(window.touches_month_of(d(2024, 1, 3)));
        assert!(window.touches_month_of(d(2024, 2, 15)));
        assert!(window.touches_month_of(d(2024, 3, 31)));
        assert!(!window.touches_month_of(d(2023, 12, 31)));
    }
}
