//! Process-local storage engine used for development runs and tests.
//!
//! Transactions are serialized behind a tokio mutex. Each transaction works on
//! a copy of the state and swaps it in on commit.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    AttendanceStore, Calendar, Decision, Directory, LedgerTx, PendingQuery, StoreResult,
};
use crate::error::EngineError;
use crate::model::{
    attendance::{
        ApprovalStatus, AttendanceRecord, AttendanceStatus, NewAttendance, NewDocument,
        RegularizationDocument,
    },
    calendar::{AcademicYear, DayInfo, DayType},
    member::{Member, SchoolClass},
    notification::{AttendanceNotification, NewNotification},
    stats::AttendanceStatsMonthly,
};

type StatsKey = (u64, u64, u32, i32);

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub records: BTreeMap<u64, AttendanceRecord>,
    pub documents: Vec<RegularizationDocument>,
    pub stats: BTreeMap<StatsKey, AttendanceStatsMonthly>,
    pub notifications: Vec<AttendanceNotification>,
    pub pending_leaves: HashMap<u64, u64>,
    next_id: u64,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
struct CalendarData {
    days: HashMap<(u64, NaiveDate), DayInfo>,
    years: HashMap<u64, AcademicYear>,
}

#[derive(Debug, Default)]
struct DirectoryData {
    members: Vec<(u64, Member, bool)>,
    classes: Vec<(u64, SchoolClass)>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    calendar: Arc<RwLock<CalendarData>>,
    directory: Arc<RwLock<DirectoryData>>,
    fail_notifications: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Makes every later notification enqueue fail as if the store went away.
    pub fn fail_notifications(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    pub async fn set_pending_leaves(&self, school_id: u64, count: u64) {
        self.state.lock().await.pending_leaves.insert(school_id, count);
    }

    pub fn set_academic_year(&self, school_id: u64, year: AcademicYear) -> StoreResult<()> {
        self.calendar
            .write()
            .map_err(|_| poisoned("calendar"))?
            .years
            .insert(school_id, year);
        Ok(())
    }

    pub fn clear_academic_year(&self, school_id: u64) -> StoreResult<()> {
        self.calendar
            .write()
            .map_err(|_| poisoned("calendar"))?
            .years
            .remove(&school_id);
        Ok(())
    }

    pub fn set_day(&self, school_id: u64, date: NaiveDate, info: DayInfo) -> StoreResult<()> {
        self.calendar
            .write()
            .map_err(|_| poisoned("calendar"))?
            .days
            .insert((school_id, date), info);
        Ok(())
    }

    pub fn add_member(&self, school_id: u64, member: Member) -> StoreResult<()> {
        self.directory
            .write()
            .map_err(|_| poisoned("directory"))?
            .members
            .push((school_id, member, true));
        Ok(())
    }

    pub fn deactivate_member(&self, school_id: u64, user_id: u64) -> StoreResult<()> {
        let mut directory = self.directory.write().map_err(|_| poisoned("directory"))?;
        for (school, member, active) in directory.members.iter_mut() {
            if *school == school_id && member.user_id == user_id {
                *active = false;
            }
        }
        Ok(())
    }

    pub fn add_class(&self, school_id: u64, class: SchoolClass) -> StoreResult<()> {
        self.directory
            .write()
            .map_err(|_| poisoned("directory"))?
            .classes
            .push((school_id, class));
        Ok(())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_notifications: self.fail_notifications.load(Ordering::SeqCst),
        }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_notifications: bool,
}

impl MemoryTx {
    fn record_mut(&mut self, id: u64) -> StoreResult<&mut AttendanceRecord> {
        self.working
            .records
            .get_mut(&id)
            .ok_or(EngineError::NotFound { id })
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn record_by_id(&mut self, id: u64) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self.working.records.get(&id).cloned())
    }

    async fn record_on(
        &mut self,
        school_id: u64,
        user_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self
            .working
            .records
            .values()
            .find(|r| r.school_id == school_id && r.user_id == user_id && r.date == date)
            .cloned())
    }

    async fn insert_record(&mut self, record: NewAttendance) -> StoreResult<AttendanceRecord> {
        let duplicate = self.working.records.values().any(|r| {
            r.school_id == record.school_id && r.user_id == record.user_id && r.date == record.date
        });
        if duplicate {
            return Err(EngineError::Unavailable(format!(
                "duplicate attendance for user {} on {}",
                record.user_id, record.date
            )));
        }

        let id = self.working.next_id();
        let record = record.into_record(id);
        self.working.records.insert(id, record.clone());
        Ok(record)
    }

    async fn update_capture(&mut self, record: &AttendanceRecord) -> StoreResult<()> {
        let stored = self.record_mut(record.id)?;
        stored.status = record.status;
        stored.marked_by = record.marked_by;
        stored.marked_at = record.marked_at;
        stored.check_in_time = record.check_in_time;
        stored.check_out_time = record.check_out_time;
        stored.working_hours = record.working_hours;
        stored.is_late_check_in = record.is_late_check_in;
        stored.late_by_minutes = record.late_by_minutes;
        stored.remarks = record.remarks.clone();
        Ok(())
    }

    async fn update_regularization(
        &mut self,
        id: u64,
        status: AttendanceStatus,
        remarks: &str,
        marked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let stored = self.record_mut(id)?;
        stored.status = status;
        stored.remarks = Some(remarks.to_string());
        stored.requires_approval = true;
        stored.approval_status = ApprovalStatus::Pending;
        stored.marked_at = marked_at;
        Ok(())
    }

    async fn record_decision(&mut self, id: u64, decision: &Decision) -> StoreResult<()> {
        let stored = self.record_mut(id)?;
        stored.approval_status = decision.approval_status;
        stored.approved_by = Some(decision.approved_by);
        stored.approved_at = Some(decision.approved_at);
        stored.approval_remarks = decision.approval_remarks.clone();
        Ok(())
    }

    async fn records_for_user(
        &mut self,
        school_id: u64,
        user_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let mut rows: Vec<_> = self
            .working
            .records
            .values()
            .filter(|r| {
                r.school_id == school_id && r.user_id == user_id && r.date >= from && r.date <= to
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.date);
        Ok(rows)
    }

    async fn records_for_school(
        &mut self,
        school_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let mut rows: Vec<_> = self
            .working
            .records
            .values()
            .filter(|r| r.school_id == school_id && r.date >= from && r.date <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.date, r.id));
        Ok(rows)
    }

    async fn recent_present_dates(
        &mut self,
        school_id: u64,
        user_id: u64,
        limit: u32,
        today: NaiveDate,
    ) -> StoreResult<Vec<NaiveDate>> {
        let mut dates: Vec<_> = self
            .working
            .records
            .values()
            .filter(|r| {
                r.school_id == school_id
                    && r.user_id == user_id
                    && r.date <= today
                    && r.status.counts_as_present()
            })
            .map(|r| r.date)
            .collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates.truncate(limit as usize);
        Ok(dates)
    }

    async fn list_pending(
        &mut self,
        school_id: u64,
        query: &PendingQuery,
    ) -> StoreResult<(Vec<AttendanceRecord>, u64)> {
        let mut rows: Vec<_> = self
            .working
            .records
            .values()
            .filter(|r| query.matches(school_id, r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.marked_at.cmp(&a.marked_at)));

        let total = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn count_pending_approvals(&mut self, school_id: u64) -> StoreResult<u64> {
        Ok(self
            .working
            .records
            .values()
            .filter(|r| {
                r.school_id == school_id
                    && r.requires_approval
                    && r.approval_status == ApprovalStatus::Pending
            })
            .count() as u64)
    }

    async fn count_pending_leaves(&mut self, school_id: u64) -> StoreResult<u64> {
        Ok(self
            .working
            .pending_leaves
            .get(&school_id)
            .copied()
            .unwrap_or(0))
    }

    async fn insert_documents(
        &mut self,
        attendance_id: u64,
        documents: &[NewDocument],
        uploaded_at: DateTime<Utc>,
    ) -> StoreResult<Vec<RegularizationDocument>> {
        let mut inserted = Vec::with_capacity(documents.len());
        for doc in documents {
            let id = self.working.next_id();
            let row = RegularizationDocument {
                id,
                attendance_id,
                document_type: doc.document_type.clone(),
                file_url: doc.url.clone(),
                file_name: doc.name.clone(),
                uploaded_at,
            };
            self.working.documents.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    async fn documents_for(
        &mut self,
        attendance_ids: &[u64],
    ) -> StoreResult<Vec<RegularizationDocument>> {
        Ok(self
            .working
            .documents
            .iter()
            .filter(|d| attendance_ids.contains(&d.attendance_id))
            .cloned()
            .collect())
    }

    async fn upsert_stats(&mut self, stats: &AttendanceStatsMonthly) -> StoreResult<()> {
        let key = (stats.user_id, stats.academic_year_id, stats.month, stats.year);
        self.working.stats.insert(key, stats.clone());
        Ok(())
    }

    async fn stats_for_user(
        &mut self,
        user_id: u64,
        academic_year_id: u64,
        year: i32,
    ) -> StoreResult<Vec<AttendanceStatsMonthly>> {
        Ok(self
            .working
            .stats
            .values()
            .filter(|s| s.user_id == user_id && s.academic_year_id == academic_year_id && s.year == year)
            .cloned()
            .collect())
    }

    async fn stats_for_month(
        &mut self,
        school_id: u64,
        academic_year_id: u64,
        month: u32,
        year: i32,
    ) -> StoreResult<Vec<AttendanceStatsMonthly>> {
        Ok(self
            .working
            .stats
            .values()
            .filter(|s| {
                s.school_id == school_id
                    && s.academic_year_id == academic_year_id
                    && s.month == month
                    && s.year == year
            })
            .cloned()
            .collect())
    }

    async fn enqueue_notification(
        &mut self,
        notification: NewNotification,
    ) -> StoreResult<AttendanceNotification> {
        if self.fail_notifications {
            return Err(EngineError::Unavailable(
                "notification outbox unavailable".to_string(),
            ));
        }
        let id = self.working.next_id();
        let row = notification.into_notification(id);
        self.working.notifications.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

fn poisoned(what: &str) -> EngineError {
    EngineError::Unavailable(format!("{what} data poisoned"))
}

#[async_trait]
impl Calendar for MemoryStore {
    async fn is_working_day(&self, school_id: u64, date: NaiveDate) -> StoreResult<DayInfo> {
        let calendar = self.calendar.read().map_err(|_| poisoned("calendar"))?;
        if let Some(info) = calendar.days.get(&(school_id, date)) {
            return Ok(info.clone());
        }
        // Unlisted days fall back to a Monday-to-Friday week.
        Ok(match date.weekday() {
            Weekday::Sat | Weekday::Sun => DayInfo {
                day_type: DayType::Weekend,
                holiday_name: None,
            },
            _ => DayInfo::working(),
        })
    }

    async fn active_academic_year(&self, school_id: u64) -> StoreResult<Option<AcademicYear>> {
        Ok(self
            .calendar
            .read()
            .map_err(|_| poisoned("calendar"))?
            .years
            .get(&school_id)
            .cloned())
    }

    async fn working_days(
        &self,
        school_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<u32> {
        let mut count = 0;
        for date in from.iter_days().take_while(|d| *d <= to) {
            if self.is_working_day(school_id, date).await?.is_working_day() {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn members(&self, school_id: u64, user_ids: &[u64]) -> StoreResult<Vec<Member>> {
        Ok(self
            .directory
            .read()
            .map_err(|_| poisoned("directory"))?
            .members
            .iter()
            .filter(|(school, m, _)| *school == school_id && user_ids.contains(&m.user_id))
            .map(|(_, m, _)| m.clone())
            .collect())
    }

    async fn active_members(&self, school_id: u64) -> StoreResult<Vec<Member>> {
        Ok(self
            .directory
            .read()
            .map_err(|_| poisoned("directory"))?
            .members
            .iter()
            .filter(|(school, _, active)| *school == school_id && *active)
            .map(|(_, m, _)| m.clone())
            .collect())
    }

    async fn classes(&self, school_id: u64) -> StoreResult<Vec<SchoolClass>> {
        Ok(self
            .directory
            .read()
            .map_err(|_| poisoned("directory"))?
            .classes
            .iter()
            .filter(|(school, _)| *school == school_id)
            .map(|(_, c)| c.clone())
            .collect())
    }
}
