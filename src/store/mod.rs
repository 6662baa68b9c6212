//! Storage seams for the engine.
//!
//! Every public engine operation opens one [`LedgerTx`] through
//! [`AttendanceStore::begin`] and either commits it or drops it. Dropping an
//! uncommitted transaction discards all of its writes.
//!
//! [`Calendar`] and [`Directory`] are read-only collaborators owned by other
//! subsystems. They are consulted outside the ledger transaction.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;

use crate::error::EngineError;
use crate::model::{
    attendance::{
        ApprovalStatus, AttendanceRecord, AttendanceStatus, NewAttendance, NewDocument,
        RegularizationDocument,
    },
    calendar::{AcademicYear, DayInfo},
    member::{Member, SchoolClass},
    notification::{AttendanceNotification, NewNotification},
    stats::AttendanceStatsMonthly,
};

pub type StoreResult<T> = Result<T, EngineError>;

/// Approval-status selector for regularization queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    OneOf(BTreeSet<ApprovalStatus>),
}

impl StatusFilter {
    pub fn matches(&self, status: ApprovalStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::OneOf(set) => set.contains(&status),
        }
    }
}

impl Default for StatusFilter {
    fn default() -> Self {
        StatusFilter::OneOf(BTreeSet::from([ApprovalStatus::Pending]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub status: StatusFilter,
    pub user_id: Option<u64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: u64,
    pub limit: u64,
}

impl PendingQuery {
    /// Saturates instead of overflowing; a page past the end is simply empty.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn matches(&self, school_id: u64, record: &AttendanceRecord) -> bool {
        record.school_id == school_id
            && record.requires_approval
            && self.status.matches(record.approval_status)
            && self.user_id.is_none_or(|u| u == record.user_id)
            && self.from.is_none_or(|from| record.date >= from)
            && self.to.is_none_or(|to| record.date <= to)
    }
}

/// Decision written by the batch approval processor.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub approval_status: ApprovalStatus,
    pub approved_by: u64,
    pub approved_at: DateTime<Utc>,
    pub approval_remarks: Option<String>,
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;
}

/// Operations available inside one ledger transaction.
#[async_trait]
pub trait LedgerTx: Send {
    async fn record_by_id(&mut self, id: u64) -> StoreResult<Option<AttendanceRecord>>;

    async fn record_on(
        &mut self,
        school_id: u64,
        user_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>>;

    async fn insert_record(&mut self, record: NewAttendance) -> StoreResult<AttendanceRecord>;

    /// Writes the capture-owned columns: status, marker and telemetry.
    async fn update_capture(&mut self, record: &AttendanceRecord) -> StoreResult<()>;

    /// Writes status, remarks and marked_at and reopens the approval as PENDING.
    async fn update_regularization(
        &mut self,
        id: u64,
        status: AttendanceStatus,
        remarks: &str,
        marked_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn record_decision(&mut self, id: u64, decision: &Decision) -> StoreResult<()>;

    /// Ledger rows of one user, date ascending.
    async fn records_for_user(
        &mut self,
        school_id: u64,
        user_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>>;

    /// Ledger rows of a whole school, date ascending.
    async fn records_for_school(
        &mut self,
        school_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>>;

    /// Most recent PRESENT/LATE dates of a user up to `today`, newest first.
    async fn recent_present_dates(
        &mut self,
        school_id: u64,
        user_id: u64,
        limit: u32,
        today: NaiveDate,
    ) -> StoreResult<Vec<NaiveDate>>;

    /// One page of regularization requests plus the total match count.
    async fn list_pending(
        &mut self,
        school_id: u64,
        query: &PendingQuery,
    ) -> StoreResult<(Vec<AttendanceRecord>, u64)>;

    async fn count_pending_approvals(&mut self, school_id: u64) -> StoreResult<u64>;

    async fn count_pending_leaves(&mut self, school_id: u64) -> StoreResult<u64>;

    async fn insert_documents(
        &mut self,
        attendance_id: u64,
        documents: &[NewDocument],
        uploaded_at: DateTime<Utc>,
    ) -> StoreResult<Vec<RegularizationDocument>>;

    async fn documents_for(
        &mut self,
        attendance_ids: &[u64],
    ) -> StoreResult<Vec<RegularizationDocument>>;

    async fn upsert_stats(&mut self, stats: &AttendanceStatsMonthly) -> StoreResult<()>;

    async fn stats_for_user(
        &mut self,
        user_id: u64,
        academic_year_id: u64,
        year: i32,
    ) -> StoreResult<Vec<AttendanceStatsMonthly>>;

    async fn stats_for_month(
        &mut self,
        school_id: u64,
        academic_year_id: u64,
        month: u32,
        year: i32,
    ) -> StoreResult<Vec<AttendanceStatsMonthly>>;

    async fn enqueue_notification(
        &mut self,
        notification: NewNotification,
    ) -> StoreResult<AttendanceNotification>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Calendar oracle owned by the scheduling subsystem.
#[async_trait]
pub trait Calendar: Send + Sync {
    async fn is_working_day(&self, school_id: u64, date: NaiveDate) -> StoreResult<DayInfo>;

    async fn active_academic_year(&self, school_id: u64) -> StoreResult<Option<AcademicYear>>;

    async fn working_days(
        &self,
        school_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<u32>;
}

/// Read-only view of the user directory.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn members(&self, school_id: u64, user_ids: &[u64]) -> StoreResult<Vec<Member>>;

    async fn active_members(&self, school_id: u64) -> StoreResult<Vec<Member>>;

    async fn classes(&self, school_id: u64) -> StoreResult<Vec<SchoolClass>>;
}
