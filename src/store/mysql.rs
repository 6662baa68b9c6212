use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, MySql, MySqlPool, Transaction};
use std::str::FromStr;

use super::{
    AttendanceStore, Calendar, Decision, Directory, LedgerTx, PendingQuery, StatusFilter,
    StoreResult,
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
    role::Role,
    stats::AttendanceStatsMonthly,
};
use crate::utils::db_utils::{SqlFilter, SqlValue, bind_query_as, bind_scalar};

const ATTENDANCE_COLUMNS: &str = "id, school_id, user_id, date, status, marked_by, marked_at, \
    check_in_time, check_out_time, working_hours, is_late_check_in, late_by_minutes, remarks, \
    requires_approval, approval_status, approved_by, approved_at, approval_remarks";

const STATS_COLUMNS: &str = "user_id, school_id, academic_year_id, month, year, total_present, \
    total_absent, total_half_day, total_late, total_leaves, attendance_percentage, last_calculated";

const MEMBER_SELECT: &str = r#"
    SELECT u.id AS user_id, u.name, u.role_id, s.class_id, c.class_name, s.section_name AS section
    FROM users u
    LEFT JOIN students s ON s.user_id = u.id
    LEFT JOIN classes c ON c.id = s.class_id
    "#;

#[derive(FromRow)]
struct AttendanceRow {
    id: u64,
    school_id: u64,
    user_id: u64,
    date: NaiveDate,
    status: String,
    marked_by: u64,
    marked_at: DateTime<Utc>,
    check_in_time: Option<DateTime<Utc>>,
    check_out_time: Option<DateTime<Utc>>,
    working_hours: Option<f64>,
    is_late_check_in: bool,
    late_by_minutes: Option<u32>,
    remarks: Option<String>,
    requires_approval: bool,
    approval_status: String,
    approved_by: Option<u64>,
    approved_at: Option<DateTime<Utc>>,
    approval_remarks: Option<String>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = EngineError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let status = AttendanceStatus::from_str(&row.status).map_err(|_| {
            EngineError::Unavailable(format!(
                "attendance {} has unknown status {:?}",
                row.id, row.status
            ))
        })?;
        let approval_status = ApprovalStatus::from_str(&row.approval_status).map_err(|_| {
            EngineError::Unavailable(format!(
                "attendance {} has unknown approval status {:?}",
                row.id, row.approval_status
            ))
        })?;

        Ok(AttendanceRecord {
            id: row.id,
            school_id: row.school_id,
            user_id: row.user_id,
            date: row.date,
            status,
            marked_by: row.marked_by,
            marked_at: row.marked_at,
            check_in_time: row.check_in_time,
            check_out_time: row.check_out_time,
            working_hours: row.working_hours,
            is_late_check_in: row.is_late_check_in,
            late_by_minutes: row.late_by_minutes,
            remarks: row.remarks,
            requires_approval: row.requires_approval,
            approval_status,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            approval_remarks: row.approval_remarks,
        })
    }
}

fn into_records(rows: Vec<AttendanceRow>) -> StoreResult<Vec<AttendanceRecord>> {
    rows.into_iter().map(AttendanceRecord::try_from).collect()
}

#[derive(FromRow)]
struct MemberRow {
    user_id: u64,
    name: String,
    role_id: u8,
    class_id: Option<u64>,
    class_name: Option<String>,
    section: Option<String>,
}

fn into_members(rows: Vec<MemberRow>) -> Vec<Member> {
    rows.into_iter()
        .filter_map(|row| match Role::from_id(row.role_id) {
            Some(role) => Some(Member {
                user_id: row.user_id,
                name: row.name,
                role,
                class_id: row.class_id,
                class_name: row.class_name,
                section: row.section,
            }),
            None => {
                tracing::warn!(user_id = row.user_id, role_id = row.role_id, "Skipping user with unknown role");
                None
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTx { tx }))
    }
}

/// Rolls back on drop unless committed.
pub struct MySqlTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl LedgerTx for MySqlTx {
    async fn record_by_id(&mut self, id: u64) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ? FOR UPDATE");
        let row = sqlx::query_as::<MySql, AttendanceRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(AttendanceRecord::try_from).transpose()
    }

    async fn record_on(
        &mut self,
        school_id: u64,
        user_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
             WHERE school_id = ? AND user_id = ? AND date = ? FOR UPDATE"
        );
        let row = sqlx::query_as::<MySql, AttendanceRow>(&sql)
            .bind(school_id)
            .bind(user_id)
            .bind(date)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(AttendanceRecord::try_from).transpose()
    }

    async fn insert_record(&mut self, record: NewAttendance) -> StoreResult<AttendanceRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (school_id, user_id, date, status, marked_by, marked_at, check_in_time,
                 check_out_time, working_hours, is_late_check_in, late_by_minutes, remarks,
                 requires_approval, approval_status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.school_id)
        .bind(record.user_id)
        .bind(record.date)
        .bind(record.status.as_ref())
        .bind(record.marked_by)
        .bind(record.marked_at)
        .bind(record.attrs.check_in_time)
        .bind(record.attrs.check_out_time)
        .bind(record.attrs.working_hours)
        .bind(record.attrs.is_late_check_in.unwrap_or(false))
        .bind(record.attrs.late_by_minutes)
        .bind(record.attrs.remarks.as_deref())
        .bind(record.requires_approval)
        .bind(record.approval_status.as_ref())
        .execute(&mut *self.tx)
        .await?;

        Ok(record.into_record(result.last_insert_id()))
    }

    async fn update_capture(&mut self, record: &AttendanceRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE attendance
            SET status = ?, marked_by = ?, marked_at = ?, check_in_time = ?, check_out_time = ?,
                working_hours = ?, is_late_check_in = ?, late_by_minutes = ?, remarks = ?
            WHERE id = ?
            "#,
        )
        .bind(record.status.as_ref())
        .bind(record.marked_by)
        .bind(record.marked_at)
        .bind(record.check_in_time)
        .bind(record.check_out_time)
        .bind(record.working_hours)
        .bind(record.is_late_check_in)
        .bind(record.late_by_minutes)
        .bind(record.remarks.as_deref())
        .bind(record.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_regularization(
        &mut self,
        id: u64,
        status: AttendanceStatus,
        remarks: &str,
        marked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE attendance
            SET status = ?, remarks = ?, requires_approval = TRUE,
                approval_status = 'PENDING', marked_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_ref())
        .bind(remarks)
        .bind(marked_at)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn record_decision(&mut self, id: u64, decision: &Decision) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE attendance
            SET approval_status = ?, approved_by = ?, approved_at = ?, approval_remarks = ?
            WHERE id = ?
            "#,
        )
        .bind(decision.approval_status.as_ref())
        .bind(decision.approved_by)
        .bind(decision.approved_at)
        .bind(decision.approval_remarks.as_deref())
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn records_for_user(
        &mut self,
        school_id: u64,
        user_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
             WHERE school_id = ? AND user_id = ? AND date >= ? AND date <= ? \
             ORDER BY date ASC"
        );
        let rows = sqlx::query_as::<MySql, AttendanceRow>(&sql)
            .bind(school_id)
            .bind(user_id)
            .bind(from)
            .bind(to)
            .fetch_all(&mut *self.tx)
            .await?;
        into_records(rows)
    }

    async fn records_for_school(
        &mut self,
        school_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
             WHERE school_id = ? AND date >= ? AND date <= ? \
             ORDER BY date ASC, id ASC"
        );
        let rows = sqlx::query_as::<MySql, AttendanceRow>(&sql)
            .bind(school_id)
            .bind(from)
            .bind(to)
            .fetch_all(&mut *self.tx)
            .await?;
        into_records(rows)
    }

    async fn recent_present_dates(
        &mut self,
        school_id: u64,
        user_id: u64,
        limit: u32,
        today: NaiveDate,
    ) -> StoreResult<Vec<NaiveDate>> {
        let dates = sqlx::query_scalar::<MySql, NaiveDate>(
            r#"
            SELECT date FROM attendance
            WHERE school_id = ? AND user_id = ? AND status IN ('PRESENT', 'LATE')
              AND date <= ?
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(school_id)
        .bind(user_id)
        .bind(today)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(dates)
    }

    async fn list_pending(
        &mut self,
        school_id: u64,
        query: &PendingQuery,
    ) -> StoreResult<(Vec<AttendanceRecord>, u64)> {
        // -------------------------
        // WHERE clause
        // -------------------------
        let mut filter = SqlFilter::new();
        filter
            .and("school_id = ?", SqlValue::U64(school_id))
            .and("requires_approval = ?", SqlValue::Bool(true));
        if let StatusFilter::OneOf(statuses) = &query.status {
            filter.and_in(
                "approval_status",
                statuses
                    .iter()
                    .map(|s| SqlValue::String(s.to_string()))
                    .collect(),
            );
        }
        if let Some(user_id) = query.user_id {
            filter.and("user_id = ?", SqlValue::U64(user_id));
        }
        if let Some(from) = query.from {
            filter.and("date >= ?", SqlValue::Date(from));
        }
        if let Some(to) = query.to {
            filter.and("date <= ?", SqlValue::Date(to));
        }

        // -------------------------
        // COUNT query
        // -------------------------
        let count_sql = format!("SELECT COUNT(*) FROM attendance{}", filter.sql);
        let total = bind_scalar(
            sqlx::query_scalar::<MySql, i64>(&count_sql),
            filter.values.clone(),
        )
        .fetch_one(&mut *self.tx)
        .await?;

        // -------------------------
        // DATA query
        // -------------------------
        let data_sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance{} \
             ORDER BY date DESC, marked_at DESC LIMIT ? OFFSET ?",
            filter.sql
        );
        let rows = bind_query_as(
            sqlx::query_as::<MySql, AttendanceRow>(&data_sql),
            filter.values,
        )
        .bind(query.limit)
        .bind(query.offset())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok((into_records(rows)?, total.max(0) as u64))
    }

    async fn count_pending_approvals(&mut self, school_id: u64) -> StoreResult<u64> {
        let total = sqlx::query_scalar::<MySql, i64>(
            r#"
            SELECT COUNT(*) FROM attendance
            WHERE school_id = ? AND requires_approval = TRUE AND approval_status = 'PENDING'
            "#,
        )
        .bind(school_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(total.max(0) as u64)
    }

    async fn count_pending_leaves(&mut self, school_id: u64) -> StoreResult<u64> {
        let total = sqlx::query_scalar::<MySql, i64>(
            "SELECT COUNT(*) FROM leave_requests WHERE school_id = ? AND status = 'PENDING'",
        )
        .bind(school_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(total.max(0) as u64)
    }

    async fn insert_documents(
        &mut self,
        attendance_id: u64,
        documents: &[NewDocument],
        uploaded_at: DateTime<Utc>,
    ) -> StoreResult<Vec<RegularizationDocument>> {
        let mut inserted = Vec::with_capacity(documents.len());
        for doc in documents {
            let result = sqlx::query(
                r#"
                INSERT INTO attendance_documents
                    (attendance_id, document_type, file_url, file_name, uploaded_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(attendance_id)
            .bind(&doc.document_type)
            .bind(&doc.url)
            .bind(&doc.name)
            .bind(uploaded_at)
            .execute(&mut *self.tx)
            .await?;

            inserted.push(RegularizationDocument {
                id: result.last_insert_id(),
                attendance_id,
                document_type: doc.document_type.clone(),
                file_url: doc.url.clone(),
                file_name: doc.name.clone(),
                uploaded_at,
            });
        }
        Ok(inserted)
    }

    async fn documents_for(
        &mut self,
        attendance_ids: &[u64],
    ) -> StoreResult<Vec<RegularizationDocument>> {
        if attendance_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut filter = SqlFilter::new();
        filter.and_in(
            "attendance_id",
            attendance_ids.iter().map(|id| SqlValue::U64(*id)).collect(),
        );
        let sql = format!(
            "SELECT id, attendance_id, document_type, file_url, file_name, uploaded_at \
             FROM attendance_documents{} ORDER BY id",
            filter.sql
        );
        let docs = bind_query_as(
            sqlx::query_as::<MySql, RegularizationDocument>(&sql),
            filter.values,
        )
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(docs)
    }

    async fn upsert_stats(&mut self, stats: &AttendanceStatsMonthly) -> StoreResult<()> {
        // Full-row overwrite keeps concurrent recomputes last-writer-wins.
        sqlx::query(
            r#"
            INSERT INTO attendance_stats_monthly
                (user_id, school_id, academic_year_id, month, year, total_present, total_absent,
                 total_half_day, total_late, total_leaves, attendance_percentage, last_calculated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                school_id = VALUES(school_id),
                total_present = VALUES(total_present),
                total_absent = VALUES(total_absent),
                total_half_day = VALUES(total_half_day),
                total_late = VALUES(total_late),
                total_leaves = VALUES(total_leaves),
                attendance_percentage = VALUES(attendance_percentage),
                last_calculated = VALUES(last_calculated)
            "#,
        )
        .bind(stats.user_id)
        .bind(stats.school_id)
        .bind(stats.academic_year_id)
        .bind(stats.month)
        .bind(stats.year)
        .bind(stats.total_present)
        .bind(stats.total_absent)
        .bind(stats.total_half_day)
        .bind(stats.total_late)
        .bind(stats.total_leaves)
        .bind(stats.attendance_percentage)
        .bind(stats.last_calculated)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn stats_for_user(
        &mut self,
        user_id: u64,
        academic_year_id: u64,
        year: i32,
    ) -> StoreResult<Vec<AttendanceStatsMonthly>> {
        let sql = format!(
            "SELECT {STATS_COLUMNS} FROM attendance_stats_monthly \
             WHERE user_id = ? AND academic_year_id = ? AND year = ? ORDER BY month ASC"
        );
        let rows = sqlx::query_as::<MySql, AttendanceStatsMonthly>(&sql)
            .bind(user_id)
            .bind(academic_year_id)
            .bind(year)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows)
    }

    async fn stats_for_month(
        &mut self,
        school_id: u64,
        academic_year_id: u64,
        month: u32,
        year: i32,
    ) -> StoreResult<Vec<AttendanceStatsMonthly>> {
        let sql = format!(
            "SELECT {STATS_COLUMNS} FROM attendance_stats_monthly \
             WHERE school_id = ? AND academic_year_id = ? AND month = ? AND year = ?"
        );
        let rows = sqlx::query_as::<MySql, AttendanceStatsMonthly>(&sql)
            .bind(school_id)
            .bind(academic_year_id)
            .bind(month)
            .bind(year)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows)
    }

    async fn enqueue_notification(
        &mut self,
        notification: NewNotification,
    ) -> StoreResult<AttendanceNotification> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_notifications
                (school_id, user_id, notification_type, title, message, scheduled_for, status)
            VALUES (?, ?, ?, ?, ?, ?, 'PENDING')
            "#,
        )
        .bind(notification.school_id)
        .bind(notification.user_id)
        .bind(notification.notification_type.as_ref())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.scheduled_for)
        .execute(&mut *self.tx)
        .await?;

        Ok(notification.into_notification(result.last_insert_id()))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MySqlTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Calendar for MySqlStore {
    async fn is_working_day(&self, school_id: u64, date: NaiveDate) -> StoreResult<DayInfo> {
        let row = sqlx::query_as::<MySql, (String, Option<String>)>(
            "SELECT day_type, holiday_name FROM school_calendar WHERE school_id = ? AND date = ?",
        )
        .bind(school_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        // Days missing from the calendar are not working days.
        Ok(match row {
            Some((day_type, holiday_name)) => DayInfo {
                day_type: DayType::from_str(&day_type).unwrap_or_else(|_| {
                    tracing::warn!(school_id, %date, day_type, "Unknown calendar day type");
                    DayType::Holiday
                }),
                holiday_name,
            },
            None => DayInfo {
                day_type: DayType::Holiday,
                holiday_name: None,
            },
        })
    }

    async fn active_academic_year(&self, school_id: u64) -> StoreResult<Option<AcademicYear>> {
        let year = sqlx::query_as::<MySql, AcademicYear>(
            r#"
            SELECT id, start_date, end_date FROM academic_years
            WHERE school_id = ? AND is_active = TRUE
            ORDER BY start_date DESC
            LIMIT 1
            "#,
        )
        .bind(school_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(year)
    }

    async fn working_days(
        &self,
        school_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<u32> {
        let count = sqlx::query_scalar::<MySql, i64>(
            r#"
            SELECT COUNT(*) FROM school_calendar
            WHERE school_id = ? AND date >= ? AND date <= ? AND day_type = 'WORKING_DAY'
            "#,
        )
        .bind(school_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }
}

#[async_trait]
impl Directory for MySqlStore {
    async fn members(&self, school_id: u64, user_ids: &[u64]) -> StoreResult<Vec<Member>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut filter = SqlFilter::new();
        filter
            .and("u.school_id = ?", SqlValue::U64(school_id))
            .and_in("u.id", user_ids.iter().map(|id| SqlValue::U64(*id)).collect());
        let sql = format!("{MEMBER_SELECT}{}", filter.sql);
        let rows = bind_query_as(sqlx::query_as::<MySql, MemberRow>(&sql), filter.values)
            .fetch_all(&self.pool)
            .await?;
        Ok(into_members(rows))
    }

    async fn active_members(&self, school_id: u64) -> StoreResult<Vec<Member>> {
        let sql = format!(
            "{MEMBER_SELECT} WHERE u.school_id = ? AND u.is_active = TRUE AND u.deleted_at IS NULL"
        );
        let rows = sqlx::query_as::<MySql, MemberRow>(&sql)
            .bind(school_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(into_members(rows))
    }

    async fn classes(&self, school_id: u64) -> StoreResult<Vec<SchoolClass>> {
        let classes = sqlx::query_as::<MySql, SchoolClass>(
            "SELECT id, class_name FROM classes WHERE school_id = ? ORDER BY class_name",
        )
        .bind(school_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(classes)
    }
}
