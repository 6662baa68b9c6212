use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use super::{AttendanceEngine, AttendanceSettings, round2};
use crate::error::EngineError;
use crate::model::attendance::{
    ApprovalStatus, AttendanceRecord, AttendanceStatus, CaptureAttrs, NewAttendance,
};
use crate::store::LedgerTx;

/// One attendance mark written by an authorized marker.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Capture {
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = "2024-01-10", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[schema(example = 1)]
    pub marked_by: u64,
    #[serde(flatten)]
    pub attrs: CaptureAttrs,
}

impl AttendanceSettings {
    /// Minutes past the start of day, or `None` inside the grace period.
    pub fn late_by_minutes(&self, at: NaiveTime) -> Option<u32> {
        let threshold = self.start_time + Duration::minutes(i64::from(self.grace_minutes));
        if at <= threshold {
            return None;
        }
        Some((at - self.start_time).num_minutes().max(0) as u32)
    }
}

/// Natural-key upsert shared by every capture path.
pub(crate) async fn upsert_in(
    tx: &mut dyn LedgerTx,
    school_id: u64,
    capture: Capture,
    now: DateTime<Utc>,
) -> Result<AttendanceRecord, EngineError> {
    match tx.record_on(school_id, capture.user_id, capture.date).await? {
        Some(mut existing) => {
            if existing.approval_status.is_terminal() {
                return Err(EngineError::Conflict {
                    id: existing.id,
                    approval_status: existing.approval_status,
                });
            }
            existing.status = capture.status;
            existing.marked_by = capture.marked_by;
            existing.marked_at = now;
            capture.attrs.apply_to(&mut existing);
            tx.update_capture(&existing).await?;
            Ok(existing)
        }
        None => {
            tx.insert_record(NewAttendance {
                school_id,
                user_id: capture.user_id,
                date: capture.date,
                status: capture.status,
                marked_by: capture.marked_by,
                marked_at: now,
                attrs: capture.attrs,
                requires_approval: false,
                approval_status: ApprovalStatus::None,
            })
            .await
        }
    }
}

impl AttendanceEngine {
    pub async fn capture_or_upsert(
        &self,
        school_id: u64,
        capture: Capture,
    ) -> Result<AttendanceRecord, EngineError> {
        let mut tx = self.store.begin().await?;
        let record = upsert_in(&mut *tx, school_id, capture, self.clock.now()).await?;
        tx.commit().await?;

        self.cache.invalidate(school_id, record.date);
        tracing::info!(
            school_id,
            user_id = record.user_id,
            attendance_id = record.id,
            status = %record.status,
            "Attendance captured"
        );
        Ok(record)
    }

    pub async fn find(
        &self,
        school_id: u64,
        user_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, EngineError> {
        if from > to {
            return Err(EngineError::validation(
                "start_date",
                "start_date cannot be after end_date",
            ));
        }
        let mut tx = self.store.begin().await?;
        let records = tx.records_for_user(school_id, user_id, from, to).await?;
        tx.commit().await?;
        Ok(records)
    }

    /// Self check-in for today. Arrivals after the grace period are LATE.
    pub async fn check_in(
        &self,
        school_id: u64,
        user_id: u64,
        remarks: Option<String>,
    ) -> Result<AttendanceRecord, EngineError> {
        let now = self.clock.now();
        let local = self.clock.local_now();
        let today = local.date();

        let day = self.calendar.is_working_day(school_id, today).await?;
        if !day.is_working_day() {
            return Err(EngineError::NotWorkingDay {
                date: today,
                day_type: day.day_type,
            });
        }

        let late_by = self.settings.late_by_minutes(local.time());
        let status = if late_by.is_some() {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        };

        let mut tx = self.store.begin().await?;
        if let Some(existing) = tx.record_on(school_id, user_id, today).await?
            && existing.check_in_time.is_some()
        {
            return Err(EngineError::AlreadyCheckedIn { date: today });
        }

        let capture = Capture {
            user_id,
            date: today,
            status,
            marked_by: user_id,
            attrs: CaptureAttrs {
                check_in_time: Some(now),
                is_late_check_in: Some(late_by.is_some()),
                late_by_minutes: late_by,
                remarks,
                ..CaptureAttrs::default()
            },
        };
        let record = upsert_in(&mut *tx, school_id, capture, now).await?;
        tx.commit().await?;

        self.cache.invalidate(school_id, today);
        tracing::info!(
            school_id,
            user_id,
            attendance_id = record.id,
            late_by_minutes = late_by.unwrap_or(0),
            "Checked in"
        );
        Ok(record)
    }

    /// Self check-out for today. Short days are downgraded to HALF_DAY.
    pub async fn check_out(
        &self,
        school_id: u64,
        user_id: u64,
        remarks: Option<String>,
    ) -> Result<AttendanceRecord, EngineError> {
        let now = self.clock.now();
        let today = self.clock.today();

        let mut tx = self.store.begin().await?;
        let mut record = tx
            .record_on(school_id, user_id, today)
            .await?
            .ok_or(EngineError::NoCheckIn { date: today })?;
        let Some(checked_in) = record.check_in_time else {
            return Err(EngineError::NoCheckIn { date: today });
        };
        if record.check_out_time.is_some() {
            return Err(EngineError::AlreadyCheckedOut { date: today });
        }
        if record.approval_status.is_terminal() {
            return Err(EngineError::Conflict {
                id: record.id,
                approval_status: record.approval_status,
            });
        }

        let hours = round2(((now - checked_in).num_seconds().max(0) as f64) / 3600.0);
        record.check_out_time = Some(now);
        record.working_hours = Some(hours);
        if hours > 0.0 && hours < self.settings.half_day_hours {
            record.status = AttendanceStatus::HalfDay;
        }
        if let Some(remarks) = remarks {
            record.remarks = Some(remarks);
        }
        tx.update_capture(&record).await?;
        tx.commit().await?;

        self.cache.invalidate(school_id, today);
        tracing::info!(
            school_id,
            user_id,
            attendance_id = record.id,
            working_hours = hours,
            "Checked out"
        );
        Ok(record)
    }
}
