use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;

use super::{AttendanceEngine, round2, streak::streak_in};
use crate::error::EngineError;
use crate::model::{
    attendance::{AttendanceRecord, AttendanceStatus},
    calendar::AcademicYear,
    stats::AttendanceStatsMonthly,
};
use crate::store::LedgerTx;
use crate::utils::clock::month_bounds;

/// `(present + late + 0.5 * half_day) / total * 100`, two decimals, 0 for an empty month.
pub fn attendance_percentage(present: u32, late: u32, half_day: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let weighted = f64::from(present) + f64::from(late) + 0.5 * f64::from(half_day);
    round2(weighted / f64::from(total) * 100.0)
}

/// Folds one user's ledger rows for a month into a stats row.
pub fn tally(
    school_id: u64,
    user_id: u64,
    academic_year_id: u64,
    reference: NaiveDate,
    records: &[AttendanceRecord],
    calculated_at: DateTime<Utc>,
) -> AttendanceStatsMonthly {
    let mut stats = AttendanceStatsMonthly {
        user_id,
        school_id,
        academic_year_id,
        month: reference.month(),
        year: reference.year(),
        total_present: 0,
        total_absent: 0,
        total_half_day: 0,
        total_late: 0,
        total_leaves: 0,
        attendance_percentage: 0.0,
        last_calculated: calculated_at,
    };
    for record in records {
        match record.status {
            AttendanceStatus::Present => stats.total_present += 1,
            AttendanceStatus::Absent => stats.total_absent += 1,
            AttendanceStatus::HalfDay => stats.total_half_day += 1,
            AttendanceStatus::Late => stats.total_late += 1,
            AttendanceStatus::OnLeave => stats.total_leaves += 1,
        }
    }
    stats.attendance_percentage = attendance_percentage(
        stats.total_present,
        stats.total_late,
        stats.total_half_day,
        stats.total_days(),
    );
    stats
}

/// Rebuilds and upserts the month row containing `reference`.
pub(crate) async fn recompute_in(
    tx: &mut dyn LedgerTx,
    year: &AcademicYear,
    school_id: u64,
    user_id: u64,
    reference: NaiveDate,
    now: DateTime<Utc>,
) -> Result<AttendanceStatsMonthly, EngineError> {
    let (first, last) = month_bounds(reference);
    let records = tx.records_for_user(school_id, user_id, first, last).await?;
    let stats = tally(school_id, user_id, year.id, reference, &records, now);
    tx.upsert_stats(&stats).await?;
    tracing::debug!(
        school_id,
        user_id,
        month = stats.month,
        year = stats.year,
        percentage = stats.attendance_percentage,
        "Monthly stats recomputed"
    );
    Ok(stats)
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RecalculateRequest {
    /// Every user with records in the month when absent.
    pub user_id: Option<u64>,
    #[schema(example = 1)]
    pub month: Option<u32>,
    #[schema(example = 2024)]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RecalculateSummary {
    pub academic_year_id: u64,
    pub month: u32,
    pub year: i32,
    pub rows_written: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct YearSummary {
    pub total_present: u32,
    pub total_absent: u32,
    pub total_half_day: u32,
    pub total_late: u32,
    pub total_leaves: u32,
    pub attendance_percentage: f64,
}

impl YearSummary {
    fn from_rows(rows: &[AttendanceStatsMonthly]) -> Self {
        let mut summary = YearSummary {
            total_present: 0,
            total_absent: 0,
            total_half_day: 0,
            total_late: 0,
            total_leaves: 0,
            attendance_percentage: 0.0,
        };
        let mut total = 0;
        for row in rows {
            summary.total_present += row.total_present;
            summary.total_absent += row.total_absent;
            summary.total_half_day += row.total_half_day;
            summary.total_late += row.total_late;
            summary.total_leaves += row.total_leaves;
            total += row.total_days();
        }
        summary.attendance_percentage = attendance_percentage(
            summary.total_present,
            summary.total_late,
            summary.total_half_day,
            total,
        );
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UserStats {
    pub user_id: u64,
    pub academic_year: AcademicYear,
    /// Stored row for the requested month, zeroed when never computed.
    pub month: AttendanceStatsMonthly,
    pub months: Vec<AttendanceStatsMonthly>,
    pub yearly: YearSummary,
    pub streak: u32,
    /// Working days of the month up to today. Informational only.
    pub working_days: u32,
}

fn reference_date(month: u32, year: i32) -> Result<NaiveDate, EngineError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| EngineError::validation("month", format!("invalid month {month}/{year}")))
}

impl AttendanceEngine {
    /// Recomputes one month row. Without an active academic year this is a no-op.
    pub async fn recompute(
        &self,
        school_id: u64,
        user_id: u64,
        reference: NaiveDate,
    ) -> Result<Option<AttendanceStatsMonthly>, EngineError> {
        let Some(year) = self.calendar.active_academic_year(school_id).await? else {
            let skipped = EngineError::NoActiveAcademicYear { school_id };
            tracing::debug!(school_id, user_id, reason = %skipped, "Skipping stats recompute");
            return Ok(None);
        };

        let mut tx = self.store.begin().await?;
        let stats = recompute_in(&mut *tx, &year, school_id, user_id, reference, self.clock.now())
            .await?;
        tx.commit().await?;

        self.cache.invalidate(school_id, reference);
        Ok(Some(stats))
    }

    /// Admin-forced recompute for one user or the whole school month.
    pub async fn recalculate(
        &self,
        school_id: u64,
        request: RecalculateRequest,
    ) -> Result<RecalculateSummary, EngineError> {
        let today = self.clock.today();
        let reference = reference_date(
            request.month.unwrap_or(today.month()),
            request.year.unwrap_or(today.year()),
        )?;
        let year = self
            .calendar
            .active_academic_year(school_id)
            .await?
            .ok_or(EngineError::NoActiveAcademicYear { school_id })?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let user_ids: Vec<u64> = match request.user_id {
            Some(user_id) => vec![user_id],
            None => {
                let (first, last) = month_bounds(reference);
                tx.records_for_school(school_id, first, last)
                    .await?
                    .into_iter()
                    .map(|r| r.user_id)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            }
        };
        for user_id in &user_ids {
            recompute_in(&mut *tx, &year, school_id, *user_id, reference, now).await?;
        }
        tx.commit().await?;

        self.cache.invalidate(school_id, reference);
        tracing::info!(
            school_id,
            month = reference.month(),
            year = reference.year(),
            rows = user_ids.len(),
            "Stats recalculated"
        );

        Ok(RecalculateSummary {
            academic_year_id: year.id,
            month: reference.month(),
            year: reference.year(),
            rows_written: user_ids.len() as u32,
        })
    }

    pub async fn user_stats(
        &self,
        school_id: u64,
        user_id: u64,
        month: Option<u32>,
        year: Option<i32>,
    ) -> Result<UserStats, EngineError> {
        let today = self.clock.today();
        let reference = reference_date(
            month.unwrap_or(today.month()),
            year.unwrap_or(today.year()),
        )?;
        let academic_year = self
            .calendar
            .active_academic_year(school_id)
            .await?
            .ok_or(EngineError::NoActiveAcademicYear { school_id })?;

        let (first, last) = month_bounds(reference);
        let working_days = if first > today {
            0
        } else {
            self.calendar
                .working_days(school_id, first, last.min(today))
                .await?
        };

        let mut tx = self.store.begin().await?;
        let months = tx
            .stats_for_user(user_id, academic_year.id, reference.year())
            .await?;
        let streak = streak_in(&mut *tx, school_id, user_id, today).await?;
        tx.commit().await?;

        let months: Vec<_> = months
            .into_iter()
            .filter(|row| row.school_id == school_id)
            .collect();
        let month = months
            .iter()
            .find(|row| row.month == reference.month())
            .cloned()
            .unwrap_or_else(|| {
                tally(
                    school_id,
                    user_id,
                    academic_year.id,
                    reference,
                    &[],
                    self.clock.now(),
                )
            });

        Ok(UserStats {
            user_id,
            yearly: YearSummary::from_rows(&months),
            academic_year,
            month,
            months,
            streak,
            working_days,
        })
    }
}
