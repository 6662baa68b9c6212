use chrono::{DateTime, Datelike, NaiveDate, Utc};
use futures::try_join;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::{AttendanceEngine, regularization::Pagination, round2};
use crate::error::EngineError;
use crate::model::{
    attendance::{AttendanceRecord, AttendanceStatus},
    calendar::DayType,
    member::{Member, SchoolClass},
    role::Role,
    stats::AttendanceStatsMonthly,
};
use crate::utils::clock::month_bounds;
use crate::utils::dashboard_cache::{DashboardKey, Window};

pub const LOW_ATTENDANCE_THRESHOLD: f64 = 75.0;
pub const LOW_ATTENDANCE_LIMIT: usize = 20;
pub const TREND_DAYS: usize = 30;
pub const RECENT_ACTIVITY_LIMIT: usize = 50;
pub const DETAIL_PAGE_SIZE: u64 = 50;

/// Roles shown in the role-wise breakdown, by name.
const BREAKDOWN_ROLES: [Role; 4] = [
    Role::Admin,
    Role::NonTeachingStaff,
    Role::Student,
    Role::TeachingStaff,
];

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardFilter {
    /// Target day, today when absent. Ignored when a range is given.
    #[param(value_type = Option<String>, format = Date)]
    pub date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
    /// Restricts the not-marked count and the role-wise breakdown.
    pub role: Option<Role>,
    /// Restricts the class-wise breakdown.
    pub class_id: Option<u64>,
    /// Restricts the attendance record list.
    pub status: Option<AttendanceStatus>,
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 50)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusCounts {
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub half_day: u32,
    pub on_leave: u32,
}

impl StatusCounts {
    pub fn add(&mut self, status: AttendanceStatus) {
        self.total += 1;
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::HalfDay => self.half_day += 1,
            AttendanceStatus::OnLeave => self.on_leave += 1,
        }
    }

    pub fn tally<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.add(record.status);
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TodayOverview {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub day_type: DayType,
    pub holiday_name: Option<String>,
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// Active users expected to mark attendance with no row for the date.
    pub not_marked: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RoleBreakdown {
    pub role: Role,
    pub total_users: u32,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ClassBreakdown {
    pub class_id: u64,
    pub class_name: String,
    pub total_students: u32,
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// PRESENT over enrolled students, 0 for an empty class.
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TrendPoint {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LowAttendanceAlert {
    pub user_id: u64,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub class_name: Option<String>,
    pub section: Option<String>,
    pub attendance_percentage: f64,
    pub total_days: u32,
}

/// Ledger row with the owner and the marker resolved from the directory.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub member: Option<Member>,
    #[schema(example = "Office", nullable = true)]
    pub marked_by_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RecordPage {
    pub data: Vec<RecordView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DashboardWindow {
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Dashboard {
    pub school_id: u64,
    pub window: DashboardWindow,
    pub today_overview: TodayOverview,
    pub role_wise: Vec<RoleBreakdown>,
    pub class_wise: Vec<ClassBreakdown>,
    pub monthly_trend: Vec<TrendPoint>,
    pub low_attendance_alerts: Vec<LowAttendanceAlert>,
    pub pending_approvals: u64,
    pub pending_leave_requests: u64,
    /// Status counts over the whole range. Only set for range requests.
    pub range_summary: Option<StatusCounts>,
    /// Latest marks on the target day, newest first.
    pub recent_activity: Vec<RecordView>,
    /// Day or range rows, newest date first.
    pub attendance_records: RecordPage,
    #[schema(value_type = String, format = "date-time")]
    pub generated_at: DateTime<Utc>,
}

pub fn role_wise(
    members: &[Member],
    day_records: &[&AttendanceRecord],
    role_filter: Option<Role>,
) -> Vec<RoleBreakdown> {
    let role_of: HashMap<u64, Role> = members.iter().map(|m| (m.user_id, m.role)).collect();
    BREAKDOWN_ROLES
        .iter()
        .copied()
        .filter(|role| role_filter.is_none_or(|f| f == *role))
        .map(|role| RoleBreakdown {
            role,
            total_users: members.iter().filter(|m| m.role == role).count() as u32,
            counts: StatusCounts::tally(
                day_records
                    .iter()
                    .copied()
                    .filter(|r| role_of.get(&r.user_id) == Some(&role)),
            ),
        })
        .collect()
}

pub fn class_wise(
    classes: &[SchoolClass],
    members: &[Member],
    day_records: &[&AttendanceRecord],
    class_filter: Option<u64>,
) -> Vec<ClassBreakdown> {
    let by_user: HashMap<u64, &AttendanceRecord> =
        day_records.iter().map(|r| (r.user_id, *r)).collect();

    let mut rows: Vec<ClassBreakdown> = classes
        .iter()
        .filter(|c| class_filter.is_none_or(|f| f == c.id))
        .map(|class| {
            let students: Vec<&Member> = members
                .iter()
                .filter(|m| m.role == Role::Student && m.class_id == Some(class.id))
                .collect();
            let counts = StatusCounts::tally(
                students
                    .iter()
                    .filter_map(|m| by_user.get(&m.user_id).copied()),
            );
            let total_students = students.len() as u32;
            let attendance_percentage = if total_students == 0 {
                0.0
            } else {
                round2(f64::from(counts.present) / f64::from(total_students) * 100.0)
            };
            ClassBreakdown {
                class_id: class.id,
                class_name: class.class_name.clone(),
                total_students,
                counts,
                attendance_percentage,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.class_name.cmp(&b.class_name));
    rows
}

/// Per-day counts, newest first, at most [`TREND_DAYS`] days.
pub fn monthly_trend(month_records: &[AttendanceRecord]) -> Vec<TrendPoint> {
    let mut by_day: BTreeMap<NaiveDate, StatusCounts> = BTreeMap::new();
    for record in month_records {
        by_day.entry(record.date).or_default().add(record.status);
    }
    by_day
        .into_iter()
        .rev()
        .take(TREND_DAYS)
        .map(|(date, counts)| TrendPoint { date, counts })
        .collect()
}

/// Stats rows under the threshold, lowest first, at most [`LOW_ATTENDANCE_LIMIT`].
pub fn low_attendance(
    rows: &[AttendanceStatsMonthly],
    members: &HashMap<u64, &Member>,
) -> Vec<LowAttendanceAlert> {
    let mut low: Vec<&AttendanceStatsMonthly> = rows
        .iter()
        .filter(|s| s.attendance_percentage < LOW_ATTENDANCE_THRESHOLD)
        .collect();
    low.sort_by(|a, b| a.attendance_percentage.total_cmp(&b.attendance_percentage));
    low.into_iter()
        .take(LOW_ATTENDANCE_LIMIT)
        .map(|s| {
            let member = members.get(&s.user_id);
            LowAttendanceAlert {
                user_id: s.user_id,
                name: member.map(|m| m.name.clone()),
                role: member.map(|m| m.role),
                class_name: member.and_then(|m| m.class_name.clone()),
                section: member.and_then(|m| m.section.clone()),
                attendance_percentage: s.attendance_percentage,
                total_days: s.total_days(),
            }
        })
        .collect()
}

/// Newest marks first, at most [`RECENT_ACTIVITY_LIMIT`].
pub fn recent_activity(day_records: &[&AttendanceRecord]) -> Vec<AttendanceRecord> {
    let mut rows: Vec<&AttendanceRecord> = day_records.to_vec();
    rows.sort_by(|a, b| b.marked_at.cmp(&a.marked_at).then(b.id.cmp(&a.id)));
    rows.into_iter()
        .take(RECENT_ACTIVITY_LIMIT)
        .cloned()
        .collect()
}

/// One page of `records` matching `status`, by date then mark time, newest first.
/// Returns the page and the number of matching rows.
pub fn detail_page(
    records: &[AttendanceRecord],
    status: Option<AttendanceStatus>,
    page: u64,
    limit: u64,
) -> (Vec<AttendanceRecord>, u64) {
    let mut rows: Vec<&AttendanceRecord> = records
        .iter()
        .filter(|r| status.is_none_or(|s| s == r.status))
        .collect();
    rows.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then(b.marked_at.cmp(&a.marked_at))
            .then(b.id.cmp(&a.id))
    });
    let total = rows.len() as u64;
    let offset = page.saturating_sub(1).saturating_mul(limit);
    let data = rows
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .cloned()
        .collect();
    (data, total)
}

impl AttendanceEngine {
    fn dashboard_window(&self, filter: &DashboardFilter) -> Result<Window, EngineError> {
        match (filter.start_date, filter.end_date) {
            (Some(from), Some(to)) if from > to => Err(EngineError::validation(
                "start_date",
                "start_date cannot be after end_date",
            )),
            (Some(from), Some(to)) => Ok(Window::Range(from, to)),
            (None, None) => Ok(Window::Day(filter.date.unwrap_or_else(|| self.clock.today()))),
            (Some(_), None) => Err(EngineError::validation(
                "end_date",
                "end_date is required with start_date",
            )),
            (None, Some(_)) => Err(EngineError::validation(
                "start_date",
                "start_date is required with end_date",
            )),
        }
    }

    fn detail_paging(&self, filter: &DashboardFilter) -> (u64, u64) {
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter
            .limit
            .unwrap_or(DETAIL_PAGE_SIZE)
            .clamp(1, self.settings.max_page_size.max(1));
        (page, limit)
    }

    /// Read-through over the dashboard cache.
    pub async fn dashboard(
        &self,
        school_id: u64,
        filter: DashboardFilter,
    ) -> Result<Arc<Dashboard>, EngineError> {
        let window = self.dashboard_window(&filter)?;
        let (page, limit) = self.detail_paging(&filter);
        let key = DashboardKey {
            school_id,
            window,
            role: filter.role,
            class_id: filter.class_id,
            status: filter.status,
            page,
            limit,
        };
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!(school_id, "Dashboard served from cache");
            return Ok(hit);
        }

        let dashboard = Arc::new(self.build_dashboard(school_id, window, &filter).await?);
        self.cache.insert(key, dashboard.clone()).await;
        Ok(dashboard)
    }

    async fn build_dashboard(
        &self,
        school_id: u64,
        window: Window,
        filter: &DashboardFilter,
    ) -> Result<Dashboard, EngineError> {
        let target = window.end();
        let (day, academic_year, members, classes) = try_join!(
            self.calendar.is_working_day(school_id, target),
            self.calendar.active_academic_year(school_id),
            self.directory.active_members(school_id),
            self.directory.classes(school_id)
        )?;
        let members: Vec<Member> = members
            .into_iter()
            .filter(|m| m.role.tracks_attendance())
            .collect();

        let (month_first, month_last) = month_bounds(target);
        let mut tx = self.store.begin().await?;
        let month_records = tx
            .records_for_school(school_id, month_first, month_last)
            .await?;
        let range_records = match window {
            Window::Range(from, to) => Some(tx.records_for_school(school_id, from, to).await?),
            Window::Day(_) => None,
        };
        let pending_approvals = tx.count_pending_approvals(school_id).await?;
        let pending_leave_requests = tx.count_pending_leaves(school_id).await?;
        let stats_rows = match &academic_year {
            Some(year) => {
                tx.stats_for_month(school_id, year.id, target.month(), target.year())
                    .await?
            }
            None => Vec::new(),
        };
        tx.commit().await?;

        let day_records: Vec<&AttendanceRecord> =
            month_records.iter().filter(|r| r.date == target).collect();
        let marked: HashSet<u64> = day_records.iter().map(|r| r.user_id).collect();
        let not_marked = members
            .iter()
            .filter(|m| filter.role.is_none_or(|role| role == m.role))
            .filter(|m| !marked.contains(&m.user_id))
            .count() as u32;
        let member_index: HashMap<u64, &Member> =
            members.iter().map(|m| (m.user_id, m)).collect();

        let recent = recent_activity(&day_records);
        let (page, limit) = self.detail_paging(filter);
        let (detail, total) = match &range_records {
            Some(rows) => detail_page(rows, filter.status, page, limit),
            None => {
                let rows: Vec<AttendanceRecord> = day_records.iter().copied().cloned().collect();
                detail_page(&rows, filter.status, page, limit)
            }
        };
        let people = self.people_for(school_id, recent.iter().chain(&detail)).await?;
        let view = |record: AttendanceRecord| RecordView {
            member: people.get(&record.user_id).cloned(),
            marked_by_name: people.get(&record.marked_by).map(|m| m.name.clone()),
            record,
        };

        Ok(Dashboard {
            school_id,
            window: DashboardWindow {
                start_date: window.start(),
                end_date: target,
            },
            today_overview: TodayOverview {
                date: target,
                day_type: day.day_type,
                holiday_name: day.holiday_name,
                counts: StatusCounts::tally(day_records.iter().copied()),
                not_marked,
            },
            role_wise: role_wise(&members, &day_records, filter.role),
            class_wise: class_wise(&classes, &members, &day_records, filter.class_id),
            monthly_trend: monthly_trend(&month_records),
            low_attendance_alerts: low_attendance(&stats_rows, &member_index),
            pending_approvals,
            pending_leave_requests,
            range_summary: range_records.as_deref().map(StatusCounts::tally),
            recent_activity: recent.into_iter().map(view).collect(),
            attendance_records: RecordPage {
                data: detail.into_iter().map(view).collect(),
                pagination: Pagination {
                    page,
                    limit,
                    total,
                    total_pages: total.div_ceil(limit),
                },
            },
            generated_at: self.clock.now(),
        })
    }

    /// Directory entries for the owners and markers of `records`.
    async fn people_for<'a>(
        &self,
        school_id: u64,
        records: impl Iterator<Item = &'a AttendanceRecord>,
    ) -> Result<HashMap<u64, Member>, EngineError> {
        let ids: Vec<u64> = records
            .flat_map(|r| [r.user_id, r.marked_by])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .directory
            .members(school_id, &ids)
            .await?
            .into_iter()
            .map(|m| (m.user_id, m))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::approval::ApprovalBatch;
    use crate::engine::ledger::Capture;
    use crate::engine::regularization::RegularizationRequest;
    use crate::engine::stats::tally;
    use crate::engine::test_support::{d, engine_at, member, student};
    use crate::model::{attendance::CaptureAttrs, calendar::AcademicYear};
    use crate::store::memory::MemoryStore;
    use crate::store::AttendanceStore;

    async fn mark(engine: &AttendanceEngine, user_id: u64, date: NaiveDate, status: AttendanceStatus) {
        engine
            .capture_or_upsert(
                1,
                Capture {
                    user_id,
                    date,
                    status,
                    marked_by: 1,
                    attrs: CaptureAttrs::default(),
                },
            )
            .await
            .unwrap();
    }

    fn school() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_class(1, SchoolClass { id: 3, class_name: "Grade 5".into() }).unwrap();
        store.add_class(1, SchoolClass { id: 4, class_name: "Grade 1".into() }).unwrap();
        store.add_member(1, student(10, "Asha", 3, "Grade 5")).unwrap();
        store.add_member(1, student(11, "Ravi", 3, "Grade 5")).unwrap();
        store.add_member(1, student(12, "Mina", 3, "Grade 5")).unwrap();
        store.add_member(1, member(20, "Mr. Das", Role::TeachingStaff)).unwrap();
        store.add_member(1, member(30, "Office", Role::Admin)).unwrap();
        store.add_member(1, member(40, "A parent", Role::Parent)).unwrap();
        store
    }

    #[actix_web::test]
    async fn overview_and_breakdowns_for_one_day() {
        let store = school();
        let engine = engine_at(&store, d(2024, 1, 10), 15, 0);
        mark(&engine, 10, d(2024, 1, 10), AttendanceStatus::Present).await;
        mark(&engine, 11, d(2024, 1, 10), AttendanceStatus::Late).await;
        mark(&engine, 20, d(2024, 1, 10), AttendanceStatus::Present).await;
        mark(&engine, 20, d(2024, 1, 9), AttendanceStatus::Absent).await;

        let dash = engine.dashboard(1, DashboardFilter::default()).await.unwrap();

        let overview = &dash.today_overview;
        assert_eq!(overview.date, d(2024, 1, 10));
        assert_eq!(overview.day_type, DayType::WorkingDay);
        assert_eq!(overview.counts.total, 3);
        assert_eq!(overview.counts.present, 2);
        assert_eq!(overview.counts.late, 1);
        // Mina and the admin; parents are not expected to mark.
        assert_eq!(overview.not_marked, 2);

        let roles: Vec<_> = dash.role_wise.iter().map(|r| r.role).collect();
        assert_eq!(
            roles,
            vec![Role::Admin, Role::NonTeachingStaff, Role::Student, Role::TeachingStaff]
        );
        let students = &dash.role_wise[2];
        assert_eq!(students.total_users, 3);
        assert_eq!(students.counts.total, 2);

        assert_eq!(dash.class_wise[0].class_name, "Grade 1");
        assert_eq!(dash.class_wise[0].attendance_percentage, 0.0);
        let grade5 = &dash.class_wise[1];
        assert_eq!(grade5.total_students, 3);
        assert_eq!(grade5.attendance_percentage, 33.33);

        let trend_dates: Vec<_> = dash.monthly_trend.iter().map(|t| t.date).collect();
        assert_eq!(trend_dates, vec![d(2024, 1, 10), d(2024, 1, 9)]);
        assert!(dash.range_summary.is_none());
        assert!(dash.low_attendance_alerts.is_empty());
    }

    #[actix_web::test]
    async fn role_filter_narrows_not_marked_and_breakdown() {
        let store = school();
        let engine = engine_at(&store, d(2024, 1, 10), 15, 0);
        mark(&engine, 10, d(2024, 1, 10), AttendanceStatus::Present).await;

        let dash = engine
            .dashboard(
                1,
                DashboardFilter {
                    role: Some(Role::Student),
                    ..DashboardFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(dash.today_overview.not_marked, 2);
        assert_eq!(dash.role_wise.len(), 1);
        assert_eq!(dash.role_wise[0].role, Role::Student);
    }

    #[actix_web::test]
    async fn range_request_adds_summary_and_counts_pending_triage() {
        let store = school();
        store.set_pending_leaves(1, 4).await;
        let engine = engine_at(&store, d(2024, 2, 5), 15, 0);
        mark(&engine, 10, d(2024, 1, 30), AttendanceStatus::Absent).await;
        mark(&engine, 10, d(2024, 2, 1), AttendanceStatus::Present).await;
        mark(&engine, 11, d(2024, 2, 2), AttendanceStatus::OnLeave).await;

        let mut tx = store.begin().await.unwrap();
        let record = tx.record_on(1, 10, d(2024, 2, 1)).await.unwrap().unwrap();
        tx.update_regularization(record.id, AttendanceStatus::Present, "late bus", Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let dash = engine
            .dashboard(
                1,
                DashboardFilter {
                    start_date: Some(d(2024, 1, 29)),
                    end_date: Some(d(2024, 2, 2)),
                    ..DashboardFilter::default()
                },
            )
            .await
            .unwrap();

        let summary = dash.range_summary.unwrap();
        assert_eq!((summary.total, summary.absent, summary.present, summary.on_leave), (3, 1, 1, 1));
        assert_eq!(dash.today_overview.date, d(2024, 2, 2));
        assert_eq!(dash.pending_approvals, 1);
        assert_eq!(dash.pending_leave_requests, 4);

        assert!(matches!(
            engine
                .dashboard(
                    1,
                    DashboardFilter {
                        start_date: Some(d(2024, 2, 2)),
                        ..DashboardFilter::default()
                    },
                )
                .await,
            Err(EngineError::Validation { field: "end_date", .. })
        ));
    }

    #[actix_web::test]
    async fn low_attendance_alerts_need_an_active_year() {
        let store = school();
        let engine = engine_at(&store, d(2024, 1, 10), 15, 0);
        mark(&engine, 10, d(2024, 1, 8), AttendanceStatus::Absent).await;
        mark(&engine, 10, d(2024, 1, 9), AttendanceStatus::Present).await;
        mark(&engine, 11, d(2024, 1, 9), AttendanceStatus::Present).await;

        store.set_academic_year(
            1,
            AcademicYear {
                id: 5,
                start_date: d(2023, 6, 1),
                end_date: d(2024, 5, 31),
            },
        )
        .unwrap();
        engine.recompute(1, 10, d(2024, 1, 9)).await.unwrap();
        engine.recompute(1, 11, d(2024, 1, 9)).await.unwrap();

        let dash = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        assert_eq!(dash.low_attendance_alerts.len(), 1);
        let alert = &dash.low_attendance_alerts[0];
        assert_eq!(alert.user_id, 10);
        assert_eq!(alert.attendance_percentage, 50.0);
        assert_eq!(alert.name.as_deref(), Some("Asha"));

        store.clear_academic_year(1).unwrap();
        mark(&engine, 12, d(2024, 1, 10), AttendanceStatus::Present).await;
        let dash = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        assert!(dash.low_attendance_alerts.is_empty());
    }

    #[actix_web::test]
    async fn cached_until_a_write_touches_the_month() {
        let store = school();
        let engine = engine_at(&store, d(2024, 1, 10), 15, 0);
        mark(&engine, 10, d(2024, 1, 10), AttendanceStatus::Present).await;

        let first = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        let again = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // A write in another month leaves the entry alone.
        mark(&engine, 10, d(2023, 12, 15), AttendanceStatus::Present).await;
        let still = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &still));

        mark(&engine, 11, d(2024, 1, 3), AttendanceStatus::Absent).await;
        let fresh = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(fresh.monthly_trend.len(), 2);
    }

    fn row(
        id: u64,
        date: NaiveDate,
        status: AttendanceStatus,
        marked_at: DateTime<Utc>,
    ) -> AttendanceRecord {
        AttendanceRecord {
            id,
            school_id: 1,
            user_id: 10,
            date,
            status,
            marked_by: 1,
            marked_at,
            check_in_time: None,
            check_out_time: None,
            working_hours: None,
            is_late_check_in: false,
            late_by_minutes: None,
            remarks: None,
            requires_approval: false,
            approval_status: crate::model::attendance::ApprovalStatus::None,
            approved_by: None,
            approved_at: None,
            approval_remarks: None,
        }
    }

    #[actix_web::test]
    async fn pending_count_follows_requests_for_other_dates() {
        let store = school();
        let engine = engine_at(&store, d(2024, 2, 2), 15, 0);
        let before = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        assert_eq!(before.pending_approvals, 0);

        let receipt = engine
            .request_regularization(
                1,
                RegularizationRequest {
                    user_id: Some(10),
                    date: Some(d(2024, 1, 31)),
                    status: Some(AttendanceStatus::Present),
                    reason: Some("bus broke down".into()),
                    documents: vec![],
                },
            )
            .await
            .unwrap();
        let after = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        assert_eq!(after.pending_approvals, 1);

        engine
            .process_approvals(
                1,
                ApprovalBatch {
                    attendance_ids: vec![receipt.attendance.id],
                    action: "APPROVE".into(),
                    approved_by: Some(30),
                    remarks: None,
                },
            )
            .await
            .unwrap();
        let decided = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        assert_eq!(decided.pending_approvals, 0);
    }

    #[actix_web::test]
    async fn deactivated_members_are_not_expected_to_mark() {
        let store = school();
        let engine = engine_at(&store, d(2024, 1, 10), 15, 0);
        let dash = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        assert_eq!(dash.today_overview.not_marked, 5);

        store.deactivate_member(1, 12).unwrap();
        let engine = engine_at(&store, d(2024, 1, 10), 15, 0);
        let dash = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        assert_eq!(dash.today_overview.not_marked, 4);
        assert_eq!(dash.role_wise[2].total_users, 2);
    }

    #[actix_web::test]
    async fn recent_activity_is_newest_first_with_marker_names() {
        let store = school();
        for (user_id, hh) in [(10, 9), (11, 11), (20, 10)] {
            engine_at(&store, d(2024, 1, 10), hh, 0)
                .capture_or_upsert(
                    1,
                    Capture {
                        user_id,
                        date: d(2024, 1, 10),
                        status: AttendanceStatus::Present,
                        marked_by: 30,
                        attrs: CaptureAttrs::default(),
                    },
                )
                .await
                .unwrap();
        }
        let engine = engine_at(&store, d(2024, 1, 10), 15, 0);
        mark(&engine, 12, d(2024, 1, 9), AttendanceStatus::Absent).await;

        let dash = engine.dashboard(1, DashboardFilter::default()).await.unwrap();
        let users: Vec<_> = dash.recent_activity.iter().map(|v| v.record.user_id).collect();
        assert_eq!(users, vec![11, 20, 10]);
        let latest = &dash.recent_activity[0];
        assert_eq!(latest.marked_by_name.as_deref(), Some("Office"));
        assert_eq!(latest.member.as_ref().map(|m| m.name.as_str()), Some("Ravi"));

        let page = &dash.attendance_records;
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.limit, DETAIL_PAGE_SIZE);
        assert!(page.data.iter().all(|v| v.record.date == d(2024, 1, 10)));
    }

    #[actix_web::test]
    async fn attendance_records_page_through_a_range_by_status() {
        let store = school();
        let engine = engine_at(&store, d(2024, 2, 5), 15, 0);
        mark(&engine, 10, d(2024, 2, 1), AttendanceStatus::Present).await;
        mark(&engine, 11, d(2024, 2, 1), AttendanceStatus::Absent).await;
        mark(&engine, 12, d(2024, 2, 1), AttendanceStatus::Absent).await;
        mark(&engine, 10, d(2024, 2, 2), AttendanceStatus::Absent).await;
        mark(&engine, 11, d(2024, 2, 2), AttendanceStatus::Present).await;

        let filter = DashboardFilter {
            start_date: Some(d(2024, 2, 1)),
            end_date: Some(d(2024, 2, 2)),
            status: Some(AttendanceStatus::Absent),
            limit: Some(2),
            ..DashboardFilter::default()
        };
        let first = engine.dashboard(1, filter.clone()).await.unwrap();
        let page = &first.attendance_records;
        assert_eq!(
            page.pagination,
            Pagination {
                page: 1,
                limit: 2,
                total: 3,
                total_pages: 2
            }
        );
        let dates: Vec<_> = page.data.iter().map(|v| v.record.date).collect();
        assert_eq!(dates, vec![d(2024, 2, 2), d(2024, 2, 1)]);
        assert_eq!(page.data[0].record.user_id, 10);
        assert!(page.data.iter().all(|v| v.record.status == AttendanceStatus::Absent));
        // The summary still covers every status.
        assert_eq!(first.range_summary.map(|s| s.total), Some(5));

        let second = engine
            .dashboard(
                1,
                DashboardFilter {
                    page: Some(2),
                    ..filter.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.attendance_records.data.len(), 1);
        assert_eq!(second.attendance_records.data[0].record.date, d(2024, 2, 1));

        let clamped = engine
            .dashboard(
                1,
                DashboardFilter {
                    limit: Some(10_000),
                    page: Some(u64::MAX),
                    ..filter
                },
            )
            .await
            .unwrap();
        assert_eq!(
            clamped.attendance_records.pagination.limit,
            engine.settings().max_page_size
        );
        assert!(clamped.attendance_records.data.is_empty());
    }

    #[test]
    fn recent_activity_caps_and_orders_by_mark_time() {
        let start = Utc::now();
        let records: Vec<AttendanceRecord> = (0..60u64)
            .map(|i| {
                let marked_at = start + chrono::Duration::minutes(i as i64);
                AttendanceRecord {
                    user_id: 100 + i,
                    ..row(i + 1, d(2024, 1, 10), AttendanceStatus::Present, marked_at)
                }
            })
            .collect();
        let refs: Vec<&AttendanceRecord> = records.iter().collect();
        let recent = recent_activity(&refs);
        assert_eq!(recent.len(), RECENT_ACTIVITY_LIMIT);
        assert_eq!(recent[0].user_id, 159);
        assert!(recent.windows(2).all(|w| w[0].marked_at >= w[1].marked_at));
    }

    #[test]
    fn detail_page_orders_by_date_then_mark_time() {
        let t0 = Utc::now();
        let later = t0 + chrono::Duration::minutes(5);
        let records = vec![
            row(1, d(2024, 1, 9), AttendanceStatus::Absent, later),
            row(2, d(2024, 1, 10), AttendanceStatus::Absent, t0),
            row(3, d(2024, 1, 10), AttendanceStatus::Absent, later),
            row(4, d(2024, 1, 8), AttendanceStatus::Present, later),
        ];
        let (all, total) = detail_page(&records, None, 1, 10);
        assert_eq!(total, 4);
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2, 1, 4]);

        let (absent, total) = detail_page(&records, Some(AttendanceStatus::Absent), 2, 2);
        assert_eq!(total, 3);
        assert_eq!(absent.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn trend_and_alert_caps() {
        let now = Utc::now();
        let records: Vec<AttendanceRecord> = (1..=31)
            .map(|day| row(u64::from(day), d(2024, 1, day), AttendanceStatus::Present, now))
            .collect();
        let trend = monthly_trend(&records);
        assert_eq!(trend.len(), TREND_DAYS);
        assert_eq!(trend[0].date, d(2024, 1, 31));
        assert_eq!(trend[29].date, d(2024, 1, 2));

        let rows: Vec<AttendanceStatsMonthly> = (0..25u32)
            .map(|i| {
                let mut row = tally(1, u64::from(i), 5, d(2024, 1, 1), &[], now);
                row.attendance_percentage = 70.0 - f64::from(i);
                row
            })
            .collect();
        let alerts = low_attendance(&rows, &HashMap::new());
        assert_eq!(alerts.len(), LOW_ATTENDANCE_LIMIT);
        assert_eq!(alerts[0].attendance_percentage, 46.0);
        assert!(alerts.windows(2).all(|w| w[0].attendance_percentage <= w[1].attendance_percentage));
    }
}
