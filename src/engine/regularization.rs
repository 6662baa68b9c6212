use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

use super::AttendanceEngine;
use crate::error::EngineError;
use crate::model::{
    attendance::{
        ApprovalStatus, AttendanceRecord, AttendanceStatus, CaptureAttrs, NewAttendance,
        NewDocument, RegularizationDocument,
    },
    member::Member,
};
use crate::store::{PendingQuery, StatusFilter};

/// Correction request for a past day. Every field but `documents` is required.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RegularizationRequest {
    #[schema(example = 1000)]
    pub user_id: Option<u64>,
    #[schema(example = "2024-01-10", format = "date", value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    pub status: Option<AttendanceStatus>,
    #[schema(example = "forgot to mark")]
    pub reason: Option<String>,
    #[serde(default)]
    pub documents: Vec<NewDocument>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegularizationReceipt {
    pub attendance: AttendanceRecord,
    pub documents: Vec<RegularizationDocument>,
}

/// Query string of the regularization listing.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PendingFilter {
    /// `ALL`, one approval status or a comma separated list. Defaults to `PENDING`.
    #[param(example = "PENDING,REJECTED")]
    pub status: Option<String>,
    pub user_id: Option<u64>,
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
    /// 1-based
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingItem {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    #[schema(example = 3)]
    pub days_old: i64,
    pub is_past_date: bool,
    pub documents: Vec<RegularizationDocument>,
    pub member: Option<Member>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Pagination {
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 20)]
    pub limit: u64,
    #[schema(example = 42)]
    pub total: u64,
    #[schema(example = 3)]
    pub total_pages: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingPage {
    pub data: Vec<PendingItem>,
    pub pagination: Pagination,
}

impl StatusFilter {
    /// Resolves the `status` query parameter once at the boundary.
    pub fn parse(raw: Option<&str>) -> Result<Self, EngineError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(StatusFilter::default());
        };
        if raw.eq_ignore_ascii_case("ALL") {
            return Ok(StatusFilter::All);
        }

        let mut statuses = BTreeSet::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let status = ApprovalStatus::from_str(&part.to_ascii_uppercase()).map_err(|_| {
                EngineError::validation("status", format!("unknown approval status {part:?}"))
            })?;
            statuses.insert(status);
        }

        if statuses.is_empty() {
            return Ok(StatusFilter::default());
        }
        Ok(StatusFilter::OneOf(statuses))
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, EngineError> {
    value.ok_or_else(|| EngineError::validation(field, format!("{field} is required")))
}

impl AttendanceEngine {
    /// Opens or replaces a pending correction for a strictly past day.
    pub async fn request_regularization(
        &self,
        school_id: u64,
        request: RegularizationRequest,
    ) -> Result<RegularizationReceipt, EngineError> {
        let user_id = required(request.user_id, "user_id")?;
        let date = required(request.date, "date")?;
        let status = required(request.status, "status")?;
        let reason = required(
            request
                .reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            "reason",
        )?;
        if request
            .documents
            .iter()
            .any(|doc| doc.url.trim().is_empty() || doc.name.trim().is_empty())
        {
            return Err(EngineError::validation(
                "documents",
                "every document needs a url and a name",
            ));
        }

        let today = self.clock.today();
        if date >= today {
            return Err(EngineError::InvalidDate { date, today });
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let attendance = match tx.record_on(school_id, user_id, date).await? {
            Some(existing) => {
                if existing.approval_status.is_terminal() {
                    return Err(EngineError::Conflict {
                        id: existing.id,
                        approval_status: existing.approval_status,
                    });
                }
                tx.update_regularization(existing.id, status, &reason, now)
                    .await?;
                AttendanceRecord {
                    status,
                    remarks: Some(reason),
                    requires_approval: true,
                    approval_status: ApprovalStatus::Pending,
                    marked_at: now,
                    ..existing
                }
            }
            None => {
                tx.insert_record(NewAttendance {
                    school_id,
                    user_id,
                    date,
                    status,
                    marked_by: user_id,
                    marked_at: now,
                    attrs: CaptureAttrs {
                        remarks: Some(reason),
                        ..CaptureAttrs::default()
                    },
                    requires_approval: true,
                    approval_status: ApprovalStatus::Pending,
                })
                .await?
            }
        };

        let documents = if request.documents.is_empty() {
            Vec::new()
        } else {
            tx.insert_documents(attendance.id, &request.documents, now)
                .await?
        };
        tx.commit().await?;

        self.cache.invalidate_school(school_id);
        tracing::info!(
            school_id,
            user_id,
            attendance_id = attendance.id,
            %date,
            requested_status = %status,
            documents = documents.len(),
            "Regularization requested"
        );

        Ok(RegularizationReceipt {
            attendance,
            documents,
        })
    }

    pub async fn list_pending(
        &self,
        school_id: u64,
        filter: PendingFilter,
    ) -> Result<PendingPage, EngineError> {
        let status = StatusFilter::parse(filter.status.as_deref())?;
        if let (Some(from), Some(to)) = (filter.start_date, filter.end_date)
            && from > to
        {
            return Err(EngineError::validation(
                "start_date",
                "start_date cannot be after end_date",
            ));
        }

        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter
            .limit
            .unwrap_or(self.settings.default_page_size)
            .clamp(1, self.settings.max_page_size);
        let query = PendingQuery {
            status,
            user_id: filter.user_id,
            from: filter.start_date,
            to: filter.end_date,
            page,
            limit,
        };

        let mut tx = self.store.begin().await?;
        let (records, total) = tx.list_pending(school_id, &query).await?;
        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        let documents = tx.documents_for(&ids).await?;
        tx.commit().await?;

        let user_ids: Vec<u64> = records
            .iter()
            .map(|r| r.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let members: HashMap<u64, Member> = self
            .directory
            .members(school_id, &user_ids)
            .await?
            .into_iter()
            .map(|m| (m.user_id, m))
            .collect();

        let mut docs_by_record: HashMap<u64, Vec<RegularizationDocument>> = HashMap::new();
        for doc in documents {
            docs_by_record.entry(doc.attendance_id).or_default().push(doc);
        }

        let today = self.clock.today();
        let data = records
            .into_iter()
            .map(|record| PendingItem {
                days_old: (today - record.date).num_days(),
                is_past_date: record.date < today,
                documents: docs_by_record.remove(&record.id).unwrap_or_default(),
                member: members.get(&record.user_id).cloned(),
                record,
            })
            .collect();

        Ok(PendingPage {
            data,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages: total.div_ceil(limit),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ledger::Capture;
    use crate::engine::test_support::{d, engine_at, student};
    use crate::store::memory::MemoryStore;

    fn request(user_id: u64, date: NaiveDate, reason: &str) -> RegularizationRequest {
        RegularizationRequest {
            user_id: Some(user_id),
            date: Some(date),
            status: Some(AttendanceStatus::Present),
            reason: Some(reason.to_string()),
            documents: Vec::new(),
        }
    }

    #[test]
    fn status_filter_parsing() {
        assert_eq!(StatusFilter::parse(None).unwrap(), StatusFilter::default());
        assert_eq!(StatusFilter::parse(Some("all")).unwrap(), StatusFilter::All);
        assert_eq!(
            StatusFilter::parse(Some("approved, Rejected")).unwrap(),
            StatusFilter::OneOf(BTreeSet::from([
                ApprovalStatus::Approved,
                ApprovalStatus::Rejected
            ]))
        );
        assert!(matches!(
            StatusFilter::parse(Some("PENDING,LOST")),
            Err(EngineError::Validation { field: "status", .. })
        ));
    }

    #[actix_web::test]
    async fn missing_fields_are_named() {
        let store = MemoryStore::new();
        let engine = engine_at(&store, d(2024, 1, 11), 10, 0);

        for (broken, field) in [
            (RegularizationRequest { user_id: None, ..request(7, d(2024, 1, 10), "x") }, "user_id"),
            (RegularizationRequest { date: None, ..request(7, d(2024, 1, 10), "x") }, "date"),
            (RegularizationRequest { status: None, ..request(7, d(2024, 1, 10), "x") }, "status"),
            (request(7, d(2024, 1, 10), "   "), "reason"),
        ] {
            match engine.request_regularization(1, broken).await {
                Err(EngineError::Validation { field: got, .. }) => assert_eq!(got, field),
                other => panic!("expected validation error for {field}, got {other:?}"),
            }
        }
        assert!(store.snapshot().await.records.is_empty());
    }

    #[actix_web::test]
    async fn today_and_future_are_rejected_without_writing() {
        let store = MemoryStore::new();
        let engine = engine_at(&store, d(2024, 1, 11), 10, 0);

        for date in [d(2024, 1, 11), d(2024, 1, 12)] {
            let err = engine
                .request_regularization(1, request(7, date, "forgot"))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidDate { today, .. } if today == d(2024, 1, 11)));
        }
        assert!(store.snapshot().await.records.is_empty());
    }

    #[actix_web::test]
    async fn request_creates_pending_record_with_documents() {
        let store = MemoryStore::new();
        let engine = engine_at(&store, d(2024, 1, 11), 10, 0);
        let mut req = request(7, d(2024, 1, 10), "forgot to mark");
        req.documents.push(NewDocument {
            document_type: "NOTE".into(),
            url: "https://files.example.com/n.pdf".into(),
            name: "n.pdf".into(),
        });

        let receipt = engine.request_regularization(1, req).await.unwrap();
        let record = &receipt.attendance;
        assert_eq!(record.approval_status, ApprovalStatus::Pending);
        assert!(record.requires_approval);
        assert_eq!(record.marked_by, 7);
        assert_eq!(record.remarks.as_deref(), Some("forgot to mark"));
        assert_eq!(receipt.documents.len(), 1);
        assert_eq!(receipt.documents[0].attendance_id, record.id);
    }

    #[actix_web::test]
    async fn re_request_replaces_pending_and_keeps_telemetry() {
        let store = MemoryStore::new();
        let engine = engine_at(&store, d(2024, 1, 11), 10, 0);
        let checked_in = d(2024, 1, 10).and_hms_opt(9, 2, 0).unwrap().and_utc();
        engine
            .capture_or_upsert(
                1,
                Capture {
                    user_id: 7,
                    date: d(2024, 1, 10),
                    status: AttendanceStatus::Absent,
                    marked_by: 1,
                    attrs: CaptureAttrs {
                        check_in_time: Some(checked_in),
                        ..CaptureAttrs::default()
                    },
                },
            )
            .await
            .unwrap();

        engine
            .request_regularization(1, request(7, d(2024, 1, 10), "first"))
            .await
            .unwrap();
        let mut second = request(7, d(2024, 1, 10), "second");
        second.status = Some(AttendanceStatus::HalfDay);
        let receipt = engine.request_regularization(1, second).await.unwrap();

        let state = store.snapshot().await;
        assert_eq!(state.records.len(), 1);
        let stored = &state.records[&receipt.attendance.id];
        assert_eq!(stored.status, AttendanceStatus::HalfDay);
        assert_eq!(stored.remarks.as_deref(), Some("second"));
        assert_eq!(stored.check_in_time, Some(checked_in));
        assert_eq!(stored.approval_status, ApprovalStatus::Pending);
    }

    #[actix_web::test]
    async fn listing_orders_paginates_and_enriches() {
        let store = MemoryStore::new();
        store.add_member(1, student(7, "Asha", 3, "Grade 5")).unwrap();
        let engine = engine_at(&store, d(2024, 1, 20), 10, 0);
        for day in [5, 15, 10] {
            engine
                .request_regularization(1, request(7, d(2024, 1, day), "late bus"))
                .await
                .unwrap();
        }
        engine
            .request_regularization(2, request(7, d(2024, 1, 12), "other school"))
            .await
            .unwrap();

        let page = engine
            .list_pending(
                1,
                PendingFilter {
                    limit: Some(2),
                    ..PendingFilter::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            page.pagination,
            Pagination {
                page: 1,
                limit: 2,
                total: 3,
                total_pages: 2
            }
        );
        let dates: Vec<_> = page.data.iter().map(|i| i.record.date).collect();
        assert_eq!(dates, vec![d(2024, 1, 15), d(2024, 1, 10)]);
        assert_eq!(page.data[0].days_old, 5);
        assert!(page.data[0].is_past_date);
        assert_eq!(page.data[0].member.as_ref().map(|m| m.name.as_str()), Some("Asha"));

        let ranged = engine
            .list_pending(
                1,
                PendingFilter {
                    start_date: Some(d(2024, 1, 1)),
                    end_date: Some(d(2024, 1, 9)),
                    ..PendingFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ranged.data.len(), 1);
        assert_eq!(ranged.data[0].record.date, d(2024, 1, 5));

        let approved_only = engine
            .list_pending(
                1,
                PendingFilter {
                    status: Some("APPROVED".into()),
                    ..PendingFilter::default()
                },
            )
            .await
            .unwrap();
        assert!(approved_only.data.is_empty());
    }

    #[actix_web::test]
    async fn page_far_past_the_end_is_empty() {
        let store = MemoryStore::new();
        let engine = engine_at(&store, d(2024, 1, 20), 10, 0);
        engine
            .request_regularization(1, request(7, d(2024, 1, 5), "late bus"))
            .await
            .unwrap();

        let page = engine
            .list_pending(
                1,
                PendingFilter {
                    page: Some(u64::MAX),
                    limit: Some(100),
                    ..PendingFilter::default()
                },
            )
            .await
            .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.page, u64::MAX);
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.pagination.total_pages, 1);
    }
}
