use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use super::{AttendanceEngine, stats::recompute_in};
use crate::error::EngineError;
use crate::model::{
    attendance::{ApprovalStatus, AttendanceRecord},
    notification::{NewNotification, NotificationType},
};
use crate::store::{Decision, LedgerTx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    fn decided_status(self) -> ApprovalStatus {
        match self {
            ApprovalAction::Approve => ApprovalStatus::Approved,
            ApprovalAction::Reject => ApprovalStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ApprovalBatch {
    #[schema(example = json!([41, 42]))]
    pub attendance_ids: Vec<u64>,
    /// `APPROVE` or `REJECT`
    #[schema(example = "APPROVE")]
    pub action: String,
    #[schema(example = 1)]
    pub approved_by: Option<u64>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    NotFound,
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FailedItem {
    pub attendance_id: u64,
    pub reason: FailureReason,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DecidedItem {
    pub attendance_id: u64,
    pub user_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct BatchOutcome {
    pub approved: Vec<DecidedItem>,
    pub rejected: Vec<DecidedItem>,
    pub failed: Vec<FailedItem>,
}

async fn lookup(
    tx: &mut dyn LedgerTx,
    school_id: u64,
    id: u64,
) -> Result<AttendanceRecord, EngineError> {
    let record = tx
        .record_by_id(id)
        .await?
        .ok_or(EngineError::NotFound { id })?;
    if record.school_id != school_id {
        return Err(EngineError::Authorization {
            id,
            expected_school: school_id,
            actual_school: record.school_id,
        });
    }
    Ok(record)
}

fn notification_for(
    record: &AttendanceRecord,
    action: ApprovalAction,
    remarks: Option<&str>,
    now: DateTime<Utc>,
) -> NewNotification {
    let (notification_type, outcome, verb) = match action {
        ApprovalAction::Approve => (NotificationType::LeaveApproved, "Approved", "approved"),
        ApprovalAction::Reject => (NotificationType::LeaveRejected, "Rejected", "rejected"),
    };
    let mut message = format!(
        "Your attendance request for {} has been {verb}.",
        record.date
    );
    if let Some(remarks) = remarks {
        message.push_str(" Reason: ");
        message.push_str(remarks);
    }
    NewNotification {
        school_id: record.school_id,
        user_id: record.user_id,
        notification_type,
        title: format!("Attendance Regularization {outcome}"),
        message,
        scheduled_for: now,
    }
}

impl AttendanceEngine {
    /// Applies one decision to many records inside a single transaction.
    ///
    /// Missing and foreign ids are reported in `failed`. Any other error,
    /// including a record that was already decided, rolls the batch back.
    pub async fn process_approvals(
        &self,
        school_id: u64,
        batch: ApprovalBatch,
    ) -> Result<BatchOutcome, EngineError> {
        let action = ApprovalAction::from_str(&batch.action).map_err(|_| {
            EngineError::InvalidAction {
                action: batch.action.clone(),
            }
        })?;
        let approved_by = batch
            .approved_by
            .ok_or_else(|| EngineError::validation("approved_by", "approved_by is required"))?;
        if batch.attendance_ids.is_empty() {
            return Err(EngineError::validation(
                "attendance_ids",
                "at least one attendance id is required",
            ));
        }

        let mut seen = HashSet::new();
        let ids: Vec<u64> = batch
            .attendance_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
        let remarks = batch
            .remarks
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let academic_year = match action {
            ApprovalAction::Approve => {
                let year = self.calendar.active_academic_year(school_id).await?;
                if year.is_none() {
                    let skipped = EngineError::NoActiveAcademicYear { school_id };
                    tracing::debug!(school_id, reason = %skipped, "Approvals will not recompute stats");
                }
                year
            }
            ApprovalAction::Reject => None,
        };

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut outcome = BatchOutcome::default();

        for id in ids {
            let record = match lookup(&mut *tx, school_id, id).await {
                Ok(record) => record,
                Err(e) if e.is_item_level() => {
                    tracing::warn!(school_id, attendance_id = id, error = %e, "Approval item skipped");
                    outcome.failed.push(FailedItem {
                        attendance_id: id,
                        reason: match &e {
                            EngineError::NotFound { .. } => FailureReason::NotFound,
                            _ => FailureReason::Unauthorized,
                        },
                        message: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            if record.approval_status.is_terminal() {
                return Err(EngineError::Conflict {
                    id,
                    approval_status: record.approval_status,
                });
            }

            tx.record_decision(
                id,
                &Decision {
                    approval_status: action.decided_status(),
                    approved_by,
                    approved_at: now,
                    approval_remarks: remarks.clone(),
                },
            )
            .await?;

            if let Some(year) = &academic_year {
                recompute_in(&mut *tx, year, school_id, record.user_id, record.date, now).await?;
            }

            tx.enqueue_notification(notification_for(&record, action, remarks.as_deref(), now))
                .await?;

            let item = DecidedItem {
                attendance_id: id,
                user_id: record.user_id,
                date: record.date,
            };
            match action {
                ApprovalAction::Approve => outcome.approved.push(item),
                ApprovalAction::Reject => outcome.rejected.push(item),
            }
        }

        tx.commit().await?;

        self.cache.invalidate_school(school_id);
        tracing::info!(
            school_id,
            approved_by,
            action = %action,
            approved = outcome.approved.len(),
            rejected = outcome.rejected.len(),
            failed = outcome.failed.len(),
            "Approval batch committed"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::regularization::RegularizationRequest;
    use crate::engine::test_support::{d, engine_at};
    use crate::model::{attendance::AttendanceStatus, calendar::AcademicYear};
    use crate::store::memory::MemoryStore;

    fn year() -> AcademicYear {
        AcademicYear {
            id: 5,
            start_date: d(2023, 6, 1),
            end_date: d(2024, 5, 31),
        }
    }

    async fn pending(engine: &AttendanceEngine, school_id: u64, user_id: u64, date: NaiveDate) -> u64 {
        engine
            .request_regularization(
                school_id,
                RegularizationRequest {
                    user_id: Some(user_id),
                    date: Some(date),
                    status: Some(AttendanceStatus::Present),
                    reason: Some("forgot to mark".into()),
                    documents: Vec::new(),
                },
            )
            .await
            .unwrap()
            .attendance
            .id
    }

    fn batch(ids: Vec<u64>, action: &str) -> ApprovalBatch {
        ApprovalBatch {
            attendance_ids: ids,
            action: action.to_string(),
            approved_by: Some(1),
            remarks: None,
        }
    }

    #[actix_web::test]
    async fn end_to_end_regularize_approve_updates_stats_and_notifies() {
        let store = MemoryStore::new();
        store.set_academic_year(1, year()).unwrap();
        let engine = engine_at(&store, d(2024, 1, 15), 10, 0);

        let id = pending(&engine, 1, 7, d(2024, 1, 10)).await;
        let outcome = engine
            .process_approvals(1, batch(vec![id], "APPROVE"))
            .await
            .unwrap();
        assert_eq!(outcome.approved.len(), 1);
        assert!(outcome.failed.is_empty());

        let state = store.snapshot().await;
        let record = &state.records[&id];
        assert_eq!(record.approval_status, ApprovalStatus::Approved);
        assert_eq!(record.approved_by, Some(1));

        let stats = &state.stats[&(7, 5, 1, 2024)];
        assert_eq!(stats.total_present, 1);
        assert_eq!(stats.attendance_percentage, 100.0);

        assert_eq!(state.notifications.len(), 1);
        let note = &state.notifications[0];
        assert_eq!(note.user_id, 7);
        assert_eq!(note.notification_type, NotificationType::LeaveApproved);
        assert_eq!(note.title, "Attendance Regularization Approved");
        assert_eq!(
            note.message,
            "Your attendance request for 2024-01-10 has been approved."
        );
        assert_eq!(note.status, "PENDING");
    }

    #[actix_web::test]
    async fn foreign_and_missing_ids_fail_per_item() {
        let store = MemoryStore::new();
        let engine = engine_at(&store, d(2024, 1, 15), 10, 0);
        let a = pending(&engine, 1, 7, d(2024, 1, 10)).await;
        let b = pending(&engine, 1, 8, d(2024, 1, 10)).await;
        let foreign = pending(&engine, 2, 9, d(2024, 1, 10)).await;

        let outcome = engine
            .process_approvals(1, batch(vec![a, foreign, b, 999], "REJECT"))
            .await
            .unwrap();

        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(
            outcome
                .failed
                .iter()
                .map(|f| (f.attendance_id, f.reason))
                .collect::<Vec<_>>(),
            vec![
                (foreign, FailureReason::Unauthorized),
                (999, FailureReason::NotFound)
            ]
        );

        let state = store.snapshot().await;
        assert_eq!(state.records[&a].approval_status, ApprovalStatus::Rejected);
        assert_eq!(state.records[&b].approval_status, ApprovalStatus::Rejected);
        assert_eq!(state.records[&foreign].approval_status, ApprovalStatus::Pending);
        assert!(state.stats.is_empty());
    }

    #[actix_web::test]
    async fn bad_input_is_refused_before_any_item() {
        let store = MemoryStore::new();
        let engine = engine_at(&store, d(2024, 1, 15), 10, 0);
        let id = pending(&engine, 1, 7, d(2024, 1, 10)).await;

        assert!(matches!(
            engine.process_approvals(1, batch(vec![id], "approve")).await,
            Err(EngineError::InvalidAction { .. })
        ));
        assert!(matches!(
            engine.process_approvals(1, batch(Vec::new(), "APPROVE")).await,
            Err(EngineError::Validation { field: "attendance_ids", .. })
        ));
        let mut anonymous = batch(vec![id], "APPROVE");
        anonymous.approved_by = None;
        assert!(matches!(
            engine.process_approvals(1, anonymous).await,
            Err(EngineError::Validation { field: "approved_by", .. })
        ));

        assert_eq!(
            store.snapshot().await.records[&id].approval_status,
            ApprovalStatus::Pending
        );
    }

    #[actix_web::test]
    async fn decided_record_aborts_the_whole_batch() {
        let store = MemoryStore::new();
        let engine = engine_at(&store, d(2024, 1, 15), 10, 0);
        let decided = pending(&engine, 1, 7, d(2024, 1, 10)).await;
        let fresh = pending(&engine, 1, 8, d(2024, 1, 10)).await;
        engine
            .process_approvals(1, batch(vec![decided], "APPROVE"))
            .await
            .unwrap();

        let err = engine
            .process_approvals(1, batch(vec![fresh, decided], "REJECT"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { id, .. } if id == decided));

        let state = store.snapshot().await;
        assert_eq!(state.records[&fresh].approval_status, ApprovalStatus::Pending);
        assert_eq!(state.records[&decided].approval_status, ApprovalStatus::Approved);
        assert_eq!(state.notifications.len(), 1);
    }

    #[actix_web::test]
    async fn decided_record_is_frozen_against_new_requests() {
        let store = MemoryStore::new();
        let engine = engine_at(&store, d(2024, 1, 15), 10, 0);
        let id = pending(&engine, 1, 7, d(2024, 1, 10)).await;
        engine
            .process_approvals(1, batch(vec![id], "REJECT"))
            .await
            .unwrap();

        let err = engine
            .request_regularization(
                1,
                RegularizationRequest {
                    user_id: Some(7),
                    date: Some(d(2024, 1, 10)),
                    status: Some(AttendanceStatus::OnLeave),
                    reason: Some("try again".into()),
                    documents: Vec::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));

        let record = &store.snapshot().await.records[&id];
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.remarks.as_deref(), Some("forgot to mark"));
    }

    #[actix_web::test]
    async fn store_failure_rolls_back_every_item() {
        let store = MemoryStore::new();
        store.set_academic_year(1, year()).unwrap();
        let engine = engine_at(&store, d(2024, 1, 15), 10, 0);
        let a = pending(&engine, 1, 7, d(2024, 1, 10)).await;
        let b = pending(&engine, 1, 8, d(2024, 1, 11)).await;

        store.fail_notifications(true);
        let err = engine
            .process_approvals(1, batch(vec![a, b], "APPROVE"))
            .await
            .unwrap_err();
        assert!(err.is_infrastructure());

        let state = store.snapshot().await;
        assert_eq!(state.records[&a].approval_status, ApprovalStatus::Pending);
        assert_eq!(state.records[&b].approval_status, ApprovalStatus::Pending);
        assert!(state.stats.is_empty());
        assert!(state.notifications.is_empty());
    }

    #[actix_web::test]
    async fn duplicate_ids_are_decided_once_with_remarks_in_message() {
        let store = MemoryStore::new();
        let engine = engine_at(&store, d(2024, 1, 15), 10, 0);
        let id = pending(&engine, 1, 7, d(2024, 1, 10)).await;

        let mut rejection = batch(vec![id, id], "REJECT");
        rejection.remarks = Some("no evidence".into());
        let outcome = engine.process_approvals(1, rejection).await.unwrap();
        assert_eq!(outcome.rejected.len(), 1);

        let state = store.snapshot().await;
        assert_eq!(state.notifications.len(), 1);
        assert_eq!(
            state.notifications[0].message,
            "Your attendance request for 2024-01-10 has been rejected. Reason: no evidence"
        );
        assert_eq!(
            state.records[&id].approval_remarks.as_deref(),
            Some("no evidence")
        );
    }
}
