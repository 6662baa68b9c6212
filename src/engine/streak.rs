use chrono::NaiveDate;

use super::AttendanceEngine;
use crate::error::EngineError;
use crate::store::LedgerTx;

/// Rows scanned per streak lookup. Longer streaks report this many at most.
pub const STREAK_LOOKBACK: u32 = 100;

/// Counts consecutive PRESENT/LATE days ending today.
///
/// `dates` must be newest first. A date whose distance from `today` equals
/// the running count extends the streak; the first gap ends it.
pub fn consecutive_days(today: NaiveDate, dates: &[NaiveDate]) -> u32 {
    let mut streak: u32 = 0;
    for date in dates {
        let offset = (today - *date).num_days();
        if offset < 0 {
            continue;
        }
        if offset == i64::from(streak) {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

pub(crate) async fn streak_in(
    tx: &mut dyn LedgerTx,
    school_id: u64,
    user_id: u64,
    today: NaiveDate,
) -> Result<u32, EngineError> {
    let dates = tx
        .recent_present_dates(school_id, user_id, STREAK_LOOKBACK, today)
        .await?;
    Ok(consecutive_days(today, &dates))
}

impl AttendanceEngine {
    pub async fn streak(&self, school_id: u64, user_id: u64) -> Result<u32, EngineError> {
        let mut tx = self.store.begin().await?;
        let streak = streak_in(&mut *tx, school_id, user_id, self.clock.today()).await?;
        tx.commit().await?;
        Ok(streak)
    }
}
