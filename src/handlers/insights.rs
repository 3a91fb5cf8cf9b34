use crate::db::SnapshotStore;
use crate::middleware::RequireKeyAuth;
use crate::service::insights::{FunnelSummary, funnel_summary};
use crate::{PulseError, router::PulseState};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;

/// Window used when the caller gives no `start`.
const DEFAULT_WINDOW_DAYS: u64 = 28;

#[derive(Debug, Deserialize)]
pub struct FunnelQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl FunnelQuery {
    /// Defaults to the 28 days ending yesterday.
    fn resolve(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), PulseError> {
        let end = match self.end {
            Some(end) => end,
            None => today.checked_sub_days(Days::new(1)).unwrap_or(today),
        };
        let start = match self.start {
            Some(start) => start,
            None => end
                .checked_sub_days(Days::new(DEFAULT_WINDOW_DAYS - 1))
                .unwrap_or(end),
        };
        if start > end {
            return Err(PulseError::BadRequest(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok((start, end))
    }
}

/// GET /api/channels/{channel_id}/funnel?start=YYYY-MM-DD&end=YYYY-MM-DD
pub async fn funnel_handler(
    _auth: RequireKeyAuth,
    State(state): State<PulseState>,
    Path(channel_id): Path<String>,
    Query(query): Query<FunnelQuery>,
) -> Result<Json<FunnelSummary>, PulseError> {
    let (start, end) = query.resolve(Utc::now().date_naive())?;
    let videos = state.store.videos_for_channel(&channel_id).await?;
    let snapshots = state
        .store
        .snapshots_for_channel(&channel_id, start, end)
        .await?;
    Ok(Json(funnel_summary(
        &channel_id,
        start,
        end,
        &videos,
        &snapshots,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn default_window_ends_yesterday() {
        let q = FunnelQuery {
            start: None,
            end: None,
        };
        let (start, end) = q.resolve(date("2026-10-18")).unwrap();
        assert_eq!(end, date("2026-10-17"));
        assert_eq!(start, date("2026-09-20"));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let q = FunnelQuery {
            start: Some(date("2026-10-10")),
            end: Some(date("2026-10-01")),
        };
        assert!(matches!(
            q.resolve(date("2026-10-18")),
            Err(PulseError::BadRequest(_))
        ));
    }
}
