use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::schema::post_views;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = post_views)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PostView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_key: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = post_views)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewPostView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_key: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub viewed_at: DateTime<Utc>,
}

/// Who is looking: carried from the request into view recording
#[derive(Debug, Clone, Default)]
pub struct ViewerContext {
    pub user_id: Option<Uuid>,
    pub session_key: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl NewPostView {
    pub fn from_viewer(post_id: Uuid, viewer: &ViewerContext, now: DateTime<Utc>) -> Self {
        NewPostView {
            id: Uuid::new_v4(),
            post_id,
            user_id: viewer.user_id,
            session_key: viewer.session_key.clone(),
            ip_address: viewer.ip_address.clone(),
            user_agent: viewer.user_agent.clone(),
            viewed_at: now,
        }
    }
}

/// One calendar-day bucket of the trailing-30-day histogram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyViewCount {
    pub date: NaiveDate,
    pub count: i64,
}

/// Group view timestamps by calendar day, ascending. Days with no
/// views produce no bucket.
pub fn bucket_views_by_day(viewed_at: &[DateTime<Utc>]) -> Vec<DailyViewCount> {
    let mut buckets: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for ts in viewed_at {
        *buckets.entry(ts.date_naive()).or_insert(0) += 1;
    }
    buckets
        .into_iter()
        .map(|(date, count)| DailyViewCount { date, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn buckets_group_by_calendar_day_ascending() {
        let day1 = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let day1_later = Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 0).unwrap();
        let day3 = Utc.with_ymd_and_hms(2025, 6, 3, 0, 1, 0).unwrap();

        let buckets = bucket_views_by_day(&[day3, day1, day1_later]);
        assert_eq!(
            buckets,
            vec![
                DailyViewCount {
                    date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                    count: 2
                },
                DailyViewCount {
                    date: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn empty_window_yields_no_buckets() {
        assert!(bucket_views_by_day(&[]).is_empty());
    }
}
