//! Alternate aggregation path fed by the external `fetch-wagers` function.
//!
//! Unlike the bucket path, which carries an `activityScore` per entry, this
//! path derives the score from the population itself, so the same user can
//! score differently when the result set changes.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::derived::relative_activity_scores;
use crate::period::{display_bucket_date, BucketKey, Granularity};
use crate::sorting::{SortField, SortKeys};
use crate::types::{ChartPoint, FetchWagersResponse};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizedUser {
    pub uid: String,
    pub username: String,
    pub wagered: f64,
    pub weighted_wagered: f64,
    pub last_seen: Option<String>,
    pub activity_score: u32,
}

impl SortKeys for VisualizedUser {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn service(&self) -> Option<&str> {
        None
    }

    fn numeric(&self, field: SortField) -> f64 {
        match field {
            SortField::Wagered => self.wagered,
            SortField::WeightedWagered => self.weighted_wagered,
            SortField::ActivityScore => f64::from(self.activity_score),
            SortField::Username | SortField::LastSeen => 0.0,
        }
    }

    fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    pub chart: Vec<ChartPoint>,
    pub users: Vec<VisualizedUser>,
    pub unique_users: usize,
    pub total_wagered: f64,
    pub total_weighted_wagered: f64,
}

pub fn build_visualization(resp: &FetchWagersResponse) -> Visualization {
    let mut buckets: BTreeMap<BucketKey, f64> = BTreeMap::new();
    for agg in resp.aggregates.iter().filter(|a| !a.date.trim().is_empty()) {
        *buckets.entry(BucketKey::new(&agg.date)).or_insert(0.0) += agg.wagered;
    }
    let granularity = Granularity::infer_series(buckets.keys().map(|k| k.text.as_str()));
    let chart = buckets
        .into_iter()
        .map(|(key, wagered)| ChartPoint {
            display_date: display_bucket_date(&key.text, granularity),
            date: key.text,
            wagered,
        })
        .collect();

    let known: Vec<_> = resp
        .users
        .iter()
        .filter_map(|u| {
            let uid = u.uid.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
            Some((uid, u))
        })
        .collect();
    let weighted: Vec<f64> = known.iter().map(|(_, u)| u.weighted_wagered).collect();
    let scores = relative_activity_scores(&weighted);

    let users: Vec<VisualizedUser> = known
        .iter()
        .zip(scores)
        .map(|((uid, u), activity_score)| VisualizedUser {
            uid: (*uid).to_string(),
            username: u
                .username
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(uid)
                .to_string(),
            wagered: u.wagered,
            weighted_wagered: u.weighted_wagered,
            last_seen: u.last_seen.clone(),
            activity_score,
        })
        .collect();

    Visualization {
        unique_users: users.len(),
        total_wagered: users.iter().map(|u| u.wagered).sum(),
        total_weighted_wagered: users.iter().map(|u| u.weighted_wagered).sum(),
        chart,
        users,
    }
}
