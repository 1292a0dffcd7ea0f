//! Last-good stats per date range.
//!
//! A refresh that fails leaves the previous snapshot in place and serves it
//! marked stale; with no previous snapshot an empty one is served. Refreshes
//! are neither coalesced nor cancelled, so when two race for the same range
//! the one that finishes last wins.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::aggregation::{aggregate, normalize_chart_points, AggregationReport};
use crate::client::StatsSource;
use crate::period::DateRange;
use crate::types::{ChartPoint, StatsResponse};

const MAX_CACHED_RANGES: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub fetched_at: Option<DateTime<Utc>>,
    pub unique_users: usize,
    pub chart: Vec<ChartPoint>,
    pub report: AggregationReport,
    pub stale: bool,
}

impl StatsSnapshot {
    /// Aggregate one stats response.
    ///
    /// The chart is rebuilt from the bucket rows; the upstream `chartData`
    /// is only used when the response carries no rows at all.
    pub fn from_response(resp: StatsResponse, fetched_at: DateTime<Utc>) -> Self {
        let report = aggregate(&resp.result);
        let (chart, unique_users) = if resp.result.is_empty() {
            let upstream = resp.unique_users.max(0.0).round() as usize;
            (normalize_chart_points(resp.chart_data), upstream)
        } else {
            (report.chart.clone(), report.unique_users)
        };
        Self {
            fetched_at: Some(fetched_at),
            unique_users,
            chart,
            report,
            stale: false,
        }
    }

    pub fn decode_failures(&self) -> usize {
        self.report.issues.len()
    }
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    inner: RwLock<HashMap<DateRange, StatsSnapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, range: &DateRange) -> Option<StatsSnapshot> {
        self.inner.read().await.get(range).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Fetch `range` from `source` and aggregate it. On failure, serve the
    /// last good snapshot for the range with `stale = true`.
    pub async fn refresh<S: StatsSource + Sync>(&self, source: &S, range: DateRange) -> StatsSnapshot {
        match source.fetch_stats(range).await {
            Ok(resp) => {
                let snapshot = StatsSnapshot::from_response(resp, Utc::now());
                info!(
                    start = %range.start_iso(),
                    end = %range.end_iso(),
                    users = snapshot.unique_users,
                    buckets = snapshot.chart.len(),
                    decode_failures = snapshot.decode_failures(),
                    "stats refreshed"
                );
                self.store(range, snapshot.clone()).await;
                snapshot
            }
            Err(e) => {
                error!(
                    start = %range.start_iso(),
                    end = %range.end_iso(),
                    error = %e,
                    "stats fetch failed; serving previous snapshot"
                );
                metrics::counter!("dashboard_snapshot_stale_served_total").increment(1);
                let mut snapshot = self.get(&range).await.unwrap_or_default();
                snapshot.stale = true;
                snapshot
            }
        }
    }

    async fn store(&self, range: DateRange, snapshot: StatsSnapshot) {
        let mut map = self.inner.write().await;
        if map.len() >= MAX_CACHED_RANGES && !map.contains_key(&range) {
            let oldest = map
                .iter()
                .min_by_key(|(_, s)| s.fetched_at)
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                map.remove(&oldest);
            }
        }
        map.insert(range, snapshot);
    }
}
