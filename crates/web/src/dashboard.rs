//! Shared state and the data lookups behind the pages and the JSON API.

use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use common::client::StatsSource;
use common::config::Dashboard;
use common::period::{Granularity, TimePeriod};
use common::leaderboard::{normalize_leaderboard, LeaderboardSeries};
use common::settings::{SettingKey, SettingsStore, CHART_GRANULARITY, TIME_PERIOD};
use common::snapshot::{SnapshotCache, StatsSnapshot};
use common::sorting::{filter_users, sort_users, SortState};
use common::types::AggregatedUser;
use metrics_exporter_prometheus::PrometheusHandle;

/// Upstream sources the server can run against.
pub trait Source: StatsSource + Send + Sync + 'static {}

impl<T: StatsSource + Send + Sync + 'static> Source for T {}

pub struct AppState<S> {
    pub source: S,
    pub settings: SettingsStore,
    pub cache: SnapshotCache,
    pub dashboard: Dashboard,
    pub started_at: Instant,
    pub prometheus: Option<PrometheusHandle>,
}

impl<S: Source> AppState<S> {
    pub fn new(source: S, settings: SettingsStore, dashboard: Dashboard) -> Self {
        Self {
            source,
            settings,
            cache: SnapshotCache::new(),
            dashboard,
            started_at: Instant::now(),
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Current time in the operator's configured local offset.
    pub fn now_local(&self) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.dashboard.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        Utc::now().with_timezone(&offset)
    }

    /// Requested period, else the persisted one, else the configured default.
    pub async fn period(&self, requested: Option<TimePeriod>) -> Result<TimePeriod> {
        if let Some(p) = requested {
            return Ok(p);
        }
        Ok(self
            .settings
            .stored(&TIME_PERIOD)
            .await?
            .unwrap_or(self.dashboard.default_period))
    }

    /// Like [`Self::period`], but a requested period also becomes the stored
    /// one, so the next visit without `?period=` lands on it again.
    pub async fn select_period(&self, requested: Option<TimePeriod>) -> Result<TimePeriod> {
        match requested {
            Some(p) => {
                self.settings.set(&TIME_PERIOD, &p).await?;
                Ok(p)
            }
            None => self.period(None).await,
        }
    }

    pub async fn granularity(&self, requested: Option<Granularity>) -> Result<Granularity> {
        if let Some(g) = requested {
            return Ok(g);
        }
        Ok(self
            .settings
            .stored(&CHART_GRANULARITY)
            .await?
            .unwrap_or(self.dashboard.default_granularity))
    }

    /// Fetch and aggregate the period, falling back to the last good
    /// snapshot when the upstream fails.
    pub async fn snapshot(&self, period: TimePeriod) -> StatsSnapshot {
        let range = period.date_range(self.now_local());
        self.cache.refresh(&self.source, range).await
    }

    /// Normalized leaderboard series for `period`.
    pub async fn leaderboard_series(
        &self,
        id: &str,
        period: TimePeriod,
        granularity: Granularity,
    ) -> Result<LeaderboardSeries> {
        let range = period.date_range(self.now_local());
        let resp = self
            .source
            .fetch_leaderboard_stats(id, range, granularity)
            .await?;
        Ok(normalize_leaderboard(&resp.chart_data, granularity))
    }

    /// Users of `snapshot`, filtered by `query`, ordered by the sort stored
    /// under `key`.
    pub async fn sorted_users(
        &self,
        snapshot: &StatsSnapshot,
        query: &str,
        key: &SettingKey<SortState>,
    ) -> Result<(Vec<AggregatedUser>, SortState)> {
        let sort = self.settings.get(key).await?;
        let filtered = filter_users(&snapshot.report.users, query);
        Ok((sort_users(&filtered, sort), sort))
    }
}
