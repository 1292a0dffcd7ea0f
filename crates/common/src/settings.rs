//! Persisted dashboard preferences.
//!
//! Each setting is one row of plain JSON keyed by name. Values are not
//! versioned: a missing row or one that no longer parses reads as the key's
//! default.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use anyhow::{Context, Result};
use rusqlite::OptionalExtension;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::period::{Granularity, TimePeriod};
use crate::sorting::{SortField, SortState};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT
);
";

const LEADERBOARD_SORT_PREFIX: &str = "leaderboard_sort:";

/// A typed setting name with its fallback value.
pub struct SettingKey<T> {
    name: Cow<'static, str>,
    default: fn() -> T,
    _value: PhantomData<fn() -> T>,
}

impl<T> SettingKey<T> {
    pub const fn new(name: &'static str, default: fn() -> T) -> Self {
        Self {
            name: Cow::Borrowed(name),
            default,
            _value: PhantomData,
        }
    }

    pub fn owned(name: String, default: fn() -> T) -> Self {
        Self {
            name: Cow::Owned(name),
            default,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> T {
        (self.default)()
    }
}

/// Which chart series are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SeriesVisibility {
    pub wagered: bool,
    pub weighted_wagered: bool,
    pub difference: bool,
    pub users: bool,
}

impl Default for SeriesVisibility {
    fn default() -> Self {
        Self {
            wagered: true,
            weighted_wagered: true,
            difference: true,
            users: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DashboardCard {
    TotalWagered,
    WeightedWagered,
    TodayWagered,
    UniqueUsers,
    Chart,
    Users,
}

impl DashboardCard {
    pub const ALL: [Self; 6] = [
        Self::TotalWagered,
        Self::WeightedWagered,
        Self::TodayWagered,
        Self::UniqueUsers,
        Self::Chart,
        Self::Users,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::TotalWagered => "Total wagered",
            Self::WeightedWagered => "Weighted wagered",
            Self::TodayWagered => "Today",
            Self::UniqueUsers => "Unique users",
            Self::Chart => "Wagers over time",
            Self::Users => "Users",
        }
    }
}

/// Drop duplicates and append any card the order is missing, so every card
/// appears exactly once.
pub fn normalize_card_order(order: &[DashboardCard]) -> Vec<DashboardCard> {
    let mut out: Vec<DashboardCard> = Vec::with_capacity(DashboardCard::ALL.len());
    for card in order.iter().chain(DashboardCard::ALL.iter()) {
        if !out.contains(card) {
            out.push(*card);
        }
    }
    out
}

pub const DASHBOARD_SORT: SettingKey<SortState> = SettingKey::new("dashboard_sort", SortState::default);
pub const TIME_PERIOD: SettingKey<TimePeriod> = SettingKey::new("time_period", TimePeriod::default);
pub const CHART_GRANULARITY: SettingKey<Granularity> =
    SettingKey::new("chart_granularity", Granularity::default);
pub const VISIBLE_SERIES: SettingKey<SeriesVisibility> =
    SettingKey::new("visible_series", SeriesVisibility::default);
pub const CARD_ORDER: SettingKey<Vec<DashboardCard>> =
    SettingKey::new("card_order", default_card_order);

fn default_card_order() -> Vec<DashboardCard> {
    DashboardCard::ALL.to_vec()
}

/// Sort preference of one leaderboard's detail table.
pub fn leaderboard_sort(leaderboard_id: &str) -> SettingKey<SortState> {
    SettingKey::owned(
        format!("{LEADERBOARD_SORT_PREFIX}{leaderboard_id}"),
        SortState::default,
    )
}

/// Every setting with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub dashboard_sort: SortState,
    pub time_period: TimePeriod,
    pub chart_granularity: Granularity,
    pub visible_series: SeriesVisibility,
    pub card_order: Vec<DashboardCard>,
    pub leaderboard_sorts: BTreeMap<String, SortState>,
}

pub struct SettingsStore {
    conn: tokio_rusqlite::Connection,
}

impl SettingsStore {
    /// Open (creating if needed) the settings database at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
            }
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .with_context(|| format!("failed to open settings db {path}"))?;
        let store = Self { conn };
        store
            .call(|conn| {
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                conn.execute_batch("PRAGMA journal_mode=WAL;")?;
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await
            .context("SettingsStore::open: schema setup failed")?;
        Ok(store)
    }

    async fn call<F, R>(&self, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.conn.call(move |conn| function(conn)).await.map_err(
            |e: tokio_rusqlite::Error<anyhow::Error>| match e {
                tokio_rusqlite::Error::ConnectionClosed => {
                    anyhow::anyhow!("settings connection closed")
                }
                tokio_rusqlite::Error::Close((_, err)) => {
                    anyhow::anyhow!("settings close error: {err}")
                }
                tokio_rusqlite::Error::Error(err) => err,
                other => anyhow::anyhow!("settings error: {other}"),
            },
        )
    }

    async fn raw(&self, name: &str) -> Result<Option<String>> {
        let name = name.to_string();
        self.call(move |conn| {
            let value = conn
                .query_row("SELECT value FROM settings WHERE key = ?1", [&name], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
        .await
    }

    /// The stored value, `None` when the row is missing or doesn't parse.
    pub async fn stored<T: DeserializeOwned>(&self, key: &SettingKey<T>) -> Result<Option<T>> {
        let Some(raw) = self.raw(key.name()).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                debug!(key = key.name(), error = %e, "unreadable setting, using default");
                Ok(None)
            }
        }
    }

    /// The stored value, or the key's default when the row is missing or
    /// doesn't parse.
    pub async fn get<T: DeserializeOwned>(&self, key: &SettingKey<T>) -> Result<T> {
        Ok(self
            .stored(key)
            .await?
            .unwrap_or_else(|| key.default_value()))
    }

    pub async fn set<T: Serialize>(&self, key: &SettingKey<T>, value: &T) -> Result<()> {
        let name = key.name().to_string();
        let json = serde_json::to_string(value)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![name, json, now],
            )?;
            Ok(())
        })
        .await
    }

    /// Forget the stored value so the default applies again.
    pub async fn reset<T>(&self, key: &SettingKey<T>) -> Result<()> {
        let name = key.name().to_string();
        self.call(move |conn| {
            conn.execute("DELETE FROM settings WHERE key = ?1", [&name])?;
            Ok(())
        })
        .await
    }

    /// Column-header click on a table whose sort lives under `key`.
    pub async fn toggle_sort(&self, key: &SettingKey<SortState>, field: SortField) -> Result<SortState> {
        let next = self.get(key).await?.toggle(field);
        self.set(key, &next).await?;
        Ok(next)
    }

    pub async fn all(&self) -> Result<SettingsSnapshot> {
        let rows: Vec<(String, String)> = self
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM settings WHERE key LIKE 'leaderboard_sort:%' ORDER BY key",
                )?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        let leaderboard_sorts = rows
            .into_iter()
            .filter_map(|(key, value)| {
                let id = key.strip_prefix(LEADERBOARD_SORT_PREFIX)?.to_string();
                let sort = serde_json::from_str(&value).ok()?;
                Some((id, sort))
            })
            .collect();

        Ok(SettingsSnapshot {
            dashboard_sort: self.get(&DASHBOARD_SORT).await?,
            time_period: self.get(&TIME_PERIOD).await?,
            chart_granularity: self.get(&CHART_GRANULARITY).await?,
            visible_series: self.get(&VISIBLE_SERIES).await?,
            card_order: normalize_card_order(&self.get(&CARD_ORDER).await?),
            leaderboard_sorts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorting::SortDirection;

    async fn store() -> SettingsStore {
        SettingsStore::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_absent() {
        let s = store().await;
        assert_eq!(s.get(&DASHBOARD_SORT).await.unwrap(), SortState::default());
        assert_eq!(s.get(&TIME_PERIOD).await.unwrap(), TimePeriod::Last7Days);
        assert_eq!(s.get(&CHART_GRANULARITY).await.unwrap(), Granularity::Day);
        assert_eq!(s.get(&VISIBLE_SERIES).await.unwrap(), SeriesVisibility::default());
        assert_eq!(s.get(&CARD_ORDER).await.unwrap(), DashboardCard::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_set_get_reset() {
        let s = store().await;
        s.set(&TIME_PERIOD, &TimePeriod::Last30Days).await.unwrap();
        assert_eq!(s.get(&TIME_PERIOD).await.unwrap(), TimePeriod::Last30Days);
        s.set(&TIME_PERIOD, &TimePeriod::Today).await.unwrap();
        assert_eq!(s.get(&TIME_PERIOD).await.unwrap(), TimePeriod::Today);
        s.reset(&TIME_PERIOD).await.unwrap();
        assert_eq!(s.get(&TIME_PERIOD).await.unwrap(), TimePeriod::Last7Days);
    }

    #[tokio::test]
    async fn test_corrupt_value_reads_as_default() {
        let s = store().await;
        s.call(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES ('dashboard_sort', '{not json')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(s.get(&DASHBOARD_SORT).await.unwrap(), SortState::default());
        assert!(s.stored(&DASHBOARD_SORT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_toggle_sort_persists() {
        let s = store().await;
        let next = s.toggle_sort(&DASHBOARD_SORT, SortField::Wagered).await.unwrap();
        assert_eq!(next.direction, SortDirection::Asc);
        let next = s.toggle_sort(&DASHBOARD_SORT, SortField::LastSeen).await.unwrap();
        assert_eq!(next, SortState::new(SortField::LastSeen, SortDirection::Desc));
        assert_eq!(s.get(&DASHBOARD_SORT).await.unwrap(), next);
    }

    #[tokio::test]
    async fn test_leaderboard_sorts_are_independent() {
        let s = store().await;
        s.toggle_sort(&leaderboard_sort("spring"), SortField::Username)
            .await
            .unwrap();
        assert_eq!(s.get(&leaderboard_sort("autumn")).await.unwrap(), SortState::default());
        assert_eq!(s.get(&DASHBOARD_SORT).await.unwrap(), SortState::default());

        let all = s.all().await.unwrap();
        assert_eq!(all.leaderboard_sorts.len(), 1);
        assert_eq!(all.leaderboard_sorts["spring"].field, SortField::Username);
    }

    #[tokio::test]
    async fn test_partial_series_visibility_fills_defaults() {
        let s = store().await;
        s.call(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES ('visible_series', '{\"users\": false}')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        let v = s.get(&VISIBLE_SERIES).await.unwrap();
        assert!(!v.users);
        assert!(v.wagered && v.weighted_wagered && v.difference);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.db");
        let path = path.to_str().unwrap();
        {
            let s = SettingsStore::open(path).await.unwrap();
            s.set(&CHART_GRANULARITY, &Granularity::Hour).await.unwrap();
        }
        let s = SettingsStore::open(path).await.unwrap();
        assert_eq!(s.get(&CHART_GRANULARITY).await.unwrap(), Granularity::Hour);
    }

    #[test]
    fn test_normalize_card_order() {
        let order = normalize_card_order(&[DashboardCard::Users, DashboardCard::Users, DashboardCard::Chart]);
        assert_eq!(order.len(), DashboardCard::ALL.len());
        assert_eq!(order[0], DashboardCard::Users);
        assert_eq!(order[1], DashboardCard::Chart);
    }
}
