//! Bucket aggregation: turns the raw per-bucket rows of one fetch into a
//! chronological chart series and a per-user summary.
//!
//! Nothing here fails. A bucket whose payload can't be decoded contributes
//! zero, is logged, counted in `dashboard_bucket_decode_failures_total`, and
//! reported back in [`AggregationReport::issues`].

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::payload::{decode_chart_bucket, decode_user_bucket, DecodeError};
use crate::period::{display_bucket_date, parse_timestamp, BucketKey, Granularity};
use crate::types::{AggregatedUser, ChartPoint, RawBucketRecord, RawUserEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePath {
    Chart,
    Users,
}

impl DecodePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chart => "chart",
            Self::Users => "users",
        }
    }
}

/// A bucket that was skipped because its payload didn't decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeIssue {
    pub date: String,
    pub identifier: Option<String>,
    pub path: DecodePath,
    pub error: String,
}

impl DecodeIssue {
    fn record(record: &RawBucketRecord, path: DecodePath, err: &DecodeError) -> Self {
        warn!(
            date = %record.date,
            identifier = record.identifier.as_deref().unwrap_or(""),
            path = path.as_str(),
            error = %err,
            "skipping undecodable bucket"
        );
        metrics::counter!(
            "dashboard_bucket_decode_failures_total",
            "path" => path.as_str()
        )
        .increment(1);
        Self {
            date: record.date.clone(),
            identifier: record.identifier.clone(),
            path,
            error: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationReport {
    pub users: Vec<AggregatedUser>,
    pub chart: Vec<ChartPoint>,
    pub unique_users: usize,
    /// Latest bucket date in the input, the one "today" fields come from.
    pub latest_date: Option<String>,
    pub issues: Vec<DecodeIssue>,
    pub skipped_entries: usize,
}

/// Run both aggregation paths over one fetch.
pub fn aggregate(records: &[RawBucketRecord]) -> AggregationReport {
    let (chart, mut issues) = build_chart_series(records);
    let users = aggregate_users(records);
    issues.extend(users.issues);
    AggregationReport {
        unique_users: users.users.len(),
        users: users.users,
        chart,
        latest_date: latest_bucket_date(records).map(str::to_string),
        issues,
        skipped_entries: users.skipped_entries,
    }
}

/// One chart point per bucket date, ascending. Rows sharing a date (one per
/// service) are summed into the same point.
pub fn build_chart_series(records: &[RawBucketRecord]) -> (Vec<ChartPoint>, Vec<DecodeIssue>) {
    let mut buckets: BTreeMap<BucketKey, f64> = BTreeMap::new();
    let mut issues = Vec::new();

    for record in records {
        let wagered = match decode_chart_bucket(record.raw.as_deref()) {
            Ok(payload) => payload.wagered,
            Err(err) => {
                issues.push(DecodeIssue::record(record, DecodePath::Chart, &err));
                0.0
            }
        };
        *buckets.entry(BucketKey::new(&record.date)).or_insert(0.0) += wagered;
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
    (chart, issues)
}

/// Normalise a chart series that arrived pre-built: fill missing display
/// labels, merge duplicate dates, and order ascending.
pub fn normalize_chart_points(points: Vec<ChartPoint>) -> Vec<ChartPoint> {
    let mut buckets: BTreeMap<BucketKey, (f64, String)> = BTreeMap::new();
    for point in points {
        let slot = buckets
            .entry(BucketKey::new(&point.date))
            .or_insert_with(|| (0.0, point.display_date.clone()));
        slot.0 += point.wagered;
    }
    let granularity = Granularity::infer_series(buckets.keys().map(|k| k.text.as_str()));
    buckets
        .into_iter()
        .map(|(key, (wagered, display))| ChartPoint {
            display_date: if display.is_empty() {
                display_bucket_date(&key.text, granularity)
            } else {
                display
            },
            date: key.text,
            wagered,
        })
        .collect()
}

/// The chronologically latest `date` among the records.
pub fn latest_bucket_date(records: &[RawBucketRecord]) -> Option<&str> {
    records
        .iter()
        .max_by_key(|r| BucketKey::new(&r.date))
        .map(|r| r.date.as_str())
}

#[derive(Debug, Default)]
pub struct UserAggregation {
    pub users: Vec<AggregatedUser>,
    pub issues: Vec<DecodeIssue>,
    pub skipped_entries: usize,
}

#[derive(Debug, Default)]
struct TodayAccumulator {
    wagered: f64,
    weighted_wagered: f64,
    last_seen: Option<String>,
    activity_score: f64,
    total_days_active: f64,
}

/// Bookkeeping that isn't part of the published user record.
struct UserSlot {
    user: AggregatedUser,
    activity_key: Option<BucketKey>,
}

/// Sum wagers per `uid` across every bucket, then overlay the "today" values
/// taken from the buckets dated at the latest date in the input.
pub fn aggregate_users(records: &[RawBucketRecord]) -> UserAggregation {
    let mut out = UserAggregation::default();
    let Some(today) = latest_bucket_date(records) else {
        return out;
    };

    let decoded: Vec<(&RawBucketRecord, Vec<RawUserEntry>)> = records
        .iter()
        .filter_map(|record| match decode_user_bucket(record.raw.as_deref()) {
            Ok(entries) => Some((record, entries)),
            Err(err) => {
                out.issues
                    .push(DecodeIssue::record(record, DecodePath::Users, &err));
                None
            }
        })
        .collect();

    let mut today_map: HashMap<&str, TodayAccumulator> = HashMap::new();
    for (record, entries) in decoded.iter().filter(|(r, _)| r.date == today) {
        for entry in entries {
            let Some(uid) = entry_uid(entry) else {
                continue;
            };
            let acc = today_map.entry(uid).or_default();
            acc.wagered += entry.wagered;
            acc.weighted_wagered += entry.weighted_wagered;
            if later_timestamp(entry.last_seen.as_deref(), acc.last_seen.as_deref()) {
                acc.last_seen.clone_from(&entry.last_seen);
            }
            if entry.activity_score > 0.0 {
                acc.activity_score = entry.activity_score;
            }
            if entry.total_days_active > 0.0 {
                acc.total_days_active = entry.total_days_active;
            }
        }
        debug!(date = %record.date, entries = entries.len(), "collected today bucket");
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut slots: Vec<UserSlot> = Vec::new();
    for (record, entries) in &decoded {
        let key = BucketKey::new(&record.date);
        for entry in entries {
            let Some(uid) = entry_uid(entry) else {
                out.skipped_entries += 1;
                metrics::counter!("dashboard_entries_skipped_total", "reason" => "missing_uid")
                    .increment(1);
                continue;
            };
            let slot_idx = *index.entry(uid.to_string()).or_insert_with(|| {
                slots.push(UserSlot {
                    user: first_seen(uid, entry),
                    activity_key: None,
                });
                slots.len() - 1
            });
            let slot = &mut slots[slot_idx];
            let user = &mut slot.user;

            user.wagered += entry.wagered;
            user.weighted_wagered += entry.weighted_wagered;

            if user.service.is_none() {
                user.service = record
                    .identifier
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
            }
            if later_timestamp(entry.last_seen.as_deref(), user.last_seen.as_deref()) {
                user.last_seen.clone_from(&entry.last_seen);
            }
            let is_newer = slot.activity_key.as_ref().is_none_or(|k| key >= *k);
            if is_newer && (entry.activity_score > 0.0 || entry.total_days_active > 0.0) {
                if entry.activity_score > 0.0 {
                    user.activity_score = entry.activity_score;
                }
                if entry.total_days_active > 0.0 {
                    user.total_days_active = days(entry.total_days_active);
                }
                slot.activity_key = Some(key.clone());
            }
        }
    }

    let mut users: Vec<AggregatedUser> = slots.into_iter().map(|s| s.user).collect();
    for user in &mut users {
        let Some(t) = today_map.get(user.uid.as_str()) else {
            continue;
        };
        user.today_wagered = t.wagered;
        user.today_weighted_wagered = t.weighted_wagered;
        if t.last_seen.is_some() {
            user.last_seen.clone_from(&t.last_seen);
        }
        // A stale today bucket must not wipe a known score.
        if t.activity_score > 0.0 {
            user.activity_score = t.activity_score;
        }
        if t.total_days_active > 0.0 {
            user.total_days_active = days(t.total_days_active);
        }
    }

    out.users = users;
    out
}

fn entry_uid(entry: &RawUserEntry) -> Option<&str> {
    entry.uid.as_deref().map(str::trim).filter(|u| !u.is_empty())
}

fn first_seen(uid: &str, entry: &RawUserEntry) -> AggregatedUser {
    AggregatedUser {
        uid: uid.to_string(),
        username: entry
            .username
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(uid)
            .to_string(),
        rank_level: entry.rank_level.map(days),
        favorite_game_title: entry.favorite_game_title.clone(),
        highest_multiplier: entry.highest_multiplier,
        ..AggregatedUser::default()
    }
}

fn days(v: f64) -> u32 {
    v.max(0.0).round() as u32
}

/// True when `candidate` is a usable timestamp later than `current`, or when
/// there is no usable `current` at all.
fn later_timestamp(candidate: Option<&str>, current: Option<&str>) -> bool {
    let Some(candidate) = candidate.filter(|c| !c.is_empty()) else {
        return false;
    };
    let Some(current) = current else {
        return true;
    };
    match (parse_timestamp(candidate), parse_timestamp(current)) {
        (Some(c), Some(cur)) => c > cur,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
