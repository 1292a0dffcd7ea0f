//! Normalisation of the leaderboard stats endpoint into a single chart shape.

use serde::Serialize;
use tracing::debug;

use crate::period::{display_bucket_date, BucketKey, Granularity};
use crate::types::LeaderboardBucket;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPoint {
    pub timestamp: String,
    pub display_date: String,
    pub wagered: f64,
    pub weighted_wagered: f64,
    /// Raw minus weighted wager for the bucket.
    pub difference: f64,
    pub users: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSummary {
    pub total_wagered: f64,
    pub total_weighted_wagered: f64,
    pub difference: f64,
    pub peak_users: u64,
    pub peak_bucket: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSeries {
    pub granularity: String,
    pub points: Vec<LeaderboardPoint>,
    pub summary: LeaderboardSummary,
    pub skipped_buckets: usize,
}

/// The bucket's key, preferring the field that matches the requested
/// granularity, then the other bucket field, then `timestamp`.
fn bucket_key(bucket: &LeaderboardBucket, granularity: Granularity) -> Option<&str> {
    let (preferred, other) = match granularity {
        Granularity::Hour => (&bucket.hour_bucket, &bucket.day_bucket),
        Granularity::Day => (&bucket.day_bucket, &bucket.hour_bucket),
    };
    preferred
        .as_deref()
        .or(other.as_deref())
        .or(bucket.timestamp.as_deref())
        .filter(|k| !k.trim().is_empty())
}

pub fn normalize_leaderboard(
    buckets: &[LeaderboardBucket],
    granularity: Granularity,
) -> LeaderboardSeries {
    let mut skipped = 0;
    let mut keyed: Vec<(BucketKey, LeaderboardPoint)> = buckets
        .iter()
        .filter_map(|b| {
            let Some(key) = bucket_key(b, granularity) else {
                skipped += 1;
                return None;
            };
            let users = b.user_count.or(b.users).unwrap_or(0.0).max(0.0).round() as u64;
            Some((
                BucketKey::new(key),
                LeaderboardPoint {
                    timestamp: key.to_string(),
                    display_date: display_bucket_date(key, granularity),
                    wagered: b.wagered,
                    weighted_wagered: b.weighted_wagered,
                    difference: b.wagered - b.weighted_wagered,
                    users,
                },
            ))
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    if skipped > 0 {
        debug!(skipped, "leaderboard buckets without a time key");
    }

    let points: Vec<LeaderboardPoint> = keyed.into_iter().map(|(_, p)| p).collect();
    LeaderboardSeries {
        granularity: granularity.as_str().to_string(),
        summary: summarize(&points),
        points,
        skipped_buckets: skipped,
    }
}

pub fn summarize(points: &[LeaderboardPoint]) -> LeaderboardSummary {
    let mut summary = LeaderboardSummary::default();
    for p in points {
        summary.total_wagered += p.wagered;
        summary.total_weighted_wagered += p.weighted_wagered;
        if p.users > summary.peak_users {
            summary.peak_users = p.users;
            summary.peak_bucket = Some(p.timestamp.clone());
        }
    }
    summary.difference = summary.total_wagered - summary.total_weighted_wagered;
    summary
}
