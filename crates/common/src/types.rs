use serde::{Deserialize, Serialize};

/// One bucket row from the stats endpoint. `raw` is a JSON document whose shape
/// depends on the consumer, see [`crate::payload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBucketRecord {
    pub date: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
}

/// Per-user entry decoded from a bucket's `raw` payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUserEntry {
    #[serde(default, deserialize_with = "de_opt_string_any")]
    pub uid: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub wagered: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub weighted_wagered: f64,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub activity_score: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub total_days_active: f64,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub rank_level: Option<f64>,
    #[serde(default)]
    pub favorite_game_title: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub highest_multiplier: Option<f64>,
}

/// Per-user summary over the fetched range, rebuilt from scratch on every fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedUser {
    pub uid: String,
    pub username: String,
    pub wagered: f64,
    pub weighted_wagered: f64,
    pub today_wagered: f64,
    pub today_weighted_wagered: f64,
    /// First identifier seen for this user; never overwritten afterwards.
    pub service: Option<String>,
    pub last_seen: Option<String>,
    pub activity_score: f64,
    pub total_days_active: u32,
    pub rank_level: Option<u32>,
    pub favorite_game_title: Option<String>,
    pub highest_multiplier: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub date: String,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub wagered: f64,
    #[serde(default)]
    pub display_date: String,
}

/// Response of `GET /api/stats?start=..&end=..`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub unique_users: f64,
    #[serde(default)]
    pub chart_data: Vec<ChartPoint>,
    #[serde(default)]
    pub result: Vec<RawBucketRecord>,
}

/// Response of `GET /api/leaderboards/{id}/stats`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardStatsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub chart_data: Vec<LeaderboardBucket>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One leaderboard bucket. The bucket key arrives under a different name
/// depending on the granularity the backend chose.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardBucket {
    #[serde(default)]
    pub hour_bucket: Option<String>,
    #[serde(default)]
    pub day_bucket: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub wagered: f64,
    #[serde(
        rename = "weightedWagered",
        alias = "weighted_wagered",
        default,
        deserialize_with = "de_f64_lenient"
    )]
    pub weighted_wagered: f64,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub user_count: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub users: Option<f64>,
}

/// Body of the external `fetch-wagers` function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchWagersRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub start_date: String,
    pub end_date: String,
    pub jwt: String,
    pub casino_identifier: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchWagersResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub aggregates: Vec<WagerAggregate>,
    #[serde(default)]
    pub users: Vec<WagerUser>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WagerAggregate {
    #[serde(alias = "day", alias = "bucket", alias = "day_bucket", default)]
    pub date: String,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub wagered: f64,
    #[serde(
        alias = "weightedWagered",
        default,
        deserialize_with = "de_f64_lenient"
    )]
    pub weighted_wagered: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WagerUser {
    #[serde(alias = "user_id", default, deserialize_with = "de_opt_string_any")]
    pub uid: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub wagered: f64,
    #[serde(
        alias = "weightedWagered",
        default,
        deserialize_with = "de_f64_lenient"
    )]
    pub weighted_wagered: f64,
    #[serde(alias = "lastSeen", default)]
    pub last_seen: Option<String>,
}

/// Deserialize a field that can be either a string or a number into `Option<String>`.
fn de_opt_string_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumber;

    impl de::Visitor<'_> for StringOrNumber {
        type Value = Option<String>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a string or number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

/// Deserialize a number that may arrive as a JSON number, a numeric string, or
/// null. Anything that doesn't read as a finite number becomes `None`.
fn de_opt_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct LenientNumber;

    impl de::Visitor<'_> for LenientNumber {
        type Value = Option<f64>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number, numeric string or null")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.trim().parse::<f64>().ok().filter(|n| n.is_finite()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v).filter(|n| n.is_finite()))
        }

        fn visit_bool<E: de::Error>(self, _v: bool) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(LenientNumber)
}

fn de_f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(de_opt_f64_lenient(deserializer)?.unwrap_or(0.0))
}
