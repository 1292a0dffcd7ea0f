//! Decoders for the `raw` field of a [`RawBucketRecord`](crate::types::RawBucketRecord).
//!
//! The same column carries two different documents depending on who reads it:
//! chart consumers only need the bucket's total `wagered`, per-user consumers
//! need the full entry list. Each shape gets its own parser.

use serde::Deserialize;
use thiserror::Error;

use crate::types::RawUserEntry;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("bucket has no raw payload")]
    MissingRaw,
    #[error("raw payload is not valid JSON for this shape: {0}")]
    Json(#[from] serde_json::Error),
}

/// Chart view of a bucket: the wager total across everyone in it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ChartBucketPayload {
    #[serde(default, deserialize_with = "de_wagered")]
    pub wagered: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChartShape {
    Many(Vec<ChartBucketPayload>),
    One(ChartBucketPayload),
}

/// Decode a chart bucket. Accepts the single-element array form
/// `[{"wagered": n}]` (every element is summed) and a bare object.
pub fn decode_chart_bucket(raw: Option<&str>) -> Result<ChartBucketPayload, DecodeError> {
    let raw = raw.ok_or(DecodeError::MissingRaw)?;
    let shape: ChartShape = serde_json::from_str(raw)?;
    Ok(match shape {
        ChartShape::Many(items) => ChartBucketPayload {
            wagered: items.iter().map(|p| p.wagered).sum(),
        },
        ChartShape::One(item) => item,
    })
}

/// Decode the per-user entry list of a bucket.
pub fn decode_user_bucket(raw: Option<&str>) -> Result<Vec<RawUserEntry>, DecodeError> {
    let raw = raw.ok_or(DecodeError::MissingRaw)?;
    Ok(serde_json::from_str(raw)?)
}

fn de_wagered<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_bucket_single_element_array() {
        let p = decode_chart_bucket(Some(r#"[{"wagered": 125.5}]"#)).unwrap();
        assert_eq!(p.wagered, 125.5);
    }

    #[test]
    fn test_chart_bucket_bare_object() {
        let p = decode_chart_bucket(Some(r#"{"wagered": "40"}"#)).unwrap();
        assert_eq!(p.wagered, 40.0);
    }

    #[test]
    fn test_chart_bucket_sums_user_entries() {
        let raw = r#"[{"uid":"a","wagered":10},{"uid":"b","wagered":2.5}]"#;
        assert_eq!(decode_chart_bucket(Some(raw)).unwrap().wagered, 12.5);
    }

    #[test]
    fn test_chart_bucket_empty_array_is_zero() {
        assert_eq!(decode_chart_bucket(Some("[]")).unwrap().wagered, 0.0);
    }

    #[test]
    fn test_chart_bucket_malformed() {
        assert!(matches!(
            decode_chart_bucket(Some("{not json")),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_chart_bucket(None),
            Err(DecodeError::MissingRaw)
        ));
    }

    #[test]
    fn test_user_bucket_decodes_entries() {
        let raw = r#"[{"uid":"u1","username":"alice","wagered":100,"weightedWagered":80,
                      "lastSeen":"2024-03-01T12:00:00Z","activityScore":55,"totalDaysActive":4}]"#;
        let entries = decode_user_bucket(Some(raw)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username.as_deref(), Some("alice"));
        assert_eq!(entries[0].weighted_wagered, 80.0);
        assert_eq!(entries[0].total_days_active, 4.0);
    }

    #[test]
    fn test_user_bucket_rejects_bare_object() {
        assert!(decode_user_bucket(Some(r#"{"wagered": 3}"#)).is_err());
    }
}
