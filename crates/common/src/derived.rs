//! Derived display metrics: relative activity score, last-seen text, dollar
//! amounts, and today totals.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::period::parse_timestamp;
use crate::types::AggregatedUser;

pub const LAST_SEEN_FALLBACK: &str = "Long time ago";
pub const LAST_SEEN_UNKNOWN: &str = "Unknown";

/// Activity score relative to the heaviest weighted wagerer in the same
/// result set: `round(weighted / max_weighted * 100)`, 0 when the max is 0.
pub fn relative_activity_score(weighted_wagered: f64, max_weighted_wagered: f64) -> u32 {
    if max_weighted_wagered > 0.0 && weighted_wagered.is_finite() {
        ((weighted_wagered / max_weighted_wagered) * 100.0)
            .round()
            .clamp(0.0, 100.0) as u32
    } else {
        0
    }
}

/// Scores for a whole population, in input order.
pub fn relative_activity_scores(weighted: &[f64]) -> Vec<u32> {
    let max = weighted
        .iter()
        .copied()
        .filter(|w| w.is_finite())
        .fold(0.0, f64::max);
    weighted
        .iter()
        .map(|&w| relative_activity_score(w, max))
        .collect()
}

pub fn format_last_seen(ts: Option<&str>, now: DateTime<Utc>) -> String {
    format_last_seen_or(ts, now, LAST_SEEN_FALLBACK)
}

/// Human-relative "last seen" text. Missing or unparseable timestamps render
/// as `fallback`.
pub fn format_last_seen_or(ts: Option<&str>, now: DateTime<Utc>, fallback: &str) -> String {
    let Some(seen) = ts.and_then(parse_timestamp) else {
        return fallback.to_string();
    };
    let secs = (now - seen).num_seconds();
    if secs < 60 {
        return "Just now".to_string();
    }
    let minutes = secs / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = hours / 24;
    if days < 7 {
        format!("{days}d ago")
    } else if days < 30 {
        format!("{}w ago", days / 7)
    } else if days < 365 {
        format!("{}mo ago", days / 30)
    } else {
        format!("{}y ago", days / 365)
    }
}

/// Two-decimal, thousands-separated amount, truncated toward negative
/// infinity so earnings are never overstated: `19.999` renders `19.99`.
pub fn format_dollar_amount(amount: f64) -> String {
    let cents = Decimal::from_f64(amount)
        .map(|d| (d * Decimal::ONE_HUNDRED).floor())
        .and_then(|c| c.to_i128())
        .unwrap_or(0);

    let negative = cents < 0;
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3 + 4);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-{grouped}.{frac:02}")
    } else {
        format!("{grouped}.{frac:02}")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayTotals {
    pub wagered: f64,
    pub weighted_wagered: f64,
    pub active_users: usize,
}

pub fn today_totals(users: &[AggregatedUser]) -> TodayTotals {
    users.iter().fold(TodayTotals::default(), |mut acc, u| {
        acc.wagered += u.today_wagered;
        acc.weighted_wagered += u.today_weighted_wagered;
        if u.today_wagered > 0.0 || u.today_weighted_wagered > 0.0 {
            acc.active_users += 1;
        }
        acc
    })
}
