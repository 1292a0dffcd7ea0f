//! Client-side sorting and filtering of user tables.
//!
//! Sorting is pure: it returns a new list and never touches the input. The
//! underlying sort is stable, so rows with equal keys keep their prior order.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::period::parse_timestamp;
use crate::types::AggregatedUser;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Username,
    ActivityScore,
    #[default]
    Wagered,
    WeightedWagered,
    LastSeen,
}

impl SortField {
    pub const ALL: [Self; 5] = [
        Self::Username,
        Self::ActivityScore,
        Self::Wagered,
        Self::WeightedWagered,
        Self::LastSeen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::ActivityScore => "activityScore",
            Self::Wagered => "wagered",
            Self::WeightedWagered => "weightedWagered",
            Self::LastSeen => "lastSeen",
        }
    }

    /// Column header text.
    pub fn header(&self) -> &'static str {
        match self {
            Self::Username => "User",
            Self::ActivityScore => "Activity",
            Self::Wagered => "Wagered",
            Self::WeightedWagered => "Weighted",
            Self::LastSeen => "Last seen",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = String;

    /// Accepts the camelCase wire names and their snake_case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('_', "").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown sort field: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Asc => "▲",
            Self::Desc => "▼",
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortState {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortState {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Column-header click: the same field flips direction, a new field
    /// starts descending.
    #[must_use]
    pub fn toggle(self, field: SortField) -> Self {
        if self.field == field {
            Self::new(field, self.direction.flip())
        } else {
            Self::new(field, SortDirection::Desc)
        }
    }
}

/// Rows that can be ordered by a [`SortField`].
pub trait SortKeys {
    fn uid(&self) -> &str;
    fn username(&self) -> &str;
    fn service(&self) -> Option<&str>;
    /// Numeric value for numeric fields; missing values read as 0.
    fn numeric(&self, field: SortField) -> f64;
    fn last_seen(&self) -> Option<&str>;
}

impl SortKeys for AggregatedUser {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    fn numeric(&self, field: SortField) -> f64 {
        match field {
            SortField::Wagered => self.wagered,
            SortField::WeightedWagered => self.weighted_wagered,
            SortField::ActivityScore => self.activity_score,
            SortField::Username | SortField::LastSeen => 0.0,
        }
    }

    fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }
}

/// Epoch milliseconds, NaN when missing or unparseable.
fn last_seen_millis(ts: Option<&str>) -> f64 {
    ts.and_then(parse_timestamp)
        .map_or(f64::NAN, |t| t.timestamp_millis() as f64)
}

/// Compare two rows by `field` ascending.
///
/// `lastSeen` compares as epoch milliseconds; a missing or unparseable
/// timestamp is NaN. `total_cmp` keeps that a total order (NaN ranks above
/// every real instant), so the sort never panics, but where such rows land is
/// an artifact of the encoding rather than anything meaningful.
pub fn compare_by<T: SortKeys>(a: &T, b: &T, field: SortField) -> Ordering {
    match field {
        SortField::Username => a
            .username()
            .to_lowercase()
            .cmp(&b.username().to_lowercase()),
        SortField::LastSeen => {
            last_seen_millis(a.last_seen()).total_cmp(&last_seen_millis(b.last_seen()))
        }
        numeric => a.numeric(numeric).total_cmp(&b.numeric(numeric)),
    }
}

/// Return a sorted copy of `rows`.
pub fn sort_rows<T: SortKeys + Clone>(rows: &[T], state: SortState) -> Vec<T> {
    let mut out = rows.to_vec();
    out.sort_by(|a, b| {
        let cmp = compare_by(a, b, state.field);
        match state.direction {
            SortDirection::Asc => cmp,
            SortDirection::Desc => cmp.reverse(),
        }
    });
    out
}

pub fn sort_users(users: &[AggregatedUser], state: SortState) -> Vec<AggregatedUser> {
    sort_rows(users, state)
}

/// Case-insensitive substring match on username, uid, or service. An empty
/// query keeps every row.
pub fn filter_rows<T: SortKeys + Clone>(rows: &[T], query: &str) -> Vec<T> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return rows.to_vec();
    }
    rows.iter()
        .filter(|r| {
            r.username().to_lowercase().contains(&query)
                || r.uid().to_lowercase().contains(&query)
                || r.service().is_some_and(|s| s.to_lowercase().contains(&query))
        })
        .cloned()
        .collect()
}

pub fn filter_users(users: &[AggregatedUser], query: &str) -> Vec<AggregatedUser> {
    filter_rows(users, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(uid: &str, username: &str, wagered: f64, last_seen: Option<&str>) -> AggregatedUser {
        AggregatedUser {
            uid: uid.to_string(),
            username: username.to_string(),
            wagered,
            weighted_wagered: wagered / 2.0,
            last_seen: last_seen.map(str::to_string),
            ..AggregatedUser::default()
        }
    }

    fn uids(users: &[AggregatedUser]) -> Vec<&str> {
        users.iter().map(|u| u.uid.as_str()).collect()
    }

    #[test]
    fn test_desc_then_asc_is_reverse_without_ties() {
        let users = vec![
            user("a", "a", 5.0, None),
            user("b", "b", 50.0, None),
            user("c", "c", 1.0, None),
        ];
        let desc = sort_users(&users, SortState::new(SortField::Wagered, SortDirection::Desc));
        let asc = sort_users(&users, SortState::new(SortField::Wagered, SortDirection::Asc));
        assert_eq!(uids(&desc), ["b", "a", "c"]);
        let mut reversed = uids(&asc);
        reversed.reverse();
        assert_eq!(uids(&desc), reversed);
    }

    #[test]
    fn test_ties_keep_prior_order() {
        let users = vec![
            user("x", "zed", 10.0, None),
            user("y", "amy", 10.0, None),
            user("z", "bob", 3.0, None),
        ];
        let by_name = sort_users(&users, SortState::new(SortField::Username, SortDirection::Asc));
        assert_eq!(uids(&by_name), ["y", "z", "x"]);
        let by_wager = sort_users(&by_name, SortState::new(SortField::Wagered, SortDirection::Desc));
        assert_eq!(uids(&by_wager), ["y", "x", "z"]);
    }

    #[test]
    fn test_username_case_insensitive() {
        let users = vec![user("1", "bob", 0.0, None), user("2", "Alice", 0.0, None)];
        let sorted = sort_users(&users, SortState::new(SortField::Username, SortDirection::Asc));
        assert_eq!(uids(&sorted), ["2", "1"]);
    }

    #[test]
    fn test_sort_does_not_mutate_input() {
        let users = vec![user("a", "a", 1.0, None), user("b", "b", 2.0, None)];
        let _ = sort_users(&users, SortState::default());
        assert_eq!(uids(&users), ["a", "b"]);
    }

    #[test]
    fn test_last_seen_sorts_by_instant_and_survives_garbage() {
        let users = vec![
            user("old", "o", 0.0, Some("2024-01-01T00:00:00Z")),
            user("bad", "b", 0.0, Some("garbage")),
            user("new", "n", 0.0, Some("2024-05-01T00:00:00Z")),
            user("none", "x", 0.0, None),
        ];
        let sorted = sort_users(&users, SortState::new(SortField::LastSeen, SortDirection::Desc));
        assert_eq!(sorted.len(), 4);
        let pos = |id: &str| sorted.iter().position(|u| u.uid == id).unwrap();
        assert!(pos("new") < pos("old"));
    }

    #[test]
    fn test_toggle_semantics() {
        let s = SortState::default();
        assert_eq!(s, SortState::new(SortField::Wagered, SortDirection::Desc));
        let s = s.toggle(SortField::Wagered);
        assert_eq!(s.direction, SortDirection::Asc);
        let s = s.toggle(SortField::Username);
        assert_eq!(s, SortState::new(SortField::Username, SortDirection::Desc));
    }

    #[test]
    fn test_sort_field_parsing() {
        assert_eq!("weighted_wagered".parse::<SortField>().unwrap(), SortField::WeightedWagered);
        assert_eq!("activityScore".parse::<SortField>().unwrap(), SortField::ActivityScore);
        assert_eq!("LASTSEEN".parse::<SortField>().unwrap(), SortField::LastSeen);
        assert!("rank".parse::<SortField>().is_err());
    }

    #[test]
    fn test_sort_state_json_shape() {
        let json = serde_json::to_string(&SortState::new(SortField::WeightedWagered, SortDirection::Asc)).unwrap();
        assert_eq!(json, r#"{"field":"weightedWagered","direction":"asc"}"#);
    }

    #[test]
    fn test_filter_rows() {
        let mut users = vec![user("u1", "Alice", 0.0, None), user("u2", "bob", 0.0, None)];
        users[1].service = Some("Shuffle".to_string());
        assert_eq!(uids(&filter_users(&users, "ALI")), ["u1"]);
        assert_eq!(uids(&filter_rows(&users, "shuf")), ["u2"]);
        assert_eq!(filter_rows(&users, "  ").len(), 2);
        assert!(filter_rows(&users, "nobody").is_empty());
    }
}
