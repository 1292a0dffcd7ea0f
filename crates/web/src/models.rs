//! View models for dashboard templates. Values are pre-formatted here so the
//! templates only place strings.

use chrono::{DateTime, Utc};
use common::derived::{format_dollar_amount, format_last_seen, today_totals};
use common::leaderboard::LeaderboardPoint;
use common::period::TimePeriod;
use common::settings::{DashboardCard, SeriesVisibility};
use common::snapshot::StatsSnapshot;
use common::sorting::{SortField, SortState};
use common::types::{AggregatedUser, ChartPoint};

pub struct PeriodOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

pub fn period_options(selected: TimePeriod) -> Vec<PeriodOption> {
    TimePeriod::ALL
        .into_iter()
        .map(|p| PeriodOption {
            value: p.as_str(),
            label: p.label(),
            selected: p == selected,
        })
        .collect()
}

/// One card slot on the page, loaded by htmx from `partial_url`.
pub struct CardSlot {
    pub id: &'static str,
    pub title: &'static str,
    pub partial_url: String,
}

pub fn card_slots(order: &[DashboardCard], period: TimePeriod) -> Vec<CardSlot> {
    let p = period.as_str();
    let mut slots = Vec::new();
    let mut summary_placed = false;
    for card in order {
        let (id, url) = match card {
            // The four totals render together in one summary partial.
            DashboardCard::TotalWagered
            | DashboardCard::WeightedWagered
            | DashboardCard::TodayWagered
            | DashboardCard::UniqueUsers => {
                if summary_placed {
                    continue;
                }
                summary_placed = true;
                ("summary", format!("/partials/summary?period={p}"))
            }
            DashboardCard::Chart => ("chart", format!("/partials/chart?period={p}")),
            DashboardCard::Users => ("users", format!("/partials/users?period={p}")),
        };
        slots.push(CardSlot {
            id,
            title: if id == "summary" { "Totals" } else { card.title() },
            partial_url: url,
        });
    }
    slots
}

/// Totals card
pub struct SummaryCard {
    pub period_label: &'static str,
    pub total_wagered: String,
    pub total_weighted: String,
    pub today_wagered: String,
    pub today_weighted: String,
    pub today_active: usize,
    pub unique_users: usize,
    /// Bucket date the "today" figures come from; empty when there is none.
    pub latest_date: String,
    pub decode_failures: usize,
    pub stale: bool,
}

impl SummaryCard {
    pub fn build(snapshot: &StatsSnapshot, period: TimePeriod) -> Self {
        let users = &snapshot.report.users;
        let today = today_totals(users);
        let total_wagered: f64 = if users.is_empty() {
            snapshot.chart.iter().map(|p| p.wagered).sum()
        } else {
            users.iter().map(|u| u.wagered).sum()
        };
        let total_weighted: f64 = users.iter().map(|u| u.weighted_wagered).sum();
        Self {
            period_label: period.label(),
            total_wagered: format_dollar_amount(total_wagered),
            total_weighted: format_dollar_amount(total_weighted),
            today_wagered: format_dollar_amount(today.wagered),
            today_weighted: format_dollar_amount(today.weighted_wagered),
            today_active: today.active_users,
            unique_users: snapshot.unique_users,
            latest_date: snapshot.report.latest_date.clone().unwrap_or_default(),
            decode_failures: snapshot.decode_failures(),
            stale: snapshot.stale,
        }
    }
}

/// Clickable column header in a users table. `toggle_url` posts the click
/// to whichever sort setting the table is ordered by.
pub struct SortHeader {
    pub field: &'static str,
    pub label: &'static str,
    pub arrow: &'static str,
    pub active: bool,
    pub toggle_url: String,
}

pub fn sort_headers(state: SortState, toggle_base: &str) -> Vec<SortHeader> {
    SortField::ALL
        .into_iter()
        .map(|f| SortHeader {
            field: f.as_str(),
            label: f.header(),
            toggle_url: format!("{toggle_base}?field={}", f.as_str()),
            arrow: if f == state.field {
                state.direction.arrow()
            } else {
                ""
            },
            active: f == state.field,
        })
        .collect()
}

/// Row in the users table
pub struct UserRow {
    pub rank: usize,
    pub uid: String,
    pub username: String,
    pub service: String,
    pub activity_score: String,
    pub wagered: String,
    pub weighted_wagered: String,
    pub today_wagered: String,
    pub last_seen: String,
}

pub fn user_rows(users: &[AggregatedUser], now: DateTime<Utc>) -> Vec<UserRow> {
    users
        .iter()
        .enumerate()
        .map(|(i, u)| UserRow {
            rank: i + 1,
            uid: u.uid.clone(),
            username: u.username.clone(),
            service: u.service.clone().unwrap_or_else(|| "-".to_string()),
            activity_score: format!("{:.0}", u.activity_score),
            wagered: format_dollar_amount(u.wagered),
            weighted_wagered: format_dollar_amount(u.weighted_wagered),
            today_wagered: format_dollar_amount(u.today_wagered),
            last_seen: format_last_seen(u.last_seen.as_deref(), now),
        })
        .collect()
}

/// Bar width of `value` as a percentage of `max`, 0-100.
fn bar_width(value: f64, max: f64) -> u32 {
    if max > 0.0 && value.is_finite() {
        (value / max * 100.0).round().clamp(0.0, 100.0) as u32
    } else {
        0
    }
}

/// Chart rendered as a table: one row per bucket, one column per visible
/// series. The bar tracks the wagered series and hides with it.
pub struct ChartTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<ChartRow>,
    pub show_bars: bool,
}

pub struct ChartRow {
    pub display_date: String,
    pub bar_pct: u32,
    pub cells: Vec<String>,
}

/// Dashboard chart. Only the wagered series exists per bucket here.
pub fn chart_table(points: &[ChartPoint], series: &SeriesVisibility) -> ChartTable {
    let max = points.iter().map(|p| p.wagered).fold(0.0, f64::max);
    let rows = points
        .iter()
        .map(|p| ChartRow {
            display_date: p.display_date.clone(),
            bar_pct: bar_width(p.wagered, max),
            cells: if series.wagered {
                vec![format_dollar_amount(p.wagered)]
            } else {
                Vec::new()
            },
        })
        .collect();
    ChartTable {
        columns: if series.wagered { vec!["Wagered"] } else { Vec::new() },
        rows,
        show_bars: series.wagered,
    }
}

pub fn leaderboard_table(points: &[LeaderboardPoint], series: &SeriesVisibility) -> ChartTable {
    let mut columns = Vec::new();
    if series.wagered {
        columns.push("Wagered");
    }
    if series.weighted_wagered {
        columns.push("Weighted");
    }
    if series.difference {
        columns.push("Difference");
    }
    if series.users {
        columns.push("Users");
    }

    let max = points.iter().map(|p| p.wagered).fold(0.0, f64::max);
    let rows = points
        .iter()
        .map(|p| {
            let mut cells = Vec::with_capacity(columns.len());
            if series.wagered {
                cells.push(format_dollar_amount(p.wagered));
            }
            if series.weighted_wagered {
                cells.push(format_dollar_amount(p.weighted_wagered));
            }
            if series.difference {
                cells.push(format_dollar_amount(p.difference));
            }
            if series.users {
                cells.push(p.users.to_string());
            }
            ChartRow {
                display_date: p.display_date.clone(),
                bar_pct: bar_width(p.wagered, max),
                cells,
            }
        })
        .collect();
    ChartTable {
        columns,
        rows,
        show_bars: series.wagered,
    }
}
