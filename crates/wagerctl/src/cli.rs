use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use common::client::StatsSource;
use common::config::Dashboard;
use common::derived::{format_dollar_amount, format_last_seen, today_totals};
use common::leaderboard::normalize_leaderboard;
use common::period::{Granularity, TimePeriod};
use common::settings::{
    leaderboard_sort, SettingsStore, CHART_GRANULARITY, DASHBOARD_SORT, TIME_PERIOD,
};
use common::snapshot::StatsSnapshot;
use common::sorting::{sort_users, SortField};

pub const USAGE: &str = "usage:
  wagerctl summary [period]
  wagerctl leaderboard <id> [hour|day] [period]
  wagerctl sort <field> [leaderboard-id]
  wagerctl settings";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Summary {
        period: Option<TimePeriod>,
    },
    Leaderboard {
        id: String,
        granularity: Option<Granularity>,
        period: Option<TimePeriod>,
    },
    Sort {
        field: SortField,
        leaderboard: Option<String>,
    },
    Settings,
    Help,
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Command, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let Some(cmd) = args.next() else {
        return Ok(Command::Help);
    };

    match cmd.as_str() {
        "summary" => {
            let period: Option<TimePeriod> = args.next().map(|p| p.parse()).transpose()?;
            Ok(Command::Summary { period })
        }
        "leaderboard" => {
            let id = args
                .next()
                .ok_or_else(|| "usage: wagerctl leaderboard <id> [hour|day] [period]".to_string())?;
            let granularity: Option<Granularity> = args.next().map(|g| g.parse()).transpose()?;
            let period: Option<TimePeriod> = args.next().map(|p| p.parse()).transpose()?;
            Ok(Command::Leaderboard {
                id,
                granularity,
                period,
            })
        }
        "sort" => {
            let field: SortField = args
                .next()
                .ok_or_else(|| "usage: wagerctl sort <field> [leaderboard-id]".to_string())?
                .parse()?;
            Ok(Command::Sort {
                field,
                leaderboard: args.next(),
            })
        }
        "settings" => Ok(Command::Settings),
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => Err(format!("unknown command: {other}")),
    }
}

/// What a command runs against.
pub struct Context<'a, S> {
    pub source: &'a S,
    pub settings: &'a SettingsStore,
    pub dashboard: &'a Dashboard,
    pub now: DateTime<FixedOffset>,
}

impl<S: StatsSource + Sync> Context<'_, S> {
    async fn period(&self, requested: Option<TimePeriod>) -> Result<TimePeriod> {
        match requested {
            Some(p) => Ok(p),
            None => Ok(self
                .settings
                .stored(&TIME_PERIOD)
                .await?
                .unwrap_or(self.dashboard.default_period)),
        }
    }

    async fn granularity(&self, requested: Option<Granularity>) -> Result<Granularity> {
        match requested {
            Some(g) => Ok(g),
            None => Ok(self
                .settings
                .stored(&CHART_GRANULARITY)
                .await?
                .unwrap_or(self.dashboard.default_granularity)),
        }
    }
}

pub async fn run_command<S, W>(ctx: &Context<'_, S>, cmd: Command, out: &mut W) -> Result<()>
where
    S: StatsSource + Sync,
    W: Write,
{
    match cmd {
        Command::Summary { period } => show_summary(ctx, period, out).await,
        Command::Leaderboard {
            id,
            granularity,
            period,
        } => show_leaderboard(ctx, &id, granularity, period, out).await,
        Command::Sort { field, leaderboard } => {
            let key = match &leaderboard {
                Some(id) => leaderboard_sort(id),
                None => DASHBOARD_SORT,
            };
            let next = ctx.settings.toggle_sort(&key, field).await?;
            writeln!(
                out,
                "{}: {} {}",
                key.name(),
                next.field,
                next.direction.as_str()
            )?;
            Ok(())
        }
        Command::Settings => {
            let all = ctx.settings.all().await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&all)?)?;
            Ok(())
        }
        Command::Help => {
            writeln!(out, "{USAGE}")?;
            Ok(())
        }
    }
}

async fn show_summary<S, W>(ctx: &Context<'_, S>, period: Option<TimePeriod>, out: &mut W) -> Result<()>
where
    S: StatsSource + Sync,
    W: Write,
{
    let period = ctx.period(period).await?;
    let range = period.date_range(ctx.now);
    let resp = ctx.source.fetch_stats(range).await?;
    let snapshot = StatsSnapshot::from_response(resp, Utc::now());
    let sort = ctx.settings.get(&DASHBOARD_SORT).await?;
    let users = sort_users(&snapshot.report.users, sort);
    let today = today_totals(&users);
    let total: f64 = users.iter().map(|u| u.wagered).sum();
    let weighted: f64 = users.iter().map(|u| u.weighted_wagered).sum();

    writeln!(out, "{} ({} .. {})", period.label(), range.start_iso(), range.end_iso())?;
    writeln!(
        out,
        "wagered=${}  weighted=${}  today=${}  unique_users={}",
        format_dollar_amount(total),
        format_dollar_amount(weighted),
        format_dollar_amount(today.wagered),
        snapshot.unique_users
    )?;
    if snapshot.decode_failures() > 0 {
        writeln!(out, "warning: {} bucket(s) failed to decode", snapshot.decode_failures())?;
    }
    writeln!(out, "sorted by {} {}", sort.field, sort.direction.as_str())?;

    let now = ctx.now.with_timezone(&Utc);
    for (i, u) in users.iter().take(ctx.dashboard.top_users).enumerate() {
        writeln!(
            out,
            "{rank:>4}  {name:<20}  {wagered:>14}  {weighted:>14}  {score:>4.0}  {seen}",
            rank = i + 1,
            name = u.username,
            wagered = format_dollar_amount(u.wagered),
            weighted = format_dollar_amount(u.weighted_wagered),
            score = u.activity_score,
            seen = format_last_seen(u.last_seen.as_deref(), now),
        )?;
    }
    Ok(())
}

async fn show_leaderboard<S, W>(
    ctx: &Context<'_, S>,
    id: &str,
    granularity: Option<Granularity>,
    period: Option<TimePeriod>,
    out: &mut W,
) -> Result<()>
where
    S: StatsSource + Sync,
    W: Write,
{
    let period = ctx.period(period).await?;
    let granularity = ctx.granularity(granularity).await?;
    let resp = ctx
        .source
        .fetch_leaderboard_stats(id, period.date_range(ctx.now), granularity)
        .await?;
    let series = normalize_leaderboard(&resp.chart_data, granularity);

    writeln!(out, "Leaderboard {id} ({}, {})", period.label(), granularity)?;
    for p in &series.points {
        writeln!(
            out,
            "{:<14}  {:>14}  {:>14}  {:>12}  {:>5}",
            p.display_date,
            format_dollar_amount(p.wagered),
            format_dollar_amount(p.weighted_wagered),
            format_dollar_amount(p.difference),
            p.users
        )?;
    }
    let s = &series.summary;
    writeln!(
        out,
        "total=${}  weighted=${}  difference=${}  peak_users={}",
        format_dollar_amount(s.total_wagered),
        format_dollar_amount(s.total_weighted_wagered),
        format_dollar_amount(s.difference),
        s.peak_users
    )?;
    if series.skipped_buckets > 0 {
        tracing::warn!(skipped = series.skipped_buckets, "leaderboard buckets without a time key");
    }
    Ok(())
}
