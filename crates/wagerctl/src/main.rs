use anyhow::Result;
use chrono::{FixedOffset, Utc};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = cli::parse_args(std::env::args()).map_err(|e| anyhow::anyhow!("{e}\n{}", cli::USAGE))?;
    if cmd == cli::Command::Help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let config_path = std::env::var("WAGER_DASHBOARD_CONFIG")
        .map_or_else(|_| common::config::Config::default_config_path(), Into::into);
    let config = common::config::Config::load(&config_path)?;

    // Tables go to stdout alongside the JSON log lines; keep logs to warnings.
    let (dispatch, _otel_guard) = common::observability::build_dispatch("wagerctl", "warn");
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let settings = common::settings::SettingsStore::open(&config.database.path).await?;
    let source = common::client::StatsClient::new(&config.backend)?;
    let offset = FixedOffset::east_opt(config.dashboard.utc_offset_minutes * 60)
        .ok_or_else(|| anyhow::anyhow!("utc_offset_minutes out of range"))?;

    let ctx = cli::Context {
        source: &source,
        settings: &settings,
        dashboard: &config.dashboard,
        now: Utc::now().with_timezone(&offset),
    };
    let mut out = Vec::new();
    cli::run_command(&ctx, cmd, &mut out).await?;
    std::io::Write::write_all(&mut std::io::stdout(), &out)?;
    Ok(())
}
