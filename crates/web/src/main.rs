mod dashboard;
mod metrics;
mod models;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use common::client::StatsClient;
use common::derived::{today_totals, TodayTotals};
use common::leaderboard::LeaderboardSeries;
use common::period::{Granularity, TimePeriod};
use common::settings::{
    leaderboard_sort, normalize_card_order, DashboardCard, SeriesVisibility, SettingKey,
    SettingsSnapshot, SettingsStore, CARD_ORDER, CHART_GRANULARITY, DASHBOARD_SORT, TIME_PERIOD,
    VISIBLE_SERIES,
};
use common::sorting::{sort_rows, SortField, SortState};
use common::types::{AggregatedUser, ChartPoint};
use common::visualize::{build_visualization, Visualization};
use dashboard::{AppState, Source};
use models::{
    card_slots, chart_table, leaderboard_table, period_options, sort_headers, user_rows, CardSlot,
    ChartTable, PeriodOption, SortHeader, SummaryCard, UserRow,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

// --- Errors ---

/// Handler failure rendered as `{"error": ..}` with a status code.
struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!(msg.into()),
        }
    }

    fn upstream(error: anyhow::Error) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            error,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.error, "request failed");
        } else {
            tracing::debug!(status = %self.status, error = %self.error, "bad request");
        }
        let body = Json(serde_json::json!({ "error": format!("{:#}", self.error) }));
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, AppError>;

fn parse_opt<T: std::str::FromStr<Err = String>>(raw: Option<&str>) -> ApiResult<Option<T>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some).map_err(AppError::bad_request),
        None => Ok(None),
    }
}

// --- Templates ---

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    periods: Vec<PeriodOption>,
    cards: Vec<CardSlot>,
}

#[derive(Template)]
#[template(path = "partials/summary.html")]
struct SummaryTemplate {
    card: SummaryCard,
}

#[derive(Template)]
#[template(path = "partials/users.html")]
struct UsersTemplate {
    headers: Vec<SortHeader>,
    rows: Vec<UserRow>,
    total: usize,
    stale: bool,
}

#[derive(Template)]
#[template(path = "partials/chart.html")]
struct ChartTemplate {
    table: ChartTable,
}

#[derive(Template)]
#[template(path = "leaderboard.html")]
struct LeaderboardTemplate {
    id: String,
    periods: Vec<PeriodOption>,
    chart_url: String,
    users_url: String,
}

// --- Query params ---

#[derive(Deserialize, Default)]
struct PeriodQuery {
    period: Option<String>,
}

#[derive(Deserialize, Default)]
struct UsersQuery {
    period: Option<String>,
    #[serde(default)]
    q: String,
}

#[derive(Deserialize, Default)]
struct LeaderboardQuery {
    granularity: Option<String>,
    period: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisualizeQuery {
    user_id: String,
    casino: String,
    period: Option<String>,
}

#[derive(Deserialize)]
struct FieldQuery {
    field: String,
}

// --- Page and partials ---

async fn index<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Query(q): Query<PeriodQuery>,
) -> ApiResult<Html<String>> {
    let period = state.select_period(parse_opt(q.period.as_deref())?).await?;
    let order = normalize_card_order(&state.settings.get(&CARD_ORDER).await?);
    let page = DashboardTemplate {
        periods: period_options(period),
        cards: card_slots(&order, period),
    };
    Ok(Html(page.to_string()))
}

async fn summary_partial<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Query(q): Query<PeriodQuery>,
) -> ApiResult<Html<String>> {
    let period = state.period(parse_opt(q.period.as_deref())?).await?;
    let snapshot = state.snapshot(period).await;
    let card = SummaryCard::build(&snapshot, period);
    Ok(Html(SummaryTemplate { card }.to_string()))
}

async fn users_partial<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Query(q): Query<UsersQuery>,
) -> ApiResult<Html<String>> {
    let period = state.period(parse_opt(q.period.as_deref())?).await?;
    let snapshot = state.snapshot(period).await;
    let (users, sort) = state.sorted_users(&snapshot, &q.q, &DASHBOARD_SORT).await?;
    let page = users_table(
        &users,
        sort,
        "/api/settings/sort/toggle",
        snapshot.stale,
        state.dashboard.top_users,
    );
    Ok(Html(page.to_string()))
}

fn users_table(
    users: &[AggregatedUser],
    sort: SortState,
    toggle_base: &str,
    stale: bool,
    limit: usize,
) -> UsersTemplate {
    let shown = &users[..users.len().min(limit)];
    UsersTemplate {
        headers: sort_headers(sort, toggle_base),
        rows: user_rows(shown, Utc::now()),
        total: users.len(),
        stale,
    }
}

async fn chart_partial<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Query(q): Query<PeriodQuery>,
) -> ApiResult<Html<String>> {
    let period = state.period(parse_opt(q.period.as_deref())?).await?;
    let snapshot = state.snapshot(period).await;
    let series = state.settings.get(&VISIBLE_SERIES).await?;
    let table = chart_table(&snapshot.chart, &series);
    Ok(Html(ChartTemplate { table }.to_string()))
}

async fn leaderboard_page<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(q): Query<PeriodQuery>,
) -> ApiResult<Html<String>> {
    let period = state.select_period(parse_opt(q.period.as_deref())?).await?;
    let p = period.as_str();
    let enc = urlencoding::encode(&id);
    let page = LeaderboardTemplate {
        periods: period_options(period),
        chart_url: format!("/partials/leaderboards/{enc}/chart?period={p}"),
        users_url: format!("/partials/leaderboards/{enc}/users?period={p}"),
        id,
    };
    Ok(Html(page.to_string()))
}

async fn leaderboard_chart_partial<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(q): Query<LeaderboardQuery>,
) -> ApiResult<Html<String>> {
    let period = state.period(parse_opt(q.period.as_deref())?).await?;
    let granularity = state.granularity(parse_opt(q.granularity.as_deref())?).await?;
    let series = state
        .leaderboard_series(&id, period, granularity)
        .await
        .map_err(AppError::upstream)?;
    let visible = state.settings.get(&VISIBLE_SERIES).await?;
    let table = leaderboard_table(&series.points, &visible);
    Ok(Html(ChartTemplate { table }.to_string()))
}

/// Participants of a leaderboard: the users active in its period, ordered by
/// the leaderboard's own sort setting.
async fn leaderboard_users_partial<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(q): Query<UsersQuery>,
) -> ApiResult<Html<String>> {
    let period = state.period(parse_opt(q.period.as_deref())?).await?;
    let snapshot = state.snapshot(period).await;
    let key: SettingKey<SortState> = leaderboard_sort(&id);
    let (users, sort) = state.sorted_users(&snapshot, &q.q, &key).await?;
    let toggle_base = format!("/api/leaderboards/{}/sort/toggle", urlencoding::encode(&id));
    let page = users_table(
        &users,
        sort,
        &toggle_base,
        snapshot.stale,
        state.dashboard.top_users,
    );
    Ok(Html(page.to_string()))
}

// --- JSON API ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

async fn health<S: Source>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardResponse {
    period: TimePeriod,
    fetched_at: Option<DateTime<Utc>>,
    unique_users: usize,
    chart_data: Vec<ChartPoint>,
    users: Vec<AggregatedUser>,
    today: TodayTotals,
    sort: SortState,
    stale: bool,
    decode_failures: usize,
}

async fn api_dashboard<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Query(q): Query<PeriodQuery>,
) -> ApiResult<Json<DashboardResponse>> {
    let period = state.period(parse_opt(q.period.as_deref())?).await?;
    let snapshot = state.snapshot(period).await;
    let (users, sort) = state.sorted_users(&snapshot, "", &DASHBOARD_SORT).await?;
    Ok(Json(DashboardResponse {
        period,
        fetched_at: snapshot.fetched_at,
        unique_users: snapshot.unique_users,
        today: today_totals(&users),
        decode_failures: snapshot.decode_failures(),
        stale: snapshot.stale,
        chart_data: snapshot.chart,
        users,
        sort,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LeaderboardChartResponse {
    leaderboard_id: String,
    period: TimePeriod,
    sort: SortState,
    #[serde(flatten)]
    series: LeaderboardSeries,
    /// Participants ordered by `sort`.
    users: Vec<AggregatedUser>,
    stale: bool,
}

async fn api_leaderboard_chart<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(q): Query<LeaderboardQuery>,
) -> ApiResult<Json<LeaderboardChartResponse>> {
    let period = state.period(parse_opt(q.period.as_deref())?).await?;
    let granularity = state.granularity(parse_opt(q.granularity.as_deref())?).await?;
    let series = state
        .leaderboard_series(&id, period, granularity)
        .await
        .map_err(AppError::upstream)?;
    let snapshot = state.snapshot(period).await;
    let (mut users, sort) = state
        .sorted_users(&snapshot, "", &leaderboard_sort(&id))
        .await?;
    users.truncate(state.dashboard.top_users);
    Ok(Json(LeaderboardChartResponse {
        leaderboard_id: id,
        period,
        sort,
        series,
        users,
        stale: snapshot.stale,
    }))
}

async fn api_visualize<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Query(q): Query<VisualizeQuery>,
) -> ApiResult<Json<Visualization>> {
    if q.user_id.trim().is_empty() || q.casino.trim().is_empty() {
        return Err(AppError::bad_request("userId and casino are required"));
    }
    let period = state.period(parse_opt(q.period.as_deref())?).await?;
    let range = period.date_range(state.now_local());
    let resp = state
        .source
        .fetch_wagers(&q.user_id, &q.casino, range)
        .await
        .map_err(AppError::upstream)?;
    let mut viz = build_visualization(&resp);
    let sort = state.settings.get(&DASHBOARD_SORT).await?;
    viz.users = sort_rows(&viz.users, sort);
    Ok(Json(viz))
}

// --- Settings API ---

async fn get_settings<S: Source>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Json<SettingsSnapshot>> {
    Ok(Json(state.settings.all().await?))
}

async fn put_sort<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Json(sort): Json<SortState>,
) -> ApiResult<Json<SortState>> {
    state.settings.set(&DASHBOARD_SORT, &sort).await?;
    Ok(Json(sort))
}

/// `HX-Trigger` lets the users table reload itself after a header click.
fn sort_changed(sort: SortState) -> Response {
    ([("HX-Trigger", "sort-changed")], Json(sort)).into_response()
}

async fn toggle_sort<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Query(q): Query<FieldQuery>,
) -> ApiResult<Response> {
    let field: SortField = q.field.parse().map_err(AppError::bad_request)?;
    let next = state.settings.toggle_sort(&DASHBOARD_SORT, field).await?;
    Ok(sort_changed(next))
}

async fn toggle_leaderboard_sort<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(q): Query<FieldQuery>,
) -> ApiResult<Response> {
    let field: SortField = q.field.parse().map_err(AppError::bad_request)?;
    let next = state.settings.toggle_sort(&leaderboard_sort(&id), field).await?;
    Ok(sort_changed(next))
}

async fn put_period<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Json(period): Json<TimePeriod>,
) -> ApiResult<Json<TimePeriod>> {
    state.settings.set(&TIME_PERIOD, &period).await?;
    Ok(Json(period))
}

async fn put_granularity<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Json(granularity): Json<Granularity>,
) -> ApiResult<Json<Granularity>> {
    state.settings.set(&CHART_GRANULARITY, &granularity).await?;
    Ok(Json(granularity))
}

async fn put_series<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Json(series): Json<SeriesVisibility>,
) -> ApiResult<Json<SeriesVisibility>> {
    state.settings.set(&VISIBLE_SERIES, &series).await?;
    Ok(Json(series))
}

async fn put_cards<S: Source>(
    State(state): State<Arc<AppState<S>>>,
    Json(cards): Json<Vec<DashboardCard>>,
) -> ApiResult<Json<Vec<DashboardCard>>> {
    let cards = normalize_card_order(&cards);
    state.settings.set(&CARD_ORDER, &cards).await?;
    Ok(Json(cards))
}

async fn metrics_endpoint<S: Source>(State(state): State<Arc<AppState<S>>>) -> Response {
    let Some(handle) = state.prometheus.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    handle.run_upkeep();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}

// --- Router ---

pub fn create_router_with_state<S: Source>(state: Arc<AppState<S>>) -> Router {
    let pages = Router::new()
        .route("/", get(index::<S>))
        .route("/partials/summary", get(summary_partial::<S>))
        .route("/partials/users", get(users_partial::<S>))
        .route("/partials/chart", get(chart_partial::<S>))
        .route("/leaderboards/{id}", get(leaderboard_page::<S>))
        .route(
            "/partials/leaderboards/{id}/chart",
            get(leaderboard_chart_partial::<S>),
        )
        .route(
            "/partials/leaderboards/{id}/users",
            get(leaderboard_users_partial::<S>),
        );

    let api = Router::new()
        .route("/api/health", get(health::<S>))
        .route("/api/dashboard", get(api_dashboard::<S>))
        .route("/api/leaderboards/{id}/chart", get(api_leaderboard_chart::<S>))
        .route(
            "/api/leaderboards/{id}/sort/toggle",
            post(toggle_leaderboard_sort::<S>),
        )
        .route("/api/visualize", get(api_visualize::<S>))
        .route("/api/settings", get(get_settings::<S>))
        .route("/api/settings/sort", put(put_sort::<S>))
        .route("/api/settings/sort/toggle", post(toggle_sort::<S>))
        .route("/api/settings/period", put(put_period::<S>))
        .route("/api/settings/granularity", put(put_granularity::<S>))
        .route("/api/settings/series", put(put_series::<S>))
        .route("/api/settings/cards", put(put_cards::<S>))
        .route("/metrics", get(metrics_endpoint::<S>));

    pages
        .merge(api)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(common::config::Config::default_config_path, Into::into);
    let config = common::config::Config::load(&config_path)?;

    let (dispatch, _otel_guard) =
        common::observability::build_dispatch("wager-dashboard", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let prometheus = metrics::init_global()?;
    let settings = SettingsStore::open(&config.database.path).await?;
    let source = StatsClient::new(&config.backend)?;
    let state = Arc::new(
        AppState::new(source, settings, config.dashboard.clone()).with_prometheus(prometheus),
    );

    let app = create_router_with_state(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(%addr, config = %config_path.display(), "dashboard listening");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
        tracing::info!("shutting down");
        signal.cancel();
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use common::client::StatsSource;
    use common::period::DateRange;
    use common::sorting::SortDirection;
    use common::types::{
        FetchWagersResponse, LeaderboardStatsResponse, RawBucketRecord, StatsResponse,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeSource {
        fail: AtomicBool,
    }

    fn bucket(date: &str, service: &str, raw: &str) -> RawBucketRecord {
        RawBucketRecord {
            date: date.to_string(),
            identifier: Some(service.to_string()),
            raw: Some(raw.to_string()),
        }
    }

    impl StatsSource for FakeSource {
        async fn fetch_stats(&self, _range: DateRange) -> anyhow::Result<StatsResponse> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("upstream down");
            }
            Ok(StatsResponse {
                unique_users: 3.0,
                chart_data: vec![],
                result: vec![
                    bucket(
                        "2024-03-01",
                        "roobet",
                        r#"[{"uid":"u1","username":"amy","wagered":100,"weightedWagered":40,"lastSeen":"2024-03-01T10:00:00Z"},
                            {"uid":"u2","username":"Bob","wagered":5,"weightedWagered":5}]"#,
                    ),
                    bucket("2024-03-02", "shuffle", r#"[{"uid":"u3","username":"cat","wagered":50,"weightedWagered":10}]"#),
                    bucket("2024-03-02", "roobet", "{not json"),
                ],
            })
        }

        async fn fetch_leaderboard_stats(
            &self,
            id: &str,
            _range: DateRange,
            _granularity: Granularity,
        ) -> anyhow::Result<LeaderboardStatsResponse> {
            if id == "gone" {
                anyhow::bail!("leaderboard_stats reported failure: not found");
            }
            Ok(serde_json::from_str(
                r#"{"success": true, "chartData": [
                    {"day_bucket": "2024-03-02", "wagered": 30, "weightedWagered": 20, "users": 2},
                    {"day_bucket": "2024-03-01", "wagered": 10, "weightedWagered": 10, "user_count": 1}
                ]}"#,
            )?)
        }

        async fn fetch_wagers(
            &self,
            _user_id: &str,
            _casino: &str,
            _range: DateRange,
        ) -> anyhow::Result<FetchWagersResponse> {
            Ok(serde_json::from_str(
                r#"{"success": true, "aggregates": [{"date": "2024-03-01", "wagered": 9}],
                    "users": [{"uid": "a", "wagered": 4, "weighted_wagered": 1},
                              {"uid": "b", "wagered": 5, "weighted_wagered": 4}]}"#,
            )?)
        }
    }

    async fn test_state() -> Arc<AppState<FakeSource>> {
        let settings = SettingsStore::open(":memory:").await.unwrap();
        Arc::new(AppState::new(
            FakeSource::default(),
            settings,
            common::config::Dashboard::default(),
        ))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_index_renders_cards_in_order() {
        let state = test_state().await;
        state
            .settings
            .set(&CARD_ORDER, &vec![DashboardCard::Users, DashboardCard::Chart])
            .await
            .unwrap();
        let (status, html) = send(create_router_with_state(state), get_req("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Wager Dashboard"));
        assert!(html.contains("htmx.org"));
        let users = html.find("card-users").unwrap();
        let chart = html.find("card-chart").unwrap();
        let summary = html.find("card-summary").unwrap();
        assert!(users < chart && chart < summary);
    }

    #[tokio::test]
    async fn test_summary_partial_shows_totals() {
        let (status, html) = send(
            create_router_with_state(test_state().await),
            get_req("/partials/summary?period=7d"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("155.00"), "{html}");
        assert!(html.contains("2024-03-02"));
        assert!(html.contains("could not be decoded"));
    }

    #[tokio::test]
    async fn test_users_partial_sorted_and_filtered() {
        let state = test_state().await;
        let app = create_router_with_state(state.clone());
        let (_, html) = send(app.clone(), get_req("/partials/users")).await;
        let amy = html.find("amy").unwrap();
        let cat = html.find("cat").unwrap();
        assert!(amy < cat, "default sort is wagered desc");

        let (_, html) = send(app, get_req("/partials/users?q=BOB")).await;
        assert!(html.contains("Bob"));
        assert!(!html.contains("amy"));
    }

    #[tokio::test]
    async fn test_chart_partial() {
        let (status, html) = send(
            create_router_with_state(test_state().await),
            get_req("/partials/chart"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Mar 1"));
        assert!(html.contains("Mar 2"));
    }

    #[tokio::test]
    async fn test_period_selection_persists() {
        let state = test_state().await;
        let app = create_router_with_state(state.clone());
        let (status, _) = send(app.clone(), get_req("/?period=30d")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            state.settings.stored(&TIME_PERIOD).await.unwrap(),
            Some(TimePeriod::Last30Days)
        );

        let (_, html) = send(app.clone(), get_req("/")).await;
        assert!(html.contains("/partials/summary?period=30d"), "{html}");
        assert!(html.contains("/partials/users?period=30d"));

        let (status, _) = send(app, get_req("/?period=fortnight")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            state.settings.stored(&TIME_PERIOD).await.unwrap(),
            Some(TimePeriod::Last30Days)
        );
    }

    #[tokio::test]
    async fn test_chart_partial_hides_series() {
        let state = test_state().await;
        let app = create_router_with_state(state.clone());
        send(app.clone(), json_req("PUT", "/api/settings/series", r#"{"wagered": false}"#)).await;
        let (status, html) = send(app, get_req("/partials/chart")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("All chart series are hidden."), "{html}");
        assert!(!html.contains("Mar 1"));
        assert!(!html.contains("bg-indigo-500"));
    }

    #[tokio::test]
    async fn test_api_dashboard_json() {
        let (status, body) = send(
            create_router_with_state(test_state().await),
            get_req("/api/dashboard?period=30d"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["period"], "30d");
        assert_eq!(v["uniqueUsers"], 3);
        assert_eq!(v["stale"], false);
        assert_eq!(v["decodeFailures"], 2);
        assert_eq!(v["users"][0]["uid"], "u1");
        assert_eq!(v["today"]["wagered"], 50.0);
        assert_eq!(v["chartData"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_api_dashboard_stale_after_failure() {
        let state = test_state().await;
        let app = create_router_with_state(state.clone());
        let (_, fresh) = send(app.clone(), get_req("/api/dashboard?period=today")).await;
        state.source.fail.store(true, Ordering::SeqCst);
        let (status, stale) = send(app, get_req("/api/dashboard?period=today")).await;
        assert_eq!(status, StatusCode::OK);
        let fresh: serde_json::Value = serde_json::from_str(&fresh).unwrap();
        let stale: serde_json::Value = serde_json::from_str(&stale).unwrap();
        assert_eq!(stale["stale"], true);
        assert_eq!(stale["users"], fresh["users"]);
    }

    #[tokio::test]
    async fn test_bad_period_is_400() {
        let (status, body) = send(
            create_router_with_state(test_state().await),
            get_req("/api/dashboard?period=fortnight"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("unknown time period"));
    }

    #[tokio::test]
    async fn test_toggle_sort_flips_then_resets() {
        let state = test_state().await;
        let app = create_router_with_state(state.clone());
        let (status, body) = send(
            app.clone(),
            json_req("POST", "/api/settings/sort/toggle?field=wagered", ""),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""direction":"asc""#));

        let (_, body) = send(
            app.clone(),
            json_req("POST", "/api/settings/sort/toggle?field=username", ""),
        )
        .await;
        assert!(body.contains(r#""field":"username""#));
        assert!(body.contains(r#""direction":"desc""#));

        let (status, _) = send(app, json_req("POST", "/api/settings/sort/toggle?field=rank", "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let state = test_state().await;
        let app = create_router_with_state(state.clone());
        let (status, _) = send(
            app.clone(),
            json_req("PUT", "/api/settings/sort", r#"{"field":"lastSeen","direction":"asc"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        send(app.clone(), json_req("PUT", "/api/settings/period", r#""90d""#)).await;
        send(app.clone(), json_req("PUT", "/api/settings/granularity", r#""hour""#)).await;
        send(app.clone(), json_req("PUT", "/api/settings/series", r#"{"users": false}"#)).await;
        let (_, cards) = send(app.clone(), json_req("PUT", "/api/settings/cards", r#"["chart"]"#)).await;
        let cards: Vec<DashboardCard> = serde_json::from_str(&cards).unwrap();
        assert_eq!(cards.len(), DashboardCard::ALL.len());
        assert_eq!(cards[0], DashboardCard::Chart);

        let (_, body) = send(app, get_req("/api/settings")).await;
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["dashboardSort"]["field"], "lastSeen");
        assert_eq!(v["timePeriod"], "90d");
        assert_eq!(v["chartGranularity"], "hour");
        assert_eq!(v["visibleSeries"]["users"], false);
        assert_eq!(v["visibleSeries"]["wagered"], true);

        assert_eq!(
            state.settings.get(&DASHBOARD_SORT).await.unwrap(),
            SortState::new(SortField::LastSeen, SortDirection::Asc)
        );
    }

    #[tokio::test]
    async fn test_leaderboard_chart_and_sort() {
        let state = test_state().await;
        let app = create_router_with_state(state.clone());
        let (status, body) = send(
            app.clone(),
            get_req("/api/leaderboards/spring/chart?granularity=day"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["leaderboardId"], "spring");
        assert_eq!(v["points"][0]["timestamp"], "2024-03-01");
        assert_eq!(v["summary"]["totalWagered"], 40.0);
        assert_eq!(v["summary"]["peakUsers"], 2);

        send(
            app.clone(),
            json_req("POST", "/api/leaderboards/spring/sort/toggle?field=username", ""),
        )
        .await;
        let (_, body) = send(app.clone(), get_req("/api/leaderboards/spring/chart")).await;
        assert!(body.contains(r#""field":"username""#));

        let (status, _) = send(app, get_req("/api/leaderboards/gone/chart")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_leaderboard_users_follow_own_sort() {
        let state = test_state().await;
        let app = create_router_with_state(state.clone());
        send(
            app.clone(),
            json_req("POST", "/api/leaderboards/spring/sort/toggle?field=username", ""),
        )
        .await;

        let (_, body) = send(app.clone(), get_req("/api/leaderboards/spring/chart")).await;
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        let names: Vec<&str> = v["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["username"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["cat", "Bob", "amy"]);

        let (status, html) = send(app.clone(), get_req("/partials/leaderboards/spring/users")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.find("cat").unwrap() < html.find("amy").unwrap());
        assert!(html.contains("/api/leaderboards/spring/sort/toggle?field=username"));

        // The dashboard table keeps its own order.
        let (_, html) = send(app, get_req("/partials/users")).await;
        assert!(html.find("amy").unwrap() < html.find("cat").unwrap());
        assert!(html.contains("/api/settings/sort/toggle?field=username"));
    }

    #[tokio::test]
    async fn test_leaderboard_chart_partial_hides_series() {
        let state = test_state().await;
        let app = create_router_with_state(state.clone());
        let (status, html) = send(app.clone(), get_req("/partials/leaderboards/spring/chart")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Difference"));
        assert!(html.contains("Mar 1"));

        send(
            app.clone(),
            json_req(
                "PUT",
                "/api/settings/series",
                r#"{"weightedWagered": false, "difference": false}"#,
            ),
        )
        .await;
        let (_, html) = send(app.clone(), get_req("/partials/leaderboards/spring/chart")).await;
        assert!(html.contains("Wagered"));
        assert!(html.contains("Users"));
        assert!(!html.contains("Weighted"));
        assert!(!html.contains("Difference"));

        let (status, _) = send(app, get_req("/partials/leaderboards/gone/chart")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_leaderboard_page_persists_period() {
        let state = test_state().await;
        let app = create_router_with_state(state.clone());
        let (status, html) = send(app, get_req("/leaderboards/spring?period=90d")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("/partials/leaderboards/spring/chart?period=90d"), "{html}");
        assert!(html.contains("/partials/leaderboards/spring/users?period=90d"));
        assert_eq!(
            state.settings.stored(&TIME_PERIOD).await.unwrap(),
            Some(TimePeriod::Last90Days)
        );
    }

    #[tokio::test]
    async fn test_visualize() {
        let app = create_router_with_state(test_state().await);
        let (status, body) = send(app.clone(), get_req("/api/visualize?userId=o1&casino=roobet")).await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["users"][0]["uid"], "b");
        assert_eq!(v["users"][0]["activityScore"], 100);
        assert_eq!(v["users"][1]["activityScore"], 25);

        let (status, _) = send(app, get_req("/api/visualize?userId=&casino=roobet")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_and_metrics_without_recorder() {
        let app = create_router_with_state(test_state().await);
        let (status, body) = send(app.clone(), get_req("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""status":"ok""#));
        let (status, _) = send(app, get_req("/metrics")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
