use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Backend;
use crate::period::{DateRange, Granularity};
use crate::types::{
    FetchWagersRequest, FetchWagersResponse, LeaderboardStatsResponse, StatsResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{endpoint} reported failure: {message}")]
    Rejected {
        endpoint: &'static str,
        message: String,
    },
    #[error("functions_jwt is not configured")]
    MissingJwt,
}

/// Upstream data the dashboard is built from.
pub trait StatsSource {
    fn fetch_stats(
        &self,
        range: DateRange,
    ) -> impl Future<Output = Result<StatsResponse>> + Send;

    fn fetch_leaderboard_stats(
        &self,
        leaderboard_id: &str,
        range: DateRange,
        granularity: Granularity,
    ) -> impl Future<Output = Result<LeaderboardStatsResponse>> + Send;

    fn fetch_wagers(
        &self,
        user_id: &str,
        casino: &str,
        range: DateRange,
    ) -> impl Future<Output = Result<FetchWagersResponse>> + Send;
}

/// HTTP client for the stats API and the `fetch-wagers` function.
#[derive(Debug, Clone)]
pub struct StatsClient {
    stats_api_url: String,
    functions_url: String,
    functions_jwt: Option<String>,
    client: reqwest::Client,
}

impl StatsClient {
    pub fn new(backend: &Backend) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(backend.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            stats_api_url: backend.stats_api_url.trim_end_matches('/').to_string(),
            functions_url: backend.functions_url.trim_end_matches('/').to_string(),
            functions_jwt: backend.functions_jwt.clone(),
            client,
        })
    }

    pub fn stats_url(&self, range: DateRange) -> String {
        format!(
            "{}/api/stats?start={}&end={}",
            self.stats_api_url,
            urlencoding::encode(&range.start_iso()),
            urlencoding::encode(&range.end_iso()),
        )
    }

    pub fn leaderboard_stats_url(
        &self,
        leaderboard_id: &str,
        range: DateRange,
        granularity: Granularity,
    ) -> String {
        format!(
            "{}/api/leaderboards/{}/stats?startDate={}&endDate={}&granularity={granularity}",
            self.stats_api_url,
            urlencoding::encode(leaderboard_id),
            urlencoding::encode(&range.start_iso()),
            urlencoding::encode(&range.end_iso()),
        )
    }

    pub fn fetch_wagers_url(&self) -> String {
        format!("{}/fetch-wagers", self.functions_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &'static str, url: &str) -> Result<T> {
        debug!(endpoint, url = %url, "fetching");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to reach {endpoint}"))?;
        decode_response(endpoint, resp).await
    }
}

async fn decode_response<T: DeserializeOwned>(
    endpoint: &'static str,
    resp: reqwest::Response,
) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            endpoint,
            status,
            body,
        }
        .into());
    }
    resp.json()
        .await
        .with_context(|| format!("failed to deserialize {endpoint} response"))
}

/// Time the request and count it by endpoint and outcome.
async fn instrumented<T>(endpoint: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    let start = Instant::now();
    let res = fut.await;
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!("dashboard_stats_fetch_latency_ms", "endpoint" => endpoint).record(ms);
    let status = if res.is_ok() { "ok" } else { "error" };
    metrics::counter!("dashboard_stats_fetch_total", "endpoint" => endpoint, "status" => status)
        .increment(1);
    res
}

impl StatsSource for StatsClient {
    async fn fetch_stats(&self, range: DateRange) -> Result<StatsResponse> {
        let url = self.stats_url(range);
        instrumented("stats", self.get_json("stats", &url)).await
    }

    async fn fetch_leaderboard_stats(
        &self,
        leaderboard_id: &str,
        range: DateRange,
        granularity: Granularity,
    ) -> Result<LeaderboardStatsResponse> {
        let url = self.leaderboard_stats_url(leaderboard_id, range, granularity);
        instrumented("leaderboard_stats", async {
            let resp: LeaderboardStatsResponse = self.get_json("leaderboard_stats", &url).await?;
            if !resp.success {
                return Err(FetchError::Rejected {
                    endpoint: "leaderboard_stats",
                    message: resp.error.unwrap_or_else(|| "unknown error".to_string()),
                }
                .into());
            }
            Ok(resp)
        })
        .await
    }

    async fn fetch_wagers(
        &self,
        user_id: &str,
        casino: &str,
        range: DateRange,
    ) -> Result<FetchWagersResponse> {
        instrumented("fetch_wagers", async {
            let jwt = self.functions_jwt.as_deref().ok_or(FetchError::MissingJwt)?;
            let body = FetchWagersRequest {
                user_id: user_id.to_string(),
                start_date: range.start_iso(),
                end_date: range.end_iso(),
                jwt: jwt.to_string(),
                casino_identifier: casino.to_string(),
            };
            let url = self.fetch_wagers_url();
            debug!(endpoint = "fetch_wagers", url = %url, casino, "fetching");
            let resp = self
                .client
                .post(&url)
                .bearer_auth(jwt)
                .json(&body)
                .send()
                .await
                .context("failed to reach fetch_wagers")?;
            let resp: FetchWagersResponse = decode_response("fetch_wagers", resp).await?;
            if !resp.success {
                return Err(FetchError::Rejected {
                    endpoint: "fetch_wagers",
                    message: resp.error.unwrap_or_else(|| "unknown error".to_string()),
                }
                .into());
            }
            Ok(resp)
        })
        .await
    }
}
