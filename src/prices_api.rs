use crate::config::{IngestConfig, RetryPolicy};
use crate::models::{Observation, SnapshotResponse, TimeseriesResponse};
use crate::retry::retry_operation;
use crate::source::ObservationSource;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::info;
use reqwest::Client;
use serde::de::DeserializeOwned;

const TIMESERIES_TIMESTEP: &str = "5m";
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Snapshots older than this with no data are considered permanently empty.
pub const STALE_SNAPSHOT_AGE_HOURS: i64 = 6;

/// Client for the wiki real-time prices API.
pub struct PricesApiClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl PricesApiClient {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.http_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            retry: config.fetch_retry,
        })
    }

    /// 5-minute history for one item, retried per the configured policy.
    pub async fn fetch_timeseries(&self, item_id: i64) -> Result<Vec<Observation>> {
        retry_operation!(
            self.retry,
            format!("timeseries fetch for item {}", item_id),
            self.fetch_timeseries_once(item_id)
        )
    }

    /// Bulk 5-minute snapshot of every item at `timestamp`.
    pub async fn fetch_snapshot(&self, timestamp: i64) -> Result<Vec<Observation>> {
        retry_operation!(
            self.retry,
            format!("snapshot fetch at {}", timestamp),
            self.fetch_snapshot_once(timestamp)
        )
    }

    async fn fetch_timeseries_once(&self, item_id: i64) -> Result<Vec<Observation>> {
        let response: TimeseriesResponse = self
            .get_json(
                "/timeseries",
                &[
                    ("timestep", TIMESERIES_TIMESTEP.to_string()),
                    ("id", item_id.to_string()),
                ],
            )
            .await?;
        let observations = response.into_observations(item_id, Utc::now());
        if observations.is_empty() {
            info!("No timeseries data returned for item {}", item_id);
        } else {
            info!(
                "Fetched {} timeseries entries for item {}",
                observations.len(),
                item_id
            );
        }
        Ok(observations)
    }

    async fn fetch_snapshot_once(&self, timestamp: i64) -> Result<Vec<Observation>> {
        let response: SnapshotResponse = self
            .get_json("/5m", &[("timestamp", timestamp.to_string())])
            .await?;
        let fetch_time = Utc::now();

        if response.data.is_empty() {
            if snapshot_is_stale(timestamp, fetch_time) {
                info!(
                    "No snapshot data for timestamp {}, older than {}h; skipping",
                    timestamp, STALE_SNAPSHOT_AGE_HOURS
                );
                return Ok(Vec::new());
            }
            return Err(anyhow!(
                "API returned no snapshot data for recent timestamp {}",
                timestamp
            ));
        }

        let event_time = response
            .timestamp
            .ok_or_else(|| anyhow!("API snapshot response is missing 'timestamp'"))?;
        let observations = response.into_observations(event_time, fetch_time);
        info!(
            "Fetched snapshot timestamp={} count={}",
            event_time,
            observations.len()
        );
        Ok(observations)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(anyhow!(
                "API request to {} failed with status {}: {}",
                url,
                status,
                body
            ));
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode response from {}", url))
    }
}

pub fn snapshot_is_stale(timestamp: i64, now: DateTime<Utc>) -> bool {
    match DateTime::<Utc>::from_timestamp(timestamp, 0) {
        Some(requested) => now - requested > ChronoDuration::hours(STALE_SNAPSHOT_AGE_HOURS),
        None => true,
    }
}

/// Timeseries history for a single item.
pub struct TimeseriesSource<'a> {
    client: &'a PricesApiClient,
    item_id: i64,
}

impl<'a> TimeseriesSource<'a> {
    pub fn new(client: &'a PricesApiClient, item_id: i64) -> Self {
        Self { client, item_id }
    }
}

#[async_trait]
impl ObservationSource for TimeseriesSource<'_> {
    fn describe(&self) -> String {
        format!("timeseries for item {}", self.item_id)
    }

    async fn fetch(&self) -> Result<Vec<Observation>> {
        self.client.fetch_timeseries(self.item_id).await
    }
}

/// All items at one 5-minute boundary.
pub struct SnapshotSource<'a> {
    client: &'a PricesApiClient,
    timestamp: i64,
}

impl<'a> SnapshotSource<'a> {
    pub fn new(client: &'a PricesApiClient, timestamp: i64) -> Self {
        Self { client, timestamp }
    }
}

#[async_trait]
impl ObservationSource for SnapshotSource<'_> {
    fn describe(&self) -> String {
        format!("snapshot at {}", self.timestamp)
    }

    async fn fetch(&self) -> Result<Vec<Observation>> {
        self.client.fetch_snapshot(self.timestamp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stale_only_after_six_hours() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let recent = (now - ChronoDuration::hours(2)).timestamp();
        let old = (now - ChronoDuration::hours(7)).timestamp();

        assert!(!snapshot_is_stale(recent, now));
        assert!(snapshot_is_stale(old, now));
    }
}
