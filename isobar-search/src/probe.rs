//! Forecast content probes.
//!
//! The date search asks two questions of the backend for each candidate:
//! does a run exist at this base date, and does its aggregate summary
//! carry any usable lead-time series.

use std::sync::Arc;

use async_trait::async_trait;
use isobar_core::{FetchResult, SearchConfig};
use isobar_fetch::ResilientClient;
use serde::{Deserialize, Serialize};

/// Summary selection sent with every summary probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryBaseline {
    pub percentile: u8,
    pub normalization: String,
}

impl Default for SummaryBaseline {
    fn default() -> Self {
        Self {
            percentile: 50,
            normalization: "none".to_string(),
        }
    }
}

impl From<&SearchConfig> for SummaryBaseline {
    fn from(config: &SearchConfig) -> Self {
        Self {
            percentile: config.percentile,
            normalization: config.normalization.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    #[serde(default)]
    pub available: bool,
    /// Ensemble members present for the run, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u32>,
}

/// One lead-time series of an aggregate summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSeries {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lead_hours: Vec<i64>,
    #[serde(default)]
    pub values: Vec<Option<f64>>,
}

impl LeadSeries {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    #[serde(default)]
    pub series: Vec<LeadSeries>,
}

impl AggregateSummary {
    /// At least one non-empty lead series.
    pub fn is_usable(&self) -> bool {
        self.series.iter().any(|series| !series.is_empty())
    }
}

/// Backend questions asked per search candidate.
#[async_trait]
pub trait ForecastProbe: Send + Sync {
    async fn availability(&self, workspace: &str, date: &str) -> FetchResult<Availability>;

    async fn summary(
        &self,
        workspace: &str,
        date: &str,
        baseline: &SummaryBaseline,
    ) -> FetchResult<AggregateSummary>;
}

#[async_trait]
impl<P: ForecastProbe + ?Sized> ForecastProbe for Arc<P> {
    async fn availability(&self, workspace: &str, date: &str) -> FetchResult<Availability> {
        (**self).availability(workspace, date).await
    }

    async fn summary(
        &self,
        workspace: &str,
        date: &str,
        baseline: &SummaryBaseline,
    ) -> FetchResult<AggregateSummary> {
        (**self).summary(workspace, date, baseline).await
    }
}

/// Availability endpoint for `date` in `workspace`.
pub fn availability_endpoint(workspace: &str, date: &str) -> String {
    format!(
        "/api/workspaces/{}/forecasts/availability?date={}",
        urlencoding::encode(workspace),
        urlencoding::encode(date)
    )
}

/// Aggregate summary endpoint for `date` in `workspace`.
pub fn summary_endpoint(workspace: &str, date: &str, baseline: &SummaryBaseline) -> String {
    format!(
        "/api/workspaces/{}/forecasts/summary?date={}&percentile={}&normalization={}",
        urlencoding::encode(workspace),
        urlencoding::encode(date),
        baseline.percentile,
        urlencoding::encode(&baseline.normalization)
    )
}

/// [`ForecastProbe`] over the dashboard API.
#[derive(Clone)]
pub struct ForecastApi {
    client: ResilientClient,
}

impl ForecastApi {
    pub fn new(client: ResilientClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }
}

#[async_trait]
impl ForecastProbe for ForecastApi {
    async fn availability(&self, workspace: &str, date: &str) -> FetchResult<Availability> {
        self.client
            .request_json(&availability_endpoint(workspace, date))
            .await
    }

    async fn summary(
        &self,
        workspace: &str,
        date: &str,
        baseline: &SummaryBaseline,
    ) -> FetchResult<AggregateSummary> {
        self.client
            .request_json(&summary_endpoint(workspace, date, baseline))
            .await
    }
}
