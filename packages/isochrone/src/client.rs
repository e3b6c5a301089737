//! HTTP client for GraphHopper-compatible isochrone services.
//!
//! One `GET <base>/isochrone` is sent per point part. A 400 answer means
//! the service found no road near the point; it is logged and the point is
//! skipped. Every other failure is returned to the caller and ends the run.
//!
//! See <https://docs.graphhopper.com/#tag/Isochrone-API>

use std::time::Duration;

use async_trait::async_trait;
use catchment_isochrone_models::wire::{ErrorBody, IsochroneResponse, RawIsochrone};
use catchment_isochrone_models::{Profile, Unit};
use geo::{MultiPoint, Point};

use crate::config::ServiceConfig;
use crate::{FetchError, TASK_TARGET};

/// Source of isochrone polygons for a point.
#[async_trait]
pub trait IsochroneService: Send + Sync {
    /// Endpoint the service sends requests to, for messages.
    fn url(&self) -> &str;

    /// Returns the isochrone polygons of every part of `point`, concatenated
    /// in part order. An empty list means the service could not route from
    /// the point.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] for failures that must end the run.
    async fn fetch_for_point(&self, point: &MultiPoint<f64>)
    -> Result<Vec<RawIsochrone>, FetchError>;
}

/// Query parameters shared by every request of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    fixed: Vec<(&'static str, String)>,
}

impl RequestParams {
    /// Builds the parameters for a run. The limit is sent as
    /// `distance_limit` for meters and as `time_limit` in seconds for
    /// minutes. An empty `api_key` is not sent.
    #[must_use]
    pub fn new(
        profile: Profile,
        buckets: u32,
        distance: u32,
        unit: Unit,
        api_key: Option<&str>,
    ) -> Self {
        let mut fixed = vec![
            ("profile", profile.to_string()),
            ("buckets", buckets.to_string()),
            ("reverse_flow", "true".to_string()),
        ];
        if let Some(key) = api_key.filter(|key| !key.is_empty()) {
            fixed.push(("key", key.to_string()));
        }
        match unit {
            Unit::Meters => {
                fixed.push(("distance_limit", distance.to_string()));
                fixed.push(("time_limit", "-1".to_string()));
            }
            Unit::Minutes => {
                fixed.push(("time_limit", (u64::from(distance) * 60).to_string()));
            }
        }
        Self { fixed }
    }

    /// Full query for one point, `point` given as `lat,lon`.
    #[must_use]
    pub fn query(&self, point: Point<f64>) -> Vec<(&'static str, String)> {
        let mut query = self.fixed.clone();
        query.push(("point", format!("{},{}", point.y(), point.x())));
        query
    }
}

/// Turns a user supplied base URL into the isochrone endpoint.
///
/// `"localhost:8989"` becomes `"http://localhost:8989/isochrone"`; a URL
/// that already carries `http://` or `https://` keeps it.
#[must_use]
pub fn normalize_base_url(url: &str, config: &ServiceConfig) -> String {
    let url = url.trim();
    let mut normalized = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}{url}", config.default_scheme)
    };
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized.push_str(&config.endpoint);
    normalized
}

/// Text logged for a 400 answer: the JSON `message` if there is one,
/// otherwise the body, otherwise the status line.
#[must_use]
pub fn routing_failure_message(body: &str, status: reqwest::StatusCode) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { message }) => message,
        _ if body.trim().is_empty() => status.to_string(),
        _ => body.trim().to_string(),
    }
}

/// [`IsochroneService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIsochroneService {
    client: reqwest::Client,
    url: String,
    params: RequestParams,
}

impl HttpIsochroneService {
    /// Creates a service for the already normalized endpoint `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        params: RequestParams,
        config: &ServiceConfig,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            params,
        })
    }

    async fn fetch_part(&self, point: Point<f64>) -> Result<Option<Vec<RawIsochrone>>, FetchError> {
        let resp = self
            .client
            .get(&self.url)
            .query(&self.params.query(point))
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    log::debug!(target: TASK_TARGET, "Could not read 400 response body: {e}");
                    String::new()
                }
            };
            log::warn!(
                target: TASK_TARGET,
                "Request failed for point {},{}: {}",
                point.y(),
                point.x(),
                routing_failure_message(&body, status)
            );
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = resp.text().await?;
        let parsed: IsochroneResponse = serde_json::from_str(&body)?;
        Ok(Some(parsed.polygons))
    }
}

#[async_trait]
impl IsochroneService for HttpIsochroneService {
    fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_for_point(
        &self,
        point: &MultiPoint<f64>,
    ) -> Result<Vec<RawIsochrone>, FetchError> {
        let mut polygons = Vec::new();
        for part in point {
            match self.fetch_part(*part).await? {
                Some(found) => polygons.extend(found),
                None => return Ok(Vec::new()),
            }
        }
        Ok(polygons)
    }
}
