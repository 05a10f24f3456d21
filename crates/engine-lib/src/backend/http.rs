//! HTTP implementation of the scoring backend client

use super::{BackendConfig, ScoringBackend};
use crate::error::InvokeError;
use crate::models::FeatureVector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Scoring backend client over HTTP/JSON.
pub struct HttpScoringBackend {
    config: BackendConfig,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct VersionBody {
    version: String,
}

#[derive(Debug, Serialize)]
struct ReloadRequest<'a> {
    version: &'a str,
    model_urls: &'a BTreeMap<String, String>,
}

impl HttpScoringBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        // reject garbage URLs at construction instead of on the first call
        let parsed = url::Url::parse(&config.base_url)
            .with_context(|| format!("Invalid backend base URL: {}", config.base_url))?;
        let base_url = parsed.as_str().trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            base_url,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ScoringBackend for HttpScoringBackend {
    async fn is_healthy(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let response = match self
            .http
            .get(&url)
            .timeout(self.config.health_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = %response.status(), "Liveness probe returned non-success");
                return false;
            }
            Err(err) => {
                debug!(error = %err, "Liveness probe failed");
                return false;
            }
        };

        match response.json::<HealthBody>().await {
            Ok(body) => body.status == "healthy",
            Err(err) => {
                debug!(error = %err, "Liveness probe returned malformed body");
                false
            }
        }
    }

    async fn invoke(&self, model: &str, features: &FeatureVector) -> Result<f64, InvokeError> {
        let url = format!("{}/model/{}/predict", self.base_url, model);

        let response = self
            .http
            .post(&url)
            .timeout(self.config.request_timeout)
            .json(features)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    InvokeError::Timeout(self.config.request_timeout)
                } else {
                    InvokeError::Upstream(format!("model `{model}`: {err}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InvokeError::Upstream(format!(
                "model `{model}` returned HTTP {status}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| InvokeError::MalformedResponse(format!("model `{model}`: {err}")))?;

        extract_score(&body, model)
    }

    async fn loaded_version(&self) -> Option<String> {
        let url = format!("{}/model/version", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(self.config.health_timeout)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }
        match response.json::<VersionBody>().await {
            Ok(body) => Some(body.version),
            Err(err) => {
                debug!(error = %err, "Version endpoint returned malformed body");
                None
            }
        }
    }

    async fn request_reload(&self, version: &str, model_urls: &BTreeMap<String, String>) -> bool {
        let url = format!("{}/model/reload", self.base_url);
        let request = ReloadRequest {
            version,
            model_urls,
        };

        match self
            .http
            .post(&url)
            .timeout(self.config.request_timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(
                    version = %version,
                    status = %response.status(),
                    "Backend rejected model reload"
                );
                false
            }
            Err(err) => {
                warn!(version = %version, error = %err, "Model reload request failed");
                false
            }
        }
    }
}

/// Pull the scalar score out of a prediction response. `score` is the
/// expected key, `prediction` the secondary one; a value outside [0, 1] is
/// treated as malformed rather than clamped.
fn extract_score(body: &serde_json::Value, model: &str) -> Result<f64, InvokeError> {
    let raw = body
        .get("score")
        .or_else(|| body.get("prediction"))
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| {
            InvokeError::MalformedResponse(format!(
                "model `{model}` response has no numeric `score` or `prediction` field"
            ))
        })?;

    if !(0.0..=1.0).contains(&raw) {
        return Err(InvokeError::MalformedResponse(format!(
            "model `{model}` score {raw} outside [0, 1]"
        )));
    }
    Ok(raw)
}
