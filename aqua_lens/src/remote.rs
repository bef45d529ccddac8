//! Client for a remote water analysis service.
//!
//! The remote contract is `POST {base_url}/api/analyze-water` with a multipart
//! body (`image`, `waterSource`, `latitude`, `longitude`, `userId`). Only the
//! `results`, `confidence` and `colorChannels` fields of the JSON response are
//! used; quality and safety are always recomputed locally.

use crate::core_modules::raster::{FeatureError, ImageSource};
use crate::model::{ColorChannels, Measurement, WaterParameters};
use crate::service::AnalysisRequest;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Confidence assumed when an external analyzer does not report one.
pub const DEFAULT_EXTERNAL_CONFIDENCE: u8 = 95;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote analyzer returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("image could not be read: {0}")]
    Image(#[from] FeatureError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// An analyzer reached over the network.
#[async_trait]
pub trait RemoteAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, request: &AnalysisRequest) -> Result<Measurement, RemoteError>;
}

/// Parameter values as external analyzers report them. Counts may arrive as
/// floats, so everything is read as `f64` first.
#[derive(Debug, Deserialize)]
pub(crate) struct WireParameters {
    ph: f64,
    chlorine: f64,
    nitrates: f64,
    hardness: f64,
    alkalinity: f64,
    #[serde(default)]
    bacteria: f64,
}

impl WireParameters {
    pub(crate) fn into_parameters(self) -> WaterParameters {
        WaterParameters {
            ph: self.ph,
            chlorine: self.chlorine,
            nitrates: self.nitrates,
            hardness: self.hardness,
            alkalinity: self.alkalinity,
            bacteria: self.bacteria.max(0.0).round() as u32,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireChannels {
    red: f64,
    green: f64,
    blue: f64,
}

impl WireChannels {
    pub(crate) fn into_channels(self) -> ColorChannels {
        let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
        ColorChannels {
            red: channel(self.red),
            green: channel(self.green),
            blue: channel(self.blue),
        }
    }
}

pub(crate) fn confidence_from(value: Option<f64>) -> u8 {
    value.map_or(DEFAULT_EXTERNAL_CONFIDENCE, |c| c.round().clamp(0.0, 100.0) as u8)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteResponse {
    results: WireParameters,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    color_channels: Option<WireChannels>,
}

/// `reqwest`-backed remote analyzer.
pub struct HttpRemoteAnalyzer {
    client: Client,
    endpoint: String,
}

impl HttpRemoteAnalyzer {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/analyze-water", config.base_url.trim_end_matches('/')),
        })
    }

    async fn form(request: &AnalysisRequest) -> Result<Form, RemoteError> {
        let bytes = match &request.image {
            ImageSource::Path(path) => tokio::fs::read(path).await.map_err(FeatureError::from)?,
            other => other.read_bytes()?,
        };
        let image = Part::bytes(bytes).file_name("water-sample");
        let mut form = Form::new()
            .part("image", image)
            .text("waterSource", request.water_source.as_str().to_string());
        if let Some(location) = request.location {
            form = form
                .text("latitude", location.latitude.to_string())
                .text("longitude", location.longitude.to_string());
        }
        if let Some(user_id) = &request.user_id {
            form = form.text("userId", user_id.clone());
        }
        Ok(form)
    }
}

#[async_trait]
impl RemoteAnalyzer for HttpRemoteAnalyzer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<Measurement, RemoteError> {
        let form = Self::form(request).await?;
        let response = self.client.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RemoteResponse = serde_json::from_str(&body)?;
        tracing::debug!(endpoint = %self.endpoint, "remote analysis received");
        Ok(Measurement {
            parameters: parsed.results.into_parameters(),
            confidence: confidence_from(parsed.confidence),
            color_channels: parsed.color_channels.map(WireChannels::into_channels).unwrap_or_default(),
        })
    }
}
