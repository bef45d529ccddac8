// THEORY:
// The `pipeline` module is the top-level local API of the analysis engine. It
// chains the layers below it into one call:
//
//   decode -> extract features -> estimate parameters -> classify
//
// It is deliberately synchronous and CPU-bound. The async `service` decides
// whether a request ever reaches it and runs it on a blocking thread when it
// does.

use crate::core_modules::classifier::{Classification, classify};
use crate::core_modules::color_profile::mean_color;
use crate::core_modules::estimator::{HeuristicEstimator, ParameterConfidence, ParameterOverrides};
use crate::core_modules::features::{FeatureSummary, extract};
use crate::core_modules::raster::{DEFAULT_MAX_EDGE, FeatureError, ImageSource, Raster};
use crate::model::{ColorChannels, GeoPoint, ProcessingMethod, WaterParameters, WaterSource, WaterTestDraft};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("image could not be analyzed: {0}")]
    Feature(#[from] FeatureError),

    #[error("analysis worker failed: {0}")]
    Worker(String),
}

/// Configuration for the WaterAnalysisPipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Longest image edge after downscaling.
    pub max_edge: u32,
    /// Seed for the estimator jitter. `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_edge: DEFAULT_MAX_EDGE,
            seed: None,
        }
    }
}

/// The outcome of one analysis, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub parameters: WaterParameters,
    /// Estimated turbidity in NTU. Only the local estimator reports it.
    pub turbidity: Option<f64>,
    pub classification: Classification,
    pub confidence: u8,
    pub parameter_confidence: Option<ParameterConfidence>,
    pub processing_method: ProcessingMethod,
    pub processing_time_secs: f64,
    pub color_channels: ColorChannels,
    /// Only present when features were extracted locally.
    pub features: Option<FeatureSummary>,
}

impl AnalysisReport {
    /// Builds a report around parameters measured elsewhere, classifying them locally.
    pub fn from_parameters(
        parameters: WaterParameters,
        water_source: WaterSource,
        confidence: u8,
        processing_method: ProcessingMethod,
        elapsed: Duration,
        color_channels: ColorChannels,
    ) -> Self {
        Self {
            classification: classify(&parameters, water_source),
            parameters,
            turbidity: None,
            confidence,
            parameter_confidence: None,
            processing_method,
            processing_time_secs: elapsed.as_secs_f64(),
            color_channels,
            features: None,
        }
    }

    pub fn into_draft(self, water_source: WaterSource, location: Option<GeoPoint>, user_id: Option<String>) -> WaterTestDraft {
        WaterTestDraft {
            water_source,
            location,
            user_id,
            results: self.parameters,
            overall_quality: self.classification.overall_quality,
            safety_level: self.classification.safety_level,
            confidence: self.confidence,
            alerts: self.classification.alerts,
            recommendations: self.classification.recommendations,
            processing_method: self.processing_method,
            processing_time_secs: self.processing_time_secs,
            color_channels: self.color_channels,
        }
    }
}

/// The main local analysis engine.
pub struct WaterAnalysisPipeline {
    config: PipelineConfig,
    estimator: Mutex<HeuristicEstimator>,
}

impl WaterAnalysisPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let estimator = match config.seed {
            Some(seed) => HeuristicEstimator::seeded(seed),
            None => HeuristicEstimator::with_thread_random(),
        };
        Self::with_estimator(config, estimator)
    }

    pub fn with_estimator(config: PipelineConfig, estimator: HeuristicEstimator) -> Self {
        Self {
            config,
            estimator: Mutex::new(estimator),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn analyze(
        &self,
        source: &ImageSource,
        water_source: WaterSource,
        overrides: &ParameterOverrides,
    ) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();

        // Stage 1: Decode at working resolution
        let raster = Raster::decode(source, self.config.max_edge)?;
        tracing::debug!(
            source = %source.describe(),
            width = raster.width(),
            height = raster.height(),
            "image decoded"
        );

        Ok(self.analyze_raster_since(&raster, water_source, overrides, started))
    }

    /// Runs the pipeline on an already decoded raster.
    pub fn analyze_raster(
        &self,
        raster: &Raster,
        water_source: WaterSource,
        overrides: &ParameterOverrides,
    ) -> AnalysisReport {
        self.analyze_raster_since(raster, water_source, overrides, Instant::now())
    }

    fn analyze_raster_since(
        &self,
        raster: &Raster,
        water_source: WaterSource,
        overrides: &ParameterOverrides,
        started: Instant,
    ) -> AnalysisReport {
        // Stage 2: Feature extraction
        let features = extract(raster);

        // Stage 3: Parameter estimation. Only the estimator's random source is shared.
        let estimate = self
            .estimator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .estimate_with(&features, overrides);

        // Stage 4: Classification
        let classification = classify(&estimate.parameters, water_source);

        let mean = mean_color(&features.color);
        let report = AnalysisReport {
            parameters: estimate.parameters,
            turbidity: Some(estimate.turbidity),
            classification,
            confidence: estimate.confidence,
            parameter_confidence: Some(estimate.parameter_confidence),
            processing_method: ProcessingMethod::LocalHeuristic,
            processing_time_secs: started.elapsed().as_secs_f64(),
            color_channels: ColorChannels {
                red: mean.red,
                green: mean.green,
                blue: mean.blue,
            },
            features: Some(features.summary()),
        };
        tracing::debug!(
            quality = %report.classification.overall_quality,
            safety = %report.classification.safety_level,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "local analysis finished"
        );
        report
    }
}
