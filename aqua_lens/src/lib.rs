// THEORY:
// This file is the main entry point for the `aqua_lens` library crate.
// It defines the public API exposed to external consumers (like the `aqua_probe`
// command-line driver).
//
// The primary goal is to export the `AnalysisService` and the
// `WaterAnalysisPipeline` together with their data structures (`AnalysisRequest`,
// `AnalysisReport`, `WaterTestResult`, etc.) as the high-level interface of the
// engine. The analytical layers live in `core_modules`; persistence lives in
// `store`.

pub mod config;
pub mod core_modules;
pub mod external_tool;
pub mod model;
pub mod pipeline;
pub mod remote;
pub mod service;
pub mod store;

pub use config::{AquaLensConfig, ConfigError};
pub use core_modules::classifier::{Classification, classify};
pub use core_modules::estimator::{HeuristicEstimator, ParameterOverrides};
pub use core_modules::features::{ImageFeatures, extract, extract_from_source};
pub use core_modules::raster::{FeatureError, ImageSource, Raster};
pub use model::{
    Alert, AlertSeverity, CalibrationRecord, ColorChannels, GeoPoint, Measurement, OverallQuality, ProcessingMethod,
    SafetyLevel, WaterParameters, WaterSource, WaterTestDraft, WaterTestResult,
};
pub use pipeline::{AnalysisError, AnalysisReport, PipelineConfig, WaterAnalysisPipeline};
pub use service::{AnalysisRequest, AnalysisService};
pub use store::{ResultStore, Statistics, StoreConfig, StoreError, StoreExport};
