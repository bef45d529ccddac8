// THEORY:
// The `service` module is the async front of the engine. It owns everything a
// submission touches and decides where the parameters come from.
//
// Key architectural principles:
// 1.  **Fallback Chain**: A submission tries the remote analyzer, then the
//     external tool, then the local heuristic. Each failure is logged with the
//     reason and the next stage runs. The user always gets a result unless the
//     image itself cannot be decoded on the local path.
// 2.  **Local Judgement**: Whatever produced the parameters, quality and safety
//     are classified here, so every stored result follows the same rules.
// 3.  **Bounded Concurrency**: Local analysis is CPU-bound and runs on the
//     blocking pool. Batches run at most one submission per core at a time.

use crate::config::AquaLensConfig;
use crate::core_modules::estimator::ParameterOverrides;
use crate::core_modules::raster::ImageSource;
use crate::external_tool::{ExternalTool, ProcessTool};
use crate::model::{GeoPoint, Measurement, ProcessingMethod, WaterSource, WaterTestResult};
use crate::pipeline::{AnalysisError, AnalysisReport, WaterAnalysisPipeline};
use crate::remote::{HttpRemoteAnalyzer, RemoteAnalyzer, RemoteError};
use crate::store::ResultStore;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;

/// One image to analyze, with the context that travels with it.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image: ImageSource,
    pub water_source: WaterSource,
    pub location: Option<GeoPoint>,
    pub user_id: Option<String>,
    /// Parameters the caller already knows. Applied on top of any estimate.
    pub overrides: ParameterOverrides,
}

impl AnalysisRequest {
    pub fn new(image: ImageSource, water_source: WaterSource) -> Self {
        Self {
            image,
            water_source,
            location: None,
            user_id: None,
            overrides: ParameterOverrides::default(),
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(GeoPoint { latitude, longitude });
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_overrides(mut self, overrides: ParameterOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

pub struct AnalysisService {
    pipeline: Arc<WaterAnalysisPipeline>,
    store: Arc<ResultStore>,
    remote: Option<Arc<dyn RemoteAnalyzer>>,
    tool: Option<Arc<dyn ExternalTool>>,
}

impl AnalysisService {
    /// A service that only analyzes locally.
    pub fn new(pipeline: WaterAnalysisPipeline, store: Arc<ResultStore>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            store,
            remote: None,
            tool: None,
        }
    }

    /// Builds the service described by `config` and opens its store.
    pub fn from_config(config: &AquaLensConfig) -> Result<Self, RemoteError> {
        let store = Arc::new(ResultStore::new(config.store.clone()));
        store.init();
        let mut service = Self::new(WaterAnalysisPipeline::new(config.pipeline.clone()), store);
        if config.remote.enabled {
            service = service.with_remote(Arc::new(HttpRemoteAnalyzer::new(&config.remote)?));
        }
        if config.external_tool.enabled {
            service = service.with_external_tool(Arc::new(ProcessTool::new(config.external_tool.clone())));
        }
        Ok(service)
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteAnalyzer>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_external_tool(mut self, tool: Arc<dyn ExternalTool>) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Analyzes one request and persists the result.
    pub async fn submit(&self, request: AnalysisRequest) -> Result<WaterTestResult, AnalysisError> {
        let report = self.analyze(&request).await?;
        let draft = report.into_draft(request.water_source, request.location, request.user_id);

        let store = Arc::clone(&self.store);
        let saved = tokio::task::spawn_blocking(move || store.save(draft))
            .await
            .map_err(|e| AnalysisError::Worker(e.to_string()))?;
        tracing::info!(
            id = %saved.id,
            method = saved.processing_method.as_str(),
            quality = %saved.overall_quality,
            safety = %saved.safety_level,
            "water test analyzed"
        );
        Ok(saved)
    }

    /// Submits every request, at most one per CPU at a time. Results keep the
    /// order of `requests`.
    pub async fn submit_batch(&self, requests: Vec<AnalysisRequest>) -> Vec<Result<WaterTestResult, AnalysisError>> {
        let max_concurrent = num_cpus::get().max(1);
        let mut results: Vec<(usize, Result<WaterTestResult, AnalysisError>)> = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| async move { (index, self.submit(request).await) })
            .buffer_unordered(max_concurrent)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Produces a report without persisting it.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();

        if let Some(remote) = &self.remote {
            match remote.analyze(request).await {
                Ok(measurement) => return Ok(self.measured_report(request, measurement, ProcessingMethod::Remote, started)),
                Err(err) => tracing::warn!(
                    analyzer = remote.name(),
                    error = %err,
                    "remote analysis failed, trying next analyzer"
                ),
            }
        }

        if let Some(tool) = &self.tool {
            match tool.analyze(request).await {
                Ok(measurement) => {
                    return Ok(self.measured_report(request, measurement, ProcessingMethod::ExternalTool, started));
                }
                Err(err) => tracing::warn!(
                    tool = tool.name(),
                    error = %err,
                    "external tool failed, using local heuristic"
                ),
            }
        }

        let pipeline = Arc::clone(&self.pipeline);
        let image = request.image.clone();
        let water_source = request.water_source;
        let overrides = request.overrides;
        let mut report = tokio::task::spawn_blocking(move || pipeline.analyze(&image, water_source, &overrides))
            .await
            .map_err(|e| AnalysisError::Worker(e.to_string()))??;
        report.processing_time_secs = started.elapsed().as_secs_f64();
        Ok(report)
    }

    fn measured_report(
        &self,
        request: &AnalysisRequest,
        mut measurement: Measurement,
        method: ProcessingMethod,
        started: Instant,
    ) -> AnalysisReport {
        request.overrides.apply(&mut measurement.parameters);
        AnalysisReport::from_parameters(
            measurement.parameters,
            request.water_source,
            measurement.confidence,
            method,
            started.elapsed(),
            measurement.color_channels,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::estimator::{FixedRandom, HeuristicEstimator};
    use crate::core_modules::pixel::pixel::Pixel;
    use crate::core_modules::raster::{FeatureError, Raster};
    use crate::external_tool::ToolError;
    use crate::model::{ColorChannels, OverallQuality, SafetyLevel, WaterParameters};
    use crate::pipeline::PipelineConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DownRemote {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteAnalyzer for DownRemote {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn analyze(&self, _: &AnalysisRequest) -> Result<Measurement, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    struct FixedRemote(WaterParameters);

    #[async_trait]
    impl RemoteAnalyzer for FixedRemote {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn analyze(&self, _: &AnalysisRequest) -> Result<Measurement, RemoteError> {
            Ok(Measurement {
                parameters: self.0,
                confidence: 90,
                color_channels: ColorChannels::default(),
            })
        }
    }

    struct StuckTool;

    #[async_trait]
    impl ExternalTool for StuckTool {
        fn name(&self) -> &'static str {
            "stuck"
        }

        async fn analyze(&self, _: &AnalysisRequest) -> Result<Measurement, ToolError> {
            Err(ToolError::Timeout(60))
        }
    }

    struct FixedTool;

    #[async_trait]
    impl ExternalTool for FixedTool {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn analyze(&self, _: &AnalysisRequest) -> Result<Measurement, ToolError> {
            Ok(Measurement {
                parameters: clean_parameters(),
                confidence: 77,
                color_channels: ColorChannels::default(),
            })
        }
    }

    fn clean_parameters() -> WaterParameters {
        WaterParameters {
            ph: 7.2,
            chlorine: 1.0,
            nitrates: 3.0,
            hardness: 100.0,
            alkalinity: 100.0,
            bacteria: 0,
        }
    }

    fn local_service() -> AnalysisService {
        let pipeline = WaterAnalysisPipeline::with_estimator(
            PipelineConfig::default(),
            HeuristicEstimator::new(Box::new(FixedRandom(0.0))),
        );
        AnalysisService::new(pipeline, Arc::new(ResultStore::in_memory()))
    }

    fn white_image() -> ImageSource {
        let png = Raster::filled(400, 300, Pixel::new(255, 255, 255, 255))
            .unwrap()
            .to_png_bytes()
            .unwrap();
        ImageSource::Bytes(png)
    }

    #[tokio::test]
    async fn white_image_is_stored_as_safe() {
        let service = local_service();
        let saved = service
            .submit(AnalysisRequest::new(white_image(), WaterSource::TapWater).with_location(40.0, -74.0))
            .await
            .unwrap();

        assert_eq!(saved.processing_method, ProcessingMethod::LocalHeuristic);
        assert_eq!(saved.safety_level, SafetyLevel::Safe);
        assert!(matches!(saved.overall_quality, OverallQuality::Excellent | OverallQuality::Good));
        assert!(saved.alerts.is_empty());
        assert_eq!(service.store().get_all(10), vec![saved]);
        assert!(service.store().get_alerts(true).is_empty());
    }

    #[tokio::test]
    async fn forced_bacteria_raises_an_alert() {
        let service = local_service();
        let overrides = ParameterOverrides {
            bacteria: Some(1),
            ..ParameterOverrides::default()
        };
        let saved = service
            .submit(AnalysisRequest::new(white_image(), WaterSource::WellWater).with_overrides(overrides))
            .await
            .unwrap();

        assert_eq!(saved.safety_level, SafetyLevel::Unsafe);
        assert!(saved.alerts.iter().any(|a| a == "Bacterial contamination detected"));
        let alerts = service.store().get_alerts(false);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].test_id, saved.id);
    }

    #[tokio::test]
    async fn failing_analyzers_fall_back_to_local() {
        let remote = Arc::new(DownRemote {
            calls: AtomicUsize::new(0),
        });
        let service = local_service()
            .with_remote(remote.clone())
            .with_external_tool(Arc::new(StuckTool));

        let saved = service
            .submit(AnalysisRequest::new(white_image(), WaterSource::TapWater))
            .await
            .unwrap();
        assert_eq!(saved.processing_method, ProcessingMethod::LocalHeuristic);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_parameters_are_classified_locally() {
        let mut dangerous = clean_parameters();
        dangerous.nitrates = 55.0;
        let service = local_service().with_remote(Arc::new(FixedRemote(dangerous)));

        // The image is never decoded when the remote answers.
        let saved = service
            .submit(AnalysisRequest::new(ImageSource::Bytes(vec![0; 8]), WaterSource::WellWater))
            .await
            .unwrap();
        assert_eq!(saved.processing_method, ProcessingMethod::Remote);
        assert_eq!(saved.safety_level, SafetyLevel::Critical);
        assert_eq!(saved.overall_quality, OverallQuality::UnsafeForConsumption);
        assert_eq!(saved.confidence, 90);
        assert_eq!(service.store().get_alerts(false).len(), 1);
    }

    #[tokio::test]
    async fn external_tool_answers_when_remote_is_down() {
        let service = local_service()
            .with_remote(Arc::new(DownRemote {
                calls: AtomicUsize::new(0),
            }))
            .with_external_tool(Arc::new(FixedTool));
        let saved = service
            .submit(AnalysisRequest::new(ImageSource::Bytes(vec![0; 8]), WaterSource::BottledWater))
            .await
            .unwrap();
        assert_eq!(saved.processing_method, ProcessingMethod::ExternalTool);
        assert_eq!(saved.confidence, 77);
        assert_eq!(saved.safety_level, SafetyLevel::Safe);
    }

    #[tokio::test]
    async fn undecodable_image_fails_on_local_path() {
        let service = local_service();
        let result = service
            .submit(AnalysisRequest::new(ImageSource::Bytes(b"garbage".to_vec()), WaterSource::Unknown))
            .await;
        assert!(matches!(result, Err(AnalysisError::Feature(FeatureError::Decode(_)))));
        assert!(service.store().get_all(10).is_empty());
    }

    #[tokio::test]
    async fn batch_keeps_request_order() {
        let service = local_service();
        let requests: Vec<AnalysisRequest> = (0..6)
            .map(|i| {
                let image = if i == 3 {
                    ImageSource::Bytes(vec![1, 2, 3])
                } else {
                    white_image()
                };
                AnalysisRequest::new(image, WaterSource::TapWater).with_user(format!("user-{i}"))
            })
            .collect();

        let results = service.submit_batch(requests).await;
        assert_eq!(results.len(), 6);
        for (i, result) in results.iter().enumerate() {
            if i == 3 {
                assert!(result.is_err());
            } else {
                let saved = result.as_ref().unwrap();
                assert_eq!(saved.user_id.as_deref(), Some(format!("user-{i}").as_str()));
            }
        }
        assert_eq!(service.store().get_all(100).len(), 5);
    }
}
