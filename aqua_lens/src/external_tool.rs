//! Optional external analysis program.
//!
//! The tool is invoked as `<program> <args...> <image path> <water source>` and
//! must print one JSON object with the six parameters (plus optional
//! `confidence` and `colorChannels`) on stdout and exit with status 0.

use crate::core_modules::raster::{FeatureError, ImageSource};
use crate::model::Measurement;
use crate::remote::{WireChannels, WireParameters, confidence_from};
use crate::service::AnalysisRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tool exited with {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("tool output is not valid JSON: {0}")]
    Output(#[from] serde_json::Error),

    #[error("tool timed out after {0} s")]
    Timeout(u64),

    #[error("image could not be read: {0}")]
    Image(#[from] FeatureError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalToolConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ExternalToolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "python".to_string(),
            args: vec!["python/water_analysis.py".to_string()],
            timeout_secs: 60,
        }
    }
}

#[async_trait]
pub trait ExternalTool: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, request: &AnalysisRequest) -> Result<Measurement, ToolError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolOutput {
    #[serde(flatten)]
    parameters: WireParameters,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    color_channels: Option<WireChannels>,
}

/// Runs the configured program as a child process.
pub struct ProcessTool {
    config: ExternalToolConfig,
}

impl ProcessTool {
    pub fn new(config: ExternalToolConfig) -> Self {
        Self { config }
    }

    // Sources that are not files are written to a temporary file for the tool.
    fn materialize(image: &ImageSource) -> Result<(PathBuf, Option<tempfile::NamedTempFile>), ToolError> {
        if let ImageSource::Path(path) = image {
            return Ok((path.clone(), None));
        }
        let mut file = tempfile::Builder::new().prefix("aqua-sample-").tempfile()?;
        file.write_all(&image.read_bytes()?)?;
        file.flush()?;
        Ok((file.path().to_path_buf(), Some(file)))
    }
}

#[async_trait]
impl ExternalTool for ProcessTool {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<Measurement, ToolError> {
        // The temp file must outlive the child process.
        let image = request.image.clone();
        let (image_path, _guard) = tokio::task::spawn_blocking(move || Self::materialize(&image))
            .await
            .map_err(|e| ToolError::Io(std::io::Error::other(e)))??;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg(&image_path)
            .arg(request.water_source.as_str())
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), command.output())
            .await
            .map_err(|_| ToolError::Timeout(self.config.timeout_secs))?
            .map_err(|source| ToolError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let parsed: ToolOutput = serde_json::from_slice(&output.stdout)?;
        tracing::debug!(program = %self.config.program, "external tool analysis received");
        Ok(Measurement {
            parameters: parsed.parameters.into_parameters(),
            confidence: confidence_from(parsed.confidence),
            color_channels: parsed.color_channels.map(WireChannels::into_channels).unwrap_or_default(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::WaterSource;

    fn shell_tool(script: &str) -> ProcessTool {
        ProcessTool::new(ExternalToolConfig {
            enabled: true,
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "tool".to_string()],
            timeout_secs: 10,
        })
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(ImageSource::Bytes(vec![0x89, b'P', b'N', b'G']), WaterSource::LakePond)
    }

    #[tokio::test]
    async fn reads_parameters_from_stdout() {
        let tool = shell_tool(
            r#"test -f "$1" && test "$2" = "Lake/Pond" && printf '%s' '{"ph": 6.9, "chlorine": 0.3, "nitrates": 12, "hardness": 210, "alkalinity": 95, "bacteria": 2, "confidence": 70}'"#,
        );
        let measurement = tool.analyze(&request()).await.unwrap();
        assert_eq!(measurement.parameters.ph, 6.9);
        assert_eq!(measurement.parameters.nitrates, 12.0);
        assert_eq!(measurement.parameters.bacteria, 2);
        assert_eq!(measurement.confidence, 70);
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let tool = shell_tool("echo boom >&2; exit 3");
        match tool.analyze(&request()).await {
            Err(ToolError::Exit { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_output_is_an_error() {
        let tool = shell_tool("echo not-json");
        assert!(matches!(tool.analyze(&request()).await, Err(ToolError::Output(_))));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let mut tool = shell_tool("sleep 5");
        tool.config.timeout_secs = 1;
        let started = std::time::Instant::now();
        assert!(matches!(tool.analyze(&request()).await, Err(ToolError::Timeout(1))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn path_sources_are_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();
        let tool = shell_tool(&format!(
            r#"test "$1" = "{}" && printf '%s' '{{"ph": 7, "chlorine": 1, "nitrates": 2, "hardness": 100, "alkalinity": 90}}'"#,
            path.display()
        ));
        let request = AnalysisRequest::new(ImageSource::Path(path), WaterSource::TapWater);
        let measurement = tool.analyze(&request).await.unwrap();
        assert_eq!(measurement.confidence, crate::remote::DEFAULT_EXTERNAL_CONFIDENCE);
        assert_eq!(measurement.parameters.bacteria, 0);
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let tool = ProcessTool::new(ExternalToolConfig {
            enabled: true,
            program: "aqua-lens-no-such-program".to_string(),
            args: vec![],
            timeout_secs: 10,
        });
        assert!(matches!(tool.analyze(&request()).await, Err(ToolError::Spawn { .. })));
    }
}
