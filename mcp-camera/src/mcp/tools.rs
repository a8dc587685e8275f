//! Camera tools exposed over MCP.
//!
//! Each tool turns its arguments into a lifecycle call and reports the outcome
//! as a JSON payload inside a text content item. Operation failures are tool
//! results with `isError` set, never protocol errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::types::{CallToolResult, JsonRpcError, ToolDefinition};
use crate::camera::{CameraInfo, CameraManager, RecordingStarted};
use crate::config::ArtifactConfig;
use crate::error::{Error, ErrorKind};
use crate::utils::{filename, fs};

pub const LIST_CAMERAS: &str = "listCameras";
pub const TAKE_PHOTO: &str = "takePhoto";
pub const START_VIDEO: &str = "startVideo";
pub const STOP_VIDEO: &str = "stopVideo";

#[derive(Debug, Deserialize)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
struct TakePhotoArgs {
    #[serde(rename = "cameraID")]
    camera_id: f64,
    filepath: String,
}

#[derive(Debug, Deserialize)]
struct StartVideoArgs {
    #[serde(rename = "cameraID")]
    camera_id: f64,
    #[serde(default)]
    filepath: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StopVideoArgs {
    #[serde(rename = "videoID")]
    video_id: String,
}

#[derive(Debug, Serialize)]
struct CameraList {
    cameras: Vec<CameraInfo>,
}

/// JSON payload reported by the operation tools.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct OperationReport {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_path: Option<PathBuf>,
    #[serde(rename = "videoID", skip_serializing_if = "Option::is_none")]
    video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

impl OperationReport {
    fn failed(message: &str, err: &Error) -> Self {
        Self {
            success: false,
            message: Some(message.to_string()),
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            ..Self::default()
        }
    }

    fn into_result(self) -> CallToolResult {
        let is_error = !self.success;
        let text = serde_json::to_string(&self)
            .unwrap_or_else(|e| json!({"success": false, "error": e.to_string()}).to_string());
        CallToolResult::text(text, is_error)
    }
}

/// Camera handles arrive as JSON numbers; only integral values name a camera.
fn camera_handle(raw: f64) -> crate::Result<i64> {
    if raw.is_finite() && raw.fract() == 0.0 && raw.abs() < i64::MAX as f64 {
        Ok(raw as i64)
    } else {
        Err(Error::invalid_handle_value(raw))
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Option<Value>) -> Result<T, JsonRpcError> {
    let arguments = match arguments {
        None | Some(Value::Null) => json!({}),
        Some(value) => value,
    };
    serde_json::from_value(arguments)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid arguments for {tool}: {e}")))
}

/// Tool registry and dispatcher bound to one camera manager.
#[derive(Clone)]
pub struct CameraTools {
    manager: Arc<CameraManager>,
    artifacts: ArtifactConfig,
}

impl CameraTools {
    pub fn new(manager: Arc<CameraManager>, artifacts: ArtifactConfig) -> Self {
        Self { manager, artifacts }
    }

    pub fn manager(&self) -> &Arc<CameraManager> {
        &self.manager
    }

    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: LIST_CAMERAS,
                description: "List all cameras on the system.",
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDefinition {
                name: TAKE_PHOTO,
                description: "Take a photo from a camera and save it in the given directory.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "cameraID": {"type": "number"},
                        "filepath": {"type": "string"}
                    },
                    "required": ["cameraID", "filepath"]
                }),
            },
            ToolDefinition {
                name: START_VIDEO,
                description: "Start a video from a camera. Saved in the given directory, or \
                              served later as a stream when no directory is given.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "cameraID": {"type": "number"},
                        "filepath": {"type": "string"},
                        "duration": {"type": "number"}
                    },
                    "required": ["cameraID"]
                }),
            },
            ToolDefinition {
                name: STOP_VIDEO,
                description: "Stop a video recording or stream.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "videoID": {"type": "string"}
                    },
                    "required": ["videoID"]
                }),
            },
        ]
    }

    /// Run a tool by name.
    ///
    /// Unknown tools and malformed arguments are protocol errors; everything
    /// else is reported inside the tool result.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<CallToolResult, JsonRpcError> {
        debug!(tool = name, "Tool call");
        match name {
            LIST_CAMERAS => {
                parse_args::<NoArgs>(name, arguments)?;
                Ok(self.list_cameras())
            }
            TAKE_PHOTO => Ok(self.take_photo(parse_args(name, arguments)?).await),
            START_VIDEO => Ok(self.start_video(parse_args(name, arguments)?).await),
            STOP_VIDEO => Ok(self.stop_video(parse_args(name, arguments)?).await),
            other => Err(JsonRpcError::invalid_params(format!("Unknown tool: {other}"))),
        }
    }

    fn list_cameras(&self) -> CallToolResult {
        let payload = CameraList {
            cameras: self.manager.list_cameras(),
        };
        match serde_json::to_string(&payload) {
            Ok(text) => CallToolResult::text(text, false),
            Err(e) => {
                OperationReport::failed("Failed to list cameras", &Error::from(e)).into_result()
            }
        }
    }

    async fn artifact_path(&self, dir: &str, file_name: String) -> crate::Result<PathBuf> {
        let dir = fs::resolve_output_dir(Path::new(dir)).await?;
        Ok(dir.join(file_name))
    }

    async fn take_photo(&self, args: TakePhotoArgs) -> CallToolResult {
        let outcome = match camera_handle(args.camera_id) {
            Ok(handle) => {
                let file_name = filename::photo_filename(
                    &self.artifacts.photo_prefix,
                    &handle.to_string(),
                    &filename::artifact_timestamp(),
                );
                match self.artifact_path(&args.filepath, file_name).await {
                    Ok(dest) => self.manager.take_photo(handle, &dest).await,
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        let report = match outcome {
            Ok(photo) => OperationReport {
                success: true,
                image_path: Some(photo.image_path),
                ..OperationReport::default()
            },
            Err(e) => OperationReport::failed("Failed to take photo", &e),
        };
        report.into_result()
    }

    async fn start_video(&self, args: StartVideoArgs) -> CallToolResult {
        const START_FAILED: &str = "Failed to start video recording";

        let handle = match camera_handle(args.camera_id) {
            Ok(handle) => handle,
            Err(e) => return OperationReport::failed(START_FAILED, &e).into_result(),
        };
        let dest = match args.filepath.as_deref().filter(|p| !p.is_empty()) {
            Some(dir) => {
                let file_name = filename::video_filename(
                    &self.artifacts.video_prefix,
                    &handle.to_string(),
                    &filename::artifact_timestamp(),
                );
                match self.artifact_path(dir, file_name).await {
                    Ok(dest) => Some(dest),
                    Err(e) => return OperationReport::failed(START_FAILED, &e).into_result(),
                }
            }
            None => None,
        };

        let started = match self
            .manager
            .start_recording(handle, dest, args.duration)
            .await
        {
            Ok(started) => started,
            Err(e) => return OperationReport::failed(START_FAILED, &e).into_result(),
        };

        let message = Some(started.message().to_string());
        let report = match started {
            RecordingStarted::ToFile {
                video_id,
                video_path,
            } => OperationReport {
                success: true,
                message,
                video_id: Some(video_id),
                video_path: Some(video_path),
                ..OperationReport::default()
            },
            RecordingStarted::Reserved {
                video_id,
                stream_url,
            } => OperationReport {
                success: true,
                message,
                video_id: Some(video_id),
                stream_url: Some(stream_url),
                ..OperationReport::default()
            },
        };
        report.into_result()
    }

    async fn stop_video(&self, args: StopVideoArgs) -> CallToolResult {
        let report = match self.manager.stop_recording(&args.video_id).await {
            Ok(stopped) => OperationReport {
                success: true,
                message: Some(stopped.message().to_string()),
                video_path: stopped.video_path().cloned(),
                ..OperationReport::default()
            },
            Err(e) if e.is_not_found() => {
                OperationReport::failed("Video recording not found", &e)
            }
            Err(e) => OperationReport::failed("Failed to stop video recording", &e),
        };
        report.into_result()
    }
}
