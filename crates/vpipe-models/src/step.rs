//! Processing step definitions.
//!
//! A [`ProcessingStep`] is the wire/workspace representation: a type tag plus a
//! loosely-typed parameter object that the client can merge updates into.
//! Before execution it is resolved into a closed [`StepOperation`] with typed,
//! validated parameters.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::encoding::{CompressionQuality, ContainerFormat, VideoCodec, MAX_DIMENSION};
use crate::rect::{FrameMapping, PixelRect};

/// Step type tag as sent by clients.
///
/// Unknown tags are preserved so they can be reported by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    Crop,
    Trim,
    Watermark,
    Subtitle,
    Compress,
    Convert,
    Unknown(String),
}

impl StepType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Crop => "crop",
            Self::Trim => "trim",
            Self::Watermark => "watermark",
            Self::Subtitle => "subtitle",
            Self::Compress => "compress",
            Self::Convert => "convert",
            Self::Unknown(name) => name,
        }
    }
}

impl From<String> for StepType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "crop" => Self::Crop,
            "trim" => Self::Trim,
            "watermark" => Self::Watermark,
            "subtitle" => Self::Subtitle,
            "compress" => Self::Compress,
            "convert" => Self::Convert,
            _ => Self::Unknown(value),
        }
    }
}

impl From<StepType> for String {
    fn from(value: StepType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declarative transformation in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStep {
    /// Unique step ID
    #[serde(default = "new_step_id")]
    pub id: String,

    /// Step type tag
    #[serde(rename = "type")]
    #[schemars(with = "String")]
    pub step_type: StepType,

    /// Human label (display only)
    #[serde(default)]
    pub name: String,

    /// Type-specific parameters
    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,

    /// Only applied steps execute. Submitted steps without the flag count as applied.
    #[serde(default = "default_applied")]
    pub applied: bool,

    /// Creation time (Unix milliseconds); not used for ordering
    #[serde(default)]
    pub timestamp: i64,
}

fn new_step_id() -> String {
    Uuid::new_v4().to_string()
}

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_applied() -> bool {
    true
}

impl ProcessingStep {
    /// Create a new applied step with a fresh ID and the current timestamp.
    pub fn new(step_type: StepType, name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            id: new_step_id(),
            step_type,
            name: name.into(),
            parameters,
            applied: true,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Build a step from typed parameters.
    pub fn from_operation(operation: &StepOperation, name: impl Into<String>) -> Self {
        let parameters = match operation {
            StepOperation::Crop(p) => serde_json::to_value(p),
            StepOperation::Trim(p) => serde_json::to_value(p),
            StepOperation::Watermark(p) => serde_json::to_value(p),
            StepOperation::Compress(p) => serde_json::to_value(p),
            StepOperation::Convert(p) => serde_json::to_value(p),
        }
        .unwrap_or_else(|_| empty_parameters());

        Self::new(operation.step_type(), name, parameters)
    }

    /// Resolve into a typed, validated operation.
    pub fn resolve(&self) -> Result<StepOperation, StepResolveError> {
        match &self.step_type {
            StepType::Crop => {
                let params: CropParams = self.parse_parameters()?;
                params.validate().map_err(|r| self.malformed(r))?;
                Ok(StepOperation::Crop(params.normalized()))
            }
            StepType::Trim => {
                let params: TrimParams = self.parse_parameters()?;
                params.validate().map_err(|r| self.malformed(r))?;
                Ok(StepOperation::Trim(params))
            }
            StepType::Watermark => {
                let params: WatermarkParams = self.parse_parameters()?;
                Ok(StepOperation::Watermark(params))
            }
            StepType::Compress => {
                let params: CompressParams = self.parse_parameters()?;
                params.validate().map_err(|r| self.malformed(r))?;
                Ok(StepOperation::Compress(params))
            }
            StepType::Convert => {
                let params: ConvertParams = self.parse_parameters()?;
                Ok(StepOperation::Convert(params))
            }
            StepType::Subtitle => Err(StepResolveError::NotYetSupported(StepType::Subtitle)),
            StepType::Unknown(name) => Err(StepResolveError::Unsupported(name.clone())),
        }
    }

    fn parse_parameters<T: DeserializeOwned>(&self) -> Result<T, StepResolveError> {
        let value = if self.parameters.is_null() {
            empty_parameters()
        } else {
            self.parameters.clone()
        };

        serde_json::from_value(value).map_err(|e| self.malformed(e.to_string()))
    }

    fn malformed(&self, reason: impl Into<String>) -> StepResolveError {
        StepResolveError::Malformed {
            step_type: self.step_type.clone(),
            reason: reason.into(),
        }
    }
}

/// Why a step could not be turned into an executable operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepResolveError {
    /// Type tag nobody recognises. The runner passes the input through.
    #[error("Unsupported step type: {0}")]
    Unsupported(String),

    /// Declared step type without an executor.
    #[error("Step type '{0}' is not yet supported")]
    NotYetSupported(StepType),

    #[error("Malformed {step_type} parameters: {reason}")]
    Malformed { step_type: StepType, reason: String },
}

/// Closed set of executable operations.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOperation {
    Crop(CropParams),
    Trim(TrimParams),
    Watermark(WatermarkParams),
    Compress(CompressParams),
    Convert(ConvertParams),
}

impl StepOperation {
    pub fn step_type(&self) -> StepType {
        match self {
            Self::Crop(_) => StepType::Crop,
            Self::Trim(_) => StepType::Trim,
            Self::Watermark(_) => StepType::Watermark,
            Self::Compress(_) => StepType::Compress,
            Self::Convert(_) => StepType::Convert,
        }
    }

    /// Container of the artifact this operation writes, if it changes it.
    pub fn output_container(&self) -> Option<ContainerFormat> {
        match self {
            Self::Convert(p) => Some(p.output_format),
            _ => None,
        }
    }
}

/// Aspect-ratio crop to a target output size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CropParams {
    /// Target output width
    pub width: u32,
    /// Target output height
    pub height: u32,
    /// Horizontal bias of the crop window (0-100%)
    #[serde(default, alias = "x")]
    pub x_offset_percent: f64,
    /// Vertical bias of the crop window (0-100%)
    #[serde(default, alias = "y")]
    pub y_offset_percent: f64,
}

impl CropParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            x_offset_percent: 0.0,
            y_offset_percent: 0.0,
        }
    }

    pub fn with_offsets(mut self, x_percent: f64, y_percent: f64) -> Self {
        self.x_offset_percent = x_percent;
        self.y_offset_percent = y_percent;
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be positive".to_string());
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(format!("width and height must not exceed {}", MAX_DIMENSION));
        }
        Ok(())
    }

    /// Offsets clamped to 0-100 (non-finite values become 0).
    pub fn normalized(self) -> Self {
        Self {
            x_offset_percent: clamp_percent(self.x_offset_percent),
            y_offset_percent: clamp_percent(self.y_offset_percent),
            ..self
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Stream-copy trim between two timestamps (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrimParams {
    #[serde(default)]
    pub start_time: f64,
    /// Omitted means trim to the end of the input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

impl TrimParams {
    pub fn new(start_time: f64, end_time: Option<f64>) -> Self {
        Self { start_time, end_time }
    }

    fn validate(&self) -> Result<(), String> {
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Err("startTime must be a non-negative number".to_string());
        }
        if let Some(end) = self.end_time {
            if !end.is_finite() || end <= self.start_time {
                return Err("endTime must be greater than startTime".to_string());
            }
        }
        Ok(())
    }

    /// Output duration, if bounded.
    pub fn duration(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Regions to obscure, in source pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct WatermarkParams {
    #[serde(default)]
    pub regions: Vec<PixelRect>,
}

impl WatermarkParams {
    /// Regions moved into the frame described by `mapping`.
    pub fn mapped(&self, mapping: &FrameMapping) -> Self {
        Self {
            regions: self.regions.iter().map(|r| mapping.map_rect(r)).collect(),
        }
    }
}

/// Re-encode at a quality level, optionally bounded by a target size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompressParams {
    #[serde(default)]
    pub quality: CompressionQuality,
    /// Target file size in megabytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_size: Option<f64>,
}

impl CompressParams {
    fn validate(&self) -> Result<(), String> {
        match self.target_size {
            Some(size) if !size.is_finite() || size <= 0.0 => {
                Err("targetSize must be a positive number of megabytes".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Re-encode into another container/codec.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConvertParams {
    #[serde(default)]
    pub output_format: ContainerFormat,
    #[serde(default)]
    pub codec: VideoCodec,
}
