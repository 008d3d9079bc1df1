//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::mode::ProcessingMode;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Audio codec used for WebM containers
pub const WEBM_AUDIO_CODEC: &str = "libopus";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Default audio bitrate in bits per second (used for target-size budgeting)
pub const DEFAULT_AUDIO_BITRATE_BPS: u64 = 128_000;

/// Encoder preset for preview runs
pub const PREVIEW_PRESET: &str = "veryfast";
/// Encoder preset for final runs
pub const FINAL_PRESET: &str = "medium";

/// CRF for re-encoding steps that do not specify a quality (crop, watermark, convert)
pub const DEFAULT_CRF: u8 = 23;
/// CRF for the same steps in preview mode
pub const PREVIEW_CRF: u8 = 28;

/// Quality relaxation applied to compress steps in preview mode
pub const PREVIEW_CRF_OFFSET: u8 = 5;
/// Upper bound for relaxed preview CRF
pub const PREVIEW_CRF_CAP: u8 = 30;

/// Preview output bounding box
pub const PREVIEW_MAX_WIDTH: u32 = 1280;
pub const PREVIEW_MAX_HEIGHT: u32 = 720;

/// Frame size assumed when the source cannot be probed
pub const FALLBACK_WIDTH: u32 = 1920;
pub const FALLBACK_HEIGHT: u32 = 1080;

/// Largest accepted crop target dimension
pub const MAX_DIMENSION: u32 = 8192;

/// Box blur radius used to obscure watermark regions
pub const WATERMARK_BLUR_RADIUS: u32 = 10;

/// Compression quality requested by a compress step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionQuality {
    /// Base CRF for this quality (lower is better quality and a larger file).
    pub fn base_crf(self) -> u8 {
        match self {
            Self::High => 18,
            Self::Medium => 23,
            Self::Low => 28,
        }
    }

    /// CRF for a given mode. Preview relaxes quality by a fixed offset, capped.
    pub fn crf(self, mode: ProcessingMode) -> u8 {
        let base = self.base_crf();
        if mode.is_preview() {
            (base + PREVIEW_CRF_OFFSET).min(PREVIEW_CRF_CAP)
        } else {
            base
        }
    }
}

/// Video codec requested by a convert step.
///
/// Unrecognised names fall back to H.264.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(from = "String", into = "String")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Vp9,
    Av1,
}

impl VideoCodec {
    /// FFmpeg encoder identifier.
    pub fn encoder(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
            Self::Vp9 => "libvpx-vp9",
            Self::Av1 => "libaom-av1",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
        }
    }

    /// Whether the encoder understands x264-style `-preset` names.
    pub fn supports_preset(self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }
}

impl From<String> for VideoCodec {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "h265" | "hevc" | "libx265" => Self::H265,
            "vp9" | "libvpx-vp9" => Self::Vp9,
            "av1" | "libaom-av1" => Self::Av1,
            _ => Self::H264,
        }
    }
}

impl From<VideoCodec> for String {
    fn from(value: VideoCodec) -> Self {
        value.as_str().to_string()
    }
}

/// Output container requested by a convert step.
///
/// Unrecognised names fall back to MP4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(from = "String", into = "String")]
pub enum ContainerFormat {
    #[default]
    Mp4,
    Mov,
    Mkv,
    Webm,
}

impl ContainerFormat {
    /// File extension (without the dot).
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
        }
    }

    /// MIME type used when streaming the artifact back.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Mov => "video/quicktime",
            Self::Mkv => "video/x-matroska",
            Self::Webm => "video/webm",
        }
    }

    /// Audio codec compatible with the container.
    pub fn audio_codec(self) -> &'static str {
        match self {
            Self::Webm => WEBM_AUDIO_CODEC,
            _ => DEFAULT_AUDIO_CODEC,
        }
    }

    /// Whether the muxer can hold video encoded with `codec`.
    pub fn accepts(self, codec: VideoCodec) -> bool {
        match self {
            Self::Mp4 | Self::Mkv => true,
            Self::Mov => matches!(codec, VideoCodec::H264 | VideoCodec::H265),
            Self::Webm => matches!(codec, VideoCodec::Vp9 | VideoCodec::Av1),
        }
    }

    /// Video codec used when re-encoding into this container.
    pub fn default_video_codec(self) -> VideoCodec {
        match self {
            Self::Webm => VideoCodec::Vp9,
            _ => VideoCodec::H264,
        }
    }

    /// `codec` if the container can hold it, otherwise the container default.
    pub fn compatible_codec(self, codec: VideoCodec) -> VideoCodec {
        if self.accepts(codec) {
            codec
        } else {
            self.default_video_codec()
        }
    }

    /// Guess the container from a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "mp4" | "m4v" => Some(Self::Mp4),
            "mov" => Some(Self::Mov),
            "mkv" => Some(Self::Mkv),
            "webm" => Some(Self::Webm),
            _ => None,
        }
    }
}

impl From<String> for ContainerFormat {
    fn from(value: String) -> Self {
        match value.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mov" | "quicktime" => Self::Mov,
            "mkv" | "matroska" => Self::Mkv,
            "webm" => Self::Webm,
            _ => Self::Mp4,
        }
    }
}

impl From<ContainerFormat> for String {
    fn from(value: ContainerFormat) -> Self {
        value.extension().to_string()
    }
}

/// Video encoding configuration for a single re-encoding invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264", "libvpx-vp9")
    pub codec: String,

    /// Encoding preset (only emitted for x264/x265)
    pub preset: Option<String>,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    pub crf: u8,

    /// Audio codec
    pub audio_codec: String,

    /// Audio bitrate
    pub audio_bitrate: String,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: Some(FINAL_PRESET.to_string()),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// Settings for steps that re-encode as a side effect (crop, watermark),
    /// using the container's default video codec.
    pub fn for_mode(container: ContainerFormat, mode: ProcessingMode) -> Self {
        Self::encode(container.default_video_codec(), container, default_crf(mode), mode)
    }

    /// Settings for a compress step.
    pub fn for_compress(
        quality: CompressionQuality,
        container: ContainerFormat,
        mode: ProcessingMode,
    ) -> Self {
        Self::encode(container.default_video_codec(), container, quality.crf(mode), mode)
    }

    /// Settings for a convert step. A codec the container cannot hold is
    /// replaced by the container default.
    pub fn for_convert(codec: VideoCodec, container: ContainerFormat, mode: ProcessingMode) -> Self {
        Self::encode(container.compatible_codec(codec), container, default_crf(mode), mode)
    }

    fn encode(codec: VideoCodec, container: ContainerFormat, crf: u8, mode: ProcessingMode) -> Self {
        let mut config = Self {
            codec: codec.encoder().to_string(),
            preset: codec.supports_preset().then(|| preset_for(mode).to_string()),
            crf,
            audio_codec: container.audio_codec().to_string(),
            ..Default::default()
        };

        // libvpx/libaom need an explicit zero bitrate for pure CRF mode
        if matches!(codec, VideoCodec::Vp9 | VideoCodec::Av1) {
            config.extra_args.extend(["-b:v".to_string(), "0".to_string()]);
            if mode.is_preview() {
                config.extra_args.extend(["-cpu-used".to_string(), "8".to_string()]);
            }
        }

        config
    }

    /// Video encoder arguments only (`-c:v`, `-preset`, `-crf`, extras).
    pub fn video_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.clone()];

        if let Some(preset) = &self.preset {
            args.extend_from_slice(&["-preset".to_string(), preset.clone()]);
        }

        args.extend_from_slice(&["-crf".to_string(), self.crf.to_string()]);
        args.extend(self.extra_args.clone());

        args
    }

    /// Audio encoder arguments.
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }

    /// Convert to FFmpeg command arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = self.video_args();
        args.extend(self.audio_args());
        args
    }
}

fn default_crf(mode: ProcessingMode) -> u8 {
    if mode.is_preview() {
        PREVIEW_CRF
    } else {
        DEFAULT_CRF
    }
}

fn preset_for(mode: ProcessingMode) -> &'static str {
    if mode.is_preview() {
        PREVIEW_PRESET
    } else {
        FINAL_PRESET
    }
}
