//! Step executors.
//!
//! A [`StepExecutor`] turns one resolved [`StepOperation`] into one output
//! file. The pipeline runner owns artifact naming and cleanup; executors only
//! read `input` and write `output`.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use vpipe_models::encoding::{
    DEFAULT_AUDIO_BITRATE_BPS, PREVIEW_MAX_HEIGHT, PREVIEW_MAX_WIDTH, WATERMARK_BLUR_RADIUS,
};
use vpipe_models::{
    CompressParams, ContainerFormat, ConvertParams, CropParams, CropRect, EncodingConfig,
    ProcessingMode, StepOperation, TrimParams, WatermarkParams,
};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{crop_and_scale, region_blur_graph};
use crate::fs_utils;
use crate::geometry::{even, fit_within, resolve_crop, FrameSize};
use crate::probe::{FfprobeProbe, MediaProbe};

/// Frame change made by a crop step: the source window and the size it was
/// scaled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reframe {
    pub window: CropRect,
    pub output: FrameSize,
}

/// Executes a single resolved step.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Read `input`, apply `operation`, write `output`.
    ///
    /// Returns the frame change when the step cropped, so later steps with
    /// source-space coordinates can be mapped into the new frame.
    async fn execute(
        &self,
        operation: &StepOperation,
        input: &Path,
        output: &Path,
        mode: ProcessingMode,
    ) -> MediaResult<Option<Reframe>>;

    /// Copy `input` to `output` unchanged. Used for steps nothing can execute.
    async fn pass_through(&self, input: &Path, output: &Path) -> MediaResult<()> {
        fs_utils::copy_file(input, output).await
    }
}

/// What an executor will do for a step.
#[derive(Debug, Clone)]
pub enum StepPlan {
    /// Run one FFmpeg invocation.
    Ffmpeg(FfmpegCommand),
    /// Nothing to change; copy the input.
    Copy,
}

/// [`StepExecutor`] that shells out to FFmpeg.
#[derive(Clone)]
pub struct FfmpegStepExecutor {
    runner: FfmpegRunner,
    probe: Arc<dyn MediaProbe>,
}

impl Default for FfmpegStepExecutor {
    fn default() -> Self {
        Self::new(FfmpegRunner::new())
    }
}

impl FfmpegStepExecutor {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self {
            runner,
            probe: Arc::new(FfprobeProbe),
        }
    }

    /// Replace the probe used for frame size and duration lookups.
    pub fn with_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Decide how `operation` will be carried out without running anything.
    pub async fn plan(
        &self,
        operation: &StepOperation,
        input: &Path,
        output: &Path,
        mode: ProcessingMode,
    ) -> MediaResult<StepPlan> {
        let plan = match operation {
            StepOperation::Crop(params) => {
                plan_crop(&self.crop_reframe(params, input, mode).await, input, output, mode)
            }
            StepOperation::Trim(params) => plan_trim(params, input, output),
            StepOperation::Watermark(params) => self.plan_watermark(params, input, output, mode).await,
            StepOperation::Compress(params) => self.plan_compress(params, input, output, mode).await,
            StepOperation::Convert(params) => plan_convert(params, input, output, mode),
        };
        Ok(plan)
    }

    /// Crop window in the probed input frame and the size it is scaled to.
    pub async fn crop_reframe(&self, params: &CropParams, input: &Path, mode: ProcessingMode) -> Reframe {
        let frame = self.probe.frame_size_or_default(input).await;
        let window = resolve_crop(
            params.width,
            params.height,
            frame,
            params.x_offset_percent,
            params.y_offset_percent,
        );

        let (out_w, out_h) = if mode.is_preview() {
            fit_within(params.width, params.height, PREVIEW_MAX_WIDTH, PREVIEW_MAX_HEIGHT)
        } else {
            (even(params.width), even(params.height))
        };

        debug!(
            source = ?frame,
            crop = ?window,
            out_width = out_w,
            out_height = out_h,
            "Resolved crop window"
        );

        Reframe {
            window,
            output: FrameSize::new(out_w, out_h),
        }
    }

    async fn plan_watermark(
        &self,
        params: &WatermarkParams,
        input: &Path,
        output: &Path,
        mode: ProcessingMode,
    ) -> StepPlan {
        if params.regions.is_empty() {
            return StepPlan::Copy;
        }

        let frame = self.probe.frame_size_or_default(input).await;
        let regions: Vec<_> = params
            .regions
            .iter()
            .filter_map(|r| r.clamp_to_frame(frame.width, frame.height))
            .collect();

        let Some((graph, label)) = region_blur_graph(&regions, WATERMARK_BLUR_RADIUS) else {
            debug!("No watermark region intersects the frame");
            return StepPlan::Copy;
        };

        let cmd = FfmpegCommand::new(input, output)
            .filter_complex(graph)
            .map(format!("[{}]", label))
            .map("0:a?")
            .output_args(EncodingConfig::for_mode(output_container(output), mode).video_args())
            .audio_codec("copy");

        StepPlan::Ffmpeg(with_container_flags(cmd, output))
    }

    async fn plan_compress(
        &self,
        params: &CompressParams,
        input: &Path,
        output: &Path,
        mode: ProcessingMode,
    ) -> StepPlan {
        let mut cmd = FfmpegCommand::new(input, output)
            .output_args(
                EncodingConfig::for_compress(params.quality, output_container(output), mode)
                    .to_ffmpeg_args(),
            );

        if let Some(target_mb) = params.target_size {
            match self.probe.duration(input).await {
                Some(duration) => {
                    if let Some(kbps) = target_video_kbps(target_mb, duration) {
                        cmd = cmd.output_args([
                            "-maxrate".to_string(),
                            format!("{}k", kbps),
                            "-bufsize".to_string(),
                            format!("{}k", kbps * 2),
                        ]);
                    } else {
                        debug!(target_mb, duration, "Target size too small for audio budget, ignoring");
                    }
                }
                None => debug!(target_mb, "Unknown duration, ignoring target size"),
            }
        }

        StepPlan::Ffmpeg(with_container_flags(cmd, output))
    }
}

fn plan_crop(reframe: &Reframe, input: &Path, output: &Path, mode: ProcessingMode) -> StepPlan {
    let cmd = FfmpegCommand::new(input, output)
        .video_filter(crop_and_scale(
            &reframe.window,
            reframe.output.width,
            reframe.output.height,
        ))
        .output_args(EncodingConfig::for_mode(output_container(output), mode).video_args())
        .audio_codec("copy");

    StepPlan::Ffmpeg(with_container_flags(cmd, output))
}

fn plan_trim(params: &TrimParams, input: &Path, output: &Path) -> StepPlan {
    let mut cmd = FfmpegCommand::new(input, output);
    if params.start_time > 0.0 {
        cmd = cmd.seek(params.start_time);
    }
    if let Some(duration) = params.duration() {
        cmd = cmd.duration(duration);
    }

    StepPlan::Ffmpeg(
        cmd.stream_copy()
            .output_arg("-avoid_negative_ts")
            .output_arg("make_zero"),
    )
}

fn plan_convert(params: &ConvertParams, input: &Path, output: &Path, mode: ProcessingMode) -> StepPlan {
    if !params.output_format.accepts(params.codec) {
        warn!(
            codec = params.codec.as_str(),
            container = params.output_format.extension(),
            "Codec not supported by container, using container default"
        );
    }
    let cmd = FfmpegCommand::new(input, output).output_args(
        EncodingConfig::for_convert(params.codec, params.output_format, mode).to_ffmpeg_args(),
    );
    StepPlan::Ffmpeg(with_container_flags(cmd, output))
}

/// Video bitrate (kbit/s) that lands a file of `target_mb` megabytes over
/// `duration` seconds, after reserving the audio bitrate.
fn target_video_kbps(target_mb: f64, duration: f64) -> Option<u64> {
    if duration <= 0.0 || target_mb <= 0.0 {
        return None;
    }
    let total_bps = target_mb * 8.0 * 1024.0 * 1024.0 / duration;
    let video_bps = total_bps - DEFAULT_AUDIO_BITRATE_BPS as f64;
    (video_bps >= 1000.0).then(|| (video_bps / 1000.0) as u64)
}

/// Container implied by an output path. Artifacts always carry a known extension.
fn output_container(output: &Path) -> ContainerFormat {
    output
        .to_str()
        .and_then(ContainerFormat::from_file_name)
        .unwrap_or_default()
}

fn with_container_flags(cmd: FfmpegCommand, output: &Path) -> FfmpegCommand {
    let container = output
        .to_str()
        .and_then(ContainerFormat::from_file_name);
    match container {
        Some(ContainerFormat::Mp4 | ContainerFormat::Mov) => cmd.faststart(),
        _ => cmd,
    }
}

#[async_trait]
impl StepExecutor for FfmpegStepExecutor {
    async fn execute(
        &self,
        operation: &StepOperation,
        input: &Path,
        output: &Path,
        mode: ProcessingMode,
    ) -> MediaResult<Option<Reframe>> {
        if !fs_utils::is_non_empty_file(input).await {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }

        let step = operation.step_type().to_string();
        let started = Instant::now();

        let (plan, reframe) = match operation {
            StepOperation::Crop(params) => {
                let reframe = self.crop_reframe(params, input, mode).await;
                (plan_crop(&reframe, input, output, mode), Some(reframe))
            }
            _ => (self.plan(operation, input, output, mode).await?, None),
        };

        match plan {
            StepPlan::Copy => fs_utils::copy_file(input, output).await?,
            StepPlan::Ffmpeg(cmd) => {
                let label = step.clone();
                self.runner
                    .run_with_progress(&cmd, move |p| {
                        debug!(
                            step = %label,
                            out_time_secs = p.out_time_secs(),
                            speed = p.speed,
                            "FFmpeg progress"
                        );
                    })
                    .await?;
            }
        }

        if !fs_utils::is_non_empty_file(output).await {
            return Err(MediaError::ffmpeg_failed("FFmpeg produced no output", None, None));
        }

        info!(
            step = %step,
            mode = %mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Step executed"
        );
        Ok(reframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::VideoInfo;
    use std::path::PathBuf;
    use vpipe_models::{CompressionQuality, PixelRect, VideoCodec};

    struct FixedProbe {
        width: u32,
        height: u32,
        duration: f64,
    }

    #[async_trait]
    impl MediaProbe for FixedProbe {
        async fn probe(&self, _path: &Path) -> MediaResult<VideoInfo> {
            Ok(VideoInfo {
                duration: self.duration,
                width: self.width,
                height: self.height,
                fps: 30.0,
                codec: "h264".to_string(),
                size: 0,
                has_audio: true,
            })
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl MediaProbe for FailingProbe {
        async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
            Err(MediaError::FileNotFound(path.to_path_buf()))
        }
    }

    fn executor(width: u32, height: u32, duration: f64) -> FfmpegStepExecutor {
        FfmpegStepExecutor::default().with_probe(Arc::new(FixedProbe { width, height, duration }))
    }

    async fn args_for(exec: &FfmpegStepExecutor, op: StepOperation, mode: ProcessingMode) -> Vec<String> {
        let input = PathBuf::from("/work/in.mp4");
        let output = PathBuf::from("/work/out.mp4");
        match exec.plan(&op, &input, &output, mode).await.unwrap() {
            StepPlan::Ffmpeg(cmd) => cmd.build_args(),
            StepPlan::Copy => panic!("expected an FFmpeg plan"),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    #[tokio::test]
    async fn test_crop_final_plan() {
        let exec = executor(1920, 1080, 10.0);
        let args = args_for(&exec, StepOperation::Crop(CropParams::new(1080, 1920)), ProcessingMode::Final).await;

        assert_eq!(
            value_after(&args, "-vf"),
            "crop=608:1080:656:0,scale=1080:1920,setsar=1"
        );
        assert_eq!(value_after(&args, "-preset"), "medium");
        assert_eq!(value_after(&args, "-crf"), "23");
        assert_eq!(value_after(&args, "-c:a"), "copy");
    }

    #[tokio::test]
    async fn test_crop_preview_is_downscaled() {
        let exec = executor(1920, 1080, 10.0);
        let args = args_for(&exec, StepOperation::Crop(CropParams::new(1080, 1920)), ProcessingMode::Preview).await;

        assert_eq!(
            value_after(&args, "-vf"),
            "crop=608:1080:656:0,scale=404:720,setsar=1"
        );
        assert_eq!(value_after(&args, "-preset"), "veryfast");
        assert_eq!(value_after(&args, "-crf"), "28");
    }

    #[tokio::test]
    async fn test_crop_uses_fallback_size_when_probe_fails() {
        let exec = FfmpegStepExecutor::default().with_probe(Arc::new(FailingProbe));
        let args = args_for(&exec, StepOperation::Crop(CropParams::new(1080, 1920)), ProcessingMode::Final).await;
        assert!(value_after(&args, "-vf").starts_with("crop=608:1080:656:0"));
    }

    #[tokio::test]
    async fn test_trim_is_stream_copy() {
        let exec = executor(1920, 1080, 60.0);
        let args = args_for(&exec, StepOperation::Trim(TrimParams::new(5.0, Some(15.0))), ProcessingMode::Preview).await;

        assert_eq!(value_after(&args, "-ss"), "5.000");
        assert_eq!(value_after(&args, "-t"), "10.000");
        assert_eq!(value_after(&args, "-c"), "copy");
        assert!(!args.contains(&"-crf".to_string()));
    }

    #[tokio::test]
    async fn test_trim_from_start_to_end() {
        let exec = executor(1920, 1080, 60.0);
        let args = args_for(&exec, StepOperation::Trim(TrimParams::new(0.0, None)), ProcessingMode::Final).await;
        assert!(!args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-t".to_string()));
    }

    #[tokio::test]
    async fn test_watermark_plan() {
        let exec = executor(1920, 1080, 10.0);
        let op = StepOperation::Watermark(WatermarkParams {
            regions: vec![PixelRect::new(1800.0, 1000.0, 400.0, 400.0)],
        });
        let args = args_for(&exec, op, ProcessingMode::Final).await;

        assert!(value_after(&args, "-filter_complex").contains("crop=120:80:1800:1000"));
        assert_eq!(value_after(&args, "-map"), "[v0]");
        assert!(args.contains(&"0:a?".to_string()));
    }

    #[tokio::test]
    async fn test_watermark_without_regions_copies() {
        let exec = executor(1920, 1080, 10.0);
        let op = StepOperation::Watermark(WatermarkParams {
            regions: vec![PixelRect::new(5000.0, 5000.0, 10.0, 10.0)],
        });
        let plan = exec
            .plan(&op, Path::new("in.mp4"), Path::new("out.mp4"), ProcessingMode::Final)
            .await
            .unwrap();
        assert!(matches!(plan, StepPlan::Copy));

        let empty = StepOperation::Watermark(WatermarkParams::default());
        let plan = exec
            .plan(&empty, Path::new("in.mp4"), Path::new("out.mp4"), ProcessingMode::Final)
            .await
            .unwrap();
        assert!(matches!(plan, StepPlan::Copy));
    }

    #[tokio::test]
    async fn test_compress_quality_and_target_size() {
        let exec = executor(1920, 1080, 80.0);
        let op = StepOperation::Compress(CompressParams {
            quality: CompressionQuality::High,
            target_size: Some(10.0),
        });

        let final_args = args_for(&exec, op.clone(), ProcessingMode::Final).await;
        assert_eq!(value_after(&final_args, "-crf"), "18");
        // 10 MiB over 80s is 1048576 bps, minus 128k audio.
        assert_eq!(value_after(&final_args, "-maxrate"), "920k");
        assert_eq!(value_after(&final_args, "-bufsize"), "1840k");

        let preview_args = args_for(&exec, op, ProcessingMode::Preview).await;
        assert_eq!(value_after(&preview_args, "-crf"), "23");
    }

    #[tokio::test]
    async fn test_compress_low_preview_is_capped() {
        let exec = executor(1920, 1080, 10.0);
        let op = StepOperation::Compress(CompressParams {
            quality: CompressionQuality::Low,
            target_size: None,
        });
        let args = args_for(&exec, op, ProcessingMode::Preview).await;
        assert_eq!(value_after(&args, "-crf"), "30");
        assert!(!args.contains(&"-maxrate".to_string()));
    }

    #[tokio::test]
    async fn test_convert_to_webm() {
        let exec = executor(1920, 1080, 10.0);
        let op = StepOperation::Convert(ConvertParams {
            output_format: ContainerFormat::Webm,
            codec: VideoCodec::Vp9,
        });
        let input = PathBuf::from("in.mp4");
        let output = PathBuf::from("out.webm");
        let StepPlan::Ffmpeg(cmd) = exec.plan(&op, &input, &output, ProcessingMode::Final).await.unwrap() else {
            panic!("expected an FFmpeg plan");
        };
        let args = cmd.build_args();

        assert_eq!(value_after(&args, "-c:v"), "libvpx-vp9");
        assert_eq!(value_after(&args, "-c:a"), "libopus");
        assert!(!args.contains(&"-movflags".to_string()));
        assert_eq!(args.last().unwrap(), "out.webm");
    }

    async fn args_to(exec: &FfmpegStepExecutor, op: StepOperation, input: &str, output: &str) -> Vec<String> {
        match exec
            .plan(&op, Path::new(input), Path::new(output), ProcessingMode::Final)
            .await
            .unwrap()
        {
            StepPlan::Ffmpeg(cmd) => cmd.build_args(),
            StepPlan::Copy => panic!("expected an FFmpeg plan"),
        }
    }

    #[tokio::test]
    async fn test_webm_source_keeps_webm_encoders() {
        let exec = executor(1920, 1080, 10.0);

        let crop = args_to(&exec, StepOperation::Crop(CropParams::new(1080, 1920)), "in.webm", "step0.webm").await;
        assert_eq!(value_after(&crop, "-c:v"), "libvpx-vp9");
        assert_eq!(value_after(&crop, "-c:a"), "copy");
        assert!(!crop.contains(&"-preset".to_string()));

        let compress = StepOperation::Compress(CompressParams {
            quality: CompressionQuality::Medium,
            target_size: None,
        });
        let compress = args_to(&exec, compress, "step0.webm", "step1.webm").await;
        assert_eq!(value_after(&compress, "-c:v"), "libvpx-vp9");
        assert_eq!(value_after(&compress, "-c:a"), "libopus");
        assert!(!compress.contains(&"libx264".to_string()));
        assert!(!compress.contains(&"aac".to_string()));
    }

    #[tokio::test]
    async fn test_convert_to_webm_with_default_codec() {
        let exec = executor(1920, 1080, 10.0);
        let convert = StepOperation::Convert(ConvertParams {
            output_format: ContainerFormat::Webm,
            codec: VideoCodec::H264,
        });
        let args = args_to(&exec, convert, "in.mp4", "step0.webm").await;
        assert_eq!(value_after(&args, "-c:v"), "libvpx-vp9");
        assert_eq!(value_after(&args, "-c:a"), "libopus");

        // a later compress stays in WebM-compatible codecs
        let compress = StepOperation::Compress(CompressParams::default());
        let args = args_to(&exec, compress, "step0.webm", "step1.webm").await;
        assert_eq!(value_after(&args, "-c:v"), "libvpx-vp9");
    }

    #[tokio::test]
    async fn test_crop_reframe_reports_window_and_output() {
        let exec = executor(1920, 1080, 10.0);
        let reframe = exec
            .crop_reframe(&CropParams::new(1080, 1920), Path::new("in.mp4"), ProcessingMode::Preview)
            .await;
        assert_eq!(
            reframe.window,
            CropRect { crop_width: 608, crop_height: 1080, crop_x: 656, crop_y: 0 }
        );
        assert_eq!(reframe.output, FrameSize::new(404, 720));
    }

    #[tokio::test]
    async fn test_preview_crop_bounded_for_any_target() {
        let exec = executor(1920, 1080, 10.0);
        for (width, height) in [(8192, 8192), (3840, 2160), (1, 8192), (8192, 1), (1080, 1920), (640, 360)] {
            let args = args_for(&exec, StepOperation::Crop(CropParams::new(width, height)), ProcessingMode::Preview).await;
            let filter = value_after(&args, "-vf");
            let scale = filter
                .split(',')
                .find_map(|f| f.strip_prefix("scale="))
                .unwrap();
            let (w, h) = scale.split_once(':').unwrap();
            let (w, h): (u32, u32) = (w.parse().unwrap(), h.parse().unwrap());
            assert!(w <= 1280 && h <= 720, "{}x{} previewed as {}x{}", width, height, w, h);
            assert!(w % 2 == 0 && h % 2 == 0);
        }
    }

    #[test]
    fn test_target_video_kbps() {
        assert_eq!(target_video_kbps(10.0, 80.0), Some(920));
        assert_eq!(target_video_kbps(0.01, 600.0), None);
        assert_eq!(target_video_kbps(10.0, 0.0), None);
    }

    #[tokio::test]
    async fn test_execute_rejects_missing_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = executor(1920, 1080, 10.0)
            .execute(
                &StepOperation::Trim(TrimParams::new(0.0, None)),
                &dir.path().join("missing.mp4"),
                &dir.path().join("out.mp4"),
                ProcessingMode::Final,
            )
            .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_default_pass_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.mp4");
        let output = dir.path().join("out.mp4");
        tokio::fs::write(&input, b"video-bytes").await.unwrap();

        FfmpegStepExecutor::default().pass_through(&input, &output).await.unwrap();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"video-bytes");
    }
}
