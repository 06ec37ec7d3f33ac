//! Built-in CPU-only provider (`libx264`/`libx265`/`libvpx-vp9`/`libaom-av1`
//! via ffmpeg), the reference shape every hardware-accelerated provider
//! follows.
//!
//! ffmpeg's own stderr logging is left unread by the process supervisor, so
//! a chatty encoder can fill the pipe buffer and stall; we keep ffmpeg quiet
//! (`-loglevel error`) and have it report progress to a plain file via
//! `-progress` instead of over the piped stderr.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::{ProviderError, Result};
use super::traits::{
    EncoderProvider, HardwareAccelerator, ProviderInfo, QualityPreset, TranscodeHandle,
};
use crate::models::{Container, Resolution, TranscodeProgress, TranscodeRequest};
use crate::process::ProcessManager;

const PROGRESS_FILE: &str = "progress.txt";

struct TrackedSession {
    content_dir: PathBuf,
    duration_secs: Option<f64>,
}

pub struct SoftwareProvider {
    process_manager: Arc<ProcessManager>,
    sessions: DashMap<String, TrackedSession>,
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl SoftwareProvider {
    #[must_use]
    pub fn new(process_manager: Arc<ProcessManager>) -> Self {
        Self {
            process_manager,
            sessions: DashMap::new(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    #[must_use]
    pub fn with_binaries(mut self, ffmpeg_path: String, ffprobe_path: String) -> Self {
        self.ffmpeg_path = ffmpeg_path;
        self.ffprobe_path = ffprobe_path;
        self
    }

    async fn probe_duration_secs(&self, input_path: &str) -> Option<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                input_path,
            ])
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            warn!(input_path, "ffprobe failed to read duration");
            return None;
        }

        String::from_utf8_lossy(&output.stdout).trim().parse::<f64>().ok()
    }

    fn manifest_name(container: Container) -> &'static str {
        match container {
            Container::Dash => "manifest.mpd",
            Container::Hls => "master.m3u8",
            Container::Mp4 => "output.mp4",
        }
    }

    fn video_encoder(codec: &str) -> &'static str {
        match codec {
            "hevc" | "h265" => "libx265",
            "vp9" => "libvpx-vp9",
            "av1" => "libaom-av1",
            _ => "libx264",
        }
    }

    fn audio_encoder(codec: &str) -> &'static str {
        match codec {
            "mp3" => "libmp3lame",
            "opus" => "libopus",
            _ => "aac",
        }
    }

    fn preset_for(speed_priority: &str) -> &'static str {
        match speed_priority {
            "fast" => "veryfast",
            "quality" => "slow",
            _ => "medium",
        }
    }

    fn build_args(request: &TranscodeRequest, content_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            request.input_path.clone(),
            "-c:v".to_string(),
            Self::video_encoder(&request.video_codec).to_string(),
            "-preset".to_string(),
            Self::preset_for(&request.speed_priority).to_string(),
            "-crf".to_string(),
            request.quality.to_string(),
            "-c:a".to_string(),
            Self::audio_encoder(&request.audio_codec).to_string(),
        ];

        if let Some(Resolution { width, height }) = request.resolution {
            args.push("-vf".to_string());
            args.push(format!("scale={width}:{height}"));
        }
        if let Some(kbps) = request.video_bitrate_kbps {
            args.push("-b:v".to_string());
            args.push(format!("{kbps}k"));
        }
        if let Some(kbps) = request.audio_bitrate_kbps {
            args.push("-b:a".to_string());
            args.push(format!("{kbps}k"));
        }

        args.push("-progress".to_string());
        args.push(content_dir.join(PROGRESS_FILE).to_string_lossy().into_owned());
        args.push("-nostats".to_string());

        match request.container {
            Container::Dash => {
                args.push("-f".to_string());
                args.push("dash".to_string());
                if request.enable_abr {
                    args.push("-adaptation_sets".to_string());
                    args.push("id=0,streams=v id=1,streams=a".to_string());
                }
            }
            Container::Hls => {
                args.push("-f".to_string());
                args.push("hls".to_string());
                args.push("-hls_segment_filename".to_string());
                args.push(
                    content_dir
                        .join("segments")
                        .join("seg_%05d.ts")
                        .to_string_lossy()
                        .into_owned(),
                );
            }
            Container::Mp4 => {
                args.push("-movflags".to_string());
                args.push("+faststart".to_string());
            }
        }

        args.push(
            content_dir
                .join("manifests")
                .join(Self::manifest_name(request.container))
                .to_string_lossy()
                .into_owned(),
        );
        args
    }

    /// Parses the last `out_time_ms=`/`speed=`/`total_size=`/`progress=`
    /// values out of ffmpeg's `-progress` output file. The file accumulates
    /// one block per tick; later lines for the same key overwrite earlier
    /// ones, so a plain fold over all lines yields the latest values.
    fn parse_progress_file(contents: &str) -> HashMap<&str, &str> {
        let mut fields = HashMap::new();
        for line in contents.lines() {
            if let Some((key, value)) = line.split_once('=') {
                fields.insert(key.trim(), value.trim());
            }
        }
        fields
    }

    fn progress_from_fields(fields: &HashMap<&str, &str>, duration_secs: Option<f64>) -> TranscodeProgress {
        let out_time_secs = fields
            .get("out_time_ms")
            .and_then(|v| v.parse::<f64>().ok())
            .map(|ms| ms / 1_000_000.0)
            .unwrap_or(0.0);

        let speed = fields
            .get("speed")
            .and_then(|v| v.trim_end_matches('x').parse::<f64>().ok())
            .unwrap_or(0.0);

        let bytes_written = fields
            .get("total_size")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        let is_end = fields.get("progress").is_some_and(|v| *v == "end");

        let percent_complete = if is_end {
            100.0
        } else {
            match duration_secs {
                Some(total) if total > 0.0 => (out_time_secs / total * 100.0).min(100.0),
                _ => 0.0,
            }
        };

        let time_remaining_secs = match duration_secs {
            Some(total) if speed > 0.0 => ((total - out_time_secs) / speed).max(0.0),
            _ => 0.0,
        };

        TranscodeProgress {
            percent_complete,
            time_elapsed_secs: out_time_secs,
            time_remaining_secs,
            current_speed: speed,
            bytes_read: 0,
            bytes_written,
        }
    }
}

#[async_trait]
impl EncoderProvider for SoftwareProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "software".to_string(),
            priority: 0,
            supported_containers: vec![Container::Dash, Container::Hls, Container::Mp4],
            hardware_accelerators: vec![HardwareAccelerator::None],
            quality_presets: vec![
                QualityPreset { name: "fast".to_string(), description: "veryfast preset, lower quality per bit".to_string() },
                QualityPreset { name: "balanced".to_string(), description: "medium preset, the default tradeoff".to_string() },
                QualityPreset { name: "quality".to_string(), description: "slow preset, best quality per bit".to_string() },
            ],
        }
    }

    async fn start_transcode(&self, request: &TranscodeRequest, content_dir: &str) -> Result<TranscodeHandle> {
        let dir = PathBuf::from(content_dir);
        let args = Self::build_args(request, &dir);
        let session_id = request.session_id.clone();

        let duration_secs = self.probe_duration_secs(&request.input_path).await;
        debug!(session_id, ?duration_secs, ?args, "launching ffmpeg");

        let supervisor = self
            .process_manager
            .start(session_id.clone(), &self.ffmpeg_path, &args)
            .map_err(|err| ProviderError::SpawnFailed(err.to_string()))?;

        self.sessions.insert(
            session_id.clone(),
            TrackedSession { content_dir: dir, duration_secs },
        );

        Ok(TranscodeHandle { session_id, pid: Some(supervisor.pid()) })
    }

    async fn get_progress(&self, handle: &TranscodeHandle) -> Result<TranscodeProgress> {
        let Some(tracked) = self.sessions.get(&handle.session_id) else {
            return Err(ProviderError::HandleNotFound(handle.session_id.clone()));
        };
        let progress_path = tracked.content_dir.join(PROGRESS_FILE);
        let duration_secs = tracked.duration_secs;
        drop(tracked);

        let contents = match tokio::fs::read_to_string(&progress_path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(ProviderError::Io(err)),
        };

        let fields = Self::parse_progress_file(&contents);
        Ok(Self::progress_from_fields(&fields, duration_secs))
    }

    async fn stop_transcode(&self, handle: &TranscodeHandle) -> Result<()> {
        self.process_manager.stop(&handle.session_id).await;
        self.sessions.remove(&handle.session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaId;

    fn sample_request() -> TranscodeRequest {
        TranscodeRequest {
            media_id: MediaId::from_string("m".to_string()),
            input_path: "/media/in.mkv".to_string(),
            container: Container::Dash,
            video_codec: "hevc".to_string(),
            audio_codec: "opus".to_string(),
            quality: 20,
            speed_priority: "fast".to_string(),
            resolution: Some(Resolution { width: 1280, height: 720 }),
            video_bitrate_kbps: Some(2000),
            audio_bitrate_kbps: None,
            enable_abr: true,
            session_id: "sess-1".to_string(),
        }
    }

    #[test]
    fn maps_codec_names_to_encoders() {
        assert_eq!(SoftwareProvider::video_encoder("hevc"), "libx265");
        assert_eq!(SoftwareProvider::video_encoder("h264"), "libx264");
        assert_eq!(SoftwareProvider::audio_encoder("opus"), "libopus");
    }

    #[test]
    fn builds_dash_args_with_adaptation_sets_when_abr_enabled() {
        let req = sample_request();
        let args = SoftwareProvider::build_args(&req, Path::new("/data/session"));
        assert!(args.iter().any(|a| a == "libx265"));
        assert!(args.iter().any(|a| a == "libopus"));
        assert!(args.iter().any(|a| a.contains("adaptation_sets")));
        let manifest_arg = args.last().unwrap();
        assert!(manifest_arg.ends_with("manifest.mpd"));
        assert!(manifest_arg.contains("manifests"));
    }

    #[test]
    fn builds_hls_segment_pattern() {
        let mut req = sample_request();
        req.container = Container::Hls;
        req.enable_abr = false;
        let args = SoftwareProvider::build_args(&req, Path::new("/data/session"));
        assert!(args.iter().any(|a| a.contains("seg_%05d.ts")));
        let manifest_arg = args.last().unwrap();
        assert!(manifest_arg.ends_with("master.m3u8"));
        assert!(manifest_arg.contains("manifests"));
    }

    #[test]
    fn parses_progress_file_fields() {
        let contents = "frame=10\nout_time_ms=5000000\nspeed=1.2x\nprogress=continue\nframe=20\nout_time_ms=9000000\nspeed=1.4x\nprogress=continue\n";
        let fields = SoftwareProvider::parse_progress_file(contents);
        assert_eq!(fields.get("out_time_ms"), Some(&"9000000"));
        assert_eq!(fields.get("speed"), Some(&"1.4x"));
    }

    #[test]
    fn computes_percent_from_out_time_and_duration() {
        let mut fields = HashMap::new();
        fields.insert("out_time_ms", "30000000");
        fields.insert("speed", "2.0x");
        let progress = SoftwareProvider::progress_from_fields(&fields, Some(60.0));
        assert!((progress.percent_complete - 50.0).abs() < 0.01);
        assert!((progress.time_remaining_secs - 15.0).abs() < 0.01);
    }

    #[test]
    fn progress_end_marker_forces_completion() {
        let mut fields = HashMap::new();
        fields.insert("progress", "end");
        let progress = SoftwareProvider::progress_from_fields(&fields, Some(60.0));
        assert_eq!(progress.percent_complete, 100.0);
    }
}
