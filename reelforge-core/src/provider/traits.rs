//! The `EncoderProvider` trait (§6.2): the boundary between the transcode
//! orchestration layer (C5) and a concrete encoder backend (ffmpeg invoked
//! directly, a hardware-accelerated wrapper, ...).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::Result;
use crate::models::{Container, TranscodeProgress, TranscodeRequest};

/// Hardware acceleration a provider may use for the encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareAccelerator {
    None,
    Vaapi,
    Nvenc,
    Qsv,
    Videotoolbox,
}

/// A named encode preset a provider can apply (e.g. "fast", "quality").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityPreset {
    pub name: String,
    pub description: String,
}

/// Static self-description, queried once at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub priority: i32,
    pub supported_containers: Vec<Container>,
    pub hardware_accelerators: Vec<HardwareAccelerator>,
    pub quality_presets: Vec<QualityPreset>,
}

/// Opaque handle returned by `start_transcode`, passed back into
/// `get_progress`/`stop_transcode`. Providers are free to encode whatever
/// they need to find the running process again (typically the OS pid and
/// the session's content directory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeHandle {
    pub session_id: String,
    pub pid: Option<u32>,
}

/// Handle for a live, non-file-backed stream (e.g. proxying a remote live
/// source). Distinct from `TranscodeHandle` since it has no on-disk
/// content directory to dedup against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamHandle {
    pub stream_id: String,
    pub pid: Option<u32>,
}

/// An encoder backend capable of turning a `TranscodeRequest` into segmented
/// output under a content directory, plus (optionally) serving a live
/// passthrough stream.
///
/// Only `start_transcode`/`get_progress`/`stop_transcode` and the info
/// accessors are required; the streaming pair defaults to "unsupported" for
/// providers that only do file-based transcodes.
#[async_trait]
pub trait EncoderProvider: Send + Sync {
    fn info(&self) -> ProviderInfo;

    /// Launches (or reuses, if already running) the encode described by
    /// `request`, writing output under `content_dir`.
    async fn start_transcode(
        &self,
        request: &TranscodeRequest,
        content_dir: &str,
    ) -> Result<TranscodeHandle>;

    async fn get_progress(&self, handle: &TranscodeHandle) -> Result<TranscodeProgress>;

    async fn stop_transcode(&self, handle: &TranscodeHandle) -> Result<()>;

    async fn start_stream(
        &self,
        _request: &TranscodeRequest,
    ) -> Result<StreamHandle> {
        Err(super::error::ProviderError::UnsupportedFormat(
            "provider does not support live streaming".to_string(),
        ))
    }

    async fn get_stream_url(&self, _handle: &StreamHandle) -> Result<String> {
        Err(super::error::ProviderError::UnsupportedFormat(
            "provider does not support live streaming".to_string(),
        ))
    }

    async fn stop_stream(&self, _handle: &StreamHandle) -> Result<()> {
        Ok(())
    }

    fn supported_formats(&self) -> Vec<Container> {
        self.info().supported_containers
    }

    fn hardware_accelerators(&self) -> Vec<HardwareAccelerator> {
        self.info().hardware_accelerators
    }

    fn quality_presets(&self) -> Vec<QualityPreset> {
        self.info().quality_presets
    }
}
