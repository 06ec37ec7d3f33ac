//! Transcode request/session types (C5 Transcode Service, C3 Session Store).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use super::id::{ContentHash, MediaId, TranscodeSessionId};

/// Target container for transcode output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Dash,
    Hls,
}

impl Container {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Dash => "dash",
            Self::Hls => "hls",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mp4" => Some(Self::Mp4),
            "dash" => Some(Self::Dash),
            "hls" => Some(Self::Hls),
            _ => None,
        }
    }
}

/// Requested resolution, when the caller wants an explicit clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Inputs that fully determine output bytes — every field listed here is
/// part of the content-hash tuple (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeRequest {
    pub media_id: MediaId,
    pub input_path: String,
    pub container: Container,
    pub video_codec: String,
    pub audio_codec: String,
    pub quality: i32,
    pub speed_priority: String,
    pub resolution: Option<Resolution>,
    pub video_bitrate_kbps: Option<u64>,
    pub audio_bitrate_kbps: Option<u64>,
    pub enable_abr: bool,
    /// Client-supplied, may be blank; not part of the hash.
    pub session_id: String,
}

impl TranscodeRequest {
    #[must_use]
    pub fn default_quality() -> i32 {
        23
    }

    /// Computes the deterministic content hash over exactly the fields the
    /// spec lists as output-determining (everything except `session_id`).
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        let mut hasher = Sha256::new();
        hasher.update(self.media_id.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.container.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.video_codec.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.audio_codec.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.quality.to_le_bytes());
        hasher.update(self.speed_priority.as_bytes());
        hasher.update(b"\0");
        if let Some(res) = self.resolution {
            hasher.update(res.width.to_le_bytes());
            hasher.update(res.height.to_le_bytes());
        }
        if let Some(bitrate) = self.video_bitrate_kbps {
            hasher.update(bitrate.to_le_bytes());
        }
        if let Some(bitrate) = self.audio_bitrate_kbps {
            hasher.update(bitrate.to_le_bytes());
        }
        hasher.update([u8::from(self.enable_abr)]);

        ContentHash(hex::encode(hasher.finalize()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TranscodeStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Progress snapshot reported by an `EncoderProvider`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TranscodeProgress {
    pub percent_complete: f64,
    pub time_elapsed_secs: f64,
    pub time_remaining_secs: f64,
    pub current_speed: f64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Terminal outcome recorded once a session reaches `completed` or `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeResult {
    pub manifest_url: Option<String>,
    pub bytes_written: u64,
    pub error_message: Option<String>,
}

/// Durable transcode session record (C3 Session Store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeSession {
    pub id: TranscodeSessionId,
    pub provider: String,
    pub status: TranscodeStatus,
    pub content_hash: ContentHash,
    pub directory_path: String,
    pub request: JsonValue,
    pub progress: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_accessed: DateTime<Utc>,
}

impl TranscodeSession {
    #[must_use]
    pub fn new(
        provider: String,
        content_hash: ContentHash,
        directory_path: String,
        request: &TranscodeRequest,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TranscodeSessionId::new(),
            provider,
            status: TranscodeStatus::Queued,
            content_hash,
            directory_path,
            request: serde_json::to_value(request).unwrap_or(JsonValue::Null),
            progress: None,
            result: None,
            start_time: now,
            end_time: None,
            last_accessed: now,
        }
    }

    #[must_use]
    pub const fn is_reusable(&self) -> bool {
        !matches!(self.status, TranscodeStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> TranscodeRequest {
        TranscodeRequest {
            media_id: MediaId::from_string("M".to_string()),
            input_path: "/media/movie.mkv".to_string(),
            container: Container::Dash,
            video_codec: "h264".to_string(),
            audio_codec: "aac".to_string(),
            quality: 23,
            speed_priority: "balanced".to_string(),
            resolution: Some(Resolution { width: 1280, height: 720 }),
            video_bitrate_kbps: None,
            audio_bitrate_kbps: None,
            enable_abr: false,
            session_id: String::new(),
        }
    }

    #[test]
    fn identical_requests_hash_identically() {
        let a = sample_request();
        let mut b = sample_request();
        b.session_id = "different-client-session".to_string();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn differing_quality_changes_hash() {
        let a = sample_request();
        let mut b = sample_request();
        b.quality = 18;
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn differing_resolution_changes_hash() {
        let a = sample_request();
        let mut b = sample_request();
        b.resolution = Some(Resolution { width: 1920, height: 1080 });
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn differing_codec_changes_hash() {
        let a = sample_request();
        let mut b = sample_request();
        b.video_codec = "hevc".to_string();
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn differing_abr_changes_hash() {
        let a = sample_request();
        let mut b = sample_request();
        b.enable_abr = true;
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn adjacent_codec_strings_do_not_collide_across_boundary() {
        let mut a = sample_request();
        a.video_codec = "h264a".to_string();
        a.audio_codec = "ac".to_string();

        let mut b = sample_request();
        b.video_codec = "h264".to_string();
        b.audio_codec = "aac".to_string();

        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn failed_session_is_not_reusable() {
        let req = sample_request();
        let mut session = TranscodeSession::new(
            "software".to_string(),
            req.content_hash(),
            "/data/dash_software_abc".to_string(),
            &req,
        );
        session.status = TranscodeStatus::Failed;
        assert!(!session.is_reusable());
    }
}
