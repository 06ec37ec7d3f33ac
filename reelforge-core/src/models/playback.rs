//! Playback decision and playback session types (C7 Playback Decider, C3/C6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use super::id::{DeviceId, MediaId, PlaybackSessionId, TranscodeSessionId, UserId};
use super::transcode::TranscodeRequest;

/// How a media file will reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMethod {
    Direct,
    Remux,
    Transcode,
}

impl PlaybackMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Remux => "remux",
            Self::Transcode => "transcode",
        }
    }
}

/// Output of the pure decider function `decide(media_probe, client_caps)`.
///
/// Invariant: `method == Transcode` iff `transcode_params` is `Some`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackDecision {
    pub method: PlaybackMethod,
    pub reason: String,
    pub direct_play_url: Option<String>,
    pub transcode_params: Option<TranscodeRequest>,
}

impl PlaybackDecision {
    #[must_use]
    pub fn direct(url: String, reason: impl Into<String>) -> Self {
        Self {
            method: PlaybackMethod::Direct,
            reason: reason.into(),
            direct_play_url: Some(url),
            transcode_params: None,
        }
    }

    #[must_use]
    pub fn remux(url: String, reason: impl Into<String>) -> Self {
        Self {
            method: PlaybackMethod::Remux,
            reason: reason.into(),
            direct_play_url: Some(url),
            transcode_params: None,
        }
    }

    #[must_use]
    pub fn transcode(request: TranscodeRequest, reason: impl Into<String>) -> Self {
        Self {
            method: PlaybackMethod::Transcode,
            reason: reason.into(),
            direct_play_url: None,
            transcode_params: Some(request),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Ended,
    Abandoned,
}

impl PlaybackState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Abandoned)
    }
}

/// Durable playback session record, tracking client progress through a
/// single play-through of a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSession {
    pub id: PlaybackSessionId,
    pub media_file_id: MediaId,
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub method: PlaybackMethod,
    pub transcode_id: Option<TranscodeSessionId>,
    pub state: PlaybackState,
    pub position_ns: u64,
    pub duration_ns: u64,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub quality_played: Option<String>,
    pub bandwidth_kbps: Option<u64>,
    pub debug_info: HashMap<String, JsonValue>,
}

impl PlaybackSession {
    #[must_use]
    pub fn new(media_file_id: MediaId, user_id: UserId, device_id: DeviceId, method: PlaybackMethod) -> Self {
        let now = Utc::now();
        Self {
            id: PlaybackSessionId::new(),
            media_file_id,
            user_id,
            device_id,
            method,
            transcode_id: None,
            state: PlaybackState::Playing,
            position_ns: 0,
            duration_ns: 0,
            start_time: now,
            last_activity: now,
            end_time: None,
            ip_address: None,
            device_name: None,
            device_type: None,
            quality_played: None,
            bandwidth_kbps: None,
            debug_info: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_stale(&self, staleness_threshold: chrono::Duration) -> bool {
        !self.state.is_terminal() && Utc::now() - self.last_activity > staleness_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transcode::{Container, Resolution};

    #[test]
    fn decision_invariant_direct_has_no_transcode_params() {
        let decision = PlaybackDecision::direct("/media/movie.mp4".to_string(), "compatible");
        assert!(decision.transcode_params.is_none());
    }

    #[test]
    fn decision_invariant_transcode_has_params() {
        let request = TranscodeRequest {
            media_id: MediaId::from_string("M".to_string()),
            input_path: "/media/movie.mkv".to_string(),
            container: Container::Dash,
            video_codec: "vp9".to_string(),
            audio_codec: "opus".to_string(),
            quality: 23,
            speed_priority: "balanced".to_string(),
            resolution: Some(Resolution { width: 1280, height: 720 }),
            video_bitrate_kbps: None,
            audio_bitrate_kbps: None,
            enable_abr: false,
            session_id: String::new(),
        };
        let decision = PlaybackDecision::transcode(request, "incompatible codecs");
        assert_eq!(decision.method, PlaybackMethod::Transcode);
        assert!(decision.transcode_params.is_some());
    }

    #[test]
    fn fresh_session_is_not_stale() {
        let session = PlaybackSession::new(
            MediaId::from_string("M".to_string()),
            UserId::from_string("U".to_string()),
            DeviceId::from_string("D".to_string()),
            PlaybackMethod::Direct,
        );
        assert!(!session.is_stale(chrono::Duration::minutes(30)));
    }
}
