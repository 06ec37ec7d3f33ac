//! External, read-only media metadata.
//!
//! `MediaFile` and `ClientCapabilities` are never created or mutated by this
//! crate; they are handed in by the library subsystem and the HTTP client
//! respectively. The core only reads their fields when deciding how to play
//! or transcode a file.

use serde::{Deserialize, Serialize};

use super::id::MediaId;

/// A probed media file, as reported by the library/scanner subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: MediaId,
    pub path: String,
    pub container: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub width: u32,
    pub height: u32,
    /// Duration in nanoseconds.
    pub duration_ns: u64,
    /// Overall bitrate in kbps.
    pub bitrate_kbps: u64,
}

impl MediaFile {
    #[must_use]
    pub const fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Client-reported playback capabilities used by the Playback Decider (C7).
///
/// Missing/absent fields mean "unknown — assume unsupported", so every field
/// defaults to empty/zero rather than `Option`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCapabilities {
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
    pub containers: Vec<String>,
    pub max_width: u32,
    pub max_height: u32,
    pub max_bitrate_kbps: u64,
    pub supports_hdr: bool,
    pub supports_hevc: bool,
    /// When true, the client only implements native HLS (e.g. Safari) and
    /// cannot play DASH; see decider policy §4.7.
    pub prefers_hls: bool,
}

impl ClientCapabilities {
    #[must_use]
    pub fn supports_container(&self, container: &str) -> bool {
        self.containers.iter().any(|c| c.eq_ignore_ascii_case(container))
    }

    #[must_use]
    pub fn supports_video_codec(&self, codec: &str) -> bool {
        self.video_codecs.iter().any(|c| c.eq_ignore_ascii_case(codec))
    }

    #[must_use]
    pub fn supports_audio_codec(&self, codec: &str) -> bool {
        self.audio_codecs.iter().any(|c| c.eq_ignore_ascii_case(codec))
    }

    #[must_use]
    pub const fn fits_resolution(&self, width: u32, height: u32) -> bool {
        (self.max_width == 0 || width <= self.max_width) && (self.max_height == 0 || height <= self.max_height)
    }

    #[must_use]
    pub const fn fits_bitrate(&self, bitrate_kbps: u64) -> bool {
        self.max_bitrate_kbps == 0 || bitrate_kbps <= self.max_bitrate_kbps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_default_rejects_everything() {
        let caps = ClientCapabilities::default();
        assert!(!caps.supports_container("mp4"));
        assert!(!caps.supports_video_codec("h264"));
    }

    #[test]
    fn zero_max_means_unbounded() {
        let caps = ClientCapabilities::default();
        assert!(caps.fits_resolution(7680, 4320));
        assert!(caps.fits_bitrate(999_999));
    }
}
