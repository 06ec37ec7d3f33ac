//! Playback Decider (C7): a pure function from a probed media file and a
//! client's declared capabilities to a `PlaybackDecision`. No I/O, no
//! clock reads, no session state — safe to unit test exhaustively and
//! safe to call from any context without a lock.

use crate::models::{
    ClientCapabilities, Container, MediaFile, PlaybackDecision, Resolution, TranscodeRequest,
};

const PREFERRED_VIDEO_CODECS: [&str; 4] = ["h264", "hevc", "vp9", "av1"];
const PREFERRED_AUDIO_CODECS: [&str; 3] = ["aac", "mp3", "opus"];

#[must_use]
pub fn decide(media: &MediaFile, caps: &ClientCapabilities) -> PlaybackDecision {
    let (width, height) = media.resolution();

    if caps.supports_container(&media.container)
        && caps.supports_video_codec(&media.video_codec)
        && caps.supports_audio_codec(&media.audio_codec)
        && caps.fits_resolution(width, height)
        && caps.fits_bitrate(media.bitrate_kbps)
    {
        return PlaybackDecision::direct(media.path.clone(), "client supports the file as-is");
    }

    if caps.supports_video_codec(&media.video_codec)
        && caps.fits_resolution(width, height)
        && caps.fits_bitrate(media.bitrate_kbps)
    {
        if let Some(target_container) = caps.containers.first() {
            return PlaybackDecision::remux(
                media.path.clone(),
                format!("video codec compatible, rewrapping into {target_container}"),
            );
        }
    }

    let target_container = if caps.prefers_hls { Container::Hls } else { Container::Dash };

    let video_codec = PREFERRED_VIDEO_CODECS
        .iter()
        .find(|codec| caps.supports_video_codec(codec))
        .copied()
        .unwrap_or(PREFERRED_VIDEO_CODECS[0])
        .to_string();

    let audio_codec = PREFERRED_AUDIO_CODECS
        .iter()
        .find(|codec| caps.supports_audio_codec(codec))
        .copied()
        .unwrap_or(PREFERRED_AUDIO_CODECS[0])
        .to_string();

    let resolution = clamp_resolution(width, height, caps);
    let video_bitrate_kbps = if caps.max_bitrate_kbps > 0 && media.bitrate_kbps > caps.max_bitrate_kbps {
        Some(caps.max_bitrate_kbps)
    } else {
        None
    };

    let request = TranscodeRequest {
        media_id: media.id.clone(),
        input_path: media.path.clone(),
        container: target_container,
        video_codec,
        audio_codec,
        quality: TranscodeRequest::default_quality(),
        speed_priority: "balanced".to_string(),
        resolution,
        video_bitrate_kbps,
        audio_bitrate_kbps: None,
        enable_abr: false,
        session_id: String::new(),
    };

    PlaybackDecision::transcode(request, "incompatible container, codec, resolution, or bitrate")
}

fn clamp_resolution(width: u32, height: u32, caps: &ClientCapabilities) -> Option<Resolution> {
    if caps.max_width == 0 && caps.max_height == 0 {
        return None;
    }
    if caps.fits_resolution(width, height) {
        return None;
    }

    let target_width = if caps.max_width > 0 { width.min(caps.max_width) } else { width };
    let target_height = if caps.max_height > 0 { height.min(caps.max_height) } else { height };
    Some(Resolution { width: target_width, height: target_height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaId;

    fn sample_media() -> MediaFile {
        MediaFile {
            id: MediaId::from_string("m1".to_string()),
            path: "/media/movie.mp4".to_string(),
            container: "mp4".to_string(),
            video_codec: "h264".to_string(),
            audio_codec: "aac".to_string(),
            width: 1920,
            height: 1080,
            duration_ns: 7_200_000_000_000,
            bitrate_kbps: 5_000,
        }
    }

    fn fully_compatible_caps() -> ClientCapabilities {
        ClientCapabilities {
            video_codecs: vec!["h264".to_string()],
            audio_codecs: vec!["aac".to_string()],
            containers: vec!["mp4".to_string()],
            max_width: 1920,
            max_height: 1080,
            max_bitrate_kbps: 8_000,
            supports_hdr: false,
            supports_hevc: false,
            prefers_hls: false,
        }
    }

    #[test]
    fn fully_compatible_file_plays_direct() {
        let decision = decide(&sample_media(), &fully_compatible_caps());
        assert_eq!(decision.method, crate::models::PlaybackMethod::Direct);
    }

    #[test]
    fn container_mismatch_with_ok_codec_remuxes() {
        let mut caps = fully_compatible_caps();
        caps.containers = vec!["webm".to_string()];
        let decision = decide(&sample_media(), &caps);
        assert_eq!(decision.method, crate::models::PlaybackMethod::Remux);
    }

    #[test]
    fn unsupported_codec_transcodes() {
        let mut caps = fully_compatible_caps();
        caps.video_codecs = vec!["vp9".to_string()];
        let decision = decide(&sample_media(), &caps);
        assert_eq!(decision.method, crate::models::PlaybackMethod::Transcode);
        let params = decision.transcode_params.unwrap();
        assert_eq!(params.video_codec, "vp9");
    }

    #[test]
    fn hls_preference_targets_hls_container() {
        let mut caps = fully_compatible_caps();
        caps.video_codecs = vec![];
        caps.prefers_hls = true;
        let decision = decide(&sample_media(), &caps);
        let params = decision.transcode_params.unwrap();
        assert_eq!(params.container, Container::Hls);
    }

    #[test]
    fn oversized_resolution_is_clamped() {
        let mut caps = fully_compatible_caps();
        caps.video_codecs = vec![];
        caps.max_width = 1280;
        caps.max_height = 720;
        let decision = decide(&sample_media(), &caps);
        let params = decision.transcode_params.unwrap();
        let resolution = params.resolution.unwrap();
        assert_eq!(resolution.width, 1280);
        assert_eq!(resolution.height, 720);
    }

    #[test]
    fn default_container_is_dash() {
        let mut caps = fully_compatible_caps();
        caps.video_codecs = vec![];
        let decision = decide(&sample_media(), &caps);
        let params = decision.transcode_params.unwrap();
        assert_eq!(params.container, Container::Dash);
    }
}
