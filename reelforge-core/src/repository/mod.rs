pub mod playback;
pub mod scan_job;
pub mod transcode;

pub use playback::PlaybackSessionRepository;
pub use scan_job::ScanJobRepository;
pub use transcode::TranscodeSessionRepository;
