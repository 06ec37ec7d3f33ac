pub mod id;
pub mod media;
pub mod pagination;
pub mod playback;
pub mod scanner;
pub mod transcode;

pub use id::{
    generate_id, ContentHash, DeviceId, LibraryId, MediaId, PlaybackSessionId, ScanJobId,
    TranscodeSessionId, UserId,
};
pub use media::{ClientCapabilities, MediaFile};
pub use pagination::{Page, PageParams};
pub use playback::{PlaybackDecision, PlaybackMethod, PlaybackSession, PlaybackState};
pub use scanner::{ScanJob, ScanStatus};
pub use transcode::{
    Container, Resolution, TranscodeProgress, TranscodeRequest, TranscodeResult,
    TranscodeSession, TranscodeStatus,
};
